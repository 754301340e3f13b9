use super::{keyed, DeliveryOutcome, WatcherScope};
use crate::recorder::{bounded_text, family_hash, Entry, Extra, NotificationContent};

/// Records notifications sent over any channel
pub struct NotificationWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> NotificationWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    /// Record a notification sent to `notifiables` over `channel`
    pub fn record_notification(
        &self,
        notification: &str,
        channel: &str,
        notifiables: &[String],
        outcome: &DeliveryOutcome,
    ) {
        self.scope.capture(notification, || {
            let limit = self.scope.settings().payload_limit;

            let mut tags = vec![keyed("channel", channel)];
            if !outcome.is_delivered() {
                tags.push("failed".to_string());
            }

            let content = NotificationContent {
                notification: notification.to_string(),
                channel: channel.to_string(),
                notifiables: notifiables.to_vec(),
                delivered: outcome.is_delivered(),
                error: outcome.error().map(|e| bounded_text(e, limit)),
                extra: Extra::new(),
            };

            Entry::new(
                content,
                tags,
                Some(family_hash(&["notification", notification, channel])),
                true,
            )
        });
    }
}
