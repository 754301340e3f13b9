use super::{keyed, DeliveryOutcome, WatcherScope};
use crate::recorder::{bounded_text, family_hash, Entry, Extra, MailContent};

/// Recipients that get their own tag
const TAGGED_RECIPIENTS: usize = 5;

/// Outgoing message as seen by the mail adapter
#[derive(Debug, Clone, Default)]
pub struct MailMeta {
    pub mailable: Option<String>,
    pub subject: String,
    pub from: Option<String>,
    pub recipients: Vec<String>,
}

impl MailMeta {
    pub fn new(subject: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            recipients,
            ..Self::default()
        }
    }
}

/// Records sent mail
pub struct MailWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> MailWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    pub fn record_mail(&self, mail: &MailMeta, outcome: &DeliveryOutcome) {
        self.scope.capture(&mail.subject, || {
            let limit = self.scope.settings().payload_limit;

            let mut tags = vec!["mail".to_string()];
            tags.extend(
                mail.recipients
                    .iter()
                    .take(TAGGED_RECIPIENTS)
                    .map(|r| keyed("recipient", r.to_ascii_lowercase())),
            );
            if !outcome.is_delivered() {
                tags.push("failed".to_string());
            }

            let content = MailContent {
                mailable: mail.mailable.clone(),
                subject: bounded_text(&mail.subject, limit),
                from: mail.from.clone(),
                recipients: mail.recipients.clone(),
                delivered: outcome.is_delivered(),
                error: outcome.error().map(|e| bounded_text(e, limit)),
                extra: Extra::new(),
            };

            let family = mail.mailable.as_deref().unwrap_or(&mail.subject);

            Entry::new(content, tags, Some(family_hash(&["mail", family])), true)
        });
    }
}
