use super::WatcherScope;
use crate::recorder::{family_hash, to_bounded_value, CacheAction, CacheContent, Entry, Extra};
use serde::Serialize;
use std::time::Duration;

/// Records cache hits, misses, writes and evictions
pub struct CacheWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> CacheWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    pub fn record_cache_hit<V: Serialize + ?Sized>(&self, key: &str, value: &V) {
        self.record(CacheAction::Hit, key, Some(value), None);
    }

    pub fn record_cache_miss(&self, key: &str) {
        self.record::<()>(CacheAction::Miss, key, None, None);
    }

    pub fn record_cache_write<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) {
        self.record(CacheAction::Set, key, Some(value), ttl);
    }

    pub fn record_cache_forget(&self, key: &str) {
        self.record::<()>(CacheAction::Forget, key, None, None);
    }

    fn record<V: Serialize + ?Sized>(
        &self,
        action: CacheAction,
        key: &str,
        value: Option<&V>,
        ttl: Option<Duration>,
    ) {
        self.scope.capture(key, || {
            let limit = self.scope.settings().payload_limit;
            let content = CacheContent {
                action,
                key: crate::recorder::bounded_text(key, limit),
                value: value.map(|v| to_bounded_value(v, limit)),
                ttl_secs: ttl.map(|t| t.as_secs()),
                extra: Extra::new(),
            };

            // Hits are routine; everything else is worth listing
            let display = action != CacheAction::Hit;

            Entry::new(
                content,
                [action.as_str()],
                Some(family_hash(&["cache", key])),
                display,
            )
        });
    }
}
