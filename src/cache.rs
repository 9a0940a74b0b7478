use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::models::UsageEvent;
use crate::storage::Storage;

pub const USAGE_EVENTS_CACHE_KEY: &str = "usage_events_snapshot_v1";
pub const USAGE_EVENTS_CACHE_TTL_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Serialize, Deserialize)]
struct CachedEvents {
    timestamp: i64,
    events: Vec<UsageEvent>,
}

pub struct EventCache {
    store: Mutex<Storage>,
}

impl EventCache {
    pub fn new(store: Storage) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    // Any read failure is a miss: missing key, malformed payload, expired TTL.
    pub fn load(&self, now_ms: i64) -> Option<Vec<UsageEvent>> {
        let store = self.store.lock().ok()?;
        let raw = store.get_value(USAGE_EVENTS_CACHE_KEY).ok().flatten()?;
        let cached: CachedEvents = serde_json::from_str(&raw).ok()?;
        if now_ms - cached.timestamp < USAGE_EVENTS_CACHE_TTL_MS {
            Some(cached.events)
        } else {
            None
        }
    }

    // Caching is best effort; persistence failures are swallowed.
    pub fn save(&self, now_ms: i64, events: &[UsageEvent]) {
        let snapshot = CachedEvents {
            timestamp: now_ms,
            events: events.to_vec(),
        };
        let Ok(raw) = serde_json::to_string(&snapshot) else {
            return;
        };
        if let Ok(store) = self.store.lock() {
            let _ = store.set_value(USAGE_EVENTS_CACHE_KEY, &raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> EventCache {
        EventCache::new(Storage::open_in_memory().expect("open storage"))
    }

    fn event(model: &str) -> UsageEvent {
        UsageEvent {
            timestamp: "1704067200000".into(),
            model: model.into(),
            ..UsageEvent::default()
        }
    }

    #[test]
    fn load_returns_none_when_empty() {
        assert!(cache().load(0).is_none());
    }

    #[test]
    fn snapshot_is_served_inside_ttl() {
        let cache = cache();
        cache.save(1_000, &[event("gpt-4o")]);

        let events = cache
            .load(1_000 + USAGE_EVENTS_CACHE_TTL_MS - 1)
            .expect("fresh snapshot");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].model, "gpt-4o");
    }

    #[test]
    fn snapshot_expires_at_ttl_boundary() {
        let cache = cache();
        cache.save(1_000, &[event("gpt-4o")]);
        assert!(cache.load(1_000 + USAGE_EVENTS_CACHE_TTL_MS).is_none());
    }

    #[test]
    fn malformed_snapshot_is_a_miss() {
        let storage = Storage::open_in_memory().expect("open storage");
        storage
            .set_value(USAGE_EVENTS_CACHE_KEY, "{not json")
            .expect("seed malformed payload");
        let cache = EventCache::new(storage);
        assert!(cache.load(0).is_none());
    }

    #[test]
    fn save_replaces_prior_snapshot_wholesale() {
        let cache = cache();
        cache.save(1_000, &[event("first"), event("second")]);
        cache.save(2_000, &[event("third")]);

        let events = cache.load(2_500).expect("latest snapshot");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].model, "third");
    }
}
