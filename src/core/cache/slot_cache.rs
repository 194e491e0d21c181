use crate::core::models::{CacheKey, Slot};
use crate::core::network::BidListener;
use moka::sync::Cache;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest quiet period honored, whatever the server asks for
pub const MAX_CALL_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
struct CachedSlot {
    slot: Slot,
    expires_at: Instant,
}

/// Holds the latest bid per slot until it is served or expires, and
/// remembers how long the auction service asked us to stay quiet
pub struct SlotCache {
    slots: Cache<CacheKey, CachedSlot>,
    silenced_until: Mutex<Option<Instant>>,
}

impl SlotCache {
    pub fn new(max_slots: u64) -> Self {
        SlotCache {
            slots: Cache::builder().max_capacity(max_slots).build(),
            silenced_until: Mutex::new(None),
        }
    }

    /// Caches a returned slot, replacing any previous bid for its key.
    /// No-bid slots are ignored.
    pub fn put(&self, slot: Slot) {
        if !slot.is_bid() {
            debug!("Ignoring no-bid slot for {}", slot.placement_id);
            return;
        }

        let key = match slot.cache_key() {
            Ok(key) => key,
            Err(e) => {
                warn!("Dropping slot without usable key: {:#}", e);
                return;
            }
        };

        let Some(expires_at) = Instant::now().checked_add(slot.ttl()) else {
            warn!("Dropping slot {} with out of range ttl {}s", key, slot.ttl);
            return;
        };
        self.slots.insert(key, CachedSlot { slot, expires_at });
    }

    /// Get and remove the bid for `key`, so each bid is served once
    pub fn take(&self, key: &CacheKey) -> Option<Slot> {
        let cached = self.slots.remove(key)?;

        if Instant::now() >= cached.expires_at {
            debug!("Cached bid for {} expired", key);
            return None;
        }

        Some(cached.slot)
    }

    /// Whether a live bid is cached for `key`, without consuming it
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots
            .get(key)
            .is_some_and(|cached| Instant::now() < cached.expires_at)
    }

    /// True while the delay requested by the last call is running
    pub fn is_silenced(&self) -> bool {
        self.silenced_until
            .lock()
            .is_some_and(|until| Instant::now() < until)
    }
}

impl BidListener for SlotCache {
    fn set_results(&self, slots: Vec<Slot>) {
        for slot in slots {
            self.put(slot);
        }
    }

    fn set_next_call_delay(&self, delay: Duration) {
        if delay > MAX_CALL_DELAY {
            warn!("Clamping next call delay of {}s", delay.as_secs());
        }

        let delay = delay.min(MAX_CALL_DELAY);
        let until = (!delay.is_zero()).then(|| Instant::now() + delay);
        *self.silenced_until.lock() = until;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{AdSize, AdUnitType, SlotBuilder};

    fn slot(placement: &str, cpm: f64, ttl: u64) -> Slot {
        SlotBuilder::default()
            .placement_id(placement)
            .cpm(cpm)
            .width(320u32)
            .height(50u32)
            .ttl(ttl)
            .build()
            .unwrap()
    }

    fn key(placement: &str) -> CacheKey {
        CacheKey::new(placement, AdSize::new(320, 50), AdUnitType::Banner).unwrap()
    }

    #[test]
    fn test_take_serves_bid_once() {
        let cache = SlotCache::new(10);
        cache.set_results(vec![slot("pl-1", 1.5, 60)]);

        assert!(cache.contains(&key("pl-1")));
        assert_eq!(cache.take(&key("pl-1")).unwrap().cpm, 1.5);
        assert!(cache.take(&key("pl-1")).is_none());
    }

    #[test]
    fn test_no_bid_slots_are_not_cached() {
        let cache = SlotCache::new(10);
        cache.set_results(vec![slot("free", 0.0, 60), slot("dead", 2.0, 0)]);

        assert!(cache.take(&key("free")).is_none());
        assert!(cache.take(&key("dead")).is_none());
    }

    #[test]
    fn test_newer_bid_replaces_older() {
        let cache = SlotCache::new(10);
        cache.put(slot("pl-1", 1.0, 60));
        cache.put(slot("pl-1", 3.0, 60));

        assert_eq!(cache.take(&key("pl-1")).unwrap().cpm, 3.0);
    }

    #[test]
    fn test_next_call_delay_silences() {
        let cache = SlotCache::new(10);
        assert!(!cache.is_silenced());

        cache.set_next_call_delay(Duration::from_secs(60));
        assert!(cache.is_silenced());

        cache.set_next_call_delay(Duration::ZERO);
        assert!(!cache.is_silenced());
    }

    #[test]
    fn test_out_of_range_ttl_drops_only_that_slot() {
        let cache = SlotCache::new(10);
        cache.set_results(vec![slot("huge", 1.0, u64::MAX), slot("pl-1", 2.0, 60)]);

        assert!(cache.take(&key("huge")).is_none());
        assert_eq!(cache.take(&key("pl-1")).unwrap().cpm, 2.0);
    }

    #[test]
    fn test_huge_next_call_delay_is_clamped() {
        let cache = SlotCache::new(10);
        cache.set_next_call_delay(Duration::from_secs(u64::MAX));

        assert!(cache.is_silenced());
        let until = (*cache.silenced_until.lock()).unwrap();
        assert!(until <= Instant::now() + MAX_CALL_DELAY);
    }
}
