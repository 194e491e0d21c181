use crate::core::csm::MetricMover;
use crate::core::models::{MetricBuilder, MetricRecord};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

pub const DEFAULT_METRIC_CAPACITY: usize = 1_000;

/// Call metrics keyed by impression id.
///
/// Records are guarded by the map's shard locks, so updates of one id are
/// serialized while unrelated ids proceed in parallel. Once `capacity` ids
/// are held, updates that would create a new id are dropped; existing ids
/// keep updating and nothing is ever evicted.
pub struct MetricStore {
    records: DashMap<String, MetricRecord>,
    capacity: usize,
    stored: AtomicUsize,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_CAPACITY)
    }
}

impl MetricStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            capacity,
            stored: AtomicUsize::new(0),
        }
    }

    fn try_reserve(&self) -> bool {
        self.stored
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.stored.fetch_sub(1, Ordering::AcqRel);
    }

    /// Applies `updater` to the record of `impression_id`, creating an empty
    /// one first if needed. The updater works on a copy which replaces the
    /// stored record once it returns; it must not call back into the store.
    pub fn update_by_id<F>(&self, impression_id: &str, updater: F)
    where
        F: FnOnce(&mut MetricBuilder),
    {
        assert!(!impression_id.is_empty(), "Metric impression id must not be empty");

        match self.records.entry(impression_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let mut builder = entry.get().to_builder();
                updater(&mut builder);
                *entry.get_mut() = builder.build();
            }
            Entry::Vacant(entry) => {
                let mut builder = MetricRecord::new(impression_id).to_builder();
                updater(&mut builder);

                if !self.try_reserve() {
                    debug!(
                        "Metric store full ({}), dropping new metric {}",
                        self.capacity, impression_id
                    );
                    return;
                }

                entry.insert(builder.build());
            }
        }
    }

    /// Removes the record of `impression_id` and hands it to `mover`.
    ///
    /// The record is deleted before being offered and is not put back when
    /// the offer fails: a crash or a failed offer loses the metric, but a
    /// metric can never be delivered twice. Returns whether a record left
    /// the store.
    pub fn move_by_id<M>(&self, impression_id: &str, mover: &M) -> bool
    where
        M: MetricMover + ?Sized,
    {
        let Some((_, record)) = self
            .records
            .remove_if(impression_id, |_, record| mover.should_move(record))
        else {
            return false;
        };

        self.release();

        if let Err(e) = mover.offer(record) {
            warn!("Metric {} lost while moving: {:#}", impression_id, e);
        }

        true
    }

    /// Copies every stored record. Each record is read under its lock, but
    /// the copy as a whole is not a point in time snapshot.
    pub fn get_all_stored_metrics(&self) -> Vec<MetricRecord> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
