use crate::core::models::MetricRecord;
use anyhow::{Error, bail};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Destination of metrics leaving the [`MetricStore`](super::MetricStore)
pub trait MetricMover {
    /// Whether the record should leave the store at all. Evaluated while
    /// the record is locked, so it must not call back into the store.
    fn should_move(&self, _record: &MetricRecord) -> bool {
        true
    }

    /// Hands the record to its destination. On error the record is gone.
    fn offer(&self, record: MetricRecord) -> Result<(), Error>;
}

impl<F> MetricMover for F
where
    F: Fn(MetricRecord) -> Result<(), Error>,
{
    fn offer(&self, record: MetricRecord) -> Result<(), Error> {
        self(record)
    }
}

/// Bounded FIFO of metrics waiting to be sent
pub struct MetricSendingQueue {
    queue: Mutex<VecDeque<MetricRecord>>,
    capacity: usize,
}

impl MetricSendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Removes up to `max` records, oldest first
    pub fn poll(&self, max: usize) -> Vec<MetricRecord> {
        let mut queue = self.queue.lock();
        let count = max.min(queue.len());

        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Only ready-to-send metrics are moved
impl MetricMover for MetricSendingQueue {
    fn should_move(&self, record: &MetricRecord) -> bool {
        record.is_ready_to_send()
    }

    fn offer(&self, record: MetricRecord) -> Result<(), Error> {
        let mut queue = self.queue.lock();

        if queue.len() >= self.capacity {
            bail!(
                "Metric sending queue full ({}), dropping {}",
                self.capacity,
                record.impression_id()
            );
        }

        queue.push_back(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(id: &str) -> MetricRecord {
        let mut builder = MetricRecord::new(id).to_builder();
        builder.ready_to_send(true);
        builder.build()
    }

    #[test]
    fn test_queue_is_fifo_and_bounded() {
        let queue = MetricSendingQueue::new(2);

        queue.offer(ready("a")).unwrap();
        queue.offer(ready("b")).unwrap();
        assert!(queue.offer(ready("c")).is_err());

        let polled = queue.poll(5);
        let ids: Vec<&str> = polled.iter().map(|r| r.impression_id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_only_moves_ready_records() {
        let queue = MetricSendingQueue::new(1);

        assert!(!queue.should_move(&MetricRecord::new("a")));
        assert!(queue.should_move(&ready("a")));
    }
}
