mod mover;
mod store;

pub use mover::{MetricMover, MetricSendingQueue};
pub use store::{DEFAULT_METRIC_CAPACITY, MetricStore};
