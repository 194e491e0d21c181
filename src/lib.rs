//! Client side bid acquisition engine: deduplicated bid and config calls,
//! single use tokens for prefetched bids, mergeable remote configuration
//! and call metric aggregation.

pub mod app;
pub mod core;
