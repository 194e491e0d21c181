pub mod metric;
pub mod remote_config;
pub mod slot;

pub use metric::{MetricBuilder, MetricRecord};
pub use remote_config::ConfigSnapshot;
pub use slot::{AdSize, AdUnitType, BidsResponse, CacheKey, Slot, SlotBuilder};
