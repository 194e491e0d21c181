mod slot_cache;

pub use slot_cache::{MAX_CALL_DELAY, SlotCache};
