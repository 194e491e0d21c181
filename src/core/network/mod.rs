mod client;
mod dedup;
mod error;
mod executor;
mod request;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{HttpWireClient, WireClient};
pub use dedup::{BidListener, RequestDeduplicator};
pub use error::{FetchError, SubmitError};
pub use executor::{TaskExecutor, TaskHandle, TokioExecutor, Work};
pub use request::{
    BidRequest, ConfigRequest, Publisher, RequestFactory, RequestSlot, StaticRequestFactory,
};
