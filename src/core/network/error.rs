use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("executor is shut down")]
    Closed,
    #[error("no async runtime available")]
    NoRuntime,
}

/// Why a network unit of work produced nothing. These never reach the
/// caller of `request_bids`/`refresh_config`, they are logged where the
/// unit of work ends.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to submit call: {0}")]
    Submit(#[from] SubmitError),
    #[error("transport failure: {0:#}")]
    Transport(anyhow::Error),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("call cancelled")]
    Cancelled,
    #[error("call panicked")]
    Panicked,
}
