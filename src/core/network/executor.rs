use crate::core::network::SubmitError;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

/// A unit of work handed to an executor
pub type Work = BoxFuture<'static, ()>;

/// Cancels a submitted unit of work. Best effort: work that already
/// finished is unaffected, running work is stopped at its next await.
pub trait TaskHandle: Send + Sync {
    fn cancel(&self);
}

/// Runs units of work off the caller's thread
pub trait TaskExecutor: Send + Sync {
    /// Queue `work`. Must not run it inline on the calling thread.
    fn submit(&self, work: Work) -> Result<Box<dyn TaskHandle>, SubmitError>;
}

/// Spawns onto a tokio runtime, with at most `max_concurrent` units of
/// work running at once. The rest wait for a permit.
pub struct TokioExecutor {
    runtime: Handle,
    permits: Arc<Semaphore>,
}

impl TokioExecutor {
    pub fn new(runtime: Handle, max_concurrent: usize) -> Self {
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Executor on the runtime of the calling context
    pub fn current(max_concurrent: usize) -> Result<Self, SubmitError> {
        let runtime = Handle::try_current().map_err(|_| SubmitError::NoRuntime)?;
        Ok(Self::new(runtime, max_concurrent))
    }

    /// Refuse new work. Work already waiting for a permit is dropped.
    pub fn shutdown(&self) {
        self.permits.close();
    }
}

struct TokioTaskHandle(AbortHandle);

impl TaskHandle for TokioTaskHandle {
    fn cancel(&self) {
        self.0.abort();
    }
}

impl TaskExecutor for TokioExecutor {
    fn submit(&self, work: Work) -> Result<Box<dyn TaskHandle>, SubmitError> {
        if self.permits.is_closed() {
            return Err(SubmitError::Closed);
        }

        let permits = self.permits.clone();
        let task = self.runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            work.await;
        });

        Ok(Box::new(TokioTaskHandle(task.abort_handle())))
    }
}
