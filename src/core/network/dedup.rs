use crate::core::codec::Codec;
use crate::core::config_store::ConfigStore;
use crate::core::models::{AdSize, BidsResponse, CacheKey, Slot};
use crate::core::network::{FetchError, RequestFactory, TaskExecutor, TaskHandle, WireClient};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Receives the outcome of one bid call. Only called when the call
/// succeeded and was not cancelled, at most once per call.
pub trait BidListener: Send + Sync {
    fn set_results(&self, slots: Vec<Slot>);

    fn set_next_call_delay(&self, delay: Duration);
}

/// One submitted bid call, shared by every key it covers
struct InFlightBatch {
    id: u64,
    cancelled: AtomicBool,
    handle: Mutex<Option<Box<dyn TaskHandle>>>,
}

impl InFlightBatch {
    fn new(id: u64) -> Self {
        Self {
            id,
            cancelled: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// The flag is raised before the handle lock is taken, and `attach`
    /// checks it under that lock, so a cancel racing the submission
    /// always reaches the handle.
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);

        if let Some(handle) = self.handle.lock().take() {
            handle.cancel();
        }
    }

    fn attach(&self, handle: Box<dyn TaskHandle>) {
        let mut slot = self.handle.lock();

        if self.is_cancelled() {
            drop(slot);
            handle.cancel();
        } else {
            *slot = Some(handle);
        }
    }
}

type Registry = Arc<Mutex<HashMap<CacheKey, Arc<InFlightBatch>>>>;

/// Releases the keys of a batch when its unit of work goes away, whether
/// it completed, failed, panicked, was aborted or never got to run.
/// Keys already taken over by a newer batch are left alone.
struct InFlightRelease {
    registry: Registry,
    batch: Arc<InFlightBatch>,
    keys: Vec<CacheKey>,
}

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        let mut in_flight = self.registry.lock();

        for key in &self.keys {
            if in_flight
                .get(key)
                .is_some_and(|owner| Arc::ptr_eq(owner, &self.batch))
            {
                in_flight.remove(key);
            }
        }
    }
}

/// Sends bid and config calls, keeping at most one bid call in flight
/// per cache key.
///
/// Keys of a submitted call stay registered until that call is over, and
/// requests for registered keys are filtered out. Failures are logged and
/// swallowed: the caller simply gets no results this round and may ask
/// again later.
pub struct RequestDeduplicator {
    factory: Arc<dyn RequestFactory>,
    client: Arc<dyn WireClient>,
    executor: Arc<dyn TaskExecutor>,
    in_flight: Registry,
    next_batch_id: AtomicU64,
}

impl RequestDeduplicator {
    pub fn new(
        factory: Arc<dyn RequestFactory>,
        client: Arc<dyn WireClient>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            factory,
            client,
            executor,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_batch_id: AtomicU64::new(0),
        }
    }

    /// Asynchronously requests bids for the given keys, skipping keys
    /// that already have a call in flight. When every key is skipped
    /// nothing is sent and the listener is never called.
    ///
    /// Returns whether a call was submitted.
    pub fn request_bids<I>(&self, keys: I, listener: Arc<dyn BidListener>) -> bool
    where
        I: IntoIterator<Item = CacheKey>,
    {
        let batch = Arc::new(InFlightBatch::new(
            self.next_batch_id.fetch_add(1, Ordering::Relaxed),
        ));

        // Filter and register under one lock so overlapping concurrent
        // requests can never both claim a key
        let requested: Vec<CacheKey> = {
            let mut in_flight = self.in_flight.lock();
            let mut requested = Vec::new();

            for key in keys {
                if !in_flight.contains_key(&key) {
                    in_flight.insert(key.clone(), batch.clone());
                    requested.push(key);
                }
            }

            requested
        };

        if requested.is_empty() {
            debug!("All requested slots already in flight, skipping call");
            return false;
        }

        let release = InFlightRelease {
            registry: self.in_flight.clone(),
            batch: batch.clone(),
            keys: requested.clone(),
        };

        let factory = self.factory.clone();
        let client = self.client.clone();
        let call_batch = batch.clone();
        let batch_id = batch.id;

        let work = async move {
            let _release = release;

            let outcome = AssertUnwindSafe(execute_bid_call(
                factory.as_ref(),
                client.as_ref(),
                &requested,
                || call_batch.is_cancelled(),
                listener.as_ref(),
            ))
            .catch_unwind()
            .await
            .unwrap_or(Err(FetchError::Panicked));

            match outcome {
                Ok(()) => debug!("Bid call {} delivered", batch_id),
                Err(e) => warn!(
                    "Bid call {} for {} slots failed: {}",
                    batch_id,
                    requested.len(),
                    e
                ),
            }
        };

        match self.executor.submit(work.boxed()) {
            Ok(handle) => {
                batch.attach(handle);
                true
            }
            Err(e) => {
                // the rejected work was dropped, which released its keys
                warn!("Bid call {} not submitted: {}", batch_id, FetchError::from(e));
                false
            }
        }
    }

    /// Asynchronously fetches the remote config and merges it into
    /// `config_store`. On any failure the store is left as is.
    ///
    /// Returns whether the call was submitted.
    pub fn refresh_config<C>(&self, config_store: Arc<ConfigStore<C>>) -> bool
    where
        C: Codec + 'static,
    {
        let factory = self.factory.clone();
        let client = self.client.clone();

        let work = async move {
            let outcome = AssertUnwindSafe(execute_config_call(
                factory.as_ref(),
                client.as_ref(),
                config_store,
            ))
            .catch_unwind()
            .await
            .unwrap_or(Err(FetchError::Panicked));

            if let Err(e) = outcome {
                warn!("Config refresh failed, keeping current config: {}", e);
            }
        };

        match self.executor.submit(work.boxed()) {
            // config calls are not tracked, they finish on their own
            Ok(_handle) => true,
            Err(e) => {
                warn!("Config refresh not submitted: {}", FetchError::from(e));
                false
            }
        }
    }

    /// Cancels every bid call in flight and forgets their keys. Calls
    /// already running may still finish, but their results are dropped.
    pub fn cancel_all(&self) {
        let batches: Vec<Arc<InFlightBatch>> = {
            let mut in_flight = self.in_flight.lock();
            in_flight.drain().map(|(_, batch)| batch).collect()
        };

        // handles are cancelled outside the registry lock since an
        // executor may drop the work, and with it its release, right away
        let mut seen = HashSet::new();
        for batch in batches {
            if seen.insert(batch.id) {
                batch.cancel();
            }
        }
    }

    /// Keys currently covered by a bid call in flight
    pub fn pending_keys(&self) -> HashSet<CacheKey> {
        self.in_flight.lock().keys().cloned().collect()
    }
}

/// Runs one bid call and delivers its results unless `is_cancelled`
/// says otherwise by the time the answer is in.
pub(crate) async fn execute_bid_call<F>(
    factory: &dyn RequestFactory,
    client: &dyn WireClient,
    keys: &[CacheKey],
    is_cancelled: F,
    listener: &dyn BidListener,
) -> Result<(), FetchError>
where
    F: Fn() -> bool,
{
    let request = factory.bid_request(keys);
    let user_agent = factory.user_agent();

    let response = client.load_bids(&request, &user_agent).await?;
    log_bids(&response);

    if is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    let delay = response.next_call_delay();
    let mut slots = response.slots;
    attribute_slots(keys, &mut slots);

    listener.set_results(slots);
    listener.set_next_call_delay(delay);

    Ok(())
}

/// Fetches the remote config and merges it in. Merging persists to
/// storage, which may block, so it runs on the blocking pool when a
/// tokio runtime is around.
pub(crate) async fn execute_config_call<C: Codec + 'static>(
    factory: &dyn RequestFactory,
    client: &dyn WireClient,
    config_store: Arc<ConfigStore<C>>,
) -> Result<(), FetchError> {
    let request = factory.config_request();
    let remote = client.load_config(&request).await?;

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime
                .spawn_blocking(move || config_store.refresh(&remote))
                .await
                .map_err(|_| FetchError::Panicked)?;
        }
        Err(_) => {
            config_store.refresh(&remote);
        }
    }

    Ok(())
}

/// Bid answers do not echo the ad unit type, so each slot takes it from
/// the requested key it answers: same placement and size first, then
/// same placement when the server picked another size.
fn attribute_slots(keys: &[CacheKey], slots: &mut [Slot]) {
    for slot in slots {
        let size = AdSize::new(slot.width, slot.height);
        let requested = keys
            .iter()
            .find(|key| key.placement_id() == slot.placement_id && key.size() == size)
            .or_else(|| keys.iter().find(|key| key.placement_id() == slot.placement_id));

        match requested {
            Some(key) => slot.ad_unit_type = key.ad_unit_type(),
            None => debug!("Slot {} answers no requested key", slot.placement_id),
        }
    }
}

fn log_bids(response: &BidsResponse) {
    if !tracing::event_enabled!(tracing::Level::DEBUG) {
        return;
    }

    for slot in &response.slots {
        debug!(
            "Received bid placement={} cpm={} {}x{} ttl={}",
            slot.placement_id, slot.cpm, slot.width, slot.height, slot.ttl
        );
    }
}
