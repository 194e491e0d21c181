use crate::core::models::{AdUnitType, BidsResponse, CacheKey, ConfigSnapshot, Slot, SlotBuilder};
use crate::core::network::{
    BidListener, BidRequest, ConfigRequest, FetchError, Publisher, RequestFactory, RequestSlot,
    SubmitError, TaskExecutor, TaskHandle, WireClient, Work,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub struct TestRequestFactory;

impl RequestFactory for TestRequestFactory {
    fn bid_request(&self, keys: &[CacheKey]) -> BidRequest {
        BidRequest {
            id: "test".to_string(),
            publisher: Publisher {
                bundle_id: "com.example".to_string(),
                cp_id: "pub".to_string(),
            },
            sdk_version: "test".to_string(),
            profile_id: 0,
            slots: keys.iter().map(RequestSlot::for_key).collect(),
        }
    }

    fn config_request(&self) -> ConfigRequest {
        ConfigRequest {
            cp_id: "pub".to_string(),
            bundle_id: "com.example".to_string(),
            sdk_version: "test".to_string(),
            rtb_profile_id: 0,
        }
    }

    fn user_agent(&self) -> String {
        "test-agent".to_string()
    }
}

pub fn banner_slot(placement: &str) -> Slot {
    SlotBuilder::default()
        .placement_id(placement)
        .cpm(1.0)
        .width(320u32)
        .height(50u32)
        .ttl(60u64)
        .ad_unit_type(AdUnitType::Banner)
        .build()
        .unwrap()
}

enum Mode {
    Answer(BidsResponse, ConfigSnapshot),
    Fail,
    Block,
}

pub struct FakeWireClient {
    mode: Mode,
    bid_calls: AtomicUsize,
    config_calls: AtomicUsize,
    requested: Mutex<Vec<Vec<String>>>,
}

impl FakeWireClient {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            bid_calls: AtomicUsize::new(0),
            config_calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Answers every bid call with a banner slot per placement
    pub fn answering(placements: &[&str], next_call_secs: u64) -> Self {
        let response = BidsResponse {
            slots: placements.iter().map(|p| banner_slot(p)).collect(),
            time_to_next_call: next_call_secs,
        };
        Self::with_mode(Mode::Answer(response, ConfigSnapshot::default()))
    }

    pub fn with_response(response: BidsResponse) -> Self {
        Self::with_mode(Mode::Answer(response, ConfigSnapshot::default()))
    }

    pub fn with_config(config: ConfigSnapshot) -> Self {
        Self::with_mode(Mode::Answer(BidsResponse::default(), config))
    }

    pub fn failing() -> Self {
        Self::with_mode(Mode::Fail)
    }

    /// Calls never complete
    pub fn blocking() -> Self {
        Self::with_mode(Mode::Block)
    }

    pub fn bid_calls(&self) -> usize {
        self.bid_calls.load(Ordering::SeqCst)
    }

    pub fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }

    /// Placement ids of every bid call, in call order
    pub fn requested_placements(&self) -> Vec<Vec<String>> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl WireClient for FakeWireClient {
    async fn load_bids(
        &self,
        request: &BidRequest,
        _user_agent: &str,
    ) -> Result<BidsResponse, FetchError> {
        self.requested.lock().push(
            request
                .slots
                .iter()
                .map(|s| s.placement_id.clone())
                .collect(),
        );
        self.bid_calls.fetch_add(1, Ordering::SeqCst);

        match &self.mode {
            Mode::Answer(response, _) => Ok(response.clone()),
            Mode::Fail => Err(FetchError::Status(503)),
            Mode::Block => std::future::pending().await,
        }
    }

    async fn load_config(&self, _request: &ConfigRequest) -> Result<ConfigSnapshot, FetchError> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);

        match &self.mode {
            Mode::Answer(_, config) => Ok(config.clone()),
            Mode::Fail => Err(FetchError::Status(503)),
            Mode::Block => std::future::pending().await,
        }
    }
}

struct ManualHandle {
    flag: Arc<AtomicBool>,
    cancelled: Arc<AtomicUsize>,
}

impl TaskHandle for ManualHandle {
    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps submitted work until the test runs it
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<Vec<(Arc<AtomicBool>, Work)>>,
    submitted: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
    ignore_cancel: bool,
}

impl ManualExecutor {
    /// Runs cancelled work anyway, like a call that already started
    pub fn ignoring_cancel() -> Self {
        Self {
            ignore_cancel: true,
            ..Default::default()
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Pending work in submission order, cancelled work dropped unless
    /// cancellation is ignored
    pub fn take_all(&self) -> Vec<Work> {
        let queued: Vec<(Arc<AtomicBool>, Work)> = self.queue.lock().drain(..).collect();

        queued
            .into_iter()
            .filter(|(flag, _)| self.ignore_cancel || !flag.load(Ordering::SeqCst))
            .map(|(_, work)| work)
            .collect()
    }

    pub async fn run_all(&self) {
        for work in self.take_all() {
            work.await;
        }
    }
}

impl TaskExecutor for ManualExecutor {
    fn submit(&self, work: Work) -> Result<Box<dyn TaskHandle>, SubmitError> {
        let flag = Arc::new(AtomicBool::new(false));
        self.queue.lock().push((flag.clone(), work));
        self.submitted.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ManualHandle {
            flag,
            cancelled: self.cancelled.clone(),
        }))
    }
}

pub struct RejectingExecutor;

impl TaskExecutor for RejectingExecutor {
    fn submit(&self, _work: Work) -> Result<Box<dyn TaskHandle>, SubmitError> {
        Err(SubmitError::Closed)
    }
}

#[derive(Default)]
pub struct RecordingListener {
    slots: Mutex<Vec<Slot>>,
    delay: Mutex<Option<Duration>>,
    result_calls: AtomicUsize,
    delay_calls: AtomicUsize,
    panics: bool,
}

impl RecordingListener {
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Default::default()
        }
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.slots.lock().clone()
    }

    pub fn delay(&self) -> Option<Duration> {
        *self.delay.lock()
    }

    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn delay_calls(&self) -> usize {
        self.delay_calls.load(Ordering::SeqCst)
    }
}

impl BidListener for RecordingListener {
    fn set_results(&self, slots: Vec<Slot>) {
        if self.panics {
            panic!("listener blew up");
        }

        self.result_calls.fetch_add(1, Ordering::SeqCst);
        self.slots.lock().extend(slots);
    }

    fn set_next_call_delay(&self, delay: Duration) {
        self.delay_calls.fetch_add(1, Ordering::SeqCst);
        *self.delay.lock() = Some(delay);
    }
}

/// Polls `condition` until it holds, failing the test after 2s
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    panic!("condition not met in time");
}
