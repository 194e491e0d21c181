use crate::app::config::EngineConfig;
use crate::core::cache::SlotCache;
use crate::core::config_store::ConfigStore;
use crate::core::csm::{MetricSendingQueue, MetricStore};
use crate::core::models::{AdUnitType, CacheKey, Slot};
use crate::core::network::{
    HttpWireClient, RequestDeduplicator, RequestFactory, StaticRequestFactory, TaskExecutor,
    WireClient,
};
use crate::core::storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use crate::core::tokens::{Token, TokenStore, TokenValue};
use anyhow::Error;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns the engine's stores and hands them to whoever needs them.
/// Nothing here is global, build as many as you like.
pub struct EngineContext {
    pub config_store: Arc<ConfigStore>,
    pub tokens: Arc<TokenStore<Slot>>,
    pub metrics: Arc<MetricStore>,
    pub metric_queue: Arc<MetricSendingQueue>,
    pub slot_cache: Arc<SlotCache>,
    pub dedup: Arc<RequestDeduplicator>,
}

impl EngineContext {
    /// Wires the engine against the configured http endpoints and storage
    pub fn build(config: &EngineConfig, executor: Arc<dyn TaskExecutor>) -> Result<Self, Error> {
        let storage: Arc<dyn KeyValueStore> = match &config.storage.dir {
            Some(dir) => Arc::new(FileKeyValueStore::open(dir)?),
            None => Arc::new(MemoryKeyValueStore::new()),
        };

        let factory = Arc::new(StaticRequestFactory::new(&config.network));
        let client = Arc::new(HttpWireClient::new(&config.network)?);

        Ok(Self::with_collaborators(
            config, storage, factory, client, executor,
        ))
    }

    pub fn with_collaborators(
        config: &EngineConfig,
        storage: Arc<dyn KeyValueStore>,
        factory: Arc<dyn RequestFactory>,
        client: Arc<dyn WireClient>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let config_store = Arc::new(ConfigStore::open(storage));
        info!(
            "Engine config loaded, kill switch {}",
            config_store.is_kill_switch_enabled()
        );

        EngineContext {
            config_store,
            tokens: Arc::new(TokenStore::new()),
            metrics: Arc::new(MetricStore::new(config.metrics.capacity)),
            metric_queue: Arc::new(MetricSendingQueue::new(config.metrics.queue_capacity)),
            slot_cache: Arc::new(SlotCache::new(config.cache.max_slots)),
            dedup: Arc::new(RequestDeduplicator::new(factory, client, executor)),
        }
    }

    /// Asks for bids for `keys` into the slot cache, unless bidding is
    /// killed remotely or the server asked us to hold off
    pub fn prefetch(&self, keys: Vec<CacheKey>) -> bool {
        if self.config_store.is_kill_switch_enabled() {
            debug!("Kill switch enabled, skipping prefetch");
            return false;
        }

        if self.slot_cache.is_silenced() {
            debug!("Within requested call delay, skipping prefetch");
            return false;
        }

        self.dedup.request_bids(keys, self.slot_cache.clone())
    }

    pub fn refresh_config(&self) -> bool {
        self.dedup.refresh_config(self.config_store.clone())
    }

    /// Moves the cached bid for `key` behind a fresh token, valid for
    /// the remaining bid ttl
    pub fn publish_token(&self, key: &CacheKey) -> Option<Token> {
        let slot = self.slot_cache.take(key)?;
        let ttl = slot.ttl();

        Some(
            self.tokens
                .publish(TokenValue::expiring_in(slot, key.ad_unit_type(), ttl)),
        )
    }

    pub fn redeem_token(&self, token: &Token, ad_unit_type: AdUnitType) -> Option<Slot> {
        self.tokens
            .consume(token, ad_unit_type)
            .map(|value| value.payload)
    }

    /// Moves every ready metric to the sending queue, returns how many
    /// left the store. Nothing moves while call metrics are disabled.
    pub fn flush_ready_metrics(&self) -> usize {
        if !self.config_store.is_csm_enabled() {
            return 0;
        }

        self.metrics
            .get_all_stored_metrics()
            .iter()
            .filter(|record| {
                self.metrics
                    .move_by_id(record.impression_id(), self.metric_queue.as_ref())
            })
            .count()
    }

    pub fn shutdown(&self) {
        self.dedup.cancel_all();
        self.tokens.purge_expired();
    }
}
