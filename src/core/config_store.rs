use crate::core::codec::{Codec, JsonCodec};
use crate::core::models::ConfigSnapshot;
use crate::core::models::remote_config::{
    DEFAULT_AD_TAG_DATA_MACRO, DEFAULT_AD_TAG_DATA_MODE, DEFAULT_AD_TAG_URL_MODE,
    DEFAULT_CSM_ENABLED, DEFAULT_DISPLAY_URL_MACRO, DEFAULT_KILL_SWITCH,
};
use crate::core::storage::KeyValueStore;
use anyhow::Error;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key of the kill switch as persisted by older releases, a bare
/// boolean. Still read so the flag survives upgrades, but the structured
/// snapshot overrides it.
pub const LEGACY_KILL_SWITCH_KEY: &str = "CriteoCachedKillSwitch";

/// Storage key of the full merged snapshot
pub const CONFIG_KEY: &str = "CriteoCachedConfig";

/// Holds the current remote configuration. Readers get the snapshot
/// through a single atomic pointer load and never see a partial merge.
pub struct ConfigStore<C: Codec = JsonCodec> {
    storage: Arc<dyn KeyValueStore>,
    codec: C,
    current: ArcSwap<ConfigSnapshot>,
    /// Serializes merge+persist so persisted order matches memory order
    refresh_lock: Mutex<()>,
}

impl ConfigStore<JsonCodec> {
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_codec(storage, JsonCodec)
    }
}

impl<C: Codec> ConfigStore<C> {
    /// Creates the store with the snapshot found in `storage`
    pub fn with_codec(storage: Arc<dyn KeyValueStore>, codec: C) -> Self {
        let store = Self {
            storage,
            codec,
            current: ArcSwap::from_pointee(ConfigSnapshot::default()),
            refresh_lock: Mutex::new(()),
        };

        store.current.store(Arc::new(store.load()));
        store
    }

    /// Reads the persisted snapshot, folding in the legacy kill switch
    /// underneath it. Anything unreadable counts as not persisted.
    pub fn load(&self) -> ConfigSnapshot {
        let mut base = ConfigSnapshot::default();

        if let Some(kill_switch) = self.read_legacy_kill_switch() {
            base = base.with_kill_switch(kill_switch);
        }

        let persisted = match self.storage.get(CONFIG_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return base,
            Err(e) => {
                warn!("Failed reading persisted config: {:#}", e);
                return base;
            }
        };

        match self.codec.decode::<ConfigSnapshot>(&persisted) {
            Ok(snapshot) => ConfigSnapshot::merge(&base, &snapshot),
            Err(e) => {
                debug!("Couldn't decode persisted config, ignoring it: {:#}", e);
                base
            }
        }
    }

    fn read_legacy_kill_switch(&self) -> Option<bool> {
        let bytes = match self.storage.get(LEGACY_KILL_SWITCH_KEY) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!("Failed reading legacy kill switch: {:#}", e);
                return None;
            }
        };

        match self.codec.decode::<bool>(&bytes) {
            Ok(kill_switch) => Some(kill_switch),
            Err(e) => {
                debug!("Ignoring malformed legacy kill switch: {:#}", e);
                None
            }
        }
    }

    /// Merges `remote` over the current snapshot and persists the result.
    /// A failed write is logged only, memory stays authoritative.
    pub fn refresh(&self, remote: &ConfigSnapshot) -> Arc<ConfigSnapshot> {
        let _guard = self.refresh_lock.lock();

        let merged = Arc::new(ConfigSnapshot::merge(&self.current.load(), remote));
        self.current.store(merged.clone());

        if let Err(e) = self.persist(&merged) {
            warn!("Couldn't persist refreshed config: {:#}", e);
        }

        merged
    }

    fn persist(&self, snapshot: &ConfigSnapshot) -> Result<(), Error> {
        let bytes = self.codec.encode(snapshot)?;
        self.storage.put(CONFIG_KEY, &bytes)
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn is_kill_switch_enabled(&self) -> bool {
        self.current.load().kill_switch.unwrap_or(DEFAULT_KILL_SWITCH)
    }

    pub fn is_csm_enabled(&self) -> bool {
        self.current.load().csm_enabled.unwrap_or(DEFAULT_CSM_ENABLED)
    }

    pub fn display_url_macro(&self) -> String {
        self.current
            .load()
            .display_url_macro
            .clone()
            .unwrap_or_else(|| DEFAULT_DISPLAY_URL_MACRO.to_string())
    }

    pub fn ad_tag_url_mode(&self) -> String {
        self.current
            .load()
            .ad_tag_url_mode
            .clone()
            .unwrap_or_else(|| DEFAULT_AD_TAG_URL_MODE.to_string())
    }

    pub fn ad_tag_data_macro(&self) -> String {
        self.current
            .load()
            .ad_tag_data_macro
            .clone()
            .unwrap_or_else(|| DEFAULT_AD_TAG_DATA_MACRO.to_string())
    }

    pub fn ad_tag_data_mode(&self) -> String {
        self.current
            .load()
            .ad_tag_data_mode
            .clone()
            .unwrap_or_else(|| DEFAULT_AD_TAG_DATA_MODE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryKeyValueStore;
    use anyhow::anyhow;

    struct FailingWrites {
        inner: MemoryKeyValueStore,
    }

    impl KeyValueStore for FailingWrites {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
            self.inner.get(key)
        }

        fn put(&self, _key: &str, _value: &[u8]) -> Result<(), Error> {
            Err(anyhow!("disk full"))
        }
    }

    fn storage_with(entries: &[(&str, &str)]) -> Arc<MemoryKeyValueStore> {
        let storage = Arc::new(MemoryKeyValueStore::new());
        for (key, value) in entries {
            storage.put(key, value.as_bytes()).unwrap();
        }
        storage
    }

    #[test]
    fn test_defaults_when_nothing_persisted() {
        let store = ConfigStore::open(storage_with(&[]));

        assert!(store.snapshot().is_empty());
        assert!(!store.is_kill_switch_enabled());
        assert!(store.is_csm_enabled());
        assert_eq!(store.display_url_macro(), "%%displayUrl%%");
        assert_eq!(store.ad_tag_data_macro(), "%%adTagData%%");
        assert!(store.ad_tag_url_mode().contains("%%displayUrl%%"));
        assert!(store.ad_tag_data_mode().contains("%%adTagData%%"));
    }

    #[test]
    fn test_reads_keys_written_by_older_releases() {
        let store = ConfigStore::open(storage_with(&[
            ("CriteoCachedKillSwitch", "true"),
            ("CriteoCachedConfig", r#"{"csmEnabled":false}"#),
        ]));

        assert!(store.is_kill_switch_enabled());
        assert!(!store.is_csm_enabled());
    }

    #[test]
    fn test_legacy_kill_switch_only() {
        let store = ConfigStore::open(storage_with(&[(LEGACY_KILL_SWITCH_KEY, "true")]));

        assert_eq!(
            *store.snapshot(),
            ConfigSnapshot::default().with_kill_switch(true)
        );
        assert!(store.is_kill_switch_enabled());
        assert!(store.is_csm_enabled());
    }

    #[test]
    fn test_structured_snapshot_overrides_legacy() {
        let store = ConfigStore::open(storage_with(&[
            (LEGACY_KILL_SWITCH_KEY, "true"),
            (CONFIG_KEY, r#"{"killSwitch":false,"csmEnabled":false}"#),
        ]));

        assert!(!store.is_kill_switch_enabled());
        assert!(!store.is_csm_enabled());
    }

    #[test]
    fn test_legacy_survives_structured_without_kill_switch() {
        let store = ConfigStore::open(storage_with(&[
            (LEGACY_KILL_SWITCH_KEY, "true"),
            (CONFIG_KEY, r#"{"AndroidAdTagDataMacro":"%%data%%"}"#),
        ]));

        assert!(store.is_kill_switch_enabled());
        assert_eq!(store.ad_tag_data_macro(), "%%data%%");
    }

    #[test]
    fn test_corrupt_snapshot_treated_as_empty() {
        let store = ConfigStore::open(storage_with(&[
            (LEGACY_KILL_SWITCH_KEY, "true"),
            (CONFIG_KEY, "{not json"),
        ]));

        assert_eq!(
            *store.snapshot(),
            ConfigSnapshot::default().with_kill_switch(true)
        );
    }

    #[test]
    fn test_refresh_merges_and_persists() {
        let storage = storage_with(&[(CONFIG_KEY, r#"{"killSwitch":true}"#)]);
        let store = ConfigStore::open(storage.clone());

        let merged = store.refresh(&ConfigSnapshot::default().with_csm_enabled(false));

        assert_eq!(merged.kill_switch, Some(true));
        assert_eq!(merged.csm_enabled, Some(false));

        let reopened = ConfigStore::open(storage);
        assert_eq!(*reopened.snapshot(), *merged);
    }

    #[test]
    fn test_refresh_override_wins() {
        let store = ConfigStore::open(storage_with(&[]));
        store.refresh(&ConfigSnapshot::default().with_kill_switch(true));
        store.refresh(&ConfigSnapshot::default().with_kill_switch(false));

        assert!(!store.is_kill_switch_enabled());
    }

    #[test]
    fn test_refresh_keeps_memory_when_persist_fails() {
        let storage = Arc::new(FailingWrites {
            inner: MemoryKeyValueStore::new(),
        });
        let store = ConfigStore::open(storage);

        store.refresh(&ConfigSnapshot::default().with_kill_switch(true));

        assert!(store.is_kill_switch_enabled());
    }

    #[test]
    fn test_concurrent_refreshes_keep_every_field() {
        let store = ConfigStore::open(storage_with(&[]));

        std::thread::scope(|s| {
            s.spawn(|| store.refresh(&ConfigSnapshot::default().with_kill_switch(true)));
            s.spawn(|| store.refresh(&ConfigSnapshot::default().with_csm_enabled(false)));
        });

        assert!(store.is_kill_switch_enabled());
        assert!(!store.is_csm_enabled());
    }
}
