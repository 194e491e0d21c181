use anyhow::{Error, bail};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use strum::{Display, EnumString};

/// Format family of an inventory slot. Also used as the type tag
/// of prefetched tokens.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdUnitType {
    #[default]
    Banner,
    Interstitial,
    Native,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct AdSize {
    pub width: u32,
    pub height: u32,
}

impl AdSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Renders as `WIDTHxHEIGHT`, the form expected in bid requests
impl fmt::Display for AdSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Identity of an inventory slot, used for in-flight deduplication
/// and as the lookup key of the slot cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    placement_id: String,
    size: AdSize,
    ad_unit_type: AdUnitType,
}

impl CacheKey {
    /// Build a key, rejecting an empty placement id since it can
    /// never match a returned slot
    pub fn new(
        placement_id: impl Into<String>,
        size: AdSize,
        ad_unit_type: AdUnitType,
    ) -> Result<Self, Error> {
        let placement_id = placement_id.into();

        if placement_id.trim().is_empty() {
            bail!("Cache key placement id must not be empty");
        }

        Ok(Self {
            placement_id,
            size,
            ad_unit_type,
        })
    }

    pub fn placement_id(&self) -> &str {
        &self.placement_id
    }

    pub fn size(&self) -> AdSize {
        self.size
    }

    pub fn ad_unit_type(&self) -> AdUnitType {
        self.ad_unit_type
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.placement_id, self.size, self.ad_unit_type)
    }
}

/// A single bid returned by the auction service for one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into))]
pub struct Slot {
    pub placement_id: String,
    #[serde(default)]
    #[builder(default)]
    pub imp_id: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub cpm: f64,
    #[serde(default)]
    #[builder(default)]
    pub currency: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub width: u32,
    #[serde(default)]
    #[builder(default)]
    pub height: u32,
    #[serde(default)]
    #[builder(default)]
    pub display_url: Option<String>,
    /// Seconds the bid may be served for
    #[serde(default)]
    #[builder(default)]
    pub ttl: u64,
    #[serde(default)]
    #[builder(default)]
    pub ad_unit_type: AdUnitType,
}

impl Slot {
    /// The key this slot answers, or an error if the server
    /// returned a slot without placement
    pub fn cache_key(&self) -> Result<CacheKey, Error> {
        CacheKey::new(
            self.placement_id.clone(),
            AdSize::new(self.width, self.height),
            self.ad_unit_type,
        )
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    /// A zero priced or zero lived slot is the server saying "no bid"
    pub fn is_bid(&self) -> bool {
        self.cpm > 0.0 && self.ttl > 0
    }
}

/// Decoded answer of a bid call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidsResponse {
    #[serde(default)]
    pub slots: Vec<Slot>,
    /// Seconds the server asks us to stay silent before the next call
    #[serde(default)]
    pub time_to_next_call: u64,
}

impl BidsResponse {
    pub fn next_call_delay(&self) -> Duration {
        Duration::from_secs(self.time_to_next_call)
    }
}
