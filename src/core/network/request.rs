use crate::app::config::NetworkConfig;
use crate::core::models::{AdUnitType, CacheKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub bundle_id: String,
    pub cp_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSlot {
    pub imp_id: String,
    pub placement_id: String,
    pub sizes: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_native: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interstitial: bool,
}

impl RequestSlot {
    pub fn for_key(key: &CacheKey) -> Self {
        Self {
            imp_id: Uuid::new_v4().simple().to_string(),
            placement_id: key.placement_id().to_string(),
            sizes: vec![key.size().to_string()],
            is_native: key.ad_unit_type() == AdUnitType::Native,
            interstitial: key.ad_unit_type() == AdUnitType::Interstitial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    pub id: String,
    pub publisher: Publisher,
    pub sdk_version: String,
    pub profile_id: u32,
    pub slots: Vec<RequestSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    pub cp_id: String,
    pub bundle_id: String,
    pub sdk_version: String,
    pub rtb_profile_id: u32,
}

/// Builds the outbound requests. Device and app details live outside
/// this crate, so they come in through this seam.
pub trait RequestFactory: Send + Sync {
    fn bid_request(&self, keys: &[CacheKey]) -> BidRequest;

    fn config_request(&self) -> ConfigRequest;

    fn user_agent(&self) -> String;
}

/// Request factory with fixed publisher identity
pub struct StaticRequestFactory {
    publisher: Publisher,
    sdk_version: String,
    profile_id: u32,
    user_agent: String,
}

impl StaticRequestFactory {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            publisher: Publisher {
                bundle_id: config.bundle_id.clone(),
                cp_id: config.publisher_id.clone(),
            },
            sdk_version: config.sdk_version.clone(),
            profile_id: config.profile_id,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl RequestFactory for StaticRequestFactory {
    fn bid_request(&self, keys: &[CacheKey]) -> BidRequest {
        BidRequest {
            id: Uuid::new_v4().to_string(),
            publisher: self.publisher.clone(),
            sdk_version: self.sdk_version.clone(),
            profile_id: self.profile_id,
            slots: keys.iter().map(RequestSlot::for_key).collect(),
        }
    }

    fn config_request(&self) -> ConfigRequest {
        ConfigRequest {
            cp_id: self.publisher.cp_id.clone(),
            bundle_id: self.publisher.bundle_id.clone(),
            sdk_version: self.sdk_version.clone(),
            rtb_profile_id: self.profile_id,
        }
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }
}
