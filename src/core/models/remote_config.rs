use serde::{Deserialize, Serialize};

pub const DEFAULT_KILL_SWITCH: bool = false;
pub const DEFAULT_CSM_ENABLED: bool = true;
pub const DEFAULT_DISPLAY_URL_MACRO: &str = "%%displayUrl%%";
pub const DEFAULT_AD_TAG_URL_MODE: &str = "<html><body style='text-align:center; margin:0px; padding:0px; horizontal-align:center;'><script src=\"%%displayUrl%%\"></script></body></html>";
pub const DEFAULT_AD_TAG_DATA_MACRO: &str = "%%adTagData%%";
pub const DEFAULT_AD_TAG_DATA_MODE: &str = "<html><body style='text-align:center; margin:0px; padding:0px; horizontal-align:center;'><script>%%adTagData%%</script></body></html>";

/// Remote configuration as sent by the config endpoint and as persisted
/// locally. Every field is independently optional, an unset field means
/// "no opinion" and falls through to the base snapshot on merge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(rename = "killSwitch", default, skip_serializing_if = "Option::is_none")]
    pub kill_switch: Option<bool>,
    #[serde(
        rename = "AndroidDisplayUrlMacro",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_url_macro: Option<String>,
    #[serde(
        rename = "AndroidAdTagUrlMode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ad_tag_url_mode: Option<String>,
    #[serde(
        rename = "AndroidAdTagDataMacro",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ad_tag_data_macro: Option<String>,
    #[serde(
        rename = "AndroidAdTagDataMode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ad_tag_data_mode: Option<String>,
    #[serde(rename = "csmEnabled", default, skip_serializing_if = "Option::is_none")]
    pub csm_enabled: Option<bool>,
}

impl ConfigSnapshot {
    pub fn with_kill_switch(mut self, kill_switch: bool) -> Self {
        self.kill_switch = Some(kill_switch);
        self
    }

    pub fn with_csm_enabled(mut self, csm_enabled: bool) -> Self {
        self.csm_enabled = Some(csm_enabled);
        self
    }

    /// Field by field merge, `overrides` wins wherever it has a value
    pub fn merge(base: &ConfigSnapshot, overrides: &ConfigSnapshot) -> ConfigSnapshot {
        ConfigSnapshot {
            kill_switch: overrides.kill_switch.or(base.kill_switch),
            display_url_macro: overrides
                .display_url_macro
                .clone()
                .or_else(|| base.display_url_macro.clone()),
            ad_tag_url_mode: overrides
                .ad_tag_url_mode
                .clone()
                .or_else(|| base.ad_tag_url_mode.clone()),
            ad_tag_data_macro: overrides
                .ad_tag_data_macro
                .clone()
                .or_else(|| base.ad_tag_data_macro.clone()),
            ad_tag_data_mode: overrides
                .ad_tag_data_mode
                .clone()
                .or_else(|| base.ad_tag_data_mode.clone()),
            csm_enabled: overrides.csm_enabled.or(base.csm_enabled),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigSnapshot::default()
    }
}
