use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Wall-clock timeout per fetch, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Bodies larger than this fail with a body-too-large error
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Retries on transport errors and 5xx responses
    #[serde(default)]
    pub retries: u32,

    /// Prefix fetched for box-based fragments when a full read is not needed
    #[serde(default = "default_header_prefix_bytes")]
    pub header_prefix_bytes: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Extra headers sent on every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub g2o: G2oConfig,
}

fn default_timeout() -> u64 {
    60
}
fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}
fn default_header_prefix_bytes() -> u64 {
    64 * 1024
}
fn default_user_agent() -> String {
    format!("vodcheck/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_body_bytes: default_max_body_bytes(),
            retries: 0,
            header_prefix_bytes: default_header_prefix_bytes(),
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            g2o: G2oConfig::default(),
        }
    }
}

/// Edge-auth request signing. Disabled while `key` is empty.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct G2oConfig {
    #[serde(default)]
    pub key: String,

    #[serde(default = "default_g2o_version")]
    pub version: u32,

    #[serde(default = "default_loopback")]
    pub ghost_ip: String,

    #[serde(default = "default_loopback")]
    pub client_ip: String,

    #[serde(default = "default_unique_id")]
    pub unique_id: String,

    #[serde(default = "default_nonce")]
    pub nonce: String,

    /// Seconds added to the current time to form the signed expiry
    #[serde(default = "default_window")]
    pub window_secs: u64,

    #[serde(default = "default_data_header")]
    pub data_header: String,

    #[serde(default = "default_sign_header")]
    pub sign_header: String,
}

fn default_g2o_version() -> u32 {
    5
}
fn default_loopback() -> String {
    "127.0.0.1".to_string()
}
fn default_unique_id() -> String {
    "vodcheck".to_string()
}
fn default_nonce() -> String {
    "token".to_string()
}
fn default_window() -> u64 {
    300
}
fn default_data_header() -> String {
    "X-Akamai-G2O-Auth-Data".to_string()
}
fn default_sign_header() -> String {
    "X-Akamai-G2O-Auth-Sign".to_string()
}

impl G2oConfig {
    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }
}

impl Default for G2oConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            version: default_g2o_version(),
            ghost_ip: default_loopback(),
            client_ip: default_loopback(),
            unique_id: default_unique_id(),
            nonce: default_nonce(),
            window_secs: default_window(),
            data_header: default_data_header(),
            sign_header: default_sign_header(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    /// Gap tolerance in 90 kHz ticks, scaled to each format's timescale
    #[serde(default = "default_threshold")]
    pub threshold_ticks: i64,

    /// Allowed deviation between declared and demuxed keyframe times, 90 kHz
    #[serde(default = "default_keyframe_tolerance")]
    pub keyframe_tolerance_ticks: i64,

    #[serde(default = "default_true")]
    pub check_keyframes: bool,

    #[serde(default = "default_true")]
    pub check_continuity: bool,
}

fn default_threshold() -> i64 {
    1000
}
fn default_keyframe_tolerance() -> i64 {
    2000
}
fn default_true() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            threshold_ticks: default_threshold(),
            keyframe_tolerance_ticks: default_keyframe_tolerance(),
            check_keyframes: true,
            check_continuity: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Fragments fetched and parsed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Evenly spaced sample per fragment list; 0 checks everything
    #[serde(default)]
    pub max_fragments_per_list: usize,
}

fn default_concurrency() -> usize {
    8
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_fragments_per_list: 0,
        }
    }
}
