//! Preset data model
//!
//! A preset is a named, partially specified model-load configuration. Every
//! optional parameter is an `Option`: `None` means the user never opted in,
//! `Some(value)` means it was set (zero and empty string included). Only
//! `gpu_split_auto` and `fasttensors` are plain booleans and always serialized.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::defaults;

/// KV cache quantization mode accepted by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheMode {
    Q4,
    Q6,
    Q8,
    Fp16,
}

impl CacheMode {
    pub const ALL: [CacheMode; 4] = [CacheMode::Q4, CacheMode::Q6, CacheMode::Q8, CacheMode::Fp16];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Q4 => "Q4",
            CacheMode::Q6 => "Q6",
            CacheMode::Q8 => "Q8",
            CacheMode::Fp16 => "FP16",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCacheMode(pub String);

impl fmt::Display for UnknownCacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown cache mode '{}' (expected one of Q4, Q6, Q8, FP16)", self.0)
    }
}

impl std::error::Error for UnknownCacheMode {}

impl FromStr for CacheMode {
    type Err = UnknownCacheMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCacheMode(s.to_string()))
    }
}

impl Serialize for CacheMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CacheMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Empty string in the document means "unset", same as a missing key
fn deserialize_optional_cache_mode<'de, D>(deserializer: D) -> Result<Option<CacheMode>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parameter set shared by named presets and the default configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_seq_len: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_base_seq_len: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<u64>,

    #[serde(default)]
    pub gpu_split_auto: bool,
    /// Comma-separated per-device fractions, e.g. "0.5,0.5"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_split: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rope_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rope_alpha: Option<f64>,

    #[serde(
        default,
        deserialize_with = "deserialize_optional_cache_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_mode: Option<CacheMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_experts_per_token: Option<u64>,

    // Draft model (speculative decoding)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_rope_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_rope_alpha: Option<f64>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_cache_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub draft_cache_mode: Option<CacheMode>,

    #[serde(default)]
    pub fasttensors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autosplit_reserve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
}

impl ModelParams {
    /// True when the draft sub-configuration is active
    pub fn has_draft(&self) -> bool {
        self.draft_model_name.as_deref().is_some_and(|name| !name.is_empty())
    }
}

/// Named preset, the unit stored in the presets document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(flatten)]
    pub params: ModelParams,
}

impl Preset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: ModelParams::default(),
        }
    }

    pub fn with_params(name: impl Into<String>, params: ModelParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// On-disk shape of the presets file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct PresetsDocument {
    #[serde(default)]
    pub presets: Vec<Preset>,
}

/// Presets that exist even when nothing was ever saved
pub fn builtin_presets() -> Vec<Preset> {
    vec![Preset::with_params(
        defaults::PRESET_NAME,
        ModelParams {
            cache_mode: Some(CacheMode::Q4),
            draft_cache_mode: Some(CacheMode::Q4),
            ..ModelParams::default()
        },
    )]
}

pub fn is_builtin(name: &str) -> bool {
    builtin_presets().iter().any(|p| p.name == name)
}

/// Overlay saved presets onto the built-ins: same name replaces in place,
/// new names are appended in file order. Later duplicates win.
pub fn merge_presets(builtin: Vec<Preset>, saved: &[Preset]) -> Vec<Preset> {
    let mut merged = builtin;
    for preset in saved {
        match merged.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset.clone(),
            None => merged.push(preset.clone()),
        }
    }
    merged
}
