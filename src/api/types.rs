//! Request and response shapes of the model-serving API.
//!
//! Only the fields the application consumes are modelled.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct IdEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct IdListResponse {
    #[serde(default)]
    data: Vec<IdEntry>,
}

#[derive(Debug, Deserialize)]
struct StringListResponse {
    #[serde(default)]
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OverrideListResponse {
    #[serde(default)]
    presets: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RopeParameters {
    #[serde(default)]
    rope_scale: Option<f64>,
    #[serde(default)]
    rope_alpha: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DraftResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    parameters: RopeParameters,
}

#[derive(Debug, Default, Deserialize)]
struct ModelParameters {
    #[serde(default)]
    max_seq_len: Option<u64>,
    #[serde(default)]
    cache_size: Option<u64>,
    #[serde(default)]
    rope_scale: Option<f64>,
    #[serde(default)]
    rope_alpha: Option<f64>,
    #[serde(default)]
    draft: Option<DraftResponse>,
}

#[derive(Debug, Deserialize)]
struct CurrentModelResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    parameters: ModelParameters,
}

#[derive(Debug, Deserialize)]
struct LoraEntry {
    id: String,
    #[serde(default)]
    scaling: f64,
}

#[derive(Debug, Deserialize)]
struct LoraListResponse {
    #[serde(default)]
    data: Vec<LoraEntry>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    download_path: String,
}

/// Model currently loaded on the server
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentModel {
    pub id: String,
    pub max_seq_len: u64,
    pub cache_size: u64,
    pub rope_scale: f64,
    pub rope_alpha: f64,
    pub draft: Option<DraftInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftInfo {
    pub id: String,
    pub rope_scale: f64,
    pub rope_alpha: f64,
}

impl CurrentModel {
    /// Label/value rows for display
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Model", self.id.clone()),
            ("Max Sequence Length", self.max_seq_len.to_string()),
            ("Cache Size", self.cache_size.to_string()),
            ("Rope Scale", format!("{:.2}", self.rope_scale)),
            ("Rope Alpha", format!("{:.2}", self.rope_alpha)),
        ];
        if let Some(draft) = &self.draft {
            rows.push(("Draft Model", draft.id.clone()));
            rows.push(("Draft Rope Scale", format!("{:.2}", draft.rope_scale)));
            rows.push(("Draft Rope Alpha", format!("{:.2}", draft.rope_alpha)));
        }
        rows
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedLora {
    pub id: String,
    pub scaling: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    #[default]
    Model,
    Lora,
}

/// Body of a download request for a Hugging Face repository
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadRequest {
    pub repo_id: String,
    pub revision: String,
    pub repo_type: RepoType,
    pub folder_name: String,
    pub token: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Split a comma-separated pattern list, dropping blanks
pub fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Serialize)]
pub(crate) struct LoraLoad<'a> {
    pub name: &'a str,
    pub scaling: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoraLoadRequest<'a> {
    pub loras: Vec<LoraLoad<'a>>,
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|err| Error::upstream(endpoint, format!("malformed response body: {err}")))
}

pub(crate) fn parse_id_list(endpoint: &str, body: &str) -> Result<Vec<String>> {
    let response: IdListResponse = decode(endpoint, body)?;
    Ok(response.data.into_iter().map(|entry| entry.id).collect())
}

pub(crate) fn parse_string_list(endpoint: &str, body: &str) -> Result<Vec<String>> {
    let response: StringListResponse = decode(endpoint, body)?;
    Ok(response.data)
}

pub(crate) fn parse_override_list(endpoint: &str, body: &str) -> Result<Vec<String>> {
    let response: OverrideListResponse = decode(endpoint, body)?;
    Ok(response.presets)
}

/// `None` when the server reports no loaded model (empty id)
pub(crate) fn parse_current_model(endpoint: &str, body: &str) -> Result<Option<CurrentModel>> {
    let response: CurrentModelResponse = decode(endpoint, body)?;
    if response.id.is_empty() {
        return Ok(None);
    }

    let params = response.parameters;
    let draft = params
        .draft
        .filter(|draft| !draft.id.is_empty())
        .map(|draft| DraftInfo {
            id: draft.id,
            rope_scale: draft.parameters.rope_scale.unwrap_or_default(),
            rope_alpha: draft.parameters.rope_alpha.unwrap_or_default(),
        });

    Ok(Some(CurrentModel {
        id: response.id,
        max_seq_len: params.max_seq_len.unwrap_or_default(),
        cache_size: params.cache_size.unwrap_or_default(),
        rope_scale: params.rope_scale.unwrap_or_default(),
        rope_alpha: params.rope_alpha.unwrap_or_default(),
        draft,
    }))
}

pub(crate) fn parse_loras(endpoint: &str, body: &str) -> Result<Vec<LoadedLora>> {
    let response: LoraListResponse = decode(endpoint, body)?;
    Ok(response
        .data
        .into_iter()
        .map(|entry| LoadedLora {
            id: entry.id,
            scaling: entry.scaling,
        })
        .collect())
}

pub(crate) fn parse_download_path(endpoint: &str, body: &str) -> Result<String> {
    let response: DownloadResponse = decode(endpoint, body)?;
    Ok(response.download_path)
}
