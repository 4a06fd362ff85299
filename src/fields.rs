//! Dense, editable view of a preset and the load request built from it.
//!
//! Each optional parameter is edited as a text value paired with an
//! "explicitly set" flag. Only flagged fields ever reach the server: sending an
//! unintended default would silently override the server's own choice.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::config::{CacheMode, ModelParams, Preset};
use crate::error::{Error, Result};

/// Optional parameters that carry an explicit-set flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    MaxSeqLen,
    OverrideBaseSeqLen,
    CacheSize,
    GpuSplit,
    RopeScale,
    RopeAlpha,
    CacheMode,
    PromptTemplate,
    NumExpertsPerToken,
    DraftModelName,
    DraftRopeScale,
    DraftRopeAlpha,
    DraftCacheMode,
    AutosplitReserve,
    ChunkSize,
}

const FIELD_COUNT: usize = 15;

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::MaxSeqLen,
        Field::OverrideBaseSeqLen,
        Field::CacheSize,
        Field::GpuSplit,
        Field::RopeScale,
        Field::RopeAlpha,
        Field::CacheMode,
        Field::PromptTemplate,
        Field::NumExpertsPerToken,
        Field::DraftModelName,
        Field::DraftRopeScale,
        Field::DraftRopeAlpha,
        Field::DraftCacheMode,
        Field::AutosplitReserve,
        Field::ChunkSize,
    ];

    /// Key used in the presets document and the load request
    pub fn key(self) -> &'static str {
        match self {
            Field::MaxSeqLen => "max_seq_len",
            Field::OverrideBaseSeqLen => "override_base_seq_len",
            Field::CacheSize => "cache_size",
            Field::GpuSplit => "gpu_split",
            Field::RopeScale => "rope_scale",
            Field::RopeAlpha => "rope_alpha",
            Field::CacheMode => "cache_mode",
            Field::PromptTemplate => "prompt_template",
            Field::NumExpertsPerToken => "num_experts_per_token",
            Field::DraftModelName => "draft_model_name",
            Field::DraftRopeScale => "draft_rope_scale",
            Field::DraftRopeAlpha => "draft_rope_alpha",
            Field::DraftCacheMode => "draft_cache_mode",
            Field::AutosplitReserve => "autosplit_reserve",
            Field::ChunkSize => "chunk_size",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::MaxSeqLen => "Max Sequence Length",
            Field::OverrideBaseSeqLen => "Override Base Seq Length",
            Field::CacheSize => "Cache Size",
            Field::GpuSplit => "GPU Split",
            Field::RopeScale => "Rope Scale",
            Field::RopeAlpha => "Rope Alpha",
            Field::CacheMode => "Cache Mode",
            Field::PromptTemplate => "Prompt Template",
            Field::NumExpertsPerToken => "Num Experts Per Token",
            Field::DraftModelName => "Draft Model Name",
            Field::DraftRopeScale => "Draft Rope Scale",
            Field::DraftRopeAlpha => "Draft Rope Alpha",
            Field::DraftCacheMode => "Draft Cache Mode",
            Field::AutosplitReserve => "Autosplit Reserve",
            Field::ChunkSize => "Chunk Size",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Set of fields the user explicitly opted into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplicitFlags(u16);

impl ExplicitFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Field::ALL.into_iter().collect()
    }

    pub fn contains(self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn insert(&mut self, field: Field) {
        self.0 |= field.bit();
    }

    pub fn remove(&mut self, field: Field) {
        self.0 &= !field.bit();
    }

    pub fn set(&mut self, field: Field, enabled: bool) {
        if enabled {
            self.insert(field);
        } else {
            self.remove(field);
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl FromIterator<Field> for ExplicitFlags {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut flags = ExplicitFlags::empty();
        for field in iter {
            flags.insert(field);
        }
        flags
    }
}

/// Nested draft-model section of a load request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftRequest {
    pub draft_model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_rope_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_rope_alpha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_cache_mode: Option<CacheMode>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Fully resolved model-load parameters; only explicitly set fields serialize
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_seq_len: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_base_seq_len: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    pub gpu_split_auto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_split: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rope_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rope_alpha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_mode: Option<CacheMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_experts_per_token: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    pub fasttensors: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autosplit_reserve: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<DraftRequest>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

impl LoadRequest {
    /// Direct sparse-to-request mapping, without the text editing step
    pub fn from_params(params: &ModelParams) -> Self {
        let draft = non_empty(&params.draft_model_name).map(|name| DraftRequest {
            draft_model_name: name,
            draft_rope_scale: params.draft_rope_scale,
            draft_rope_alpha: params.draft_rope_alpha,
            draft_cache_mode: params.draft_cache_mode,
        });

        Self {
            max_seq_len: params.max_seq_len,
            override_base_seq_len: params.override_base_seq_len,
            cache_size: params.cache_size,
            gpu_split_auto: params.gpu_split_auto,
            gpu_split: if params.gpu_split_auto {
                None
            } else {
                non_empty(&params.gpu_split)
            },
            rope_scale: params.rope_scale,
            rope_alpha: params.rope_alpha,
            cache_mode: params.cache_mode,
            prompt_template: non_empty(&params.prompt_template),
            num_experts_per_token: params.num_experts_per_token,
            fasttensors: params.fasttensors,
            autosplit_reserve: non_empty(&params.autosplit_reserve),
            chunk_size: params.chunk_size,
            draft,
        }
    }

    /// Body for the load endpoint: the request with the model name added
    pub fn to_body<'a>(&'a self, model: &'a str) -> LoadBody<'a> {
        LoadBody {
            name: model,
            request: self,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoadBody<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub request: &'a LoadRequest,
}

/// Editable state of every parameter: text plus explicit-set flag per field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldState {
    texts: [String; FIELD_COUNT],
    flags: ExplicitFlags,
    /// Strings loaded as `""`: unflagged, but saved back as `""` until edited
    present_empty: ExplicitFlags,
    pub gpu_split_auto: bool,
    pub fasttensors: bool,
}

impl FieldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project a sparse parameter set into editable fields.
    ///
    /// A field is flagged iff its value is present (and non-empty for strings).
    pub fn from_params(params: &ModelParams) -> Self {
        let mut state = FieldState {
            gpu_split_auto: params.gpu_split_auto,
            fasttensors: params.fasttensors,
            ..FieldState::default()
        };

        state.put(Field::MaxSeqLen, params.max_seq_len);
        state.put(Field::OverrideBaseSeqLen, params.override_base_seq_len);
        state.put(Field::CacheSize, params.cache_size);
        state.put_str(Field::GpuSplit, &params.gpu_split);
        state.put(Field::RopeScale, params.rope_scale);
        state.put(Field::RopeAlpha, params.rope_alpha);
        state.put(Field::CacheMode, params.cache_mode);
        state.put_str(Field::PromptTemplate, &params.prompt_template);
        state.put(Field::NumExpertsPerToken, params.num_experts_per_token);
        state.put_str(Field::DraftModelName, &params.draft_model_name);
        state.put(Field::DraftRopeScale, params.draft_rope_scale);
        state.put(Field::DraftRopeAlpha, params.draft_rope_alpha);
        state.put(Field::DraftCacheMode, params.draft_cache_mode);
        state.put_str(Field::AutosplitReserve, &params.autosplit_reserve);
        state.put(Field::ChunkSize, params.chunk_size);
        state
    }

    fn put<T: ToString>(&mut self, field: Field, value: Option<T>) {
        match value {
            Some(value) => self.set(field, value.to_string()),
            None => self.disable(field),
        }
    }

    fn put_str(&mut self, field: Field, value: &Option<String>) {
        match value.as_deref() {
            Some("") => {
                self.disable(field);
                self.present_empty.insert(field);
            }
            Some(text) => self.set(field, text),
            None => self.disable(field),
        }
    }

    pub fn text(&self, field: Field) -> &str {
        &self.texts[field as usize]
    }

    pub fn is_enabled(&self, field: Field) -> bool {
        self.flags.contains(field)
    }

    pub fn flags(&self) -> ExplicitFlags {
        self.flags
    }

    /// Flag the field and set its text, as a user ticking the box and typing
    pub fn set(&mut self, field: Field, text: impl Into<String>) {
        self.flags.insert(field);
        self.present_empty.remove(field);
        self.texts[field as usize] = text.into();
    }

    /// Flag the field without touching its text (may leave it present-empty)
    pub fn enable(&mut self, field: Field) {
        self.flags.insert(field);
        self.present_empty.remove(field);
    }

    /// Unflag the field; the text is cleared with it
    pub fn disable(&mut self, field: Field) {
        self.flags.remove(field);
        self.present_empty.remove(field);
        self.texts[field as usize].clear();
    }

    /// Replace the flags wholesale; text of unflagged fields is kept
    pub fn with_flags(mut self, flags: ExplicitFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn clear(&mut self) {
        *self = FieldState::default();
    }

    /// Apply a `key=value` assignment from the command line.
    ///
    /// Flagged fields are set as typed; `gpu_split_auto` and `fasttensors`
    /// take a boolean.
    pub fn assign(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            Error::Validation(format!("expected key=value, got '{assignment}'"))
        })?;
        let key = key.trim();

        let parse_bool = |value: &str| {
            value.trim().parse::<bool>().map_err(|_| {
                Error::Validation(format!("{key} expects true or false, got '{value}'"))
            })
        };

        match key {
            "gpu_split_auto" => self.gpu_split_auto = parse_bool(value)?,
            "fasttensors" => self.fasttensors = parse_bool(value)?,
            _ => {
                let field = Field::from_key(key)
                    .ok_or_else(|| Error::Validation(format!("unknown parameter '{key}'")))?;
                self.set(field, value.trim());
            }
        }
        Ok(())
    }

    /// Fields in display order with their flag and text
    pub fn entries(&self) -> impl Iterator<Item = (Field, bool, &str)> {
        Field::ALL
            .into_iter()
            .map(move |f| (f, self.is_enabled(f), self.text(f)))
    }

    /// Flagged value parsed from text. Unflagged, empty or unparsable → None.
    fn parsed<T>(&self, field: Field) -> Option<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if !self.is_enabled(field) {
            return None;
        }
        let text = self.text(field).trim();
        if text.is_empty() {
            return None;
        }
        match text.parse::<T>() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(field = %field, value = %text, error = %err, "Ignoring unparsable field value");
                None
            }
        }
    }

    /// Flagged string value, including the present-empty case
    fn string(&self, field: Field) -> Option<String> {
        self.is_enabled(field).then(|| self.text(field).to_string())
    }

    /// Flagged string, or `""` for a present-empty value left untouched
    fn saved_string(&self, field: Field) -> Option<String> {
        self.string(field)
            .or_else(|| self.present_empty.contains(field).then(String::new))
    }

    fn non_empty_string(&self, field: Field) -> Option<String> {
        self.string(field).filter(|s| !s.is_empty())
    }

    /// Resolved request containing only explicitly flagged, valid fields
    pub fn to_request(&self) -> LoadRequest {
        let draft = self
            .non_empty_string(Field::DraftModelName)
            .map(|name| DraftRequest {
                draft_model_name: name,
                draft_rope_scale: self.parsed(Field::DraftRopeScale),
                draft_rope_alpha: self.parsed(Field::DraftRopeAlpha),
                draft_cache_mode: self.parsed(Field::DraftCacheMode),
            });

        LoadRequest {
            max_seq_len: self.parsed(Field::MaxSeqLen),
            override_base_seq_len: self.parsed(Field::OverrideBaseSeqLen),
            cache_size: self.parsed(Field::CacheSize),
            gpu_split_auto: self.gpu_split_auto,
            gpu_split: if self.gpu_split_auto {
                None
            } else {
                self.non_empty_string(Field::GpuSplit)
            },
            rope_scale: self.parsed(Field::RopeScale),
            rope_alpha: self.parsed(Field::RopeAlpha),
            cache_mode: self.parsed(Field::CacheMode),
            prompt_template: self.non_empty_string(Field::PromptTemplate),
            num_experts_per_token: self.parsed(Field::NumExpertsPerToken),
            fasttensors: self.fasttensors,
            autosplit_reserve: self.non_empty_string(Field::AutosplitReserve),
            chunk_size: self.parsed(Field::ChunkSize),
            draft,
        }
    }

    /// Sparse parameter set for saving. Flagged or loaded-empty strings keep `""`.
    pub fn to_params(&self) -> ModelParams {
        ModelParams {
            max_seq_len: self.parsed(Field::MaxSeqLen),
            override_base_seq_len: self.parsed(Field::OverrideBaseSeqLen),
            cache_size: self.parsed(Field::CacheSize),
            gpu_split_auto: self.gpu_split_auto,
            gpu_split: self.saved_string(Field::GpuSplit),
            rope_scale: self.parsed(Field::RopeScale),
            rope_alpha: self.parsed(Field::RopeAlpha),
            cache_mode: self.parsed(Field::CacheMode),
            prompt_template: self.saved_string(Field::PromptTemplate),
            num_experts_per_token: self.parsed(Field::NumExpertsPerToken),
            draft_model_name: self.saved_string(Field::DraftModelName),
            draft_rope_scale: self.parsed(Field::DraftRopeScale),
            draft_rope_alpha: self.parsed(Field::DraftRopeAlpha),
            draft_cache_mode: self.parsed(Field::DraftCacheMode),
            fasttensors: self.fasttensors,
            autosplit_reserve: self.saved_string(Field::AutosplitReserve),
            chunk_size: self.parsed(Field::ChunkSize),
        }
    }

    pub fn to_preset(&self, name: impl Into<String>) -> Preset {
        Preset::with_params(name, self.to_params())
    }
}

/// Editable fields for a preset
pub fn project_to_fields(preset: &Preset) -> FieldState {
    FieldState::from_params(&preset.params)
}

/// Request for a preset with the caller's explicit flags deciding what is sent
pub fn project_to_request(preset: &Preset, flags: ExplicitFlags) -> LoadRequest {
    project_to_fields(preset).with_flags(flags).to_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_keys(request: &LoadRequest) -> Vec<String> {
        let value = serde_json::to_value(request).unwrap();
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_field_keys_roundtrip() {
        for field in Field::ALL {
            assert_eq!(Field::from_key(field.key()), Some(field));
        }
        assert_eq!(Field::from_key("name"), None);
    }

    #[test]
    fn test_flags_set_and_iter() {
        let mut flags = ExplicitFlags::empty();
        assert!(flags.is_empty());
        flags.insert(Field::ChunkSize);
        flags.set(Field::MaxSeqLen, true);
        flags.set(Field::ChunkSize, false);

        assert_eq!(flags.iter().collect::<Vec<_>>(), vec![Field::MaxSeqLen]);
        assert_eq!(ExplicitFlags::all().iter().count(), Field::ALL.len());
    }

    #[test]
    fn test_projection_flags_only_present_values() {
        let preset = Preset::with_params(
            "p",
            ModelParams {
                max_seq_len: Some(4096),
                rope_scale: Some(1.0),
                gpu_split: Some(String::new()),
                cache_mode: Some(CacheMode::Q6),
                ..ModelParams::default()
            },
        );

        let fields = project_to_fields(&preset);
        assert!(fields.is_enabled(Field::MaxSeqLen));
        assert_eq!(fields.text(Field::MaxSeqLen), "4096");
        assert_eq!(fields.text(Field::RopeScale), "1");
        assert_eq!(fields.text(Field::CacheMode), "Q6");
        // Present-empty string is not flagged for editing
        assert!(!fields.is_enabled(Field::GpuSplit));
        assert_eq!(fields.text(Field::GpuSplit), "");
        assert!(!fields.is_enabled(Field::ChunkSize));
    }

    #[test]
    fn test_request_only_contains_flagged_fields() {
        let mut fields = FieldState::new();
        fields.set(Field::CacheSize, "8192");
        fields.set(Field::CacheMode, "Q8");

        // Text without the flag is never sent
        fields.texts[Field::RopeAlpha as usize] = "2.0".into();

        let request = fields.to_request();
        assert_eq!(request_keys(&request), vec!["cache_mode", "cache_size"]);
        assert_eq!(request.cache_size, Some(8192));
    }

    #[test]
    fn test_max_seq_len_parse_failure_skipped_not_zero() {
        let mut fields = FieldState::new();
        fields.set(Field::MaxSeqLen, "4k");
        fields.set(Field::CacheSize, "lots");
        fields.set(Field::RopeScale, "");

        let request = fields.to_request();
        assert_eq!(request.max_seq_len, None);
        assert_eq!(request.cache_size, None);
        assert_eq!(request.rope_scale, None);
        assert!(request_keys(&request).is_empty());
    }

    #[test]
    fn test_gpu_split_auto_suppresses_gpu_split() {
        let preset = Preset::with_params(
            "split",
            ModelParams {
                gpu_split_auto: true,
                gpu_split: Some("0.5,0.5".into()),
                ..ModelParams::default()
            },
        );

        let request = project_to_request(&preset, ExplicitFlags::all());
        assert!(request.gpu_split_auto);
        assert_eq!(request.gpu_split, None);

        let body = serde_json::to_value(request.to_body("model")).unwrap();
        assert!(body.get("gpu_split").is_none());
        assert_eq!(body["gpu_split_auto"], true);
    }

    #[test]
    fn test_gpu_split_sent_when_auto_off() {
        let mut fields = FieldState::new();
        fields.set(Field::GpuSplit, "0.7,0.3");

        let request = fields.to_request();
        assert_eq!(request.gpu_split.as_deref(), Some("0.7,0.3"));
        assert_eq!(request_keys(&request), vec!["gpu_split"]);
    }

    #[test]
    fn test_draft_requires_model_name() {
        let mut fields = FieldState::new();
        fields.set(Field::DraftRopeScale, "1.5");
        fields.set(Field::DraftCacheMode, "Q4");
        assert_eq!(fields.to_request().draft, None);

        fields.enable(Field::DraftModelName);
        assert_eq!(fields.to_request().draft, None);

        fields.set(Field::DraftModelName, "tiny");
        let draft = fields.to_request().draft.unwrap();
        assert_eq!(draft.draft_model_name, "tiny");
        assert_eq!(draft.draft_rope_scale, Some(1.5));
        assert_eq!(draft.draft_rope_alpha, None);
        assert_eq!(draft.draft_cache_mode, Some(CacheMode::Q4));
    }

    #[test]
    fn test_draft_fields_gated_independently() {
        let preset = Preset::with_params(
            "d",
            ModelParams {
                draft_model_name: Some("tiny".into()),
                draft_rope_scale: Some(2.0),
                draft_rope_alpha: Some(3.0),
                ..ModelParams::default()
            },
        );

        let flags: ExplicitFlags = [Field::DraftModelName, Field::DraftRopeAlpha].into_iter().collect();
        let draft = project_to_request(&preset, flags).draft.unwrap();
        assert_eq!(draft.draft_rope_scale, None);
        assert_eq!(draft.draft_rope_alpha, Some(3.0));
    }

    #[test]
    fn test_body_nests_draft_and_adds_name() {
        let mut fields = FieldState::new();
        fields.fasttensors = true;
        fields.set(Field::DraftModelName, "tiny");
        fields.set(Field::MaxSeqLen, "2048");

        let request = fields.to_request();
        let body = serde_json::to_value(request.to_body("big-model")).unwrap();
        assert_eq!(body["name"], "big-model");
        assert_eq!(body["max_seq_len"], 2048);
        assert_eq!(body["fasttensors"], true);
        assert_eq!(body["draft"]["draft_model_name"], "tiny");
        assert!(body.get("draft_model_name").is_none());
        assert!(body.get("gpu_split_auto").is_none());
    }

    #[test]
    fn test_assign_from_command_line() {
        let mut fields = FieldState::new();
        fields.assign("max_seq_len=8192").unwrap();
        fields.assign("cache_mode = q6").unwrap();
        fields.assign("gpu_split_auto=true").unwrap();

        assert_eq!(fields.text(Field::MaxSeqLen), "8192");
        assert!(fields.gpu_split_auto);
        assert_eq!(fields.to_request().cache_mode, Some(CacheMode::Q6));

        assert!(matches!(fields.assign("name=x"), Err(Error::Validation(_))));
        assert!(matches!(fields.assign("fasttensors=yes"), Err(Error::Validation(_))));
        assert!(matches!(fields.assign("chunk_size"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_disable_clears_text() {
        let mut fields = FieldState::new();
        fields.set(Field::ChunkSize, "512");
        fields.disable(Field::ChunkSize);
        assert!(!fields.is_enabled(Field::ChunkSize));
        assert_eq!(fields.text(Field::ChunkSize), "");
    }

    #[test]
    fn test_to_params_keeps_present_empty_strings() {
        let mut fields = FieldState::new();
        fields.enable(Field::AutosplitReserve);
        fields.enable(Field::MaxSeqLen);

        let params = fields.to_params();
        assert_eq!(params.autosplit_reserve.as_deref(), Some(""));
        // A number cannot be present-empty
        assert_eq!(params.max_seq_len, None);
        assert_eq!(fields.to_request().autosplit_reserve, None);
    }

    #[test]
    fn test_fields_to_preset_roundtrip() {
        let params = ModelParams {
            max_seq_len: Some(32768),
            rope_alpha: Some(2.75),
            cache_mode: Some(CacheMode::Fp16),
            prompt_template: Some("llama3".into()),
            draft_model_name: Some("tiny".into()),
            draft_rope_scale: Some(0.5),
            fasttensors: true,
            ..ModelParams::default()
        };

        let preset = FieldState::from_params(&params).to_preset("again");
        assert_eq!(preset.name, "again");
        assert_eq!(preset.params, params);
    }

    type Setter = fn(&mut ModelParams);

    /// One setter per preset attribute: all flagged fields plus both toggles
    fn setters() -> [Setter; 17] {
        [
            |p| p.max_seq_len = Some(4096),
            |p| p.override_base_seq_len = Some(8192),
            |p| p.cache_size = Some(0),
            |p| p.gpu_split_auto = true,
            |p| p.gpu_split = Some("0.5,0.5".into()),
            |p| p.rope_scale = Some(1.0),
            |p| p.rope_alpha = Some(2.625),
            |p| p.cache_mode = Some(CacheMode::Q4),
            |p| p.prompt_template = Some("chatml".into()),
            |p| p.num_experts_per_token = Some(2),
            |p| p.draft_model_name = Some("tiny".into()),
            |p| p.draft_rope_scale = Some(0.1),
            |p| p.draft_rope_alpha = Some(3.5),
            |p| p.draft_cache_mode = Some(CacheMode::Q8),
            |p| p.fasttensors = true,
            |p| p.autosplit_reserve = Some("96".into()),
            |p| p.chunk_size = Some(2048),
        ]
    }

    fn params_for(mask: u32) -> ModelParams {
        let mut params = ModelParams::default();
        for (bit, setter) in setters().iter().enumerate() {
            if mask & (1 << bit) != 0 {
                setter(&mut params);
            }
        }
        params
    }

    /// Every combination of set/unset attributes
    #[test]
    fn test_projection_roundtrip_law() {
        for mask in 0u32..(1 << setters().len()) {
            let preset = Preset::with_params("law", params_for(mask));
            let fields = project_to_fields(&preset);

            let via_fields = project_to_request(&preset, fields.flags());
            let direct = LoadRequest::from_params(&preset.params);
            assert_eq!(via_fields, direct, "mask {mask:#b}");
            assert_eq!(fields.to_params(), preset.params, "mask {mask:#b}");
        }
    }

    fn string_slot(params: &mut ModelParams, index: usize) -> &mut Option<String> {
        match index {
            0 => &mut params.gpu_split,
            1 => &mut params.prompt_template,
            2 => &mut params.draft_model_name,
            _ => &mut params.autosplit_reserve,
        }
    }

    /// Absent, empty and non-empty for every string attribute
    #[test]
    fn test_string_tristate_roundtrip() {
        const STRING_SLOTS: usize = 4;

        for combo in 0..3u32.pow(STRING_SLOTS as u32) {
            let mut params = params_for(0b1_0000_0000_0101);
            let mut rest = combo;
            for index in 0..STRING_SLOTS {
                *string_slot(&mut params, index) = match rest % 3 {
                    0 => None,
                    1 => Some(String::new()),
                    _ => Some("x".into()),
                };
                rest /= 3;
            }

            let preset = Preset::with_params("tri", params);
            let fields = project_to_fields(&preset);
            assert_eq!(
                project_to_request(&preset, fields.flags()),
                LoadRequest::from_params(&preset.params),
                "combo {combo}"
            );
            assert_eq!(fields.to_params(), preset.params, "combo {combo}");
        }
    }

    #[test]
    fn test_editing_present_empty_field_replaces_it() {
        let params = ModelParams {
            gpu_split: Some(String::new()),
            autosplit_reserve: Some(String::new()),
            ..ModelParams::default()
        };
        let mut fields = FieldState::from_params(&params);
        assert!(!fields.is_enabled(Field::GpuSplit));

        fields.set(Field::GpuSplit, "0.4,0.6");
        fields.disable(Field::AutosplitReserve);

        let saved = fields.to_params();
        assert_eq!(saved.gpu_split.as_deref(), Some("0.4,0.6"));
        assert_eq!(saved.autosplit_reserve, None);
    }
}
