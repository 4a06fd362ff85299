//! Editing state behind the load form: selected model plus field values.

use tracing::info;

use crate::api::ModelGateway;
use crate::config::{ModelParams, Preset};
use crate::error::{Error, Result};
use crate::fields::{FieldState, LoadRequest};

#[derive(Debug, Clone, Default)]
pub struct EditSession {
    pub model: Option<String>,
    pub fields: FieldState,
}

impl EditSession {
    /// Fresh session seeded from the default parameters in the settings
    pub fn blank(defaults: &ModelParams) -> Self {
        Self {
            model: None,
            fields: FieldState::from_params(defaults),
        }
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into()).filter(|m: &String| !m.is_empty());
    }

    /// Replace every field with the preset's values; the model selection stays
    pub fn apply_preset(&mut self, preset: &Preset) {
        self.fields = FieldState::from_params(&preset.params);
        info!(preset = %preset.name, "Applied preset");
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn snapshot(&self, name: impl Into<String>) -> Preset {
        self.fields.to_preset(name)
    }

    pub fn request(&self) -> LoadRequest {
        self.fields.to_request()
    }

    pub fn load_model(&self, gateway: &dyn ModelGateway) -> Result<()> {
        let model = self
            .model
            .as_deref()
            .ok_or_else(|| Error::Validation("no model selected".to_string()))?;

        gateway.load_model(model, &self.request())
    }
}
