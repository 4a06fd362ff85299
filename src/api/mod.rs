//! Client for the model-serving admin API.
//!
//! Every call is a blocking HTTP round-trip. Callers that must stay responsive
//! run them on a worker thread (see `connection`).

pub mod types;

use reqwest::Method;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{defaults, endpoints};
use crate::error::{Error, Result};
use crate::fields::LoadRequest;

pub use types::{CurrentModel, DownloadRequest, DraftInfo, LoadedLora, RepoType, split_patterns};
use types::{LoraLoad, LoraLoadRequest};

/// Longest response excerpt kept in an error message
const ERROR_BODY_LIMIT: usize = 200;

/// Operations the application needs from the model server
pub trait ModelGateway {
    fn models(&self) -> Result<Vec<String>>;
    fn draft_models(&self) -> Result<Vec<String>>;
    fn loras(&self) -> Result<Vec<String>>;
    fn templates(&self) -> Result<Vec<String>>;
    fn sampler_overrides(&self) -> Result<Vec<String>>;

    /// `None` when no model is loaded
    fn current_model(&self) -> Result<Option<CurrentModel>>;
    fn current_loras(&self) -> Result<Vec<LoadedLora>>;

    fn load_model(&self, model: &str, request: &LoadRequest) -> Result<()>;
    fn unload_model(&self) -> Result<()>;

    /// `names` and `scalings` are paired by index and must have equal length
    fn load_loras(&self, names: &[String], scalings: &[f64]) -> Result<()>;
    fn unload_loras(&self) -> Result<()>;

    fn switch_template(&self, name: &str) -> Result<()>;
    fn unload_template(&self) -> Result<()>;
    fn save_template(&self, name: &str, content: &str) -> Result<()>;

    fn switch_sampler_override(&self, preset: &str) -> Result<()>;
    fn unload_sampler_override(&self) -> Result<()>;

    /// Returns the server-side download path
    fn download(&self, request: &DownloadRequest) -> Result<String>;
    fn cancel_download(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    admin_key: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, admin_key: &str) -> Result<Self> {
        Self::with_timeout(
            base_url,
            admin_key,
            Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(base_url: &str, admin_key: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::upstream(base_url, format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_key: admin_key.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Send one request and return the body of a 2xx response
    fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<String> {
        debug!(%method, endpoint, "Sending API request");

        let mut request = self
            .http
            .request(method, self.url(endpoint))
            .header(endpoints::API_KEY_HEADER, &self.admin_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().map_err(|err| Error::upstream(endpoint, err))?;
        let status = response.status();
        let text = response.text().map_err(|err| Error::upstream(endpoint, err))?;

        if !status.is_success() {
            warn!(endpoint, status = %status, "API request rejected");
            let excerpt: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(Error::upstream(
                endpoint,
                format!("unexpected status {status}: {excerpt}"),
            ));
        }
        Ok(text)
    }

    fn get(&self, endpoint: &str) -> Result<String> {
        self.send::<()>(Method::GET, endpoint, None)
    }

    fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<String> {
        self.send(Method::POST, endpoint, Some(body))
    }

    fn post_empty(&self, endpoint: &str) -> Result<String> {
        self.send::<()>(Method::POST, endpoint, None)
    }
}

impl ModelGateway for ApiClient {
    fn models(&self) -> Result<Vec<String>> {
        let body = self.get(endpoints::MODEL_LIST)?;
        types::parse_id_list(endpoints::MODEL_LIST, &body)
    }

    fn draft_models(&self) -> Result<Vec<String>> {
        let body = self.get(endpoints::DRAFT_MODEL_LIST)?;
        types::parse_id_list(endpoints::DRAFT_MODEL_LIST, &body)
    }

    fn loras(&self) -> Result<Vec<String>> {
        let body = self.get(endpoints::LORA_LIST)?;
        types::parse_id_list(endpoints::LORA_LIST, &body)
    }

    fn templates(&self) -> Result<Vec<String>> {
        let body = self.get(endpoints::TEMPLATE_LIST)?;
        types::parse_string_list(endpoints::TEMPLATE_LIST, &body)
    }

    fn sampler_overrides(&self) -> Result<Vec<String>> {
        let body = self.get(endpoints::OVERRIDE_LIST)?;
        types::parse_override_list(endpoints::OVERRIDE_LIST, &body)
    }

    fn current_model(&self) -> Result<Option<CurrentModel>> {
        let body = self.get(endpoints::MODEL_CURRENT)?;
        types::parse_current_model(endpoints::MODEL_CURRENT, &body)
    }

    fn current_loras(&self) -> Result<Vec<LoadedLora>> {
        let body = self.get(endpoints::LORA_CURRENT)?;
        types::parse_loras(endpoints::LORA_CURRENT, &body)
    }

    fn load_model(&self, model: &str, request: &LoadRequest) -> Result<()> {
        self.post(endpoints::MODEL_LOAD, &request.to_body(model))?;
        info!(model, "Model loaded");
        Ok(())
    }

    fn unload_model(&self) -> Result<()> {
        self.post_empty(endpoints::MODEL_UNLOAD)?;
        info!("Model unloaded");
        Ok(())
    }

    fn load_loras(&self, names: &[String], scalings: &[f64]) -> Result<()> {
        if names.len() != scalings.len() {
            return Err(Error::Validation(format!(
                "{} LoRA names but {} scalings",
                names.len(),
                scalings.len()
            )));
        }

        let request = LoraLoadRequest {
            loras: names
                .iter()
                .zip(scalings)
                .map(|(name, &scaling)| LoraLoad { name, scaling })
                .collect(),
        };
        self.post(endpoints::LORA_LOAD, &request)?;
        info!(count = names.len(), "LoRAs loaded");
        Ok(())
    }

    fn unload_loras(&self) -> Result<()> {
        self.post_empty(endpoints::LORA_UNLOAD)?;
        info!("LoRAs unloaded");
        Ok(())
    }

    fn switch_template(&self, name: &str) -> Result<()> {
        self.post(endpoints::TEMPLATE_SWITCH, &json!({ "name": name }))?;
        info!(template = name, "Prompt template switched");
        Ok(())
    }

    fn unload_template(&self) -> Result<()> {
        self.post_empty(endpoints::TEMPLATE_UNLOAD)?;
        Ok(())
    }

    fn save_template(&self, name: &str, content: &str) -> Result<()> {
        self.post(
            endpoints::TEMPLATE_SAVE,
            &json!({ "name": name, "content": content }),
        )?;
        info!(template = name, "Prompt template saved on server");
        Ok(())
    }

    fn switch_sampler_override(&self, preset: &str) -> Result<()> {
        self.post(endpoints::OVERRIDE_SWITCH, &json!({ "preset": preset }))?;
        info!(preset, "Sampler override switched");
        Ok(())
    }

    fn unload_sampler_override(&self) -> Result<()> {
        self.post_empty(endpoints::OVERRIDE_UNLOAD)?;
        Ok(())
    }

    fn download(&self, request: &DownloadRequest) -> Result<String> {
        let body = self.post(endpoints::DOWNLOAD, request)?;
        let path = types::parse_download_path(endpoints::DOWNLOAD, &body)?;
        info!(repo = %request.repo_id, path = %path, "Download finished");
        Ok(path)
    }

    fn cancel_download(&self) -> Result<()> {
        self.post_empty(endpoints::DOWNLOAD_CANCEL)?;
        info!("Download cancelled");
        Ok(())
    }
}
