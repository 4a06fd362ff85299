//! Server endpoint shared between the CLI and the background connect worker.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use tracing::{error, info, warn};

use crate::api::{ApiClient, CurrentModel, ModelGateway};
use crate::error::{Error, Result};

/// Base URL and admin key of a model server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub admin_key: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, admin_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_key: admin_key.into(),
        }
    }

    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.base_url, &self.admin_key)
    }
}

/// Endpoint swapped atomically on reconnect; readers take a copy
#[derive(Debug, Clone, Default)]
pub struct SharedEndpoint(Arc<Mutex<Endpoint>>);

impl SharedEndpoint {
    pub fn new(endpoint: Endpoint) -> Self {
        Self(Arc::new(Mutex::new(endpoint)))
    }

    fn lock(&self) -> MutexGuard<'_, Endpoint> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> Endpoint {
        self.lock().clone()
    }

    pub fn replace(&self, endpoint: Endpoint) -> Endpoint {
        std::mem::replace(&mut *self.lock(), endpoint)
    }

    /// Client for the endpoint as it is right now
    pub fn client(&self) -> Result<ApiClient> {
        self.get().client()
    }
}

/// What the server reported right after connecting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerSnapshot {
    pub models: Vec<String>,
    pub loras: Vec<String>,
    pub current_model: Option<CurrentModel>,
}

#[derive(Debug)]
pub enum ConnectOutcome {
    Connected { url: String, snapshot: ServerSnapshot },
    Failed { url: String, error: Error },
}

/// Model and LoRA lists are required; the current model is best effort
pub fn fetch_snapshot(gateway: &dyn ModelGateway) -> Result<ServerSnapshot> {
    let models = gateway.models()?;
    let loras = gateway.loras()?;
    let current_model = match gateway.current_model() {
        Ok(current) => current,
        Err(e) => {
            warn!(error = %e, "Could not fetch current model");
            None
        }
    };

    Ok(ServerSnapshot {
        models,
        loras,
        current_model,
    })
}

/// Point the shared endpoint at `url` and query the server on a worker thread.
///
/// Exactly one `ConnectOutcome` is sent. Persisting the server on success is
/// left to the receiver.
pub fn spawn_connect(
    shared: SharedEndpoint,
    url: &str,
    admin_key: &str,
    sender: Sender<ConnectOutcome>,
) -> thread::JoinHandle<()> {
    let endpoint = Endpoint::new(url, admin_key);

    thread::spawn(move || {
        let url = endpoint.base_url.clone();
        shared.replace(endpoint);
        info!(url = %url, "Connecting to server");

        let outcome = match shared.client().and_then(|client| fetch_snapshot(&client)) {
            Ok(snapshot) => {
                info!(
                    url = %url,
                    models = snapshot.models.len(),
                    loras = snapshot.loras.len(),
                    "Connected to server"
                );
                ConnectOutcome::Connected { url, snapshot }
            }
            Err(error) => {
                error!(url = %url, error = %error, "Connection failed");
                ConnectOutcome::Failed { url, error }
            }
        };

        if sender.send(outcome).is_err() {
            warn!("Connect outcome dropped: receiver gone");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::endpoints;
    use std::net::TcpListener;
    use std::sync::mpsc;

    #[test]
    fn test_shared_endpoint_replace() {
        let shared = SharedEndpoint::new(Endpoint::new("http://old:5000", "k1"));
        let previous = shared.replace(Endpoint::new("http://new:5000/", "k2"));

        assert_eq!(previous.base_url, "http://old:5000");
        assert_eq!(shared.get(), Endpoint::new("http://new:5000", "k2"));
        assert_eq!(shared.get().base_url, "http://new:5000");
    }

    #[test]
    fn test_connect_success_tolerates_missing_current_model() {
        let mut server = mockito::Server::new();
        let models = server
            .mock("GET", endpoints::MODEL_LIST)
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"a"},{"id":"b"}]}"#)
            .create();
        let loras = server
            .mock("GET", endpoints::LORA_LIST)
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"style"}]}"#)
            .create();
        // Nothing mocked for the current model, so that request fails
        let url = server.url();
        let shared = SharedEndpoint::default();
        let (tx, rx) = mpsc::channel();

        spawn_connect(shared.clone(), &url, "secret", tx).join().unwrap();

        match rx.recv().unwrap() {
            ConnectOutcome::Connected { url: connected, snapshot } => {
                assert_eq!(connected, url);
                assert_eq!(snapshot.models, vec!["a", "b"]);
                assert_eq!(snapshot.loras, vec!["style"]);
                assert_eq!(snapshot.current_model, None);
            }
            ConnectOutcome::Failed { error, .. } => panic!("connect failed: {error}"),
        }
        assert_eq!(shared.get().admin_key, "secret");
        models.assert();
        loras.assert();
    }

    #[test]
    fn test_connect_failure_reports_upstream() {
        // Bind then drop to get a local port with nothing listening
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{port}");
        let shared = SharedEndpoint::default();
        let (tx, rx) = mpsc::channel();

        spawn_connect(shared.clone(), &url, "", tx).join().unwrap();

        match rx.recv().unwrap() {
            ConnectOutcome::Failed { url: failed, error } => {
                assert_eq!(failed, url);
                assert!(matches!(error, Error::Upstream { .. }));
            }
            ConnectOutcome::Connected { .. } => panic!("expected failure"),
        }
        assert_eq!(shared.get().base_url, url);
    }
}
