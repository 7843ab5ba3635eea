//! State-store client surface.
//!
//! The agent consumes three operations against an etcd-style store: a key
//! read, a long-poll watch, and an ordered child append (used for events).
//! `StateStore` is the seam; `EtcdClient` implements it over the store's
//! HTTP API, and `FakeStateStore` is an in-memory double for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Store error code for a missing key. Semantically "nothing desired yet",
/// not a failure.
pub const CODE_KEY_NOT_FOUND: u64 = 100;

/// Request timeout for reads and writes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a single watch long-poll is allowed to hang.
const WATCH_TIMEOUT: Duration = Duration::from_secs(300);

/// A node in the store's key tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    pub key: String,
    pub value: Option<String>,
    pub modified_index: u64,
    pub created_index: u64,
}

/// A store response. `node` is absent on malformed or empty responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    pub action: String,
    pub node: Option<Node>,
}

/// Typed store errors. The key-not-found code must stay distinguishable
/// from real failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store error {code}: {message}")]
    Api { code: u64, message: String },
    #[error("store transport error: {0}")]
    Transport(String),
    #[error("unexpected store response: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn key_not_found(key: &str) -> Self {
        Self::Api {
            code: CODE_KEY_NOT_FOUND,
            message: format!("key not found: {key}"),
        }
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::Api { code, .. } if *code == CODE_KEY_NOT_FOUND)
    }
}

/// The store operations the agent consumes.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> Result<Response, StoreError>;

    /// Long-poll for the next change to a key, optionally from a known
    /// index onward.
    async fn watch(&self, key: &str, wait_index: Option<u64>) -> Result<Response, StoreError>;

    /// Append a value as a new child of `dir`; the store assigns the
    /// monotonic child index.
    async fn create_in_order(
        &self,
        dir: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<Response, StoreError>;
}

/// Error body returned by the store on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ErrorBody {
    error_code: u64,
    message: String,
}

/// HTTP client for the store's v2 key API.
pub struct EtcdClient {
    client: reqwest::Client,
    base_url: String,
}

impl EtcdClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/v2/keys{}", self.base_url, key)
    }

    async fn decode(response: reqwest::Response) -> Result<Response, StoreError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&body)
                .map_err(|e| StoreError::Protocol(e.to_string()));
        }

        match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(error) if error.error_code != 0 => Err(StoreError::Api {
                code: error.error_code,
                message: error.message,
            }),
            _ => Err(StoreError::Protocol(format!("status {status}"))),
        }
    }
}

#[async_trait]
impl StateStore for EtcdClient {
    async fn get(&self, key: &str) -> Result<Response, StoreError> {
        let url = self.key_url(key);
        debug!(url = %url, "Reading store key");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn watch(&self, key: &str, wait_index: Option<u64>) -> Result<Response, StoreError> {
        let url = self.key_url(key);
        let mut request = self
            .client
            .get(&url)
            .query(&[("wait", "true")])
            .timeout(WATCH_TIMEOUT);
        if let Some(index) = wait_index {
            request = request.query(&[("waitIndex", index.to_string())]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn create_in_order(
        &self,
        dir: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<Response, StoreError> {
        let url = self.key_url(dir);
        let mut form: Vec<(&str, String)> = vec![("value", value.to_string())];
        if let Some(ttl) = ttl_secs {
            form.push(("ttl", ttl.to_string()));
        }
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Self::decode(response).await
    }
}

/// In-memory store double for tests.
///
/// Keyed responses are handed back verbatim; ordered appends keep a child
/// index counter the way the real store does.
#[derive(Default)]
pub struct FakeStateStore {
    state: Mutex<FakeStoreState>,
}

#[derive(Default)]
struct FakeStoreState {
    data: HashMap<String, Result<Response, StoreError>>,
    error: Option<StoreError>,
    index: u64,
}

impl FakeStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeStoreState> {
        self.state.lock().expect("fake store state poisoned")
    }

    /// Set the response for a key.
    pub fn set_response(&self, key: &str, response: Response) {
        self.state().data.insert(key.to_string(), Ok(response));
    }

    /// Set an error for a key.
    pub fn set_key_error(&self, key: &str, error: StoreError) {
        self.state().data.insert(key.to_string(), Err(error));
    }

    /// Fail every operation with the given error.
    pub fn set_error(&self, error: StoreError) {
        self.state().error = Some(error);
    }

    /// How many ordered children have been appended.
    pub fn child_count(&self) -> u64 {
        self.state().index
    }

    /// Read back a key synchronously, for test assertions.
    pub fn stored(&self, key: &str) -> Option<Response> {
        match self.state().data.get(key) {
            Some(Ok(response)) => Some(response.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl StateStore for FakeStateStore {
    async fn get(&self, key: &str) -> Result<Response, StoreError> {
        let state = self.state();
        if let Some(error) = &state.error {
            return Err(error.clone());
        }
        match state.data.get(key) {
            Some(result) => result.clone(),
            None => Err(StoreError::key_not_found(key)),
        }
    }

    async fn watch(&self, _key: &str, _wait_index: Option<u64>) -> Result<Response, StoreError> {
        // No change stream to drain; watch semantics are exercised through
        // the relay task. Hang forever like an idle long-poll would.
        std::future::pending().await
    }

    async fn create_in_order(
        &self,
        dir: &str,
        value: &str,
        _ttl_secs: Option<u64>,
    ) -> Result<Response, StoreError> {
        let mut state = self.state();
        if let Some(error) = &state.error {
            return Err(error.clone());
        }
        state.index += 1;
        let key = format!("{}/{}", dir, state.index);
        let node = Node {
            key: key.clone(),
            value: Some(value.to_string()),
            modified_index: state.index,
            created_index: state.index,
        };
        let response = Response {
            action: "create".to_string(),
            node: Some(node),
        };
        state.data.insert(key, Ok(response.clone()));
        Ok(response)
    }
}
