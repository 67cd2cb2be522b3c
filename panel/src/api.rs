use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use comms::specs::{
    job::{StartReply, StatusReply},
    preset::{PresetRecord, PresetUpload},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// All errors a server request can produce.
#[derive(Debug)]
pub enum ApiError {
    /// The request never completed. Refused connections, DNS, timeouts.
    Network(reqwest::Error),
    /// The server answered with a non success status.
    Status { status: u16, message: String },
    /// The body arrived but was not the promised shape.
    Decode(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "request failed: {e}"),
            Self::Status { status, message } if message.is_empty() => {
                write!(f, "server answered {status}")
            }
            Self::Status { status, message } => {
                write!(f, "server answered {status}: {message}")
            }
            Self::Decode(msg) => write!(f, "unexpected response shape: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e)
    }
}

/// The server operations the panel depends on.
///
/// [`HttpApi`] is the one real implementation, tests substitute scripted
/// ones to drive the monitor without a server.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Launches a job from a full config bag.
    ///
    /// # Returns
    /// The server assigned job id.
    async fn start_training(&self, config: &Map<String, Value>) -> Result<String, ApiError>;

    /// Fetches the current status of `job_id`.
    async fn training_status(&self, job_id: &str) -> Result<StatusReply, ApiError>;

    /// Fetches every preset the server knows about.
    async fn list_presets(&self) -> Result<Vec<PresetRecord>, ApiError>;

    /// Fetches one preset, `None` when the server never had it.
    async fn fetch_preset(&self, id: &str) -> Result<Option<PresetRecord>, ApiError>;

    /// Stores a preset on the server, which assigns the id.
    async fn save_preset(&self, upload: &PresetUpload) -> Result<PresetRecord, ApiError>;

    /// Deletes one preset. Returns `false` when the server never had it.
    async fn delete_preset(&self, id: &str) -> Result<bool, ApiError>;
}

/// Per request deadline. Keeps a hung server from wedging the poll loop.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the tuning server over its REST surface.
pub struct HttpApi {
    base: String,
    http: reqwest::Client,
}

impl HttpApi {
    /// Creates a client against `base`, e.g. `http://127.0.0.1:7860`.
    /// Trailing slashes are stripped so path joining stays predictable.
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_timeout(base, REQUEST_TIMEOUT)
    }

    /// Same client with a custom per request deadline.
    pub fn with_timeout(base: impl Into<String>, timeout: Duration) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }

        Self {
            base,
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = match resp.text().await {
            Ok(body) => error_message(&body),
            Err(_) => String::new(),
        };

        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pulls the human readable part out of an error body. Servers wrap theirs
/// as `{"error": "..."}`, anything else passes through trimmed.
fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = map.get("error").and_then(Value::as_str) {
            return msg.to_owned();
        }
    }

    body.trim().to_owned()
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    resp.json().await.map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl ApiClient for HttpApi {
    async fn start_training(&self, config: &Map<String, Value>) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(self.url("/api/train"))
            .json(config)
            .send()
            .await?;
        let reply: StartReply = decode(Self::checked(resp).await?).await?;

        Ok(reply.job_id)
    }

    async fn training_status(&self, job_id: &str) -> Result<StatusReply, ApiError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/train/{job_id}/status")))
            .send()
            .await?;

        decode(Self::checked(resp).await?).await
    }

    async fn list_presets(&self) -> Result<Vec<PresetRecord>, ApiError> {
        let resp = self.http.get(self.url("/api/presets")).send().await?;

        decode(Self::checked(resp).await?).await
    }

    async fn fetch_preset(&self, id: &str) -> Result<Option<PresetRecord>, ApiError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/presets/{id}")))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(decode(Self::checked(resp).await?).await?))
    }

    async fn save_preset(&self, upload: &PresetUpload) -> Result<PresetRecord, ApiError> {
        let resp = self
            .http
            .post(self.url("/api/presets"))
            .json(upload)
            .send()
            .await?;

        decode(Self::checked(resp).await?).await
    }

    async fn delete_preset(&self, id: &str) -> Result<bool, ApiError> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/presets/{id}")))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }

        Self::checked(resp).await?;
        Ok(true)
    }
}
