//! External processing service client.
//!
//! The service renders clips from an uploaded video (`process`) and
//! re-renders a clip from an edited transcript (`edit_clip`). Both calls
//! authenticate with a static bearer token.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use mylo_models::{CaptionStyle, EditClipRequest, EditSegment, ProcessingOptions, TransitionStyle};

use crate::error::{MediaError, MediaResult};
use crate::metrics::record_request;

const PROCESS_PATH: &str = "/process_video";
const EDIT_PATH: &str = "/edit_clip";

/// Processing service configuration.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// URL of the process endpoint
    pub endpoint: String,
    /// URL of the edit endpoint; derived from `endpoint` when unset
    pub edit_endpoint: Option<String>,
    /// Bearer token sent with every request
    pub auth_token: String,
    /// Upper bound for one call, including reading the body
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl ProcessingConfig {
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            edit_endpoint: None,
            auth_token: auth_token.into(),
            timeout: Duration::from_secs(900),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> MediaResult<Self> {
        let endpoint = std::env::var("PROCESS_VIDEO_ENDPOINT")
            .map_err(|_| MediaError::config("PROCESS_VIDEO_ENDPOINT not set"))?;
        let auth_token = std::env::var("PROCESS_VIDEO_ENDPOINT_AUTH")
            .map_err(|_| MediaError::config("PROCESS_VIDEO_ENDPOINT_AUTH not set"))?;

        let timeout_secs: u64 = std::env::var("PROCESSING_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(900);

        Ok(Self {
            edit_endpoint: std::env::var("EDIT_CLIP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(timeout_secs),
            ..Self::new(endpoint, auth_token)
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Edit endpoint, falling back to the process endpoint with its
    /// `/process_video` path swapped for `/edit_clip`.
    pub fn edit_endpoint(&self) -> String {
        self.edit_endpoint
            .clone()
            .unwrap_or_else(|| self.endpoint.replace(PROCESS_PATH, EDIT_PATH))
    }
}

#[derive(Debug, Serialize)]
struct ProcessRequest<'a> {
    cloudinary_public_id: &'a str,
    #[serde(flatten)]
    options: &'a ProcessingOptions,
}

#[derive(Debug, Serialize)]
struct EditRequest<'a> {
    cloudinary_public_id: &'a str,
    segments: &'a [EditSegment],
    caption_style: CaptionStyle,
    transition_style: TransitionStyle,
}

/// Successful response of the process endpoint.
///
/// `body` is `Null` when the service answered with an empty or non-JSON
/// body; callers treat that as "no structured clips".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub status: u16,
    #[serde(default)]
    pub body: Value,
}

/// Response of the edit endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditClipResponse {
    #[serde(rename = "cloudinary_public_id")]
    pub media_key: String,
    #[serde(rename = "cloudinary_url", default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// Processing service client.
#[derive(Clone)]
pub struct ProcessingClient {
    http: Client,
    config: ProcessingConfig,
}

impl ProcessingClient {
    pub fn new(config: ProcessingConfig) -> MediaResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("mylo-media/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MediaResult<Self> {
        Self::new(ProcessingConfig::from_env()?)
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Process an uploaded video. Non-2xx responses and timeouts are errors.
    pub async fn process(
        &self,
        source_key: &str,
        options: &ProcessingOptions,
    ) -> MediaResult<ProcessResponse> {
        let request = ProcessRequest {
            cloudinary_public_id: source_key,
            options,
        };

        info!(source_key, endpoint = %self.config.endpoint, "Calling processing service");
        let (status, text) = self
            .post_json("process", &self.config.endpoint, &request)
            .await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(source_key, "Processing response is not JSON: {}", e);
                Value::Null
            })
        };

        Ok(ProcessResponse { status, body })
    }

    /// Re-render a clip keeping only the flagged segments.
    pub async fn edit_clip(
        &self,
        source_media_key: &str,
        request: &EditClipRequest,
    ) -> MediaResult<EditClipResponse> {
        let endpoint = self.config.edit_endpoint();
        let body = EditRequest {
            cloudinary_public_id: source_media_key,
            segments: &request.segments,
            caption_style: request.caption_style,
            transition_style: request.transition_style,
        };

        info!(source_media_key, endpoint = %endpoint, "Calling edit service");
        let (_, text) = self.post_json("edit_clip", &endpoint, &body).await?;

        serde_json::from_str(&text)
            .map_err(|e| MediaError::InvalidResponse(format!("edit response: {}", e)))
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        url: &str,
        body: &T,
    ) -> MediaResult<(u16, String)> {
        let start = Instant::now();
        let call = async {
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.config.auth_token)
                .json(body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, MediaError>((status, text))
        };

        let result = tokio::time::timeout(self.config.timeout, call).await;
        let elapsed = start.elapsed().as_secs_f64();

        let (status, text) = match result {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                record_request(operation, 0, elapsed);
                return Err(e);
            }
            Err(_) => {
                record_request(operation, 0, elapsed);
                return Err(MediaError::Timeout(self.config.timeout));
            }
        };

        record_request(operation, status.as_u16(), elapsed);
        debug!(operation, status = status.as_u16(), elapsed_secs = elapsed, "Upstream call finished");

        if !status.is_success() {
            return Err(MediaError::upstream(status.as_u16(), text));
        }
        Ok((status.as_u16(), text))
    }
}
