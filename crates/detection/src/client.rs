//! Classification client.
//!
//! Wraps the external zero-shot image classification capability. The client
//! never fails the caller: any transport, timeout, status, or schema problem
//! is absorbed into [`DetectionOutcome::Degraded`], logged, and treated
//! downstream as a negative verdict. Detection failures must not block issue
//! submission.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::DetectionError;
use crate::labels::LabelPolicy;
use crate::{schema, stub, DetectionOutcome, DetectionResult, ScoredLabel};

// Shared client for connection pooling. Request deadlines come from the
// per-client config via tokio::time::timeout, not from here.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(16)
        .build()
        .expect("failed to build HTTP client")
});

/// Where and how to reach the classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    /// `"stub"` (deterministic local scores) or `"api"` (remote classifier).
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Inference base URL for api mode; the model id is appended.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Full `Authorization` header value, if the endpoint needs one.
    #[serde(default)]
    pub api_auth_header: Option<String>,

    /// Zero-shot model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Hard deadline for one classification call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            api_url: None,
            api_auth_header: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DetectionConfig {
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        match self.mode.as_str() {
            "stub" => Ok(()),
            "api" => {
                if self.api_url.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(DetectionError::InvalidConfig(
                        "api_url is required for api mode".into(),
                    ));
                }
                Ok(())
            }
            other => Err(DetectionError::InvalidConfig(format!(
                "unknown detection mode '{other}' (expected 'stub' or 'api')"
            ))),
        }
    }
}

fn default_mode() -> String {
    "stub".to_string()
}

fn default_model() -> String {
    "openai/clip-vit-base-patch32".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Zero-shot classification client. One instance serves every label policy.
#[derive(Debug, Clone)]
pub struct DetectionClient {
    config: DetectionConfig,
}

impl DetectionClient {
    pub fn new(config: DetectionConfig) -> Result<Self, DetectionError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Client running the deterministic local stub.
    pub fn stub() -> Self {
        Self {
            config: DetectionConfig::default(),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Classify an image under a label policy.
    ///
    /// Never returns an error: failures degrade to a Negative verdict with
    /// an empty label set, visible to callers only through
    /// [`DetectionOutcome::Degraded`] and the operational log.
    pub async fn classify(&self, image: &[u8], policy: &LabelPolicy) -> DetectionOutcome {
        match self.try_classify(image, policy).await {
            Ok(result) => DetectionOutcome::Classified(result),
            Err(error) => {
                warn!(policy_id = %policy.id, error = %error, "detection_degraded");
                DetectionOutcome::Degraded {
                    policy_id: policy.id.clone(),
                    error,
                }
            }
        }
    }

    async fn try_classify(
        &self,
        image: &[u8],
        policy: &LabelPolicy,
    ) -> Result<DetectionResult, DetectionError> {
        policy.validate()?;
        let scores = match self.config.mode.as_str() {
            "api" => self.api_scores(image, policy).await?,
            _ => stub::stub_scores(image, policy),
        };
        Ok(DetectionResult::from_scores(policy, scores))
    }

    async fn api_scores(
        &self,
        image: &[u8],
        policy: &LabelPolicy,
    ) -> Result<Vec<ScoredLabel>, DetectionError> {
        let base = self
            .config
            .api_url
            .as_deref()
            .ok_or_else(|| DetectionError::InvalidConfig("api_url is required".into()))?;
        let url = format!("{}/{}", base.trim_end_matches('/'), self.config.model);

        let payload = json!({
            "inputs": BASE64.encode(image),
            "parameters": { "candidate_labels": policy.labels },
        });

        let response = tokio::time::timeout(self.config.timeout(), self.send(&url, payload))
            .await
            .map_err(|_| DetectionError::Timeout(self.config.timeout()))??;

        schema::parse_scores(response)
    }

    async fn send(&self, url: &str, payload: Value) -> Result<Value, DetectionError> {
        let mut request = HTTP_CLIENT
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(header) = self.config.api_auth_header.as_deref() {
            request = request.header("Authorization", header);
        }

        let response = request
            .json(&payload)
            .send()
            .await
            .map_err(|err| DetectionError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectionError::BadStatus { status, body });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| DetectionError::MalformedResponse(err.to_string()))
    }
}
