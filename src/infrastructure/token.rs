use crate::config::RelayConfig;
use crate::types::{RelayError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Short-lived credential for the upstream realtime endpoint.
#[derive(Debug, Clone)]
pub struct EphemeralCredential {
    pub token: String,
    /// Expiry as reported by the provider, epoch seconds.
    pub expires_at: Option<i64>,
}

/// External collaborator that mints upstream credentials.
///
/// The relay only consumes the credential string; issuance mechanics and
/// validation live behind this seam.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_credential(&self) -> Result<EphemeralCredential>;
}

/// Provider backed by the realtime sessions HTTP endpoint.
///
/// Mints an ephemeral client secret using the server-side API key and the
/// configured model/voice/instructions.
pub struct SessionsTokenProvider {
    http: reqwest::Client,
    sessions_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    instructions: Option<String>,
}

impl SessionsTokenProvider {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            sessions_url: config.sessions_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            instructions: config.instructions.clone(),
        }
    }
}

#[async_trait]
impl TokenProvider for SessionsTokenProvider {
    async fn fetch_credential(&self) -> Result<EphemeralCredential> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            RelayError::ProviderUnavailable("no API key configured".to_string())
        })?;

        let mut body = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
            "output_audio_format": "pcm16",
        });
        if let Some(instructions) = &self.instructions {
            body["instructions"] = Value::String(instructions.clone());
        }

        let response = self
            .http
            .post(&self.sessions_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::ProviderUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::ProviderUnavailable(format!(
                "session mint failed with status {}",
                response.status()
            )));
        }

        let session: Value = response
            .json()
            .await
            .map_err(|e| RelayError::ProviderUnavailable(e.to_string()))?;

        let token = session["client_secret"]["value"]
            .as_str()
            .ok_or_else(|| {
                RelayError::ProviderUnavailable("session response missing client_secret".to_string())
            })?
            .to_string();
        let expires_at = session["client_secret"]["expires_at"].as_i64();

        tracing::debug!("Minted ephemeral credential (expires_at={:?})", expires_at);
        Ok(EphemeralCredential { token, expires_at })
    }
}

/// Provider that hands out one fixed credential. Used when a deployment
/// already holds a token, and as a substitute in tests.
pub struct StaticTokenProvider {
    credential: EphemeralCredential,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: EphemeralCredential {
                token: token.into(),
                expires_at: None,
            },
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_credential(&self) -> Result<EphemeralCredential> {
        Ok(self.credential.clone())
    }
}
