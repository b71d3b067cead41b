//! Remote Config Client (4.K): baseline upload, signed config fetch, ECDSA
//! P-256 signature verification.
//!
//! An environment-driven client wrapping `reqwest`, with builder-style
//! `with_*` overrides, for the HTTP shape; signature verification uses
//! `p256` + `signature` for ECDSA over the P-256 curve.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use serde::{Deserialize, Serialize};
use supervisor_core::{DiscoveredService, RemoteConfig, SignedPayload};
use tracing::{debug, instrument, warn};

use crate::error::{SupervisorError, SupervisorResult};

/// `POST /baseline` body (§6 "Baseline Report").
#[derive(Debug, Clone, Serialize)]
pub struct BaselineReport {
    pub schema_version: String,
    pub host_id: String,
    pub hostname: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub host_metadata: HostMetadata,
    pub discovery_metadata: DiscoveryMetadata,
    pub services: Vec<DiscoveredService>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostMetadata {
    pub os: String,
    pub kernel: String,
    pub architecture: String,
    pub cpu_cores: u32,
    pub memory_gb: f64,
    pub agent_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryMetadata {
    pub discovery_id: String,
    pub scan_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_version: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RemoteConfigClientConfig {
    pub base_url: String,
    pub license_key: String,
    pub timeout: Duration,
}

impl RemoteConfigClientConfig {
    pub fn new(base_url: impl Into<String>, license_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            license_key: license_key.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Remote Config Client (4.K).
pub struct RemoteConfigClient {
    config: RemoteConfigClientConfig,
    client: reqwest::Client,
}

impl RemoteConfigClient {
    pub fn new(config: RemoteConfigClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self { config, client }
    }

    /// `send_baseline(ctx, report)`. Accepts 200 or 202 as success; any
    /// other outcome (including a transport error) is logged as a warning,
    /// never surfaced as an error (4.K: "any non-2xx is a warning, not an
    /// error — the caller continues").
    #[instrument(skip(self, report))]
    pub async fn send_baseline(&self, report: &BaselineReport) {
        let url = format!("{}/baseline", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.license_key)
            .json(report)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 200 || resp.status().as_u16() == 202 => {
                debug!(status = %resp.status(), "baseline report accepted");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "baseline report rejected, continuing anyway");
            }
            Err(e) => {
                warn!(error = %e, "failed to send baseline report, continuing anyway");
            }
        }
    }

    /// `fetch_config(ctx) → RemoteConfig | None`. `304 Not Modified` yields
    /// `None`; any 2xx body is parsed and its signature verified, which is
    /// mandatory and a hard error on failure (4.K).
    #[instrument(skip(self))]
    pub async fn fetch_config(&self) -> SupervisorResult<Option<RemoteConfig>> {
        let url = format!("{}/config", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.license_key)
            .send()
            .await
            .map_err(|e| SupervisorError::RemoteConfig(format!("fetch failed: {e}")))?;

        if response.status().as_u16() == 304 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SupervisorError::RemoteConfig(format!(
                "unexpected status fetching remote config: {}",
                response.status()
            )));
        }

        let remote_config: RemoteConfig = response
            .json()
            .await
            .map_err(|e| SupervisorError::RemoteConfig(format!("malformed remote config body: {e}")))?;

        verify_signature(&remote_config)?;

        if remote_config.valid_until < Utc::now() {
            return Err(SupervisorError::RemoteConfigExpired);
        }

        Ok(Some(remote_config))
    }
}

/// Verifies the ECDSA P-256 signature over the canonical JSON of
/// `{version, integrations, valid_until}` (4.K "Signing format").
fn verify_signature(remote_config: &RemoteConfig) -> SupervisorResult<()> {
    let verifying_key = VerifyingKey::from_public_key_pem(&remote_config.public_key)
        .map_err(|_| SupervisorError::SignatureInvalid)?;

    let signature_bytes = BASE64
        .decode(remote_config.signature.as_bytes())
        .map_err(|_| SupervisorError::SignatureInvalid)?;
    let signature = Signature::from_slice(&signature_bytes).map_err(|_| SupervisorError::SignatureInvalid)?;

    let payload = SignedPayload {
        version: &remote_config.version,
        integrations: &remote_config.integrations,
        valid_until: remote_config.valid_until,
    };
    let canonical = serde_json::to_vec(&payload).map_err(|_| SupervisorError::SignatureInvalid)?;

    verifying_key
        .verify(&canonical, &signature)
        .map_err(|_| SupervisorError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::rand_core::OsRng;
    use p256::pkcs8::EncodePublicKey;
    use supervisor_core::IntegrationConfig;

    fn signed_config(valid_until: chrono::DateTime<Utc>) -> RemoteConfig {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_key_pem = signing_key
            .verifying_key()
            .to_public_key_pem(p256::pkcs8::LineEnding::LF)
            .unwrap();

        let integrations = vec![IntegrationConfig {
            kind: "mysql".to_string(),
            enabled: true,
            config: serde_json::json!({"endpoint": "127.0.0.1:3306"}),
        }];
        let payload = SignedPayload {
            version: "v1",
            integrations: &integrations,
            valid_until,
        };
        let canonical = serde_json::to_vec(&payload).unwrap();
        let signature: Signature = signing_key.sign(&canonical);

        RemoteConfig {
            version: "v1".to_string(),
            integrations,
            signature: BASE64.encode(signature.to_bytes()),
            public_key: public_key_pem,
            valid_until,
        }
    }

    #[test]
    fn verifies_a_correctly_signed_payload() {
        let remote_config = signed_config(Utc::now() + chrono::Duration::hours(1));
        assert!(verify_signature(&remote_config).is_ok());
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let mut remote_config = signed_config(Utc::now() + chrono::Duration::hours(1));
        remote_config.version = "v2-tampered".to_string();
        assert!(matches!(verify_signature(&remote_config), Err(SupervisorError::SignatureInvalid)));
    }

    #[test]
    fn rejects_garbage_signature_bytes() {
        let mut remote_config = signed_config(Utc::now() + chrono::Duration::hours(1));
        remote_config.signature = BASE64.encode(b"not a signature");
        assert!(matches!(verify_signature(&remote_config), Err(SupervisorError::SignatureInvalid)));
    }
}
