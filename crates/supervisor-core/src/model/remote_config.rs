//! Remote config payload types (§3 "Remote Config", §6 wire format, 4.K
//! Remote Config Client).
//!
//! The wire envelope carries an opaque list of per-service integrations
//! alongside an ECDSA P-256 signature over its canonical bytes;
//! `supervisor-service`'s remote-config client is the only consumer that
//! verifies it, using `p256` + `signature`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One per-service integration entry inside a [`RemoteConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub enabled: bool,
    pub config: Value,
}

/// Signed remote-config payload as received from the fleet control plane
/// (§6 "Remote Config (JSON, received)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub version: String,
    pub integrations: Vec<IntegrationConfig>,
    /// Base64-encoded raw `r||s` ECDSA P-256 signature (32 bytes each) over
    /// the canonical JSON of `{version, integrations, valid_until}`.
    pub signature: String,
    /// PEM-encoded PKIX public key used to verify `signature`.
    pub public_key: String,
    pub valid_until: DateTime<Utc>,
}

/// The subset of a [`RemoteConfig`] that is actually signed — kept as its
/// own type so the client can re-derive exactly the same canonical bytes the
/// signer produced without dragging `signature`/`public_key` into the hash.
#[derive(Debug, Clone, Serialize)]
pub struct SignedPayload<'a> {
    pub version: &'a str,
    pub integrations: &'a [IntegrationConfig],
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteConfigOutcome {
    Applied,
    RejectedBadSignature,
    RejectedExpired,
    RejectedInvalidConfig,
}
