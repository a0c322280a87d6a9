//! Detached signature verification
//!
//! Trusted keys are ed25519 public keys stored as base64 text, fetched once
//! per invocation from a local path or an http(s) URL. Signatures cover the
//! raw ESA bytes and are stored beside the artifact, base64 encoded.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use keel_catalog::FetchedArtifact;
use keel_core::types::{
    FeatureManifest, VerificationIssue, VerificationOutcome, VerificationPolicy, VerifyLevel,
};
use tracing::{debug, info, warn};

const KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Checks fetched artifacts against one verification policy
#[derive(Debug, Clone)]
pub struct Verifier {
    policy: VerificationPolicy,
    /// Key URL -> decoded key, or why it could not be loaded
    keys: HashMap<String, Result<VerifyingKey, String>>,
}

impl Verifier {
    /// Load every trusted key the policy names.
    ///
    /// Failures are kept per URL and only surface when a feature actually
    /// needs that key.
    pub async fn load(policy: &VerificationPolicy) -> Self {
        let mut keys = HashMap::new();
        if policy.level != VerifyLevel::None {
            for trusted in &policy.keys {
                if keys.contains_key(&trusted.url) {
                    continue;
                }
                let key = fetch_key(&trusted.url).await;
                match &key {
                    Ok(_) => debug!(url = %trusted.url, "trusted key loaded"),
                    Err(message) => warn!(url = %trusted.url, %message, "trusted key unavailable"),
                }
                keys.insert(trusted.url.clone(), key);
            }
        }
        Self {
            policy: policy.clone(),
            keys,
        }
    }

    /// Verifier with already decoded keys, keyed by URL
    pub fn with_keys(policy: VerificationPolicy, keys: HashMap<String, VerifyingKey>) -> Self {
        Self {
            policy,
            keys: keys.into_iter().map(|(url, key)| (url, Ok(key))).collect(),
        }
    }

    /// Check one artifact.
    ///
    /// Under `warn` every problem becomes [`VerificationOutcome::Warned`]
    /// and installation proceeds; under `enforce` it becomes
    /// [`VerificationOutcome::Rejected`].
    pub fn verify(&self, manifest: &FeatureManifest, artifact: &FetchedArtifact) -> VerificationOutcome {
        if self.policy.level == VerifyLevel::None {
            return VerificationOutcome::Skipped;
        }
        if !manifest.is_signed() {
            return VerificationOutcome::Unsigned;
        }

        let outcome = match self.check(manifest, artifact) {
            Ok(key_id) => VerificationOutcome::Verified { key_id },
            Err(issue) if self.policy.level == VerifyLevel::Enforce => VerificationOutcome::Rejected(issue),
            Err(issue) => VerificationOutcome::Warned(issue),
        };
        match &outcome {
            VerificationOutcome::Verified { key_id } => {
                info!(feature = %manifest.short_name, %key_id, "signature verified")
            },
            other => warn!(feature = %manifest.short_name, outcome = ?other, "signature not verified"),
        }
        outcome
    }

    fn check(&self, manifest: &FeatureManifest, artifact: &FetchedArtifact) -> Result<String, VerificationIssue> {
        if self.policy.level == VerifyLevel::Enforce {
            if let Some(anonymous) = self.policy.keys.iter().find(|key| key.id.is_none()) {
                return Err(VerificationIssue::MissingKeyId {
                    url: anonymous.url.clone(),
                });
            }
        }

        let configured: Vec<&str> = self.policy.key_ids().collect();
        if let Some(provided) = &manifest.signing_key_id {
            if !configured.is_empty() && !configured.iter().any(|id| id.eq_ignore_ascii_case(provided)) {
                return Err(VerificationIssue::KeyIdMismatch {
                    expected: configured.join(", "),
                    provided: provided.clone(),
                });
            }
        }

        let key_id = manifest
            .signing_key_id
            .clone()
            .or_else(|| configured.first().map(|id| id.to_string()))
            .ok_or_else(|| VerificationIssue::UnknownKey {
                key_id: "unspecified".to_string(),
            })?;

        let trusted = self
            .policy
            .key(&key_id)
            .ok_or_else(|| VerificationIssue::UnknownKey { key_id: key_id.clone() })?;

        let key = match self.keys.get(&trusted.url) {
            Some(Ok(key)) => key,
            Some(Err(message)) => {
                return Err(VerificationIssue::KeyUnavailable {
                    url: trusted.url.clone(),
                    message: message.clone(),
                })
            },
            None => {
                return Err(VerificationIssue::KeyUnavailable {
                    url: trusted.url.clone(),
                    message: "key was not loaded".to_string(),
                })
            },
        };

        let raw = artifact
            .signature
            .as_deref()
            .ok_or_else(|| VerificationIssue::MissingSignature {
                locator: artifact.signature_locator.clone(),
            })?;
        let bad = |message: String| VerificationIssue::BadSignature {
            key_id: key_id.clone(),
            message,
        };
        let signature = Signature::from_bytes(&decode_signature(raw).map_err(bad)?);
        key.verify_strict(artifact.esa.bytes(), &signature)
            .map_err(|error| bad(format!("invalid ed25519 signature: {}", error)))?;

        Ok(key_id)
    }
}

async fn fetch_key(url: &str) -> Result<VerifyingKey, String> {
    let text = if url.starts_with("http://") || url.starts_with("https://") {
        let client = reqwest::Client::builder()
            .timeout(KEY_FETCH_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;
        let response = client.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        response.text().await.map_err(|e| e.to_string())?
    } else {
        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read_to_string(Path::new(path))
            .await
            .map_err(|e| format!("failed to read {}: {}", path, e))?
    };
    decode_key(&text)
}

/// Decode a base64 ed25519 public key
pub fn decode_key(text: &str) -> Result<VerifyingKey, String> {
    let bytes = decode_base64_fixed::<32>("public key", text)?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| format!("failed to decode ed25519 public key bytes: {}", e))
}

/// Signatures are base64 text; raw 64-byte signatures are accepted too
fn decode_signature(raw: &[u8]) -> Result<[u8; 64], String> {
    match std::str::from_utf8(raw) {
        Ok(text) => decode_base64_fixed::<64>("signature", text),
        Err(_) => raw
            .try_into()
            .map_err(|_| format!("signature must be 64 bytes, got {}", raw.len())),
    }
}

fn decode_base64_fixed<const N: usize>(label: &str, raw: &str) -> Result<[u8; N], String> {
    let decoded = BASE64
        .decode(raw.trim())
        .map_err(|e| format!("failed to decode base64 {}: {}", label, e))?;
    let len = decoded.len();
    decoded
        .try_into()
        .map_err(|_| format!("{} must be {} bytes, got {}", label, N, len))
}
