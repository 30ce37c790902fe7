//! Remote attestation service.
//!
//! Signing registers the descriptor digest with the service under the subject
//! `{name}/{version}`; no signature value is stored in the descriptor. Verifying
//! looks the subject up again and compares the attested digest.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Signer, Verifier};
use crate::descriptor::{ComponentDescriptor, DigestSpec, Signature, SignatureSpec};
use crate::digest::SHA256;
use crate::error::{IntegrityError, IntegrityResult};

pub const ATTESTATION_ALGORITHM: &str = "ATTESTATION";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn read_config<T: serde::de::DeserializeOwned>(path: &Path) -> IntegrityResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| IntegrityError::Config {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    serde_yaml::from_str(&content).map_err(|e| IntegrityError::Config {
        message: format!("invalid attestation config {}: {e}", path.display()),
    })
}

fn http_client() -> IntegrityResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| IntegrityError::Config {
            message: format!("failed to create HTTP client: {e}"),
        })
}

fn subject(descriptor: &ComponentDescriptor) -> String {
    format!("{}/{}", descriptor.name(), descriptor.version())
}

/// YAML configuration of [`AttestationSigner`].
#[derive(Debug, Clone, Deserialize)]
pub struct AttestationSignerConfig {
    pub url: String,
    pub jwt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttestationEntry<'a> {
    subject: String,
    sha256: &'a str,
    byte_size: usize,
    version: &'a str,
}

/// Registers descriptor digests with the attestation service.
#[derive(Debug, Clone)]
pub struct AttestationSigner {
    config: AttestationSignerConfig,
    client: reqwest::Client,
}

impl AttestationSigner {
    pub fn new(config: AttestationSignerConfig) -> IntegrityResult<Self> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    pub fn from_config_file(path: &Path) -> IntegrityResult<Self> {
        Self::new(read_config(path)?)
    }
}

#[async_trait]
impl Signer for AttestationSigner {
    async fn sign(
        &self,
        descriptor: &ComponentDescriptor,
        digest: &DigestSpec,
    ) -> IntegrityResult<SignatureSpec> {
        if !digest.hash_algorithm.eq_ignore_ascii_case(SHA256) {
            return Err(IntegrityError::UnsupportedHashAlgorithm {
                algorithm: digest.hash_algorithm.clone(),
            });
        }
        let failed = |message: String| IntegrityError::Signing {
            node: descriptor.node(),
            message,
        };

        let payload = [AttestationEntry {
            subject: subject(descriptor),
            sha256: &digest.value,
            byte_size: digest.value.len() / 2,
            version: descriptor.version(),
        }];

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.jwt)
            .json(&payload)
            .send()
            .await
            .map_err(|e| failed(format!("request to attestation service failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(failed(format!(
                "attestation service returned {}: {body}",
                status.as_u16()
            )));
        }
        debug!(subject = %subject(descriptor), response = %body, "digest attested");

        Ok(SignatureSpec {
            algorithm: ATTESTATION_ALGORITHM.to_string(),
            value: String::new(),
            media_type: String::new(),
        })
    }
}

/// YAML configuration of [`AttestationVerifier`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationVerifierConfig {
    pub verify_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Attestation {
    version: String,
    digest: String,
}

/// Checks a descriptor digest against the one attested for it.
#[derive(Debug, Clone)]
pub struct AttestationVerifier {
    config: AttestationVerifierConfig,
    client: reqwest::Client,
}

impl AttestationVerifier {
    pub fn new(config: AttestationVerifierConfig) -> IntegrityResult<Self> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    pub fn from_config_file(path: &Path) -> IntegrityResult<Self> {
        Self::new(read_config(path)?)
    }
}

#[async_trait]
impl Verifier for AttestationVerifier {
    async fn verify(
        &self,
        descriptor: &ComponentDescriptor,
        signature: &Signature,
    ) -> IntegrityResult<()> {
        let invalid = |reason: String| IntegrityError::SignatureInvalid {
            node: descriptor.node(),
            reason,
        };

        let url = format!("{}/lookup", self.config.verify_url.trim_end_matches('/'));
        let subject = subject(descriptor);
        let mut request = self
            .client
            .get(&url)
            .query(&[("subject", subject.as_str()), ("version", descriptor.version())]);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| invalid(format!("attestation lookup failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(invalid(format!(
                "attestation lookup for {subject} returned {}",
                status.as_u16()
            )));
        }
        let attestation: Attestation = response
            .json()
            .await
            .map_err(|e| invalid(format!("unreadable attestation: {e}")))?;

        if attestation.version != descriptor.version() {
            return Err(invalid(format!(
                "attested version {} differs from {}",
                attestation.version,
                descriptor.version()
            )));
        }
        let (algorithm, value) = attestation
            .digest
            .split_once(':')
            .ok_or_else(|| invalid(format!("malformed attested digest {}", attestation.digest)))?;
        if !algorithm.eq_ignore_ascii_case(&signature.digest.hash_algorithm) {
            return Err(invalid(format!(
                "attested hash algorithm {algorithm} differs from {}",
                signature.digest.hash_algorithm
            )));
        }
        if !value.eq_ignore_ascii_case(&signature.digest.value) {
            return Err(invalid(format!(
                "attested digest {value} differs from {}",
                signature.digest.value
            )));
        }
        Ok(())
    }
}
