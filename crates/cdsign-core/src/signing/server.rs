//! Remote RSA signing through a signing server.
//!
//! The server receives `{"digest": "<alg>:<hex>"}` on `POST {url}/sign-digest`
//! and answers with the same digest and a hex encoded PKCS#1 v1.5 signature.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Signer;
use crate::descriptor::{ComponentDescriptor, DigestSpec, SignatureSpec};
use crate::error::{IntegrityError, IntegrityResult};

pub const SIGNING_SERVER_RSA_ALGORITHM: &str = "SIGN-SERVER-RSASSA-PKCS1-V1_5-SIGN/V1";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// YAML configuration of a signing server.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningServerConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl SigningServerConfig {
    pub fn from_file(path: &Path) -> IntegrityResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| IntegrityError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        serde_yaml::from_str(&content).map_err(|e| IntegrityError::Config {
            message: format!("invalid signing server config {}: {e}", path.display()),
        })
    }
}

#[derive(Serialize)]
struct SignRequest<'a> {
    digest: &'a str,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(default)]
    digest: String,
    #[serde(default)]
    signature: String,
}

/// Delegates signing to a remote signing server.
#[derive(Debug, Clone)]
pub struct SigningServerSigner {
    config: SigningServerConfig,
    client: reqwest::Client,
}

impl SigningServerSigner {
    pub fn new(config: SigningServerConfig) -> IntegrityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| IntegrityError::Config {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { config, client })
    }

    pub fn from_config_file(path: &Path) -> IntegrityResult<Self> {
        Self::new(SigningServerConfig::from_file(path)?)
    }
}

#[async_trait]
impl Signer for SigningServerSigner {
    async fn sign(
        &self,
        descriptor: &ComponentDescriptor,
        digest: &DigestSpec,
    ) -> IntegrityResult<SignatureSpec> {
        let failed = |message: String| IntegrityError::Signing {
            node: descriptor.node(),
            message,
        };

        let expected = format!("{}:{}", digest.hash_algorithm.to_lowercase(), digest.value);
        let url = format!("{}/sign-digest", self.config.url.trim_end_matches('/'));
        debug!(url = %url, digest = %expected, "requesting signature");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&SignRequest { digest: &expected })
            .send()
            .await
            .map_err(|e| failed(format!("request to signing server failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| failed(format!("failed to read signing server response: {e}")))?;
        if !status.is_success() {
            return Err(failed(format!(
                "signing server returned {}: {body}",
                status.as_u16()
            )));
        }

        let parsed: SignResponse = serde_json::from_str(&body)
            .map_err(|e| failed(format!("invalid signing server response: {e}")))?;
        if parsed.digest != expected || parsed.signature.is_empty() {
            return Err(failed(format!(
                "invalid signing server response: digest {:?}, signature present: {}",
                parsed.digest,
                !parsed.signature.is_empty()
            )));
        }

        Ok(SignatureSpec {
            algorithm: SIGNING_SERVER_RSA_ALGORITHM.to_string(),
            value: parsed.signature,
            media_type: String::new(),
        })
    }
}
