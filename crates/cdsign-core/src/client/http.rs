//! HTTP layer: status mapping and retry.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::warn;

use crate::auth::TokenProvider;
use crate::error::{RegistryError, RegistryResult};
use crate::types::RegistryConfig;

use super::helpers::reference_from_url;

/// Request body with its content type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Body<'a> {
    pub content: &'a [u8],
    pub content_type: &'a str,
}

/// HTTP backend for making requests (holds reqwest client, auth, config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) token_provider: TokenProvider,
    pub(crate) config: RegistryConfig,
}

impl HttpBackend {
    /// Read the full response body of a successful request.
    pub(crate) async fn fetch_bytes(
        &self,
        url: &str,
        accept: Option<&str>,
    ) -> RegistryResult<Vec<u8>> {
        let response = self
            .request(reqwest::Method::GET, url, accept, None)
            .await?;
        let bytes = response.bytes().await.map_err(|e| RegistryError::Network {
            message: format!("failed to read response body: {}", e),
        })?;
        Ok(bytes.to_vec())
    }

    /// Make a request, retrying transient failures with jittered backoff.
    pub(crate) async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        accept: Option<&str>,
        body: Option<Body<'_>>,
    ) -> RegistryResult<reqwest::Response> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            let result = self.request_once(method.clone(), url, accept, body).await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        RegistryError::RateLimited {
                            retry_after: Some(retry_after),
                        } => {
                            let capped = (*retry_after).min(Duration::from_secs(30));
                            let base_ms = capped.as_millis() as u64;
                            let jitter_factor: f64 =
                                rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
                            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
                            Duration::from_millis(jittered_ms.max(100))
                        }
                        _ => {
                            let base_backoff = Duration::from_secs(1 << retries);
                            let base_backoff = base_backoff.min(Duration::from_secs(30));
                            let jittered_ms =
                                rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                            Duration::from_millis(jittered_ms.max(10))
                        }
                    };

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(
        &self,
        method: reqwest::Method,
        url: &str,
        accept: Option<&str>,
        body: Option<Body<'_>>,
    ) -> RegistryResult<reqwest::Response> {
        let mut request = self.client.request(method, url);

        if let Some(token) = self.token_provider.get_token().await? {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, body.content_type)
                .body(body.content.to_vec());
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            401 | 403 => Err(RegistryError::Unauthorized {
                message: format!("HTTP {} for {}", status.as_u16(), reference_from_url(url)),
            }),

            404 => Err(RegistryError::NotFound {
                reference: reference_from_url(url),
            }),

            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(RegistryError::RateLimited { retry_after })
            }

            500..=599 => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(RegistryError::Network {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                })
            }

            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(RegistryError::InvalidResponse {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                })
            }
        }
    }
}
