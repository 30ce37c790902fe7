//! OCI registry client for component descriptors and their content.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.
//!
//! A descriptor `name:version` in repository `base` is stored as an OCI
//! artifact `base/component-descriptors/name:version`: its config blob points
//! at a single layer holding the descriptor JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use tracing::{debug, info};

use crate::auth::TokenProvider;
use crate::descriptor::{ComponentDescriptor, RepositoryContext};
use crate::digest::Hasher;
use crate::error::{RegistryError, RegistryResult};
use crate::reference::ImageRef;
use crate::registry::{ComponentRegistry, LocalBlob};
use crate::types::{
    ComponentConfig, OciDescriptor, OciManifest, RegistryConfig, COMPONENT_CONFIG_MEDIA_TYPE,
    COMPONENT_DESCRIPTOR_MEDIA_TYPE, DOCKER_MANIFEST_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE,
    OCI_MANIFEST_MEDIA_TYPE,
};

mod helpers;
mod http;

use helpers::{parse_descriptor, upload_target};
use http::{Body, HttpBackend};

const USER_AGENT_VALUE: &str = concat!("cdsign/", env!("CARGO_PKG_VERSION"));

/// Registry client speaking the OCI distribution API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: HttpBackend,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        let token_provider = config
            .token
            .as_ref()
            .map(TokenProvider::static_token)
            .unwrap_or_else(TokenProvider::from_env);

        Self::with_token_provider(config, token_provider)
    }

    pub fn with_token_provider(
        config: RegistryConfig,
        token_provider: TokenProvider,
    ) -> RegistryResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| RegistryError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http: HttpBackend {
                client,
                token_provider,
                config,
            },
        })
    }

    pub fn from_env() -> RegistryResult<Self> {
        Self::new(RegistryConfig::from_env())
    }

    fn plain_http(&self) -> bool {
        self.http.config.plain_http
    }

    /// Raw manifest bytes of `image`.
    pub async fn get_manifest(&self, image: &ImageRef) -> RegistryResult<Vec<u8>> {
        let url = image.manifest_url(self.plain_http());
        debug!(url = %url, "fetching manifest");

        let accept = [
            OCI_MANIFEST_MEDIA_TYPE,
            DOCKER_MANIFEST_MEDIA_TYPE,
            OCI_INDEX_MEDIA_TYPE,
        ]
        .join(", ");
        self.http.fetch_bytes(&url, Some(&accept)).await
    }

    /// Blob `digest` from the repository of `image`.
    pub async fn get_blob(&self, image: &ImageRef, digest: &str) -> RegistryResult<Vec<u8>> {
        let url = image.blob_url(self.plain_http(), digest);
        debug!(url = %url, "fetching blob");
        self.http.fetch_bytes(&url, None).await
    }

    /// Upload `content` into the repository of `image`, skipping blobs that
    /// already exist.
    pub async fn put_blob(
        &self,
        image: &ImageRef,
        content: &[u8],
        media_type: &str,
    ) -> RegistryResult<OciDescriptor> {
        let digest = format!(
            "sha256:{}",
            Hasher::sha256().digest_bytes(content, "").value
        );
        let descriptor = OciDescriptor {
            media_type: media_type.to_string(),
            digest: digest.clone(),
            size: content.len() as u64,
        };

        let blob_url = image.blob_url(self.plain_http(), &digest);
        match self
            .http
            .request(reqwest::Method::HEAD, &blob_url, None, None)
            .await
        {
            Ok(_) => {
                debug!(digest = %digest, "blob already present");
                return Ok(descriptor);
            }
            Err(RegistryError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let upload_url = image.upload_url(self.plain_http());
        let response = self
            .http
            .request(reqwest::Method::POST, &upload_url, None, None)
            .await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::InvalidResponse {
                message: "blob upload response has no Location header".to_string(),
            })?;
        let target = upload_target(&upload_url, location, &digest)?;

        debug!(digest = %digest, size = content.len(), "uploading blob");
        self.http
            .request(
                reqwest::Method::PUT,
                &target,
                None,
                Some(Body {
                    content,
                    content_type: "application/octet-stream",
                }),
            )
            .await?;

        Ok(descriptor)
    }

    pub async fn put_manifest(&self, image: &ImageRef, manifest: &OciManifest) -> RegistryResult<()> {
        let content = serde_json::to_vec(manifest).map_err(|e| RegistryError::InvalidResponse {
            message: format!("failed to serialize manifest: {}", e),
        })?;
        let url = image.manifest_url(self.plain_http());
        debug!(url = %url, "uploading manifest");

        self.http
            .request(
                reqwest::Method::PUT,
                &url,
                None,
                Some(Body {
                    content: &content,
                    content_type: OCI_MANIFEST_MEDIA_TYPE,
                }),
            )
            .await?;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.http.token_provider.is_authenticated()
    }
}

#[async_trait]
impl ComponentRegistry for RegistryClient {
    async fn resolve(
        &self,
        repository: &RepositoryContext,
        name: &str,
        version: &str,
    ) -> RegistryResult<ComponentDescriptor> {
        let image = ImageRef::for_component(repository, name, version)?;
        let manifest_bytes = self.get_manifest(&image).await?;
        let manifest: OciManifest =
            serde_json::from_slice(&manifest_bytes).map_err(|e| RegistryError::InvalidResponse {
                message: format!("failed to parse manifest of {image}: {e}"),
            })?;

        let layer = manifest
            .layers
            .iter()
            .find(|l| l.media_type == COMPONENT_DESCRIPTOR_MEDIA_TYPE)
            .ok_or_else(|| RegistryError::InvalidResponse {
                message: format!("{image} has no component descriptor layer"),
            })?;

        let content = self.get_blob(&image, &layer.digest).await?;
        parse_descriptor(&content)
    }

    async fn fetch_manifest(&self, image_reference: &str) -> RegistryResult<Vec<u8>> {
        let image = ImageRef::parse(image_reference)?;
        self.get_manifest(&image).await
    }

    async fn fetch_blob(
        &self,
        repository: &RepositoryContext,
        component: &ComponentDescriptor,
        digest: &str,
    ) -> RegistryResult<Vec<u8>> {
        let image = ImageRef::for_component(repository, component.name(), component.version())?;
        self.get_blob(&image, digest).await
    }

    async fn push(
        &self,
        repository: &RepositoryContext,
        descriptor: &ComponentDescriptor,
        blobs: &[LocalBlob],
    ) -> RegistryResult<()> {
        let image = ImageRef::for_component(repository, descriptor.name(), descriptor.version())?;

        let mut blob_layers = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let layer = self.put_blob(&image, &blob.content, &blob.media_type).await?;
            // Resources address the blob by its declared digest.
            if layer.digest != blob.digest {
                return Err(RegistryError::InvalidResponse {
                    message: format!(
                        "local blob {} of {} has content digest {}",
                        blob.digest,
                        descriptor.identity(),
                        layer.digest
                    ),
                });
            }
            blob_layers.push(layer);
        }

        let content = serde_json::to_vec(descriptor).map_err(|e| RegistryError::InvalidResponse {
            message: format!("failed to serialize component descriptor: {}", e),
        })?;
        let layer = self
            .put_blob(&image, &content, COMPONENT_DESCRIPTOR_MEDIA_TYPE)
            .await?;

        let config = serde_json::to_vec(&ComponentConfig {
            component_descriptor_layer: layer.clone(),
        })
        .map_err(|e| RegistryError::InvalidResponse {
            message: format!("failed to serialize component config: {}", e),
        })?;
        let config = self
            .put_blob(&image, &config, COMPONENT_CONFIG_MEDIA_TYPE)
            .await?;

        let manifest = OciManifest {
            schema_version: 2,
            media_type: Some(OCI_MANIFEST_MEDIA_TYPE.to_string()),
            config,
            layers: std::iter::once(layer).chain(blob_layers).collect(),
        };
        self.put_manifest(&image, &manifest).await?;

        info!(
            component = %descriptor.name(),
            version = %descriptor.version(),
            target = %image,
            blobs = blobs.len(),
            "pushed component descriptor"
        );
        Ok(())
    }
}
