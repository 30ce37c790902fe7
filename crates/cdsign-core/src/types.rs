//! Registry configuration and OCI wire types.

use serde::{Deserialize, Serialize};

/// OCI image manifest media type.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Docker v2 manifest media type, accepted when fetching.
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// OCI image index media type, accepted when fetching.
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// Media type of the config blob of a component descriptor artifact.
pub const COMPONENT_CONFIG_MEDIA_TYPE: &str = "application/vnd.cdsign.component.config.v1+json";

/// Media type of the layer holding the component descriptor JSON.
pub const COMPONENT_DESCRIPTOR_MEDIA_TYPE: &str =
    "application/vnd.cdsign.component-descriptor.v2+json";

/// Content descriptor of a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciDescriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

/// OCI image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciManifest {
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    pub config: OciDescriptor,

    #[serde(default)]
    pub layers: Vec<OciDescriptor>,
}

/// Config blob of a component descriptor artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    pub component_descriptor_layer: OciDescriptor,
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Talk plain HTTP to registries given without a scheme.
    #[serde(default)]
    pub plain_http: bool,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            token: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            plain_http: false,
        }
    }
}

impl RegistryConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CDSIGN_REGISTRY_TOKEN` | Bearer token |
    /// | `CDSIGN_REGISTRY_TIMEOUT` | Request timeout in seconds |
    /// | `CDSIGN_REGISTRY_MAX_RETRIES` | Max retries for transient failures |
    /// | `CDSIGN_PLAIN_HTTP` | Use `http://` for scheme-less references |
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("CDSIGN_REGISTRY_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout_secs: std::env::var("CDSIGN_REGISTRY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("CDSIGN_REGISTRY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_retries),
            plain_http: std::env::var("CDSIGN_PLAIN_HTTP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Use plain HTTP for scheme-less references.
    pub fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }
}
