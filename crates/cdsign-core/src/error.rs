//! Error types for digesting, signing and registry access.

use std::fmt;
use std::time::Duration;

/// Identifies the graph node an error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// A component descriptor.
    Component { name: String, version: String },

    /// A component reference inside `parent`.
    Reference {
        parent: String,
        name: String,
        version: String,
    },

    /// A resource inside `parent`.
    Resource {
        parent: String,
        name: String,
        version: String,
    },
}

impl NodeRef {
    pub fn component(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Component {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component { name, version } => write!(f, "component {name}:{version}"),
            Self::Reference {
                parent,
                name,
                version,
            } => write!(f, "reference {name}:{version} in {parent}"),
            Self::Resource {
                parent,
                name,
                version,
            } => write!(f, "resource {name}:{version} in {parent}"),
        }
    }
}

/// Failures of the integrity core: canonicalization, digesting and signatures.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    /// A reference of the descriptor lacks a complete digest.
    #[error("{node} is not normaliseable: {reason}")]
    NotNormaliseable { node: NodeRef, reason: String },

    /// A stored digest differs from the recomputed one.
    #[error("digest mismatch for {node}: expected {expected}, got {actual}")]
    DigestMismatch {
        node: NodeRef,
        expected: String,
        actual: String,
    },

    /// A digest required during verification is absent.
    #[error("missing digest for {node}")]
    MissingDigest { node: NodeRef },

    /// No digester is registered for the resource's access type.
    #[error("unsupported access type {access_type:?} for {node}")]
    UnsupportedAccessType { node: NodeRef, access_type: String },

    /// Hash algorithm name is not known.
    #[error("unsupported hash algorithm: {algorithm}")]
    UnsupportedHashAlgorithm { algorithm: String },

    /// Named signature is not attached to the descriptor.
    #[error("signature {signature_name:?} not found in {node}")]
    SignatureNotFound {
        node: NodeRef,
        signature_name: String,
    },

    /// Cryptographic or attestation check failed.
    #[error("signature verification failed for {node}: {reason}")]
    SignatureInvalid { node: NodeRef, reason: String },

    /// The registry could not produce a descriptor, manifest or blob.
    #[error("failed to resolve {node}: {source}")]
    Resolution {
        node: NodeRef,
        #[source]
        source: RegistryError,
    },

    /// The caller's deadline elapsed.
    #[error("operation canceled: deadline of {timeout:?} exceeded")]
    ContextCanceled { timeout: Duration },

    /// A reference points back onto the current walk path.
    #[error("cyclic component reference: {path}")]
    CyclicReference { path: String },

    /// Two entries of one list share the same identity.
    #[error("duplicate identity {identity} in {node}")]
    DuplicateIdentity { node: NodeRef, identity: String },

    /// Key material could not be loaded.
    #[error("key error: {message}")]
    Key { message: String },

    /// Producing a signature failed.
    #[error("signing failed for {node}: {message}")]
    Signing { node: NodeRef, message: String },

    /// Backend configuration is invalid.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl IntegrityError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Input / setup issues
            Self::NotNormaliseable { .. } => 1,
            Self::UnsupportedAccessType { .. } => 1,
            Self::UnsupportedHashAlgorithm { .. } => 1,
            Self::DuplicateIdentity { .. } => 1,
            Self::CyclicReference { .. } => 1,
            Self::Key { .. } => 1,
            Self::Config { .. } => 1,

            // Integrity violations
            Self::DigestMismatch { .. } => 4,
            Self::MissingDigest { .. } => 4,
            Self::SignatureNotFound { .. } => 4,
            Self::SignatureInvalid { .. } => 4,

            // Collaborators
            Self::Resolution { source, .. } => source.exit_code(),
            Self::ContextCanceled { .. } => 5,
            Self::Signing { .. } => 6,
        }
    }
}

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Artifact not found in registry.
    #[error("not found: {reference}")]
    NotFound { reference: String },

    /// Authentication failed or token invalid.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Invalid image or repository reference.
    #[error("invalid reference: {reference} - {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Invalid response from registry.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl RegistryError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Not found / config issues
            Self::NotFound { .. } => 1,
            Self::Config { .. } => 1,
            Self::InvalidReference { .. } => 1,

            // Auth issues
            Self::Unauthorized { .. } => 2,

            // Network/transient
            Self::RateLimited { .. } => 5,
            Self::Network { .. } => 5,

            // Other
            Self::InvalidResponse { .. } => 6,
        }
    }

    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for digest, sign and verify operations.
pub type IntegrityResult<T> = Result<T, IntegrityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ref_display_names_parent() {
        let node = NodeRef::Resource {
            parent: "example.com/r:v1.0".to_string(),
            name: "blob".to_string(),
            version: "v1.0".to_string(),
        };
        assert_eq!(node.to_string(), "resource blob:v1.0 in example.com/r:v1.0");
    }

    #[test]
    fn resolution_exit_code_follows_registry_error() {
        let err = IntegrityError::Resolution {
            node: NodeRef::component("c", "v1"),
            source: RegistryError::Unauthorized {
                message: "expired".to_string(),
            },
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(RegistryError::Network {
            message: "reset".to_string()
        }
        .is_retryable());
        assert!(!RegistryError::NotFound {
            reference: "x".to_string()
        }
        .is_retryable());
    }
}
