//! OCI image reference parsing.
//!
//! Supported formats:
//! - `registry.local:5000/repo/name:1.0` → tag
//! - `registry.local/repo/name@sha256:abc...` → digest
//! - `registry.local/repo/name` → tag `latest`
//! - `http://127.0.0.1:5000/repo:1.0` → explicit scheme

use crate::descriptor::RepositoryContext;
use crate::error::{RegistryError, RegistryResult};

/// Path segment under a repository base URL that holds component descriptors.
pub const COMPONENT_DESCRIPTOR_NAMESPACE: &str = "component-descriptors";

/// Tag or digest part of an image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(String),
}

impl Reference {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(tag) => tag,
            Self::Digest(digest) => digest,
        }
    }
}

/// A parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Explicit `http`/`https` scheme, if one was given.
    pub scheme: Option<String>,
    pub host: String,
    pub repository: String,
    pub reference: Reference,
}

impl ImageRef {
    /// Parse an image reference string.
    ///
    /// # Examples
    ///
    /// ```
    /// use cdsign_core::reference::{ImageRef, Reference};
    ///
    /// let tagged = ImageRef::parse("registry.local:5000/apps/web:1.2.0").unwrap();
    /// assert_eq!(tagged.host, "registry.local:5000");
    /// assert_eq!(tagged.repository, "apps/web");
    /// assert_eq!(tagged.reference, Reference::Tag("1.2.0".to_string()));
    ///
    /// let pinned = ImageRef::parse("registry.local/apps/web@sha256:abc").unwrap();
    /// assert_eq!(pinned.reference, Reference::Digest("sha256:abc".to_string()));
    /// ```
    pub fn parse(reference: &str) -> RegistryResult<Self> {
        let reference = reference.trim();
        let invalid = |reason: &str| RegistryError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (scheme, rest) = if let Some(rest) = reference.strip_prefix("http://") {
            (Some("http".to_string()), rest)
        } else if let Some(rest) = reference.strip_prefix("https://") {
            (Some("https".to_string()), rest)
        } else {
            (None, reference)
        };

        let (host, path) = rest
            .split_once('/')
            .ok_or_else(|| invalid("reference must contain a registry host and repository"))?;

        if !(host.contains('.') || host.contains(':') || host == "localhost") {
            return Err(invalid("registry host must be a domain, host:port or localhost"));
        }

        let (repository, reference_part) = if let Some((repo, digest)) = path.split_once('@') {
            if !digest.contains(':') {
                return Err(invalid("digest must have the form <algorithm>:<hex>"));
            }
            (repo, Reference::Digest(digest.to_string()))
        } else {
            match path.rsplit_once(':') {
                Some((repo, tag)) if !tag.contains('/') => {
                    if tag.is_empty() {
                        return Err(invalid("tag cannot be empty"));
                    }
                    (repo, Reference::Tag(tag.to_string()))
                }
                _ => (path, Reference::Tag("latest".to_string())),
            }
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("repository cannot be empty"));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            repository: repository.to_string(),
            reference: reference_part,
        })
    }

    /// Reference of the descriptor `name:version` stored in `repository`.
    pub fn for_component(
        repository: &RepositoryContext,
        name: &str,
        version: &str,
    ) -> RegistryResult<Self> {
        let base = repository.base_url.trim_end_matches('/');
        Self::parse(&format!(
            "{base}/{COMPONENT_DESCRIPTOR_NAMESPACE}/{}:{version}",
            name.to_lowercase()
        ))
    }

    /// `scheme://host` of the registry API.
    pub fn registry_url(&self, plain_http: bool) -> String {
        let scheme = self
            .scheme
            .as_deref()
            .unwrap_or(if plain_http { "http" } else { "https" });
        format!("{scheme}://{}", self.host)
    }

    pub fn manifest_url(&self, plain_http: bool) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url(plain_http),
            self.repository,
            self.reference.as_str()
        )
    }

    pub fn blob_url(&self, plain_http: bool, digest: &str) -> String {
        format!(
            "{}/v2/{}/blobs/{}",
            self.registry_url(plain_http),
            self.repository,
            digest
        )
    }

    pub fn upload_url(&self, plain_http: bool) -> String {
        format!(
            "{}/v2/{}/blobs/uploads/",
            self.registry_url(plain_http),
            self.repository
        )
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}://")?;
        }
        match &self.reference {
            Reference::Tag(tag) => write!(f, "{}/{}:{}", self.host, self.repository, tag),
            Reference::Digest(digest) => write!(f, "{}/{}@{}", self.host, self.repository, digest),
        }
    }
}

impl std::str::FromStr for ImageRef {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
