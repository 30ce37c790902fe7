//! Access-type specific resource digesting.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::canonicalize::to_canonical_jcs_bytes;
use crate::descriptor::{
    ComponentDescriptor, DigestSpec, LocalOciBlobAccess, OciRegistryAccess, RepositoryContext,
    Resource, LOCAL_OCI_BLOB_ACCESS_TYPE, OCI_REGISTRY_ACCESS_TYPE,
};
use crate::digest::{Hasher, LOCAL_OCI_BLOB_DIGEST_V1, OCI_ARTIFACT_DIGEST_V1};
use crate::error::{IntegrityError, IntegrityResult, RegistryError};
use crate::registry::ComponentRegistry;

/// Computes the digest of one resource of a given access type.
#[async_trait]
pub trait ResourceDigester: Send + Sync {
    /// Access type this digester handles.
    fn access_type(&self) -> &str;

    /// Digest `resource` of `parent`, which lives in `repository`.
    async fn digest(
        &self,
        repository: &RepositoryContext,
        parent: &ComponentDescriptor,
        resource: &Resource,
        hasher: &mut Hasher,
    ) -> IntegrityResult<DigestSpec>;
}

/// Digesters keyed by access type.
#[derive(Clone, Default)]
pub struct DigesterRegistry {
    by_type: HashMap<String, Arc<dyn ResourceDigester>>,
}

impl DigesterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ociRegistry` and `localOciBlob` digesters backed by `registry`.
    pub fn with_defaults(registry: Arc<dyn ComponentRegistry>) -> Self {
        let mut digesters = Self::new();
        digesters.register(Arc::new(OciArtifactDigester::new(registry.clone())));
        digesters.register(Arc::new(LocalOciBlobDigester::new(registry)));
        digesters
    }

    /// Register `digester`, replacing any digester of the same access type.
    pub fn register(&mut self, digester: Arc<dyn ResourceDigester>) {
        self.by_type
            .insert(digester.access_type().to_string(), digester);
    }

    pub fn get(&self, access_type: &str) -> Option<&Arc<dyn ResourceDigester>> {
        self.by_type.get(access_type)
    }

    pub fn access_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for DigesterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigesterRegistry")
            .field("access_types", &self.access_types())
            .finish()
    }
}

pub(crate) fn invalid_access(parent: &ComponentDescriptor, resource: &Resource, e: serde_json::Error) -> IntegrityError {
    IntegrityError::Resolution {
        node: parent.resource_node(resource),
        source: RegistryError::InvalidReference {
            reference: resource.identity(),
            reason: format!("malformed access: {e}"),
        },
    }
}

/// Digests OCI artifacts by their JCS re-marshalled manifest.
pub struct OciArtifactDigester {
    registry: Arc<dyn ComponentRegistry>,
}

impl OciArtifactDigester {
    pub fn new(registry: Arc<dyn ComponentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ResourceDigester for OciArtifactDigester {
    fn access_type(&self) -> &str {
        OCI_REGISTRY_ACCESS_TYPE
    }

    async fn digest(
        &self,
        _repository: &RepositoryContext,
        parent: &ComponentDescriptor,
        resource: &Resource,
        hasher: &mut Hasher,
    ) -> IntegrityResult<DigestSpec> {
        let access: OciRegistryAccess = resource
            .access
            .as_ref()
            .map(|a| a.decode::<OciRegistryAccess>())
            .transpose()
            .map_err(|e| invalid_access(parent, resource, e))?
            .ok_or_else(|| IntegrityError::UnsupportedAccessType {
                node: parent.resource_node(resource),
                access_type: String::new(),
            })?;

        debug!(image = %access.image_reference, resource = %resource.identity(), "digesting oci artifact");
        let manifest = self
            .registry
            .fetch_manifest(&access.image_reference)
            .await
            .map_err(|source| IntegrityError::Resolution {
                node: parent.resource_node(resource),
                source,
            })?;

        let value: serde_json::Value =
            serde_json::from_slice(&manifest).map_err(|e| IntegrityError::Resolution {
                node: parent.resource_node(resource),
                source: RegistryError::InvalidResponse {
                    message: format!("manifest of {} is not JSON: {e}", access.image_reference),
                },
            })?;
        let canonical = to_canonical_jcs_bytes(&value).map_err(|e| IntegrityError::Resolution {
            node: parent.resource_node(resource),
            source: RegistryError::InvalidResponse {
                message: format!("failed to canonicalize manifest: {e}"),
            },
        })?;

        Ok(hasher.digest_bytes(&canonical, OCI_ARTIFACT_DIGEST_V1))
    }
}

/// Digests blobs stored next to the component descriptor.
pub struct LocalOciBlobDigester {
    registry: Arc<dyn ComponentRegistry>,
}

impl LocalOciBlobDigester {
    pub fn new(registry: Arc<dyn ComponentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ResourceDigester for LocalOciBlobDigester {
    fn access_type(&self) -> &str {
        LOCAL_OCI_BLOB_ACCESS_TYPE
    }

    async fn digest(
        &self,
        repository: &RepositoryContext,
        parent: &ComponentDescriptor,
        resource: &Resource,
        hasher: &mut Hasher,
    ) -> IntegrityResult<DigestSpec> {
        let access: LocalOciBlobAccess = resource
            .access
            .as_ref()
            .map(|a| a.decode::<LocalOciBlobAccess>())
            .transpose()
            .map_err(|e| invalid_access(parent, resource, e))?
            .ok_or_else(|| IntegrityError::UnsupportedAccessType {
                node: parent.resource_node(resource),
                access_type: String::new(),
            })?;

        debug!(blob = %access.digest, resource = %resource.identity(), "digesting local blob");
        let blob = self
            .registry
            .fetch_blob(repository, parent, &access.digest)
            .await
            .map_err(|source| IntegrityError::Resolution {
                node: parent.resource_node(resource),
                source,
            })?;

        hasher
            .digest_reader(Cursor::new(blob), LOCAL_OCI_BLOB_DIGEST_V1)
            .map_err(|e| IntegrityError::Resolution {
                node: parent.resource_node(resource),
                source: RegistryError::Network {
                    message: format!("failed to read blob {}: {e}", access.digest),
                },
            })
    }
}
