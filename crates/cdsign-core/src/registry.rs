//! Registry collaborator interface and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::descriptor::{ComponentDescriptor, RepositoryContext};
use crate::error::{RegistryError, RegistryResult};
use crate::reference::COMPONENT_DESCRIPTOR_NAMESPACE;

/// Media type of copied blobs whose access does not name one.
pub const DEFAULT_BLOB_MEDIA_TYPE: &str = "application/octet-stream";

/// Content stored next to a descriptor, addressed by its declared digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBlob {
    pub digest: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

/// Storage and retrieval of component descriptors and their content.
#[async_trait]
pub trait ComponentRegistry: Send + Sync {
    /// Fetch the descriptor `name:version` from `repository`.
    async fn resolve(
        &self,
        repository: &RepositoryContext,
        name: &str,
        version: &str,
    ) -> RegistryResult<ComponentDescriptor>;

    /// Raw manifest bytes of an OCI artifact.
    async fn fetch_manifest(&self, image_reference: &str) -> RegistryResult<Vec<u8>>;

    /// Blob stored alongside `component` in `repository`.
    async fn fetch_blob(
        &self,
        repository: &RepositoryContext,
        component: &ComponentDescriptor,
        digest: &str,
    ) -> RegistryResult<Vec<u8>>;

    /// Store `descriptor` in `repository` under its name and version,
    /// together with the local blobs its resources point at.
    async fn push(
        &self,
        repository: &RepositoryContext,
        descriptor: &ComponentDescriptor,
        blobs: &[LocalBlob],
    ) -> RegistryResult<()>;
}

type DescriptorKey = (String, String, String);
type BlobKey = (String, String, String);

/// In-memory registry, keyed by repository base URL.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    descriptors: RwLock<HashMap<DescriptorKey, ComponentDescriptor>>,
    manifests: RwLock<HashMap<String, Vec<u8>>>,
    blobs: RwLock<HashMap<BlobKey, Vec<u8>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_descriptor(
        &self,
        repository: &RepositoryContext,
        descriptor: ComponentDescriptor,
    ) {
        let key = descriptor_key(repository, descriptor.name(), descriptor.version());
        self.descriptors.write().await.insert(key, descriptor);
    }

    pub async fn insert_manifest(&self, image_reference: impl Into<String>, manifest: Vec<u8>) {
        self.manifests
            .write()
            .await
            .insert(image_reference.into(), manifest);
    }

    pub async fn insert_blob(
        &self,
        repository: &RepositoryContext,
        component_name: &str,
        digest: &str,
        content: Vec<u8>,
    ) {
        let key = (
            normalize_base_url(repository),
            component_name.to_string(),
            digest.to_string(),
        );
        self.blobs.write().await.insert(key, content);
    }

    /// Stored descriptor, if any.
    pub async fn descriptor(
        &self,
        repository: &RepositoryContext,
        name: &str,
        version: &str,
    ) -> Option<ComponentDescriptor> {
        self.descriptors
            .read()
            .await
            .get(&descriptor_key(repository, name, version))
            .cloned()
    }

    /// Number of descriptors stored in `repository`.
    pub async fn descriptor_count(&self, repository: &RepositoryContext) -> usize {
        let base = normalize_base_url(repository);
        self.descriptors
            .read()
            .await
            .keys()
            .filter(|(b, _, _)| *b == base)
            .count()
    }
}

fn normalize_base_url(repository: &RepositoryContext) -> String {
    repository.base_url.trim_end_matches('/').to_string()
}

fn descriptor_key(repository: &RepositoryContext, name: &str, version: &str) -> DescriptorKey {
    (
        normalize_base_url(repository),
        name.to_string(),
        version.to_string(),
    )
}

fn not_found(repository: &RepositoryContext, name: &str, version: &str) -> RegistryError {
    RegistryError::NotFound {
        reference: format!(
            "{}/{COMPONENT_DESCRIPTOR_NAMESPACE}/{name}:{version}",
            normalize_base_url(repository)
        ),
    }
}

#[async_trait]
impl ComponentRegistry for MemoryRegistry {
    async fn resolve(
        &self,
        repository: &RepositoryContext,
        name: &str,
        version: &str,
    ) -> RegistryResult<ComponentDescriptor> {
        self.descriptor(repository, name, version)
            .await
            .ok_or_else(|| not_found(repository, name, version))
    }

    async fn fetch_manifest(&self, image_reference: &str) -> RegistryResult<Vec<u8>> {
        self.manifests
            .read()
            .await
            .get(image_reference)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                reference: image_reference.to_string(),
            })
    }

    async fn fetch_blob(
        &self,
        repository: &RepositoryContext,
        component: &ComponentDescriptor,
        digest: &str,
    ) -> RegistryResult<Vec<u8>> {
        let key = (
            normalize_base_url(repository),
            component.name().to_string(),
            digest.to_string(),
        );
        self.blobs
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                reference: format!("{}@{digest}", component.identity()),
            })
    }

    async fn push(
        &self,
        repository: &RepositoryContext,
        descriptor: &ComponentDescriptor,
        blobs: &[LocalBlob],
    ) -> RegistryResult<()> {
        for blob in blobs {
            self.insert_blob(
                repository,
                descriptor.name(),
                &blob.digest,
                blob.content.clone(),
            )
            .await;
        }
        self.insert_descriptor(repository, descriptor.clone()).await;
        Ok(())
    }
}
