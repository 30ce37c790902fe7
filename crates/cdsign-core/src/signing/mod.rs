//! Signing backends and the sign/publish flow.
//!
//! A signature covers the canonical digest of one descriptor. Referenced
//! descriptors are covered transitively through the reference digests, so
//! signing the root of a digested graph protects the whole graph.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::descriptor::{
    ComponentDescriptor, DigestSpec, LocalOciBlobAccess, RepositoryContext, Signature,
    SignatureSpec, LOCAL_OCI_BLOB_ACCESS_TYPE,
};
use crate::digest::{hash_descriptor, Hasher};
use crate::digester::invalid_access;
use crate::error::{IntegrityError, IntegrityResult};
use crate::graph::{DigestOptions, GraphEngine};
use crate::registry::{LocalBlob, DEFAULT_BLOB_MEDIA_TYPE};

pub mod attestation;
pub mod ed25519;
pub mod rsa;
pub mod server;

pub use attestation::{AttestationSigner, AttestationVerifier, ATTESTATION_ALGORITHM};
pub use ed25519::{Ed25519Signer, Ed25519Verifier, ED25519_ALGORITHM};
pub use self::rsa::{RsaSigner, RsaVerifier, RSA_ALGORITHM};
pub use server::{SigningServerSigner, SIGNING_SERVER_RSA_ALGORITHM};

/// Produces a signature over a descriptor digest.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        descriptor: &ComponentDescriptor,
        digest: &DigestSpec,
    ) -> IntegrityResult<SignatureSpec>;
}

/// Checks a signature attached to a descriptor.
///
/// Implementations only validate `signature` against its own digest; callers
/// are responsible for checking that digest against the descriptor.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        descriptor: &ComponentDescriptor,
        signature: &Signature,
    ) -> IntegrityResult<()>;
}

/// Options for [`sign_graph`].
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Name the signature is attached under; replaces an existing one.
    pub signature_name: String,

    /// Sign every descriptor of the graph, not only the root.
    pub recursive: bool,

    /// Digest the graph without signing.
    pub skip_signing: bool,

    pub digest: DigestOptions,
}

impl SignOptions {
    pub fn new(signature_name: impl Into<String>) -> Self {
        Self {
            signature_name: signature_name.into(),
            recursive: false,
            skip_signing: false,
            digest: DigestOptions::default(),
        }
    }
}

/// Hash `cd` and attach a signature from `signer` named `signature_name`.
pub async fn sign_descriptor(
    cd: &mut ComponentDescriptor,
    signer: &dyn Signer,
    hasher: &mut Hasher,
    signature_name: &str,
) -> IntegrityResult<()> {
    let digest = hash_descriptor(cd, hasher)?;
    let signature = signer.sign(cd, &digest).await?;
    cd.upsert_signature(Signature {
        name: signature_name.to_string(),
        digest,
        signature,
    });
    Ok(())
}

/// Digest the graph below `root` and sign its root (or all of it).
///
/// Returns the batch in upload order, children first. Nothing is returned
/// unless every descriptor was digested and signed.
pub async fn sign_graph(
    engine: &GraphEngine,
    root: &ComponentDescriptor,
    repository: &RepositoryContext,
    signer: Option<&dyn Signer>,
    options: &SignOptions,
) -> IntegrityResult<Vec<ComponentDescriptor>> {
    let mut batch = engine
        .digest_graph(root, repository, &options.digest)
        .await?;

    if options.skip_signing {
        return Ok(batch);
    }
    let signer = signer.ok_or_else(|| IntegrityError::Config {
        message: "no signer configured".to_string(),
    })?;

    let mut hasher = Hasher::for_name(&options.digest.hash_algorithm)?;
    let deadline = options.digest.deadline;
    let first = if options.recursive {
        0
    } else {
        batch.len().saturating_sub(1)
    };

    for cd in &mut batch[first..] {
        deadline
            .run(sign_descriptor(
                cd,
                signer,
                &mut hasher,
                &options.signature_name,
            ))
            .await?;
        info!(
            component = %cd.identity(),
            signature = %options.signature_name,
            "signed component descriptor"
        );
    }

    Ok(batch)
}

/// Push a fully processed batch to `target`, children first.
///
/// Each descriptor gets `target` as its effective repository context, and the
/// `localOciBlob` content of its resources is copied over from `source`, so
/// the target repository is self-contained.
pub async fn publish(
    engine: &GraphEngine,
    batch: &mut [ComponentDescriptor],
    source: &RepositoryContext,
    target: &RepositoryContext,
) -> IntegrityResult<()> {
    for cd in batch.iter_mut() {
        let blobs = local_blobs(engine, cd, source).await?;
        cd.inject_repository_context(target);
        engine
            .registry()
            .push(target, cd, &blobs)
            .await
            .map_err(|source| IntegrityError::Resolution {
                node: cd.node(),
                source,
            })?;
        debug!(
            component = %cd.identity(),
            blobs = blobs.len(),
            target = %target.base_url,
            "published component descriptor"
        );
    }
    Ok(())
}

/// Content of the `localOciBlob` resources of `cd`, read from `source`.
async fn local_blobs(
    engine: &GraphEngine,
    cd: &ComponentDescriptor,
    source: &RepositoryContext,
) -> IntegrityResult<Vec<LocalBlob>> {
    let mut blobs: Vec<LocalBlob> = Vec::new();
    for resource in &cd.component.resources {
        let Some(access) = &resource.access else {
            continue;
        };
        if access.access_type != LOCAL_OCI_BLOB_ACCESS_TYPE {
            continue;
        }
        let access: LocalOciBlobAccess = access
            .decode()
            .map_err(|e| invalid_access(cd, resource, e))?;
        if blobs.iter().any(|b| b.digest == access.digest) {
            continue;
        }

        let content = engine
            .registry()
            .fetch_blob(source, cd, &access.digest)
            .await
            .map_err(|e| IntegrityError::Resolution {
                node: cd.resource_node(resource),
                source: e,
            })?;
        blobs.push(LocalBlob {
            digest: access.digest,
            media_type: access
                .media_type
                .unwrap_or_else(|| DEFAULT_BLOB_MEDIA_TYPE.to_string()),
            content,
        });
    }
    Ok(blobs)
}

/// Build a signer from a PEM private key (RSA PKCS#1/PKCS#8 or Ed25519 PKCS#8).
pub fn signer_from_pem(pem: &str) -> IntegrityResult<Box<dyn Signer>> {
    if pem.contains("BEGIN RSA PRIVATE KEY") {
        return Ok(Box::new(RsaSigner::from_pem(pem)?));
    }
    match Ed25519Signer::from_pkcs8_pem(pem) {
        Ok(signer) => Ok(Box::new(signer)),
        Err(_) => Ok(Box::new(RsaSigner::from_pem(pem)?)),
    }
}

pub(crate) fn decode_digest_value(
    descriptor: &ComponentDescriptor,
    digest: &DigestSpec,
) -> IntegrityResult<Vec<u8>> {
    hex::decode(&digest.value).map_err(|e| IntegrityError::Signing {
        node: descriptor.node(),
        message: format!("digest value is not hex: {e}"),
    })
}
