//! Verification of signed component descriptor graphs.
//!
//! A graph verifies only if all of the following hold:
//! 1. the named signature is attached to the root,
//! 2. the root's canonical digest equals the signed digest,
//! 3. the signature is valid for that digest,
//! 4. every digest below the root matches the content it describes.

use tracing::{debug, info};

use crate::descriptor::{ComponentDescriptor, RepositoryContext};
use crate::digest::{hash_descriptor, Hasher, JSON_NORMALISATION_V1};
use crate::error::{IntegrityError, IntegrityResult};
use crate::graph::{DigestOptions, GraphEngine};
use crate::signing::Verifier;

/// Options for [`verify_component_descriptor`].
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub signature_name: String,

    /// Walk options; the hash algorithm is taken from the signature.
    pub digest: DigestOptions,
}

impl VerifyOptions {
    pub fn new(signature_name: impl Into<String>) -> Self {
        Self {
            signature_name: signature_name.into(),
            digest: DigestOptions::default(),
        }
    }

    pub fn with_digest_options(mut self, digest: DigestOptions) -> Self {
        self.digest = digest;
        self
    }
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// `name:version` of the root.
    pub component: String,
    pub signature_name: String,
    pub signature_algorithm: String,
    /// Number of descriptors whose digests were re-derived.
    pub descriptors_checked: usize,
}

/// Verify `root` and everything it references.
pub async fn verify_component_descriptor(
    engine: &GraphEngine,
    root: &ComponentDescriptor,
    repository: &RepositoryContext,
    verifier: &dyn Verifier,
    options: &VerifyOptions,
) -> IntegrityResult<VerifyReport> {
    let signature = root
        .signature(&options.signature_name)
        .ok_or_else(|| IntegrityError::SignatureNotFound {
            node: root.node(),
            signature_name: options.signature_name.clone(),
        })?;

    let mut hasher = Hasher::for_name(&signature.digest.hash_algorithm)?;
    let recomputed = hash_descriptor(root, &mut hasher)?;
    if signature.digest.normalisation_algorithm != JSON_NORMALISATION_V1
        || recomputed != signature.digest
    {
        return Err(IntegrityError::DigestMismatch {
            node: root.node(),
            expected: signature.digest.to_string(),
            actual: recomputed.to_string(),
        });
    }
    debug!(component = %root.identity(), "root digest matches signature");

    verifier.verify(root, signature).await?;
    debug!(component = %root.identity(), algorithm = %signature.signature.algorithm, "signature valid");

    let walk = options
        .digest
        .clone()
        .with_hash_algorithm(hasher.algorithm());
    let checked = engine.check_graph(root, repository, &walk).await?;

    info!(
        component = %root.identity(),
        signature = %options.signature_name,
        descriptors = checked.len(),
        "component descriptor verified"
    );
    Ok(VerifyReport {
        component: root.identity(),
        signature_name: options.signature_name.clone(),
        signature_algorithm: signature.signature.algorithm.clone(),
        descriptors_checked: checked.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Signature, SignatureSpec};
    use crate::registry::MemoryRegistry;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AcceptAll;

    #[async_trait]
    impl Verifier for AcceptAll {
        async fn verify(&self, _: &ComponentDescriptor, _: &Signature) -> IntegrityResult<()> {
            Ok(())
        }
    }

    struct RejectAll;

    #[async_trait]
    impl Verifier for RejectAll {
        async fn verify(&self, cd: &ComponentDescriptor, _: &Signature) -> IntegrityResult<()> {
            Err(IntegrityError::SignatureInvalid {
                node: cd.node(),
                reason: "rejected".to_string(),
            })
        }
    }

    fn engine() -> GraphEngine {
        GraphEngine::new(Arc::new(MemoryRegistry::new()))
    }

    fn repo() -> RepositoryContext {
        RepositoryContext::oci("registry.local/cd")
    }

    fn signed(cd: &mut ComponentDescriptor) {
        let digest = hash_descriptor(cd, &mut Hasher::sha256()).unwrap();
        cd.upsert_signature(Signature {
            name: "sig".to_string(),
            digest,
            signature: SignatureSpec {
                algorithm: "TEST".to_string(),
                value: String::new(),
                media_type: String::new(),
            },
        });
    }

    #[tokio::test]
    async fn verifies_signed_leaf() {
        let mut cd = ComponentDescriptor::new("c", "v1");
        signed(&mut cd);
        let report = verify_component_descriptor(
            &engine(),
            &cd,
            &repo(),
            &AcceptAll,
            &VerifyOptions::new("sig"),
        )
        .await
        .unwrap();
        assert_eq!(report.component, "c:v1");
        assert_eq!(report.descriptors_checked, 1);
    }

    #[tokio::test]
    async fn missing_signature() {
        let cd = ComponentDescriptor::new("c", "v1");
        let err = verify_component_descriptor(
            &engine(),
            &cd,
            &repo(),
            &AcceptAll,
            &VerifyOptions::new("sig"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IntegrityError::SignatureNotFound { .. }));
    }

    #[tokio::test]
    async fn modified_descriptor_fails_digest_check() {
        let mut cd = ComponentDescriptor::new("c", "v1");
        signed(&mut cd);
        cd.component.version = "v2".to_string();
        let err = verify_component_descriptor(
            &engine(),
            &cd,
            &repo(),
            &AcceptAll,
            &VerifyOptions::new("sig"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IntegrityError::DigestMismatch { .. }));
    }

    #[tokio::test]
    async fn foreign_normalisation_is_rejected() {
        let mut cd = ComponentDescriptor::new("c", "v1");
        signed(&mut cd);
        cd.signatures[0].digest.normalisation_algorithm = "somethingElse".to_string();
        let err = verify_component_descriptor(
            &engine(),
            &cd,
            &repo(),
            &AcceptAll,
            &VerifyOptions::new("sig"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IntegrityError::DigestMismatch { .. }));
    }

    #[tokio::test]
    async fn verifier_rejection_is_propagated() {
        let mut cd = ComponentDescriptor::new("c", "v1");
        signed(&mut cd);
        let err = verify_component_descriptor(
            &engine(),
            &cd,
            &repo(),
            &RejectAll,
            &VerifyOptions::new("sig"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IntegrityError::SignatureInvalid { .. }));
    }
}
