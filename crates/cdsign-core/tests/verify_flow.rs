//! End-to-end tests: sign a graph, publish it, verify it at the target.

use std::sync::Arc;

use cdsign_core::descriptor::{Access, ComponentReference, Resource};
use cdsign_core::signing::{
    publish, sign_graph, Ed25519Signer, Ed25519Verifier, RsaSigner, RsaVerifier, SignOptions,
};
use cdsign_core::{
    verify_component_descriptor, ComponentDescriptor, GraphEngine, IntegrityError, MemoryRegistry,
    ComponentRegistry, RepositoryContext, Signer, Verifier, VerifyOptions,
};
use ed25519_dalek::SigningKey;
use rsa::RsaPrivateKey;

fn source() -> RepositoryContext {
    RepositoryContext::oci("registry.local/source")
}

fn target() -> RepositoryContext {
    RepositoryContext::oci("registry.local/target")
}

async fn seed(registry: &MemoryRegistry) {
    registry
        .insert_blob(&source(), "example.com/root", "sha256:p", b"data-parent".to_vec())
        .await;
    registry
        .insert_blob(&source(), "example.com/child", "sha256:c", b"data-child".to_vec())
        .await;

    let mut child = ComponentDescriptor::new("example.com/child", "v1.0");
    child.component.resources.push(Resource::new(
        "child-data",
        "v1.0",
        "plain-text",
        Some(Access::local_oci_blob("sha256:c")),
    ));
    registry.insert_descriptor(&source(), child).await;
}

fn root() -> ComponentDescriptor {
    let mut cd = ComponentDescriptor::new("example.com/root", "v1.0");
    cd.component.component_references.push(ComponentReference::new(
        "child",
        "example.com/child",
        "v1.0",
    ));
    cd.component.resources.push(Resource::new(
        "parent-data",
        "v1.0",
        "plain-text",
        Some(Access::local_oci_blob("sha256:p")),
    ));
    cd
}

/// Sign `root()` with `signer`, publish to the target and return the stored root.
async fn sign_and_publish(
    engine: &GraphEngine,
    registry: &MemoryRegistry,
    signer: &dyn Signer,
) -> ComponentDescriptor {
    let mut batch = sign_graph(engine, &root(), &source(), Some(signer), &SignOptions::new("release"))
        .await
        .expect("signing failed");
    publish(engine, &mut batch, &source(), &target())
        .await
        .expect("publish failed");

    registry
        .descriptor(&target(), "example.com/root", "v1.0")
        .await
        .expect("published root")
}

async fn verify(
    engine: &GraphEngine,
    root: &ComponentDescriptor,
    verifier: &dyn Verifier,
) -> Result<(), IntegrityError> {
    verify_component_descriptor(engine, root, &target(), verifier, &VerifyOptions::new("release"))
        .await
        .map(|_| ())
}

async fn setup() -> (GraphEngine, Arc<MemoryRegistry>) {
    let registry = Arc::new(MemoryRegistry::new());
    seed(&registry).await;
    (GraphEngine::new(registry.clone()), registry)
}

#[tokio::test]
async fn test_rsa_round_trip() {
    let (engine, registry) = setup().await;
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("keygen");

    let published = sign_and_publish(&engine, &registry, &RsaSigner::new(key.clone())).await;
    assert_eq!(registry.descriptor_count(&target()).await, 2);
    let child = registry
        .descriptor(&target(), "example.com/child", "v1.0")
        .await
        .expect("published child");
    assert_eq!(
        registry.fetch_blob(&target(), &child, "sha256:c").await.unwrap(),
        b"data-child"
    );

    let report = verify_component_descriptor(
        &engine,
        &published,
        &target(),
        &RsaVerifier::new(key.to_public_key()),
        &VerifyOptions::new("release"),
    )
    .await
    .expect("verification failed");
    assert_eq!(report.component, "example.com/root:v1.0");
    assert_eq!(report.descriptors_checked, 2);
}

#[tokio::test]
async fn test_ed25519_round_trip() {
    let (engine, registry) = setup().await;
    let key = SigningKey::generate(&mut rand::thread_rng());

    let published = sign_and_publish(&engine, &registry, &Ed25519Signer::new(key.clone())).await;
    verify(&engine, &published, &Ed25519Verifier::new(key.verifying_key()))
        .await
        .expect("verification failed");
}

#[tokio::test]
async fn test_wrong_key_fails() {
    let (engine, registry) = setup().await;
    let key = SigningKey::generate(&mut rand::thread_rng());
    let other = SigningKey::generate(&mut rand::thread_rng());

    let published = sign_and_publish(&engine, &registry, &Ed25519Signer::new(key)).await;
    let err = verify(&engine, &published, &Ed25519Verifier::new(other.verifying_key()))
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrityError::SignatureInvalid { .. }), "{err}");
}

#[tokio::test]
async fn test_unknown_signature_name_fails() {
    let (engine, registry) = setup().await;
    let key = SigningKey::generate(&mut rand::thread_rng());
    let published = sign_and_publish(&engine, &registry, &Ed25519Signer::new(key.clone())).await;

    let err = verify_component_descriptor(
        &engine,
        &published,
        &target(),
        &Ed25519Verifier::new(key.verifying_key()),
        &VerifyOptions::new("nightly"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IntegrityError::SignatureNotFound { .. }), "{err}");
}

#[tokio::test]
async fn test_tampered_signature_digest_fails() {
    let (engine, registry) = setup().await;
    let key = SigningKey::generate(&mut rand::thread_rng());
    let mut published =
        sign_and_publish(&engine, &registry, &Ed25519Signer::new(key.clone())).await;

    published.signatures[0].digest.value = "0".repeat(64);
    let err = verify(&engine, &published, &Ed25519Verifier::new(key.verifying_key()))
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrityError::DigestMismatch { .. }), "{err}");
}

#[tokio::test]
async fn test_tampered_child_content_fails_after_signature_check() {
    let (engine, registry) = setup().await;
    let key = SigningKey::generate(&mut rand::thread_rng());
    let published = sign_and_publish(&engine, &registry, &Ed25519Signer::new(key.clone())).await;

    registry
        .insert_blob(&target(), "example.com/child", "sha256:c", b"evil".to_vec())
        .await;
    let err = verify(&engine, &published, &Ed25519Verifier::new(key.verifying_key()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("example.com/child:v1.0"), "{err}");
}

#[tokio::test]
async fn test_resigning_replaces_signature() {
    let (engine, registry) = setup().await;
    let first = SigningKey::generate(&mut rand::thread_rng());
    let second = SigningKey::generate(&mut rand::thread_rng());

    sign_and_publish(&engine, &registry, &Ed25519Signer::new(first)).await;
    let published = registry
        .descriptor(&target(), "example.com/root", "v1.0")
        .await
        .expect("published root");

    let mut batch = sign_graph(
        &engine,
        &published,
        &target(),
        Some(&Ed25519Signer::new(second.clone())),
        &SignOptions::new("release"),
    )
    .await
    .expect("re-signing failed");
    let resigned = batch.pop().expect("root");

    assert_eq!(resigned.signatures.len(), 1);
    verify(&engine, &resigned, &Ed25519Verifier::new(second.verifying_key()))
        .await
        .expect("verification failed");
}
