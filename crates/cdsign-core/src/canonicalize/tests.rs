//! Canonical form freeze tests.

use super::*;
use crate::descriptor::{
    Access, ComponentReference, Digest, DigestSpec, Label, RepositoryContext, Resource, Signature,
    SignatureSpec,
};
use crate::digest::{hash_descriptor, Hasher};

fn text(cd: &ComponentDescriptor) -> String {
    String::from_utf8(canonicalize(cd).unwrap()).unwrap()
}

fn json_digest(value: &str) -> Digest {
    Digest::Value(DigestSpec::new("sha256", "jsonNormalisationV1", value))
}

fn sample() -> ComponentDescriptor {
    let mut cd = ComponentDescriptor::new("example.com/r", "v1.0");

    let mut reference = ComponentReference::new("child", "example.com/c", "v1.0");
    reference.digest = Some(json_digest("abc"));
    cd.component.component_references.push(reference);

    let mut resource = Resource::new("res", "v1.0", "plain", Some(Access::none()));
    resource.extra_identity.insert("b".to_string(), "2".to_string());
    resource.extra_identity.insert("a".to_string(), "1".to_string());
    cd.component.resources.push(resource);

    cd
}

// ==================== Golden Vector Tests ====================

#[test]
fn golden_vector_empty_descriptor() {
    let cd = ComponentDescriptor::new("c", "v1");
    assert_eq!(
        text(&cd),
        r#"[{"component":[{"componentReferences":[]},{"name":"c"},{"resources":[]},{"version":"v1"}]},{"meta":[{"schemaVersion":"v2"}]}]"#
    );
}

#[test]
fn golden_vector_reference_and_none_resource() {
    assert_eq!(
        text(&sample()),
        concat!(
            r#"[{"component":[{"componentReferences":[[{"digest":[{"hashAlgorithm":"sha256"},"#,
            r#"{"normalisationAlgorithm":"jsonNormalisationV1"},{"value":"abc"}]},"#,
            r#"{"extraIdentity":null},{"name":"child"},{"version":"v1.0"}]]},"#,
            r#"{"name":"example.com/r"},"#,
            r#"{"resources":[[{"extraIdentity":[{"a":"1"},{"b":"2"}]},{"name":"res"},{"version":"v1.0"}]]},"#,
            r#"{"version":"v1.0"}]},{"meta":[{"schemaVersion":"v2"}]}]"#
        )
    );
}

#[test]
fn excluded_resource_renders_sentinel() {
    let mut cd = ComponentDescriptor::new("c", "v1");
    let mut resource = Resource::new("img", "v1", "ociImage", Some(Access::oci_registry("r/img:1")));
    resource.digest = Some(Digest::Excluded);
    cd.component.resources.push(resource);

    assert!(text(&cd).contains(
        r#"{"digest":[{"hashAlgorithm":"NO-DIGEST"},{"normalisationAlgorithm":"EXCLUDE-FROM-SIGNATURE"},{"value":"NO-DIGEST"}]}"#
    ));
}

// ==================== Determinism & Exclusion ====================

#[test]
fn output_is_deterministic() {
    let cd = sample();
    assert_eq!(canonicalize(&cd).unwrap(), canonicalize(&cd).unwrap());
}

#[test]
fn unsigned_fields_do_not_contribute() {
    let base = canonicalize(&sample()).unwrap();

    let mut cd = sample();
    cd.component.provider = "someone-else".to_string();
    cd.component
        .repository_contexts
        .push(RepositoryContext::oci("other.registry/cd"));
    cd.component.labels.push(Label {
        name: "team".to_string(),
        value: serde_json::json!("platform"),
    });
    cd.component.component_references[0].component_name = "renamed".to_string();
    cd.component.resources[0].resource_type = "other".to_string();
    cd.signatures.push(Signature {
        name: "sig".to_string(),
        digest: DigestSpec::new("sha256", "jsonNormalisationV1", "00"),
        signature: SignatureSpec {
            algorithm: "RSASSA-PKCS1-V1_5-SIGN".to_string(),
            value: "ff".to_string(),
            media_type: String::new(),
        },
    });

    assert_eq!(canonicalize(&cd).unwrap(), base);
}

#[test]
fn resource_order_is_significant() {
    let mut a = ComponentDescriptor::new("c", "v1");
    a.component
        .resources
        .push(Resource::new("one", "v1", "plain", None));
    a.component
        .resources
        .push(Resource::new("two", "v1", "plain", None));

    let mut b = a.clone();
    b.component.resources.reverse();

    assert_ne!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
}

fn sha256_of(cd: &ComponentDescriptor) -> DigestSpec {
    hash_descriptor(cd, &mut Hasher::sha256()).unwrap()
}

#[test]
fn reference_order_is_significant() {
    let mut a = ComponentDescriptor::new("c", "v1");
    for (name, value) in [("one", "aa"), ("two", "bb")] {
        let mut reference = ComponentReference::new(name, name, "v1");
        reference.digest = Some(json_digest(value));
        a.component.component_references.push(reference);
    }

    let mut b = a.clone();
    b.component.component_references.reverse();

    assert_ne!(sha256_of(&a), sha256_of(&b));
}

#[test]
fn sentinel_changes_hash() {
    let mut undigested = ComponentDescriptor::new("c", "v1");
    undigested.component.resources.push(Resource::new(
        "img",
        "v1",
        "ociImage",
        Some(Access::oci_registry("r/img:1")),
    ));

    let mut excluded = undigested.clone();
    excluded.component.resources[0].digest = Some(Digest::Excluded);

    assert_ne!(sha256_of(&undigested), sha256_of(&excluded));
}

#[test]
fn extra_identity_insertion_order_is_irrelevant() {
    let mut a = ComponentDescriptor::new("c", "v1");
    let mut ra = Resource::new("r", "v1", "plain", None);
    ra.extra_identity.insert("os".to_string(), "linux".to_string());
    ra.extra_identity.insert("arch".to_string(), "amd64".to_string());
    a.component.resources.push(ra);

    let mut b = ComponentDescriptor::new("c", "v1");
    let mut rb = Resource::new("r", "v1", "plain", None);
    rb.extra_identity.insert("arch".to_string(), "amd64".to_string());
    rb.extra_identity.insert("os".to_string(), "linux".to_string());
    b.component.resources.push(rb);

    assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
}

#[test]
fn digest_of_none_access_resource_is_ignored() {
    let base = canonicalize(&sample()).unwrap();
    let mut cd = sample();
    cd.component.resources[0].digest = Some(json_digest("ffff"));
    assert_eq!(canonicalize(&cd).unwrap(), base);
}

#[test]
fn resource_without_digest_is_rendered_without_one() {
    let mut cd = ComponentDescriptor::new("c", "v1");
    cd.component.resources.push(Resource::new(
        "blob",
        "v1",
        "plain",
        Some(Access::local_oci_blob("sha256:aa")),
    ));
    assert_eq!(
        text(&cd),
        r#"[{"component":[{"componentReferences":[]},{"name":"c"},{"resources":[[{"extraIdentity":null},{"name":"blob"},{"version":"v1"}]]},{"version":"v1"}]},{"meta":[{"schemaVersion":"v2"}]}]"#
    );
}

#[test]
fn resource_digest_changes_output() {
    let mut cd = ComponentDescriptor::new("c", "v1");
    let mut resource = Resource::new(
        "blob",
        "v1",
        "plain",
        Some(Access::local_oci_blob("sha256:aa")),
    );
    resource.digest = Some(json_digest("01"));
    cd.component.resources.push(resource);
    let first = canonicalize(&cd).unwrap();

    cd.component.resources[0].digest = Some(json_digest("02"));
    assert_ne!(canonicalize(&cd).unwrap(), first);
}

// ==================== Preconditions ====================

#[test]
fn reference_without_digest_is_not_normaliseable() {
    let mut cd = ComponentDescriptor::new("c", "v1");
    cd.component
        .component_references
        .push(ComponentReference::new("child", "example.com/c", "v1"));

    let err = canonicalize(&cd).unwrap_err();
    assert!(matches!(err, IntegrityError::NotNormaliseable { .. }));
    assert!(err.to_string().contains("child:v1"));
}

#[test]
fn reference_with_partial_digest_is_not_normaliseable() {
    let mut cd = ComponentDescriptor::new("c", "v1");
    let mut reference = ComponentReference::new("child", "example.com/c", "v1");
    reference.digest = Some(Digest::Value(DigestSpec::new("sha256", "", "abc")));
    cd.component.component_references.push(reference);

    assert!(matches!(
        canonicalize(&cd),
        Err(IntegrityError::NotNormaliseable { .. })
    ));
}
