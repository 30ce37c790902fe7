//! Canonical form of component descriptors.
//!
//! The signable projection of a descriptor is rendered as nested lists of
//! single-key objects ("entries"), recursively sorted by key:
//!
//! ```text
//! [{"component":[{"componentReferences":[...]},{"name":..},{"resources":[...]},{"version":..}]},
//!  {"meta":[{"schemaVersion":..}]}]
//! ```
//!
//! Only name, version, extra identity and digest of references and resources
//! take part. Repository contexts, provider, labels, access details and
//! signatures are left out, so relocating or signing a descriptor never
//! changes its digest.
//!
//! Reference and resource lists keep their order; entry lists are sorted.
//! The output is compact JSON without HTML escaping and without a trailing
//! newline, byte-compatible with signatures produced by other tooling.

mod entries;
mod json;

#[cfg(test)]
mod tests;

pub use json::to_canonical_jcs_bytes;

use crate::descriptor::{ComponentDescriptor, Identity};
use crate::error::{IntegrityError, IntegrityResult};

use entries::{entry, Node};

/// Render the canonical bytes of `cd`.
///
/// Fails with [`IntegrityError::NotNormaliseable`] if any component reference
/// lacks a complete digest. Resources without digests are rendered without
/// one.
pub fn canonicalize(cd: &ComponentDescriptor) -> IntegrityResult<Vec<u8>> {
    check_normaliseable(cd)?;

    let mut root = project(cd);
    root.deep_sort();

    root.to_json_bytes()
        .map_err(|e| IntegrityError::NotNormaliseable {
            node: cd.node(),
            reason: format!("failed to serialize canonical form: {e}"),
        })
}

/// Check that every component reference carries a complete digest.
pub fn check_normaliseable(cd: &ComponentDescriptor) -> IntegrityResult<()> {
    for reference in &cd.component.component_references {
        let complete = reference.digest.as_ref().is_some_and(|d| d.is_complete());
        if !complete {
            return Err(IntegrityError::NotNormaliseable {
                node: cd.node(),
                reason: format!(
                    "missing digest in component reference {}:{}",
                    reference.name, reference.version
                ),
            });
        }
    }
    Ok(())
}

fn project(cd: &ComponentDescriptor) -> Node {
    let references = cd
        .component
        .component_references
        .iter()
        .map(|reference| {
            let mut fields = vec![
                entry("name", Node::str(&reference.name)),
                entry("version", Node::str(&reference.version)),
                entry("extraIdentity", extra_identity(&reference.extra_identity)),
            ];
            if let Some(digest) = &reference.digest {
                fields.push(entry("digest", digest_node(&digest.to_spec())));
            }
            Node::Entries(fields)
        })
        .collect();

    let resources = cd
        .component
        .resources
        .iter()
        .map(|resource| {
            let mut fields = vec![
                entry("name", Node::str(&resource.name)),
                entry("version", Node::str(&resource.version)),
                entry("extraIdentity", extra_identity(&resource.extra_identity)),
            ];
            match &resource.digest {
                Some(digest) if !resource.has_no_access() => {
                    fields.push(entry("digest", digest_node(&digest.to_spec())));
                }
                _ => {}
            }
            Node::Entries(fields)
        })
        .collect();

    let component = Node::Entries(vec![
        entry("name", Node::str(&cd.component.name)),
        entry("version", Node::str(&cd.component.version)),
        entry("componentReferences", Node::List(references)),
        entry("resources", Node::List(resources)),
    ]);

    let meta = Node::Entries(vec![entry(
        "schemaVersion",
        Node::str(&cd.meta.schema_version),
    )]);

    Node::Entries(vec![
        entry("meta", meta),
        entry("component", component),
    ])
}

fn digest_node(spec: &crate::descriptor::DigestSpec) -> Node {
    Node::Entries(vec![
        entry("hashAlgorithm", Node::str(&spec.hash_algorithm)),
        entry(
            "normalisationAlgorithm",
            Node::str(&spec.normalisation_algorithm),
        ),
        entry("value", Node::str(&spec.value)),
    ])
}

// An empty identity renders as `null`, not `[]`; existing signatures depend on it.
fn extra_identity(identity: &Identity) -> Node {
    if identity.is_empty() {
        return Node::Null;
    }
    Node::Entries(
        identity
            .iter()
            .map(|(k, v)| entry(k, Node::str(v)))
            .collect(),
    )
}
