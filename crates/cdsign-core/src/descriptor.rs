//! Component descriptor model (schema `v2`).

use std::collections::{BTreeMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{IntegrityError, IntegrityResult, NodeRef};

/// Schema version written into new descriptors.
pub const SCHEMA_VERSION: &str = "v2";

/// Access type of resources that have no retrievable content.
pub const NONE_ACCESS_TYPE: &str = "None";

/// Access type of resources stored as OCI artifacts.
pub const OCI_REGISTRY_ACCESS_TYPE: &str = "ociRegistry";

/// Access type of blobs stored next to the component descriptor.
pub const LOCAL_OCI_BLOB_ACCESS_TYPE: &str = "localOciBlob";

/// Repository context type for OCI registries.
pub const OCI_REPOSITORY_TYPE: &str = "ociRegistry";

/// Sentinel hash algorithm marking an excluded resource.
pub const EXCLUDED_HASH_ALGORITHM: &str = "NO-DIGEST";

/// Sentinel normalisation algorithm marking an excluded resource.
pub const EXCLUDED_NORMALISATION_ALGORITHM: &str = "EXCLUDE-FROM-SIGNATURE";

/// Sentinel digest value marking an excluded resource.
pub const EXCLUDED_VALUE: &str = "NO-DIGEST";

/// Extra identity attributes of a reference or resource.
pub type Identity = BTreeMap<String, String>;

/// A component descriptor document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub meta: Metadata,

    pub component: ComponentSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub schema_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub repository_contexts: Vec<RepositoryContext>,

    #[serde(default)]
    pub provider: String,

    #[serde(default)]
    pub component_references: Vec<ComponentReference>,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

/// Location a component descriptor is stored at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryContext {
    #[serde(rename = "type")]
    pub context_type: String,

    pub base_url: String,
}

impl RepositoryContext {
    pub fn oci(base_url: impl Into<String>) -> Self {
        Self {
            context_type: OCI_REPOSITORY_TYPE.to_string(),
            base_url: base_url.into(),
        }
    }
}

/// Edge to another component descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReference {
    pub name: String,

    pub component_name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Identity::is_empty")]
    pub extra_identity: Identity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

impl ComponentReference {
    pub fn new(
        name: impl Into<String>,
        component_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            component_name: component_name.into(),
            version: version.into(),
            extra_identity: Identity::new(),
            digest: None,
            labels: Vec::new(),
        }
    }

    pub fn identity(&self) -> String {
        format_identity(&self.name, &self.version, &self.extra_identity)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceRelation {
    #[default]
    Local,
    External,
}

/// A content item of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Identity::is_empty")]
    pub extra_identity: Identity,

    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub relation: ResourceRelation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        resource_type: impl Into<String>,
        access: Option<Access>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            extra_identity: Identity::new(),
            resource_type: resource_type.into(),
            relation: ResourceRelation::Local,
            access,
            digest: None,
            labels: Vec::new(),
        }
    }

    pub fn identity(&self) -> String {
        format_identity(&self.name, &self.version, &self.extra_identity)
    }

    /// Access type tag, `None` when the resource carries no access at all.
    pub fn access_type(&self) -> Option<&str> {
        self.access.as_ref().map(|a| a.access_type.as_str())
    }

    /// Whether the resource has no retrievable content.
    pub fn has_no_access(&self) -> bool {
        self.access.as_ref().map_or(true, Access::is_none)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: Value,
}

/// Open union describing how to retrieve a resource, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Access {
    #[serde(rename = "type")]
    pub access_type: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Access {
    pub fn none() -> Self {
        Self {
            access_type: NONE_ACCESS_TYPE.to_string(),
            fields: Map::new(),
        }
    }

    pub fn oci_registry(image_reference: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "imageReference".to_string(),
            Value::String(image_reference.into()),
        );
        Self {
            access_type: OCI_REGISTRY_ACCESS_TYPE.to_string(),
            fields,
        }
    }

    pub fn local_oci_blob(digest: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("digest".to_string(), Value::String(digest.into()));
        Self {
            access_type: LOCAL_OCI_BLOB_ACCESS_TYPE.to_string(),
            fields,
        }
    }

    pub fn is_none(&self) -> bool {
        self.access_type == NONE_ACCESS_TYPE
    }

    /// Decode the access fields into a typed access variant.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

/// Typed `ociRegistry` access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciRegistryAccess {
    pub image_reference: String,
}

/// Typed `localOciBlob` access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalOciBlobAccess {
    pub digest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Persisted digest triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestSpec {
    #[serde(default)]
    pub hash_algorithm: String,

    #[serde(default)]
    pub normalisation_algorithm: String,

    #[serde(default)]
    pub value: String,
}

impl DigestSpec {
    pub fn new(
        hash_algorithm: impl Into<String>,
        normalisation_algorithm: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            hash_algorithm: hash_algorithm.into(),
            normalisation_algorithm: normalisation_algorithm.into(),
            value: value.into(),
        }
    }

    /// All three fields are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.hash_algorithm.is_empty()
            && !self.normalisation_algorithm.is_empty()
            && !self.value.is_empty()
    }

    fn is_excluded_sentinel(&self) -> bool {
        self.hash_algorithm == EXCLUDED_HASH_ALGORITHM
            && self.normalisation_algorithm == EXCLUDED_NORMALISATION_ALGORITHM
            && self.value == EXCLUDED_VALUE
    }
}

impl std::fmt::Display for DigestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}:{}",
            self.normalisation_algorithm, self.hash_algorithm, self.value
        )
    }
}

/// Digest of a reference or resource.
///
/// `Excluded` marks a resource deliberately left out of the signature; on the
/// wire it is the `NO-DIGEST`/`EXCLUDE-FROM-SIGNATURE` sentinel triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Digest {
    Excluded,
    Value(DigestSpec),
}

impl Digest {
    pub fn excluded() -> Self {
        Self::Excluded
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, Self::Excluded)
    }

    /// Wire representation.
    pub fn to_spec(&self) -> DigestSpec {
        match self {
            Self::Excluded => DigestSpec::new(
                EXCLUDED_HASH_ALGORITHM,
                EXCLUDED_NORMALISATION_ALGORITHM,
                EXCLUDED_VALUE,
            ),
            Self::Value(spec) => spec.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Self::Excluded => true,
            Self::Value(spec) => spec.is_complete(),
        }
    }
}

impl From<DigestSpec> for Digest {
    fn from(spec: DigestSpec) -> Self {
        if spec.is_excluded_sentinel() {
            Self::Excluded
        } else {
            Self::Value(spec)
        }
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excluded => f.write_str(EXCLUDED_NORMALISATION_ALGORITHM),
            Self::Value(spec) => spec.fmt(f),
        }
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_spec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DigestSpec::deserialize(deserializer).map(Digest::from)
    }
}

/// A named signature over the root digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub digest: DigestSpec,
    pub signature: SignatureSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSpec {
    pub algorithm: String,

    pub value: String,

    #[serde(default)]
    pub media_type: String,
}

impl ComponentDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            meta: Metadata {
                schema_version: SCHEMA_VERSION.to_string(),
            },
            component: ComponentSpec {
                name: name.into(),
                version: version.into(),
                repository_contexts: Vec::new(),
                provider: "internal".to_string(),
                component_references: Vec::new(),
                resources: Vec::new(),
                labels: Vec::new(),
            },
            signatures: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn version(&self) -> &str {
        &self.component.version
    }

    /// `name:version` of the component.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.component.name, self.component.version)
    }

    pub fn node(&self) -> NodeRef {
        NodeRef::component(&self.component.name, &self.component.version)
    }

    pub(crate) fn reference_node(&self, reference: &ComponentReference) -> NodeRef {
        NodeRef::Reference {
            parent: self.identity(),
            name: reference.name.clone(),
            version: reference.version.clone(),
        }
    }

    pub(crate) fn resource_node(&self, resource: &Resource) -> NodeRef {
        NodeRef::Resource {
            parent: self.identity(),
            name: resource.name.clone(),
            version: resource.version.clone(),
        }
    }

    /// The repository context the descriptor currently lives in (the last one).
    pub fn effective_repository_context(&self) -> Option<&RepositoryContext> {
        self.component.repository_contexts.last()
    }

    /// Append `repository` unless it is already the effective context.
    pub fn inject_repository_context(&mut self, repository: &RepositoryContext) {
        if self.effective_repository_context() != Some(repository) {
            self.component.repository_contexts.push(repository.clone());
        }
    }

    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.name == name)
    }

    /// Attach `signature`, replacing any existing one with the same name.
    pub fn upsert_signature(&mut self, signature: Signature) {
        match self.signatures.iter_mut().find(|s| s.name == signature.name) {
            Some(existing) => *existing = signature,
            None => self.signatures.push(signature),
        }
    }

    /// Reject descriptors with repeated reference or resource identities.
    pub fn validate_identities(&self) -> IntegrityResult<()> {
        let mut seen = HashSet::new();
        for reference in &self.component.component_references {
            let identity = reference.identity();
            if !seen.insert(identity.clone()) {
                return Err(IntegrityError::DuplicateIdentity {
                    node: self.node(),
                    identity: format!("reference {identity}"),
                });
            }
        }

        let mut seen = HashSet::new();
        for resource in &self.component.resources {
            let identity = resource.identity();
            if !seen.insert(identity.clone()) {
                return Err(IntegrityError::DuplicateIdentity {
                    node: self.node(),
                    identity: format!("resource {identity}"),
                });
            }
        }

        Ok(())
    }
}

fn format_identity(name: &str, version: &str, extra: &Identity) -> String {
    if extra.is_empty() {
        return format!("{name}:{version}");
    }
    let attrs: Vec<String> = extra.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}:{version}[{}]", attrs.join(","))
}
