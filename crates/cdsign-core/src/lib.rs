//! Digesting, signing and verification of component descriptor graphs.
//!
//! A component descriptor names a component version, the resources it ships
//! and the other component versions it references. This crate provides:
//!
//! - a canonical, order-preserving serialization of descriptors
//! - resource digesting per access type (`ociRegistry`, `localOciBlob`)
//! - a depth-first digest walk over the reference graph
//! - signers and verifiers (RSA, Ed25519, signing server, attestation service)
//! - an OCI registry client storing descriptors as OCI artifacts
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cdsign_core::signing::{publish, sign_graph, RsaSigner, SignOptions};
//! use cdsign_core::{GraphEngine, RegistryClient, RepositoryContext};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = GraphEngine::new(Arc::new(RegistryClient::from_env()?));
//! let source = RepositoryContext::oci("registry.local/components");
//! let options = SignOptions::new("release");
//!
//! let root = engine
//!     .resolve(&source, "example.com/app", "v1.0.0", &options.digest)
//!     .await?;
//! let signer = RsaSigner::from_key_file("release.pem".as_ref())?;
//! let mut batch = sign_graph(&engine, &root, &source, Some(&signer), &options).await?;
//!
//! let target = RepositoryContext::oci("registry.local/signed");
//! publish(&engine, &mut batch, &source, &target).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CDSIGN_REGISTRY_TOKEN` | Bearer token for the OCI registry |
//! | `CDSIGN_REGISTRY_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `CDSIGN_REGISTRY_MAX_RETRIES` | Max retries for transient failures (default: 3) |
//! | `CDSIGN_PLAIN_HTTP` | Talk plain HTTP to registries without an explicit scheme |

pub mod auth;
pub mod canonicalize;
pub mod client;
pub mod compare;
pub mod descriptor;
pub mod digest;
pub mod digester;
pub mod error;
pub mod graph;
pub mod reference;
pub mod registry;
pub mod signing;
pub mod types;
pub mod verify;

// Re-export main types
pub use auth::TokenProvider;
pub use client::RegistryClient;
pub use compare::{compare, CompareReport};
pub use descriptor::{
    Access, ComponentDescriptor, ComponentReference, Digest, DigestSpec, RepositoryContext,
    Resource, Signature, SignatureSpec,
};
pub use digest::{hash_descriptor, Hasher};
pub use digester::{DigesterRegistry, ResourceDigester};
pub use error::{IntegrityError, IntegrityResult, NodeRef, RegistryError, RegistryResult};
pub use graph::{Deadline, DigestOptions, GraphEngine};
pub use registry::{ComponentRegistry, LocalBlob, MemoryRegistry};
pub use signing::{Signer, Verifier};
pub use types::RegistryConfig;
pub use verify::{verify_component_descriptor, VerifyOptions, VerifyReport};

pub use canonicalize::{canonicalize, to_canonical_jcs_bytes};
