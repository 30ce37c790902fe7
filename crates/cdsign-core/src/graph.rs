//! Digest computation across the component reference graph.
//!
//! The walk is depth-first and post-order: a descriptor is finished only once
//! all of its referenced descriptors are, so every reference digest can be
//! derived from the fully digested child. The walk keeps an explicit stack of
//! frames; each invocation owns its own stack, hasher and output batch.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::descriptor::{ComponentDescriptor, Digest, RepositoryContext, Resource};
use crate::digest::{hash_descriptor, Hasher, SHA256};
use crate::digester::DigesterRegistry;
use crate::error::{IntegrityError, IntegrityResult, NodeRef};
use crate::registry::ComponentRegistry;

/// Options for a graph walk.
#[derive(Debug, Clone)]
pub struct DigestOptions {
    /// Hash algorithm for descriptor and resource digests.
    pub hash_algorithm: String,

    /// Access types whose resources are excluded from signing.
    pub skip_access_types: HashSet<String>,

    /// Shared by every call made with these options.
    pub deadline: Deadline,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: SHA256.to_string(),
            skip_access_types: HashSet::new(),
            deadline: Deadline::none(),
        }
    }
}

impl DigestOptions {
    pub fn with_hash_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.hash_algorithm = algorithm.into();
        self
    }

    pub fn with_skip_access_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_access_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Bound everything done with these options to `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Deadline::after(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Assign missing digests, compare present ones.
    Add,
    /// Like `Add`, but the root must already carry every digest.
    Check,
}

/// Point in time by which an operation has to finish.
///
/// The clock starts when the deadline is created. Resolving the root, walking
/// the graph and signing all count against the same budget when they share
/// one deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<(tokio::time::Instant, Duration)>,
}

impl Deadline {
    /// No deadline.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some((tokio::time::Instant::now() + timeout, timeout)),
        }
    }

    /// The budget the deadline was created with.
    pub fn timeout(&self) -> Option<Duration> {
        self.at.map(|(_, timeout)| timeout)
    }

    pub(crate) async fn run<T, F>(&self, fut: F) -> IntegrityResult<T>
    where
        F: Future<Output = IntegrityResult<T>>,
    {
        match self.at {
            None => fut.await,
            Some((at, timeout)) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| IntegrityError::ContextCanceled { timeout })?,
        }
    }
}

struct Frame {
    cd: ComponentDescriptor,
    next_ref: usize,
    strict: bool,
}

/// Resolves, digests and validates descriptor graphs.
#[derive(Clone)]
pub struct GraphEngine {
    registry: Arc<dyn ComponentRegistry>,
    digesters: DigesterRegistry,
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("digesters", &self.digesters)
            .finish_non_exhaustive()
    }
}

impl GraphEngine {
    /// Engine with the default `ociRegistry`/`localOciBlob` digesters.
    pub fn new(registry: Arc<dyn ComponentRegistry>) -> Self {
        let digesters = DigesterRegistry::with_defaults(registry.clone());
        Self::with_digesters(registry, digesters)
    }

    pub fn with_digesters(registry: Arc<dyn ComponentRegistry>, digesters: DigesterRegistry) -> Self {
        Self {
            registry,
            digesters,
        }
    }

    pub fn registry(&self) -> &Arc<dyn ComponentRegistry> {
        &self.registry
    }

    /// Fetch the root descriptor of a walk.
    pub async fn resolve(
        &self,
        repository: &RepositoryContext,
        name: &str,
        version: &str,
        options: &DigestOptions,
    ) -> IntegrityResult<ComponentDescriptor> {
        options
            .deadline
            .run(async {
                self.registry
                    .resolve(repository, name, version)
                    .await
                    .map_err(|source| IntegrityError::Resolution {
                        node: NodeRef::component(name, version),
                        source,
                    })
            })
            .await
    }

    /// Digest `root` and everything it references.
    ///
    /// Missing digests are assigned, present ones must match. Returns the
    /// digested descriptors, children before parents; the root is last.
    /// Nothing is returned on failure.
    pub async fn digest_graph(
        &self,
        root: &ComponentDescriptor,
        repository: &RepositoryContext,
        options: &DigestOptions,
    ) -> IntegrityResult<Vec<ComponentDescriptor>> {
        self.walk(root, repository, options, Mode::Add).await
    }

    /// Re-derive every digest of the graph and compare it with what is stored.
    ///
    /// The root must carry all of its digests; referenced descriptors are
    /// covered by the reference digests of their parents.
    pub async fn check_graph(
        &self,
        root: &ComponentDescriptor,
        repository: &RepositoryContext,
        options: &DigestOptions,
    ) -> IntegrityResult<Vec<ComponentDescriptor>> {
        self.walk(root, repository, options, Mode::Check).await
    }

    async fn walk(
        &self,
        root: &ComponentDescriptor,
        repository: &RepositoryContext,
        options: &DigestOptions,
        mode: Mode,
    ) -> IntegrityResult<Vec<ComponentDescriptor>> {
        let mut hasher = Hasher::for_name(&options.hash_algorithm)?;
        let deadline = options.deadline;
        let mut batch: Vec<ComponentDescriptor> = Vec::new();

        root.validate_identities()?;
        let mut stack = vec![Frame {
            cd: root.clone(),
            next_ref: 0,
            strict: mode == Mode::Check,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next_ref < frame.cd.component.component_references.len() {
                let reference = frame.cd.component.component_references[frame.next_ref].clone();
                frame.next_ref += 1;

                let node = frame.cd.reference_node(&reference);
                if stack.iter().any(|f| {
                    f.cd.name() == reference.component_name && f.cd.version() == reference.version
                }) {
                    let mut path: Vec<String> = stack.iter().map(|f| f.cd.identity()).collect();
                    path.push(format!("{}:{}", reference.component_name, reference.version));
                    return Err(IntegrityError::CyclicReference {
                        path: path.join(" -> "),
                    });
                }

                debug!(
                    reference = %reference.name,
                    component = %reference.component_name,
                    version = %reference.version,
                    "resolving referenced component"
                );
                let child = deadline
                    .run(async {
                        self.registry
                            .resolve(repository, &reference.component_name, &reference.version)
                            .await
                            .map_err(|source| IntegrityError::Resolution { node, source })
                    })
                    .await?;
                child.validate_identities()?;

                stack.push(Frame {
                    cd: child,
                    next_ref: 0,
                    strict: false,
                });
                continue;
            }

            let strict = frame.strict;
            self.digest_resources(&mut frame.cd, repository, options, strict, &mut hasher, &deadline)
                .await?;

            let Some(done) = stack.pop() else { break };
            debug!(component = %done.cd.identity(), "component digested");

            if let Some(parent) = stack.last_mut() {
                let computed = Digest::Value(hash_descriptor(&done.cd, &mut hasher)?);
                let index = parent.next_ref - 1;
                let node = parent
                    .cd
                    .reference_node(&parent.cd.component.component_references[index]);
                let stored = &mut parent.cd.component.component_references[index].digest;
                reconcile(stored, computed, node, parent.strict)?;
            }

            if !batch.iter().any(|c| c.identity() == done.cd.identity()) {
                batch.push(done.cd);
            }
        }

        info!(
            component = %root.identity(),
            descriptors = batch.len(),
            "component graph digested"
        );
        Ok(batch)
    }

    async fn digest_resources(
        &self,
        cd: &mut ComponentDescriptor,
        repository: &RepositoryContext,
        options: &DigestOptions,
        strict: bool,
        hasher: &mut Hasher,
        deadline: &Deadline,
    ) -> IntegrityResult<()> {
        for index in 0..cd.component.resources.len() {
            let resource = &cd.component.resources[index];
            let node = cd.resource_node(resource);
            let computed = self
                .resource_digest(cd, resource, repository, options, hasher, deadline)
                .await?;

            if let Some(computed) = computed {
                let stored = &mut cd.component.resources[index].digest;
                reconcile(stored, computed, node, strict)?;
            }
        }
        Ok(())
    }

    /// Digest a resource should carry; `None` for resources without access.
    async fn resource_digest(
        &self,
        cd: &ComponentDescriptor,
        resource: &Resource,
        repository: &RepositoryContext,
        options: &DigestOptions,
        hasher: &mut Hasher,
        deadline: &Deadline,
    ) -> IntegrityResult<Option<Digest>> {
        if resource.has_no_access() {
            // A real digest cannot be re-derived without content.
            if let Some(stored @ Digest::Value(_)) = &resource.digest {
                return Err(IntegrityError::DigestMismatch {
                    node: cd.resource_node(resource),
                    expected: stored.to_string(),
                    actual: "no digest (resource has no access)".to_string(),
                });
            }
            return Ok(None);
        }

        let access_type = resource.access_type().unwrap_or_default();
        if options.skip_access_types.contains(access_type)
            || matches!(resource.digest, Some(Digest::Excluded))
        {
            debug!(resource = %resource.identity(), access_type, "resource excluded from signature");
            return Ok(Some(Digest::Excluded));
        }

        let digester =
            self.digesters
                .get(access_type)
                .ok_or_else(|| IntegrityError::UnsupportedAccessType {
                    node: cd.resource_node(resource),
                    access_type: access_type.to_string(),
                })?;

        let spec = deadline
            .run(digester.digest(repository, cd, resource, hasher))
            .await?;
        Ok(Some(Digest::Value(spec)))
    }
}

/// Compare `computed` with the stored digest, or store it if absent.
fn reconcile(
    stored: &mut Option<Digest>,
    computed: Digest,
    node: NodeRef,
    strict: bool,
) -> IntegrityResult<()> {
    match stored {
        Some(existing) if existing.is_complete() => {
            if *existing == computed {
                Ok(())
            } else {
                Err(IntegrityError::DigestMismatch {
                    node,
                    expected: existing.to_string(),
                    actual: computed.to_string(),
                })
            }
        }
        _ if strict => Err(IntegrityError::MissingDigest { node }),
        _ => {
            *stored = Some(computed);
            Ok(())
        }
    }
}
