//! Resource digest comparison between two copies of a component graph.

use tracing::debug;

use crate::descriptor::{ComponentDescriptor, RepositoryContext};
use crate::error::{IntegrityError, IntegrityResult, NodeRef};
use crate::registry::ComponentRegistry;

/// Resource paths grouped by whether both copies carry the same digest.
///
/// A path reads `|root:v1|child:v2|res:name_version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareReport {
    pub equal: Vec<String>,
    pub unequal: Vec<String>,
}

impl CompareReport {
    pub fn is_equal(&self) -> bool {
        self.unequal.is_empty()
    }
}

struct Frame {
    path: String,
    first: ComponentDescriptor,
    second: ComponentDescriptor,
    next_ref: usize,
}

async fn resolve_one(
    registry: &dyn ComponentRegistry,
    repository: &RepositoryContext,
    name: &str,
    version: &str,
) -> IntegrityResult<ComponentDescriptor> {
    registry
        .resolve(repository, name, version)
        .await
        .map_err(|source| IntegrityError::Resolution {
            node: NodeRef::component(name, version),
            source,
        })
}

async fn resolve_pair(
    registry: &dyn ComponentRegistry,
    first: &RepositoryContext,
    second: &RepositoryContext,
    name: &str,
    version: &str,
    parent_path: &str,
) -> IntegrityResult<Frame> {
    Ok(Frame {
        path: format!("{parent_path}|{name}:{version}"),
        first: resolve_one(registry, first, name, version).await?,
        second: resolve_one(registry, second, name, version).await?,
        next_ref: 0,
    })
}

/// Compare the resource digests of `name:version` as stored in `first` and
/// `second`, following the references of the first copy.
///
/// Resources are paired by identity; one missing from the second copy counts
/// as unequal. Referenced components are reported before the resources of
/// their parent.
pub async fn compare(
    registry: &dyn ComponentRegistry,
    first: &RepositoryContext,
    second: &RepositoryContext,
    name: &str,
    version: &str,
) -> IntegrityResult<CompareReport> {
    let mut report = CompareReport::default();
    let mut stack = vec![resolve_pair(registry, first, second, name, version, "").await?];

    while let Some(frame) = stack.last_mut() {
        if let Some(reference) = frame
            .first
            .component
            .component_references
            .get(frame.next_ref)
            .cloned()
        {
            frame.next_ref += 1;
            let parent_path = frame.path.clone();

            if stack.iter().any(|f| {
                f.first.component.name == reference.component_name
                    && f.first.component.version == reference.version
            }) {
                let mut path: Vec<String> = stack.iter().map(|f| f.first.identity()).collect();
                path.push(format!("{}:{}", reference.component_name, reference.version));
                return Err(IntegrityError::CyclicReference {
                    path: path.join(" -> "),
                });
            }

            debug!(reference = %reference.identity(), path = %parent_path, "comparing referenced component");
            let child = resolve_pair(
                registry,
                first,
                second,
                &reference.component_name,
                &reference.version,
                &parent_path,
            )
            .await?;
            stack.push(child);
            continue;
        }

        let Some(frame) = stack.pop() else { break };
        for resource in &frame.first.component.resources {
            let path = format!("{}|res:{}_{}", frame.path, resource.name, resource.version);
            let identity = resource.identity();
            let counterpart = frame
                .second
                .component
                .resources
                .iter()
                .find(|r| r.identity() == identity);

            match counterpart {
                Some(other) if other.digest == resource.digest => report.equal.push(path),
                _ => report.unequal.push(path),
            }
        }
    }

    Ok(report)
}
