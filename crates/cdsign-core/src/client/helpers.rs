//! Pure helpers: URL handling and descriptor parsing (no HTTP, no status logic).

use crate::descriptor::ComponentDescriptor;
use crate::error::{RegistryError, RegistryResult};

/// Turn a registry API URL back into an image reference for error messages.
///
/// URL format: `{scheme}://{host}/v2/{repo}/manifests/{ref}` or
/// `{scheme}://{host}/v2/{repo}/blobs/{digest}`.
pub(crate) fn reference_from_url(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    let without_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);

    let Some((host, path)) = without_scheme.split_once("/v2/") else {
        return without_scheme.to_string();
    };

    if let Some((repo, reference)) = path.rsplit_once("/manifests/") {
        if reference.contains(':') {
            return format!("{host}/{repo}@{reference}");
        }
        return format!("{host}/{repo}:{reference}");
    }

    if let Some((repo, digest)) = path.rsplit_once("/blobs/") {
        return format!("{host}/{repo}@{digest}");
    }

    format!("{host}/{path}")
}

/// Resolve an upload `Location` header (absolute or relative) and append the
/// `digest` query parameter.
pub(crate) fn upload_target(request_url: &str, location: &str, digest: &str) -> RegistryResult<String> {
    let base = url::Url::parse(request_url).map_err(|e| RegistryError::InvalidResponse {
        message: format!("invalid upload url {request_url}: {e}"),
    })?;
    let mut target = base.join(location).map_err(|e| RegistryError::InvalidResponse {
        message: format!("invalid upload location {location}: {e}"),
    })?;
    target.query_pairs_mut().append_pair("digest", digest);
    Ok(target.to_string())
}

/// Parse a stored descriptor; JSON first, YAML as fallback.
pub(crate) fn parse_descriptor(content: &[u8]) -> RegistryResult<ComponentDescriptor> {
    match serde_json::from_slice(content) {
        Ok(cd) => Ok(cd),
        Err(json_err) => serde_yaml::from_slice(content).map_err(|yaml_err| {
            RegistryError::InvalidResponse {
                message: format!(
                    "failed to parse component descriptor (json: {json_err}; yaml: {yaml_err})"
                ),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_from_manifest_url() {
        let url = "https://registry.local:5000/v2/cd/component-descriptors/app/manifests/v1.0";
        assert_eq!(
            reference_from_url(url),
            "registry.local:5000/cd/component-descriptors/app:v1.0"
        );
    }

    #[test]
    fn test_reference_from_blob_url() {
        let url = "http://127.0.0.1/v2/img/blobs/sha256:abc";
        assert_eq!(reference_from_url(url), "127.0.0.1/img@sha256:abc");
    }

    #[test]
    fn test_upload_target_relative_location() {
        let target = upload_target(
            "http://127.0.0.1:5000/v2/img/blobs/uploads/",
            "/v2/img/blobs/uploads/123?state=x",
            "sha256:aa",
        )
        .unwrap();
        assert_eq!(
            target,
            "http://127.0.0.1:5000/v2/img/blobs/uploads/123?state=x&digest=sha256%3Aaa"
        );
    }

    #[test]
    fn test_upload_target_absolute_location() {
        let target = upload_target(
            "http://127.0.0.1:5000/v2/img/blobs/uploads/",
            "https://storage.local/upload/1",
            "sha256:aa",
        )
        .unwrap();
        assert!(target.starts_with("https://storage.local/upload/1?digest="));
    }

    #[test]
    fn test_parse_descriptor_yaml_fallback() {
        let yaml = "meta:\n  schemaVersion: v2\ncomponent:\n  name: c\n  version: v1\n";
        let cd = parse_descriptor(yaml.as_bytes()).unwrap();
        assert_eq!(cd.identity(), "c:v1");
    }

    #[test]
    fn test_parse_descriptor_garbage() {
        assert!(matches!(
            parse_descriptor(b"\x00\x01"),
            Err(RegistryError::InvalidResponse { .. })
        ));
    }
}
