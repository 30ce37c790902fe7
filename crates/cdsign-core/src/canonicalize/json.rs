//! JCS (JSON Canonicalization Scheme) helpers.

use serde_json::Value as JsonValue;

/// Convert a JSON value to JCS (RFC 8785) bytes.
///
/// Used to re-marshal OCI manifests before digesting them, so that
/// formatting differences between registries do not change the digest.
pub fn to_canonical_jcs_bytes(value: &JsonValue) -> serde_json::Result<Vec<u8>> {
    serde_jcs::to_vec(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_keys_and_strips_whitespace() {
        let value: JsonValue =
            serde_json::from_str("{\n  \"schemaVersion\": 2,\n  \"config\": {\"size\": 3, \"digest\": \"sha256:aa\"}\n}")
                .unwrap();
        let bytes = to_canonical_jcs_bytes(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"config":{"digest":"sha256:aa","size":3},"schemaVersion":2}"#
        );
    }
}
