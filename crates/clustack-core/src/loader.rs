//! Entry points for reading a cluster configuration

use serde_json::Value as JsonValue;

use crate::config::RawCluster;
use crate::error::{CoreError, Result};
use crate::normalize::normalize;
use crate::schema::ClusterSchema;
use crate::spec::ClusterSpec;

/// Parse configuration bytes (YAML or JSON) into a generic document
pub fn parse_document(bytes: &[u8]) -> Result<JsonValue> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(CoreError::schema("(root)", "cluster configuration is empty"));
    }
    let document: JsonValue = serde_yaml::from_slice(bytes)?;
    match document {
        JsonValue::Object(_) => Ok(document),
        JsonValue::Null => Err(CoreError::schema("(root)", "cluster configuration is empty")),
        _ => Err(CoreError::schema(
            "(root)",
            "cluster configuration must be a mapping of settings",
        )),
    }
}

/// Parse and strictly validate configuration bytes
pub fn parse_raw(bytes: &[u8]) -> Result<RawCluster> {
    let document = parse_document(bytes)?;
    ClusterSchema::embedded()?.validate(&document)?;
    Ok(serde_json::from_value(document)?)
}

/// Parse, validate and normalize configuration bytes
pub fn load_cluster(bytes: &[u8]) -> Result<ClusterSpec> {
    let raw = parse_raw(bytes)?;
    let spec = normalize(raw)?;
    tracing::debug!(
        cluster = %spec.cluster_name,
        subnets = spec.subnets.len(),
        node_pools = spec.node_pools.len(),
        "loaded cluster configuration"
    );
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        let err = load_cluster(b"").unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
    }

    #[test]
    fn test_non_mapping_document() {
        let err = load_cluster(b"- a\n- b\n").unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = load_cluster(b"clusterName: [unclosed").unwrap_err();
        assert!(matches!(err, CoreError::YamlParse(_)));
    }

    #[test]
    fn test_json_is_accepted() {
        let spec = load_cluster(
            br#"{"clusterName": "c", "region": "us-east-1", "availabilityZone": "us-east-1a"}"#,
        )
        .unwrap();
        assert_eq!(spec.region, "us-east-1");
    }

    #[test]
    fn test_unknown_key_blocks_normalization() {
        let err = load_cluster(
            b"clusterName: c\nregion: r\navailabilityZone: a\ncontroller:\n  instanceTyp: m4.large\n",
        )
        .unwrap_err();
        match err {
            CoreError::Schema {
                path,
                message,
                suggestion,
            } => {
                assert_eq!(path, "controller");
                assert_eq!(message, "unknown keys found in controller: instanceTyp");
                assert_eq!(suggestion.as_deref(), Some("Did you mean `instanceType`?"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
