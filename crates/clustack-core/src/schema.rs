//! Strict validation of `cluster.yaml` against the embedded JSON schema
//!
//! Every object in the schema sets `additionalProperties: false`, so a misspelled
//! option is reported with its full key path instead of being silently ignored.

use jsonschema::error::ValidationErrorKind;
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::suggestions::suggest_key;

/// The embedded cluster configuration schema (YAML form of a draft-07 JSON schema)
pub const CLUSTER_SCHEMA: &str = include_str!("../schema/cluster.schema.yaml");

/// Detailed validation error information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrorInfo {
    /// Dotted path of the offending setting (`worker.nodePools[0].spotFleet`)
    pub path: String,
    /// Human readable message
    pub message: String,
    /// "Did you mean" hint, if a close match exists
    pub suggestion: Option<String>,
    unknown_key: bool,
}

impl From<ValidationErrorInfo> for CoreError {
    fn from(info: ValidationErrorInfo) -> Self {
        CoreError::Schema {
            path: info.path,
            message: info.message,
            suggestion: info.suggestion,
        }
    }
}

/// Compiled cluster schema
pub struct ClusterSchema {
    document: JsonValue,
    compiled: jsonschema::Validator,
}

impl ClusterSchema {
    /// Compile the embedded schema
    pub fn embedded() -> Result<Self> {
        Self::from_yaml(CLUSTER_SCHEMA)
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let document: JsonValue =
            serde_yaml::from_str(source).map_err(|e| CoreError::InvalidSchema {
                message: e.to_string(),
            })?;
        let compiled =
            jsonschema::validator_for(&document).map_err(|e| CoreError::InvalidSchema {
                message: format!("Invalid schema: {}", e),
            })?;

        Ok(Self { document, compiled })
    }

    /// Collect every violation, unknown keys first, then ordered by path
    pub fn errors(&self, value: &JsonValue) -> Vec<ValidationErrorInfo> {
        let mut errors: Vec<ValidationErrorInfo> = self
            .compiled
            .iter_errors(value)
            .map(|e| self.describe(&e))
            .collect();

        errors.sort_by(|a, b| {
            (!a.unknown_key, &a.path, &a.message).cmp(&(!b.unknown_key, &b.path, &b.message))
        });
        errors.dedup();
        errors
    }

    /// Validate a configuration document, failing on the first violation
    pub fn validate(&self, value: &JsonValue) -> Result<()> {
        if self.compiled.is_valid(value) {
            return Ok(());
        }
        match self.errors(value).into_iter().next() {
            Some(info) => Err(info.into()),
            None => Ok(()),
        }
    }

    fn describe(&self, error: &jsonschema::ValidationError) -> ValidationErrorInfo {
        let segments = pointer_segments(&error.instance_path.to_string());
        let path = display_path(&segments);

        match &error.kind {
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                let mut keys = unexpected.clone();
                keys.sort();
                let message = if path.is_empty() {
                    format!("unknown keys found: {}", keys.join(", "))
                } else {
                    format!("unknown keys found in {}: {}", path, keys.join(", "))
                };
                let known = self.known_keys(&segments);
                let known: Vec<&str> = known.iter().map(String::as_str).collect();
                let suggestion = keys.iter().find_map(|k| suggest_key(k, &known));

                ValidationErrorInfo {
                    path,
                    message,
                    suggestion,
                    unknown_key: true,
                }
            }
            ValidationErrorKind::Required { property } => {
                let field = property.as_str().unwrap_or_default();
                let path = join_path(&path, field);
                ValidationErrorInfo {
                    message: format!("missing required field `{}`", path),
                    path,
                    suggestion: None,
                    unknown_key: false,
                }
            }
            _ => {
                let location = if path.is_empty() { "(root)" } else { &path };
                ValidationErrorInfo {
                    message: format!("{}: {}", location, error.to_string().replace('"', "'")),
                    path,
                    suggestion: None,
                    unknown_key: false,
                }
            }
        }
    }

    /// Keys the schema accepts at the given instance location
    fn known_keys(&self, segments: &[String]) -> Vec<String> {
        let mut node = self.resolve(&self.document);
        for segment in segments {
            let next = if segment.parse::<usize>().is_ok() {
                node.get("items")
            } else {
                node.get("properties").and_then(|p| p.get(segment))
            };
            match next {
                Some(n) => node = self.resolve(n),
                None => return Vec::new(),
            }
        }

        node.get("properties")
            .and_then(JsonValue::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn resolve<'a>(&'a self, mut node: &'a JsonValue) -> &'a JsonValue {
        while let Some(target) = node.get("$ref").and_then(JsonValue::as_str) {
            let Some(pointer) = target.strip_prefix('#') else {
                break;
            };
            match self.document.pointer(pointer) {
                Some(resolved) => node = resolved,
                None => break,
            }
        }
        node
    }
}

fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Render JSON pointer segments as `worker.nodePools[0].spotFleet`
pub fn display_path(segments: &[String]) -> String {
    let mut out = String::new();
    for segment in segments {
        if segment.parse::<usize>().is_ok() {
            out.push_str(&format!("[{}]", segment));
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(segment);
        }
    }
    out
}

pub(crate) fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ClusterSchema {
        ClusterSchema::embedded().unwrap()
    }

    #[test]
    fn test_minimal_config_is_valid() {
        let value = json!({
            "clusterName": "test-cluster",
            "region": "us-west-1",
            "availabilityZone": "us-west-1c",
        });
        assert!(schema().validate(&value).is_ok());
    }

    #[test]
    fn test_unknown_top_level_key() {
        let value = json!({"clusterName": "c", "region": "r", "foo": 1});
        let err = schema().validate(&value).unwrap_err();
        assert_eq!(err.to_string(), "unknown keys found: foo");
    }

    #[test]
    fn test_unknown_nested_key_names_path() {
        let value = json!({
            "clusterName": "c",
            "region": "r",
            "worker": {"nodePools": [{"name": "pool1", "spotFleet": {"bar": 1}}]},
        });
        let err = schema().validate(&value).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown keys found in worker.nodePools[0].spotFleet: bar"
        );
    }

    #[test]
    fn test_unknown_key_suggestion() {
        let value = json!({
            "clusterName": "c",
            "region": "r",
            "subnets": [{"availabilityZone": "a", "instanceCidr": "10.0.0.0/24"}],
        });
        let errors = schema().errors(&value);
        assert_eq!(errors[0].path, "subnets[0]");
        assert_eq!(
            errors[0].suggestion.as_deref(),
            Some("Did you mean `instanceCIDR`?")
        );
    }

    #[test]
    fn test_wrong_type_reports_path() {
        let value = json!({
            "clusterName": "c",
            "region": "r",
            "etcd": {"count": "three"},
        });
        let err = schema().validate(&value).unwrap_err();
        assert_eq!(err.path(), Some("etcd.count"));
    }

    #[test]
    fn test_missing_required_field() {
        let value = json!({"region": "r"});
        let err = schema().validate(&value).unwrap_err();
        assert_eq!(err.path(), Some("clusterName"));
    }

    #[test]
    fn test_invalid_member_identity_provider() {
        let value = json!({
            "clusterName": "c",
            "region": "r",
            "etcd": {"memberIdentityProvider": "dns"},
        });
        let err = schema().validate(&value).unwrap_err();
        assert_eq!(err.path(), Some("etcd.memberIdentityProvider"));
    }

    #[test]
    fn test_api_endpoints_and_instance_settings() {
        let value = json!({
            "clusterName": "c",
            "region": "r",
            "apiEndpoints": [{
                "name": "default",
                "dnsName": "api.example.com",
                "loadBalancer": {"type": "network", "subnets": ["public1"], "recordSetTTL": 60},
            }],
            "controller": {
                "createTimeout": "PT30M",
                "tenancy": "dedicated",
                "iam": {"instanceProfile": {"arn": "arn:aws:iam::1:instance-profile/c"}},
            },
        });
        assert!(schema().validate(&value).is_ok());

        let value = json!({
            "clusterName": "c",
            "region": "r",
            "apiEndpoints": [{"name": "default", "dnsName": "a", "loadBalancer": {"type": "application"}}],
        });
        let err = schema().validate(&value).unwrap_err();
        assert_eq!(err.path(), Some("apiEndpoints[0].loadBalancer.type"));
    }

    #[test]
    fn test_display_path() {
        let segments: Vec<String> = ["worker", "nodePools", "2", "subnets", "0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(display_path(&segments), "worker.nodePools[2].subnets[0]");
    }
}
