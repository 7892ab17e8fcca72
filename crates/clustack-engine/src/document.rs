//! Stack document model
//!
//! Typed form of the CloudFormation documents the assembler emits. All maps are
//! insertion-ordered so the same cluster always serializes to the same bytes.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use clustack_core::CoreError;

use crate::error::Result;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Prefix every export name carries ahead of its output name
const EXPORT_PREFIX: &str = "${AWS::StackName}-";

/// One CloudFormation document
///
/// Resources and outputs are keyed by logical name; both reject a name that is
/// already taken instead of replacing the earlier entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Parameter>,
    pub resources: IndexMap<String, Resource>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Output>,
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: description.into(),
            parameters: IndexMap::new(),
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, parameter: Parameter) {
        self.parameters.insert(name.into(), parameter);
    }

    /// Add a resource; logical names are unique within a stack
    pub fn add_resource(&mut self, logical_name: impl Into<String>, resource: Resource) -> Result<()> {
        let logical_name = logical_name.into();
        if self.resources.contains_key(&logical_name) {
            return Err(CoreError::reference(format!(
                "logical name {} is declared twice",
                logical_name
            ))
            .into());
        }
        self.resources.insert(logical_name, resource);
        Ok(())
    }

    /// Add an output; output names are unique within a stack
    pub fn add_output(&mut self, name: impl Into<String>, output: Output) -> Result<()> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(CoreError::reference(format!("output {} is declared twice", name)).into());
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    /// Names this document exports, as written in its `Outputs[..].Export`
    pub fn exported_outputs(&self) -> BTreeSet<String> {
        self.outputs
            .values()
            .filter_map(Output::export_name)
            .map(str::to_string)
            .collect()
    }

    pub fn resource(&self, logical_name: &str) -> Option<&Resource> {
        self.resources.get(logical_name)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub kind: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Parameter {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            kind: "String".to_string(),
            description: description.into(),
            default: None,
        }
    }

    pub fn of_type(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Option<String>) -> Self {
        self.default = default;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_policy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Resource {
    /// A resource of the given CloudFormation type, e.g. `AWS::EC2::VPC`
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            depends_on: Vec::new(),
            creation_policy: None,
            update_policy: None,
            properties: Map::new(),
        }
    }

    /// Set a property, replacing any earlier value under the same name
    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Set a property only when there is a value for it
    pub fn maybe_property(self, name: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.property(name, value),
            None => self,
        }
    }

    /// Add a `DependsOn` entry; repeated names are kept once, in first-seen order
    pub fn depends_on(mut self, logical_name: impl Into<String>) -> Self {
        let logical_name = logical_name.into();
        if !self.depends_on.contains(&logical_name) {
            self.depends_on.push(logical_name);
        }
        self
    }

    pub fn creation_policy(mut self, policy: Value) -> Self {
        self.creation_policy = Some(policy);
        self
    }

    pub fn update_policy(mut self, policy: Value) -> Self {
        self.update_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<Value>,
}

impl Output {
    pub fn new(value: Value) -> Self {
        Self {
            description: None,
            value,
            export: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Export under `{stack name}-{name}`
    pub fn exported_as(mut self, name: &str) -> Self {
        self.export = Some(serde_json::json!({
            "Name": { "Fn::Sub": format!("{}{}", EXPORT_PREFIX, name) }
        }));
        self
    }

    /// The `{name}` part of this output's export, if it has one
    pub fn export_name(&self) -> Option<&str> {
        self.export
            .as_ref()?
            .get("Name")?
            .get("Fn::Sub")?
            .as_str()?
            .strip_prefix(EXPORT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_logical_name() {
        let mut template = Template::new("control-plane");
        template.add_resource("VPC", Resource::new("AWS::EC2::VPC")).unwrap();
        let err = template
            .add_resource("VPC", Resource::new("AWS::EC2::VPC"))
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_serialization_shape() {
        let mut template = Template::new("test");
        template.add_parameter("ImageId", Parameter::string("AMI").with_default(Some("ami-1".into())));
        template
            .add_resource(
                "Etcd1",
                Resource::new("AWS::AutoScaling::AutoScalingGroup")
                    .depends_on("Etcd0")
                    .depends_on("Etcd0")
                    .property("MinSize", "1"),
            )
            .unwrap();
        template
            .add_output("Etcd1", Output::new(json!({"Ref": "Etcd1"})).exported_as("Etcd1"))
            .unwrap();

        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(value["Parameters"]["ImageId"]["Default"], "ami-1");
        assert_eq!(value["Resources"]["Etcd1"]["DependsOn"], json!(["Etcd0"]));
        assert!(value["Resources"]["Etcd1"].get("CreationPolicy").is_none());
        assert_eq!(
            value["Outputs"]["Etcd1"]["Export"],
            json!({"Name": {"Fn::Sub": "${AWS::StackName}-Etcd1"}})
        );
    }

    #[test]
    fn test_empty_maps_are_omitted() {
        let template = Template::new("empty");
        let value = serde_json::to_value(&template).unwrap();
        assert!(value.get("Parameters").is_none());
        assert!(value.get("Outputs").is_none());
        assert_eq!(value["Resources"], json!({}));
    }

    #[test]
    fn test_duplicate_output_name() {
        let mut template = Template::new("control-plane");
        template
            .add_output("StackName", Output::new(json!({"Ref": "Public1"})).exported_as("StackName"))
            .unwrap();
        let err = template
            .add_output("StackName", Output::new(json!({"Ref": "AWS::StackName"})))
            .unwrap_err();
        assert!(err.to_string().contains("output StackName is declared twice"));
        assert_eq!(template.outputs["StackName"].value, json!({"Ref": "Public1"}));
    }

    #[test]
    fn test_exported_outputs_follow_export_names() {
        let mut template = Template::new("control-plane");
        template
            .add_output("VPC", Output::new(json!({"Ref": "VPC"})).exported_as("VPC"))
            .unwrap();
        template
            .add_output("StackName", Output::new(json!({"Ref": "AWS::StackName"})))
            .unwrap();
        assert_eq!(template.outputs["VPC"].export_name(), Some("VPC"));
        assert_eq!(template.outputs["StackName"].export_name(), None);
        assert_eq!(template.exported_outputs(), BTreeSet::from(["VPC".to_string()]));
    }
}
