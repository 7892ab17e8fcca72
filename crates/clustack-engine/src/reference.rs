//! Reference graph
//!
//! Every time one resource needs another's runtime value, the assembler asks the
//! [`ReferenceGraph`] for a [`Reference`]. The graph decides between a literal id, a
//! same-stack `Ref`/`Fn::GetAtt`, and a cross-stack `Fn::ImportValue`, and records the
//! matching export on the owning stack at the same moment, so an import can never
//! exist without its export.
//!
//! ```text
//! Target::Literal("subnet-1")            -> "subnet-1"
//! Target::Imported("other-Subnet")       -> {"Fn::ImportValue": "other-Subnet"}
//! Resource(control-plane, Public1)
//!   consumed by control-plane            -> {"Ref": "Public1"}
//!   consumed by pool1                    -> {"Fn::ImportValue": {"Fn::Sub": "${ControlPlaneStackName}-Public1"}}
//! ```

use std::collections::{BTreeMap, BTreeSet};

use clustack_core::{CoreError, Identity};
use serde_json::{Value, json};

use crate::error::Result;
use crate::stack::StackId;

/// Resource attribute read through `Fn::GetAtt`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Attribute {
    Arn,
    AllocationId,
    PrimaryPrivateIpAddress,
    DNSName,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Arn => "Arn",
            Attribute::AllocationId => "AllocationId",
            Attribute::PrimaryPrivateIpAddress => "PrimaryPrivateIpAddress",
            Attribute::DNSName => "DNSName",
        }
    }

    fn output_suffix(&self) -> &'static str {
        match self {
            Attribute::Arn => "Arn",
            Attribute::AllocationId => "AllocationId",
            Attribute::PrimaryPrivateIpAddress => "PrivateIP",
            Attribute::DNSName => "DNSName",
        }
    }
}

/// Something a consumer wants to point at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An id of a resource created outside the cluster
    Literal(String),
    /// An export of a stack outside the cluster
    Imported(String),
    /// A resource declared in one of the generated stacks
    Resource {
        owner: StackId,
        logical_name: String,
        attribute: Option<Attribute>,
    },
}

impl Target {
    pub fn resource(owner: StackId, logical_name: impl Into<String>) -> Self {
        Target::Resource {
            owner,
            logical_name: logical_name.into(),
            attribute: None,
        }
    }

    pub fn attribute(owner: StackId, logical_name: impl Into<String>, attribute: Attribute) -> Self {
        Target::Resource {
            owner,
            logical_name: logical_name.into(),
            attribute: Some(attribute),
        }
    }

    /// Target for a resource whose ownership was decided by the topology resolver
    pub fn from_identity(identity: &Identity, owner: StackId, logical_name: impl Into<String>) -> Self {
        match identity {
            Identity::Managed => Target::resource(owner, logical_name),
            Identity::ExistingById(id) => Target::Literal(id.clone()),
            Identity::ImportedByStackOutput(export) => Target::Imported(export.clone()),
        }
    }

    /// Output name under which the owning stack exports this target
    pub fn output_name(&self) -> Option<String> {
        match self {
            Target::Resource {
                logical_name,
                attribute,
                ..
            } => Some(match attribute {
                Some(attribute) => format!("{}{}", logical_name, attribute.output_suffix()),
                None => logical_name.clone(),
            }),
            _ => None,
        }
    }
}

/// Where a cross-stack import comes from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportSource {
    Stack(StackId),
    External,
}

/// A resolved pointer to a runtime value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Literal(String),
    Intrinsic {
        logical_name: String,
        attribute: Option<Attribute>,
    },
    /// For `ImportSource::Stack`, `name` is the owner's output name; the full export
    /// name is `{ownerStackName}-{name}`. For external imports it is used verbatim.
    CrossStackImport { owner: ImportSource, name: String },
}

impl Reference {
    /// Export name this reference imports, if any
    pub fn export_name(&self) -> Option<String> {
        match self {
            Reference::CrossStackImport {
                owner: ImportSource::Stack(owner),
                name,
            } => Some(format!("{}-{}", owner.name(), name)),
            Reference::CrossStackImport {
                owner: ImportSource::External,
                name,
            } => Some(name.clone()),
            _ => None,
        }
    }

    /// Document form of the reference
    pub fn to_json(&self) -> Value {
        match self {
            Reference::Literal(value) => Value::String(value.clone()),
            Reference::Intrinsic {
                logical_name,
                attribute: None,
            } => json!({ "Ref": logical_name }),
            Reference::Intrinsic {
                logical_name,
                attribute: Some(attribute),
            } => json!({ "Fn::GetAtt": [logical_name, attribute.as_str()] }),
            Reference::CrossStackImport {
                owner: ImportSource::Stack(owner),
                name,
            } => json!({
                "Fn::ImportValue": {
                    "Fn::Sub": format!("${{{}}}-{}", owner.name_parameter(), name)
                }
            }),
            Reference::CrossStackImport {
                owner: ImportSource::External,
                name,
            } => json!({ "Fn::ImportValue": name }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub output: String,
    /// Same-stack reference the output evaluates
    pub value: Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Import {
    pub consumer: StackId,
    pub owner: StackId,
    pub output: String,
}

/// Exports and imports of every generated stack
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    exports: BTreeMap<StackId, BTreeMap<String, Export>>,
    imports: BTreeSet<Import>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how `consumer` refers to `target`
    pub fn resolve(&mut self, target: &Target, consumer: &StackId) -> Result<Reference> {
        match target {
            Target::Literal(value) => Ok(Reference::Literal(value.clone())),
            Target::Imported(export) => Ok(Reference::CrossStackImport {
                owner: ImportSource::External,
                name: export.clone(),
            }),
            Target::Resource {
                owner,
                logical_name,
                attribute,
            } => {
                let local = Reference::Intrinsic {
                    logical_name: logical_name.clone(),
                    attribute: *attribute,
                };
                if owner == consumer {
                    return Ok(local);
                }
                if *consumer == StackId::Root {
                    return Err(CoreError::reference(format!(
                        "the root stack cannot import {} from {}",
                        logical_name, owner
                    ))
                    .into());
                }

                let output = target.output_name().unwrap_or_else(|| logical_name.clone());
                self.register_export(owner, &output, local)?;
                self.imports.insert(Import {
                    consumer: consumer.clone(),
                    owner: owner.clone(),
                    output: output.clone(),
                });
                tracing::debug!(%consumer, %owner, %output, "cross-stack import");

                Ok(Reference::CrossStackImport {
                    owner: ImportSource::Stack(owner.clone()),
                    name: output,
                })
            }
        }
    }

    pub fn resolve_all(&mut self, targets: &[Target], consumer: &StackId) -> Result<Vec<Reference>> {
        targets.iter().map(|t| self.resolve(t, consumer)).collect()
    }

    /// Export a resource from its owning stack without any consumer asking for it
    pub fn publish(&mut self, target: &Target) -> Result<()> {
        match target.output_name() {
            Some(output) => self.publish_as(target, &output),
            // Nothing to export for resources the cluster does not own
            None => Ok(()),
        }
    }

    /// Like [`publish`](Self::publish) under an explicit output name
    pub fn publish_as(&mut self, target: &Target, output: &str) -> Result<()> {
        match target {
            Target::Resource {
                owner,
                logical_name,
                attribute,
            } => self.register_export(
                owner,
                output,
                Reference::Intrinsic {
                    logical_name: logical_name.clone(),
                    attribute: *attribute,
                },
            ),
            Target::Literal(_) | Target::Imported(_) => Ok(()),
        }
    }

    fn register_export(&mut self, owner: &StackId, output: &str, value: Reference) -> Result<()> {
        let exports = self.exports.entry(owner.clone()).or_default();
        match exports.get(output) {
            Some(existing) if existing.value != value => Err(CoreError::reference(format!(
                "output {} of {} is exported with two different values",
                output, owner
            ))
            .into()),
            Some(_) => Ok(()),
            None => {
                exports.insert(
                    output.to_string(),
                    Export {
                        output: output.to_string(),
                        value,
                    },
                );
                Ok(())
            }
        }
    }

    /// Exports declared by one stack, ordered by output name
    pub fn exports(&self, stack: &StackId) -> impl Iterator<Item = &Export> {
        self.exports.get(stack).into_iter().flat_map(|m| m.values())
    }

    /// Every export of every stack
    pub fn all_exports(&self) -> impl Iterator<Item = (&StackId, &Export)> {
        self.exports
            .iter()
            .flat_map(|(stack, exports)| exports.values().map(move |e| (stack, e)))
    }

    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.imports.iter()
    }

    /// Stacks `consumer` imports from
    pub fn import_owners(&self, consumer: &StackId) -> BTreeSet<StackId> {
        self.imports
            .iter()
            .filter(|i| &i.consumer == consumer)
            .map(|i| i.owner.clone())
            .collect()
    }

    /// Check export/import symmetry against the root stack summary and the documents
    ///
    /// `summary` holds the `(owner, output)` pairs the root stack mirrors, `declared`
    /// the output names each rendered document actually exports.
    pub fn verify(
        &self,
        summary: &BTreeSet<(StackId, String)>,
        declared: &BTreeMap<StackId, BTreeSet<String>>,
    ) -> Result<()> {
        let is_declared = |owner: &StackId, output: &str| {
            declared.get(owner).is_some_and(|names| names.contains(output))
        };

        for import in &self.imports {
            if import.consumer == import.owner {
                return Err(CoreError::reference(format!(
                    "{} imports its own output {}",
                    import.consumer, import.output
                ))
                .into());
            }
            let matching = self
                .exports
                .get(&import.owner)
                .map(|exports| exports.contains_key(&import.output) as usize)
                .unwrap_or(0);
            if matching != 1 {
                return Err(CoreError::reference(format!(
                    "{} imports {}-{} but {} declares {} matching export(s)",
                    import.consumer, import.owner, import.output, import.owner, matching
                ))
                .into());
            }
            if !is_declared(&import.owner, &import.output) {
                return Err(CoreError::reference(format!(
                    "{} imports {}-{} but no output of the {} document exports it",
                    import.consumer, import.owner, import.output, import.owner
                ))
                .into());
            }
        }

        for (owner, export) in self.all_exports() {
            if !is_declared(owner, &export.output) {
                return Err(CoreError::reference(format!(
                    "export {}-{} is missing from the outputs of the {} document",
                    owner, export.output, owner
                ))
                .into());
            }
        }

        for (owner, export) in self.all_exports() {
            if !summary.contains(&(owner.clone(), export.output.clone())) {
                return Err(CoreError::reference(format!(
                    "export {}-{} is not referenced by the root stack summary",
                    owner, export.output
                ))
                .into());
            }
        }

        for (owner, output) in summary {
            let declared = self
                .exports
                .get(owner)
                .is_some_and(|exports| exports.contains_key(output));
            if !declared {
                return Err(CoreError::reference(format!(
                    "root stack summary mirrors {}-{} which is not exported",
                    owner, output
                ))
                .into());
            }
        }

        Ok(())
    }

    /// `(owner, output)` pairs the root stack must mirror
    pub fn summary(&self) -> BTreeSet<(StackId, String)> {
        self.all_exports()
            .map(|(owner, export)| (owner.clone(), export.output.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn pool() -> StackId {
        StackId::NodePool("pool1".into())
    }

    /// Output names a faithful rendering of `graph` declares
    fn declared(graph: &ReferenceGraph) -> BTreeMap<StackId, BTreeSet<String>> {
        let mut declared: BTreeMap<StackId, BTreeSet<String>> = BTreeMap::new();
        for (owner, export) in graph.all_exports() {
            declared
                .entry(owner.clone())
                .or_default()
                .insert(export.output.clone());
        }
        declared
    }

    #[test]
    fn test_same_stack_is_intrinsic() {
        let mut graph = ReferenceGraph::new();
        let target = Target::resource(StackId::ControlPlane, "Public1");
        let reference = graph.resolve(&target, &StackId::ControlPlane).unwrap();
        assert_eq!(reference.to_json(), json!({"Ref": "Public1"}));
        assert_eq!(graph.all_exports().count(), 0);
    }

    #[test]
    fn test_attribute_is_get_att() {
        let mut graph = ReferenceGraph::new();
        let target = Target::attribute(StackId::ControlPlane, "IAMRoleController", Attribute::Arn);
        let reference = graph.resolve(&target, &StackId::ControlPlane).unwrap();
        assert_eq!(
            reference.to_json(),
            json!({"Fn::GetAtt": ["IAMRoleController", "Arn"]})
        );
    }

    #[test]
    fn test_existing_identity_is_literal() {
        let mut graph = ReferenceGraph::new();
        let target = Target::from_identity(
            &Identity::ExistingById("subnet-1".into()),
            StackId::ControlPlane,
            "Private1",
        );
        let reference = graph.resolve(&target, &pool()).unwrap();
        assert_eq!(reference, Reference::Literal("subnet-1".into()));
        assert_eq!(graph.imports().count(), 0);
    }

    #[test]
    fn test_imported_identity_is_external_import() {
        let mut graph = ReferenceGraph::new();
        let target = Target::from_identity(
            &Identity::ImportedByStackOutput("network-Public1".into()),
            StackId::ControlPlane,
            "Public1",
        );
        let reference = graph.resolve(&target, &StackId::ControlPlane).unwrap();
        assert_eq!(reference.to_json(), json!({"Fn::ImportValue": "network-Public1"}));
        assert_eq!(reference.export_name().as_deref(), Some("network-Public1"));
        assert_eq!(graph.all_exports().count(), 0);
    }

    #[test]
    fn test_cross_stack_registers_export() {
        let mut graph = ReferenceGraph::new();
        let target = Target::resource(StackId::ControlPlane, "SecurityGroupWorker");
        let reference = graph.resolve(&target, &pool()).unwrap();

        assert_eq!(
            reference.to_json(),
            json!({"Fn::ImportValue": {"Fn::Sub": "${ControlPlaneStackName}-SecurityGroupWorker"}})
        );
        assert_eq!(
            reference.export_name().as_deref(),
            Some("control-plane-SecurityGroupWorker")
        );

        let exports: Vec<_> = graph.exports(&StackId::ControlPlane).collect();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].output, "SecurityGroupWorker");
        assert_eq!(
            graph.import_owners(&pool()),
            BTreeSet::from([StackId::ControlPlane])
        );
        assert!(graph.verify(&graph.summary(), &declared(&graph)).is_ok());
    }

    #[test]
    fn test_attribute_export_name() {
        let mut graph = ReferenceGraph::new();
        let target = Target::attribute(StackId::ControlPlane, "Etcd0ENI", Attribute::PrimaryPrivateIpAddress);
        let reference = graph.resolve(&target, &pool()).unwrap();
        assert_eq!(
            reference,
            Reference::CrossStackImport {
                owner: ImportSource::Stack(StackId::ControlPlane),
                name: "Etcd0ENIPrivateIP".into(),
            }
        );
    }

    #[test]
    fn test_repeated_imports_share_one_export() {
        let mut graph = ReferenceGraph::new();
        let target = Target::resource(StackId::ControlPlane, "Public1");
        graph.resolve(&target, &pool()).unwrap();
        graph.resolve(&target, &StackId::NodePool("pool2".into())).unwrap();
        graph.publish(&target).unwrap();

        assert_eq!(graph.exports(&StackId::ControlPlane).count(), 1);
        assert_eq!(graph.imports().count(), 2);
    }

    #[test]
    fn test_root_cannot_import() {
        let mut graph = ReferenceGraph::new();
        let target = Target::resource(StackId::ControlPlane, "VPC");
        let err = graph.resolve(&target, &StackId::Root).unwrap_err();
        assert!(matches!(err, EngineError::Reference { .. }));
    }

    #[test]
    fn test_verify_detects_unmirrored_export() {
        let mut graph = ReferenceGraph::new();
        graph
            .publish(&Target::resource(StackId::ControlPlane, "VPC"))
            .unwrap();
        let err = graph.verify(&BTreeSet::new(), &declared(&graph)).unwrap_err();
        assert!(err.to_string().contains("control-plane-VPC"));
    }

    #[test]
    fn test_verify_detects_dangling_summary_entry() {
        let graph = ReferenceGraph::new();
        let summary = BTreeSet::from([(StackId::ControlPlane, "VPC".to_string())]);
        assert!(graph.verify(&summary, &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_verify_detects_import_without_declared_output() {
        let mut graph = ReferenceGraph::new();
        graph
            .resolve(&Target::resource(StackId::ControlPlane, "Public1"), &pool())
            .unwrap();
        let summary = graph.summary();

        let err = graph.verify(&summary, &BTreeMap::new()).unwrap_err();
        assert!(
            err.to_string()
                .contains("pool1 imports control-plane-Public1 but no output of the control-plane document exports it"),
            "{}",
            err
        );

        let mut shadowed = declared(&graph);
        shadowed.insert(StackId::ControlPlane, BTreeSet::from(["StackName".to_string()]));
        assert!(graph.verify(&summary, &shadowed).is_err());
        assert!(graph.verify(&summary, &declared(&graph)).is_ok());
    }
}
