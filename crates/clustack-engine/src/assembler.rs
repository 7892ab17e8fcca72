//! Stack assembler
//!
//! Compiles a [`ClusterSpec`] into one document per stack:
//!
//! 1. resolve the topology
//! 2. assemble the control plane (networking, etcd, controllers)
//! 3. assemble each node pool, importing what it needs from the control plane
//! 4. declare the control-plane outputs the node pools ended up importing
//! 5. assemble the root stack, mirroring every export in its summary outputs
//! 6. verify export/import symmetry
//!
//! No partial result is ever returned: the first error aborts compilation.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde_json::{Value, json};

use clustack_core::{ClusterSpec, Topology, Volume, WaitSignal, load_cluster, resolve};

use crate::document::Template;
use crate::error::Result;
use crate::payload::{EtcdMember, InstanceRole, PayloadRenderer, PayloadRequest, TemplatePayloads};
use crate::reference::{Reference, ReferenceGraph};
use crate::stack::StackId;
use crate::{control_plane, node_pool, root};

/// A generated stack document
#[derive(Debug, Clone)]
pub struct RenderedStack {
    pub id: StackId,
    pub template: Template,
}

/// Every stack of a cluster, root first
#[derive(Debug)]
pub struct StackSet {
    stacks: Vec<RenderedStack>,
    topology: Topology,
    graph: ReferenceGraph,
}

impl StackSet {
    /// Root, control plane, then node pools in declaration order
    pub fn stacks(&self) -> &[RenderedStack] {
        &self.stacks
    }

    pub fn stack(&self, id: &StackId) -> Option<&Template> {
        self.stacks.iter().find(|s| &s.id == id).map(|s| &s.template)
    }

    pub fn root(&self) -> Option<&Template> {
        self.stack(&StackId::Root)
    }

    pub fn control_plane(&self) -> Option<&Template> {
        self.stack(&StackId::ControlPlane)
    }

    /// Stack of the node pool called `name`, as written in `worker.nodePools`
    pub fn node_pool(&self, name: &str) -> Option<&Template> {
        self.stack(&StackId::NodePool(name.to_string()))
    }

    /// Topology the stacks were generated from
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Every export and import recorded while assembling the stacks
    pub fn graph(&self) -> &ReferenceGraph {
        &self.graph
    }

    /// Stack name to pretty-printed JSON document
    pub fn render(&self) -> Result<IndexMap<String, String>> {
        self.stacks
            .iter()
            .map(|s| Ok((s.id.name().to_string(), s.template.to_json_pretty()?)))
            .collect()
    }
}

/// Compiler builder
pub struct CompilerBuilder {
    payloads: Box<dyn PayloadRenderer>,
}

impl Default for CompilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerBuilder {
    pub fn new() -> Self {
        Self {
            payloads: Box::new(TemplatePayloads::builtin()),
        }
    }

    /// Replace the user-data renderer
    pub fn payloads(mut self, payloads: impl PayloadRenderer + 'static) -> Self {
        self.payloads = Box::new(payloads);
        self
    }

    pub fn build(self) -> Compiler {
        Compiler {
            payloads: self.payloads,
        }
    }
}

/// Cluster configuration to stack documents
pub struct Compiler {
    payloads: Box<dyn PayloadRenderer>,
}

impl Default for Compiler {
    fn default() -> Self {
        CompilerBuilder::new().build()
    }
}

impl Compiler {
    pub fn builder() -> CompilerBuilder {
        CompilerBuilder::new()
    }

    pub fn compile(&self, spec: &ClusterSpec) -> Result<StackSet> {
        compile(spec, self.payloads.as_ref())
    }

    /// Load, validate and compile a `cluster.yaml`
    pub fn compile_bytes(&self, bytes: &[u8]) -> Result<StackSet> {
        let spec = load_cluster(bytes)?;
        self.compile(&spec)
    }
}

/// Compile a normalized cluster specification
pub fn compile(spec: &ClusterSpec, payloads: &dyn PayloadRenderer) -> Result<StackSet> {
    let topology = resolve(spec)?;
    let mut graph = ReferenceGraph::new();
    let ctx = Context {
        spec,
        topology: &topology,
        payloads,
    };

    let mut control_plane = control_plane::build(&ctx, &mut graph)?;

    let mut pools = Vec::with_capacity(spec.node_pools.len());
    for (index, pool) in spec.node_pools.iter().enumerate() {
        let template = node_pool::build(&ctx, &mut graph, index, pool)?;
        pools.push(RenderedStack {
            id: StackId::NodePool(pool.name.clone()),
            template,
        });
    }

    control_plane::declare_outputs(&mut control_plane, &graph)?;

    let (root, summary) = root::build(&ctx, &graph, &pools)?;
    let declared: BTreeMap<StackId, BTreeSet<String>> =
        std::iter::once((StackId::ControlPlane, control_plane.exported_outputs()))
            .chain(
                pools
                    .iter()
                    .map(|pool| (pool.id.clone(), pool.template.exported_outputs())),
            )
            .collect();
    graph.verify(&summary, &declared)?;

    let mut stacks = Vec::with_capacity(pools.len() + 2);
    stacks.push(RenderedStack {
        id: StackId::Root,
        template: root,
    });
    stacks.push(RenderedStack {
        id: StackId::ControlPlane,
        template: control_plane,
    });
    stacks.extend(pools);

    tracing::debug!(
        cluster = %spec.cluster_name,
        stacks = stacks.len(),
        exports = graph.all_exports().count(),
        imports = graph.imports().count(),
        "compiled cluster"
    );

    Ok(StackSet {
        stacks,
        topology,
        graph,
    })
}

/// Inputs shared by every stack builder
pub(crate) struct Context<'a> {
    pub spec: &'a ClusterSpec,
    pub topology: &'a Topology,
    pub payloads: &'a dyn PayloadRenderer,
}

impl Context<'_> {
    pub fn payload_request(&self, role: InstanceRole, stack: &StackId) -> PayloadRequest {
        PayloadRequest {
            role,
            cluster_name: self.spec.cluster_name.clone(),
            region: self.spec.region.clone(),
            stack: stack.name().to_string(),
            node_pool: None,
            etcd_index: None,
            etcd_node_name: None,
            etcd_members: self
                .topology
                .etcd
                .nodes
                .iter()
                .map(|node| EtcdMember {
                    name: node.name.clone(),
                    fqdn: node.fqdn.clone(),
                })
                .collect(),
            etcd_internal_domain_name: self.spec.etcd.internal_domain_name.clone(),
        }
    }

    pub fn cluster_tag_key(&self) -> String {
        format!("kubernetes.io/cluster/{}", self.spec.cluster_name)
    }

    /// Tags for plain resources
    pub fn tags(&self, name: &str) -> Value {
        json!([
            { "Key": "Name", "Value": format!("{}-{}", self.spec.cluster_name, name) },
            { "Key": self.cluster_tag_key(), "Value": "owned" }
        ])
    }

    /// Tags for auto scaling groups, propagated to their instances
    pub fn asg_tags(&self, name: &str, extra: &[(&str, Value)]) -> Value {
        let mut tags = vec![
            json!({
                "Key": "Name",
                "Value": format!("{}-{}", self.spec.cluster_name, name),
                "PropagateAtLaunch": "true"
            }),
            json!({
                "Key": self.cluster_tag_key(),
                "Value": "owned",
                "PropagateAtLaunch": "true"
            }),
        ];
        for (key, value) in extra {
            tags.push(json!({ "Key": key, "Value": value, "PropagateAtLaunch": "true" }));
        }
        Value::Array(tags)
    }
}

pub(crate) fn references(refs: &[Reference]) -> Value {
    Value::Array(refs.iter().map(Reference::to_json).collect())
}

pub(crate) fn ebs(volume: &Volume) -> Value {
    let mut ebs = json!({
        "VolumeSize": volume.size.to_string(),
        "VolumeType": volume.kind,
    });
    if volume.iops > 0 {
        ebs["Iops"] = json!(volume.iops.to_string());
    }
    ebs
}

pub(crate) fn root_block_devices(volume: &Volume) -> Value {
    json!([{ "DeviceName": "/dev/xvda", "Ebs": ebs(volume) }])
}

pub(crate) fn user_data(payload: &str) -> Value {
    json!({ "Fn::Base64": payload })
}

pub(crate) fn ec2_assume_role_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": ["ec2.amazonaws.com"] },
            "Action": ["sts:AssumeRole"]
        }]
    })
}

/// Role name that CloudFormation expands to `{stack}-{region}-{role}`
pub(crate) fn managed_role_name(role: &str) -> Value {
    json!({
        "Fn::Join": ["-", [{ "Ref": "AWS::StackName" }, { "Ref": "AWS::Region" }, role]]
    })
}

/// Signal count and ISO-8601 timeout a group waits for on creation
pub(crate) fn creation_policy(count: u32, wait: &WaitSignal, timeout: &str) -> Option<Value> {
    wait.enabled.then(|| {
        json!({
            "ResourceSignal": { "Count": count.to_string(), "Timeout": timeout }
        })
    })
}

pub(crate) fn rolling_update(
    min_instances_in_service: u32,
    wait: &WaitSignal,
    pause_time: &str,
) -> Value {
    let mut update = json!({
        "MinInstancesInService": min_instances_in_service.to_string(),
        "MaxBatchSize": wait.max_batch_size.to_string(),
    });
    if wait.enabled {
        update["WaitOnResourceSignals"] = json!("true");
        update["PauseTime"] = json!(pause_time);
    }
    json!({ "AutoScalingRollingUpdate": update })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_update_without_signals() {
        let wait = WaitSignal {
            enabled: false,
            max_batch_size: 2,
        };
        assert_eq!(creation_policy(3, &wait, "PT15M"), None);
        assert_eq!(
            rolling_update(1, &wait, "PT15M"),
            json!({"AutoScalingRollingUpdate": {"MinInstancesInService": "1", "MaxBatchSize": "2"}})
        );
    }

    #[test]
    fn test_signal_timeout_is_passed_through() {
        let wait = WaitSignal {
            enabled: true,
            max_batch_size: 1,
        };
        assert_eq!(
            creation_policy(2, &wait, "PT1H30M"),
            Some(json!({"ResourceSignal": {"Count": "2", "Timeout": "PT1H30M"}}))
        );
        assert_eq!(
            rolling_update(1, &wait, "PT1H30M")["AutoScalingRollingUpdate"]["PauseTime"],
            "PT1H30M"
        );
    }

    #[test]
    fn test_ebs_iops_only_when_set() {
        assert!(ebs(&Volume::default()).get("Iops").is_none());
        assert_eq!(ebs(&Volume::new(100, "io1", 2000))["Iops"], "2000");
    }
}
