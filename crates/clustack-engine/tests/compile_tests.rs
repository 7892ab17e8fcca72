//! End-to-end compilation tests

use std::collections::BTreeSet;

use clustack_engine::{
    Compiler, EngineError, PayloadRenderer, PayloadRequest, StackId, StackSet, TemplatePayloads,
    compile,
};
use serde_json::Value;

const SINGLE_SUBNET: &str = r#"
clusterName: test-cluster
region: us-west-1
subnets:
- availabilityZone: us-west-1c
  instanceCIDR: 10.0.0.0/24
"#;

const MULTI_AZ: &str = r#"
clusterName: prod
region: us-west-2
keyName: ops
amiId: ami-0123
subnets:
- name: public-a
  availabilityZone: us-west-2a
  instanceCIDR: 10.0.1.0/24
- name: public-b
  availabilityZone: us-west-2b
  instanceCIDR: 10.0.2.0/24
- name: private-a
  private: true
  availabilityZone: us-west-2a
  instanceCIDR: 10.0.11.0/24
- name: private-b
  private: true
  availabilityZone: us-west-2b
  instanceCIDR: 10.0.12.0/24
  natGateway:
    eipAllocationId: eipalloc-1
etcd:
  count: 3
  subnets: [private-a, private-b]
  memberIdentityProvider: eni
controller:
  count: 2
  subnets: [public-a, public-b]
worker:
  nodePools:
  - name: general
    count: 3
    subnets: [private-a, private-b]
  - name: spot
    subnets: [private-b]
    spotFleet:
      targetCapacity: 4
"#;

const EXISTING_NETWORK: &str = r#"
clusterName: shared
region: eu-west-1
vpc:
  id: vpc-1
subnets:
- name: private1
  private: true
  availabilityZone: eu-west-1a
  id: subnet-1
- name: public1
  availabilityZone: eu-west-1a
  idFromStackOutput: network-PublicSubnet1
worker:
  nodePools:
  - name: pool1
    subnets: [private1, public1]
"#;

fn compile_yaml(yaml: &str) -> StackSet {
    Compiler::default()
        .compile_bytes(yaml.as_bytes())
        .expect("cluster should compile")
}

fn resource_names(stacks: &StackSet, id: &StackId) -> Vec<String> {
    stacks
        .stack(id)
        .map(|t| t.resources.keys().cloned().collect())
        .unwrap_or_default()
}

/// Every `{"Fn::ImportValue": {"Fn::Sub": "${Param}-Output"}}` in a document
fn collect_imports(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(import)) = map.get("Fn::ImportValue") {
                if let Some(Value::String(sub)) = import.get("Fn::Sub") {
                    found.insert(sub.clone());
                }
            }
            map.values().for_each(|v| collect_imports(v, found));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_imports(v, found)),
        _ => {}
    }
}

#[test]
fn test_single_subnet_control_plane() {
    let stacks = compile_yaml(SINGLE_SUBNET);
    let names = resource_names(&stacks, &StackId::ControlPlane);
    insta::assert_snapshot!(names.join("\n"), @r"
    VPC
    InternetGateway
    VPCGatewayAttachment
    Subnet0
    Subnet0RouteTable
    Subnet0RouteTableAssociation
    Subnet0RouteToInternet
    SecurityGroupWorker
    SecurityGroupController
    SecurityGroupEtcd
    SecurityGroupWorkerIngressFromController
    SecurityGroupWorkerIngressFromWorker
    SecurityGroupControllerIngressFromWorker
    SecurityGroupEtcdIngressFromController
    SecurityGroupEtcdIngressFromWorker
    SecurityGroupEtcdPeerIngress
    IAMRoleController
    IAMInstanceProfileController
    IAMRoleEtcd
    IAMInstanceProfileEtcd
    Etcd0EIP
    Etcd0EBS
    Etcd0LC
    Etcd0
    ControllersLC
    Controllers
    ");

    let outputs: Vec<String> = stacks
        .control_plane()
        .unwrap()
        .outputs
        .keys()
        .cloned()
        .collect();
    insta::assert_snapshot!(outputs.join("\n"), @r"
    SecurityGroupController
    SecurityGroupEtcd
    SecurityGroupWorker
    Subnet0
    VPC
    StackName
    ");
}

#[test]
fn test_render_names_every_stack() {
    let stacks = compile_yaml(MULTI_AZ);
    let rendered = stacks.render().unwrap();
    let names: Vec<&str> = rendered.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["root", "control-plane", "general", "spot"]);

    for document in rendered.values() {
        let value: Value = serde_json::from_str(document).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert!(value["Resources"].is_object());
    }
}

#[test]
fn test_compilation_is_deterministic() {
    for yaml in [SINGLE_SUBNET, MULTI_AZ, EXISTING_NETWORK] {
        let first = compile_yaml(yaml).render().unwrap();
        let second = compile_yaml(yaml).render().unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_every_import_has_an_export() {
    for yaml in [SINGLE_SUBNET, MULTI_AZ, EXISTING_NETWORK] {
        let stacks = compile_yaml(yaml);
        let control_plane = stacks.control_plane().unwrap();
        let root = stacks.root().unwrap();

        for stack in stacks.stacks() {
            let StackId::NodePool(_) = stack.id else {
                continue;
            };
            let document = serde_json::to_value(&stack.template).unwrap();
            let mut imports = BTreeSet::new();
            collect_imports(&document, &mut imports);
            assert!(!imports.is_empty());

            for import in imports {
                let output = import
                    .strip_prefix("${ControlPlaneStackName}-")
                    .unwrap_or_else(|| panic!("unexpected import {}", import));
                let declared = control_plane
                    .outputs
                    .get(output)
                    .unwrap_or_else(|| panic!("control plane does not declare {}", output));
                assert!(declared.export.is_some(), "{} is not exported", output);
            }
        }

        // Each export is mirrored by the root stack summary
        for stack in stacks.stacks() {
            for (name, output) in &stack.template.outputs {
                if output.export.is_some() {
                    let summary = format!("{}{}", stack.id.logical_name(), name);
                    assert!(root.outputs.contains_key(&summary), "{} missing", summary);
                }
            }
        }
    }
}

#[test]
fn test_multi_az_cluster() {
    let stacks = compile_yaml(MULTI_AZ);
    let control_plane = stacks.control_plane().unwrap();

    // private-a gets a managed NAT with its own EIP, private-b reuses an allocation
    assert!(control_plane.resource("PrivateANatGatewayEIP").is_some());
    assert!(control_plane.resource("PrivateBNatGatewayEIP").is_none());
    assert_eq!(
        control_plane.resource("PrivateBNatGateway").unwrap().properties["AllocationId"],
        "eipalloc-1"
    );

    let etcd2 = control_plane.resource("Etcd2").unwrap();
    assert_eq!(etcd2.depends_on[0], "Etcd1");
    assert_eq!(
        control_plane.resource("Controllers").unwrap().depends_on,
        vec!["Etcd2"]
    );
    assert_eq!(
        control_plane.resource("Controllers").unwrap().properties["MaxSize"],
        "2"
    );

    let spot = stacks.node_pool("spot").unwrap();
    assert!(spot.resource("SpotFleet").is_some());
    assert!(spot.resource("Workers").is_none());

    let general = stacks.node_pool("general").unwrap();
    let asg = general.resource("Workers").unwrap();
    assert_eq!(asg.properties["VPCZoneIdentifier"].as_array().unwrap().len(), 2);
    assert_eq!(
        general.resource("WorkersLC").unwrap().properties["KeyName"],
        "ops"
    );
}

#[test]
fn test_existing_network_is_referenced_not_created() {
    let stacks = compile_yaml(EXISTING_NETWORK);
    let control_plane = stacks.control_plane().unwrap();
    assert!(control_plane.resource("VPC").is_none());
    assert!(control_plane.resource("Private1").is_none());
    assert!(control_plane.resource("InternetGateway").is_none());
    assert!(!control_plane.outputs.contains_key("VPC"));

    let pool = stacks.node_pool("pool1").unwrap();
    let subnets = &pool.resource("Workers").unwrap().properties["VPCZoneIdentifier"];
    assert_eq!(subnets[0], "subnet-1");
    assert_eq!(
        subnets[1],
        serde_json::json!({"Fn::ImportValue": "network-PublicSubnet1"})
    );
    assert_eq!(
        control_plane.resource("SecurityGroupWorker").unwrap().properties["VpcId"],
        "vpc-1"
    );
}

#[test]
fn test_five_security_groups_exceed_capacity() {
    let err = Compiler::default()
        .compile_bytes(
            br#"
clusterName: c
region: us-west-1
availabilityZone: us-west-1a
worker:
  nodePools:
  - name: pool1
    securityGroupIds: [sg-1, sg-2, sg-3, sg-4, sg-5]
"#,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Capacity { actual: 5, limit: 4, .. }));
}

#[test]
fn test_configuration_errors_surface_unchanged() {
    let err = Compiler::default()
        .compile_bytes(b"clusterName: c\nregion: r\nvpcCIDR: 10.0.0.0/16\nvpc:\n  cidr: 10.0.0.0/16\n")
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));

    let err = Compiler::default()
        .compile_bytes(b"clusterName: c\nregion: r\nworkerCont: 3\n")
        .unwrap_err();
    assert!(matches!(err, EngineError::Schema { .. }));
}

#[test]
fn test_subnet_cannot_shadow_stack_name_output() {
    let err = Compiler::default()
        .compile_bytes(
            br#"
clusterName: c
region: us-west-1
subnets:
- name: stack-name
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.0.0/24
"#,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Schema { .. }), "{:?}", err);
    assert_eq!(err.path(), Some("subnets[0].name"));
}

#[test]
fn test_api_endpoints_compile_into_the_control_plane() {
    let stacks = compile_yaml(&format!(
        r#"{}apiEndpoints:
- name: default
  dnsName: api.prod.example.com
  loadBalancer:
    hostedZone:
      id: Z1
"#,
        MULTI_AZ
    ));
    let names = resource_names(&stacks, &StackId::ControlPlane);
    for name in ["APIEndpointDefaultLB", "APIEndpointDefaultSG", "APIEndpointDefaultRecordSet"] {
        assert!(names.iter().any(|n| n == name), "missing {}", name);
    }
    let lb = stacks
        .control_plane()
        .unwrap()
        .resource("APIEndpointDefaultLB")
        .unwrap();
    assert_eq!(
        lb.properties["Subnets"],
        serde_json::json!([{"Ref": "PublicA"}, {"Ref": "PublicB"}])
    );
}

struct Oversized;

impl PayloadRenderer for Oversized {
    fn render(&self, _request: &PayloadRequest) -> clustack_engine::Result<String> {
        Ok("#".repeat(20_000))
    }
}

#[test]
fn test_oversized_user_data() {
    let compiler = Compiler::builder().payloads(Oversized).build();
    let err = compiler.compile_bytes(SINGLE_SUBNET.as_bytes()).unwrap_err();
    match err {
        EngineError::Capacity {
            path,
            actual,
            limit,
            ..
        } => {
            assert_eq!(path, "etcd.nodes[0]");
            assert_eq!(actual, 20_000);
            assert_eq!(limit, 16_384);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_compile_with_explicit_renderer() {
    let spec = clustack_core::load_cluster(SINGLE_SUBNET.as_bytes()).unwrap();
    let payloads = TemplatePayloads::builtin().with_volume_attach_max_attempts(10);
    let stacks = compile(&spec, &payloads).unwrap();
    let lc = stacks.control_plane().unwrap().resource("Etcd0LC").unwrap();
    let user_data = lc.properties["UserData"]["Fn::Base64"].as_str().unwrap();
    assert!(user_data.contains("max_attempts=10"));
}
