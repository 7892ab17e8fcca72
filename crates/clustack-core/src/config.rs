//! Raw cluster configuration as written by the user
//!
//! These types mirror `cluster.yaml` one to one. Every field is optional so that
//! defaulting and the migration of single-subnet settings happen in one place,
//! [`crate::normalize`], instead of being spread across serde attributes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCluster {
    pub cluster_name: Option<String>,
    pub region: Option<String>,
    pub key_name: Option<String>,
    pub ami_id: Option<String>,

    pub availability_zone: Option<String>,
    #[serde(rename = "instanceCIDR")]
    pub instance_cidr: Option<String>,
    pub vpc_id: Option<String>,
    #[serde(rename = "vpcCIDR")]
    pub vpc_cidr: Option<String>,
    pub route_table_id: Option<String>,
    pub internet_gateway_id: Option<String>,
    #[serde(rename = "mapPublicIPs")]
    pub map_public_ips: Option<bool>,
    pub worker_count: Option<i64>,

    #[serde(default)]
    pub vpc: RawVpc,
    #[serde(default)]
    pub internet_gateway: RawIdentity,
    #[serde(default)]
    pub route_table: RawRouteTable,
    #[serde(default)]
    pub subnets: Vec<RawSubnet>,
    #[serde(default)]
    pub wait_signal: RawWaitSignal,

    #[serde(default)]
    pub api_endpoints: Vec<RawApiEndpoint>,

    #[serde(default)]
    pub etcd: RawEtcd,
    #[serde(default)]
    pub controller: RawController,
    #[serde(default)]
    pub worker: RawWorker,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVpc {
    pub id: Option<String>,
    pub id_from_stack_output: Option<String>,
    pub cidr: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIdentity {
    pub id: Option<String>,
    pub id_from_stack_output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRouteTable {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNatGateway {
    pub id: Option<String>,
    pub eip_allocation_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubnet {
    pub name: Option<String>,
    pub availability_zone: Option<String>,
    #[serde(rename = "instanceCIDR")]
    pub instance_cidr: Option<String>,
    pub id: Option<String>,
    pub id_from_stack_output: Option<String>,
    pub private: Option<bool>,
    pub route_table: Option<RawRouteTable>,
    pub nat_gateway: Option<RawNatGateway>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVolume {
    pub size: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub iops: Option<u32>,
    pub encrypted: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAutoScalingGroup {
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
    pub rolling_update_min_instances_in_service: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWaitSignal {
    pub enabled: Option<bool>,
    pub max_batch_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInstanceProfile {
    pub arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIam {
    pub instance_profile: Option<RawInstanceProfile>,
}

impl RawIam {
    pub fn instance_profile_arn(&self) -> Option<String> {
        self.instance_profile.as_ref().and_then(|p| p.arn.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawApiEndpointLoadBalancer {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub private: Option<bool>,
    #[serde(default)]
    pub subnets: Vec<String>,
    pub hosted_zone: Option<RawRouteTable>,
    pub record_set_managed: Option<bool>,
    #[serde(rename = "recordSetTTL")]
    pub record_set_ttl: Option<u32>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(rename = "apiAccessAllowedSourceCIDRs")]
    pub api_access_allowed_source_cidrs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawApiEndpoint {
    pub name: String,
    pub dns_name: String,
    #[serde(default)]
    pub load_balancer: RawApiEndpointLoadBalancer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEtcdNode {
    pub name: Option<String>,
    pub fqdn: Option<String>,
    pub eip_allocation_id: Option<String>,
    pub network_interface_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEtcd {
    pub count: Option<u32>,
    pub instance_type: Option<String>,
    pub root_volume: Option<RawVolume>,
    pub data_volume: Option<RawVolume>,
    #[serde(default)]
    pub subnets: Vec<String>,
    pub member_identity_provider: Option<String>,
    pub internal_domain_name: Option<String>,
    pub manage_record_sets: Option<bool>,
    pub hosted_zone: Option<RawRouteTable>,
    pub tenancy: Option<String>,
    pub iam: Option<RawIam>,
    #[serde(default)]
    pub nodes: Vec<RawEtcdNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawClusterAutoscaler {
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawController {
    pub count: Option<u32>,
    pub auto_scaling_group: Option<RawAutoScalingGroup>,
    pub instance_type: Option<String>,
    pub root_volume: Option<RawVolume>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    pub managed_iam_role_name: Option<String>,
    pub cluster_autoscaler: Option<RawClusterAutoscaler>,
    pub create_timeout: Option<String>,
    pub tenancy: Option<String>,
    pub iam: Option<RawIam>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWorker {
    #[serde(default)]
    pub node_pools: Vec<RawNodePool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLoadBalancer {
    pub enabled: Option<bool>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTargetGroup {
    pub enabled: Option<bool>,
    #[serde(default)]
    pub arns: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLaunchSpecification {
    pub weighted_capacity: u32,
    pub instance_type: String,
    pub spot_price: Option<String>,
    pub root_volume: Option<RawVolume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSpotFleet {
    pub target_capacity: Option<u32>,
    pub spot_price: Option<String>,
    pub iam_fleet_role_arn: Option<String>,
    pub root_volume_type: Option<String>,
    pub unit_root_volume_size: Option<u32>,
    #[serde(rename = "unitRootVolumeIOPS")]
    pub unit_root_volume_iops: Option<u32>,
    #[serde(default)]
    pub launch_specifications: Vec<RawLaunchSpecification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNodePool {
    pub name: String,
    pub count: Option<u32>,
    pub auto_scaling_group: Option<RawAutoScalingGroup>,
    pub instance_type: Option<String>,
    pub root_volume: Option<RawVolume>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    pub managed_iam_role_name: Option<String>,
    pub load_balancer: Option<RawLoadBalancer>,
    pub target_group: Option<RawTargetGroup>,
    pub spot_fleet: Option<RawSpotFleet>,
    pub wait_signal: Option<RawWaitSignal>,
    pub create_timeout: Option<String>,
    pub tenancy: Option<String>,
    pub iam: Option<RawIam>,
}
