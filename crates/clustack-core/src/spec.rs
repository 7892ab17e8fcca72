//! Normalized cluster specification
//!
//! `ClusterSpec` is what [`crate::normalize::normalize`] produces: every default applied,
//! every legacy single-subnet setting folded into its list-based form. Nothing here has
//! been cross-checked yet; that is the job of the topology resolver.

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::spot_fleet::SpotFleet;

pub const DEFAULT_INSTANCE_TYPE: &str = "t2.medium";
pub const DEFAULT_VOLUME_SIZE: u32 = 30;
pub const DEFAULT_VOLUME_TYPE: &str = "gp2";
/// How long a group may take to signal success, as an ISO 8601 duration
pub const DEFAULT_CREATE_TIMEOUT: &str = "PT15M";
pub const DEFAULT_RECORD_SET_TTL: u32 = 300;
pub const DEFAULT_API_ACCESS_ALLOWED_SOURCE_CIDR: &str = "0.0.0.0/0";

/// Volume types whose IOPS figure is mandatory
pub fn uses_provisioned_iops(kind: &str) -> bool {
    matches!(kind, "io1" | "io2")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub size: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub iops: u32,
}

impl Volume {
    pub fn new(size: u32, kind: &str, iops: u32) -> Self {
        Self {
            size,
            kind: kind.to_string(),
            iops,
        }
    }

    pub fn provisioned_iops(&self) -> bool {
        uses_provisioned_iops(&self.kind)
    }

    /// Provisioned-IOPS volumes need an IOPS figure, magnetic and gp2 volumes reject one
    pub fn check(&self, path: &str) -> Result<()> {
        if self.provisioned_iops() && self.iops == 0 {
            return Err(CoreError::schema(
                format!("{}.iops", path),
                format!("{}.iops must be set for a `{}` volume", path, self.kind),
            ));
        }
        if !self.provisioned_iops() && self.kind != "gp3" && self.iops > 0 {
            return Err(CoreError::schema(
                format!("{}.iops", path),
                format!(
                    "{}.iops is only valid for io1, io2 and gp3 volumes but type is `{}`",
                    path, self.kind
                ),
            ));
        }
        Ok(())
    }
}

impl Default for Volume {
    fn default() -> Self {
        Volume::new(DEFAULT_VOLUME_SIZE, DEFAULT_VOLUME_TYPE, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataVolume {
    #[serde(flatten)]
    pub volume: Volume,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoScaling {
    pub min_size: u32,
    pub max_size: u32,
    pub min_instances_in_service: u32,
}

impl AutoScaling {
    pub fn fixed(count: u32) -> Self {
        Self {
            min_size: count,
            max_size: count,
            min_instances_in_service: count.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitSignal {
    pub enabled: bool,
    pub max_batch_size: u32,
}

impl Default for WaitSignal {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch_size: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    pub id: Option<String>,
    pub id_from_stack_output: Option<String>,
    pub cidr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternetGatewaySpec {
    pub id: Option<String>,
    pub id_from_stack_output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NatGatewaySpec {
    pub id: Option<String>,
    pub eip_allocation_id: Option<String>,
}

impl NatGatewaySpec {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.eip_allocation_id.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    pub name: String,
    pub availability_zone: Option<String>,
    pub instance_cidr: Option<String>,
    pub id: Option<String>,
    pub id_from_stack_output: Option<String>,
    pub private: bool,
    pub route_table_id: Option<String>,
    pub nat_gateway: NatGatewaySpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberIdentityProvider {
    /// Static DNS names given per node
    Fqdn,
    /// One Elastic IP per node
    Eip,
    /// One secondary network interface per node
    Eni,
}

impl std::str::FromStr for MemberIdentityProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fqdn" => Ok(Self::Fqdn),
            "eip" => Ok(Self::Eip),
            "eni" => Ok(Self::Eni),
            other => Err(format!(
                "unknown member identity provider `{}` (expected fqdn, eip or eni)",
                other
            )),
        }
    }
}

/// Instance placement tenancy of a launch configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tenancy {
    #[default]
    Default,
    Dedicated,
}

impl Tenancy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tenancy::Default => "default",
            Tenancy::Dedicated => "dedicated",
        }
    }
}

impl std::str::FromStr for Tenancy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "dedicated" => Ok(Self::Dedicated),
            other => Err(format!("unknown tenancy `{}` (expected default or dedicated)", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdNodeSpec {
    pub name: Option<String>,
    pub fqdn: Option<String>,
    pub eip_allocation_id: Option<String>,
    pub network_interface_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSpec {
    /// Only what the user wrote; reconciled with `nodes` by the resolver
    pub count: Option<u32>,
    pub nodes: Vec<EtcdNodeSpec>,
    pub instance_type: String,
    pub root_volume: Volume,
    pub data_volume: DataVolume,
    pub subnets: Vec<String>,
    pub member_identity_provider: MemberIdentityProvider,
    pub internal_domain_name: String,
    pub manage_record_sets: bool,
    pub hosted_zone_id: Option<String>,
    pub tenancy: Tenancy,
    /// Existing instance profile; no role or profile is created when set
    pub instance_profile_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSpec {
    pub auto_scaling: AutoScaling,
    pub instance_type: String,
    pub root_volume: Volume,
    pub subnets: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub managed_iam_role_name: Option<String>,
    pub wait_signal: WaitSignal,
    /// Signal timeout of the controllers and of every etcd member
    pub create_timeout: String,
    pub tenancy: Tenancy,
    pub instance_profile_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    pub enabled: bool,
    pub names: Vec<String>,
    pub security_group_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupSpec {
    pub enabled: bool,
    pub arns: Vec<String>,
    pub security_group_ids: Vec<String>,
}

/// How a node pool provisions its instances
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Provisioning {
    AutoScaling(AutoScaling),
    SpotFleet(SpotFleet),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    pub name: String,
    pub provisioning: Provisioning,
    pub instance_type: String,
    pub root_volume: Volume,
    pub subnets: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub load_balancer: LoadBalancerSpec,
    pub target_group: TargetGroupSpec,
    pub managed_iam_role_name: Option<String>,
    pub wait_signal: WaitSignal,
    pub create_timeout: String,
    pub tenancy: Tenancy,
    pub instance_profile_arn: Option<String>,
}

impl NodePoolSpec {
    /// Security groups the user asked for, in attachment order
    pub fn user_security_group_ids(&self) -> Vec<String> {
        let mut ids = self.security_group_ids.clone();
        if self.load_balancer.enabled {
            ids.extend(self.load_balancer.security_group_ids.iter().cloned());
        }
        if self.target_group.enabled {
            ids.extend(self.target_group.security_group_ids.iter().cloned());
        }
        ids
    }

    pub fn spot_fleet(&self) -> Option<&SpotFleet> {
        match &self.provisioning {
            Provisioning::SpotFleet(fleet) => Some(fleet),
            Provisioning::AutoScaling(_) => None,
        }
    }
}

/// Kind of load balancer fronting the API servers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerKind {
    #[default]
    Classic,
    Network,
}

impl std::str::FromStr for LoadBalancerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "classic" => Ok(Self::Classic),
            "network" => Ok(Self::Network),
            other => Err(format!(
                "unknown load balancer type `{}` (expected classic or network)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLoadBalancerSpec {
    /// Name of an existing classic load balancer to register the controllers with
    pub id: Option<String>,
    pub kind: LoadBalancerKind,
    pub private: bool,
    pub subnets: Vec<String>,
    pub hosted_zone_id: Option<String>,
    pub record_set_managed: bool,
    pub record_set_ttl: u32,
    pub security_group_ids: Vec<String>,
    pub api_access_allowed_source_cidrs: Vec<String>,
}

/// A DNS name the Kubernetes API is reachable under
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpointSpec {
    pub name: String,
    pub dns_name: String,
    pub load_balancer: ApiLoadBalancerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub cluster_name: String,
    pub region: String,
    pub key_name: Option<String>,
    pub ami_id: Option<String>,
    pub vpc: VpcSpec,
    pub internet_gateway: InternetGatewaySpec,
    /// Cluster-wide preconfigured route table, applied to managed subnets without their own
    pub route_table_id: Option<String>,
    pub subnets: Vec<SubnetSpec>,
    pub api_endpoints: Vec<ApiEndpointSpec>,
    pub etcd: EtcdSpec,
    pub controller: ControllerSpec,
    pub node_pools: Vec<NodePoolSpec>,
}

impl ClusterSpec {
    pub fn subnet(&self, name: &str) -> Option<&SubnetSpec> {
        self.subnets.iter().find(|s| s.name == name)
    }

    pub fn node_pool(&self, name: &str) -> Option<&NodePoolSpec> {
        self.node_pools.iter().find(|p| p.name == name)
    }
}
