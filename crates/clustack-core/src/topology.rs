//! Topology resolution
//!
//! Turns a [`ClusterSpec`] into a fully determined graph of network and identity
//! resources. For every subnet, route table, NAT gateway, Elastic IP and etcd member
//! this decides *who owns it*: the compiler (managed), the user (existing id), or
//! another stack (imported by stack output). Later stages only ever ask the
//! capability predicates defined here (`manage_subnet()`, `manage_nat_gateway()`, ...);
//! they never look at the raw fields again.
//!
//! Resolution halts at the first conflict and returns no partial model.

use ipnet::Ipv4Net;
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::naming::logical_name;
use crate::spec::{
    ApiEndpointSpec, ClusterSpec, EtcdNodeSpec, LoadBalancerKind, MemberIdentityProvider,
    SubnetSpec,
};

/// Who owns a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "camelCase")]
pub enum Identity {
    /// Created and owned by the generated stacks
    Managed,
    /// Created outside the cluster, referenced by a literal id
    ExistingById(String),
    /// Created by another stack, referenced through its export name
    ImportedByStackOutput(String),
}

impl Identity {
    fn from_fields(id: Option<&String>, id_from_stack_output: Option<&String>) -> Self {
        match (id, id_from_stack_output) {
            (Some(id), _) => Identity::ExistingById(id.clone()),
            (None, Some(export)) => Identity::ImportedByStackOutput(export.clone()),
            (None, None) => Identity::Managed,
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, Identity::Managed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "id", rename_all = "camelCase")]
pub enum RouteTableMode {
    Managed,
    Preconfigured(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "allocationId", rename_all = "camelCase")]
pub enum EipIdentity {
    Managed,
    ExistingByAllocationId(String),
}

/// Egress gateway of a private subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum NatGateway {
    /// Created in `host_subnet`, a public subnet of the same availability zone
    Managed {
        eip: EipIdentity,
        #[serde(rename = "hostSubnet")]
        host_subnet: String,
    },
    ExistingById { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub name: String,
    pub logical_name: String,
    pub availability_zone: Option<String>,
    pub cidr: Option<String>,
    pub visibility: Visibility,
    pub identity: Identity,
    /// `None` when the subnet itself is not ours
    pub route_table: Option<RouteTableMode>,
    /// `None` for public subnets and private subnets routed by a preconfigured table
    pub nat_gateway: Option<NatGateway>,
}

impl Subnet {
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// Whether the control plane declares this subnet, and with it the subnet's routing
    pub fn manage_subnet(&self) -> bool {
        self.identity.is_managed()
    }

    /// Managed subnet without a preconfigured route table
    pub fn manage_route_table(&self) -> bool {
        self.manage_subnet() && self.route_table == Some(RouteTableMode::Managed)
    }

    /// Public subnet whose own route table needs the default route to the internet gateway
    pub fn manage_route_to_internet(&self) -> bool {
        !self.is_private() && self.manage_route_table()
    }

    pub fn manage_nat_gateway(&self) -> bool {
        matches!(self.nat_gateway, Some(NatGateway::Managed { .. }))
    }

    /// A managed NAT gateway that also needs a fresh Elastic IP
    pub fn manage_eip(&self) -> bool {
        matches!(
            self.nat_gateway,
            Some(NatGateway::Managed {
                eip: EipIdentity::Managed,
                ..
            })
        )
    }

    /// A private subnet with its own route table gets a default route to its NAT gateway
    pub fn manage_route_to_nat_gateway(&self) -> bool {
        self.is_private() && self.manage_route_table() && self.nat_gateway.is_some()
    }

    /// Route table id from `routeTableId`, associated but never modified
    pub fn preconfigured_route_table_id(&self) -> Option<&str> {
        match &self.route_table {
            Some(RouteTableMode::Preconfigured(id)) => Some(id),
            _ => None,
        }
    }

    // Logical names below must stay in sync with `naming::SUBNET_RESOURCE_SUFFIXES`

    pub fn route_table_logical_name(&self) -> String {
        format!("{}RouteTable", self.logical_name)
    }

    pub fn route_table_association_logical_name(&self) -> String {
        format!("{}RouteTableAssociation", self.logical_name)
    }

    pub fn internet_route_logical_name(&self) -> String {
        format!("{}RouteToInternet", self.logical_name)
    }

    pub fn nat_gateway_logical_name(&self) -> String {
        format!("{}NatGateway", self.logical_name)
    }

    pub fn nat_gateway_eip_logical_name(&self) -> String {
        format!("{}NatGatewayEIP", self.logical_name)
    }

    pub fn nat_route_logical_name(&self) -> String {
        format!("{}RouteToNatGateway", self.logical_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub identity: Identity,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternetGateway {
    pub identity: Identity,
}

/// How one etcd member gets a stable address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "provider", rename_all = "camelCase")]
pub enum MemberIdentity {
    Fqdn,
    Eip { eip: EipIdentity },
    Eni {
        interface: Identity,
        #[serde(rename = "recordSet")]
        record_set: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdNode {
    pub index: usize,
    pub name: String,
    pub logical_name: String,
    pub subnet: String,
    pub availability_zone: String,
    pub identity: MemberIdentity,
    /// Static advertised name; `None` when the node advertises its Elastic IP
    pub fqdn: Option<String>,
}

impl EtcdNode {
    pub fn manage_eip(&self) -> bool {
        matches!(
            self.identity,
            MemberIdentity::Eip {
                eip: EipIdentity::Managed
            }
        )
    }

    /// An ENI member whose network interface is created by the control plane
    pub fn manage_network_interface(&self) -> bool {
        matches!(
            self.identity,
            MemberIdentity::Eni {
                interface: Identity::Managed,
                ..
            }
        )
    }

    pub fn manage_record_set(&self) -> bool {
        matches!(
            self.identity,
            MemberIdentity::Eni {
                record_set: true,
                ..
            }
        )
    }

    pub fn eip_logical_name(&self) -> String {
        format!("{}EIP", self.logical_name)
    }

    pub fn network_interface_logical_name(&self) -> String {
        format!("{}ENI", self.logical_name)
    }

    pub fn record_set_logical_name(&self) -> String {
        format!("{}InternalRecordSet", self.logical_name)
    }

    pub fn data_volume_logical_name(&self) -> String {
        format!("{}EBS", self.logical_name)
    }

    pub fn launch_configuration_logical_name(&self) -> String {
        format!("{}LC", self.logical_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedZone {
    pub identity: Identity,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdTopology {
    pub provider: MemberIdentityProvider,
    pub subnets: Vec<String>,
    pub nodes: Vec<EtcdNode>,
    pub hosted_zone: Option<HostedZone>,
}

impl EtcdTopology {
    pub fn node_should_have_eip(&self) -> bool {
        self.provider == MemberIdentityProvider::Eip
    }

    pub fn node_should_have_secondary_eni(&self) -> bool {
        self.provider == MemberIdentityProvider::Eni
    }

    pub fn manage_record_sets(&self) -> bool {
        self.nodes.iter().any(EtcdNode::manage_record_set)
    }

    pub fn manage_hosted_zone(&self) -> bool {
        self.hosted_zone
            .as_ref()
            .is_some_and(|zone| zone.identity.is_managed())
    }

    pub fn last_node(&self) -> Option<&EtcdNode> {
        self.nodes.last()
    }
}

/// Route53 CNAME pointing an API endpoint's DNS name at its load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecordSet {
    pub hosted_zone_id: String,
    pub ttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedApiLoadBalancer {
    pub kind: LoadBalancerKind,
    pub private: bool,
    pub subnets: Vec<String>,
    pub security_group_ids: Vec<String>,
    /// Sources admitted on port 443 by the managed security group
    pub allowed_source_cidrs: Vec<String>,
    pub record_set: Option<ApiRecordSet>,
}

impl ManagedApiLoadBalancer {
    pub fn manage_security_group(&self) -> bool {
        self.kind == LoadBalancerKind::Classic && !self.allowed_source_cidrs.is_empty()
    }

    pub fn scheme(&self) -> &'static str {
        if self.private {
            "internal"
        } else {
            "internet-facing"
        }
    }
}

/// Load balancer an API endpoint is served through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ApiLoadBalancer {
    /// Classic load balancer created outside the cluster, referenced by name
    Existing { name: String },
    Managed(ManagedApiLoadBalancer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    pub name: String,
    pub logical_name: String,
    pub dns_name: String,
    pub load_balancer: ApiLoadBalancer,
}

impl ApiEndpoint {
    pub fn managed_load_balancer(&self) -> Option<&ManagedApiLoadBalancer> {
        match &self.load_balancer {
            ApiLoadBalancer::Managed(lb) => Some(lb),
            ApiLoadBalancer::Existing { .. } => None,
        }
    }

    pub fn load_balancer_logical_name(&self) -> String {
        format!("APIEndpoint{}LB", self.logical_name)
    }

    pub fn target_group_logical_name(&self) -> String {
        format!("APIEndpoint{}TargetGroup", self.logical_name)
    }

    pub fn listener_logical_name(&self) -> String {
        format!("APIEndpoint{}Listener", self.logical_name)
    }

    pub fn security_group_logical_name(&self) -> String {
        format!("APIEndpoint{}SG", self.logical_name)
    }

    pub fn record_set_logical_name(&self) -> String {
        format!("APIEndpoint{}RecordSet", self.logical_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolTopology {
    pub name: String,
    pub logical_name: String,
    pub subnets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub cluster_name: String,
    pub region: String,
    pub vpc: Vpc,
    pub internet_gateway: Option<InternetGateway>,
    pub subnets: Vec<Subnet>,
    pub controller_subnets: Vec<String>,
    pub api_endpoints: Vec<ApiEndpoint>,
    pub etcd: EtcdTopology,
    pub node_pools: Vec<NodePoolTopology>,
}

impl Topology {
    pub fn subnet(&self, name: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.name == name)
    }

    pub fn node_pool(&self, name: &str) -> Option<&NodePoolTopology> {
        self.node_pools.iter().find(|p| p.name == name)
    }

    pub fn public_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(|s| !s.is_private())
    }

    pub fn private_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(|s| s.is_private())
    }

    /// NAT gateway the named private subnet egresses through
    pub fn nat_gateway_for_private_subnet(&self, name: &str) -> Option<&NatGateway> {
        self.subnet(name)
            .filter(|s| s.is_private())
            .and_then(|s| s.nat_gateway.as_ref())
    }

    /// Every NAT gateway private subnets egress through, managed or not
    pub fn nat_gateways(&self) -> impl Iterator<Item = (&Subnet, &NatGateway)> {
        self.subnets
            .iter()
            .filter_map(|s| s.nat_gateway.as_ref().map(|nat| (s, nat)))
    }

    pub fn managed_nat_gateway_count(&self) -> usize {
        self.subnets.iter().filter(|s| s.manage_nat_gateway()).count()
    }

    pub fn managed_eip_count(&self) -> usize {
        self.subnets.iter().filter(|s| s.manage_eip()).count()
            + self.etcd.nodes.iter().filter(|n| n.manage_eip()).count()
    }
}

/// Parse a CIDR block, rejecting host bits below the prefix
fn parse_cidr(value: &str, path: &str) -> Result<Ipv4Net> {
    let invalid = |reason: String| CoreError::schema(path, format!("{}: {}", path, reason));
    let net: Ipv4Net = value
        .parse()
        .map_err(|_| invalid(format!("`{}` is not a CIDR block (expected a.b.c.d/n)", value)))?;
    if net != net.trunc() {
        return Err(invalid(format!("`{}` has host bits set", value)));
    }
    Ok(net)
}

fn cidrs_overlap(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.network() <= b.broadcast() && b.network() <= a.broadcast()
}

/// Resolve the identity of every resource in the cluster
pub fn resolve(spec: &ClusterSpec) -> Result<Topology> {
    let vpc_cidr = parse_cidr(&spec.vpc.cidr, "vpc.cidr")?;
    let vpc = Vpc {
        identity: Identity::from_fields(spec.vpc.id.as_ref(), spec.vpc.id_from_stack_output.as_ref()),
        cidr: vpc_cidr.to_string(),
    };

    let mut subnets = Vec::with_capacity(spec.subnets.len());
    let mut managed_cidrs: Vec<(usize, Ipv4Net)> = Vec::new();
    for (i, subnet) in spec.subnets.iter().enumerate() {
        let resolved = resolve_subnet(spec, subnet, i)?;
        if let Some(cidr) = &resolved.cidr {
            let path = format!("subnets[{}].instanceCIDR", i);
            let cidr = parse_cidr(cidr, &path)?;
            if !vpc_cidr.contains(&cidr) {
                return Err(CoreError::topology(
                    path,
                    format!("instanceCIDR({}) is not contained in vpc.cidr({})", cidr, vpc_cidr),
                ));
            }
            if let Some((other, _)) = managed_cidrs.iter().find(|(_, c)| cidrs_overlap(c, &cidr)) {
                return Err(CoreError::topology(
                    path,
                    format!(
                        "instanceCIDR({}) overlaps with subnets[{}].instanceCIDR",
                        cidr, other
                    ),
                ));
            }
            managed_cidrs.push((i, cidr));
        }
        subnets.push(resolved);
    }
    place_nat_gateways(&mut subnets)?;

    let needs_internet_gateway = subnets.iter().any(Subnet::manage_route_to_internet);
    let igw_identity = Identity::from_fields(
        spec.internet_gateway.id.as_ref(),
        spec.internet_gateway.id_from_stack_output.as_ref(),
    );
    let internet_gateway = if needs_internet_gateway || !igw_identity.is_managed() {
        if needs_internet_gateway && igw_identity.is_managed() && !vpc.identity.is_managed() {
            tracing::warn!(
                "creating an internet gateway for an existing VPC; set internetGateway.id if the VPC already has one"
            );
        }
        Some(InternetGateway {
            identity: igw_identity,
        })
    } else {
        None
    };

    let default_subnets = default_subnet_names(&subnets);
    let controller_subnets = resolve_subnet_refs(
        &subnets,
        &spec.controller.subnets,
        "controller.subnets",
        &default_subnets,
    )?;
    let etcd = resolve_etcd(spec, &subnets, &default_subnets)?;
    let api_endpoints = spec
        .api_endpoints
        .iter()
        .enumerate()
        .map(|(i, endpoint)| resolve_api_endpoint(endpoint, &subnets, i))
        .collect::<Result<Vec<_>>>()?;

    let mut node_pools = Vec::with_capacity(spec.node_pools.len());
    for (i, pool) in spec.node_pools.iter().enumerate() {
        node_pools.push(NodePoolTopology {
            name: pool.name.clone(),
            logical_name: logical_name(&pool.name),
            subnets: resolve_subnet_refs(
                &subnets,
                &pool.subnets,
                &format!("worker.nodePools[{}].subnets", i),
                &default_subnets,
            )?,
        });
    }

    let topology = Topology {
        cluster_name: spec.cluster_name.clone(),
        region: spec.region.clone(),
        vpc,
        internet_gateway,
        subnets,
        controller_subnets,
        api_endpoints,
        etcd,
        node_pools,
    };
    tracing::debug!(
        subnets = topology.subnets.len(),
        managed_nat_gateways = topology.managed_nat_gateway_count(),
        etcd_nodes = topology.etcd.nodes.len(),
        "resolved topology"
    );
    Ok(topology)
}

fn resolve_subnet(spec: &ClusterSpec, subnet: &SubnetSpec, index: usize) -> Result<Subnet> {
    let path = format!("subnets[{}]", index);

    if subnet.id.is_some() && subnet.id_from_stack_output.is_some() {
        return Err(CoreError::topology(
            format!("{}.idFromStackOutput", path),
            "id and idFromStackOutput are mutually exclusive",
        ));
    }
    let identity = Identity::from_fields(subnet.id.as_ref(), subnet.id_from_stack_output.as_ref());
    let visibility = if subnet.private {
        Visibility::Private
    } else {
        Visibility::Public
    };

    if !identity.is_managed() {
        let field = if subnet.id.is_some() { "id" } else { "idFromStackOutput" };
        if subnet.instance_cidr.is_some() {
            return Err(CoreError::topology(
                format!("{}.instanceCIDR", path),
                format!("instanceCIDR cannot be combined with {}; the subnet already exists", field),
            ));
        }
        if subnet.route_table_id.is_some() {
            return Err(CoreError::topology(
                format!("{}.routeTable.id", path),
                format!("routeTable cannot be combined with {}; routing of an existing subnet is not managed", field),
            ));
        }
        if !subnet.nat_gateway.is_empty() {
            return Err(CoreError::topology(
                format!("{}.natGateway", path),
                format!("natGateway cannot be combined with {}; egress of an existing subnet is not managed", field),
            ));
        }

        tracing::debug!(subnet = %subnet.name, ?identity, "subnet is not managed");
        return Ok(Subnet {
            name: subnet.name.clone(),
            logical_name: logical_name(&subnet.name),
            availability_zone: subnet.availability_zone.clone(),
            cidr: None,
            visibility,
            identity,
            route_table: None,
            nat_gateway: None,
        });
    }

    let cidr = subnet.instance_cidr.clone().ok_or_else(|| {
        CoreError::topology(
            format!("{}.instanceCIDR", path),
            "instanceCIDR is required for a subnet without id or idFromStackOutput",
        )
    })?;
    if subnet.availability_zone.is_none() {
        return Err(CoreError::topology(
            format!("{}.availabilityZone", path),
            "availabilityZone is required for a subnet without id or idFromStackOutput",
        ));
    }

    let route_table = match subnet.route_table_id.as_ref().or(spec.route_table_id.as_ref()) {
        Some(id) => RouteTableMode::Preconfigured(id.clone()),
        None => RouteTableMode::Managed,
    };

    let nat = &subnet.nat_gateway;
    let nat_gateway = match visibility {
        Visibility::Public => {
            if !nat.is_empty() {
                return Err(CoreError::topology(
                    format!("{}.natGateway", path),
                    "natGateway is only meaningful for private subnets",
                ));
            }
            None
        }
        Visibility::Private => {
            if let (Some(_), Some(_)) = (&nat.id, &nat.eip_allocation_id) {
                return Err(CoreError::topology(
                    format!("{}.natGateway.eipAllocationId", path),
                    "natGateway.id and natGateway.eipAllocationId are mutually exclusive; an existing NAT gateway already has its Elastic IP",
                ));
            }
            match (&route_table, &nat.id, &nat.eip_allocation_id) {
                (RouteTableMode::Preconfigured(id), _, _) => {
                    if !nat.is_empty() {
                        return Err(CoreError::topology(
                            format!("{}.natGateway", path),
                            format!(
                                "natGateway cannot be combined with the preconfigured route table {}; egress is expected to be routed by that table",
                                id
                            ),
                        ));
                    }
                    None
                }
                (RouteTableMode::Managed, Some(id), _) => {
                    Some(NatGateway::ExistingById { id: id.clone() })
                }
                (RouteTableMode::Managed, None, Some(allocation)) => Some(NatGateway::Managed {
                    eip: EipIdentity::ExistingByAllocationId(allocation.clone()),
                    host_subnet: String::new(),
                }),
                (RouteTableMode::Managed, None, None) => Some(NatGateway::Managed {
                    eip: EipIdentity::Managed,
                    host_subnet: String::new(),
                }),
            }
        }
    };

    Ok(Subnet {
        name: subnet.name.clone(),
        logical_name: logical_name(&subnet.name),
        availability_zone: subnet.availability_zone.clone(),
        cidr: Some(cidr),
        visibility,
        identity,
        route_table: Some(route_table),
        nat_gateway,
    })
}

/// A managed NAT gateway lives in the first public subnet of its private subnet's zone
fn place_nat_gateways(subnets: &mut [Subnet]) -> Result<()> {
    let hosts: Vec<(Option<String>, String)> = subnets
        .iter()
        .filter(|s| !s.is_private())
        .map(|s| (s.availability_zone.clone(), s.name.clone()))
        .collect();

    for (i, subnet) in subnets.iter_mut().enumerate() {
        let zone = subnet.availability_zone.clone();
        let name = subnet.name.clone();
        if let Some(NatGateway::Managed { host_subnet, .. }) = &mut subnet.nat_gateway {
            let host = hosts
                .iter()
                .find(|(az, _)| az.is_some() && *az == zone)
                .map(|(_, host)| host.clone());
            match host {
                Some(host) => *host_subnet = host,
                None => {
                    return Err(CoreError::topology(
                        format!("subnets[{}]", i),
                        format!(
                            "private subnet `{}` has no resolvable egress: no public subnet in {} can host its NAT gateway; add one, or set natGateway.id or routeTable.id",
                            name,
                            zone.as_deref().unwrap_or("its availability zone")
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Public subnets when there are any, otherwise every subnet
fn default_subnet_names(subnets: &[Subnet]) -> Vec<String> {
    let public: Vec<String> = subnets
        .iter()
        .filter(|s| !s.is_private())
        .map(|s| s.name.clone())
        .collect();
    if public.is_empty() {
        subnets.iter().map(|s| s.name.clone()).collect()
    } else {
        public
    }
}

fn resolve_subnet_refs(
    subnets: &[Subnet],
    names: &[String],
    path: &str,
    defaults: &[String],
) -> Result<Vec<String>> {
    if names.is_empty() {
        return Ok(defaults.to_vec());
    }
    for (j, name) in names.iter().enumerate() {
        if !subnets.iter().any(|s| &s.name == name) {
            let known: Vec<&str> = subnets.iter().map(|s| s.name.as_str()).collect();
            return Err(CoreError::topology(
                format!("{}[{}]", path, j),
                format!(
                    "subnet `{}` is not defined in subnets[] (known subnets: {})",
                    name,
                    known.join(", ")
                ),
            ));
        }
    }
    Ok(names.to_vec())
}

fn resolve_api_endpoint(endpoint: &ApiEndpointSpec, subnets: &[Subnet], index: usize) -> Result<ApiEndpoint> {
    let path = format!("apiEndpoints[{}].loadBalancer", index);
    let lb = &endpoint.load_balancer;

    let load_balancer = match &lb.id {
        Some(name) => ApiLoadBalancer::Existing { name: name.clone() },
        None => {
            let subnets_path = format!("{}.subnets", path);
            // First matching subnet of each availability zone
            let mut defaults: Vec<String> = Vec::new();
            let mut default_zones: Vec<Option<&str>> = Vec::new();
            for subnet in subnets.iter().filter(|s| s.is_private() == lb.private) {
                let zone = subnet.availability_zone.as_deref();
                if zone.is_none() || !default_zones.contains(&zone) {
                    default_zones.push(zone);
                    defaults.push(subnet.name.clone());
                }
            }
            let chosen = resolve_subnet_refs(subnets, &lb.subnets, &subnets_path, &defaults)?;
            if chosen.is_empty() {
                return Err(CoreError::topology(
                    subnets_path,
                    format!(
                        "there is no {} subnet to place the load balancer of `{}` in; list its subnets explicitly",
                        if lb.private { "private" } else { "public" },
                        endpoint.name
                    ),
                ));
            }

            let mut zones: Vec<(&str, usize)> = Vec::new();
            for (j, name) in chosen.iter().enumerate() {
                let Some(subnet) = subnets.iter().find(|s| &s.name == name) else {
                    continue;
                };
                if !lb.private && subnet.is_private() {
                    return Err(CoreError::topology(
                        format!("{}[{}]", subnets_path, j),
                        format!(
                            "internet-facing load balancer of `{}` cannot be placed in private subnet `{}`; set {}.private to true",
                            endpoint.name, name, path
                        ),
                    ));
                }
                if let Some(zone) = subnet.availability_zone.as_deref() {
                    if let Some((_, first)) = zones.iter().find(|(z, _)| *z == zone) {
                        return Err(CoreError::topology(
                            format!("{}[{}]", subnets_path, j),
                            format!(
                                "subnets `{}` and `{}` are both in {}; a load balancer takes at most one subnet per availability zone",
                                chosen[*first], name, zone
                            ),
                        ));
                    }
                    zones.push((zone, j));
                }
            }

            let allowed_source_cidrs = lb
                .api_access_allowed_source_cidrs
                .iter()
                .enumerate()
                .map(|(j, cidr)| {
                    parse_cidr(cidr, &format!("{}.apiAccessAllowedSourceCIDRs[{}]", path, j))
                        .map(|net| net.to_string())
                })
                .collect::<Result<Vec<_>>>()?;

            let record_set = match (&lb.hosted_zone_id, lb.record_set_managed) {
                (Some(zone), true) => Some(ApiRecordSet {
                    hosted_zone_id: zone.clone(),
                    ttl: lb.record_set_ttl,
                }),
                _ => None,
            };

            ApiLoadBalancer::Managed(ManagedApiLoadBalancer {
                kind: lb.kind,
                private: lb.private,
                subnets: chosen,
                security_group_ids: lb.security_group_ids.clone(),
                allowed_source_cidrs: if lb.kind == LoadBalancerKind::Network {
                    Vec::new()
                } else {
                    allowed_source_cidrs
                },
                record_set,
            })
        }
    };

    Ok(ApiEndpoint {
        name: endpoint.name.clone(),
        logical_name: logical_name(&endpoint.name),
        dns_name: endpoint.dns_name.clone(),
        load_balancer,
    })
}

fn resolve_etcd(spec: &ClusterSpec, subnets: &[Subnet], defaults: &[String]) -> Result<EtcdTopology> {
    let etcd = &spec.etcd;
    let etcd_subnets = resolve_subnet_refs(subnets, &etcd.subnets, "etcd.subnets", defaults)?;

    let count = match (etcd.count, etcd.nodes.len()) {
        (Some(count), n) if n > 0 && count as usize != n => {
            return Err(CoreError::topology(
                "etcd.count",
                format!(
                    "etcd.count(={}) does not match the number of etcd.nodes(={}); set only one of them",
                    count, n
                ),
            ));
        }
        (_, n) if n > 0 => n,
        (Some(count), _) => count as usize,
        (None, _) => 1,
    };

    let mut nodes: Vec<EtcdNode> = Vec::with_capacity(count);
    for index in 0..count {
        let node_spec = etcd.nodes.get(index).cloned().unwrap_or_default();
        let path = format!("etcd.nodes[{}]", index);
        let name = node_spec
            .name
            .clone()
            .unwrap_or_else(|| format!("etcd{}", index));
        if let Some(other) = nodes.iter().find(|n| n.name == name) {
            return Err(CoreError::topology(
                format!("{}.name", path),
                format!("etcd node name `{}` is already used by etcd.nodes[{}]", name, other.index),
            ));
        }

        let subnet_name = etcd_subnets[index % etcd_subnets.len()].clone();
        let availability_zone = subnets
            .iter()
            .find(|s| s.name == subnet_name)
            .and_then(|s| s.availability_zone.clone())
            .ok_or_else(|| {
                CoreError::topology(
                    "etcd.subnets",
                    format!(
                        "etcd subnet `{}` has no availabilityZone; it is needed to place the etcd data volume",
                        subnet_name
                    ),
                )
            })?;

        let (identity, fqdn) = member_identity(spec, &node_spec, &name, &path, etcd.nodes.is_empty())?;
        nodes.push(EtcdNode {
            index,
            name,
            logical_name: format!("Etcd{}", index),
            subnet: subnet_name,
            availability_zone,
            identity,
            fqdn,
        });
    }

    let hosted_zone = nodes.iter().any(EtcdNode::manage_record_set).then(|| HostedZone {
        identity: match &etcd.hosted_zone_id {
            Some(id) => Identity::ExistingById(id.clone()),
            None => Identity::Managed,
        },
        name: etcd.internal_domain_name.clone(),
    });

    Ok(EtcdTopology {
        provider: etcd.member_identity_provider,
        subnets: etcd_subnets,
        nodes,
        hosted_zone,
    })
}

fn member_identity(
    spec: &ClusterSpec,
    node: &EtcdNodeSpec,
    name: &str,
    path: &str,
    implicit: bool,
) -> Result<(MemberIdentity, Option<String>)> {
    let etcd = &spec.etcd;
    let provider = etcd.member_identity_provider;

    if node.eip_allocation_id.is_some() && provider != MemberIdentityProvider::Eip {
        return Err(CoreError::topology(
            format!("{}.eipAllocationId", path),
            "eipAllocationId requires etcd.memberIdentityProvider to be `eip`",
        ));
    }
    if node.network_interface_id.is_some() && provider != MemberIdentityProvider::Eni {
        return Err(CoreError::topology(
            format!("{}.networkInterfaceId", path),
            "networkInterfaceId requires etcd.memberIdentityProvider to be `eni`",
        ));
    }

    match provider {
        MemberIdentityProvider::Fqdn => {
            let fqdn = node.fqdn.clone().ok_or_else(|| {
                let path = if implicit {
                    "etcd.nodes".to_string()
                } else {
                    format!("{}.fqdn", path)
                };
                CoreError::topology(
                    path,
                    "memberIdentityProvider `fqdn` requires a static fqdn for every etcd node",
                )
            })?;
            Ok((MemberIdentity::Fqdn, Some(fqdn)))
        }
        MemberIdentityProvider::Eip => {
            let eip = match &node.eip_allocation_id {
                Some(allocation) => EipIdentity::ExistingByAllocationId(allocation.clone()),
                None => EipIdentity::Managed,
            };
            Ok((MemberIdentity::Eip { eip }, node.fqdn.clone()))
        }
        MemberIdentityProvider::Eni => {
            let interface = match &node.network_interface_id {
                Some(id) => Identity::ExistingById(id.clone()),
                None => Identity::Managed,
            };
            // The record points at the interface's private IP, only known for managed ENIs
            let record_set = etcd.manage_record_sets && interface.is_managed();
            let fqdn = match &node.fqdn {
                Some(fqdn) => fqdn.clone(),
                None if etcd.manage_record_sets && !interface.is_managed() => {
                    return Err(CoreError::topology(
                        format!("{}.fqdn", path),
                        format!(
                            "etcd node `{}` uses an existing network interface, so no record set is created for it; give its fqdn explicitly or set etcd.manageRecordSets to false",
                            name
                        ),
                    ));
                }
                None => format!("{}.{}", name, etcd.internal_domain_name),
            };
            if !record_set {
                tracing::debug!(node = %name, %fqdn, "record set left to the user");
            }
            Ok((MemberIdentity::Eni { interface, record_set }, Some(fqdn)))
        }
    }
}
