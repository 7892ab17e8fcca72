//! Normalization of the raw configuration into a [`ClusterSpec`]
//!
//! This is the only place where defaults are applied and where the older
//! single-subnet settings (`vpcId`, `routeTableId`, `instanceCIDR`, ...) are folded
//! into their list-based replacements. Setting both forms of the same concept is a
//! conflict rather than a silent override.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{
    RawApiEndpoint, RawAutoScalingGroup, RawCluster, RawController, RawEtcd, RawIam, RawNodePool,
    RawSubnet, RawVolume, RawWaitSignal,
};
use crate::error::{CoreError, Result};
use crate::naming::{is_reserved_logical_name, logical_name, SUBNET_RESOURCE_SUFFIXES};
use crate::spec::{
    ApiEndpointSpec, ApiLoadBalancerSpec, AutoScaling, ClusterSpec, ControllerSpec, DataVolume,
    EtcdNodeSpec, EtcdSpec, InternetGatewaySpec, LoadBalancerKind, LoadBalancerSpec,
    MemberIdentityProvider, NatGatewaySpec, NodePoolSpec, Provisioning, SubnetSpec,
    TargetGroupSpec, Tenancy, Volume, VpcSpec, WaitSignal, DEFAULT_API_ACCESS_ALLOWED_SOURCE_CIDR,
    DEFAULT_CREATE_TIMEOUT, DEFAULT_INSTANCE_TYPE, DEFAULT_RECORD_SET_TTL, DEFAULT_VOLUME_SIZE,
    DEFAULT_VOLUME_TYPE,
};
use crate::spot_fleet::SpotFleet;

pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";
pub const DEFAULT_INSTANCE_CIDR: &str = "10.0.0.0/24";

/// Stack names owned by the compiler itself
pub const RESERVED_STACK_NAMES: &[&str] = &["root", "control-plane", "controlplane"];

static CLUSTER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9:-]+$").expect("valid regex"));

static CREATE_TIMEOUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^PT([0-9]+H)?([0-9]+M)?([0-9]+S)?$").expect("valid regex")
});

/// Turn raw user input into a fully defaulted cluster specification
pub fn normalize(raw: RawCluster) -> Result<ClusterSpec> {
    let cluster_name = raw
        .cluster_name
        .clone()
        .ok_or_else(|| CoreError::schema("clusterName", "missing required field `clusterName`"))?;
    if !CLUSTER_NAME.is_match(&cluster_name) {
        return Err(CoreError::schema(
            "clusterName",
            format!(
                "clusterName(={}) is malformed. It must consist only of alphanumerics, colons and hyphens",
                cluster_name
            ),
        ));
    }
    let region = raw
        .region
        .clone()
        .ok_or_else(|| CoreError::schema("region", "missing required field `region`"))?;

    if raw.worker_count.is_some_and(|n| n != 0) {
        return Err(CoreError::schema(
            "workerCount",
            "`workerCount` is removed. Set worker.nodePools[].count per node pool instead",
        ));
    }

    let vpc = normalize_vpc(&raw)?;
    let internet_gateway = InternetGatewaySpec {
        id: merge_legacy(
            &raw.internet_gateway_id,
            "internetGatewayId",
            &raw.internet_gateway.id,
            "internetGateway.id",
        )?,
        id_from_stack_output: raw.internet_gateway.id_from_stack_output.clone(),
    };
    if internet_gateway.id.is_some() && internet_gateway.id_from_stack_output.is_some() {
        return Err(CoreError::conflict(
            "internetGateway.idFromStackOutput",
            "internetGateway.id and internetGateway.idFromStackOutput are mutually exclusive",
        ));
    }

    let route_table_id = merge_legacy(
        &raw.route_table_id,
        "routeTableId",
        &raw.route_table.id,
        "routeTable.id",
    )?;
    if route_table_id.is_some() && vpc.id.is_none() && vpc.id_from_stack_output.is_none() {
        let path = if raw.route_table_id.is_some() {
            "routeTableId"
        } else {
            "routeTable.id"
        };
        return Err(CoreError::conflict(
            path,
            "a preconfigured route table requires vpc.id (or vpcId) to be set",
        ));
    }

    let subnets = normalize_subnets(&raw)?;
    let api_endpoints = normalize_api_endpoints(&raw.api_endpoints)?;

    let wait_signal = wait_signal(&raw.wait_signal, WaitSignal::default());
    let etcd = normalize_etcd(&raw.etcd, &cluster_name)?;
    let controller = normalize_controller(&raw.controller, wait_signal)?;

    let mut node_pools = Vec::with_capacity(raw.worker.node_pools.len());
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for (i, pool) in raw.worker.node_pools.iter().enumerate() {
        let path = format!("worker.nodePools[{}]", i);
        let logical = logical_name(&pool.name);
        if RESERVED_STACK_NAMES.contains(&pool.name.to_ascii_lowercase().as_str()) {
            return Err(CoreError::schema(
                format!("{}.name", path),
                format!("{}.name: `{}` is reserved for a stack of the cluster itself", path, pool.name),
            ));
        }
        if let Some(first) = seen.insert(logical.clone(), i) {
            return Err(CoreError::schema(
                format!("{}.name", path),
                format!(
                    "{}.name: node pool `{}` clashes with worker.nodePools[{}] (`{}`)",
                    path, pool.name, first, raw.worker.node_pools[first].name
                ),
            ));
        }
        node_pools.push(normalize_node_pool(pool, &path, wait_signal)?);
    }

    Ok(ClusterSpec {
        cluster_name,
        region,
        key_name: raw.key_name.clone(),
        ami_id: raw.ami_id.clone(),
        vpc,
        internet_gateway,
        route_table_id,
        subnets,
        api_endpoints,
        etcd,
        controller,
        node_pools,
    })
}

/// Resolve a setting that exists in both a deprecated and a current form
fn merge_legacy(
    legacy: &Option<String>,
    legacy_path: &str,
    modern: &Option<String>,
    modern_path: &str,
) -> Result<Option<String>> {
    match (legacy, modern) {
        (Some(_), Some(_)) => Err(CoreError::conflict(
            legacy_path,
            format!(
                "cannot set both {} and {}; {} is deprecated, keep only {}",
                legacy_path, modern_path, legacy_path, modern_path
            ),
        )),
        (Some(value), None) | (None, Some(value)) => Ok(Some(value.clone())),
        (None, None) => Ok(None),
    }
}

fn normalize_vpc(raw: &RawCluster) -> Result<VpcSpec> {
    let id = merge_legacy(&raw.vpc_id, "vpcId", &raw.vpc.id, "vpc.id")?;
    let cidr = merge_legacy(&raw.vpc_cidr, "vpcCIDR", &raw.vpc.cidr, "vpc.cidr")?;
    if id.is_some() && raw.vpc.id_from_stack_output.is_some() {
        return Err(CoreError::conflict(
            "vpc.idFromStackOutput",
            "vpc.id and vpc.idFromStackOutput are mutually exclusive",
        ));
    }

    Ok(VpcSpec {
        id,
        id_from_stack_output: raw.vpc.id_from_stack_output.clone(),
        cidr: cidr.unwrap_or_else(|| DEFAULT_VPC_CIDR.to_string()),
    })
}

fn normalize_subnets(raw: &RawCluster) -> Result<Vec<SubnetSpec>> {
    let map_public_ips = raw.map_public_ips.unwrap_or(true);

    if raw.subnets.is_empty() {
        let availability_zone = raw.availability_zone.clone().ok_or_else(|| {
            CoreError::schema(
                "availabilityZone",
                "availabilityZone must be set when no subnets are specified",
            )
        })?;
        let instance_cidr = raw
            .instance_cidr
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTANCE_CIDR.to_string());
        tracing::debug!(
            availability_zone = %availability_zone,
            cidr = %instance_cidr,
            "no subnets given, synthesizing Subnet0"
        );

        return Ok(vec![SubnetSpec {
            name: "Subnet0".to_string(),
            availability_zone: Some(availability_zone),
            instance_cidr: Some(instance_cidr),
            private: !map_public_ips,
            ..Default::default()
        }]);
    }

    if raw.availability_zone.is_some() {
        return Err(CoreError::conflict(
            "availabilityZone",
            "availabilityZone must be empty when subnets are specified; set subnets[].availabilityZone instead",
        ));
    }
    if raw.instance_cidr.is_some() {
        return Err(CoreError::conflict(
            "instanceCIDR",
            "instanceCIDR must be empty when subnets are specified; set subnets[].instanceCIDR instead",
        ));
    }

    let mut names: BTreeMap<String, usize> = BTreeMap::new();
    let mut logical_names: BTreeMap<String, usize> = BTreeMap::new();
    let mut generated_names: BTreeMap<String, usize> = BTreeMap::new();
    let mut subnets = Vec::with_capacity(raw.subnets.len());

    for (i, subnet) in raw.subnets.iter().enumerate() {
        let path = format!("subnets[{}]", i);
        let spec = normalize_subnet(subnet, i, map_public_ips);

        let logical = logical_name(&spec.name);
        if logical.is_empty() {
            return Err(CoreError::schema(
                format!("{}.name", path),
                format!("{}.name: `{}` contains no alphanumeric characters", path, spec.name),
            ));
        }
        if let Some(first) = names.insert(spec.name.clone(), i) {
            return Err(CoreError::schema(
                format!("{}.name", path),
                format!(
                    "{}.name: duplicate subnet name `{}` (first used by subnets[{}])",
                    path, spec.name, first
                ),
            ));
        }
        if let Some(first) = logical_names.insert(logical.clone(), i) {
            return Err(CoreError::schema(
                format!("{}.name", path),
                format!(
                    "{}.name: `{}` and subnets[{}] both map to logical name `{}`",
                    path, spec.name, first, logical
                ),
            ));
        }
        for suffix in SUBNET_RESOURCE_SUFFIXES {
            let generated = format!("{}{}", logical, suffix);
            if is_reserved_logical_name(&generated) {
                return Err(CoreError::schema(
                    format!("{}.name", path),
                    format!(
                        "{}.name: `{}` maps to logical name `{}`, which is reserved for a resource or output of the control plane",
                        path, spec.name, generated
                    ),
                ));
            }
            if let Some(first) = generated_names.insert(generated.clone(), i) {
                return Err(CoreError::schema(
                    format!("{}.name", path),
                    format!(
                        "{}.name: `{}` and subnets[{}] both generate the logical name `{}`",
                        path, spec.name, first, generated
                    ),
                ));
            }
        }

        subnets.push(spec);
    }

    Ok(subnets)
}

fn normalize_subnet(raw: &RawSubnet, index: usize, map_public_ips: bool) -> SubnetSpec {
    let nat = raw.nat_gateway.clone().unwrap_or_default();
    SubnetSpec {
        name: raw
            .name
            .clone()
            .unwrap_or_else(|| format!("Subnet{}", index)),
        availability_zone: raw.availability_zone.clone(),
        instance_cidr: raw.instance_cidr.clone(),
        id: raw.id.clone(),
        id_from_stack_output: raw.id_from_stack_output.clone(),
        private: raw.private.unwrap_or(!map_public_ips),
        route_table_id: raw.route_table.as_ref().and_then(|rt| rt.id.clone()),
        nat_gateway: NatGatewaySpec {
            id: nat.id,
            eip_allocation_id: nat.eip_allocation_id,
        },
    }
}

fn volume(raw: Option<&RawVolume>, path: &str) -> Result<Volume> {
    let raw = raw.cloned().unwrap_or_default();
    let volume = Volume {
        size: raw.size.unwrap_or(DEFAULT_VOLUME_SIZE),
        kind: raw.kind.unwrap_or_else(|| DEFAULT_VOLUME_TYPE.to_string()),
        iops: raw.iops.unwrap_or(0),
    };
    volume.check(path)?;
    Ok(volume)
}

fn wait_signal(raw: &RawWaitSignal, base: WaitSignal) -> WaitSignal {
    WaitSignal {
        enabled: raw.enabled.unwrap_or(base.enabled),
        max_batch_size: raw.max_batch_size.unwrap_or(base.max_batch_size),
    }
}

fn tenancy(raw: Option<&str>, path: &str) -> Result<Tenancy> {
    match raw {
        Some(value) => value.parse().map_err(|e| CoreError::schema(path, e)),
        None => Ok(Tenancy::Default),
    }
}

fn create_timeout(raw: Option<&str>, path: &str) -> Result<String> {
    let Some(timeout) = raw else {
        return Ok(DEFAULT_CREATE_TIMEOUT.to_string());
    };
    if timeout == "PT" || !CREATE_TIMEOUT.is_match(timeout) {
        return Err(CoreError::schema(
            path,
            format!(
                "{}(={}) must be an ISO 8601 duration such as PT15M or PT1H30M",
                path, timeout
            ),
        ));
    }
    Ok(timeout.to_string())
}

/// Existing instance profile, which replaces the managed role and profile entirely
fn instance_profile_arn(
    iam: Option<&RawIam>,
    managed_iam_role_name: Option<&String>,
    path: &str,
) -> Result<Option<String>> {
    let arn = iam.and_then(RawIam::instance_profile_arn);
    if arn.is_some() && managed_iam_role_name.is_some() {
        return Err(CoreError::conflict(
            format!("{}.iam.instanceProfile.arn", path),
            format!(
                "{}.iam.instanceProfile.arn and {}.managedIamRoleName are mutually exclusive; no role is created for an existing instance profile",
                path, path
            ),
        ));
    }
    Ok(arn)
}

fn auto_scaling(
    count: Option<u32>,
    group: Option<&RawAutoScalingGroup>,
    path: &str,
) -> Result<AutoScaling> {
    let Some(group) = group else {
        return Ok(AutoScaling::fixed(count.unwrap_or(1)));
    };

    if count.is_some() && (group.min_size.is_some() || group.max_size.is_some()) {
        return Err(CoreError::conflict(
            format!("{}.count", path),
            format!(
                "{}.count and {}.autoScalingGroup.minSize/maxSize are mutually exclusive",
                path, path
            ),
        ));
    }

    let base = count.unwrap_or(1);
    let min_size = group.min_size.unwrap_or(base);
    let max_size = group.max_size.unwrap_or(min_size.max(base));
    if min_size > max_size {
        return Err(CoreError::schema(
            format!("{}.autoScalingGroup.minSize", path),
            format!(
                "{}.autoScalingGroup.minSize({}) must be less than or equal to maxSize({})",
                path, min_size, max_size
            ),
        ));
    }

    let min_instances_in_service = group
        .rolling_update_min_instances_in_service
        .unwrap_or(max_size.saturating_sub(1));
    if min_instances_in_service > max_size {
        return Err(CoreError::schema(
            format!("{}.autoScalingGroup.rollingUpdateMinInstancesInService", path),
            format!(
                "{}.autoScalingGroup.rollingUpdateMinInstancesInService({}) must be less than or equal to maxSize({})",
                path, min_instances_in_service, max_size
            ),
        ));
    }

    Ok(AutoScaling {
        min_size,
        max_size,
        min_instances_in_service,
    })
}

fn normalize_etcd(raw: &RawEtcd, cluster_name: &str) -> Result<EtcdSpec> {
    let member_identity_provider = match raw.member_identity_provider.as_deref() {
        Some(provider) => provider
            .parse::<MemberIdentityProvider>()
            .map_err(|e| CoreError::schema("etcd.memberIdentityProvider", e))?,
        None => MemberIdentityProvider::Eip,
    };

    let raw_data = raw.data_volume.clone().unwrap_or_default();
    let data_volume = DataVolume {
        volume: volume(Some(&raw_data), "etcd.dataVolume")?,
        encrypted: raw_data.encrypted.unwrap_or(false),
    };

    let nodes = raw
        .nodes
        .iter()
        .map(|node| EtcdNodeSpec {
            name: node.name.clone(),
            fqdn: node.fqdn.clone(),
            eip_allocation_id: node.eip_allocation_id.clone(),
            network_interface_id: node.network_interface_id.clone(),
        })
        .collect();

    Ok(EtcdSpec {
        count: raw.count,
        nodes,
        instance_type: raw
            .instance_type
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
        root_volume: volume(raw.root_volume.as_ref(), "etcd.rootVolume")?,
        data_volume,
        subnets: raw.subnets.clone(),
        member_identity_provider,
        internal_domain_name: raw
            .internal_domain_name
            .clone()
            .unwrap_or_else(|| format!("{}.internal", cluster_name)),
        manage_record_sets: raw.manage_record_sets.unwrap_or(true),
        hosted_zone_id: raw.hosted_zone.as_ref().and_then(|z| z.id.clone()),
        tenancy: tenancy(raw.tenancy.as_deref(), "etcd.tenancy")?,
        instance_profile_arn: instance_profile_arn(raw.iam.as_ref(), None, "etcd")?,
    })
}

fn normalize_controller(raw: &RawController, wait_signal: WaitSignal) -> Result<ControllerSpec> {
    if raw
        .cluster_autoscaler
        .as_ref()
        .and_then(|ca| ca.enabled)
        .unwrap_or(false)
    {
        return Err(CoreError::conflict(
            "controller.clusterAutoscaler.enabled",
            "cluster-autoscaler can't be enabled for the control plane; enable it on a node pool instead",
        ));
    }

    Ok(ControllerSpec {
        auto_scaling: auto_scaling(raw.count, raw.auto_scaling_group.as_ref(), "controller")?,
        instance_type: raw
            .instance_type
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
        root_volume: volume(raw.root_volume.as_ref(), "controller.rootVolume")?,
        subnets: raw.subnets.clone(),
        security_group_ids: raw.security_group_ids.clone(),
        managed_iam_role_name: raw.managed_iam_role_name.clone(),
        wait_signal,
        create_timeout: create_timeout(raw.create_timeout.as_deref(), "controller.createTimeout")?,
        tenancy: tenancy(raw.tenancy.as_deref(), "controller.tenancy")?,
        instance_profile_arn: instance_profile_arn(
            raw.iam.as_ref(),
            raw.managed_iam_role_name.as_ref(),
            "controller",
        )?,
    })
}

fn normalize_node_pool(raw: &RawNodePool, path: &str, defaults: WaitSignal) -> Result<NodePoolSpec> {
    let fleet = raw
        .spot_fleet
        .as_ref()
        .filter(|f| f.target_capacity.unwrap_or(0) > 0);

    let (provisioning, wait_signal) = match fleet {
        Some(fleet) => {
            if raw.count.is_some() || raw.auto_scaling_group.is_some() {
                return Err(CoreError::conflict(
                    format!("{}.spotFleet", path),
                    format!(
                        "{}.spotFleet cannot be combined with count or autoScalingGroup",
                        path
                    ),
                ));
            }
            let fleet = SpotFleet::from_raw(fleet, &format!("{}.spotFleet", path))?;
            // Spot fleets never signal back to a creation policy
            let disabled = WaitSignal {
                enabled: false,
                ..defaults
            };
            (Provisioning::SpotFleet(fleet), disabled)
        }
        None => {
            let group = auto_scaling(raw.count, raw.auto_scaling_group.as_ref(), path)?;
            let wait = match &raw.wait_signal {
                Some(ws) => wait_signal(ws, defaults),
                None => defaults,
            };
            (Provisioning::AutoScaling(group), wait)
        }
    };

    let load_balancer = raw
        .load_balancer
        .as_ref()
        .map(|lb| LoadBalancerSpec {
            enabled: lb.enabled.unwrap_or(!lb.names.is_empty()),
            names: lb.names.clone(),
            security_group_ids: lb.security_group_ids.clone(),
        })
        .unwrap_or_default();
    let target_group = raw
        .target_group
        .as_ref()
        .map(|tg| TargetGroupSpec {
            enabled: tg.enabled.unwrap_or(!tg.arns.is_empty()),
            arns: tg.arns.clone(),
            security_group_ids: tg.security_group_ids.clone(),
        })
        .unwrap_or_default();

    Ok(NodePoolSpec {
        name: raw.name.clone(),
        provisioning,
        instance_type: raw
            .instance_type
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
        root_volume: volume(raw.root_volume.as_ref(), &format!("{}.rootVolume", path))?,
        subnets: raw.subnets.clone(),
        security_group_ids: raw.security_group_ids.clone(),
        load_balancer,
        target_group,
        managed_iam_role_name: raw.managed_iam_role_name.clone(),
        wait_signal,
        create_timeout: create_timeout(
            raw.create_timeout.as_deref(),
            &format!("{}.createTimeout", path),
        )?,
        tenancy: tenancy(raw.tenancy.as_deref(), &format!("{}.tenancy", path))?,
        instance_profile_arn: instance_profile_arn(
            raw.iam.as_ref(),
            raw.managed_iam_role_name.as_ref(),
            path,
        )?,
    })
}

fn normalize_api_endpoints(raw: &[RawApiEndpoint]) -> Result<Vec<ApiEndpointSpec>> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut endpoints = Vec::with_capacity(raw.len());

    for (i, endpoint) in raw.iter().enumerate() {
        let path = format!("apiEndpoints[{}]", i);
        let logical = logical_name(&endpoint.name);
        if logical.is_empty() {
            return Err(CoreError::schema(
                format!("{}.name", path),
                format!("{}.name: `{}` contains no alphanumeric characters", path, endpoint.name),
            ));
        }
        if let Some(first) = seen.insert(logical, i) {
            return Err(CoreError::schema(
                format!("{}.name", path),
                format!(
                    "{}.name: `{}` clashes with apiEndpoints[{}] (`{}`)",
                    path, endpoint.name, first, raw[first].name
                ),
            ));
        }
        if endpoint.dns_name.is_empty() {
            return Err(CoreError::schema(
                format!("{}.dnsName", path),
                format!("{}.dnsName must not be empty", path),
            ));
        }

        let lb_path = format!("{}.loadBalancer", path);
        let lb = &endpoint.load_balancer;
        let kind = match lb.kind.as_deref() {
            Some(kind) => kind
                .parse::<LoadBalancerKind>()
                .map_err(|e| CoreError::schema(format!("{}.type", lb_path), e))?,
            None => LoadBalancerKind::Classic,
        };
        let hosted_zone_id = lb.hosted_zone.as_ref().and_then(|z| z.id.clone());

        if lb.id.is_some() {
            let managed_only = [
                ("subnets", !lb.subnets.is_empty()),
                ("type", lb.kind.is_some()),
                ("private", lb.private.is_some()),
                ("hostedZone", lb.hosted_zone.is_some()),
                ("recordSetManaged", lb.record_set_managed.is_some()),
                ("securityGroupIds", !lb.security_group_ids.is_empty()),
                ("apiAccessAllowedSourceCIDRs", lb.api_access_allowed_source_cidrs.is_some()),
            ];
            if let Some((key, _)) = managed_only.iter().find(|(_, set)| *set) {
                return Err(CoreError::conflict(
                    format!("{}.{}", lb_path, key),
                    format!(
                        "{}.id names an existing load balancer; {}.{} only applies to a load balancer the cluster creates",
                        lb_path, lb_path, key
                    ),
                ));
            }
        }
        if kind == LoadBalancerKind::Network {
            if !lb.security_group_ids.is_empty() {
                return Err(CoreError::conflict(
                    format!("{}.securityGroupIds", lb_path),
                    "a network load balancer has no security groups",
                ));
            }
            if lb.api_access_allowed_source_cidrs.is_some() {
                return Err(CoreError::conflict(
                    format!("{}.apiAccessAllowedSourceCIDRs", lb_path),
                    "a network load balancer has no security group to restrict access with",
                ));
            }
        }
        if lb.record_set_managed == Some(true) && hosted_zone_id.is_none() {
            return Err(CoreError::conflict(
                format!("{}.recordSetManaged", lb_path),
                format!("{}.recordSetManaged requires {}.hostedZone.id", lb_path, lb_path),
            ));
        }

        endpoints.push(ApiEndpointSpec {
            name: endpoint.name.clone(),
            dns_name: endpoint.dns_name.clone(),
            load_balancer: ApiLoadBalancerSpec {
                id: lb.id.clone(),
                kind,
                private: lb.private.unwrap_or(false),
                subnets: lb.subnets.clone(),
                record_set_managed: lb.record_set_managed.unwrap_or(hosted_zone_id.is_some()),
                hosted_zone_id,
                record_set_ttl: lb.record_set_ttl.unwrap_or(DEFAULT_RECORD_SET_TTL),
                security_group_ids: lb.security_group_ids.clone(),
                api_access_allowed_source_cidrs: lb
                    .api_access_allowed_source_cidrs
                    .clone()
                    .unwrap_or_else(|| vec![DEFAULT_API_ACCESS_ALLOWED_SOURCE_CIDR.to_string()]),
            },
        });
    }

    Ok(endpoints)
}
