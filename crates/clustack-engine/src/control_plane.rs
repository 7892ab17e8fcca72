//! Control-plane stack: networking, etcd and controllers

use serde_json::{Value, json};

use clustack_core::{
    ApiEndpoint, ApiLoadBalancer, EipIdentity, EtcdNode, Identity, LoadBalancerKind,
    ManagedApiLoadBalancer, MemberIdentity, NatGateway, Subnet,
};

use crate::assembler::{
    Context, creation_policy, ec2_assume_role_policy, managed_role_name, references,
    rolling_update, root_block_devices, user_data,
};
use crate::document::{Output, Parameter, Resource, Template};
use crate::error::Result;
use crate::payload::InstanceRole;
use crate::reference::{Attribute, Reference, ReferenceGraph, Target};
use crate::stack::StackId;
use crate::validate::{check_iam_role_name, check_security_groups, check_user_data};

// Fixed logical names of the control-plane document. Subnet names may not map onto
// any of them; see `clustack_core::naming::RESERVED_LOGICAL_NAMES`.

pub const VPC: &str = "VPC";
pub const INTERNET_GATEWAY: &str = "InternetGateway";
pub const VPC_GATEWAY_ATTACHMENT: &str = "VPCGatewayAttachment";
/// Baseline group of every worker; node pools import it from the control plane
pub const SECURITY_GROUP_WORKER: &str = "SecurityGroupWorker";
pub const SECURITY_GROUP_CONTROLLER: &str = "SecurityGroupController";
pub const SECURITY_GROUP_ETCD: &str = "SecurityGroupEtcd";
/// Private zone holding the etcd record sets when `etcd.internalDomainName` is managed
pub const HOSTED_ZONE: &str = "EtcdInternalHostedZone";
pub const CONTROLLERS: &str = "Controllers";
pub const CONTROLLERS_LAUNCH_CONFIGURATION: &str = "ControllersLC";
pub const IAM_ROLE_CONTROLLER: &str = "IAMRoleController";
pub const IAM_INSTANCE_PROFILE_CONTROLLER: &str = "IAMInstanceProfileController";
pub const IAM_ROLE_ETCD: &str = "IAMRoleEtcd";
pub const IAM_INSTANCE_PROFILE_ETCD: &str = "IAMInstanceProfileEtcd";

const STACK: StackId = StackId::ControlPlane;

/// Assemble the control-plane document. Outputs are declared later by [`declare_outputs`],
/// once every node pool has registered its imports.
pub(crate) fn build(ctx: &Context<'_>, graph: &mut ReferenceGraph) -> Result<Template> {
    let mut template = Template::new(format!(
        "clustack cluster {} control plane",
        ctx.spec.cluster_name
    ));
    template.add_parameter(
        "ImageId",
        Parameter::of_type("AWS::EC2::Image::Id", "AMI of every instance in the control plane"),
    );

    let builder = ControlPlane { ctx, graph };
    builder.build(&mut template)?;
    Ok(template)
}

/// Declare every export registered on the control plane, then its stack name
pub(crate) fn declare_outputs(template: &mut Template, graph: &ReferenceGraph) -> Result<()> {
    for export in graph.exports(&STACK) {
        template.add_output(
            export.output.clone(),
            Output::new(export.value.to_json()).exported_as(&export.output),
        )?;
    }
    template.add_output(
        "StackName",
        Output::new(json!({ "Ref": "AWS::StackName" })).describe("Name of this stack"),
    )
}

struct ControlPlane<'a, 'b> {
    ctx: &'a Context<'b>,
    graph: &'a mut ReferenceGraph,
}

impl ControlPlane<'_, '_> {
    fn build(mut self, template: &mut Template) -> Result<()> {
        self.network(template)?;
        self.security_groups(template)?;
        self.iam(template)?;
        self.etcd(template)?;
        self.api_endpoints(template)?;
        self.controllers(template)?;
        self.publish_standard_exports()
    }

    fn resolve(&mut self, target: &Target) -> Result<Reference> {
        self.graph.resolve(target, &STACK)
    }

    fn local(&mut self, logical_name: &str) -> Result<Value> {
        Ok(self.resolve(&Target::resource(STACK, logical_name))?.to_json())
    }

    fn vpc_target(&self) -> Target {
        Target::from_identity(&self.ctx.topology.vpc.identity, STACK, VPC)
    }

    fn subnet_target(subnet: &Subnet) -> Target {
        Target::from_identity(&subnet.identity, STACK, subnet.logical_name.clone())
    }

    fn subnet_refs(&mut self, names: &[String]) -> Result<Vec<Reference>> {
        let targets: Vec<Target> = names
            .iter()
            .filter_map(|name| self.ctx.topology.subnet(name))
            .map(Self::subnet_target)
            .collect();
        self.graph.resolve_all(&targets, &STACK)
    }

    fn managed_attachment(&self) -> bool {
        self.ctx
            .topology
            .internet_gateway
            .as_ref()
            .is_some_and(|igw| igw.identity.is_managed())
    }

    fn network(&mut self, template: &mut Template) -> Result<()> {
        let topology = self.ctx.topology;

        if topology.vpc.identity.is_managed() {
            template.add_resource(
                VPC,
                Resource::new("AWS::EC2::VPC")
                    .property("CidrBlock", topology.vpc.cidr.clone())
                    .property("EnableDnsSupport", true)
                    .property("EnableDnsHostnames", true)
                    .property("InstanceTenancy", "default")
                    .property("Tags", self.ctx.tags("vpc")),
            )?;
        }
        let vpc_target = self.vpc_target();
        let vpc = self.resolve(&vpc_target)?.to_json();

        if self.managed_attachment() {
            template.add_resource(
                INTERNET_GATEWAY,
                Resource::new("AWS::EC2::InternetGateway").property("Tags", self.ctx.tags("igw")),
            )?;
            let gateway = self.local(INTERNET_GATEWAY)?;
            template.add_resource(
                VPC_GATEWAY_ATTACHMENT,
                Resource::new("AWS::EC2::VPCGatewayAttachment")
                    .property("InternetGatewayId", gateway)
                    .property("VpcId", vpc.clone()),
            )?;
        }

        for subnet in &topology.subnets {
            if subnet.manage_subnet() {
                template.add_resource(
                    subnet.logical_name.clone(),
                    Resource::new("AWS::EC2::Subnet")
                        .maybe_property("AvailabilityZone", subnet.availability_zone.clone())
                        .maybe_property("CidrBlock", subnet.cidr.clone())
                        .property("MapPublicIpOnLaunch", !subnet.is_private())
                        .property("VpcId", vpc.clone())
                        .property("Tags", self.ctx.tags(&subnet.name)),
                )?;
            }
        }

        for subnet in &topology.subnets {
            self.routing(template, subnet, &vpc)?;
        }
        Ok(())
    }

    fn routing(&mut self, template: &mut Template, subnet: &Subnet, vpc: &Value) -> Result<()> {
        if !subnet.manage_subnet() {
            return Ok(());
        }
        let subnet_ref = self.resolve(&Self::subnet_target(subnet))?.to_json();

        let route_table = if let Some(id) = subnet.preconfigured_route_table_id() {
            Value::String(id.to_string())
        } else if subnet.manage_route_table() {
            let name = subnet.route_table_logical_name();
            template.add_resource(
                name.clone(),
                Resource::new("AWS::EC2::RouteTable")
                    .property("VpcId", vpc.clone())
                    .property("Tags", self.ctx.tags(&format!("{}-rtb", subnet.name))),
            )?;
            self.local(&name)?
        } else {
            return Ok(());
        };

        template.add_resource(
            subnet.route_table_association_logical_name(),
            Resource::new("AWS::EC2::SubnetRouteTableAssociation")
                .property("RouteTableId", route_table.clone())
                .property("SubnetId", subnet_ref),
        )?;

        let topology = self.ctx.topology;
        if subnet.manage_route_to_internet() {
            let gateway = match &topology.internet_gateway {
                Some(igw) => self
                    .resolve(&Target::from_identity(&igw.identity, STACK, INTERNET_GATEWAY))?
                    .to_json(),
                None => Value::Null,
            };
            let mut route = Resource::new("AWS::EC2::Route")
                .property("DestinationCidrBlock", "0.0.0.0/0")
                .property("GatewayId", gateway)
                .property("RouteTableId", route_table.clone());
            if self.managed_attachment() {
                route = route.depends_on(VPC_GATEWAY_ATTACHMENT);
            }
            template.add_resource(subnet.internet_route_logical_name(), route)?;
        }

        if let Some(nat) = &subnet.nat_gateway {
            let nat_gateway = match nat {
                NatGateway::Managed { eip, host_subnet } => {
                    self.nat_gateway(template, subnet, eip, host_subnet)?
                }
                NatGateway::ExistingById { id } => Value::String(id.clone()),
            };
            if subnet.manage_route_to_nat_gateway() {
                template.add_resource(
                    subnet.nat_route_logical_name(),
                    Resource::new("AWS::EC2::Route")
                        .property("DestinationCidrBlock", "0.0.0.0/0")
                        .property("NatGatewayId", nat_gateway)
                        .property("RouteTableId", route_table),
                )?;
            }
        }
        Ok(())
    }

    fn nat_gateway(
        &mut self,
        template: &mut Template,
        subnet: &Subnet,
        eip: &EipIdentity,
        host_subnet: &str,
    ) -> Result<Value> {
        let allocation = match eip {
            EipIdentity::Managed => {
                let name = subnet.nat_gateway_eip_logical_name();
                let mut resource = Resource::new("AWS::EC2::EIP").property("Domain", "vpc");
                if self.managed_attachment() {
                    resource = resource.depends_on(VPC_GATEWAY_ATTACHMENT);
                }
                template.add_resource(name.clone(), resource)?;
                self.resolve(&Target::attribute(STACK, name, Attribute::AllocationId))?
                    .to_json()
            }
            EipIdentity::ExistingByAllocationId(id) => Value::String(id.clone()),
        };

        let host = self.ctx.topology.subnet(host_subnet).map(Self::subnet_target);
        let host = match host {
            Some(target) => self.resolve(&target)?.to_json(),
            None => Value::String(host_subnet.to_string()),
        };

        let name = subnet.nat_gateway_logical_name();
        template.add_resource(
            name.clone(),
            Resource::new("AWS::EC2::NatGateway")
                .property("AllocationId", allocation)
                .property("SubnetId", host)
                .property("Tags", self.ctx.tags(&format!("{}-nat", subnet.name))),
        )?;
        self.local(&name)
    }

    fn security_groups(&mut self, template: &mut Template) -> Result<()> {
        let vpc_target = self.vpc_target();
        let vpc = self.resolve(&vpc_target)?.to_json();
        let egress = json!([{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1" }]);
        let ssh = json!({ "CidrIp": "0.0.0.0/0", "IpProtocol": "tcp", "FromPort": 22, "ToPort": 22 });
        let api = json!({ "CidrIp": "0.0.0.0/0", "IpProtocol": "tcp", "FromPort": 443, "ToPort": 443 });

        for (name, description, ingress) in [
            (SECURITY_GROUP_WORKER, "worker", json!([ssh])),
            (SECURITY_GROUP_CONTROLLER, "controller", json!([ssh, api])),
            (SECURITY_GROUP_ETCD, "etcd", json!([ssh])),
        ] {
            template.add_resource(
                name,
                Resource::new("AWS::EC2::SecurityGroup")
                    .property(
                        "GroupDescription",
                        format!("Security group for {} nodes of {}", description, self.ctx.spec.cluster_name),
                    )
                    .property("SecurityGroupEgress", egress.clone())
                    .property("SecurityGroupIngress", ingress)
                    .property("VpcId", vpc.clone())
                    .property("Tags", self.ctx.tags(description)),
            )?;
        }

        for (name, group, source, from, to) in [
            ("SecurityGroupWorkerIngressFromController", SECURITY_GROUP_WORKER, SECURITY_GROUP_CONTROLLER, 0, 65535),
            ("SecurityGroupWorkerIngressFromWorker", SECURITY_GROUP_WORKER, SECURITY_GROUP_WORKER, 0, 65535),
            ("SecurityGroupControllerIngressFromWorker", SECURITY_GROUP_CONTROLLER, SECURITY_GROUP_WORKER, 443, 443),
            ("SecurityGroupEtcdIngressFromController", SECURITY_GROUP_ETCD, SECURITY_GROUP_CONTROLLER, 2379, 2379),
            ("SecurityGroupEtcdIngressFromWorker", SECURITY_GROUP_ETCD, SECURITY_GROUP_WORKER, 2379, 2379),
            ("SecurityGroupEtcdPeerIngress", SECURITY_GROUP_ETCD, SECURITY_GROUP_ETCD, 2380, 2380),
        ] {
            let group = self.local(group)?;
            let source = self.local(source)?;
            template.add_resource(
                name,
                Resource::new("AWS::EC2::SecurityGroupIngress")
                    .property("GroupId", group)
                    .property("SourceSecurityGroupId", source)
                    .property("IpProtocol", "tcp")
                    .property("FromPort", from)
                    .property("ToPort", to),
            )?;
        }
        Ok(())
    }

    fn iam(&mut self, template: &mut Template) -> Result<()> {
        let spec = self.ctx.spec;
        let controller_policy = json!([{
            "PolicyName": "root",
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [
                    { "Effect": "Allow", "Action": "ec2:*", "Resource": "*" },
                    { "Effect": "Allow", "Action": "elasticloadbalancing:*", "Resource": "*" },
                    { "Effect": "Allow", "Action": ["autoscaling:Describe*", "autoscaling:SetDesiredCapacity"], "Resource": "*" },
                    { "Effect": "Allow", "Action": ["ecr:GetAuthorizationToken", "ecr:BatchCheckLayerAvailability", "ecr:GetDownloadUrlForLayer", "ecr:BatchGetImage"], "Resource": "*" }
                ]
            }
        }]);
        let etcd_policy = json!([{
            "PolicyName": "root",
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [
                    { "Effect": "Allow", "Action": ["ec2:DescribeVolumes", "ec2:AttachVolume", "ec2:DescribeTags"], "Resource": "*" },
                    { "Effect": "Allow", "Action": ["ec2:AssociateAddress", "ec2:AttachNetworkInterface", "ec2:DescribeNetworkInterfaces"], "Resource": "*" },
                    { "Effect": "Allow", "Action": ["cloudformation:SignalResource"], "Resource": "*" }
                ]
            }
        }]);

        let mut managed = Vec::with_capacity(2);
        let mut controller_role = Resource::new("AWS::IAM::Role")
            .property("AssumeRolePolicyDocument", ec2_assume_role_policy())
            .property("Path", "/")
            .property("Policies", controller_policy);
        if let Some(role) = spec
            .controller
            .managed_iam_role_name
            .as_ref()
            .filter(|_| spec.controller.instance_profile_arn.is_none())
        {
            check_iam_role_name(
                "controller.managedIamRoleName",
                &spec.cluster_name,
                &STACK.logical_name(),
                &spec.region,
                role,
            )?;
            controller_role = controller_role.property("RoleName", managed_role_name(role));
        }

        if spec.controller.instance_profile_arn.is_none() {
            managed.push((IAM_ROLE_CONTROLLER, IAM_INSTANCE_PROFILE_CONTROLLER, controller_role));
        }
        if spec.etcd.instance_profile_arn.is_none() {
            managed.push((
                IAM_ROLE_ETCD,
                IAM_INSTANCE_PROFILE_ETCD,
                Resource::new("AWS::IAM::Role")
                    .property("AssumeRolePolicyDocument", ec2_assume_role_policy())
                    .property("Path", "/")
                    .property("Policies", etcd_policy),
            ));
        }

        for (role_name, profile_name, role) in managed {
            template.add_resource(role_name, role)?;
            let role = self.local(role_name)?;
            template.add_resource(
                profile_name,
                Resource::new("AWS::IAM::InstanceProfile")
                    .property("Path", "/")
                    .property("Roles", json!([role])),
            )?;
        }
        Ok(())
    }

    /// An existing instance profile ARN, or a reference to the managed profile
    fn instance_profile(&mut self, existing: Option<&String>, managed: &str) -> Result<Value> {
        match existing {
            Some(arn) => Ok(json!(arn)),
            None => self.local(managed),
        }
    }

    fn etcd(&mut self, template: &mut Template) -> Result<()> {
        let topology = self.ctx.topology;
        let spec = self.ctx.spec;

        let hosted_zone = match &topology.etcd.hosted_zone {
            Some(zone) => {
                if topology.etcd.manage_hosted_zone() {
                    let vpc_target = self.vpc_target();
                    let vpc = self.resolve(&vpc_target)?.to_json();
                    template.add_resource(
                        HOSTED_ZONE,
                        Resource::new("AWS::Route53::HostedZone")
                            .property("Name", zone.name.clone())
                            .property(
                                "VPCs",
                                json!([{ "VPCId": vpc, "VPCRegion": { "Ref": "AWS::Region" } }]),
                            ),
                    )?;
                }
                Some(
                    self.resolve(&Target::from_identity(&zone.identity, STACK, HOSTED_ZONE))?
                        .to_json(),
                )
            }
            None => None,
        };

        let security_group = self.local(SECURITY_GROUP_ETCD)?;
        let profile =
            self.instance_profile(spec.etcd.instance_profile_arn.as_ref(), IAM_INSTANCE_PROFILE_ETCD)?;
        let mut previous: Option<String> = None;

        for node in &topology.etcd.nodes {
            let mut depends_on = Vec::new();
            if let Some(previous) = &previous {
                depends_on.push(previous.clone());
            }
            let mut extra_tags = vec![("clustack:etcd:index", json!(node.index.to_string()))];

            match &node.identity {
                MemberIdentity::Eip { eip } => {
                    let allocation = match eip {
                        EipIdentity::Managed => {
                            let name = node.eip_logical_name();
                            template.add_resource(
                                name.clone(),
                                Resource::new("AWS::EC2::EIP").property("Domain", "vpc"),
                            )?;
                            depends_on.push(name.clone());
                            self.resolve(&Target::attribute(STACK, name, Attribute::AllocationId))?
                                .to_json()
                        }
                        EipIdentity::ExistingByAllocationId(id) => json!(id),
                    };
                    extra_tags.push(("clustack:etcd:eip-allocation-id", allocation));
                }
                MemberIdentity::Eni {
                    interface,
                    record_set,
                } => {
                    let eni = self.network_interface(template, node, interface, &security_group)?;
                    if node.manage_network_interface() {
                        depends_on.push(node.network_interface_logical_name());
                    }
                    if *record_set {
                        let name = node.record_set_logical_name();
                        let address = self
                            .resolve(&Target::attribute(
                                STACK,
                                node.network_interface_logical_name(),
                                Attribute::PrimaryPrivateIpAddress,
                            ))?
                            .to_json();
                        template.add_resource(
                            name.clone(),
                            Resource::new("AWS::Route53::RecordSet")
                                .maybe_property("HostedZoneId", hosted_zone.clone())
                                .maybe_property("Name", node.fqdn.clone())
                                .property("Type", "A")
                                .property("TTL", "300")
                                .property("ResourceRecords", json!([address])),
                        )?;
                        depends_on.push(name);
                    }
                    extra_tags.push(("clustack:etcd:network-interface-id", eni));
                }
                MemberIdentity::Fqdn => {}
            }
            if let Some(fqdn) = &node.fqdn {
                extra_tags.push(("clustack:etcd:advertised-hostname", json!(fqdn)));
            }

            let volume = node.data_volume_logical_name();
            template.add_resource(
                volume.clone(),
                Resource::new("AWS::EC2::Volume")
                    .property("AvailabilityZone", node.availability_zone.clone())
                    .property("Size", spec.etcd.data_volume.volume.size.to_string())
                    .property("VolumeType", spec.etcd.data_volume.volume.kind.clone())
                    .maybe_property(
                        "Iops",
                        (spec.etcd.data_volume.volume.iops > 0)
                            .then(|| spec.etcd.data_volume.volume.iops.to_string()),
                    )
                    .property("Encrypted", spec.etcd.data_volume.encrypted)
                    .property(
                        "Tags",
                        json!([
                            { "Key": "Name", "Value": format!("{}-{}", spec.cluster_name, node.name) },
                            { "Key": self.ctx.cluster_tag_key(), "Value": "owned" },
                            { "Key": "clustack:etcd:index", "Value": node.index.to_string() }
                        ]),
                    ),
            )?;
            depends_on.push(volume);

            let mut request = self.ctx.payload_request(InstanceRole::Etcd, &STACK);
            request.etcd_index = Some(node.index);
            request.etcd_node_name = Some(node.name.clone());
            let payload = self.ctx.payloads.render(&request)?;
            check_user_data(&format!("etcd.nodes[{}]", node.index), &payload)?;

            let launch_configuration = node.launch_configuration_logical_name();
            template.add_resource(
                launch_configuration.clone(),
                Resource::new("AWS::AutoScaling::LaunchConfiguration")
                    .property("ImageId", json!({ "Ref": "ImageId" }))
                    .property("InstanceType", spec.etcd.instance_type.clone())
                    .maybe_property("KeyName", spec.key_name.clone())
                    .property("IamInstanceProfile", profile.clone())
                    .property("SecurityGroups", json!([security_group.clone()]))
                    .property("BlockDeviceMappings", root_block_devices(&spec.etcd.root_volume))
                    .property("PlacementTenancy", spec.etcd.tenancy.as_str())
                    .property("UserData", user_data(&payload)),
            )?;

            let subnet = self.subnet_refs(std::slice::from_ref(&node.subnet))?;
            let launch_configuration = self.local(&launch_configuration)?;
            let wait = &spec.controller.wait_signal;
            let mut group = Resource::new("AWS::AutoScaling::AutoScalingGroup")
                .property("VPCZoneIdentifier", references(&subnet))
                .property("LaunchConfigurationName", launch_configuration)
                .property("MinSize", "1")
                .property("MaxSize", "1")
                .property("Tags", self.ctx.asg_tags(&node.name, &extra_tags))
                .update_policy(rolling_update(0, wait, &spec.controller.create_timeout));
            if let Some(policy) = creation_policy(1, wait, &spec.controller.create_timeout) {
                group = group.creation_policy(policy);
            }
            for dependency in depends_on {
                group = group.depends_on(dependency);
            }
            template.add_resource(node.logical_name.clone(), group)?;
            previous = Some(node.logical_name.clone());
        }
        Ok(())
    }

    fn network_interface(
        &mut self,
        template: &mut Template,
        node: &EtcdNode,
        interface: &Identity,
        security_group: &Value,
    ) -> Result<Value> {
        let name = node.network_interface_logical_name();
        if interface.is_managed() {
            let subnet = self.subnet_refs(std::slice::from_ref(&node.subnet))?;
            let subnet = subnet.first().map(Reference::to_json).unwrap_or(Value::Null);
            template.add_resource(
                name.clone(),
                Resource::new("AWS::EC2::NetworkInterface")
                    .property("SubnetId", subnet)
                    .property("GroupSet", json!([security_group]))
                    .property("Tags", self.ctx.tags(&format!("{}-eni", node.name))),
            )?;
        }
        Ok(self
            .resolve(&Target::from_identity(interface, STACK, name))?
            .to_json())
    }

    fn controllers(&mut self, template: &mut Template) -> Result<()> {
        let spec = self.ctx.spec;
        let topology = self.ctx.topology;
        let controller = &spec.controller;

        check_security_groups("controller", &controller.security_group_ids)?;
        let mut security_groups: Vec<Value> = controller
            .security_group_ids
            .iter()
            .map(|id| Value::String(id.clone()))
            .collect();
        security_groups.push(self.local(SECURITY_GROUP_CONTROLLER)?);

        let payload = self
            .ctx
            .payloads
            .render(&self.ctx.payload_request(InstanceRole::Controller, &STACK))?;
        check_user_data("controller", &payload)?;

        let profile = self.instance_profile(
            controller.instance_profile_arn.as_ref(),
            IAM_INSTANCE_PROFILE_CONTROLLER,
        )?;
        template.add_resource(
            CONTROLLERS_LAUNCH_CONFIGURATION,
            Resource::new("AWS::AutoScaling::LaunchConfiguration")
                .property("ImageId", json!({ "Ref": "ImageId" }))
                .property("InstanceType", controller.instance_type.clone())
                .maybe_property("KeyName", spec.key_name.clone())
                .property("IamInstanceProfile", profile)
                .property("SecurityGroups", Value::Array(security_groups))
                .property("BlockDeviceMappings", root_block_devices(&controller.root_volume))
                .property("PlacementTenancy", controller.tenancy.as_str())
                .property("UserData", user_data(&payload)),
        )?;

        let subnets = self.subnet_refs(&topology.controller_subnets)?;
        let launch_configuration = self.local(CONTROLLERS_LAUNCH_CONFIGURATION)?;
        let scaling = &controller.auto_scaling;
        let mut group = Resource::new("AWS::AutoScaling::AutoScalingGroup")
            .property("VPCZoneIdentifier", references(&subnets))
            .property("LaunchConfigurationName", launch_configuration)
            .property("MinSize", scaling.min_size.to_string())
            .property("MaxSize", scaling.max_size.to_string())
            .property("Tags", self.ctx.asg_tags("controller", &[]))
            .update_policy(rolling_update(
                scaling.min_instances_in_service,
                &controller.wait_signal,
                &controller.create_timeout,
            ));
        if let Some(policy) =
            creation_policy(scaling.min_size, &controller.wait_signal, &controller.create_timeout)
        {
            group = group.creation_policy(policy);
        }
        let (load_balancers, target_groups) = self.api_endpoint_attachments()?;
        if !load_balancers.is_empty() {
            group = group.property("LoadBalancerNames", Value::Array(load_balancers));
        }
        if !target_groups.is_empty() {
            group = group.property("TargetGroupARNs", Value::Array(target_groups));
        }
        // Controllers start only once the whole etcd cluster has bootstrapped
        if let Some(last) = topology.etcd.last_node() {
            group = group.depends_on(last.logical_name.clone());
        }
        template.add_resource(CONTROLLERS, group)?;
        Ok(())
    }

    fn api_endpoints(&mut self, template: &mut Template) -> Result<()> {
        let topology = self.ctx.topology;
        for endpoint in &topology.api_endpoints {
            let Some(lb) = endpoint.managed_load_balancer() else {
                continue;
            };
            match lb.kind {
                LoadBalancerKind::Classic => self.classic_load_balancer(template, endpoint, lb)?,
                LoadBalancerKind::Network => self.network_load_balancer(template, endpoint, lb)?,
            }

            if let Some(record_set) = &lb.record_set {
                let dns_name = self
                    .resolve(&Target::attribute(
                        STACK,
                        endpoint.load_balancer_logical_name(),
                        Attribute::DNSName,
                    ))?
                    .to_json();
                template.add_resource(
                    endpoint.record_set_logical_name(),
                    Resource::new("AWS::Route53::RecordSet")
                        .property("HostedZoneId", record_set.hosted_zone_id.clone())
                        .property("Name", endpoint.dns_name.clone())
                        .property("Type", "CNAME")
                        .property("TTL", record_set.ttl.to_string())
                        .property("ResourceRecords", json!([dns_name])),
                )?;
            }
            tracing::debug!(
                endpoint = %endpoint.name,
                kind = ?lb.kind,
                scheme = lb.scheme(),
                "declared API load balancer"
            );
        }
        Ok(())
    }

    fn classic_load_balancer(
        &mut self,
        template: &mut Template,
        endpoint: &ApiEndpoint,
        lb: &ManagedApiLoadBalancer,
    ) -> Result<()> {
        let mut security_groups: Vec<Value> =
            lb.security_group_ids.iter().map(|id| json!(id)).collect();
        if lb.manage_security_group() {
            let vpc_target = self.vpc_target();
            let vpc = self.resolve(&vpc_target)?.to_json();
            let ingress: Vec<Value> = lb
                .allowed_source_cidrs
                .iter()
                .map(|cidr| json!({ "CidrIp": cidr, "IpProtocol": "tcp", "FromPort": 443, "ToPort": 443 }))
                .collect();
            let name = endpoint.security_group_logical_name();
            template.add_resource(
                name.clone(),
                Resource::new("AWS::EC2::SecurityGroup")
                    .property(
                        "GroupDescription",
                        format!("Access to API endpoint {} of {}", endpoint.name, self.ctx.spec.cluster_name),
                    )
                    .property("SecurityGroupEgress", json!([{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1" }]))
                    .property("SecurityGroupIngress", Value::Array(ingress))
                    .property("VpcId", vpc)
                    .property("Tags", self.ctx.tags(&format!("{}-api-lb", endpoint.name))),
            )?;
            security_groups.push(self.local(&name)?);
        }

        let subnets = self.subnet_refs(&lb.subnets)?;
        template.add_resource(
            endpoint.load_balancer_logical_name(),
            Resource::new("AWS::ElasticLoadBalancing::LoadBalancer")
                .property("CrossZone", true)
                .property(
                    "HealthCheck",
                    json!({
                        "HealthyThreshold": "3",
                        "Interval": "10",
                        "Target": "SSL:443",
                        "Timeout": "8",
                        "UnhealthyThreshold": "3"
                    }),
                )
                .property("ConnectionSettings", json!({ "IdleTimeout": 3600 }))
                .property(
                    "Listeners",
                    json!([{
                        "InstancePort": "443",
                        "InstanceProtocol": "TCP",
                        "LoadBalancerPort": "443",
                        "Protocol": "TCP"
                    }]),
                )
                .property("Scheme", lb.scheme())
                .property("Subnets", references(&subnets))
                .property("SecurityGroups", Value::Array(security_groups))
                .property("Tags", self.ctx.tags(&format!("{}-api", endpoint.name))),
        )?;
        Ok(())
    }

    fn network_load_balancer(
        &mut self,
        template: &mut Template,
        endpoint: &ApiEndpoint,
        lb: &ManagedApiLoadBalancer,
    ) -> Result<()> {
        let subnets = self.subnet_refs(&lb.subnets)?;
        let name = endpoint.load_balancer_logical_name();
        template.add_resource(
            name.clone(),
            Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer")
                .property("Type", "network")
                .property("Scheme", lb.scheme())
                .property("Subnets", references(&subnets))
                .property("Tags", self.ctx.tags(&format!("{}-api", endpoint.name))),
        )?;

        let vpc_target = self.vpc_target();
        let vpc = self.resolve(&vpc_target)?.to_json();
        let target_group = endpoint.target_group_logical_name();
        template.add_resource(
            target_group.clone(),
            Resource::new("AWS::ElasticLoadBalancingV2::TargetGroup")
                .property("Port", 443)
                .property("Protocol", "TCP")
                .property("VpcId", vpc)
                .property("HealthCheckProtocol", "TCP")
                .property("HealthCheckPort", "443")
                .property("HealthCheckIntervalSeconds", 10)
                .property("HealthyThresholdCount", 3)
                .property("UnhealthyThresholdCount", 3),
        )?;

        let load_balancer = self.local(&name)?;
        let target_group = self.local(&target_group)?;
        template.add_resource(
            endpoint.listener_logical_name(),
            Resource::new("AWS::ElasticLoadBalancingV2::Listener")
                .property(
                    "DefaultActions",
                    json!([{ "Type": "forward", "TargetGroupArn": target_group }]),
                )
                .property("LoadBalancerArn", load_balancer)
                .property("Port", 443)
                .property("Protocol", "TCP"),
        )?;
        Ok(())
    }

    /// Classic load balancer names and target group ARNs the controllers register with
    fn api_endpoint_attachments(&mut self) -> Result<(Vec<Value>, Vec<Value>)> {
        let mut load_balancers = Vec::new();
        let mut target_groups = Vec::new();
        let topology = self.ctx.topology;
        for endpoint in &topology.api_endpoints {
            match &endpoint.load_balancer {
                ApiLoadBalancer::Existing { name } => load_balancers.push(json!(name)),
                ApiLoadBalancer::Managed(lb) => match lb.kind {
                    LoadBalancerKind::Classic => {
                        load_balancers.push(self.local(&endpoint.load_balancer_logical_name())?)
                    }
                    LoadBalancerKind::Network => {
                        target_groups.push(self.local(&endpoint.target_group_logical_name())?)
                    }
                },
            }
        }
        Ok((load_balancers, target_groups))
    }

    /// Exports every cluster publishes whether or not a node pool imports them
    fn publish_standard_exports(&mut self) -> Result<()> {
        let vpc_target = self.vpc_target();
        self.graph.publish(&vpc_target)?;
        let topology = self.ctx.topology;
        for subnet in &topology.subnets {
            self.graph.publish(&Self::subnet_target(subnet))?;
        }
        for group in [SECURITY_GROUP_WORKER, SECURITY_GROUP_CONTROLLER, SECURITY_GROUP_ETCD] {
            self.graph.publish(&Target::resource(STACK, group))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::compile;
    use crate::payload::TemplatePayloads;
    use clustack_core::load_cluster;

    fn control_plane(yaml: &str) -> Template {
        let spec = load_cluster(yaml.as_bytes()).unwrap();
        let stacks = compile(&spec, &TemplatePayloads::builtin()).unwrap();
        stacks.control_plane().unwrap().clone()
    }

    #[test]
    fn test_single_public_subnet_network() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
subnets:
- availabilityZone: us-west-1c
  instanceCIDR: 10.0.0.0/24
"#,
        );
        for name in [
            "VPC",
            "InternetGateway",
            "VPCGatewayAttachment",
            "Subnet0",
            "Subnet0RouteTable",
            "Subnet0RouteTableAssociation",
            "Subnet0RouteToInternet",
            "Etcd0",
            "Etcd0EIP",
            "Etcd0EBS",
            "Controllers",
        ] {
            assert!(template.resource(name).is_some(), "missing {}", name);
        }
        let route = template.resource("Subnet0RouteToInternet").unwrap();
        assert_eq!(route.properties["GatewayId"], json!({"Ref": "InternetGateway"}));
        assert_eq!(route.depends_on, vec!["VPCGatewayAttachment"]);
        assert!(template.outputs.contains_key("StackName"));
        assert!(template.outputs["StackName"].export.is_none());
    }

    #[test]
    fn test_preconfigured_route_table_creates_no_routes() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
vpcId: vpc-1
routeTableId: rtb-1
mapPublicIPs: false
subnets:
- availabilityZone: us-west-1a
  instanceCIDR: 10.0.1.0/24
- availabilityZone: us-west-1b
  instanceCIDR: 10.0.2.0/24
"#,
        );
        assert!(template.resource("VPC").is_none());
        assert!(template.resource("InternetGateway").is_none());
        let kinds: Vec<&str> = template.resources.values().map(|r| r.kind.as_str()).collect();
        assert!(!kinds.contains(&"AWS::EC2::RouteTable"));
        assert!(!kinds.contains(&"AWS::EC2::NatGateway"));
        assert!(!kinds.contains(&"AWS::EC2::Route"));

        let association = template.resource("Subnet0RouteTableAssociation").unwrap();
        assert_eq!(association.properties["RouteTableId"], "rtb-1");
        let subnet = template.resource("Subnet0").unwrap();
        assert_eq!(subnet.properties["VpcId"], "vpc-1");
        assert_eq!(subnet.properties["MapPublicIpOnLaunch"], false);
    }

    #[test]
    fn test_existing_nat_gateways_are_routed_by_id() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
subnets:
- name: private1
  private: true
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.1.0/24
  natGateway:
    id: ngw-11111111
- name: private2
  private: true
  availabilityZone: us-west-1b
  instanceCIDR: 10.0.2.0/24
  natGateway:
    id: ngw-22222222
- name: public1
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.3.0/24
- name: public2
  availabilityZone: us-west-1b
  instanceCIDR: 10.0.4.0/24
"#,
        );
        let kinds: Vec<&str> = template.resources.values().map(|r| r.kind.as_str()).collect();
        assert!(!kinds.contains(&"AWS::EC2::NatGateway"));
        assert_eq!(
            template.resource("Private1RouteToNatGateway").unwrap().properties["NatGatewayId"],
            "ngw-11111111"
        );
        assert!(template.resource("Public1RouteToInternet").is_some());
        assert!(template.resource("Public2RouteToInternet").is_some());
    }

    #[test]
    fn test_managed_nat_gateway_in_public_subnet() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
subnets:
- name: private1
  private: true
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.1.0/24
- name: public1
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.2.0/24
"#,
        );
        let nat = template.resource("Private1NatGateway").unwrap();
        assert_eq!(nat.properties["SubnetId"], json!({"Ref": "Public1"}));
        assert_eq!(
            nat.properties["AllocationId"],
            json!({"Fn::GetAtt": ["Private1NatGatewayEIP", "AllocationId"]})
        );
        assert_eq!(
            template.resource("Private1RouteToNatGateway").unwrap().properties["NatGatewayId"],
            json!({"Ref": "Private1NatGateway"})
        );
    }

    #[test]
    fn test_etcd_nodes_bootstrap_in_sequence() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
availabilityZone: us-west-1a
etcd:
  count: 3
"#,
        );
        assert_eq!(
            template.resource("Etcd0").unwrap().depends_on,
            vec!["Etcd0EIP", "Etcd0EBS"]
        );
        assert_eq!(
            template.resource("Etcd1").unwrap().depends_on,
            vec!["Etcd0", "Etcd1EIP", "Etcd1EBS"]
        );
        assert_eq!(
            template.resource("Etcd2").unwrap().depends_on[0],
            "Etcd1"
        );
        assert_eq!(
            template.resource("Controllers").unwrap().depends_on,
            vec!["Etcd2"]
        );
    }

    #[test]
    fn test_etcd_eni_members_with_record_sets() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
availabilityZone: us-west-1a
etcd:
  memberIdentityProvider: eni
  manageRecordSets: true
  nodes:
  - name: etcd-a
  - name: etcd-b
  - name: etcd-c
"#,
        );
        let kinds: Vec<&str> = template.resources.values().map(|r| r.kind.as_str()).collect();
        assert!(!kinds.contains(&"AWS::EC2::EIP"));
        assert_eq!(
            kinds.iter().filter(|k| **k == "AWS::EC2::NetworkInterface").count(),
            3
        );
        assert!(template.resource(HOSTED_ZONE).is_some());

        let record = template.resource("Etcd1InternalRecordSet").unwrap();
        assert_eq!(record.properties["Name"], "etcd-b.test-cluster.internal");
        assert_eq!(record.properties["HostedZoneId"], json!({"Ref": HOSTED_ZONE}));
        assert_eq!(
            record.properties["ResourceRecords"],
            json!([{"Fn::GetAtt": ["Etcd1ENI", "PrimaryPrivateIpAddress"]}])
        );
        assert_eq!(
            template.resource("Etcd1").unwrap().depends_on,
            vec!["Etcd0", "Etcd1ENI", "Etcd1InternalRecordSet", "Etcd1EBS"]
        );
    }

    #[test]
    fn test_managed_controller_role_name() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
availabilityZone: us-west-1a
controller:
  managedIamRoleName: myrole
"#,
        );
        assert_eq!(
            template.resource("IAMRoleController").unwrap().properties["RoleName"],
            json!({"Fn::Join": ["-", [{"Ref": "AWS::StackName"}, {"Ref": "AWS::Region"}, "myrole"]]})
        );
    }

    const TWO_ZONES: &str = r#"
clusterName: test-cluster
region: us-west-1
subnets:
- name: public1
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.1.0/24
- name: public2
  availabilityZone: us-west-1b
  instanceCIDR: 10.0.2.0/24
- name: private1
  private: true
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.3.0/24
"#;

    #[test]
    fn test_classic_api_load_balancer() {
        let template = control_plane(&format!(
            r#"{}apiEndpoints:
- name: public
  dnsName: api.example.com
  loadBalancer:
    hostedZone:
      id: Z123
    recordSetTTL: 60
    securityGroupIds: [sg-api]
    apiAccessAllowedSourceCIDRs: [203.0.113.0/24, 198.51.100.0/24]
"#,
            TWO_ZONES
        ));

        let lb = template.resource("APIEndpointPublicLB").unwrap();
        assert_eq!(lb.kind, "AWS::ElasticLoadBalancing::LoadBalancer");
        assert_eq!(lb.properties["Scheme"], "internet-facing");
        assert_eq!(lb.properties["Subnets"], json!([{"Ref": "Public1"}, {"Ref": "Public2"}]));
        assert_eq!(
            lb.properties["SecurityGroups"],
            json!(["sg-api", {"Ref": "APIEndpointPublicSG"}])
        );
        assert_eq!(lb.properties["Listeners"][0]["LoadBalancerPort"], "443");

        let group = template.resource("APIEndpointPublicSG").unwrap();
        let ingress = group.properties["SecurityGroupIngress"].as_array().unwrap();
        assert_eq!(ingress.len(), 2);
        assert_eq!(ingress[1]["CidrIp"], "198.51.100.0/24");
        assert_eq!(ingress[1]["FromPort"], 443);

        let record = template.resource("APIEndpointPublicRecordSet").unwrap();
        assert_eq!(record.properties["HostedZoneId"], "Z123");
        assert_eq!(record.properties["Name"], "api.example.com");
        assert_eq!(record.properties["Type"], "CNAME");
        assert_eq!(record.properties["TTL"], "60");
        assert_eq!(
            record.properties["ResourceRecords"],
            json!([{"Fn::GetAtt": ["APIEndpointPublicLB", "DNSName"]}])
        );

        let controllers = template.resource(CONTROLLERS).unwrap();
        assert_eq!(
            controllers.properties["LoadBalancerNames"],
            json!([{"Ref": "APIEndpointPublicLB"}])
        );
        assert!(controllers.properties.get("TargetGroupARNs").is_none());
    }

    #[test]
    fn test_network_and_existing_api_load_balancers() {
        let template = control_plane(&format!(
            r#"{}apiEndpoints:
- name: internal
  dnsName: api.internal
  loadBalancer:
    type: network
    private: true
- name: legacy
  dnsName: legacy.example.com
  loadBalancer:
    id: existing-elb
"#,
            TWO_ZONES
        ));

        let lb = template.resource("APIEndpointInternalLB").unwrap();
        assert_eq!(lb.kind, "AWS::ElasticLoadBalancingV2::LoadBalancer");
        assert_eq!(lb.properties["Type"], "network");
        assert_eq!(lb.properties["Scheme"], "internal");
        assert_eq!(lb.properties["Subnets"], json!([{"Ref": "Private1"}]));
        assert!(lb.properties.get("SecurityGroups").is_none());

        let listener = template.resource("APIEndpointInternalListener").unwrap();
        assert_eq!(
            listener.properties["DefaultActions"][0]["TargetGroupArn"],
            json!({"Ref": "APIEndpointInternalTargetGroup"})
        );
        assert_eq!(
            listener.properties["LoadBalancerArn"],
            json!({"Ref": "APIEndpointInternalLB"})
        );
        assert!(template.resource("APIEndpointInternalSG").is_none());
        assert!(template.resource("APIEndpointInternalRecordSet").is_none());
        assert!(template.resource("APIEndpointLegacyLB").is_none());

        let controllers = template.resource(CONTROLLERS).unwrap();
        assert_eq!(controllers.properties["LoadBalancerNames"], json!(["existing-elb"]));
        assert_eq!(
            controllers.properties["TargetGroupARNs"],
            json!([{"Ref": "APIEndpointInternalTargetGroup"}])
        );
    }

    #[test]
    fn test_controller_create_timeout_and_tenancy() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
availabilityZone: us-west-1a
controller:
  createTimeout: PT1H
  tenancy: dedicated
"#,
        );
        let controllers = template.resource(CONTROLLERS).unwrap();
        assert_eq!(
            controllers.creation_policy.as_ref().unwrap()["ResourceSignal"]["Timeout"],
            "PT1H"
        );
        assert_eq!(
            controllers.update_policy.as_ref().unwrap()["AutoScalingRollingUpdate"]["PauseTime"],
            "PT1H"
        );
        assert_eq!(
            template.resource("Etcd0").unwrap().creation_policy.as_ref().unwrap()["ResourceSignal"]["Timeout"],
            "PT1H"
        );
        assert_eq!(
            template.resource(CONTROLLERS_LAUNCH_CONFIGURATION).unwrap().properties["PlacementTenancy"],
            "dedicated"
        );
        assert_eq!(
            template.resource("Etcd0LC").unwrap().properties["PlacementTenancy"],
            "default"
        );
    }

    #[test]
    fn test_existing_instance_profiles_skip_managed_roles() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
availabilityZone: us-west-1a
controller:
  iam:
    instanceProfile:
      arn: arn:aws:iam::123456789012:instance-profile/controller
etcd:
  tenancy: dedicated
"#,
        );
        assert!(template.resource(IAM_ROLE_CONTROLLER).is_none());
        assert!(template.resource(IAM_INSTANCE_PROFILE_CONTROLLER).is_none());
        assert!(template.resource(IAM_ROLE_ETCD).is_some());
        assert_eq!(
            template.resource(CONTROLLERS_LAUNCH_CONFIGURATION).unwrap().properties["IamInstanceProfile"],
            "arn:aws:iam::123456789012:instance-profile/controller"
        );
        let etcd = template.resource("Etcd0LC").unwrap();
        assert_eq!(etcd.properties["IamInstanceProfile"], json!({"Ref": IAM_INSTANCE_PROFILE_ETCD}));
        assert_eq!(etcd.properties["PlacementTenancy"], "dedicated");
    }

    #[test]
    fn test_descriptions_and_tags_name_the_project() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
availabilityZone: us-west-1a
"#,
        );
        assert_eq!(template.description, "clustack cluster test-cluster control plane");
        let keys: Vec<&str> = template.resource("Etcd0").unwrap().properties["Tags"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|tag| tag["Key"].as_str())
            .collect();
        assert!(keys.contains(&"clustack:etcd:index"));
        assert!(keys.contains(&"clustack:etcd:eip-allocation-id"));
    }

    #[test]
    fn test_control_plane_names_are_reserved_for_subnets() {
        let template = control_plane(&format!(
            r#"{}apiEndpoints:
- name: public
  dnsName: api.example.com
  loadBalancer:
    hostedZone:
      id: Z123
etcd:
  memberIdentityProvider: eni
  manageRecordSets: true
  nodes:
  - name: etcd-a
"#,
            TWO_ZONES
        ));
        let subnets = ["Public1", "Public2", "Private1"];
        for name in template.resources.keys().chain(template.outputs.keys()) {
            if subnets.iter().any(|subnet| name.starts_with(subnet)) {
                continue;
            }
            assert!(
                clustack_core::naming::is_reserved_logical_name(name),
                "{} is not reserved",
                name
            );
        }
    }

    #[test]
    fn test_standard_exports() {
        let template = control_plane(
            r#"
clusterName: test-cluster
region: us-west-1
availabilityZone: us-west-1a
"#,
        );
        for name in ["VPC", "Subnet0", "SecurityGroupWorker", "SecurityGroupController", "SecurityGroupEtcd"] {
            let output = &template.outputs[name];
            assert_eq!(
                output.export,
                Some(json!({"Name": {"Fn::Sub": format!("${{AWS::StackName}}-{}", name)}}))
            );
        }
    }
}
