//! Node-pool stacks
//!
//! A node pool owns only its worker resources. Subnets and the baseline worker
//! security group come from the control plane and are imported through the
//! `ControlPlaneStackName` parameter.

use serde_json::{Value, json};

use clustack_core::spec::AutoScaling;
use clustack_core::{NodePoolSpec, Provisioning, SpotFleet, Tenancy};

use crate::assembler::{
    Context, creation_policy, ebs, ec2_assume_role_policy, managed_role_name, references,
    rolling_update, root_block_devices, user_data,
};
use crate::control_plane::SECURITY_GROUP_WORKER;
use crate::document::{Output, Parameter, Resource, Template};
use crate::error::Result;
use crate::payload::InstanceRole;
use crate::reference::{Attribute, Reference, ReferenceGraph, Target};
use crate::stack::StackId;
use crate::validate::{check_iam_role_name, check_security_groups, check_user_data};

/// Worker role; absent when the pool brings its own `iam.instanceProfile.arn`
pub const IAM_ROLE: &str = "IAMRoleWorker";
pub const IAM_MANAGED_POLICY: &str = "IAMManagedPolicyWorker";
pub const IAM_INSTANCE_PROFILE: &str = "IAMInstanceProfileWorker";
pub const LAUNCH_CONFIGURATION: &str = "WorkersLC";
pub const AUTO_SCALING_GROUP: &str = "Workers";
/// Replaces the launch configuration and auto scaling group when `spotFleet` is set
pub const SPOT_FLEET: &str = "SpotFleet";

/// Exported ARN of the pool's worker role
pub const ROLE_ARN_OUTPUT: &str = "WorkerIAMRoleArn";

/// Assemble the stack of `worker.nodePools[index]`.
///
/// Every control-plane resource the pool points at is resolved through `graph`,
/// which records the import so that the control plane later declares the export.
pub(crate) fn build(
    ctx: &Context<'_>,
    graph: &mut ReferenceGraph,
    index: usize,
    pool: &NodePoolSpec,
) -> Result<Template> {
    let stack = StackId::NodePool(pool.name.clone());
    let path = format!("worker.nodePools[{}]", index);

    let user_security_groups = pool.user_security_group_ids();
    check_security_groups(&path, &user_security_groups)?;

    let mut template = Template::new(format!(
        "clustack cluster {} node pool {}",
        ctx.spec.cluster_name, pool.name
    ));
    template.add_parameter(
        StackId::ControlPlane.name_parameter(),
        Parameter::string("Name of the control-plane stack this node pool imports from"),
    );
    template.add_parameter(
        "ImageId",
        Parameter::of_type("AWS::EC2::Image::Id", "AMI of the worker instances"),
    );

    let mut security_groups: Vec<Value> = user_security_groups
        .iter()
        .map(|id| Value::String(id.clone()))
        .collect();
    security_groups.push(
        graph
            .resolve(&Target::resource(StackId::ControlPlane, SECURITY_GROUP_WORKER), &stack)?
            .to_json(),
    );

    let subnets = subnet_refs(ctx, graph, pool, &stack)?;

    let profile = iam(ctx, &mut template, graph, &stack, &path, pool)?;

    let mut request = ctx.payload_request(InstanceRole::Worker, &stack);
    request.node_pool = Some(pool.name.clone());
    let payload = ctx.payloads.render(&request)?;
    check_user_data(&path, &payload)?;

    match &pool.provisioning {
        Provisioning::AutoScaling(scaling) => {
            template.add_resource(
                LAUNCH_CONFIGURATION,
                Resource::new("AWS::AutoScaling::LaunchConfiguration")
                    .property("ImageId", json!({ "Ref": "ImageId" }))
                    .property("InstanceType", pool.instance_type.clone())
                    .maybe_property("KeyName", ctx.spec.key_name.clone())
                    .property("IamInstanceProfile", profile.name)
                    .property("SecurityGroups", Value::Array(security_groups))
                    .property("BlockDeviceMappings", root_block_devices(&pool.root_volume))
                    .property("PlacementTenancy", pool.tenancy.as_str())
                    .property("UserData", user_data(&payload)),
            )?;
            let launch_configuration = graph
                .resolve(&Target::resource(stack.clone(), LAUNCH_CONFIGURATION), &stack)?
                .to_json();
            template.add_resource(
                AUTO_SCALING_GROUP,
                auto_scaling_group(ctx, pool, scaling, &subnets, launch_configuration),
            )?;
        }
        Provisioning::SpotFleet(fleet) => {
            template.add_resource(
                SPOT_FLEET,
                spot_fleet(ctx, pool, fleet, &subnets, &security_groups, profile.arn, &payload),
            )?;
        }
    }

    if pool.instance_profile_arn.is_none() {
        let role_arn = Target::attribute(stack.clone(), IAM_ROLE, Attribute::Arn);
        graph.publish_as(&role_arn, ROLE_ARN_OUTPUT)?;
    }
    for export in graph.exports(&stack) {
        template.add_output(
            export.output.clone(),
            Output::new(export.value.to_json()).exported_as(&export.output),
        )?;
    }
    template.add_output(
        "StackName",
        Output::new(json!({ "Ref": "AWS::StackName" })).describe("Name of this stack"),
    )?;

    tracing::debug!(
        pool = %pool.name,
        spot_fleet = pool.spot_fleet().is_some(),
        imports = graph.import_owners(&stack).len(),
        "assembled node pool"
    );
    Ok(template)
}

fn subnet_refs(
    ctx: &Context<'_>,
    graph: &mut ReferenceGraph,
    pool: &NodePoolSpec,
    stack: &StackId,
) -> Result<Vec<Reference>> {
    let targets: Vec<Target> = ctx
        .topology
        .node_pool(&pool.name)
        .map(|p| p.subnets.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|name| ctx.topology.subnet(name))
        .map(|subnet| {
            Target::from_identity(&subnet.identity, StackId::ControlPlane, subnet.logical_name.clone())
        })
        .collect();
    graph.resolve_all(&targets, stack)
}

/// How launch configurations and spot fleets name the pool's instance profile
struct InstanceProfile {
    name: Value,
    arn: Value,
}

/// Declare the worker role and instance profile, unless the pool brings its own profile
fn iam(
    ctx: &Context<'_>,
    template: &mut Template,
    graph: &mut ReferenceGraph,
    stack: &StackId,
    path: &str,
    pool: &NodePoolSpec,
) -> Result<InstanceProfile> {
    if let Some(arn) = &pool.instance_profile_arn {
        tracing::debug!(pool = %pool.name, %arn, "using existing instance profile");
        return Ok(InstanceProfile {
            name: json!(arn),
            arn: json!(arn),
        });
    }

    template.add_resource(
        IAM_MANAGED_POLICY,
        Resource::new("AWS::IAM::ManagedPolicy")
            .property("Description", format!("Policy for worker nodes of node pool {}", pool.name))
            .property(
                "PolicyDocument",
                json!({
                    "Version": "2012-10-17",
                    "Statement": [
                        { "Effect": "Allow", "Action": ["ec2:Describe*", "ec2:AttachVolume", "ec2:DetachVolume"], "Resource": "*" },
                        { "Effect": "Allow", "Action": ["autoscaling:DescribeAutoScalingGroups", "autoscaling:DescribeAutoScalingInstances"], "Resource": "*" },
                        { "Effect": "Allow", "Action": ["ecr:GetAuthorizationToken", "ecr:BatchCheckLayerAvailability", "ecr:GetDownloadUrlForLayer", "ecr:BatchGetImage"], "Resource": "*" },
                        { "Effect": "Allow", "Action": ["cloudformation:SignalResource"], "Resource": "*" }
                    ]
                }),
            ),
    )?;

    let policy = graph
        .resolve(&Target::resource(stack.clone(), IAM_MANAGED_POLICY), stack)?
        .to_json();
    let mut role = Resource::new("AWS::IAM::Role")
        .property("AssumeRolePolicyDocument", ec2_assume_role_policy())
        .property("ManagedPolicyArns", json!([policy]))
        .property("Path", "/");
    if let Some(name) = &pool.managed_iam_role_name {
        check_iam_role_name(
            &format!("{}.managedIamRoleName", path),
            &ctx.spec.cluster_name,
            &stack.logical_name(),
            &ctx.spec.region,
            name,
        )?;
        role = role.property("RoleName", managed_role_name(name));
    }
    template.add_resource(IAM_ROLE, role)?;

    let role = graph
        .resolve(&Target::resource(stack.clone(), IAM_ROLE), stack)?
        .to_json();
    template.add_resource(
        IAM_INSTANCE_PROFILE,
        Resource::new("AWS::IAM::InstanceProfile")
            .property("Path", "/")
            .property("Roles", json!([role])),
    )?;

    Ok(InstanceProfile {
        name: graph
            .resolve(&Target::resource(stack.clone(), IAM_INSTANCE_PROFILE), stack)?
            .to_json(),
        arn: graph
            .resolve(
                &Target::attribute(stack.clone(), IAM_INSTANCE_PROFILE, Attribute::Arn),
                stack,
            )?
            .to_json(),
    })
}

fn auto_scaling_group(
    ctx: &Context<'_>,
    pool: &NodePoolSpec,
    scaling: &AutoScaling,
    subnets: &[Reference],
    launch_configuration: Value,
) -> Resource {
    let mut group = Resource::new("AWS::AutoScaling::AutoScalingGroup")
        .property("VPCZoneIdentifier", references(subnets))
        .property("LaunchConfigurationName", launch_configuration)
        .property("MinSize", scaling.min_size.to_string())
        .property("MaxSize", scaling.max_size.to_string())
        .property(
            "Tags",
            ctx.asg_tags(
                &format!("{}-worker", pool.name),
                &[("clustack:node-pool:name", json!(pool.name))],
            ),
        )
        .update_policy(rolling_update(
            scaling.min_instances_in_service,
            &pool.wait_signal,
            &pool.create_timeout,
        ));
    if pool.load_balancer.enabled {
        group = group.property("LoadBalancerNames", json!(pool.load_balancer.names));
    }
    if pool.target_group.enabled {
        group = group.property("TargetGroupARNs", json!(pool.target_group.arns));
    }
    if let Some(policy) = creation_policy(scaling.min_size, &pool.wait_signal, &pool.create_timeout) {
        group = group.creation_policy(policy);
    }
    group
}

fn spot_fleet(
    ctx: &Context<'_>,
    pool: &NodePoolSpec,
    fleet: &SpotFleet,
    subnets: &[Reference],
    security_groups: &[Value],
    profile_arn: Value,
    payload: &str,
) -> Resource {
    let subnet_ids = json!({ "Fn::Join": [",", references(subnets)] });
    let groups: Vec<Value> = security_groups
        .iter()
        .map(|group| json!({ "GroupId": group }))
        .collect();

    let launch_specifications: Vec<Value> = fleet
        .launch_specifications
        .iter()
        .map(|spec| {
            let mut launch = json!({
                "ImageId": { "Ref": "ImageId" },
                "InstanceType": spec.instance_type,
                "WeightedCapacity": spec.weighted_capacity,
                "SpotPrice": spec.spot_price.to_string(),
                "IamInstanceProfile": { "Arn": profile_arn },
                "BlockDeviceMappings": [{ "DeviceName": "/dev/xvda", "Ebs": ebs(&spec.root_volume) }],
                "SecurityGroups": groups,
                "SubnetId": subnet_ids,
                "UserData": user_data(payload),
            });
            if let Some(key_name) = &ctx.spec.key_name {
                launch["KeyName"] = json!(key_name);
            }
            if pool.tenancy != Tenancy::Default {
                launch["Placement"] = json!({ "Tenancy": pool.tenancy.as_str() });
            }
            launch
        })
        .collect();

    let fleet_role = match &fleet.iam_fleet_role_arn {
        Some(arn) => json!(arn),
        None => json!({
            "Fn::Join": ["", ["arn:aws:iam::", { "Ref": "AWS::AccountId" }, ":role/aws-ec2-spot-fleet-role"]]
        }),
    };

    Resource::new("AWS::EC2::SpotFleet").property(
        "SpotFleetRequestConfigData",
        json!({
            "IamFleetRole": fleet_role,
            "AllocationStrategy": "diversified",
            "TargetCapacity": fleet.target_capacity,
            "SpotPrice": fleet.unit_spot_price.to_string(),
            "LaunchSpecifications": launch_specifications,
        }),
    )
}
