//! Logical name derivation
//!
//! Logical names key resources inside a stack document and become part of export
//! names, so they must be alphanumeric and stable for a given input.

use once_cell::sync::Lazy;
use regex::Regex;

/// Suffixes of the control-plane resources generated for every subnet
pub const SUBNET_RESOURCE_SUFFIXES: &[&str] = &[
    "",
    "RouteTable",
    "RouteTableAssociation",
    "RouteToInternet",
    "NatGateway",
    "NatGatewayEIP",
    "RouteToNatGateway",
];

/// Fixed logical names of the control-plane stack, its resources and outputs alike
pub const RESERVED_LOGICAL_NAMES: &[&str] = &[
    "StackName",
    "VPC",
    "InternetGateway",
    "VPCGatewayAttachment",
    "SecurityGroupWorker",
    "SecurityGroupController",
    "SecurityGroupEtcd",
    "SecurityGroupWorkerIngressFromController",
    "SecurityGroupWorkerIngressFromWorker",
    "SecurityGroupControllerIngressFromWorker",
    "SecurityGroupEtcdIngressFromController",
    "SecurityGroupEtcdIngressFromWorker",
    "SecurityGroupEtcdPeerIngress",
    "IAMRoleController",
    "IAMInstanceProfileController",
    "IAMRoleEtcd",
    "IAMInstanceProfileEtcd",
    "EtcdInternalHostedZone",
    "Controllers",
    "ControllersLC",
];

/// Names derived from an etcd member index or an API endpoint
static GENERATED_LOGICAL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Etcd[0-9]+(EIP|ENI|InternalRecordSet|EBS|LC)?|APIEndpoint[A-Za-z0-9]*)$")
        .expect("valid regex")
});

/// Whether `name` is taken by a resource or output the compiler always owns
pub fn is_reserved_logical_name(name: &str) -> bool {
    RESERVED_LOGICAL_NAMES.contains(&name) || GENERATED_LOGICAL_NAME.is_match(name)
}

/// `private-1` → `Private1`, `pool_a.b` → `PoolAB`
pub fn logical_name(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_name() {
        assert_eq!(logical_name("public1"), "Public1");
        assert_eq!(logical_name("private-1a"), "Private1a");
        assert_eq!(logical_name("Subnet0"), "Subnet0");
        assert_eq!(logical_name("pool_a.b"), "PoolAB");
        assert_eq!(logical_name("--"), "");
    }

    #[test]
    fn test_reserved_logical_names() {
        for name in ["StackName", "VPC", "Controllers", "Etcd0", "Etcd12EBS", "APIEndpointDefaultELB"] {
            assert!(is_reserved_logical_name(name), "{}", name);
        }
        for name in ["Public1", "Etcd", "EtcdSubnet", "Stack", "Vpc"] {
            assert!(!is_reserved_logical_name(name), "{}", name);
        }
    }
}
