//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Validation failures with the offending setting and a hint
//! - The resolved network topology
//! - Per-stack resource summaries

use clustack_core::{
    ApiLoadBalancer, EipIdentity, Identity, LoadBalancerKind, MemberIdentity, NatGateway,
    RouteTableMode, Subnet, Topology, Visibility,
};
use clustack_engine::{EngineError, StackSet};
use console::style;
use serde_json::{Value, json};

use crate::error::CliError;

/// A validation failure with location information
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub kind: &'static str,
    pub path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn from_error(err: &CliError) -> Self {
        let message = match err {
            CliError::Compile(EngineError::Schema { message, .. }) => message.clone(),
            CliError::Compile(EngineError::Conflict { message, .. })
            | CliError::Compile(EngineError::Topology { message, .. }) => message.clone(),
            other => other.to_string(),
        };
        let suggestion = match err {
            CliError::Compile(EngineError::Schema { suggestion, .. }) => suggestion.clone(),
            CliError::Io { help, .. } => help.clone(),
            _ => None,
        };
        Self {
            kind: err.kind(),
            path: err.path().unwrap_or_default().to_string(),
            message,
            suggestion,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.kind,
            "path": self.path,
            "message": self.message,
            "suggestion": self.suggestion,
        })
    }
}

/// Outcome of validating one configuration file
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub file: String,
    pub issues: Vec<ValidationIssue>,
    pub stack_count: usize,
}

impl ValidationReport {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn add_error(&mut self, err: &CliError) {
        self.issues.push(ValidationIssue::from_error(err));
    }

    pub fn has_errors(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Display issues under the file they belong to
    pub fn display(&self) {
        if self.issues.is_empty() {
            return;
        }
        println!();
        println!("{}", style(&self.file).cyan().bold());
        for issue in &self.issues {
            let path_display = if issue.path.is_empty() {
                String::new()
            } else {
                format!(" at {}", style(&issue.path).dim())
            };
            println!("  {} {}{}", style("✗").red(), issue.message, path_display);
            if let Some(suggestion) = &issue.suggestion {
                println!("    {} {}", style("hint:").blue(), suggestion);
            }
        }
    }

    pub fn print_summary(&self) {
        if self.has_errors() {
            println!(
                "{} Validation failed: {} error(s)",
                style("✗").red().bold(),
                self.issues.len()
            );
        } else {
            println!(
                "{} Validation passed, {} stack(s) would be generated",
                style("✓").green().bold(),
                self.stack_count
            );
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "file": self.file,
            "valid": !self.has_errors(),
            "stacks": self.stack_count,
            "errors": self.issues.iter().map(ValidationIssue::to_json).collect::<Vec<_>>(),
        })
    }
}

pub fn describe_identity(identity: &Identity) -> String {
    match identity {
        Identity::Managed => "managed".to_string(),
        Identity::ExistingById(id) => format!("existing {}", id),
        Identity::ImportedByStackOutput(export) => format!("imported from {}", export),
    }
}

fn describe_eip(eip: &EipIdentity) -> String {
    match eip {
        EipIdentity::Managed => "managed EIP".to_string(),
        EipIdentity::ExistingByAllocationId(id) => format!("EIP {}", id),
    }
}

fn describe_egress(topology: &Topology, subnet: &Subnet) -> String {
    let internet_gateway = topology.internet_gateway.is_some();
    match (
        &subnet.visibility,
        topology.nat_gateway_for_private_subnet(&subnet.name),
    ) {
        (Visibility::Private, Some(NatGateway::Managed { eip, host_subnet })) => {
            format!("NAT in {} ({})", host_subnet, describe_eip(eip))
        }
        (Visibility::Private, Some(NatGateway::ExistingById { id })) => format!("NAT {}", id),
        (Visibility::Private, None) => "none".to_string(),
        (Visibility::Public, _) if internet_gateway => "internet gateway".to_string(),
        (Visibility::Public, _) => "none".to_string(),
    }
}

fn describe_load_balancer(load_balancer: &ApiLoadBalancer) -> String {
    match load_balancer {
        ApiLoadBalancer::Existing { name } => format!("existing load balancer {}", name),
        ApiLoadBalancer::Managed(lb) => {
            let kind = match lb.kind {
                LoadBalancerKind::Classic => "classic",
                LoadBalancerKind::Network => "network",
            };
            format!("{} {} in {}", lb.scheme(), kind, lb.subnets.join(", "))
        }
    }
}

/// Print the resolved topology as an indented tree
pub fn print_topology(topology: &Topology) {
    println!(
        "{} {} ({})",
        style("Cluster").cyan().bold(),
        topology.cluster_name,
        topology.region
    );
    println!(
        "  {} {} {}",
        style("VPC").bold(),
        topology.vpc.cidr,
        style(describe_identity(&topology.vpc.identity)).dim()
    );
    match &topology.internet_gateway {
        Some(igw) => println!(
            "  {} {}",
            style("Internet gateway").bold(),
            style(describe_identity(&igw.identity)).dim()
        ),
        None => println!("  {} none", style("Internet gateway").bold()),
    }

    println!("  {}", style("Subnets").bold());
    for subnet in &topology.subnets {
        let visibility = match subnet.visibility {
            Visibility::Public => style("public").green(),
            Visibility::Private => style("private").yellow(),
        };
        println!(
            "    {} {} {} {}",
            subnet.name,
            visibility,
            subnet.availability_zone.as_deref().unwrap_or("-"),
            subnet.cidr.as_deref().unwrap_or("-"),
        );
        println!(
            "      {} {}",
            style("identity:").dim(),
            describe_identity(&subnet.identity)
        );
        if let Some(RouteTableMode::Preconfigured(id)) = &subnet.route_table {
            println!("      {} {}", style("route table:").dim(), id);
        }
        println!(
            "      {} {}",
            style("egress:").dim(),
            describe_egress(topology, subnet)
        );
    }

    println!(
        "  {} {}",
        style("Controllers").bold(),
        topology.controller_subnets.join(", ")
    );

    if !topology.api_endpoints.is_empty() {
        println!("  {}", style("API endpoints").bold());
        for endpoint in &topology.api_endpoints {
            println!(
                "    {} {} {}",
                endpoint.name,
                endpoint.dns_name,
                style(describe_load_balancer(&endpoint.load_balancer)).dim()
            );
        }
    }

    println!("  {}", style("Etcd").bold());
    for node in &topology.etcd.nodes {
        let identity = match &node.identity {
            MemberIdentity::Fqdn => "static name".to_string(),
            MemberIdentity::Eip { eip } => describe_eip(eip),
            MemberIdentity::Eni { interface, .. } => {
                format!("network interface {}", describe_identity(interface))
            }
        };
        println!(
            "    {} {} {} {}",
            node.name,
            node.subnet,
            style(identity).dim(),
            node.fqdn.as_deref().unwrap_or_default()
        );
    }
    if let Some(zone) = &topology.etcd.hosted_zone {
        println!(
            "    {} {} {}",
            style("hosted zone").dim(),
            zone.name,
            style(describe_identity(&zone.identity)).dim()
        );
    }

    if !topology.node_pools.is_empty() {
        println!("  {}", style("Node pools").bold());
        for pool in &topology.node_pools {
            println!("    {} {}", pool.name, pool.subnets.join(", "));
        }
    }
}

/// One line per generated stack with its resource and output counts
pub fn print_stack_summary(stacks: &StackSet) {
    for stack in stacks.stacks() {
        println!(
            "  {} {:<16} {} resource(s), {} output(s)",
            style("•").dim(),
            stack.id.name(),
            stack.template.resources.len(),
            stack.template.outputs.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustack_core::CoreError;

    #[test]
    fn test_issue_keeps_suggestion() {
        let err: CliError = EngineError::Schema {
            path: "workerCont".to_string(),
            message: "unknown key workerCont".to_string(),
            suggestion: Some("did you mean workerCount?".to_string()),
        }
        .into();
        let mut report = ValidationReport::new("cluster.yaml");
        report.add_error(&err);

        let value = report.to_json();
        assert_eq!(value["valid"], false);
        assert_eq!(value["errors"][0]["kind"], "schema");
        assert_eq!(value["errors"][0]["path"], "workerCont");
        assert_eq!(value["errors"][0]["suggestion"], "did you mean workerCount?");
    }

    #[test]
    fn test_topology_issue_message() {
        let err: CliError =
            EngineError::from(CoreError::topology("subnets[1]", "no resolvable egress")).into();
        let issue = ValidationIssue::from_error(&err);
        assert_eq!(issue.kind, "topology");
        assert_eq!(issue.path, "subnets[1]");
        assert_eq!(issue.message, "no resolvable egress");
    }

    #[test]
    fn test_load_balancer_descriptions() {
        assert_eq!(
            describe_load_balancer(&ApiLoadBalancer::Existing {
                name: "elb-1".into()
            }),
            "existing load balancer elb-1"
        );
        let managed = ApiLoadBalancer::Managed(clustack_core::ManagedApiLoadBalancer {
            kind: LoadBalancerKind::Network,
            private: true,
            subnets: vec!["private1".into(), "private2".into()],
            security_group_ids: vec![],
            allowed_source_cidrs: vec![],
            record_set: None,
        });
        assert_eq!(
            describe_load_balancer(&managed),
            "internal network in private1, private2"
        );
    }

    #[test]
    fn test_identity_descriptions() {
        assert_eq!(describe_identity(&Identity::Managed), "managed");
        assert_eq!(
            describe_identity(&Identity::ExistingById("vpc-1".into())),
            "existing vpc-1"
        );
        assert_eq!(
            describe_identity(&Identity::ImportedByStackOutput("net-Vpc".into())),
            "imported from net-Vpc"
        );
    }
}
