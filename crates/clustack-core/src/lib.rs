//! clustack Core - configuration and topology model
//!
//! This crate turns a `cluster.yaml` into a resolved topology:
//! - `ClusterSchema`: strict validation of the raw document, unknown keys rejected by path
//! - `RawCluster`: the configuration exactly as written
//! - `ClusterSpec`: the normalized, defaulted configuration
//! - `Topology`: every subnet, gateway and etcd member with its ownership resolved

pub mod config;
pub mod error;
pub mod loader;
pub mod naming;
pub mod normalize;
pub mod schema;
pub mod spec;
pub mod spot_fleet;
pub mod suggestions;
pub mod topology;

pub use config::RawCluster;
pub use error::{CoreError, Result};
pub use loader::{load_cluster, parse_document, parse_raw};
pub use normalize::normalize;
pub use schema::{ClusterSchema, ValidationErrorInfo};
pub use spec::{
    ApiEndpointSpec, ClusterSpec, ControllerSpec, EtcdSpec, LoadBalancerKind,
    MemberIdentityProvider, NodePoolSpec, Provisioning, SubnetSpec, Tenancy, Volume, WaitSignal,
};
pub use spot_fleet::{LaunchSpecification, Price, SpotFleet};
pub use topology::{
    resolve, ApiEndpoint, ApiLoadBalancer, ApiRecordSet, EipIdentity, EtcdNode, EtcdTopology,
    HostedZone, Identity, ManagedApiLoadBalancer, MemberIdentity, NatGateway, NodePoolTopology,
    RouteTableMode, Subnet, Topology, Visibility,
};
