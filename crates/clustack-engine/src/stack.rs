//! Stack identities

use std::fmt;

use clustack_core::naming::logical_name;
use serde::Serialize;

/// One deployable unit of the cluster
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StackId {
    Root,
    ControlPlane,
    NodePool(String),
}

impl StackId {
    /// Directory / document name (`root`, `control-plane`, `<pool>`)
    pub fn name(&self) -> &str {
        match self {
            StackId::Root => "root",
            StackId::ControlPlane => "control-plane",
            StackId::NodePool(name) => name,
        }
    }

    /// Logical name of the nested stack resource inside the root stack
    pub fn logical_name(&self) -> String {
        match self {
            StackId::Root => "Root".to_string(),
            StackId::ControlPlane => "Controlplane".to_string(),
            StackId::NodePool(name) => logical_name(name),
        }
    }

    /// Parameter through which a consuming stack learns this stack's runtime name
    pub fn name_parameter(&self) -> String {
        match self {
            StackId::ControlPlane => "ControlPlaneStackName".to_string(),
            other => format!("{}StackName", other.logical_name()),
        }
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
