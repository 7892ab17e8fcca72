//! Instance payloads (user-data)
//!
//! The assembler treats user-data as an opaque string produced by a
//! [`PayloadRenderer`]. The built-in [`TemplatePayloads`] renders one MiniJinja
//! template per instance role; a directory of `controller.j2`, `etcd.j2` and
//! `worker.j2` can replace any of them.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use minijinja::Environment;
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Tries before an etcd node gives up attaching its data volume (3s apart)
pub const DEFAULT_VOLUME_ATTACH_MAX_ATTEMPTS: u32 = 200;

const CONTROLLER_TEMPLATE: &str = include_str!("../templates/controller.j2");
const ETCD_TEMPLATE: &str = include_str!("../templates/etcd.j2");
const WORKER_TEMPLATE: &str = include_str!("../templates/worker.j2");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    Controller,
    Etcd,
    Worker,
}

impl InstanceRole {
    pub const ALL: [InstanceRole; 3] = [InstanceRole::Controller, InstanceRole::Etcd, InstanceRole::Worker];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceRole::Controller => "controller",
            InstanceRole::Etcd => "etcd",
            InstanceRole::Worker => "worker",
        }
    }

    pub fn template_name(&self) -> String {
        format!("{}.j2", self.as_str())
    }
}

impl fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Etcd peer as seen by the other instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EtcdMember {
    pub name: String,
    /// Advertised name, absent when the member advertises its Elastic IP
    pub fqdn: Option<String>,
}

/// Everything a payload template may use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadRequest {
    pub role: InstanceRole,
    pub cluster_name: String,
    pub region: String,
    /// Name of the stack the instance belongs to
    pub stack: String,
    pub node_pool: Option<String>,
    pub etcd_index: Option<usize>,
    pub etcd_node_name: Option<String>,
    pub etcd_members: Vec<EtcdMember>,
    pub etcd_internal_domain_name: String,
}

/// Produces the user-data of one instance group
pub trait PayloadRenderer {
    fn render(&self, request: &PayloadRequest) -> Result<String>;
}

/// MiniJinja templates keyed by instance role
#[derive(Debug, Clone)]
pub struct TemplatePayloads {
    templates: IndexMap<InstanceRole, String>,
    volume_attach_max_attempts: u32,
}

impl Default for TemplatePayloads {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplatePayloads {
    /// The templates shipped with the engine
    pub fn builtin() -> Self {
        let mut templates = IndexMap::new();
        templates.insert(InstanceRole::Controller, CONTROLLER_TEMPLATE.to_string());
        templates.insert(InstanceRole::Etcd, ETCD_TEMPLATE.to_string());
        templates.insert(InstanceRole::Worker, WORKER_TEMPLATE.to_string());
        Self {
            templates,
            volume_attach_max_attempts: DEFAULT_VOLUME_ATTACH_MAX_ATTEMPTS,
        }
    }

    /// Built-in templates, overridden by any `{role}.j2` found in `dir`
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut payloads = Self::builtin();
        for role in InstanceRole::ALL {
            let path = dir.join(role.template_name());
            if path.is_file() {
                let source = std::fs::read_to_string(&path)?;
                tracing::debug!(role = %role, path = %path.display(), "using payload template override");
                payloads = payloads.with_template(role, source);
            }
        }
        Ok(payloads)
    }

    pub fn with_template(mut self, role: InstanceRole, source: impl Into<String>) -> Self {
        self.templates.insert(role, source.into());
        self
    }

    pub fn with_volume_attach_max_attempts(mut self, attempts: u32) -> Self {
        self.volume_attach_max_attempts = attempts;
        self
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env
    }
}

impl PayloadRenderer for TemplatePayloads {
    fn render(&self, request: &PayloadRequest) -> Result<String> {
        let name = request.role.template_name();
        let source = self
            .templates
            .get(&request.role)
            .ok_or_else(|| EngineError::payload(&name, "no template registered"))?;

        let mut env = self.create_environment();
        env.add_template_owned(name.clone(), source.clone())
            .map_err(|e| EngineError::payload(&name, e.to_string()))?;
        let template = env
            .get_template(&name)
            .map_err(|e| EngineError::payload(&name, e.to_string()))?;

        let ctx = minijinja::context! {
            request => request,
            volume_attach_max_attempts => self.volume_attach_max_attempts,
        };
        template
            .render(ctx)
            .map_err(|e| EngineError::payload(&name, e.to_string()))
    }
}
