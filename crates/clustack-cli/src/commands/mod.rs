//! CLI commands

pub mod render;
pub mod show;
pub mod validate;

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use clustack_core::{ClusterSpec, load_cluster};
use clustack_engine::{Compiler, EngineError, TemplatePayloads};
use tracing::debug;

use crate::error::{CliError, Result};

/// Options shared by every command that renders instance payloads
#[derive(Args, Debug, Clone, Default)]
pub struct PayloadArgs {
    /// Directory holding controller.j2, etcd.j2 and worker.j2 overrides
    #[arg(long, env = "CLUSTACK_PAYLOAD_DIR")]
    pub payload_dir: Option<PathBuf>,

    /// Attempts etcd nodes make to attach their data volume before giving up
    #[arg(long)]
    pub volume_attach_max_attempts: Option<u32>,
}

impl PayloadArgs {
    pub fn compiler(&self) -> Result<Compiler> {
        let mut payloads = match &self.payload_dir {
            Some(dir) => {
                debug!(dir = %dir.display(), "loading payload templates");
                TemplatePayloads::from_dir(dir)?
            }
            None => TemplatePayloads::builtin(),
        };
        if let Some(attempts) = self.volume_attach_max_attempts {
            payloads = payloads.with_volume_attach_max_attempts(attempts);
        }
        Ok(Compiler::builder().payloads(payloads).build())
    }
}

/// Read and normalize a cluster configuration file
pub fn load_config(path: &Path) -> Result<ClusterSpec> {
    let bytes = fs::read(path).map_err(|e| CliError::io("Failed to read", path, e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "loaded cluster configuration");
    let spec = load_cluster(&bytes).map_err(EngineError::from)?;
    Ok(spec)
}
