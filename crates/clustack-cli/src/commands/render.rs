//! Render command - compile the cluster into stack documents on disk

use std::fs;
use std::path::Path;

use console::style;
use indexmap::IndexMap;
use tracing::info;

use crate::commands::{PayloadArgs, load_config};
use crate::display;
use crate::error::{CliError, Result};

/// File name of every stack document inside its directory
pub const STACK_FILE: &str = "stack.json";

pub fn run(config: &Path, output_dir: &Path, payloads: &PayloadArgs) -> Result<()> {
    println!(
        "{} Compiling {}",
        style("→").blue(),
        config.display()
    );

    let spec = load_config(config)?;
    let stacks = payloads.compiler()?.compile(&spec)?;

    // Serialize every stack before the first write
    let rendered: IndexMap<String, String> = stacks.render()?;

    for (name, document) in &rendered {
        let dir = output_dir.join(name);
        fs::create_dir_all(&dir)
            .map_err(|e| CliError::io("Failed to create output directory", &dir, e))?;
        let path = dir.join(STACK_FILE);
        fs::write(&path, document).map_err(|e| CliError::io("Failed to write", &path, e))?;
        info!(stack = %name, path = %path.display(), "wrote stack document");
        println!("  {} {}", style("wrote").green(), path.display());
    }

    display::print_stack_summary(&stacks);
    println!(
        "{} Rendered {} stack(s) for cluster {}",
        style("✓").green().bold(),
        rendered.len(),
        spec.cluster_name
    );
    Ok(())
}
