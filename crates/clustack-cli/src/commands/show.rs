//! Show command - print the resolved network topology

use std::path::Path;

use clustack_core::resolve;
use clustack_engine::EngineError;

use crate::commands::load_config;
use crate::display;
use crate::error::Result;

pub fn run(config: &Path, json: bool) -> Result<()> {
    let spec = load_config(config)?;
    let topology = resolve(&spec).map_err(EngineError::from)?;

    if json {
        let document = serde_json::to_string_pretty(&topology).map_err(EngineError::from)?;
        println!("{}", document);
    } else {
        display::print_topology(&topology);
    }
    Ok(())
}
