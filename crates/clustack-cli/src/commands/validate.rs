//! Validate command - run the whole compilation without writing anything

use std::path::Path;

use console::style;

use crate::commands::{PayloadArgs, load_config};
use crate::display::ValidationReport;
use crate::error::Result;

pub fn run(config: &Path, payloads: &PayloadArgs, json_output: bool) -> Result<()> {
    if !json_output {
        println!(
            "{} Validating {}",
            style("→").blue(),
            config.display()
        );
    }

    let mut report = ValidationReport::new(config.display().to_string());
    let outcome = load_config(config).and_then(|spec| Ok(payloads.compiler()?.compile(&spec)?));

    let exit_code = match outcome {
        Ok(stacks) => {
            report.stack_count = stacks.stacks().len();
            None
        }
        Err(err) => {
            report.add_error(&err);
            Some(err.exit_code())
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report.to_json()).unwrap_or_default());
    } else {
        report.display();
        println!();
        report.print_summary();
    }

    if let Some(code) = exit_code {
        std::process::exit(code);
    }
    Ok(())
}
