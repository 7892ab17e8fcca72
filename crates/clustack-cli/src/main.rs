//! clustack CLI - compile a cluster description into nested CloudFormation stacks

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::PayloadArgs;

#[derive(Parser)]
#[command(name = "clustack")]
#[command(author = "clustack Contributors")]
#[command(version)]
#[command(about = "Compile a cluster.yaml into nested CloudFormation stacks", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the cluster and write one stack document per stack
    Render {
        /// Cluster configuration file
        #[arg(short, long, env = "CLUSTACK_CONFIG", default_value = "cluster.yaml")]
        config: PathBuf,

        /// Directory receiving `<stack>/stack.json`
        #[arg(short, long, env = "CLUSTACK_OUTPUT", default_value = "stack-templates")]
        output_dir: PathBuf,

        #[command(flatten)]
        payloads: PayloadArgs,
    },

    /// Check the configuration by compiling it without writing anything
    Validate {
        /// Cluster configuration file
        #[arg(short, long, env = "CLUSTACK_CONFIG", default_value = "cluster.yaml")]
        config: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        payloads: PayloadArgs,
    },

    /// Show the resolved network topology
    Show {
        /// Cluster configuration file
        #[arg(short, long, env = "CLUSTACK_CONFIG", default_value = "cluster.yaml")]
        config: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Render {
            config,
            output_dir,
            payloads,
        } => commands::render::run(&config, &output_dir, &payloads),

        Commands::Validate {
            config,
            json,
            payloads,
        } => commands::validate::run(&config, &payloads, json),

        Commands::Show { config, json } => commands::show::run(&config, json),
    };

    let code = match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}
