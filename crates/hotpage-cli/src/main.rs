#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use hotpage_core::BuildMode;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hotpage")]
#[command(author, version, about = "Dev server with live updates for file-routed React pages", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the project root
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Config file (default: hotpage.json in the project root)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the dev server with live updates
    Dev {
        /// HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// WebSocket port for live updates
        #[arg(long)]
        hmr_port: Option<u16>,

        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// Build mode (development or production)
        #[arg(long, env = "HOTPAGE_MODE")]
        mode: Option<BuildMode>,
    },

    /// Build once and write the output directory
    Build {
        /// Build mode (defaults to production)
        #[arg(long, env = "HOTPAGE_MODE")]
        mode: Option<BuildMode>,

        /// Output directory (overrides outDir)
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },

    /// Print the route table derived from the page directory
    Routes,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Commands::Dev {
            port,
            hmr_port,
            host,
            mode,
        } => {
            let action = commands::dev::DevAction {
                cwd,
                config: cli.config,
                mode,
                port,
                hmr_port,
                host,
            };
            let rt = tokio::runtime::Runtime::new().map_err(|e| miette::miette!("{e}"))?;
            rt.block_on(commands::dev::run(action))
        }
        Commands::Build { mode, out_dir } => commands::build::run(&commands::build::BuildAction {
            cwd,
            config: cli.config,
            mode,
            out_dir,
            json: cli.json,
        }),
        Commands::Routes => commands::routes::run(&cwd, cli.config.as_deref(), cli.json),
    }
}
