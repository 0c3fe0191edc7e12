//! Cadenza CLI - compile, run, and render audio graphs.

mod commands;
mod graph_file;
mod nodes;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadenza")]
#[command(author, version, about = "Cadenza realtime audio engine", long_about = None)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a graph file and print the program listing
    Compile(commands::compile::CompileArgs),

    /// Run a graph on the engine thread
    Run(commands::run::RunArgs),

    /// Render a graph to a WAV file
    Render(commands::render::RenderArgs),

    /// Serve a framed stream and log what clients send
    Serve(commands::serve::ServeArgs),

    /// List audio output devices
    Devices,

    /// List available node kinds and their ports
    Nodes(commands::nodes::NodesArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();
    let config = commands::common::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile(args) => commands::compile::run(args, &config),
        Commands::Run(args) => commands::run::run(args, &config),
        Commands::Render(args) => commands::render::run(args, &config),
        Commands::Serve(args) => commands::serve::run(args, &config),
        Commands::Devices => commands::devices::run(),
        Commands::Nodes(args) => commands::nodes::run(args),
    }
}
