//! Graph compilation command.

use std::path::PathBuf;

use clap::Args;
use cadenza_config::CadenzaConfig;

use super::common::EngineArgs;
use crate::{graph_file, nodes};

#[derive(Args)]
pub struct CompileArgs {
    /// Graph file or name in the user graphs directory
    #[arg(value_name = "GRAPH")]
    graph: PathBuf,

    /// Print the spec as JSON instead of a listing
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

pub fn run(args: CompileArgs, config: &CadenzaConfig) -> anyhow::Result<()> {
    let settings = args.engine.apply(&config.engine)?;
    let program = graph_file::load_program(&args.graph, &nodes::registry(), &settings)?;
    let spec = program.spec();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&**spec)?);
    } else {
        print!("{}", spec.dump());
        println!(
            "; {} buffers ({} bytes), {} nodes, {} opcodes",
            spec.buffers().len(),
            spec.byte_len(),
            spec.nodes().len(),
            spec.opcodes().len()
        );
    }
    Ok(())
}
