//! Offline rendering command.

use std::path::PathBuf;

use clap::Args;
use cadenza_config::CadenzaConfig;
use cadenza_core::BlockContext;
use cadenza_engine::{Vm, WavBackend};
use indicatif::{ProgressBar, ProgressStyle};

use super::common::{EngineArgs, blocks_for};
use crate::{graph_file, nodes};

#[derive(Args)]
pub struct RenderArgs {
    /// Graph file or name in the user graphs directory
    #[arg(value_name = "GRAPH")]
    graph: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Length in seconds
    #[arg(short, long, default_value = "5.0")]
    seconds: f64,

    #[command(flatten)]
    engine: EngineArgs,
}

pub fn run(args: RenderArgs, config: &CadenzaConfig) -> anyhow::Result<()> {
    let settings = args.engine.apply(&config.engine)?;
    let program = graph_file::load_program(&args.graph, &nodes::registry(), &settings)?;
    let blocks = blocks_for(args.seconds, &settings);

    let mut vm = Vm::new(settings.sample_rate);
    vm.set_backend(Some(Box::new(WavBackend::new(&args.output))))?;
    vm.set_spec(Some(program));

    println!(
        "Rendering {:.2}s ({} blocks of {}) to {}...",
        args.seconds,
        blocks,
        settings.block_size,
        args.output.display()
    );

    let pb = ProgressBar::new(blocks);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let sample_rate = settings.sample_rate as f32;
    let mut sample_pos = 0u64;
    let mut worst_load = 0.0f32;
    for _ in 0..blocks {
        let mut block = BlockContext::new(sample_pos, settings.block_size, sample_rate);
        vm.run_block(&mut block)?;
        worst_load = worst_load.max(block.perf.load());
        sample_pos += settings.block_size as u64;
        pb.inc(1);
    }
    pb.finish_and_clear();

    vm.set_backend(None)?;
    println!(
        "Wrote {} frames, peak block load {:.1}%",
        sample_pos,
        worst_load * 100.0
    );
    Ok(())
}
