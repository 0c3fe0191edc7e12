//! Realtime engine command.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use cadenza_config::CadenzaConfig;
use cadenza_core::PerfStats;
use cadenza_engine::{Backend, CpalBackend, Engine, EngineEvent, NullBackend, RelayBackend};

use super::common::{EngineArgs, blocks_for};
use crate::{graph_file, nodes};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Discard output, paced to wall-clock time
    Null,
    /// Play through an audio output device
    Cpal,
    /// Send every block to a `cadenza serve` process
    Relay,
}

#[derive(Args)]
pub struct RunArgs {
    /// Graph file or name in the user graphs directory
    #[arg(value_name = "GRAPH")]
    graph: PathBuf,

    /// Output backend
    #[arg(short, long, value_enum, default_value = "null")]
    backend: BackendKind,

    /// Stop after this many seconds (default: until Ctrl+C)
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Output device name (cpal backend)
    #[arg(long)]
    device: Option<String>,

    /// Directory of the server FIFOs (relay backend)
    #[arg(long, value_name = "DIR")]
    relay_dir: Option<PathBuf>,

    #[command(flatten)]
    engine: EngineArgs,
}

/// Block timing accumulated between reports.
#[derive(Debug, Default)]
struct LoadMeter {
    blocks: u64,
    total: f32,
    worst: f32,
}

impl LoadMeter {
    fn record(&mut self, perf: &PerfStats) {
        let load = perf.load();
        self.blocks += 1;
        self.total += load;
        self.worst = self.worst.max(load);
    }

    fn average(&self) -> f32 {
        if self.blocks == 0 {
            0.0
        } else {
            self.total / self.blocks as f32
        }
    }
}

fn make_backend(args: &RunArgs, config: &CadenzaConfig) -> anyhow::Result<Box<dyn Backend>> {
    Ok(match args.backend {
        BackendKind::Null => Box::new(NullBackend::paced()),
        BackendKind::Cpal => Box::new(CpalBackend::with_device(args.device.clone())),
        BackendKind::Relay => {
            let Some(dir) = &args.relay_dir else {
                anyhow::bail!("--relay-dir is required with --backend relay");
            };
            Box::new(RelayBackend::new(dir, config.stream.clone()))
        }
    })
}

pub fn run(args: RunArgs, config: &CadenzaConfig) -> anyhow::Result<()> {
    let settings = args.engine.apply(&config.engine)?;
    let program = graph_file::load_program(&args.graph, &nodes::registry(), &settings)?;
    let backend = make_backend(&args, config)?;
    let target = args
        .seconds
        .map(|s| blocks_for(s, &settings) * settings.block_size as u64);

    println!("Running {} on {:?} backend", args.graph.display(), args.backend);
    println!("  Sample rate: {} Hz", settings.sample_rate);
    println!("  Block size: {} frames", settings.block_size);
    if target.is_none() {
        println!("\nPress Ctrl+C to stop...\n");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut engine = Engine::start(settings.clone())?;
    let events = engine.subscribe();
    engine.set_backend(Some(backend))?;
    engine.set_spec(Some(program))?;

    let mut meter = LoadMeter::default();
    let mut overall = LoadMeter::default();
    let mut last_report = Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Some(target) = target
            && engine.position() >= target
        {
            break;
        }
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(EngineEvent::Perf(perf)) => {
                meter.record(&perf);
                overall.record(&perf);
            }
            Ok(EngineEvent::Notification(n)) => {
                tracing::info!(node = %n.node, key = %n.key, value = %n.value, "node notification");
            }
            Ok(EngineEvent::PipelineDisabled(reason)) => {
                anyhow::bail!("pipeline disabled: {reason}");
            }
            Err(e) if e.is_timeout() => {}
            Err(_) => break,
        }
        if last_report.elapsed() >= REPORT_INTERVAL {
            tracing::info!(
                position = engine.position(),
                blocks = meter.blocks,
                avg_load = meter.average(),
                worst_load = meter.worst,
                "engine load"
            );
            meter = LoadMeter::default();
            last_report = Instant::now();
        }
    }

    println!("\nStopping...");
    let position = engine.position();
    engine.stop()?;
    println!(
        "Ran {:.2}s ({} blocks), average load {:.1}%, worst {:.1}%",
        position as f64 / f64::from(settings.sample_rate),
        overall.blocks,
        overall.average() * 100.0,
        overall.worst * 100.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_meter() {
        let mut meter = LoadMeter::default();
        assert_eq!(meter.average(), 0.0);
        for ms in [1, 3] {
            meter.record(&PerfStats {
                elapsed: Duration::from_millis(ms),
                budget: Duration::from_millis(4),
                ..PerfStats::default()
            });
        }
        assert_eq!(meter.blocks, 2);
        assert!((meter.average() - 0.5).abs() < 1e-6);
        assert!((meter.worst - 0.75).abs() < 1e-6);
    }
}
