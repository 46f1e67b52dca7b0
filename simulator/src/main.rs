use anyhow::Context;
use clap::Parser;
use echocore::pipeline::StopSignal;
use echocore::SharedParams;
use gui_bridge::bridge::{gui_bind_address, GuiBridge};
use gui_bridge::model::RollingHistory;
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::{Overrides, WorkflowConfig};
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Dual-tone CW echo-ranging workflow driver")]
struct Args {
    /// Step this many cycles on one thread and write a summary
    #[arg(long)]
    offline: Option<u64>,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Stop the threaded pipeline after this many cycles
    #[arg(long)]
    cycles: Option<u64>,
    /// Keep the HTTP bridge alive for the visualizer
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[command(flatten)]
    overrides: Overrides,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::default()
    };
    workflow_config.apply(&args.overrides);
    workflow_config.validate()?;

    let params = Arc::new(
        SharedParams::new(workflow_config.radar.clone()).context("creating shared parameters")?,
    );
    let derived = params.snapshot().derived;
    info!(
        "range resolution {:.2} m, velocity resolution {:.4} m/s, cycle {:.3} s",
        derived.range_res, derived.v_res, derived.time_res
    );

    let history = Arc::new(RwLock::new(RollingHistory::new(
        workflow_config.display.range_time,
    )));
    let runner = Runner::new(workflow_config, Arc::clone(&params), Arc::clone(&history));
    let bridge = if args.serve {
        Some(GuiBridge::start(
            Arc::clone(&params),
            Arc::clone(&history),
            gui_bind_address(),
        )?)
    } else {
        None
    };

    if let Some(cycles) = args.offline {
        let result = runner.execute(cycles)?;
        println!(
            "Offline run -> cycles {}, detections {}, target now at {:.2} m",
            result.cycles, result.detections, result.final_target_range
        );

        let mut report = String::new();
        for estimate in &result.estimates {
            report.push_str(&serde_json::to_string(estimate)?);
            report.push('\n');
        }
        let report_path = PathBuf::from("tools/data/offline_ranging.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report_path)
            .with_context(|| format!("opening {}", report_path.display()))?;
        file.write_all(report.as_bytes())?;
    } else {
        let stop = StopSignal::new();
        spawn_ctrl_c_handler(stop.clone())?;
        let metrics = runner.run_live(args.cycles, stop)?;
        println!(
            "Live run -> frames {}, detections {}, dropped messages {}",
            metrics.processed, metrics.detections, metrics.dropped_messages
        );
    }

    if let Some(bridge) = bridge {
        println!(
            "HTTP bridge running on http://{} (Ctrl+C to stop)...",
            bridge.address()
        );
        wait_for_ctrl_c()?;
    }

    Ok(())
}

fn wait_for_ctrl_c() -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    runtime.block_on(async {
        signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
        Ok::<(), anyhow::Error>(())
    })
}

/// Raises `stop` on the first Ctrl+C so the pipeline winds down and silences
/// the transmitter.
fn spawn_ctrl_c_handler(stop: StopSignal) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || match wait_for_ctrl_c() {
            Ok(()) => {
                info!("Ctrl+C received, stopping pipeline");
                stop.raise();
            }
            Err(err) => warn!("signal handler failed: {err:#}"),
        })
        .context("spawning signal handler thread")?;
    Ok(())
}
