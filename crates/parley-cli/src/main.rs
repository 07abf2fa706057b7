//! `parley` – runs one mission of the assistant robot agent.
//!
//! 1. Loads `~/.parley/config.toml` (or `--config`), applying `PARLEY_*`
//!    overrides and command-line flags.
//! 2. Starts the camera producer that keeps the latest frame fresh.
//! 3. Ticks the [`Agent`] at a fixed cadence until the mission is finished,
//!    Ctrl-C is pressed, or a mission invariant breaks.
//!
//! Exits non-zero when configuration fails or the mission aborts.

mod config;
mod display;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use parley_hal::{FrameProducer, ImageFileCamera, LatestFrame};
use parley_runtime::{
    Agent, ConsoleSpeech, LlmClassifier, LlmDriver, LlmGenerator, NegotiationSession, Negotiator,
    SnapshotBus, VlmPerception, init_tracing,
};
use parley_types::ParleyError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// How often the camera producer refreshes the latest frame.
const CAPTURE_PERIOD: Duration = Duration::from_millis(100);

/// Upper bound on runtime shutdown once the mission loop has returned.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Assistant robot that negotiates its way past people")]
struct Cli {
    /// Config file (default: ~/.parley/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mission goal, overriding the config file.
    #[arg(long)]
    goal: Option<String>,

    /// Still image used as the camera feed.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Run without the conversation capability.
    #[arg(long)]
    no_negotiation: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing("parley");

    print_banner();

    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red().bold());
            return ExitCode::FAILURE;
        }
    };
    if let Some(goal) = cli.goal {
        cfg.goal = goal;
    }
    if let Some(image) = cli.image {
        cfg.camera_image = image;
    }
    info!(config = ?cfg, path = %path.display(), "configuration loaded");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after this tick …".yellow().bold());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start async runtime".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run_mission(&cfg, cli.no_negotiation, shutdown));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "Mission aborted".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run_mission(
    cfg: &Config,
    no_negotiation: bool,
    shutdown: Arc<AtomicBool>,
) -> Result<(), ParleyError> {
    let camera = ImageFileCamera::new("front_rgb", &cfg.camera_image)?;
    let frames = LatestFrame::new();
    let mut producer = FrameProducer::spawn(Box::new(camera), frames.clone(), CAPTURE_PERIOD);

    let driver = |model: &str| {
        LlmDriver::new(&cfg.llm_base_url, model, cfg.api_key(), cfg.request_timeout())
            .map(Arc::new)
            .map_err(|e| ParleyError::LanguageService(e.to_string()))
    };
    let vision = driver(&cfg.vision_model)?;
    let negotiator = if no_negotiation {
        Negotiator::Absent
    } else {
        let chat = driver(&cfg.chat_model)?;
        Negotiator::Present(NegotiationSession::new(
            cfg.negotiation_config(),
            Arc::new(LlmGenerator::new(chat.clone())),
            Arc::new(LlmClassifier::new(chat, cfg.prompts.classifier.clone())),
            Arc::new(ConsoleSpeech::new()),
        ))
    };

    let bus = SnapshotBus::default();
    let display = tokio::spawn(display::run(bus.subscribe()));
    let mut agent = Agent::new(
        cfg.agent_config(),
        Arc::new(VlmPerception::new(vision)),
        negotiator,
    )
    .with_snapshots(bus);

    println!(
        "  Mission: {}  ({} step(s) planned)\n",
        cfg.goal.bold(),
        cfg.subgoals.len()
    );

    let mut ticker = tokio::time::interval(cfg.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let outcome = loop {
        ticker.tick().await;
        if shutdown.load(Ordering::SeqCst) {
            info!("shutdown requested");
            break Ok(());
        }
        let Some(frame) = frames.latest() else {
            debug!("no camera frame yet");
            continue;
        };
        match agent.step(&frame).await {
            Ok(_) if agent.finished() => {
                println!("{}", "  ✓ Mission accomplished.".green().bold());
                break Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "mission invariant violated");
                break Err(ParleyError::Invariant(e.to_string()));
            }
        }
    };

    producer.stop();
    for negotiation in agent.negotiations() {
        info!(tag = %negotiation.tag, transcript = %negotiation.transcript.to_lines(), "negotiation log");
    }
    // Dropping the agent closes the snapshot bus and ends the display task.
    drop(agent);
    if let Err(e) = display.await {
        warn!(error = %e, "display task ended abnormally");
    }
    outcome
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___           __         "#.bold().cyan());
    println!("{}", r#"  / _ \___ _____/ /__ __ __ "#.bold().cyan());
    println!("{}", r#" / ___/ _ `/ __/ / -_) // / "#.bold().cyan());
    println!("{}", r#"/_/   \_,_/_/ /_/\__/\_, /  "#.bold().cyan());
    println!("{}", r#"                    /___/   "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Parley".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Assistant robot agent");
    println!();
}
