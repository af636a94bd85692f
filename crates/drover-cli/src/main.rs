//! drover: run a coordination mission against a simulated device.
//!
//! The plan is a JSON task tree (see `drover demo-plan` for the format).
//! Bus traffic is printed as it happens, followed by the coordination report.

mod device;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use drover_core::app::{KernelConfig, MissionBuilder, MissionOutcome};
use drover_core::domain::{AgentRole, AtomicTask, Message, MessageBody, TaskNode};
use drover_core::impls::KeywordBrain;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "drover",
    version,
    about = "Run a coordination mission against a simulated device"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a mission (the built-in demo plan unless --plan is given).
    Run(RunArgs),
    /// Print the built-in demo plan as JSON.
    DemoPlan,
}

#[derive(Args)]
struct RunArgs {
    /// Task tree as JSON.
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Kernel configuration as JSON; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the global step ceiling.
    #[arg(long)]
    max_steps: Option<u32>,

    /// Override the attempt limit per task.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Resume automatically when the governor pauses the mission.
    /// Without it a pause becomes an emergency stop.
    #[arg(long)]
    auto_resume: bool,

    /// Print the final report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Do not print bus traffic.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::DemoPlan => {
            println!("{}", serde_json::to_string_pretty(&demo_plan())?);
            Ok(())
        }
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    logging::init(&args.log_level);

    let mut config = match &args.config {
        Some(path) => KernelConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => KernelConfig::default(),
    };
    if let Some(steps) = args.max_steps {
        config.max_total_steps = steps;
    }
    if let Some(attempts) = args.max_attempts {
        config.max_attempts_per_task = attempts;
    }

    let plan = match &args.plan {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read plan {}", path.display()))?;
            serde_json::from_str::<TaskNode>(&raw)
                .with_context(|| format!("parse plan {}", path.display()))?
        }
        None => demo_plan(),
    };

    let device = device::Device::new();
    let mission = device::install(MissionBuilder::new(), &device)?
        .expect_tools(&device::REQUIRED_TOOLS)
        .brain(Arc::new(KeywordBrain))
        .config(config)
        .build()
        .context("build mission")?;
    info!(mission_id = %mission.id(), "mission ready");

    let governor = mission.governor();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted");
            governor.trigger_emergency_stop();
        }
    });

    let printer = {
        let mut feed = mission.bus().subscribe();
        let governor = mission.governor();
        let auto_resume = args.auto_resume;
        let quiet = args.quiet;
        tokio::spawn(async move {
            loop {
                let message = match feed.recv().await {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bus printer fell behind");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if !quiet {
                    println!("{}", describe(&message));
                }
                match &message.body {
                    MessageBody::UserInterventionNeeded { .. } if auto_resume => {
                        governor.resume_from_intervention();
                    }
                    MessageBody::UserInterventionNeeded { .. } => {
                        governor.trigger_emergency_stop();
                    }
                    MessageBody::DataAvailable { key, .. } if key == "status" => break,
                    _ => {}
                }
            }
        })
    };

    let report = mission.run(plan).await;
    printer.await.context("bus printer")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("{}", mission.report().await);
        println!(
            "{} ({} steps, {} completed, {} failed)",
            report.outcome,
            report.steps,
            report.completed.len(),
            report.failed.len()
        );
    }

    if report.outcome != MissionOutcome::Completed {
        bail!("{}", report.outcome);
    }
    Ok(())
}

/// One line per bus message.
fn describe(message: &Message) -> String {
    let detail = match &message.body {
        MessageBody::DataAvailable { key, data } => match data {
            Value::String(text) => format!("{key}: {text}"),
            other => format!("{key}: {other}"),
        },
        MessageBody::TaskComplete { task_id, .. } => format!("task {task_id} complete"),
        MessageBody::ResourcePreempted { resource, reason } => {
            format!("lost {resource}: {reason}")
        }
        MessageBody::ErrorOccurred { error, can_recover } => {
            let tag = if *can_recover { "recoverable" } else { "fatal" };
            format!("error ({tag}): {error}")
        }
        MessageBody::StateCheckpoint { state } => {
            format!("checkpoint of {} ({} actions)", state.agent_id, state.action_history.len())
        }
        MessageBody::UserInterventionNeeded { reason } => format!("intervention needed: {reason}"),
    };
    format!("[{} -> {}] {}", message.from, message.to, detail)
}

/// Search, then three device chores that contend for the screen.
fn demo_plan() -> TaskNode {
    TaskNode::sequential(
        "demo",
        vec![
            AtomicTask::new("search", AgentRole::Research, "Search for weather in Tokyo")
                .with_priority(2)
                .into(),
            TaskNode::parallel(
                "chores",
                vec![
                    AtomicTask::new("settings", AgentRole::System, "Open Settings").into(),
                    AtomicTask::new("chat", AgentRole::Social, "open WhatsApp")
                        .with_priority(1)
                        .into(),
                    AtomicTask::new("note", AgentRole::System, "type Sunny in Tokyo").into(),
                ],
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::try_parse_from([
            "drover",
            "run",
            "--max-steps",
            "10",
            "--max-attempts",
            "3",
            "--auto-resume",
            "-q",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.max_steps, Some(10));
        assert_eq!(args.max_attempts, Some(3));
        assert!(args.auto_resume);
        assert!(args.quiet);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn demo_plan_round_trips_through_json() {
        let json = serde_json::to_string(&demo_plan()).unwrap();
        let plan: TaskNode = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, demo_plan());
    }

    #[tokio::test(start_paused = true)]
    async fn demo_plan_completes_on_the_simulated_device() {
        let device = device::Device::new();
        let mission = device::install(MissionBuilder::new(), &device)
            .unwrap()
            .expect_tools(&device::REQUIRED_TOOLS)
            .brain(Arc::new(KeywordBrain))
            .build()
            .unwrap();

        let report = mission.run(demo_plan()).await;

        assert_eq!(report.outcome, MissionOutcome::Completed);
        assert_eq!(report.completed.len(), 4);
    }

    #[test]
    fn describe_renders_errors() {
        let message = Message::new(
            "SYSTEM_a".into(),
            "Orchestrator".into(),
            MessageBody::ErrorOccurred {
                error: "boom".into(),
                can_recover: false,
            },
        );
        assert_eq!(describe(&message), "[SYSTEM_a -> Orchestrator] error (fatal): boom");
    }
}
