use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use aura_sentinel_domain::{EngineKind, StageOutput, StageTrace, WorkflowDescriptor};
use aura_sentinel_engine::{build_engine, model_tier, role_instruction, EngineConfig, ModelTier};
use aura_sentinel_orchestrator::{fixture_assets, CycleConfig, CycleObserver, Session};
use aura_sentinel_records::DecisionRecordStore;
use aura_sentinel_workflow::{
    descriptor_to_yaml, load_descriptor_from_path, save_descriptor, ArchitectureSynthesizer,
};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "aura-sentinel")]
#[command(about = "Cognitive cycle runner for tokenized real-world asset review")]
struct Cli {
    /// Engine configuration YAML.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ignore any configured credential and run in simulation mode.
    #[arg(long, global = true, default_value_t = false)]
    simulate: bool,
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Engines,
    Assets,
    Synthesize(SynthesizeArgs),
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct SynthesizeArgs {
    #[arg(long)]
    objective: String,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, conflicts_with = "objective", required_unless_present = "objective")]
    workflow: Option<PathBuf>,
    #[arg(long)]
    objective: Option<String>,
    #[arg(long, default_value_t = false)]
    halt_on_fault: bool,
    /// Write the session's decision records as JSON lines.
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Engines => engines_command(),
        Commands::Assets => assets_command(),
        Commands::Synthesize(args) => {
            let config = resolve_engine_config(cli.config.as_deref(), cli.simulate, |name| {
                std::env::var(name).ok()
            })?;
            synthesize_command(args, &config)
        }
        Commands::Run(args) => {
            let config = resolve_engine_config(cli.config.as_deref(), cli.simulate, |name| {
                std::env::var(name).ok()
            })?;
            run_command(args, &config)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("AURA_SENTINEL_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_engine_config<F>(path: Option<&Path>, simulate: bool, lookup: F) -> Result<EngineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let config = base.with_env_overrides(lookup)?;
    Ok(if simulate {
        config.without_credentials()
    } else {
        config
    })
}

#[allow(clippy::unnecessary_wraps)]
fn engines_command() -> Result<()> {
    for stage in EngineKind::ALL {
        let role = role_instruction(stage).map_or("reserved", |instruction| instruction.role);
        let tier = match model_tier(stage) {
            ModelTier::Reasoning => "reasoning",
            ModelTier::Fast => "fast",
        };
        println!(
            "engine={} role=\"{}\" tier={} scheduled={}",
            stage,
            role,
            tier,
            stage.is_scheduled()
        );
    }
    Ok(())
}

fn assets_command() -> Result<()> {
    for asset in fixture_assets() {
        println!("{}", serde_json::to_string(&asset)?);
    }
    Ok(())
}

fn synthesize_command(args: &SynthesizeArgs, config: &EngineConfig) -> Result<()> {
    let descriptor = synthesize(&args.objective, config)?;
    if let Some(out) = &args.out {
        save_descriptor(&descriptor, out)?;
        println!(
            "workflow_id={} saved to {}",
            descriptor.workflow_id,
            out.display()
        );
    } else {
        print!("{}", descriptor_to_yaml(&descriptor)?);
    }
    Ok(())
}

fn synthesize(objective: &str, config: &EngineConfig) -> Result<WorkflowDescriptor> {
    if objective.trim().is_empty() {
        return Err(anyhow!("--objective must not be blank"));
    }
    ArchitectureSynthesizer::from_config(config)
        .synthesize(objective)
        .ok_or_else(|| {
            anyhow!(
                "no architecture available: synthesis needs a generation credential; \
                 pass --workflow with a saved descriptor instead"
            )
        })
}

fn run_command(args: &RunArgs, config: &EngineConfig) -> Result<()> {
    let workflow = match (&args.workflow, &args.objective) {
        (Some(path), _) => load_descriptor_from_path(path)?,
        (None, Some(objective)) => synthesize(objective, config)?,
        (None, None) => return Err(anyhow!("pass --workflow or --objective")),
    };

    let engine = build_engine(config);
    info!(mode = ?engine.mode(), workflow_id = %workflow.workflow_id, "engine ready");

    let mut session = Session::new();
    session.set_active_workflow(workflow);
    let cycle_config = CycleConfig {
        halt_on_fault: args.halt_on_fault,
        ..CycleConfig::default()
    };
    let record = session.run_active(engine.as_ref(), &cycle_config, Some(&ProgressPrinter))?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    if let Some(out) = &args.export {
        let records = session.store().list()?;
        let mut writer = BufWriter::new(File::create(out)?);
        for record in &records {
            writeln!(writer, "{}", serde_json::to_string(record)?)?;
        }
        writer.flush()?;
        eprintln!("exported {} records to {}", records.len(), out.display());
    }
    Ok(())
}

struct ProgressPrinter;

impl CycleObserver for ProgressPrinter {
    fn stage_started(&self, stage: EngineKind) {
        eprintln!("[{stage}] running");
    }

    fn trace_recorded(&self, trace: &StageTrace) {
        eprintln!("{}", progress_line(trace));
    }
}

fn progress_line(trace: &StageTrace) -> String {
    let detail = match &trace.output {
        StageOutput::Report(report) => report.summary.clone(),
        StageOutput::Fault(fault) => format!("{}: {}", fault.error, fault.details),
    };
    format!(
        "[{}] confidence={:.2} latency_ms={} {}",
        trace.stage, trace.confidence, trace.latency_ms, detail
    )
}
