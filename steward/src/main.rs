//! Self-healing orchestration for an unattended browser-automation pipeline.
//!
//! `steward reconcile` runs on a timer and repairs UI/session infrastructure.
//! `steward pipeline run` drives the stage pipeline and resumes after restarts.
//! Every command prints pretty JSON on stdout; diagnostics go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use steward::core::error_class::ErrorClass;
use steward::core::gate::is_action_allowed;
use steward::core::redact::redact_secrets;
use steward::core::resume::resume_point;
use steward::escalation::{EscalationSignal, resolve_access_url};
use steward::exit_codes;
use steward::io::config::{StewardConfig, load_config, write_config};
use steward::io::health::CommandHealthCheck;
use steward::io::paths::StewardPaths;
use steward::io::pipeline_store::PipelineStore;
use steward::io::project_state::load_project_state;
use steward::io::proofs::DirProofSource;
use steward::io::recovery::{CommandClearanceProbe, CommandRecovery};
use steward::io::remediation::CommandRemediator;
use steward::io::report::{ReconcileReport, write_reconcile_report};
use steward::io::stage_worker::CommandStageWorker;
use steward::logging;
use steward::pipeline::Pipeline;
use steward::reconcile::reconcile;

#[derive(Parser)]
#[command(
    name = "steward",
    version,
    about = "Reconcile UI infrastructure and drive the resumable stage pipeline"
)]
struct Cli {
    /// Project root containing `.steward/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.steward/` directories and the default config.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run one lock-protected remediation pass.
    Reconcile {
        /// Override `reconcile.max_attempts` from config.
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Drive or inspect the stage pipeline.
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommand,
    },
    /// Evaluate the action gate from the project-state document.
    Gate {
        /// Allow flag to check (defaults to `pipeline.allow_flag`).
        #[arg(long)]
        flag: Option<String>,
    },
    /// Print the operator access URL.
    EscalationUrl,
}

#[derive(Subcommand)]
enum PipelineCommand {
    /// Run from the persisted resume point until done, failure, or escalation.
    Run,
    /// Print persisted state and where the next run would start.
    Status,
}

/// Printed on stdout when a command errors before producing its own result.
#[derive(Debug, Serialize)]
struct CommandFailure {
    status: &'static str,
    error_class: ErrorClass,
    reason: String,
}

impl CommandFailure {
    fn new(error_class: ErrorClass, err: &anyhow::Error) -> Self {
        Self {
            status: "FAILED",
            error_class,
            reason: redact_secrets(&format!("{err:#}")),
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let failure = CommandFailure::new(ErrorClass::Internal, &err);
            eprintln!("{}", failure.reason);
            if let Err(err) = print_json(&failure) {
                eprintln!("{err:#}");
            }
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = StewardPaths::new(&cli.root);
    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::Reconcile { max_attempts } => cmd_reconcile(&paths, max_attempts),
        Command::Pipeline {
            command: PipelineCommand::Run,
        } => cmd_pipeline_run(&paths),
        Command::Pipeline {
            command: PipelineCommand::Status,
        } => cmd_pipeline_status(&paths),
        Command::Gate { flag } => cmd_gate(&paths, flag),
        Command::EscalationUrl => cmd_escalation_url(&paths),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn cmd_init(paths: &StewardPaths, force: bool) -> Result<i32> {
    for dir in [
        &paths.state_dir,
        &paths.locks_dir,
        &paths.logs_dir,
        &paths.reports_dir,
    ] {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let written = force || !paths.config_path.exists();
    if written {
        write_config(&paths.config_path, &StewardConfig::default())?;
    }
    print_json(&json!({
        "config_path": paths.config_path,
        "config_written": written,
    }))?;
    Ok(exit_codes::OK)
}

fn load(paths: &StewardPaths) -> Result<StewardConfig> {
    load_config(&paths.config_path)
        .with_context(|| format!("load {}", paths.config_path.display()))
}

fn cmd_reconcile(paths: &StewardPaths, max_attempts: Option<u32>) -> Result<i32> {
    let cfg = load(paths)?;
    let max_attempts = max_attempts.unwrap_or(cfg.reconcile.max_attempts);
    let health = CommandHealthCheck {
        argv: cfg.reconcile.health_command.clone(),
        workdir: paths.root.clone(),
        timeout: Duration::from_secs(cfg.reconcile.health_timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
    };
    let remediator = CommandRemediator {
        argv: cfg.reconcile.remediation_command.clone(),
        workdir: paths.root.clone(),
        timeout: Duration::from_secs(cfg.reconcile.remediation_timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
    };

    let started_at = Utc::now();
    let mut attempts = Vec::new();
    let outcome = match reconcile(
        &paths.reconcile_lock_path,
        &health,
        &remediator,
        max_attempts,
        |record| attempts.push(record.clone()),
    ) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(err = %redact_secrets(&format!("{err:#}")), "reconcile errored");
            print_json(&CommandFailure::new(ErrorClass::Internal, &err))?;
            return Ok(exit_codes::FAILED);
        }
    };
    let report = ReconcileReport {
        started_at,
        finished_at: Utc::now(),
        max_attempts,
        outcome: outcome.clone(),
        attempts,
    };
    write_reconcile_report(&paths.reports_dir, &report)?;

    print_json(&outcome)?;
    Ok(if outcome.is_success() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_pipeline_run(paths: &StewardPaths) -> Result<i32> {
    let cfg = load(paths)?;
    let project = load_project_state(&paths.resolve(&cfg.project_state_path))?;
    let gate = project.gate_state(&cfg.pipeline.allow_flag);
    let store = PipelineStore::new(paths);
    let worker = CommandStageWorker {
        argv: cfg.pipeline.stage_command.clone(),
        workdir: paths.root.clone(),
        timeout: Duration::from_secs(cfg.pipeline.stage_timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
    };
    let recovery = CommandRecovery {
        argv: cfg.pipeline.recovery_command.clone(),
        workdir: paths.root.clone(),
        timeout: Duration::from_secs(cfg.pipeline.recovery_timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
    };
    let probe = CommandClearanceProbe {
        argv: cfg.pipeline.probe_command.clone(),
        workdir: paths.root.clone(),
        timeout: Duration::from_secs(cfg.pipeline.probe_timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
    };
    let pipeline = Pipeline {
        store: &store,
        gate: &gate,
        worker: &worker,
        recovery: &recovery,
        probe: &probe,
    };

    let outcome = match pipeline.run() {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(err = %redact_secrets(&format!("{err:#}")), "pipeline errored");
            print_json(&pipeline_failure(&store, &err))?;
            return Ok(exit_codes::FAILED);
        }
    };
    let access_url = access_url(paths, &cfg)?;
    match EscalationSignal::from_outcome(&outcome, access_url) {
        Some(signal) => print_json(&signal)?,
        None => print_json(&outcome)?,
    }
    Ok(outcome.exit_code())
}

/// Class comes from the latest persisted record, which the pipeline writes
/// before propagating a worker error.
fn pipeline_failure(store: &PipelineStore, err: &anyhow::Error) -> CommandFailure {
    let persisted = store
        .load()
        .ok()
        .flatten()
        .and_then(|run| run.latest().and_then(|record| record.last_error_class));
    CommandFailure::new(persisted.unwrap_or(ErrorClass::Internal), err)
}

fn cmd_pipeline_status(paths: &StewardPaths) -> Result<i32> {
    let store = PipelineStore::new(paths);
    let run = store.load()?;
    let next = resume_point(run.as_ref());
    print_json(&json!({
        "state_path": store.state_path,
        "run": run,
        "next": next,
    }))?;
    Ok(exit_codes::OK)
}

fn cmd_gate(paths: &StewardPaths, flag: Option<String>) -> Result<i32> {
    let cfg = load(paths)?;
    let flag = flag.unwrap_or_else(|| cfg.pipeline.allow_flag.clone());
    let project = load_project_state(&paths.resolve(&cfg.project_state_path))?;
    let decision = is_action_allowed(&project.gate_state(&flag));
    print_json(&decision)?;
    Ok(if decision.allowed {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_escalation_url(paths: &StewardPaths) -> Result<i32> {
    let cfg = load(paths)?;
    let url = access_url(paths, &cfg)?;
    print_json(&json!({ "access_url": url }))?;
    Ok(exit_codes::OK)
}

fn access_url(paths: &StewardPaths, cfg: &StewardConfig) -> Result<String> {
    let canonical = cfg.escalation.canonical()?;
    let proofs = DirProofSource {
        dir: paths.resolve(&cfg.escalation.proofs_dir),
    };
    Ok(resolve_access_url(&proofs, &canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward::core::types::{PipelineRun, Stage, StageRecord, StageStatus};

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["steward", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_init_force_with_root() {
        let cli = Cli::parse_from(["steward", "--root", "/srv/app", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("/srv/app"));
    }

    #[test]
    fn parse_reconcile_override() {
        let cli = Cli::parse_from(["steward", "reconcile", "--max-attempts", "5"]);
        assert!(matches!(
            cli.command,
            Command::Reconcile {
                max_attempts: Some(5)
            }
        ));
    }

    #[test]
    fn parse_pipeline_subcommands() {
        let cli = Cli::parse_from(["steward", "pipeline", "run"]);
        assert!(matches!(
            cli.command,
            Command::Pipeline {
                command: PipelineCommand::Run
            }
        ));
        let cli = Cli::parse_from(["steward", "pipeline", "status", "--root", "x"]);
        assert!(matches!(
            cli.command,
            Command::Pipeline {
                command: PipelineCommand::Status
            }
        ));
        assert_eq!(cli.root, PathBuf::from("x"));
    }

    #[test]
    fn parse_gate_and_escalation() {
        let cli = Cli::parse_from(["steward", "gate", "--flag", "deploy"]);
        assert!(matches!(cli.command, Command::Gate { flag: Some(ref f) } if f == "deploy"));
        let cli = Cli::parse_from(["steward", "escalation-url"]);
        assert!(matches!(cli.command, Command::EscalationUrl));
    }

    #[test]
    fn init_writes_default_config_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StewardPaths::new(temp.path());
        assert_eq!(cmd_init(&paths, false).expect("init"), exit_codes::OK);
        assert!(paths.config_path.exists());
        assert!(paths.reports_dir.is_dir());

        std::fs::write(&paths.config_path, "output_limit_bytes = 10\n").expect("edit");
        cmd_init(&paths, false).expect("init again");
        let cfg = load(&paths).expect("load");
        assert_eq!(cfg.output_limit_bytes, 10);
    }

    #[test]
    fn command_failure_is_classed_and_redacted() {
        let err = anyhow::anyhow!("health command exited 2: token=abc123");
        let json = serde_json::to_value(CommandFailure::new(ErrorClass::Internal, &err))
            .expect("json");
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["error_class"], "INTERNAL");
        let reason = json["reason"].as_str().expect("reason");
        assert!(reason.contains("exited 2"));
        assert!(!reason.contains("abc123"));
    }

    #[test]
    fn pipeline_failure_prefers_persisted_class() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = PipelineStore::new(&StewardPaths::new(temp.path()));
        let err = anyhow::anyhow!("clearance command exited 3");
        assert_eq!(
            pipeline_failure(&store, &err).error_class,
            ErrorClass::Internal
        );

        let now = Utc::now();
        let mut run = PipelineRun::new("run-1", now);
        run.upsert(StageRecord::running(Stage::SessionCheck, now, 0).finish(
            StageStatus::BlockedFinal,
            now,
            Some((ErrorClass::LoginRequired, "sign in".to_string())),
        ));
        store.save(&run).expect("save");
        assert_eq!(
            pipeline_failure(&store, &err).error_class,
            ErrorClass::LoginRequired
        );
    }

    #[cfg(unix)]
    #[test]
    fn unparseable_stage_report_fails_with_internal_class() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StewardPaths::new(temp.path());
        cmd_init(&paths, false).expect("init");
        let mut cfg = load(&paths).expect("load");
        cfg.pipeline.stage_command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo not-a-report".to_string(),
        ];
        write_config(&paths.config_path, &cfg).expect("write");

        assert_eq!(cmd_pipeline_run(&paths).expect("run"), exit_codes::FAILED);
        let run = PipelineStore::new(&paths)
            .load()
            .expect("load")
            .expect("state");
        let record = run.latest().expect("record");
        assert_eq!(record.stage, Stage::ConnectorsStatus);
        assert_eq!(record.last_error_class, Some(ErrorClass::Internal));
    }

    #[test]
    fn gate_denies_without_project_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StewardPaths::new(temp.path());
        assert_eq!(cmd_gate(&paths, None).expect("gate"), exit_codes::FAILED);
    }
}
