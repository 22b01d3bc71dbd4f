//! autodeploy CLI
//!
//! Detects the project in a directory, recommends a host and deploys it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use autodeploy::{
    Cancellation, DeploymentOrchestrator, PipelineConfig, SystemRunner, TerminalOperator,
    Validate,
};

/// Detect a web project, pick a hosting platform and deploy it
#[derive(Parser, Debug)]
#[command(name = "autodeploy", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: detect, recommend, check tools, build, deploy
    Deploy {
        #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
        path: Option<PathBuf>,

        #[arg(long, value_name = "FILE", help = "Configuration file (TOML or YAML)")]
        config: Option<PathBuf>,

        #[arg(long, help = "Skip the advisory model and use the fallback table")]
        no_advisor: bool,

        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },

    /// Detect the project kind and recommend a platform without deploying
    Detect {
        #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
        path: Option<PathBuf>,

        #[arg(long, value_name = "FILE", help = "Configuration file (TOML or YAML)")]
        config: Option<PathBuf>,

        #[arg(long, help = "Skip the advisory model and use the fallback table")]
        no_advisor: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(
    root: &Path,
    explicit: Option<&Path>,
    no_advisor: bool,
) -> autodeploy::Result<PipelineConfig> {
    let mut config = match explicit {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::discover(root)?,
    };
    if no_advisor {
        config.advisor.enabled = false;
    }
    for warning in config.validate().into_result()? {
        tracing::warn!("config: {}", warning);
    }
    Ok(config)
}

fn resolve_root(path: Option<PathBuf>) -> PathBuf {
    let root = path.unwrap_or_else(|| PathBuf::from("."));
    root.canonicalize().unwrap_or(root)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Command::Deploy {
            path,
            config,
            no_advisor,
            json,
        } => deploy(resolve_root(path), config, no_advisor, json).await,
        Command::Detect {
            path,
            config,
            no_advisor,
        } => detect(resolve_root(path), config, no_advisor).await,
    };

    std::process::exit(exit_code);
}

async fn deploy(root: PathBuf, config: Option<PathBuf>, no_advisor: bool, json: bool) -> i32 {
    let config = match load_config(&root, config.as_deref(), no_advisor) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let (cancel, cancellation) = Cancellation::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current step");
            let _ = cancel.send(true);
        }
    });

    let orchestrator = DeploymentOrchestrator::new(
        config,
        Arc::new(SystemRunner::new()),
        Arc::new(TerminalOperator::new()),
    )
    .with_cancellation(cancellation);

    let report = orchestrator.run(&root).await;

    if json {
        match report.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        println!();
        print!("{}", report.render());
    }

    if report.is_success() {
        0
    } else {
        1
    }
}

async fn detect(root: PathBuf, config: Option<PathBuf>, no_advisor: bool) -> i32 {
    let config = match load_config(&root, config.as_deref(), no_advisor) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let orchestrator = DeploymentOrchestrator::new(
        config,
        Arc::new(SystemRunner::new()),
        Arc::new(TerminalOperator::new()),
    );

    let (profile, choice) = orchestrator.detect(&root).await;
    println!("Project:  {} ({})", profile.kind, profile.root.display());
    if !profile.markers.is_empty() {
        println!("Signals:  {}", profile.markers.join(", "));
    }
    println!("Platform: {} [{:?}]", choice.platform, choice.source);
    println!("Why:      {}", choice.rationale);
    0
}
