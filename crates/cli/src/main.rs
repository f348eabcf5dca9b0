use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use time::OffsetDateTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use triage_cli::config::{AppConfig, DEFAULT_CONFIG_PATH};
use triage_cli::report::FailureReport;
use triage_cli::rerun::{self, RerunScope};
use triage_cli::serve::{self, AppState, DEFAULT_PORT};
use triage_client::{HttpPlatformClient, HttpScreenshotProbe, PlatformClient};
use triage_pipeline::BatchProcessor;

const DEFAULT_REPORTS_DIR: &str = "reports";

/// Failure triage for automated test runs.
#[derive(Parser)]
#[command(name = "triage", version, about = "Failure triage for automated test runs")]
struct Cli {
    /// Suites file (.json, or .toml)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Suppress logging and non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Directory for generated reports
        #[arg(long, default_value = DEFAULT_REPORTS_DIR)]
        reports_dir: PathBuf,
    },

    /// Enrich a run's failures and write the failure report
    Report {
        #[arg(long)]
        suite: String,
        #[arg(long)]
        run_id: String,
        /// Directory the report is written to
        #[arg(long, default_value = DEFAULT_REPORTS_DIR)]
        out_dir: PathBuf,
    },

    /// Queue a rerun of a run's failed tests, or of the given test cases
    Rerun {
        #[arg(long)]
        suite: String,
        #[arg(long)]
        run_id: String,
        /// Test case uuid to rerun (repeatable). Without any, every failed test case is rerun.
        #[arg(long = "uuid")]
        uuids: Vec<String>,
        /// Custom name of the rerun
        #[arg(long)]
        name: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve { port, reports_dir } => {
            rt.block_on(serve::start_server(port, AppState::new(config, reports_dir)))
        }
        Commands::Report {
            suite,
            run_id,
            out_dir,
        } => rt.block_on(cmd_report(&config, &suite, &run_id, &out_dir, cli.quiet)),
        Commands::Rerun {
            suite,
            run_id,
            uuids,
            name,
        } => rt.block_on(cmd_rerun(&config, &suite, &run_id, uuids, name)),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn,triage=info",
        1 => "info,triage=debug",
        _ => "debug,triage=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn cmd_report(
    config: &AppConfig,
    suite: &str,
    run_id: &str,
    out_dir: &Path,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let suite_config = config.suite(suite)?;
    let client: Arc<dyn PlatformClient> = Arc::new(HttpPlatformClient::new(
        suite_config.clone(),
        config.pipeline.request_timeout(),
    ));
    let probe = Arc::new(HttpScreenshotProbe::new(config.pipeline.probe_timeout()));

    let run = client.run_details(run_id).await?;
    let test_cases = client.list_test_cases(run_id).await;
    let failures = BatchProcessor::from_settings(client, probe, &config.pipeline)
        .process(run_id, &test_cases)
        .await;

    let report = FailureReport {
        suite,
        run_id,
        run: &run,
        failures: &failures,
        generated_at: OffsetDateTime::now_utc(),
    };
    let path = report.save(out_dir).await?;

    if !quiet {
        eprintln!(
            "{} of {} test cases failed in run {}",
            failures.len(),
            test_cases.len(),
            run_id
        );
    }
    println!("{}", path.display());
    Ok(())
}

async fn cmd_rerun(
    config: &AppConfig,
    suite: &str,
    run_id: &str,
    uuids: Vec<String>,
    name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let suite_config = config.suite(suite)?;
    let client = HttpPlatformClient::new(suite_config.clone(), config.pipeline.request_timeout());
    let scope = if uuids.is_empty() {
        RerunScope::Failed
    } else {
        RerunScope::Selected(uuids)
    };

    let outcome = rerun::trigger(&client, run_id, scope, name).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
    Ok(())
}
