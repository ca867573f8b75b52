//! RLS Probe CLI
//!
//! Runs the probe catalog against a project's REST and storage endpoints and
//! prints a pass/fail report.
//!
//! Usage:
//!   rls-probe --url https://xyz.supabase.co --api-key <anon-key> \
//!     --token <access-token> --user-id <uuid> \
//!     --other-user-id <uuid> --storage-bucket profile-pics
//!
//! Every flag can also come from the environment (`RLS_PROBE_*`) or a `.env`
//! file.
//!
//! Exit codes:
//!   0    run completed (individual probe failures are in the report)
//!   2    malformed token, unusable configuration or catalog
//!   130  interrupted

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use tracing::info;
use uuid::Uuid;

use rls_probe::{
    builtin_probes, load_catalog, ProbeError, ProbeRunner, RestTransport, RunConfig, RunReport,
};

const EXIT_USAGE: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// Row-level security policy tester (REST-level)
#[derive(Parser, Debug)]
#[command(name = "rls-probe")]
#[command(version)]
#[command(about = "Probe a REST data API's row-level security policies")]
struct Args {
    /// Project URL, e.g. https://xyz.supabase.co
    #[arg(long, env = "RLS_PROBE_URL")]
    url: String,

    /// Anon (publishable) API key
    #[arg(long, env = "RLS_PROBE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Authenticated user's access token (JWT)
    #[arg(long, env = "RLS_PROBE_TOKEN", hide_env_values = true)]
    token: String,

    /// Authenticated user's UUID
    #[arg(long, env = "RLS_PROBE_USER_ID")]
    user_id: Uuid,

    /// Another user's UUID to test cross-user blocking
    #[arg(long, env = "RLS_PROBE_OTHER_USER_ID")]
    other_user_id: Option<Uuid>,

    /// Storage bucket to test (e.g. profile-pics)
    #[arg(long, env = "RLS_PROBE_STORAGE_BUCKET")]
    storage_bucket: Option<String>,

    /// YAML file with additional probes, run after the built-in ones
    #[arg(long, short = 'c', env = "RLS_PROBE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Characters of response body kept in the report
    #[arg(long, default_value_t = 180)]
    excerpt_len: usize,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Log every request (debug level)
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> RunConfig {
        let mut config = RunConfig::new(self.url, self.api_key, self.token, self.user_id);
        config.other_user_id = self.other_user_id;
        config.storage_bucket = self.storage_bucket;
        config.catalog = self.catalog;
        config.timeout = Duration::from_secs(self.timeout_secs);
        config.excerpt_len = self.excerpt_len;
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.verbose);

    let json = args.json;
    let config = args.into_config();

    if let Err(e) = config.validate() {
        eprintln!("{}: {}", "error".red().bold(), startup_message(&e));
        return ExitCode::from(EXIT_USAGE);
    }

    tokio::select! {
        result = run(&config) => match result {
            Ok(report) => {
                if json {
                    match report.to_json() {
                        Ok(text) => println!("{}", text),
                        Err(e) => {
                            eprintln!("{}: {}", "error".red().bold(), e);
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    print!("{}", report.render_text());
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {:#}", "error".red().bold(), e);
                ExitCode::from(EXIT_USAGE)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n{}", "Interrupted".yellow());
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run(config: &RunConfig) -> anyhow::Result<RunReport> {
    let vars = config.vars(Utc::now());
    let mut probes = builtin_probes(config, &vars);

    if let Some(path) = &config.catalog {
        let extra = load_catalog(path, &vars, &config.identities())
            .with_context(|| format!("Failed to load catalog {}", path.display()))?;
        info!(count = extra.len(), "Loaded catalog probes");
        probes.extend(extra);
    }

    let transport = RestTransport::new(&config.base_url, config.timeout)
        .context("Failed to create transport")?;

    info!(count = probes.len(), url = %config.base_url, "Running probes");
    let results = ProbeRunner::new(Arc::new(transport))
        .with_excerpt_len(config.excerpt_len)
        .run_all(&probes)
        .await;

    Ok(RunReport::new(&config.base_url, results))
}

fn startup_message(err: &ProbeError) -> String {
    match err {
        ProbeError::InvalidCredential { reason } => {
            format!("the token you provided is not a valid JWT ({})", reason)
        }
        other => other.to_string(),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
