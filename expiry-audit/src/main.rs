//! Expiry Audit CLI Application
//!
//! Reads a list of domains, asks each registry's WHOIS server about it and
//! sorts the results: expired or unregistered names go to the output file,
//! domains that could not be evaluated go to the error file.

mod pool;
mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};
use expiry_audit_lib::config::{parse_timeout_string, MAX_THREADS_PER_PROCESS};
use expiry_audit_lib::{load_env_config, parse_timeout, ConfigManager, FileConfig};
use expiry_audit_lib::{
    read_domain_lines, AuditError, Auditor, BackendRegistry, BackendSettings, Concurrency, PoolReport,
    RunConfig, ServerDirectory,
};
use pool::ProcessShardExecutor;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// Configuration or other fatal error before or during the run.
const EXIT_FATAL: i32 = 1;

/// The run finished but at least one worker process did not.
const EXIT_SHARD_FAILED: i32 = 2;

/// CLI arguments for expiry-audit
#[derive(Parser, Debug)]
#[command(name = "expiry-audit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find expired and unregistered domains in large lists over WHOIS")]
#[command(
    long_about = "Find expired and unregistered domains in large lists over WHOIS.\n\nEvery domain is resolved to its registrable name, looked up on the registry's WHOIS server and classified. Expired names are appended to --output, failures to --error."
)]
#[command(styles = STYLES)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Input file with one domain per line [default: input.txt]
    #[arg(short = 'i', long = "input", value_name = "FILE", help_heading = "Input / Output")]
    pub input: Option<String>,

    /// File that receives expired and unregistered domains
    #[arg(short = 'o', long = "output", value_name = "FILE", help_heading = "Input / Output")]
    pub output: Option<String>,

    /// File that receives domains that could not be evaluated
    #[arg(short = 'e', long = "error", value_name = "FILE", help_heading = "Input / Output")]
    pub error: Option<String>,

    /// Print the run summary as JSON
    #[arg(long = "json", help_heading = "Input / Output")]
    pub json: bool,

    /// Worker processes the input is split across [default: 1]
    #[arg(short = 'p', long = "num-processes", value_name = "N", help_heading = "Performance")]
    pub processes: Option<usize>,

    /// Domains in flight per process [default: min(32, cpus + 4)]
    #[arg(
        short = 't',
        long = "max-threads-per-process",
        value_name = "N",
        help_heading = "Performance"
    )]
    pub threads: Option<usize>,

    /// Remove the per-process limit on domains in flight
    #[arg(long = "unlock-threads-limit", conflicts_with = "threads", help_heading = "Performance")]
    pub unlock_threads_limit: bool,

    /// Query backend id [default: async_query]
    #[arg(long = "id", value_name = "BACKEND", help_heading = "Backend")]
    pub backend: Option<String>,

    /// List the available query backends and exit
    #[arg(long = "list-backends", help_heading = "Backend")]
    pub list_backends: bool,

    /// Per-operation network timeout, e.g. "15s" or "1m"
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Backend")]
    pub timeout: Option<String>,

    /// Evaluate the expiry date of every registered domain except strict.exempt_suffixes
    /// (defaults to li, ch, the same suffixes relaxed mode skips)
    #[arg(long = "strict", help_heading = "Evaluation")]
    pub strict: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Only log warnings and skip the summary
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose", help_heading = "Configuration")]
    pub quiet: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Audit one shard file and print its summary as JSON
    #[command(hide = true)]
    Worker {
        #[arg(long = "shard", value_name = "FILE")]
        shard: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(EXIT_FATAL);
    }

    init_logging(&args);

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_FATAL
        }
    };
    process::exit(code);
}

fn validate_args(args: &Args) -> Result<(), String> {
    if args.processes == Some(0) {
        return Err("Number of processes must be at least 1".to_string());
    }

    if let Some(threads) = args.threads {
        if threads == 0 || threads > MAX_THREADS_PER_PROCESS {
            return Err(format!(
                "Threads per process must be between 1 and {}",
                MAX_THREADS_PER_PROCESS
            ));
        }
    }

    if let Some(timeout) = &args.timeout {
        if parse_timeout_string(timeout).is_none() {
            return Err(format!(
                "Invalid timeout '{}'. Use format like '5s', '30s', '2m'",
                timeout
            ));
        }
    }

    if let Some(backend) = &args.backend {
        if backend.trim().is_empty() {
            return Err("Backend id cannot be empty".to_string());
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays free for summaries. `RUST_LOG` wins over
/// the flags.
fn init_logging(args: &Args) {
    let level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("expiry_audit={0},expiry_audit_lib={0}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> Result<i32, Box<dyn std::error::Error>> {
    let (config, file_config) = build_config(&args)?;

    let settings = BackendSettings::for_run(
        &config,
        ServerDirectory::with_overrides(file_config.server_overrides()),
    );
    let registry = BackendRegistry::with_builtins(&settings);

    if args.list_backends {
        ui::print_backends(&registry);
        return Ok(0);
    }

    // Binds the backend, so an unknown id fails before the input is opened.
    let auditor = Arc::new(Auditor::new(config, &registry)?);
    let config = auditor.config();

    if let Some(Command::Worker { .. }) = &args.command {
        let lines = read_domain_lines(&config.input_path).await?;
        let summary = auditor.audit_lines(lines).await;
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(0);
    }

    let lines = read_domain_lines(&config.input_path).await?;
    let show_ui = !config.quiet && !args.json;
    if show_ui {
        ui::print_header(lines.len(), config);
    }

    let started = Instant::now();
    let report = if config.process_count <= 1 {
        PoolReport::single(auditor.audit_lines(lines).await)
    } else {
        let executor = ProcessShardExecutor::current(worker_args(&args, config))?;
        auditor.run_sharded(lines, &executor).await
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ui::json_report(&report))?);
    } else if show_ui {
        ui::print_summary(&report, started.elapsed());
    }

    Ok(if report.is_clean() { 0 } else { EXIT_SHARD_FAILED })
}

/// Resolve the run configuration.
///
/// Precedence: CLI > `EA_*` environment > config files > defaults. Returns
/// the file layer too, for the server overrides it carries.
fn build_config(args: &Args) -> Result<(RunConfig, FileConfig), Box<dyn std::error::Error>> {
    let config_manager = ConfigManager::new(args.verbose);
    let env_config = load_env_config(args.verbose);

    // Step 1: config files (explicit path, EA_CONFIG, or discovery)
    let file_config = if let Some(path) = &args.config {
        debug!(path = %path, "using explicit config file (--config)");
        config_manager
            .load_file(path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?
    } else if let Some(path) = &env_config.config {
        debug!(path = %path, "using explicit config file (EA_CONFIG)");
        config_manager
            .load_file(path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?
    } else {
        config_manager.discover_and_load()?
    };
    let mut config = file_config.apply(RunConfig::default())?;

    // Step 2: environment
    config = env_config.apply(config)?;

    // Step 3: CLI arguments
    config = apply_cli_args_to_config(config, args)?;

    if let Some(Command::Worker { shard }) = &args.command {
        config.input_path = shard.clone();
        config.process_count = 1;
    }

    Ok((config, file_config))
}

/// Apply CLI arguments to config (highest precedence).
///
/// Boolean flags only ever switch a setting on; leaving one out keeps the
/// value from the environment or config file.
fn apply_cli_args_to_config(mut config: RunConfig, args: &Args) -> Result<RunConfig, AuditError> {
    if let Some(input) = &args.input {
        config.input_path = PathBuf::from(input);
    }
    if let Some(output) = &args.output {
        config.output_path = Some(PathBuf::from(output));
    }
    if let Some(error) = &args.error {
        config.error_path = Some(PathBuf::from(error));
    }
    if let Some(processes) = args.processes {
        config.process_count = processes;
    }
    if let Some(threads) = args.threads {
        config.max_threads_per_process = Concurrency::bounded(threads);
    }
    if args.unlock_threads_limit {
        config.max_threads_per_process = Concurrency::Unbounded;
    }
    if let Some(backend) = &args.backend {
        config.backend_id = backend.trim().to_string();
    }
    if let Some(timeout) = &args.timeout {
        config.timeout = parse_timeout(timeout)?;
    }
    if args.strict {
        config.strict = true;
    }
    if args.quiet {
        config.quiet = true;
    }
    Ok(config)
}

/// Arguments a worker needs to reproduce the parent's resolved settings.
///
/// Config files and `EA_*` variables are picked up again by the child from
/// the inherited environment and working directory.
fn worker_args(args: &Args, config: &RunConfig) -> Vec<String> {
    let mut argv = vec![
        "--id".to_string(),
        config.backend_id.clone(),
        "--timeout".to_string(),
        format!("{}s", config.timeout.as_secs().max(1)),
    ];

    if let Some(output) = &config.output_path {
        argv.push("--output".to_string());
        argv.push(output.display().to_string());
    }
    if let Some(error) = &config.error_path {
        argv.push("--error".to_string());
        argv.push(error.display().to_string());
    }
    match config.max_threads_per_process {
        Concurrency::Bounded(n) => {
            argv.push("--max-threads-per-process".to_string());
            argv.push(n.to_string());
        }
        Concurrency::Unbounded => argv.push("--unlock-threads-limit".to_string()),
    }
    if config.strict {
        argv.push("--strict".to_string());
    }
    if let Some(path) = &args.config {
        argv.push("--config".to_string());
        argv.push(path.clone());
    }
    if args.verbose {
        argv.push("--verbose".to_string());
    } else if config.quiet {
        argv.push("--quiet".to_string());
    }
    argv
}
