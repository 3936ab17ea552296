use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use keycheck::config::{CliOverrides, Settings};
use keycheck::envfile::EnvFile;
use keycheck::init::{self, InitOutcome};
use keycheck::output::{self, Style};
use keycheck::probe::{self, ProbePlan};
use keycheck::providers::ProviderSpec;
use keycheck::scan::{self, ProcessEnv, ScanReport};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "keycheck",
    about = "Pre-flight checks for AI provider API keys",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the env file (default: ./.env)
    #[arg(long, global = true, env = "KEYCHECK_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Path to the config file (default: ./keycheck.toml when present)
    #[arg(long, global = true, env = "KEYCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "KEYCHECK_LOG")]
    log: String,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, global = true, env = "KEYCHECK_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log output format: compact or json
    #[arg(long, global = true, default_value = "compact", env = "KEYCHECK_LOG_FORMAT")]
    log_format: String,

    /// Suppress progress and informational output.
    ///
    /// Errors are still printed to stderr. JSON output (--json flags) is
    /// unaffected. Use this flag when piping output to other tools.
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Static scan of key configuration (default when no subcommand given).
    ///
    /// Resolves each provider's key from the process environment and the env
    /// file, classifies what it finds (ok, missing, placeholder, malformed,
    /// format quirk), and prints a scored table. Nothing leaves the machine.
    ///
    /// Exits non-zero unless every key is ok and the file parsed cleanly.
    ///
    /// Examples:
    ///   keycheck scan
    ///   keycheck
    ///   keycheck scan --json
    Scan {
        /// Emit the report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Verify plausible keys against the providers' live endpoints.
    ///
    /// Sends one cheap authenticated GET per provider (a whoami or models
    /// listing), all providers in parallel. Keys that fail the static checks
    /// are skipped and never transmitted.
    ///
    /// Exits non-zero if any probe fails, or if nothing could be probed.
    ///
    /// Examples:
    ///   keycheck probe
    ///   keycheck probe --provider openai
    ///   keycheck probe --timeout-secs 5 --json
    Probe {
        /// Emit the report as JSON on stdout
        #[arg(long)]
        json: bool,
        /// Probe only the named provider(s); accepts a name or an env var
        #[arg(long = "provider", value_name = "NAME")]
        providers: Vec<String>,
        /// Per-request timeout in seconds
        #[arg(long, env = "KEYCHECK_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,
    },
    /// Write a starter .env with placeholder entries.
    ///
    /// The template has one commented block per registered provider. The
    /// file is created owner-readable only and an existing file is never
    /// overwritten unless --force is given. When the target directory is a
    /// git work tree, .gitignore gains an entry for the file.
    ///
    /// Examples:
    ///   keycheck init
    ///   keycheck init --force
    ///   keycheck init --env-file conf/.env.local
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List registered providers.
    ///
    /// Shows the builtin registry plus any [[provider]] entries from
    /// keycheck.toml, in scan order.
    ///
    /// Examples:
    ///   keycheck providers
    ///   keycheck providers --json
    Providers {
        /// Emit the registry as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = setup_logging(&args.log, args.log_file.as_deref(), &args.log_format);

    let timeout_override = match &args.command {
        Some(Command::Probe { timeout_secs, .. }) => *timeout_secs,
        _ => None,
    };
    let overrides = CliOverrides {
        env_file: args.env_file.clone(),
        timeout_secs: timeout_override,
    };
    let settings = Settings::load(overrides, args.config.as_deref());

    match args.command.unwrap_or(Command::Scan { json: false }) {
        Command::Scan { json } => cmd_scan(&settings, json, args.quiet),
        Command::Probe {
            json, providers, ..
        } => cmd_probe(&settings, json, &providers, args.quiet).await,
        Command::Init { force } => cmd_init(&settings, force, args.quiet),
        Command::Providers { json } => cmd_providers(&settings, json),
    }
}

// ─── Subcommands ──────────────────────────────────────────────────────────────

fn cmd_scan(settings: &Settings, json: bool, quiet: bool) -> Result<()> {
    let report = run_scan(settings)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize the scan report")?
        );
    } else if !quiet {
        output::print_scan(&report, &Style::auto());
    }
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_scan(settings: &Settings) -> Result<ScanReport> {
    let path = &settings.env_file;
    let file = load_env_file(path)?;
    Ok(scan::scan(
        &settings.providers,
        path,
        file.as_ref(),
        &ProcessEnv,
        &settings.placeholder_extra,
    ))
}

/// A missing env file is a finding, not an error. An unreadable one aborts.
fn load_env_file(path: &Path) -> Result<Option<EnvFile>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(EnvFile::read(path)?))
}

async fn cmd_probe(
    settings: &Settings,
    json: bool,
    selectors: &[String],
    quiet: bool,
) -> Result<()> {
    let specs = select_providers(&settings.providers, selectors)?;
    let file = load_env_file(&settings.env_file)?;
    let plans = probe::plan_probes(
        &specs,
        file.as_ref(),
        &ProcessEnv,
        &settings.placeholder_extra,
    );
    let run_count = plans
        .iter()
        .filter(|p| matches!(p, ProbePlan::Run { .. }))
        .count();

    let timeout = Duration::from_secs(settings.timeout_secs);
    let client = probe::client(timeout).context("failed to build the HTTP client")?;

    let spinner = if !quiet && !json && std::io::stderr().is_terminal() {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        pb.set_message(format!("probing {run_count} provider(s)…"));
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    } else {
        None
    };

    let report = probe::probe_all(&client, plans, timeout).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize the probe report")?
        );
    } else if !quiet {
        output::print_probe(&report, &Style::auto());
    }
    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

/// Filter the registry by --provider selectors, keeping scan order. Every
/// selector must match something; a typo fails loudly instead of silently
/// probing nothing.
fn select_providers(specs: &[ProviderSpec], selectors: &[String]) -> Result<Vec<ProviderSpec>> {
    if selectors.is_empty() {
        return Ok(specs.to_vec());
    }
    for sel in selectors {
        if !specs.iter().any(|s| s.matches_selector(sel)) {
            let known = specs
                .iter()
                .map(|s| s.slug())
                .collect::<Vec<_>>()
                .join(", ");
            anyhow::bail!("unknown provider '{sel}' (known: {known})");
        }
    }
    Ok(specs
        .iter()
        .filter(|s| selectors.iter().any(|sel| s.matches_selector(sel)))
        .cloned()
        .collect())
}

fn cmd_init(settings: &Settings, force: bool, quiet: bool) -> Result<()> {
    let path = &settings.env_file;
    let outcome = init::write_template(path, &settings.providers, force)?;
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or(".env");
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let ignored = init::ensure_gitignored(&dir, file_name)?;

    if quiet {
        return Ok(());
    }
    match outcome {
        InitOutcome::Created => println!("created {}", path.display()),
        InitOutcome::Overwritten => println!("overwrote {}", path.display()),
        InitOutcome::SkippedExisting => {
            println!(
                "{} already exists; pass --force to overwrite it",
                path.display()
            );
        }
    }
    if ignored {
        println!("added {file_name} to {}", dir.join(".gitignore").display());
    }
    if outcome != InitOutcome::SkippedExisting {
        println!("fill in your keys, then run `keycheck scan`");
    }
    Ok(())
}

fn cmd_providers(settings: &Settings, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&settings.providers)
                .context("failed to serialize the provider registry")?
        );
    } else {
        output::print_providers(&settings.providers, &Style::auto());
    }
    Ok(())
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// Console logging goes to stderr so stdout stays clean for tables and
/// JSON. The returned guard must stay alive for the file writer to flush.
fn setup_logging(
    log_level: &str,
    log_file: Option<&Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("keycheck.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e}; logging to stderr only",
                dir.display()
            );
            init_console_logging(log_level, use_json);
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else {
        init_console_logging(log_level, use_json);
        None
    }
}

fn init_console_logging(log_level: &str, use_json: bool) {
    if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(log_level)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
