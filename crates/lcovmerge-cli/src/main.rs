//! lcovmerge merges LCOV tracefiles into a single canonical tracefile, summing counts for
//! repeated test/source pairs and rejecting inconsistent inputs.

use clap::{ArgAction, Parser};
use lcovmerge_adapters_fs::FsSourceReader;
use lcovmerge_app::{AppError, MergeOptions, merge_inputs};
use lcovmerge_config::{
    CliOverrides, ConfigError, EffectiveConfig, LogLevel, discover_config, load_config,
    resolve_config,
};
use lcovmerge_types::ErrorKind;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// lcovmerge merges LCOV tracefiles into a single canonical tracefile.
#[derive(Debug, Parser)]
#[command(name = "lcovmerge")]
#[command(about = "Merge LCOV tracefiles into a single canonical tracefile.")]
#[command(version)]
struct Cli {
    /// Tracefiles to merge, in order
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<String>,

    /// Ignore checksums in the inputs and drop them from the output
    #[arg(short = 'd', long)]
    discard_checksum: bool,

    /// Generate checksums for lines without one (with -d: for every line)
    #[arg(short = 'g', long)]
    generate_checksum: bool,

    /// Write the merged tracefile here instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Path to config file (default: auto-discover lcovmerge.toml)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory relative source paths are resolved against
    #[arg(short = 'r', long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long)]
    quiet: bool,
}

/// CLI errors
#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write to stdout: {0}")]
    Stdout(#[source] io::Error),

    #[error("{0}")]
    App(#[from] AppError),
}

impl CliError {
    /// Registry kind for errors that come with a remediation hint.
    fn kind(&self) -> Option<ErrorKind> {
        match self {
            CliError::Config(_) => None,
            CliError::FileWrite { .. } | CliError::Stdout(_) => Some(ErrorKind::Io),
            CliError::App(e) => Some(e.kind()),
        }
    }
}

/// Exit codes:
/// - 0: merged output written
/// - 1: parse, merge or I/O error
/// - 2: usage error (reported by clap)
const EXIT_CODE_ERROR: i32 = 1;

fn main() {
    let exit_code = match Cli::try_parse() {
        Ok(cli) => match run(cli) {
            Ok(()) => 0,
            Err(e) => {
                tracing::debug!(error = ?e, "merge failed");
                eprintln!("error: {}", e);
                if let Some(kind) = e.kind() {
                    eprintln!("hint: {}", kind.info().remediation);
                }
                EXIT_CODE_ERROR
            }
        },
        Err(clap_err) => clap_err.exit(),
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => Some(load_config(path)?),
        None => discover_config()?.map(|(_, config)| config),
    };
    let effective = resolve_config(config.as_ref(), &cli_overrides(&cli));
    init_logging(effective.log_level);
    tracing::debug!(?effective, "resolved configuration");

    let options = merge_options(&effective);
    let inputs = FsSourceReader::default();
    let sources = FsSourceReader::new(&effective.source_root);
    let outcome = merge_inputs(&cli.inputs, options, &inputs, sources)?;

    write_output(cli.output_file.as_deref(), &outcome.output)
}

fn cli_overrides(cli: &Cli) -> CliOverrides {
    CliOverrides {
        discard_checksum: cli.discard_checksum.then_some(true),
        generate_checksum: cli.generate_checksum.then_some(true),
        source_root: cli.root.clone(),
        log_level: verbosity_level(cli.verbose, cli.quiet),
    }
}

/// Log level requested on the command line, if any.
fn verbosity_level(verbose: u8, quiet: bool) -> Option<LogLevel> {
    if quiet {
        return Some(LogLevel::Error);
    }
    match verbose {
        0 => None,
        1 => Some(LogLevel::Info),
        2 => Some(LogLevel::Debug),
        _ => Some(LogLevel::Trace),
    }
}

fn merge_options(effective: &EffectiveConfig) -> MergeOptions {
    MergeOptions {
        discard_checksum: effective.discard_checksum,
        generate_checksum: effective.generate_checksum,
    }
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over `level`.
fn init_logging(level: LogLevel) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(level).into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Write the merged tracefile. A named file that fails mid-write is removed.
fn write_output(path: Option<&Path>, content: &str) -> Result<(), CliError> {
    let Some(path) = path else {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(content.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(CliError::Stdout)?;
        return Ok(());
    };

    if let Err(source) = fs::write(path, content) {
        if path.is_file() {
            let _ = fs::remove_file(path);
        }
        return Err(CliError::FileWrite {
            path: path.display().to_string(),
            source,
        });
    }
    tracing::info!(path = %path.display(), bytes = content.len(), "wrote merged tracefile");
    Ok(())
}
