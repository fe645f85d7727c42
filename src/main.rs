//! instrace: build schemas, transform crude traces, and inspect final traces.

use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use instrace::printer::{print_events, OutputFormat};
use instrace::trace::{DEFAULT_BLOCK_SIZE, DEFAULT_STAGING_LIMIT};
use instrace::{decode_with_config, transform, validate_trace, Schema, SchemaConfig, TraceConfig};

#[derive(Debug, Parser)]
#[command(name = "instrace")]
#[command(about = "Build, transform and inspect execution traces")]
#[command(version)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a schema from a JSON configuration and persist it
    Scheme {
        /// Schema configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Where to write the persisted schema
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Merge allocation begin/end pairs of a crude trace into a final trace
    Transform {
        /// Persisted schema
        #[arg(short, long)]
        scheme: PathBuf,

        /// Crude trace to read
        #[arg(long)]
        crude: PathBuf,

        /// Final trace to write
        #[arg(long = "final")]
        fin: PathBuf,

        /// I/O block size in bytes
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,

        /// Staging buffer size in bytes before the oldest allocation is evicted
        #[arg(long, default_value_t = DEFAULT_STAGING_LIMIT)]
        staging_limit: usize,
    },
    /// Print the records of a trace
    Print {
        /// Persisted schema
        #[arg(short, long)]
        scheme: PathBuf,

        /// Trace to print
        #[arg(short, long)]
        trace: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// I/O block size in bytes
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Check that a final trace decodes cleanly and is fully merged
    Validate {
        /// Persisted schema
        #[arg(short, long)]
        scheme: PathBuf,

        /// Trace to validate
        #[arg(short, long)]
        trace: PathBuf,

        /// I/O block size in bytes
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn load_schema(path: &Path) -> Result<Schema> {
    Schema::load(path).with_context(|| format!("Failed to load schema {}", path.display()))
}

fn run_scheme(config: &Path, output: &Path) -> Result<()> {
    let config = SchemaConfig::load(config)
        .with_context(|| format!("Failed to read schema config {}", config.display()))?;
    let schema = Schema::from_config(&config).context("Invalid schema config")?;
    schema
        .save(output)
        .with_context(|| format!("Failed to write schema {}", output.display()))?;
    info!(
        needs_transform = schema.needs_transform(),
        "Wrote schema to {}",
        output.display()
    );
    Ok(())
}

fn run_transform(scheme: &Path, crude: &Path, fin: &Path, config: &TraceConfig) -> Result<()> {
    let schema = load_schema(scheme)?;
    if !schema.needs_transform() {
        bail!("Schema does not record allocation object ids, the crude trace is already final");
    }

    match transform(&schema, crude, fin, config) {
        Ok(stats) => {
            if stats.evictions > 0 {
                warn!(
                    "{} allocation(s) were evicted and have no object id",
                    stats.evictions
                );
            }
            println!(
                "Transformed {} records into {} ({} allocations)",
                stats.records_in, stats.records_out, stats.allocations
            );
            Ok(())
        }
        Err(e) => {
            // A partial final trace is never valid.
            if let Err(rm) = fs::remove_file(fin) {
                if rm.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {rm}", fin.display());
                }
            }
            Err(e).with_context(|| format!("Failed to transform {}", crude.display()))
        }
    }
}

fn run_print(scheme: &Path, trace: &Path, format: Format, config: &TraceConfig) -> Result<()> {
    let schema = load_schema(scheme)?;
    let events = decode_with_config(&schema, trace, config)
        .with_context(|| format!("Failed to open {}", trace.display()))?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let count = print_events(events, &mut out, format.into())
        .with_context(|| format!("Failed to decode {}", trace.display()))?;
    info!("Printed {count} events");
    Ok(())
}

fn run_validate(scheme: &Path, trace: &Path, config: &TraceConfig) -> Result<()> {
    let schema = load_schema(scheme)?;
    let result = validate_trace(&schema, trace, config);

    for warning in &result.warnings {
        eprintln!("Warning: {warning}");
    }
    for error in &result.errors {
        eprintln!("Error: {error}");
    }
    if !result.is_valid() {
        bail!(
            "{} failed validation with {} error(s)",
            trace.display(),
            result.errors.len()
        );
    }
    println!("{}: {} events, valid", trace.display(), result.events);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scheme { config, output } => run_scheme(&config, &output),
        Commands::Transform {
            scheme,
            crude,
            fin,
            block_size,
            staging_limit,
        } => {
            let config = TraceConfig {
                block_size,
                staging_limit,
            };
            run_transform(&scheme, &crude, &fin, &config)
        }
        Commands::Print {
            scheme,
            trace,
            format,
            block_size,
        } => {
            let config = TraceConfig::default().with_block_size(block_size);
            run_print(&scheme, &trace, format, &config)
        }
        Commands::Validate {
            scheme,
            trace,
            block_size,
        } => {
            let config = TraceConfig::default().with_block_size(block_size);
            run_validate(&scheme, &trace, &config)
        }
    }
}
