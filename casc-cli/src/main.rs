//! `casc` - extract files from a local CASC archive
//!
//! ```text
//! casc <archive_dir> <mode> <identifier> [<output>]
//! ```
//!
//! Errors print as a single line on standard out and exit non-zero.

use std::fs::File;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::Level;

use casc_store::{CascKey, Container};

#[derive(Parser)]
#[command(
    name = "casc",
    about = "Extract files from a local CASC archive",
    version
)]
struct Cli {
    /// Path to the game installation directory
    archive_dir: PathBuf,

    /// How to interpret the identifier
    #[arg(value_enum)]
    mode: Mode,

    /// Storage key, content hash or filename, depending on the mode
    identifier: String,

    /// Output file; defaults to a name derived from the identifier
    output: Option<PathBuf>,

    /// Name of the data directory under the archive root
    #[arg(long, default_value = "Data")]
    data: String,

    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    /// 9-byte storage key, 18 hex digits
    Key,
    /// 16-byte content MD5, 32 hex digits
    Hash,
    /// Game-specific logical filename
    Filename,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    if let Err(e) = run(&cli) {
        println!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let container = Container::open(&cli.archive_dir, &cli.data)?;

    let mut stream = match cli.mode {
        Mode::Key => container.open_by_key(&CascKey::from_hex(&cli.identifier)?)?,
        Mode::Hash => container.open_by_hash(&CascKey::from_hex(&cli.identifier)?)?,
        Mode::Filename => container.open_by_name(&cli.identifier)?,
    };

    let output = cli.output.clone().unwrap_or_else(|| default_output(&cli.identifier));
    let mut file = File::create(&output)
        .map_err(|e| anyhow::anyhow!("cannot open {} for writing: {e}", output.display()))?;

    let copied = std::io::copy(&mut stream, &mut file)?;
    tracing::info!("wrote {copied} bytes to {}", output.display());

    Ok(())
}

/// Default output name: the final path component of the identifier.
fn default_output(identifier: &str) -> PathBuf {
    let name = identifier
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("casc.out");
    PathBuf::from(name)
}
