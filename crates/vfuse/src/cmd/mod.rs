use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use vfuse_transport::Endpoint;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod probe;
#[cfg(unix)]
pub mod share;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Share a directory: dial the initiator and answer its requests.
    #[cfg(unix)]
    Share(ShareArgs),
    /// Wait for a responder, run one operation against it and print the result.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        #[cfg(unix)]
        Command::Share(args) => share::run(args),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ShareArgs {
    /// Initiator endpoint to dial (unix:/path, host:port or a bare port).
    pub endpoint: Endpoint,
    /// Directory to share.
    #[arg(long, env = "VFUSE_ROOT", value_name = "DIR")]
    pub root: PathBuf,
    /// Refuse every operation that would modify the directory.
    #[arg(long)]
    pub read_only: bool,
    /// How long to keep retrying while the initiator is not listening (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProbeOp {
    /// Attributes of the path.
    Stat,
    /// Directory listing.
    Ls,
    /// Symlink target.
    Readlink,
    /// File contents.
    Cat,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Endpoint to listen on for the responder.
    pub endpoint: Endpoint,
    /// Operation to run.
    pub op: ProbeOp,
    /// Path relative to the shared root.
    #[arg(default_value = ".")]
    pub path: String,
    /// Per-call deadline (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
