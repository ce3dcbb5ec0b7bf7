mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "vfuse", version, about = "Split-filesystem proxy")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use vfuse_transport::Endpoint;

    use super::*;
    use crate::cmd::ProbeOp;

    #[cfg(unix)]
    #[test]
    fn parses_share_subcommand() {
        let cli = Cli::try_parse_from([
            "vfuse",
            "share",
            "unix:/tmp/vfuse.sock",
            "--root",
            "/srv/data",
            "--read-only",
        ])
        .expect("share args should parse");

        match cli.command {
            Command::Share(args) => {
                assert_eq!(args.endpoint, Endpoint::Unix("/tmp/vfuse.sock".into()));
                assert!(args.read_only);
                assert_eq!(args.connect_timeout, "5s");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_probe_with_default_path() {
        let cli = Cli::try_parse_from(["vfuse", "probe", "7070", "ls", "--format", "json"])
            .expect("probe args should parse");
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Command::Probe(args) => {
                assert_eq!(args.op, ProbeOp::Ls);
                assert_eq!(args.path, ".");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_endpoint() {
        let err = Cli::try_parse_from(["vfuse", "probe", "unix:", "stat"])
            .expect_err("empty socket path should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_unknown_probe_op() {
        let err = Cli::try_parse_from(["vfuse", "probe", "7070", "format", "x"])
            .expect_err("unknown op should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
