mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "scriptbridge",
    version,
    about = "Run scripts in a sandboxed worker process"
)]
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
    use std::path::PathBuf;

    use super::*;
    use crate::cmd::ResultType;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "scriptbridge",
            "run",
            "--code",
            "1 + 1",
            "--result",
            "int",
            "--plot",
            "/tmp/out.ppm",
            "--width",
            "200",
        ])
        .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.code, "1 + 1");
        assert_eq!(args.result, ResultType::Int);
        assert_eq!(args.plot, Some(PathBuf::from("/tmp/out.ppm")));
        assert_eq!((args.width, args.height), (200, 480));
    }

    #[test]
    fn run_requires_code() {
        let err = Cli::try_parse_from(["scriptbridge", "run", "--result", "int"])
            .expect_err("missing code should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_unknown_result_type() {
        let err = Cli::try_parse_from(["scriptbridge", "run", "--code", "1", "--result", "matrix"])
            .expect_err("unknown result type should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn parses_worker_subcommand() {
        let cli = Cli::try_parse_from(["scriptbridge", "worker", "/tmp/w.sock", "--once"])
            .expect("worker args should parse");
        let Command::Worker(args) = cli.command else {
            panic!("expected worker command");
        };
        assert!(args.once);
        assert_eq!(args.mode, 0o600);
    }
}
