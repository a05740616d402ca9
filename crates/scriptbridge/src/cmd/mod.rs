use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use scriptbridge_wire::TypeTag;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod run;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve controller sessions on a Unix socket.
    Worker(WorkerArgs),
    /// Run code in a worker and print the result.
    Run(RunArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Worker(args) => worker::run(args),
        Command::Run(args) => run::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Socket path to bind.
    #[arg(env = "SCRIPTBRIDGE_SOCKET")]
    pub socket: PathBuf,
    /// Socket file permissions (octal).
    #[arg(long, default_value = "600", value_parser = parse_mode)]
    pub mode: u32,
    /// Exit after serving one session.
    #[arg(long)]
    pub once: bool,
    /// Blank-line separated segments are evaluated one at a time; set to
    /// evaluate the whole script at once.
    #[arg(long)]
    pub no_segments: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Worker socket to connect to. Without it, an in-process worker is used.
    #[arg(long, env = "SCRIPTBRIDGE_SOCKET")]
    pub socket: Option<PathBuf>,
    /// Code to run.
    #[arg(long, short = 'e')]
    pub code: String,
    /// Type to request the script's value as.
    #[arg(long, value_enum, default_value = "none")]
    pub result: ResultType,
    /// Collect console output produced by the script.
    #[arg(long)]
    pub console: bool,
    /// Capture graphics and write the image to this file.
    #[arg(long, value_name = "FILE")]
    pub plot: Option<PathBuf>,
    /// Plot width in pixels.
    #[arg(long, default_value = "480")]
    pub width: u32,
    /// Plot height in pixels.
    #[arg(long, default_value = "480")]
    pub height: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ResultType {
    Int,
    Float,
    Ints,
    Floats,
    String,
    None,
}

impl ResultType {
    pub fn tag(self) -> TypeTag {
        match self {
            ResultType::Int => TypeTag::INT32,
            ResultType::Float => TypeTag::FLOAT32,
            ResultType::Ints => TypeTag::INT32_VEC,
            ResultType::Floats => TypeTag::FLOAT32_VEC,
            ResultType::String => TypeTag::STRING,
            ResultType::None => TypeTag::VOID,
        }
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_mode(raw: &str) -> Result<u32, String> {
    let mode = u32::from_str_radix(raw.trim_start_matches("0o"), 8)
        .map_err(|err| format!("invalid octal mode '{raw}': {err}"))?;
    if mode > 0o777 {
        return Err(format!("mode '{raw}' is out of range"));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_octal_modes() {
        assert_eq!(parse_mode("600"), Ok(0o600));
        assert_eq!(parse_mode("0o660"), Ok(0o660));
        assert!(parse_mode("9").is_err());
        assert!(parse_mode("1777").is_err());
    }

    #[test]
    fn result_types_map_to_tags() {
        assert_eq!(ResultType::Floats.tag(), TypeTag::FLOAT32_VEC);
        assert!(ResultType::None.tag().is_void());
    }
}
