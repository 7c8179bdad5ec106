use std::time::Duration;

use clap::{Args, Subcommand};
use relayrpc_codec::Serialization;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the demo function set.
    Serve(ServeArgs),
    /// Call one function and print its result.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to bind: a socket path, unix://PATH or tcp://HOST:PORT.
    #[arg(env = "RELAYRPC_ENDPOINT")]
    pub endpoint: String,
    /// Refuse single-shot exchanges.
    #[arg(long)]
    pub persistent_only: bool,
    /// Serializations to accept (comma-separated).
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [Serialization::Tagged, Serialization::Json]
    )]
    pub serialization: Vec<Serialization>,
    /// Handshake timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub handshake_timeout: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Endpoint to connect to: a socket path, unix://PATH or tcp://HOST:PORT.
    pub endpoint: String,
    /// Function to call.
    pub function: String,
    /// Arguments as a JSON array; any other JSON value is a single argument.
    #[arg(long, value_name = "JSON")]
    pub args: Option<String>,
    /// Use a single-shot exchange instead of a persistent connection.
    #[arg(long)]
    pub single_shot: bool,
    /// Value serialization on the wire.
    #[arg(long, default_value = "tagged")]
    pub serialization: Serialization,
    /// Append a callback closure that returns its first argument.
    #[arg(long, conflicts_with = "single_shot")]
    pub callback: bool,
    /// Bound on connecting and on the call (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
