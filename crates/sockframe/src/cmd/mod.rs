use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use sockframe_frame::{ByteOrder, FrameConfig, FramedChannel, CHUNK_CAPACITY};
use sockframe_transport::{Endpoint, PeerStream};

use crate::exit::{frame_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod echo;
pub mod send;
pub mod version;

pub const ENDPOINT_ENV: &str = "SOCKFRAME_ENDPOINT";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an interactive session: greeting, introduction, then requests from stdin.
    Connect(ConnectArgs),
    /// Send a single message.
    Send(SendArgs),
    /// Start an echo server.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Connect(args) => connect::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Echo(args) => echo::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Header byte order as accepted on the command line.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ByteOrderArg {
    #[default]
    Native,
    Little,
    Big,
}

impl From<ByteOrderArg> for ByteOrder {
    fn from(arg: ByteOrderArg) -> Self {
        match arg {
            ByteOrderArg::Native => ByteOrder::Native,
            ByteOrderArg::Little => ByteOrder::Little,
            ByteOrderArg::Big => ByteOrder::Big,
        }
    }
}

/// Framing options shared by every command that opens a channel.
#[derive(Args, Debug, Clone)]
pub struct FrameArgs {
    /// Byte order of the 8-byte size header.
    #[arg(long, value_enum, default_value = "native")]
    pub byte_order: ByteOrderArg,
    /// Chunk capacity in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = CHUNK_CAPACITY)]
    pub chunk_size: usize,
    /// Reject messages larger than this many bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_message_size: Option<usize>,
    /// Read timeout (e.g. 5s, 500ms). Default: block forever.
    #[arg(long, value_name = "DURATION")]
    pub read_timeout: Option<String>,
    /// Write timeout (e.g. 5s, 500ms). Default: block forever.
    #[arg(long, value_name = "DURATION")]
    pub write_timeout: Option<String>,
}

impl FrameArgs {
    pub fn into_config(self) -> CliResult<FrameConfig> {
        let config = FrameConfig {
            byte_order: self.byte_order.into(),
            chunk_capacity: self.chunk_size,
            max_message_size: self.max_message_size,
            read_timeout: self.read_timeout.as_deref().map(parse_duration).transpose()?,
            write_timeout: self.write_timeout.as_deref().map(parse_duration).transpose()?,
        };
        config
            .validate()
            .map_err(|err| frame_error("invalid framing options", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server endpoint (host:port or unix:/path).
    #[arg(env = ENDPOINT_ENV)]
    pub endpoint: Endpoint,
    /// Skip the greeting and introduction exchange.
    #[arg(long)]
    pub no_greeting: bool,
    #[command(flatten)]
    pub frame: FrameArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server endpoint (host:port or unix:/path).
    #[arg(env = ENDPOINT_ENV)]
    pub endpoint: Endpoint,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    #[command(flatten)]
    pub frame: FrameArgs,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Endpoint to bind (host:port or unix:/path). Port 0 picks a free port.
    pub endpoint: Endpoint,
    /// Send this greeting on accept and consume the client's introduction.
    #[arg(long)]
    pub greeting: Option<String>,
    /// Exit after echoing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub frame: FrameArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect and wrap the stream in a channel with `config` applied.
pub fn open_channel(
    endpoint: &Endpoint,
    config: FrameConfig,
) -> CliResult<FramedChannel<PeerStream>> {
    let stream =
        PeerStream::connect(endpoint).map_err(|err| transport_error("connect failed", err))?;
    tracing::debug!(peer = %stream.peer_label(), "connected");
    FramedChannel::from_stream(stream, config).map_err(|err| frame_error("connect failed", err))
}

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
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
