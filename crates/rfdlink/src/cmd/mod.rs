use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use rfdlink_dispatch::Message;
use rfdlink_frame::packet_type::{MOTOR_COMMAND, PING, SENSOR_DATA, TEXT_MESSAGE};
use rfdlink_frame::{DecoderConfig, ResyncPolicy};
use rfdlink_transport::{open_port, LinkStream, LoopbackSocket, PortSpec, SerialConfig, DEFAULT_BAUD};
use tracing::info;

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod chat;
pub mod decode;
pub mod demo;
pub mod doctor;
pub mod encode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message (optionally repeated) over a link.
    Send(SendArgs),
    /// Receive, decode and print packets until stopped.
    Listen(ListenArgs),
    /// Send the scripted test sequence: ping, motor, text, sensor.
    Demo(DemoArgs),
    /// Interactive text chat over a link.
    Chat(ChatArgs),
    /// Encode one frame offline and print it as hex.
    Encode(EncodeArgs),
    /// Decode a captured byte stream offline.
    Decode(DecodeArgs),
    /// Find candidate serial ports and check permissions.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Demo(args) => demo::run(args, format),
        Command::Chat(args) => chat::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the link is and how to talk to it.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial device (e.g. /dev/ttyUSB0) or `unix:/path/to.sock` for a loopback link.
    #[arg(env = "RFDLINK_PORT")]
    pub port: PortSpec,
    /// Serial line rate.
    #[arg(long, env = "RFDLINK_BAUD", default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
}

impl LinkArgs {
    pub fn serial_config(&self, read_timeout: Option<Duration>) -> SerialConfig {
        SerialConfig {
            baud: self.baud,
            read_timeout,
            write_timeout: None,
        }
    }

    /// Open the link as the initiating side: serial devices are opened,
    /// loopback sockets are connected to.
    pub fn connect(&self, read_timeout: Option<Duration>) -> CliResult<LinkStream> {
        let link = open_port(&self.port, &self.serial_config(read_timeout))
            .map_err(|err| transport_error(&format!("failed to open {}", self.port), err))?;
        info!(port = %self.port, kind = link.kind(), baud = self.baud, "link open");
        Ok(link)
    }
}

/// Either an opened serial device or a bound loopback socket waiting for a
/// peer.
pub enum Endpoint {
    Link(LinkStream),
    Listener(LoopbackSocket),
}

/// Open the link as the waiting side: loopback sockets are bound instead of
/// connected to.
pub fn open_endpoint(args: &LinkArgs, read_timeout: Option<Duration>) -> CliResult<Endpoint> {
    match &args.port {
        PortSpec::Unix(path) => {
            let listener = LoopbackSocket::bind(path)
                .map_err(|err| transport_error(&format!("failed to bind {}", args.port), err))?;
            info!(port = %args.port, "waiting for loopback peer");
            Ok(Endpoint::Listener(listener))
        }
        PortSpec::Serial(_) => args.connect(read_timeout).map(Endpoint::Link),
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum MessageArgs {
    /// Liveness check.
    Ping,
    /// Left and right drive speeds.
    Motor {
        #[arg(allow_negative_numbers = true)]
        left: f32,
        #[arg(allow_negative_numbers = true)]
        right: f32,
    },
    /// UTF-8 text.
    Text { text: String },
    /// Temperature (C), humidity (%) and pressure (hPa).
    Sensor {
        #[arg(allow_negative_numbers = true)]
        temperature: f32,
        humidity: f32,
        pressure: f32,
    },
}

impl MessageArgs {
    pub fn to_message(&self) -> Message {
        match self {
            MessageArgs::Ping => Message::Ping,
            MessageArgs::Motor { left, right } => Message::motor(*left, *right),
            MessageArgs::Text { text } => Message::text(text.clone()),
            MessageArgs::Sensor {
                temperature,
                humidity,
                pressure,
            } => Message::sensor(*temperature, *humidity, *pressure),
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Sequence number of the first frame.
    #[arg(long, default_value_t = 0)]
    pub sequence: u16,
    /// Send the message this many times.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
    /// Pause between repeats (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    #[command(subcommand)]
    pub message: MessageArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Only print these packet types (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub types: Option<Vec<u8>>,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up after this long without a packet (e.g. 30s).
    #[arg(long)]
    pub idle_timeout: Option<String>,
    /// After a checksum mismatch, rescan from the next byte instead of
    /// skipping the declared frame length.
    #[arg(long)]
    pub rescan: bool,
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Pause between messages.
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Sequence number of the first frame.
    #[arg(long, default_value_t = 0)]
    pub sequence: u16,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// For loopback links: bind the socket and wait for the other side.
    #[arg(long)]
    pub bind: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Packet type: ping, motor, text, sensor or a number 0-255.
    #[arg(value_parser = parse_packet_type)]
    pub packet_type: u8,
    /// Sequence number.
    #[arg(long, default_value_t = 0)]
    pub sequence: u16,
    /// Text payload.
    #[arg(long, conflicts_with = "hex")]
    pub text: Option<String>,
    /// Hex payload (e.g. "3f400000 bf000000").
    #[arg(long, conflicts_with = "text")]
    pub hex: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Read captured bytes from a file.
    #[arg(long, conflicts_with = "hex")]
    pub file: Option<PathBuf>,
    /// Captured bytes as hex. Reads stdin when neither is given.
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,
    /// After a checksum mismatch, rescan from the next byte.
    #[arg(long)]
    pub rescan: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    /// Also inspect this device.
    #[arg(long, env = "RFDLINK_PORT")]
    pub port: Option<PortSpec>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn decoder_config(rescan: bool) -> DecoderConfig {
    DecoderConfig {
        resync: if rescan {
            ResyncPolicy::RescanAfterSof
        } else {
            ResyncPolicy::SkipDeclared
        },
        ..DecoderConfig::default()
    }
}

pub fn parse_packet_type(input: &str) -> Result<u8, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "ping" => Ok(PING),
        "motor" | "motor_command" => Ok(MOTOR_COMMAND),
        "text" | "text_message" => Ok(TEXT_MESSAGE),
        "sensor" | "sensor_data" => Ok(SENSOR_DATA),
        other => other
            .parse::<u8>()
            .map_err(|_| format!("unknown packet type {input:?}")),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn packet_type_names_and_numbers() {
        assert_eq!(parse_packet_type("motor"), Ok(MOTOR_COMMAND));
        assert_eq!(parse_packet_type("SENSOR"), Ok(SENSOR_DATA));
        assert_eq!(parse_packet_type("200"), Ok(200));
        assert!(parse_packet_type("256").is_err());
        assert!(parse_packet_type("warp").is_err());
    }

    #[test]
    fn message_args_build_messages() {
        let args = MessageArgs::Motor {
            left: 0.75,
            right: -0.5,
        };
        assert_eq!(args.to_message(), Message::motor(0.75, -0.5));
        assert_eq!(MessageArgs::Ping.to_message(), Message::Ping);
    }

    #[test]
    fn rescan_flag_selects_policy() {
        assert_eq!(decoder_config(true).resync, ResyncPolicy::RescanAfterSof);
        assert_eq!(decoder_config(false).resync, ResyncPolicy::SkipDeclared);
    }
}
