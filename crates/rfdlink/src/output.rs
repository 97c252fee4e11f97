use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rfdlink_dispatch::{Dispatch, LinkStats, Message};
use rfdlink_frame::packet_type::type_name;
use rfdlink_frame::Packet;
use serde::Serialize;

use crate::hex;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    event: &'static str,
    sequence: u16,
    packet_type: u8,
    type_name: &'static str,
    payload_size: usize,
    gap: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    timestamp: String,
}

/// Print one received packet together with what the dispatcher made of it.
pub fn print_packet(packet: &Packet, dispatch: &Dispatch, format: OutputFormat) {
    let summary = match &dispatch.message {
        Ok(message) => message.to_string(),
        Err(err) => format!("<invalid: {err}>"),
    };

    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                event: "packet",
                sequence: dispatch.sequence,
                packet_type: dispatch.packet_type,
                type_name: type_name(dispatch.packet_type),
                payload_size: packet.payload().len(),
                gap: dispatch.gap,
                message: dispatch.message.as_ref().ok(),
                error: dispatch.message.as_ref().err().map(ToString::to_string),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "TYPE", "SIZE", "GAP", "MESSAGE"])
                .add_row(vec![
                    dispatch.sequence.to_string(),
                    type_name(dispatch.packet_type).to_string(),
                    packet.payload().len().to_string(),
                    dispatch.gap.to_string(),
                    summary,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let gap = if dispatch.gap > 0 {
                format!(" (missed {})", dispatch.gap)
            } else {
                String::new()
            };
            println!("#{} {}{gap}", dispatch.sequence, summary);
        }
        OutputFormat::Raw => {
            print_raw(packet.payload());
        }
    }
}

#[derive(Serialize)]
struct SentOutput<'a> {
    event: &'static str,
    port: &'a str,
    sequence: u16,
    packet_type: u8,
    type_name: &'static str,
    message: &'a Message,
    frame: String,
    frame_size: usize,
}

/// Print a frame that was just written to the link.
pub fn print_sent(port: &str, message: &Message, packet: &Packet, format: OutputFormat) {
    let frame = packet.to_frame();
    match format {
        OutputFormat::Json => {
            let out = SentOutput {
                event: "sent",
                port,
                sequence: packet.sequence(),
                packet_type: packet.packet_type(),
                type_name: type_name(packet.packet_type()),
                message,
                frame: hex::format_spaced(&frame),
                frame_size: frame.len(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "MESSAGE", "FRAME"])
                .add_row(vec![
                    packet.sequence().to_string(),
                    message.to_string(),
                    hex::format_spaced(&frame),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent #{} {} -> {}",
                packet.sequence(),
                message,
                hex::format_spaced(&frame)
            );
        }
        OutputFormat::Raw => {
            println!("{}", hex::format_spaced(&frame));
        }
    }
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    event: &'static str,
    #[serde(flatten)]
    stats: &'a LinkStats,
    success_rate: Option<f64>,
}

/// Print end-of-session link statistics.
pub fn print_stats(stats: &LinkStats, format: OutputFormat) {
    let rate = stats
        .success_rate()
        .map(|rate| format!("{rate:.1}%"))
        .unwrap_or_else(|| "n/a".to_string());

    match format {
        OutputFormat::Json => {
            let out = StatsOutput {
                event: "stats",
                stats,
                success_rate: stats.success_rate(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"]);
            for (name, value) in [
                ("packets received", stats.packets.to_string()),
                ("corrupt frames", stats.corrupt_frames.to_string()),
                ("discarded bytes", stats.discarded_bytes.to_string()),
                ("payload errors", stats.payload_errors.to_string()),
                ("unknown types", stats.unknown_packets.to_string()),
                ("missed packets", stats.missed_packets.to_string()),
                ("success rate", rate),
            ] {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "packets={} corrupt={} missed={} payload_errors={} success_rate={}",
                stats.packets,
                stats.corrupt_frames,
                stats.missed_packets,
                stats.payload_errors,
                rate
            );
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_output_flattens_counters() {
        let stats = LinkStats {
            packets: 3,
            corrupt_frames: 1,
            ..LinkStats::default()
        };
        let out = StatsOutput {
            event: "stats",
            stats: &stats,
            success_rate: stats.success_rate(),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["packets"], 3);
        assert_eq!(json["success_rate"], 75.0);
    }

    #[test]
    fn packet_output_carries_message_or_error() {
        let message = Message::text("hi");
        let out = PacketOutput {
            event: "packet",
            sequence: 1,
            packet_type: 2,
            type_name: "TEXT_MESSAGE",
            payload_size: 2,
            gap: 0,
            message: Some(&message),
            error: None,
            timestamp: "0".to_string(),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["message"]["text"], "hi");
        assert!(json.get("error").is_none());
    }
}
