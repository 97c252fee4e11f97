use rfdlink_dispatch::Message;
use rfdlink_frame::PacketWriter;
use tracing::info;

use crate::cmd::send::send_message;
use crate::cmd::{parse_duration, DemoArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_sent, OutputFormat};

/// Scripted traffic for checking a link end to end: one of each message
/// type, with motor commands covering forward, turn, reverse and stop.
pub fn script() -> Vec<Message> {
    vec![
        Message::Ping,
        Message::motor(0.75, 0.75),
        Message::motor(0.5, -0.5),
        Message::motor(-0.6, -0.6),
        Message::motor(0.0, 0.0),
        Message::text("Hello from Laptop!"),
        Message::text("Testing RFD-900x modem"),
        Message::sensor(25.5, 60.2, 1013.25),
    ]
}

pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let link = args.link.connect(None)?;
    let mut writer = PacketWriter::starting_at(link, args.sequence);
    let port = args.link.port.to_string();

    let script = script();
    for (index, message) in script.iter().enumerate() {
        if index > 0 {
            std::thread::sleep(interval);
        }
        let packet = send_message(&mut writer, message)?;
        print_sent(&port, message, &packet, format);
    }

    writer
        .flush()
        .map_err(|err| frame_error("flush failed", err))?;
    info!(sent = script.len(), next_sequence = writer.next_sequence(), "demo finished");
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use rfdlink_frame::packet_type::{MOTOR_COMMAND, PING, SENSOR_DATA, TEXT_MESSAGE};

    use super::*;

    #[test]
    fn script_covers_every_type_and_fits_a_frame() {
        let script = script();
        let types: Vec<u8> = script.iter().map(Message::packet_type).collect();
        assert_eq!(
            types,
            vec![
                PING,
                MOTOR_COMMAND,
                MOTOR_COMMAND,
                MOTOR_COMMAND,
                MOTOR_COMMAND,
                TEXT_MESSAGE,
                TEXT_MESSAGE,
                SENSOR_DATA
            ]
        );
        for (sequence, message) in script.iter().enumerate() {
            assert!(message.to_packet(sequence as u16).is_ok());
        }
    }
}
