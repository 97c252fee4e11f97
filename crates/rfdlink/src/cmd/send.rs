use rfdlink_dispatch::Message;
use rfdlink_frame::{Packet, PacketWriter};
use rfdlink_transport::LinkStream;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.repeat == 0 {
        return Err(CliError::new(USAGE, "--repeat must be at least 1"));
    }
    let interval = parse_duration(&args.interval)?;

    let message = args.message.to_message();
    let link = args.link.connect(None)?;
    let mut writer = PacketWriter::starting_at(link, args.sequence);
    let port = args.link.port.to_string();

    for round in 0..args.repeat {
        if round > 0 {
            std::thread::sleep(interval);
        }
        let packet = send_message(&mut writer, &message)?;
        print_sent(&port, &message, &packet, format);
    }

    writer
        .flush()
        .map_err(|err| frame_error("flush failed", err))?;
    Ok(SUCCESS)
}

/// Write `message` with the writer's next sequence number and return the
/// packet as it went out.
pub(crate) fn send_message(
    writer: &mut PacketWriter<LinkStream>,
    message: &Message,
) -> CliResult<Packet> {
    let payload = message.to_payload();
    let sequence = writer
        .send(message.packet_type(), &payload)
        .map_err(|err| frame_error("send failed", err))?;
    Packet::new(message.packet_type(), sequence, payload)
        .map_err(|err| frame_error("send failed", err))
}
