use rfdlink_dispatch::Message;
use rfdlink_frame::Packet;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::hex;
use crate::output::{print_sent, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = payload_from_args(&args)?;
    let packet = Packet::new(args.packet_type, args.sequence, payload)
        .map_err(|err| frame_error("encode failed", err))?;

    let message = Message::from_packet(&packet)
        .map_err(|err| CliError::new(DATA_INVALID, format!("payload does not fit its type: {err}")))?;

    print_sent("-", &message, &packet, format);
    Ok(SUCCESS)
}

fn payload_from_args(args: &EncodeArgs) -> CliResult<Vec<u8>> {
    if let Some(text) = &args.text {
        return Ok(text.as_bytes().to_vec());
    }
    if let Some(input) = &args.hex {
        return hex::parse(input)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid --hex payload: {err}")));
    }
    Ok(Vec::new())
}
