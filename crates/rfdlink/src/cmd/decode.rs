use std::io::Read;

use rfdlink_dispatch::Dispatcher;
use rfdlink_frame::{DecodeBuffer, TracingObserver};

use crate::cmd::{decoder_config, DecodeArgs};
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::hex;
use crate::output::{print_packet, print_stats, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let data = load_input(&args)?;

    let mut buffer = DecodeBuffer::with_config(decoder_config(args.rescan));
    let mut observer = TracingObserver;
    let mut dispatcher = Dispatcher::new(());

    // Feed in frame-sized pieces so the buffer cap behaves as it would on a
    // live link.
    for chunk in data.chunks(rfdlink_frame::MAX_FRAME_SIZE) {
        buffer.push(chunk, &mut observer);
        while let Some(packet) = buffer.decode_next(&mut observer) {
            let dispatch = dispatcher.dispatch(&packet);
            print_packet(&packet, &dispatch, format);
        }
    }

    if !buffer.is_empty() {
        tracing::warn!(bytes = buffer.len(), "input ends with an incomplete frame");
    }

    dispatcher.record_decode_stats(&buffer.stats());
    print_stats(&dispatcher.stats(), format);
    Ok(SUCCESS)
}

fn load_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(input) = &args.hex {
        return hex::parse(input)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid --hex input: {err}")));
    }
    if let Some(path) = &args.file {
        return std::fs::read(path)
            .map_err(|err| io_error(&format!("failed to read {}", path.display()), err));
    }

    let mut data = Vec::new();
    std::io::stdin()
        .read_to_end(&mut data)
        .map_err(|err| io_error("failed to read stdin", err))?;
    Ok(data)
}
