use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rfdlink_dispatch::Dispatcher;
use rfdlink_frame::{DecodeStats, DecoderConfig, FrameError, PacketReader};
use rfdlink_transport::LinkStream;
use tracing::{info, warn};

use crate::cmd::{decoder_config, open_endpoint, parse_duration, Endpoint, ListenArgs};
use crate::exit::{frame_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_packet, print_stats, OutputFormat};

/// How often a blocked read wakes up to check for Ctrl-C and idle timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

enum Session {
    /// The peer went away; a loopback listener may accept another.
    Disconnected,
    /// Stop listening with this exit code.
    Done(i32),
}

struct Listener {
    args: ListenArgs,
    format: OutputFormat,
    config: DecoderConfig,
    idle_timeout: Option<Duration>,
    running: Arc<AtomicBool>,
    dispatcher: Dispatcher,
    decode_totals: DecodeStats,
    printed: usize,
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_timeout = args
        .idle_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let endpoint = open_endpoint(&args.link, Some(POLL_INTERVAL))?;
    let mut listener = Listener {
        config: decoder_config(args.rescan),
        args,
        format,
        idle_timeout,
        running,
        dispatcher: Dispatcher::new(()),
        decode_totals: DecodeStats::default(),
        printed: 0,
    };

    let code = match endpoint {
        Endpoint::Link(link) => match listener.session(link)? {
            Session::Disconnected => SUCCESS,
            Session::Done(code) => code,
        },
        Endpoint::Listener(socket) => loop {
            if !listener.running.load(Ordering::SeqCst) {
                break SUCCESS;
            }
            let link = socket
                .accept()
                .map_err(|err| transport_error("accept failed", err))?;
            link.set_read_timeout(Some(POLL_INTERVAL))
                .map_err(|err| transport_error("configure failed", err))?;
            info!(port = %listener.args.link.port, "peer connected");

            match listener.session(link)? {
                Session::Disconnected => info!("peer disconnected, waiting for the next one"),
                Session::Done(code) => break code,
            }
        },
    };

    listener.finish();
    Ok(code)
}

impl Listener {
    fn session(&mut self, link: LinkStream) -> CliResult<Session> {
        let mut reader = PacketReader::with_config(link, self.config.clone());
        let result = self.receive(&mut reader);
        add_decode_stats(&mut self.decode_totals, &reader.stats());
        result
    }

    fn receive(&mut self, reader: &mut PacketReader<LinkStream>) -> CliResult<Session> {
        let mut last_packet = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let packet = match reader.read_packet() {
                Ok(packet) => packet,
                Err(FrameError::ConnectionClosed) => {
                    if reader.buffered() > 0 {
                        warn!(bytes = reader.buffered(), "link closed mid-frame");
                    }
                    return Ok(Session::Disconnected);
                }
                Err(FrameError::Io(err))
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    if let Some(limit) = self.idle_timeout {
                        if last_packet.elapsed() >= limit {
                            warn!(?limit, "no packets before idle timeout");
                            return Ok(Session::Done(TIMEOUT));
                        }
                    }
                    continue;
                }
                Err(err) => return Err(frame_error("receive failed", err)),
            };
            last_packet = Instant::now();

            let dispatch = self.dispatcher.dispatch(&packet);
            if let Some(types) = &self.args.types {
                if !types.contains(&packet.packet_type()) {
                    continue;
                }
            }

            print_packet(&packet, &dispatch, self.format);
            self.printed = self.printed.saturating_add(1);

            if let Some(count) = self.args.count {
                if self.printed >= count {
                    return Ok(Session::Done(SUCCESS));
                }
            }
        }

        Ok(Session::Done(SUCCESS))
    }

    fn finish(&mut self) {
        self.dispatcher.record_decode_stats(&self.decode_totals);
        let stats = self.dispatcher.stats();
        info!(
            packets = stats.packets,
            corrupt = stats.corrupt_frames,
            missed = stats.missed_packets,
            "listen finished"
        );
        print_stats(&stats, self.format);
    }
}

fn add_decode_stats(total: &mut DecodeStats, session: &DecodeStats) {
    total.packets += session.packets;
    total.corrupt_frames += session.corrupt_frames;
    total.discarded_bytes += session.discarded_bytes;
    total.overflow_bytes += session.overflow_bytes;
}

/// First Ctrl-C asks the loops to stop at the next poll; a second one exits
/// immediately (a loopback listener blocks in accept until a peer shows up).
pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if !running.swap(false, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
