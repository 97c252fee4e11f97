use std::time::Duration;

use rfdlink_dispatch::{Dispatcher, LinkConfig, Message};
use rfdlink_transport::LinkStream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::cmd::{open_endpoint, ChatArgs, Endpoint};
use crate::exit::{dispatch_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_packet, print_sent, print_stats, OutputFormat};

const QUIT: &str = "/quit";

/// Stdin reads run on the blocking pool and cannot be cancelled.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

pub fn run(args: ChatArgs, format: OutputFormat) -> CliResult<i32> {
    let link = open_link(&args)?;
    let port = args.link.port.to_string();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;

    let result = runtime.block_on(chat(link, port, format));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

fn open_link(args: &ChatArgs) -> CliResult<LinkStream> {
    if !args.bind {
        return args.link.connect(None);
    }
    match open_endpoint(&args.link, None)? {
        Endpoint::Link(link) => Ok(link),
        Endpoint::Listener(socket) => {
            let link = socket
                .accept()
                .map_err(|err| transport_error("accept failed", err))?;
            info!(port = %args.link.port, "peer connected");
            Ok(link)
        }
    }
}

async fn chat(link: LinkStream, port: String, format: OutputFormat) -> CliResult<i32> {
    let (reader, writer) = link
        .into_async_split()
        .map_err(|err| transport_error("link setup failed", err))?;

    let config = LinkConfig::default();
    let (sender, send_task) = rfdlink_dispatch::spawn_sender(writer, &config);
    let (mut packets, recv_task) = rfdlink_dispatch::spawn_receiver(reader, &config);

    let mut dispatcher = Dispatcher::new(());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut peer_closed = false;

    info!(%port, "chat ready, type {QUIT} to leave");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.map_err(|err| CliError::new(INTERNAL, format!("stdin failed: {err}")))?;
                let Some(line) = line else { break };
                let line = line.trim_end();
                if line == QUIT {
                    break;
                }
                if line.is_empty() {
                    continue;
                }

                let message = Message::text(line);
                match sender.send(message.clone()).await {
                    Ok(sequence) => {
                        if let Ok(packet) = message.to_packet(sequence) {
                            print_sent(&port, &message, &packet, format);
                        }
                    }
                    Err(err) if err.is_fatal() => return Err(dispatch_error("send failed", err)),
                    Err(err) => warn!(error = %err, "message not sent"),
                }
            }
            packet = packets.recv() => {
                let Some(packet) = packet else {
                    info!("peer closed the link");
                    peer_closed = true;
                    break;
                };
                let dispatch = dispatcher.dispatch(&packet);
                print_packet(&packet, &dispatch, format);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    drop(sender);
    let next_sequence = send_task
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("send task failed: {err}")))?;
    info!(next_sequence, "chat finished");

    if !peer_closed {
        recv_task.abort();
    }
    let decode = recv_task
        .join()
        .await
        .map_err(|err| dispatch_error("receive failed", err))?;
    dispatcher.record_decode_stats(&decode);

    print_stats(&dispatcher.stats(), format);
    Ok(SUCCESS)
}
