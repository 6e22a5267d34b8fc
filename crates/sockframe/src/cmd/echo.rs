use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sockframe_frame::{FrameError, FramedChannel, HEADER_WIDTH};
use sockframe_transport::{StreamListener, TransportError};

use crate::cmd::EchoArgs;
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS};

/// How often a non-blocking accept re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

enum RecvErrorDisposition {
    /// The peer hung up between frames.
    Disconnected,
    /// The peer broke the stream; drop it and keep serving others.
    DropPeer(FrameError),
}

/// Why a peer's session ended.
#[derive(Debug, PartialEq, Eq)]
enum PeerOutcome {
    Disconnected,
    CountReached,
    Stopped,
}

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let config = args.frame.into_config()?;
    let listener =
        StreamListener::bind(&args.endpoint).map_err(|err| transport_error("bind failed", err))?;
    let local = listener
        .local_endpoint()
        .map_err(|err| transport_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| transport_error("bind failed", err))?;

    // Clients and tests read the bound endpoint (port 0 resolved) from stdout.
    let mut stdout = std::io::stdout();
    writeln!(stdout, "listening {local}")
        .and_then(|()| stdout.flush())
        .map_err(|err| io_error("write output failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut remaining = args.count;
    while running.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok(stream) => stream,
            Err(TransportError::Accept(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(transport_error("accept failed", err)),
        };
        let peer = stream.peer_label();
        tracing::info!(%peer, "peer connected");

        let mut channel = FramedChannel::from_stream(stream, config.clone())
            .map_err(|err| frame_error("accept failed", err))?;
        match serve_peer(
            &mut channel,
            args.greeting.as_deref(),
            &mut remaining,
            &running,
        ) {
            Ok(outcome) => {
                tracing::info!(%peer, ?outcome, "peer finished");
                if outcome == PeerOutcome::CountReached {
                    break;
                }
            }
            Err(err) => tracing::warn!(%peer, error = %err, "dropping peer"),
        }
    }

    Ok(SUCCESS)
}

/// Echo every message from one peer until it hangs up or the count runs out.
///
/// With a greeting, the greeting is sent first and the client's introduction
/// is consumed without a reply so the request/reply cadence stays aligned.
fn serve_peer<T: Read + Write>(
    channel: &mut FramedChannel<T>,
    greeting: Option<&str>,
    remaining: &mut Option<usize>,
    running: &AtomicBool,
) -> Result<PeerOutcome, FrameError> {
    if let Some(greeting) = greeting {
        channel.send(greeting.as_bytes())?;
        match channel.receive() {
            Ok(introduction) => tracing::info!(
                introduction = %String::from_utf8_lossy(&introduction),
                "peer introduced itself"
            ),
            Err(err) => return classify(err),
        }
    }

    while running.load(Ordering::SeqCst) {
        if *remaining == Some(0) {
            return Ok(PeerOutcome::CountReached);
        }
        let message = match channel.receive() {
            Ok(message) => message,
            Err(err) => return classify(err),
        };

        tracing::info!(size = message.len(), "echoing message");
        channel.send(&message)?;

        if let Some(left) = remaining.as_mut() {
            *left -= 1;
            if *left == 0 {
                return Ok(PeerOutcome::CountReached);
            }
        }
    }
    Ok(PeerOutcome::Stopped)
}

fn classify(err: FrameError) -> Result<PeerOutcome, FrameError> {
    match classify_recv_error(err) {
        RecvErrorDisposition::Disconnected => Ok(PeerOutcome::Disconnected),
        RecvErrorDisposition::DropPeer(err) => Err(err),
    }
}

fn classify_recv_error(err: FrameError) -> RecvErrorDisposition {
    match err {
        FrameError::EndOfStream {
            expected: HEADER_WIDTH,
            received: 0,
        } => RecvErrorDisposition::Disconnected,
        FrameError::Connection(io) if io.kind() == std::io::ErrorKind::ConnectionReset => {
            RecvErrorDisposition::Disconnected
        }
        other => RecvErrorDisposition::DropPeer(other),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        // A second interrupt while a peer is blocking the loop exits at once.
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
