//! Minimal echo server: accepts one peer, greets it, and echoes messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- connect unix:/tmp/sockframe-echo-<pid>/echo.sock

use std::fs;

use sockframe::frame::{FrameError, FramedChannel};
use sockframe::transport::{Endpoint, StreamListener};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("sockframe-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let endpoint = Endpoint::Unix(sock_dir.join("echo.sock"));

    let listener = StreamListener::bind(&endpoint)?;
    eprintln!("Listening on {endpoint}");

    let stream = listener.accept()?;
    eprintln!("Peer connected: {}", stream.peer_label());
    let mut channel = FramedChannel::new(stream);

    channel.send(b"Welcome! Introduce yourself.")?;
    let name = channel.receive()?;
    eprintln!("Peer says: {}", String::from_utf8_lossy(&name));

    loop {
        match channel.receive() {
            Ok(message) => {
                eprintln!("Received {} bytes", message.len());
                channel.send(&message)?;
            }
            Err(FrameError::EndOfStream { .. }) => {
                eprintln!("Peer disconnected");
                break;
            }
            Err(e) => {
                eprintln!("Peer failed: {e}");
                break;
            }
        }
    }

    drop(listener);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
