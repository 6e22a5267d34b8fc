use std::fs;
use std::io::{Read, Write};
use std::time::Instant;

use bytes::Bytes;
use sockframe_frame::{FrameError, FramedChannel};

use crate::cmd::{open_channel, SendArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat, Reply};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let config = args.frame.into_config()?;
    let mut channel = open_channel(&args.endpoint, config)?;
    let peer = channel.get_ref().peer_label();

    let started = Instant::now();
    let reply =
        exchange(&mut channel, &payload, args.wait).map_err(|err| frame_error("send failed", err))?;

    if let Some(reply) = reply {
        print_reply(
            &Reply {
                payload: &reply,
                peer: &peer,
                elapsed: started.elapsed(),
            },
            format,
        );
    }

    tracing::debug!(size = payload.len(), %peer, "message sent");
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Send one message and, when asked, wait for the single reply.
fn exchange<T: Read + Write>(
    channel: &mut FramedChannel<T>,
    payload: &[u8],
    wait: bool,
) -> Result<Option<Bytes>, FrameError> {
    if wait {
        return channel.request(payload).map(Some);
    }
    channel.send(payload)?;
    Ok(None)
}
