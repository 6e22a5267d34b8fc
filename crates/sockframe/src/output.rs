use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

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

/// A received reply together with where it came from and how long it took.
pub struct Reply<'a> {
    pub payload: &'a [u8],
    pub peer: &'a str,
    pub elapsed: Duration,
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    peer: &'a str,
    size: usize,
    payload: String,
    binary: bool,
    elapsed_ms: u128,
    timestamp: String,
}

pub fn print_reply(reply: &Reply<'_>, format: OutputFormat) {
    let mut out = std::io::stdout().lock();
    let _ = write_reply(&mut out, reply, format);
    let _ = out.flush();
}

pub fn write_reply<W: Write>(
    out: &mut W,
    reply: &Reply<'_>,
    format: OutputFormat,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Json => {
            let text = std::str::from_utf8(reply.payload).ok();
            let record = ReplyOutput {
                peer: reply.peer,
                size: reply.payload.len(),
                payload: payload_preview(reply.payload),
                binary: text.is_none(),
                elapsed_ms: reply.elapsed.as_millis(),
                timestamp: now_unix_seconds(),
            };
            let line = serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string());
            writeln!(out, "{line}")
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "SIZE", "ELAPSED", "PAYLOAD"])
                .add_row(vec![
                    reply.peer.to_string(),
                    reply.payload.len().to_string(),
                    format_elapsed(reply.elapsed),
                    payload_preview(reply.payload),
                ]);
            writeln!(out, "{table}")
        }
        OutputFormat::Pretty => writeln!(
            out,
            "peer={} size={} elapsed={} payload={}",
            reply.peer,
            reply.payload.len(),
            format_elapsed(reply.elapsed),
            payload_preview(reply.payload)
        ),
        OutputFormat::Raw => out.write_all(reply.payload),
    }
}

/// Seconds with millisecond precision, e.g. `0.042 s.`
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3} s.", elapsed.as_secs_f64())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
