//! Interactive request/reply session over one framed channel.
//!
//! The server speaks first with a greeting, the client answers with a single
//! introduction line (no reply expected), and from then on every input line
//! is one request answered by exactly one reply.

use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use sha2::{Digest, Sha256};
use sockframe_frame::FramedChannel;

use crate::exit::{frame_error, io_error, CliResult};
use crate::output::format_elapsed;

const SEND_COMMAND: &[u8] = b"send";

/// What a single input line asks for.
///
/// Lines are raw bytes: whatever the terminal encoding, text goes out as typed.
#[derive(Debug, PartialEq, Eq)]
enum Request<'a> {
    /// Send the line as-is.
    Text(&'a [u8]),
    /// Upload a file as `send <bytes>`.
    File(PathBuf),
    /// `send` without a path.
    MissingPath,
}

impl<'a> Request<'a> {
    fn parse(line: &'a [u8]) -> Self {
        let Some(rest) = line.strip_prefix(SEND_COMMAND) else {
            return Request::Text(line);
        };
        match rest {
            [] => Request::MissingPath,
            [b' ', path @ ..] => match path.trim_ascii() {
                [] => Request::MissingPath,
                path => Request::File(path_from_bytes(path)),
            },
            _ => Request::Text(line),
        }
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Requests answered by the server, not counting the introduction.
    pub requests: usize,
    /// `send` lines skipped because the file could not be read.
    pub skipped: usize,
}

pub struct Session<'a, T, O> {
    channel: &'a mut FramedChannel<T>,
    output: O,
    greeting: bool,
}

impl<'a, T: Read + Write, O: Write> Session<'a, T, O> {
    pub fn new(channel: &'a mut FramedChannel<T>, output: O) -> Self {
        Self {
            channel,
            output,
            greeting: true,
        }
    }

    /// Skip the greeting and introduction exchange.
    pub fn without_greeting(mut self) -> Self {
        self.greeting = false;
        self
    }

    /// Drive the session until `input` is exhausted.
    ///
    /// Channel failures end the session with an error; a `send` line naming
    /// an unreadable file is reported and skipped.
    pub fn run<I: BufRead>(mut self, mut input: I) -> CliResult<SessionSummary> {
        let mut summary = SessionSummary::default();

        if self.greeting {
            let greeting = self
                .channel
                .receive()
                .map_err(|err| frame_error("receive greeting failed", err))?;
            self.print_text(&greeting)?;

            let Some(introduction) = read_line(&mut input)? else {
                return Ok(summary);
            };
            self.channel
                .send(&introduction)
                .map_err(|err| frame_error("send introduction failed", err))?;
        }

        while let Some(line) = read_line(&mut input)? {
            let started = Instant::now();
            let message = match Request::parse(&line) {
                Request::Text(text) => text.to_vec(),
                Request::File(path) => match self.load_file(&path)? {
                    Some(message) => message,
                    None => {
                        summary.skipped += 1;
                        continue;
                    }
                },
                Request::MissingPath => {
                    self.print_line("usage: send <path>")?;
                    summary.skipped += 1;
                    continue;
                }
            };

            let reply = self
                .channel
                .request(&message)
                .map_err(|err| frame_error("request failed", err))?;
            self.print_text(&reply)?;
            self.print_line(&format_elapsed(started.elapsed()))?;
            summary.requests += 1;
        }

        tracing::debug!(
            requests = summary.requests,
            skipped = summary.skipped,
            "session finished"
        );
        Ok(summary)
    }

    /// Read a file and build the `send <bytes>` request, or report why not.
    fn load_file(&mut self, path: &Path) -> CliResult<Option<Vec<u8>>> {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(err) => {
                self.print_line(&format!("cannot read {}: {err}", path.display()))?;
                return Ok(None);
            }
        };

        let digest = Sha256::digest(&contents);
        self.print_line(&format!("{digest:x}  {}", path.display()))?;
        self.print_line("Sending...")?;

        let mut message = Vec::with_capacity(SEND_COMMAND.len() + 1 + contents.len());
        message.extend_from_slice(SEND_COMMAND);
        message.push(b' ');
        message.extend_from_slice(&contents);
        Ok(Some(message))
    }

    fn print_text(&mut self, bytes: &[u8]) -> CliResult<()> {
        self.print_line(&String::from_utf8_lossy(bytes))
    }

    fn print_line(&mut self, line: &str) -> CliResult<()> {
        writeln!(self.output, "{line}")
            .and_then(|()| self.output.flush())
            .map_err(|err| io_error("write output failed", err))
    }
}

/// Next line without its terminator, or `None` at end of input.
fn read_line<I: BufRead>(input: &mut I) -> CliResult<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let read = input
        .read_until(b'\n', &mut line)
        .map_err(|err| io_error("read input failed", err))?;
    if read == 0 {
        return Ok(None);
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    Ok(Some(line))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;
    use std::thread;

    use crate::exit::TRANSPORT_ERROR;

    fn temp_file(tag: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sockframe-session-{tag}-{}.bin",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_request_lines() {
        assert_eq!(Request::parse(b"hello"), Request::Text(b"hello"));
        assert_eq!(Request::parse(b""), Request::Text(b""));
        assert_eq!(Request::parse(b"sending"), Request::Text(b"sending"));
        assert_eq!(Request::parse(b"send"), Request::MissingPath);
        assert_eq!(Request::parse(b"send   "), Request::MissingPath);
        assert_eq!(
            Request::parse(b"send /tmp/a.bin"),
            Request::File(PathBuf::from("/tmp/a.bin"))
        );
    }

    #[test]
    fn non_utf8_paths_are_kept_byte_for_byte() {
        use std::os::unix::ffi::OsStrExt;

        let Request::File(path) = Request::parse(b"send /tmp/\xcf\xf0\xe8.bin") else {
            panic!("expected a file request");
        };
        assert_eq!(path.as_os_str().as_bytes(), b"/tmp/\xcf\xf0\xe8.bin");
    }

    #[test]
    fn read_line_strips_terminators() {
        let mut input = Cursor::new(&b"one\r\ntwo\n\xffthree"[..]);
        assert_eq!(read_line(&mut input).unwrap().as_deref(), Some(&b"one"[..]));
        assert_eq!(read_line(&mut input).unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(
            read_line(&mut input).unwrap().as_deref(),
            Some(&b"\xffthree"[..])
        );
        assert_eq!(read_line(&mut input).unwrap(), None);
    }

    #[test]
    fn non_utf8_lines_reach_the_server_verbatim() {
        let (client, server) = UnixStream::pair().unwrap();
        let server = thread::spawn(move || {
            let mut channel = FramedChannel::new(server);
            channel.send(b"hi").unwrap();
            assert_eq!(channel.receive().unwrap().as_ref(), b"\xcf\xf0\xe8");
            assert_eq!(channel.receive().unwrap().as_ref(), b"\xc4\xe0 \xff");
            channel.send(b"ok").unwrap();
        });

        let mut output = Vec::new();
        let mut channel = FramedChannel::new(client);
        let summary = Session::new(&mut channel, &mut output)
            .run(Cursor::new(&b"\xcf\xf0\xe8\n\xc4\xe0 \xff\n"[..]))
            .unwrap();
        server.join().unwrap();

        assert_eq!(summary.requests, 1);
        assert!(String::from_utf8(output).unwrap().starts_with("hi\nok\n"));
    }

    #[test]
    fn full_session_against_scripted_server() {
        let file_contents = vec![0xabu8; 10_000];
        let path = temp_file("full", &file_contents);
        let missing = std::env::temp_dir().join("sockframe-session-missing.bin");
        let _ = std::fs::remove_file(&missing);

        let (client, server) = UnixStream::pair().unwrap();
        let expected_upload = file_contents.clone();
        let server = thread::spawn(move || {
            let mut channel = FramedChannel::new(server);
            channel.send(b"Welcome, who are you?").unwrap();
            assert_eq!(channel.receive().unwrap().as_ref(), b"alice");

            assert_eq!(channel.receive().unwrap().as_ref(), b"hello");
            channel.send(b"HELLO").unwrap();

            let upload = channel.receive().unwrap();
            assert_eq!(&upload[..5], b"send ");
            assert_eq!(&upload[5..], expected_upload.as_slice());
            channel.send(b"stored 10000 bytes").unwrap();

            assert!(channel.receive().is_err());
        });

        let input = format!(
            "alice\nhello\nsend {}\nsend {}\nsend\n",
            missing.display(),
            path.display()
        );
        let mut output = Vec::new();
        let mut channel = FramedChannel::new(client);
        let summary = Session::new(&mut channel, &mut output)
            .run(Cursor::new(input))
            .unwrap();
        drop(channel);
        server.join().unwrap();

        assert_eq!(
            summary,
            SessionSummary {
                requests: 2,
                skipped: 2
            }
        );

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Welcome, who are you?");
        assert_eq!(lines[1], "HELLO");
        assert!(lines[2].ends_with(" s."), "{text}");
        assert!(lines[3].starts_with("cannot read "), "{text}");

        let digest = format!("{:x}", Sha256::digest(&file_contents));
        assert_eq!(lines[4], format!("{digest}  {}", path.display()));
        assert_eq!(lines[5], "Sending...");
        assert_eq!(lines[6], "stored 10000 bytes");
        assert!(lines[7].ends_with(" s."), "{text}");
        assert_eq!(lines[8], "usage: send <path>");
        assert_eq!(lines.len(), 9);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn no_greeting_starts_with_requests() {
        let (client, server) = UnixStream::pair().unwrap();
        let server = thread::spawn(move || {
            let mut channel = FramedChannel::new(server);
            let request = channel.receive().unwrap();
            channel.send(&request).unwrap();
        });

        let mut output = Vec::new();
        let mut channel = FramedChannel::new(client);
        let summary = Session::new(&mut channel, &mut output)
            .without_greeting()
            .run(Cursor::new("ping\n"))
            .unwrap();
        server.join().unwrap();

        assert_eq!(summary.requests, 1);
        assert!(String::from_utf8(output).unwrap().starts_with("ping\n"));
    }

    #[test]
    fn eof_before_introduction_ends_cleanly() {
        let (client, server) = UnixStream::pair().unwrap();
        let server = thread::spawn(move || {
            let mut channel = FramedChannel::new(server);
            channel.send(b"hi").unwrap();
        });

        let mut output = Vec::new();
        let mut channel = FramedChannel::new(client);
        let summary = Session::new(&mut channel, &mut output)
            .run(Cursor::new(""))
            .unwrap();
        server.join().unwrap();

        assert_eq!(summary, SessionSummary::default());
        assert_eq!(output, b"hi\n");
    }

    #[test]
    fn server_hangup_mid_session_is_an_error() {
        let (client, server) = UnixStream::pair().unwrap();
        let server = thread::spawn(move || {
            let mut channel = FramedChannel::new(server);
            channel.send(b"hi").unwrap();
            channel.receive().unwrap();
        });

        let mut output = Vec::new();
        let mut channel = FramedChannel::new(client);
        let err = Session::new(&mut channel, &mut output)
            .run(Cursor::new("bob\nquestion\n"))
            .unwrap_err();
        server.join().unwrap();

        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(channel.is_poisoned());
    }
}
