//! Incremental parser for editor-initiated commands
//!
//! The editor talks back to us in line-oriented commands: a verb line
//! (`save`, `close`), then `name: value` header lines, terminated by a blank
//! or colon-free line. A `data: <N>` header is special: the next N bytes of
//! the stream are raw payload, and the stream returns to verb parsing right
//! after them. The parser accepts input in arbitrarily sized chunks and
//! buffers partial lines, so no split of the byte stream changes the result.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use crate::logger::Logger;
use crate::protocol::{header, verb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the peer's one-time banner line.
    Greeting,
    ExpectVerb,
    ExpectHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Unknown,
    Save,
    Close,
}

/// Parser state for the command currently being assembled.
///
/// Created once per connection and fed chunks by the session loop; between
/// calls it owns everything it needs (pending verb, token, partial line).
pub struct Session {
    state: State,
    cmd: CommandKind,
    token: Option<String>,
    line_buf: Vec<u8>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: State::Greeting,
            cmd: CommandKind::Unknown,
            token: None,
            line_buf: Vec::new(),
        }
    }

    /// Consume one chunk read off the connection. `stream` supplies payload
    /// bytes that extend beyond the chunk; after a payload the chunk cursor
    /// resynchronizes to whatever the receiver left unconsumed.
    pub fn feed<R: Read>(&mut self, chunk: &[u8], stream: &mut R, logger: &dyn Logger) -> Result<()> {
        let mut rest = chunk;
        while !rest.is_empty() {
            let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
                // Line continues in a later chunk
                self.line_buf.extend_from_slice(rest);
                return Ok(());
            };
            let carried;
            let line: &[u8] = if self.line_buf.is_empty() {
                &rest[..nl]
            } else {
                self.line_buf.extend_from_slice(&rest[..nl]);
                carried = std::mem::take(&mut self.line_buf);
                &carried
            };
            let line = strip_cr(line);
            rest = &rest[nl + 1..];

            if let Some(total) = self.handle_line(line, logger) {
                let consumed = self.receive_payload(rest, stream, total, logger)?;
                rest = &rest[consumed..];
                self.state = State::ExpectVerb;
            }
        }
        Ok(())
    }

    /// Process one complete line. Returns the declared payload length when a
    /// `data` header ends header parsing and raw payload begins.
    fn handle_line(&mut self, line: &[u8], logger: &dyn Logger) -> Option<u64> {
        match self.state {
            State::Greeting => {
                // Banner is discarded unconditionally, exactly once
                self.state = State::ExpectVerb;
                None
            }
            State::ExpectVerb => {
                if line.is_empty() {
                    // Stray blank between commands; keep waiting for a verb
                    return None;
                }
                self.token = None;
                self.cmd = if line == verb::SAVE.as_bytes() {
                    CommandKind::Save
                } else if line == verb::CLOSE.as_bytes() {
                    CommandKind::Close
                } else {
                    CommandKind::Unknown
                };
                self.state = State::ExpectHeader;
                None
            }
            State::ExpectHeader => {
                let Some((name, value)) = split_header(line) else {
                    // Blank or colon-free line ends this command's headers
                    if self.cmd == CommandKind::Close {
                        logger.close_received(self.token.as_deref().unwrap_or(""));
                    }
                    self.state = State::ExpectVerb;
                    return None;
                };
                if name == header::TOKEN.as_bytes() {
                    self.token = Some(String::from_utf8_lossy(value).into_owned());
                } else if name == header::DATA.as_bytes() {
                    match std::str::from_utf8(value).ok().and_then(|v| v.parse::<u64>().ok()) {
                        Some(n) => return Some(n),
                        None => {
                            // Unusable length; drop the command rather than guess
                            self.state = State::ExpectVerb;
                        }
                    }
                }
                None
            }
        }
    }

    /// Consume exactly `total` payload bytes: first from `prefix` (bytes of
    /// the current chunk that follow the `data` header line), then straight
    /// off the stream. Returns how many prefix bytes were taken; anything
    /// past that stays in the chunk for the next command.
    ///
    /// Local file failures degrade into a drain so the declared byte count
    /// still leaves the stream and framing survives for later commands.
    /// Stream errors and premature EOF are fatal to the session.
    fn receive_payload<R: Read>(
        &mut self,
        prefix: &[u8],
        stream: &mut R,
        total: u64,
        logger: &dyn Logger,
    ) -> Result<usize> {
        let take = std::cmp::min(prefix.len() as u64, total) as usize;
        let token = self.token.clone();

        let mut file: Option<File> = None;
        let mut local_err: Option<anyhow::Error> = None;
        if self.cmd == CommandKind::Save {
            match token.as_deref() {
                Some(tok) => match open_rewrite(Path::new(tok), total) {
                    Ok(f) => file = Some(f),
                    Err(e) => local_err = Some(e),
                },
                None => local_err = Some(anyhow!("data header with no preceding token")),
            }
        }

        if let Some(f) = file.as_mut() {
            if let Err(e) = f.write_all(&prefix[..take]) {
                local_err = Some(e.into());
                file = None;
            }
        }

        let mut remaining = total - take as u64;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let want = std::cmp::min(remaining, buf.len() as u64) as usize;
            let n = stream.read(&mut buf[..want]).context("read save payload")?;
            if n == 0 {
                anyhow::bail!(
                    "connection closed mid-payload ({} of {} bytes missing)",
                    remaining,
                    total
                );
            }
            if let Some(f) = file.as_mut() {
                if let Err(e) = f.write_all(&buf[..n]) {
                    local_err = Some(e.into());
                    file = None;
                }
            }
            remaining -= n as u64;
        }

        if local_err.is_none() {
            if let Some(f) = file.as_mut() {
                if let Err(e) = f.sync_all() {
                    local_err = Some(e.into());
                }
            }
        }

        let tok = token.as_deref().unwrap_or("<no token>");
        match local_err {
            None => {
                if self.cmd == CommandKind::Save {
                    logger.save_applied(tok, total);
                }
            }
            Some(e) => {
                eprintln!("rmate: save failed for {}: {:#}", tok, e);
                logger.payload_error(tok, &format!("{:#}", e));
            }
        }
        Ok(take)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the save target and resize it to the incoming length. The file must
/// already exist; a save always refers to a file this client handed over.
fn open_rewrite(path: &Path, total: u64) -> Result<File> {
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    f.set_len(total)
        .with_context(|| format!("resize {}", path.display()))?;
    Ok(f)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Split a header line at the first colon, stripping leading spaces from the
/// value. Returns None for blank or colon-free lines.
fn split_header(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name = &line[..colon];
    let mut value = &line[colon + 1..];
    while value.first() == Some(&b' ') {
        value = &value[1..];
    }
    Some((name, value))
}
