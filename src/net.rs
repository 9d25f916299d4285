//! TCP plumbing: connecting to the editor, the outbound `open` transfer,
//! and the blocking session loop.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

use crate::logger::Logger;
use crate::protocol::{self, header, verb};
use crate::session::Session;

/// Resolve `host:port` and connect to the first candidate address that
/// accepts, trying both address families in resolver order. No retries;
/// the caller decides whether to try the whole operation again.
pub fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let candidates = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("resolve {}:{}", host, port))?;
    let mut last_err = None;
    for addr in candidates {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => anyhow::Error::new(e).context(format!("connect {}:{}", host, port)),
        None => anyhow!("no addresses resolved for {}:{}", host, port),
    })
}

/// Emit the `open` command for a local file: header block, the file's exact
/// bytes, then the legacy `.` end marker the protocol carries for human
/// inspection (receivers rely on the declared length, never the marker).
/// Returns the payload byte count.
pub fn send_open<W: Write>(w: &mut W, path: &Path) -> Result<u64> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let size = file
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    let real = std::fs::canonicalize(path)
        .with_context(|| format!("canonicalize {}", path.display()))?;

    // The token is the path as given; the editor echoes it back on save so
    // we know which file to rewrite
    let mut head = Vec::with_capacity(256);
    writeln!(head, "{}", verb::OPEN)?;
    writeln!(head, "{}: {}", header::DISPLAY_NAME, path.display())?;
    writeln!(head, "{}: {}", header::REAL_PATH, real.display())?;
    writeln!(head, "{}: yes", header::DATA_ON_SAVE)?;
    writeln!(head, "{}: yes", header::RE_ACTIVATE)?;
    writeln!(head, "{}: {}", header::TOKEN, path.display())?;
    writeln!(head, "{}: {}", header::DATA, size)?;
    w.write_all(&head).context("send open header")?;

    let mut remaining = size;
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let want = std::cmp::min(remaining, buf.len() as u64) as usize;
        let n = file
            .read(&mut buf[..want])
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            anyhow::bail!(
                "{} shrank while sending ({} bytes short)",
                path.display(),
                remaining
            );
        }
        w.write_all(&buf[..n]).context("send open payload")?;
        remaining -= n as u64;
    }
    w.write_all(b"\n.\n").context("send open trailer")?;
    w.flush().context("flush open")?;
    Ok(size)
}

/// Blocking session loop: read bounded chunks and feed the parser until the
/// peer closes the connection or an unrecoverable I/O error occurs. The
/// parser owns all command state between reads.
pub fn run<S: Read>(stream: &mut S, logger: &dyn Logger) -> Result<()> {
    let mut session = Session::new();
    let mut buf = [0u8; protocol::READ_CHUNK];
    loop {
        let n = stream.read(&mut buf).context("read from editor")?;
        if n == 0 {
            logger.session_end();
            return Ok(());
        }
        session.feed(&buf[..n], stream, logger)?;
    }
}
