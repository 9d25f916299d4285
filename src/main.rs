//! rmate - hand a local file to a remote TextMate-style editor
//!
//! Connects to an editor listening on a TCP port (typically through an SSH
//! tunnel), streams the file over, then sits on the connection rewriting the
//! file each time the editor saves, until the editor closes it.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use rmate::logger::{JsonlLogger, Logger, NoopLogger};
use rmate::net;
use rmate::protocol::{DEFAULT_HOST, DEFAULT_PORT, HOST_ENV, PORT_ENV};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Hand a file to a TextMate-style editor over TCP for remote editing"
)]
struct Args {
    /// File to hand to the editor
    file: PathBuf,

    /// Editor host (defaults to $RMATE_HOST, then localhost)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Editor port (defaults to $RMATE_PORT, then 52698)
    #[arg(short, long)]
    port: Option<u16>,

    /// Stay in the foreground until the editor closes the file
    #[arg(short, long)]
    wait: bool,

    /// Append JSONL session events to this file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Print session progress to stderr
    #[arg(long)]
    verbose: bool,
}

fn resolve_host(args: &Args) -> String {
    if let Some(h) = &args.host {
        return h.clone();
    }
    std::env::var(HOST_ENV)
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}

fn resolve_port(args: &Args) -> u16 {
    if let Some(p) = args.port {
        return p;
    }
    match std::env::var(PORT_ENV) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            eprintln!(
                "rmate: ignoring malformed {}={:?}, using {}",
                PORT_ENV, v, DEFAULT_PORT
            );
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    }
}

/// Detach into the background: the parent returns the shell prompt while the
/// child keeps the connection and services saves.
#[cfg(unix)]
fn daemonize() -> Result<()> {
    use anyhow::Context;

    // SAFETY: single-threaded at this point; the child continues alone
    unsafe {
        match libc::fork() {
            -1 => Err(std::io::Error::last_os_error()).context("fork"),
            0 => Ok(()),
            _ => std::process::exit(0),
        }
    }
}

#[cfg(not(unix))]
fn daemonize() -> Result<()> {
    // No fork here; stay in the foreground
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let host = resolve_host(&args);
    let port = resolve_port(&args);

    #[cfg(unix)]
    // SAFETY: plain disposition change, no handler installed
    unsafe {
        let _ = libc::signal(libc::SIGCHLD, libc::SIG_IGN);
    }

    // Fork before touching the network so the prompt returns immediately;
    // must also happen before ctrlc spawns its handler thread
    if !args.wait {
        daemonize()?;
    }

    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let logger: Arc<dyn Logger> = if let Some(ref p) = args.log_file {
        match JsonlLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(_) => Arc::new(NoopLogger),
        }
    } else {
        Arc::new(NoopLogger)
    };

    let mut stream = net::connect(&host, port)?;
    logger.session_start(&host, port);
    if args.verbose {
        eprintln!("rmate: connected to {}:{}", host, port);
    }

    let sent = net::send_open(&mut stream, &args.file)?;
    logger.open_sent(&args.file, sent);
    if args.verbose {
        eprintln!(
            "rmate: sent {} ({} bytes), waiting for the editor",
            args.file.display(),
            sent
        );
    }

    net::run(&mut stream, logger.as_ref())
}
