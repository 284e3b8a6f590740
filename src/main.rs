//! Talkback main entry point
//!
//! Speaks a JSON-lines protocol on stdio. Each stdin line is an inbound
//! event; every outbound event and device command is written to stdout as
//! one JSON object per line. The loop monitors two sources:
//! 1. stdin (inbound events from the UI, devices and transport)
//! 2. the orchestrator's timers (countdown ticks, jaw movements, subtitles)

use anyhow::Context;
use log::{debug, error, info, warn};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, BufRead, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use talkback::clock::SystemClock;
use talkback::config::Config;
use talkback::devices::{CommandQueue, QueuedCapture, QueuedSynth};
use talkback::events::InboundEvent;
use talkback::Orchestrator;

/// Token for stdin in mio poll
const STDIN: Token = Token(0);

/// Longest the loop sleeps without checking timers
const MAX_WAIT: Duration = Duration::from_millis(100);

/// Larger than stdin's internal buffer, so reads bypass it and readiness
/// stays in sync with what we have consumed
const READ_BUF: usize = 64 * 1024;

struct Args {
    debug: bool,
    config: Option<PathBuf>,
    no_capture: bool,
    no_synth: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        debug: false,
        config: None,
        no_capture: false,
        no_synth: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--debug" | "-d" => args.debug = true,
            "--config" | "-c" => args.config = iter.next().map(PathBuf::from),
            "--no-capture" => args.no_capture = true,
            "--no-synth" => args.no_synth = true,
            other => eprintln!("Warning: ignoring unknown argument {}", other),
        }
    }
    args
}

fn main() {
    let args = parse_args();

    // Initialize logger
    if args.debug {
        // Debug mode: write to talkback.log file
        use std::fs::OpenOptions;
        match OpenOptions::new().create(true).append(true).open("talkback.log") {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open talkback.log for debug logging: {}", e);
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "Talkback version {} starting (debug mode, logging to talkback.log)",
            talkback::VERSION
        );
    } else {
        // Normal mode: stdout carries the protocol, so only errors go to stderr
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Error)
            .init();
    }

    if let Err(e) = run(&args) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path.clone()),
        None => Config::load(),
    }
    .context("loading configuration")?;
    info!("Configuration loaded from {:?}", config.path());

    let commands = CommandQueue::new();
    let mut orch = Orchestrator::new(
        SystemClock::new(),
        config.orchestrator_config(),
        Box::new(QueuedCapture::new(commands.clone(), !args.no_capture)),
        Box::new(QueuedSynth::new(commands.clone(), !args.no_synth)),
    );

    // Regular files and some terminals cannot be registered with epoll;
    // those fall back to blocking line reads
    let stdin_fd = io::stdin().as_raw_fd();
    let mut mio_poll = match Poll::new().and_then(|poll| {
        poll.registry()
            .register(&mut mio::unix::SourceFd(&stdin_fd), STDIN, Interest::READABLE)?;
        Ok(poll)
    }) {
        Ok(poll) => {
            debug!("Using mio::Poll for event loop");
            Some((poll, Events::with_capacity(16)))
        }
        Err(e) => {
            debug!("stdin not pollable ({}), using blocking reads", e);
            None
        }
    };

    let mut out = io::stdout().lock();
    let mut pending = String::new();
    let mut stdin_open = true;
    let mut buf = vec![0u8; READ_BUF];

    info!("Talkback ready - entering event loop");

    loop {
        orch.run_scheduled();
        flush(&mut orch, &commands, &mut out)?;

        if !stdin_open && orch.timers().is_empty() {
            break;
        }

        let timeout = orch
            .time_until_next_scheduled()
            .map(|d| d.min(MAX_WAIT))
            .unwrap_or(MAX_WAIT);

        if !stdin_open {
            std::thread::sleep(timeout);
            continue;
        }

        if let Some((ref mut poll, ref mut events)) = mio_poll {
            match poll.poll(events, Some(timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    debug!("poll interrupted by signal");
                    continue;
                }
                Err(e) => return Err(e).context("polling stdin"),
            }

            for event in events.iter() {
                if event.token() != STDIN {
                    continue;
                }
                let n = match io::stdin().lock().read(&mut buf) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e).context("reading stdin"),
                };
                if n == 0 {
                    info!("stdin closed");
                    stdin_open = false;
                    let _ = poll.registry().deregister(&mut mio::unix::SourceFd(&stdin_fd));
                    if !pending.trim().is_empty() {
                        dispatch_line(&mut orch, &pending);
                    }
                    pending.clear();
                    break;
                }
                pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                while let Some(pos) = pending.find('\n') {
                    let line: String = pending.drain(..=pos).collect();
                    dispatch_line(&mut orch, &line);
                }
            }
        } else {
            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line).context("reading stdin")? == 0 {
                info!("stdin closed");
                stdin_open = false;
            } else {
                dispatch_line(&mut orch, &line);
            }
        }
    }

    orch.destroy();
    flush(&mut orch, &commands, &mut out)?;
    info!("Talkback exiting");
    Ok(())
}

/// Parse one protocol line and hand it to the orchestrator
fn dispatch_line(orch: &mut Orchestrator<SystemClock>, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<InboundEvent>(line) {
        Ok(event) => orch.handle(event),
        Err(e) => warn!("Ignoring malformed event {:?}: {}", line, e),
    }
}

/// Write pending events and device commands as JSON lines
fn flush<W: Write>(orch: &mut Orchestrator<SystemClock>, commands: &CommandQueue, out: &mut W) -> anyhow::Result<()> {
    let events = orch.drain_events();
    let cmds = commands.drain();
    if events.is_empty() && cmds.is_empty() {
        return Ok(());
    }
    for event in &events {
        serde_json::to_writer(&mut *out, event)?;
        out.write_all(b"\n")?;
    }
    for cmd in &cmds {
        serde_json::to_writer(&mut *out, cmd)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    if let Some(frame) = orch.render_frame() {
        if let Some(latest) = frame.first() {
            debug!("Jaw {} on {:?} at {:.1}ms", latest.direction, latest.word, latest.at_ms);
        }
    }
    Ok(())
}
