//! headterm - run a command inside a headless terminal
//!
//! The command runs behind a real pseudo-terminal with the emulator
//! answering its queries. When it exits (or the timeout expires) the final
//! screen is printed as plain text.
//!
//! # Quick Start
//!
//! ```text
//! headterm -c 'ls --color=always'       # Run through /bin/sh -c
//! headterm --cols 132 --rows 50 -c top  # Bigger screen
//! headterm --shell /bin/bash            # Interactive shell, ends on timeout
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use headterm::{Config, ProcessExit, SessionEvent, SessionManager};

/// Exit status used when the command outlives `--timeout`
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Command line arguments
struct Args {
    cols: Option<u16>,
    rows: Option<u16>,
    /// Shell used to run `command`, or run interactively without one
    shell: Option<String>,
    command: Option<String>,
    timeout: Duration,
    config: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            cols: None,
            rows: None,
            shell: None,
            command: None,
            timeout: Duration::from_secs(10),
            config: None,
        }
    }
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("headterm {}", VERSION);
}

fn print_help() {
    eprintln!("headterm {} - run a command in a headless terminal", VERSION);
    eprintln!();
    eprintln!("Usage: headterm [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c <COMMAND>          Command to run through the shell");
    eprintln!("  -s, --shell <PROGRAM> Shell program (default: config or /bin/sh)");
    eprintln!("  --cols <N>            Terminal width");
    eprintln!("  --rows <N>            Terminal height");
    eprintln!("  -t, --timeout <SECS>  Give up waiting after SECS seconds (default: 10)");
    eprintln!("  --config <PATH>       Read configuration from PATH");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Configuration: ~/.headterm/config.toml");
    eprintln!("Log file:      ~/.headterm/headterm.log (filter with HEADTERM_LOG)");
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-c" => {
                parsed.command = Some(next_value(&args, &mut i, "-c")?.to_string());
            }
            "-s" | "--shell" => {
                parsed.shell = Some(next_value(&args, &mut i, "--shell")?.to_string());
            }
            "--cols" => {
                parsed.cols = Some(parse_number(next_value(&args, &mut i, "--cols")?, "--cols")?);
            }
            "--rows" => {
                parsed.rows = Some(parse_number(next_value(&args, &mut i, "--rows")?, "--rows")?);
            }
            "-t" | "--timeout" => {
                let secs: u64 = parse_number(next_value(&args, &mut i, "--timeout")?, "--timeout")?;
                parsed.timeout = Duration::from_secs(secs);
            }
            "--config" => {
                parsed.config = Some(PathBuf::from(next_value(&args, &mut i, "--config")?));
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

fn init_logging(config: &Config) {
    let log_path = config.log_path();

    // Create log directory if needed
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    // Open log file (append mode)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("HEADTERM_LOG")
            .or_else(|_| EnvFilter::try_new(&config.log.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn default_shell() -> &'static str {
    if cfg!(windows) {
        "cmd.exe"
    } else {
        "/bin/sh"
    }
}

fn run(args: Args) -> Result<i32> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load(),
    };
    init_logging(&config);
    info!("headterm {} starting", VERSION);

    let mut options = config.session_options();
    let cols = args.cols.unwrap_or(config.terminal.cols);
    let rows = args.rows.unwrap_or(config.terminal.rows);
    options.size = Some((cols, rows));
    if let Some(shell) = args.shell {
        options.program = Some(shell);
        options.args.clear();
    }
    if let Some(command) = args.command {
        let shell = options
            .program
            .take()
            .unwrap_or_else(|| default_shell().to_string());
        let flag = if cfg!(windows) { "/C" } else { "-c" };
        options.program = Some(shell);
        options.args = vec![flag.to_string(), command];
    }

    let (manager, events) = SessionManager::new(cols, rows);
    let id = manager
        .create_session(options)
        .context("Failed to start session")?;

    let deadline = Instant::now() + args.timeout;
    let exit = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(SessionEvent::Exited(session, exit)) if session == id => break Some(exit),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!("Session {} still running after {:?}", id, args.timeout);
                break None;
            }
            Err(RecvTimeoutError::Disconnected) => break None,
        }
    };

    let screen = manager
        .get(id)
        .map(|session| session.lock().with_terminal(|term| term.screen_text()))
        .unwrap_or_default();
    println!("{}", screen.trim_end_matches('\n'));

    manager
        .close_session(id)
        .context("Failed to close session")?;

    Ok(match exit {
        Some(ProcessExit::Clean { code }) => i32::try_from(code).unwrap_or(1),
        Some(ProcessExit::Abnormal(reason)) => {
            eprintln!("headterm: process ended abnormally: {:?}", reason);
            1
        }
        None => TIMEOUT_EXIT_CODE,
    })
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
