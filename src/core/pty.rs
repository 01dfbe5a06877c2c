//! Pseudo-terminal process wrapper
//!
//! Spawns a child attached to the platform pseudo-terminal (openpty on Unix,
//! ConPTY on Windows) through `portable-pty`, and runs a pump thread that
//! hands every output chunk to a [`PtyEventHandler`].

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, ExitStatus, MasterPty, PtySize};
use thiserror::Error;

const READ_BUFFER_SIZE: usize = 8192;
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long the pump waits for the exit status after the output closes
const EXIT_STATUS_WAIT: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open pseudo terminal: {0}")]
    Open(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Failed to resize pseudo terminal: {0}")]
    Resize(String),

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to start output pump: {0}")]
    Pump(#[source] io::Error),

    #[error("Process is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// What to run and at which size
#[derive(Clone, Debug)]
pub struct PtyOptions {
    pub cols: u16,
    pub rows: u16,
    /// Program to run; the user's default shell when `None`
    pub program: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Default for PtyOptions {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            program: None,
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }
}

impl PtyOptions {
    fn command(&self) -> CommandBuilder {
        let mut cmd = match &self.program {
            Some(program) => {
                let mut cmd = CommandBuilder::new(program);
                cmd.args(&self.args);
                cmd
            }
            None => CommandBuilder::new_default_prog(),
        };
        cmd.env("TERM", "xterm-256color");
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            cmd.cwd(dir);
        }
        cmd
    }

    fn size(&self) -> PtySize {
        pty_size(self.cols, self.rows)
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbnormalExit {
    /// Terminated by [`PtySession::stop`]
    Killed,
    /// Died from a signal sent by someone else; carries the signal name
    Signaled(String),
    /// Output failed before an exit status could be collected
    PipeBroken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    Clean { code: u32 },
    Abnormal(AbnormalExit),
}

/// Receives pump output. Runs on the pump thread.
pub trait PtyEventHandler: Send + 'static {
    /// Called for every output chunk. Returned bytes are written back to
    /// the child (device reports and similar replies).
    fn on_output(&mut self, data: &[u8]) -> Option<Vec<u8>>;

    /// Called once when the pump stops.
    fn on_exit(&mut self, exit: &ProcessExit);
}

type SharedChild = Arc<Mutex<Box<dyn Child + Send + Sync>>>;
type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// A child process behind a pseudo terminal
pub struct PtySession {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: SharedWriter,
    child: SharedChild,
    running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
    process_id: Option<u32>,
}

impl PtySession {
    /// Spawn the child and start pumping its output into `handler`
    pub fn start<H: PtyEventHandler>(options: &PtyOptions, handler: H) -> Result<Self> {
        let pair = native_pty_system()
            .openpty(options.size())
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(options.command())
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        // Only the child may hold the slave, or reads never see EOF
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let process_id = child.process_id();
        let child: SharedChild = Arc::new(Mutex::new(child));
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let running = Arc::new(AtomicBool::new(true));
        let stopping = Arc::new(AtomicBool::new(false));
        let killed = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let pump = Pump {
            reader,
            writer: writer.clone(),
            child: child.clone(),
            running: running.clone(),
            stopping: stopping.clone(),
            killed: killed.clone(),
        };
        let pump = thread::Builder::new()
            .name("headterm-pty".to_string())
            .spawn(move || {
                pump.run(handler);
                let _ = done_tx.send(());
            })
            .map_err(PtyError::Pump);
        let pump = match pump {
            Ok(pump) => pump,
            Err(e) => {
                let _ = child.lock().kill();
                return Err(e);
            }
        };

        tracing::info!("Spawned process {:?} ({}x{})", process_id, options.cols, options.rows);

        Ok(Self {
            master: Mutex::new(pair.master),
            writer,
            child,
            running,
            stopping,
            killed,
            pump: Some(pump),
            done_rx,
            process_id,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    /// Write input to the child
    pub fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_running() || self.stopping.load(Ordering::SeqCst) {
            return Err(PtyError::NotRunning);
        }
        let mut writer = self.writer.lock();
        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(PtyError::Write)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .lock()
            .resize(pty_size(cols, rows))
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    /// Stop the child and the pump.
    ///
    /// Closing the input lets a shell exit by itself; if it is still alive
    /// after `grace` it is killed. The pump is joined for at most `grace`
    /// more, after which it is left to finish on its own.
    pub fn stop(&mut self, grace: Duration) {
        let Some(pump) = self.pump.take() else {
            return;
        };
        self.stopping.store(true, Ordering::SeqCst);

        // Dropping the real writer signals end of input
        *self.writer.lock() = Box::new(io::sink());

        if !wait_for_child(&self.child, grace) {
            tracing::debug!("Process {:?} still alive, killing", self.process_id);
            self.killed.store(true, Ordering::SeqCst);
            if let Err(e) = self.child.lock().kill() {
                tracing::debug!("Kill failed: {}", e);
            }
            wait_for_child(&self.child, grace);
        }

        match self.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = pump.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("PTY pump did not stop within {:?}", grace);
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.stop(Duration::from_millis(500));
    }
}

/// Poll for the child's exit for up to `timeout`; true once it has exited.
fn wait_for_child(child: &SharedChild, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match child.lock().try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("try_wait failed: {}", e);
                return true;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(REAP_POLL_INTERVAL);
    }
}

struct Pump {
    reader: Box<dyn Read + Send>,
    writer: SharedWriter,
    child: SharedChild,
    running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
}

impl Pump {
    fn run<H: PtyEventHandler>(mut self, mut handler: H) {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut failure = None;

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            match self.reader.read(&mut buffer) {
                // EOF - the child closed its side
                Ok(0) => break,
                Ok(n) => {
                    if let Some(reply) = handler.on_output(&buffer[..n]) {
                        self.reply(&reply);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Linux reports EIO once the child side is gone
                    tracing::debug!("PTY read ended: {}", e);
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        let exit = self.collect_exit(failure);
        tracing::info!("Process exited: {:?}", exit);
        handler.on_exit(&exit);
    }

    fn reply(&self, bytes: &[u8]) {
        if bytes.is_empty() || self.stopping.load(Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock();
        if let Err(e) = writer.write_all(bytes).and_then(|_| writer.flush()) {
            tracing::warn!("Failed to write reply to PTY: {}", e);
        }
    }

    fn collect_exit(&self, failure: Option<String>) -> ProcessExit {
        let deadline = Instant::now() + EXIT_STATUS_WAIT;
        loop {
            if self.killed.load(Ordering::SeqCst) {
                return ProcessExit::Abnormal(AbnormalExit::Killed);
            }
            match self.child.lock().try_wait() {
                Ok(Some(status)) => return exit_from_status(&status),
                Ok(None) => {}
                Err(e) => return ProcessExit::Abnormal(AbnormalExit::PipeBroken(e.to_string())),
            }
            if Instant::now() >= deadline {
                let reason = failure.unwrap_or_else(|| "output closed".to_string());
                return ProcessExit::Abnormal(AbnormalExit::PipeBroken(reason));
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
    }
}

/// Tell a normal exit from a death by signal. portable-pty reports the
/// latter as a failure whose description names the signal.
fn exit_from_status(status: &ExitStatus) -> ProcessExit {
    if !status.success() {
        if let Some(signal) = status.to_string().strip_prefix("Terminated by ") {
            return ProcessExit::Abnormal(AbnormalExit::Signaled(signal.to_string()));
        }
    }
    ProcessExit::Clean {
        code: status.exit_code(),
    }
}
