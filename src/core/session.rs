//! Session management
//!
//! A [`Session`] pairs a [`TerminalEmulator`] with the [`PtySession`] that
//! feeds it. The pump thread writes into the emulator under the session's
//! terminal lock; everything else the emulator reports is forwarded as a
//! [`SessionEvent`].

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use super::pty::{ProcessExit, PtyError, PtyEventHandler, PtyOptions, PtySession};
use super::term::{
    validate_size, ClipboardRequest, Sgr21Policy, TerminalEmulator, TerminalError, TerminalEvent,
    TerminalOptions, DEFAULT_SCROLLBACK_LIMIT,
};

pub type SessionId = u64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(SessionId),

    #[error("Session {0} has been closed")]
    Disposed(SessionId),

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error(transparent)]
    Pty(#[from] PtyError),
}

/// Session events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Output was applied to the screen
    Output(SessionId),
    TitleChanged(SessionId, String),
    IconNameChanged(SessionId, String),
    ClipboardRequested(SessionId, ClipboardRequest),
    Bell(SessionId),
    /// The child process is gone
    Exited(SessionId, ProcessExit),
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::Output(id)
            | SessionEvent::TitleChanged(id, _)
            | SessionEvent::IconNameChanged(id, _)
            | SessionEvent::ClipboardRequested(id, _)
            | SessionEvent::Bell(id)
            | SessionEvent::Exited(id, _) => *id,
        }
    }
}

/// How to start a session
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Terminal size; the manager's default when `None`
    pub size: Option<(u16, u16)>,
    pub scrollback_limit: usize,
    pub sgr21_policy: Sgr21Policy,
    /// Program to run; the user's default shell when `None`
    pub program: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Grace period for the child on close, and bound on joining the pump
    pub stop_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            size: None,
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
            sgr21_policy: Sgr21Policy::default(),
            program: None,
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            stop_timeout: Duration::from_millis(1000),
        }
    }
}

impl SessionOptions {
    fn terminal_options(&self, cols: u16, rows: u16) -> TerminalOptions {
        TerminalOptions {
            cols,
            rows,
            scrollback_limit: self.scrollback_limit,
            sgr21_policy: self.sgr21_policy,
        }
    }

    fn pty_options(&self, cols: u16, rows: u16) -> PtyOptions {
        PtyOptions {
            cols,
            rows,
            program: self.program.clone(),
            args: self.args.clone(),
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
        }
    }
}

/// Feeds pump output into the emulator and forwards its events
struct SessionHandler {
    id: SessionId,
    terminal: Arc<Mutex<TerminalEmulator>>,
    events: Sender<SessionEvent>,
}

impl SessionHandler {
    fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Session {} event receiver dropped", self.id);
        }
    }

    /// Forward emulator events; returns the reply bytes they carry
    fn forward(&self, events: Vec<TerminalEvent>) -> Vec<u8> {
        let mut replies = Vec::new();
        for event in events {
            match event {
                TerminalEvent::ResponseEmitted(bytes) => replies.extend_from_slice(&bytes),
                TerminalEvent::ScreenUpdated => self.send(SessionEvent::Output(self.id)),
                TerminalEvent::TitleChanged(title) => {
                    self.send(SessionEvent::TitleChanged(self.id, title))
                }
                TerminalEvent::IconNameChanged(name) => {
                    self.send(SessionEvent::IconNameChanged(self.id, name))
                }
                TerminalEvent::ClipboardRequested(request) => {
                    self.send(SessionEvent::ClipboardRequested(self.id, request))
                }
                TerminalEvent::Bell => self.send(SessionEvent::Bell(self.id)),
            }
        }
        replies
    }
}

impl PtyEventHandler for SessionHandler {
    fn on_output(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        let events = {
            let mut terminal = self.terminal.lock();
            terminal.write(data);
            terminal.drain_events()
        };
        let replies = self.forward(events);
        (!replies.is_empty()).then_some(replies)
    }

    fn on_exit(&mut self, exit: &ProcessExit) {
        let events = {
            let mut terminal = self.terminal.lock();
            terminal.flush();
            terminal.drain_events()
        };
        // Replies are dropped; the child is gone
        self.forward(events);
        self.send(SessionEvent::Exited(self.id, exit.clone()));
    }
}

/// A shell session
pub struct Session {
    id: SessionId,
    terminal: Arc<Mutex<TerminalEmulator>>,
    pty: Option<PtySession>,
    options: SessionOptions,
    events: Sender<SessionEvent>,
    /// Last size applied to both the emulator and the pty
    size: (u16, u16),
    disposed: bool,
}

impl Session {
    /// Create the emulator and spawn the child.
    pub fn spawn(
        id: SessionId,
        options: SessionOptions,
        size: (u16, u16),
        events: Sender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let (cols, rows) = size;
        let terminal = Arc::new(Mutex::new(TerminalEmulator::new(
            options.terminal_options(cols, rows),
        )?));
        let pty = start_pty(id, &options, size, &terminal, &events)?;
        tracing::info!("Session {} started (pid {:?})", id, pty.process_id());

        Ok(Self {
            id,
            terminal,
            pty: Some(pty),
            options,
            events,
            size,
            disposed: false,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Shared handle to the emulator. The pump holds this lock while it
    /// applies output.
    pub fn terminal(&self) -> Arc<Mutex<TerminalEmulator>> {
        self.terminal.clone()
    }

    /// Run `f` with the emulator locked
    pub fn with_terminal<R>(&self, f: impl FnOnce(&mut TerminalEmulator) -> R) -> R {
        f(&mut self.terminal.lock())
    }

    pub fn title(&self) -> String {
        self.terminal.lock().title().to_string()
    }

    pub fn icon_name(&self) -> String {
        self.terminal.lock().icon_name().to_string()
    }

    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    pub fn is_running(&self) -> bool {
        self.pty.as_ref().is_some_and(PtySession::is_running)
    }

    pub fn is_closed(&self) -> bool {
        self.disposed
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pty.as_ref().and_then(PtySession::process_id)
    }

    fn check_open(&self) -> Result<(), SessionError> {
        if self.disposed {
            Err(SessionError::Disposed(self.id))
        } else {
            Ok(())
        }
    }

    /// Send user input to the child
    pub fn write_input(&self, data: &[u8]) -> Result<(), SessionError> {
        self.check_open()?;
        match &self.pty {
            Some(pty) => Ok(pty.write(data)?),
            None => Err(PtyError::NotRunning.into()),
        }
    }

    /// Resize the pty, then the emulator, with output paused. On failure
    /// both keep their previous size.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), SessionError> {
        self.check_open()?;
        validate_size(cols, rows)?;
        let mut terminal = self.terminal.lock();
        if let Some(pty) = &self.pty {
            pty.resize(cols, rows)?;
        }
        terminal.resize(cols, rows)?;
        self.size = (cols, rows);
        Ok(())
    }

    /// Stop the current child and start a fresh one, keeping the id.
    /// The emulator is reset in place so shared handles stay valid.
    pub fn restart(&mut self, options: Option<SessionOptions>) -> Result<(), SessionError> {
        self.check_open()?;
        if let Some(options) = options {
            self.options = options;
        }
        if let Some(size) = self.options.size {
            self.size = size;
        }
        let (cols, rows) = self.size;
        let fresh = TerminalEmulator::new(self.options.terminal_options(cols, rows))?;

        if let Some(mut pty) = self.pty.take() {
            pty.stop(self.options.stop_timeout);
        }
        *self.terminal.lock() = fresh;

        let pty = start_pty(self.id, &self.options, self.size, &self.terminal, &self.events)?;
        tracing::info!("Session {} restarted (pid {:?})", self.id, pty.process_id());
        self.pty = Some(pty);
        Ok(())
    }

    /// Stop the child and release the session. Further use fails with
    /// [`SessionError::Disposed`].
    pub fn close(&mut self) -> Result<(), SessionError> {
        self.check_open()?;
        self.disposed = true;
        if let Some(mut pty) = self.pty.take() {
            pty.stop(self.options.stop_timeout);
        }
        tracing::info!("Session {} closed", self.id);
        Ok(())
    }
}

fn start_pty(
    id: SessionId,
    options: &SessionOptions,
    (cols, rows): (u16, u16),
    terminal: &Arc<Mutex<TerminalEmulator>>,
    events: &Sender<SessionEvent>,
) -> Result<PtySession, SessionError> {
    let handler = SessionHandler {
        id,
        terminal: terminal.clone(),
        events: events.clone(),
    };
    Ok(PtySession::start(&options.pty_options(cols, rows), handler)?)
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut pty) = self.pty.take() {
            pty.stop(self.options.stop_timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, Receiver};

    #[test]
    fn test_handler_forwards_events_and_replies() {
        let terminal = Arc::new(Mutex::new(
            TerminalEmulator::with_size(20, 5).expect("valid size"),
        ));
        let (tx, rx) = channel();
        let mut handler = SessionHandler {
            id: 7,
            terminal: terminal.clone(),
            events: tx,
        };

        let reply = handler.on_output(b"\x1b]2;hi\x07ok\x1b[6n");
        assert_eq!(reply, Some(b"\x1b[1;3R".to_vec()));
        assert_eq!(terminal.lock().row_text(0), "ok");

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::TitleChanged(7, "hi".to_string()),
                SessionEvent::Output(7),
            ]
        );

        handler.on_exit(&ProcessExit::Clean { code: 0 });
        assert_eq!(
            rx.try_recv().ok(),
            Some(SessionEvent::Exited(7, ProcessExit::Clean { code: 0 }))
        );
    }

    fn handler(id: SessionId) -> (SessionHandler, Receiver<SessionEvent>) {
        let terminal = Arc::new(Mutex::new(
            TerminalEmulator::with_size(20, 5).expect("valid size"),
        ));
        let (tx, rx) = channel();
        let handler = SessionHandler {
            id,
            terminal,
            events: tx,
        };
        (handler, rx)
    }

    #[test]
    fn test_exit_arrives_after_unread_backlog() {
        let (mut handler, rx) = handler(1);
        handler.on_output(&[0x07; 6000]);
        handler.on_exit(&ProcessExit::Clean { code: 0 });

        let events: Vec<_> = rx.try_iter().collect();
        let bells = events
            .iter()
            .filter(|event| **event == SessionEvent::Bell(1))
            .count();
        assert_eq!(bells, 6000);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::Exited(1, ProcessExit::Clean { code: 0 }))
        );
    }

    #[test]
    fn test_exit_forwards_unterminated_title() {
        let (mut handler, rx) = handler(2);
        handler.on_output(b"\x1b]2;last words");
        assert!(rx.try_iter().all(|event| !matches!(event, SessionEvent::TitleChanged(..))));

        handler.on_exit(&ProcessExit::Clean { code: 0 });
        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&SessionEvent::TitleChanged(2, "last words".to_string())));
        assert_eq!(
            events.last(),
            Some(&SessionEvent::Exited(2, ProcessExit::Clean { code: 0 }))
        );
    }

    #[test]
    fn test_invalid_size_fails_before_spawn() {
        let (tx, _rx) = channel();
        let result = Session::spawn(1, SessionOptions::default(), (0, 24), tx);
        assert!(matches!(result, Err(SessionError::Terminal(_))));
    }
}
