//! headterm - a headless VT/xterm terminal emulator core
//!
//! headterm decodes the byte stream a child process writes to its
//! pseudo-terminal, keeps the authoritative screen state (grid, cursor,
//! modes, scrollback) and produces the replies the child expects. Nothing
//! is rendered; callers read the screen through [`TerminalEmulator`] and
//! react to [`TerminalEvent`]s or [`SessionEvent`]s.
//!
//! # Quick Start
//!
//! ```
//! use headterm::TerminalEmulator;
//!
//! let mut term = TerminalEmulator::with_size(80, 24).unwrap();
//! term.write(b"\x1b[1;31mHello\x1b[0m World");
//! assert_eq!(term.row_text(0), "Hello World");
//! ```
//!
//! Running a real process goes through [`SessionManager`], which spawns the
//! child behind a pty and pumps its output into an emulator on a
//! background thread.

pub mod config;
pub mod core;

pub use crate::config::{Config, ConfigError};
pub use crate::core::manager::{SessionManager, SharedSession};
pub use crate::core::pty::{AbnormalExit, ProcessExit, PtyError, PtyEventHandler, PtyOptions, PtySession};
pub use crate::core::session::{Session, SessionError, SessionEvent, SessionId, SessionOptions};
pub use crate::core::term::{
    ClipboardRequest, Sgr21Policy, TerminalEmulator, TerminalError, TerminalEvent, TerminalOptions,
};
