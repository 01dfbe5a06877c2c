//! Core terminal emulation components.
//!
//! This module contains the low-level terminal emulation logic:
//!
//! - **term**: VT/xterm parser, message handlers and terminal state
//! - **pty**: pseudo-terminal wrapper with an output pump thread
//! - **session**: a terminal emulator paired with the process feeding it
//! - **manager**: registry of concurrent sessions
//!
//! # Architecture
//!
//! ```text
//! SessionManager
//! └── Session
//!     ├── PtySession (child process + pump thread)
//!     └── TerminalEmulator
//!         ├── Parser (escape sequences -> messages)
//!         └── TerminalState
//!             ├── ScreenBuffer (primary, with scrollback)
//!             └── ScreenBuffer (alternate)
//! ```

pub mod manager;
pub mod pty;
pub mod session;
pub mod term;
