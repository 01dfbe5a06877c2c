//! VT/xterm terminal emulation.
//!
//! ```text
//! bytes ──▶ Parser ──▶ Message ──▶ handlers ──▶ TerminalState
//!                                      │            ├── ScreenBuffer (primary + scrollback)
//!                                      │            └── ScreenBuffer (alternate)
//!                                      └──▶ TerminalEvent queue
//! ```

pub mod attrs;
pub mod charset;
pub mod emulator;
pub mod handlers;
pub mod message;
pub mod parser;
pub mod screen;
pub mod sgr;
pub mod state;

pub use attrs::{AttrFlags, Cell, Color, SgrAttributes, UnderlineStyle};
pub use emulator::{
    validate_size, ClipboardRequest, TerminalEmulator, TerminalError, TerminalEvent,
    TerminalOptions, MAX_COLS, MAX_ROWS,
};
pub use handlers::clipboard_reply;
pub use message::{Message, Params, StringTerminator};
pub use parser::{Parser, ParserState};
pub use screen::{Row, ScreenBuffer, ScrollDirection, Viewport, DEFAULT_SCROLLBACK_LIMIT};
pub use sgr::Sgr21Policy;
pub use state::{CursorShape, CursorState, CursorStyle, MouseEncoding, MouseTracking, TerminalModes, TerminalState};
