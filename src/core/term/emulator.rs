//! Terminal emulator
//!
//! [`TerminalEmulator`] owns a [`Parser`] and a [`TerminalState`] and is the
//! single entry point for mutating a terminal: output from the child goes
//! in through [`write`](TerminalEmulator::write), side effects come out as
//! queued [`TerminalEvent`]s.

use thiserror::Error;

use super::handlers::handle_message;
use super::message::StringTerminator;
use super::parser::Parser;
use super::screen::{Viewport, DEFAULT_SCROLLBACK_LIMIT};
use super::sgr::Sgr21Policy;
use super::state::{CursorState, TerminalModes, TerminalState};

pub const MAX_COLS: u16 = 2000;
pub const MAX_ROWS: u16 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TerminalError {
    #[error("invalid terminal size {cols}x{rows}")]
    InvalidDimensions { cols: u16, rows: u16 },
}

/// OSC 52 request. The emulator never touches a real clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardRequest {
    Set { selection: String, data: String },
    /// Answer with [`clipboard_reply`](super::handlers::clipboard_reply)
    /// using the same terminator
    Query {
        selection: String,
        terminator: StringTerminator,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Visible state changed; emitted at most once per write
    ScreenUpdated,
    /// Bytes that must be written back to the child
    ResponseEmitted(Vec<u8>),
    TitleChanged(String),
    IconNameChanged(String),
    ClipboardRequested(ClipboardRequest),
    Bell,
}

#[derive(Clone, Debug)]
pub struct TerminalOptions {
    pub cols: u16,
    pub rows: u16,
    pub scrollback_limit: usize,
    pub sgr21_policy: Sgr21Policy,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
            sgr21_policy: Sgr21Policy::default(),
        }
    }
}

/// Check a size against `1..=MAX_COLS` and `1..=MAX_ROWS`
pub fn validate_size(cols: u16, rows: u16) -> Result<(), TerminalError> {
    if (1..=MAX_COLS).contains(&cols) && (1..=MAX_ROWS).contains(&rows) {
        Ok(())
    } else {
        Err(TerminalError::InvalidDimensions { cols, rows })
    }
}

pub struct TerminalEmulator {
    parser: Parser,
    state: TerminalState,
    events: Vec<TerminalEvent>,
}

impl TerminalEmulator {
    pub fn new(options: TerminalOptions) -> Result<Self, TerminalError> {
        validate_size(options.cols, options.rows)?;
        Ok(Self {
            parser: Parser::new(),
            state: TerminalState::new(
                options.cols,
                options.rows,
                options.scrollback_limit,
                options.sgr21_policy,
            ),
            events: Vec::new(),
        })
    }

    /// Emulator with default options at the given size
    pub fn with_size(cols: u16, rows: u16) -> Result<Self, TerminalError> {
        Self::new(TerminalOptions {
            cols,
            rows,
            ..TerminalOptions::default()
        })
    }

    /// Feed output from the child process
    pub fn write(&mut self, bytes: &[u8]) {
        let messages = self.parser.push(bytes);
        self.apply(messages);
    }

    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Resolve a sequence left unterminated at end of input
    pub fn flush(&mut self) {
        let messages = self.parser.flush_incomplete();
        self.apply(messages);
    }

    fn apply(&mut self, messages: Vec<super::message::Message>) {
        if messages.is_empty() {
            return;
        }
        let mut events = Vec::new();
        for message in messages {
            handle_message(&mut self.state, message, &mut events);
        }
        self.events.append(&mut events);
        self.events.push(TerminalEvent::ScreenUpdated);
    }

    /// Resize the grid; an invalid size leaves everything untouched
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        validate_size(cols, rows)?;
        if (cols, rows) != (self.state.cols(), self.state.rows()) {
            tracing::debug!("Terminal resize {}x{}", cols, rows);
            self.state.resize(cols, rows);
            self.events.push(TerminalEvent::ScreenUpdated);
        }
        Ok(())
    }

    /// Take all queued events in order
    pub fn drain_events(&mut self) -> Vec<TerminalEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TerminalState {
        &mut self.state
    }

    pub fn cols(&self) -> u16 {
        self.state.cols()
    }

    pub fn rows(&self) -> u16 {
        self.state.rows()
    }

    pub fn cursor(&self) -> &CursorState {
        &self.state.cursor
    }

    pub fn modes(&self) -> &TerminalModes {
        &self.state.modes
    }

    pub fn title(&self) -> &str {
        &self.state.title
    }

    pub fn icon_name(&self) -> &str {
        &self.state.icon_name
    }

    pub fn viewport(&self) -> Viewport<'_> {
        self.state.screen().viewport()
    }

    pub fn scroll_viewport_up(&mut self, n: usize) {
        self.state.screen_mut().scroll_viewport_up(n);
    }

    pub fn scroll_viewport_down(&mut self, n: usize) {
        self.state.screen_mut().scroll_viewport_down(n);
    }

    pub fn reset_viewport(&mut self) {
        self.state.screen_mut().reset_viewport();
    }

    /// Visible screen as text with trailing blanks trimmed per row
    pub fn screen_text(&self) -> String {
        self.state.screen().text()
    }

    pub fn row_text(&self, row: u16) -> String {
        self.state.screen().row_text(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::attrs::{AttrFlags, Color};

    fn emulator(cols: u16, rows: u16) -> TerminalEmulator {
        TerminalEmulator::with_size(cols, rows).expect("valid size")
    }

    #[test]
    fn test_hello_world_colors() {
        let mut term = emulator(80, 24);
        term.write(b"\x1b[1;31mHello\x1b[0m World");
        let row = term.state().screen().get_row(0).map(<[_]>::to_vec).unwrap_or_default();
        for cell in &row[..5] {
            assert!(cell.attrs.flags.contains(AttrFlags::BOLD));
            assert_eq!(cell.attrs.fg, Some(Color::Named(1)));
        }
        for cell in &row[5..11] {
            assert!(cell.attrs.is_default());
        }
        assert_eq!(term.row_text(0), "Hello World");
        assert_eq!((term.cursor().row, term.cursor().col), (0, 11));
    }

    #[test]
    fn test_red_word_then_newline() {
        let mut term = emulator(80, 24);
        term.write(b"Hello\x1b[31mWorld\x1b[0m\r\n");
        let row = term.state().screen().get_row(0).map(<[_]>::to_vec).unwrap_or_default();
        for cell in &row[..5] {
            assert!(cell.attrs.is_default());
        }
        for cell in &row[5..10] {
            assert_eq!(cell.attrs.fg, Some(Color::Named(1)));
            assert!(!cell.attrs.flags.contains(AttrFlags::BOLD));
        }
        assert_eq!(term.row_text(0), "HelloWorld");
        assert_eq!((term.cursor().row, term.cursor().col), (1, 0));
        assert!(term.state().attrs.is_default());
    }

    #[test]
    fn test_bold_then_normal_intensity() {
        let mut term = emulator(10, 2);
        term.write(b"\x1b[1m\x1b[22mx");
        let cell = term.state().screen().cell(0, 0).cloned().unwrap_or_default();
        assert!(cell.attrs.is_default());
    }

    #[test]
    fn test_screen_updated_once_per_write() {
        let mut term = emulator(10, 2);
        term.write(b"a\x1b[1mb\r\n");
        assert_eq!(term.drain_events(), vec![TerminalEvent::ScreenUpdated]);
        term.write(b"");
        assert!(term.drain_events().is_empty());
    }

    #[test]
    fn test_response_precedes_screen_update() {
        let mut term = emulator(10, 2);
        term.write(b"\x1b[6n");
        assert_eq!(
            term.drain_events(),
            vec![
                TerminalEvent::ResponseEmitted(b"\x1b[1;1R".to_vec()),
                TerminalEvent::ScreenUpdated,
            ]
        );
    }

    #[test]
    fn test_invalid_resize_leaves_state() {
        let mut term = emulator(10, 5);
        term.write(b"hello");
        assert_eq!(
            term.resize(0, 5),
            Err(TerminalError::InvalidDimensions { cols: 0, rows: 5 })
        );
        assert!(term.resize(10, MAX_ROWS + 1).is_err());
        assert_eq!((term.cols(), term.rows()), (10, 5));
        assert_eq!(term.row_text(0), "hello");
        assert!(TerminalEmulator::with_size(MAX_COLS + 1, 1).is_err());
    }

    #[test]
    fn test_resize_clips_content() {
        let mut term = emulator(10, 3);
        term.write(b"abcdefghij\r\n12345");
        term.resize(4, 2).expect("valid size");
        assert_eq!(term.screen_text(), "abcd\n1234");
        assert_eq!((term.cursor().row, term.cursor().col), (1, 3));
    }

    #[test]
    fn test_split_sequence_across_writes() {
        let mut term = emulator(10, 2);
        term.write(b"\x1b[3");
        term.write(b"1mX\xe6\x97");
        term.write(b"\xa5");
        assert_eq!(term.row_text(0), "X日");
        let cell = term.state().screen().cell(0, 0).cloned().unwrap_or_default();
        assert_eq!(cell.attrs.fg, Some(Color::Named(1)));
    }

    #[test]
    fn test_flush_dispatches_unterminated_title() {
        let mut term = emulator(10, 2);
        term.write(b"\x1b]2;partial");
        assert!(!term
            .drain_events()
            .iter()
            .any(|e| matches!(e, TerminalEvent::TitleChanged(_))));
        term.flush();
        assert!(term
            .drain_events()
            .contains(&TerminalEvent::TitleChanged("partial".to_string())));
    }

    #[test]
    fn test_scrollback_viewport() {
        let mut term = emulator(5, 2);
        term.write(b"one\r\ntwo\r\nthree");
        assert_eq!(term.screen_text(), "two\nthree");
        term.scroll_viewport_up(1);
        assert_eq!(term.viewport().text(), "one\ntwo");
        term.reset_viewport();
        assert_eq!(term.viewport().text(), "two\nthree");
    }
}
