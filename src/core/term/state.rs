//! Terminal state management
//!
//! This module defines the cursor, the mode flags and the mutation
//! operations that escape sequences map onto. [`TerminalState`] owns both
//! screen buffers; the primary one keeps scrollback, the alternate one
//! never does.

use std::collections::{HashMap, HashSet};

use unicode_width::UnicodeWidthChar;

use super::attrs::{Cell, SgrAttributes};
use super::charset::{CharsetSlot, CharsetState};
use super::screen::{ScreenBuffer, ScrollDirection};
use super::sgr::Sgr21Policy;

const TAB_WIDTH: u16 = 8;
const TITLE_STACK_DEPTH: usize = 10;

/// Cursor shape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Bar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorStyle {
    pub shape: CursorShape,
    pub blinking: bool,
}

impl Default for CursorStyle {
    fn default() -> Self {
        Self {
            shape: CursorShape::Block,
            blinking: true,
        }
    }
}

impl CursorStyle {
    /// Create from DECSCUSR parameter
    pub fn from_decscusr(n: u16) -> Option<Self> {
        let (shape, blinking) = match n {
            0 | 1 => (CursorShape::Block, true),
            2 => (CursorShape::Block, false),
            3 => (CursorShape::Underline, true),
            4 => (CursorShape::Underline, false),
            5 => (CursorShape::Bar, true),
            6 => (CursorShape::Bar, false),
            _ => return None,
        };
        Some(Self { shape, blinking })
    }

    /// Convert to DECSCUSR parameter (for `CSI Ps SP q`)
    pub fn to_decscusr(&self) -> u16 {
        let base = match self.shape {
            CursorShape::Block => 1,
            CursorShape::Underline => 3,
            CursorShape::Bar => 5,
        };
        if self.blinking {
            base
        } else {
            base + 1
        }
    }
}

/// Cursor state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CursorState {
    pub row: u16,
    pub col: u16,
    /// Set after printing into the last column; the next printable wraps
    pub pending_wrap: bool,
    pub style: CursorStyle,
}

/// What DECSC saves and DECRC restores
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedCursor {
    pub row: u16,
    pub col: u16,
    pub pending_wrap: bool,
    pub attrs: SgrAttributes,
    pub protected: bool,
    pub origin: bool,
    pub autowrap: bool,
    pub charsets: CharsetState,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseTracking {
    #[default]
    Off,
    /// 9: press only
    X10,
    /// 1000: press and release
    Normal,
    /// 1002: also motion while a button is held
    ButtonEvent,
    /// 1003: all motion
    AnyEvent,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseEncoding {
    #[default]
    Default,
    Utf8,
    Sgr,
    Urxvt,
}

/// Terminal modes
///
/// Each flag is independent; nothing here implies anything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalModes {
    pub autowrap: bool,
    pub origin: bool,
    pub insert: bool,
    pub alternate_screen: bool,
    pub bracketed_paste: bool,
    pub cursor_visible: bool,
    pub application_keypad: bool,
    pub application_cursor: bool,
    pub linefeed_newline: bool,
    pub reverse_video: bool,
    pub focus_reporting: bool,
    pub mouse_tracking: MouseTracking,
    pub mouse_encoding: MouseEncoding,
    /// XTSAVE snapshot of DEC private modes
    pub saved_private: HashMap<u16, bool>,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            autowrap: true,
            origin: false,
            insert: false,
            alternate_screen: false,
            bracketed_paste: false,
            cursor_visible: true,
            application_keypad: false,
            application_cursor: false,
            linefeed_newline: false,
            reverse_video: false,
            focus_reporting: false,
            mouse_tracking: MouseTracking::Off,
            mouse_encoding: MouseEncoding::Default,
            saved_private: HashMap::new(),
        }
    }
}

/// DEC private modes XTSAVE with no arguments covers.
const SAVEABLE_PRIVATE_MODES: &[u16] = &[
    1, 5, 6, 7, 9, 12, 25, 66, 1000, 1002, 1003, 1004, 1005, 1006, 1015, 2004,
];

/// Links kept before unreferenced ones are reclaimed.
const HYPERLINK_TABLE_LIMIT: usize = 1024;

/// OSC 8 link targets, interned so cells only carry an id.
///
/// Links are keyed by `(id, uri)`; links without an id share an entry per
/// URI. Id 0 means no link.
#[derive(Default)]
struct HyperlinkTable {
    uris: HashMap<u32, String>,
    lookup: HashMap<(String, String), u32>,
    last_id: u32,
}

impl HyperlinkTable {
    fn get(&self, id: &str, uri: &str) -> Option<u32> {
        self.lookup.get(&(id.to_string(), uri.to_string())).copied()
    }

    fn insert(&mut self, id: &str, uri: &str) -> u32 {
        self.last_id = self.last_id.checked_add(1).unwrap_or(1);
        while self.last_id == 0 || self.uris.contains_key(&self.last_id) {
            self.last_id = self.last_id.wrapping_add(1);
        }
        let link = self.last_id;
        self.uris.insert(link, uri.to_string());
        self.lookup.insert((id.to_string(), uri.to_string()), link);
        link
    }

    fn len(&self) -> usize {
        self.uris.len()
    }

    /// Drop every link not in `referenced`
    fn retain(&mut self, referenced: &HashSet<u32>) {
        self.uris.retain(|link, _| referenced.contains(link));
        self.lookup.retain(|_, link| referenced.contains(link));
    }

    fn uri(&self, link: u32) -> Option<&str> {
        self.uris.get(&link).map(String::as_str)
    }
}

/// Terminal state holding all screen data
pub struct TerminalState {
    cols: u16,
    rows: u16,
    primary: ScreenBuffer,
    alternate: ScreenBuffer,
    pub cursor: CursorState,
    /// Primary cursor captured on entering the alternate screen
    primary_cursor_snapshot: Option<CursorState>,
    primary_saved: Option<SavedCursor>,
    alternate_saved: Option<SavedCursor>,
    ansi_saved: Option<(u16, u16)>,
    /// Pen used for newly printed characters
    pub attrs: SgrAttributes,
    /// DECSCA pen: newly printed cells are protected from selective erase
    pub protected: bool,
    hyperlink: u32,
    hyperlinks: HyperlinkTable,
    pub modes: TerminalModes,
    pub charsets: CharsetState,
    tab_stops: Vec<bool>,
    pub title: String,
    pub icon_name: String,
    title_stack: Vec<(String, String)>,
    pub sgr21_policy: Sgr21Policy,
    last_printed: Option<char>,
    /// OSC 10/11 overrides of the default foreground/background
    pub dynamic_fg: Option<(u8, u8, u8)>,
    pub dynamic_bg: Option<(u8, u8, u8)>,
}

impl TerminalState {
    pub fn new(cols: u16, rows: u16, scrollback_limit: usize, sgr21_policy: Sgr21Policy) -> Self {
        Self {
            cols,
            rows,
            primary: ScreenBuffer::new(cols, rows, scrollback_limit),
            alternate: ScreenBuffer::new(cols, rows, 0),
            cursor: CursorState::default(),
            primary_cursor_snapshot: None,
            primary_saved: None,
            alternate_saved: None,
            ansi_saved: None,
            attrs: SgrAttributes::default(),
            protected: false,
            hyperlink: 0,
            hyperlinks: HyperlinkTable::default(),
            modes: TerminalModes::default(),
            charsets: CharsetState::default(),
            tab_stops: default_tab_stops(cols),
            title: String::new(),
            icon_name: String::new(),
            title_stack: Vec::new(),
            sgr21_policy,
            last_printed: None,
            dynamic_fg: None,
            dynamic_bg: None,
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn screen(&self) -> &ScreenBuffer {
        if self.modes.alternate_screen {
            &self.alternate
        } else {
            &self.primary
        }
    }

    pub fn screen_mut(&mut self) -> &mut ScreenBuffer {
        if self.modes.alternate_screen {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    pub fn primary_screen(&self) -> &ScreenBuffer {
        &self.primary
    }

    pub fn primary_screen_mut(&mut self) -> &mut ScreenBuffer {
        &mut self.primary
    }

    pub fn alternate_screen(&self) -> &ScreenBuffer {
        &self.alternate
    }

    pub fn scroll_region(&self) -> (u16, u16) {
        self.screen().scroll_region()
    }

    /// Blank cell for erase operations (background color erase).
    fn blank(&self) -> Cell {
        Cell::blank(&self.attrs)
    }

    /// Resize both screens, clipping or padding at the top-left corner.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.primary.resize(cols, rows);
        self.alternate.resize(cols, rows);

        // Clamp cursor positions
        self.cursor.row = self.cursor.row.min(rows.saturating_sub(1));
        self.cursor.col = self.cursor.col.min(cols.saturating_sub(1));
        self.cursor.pending_wrap = false;
        if let Some(snapshot) = self.primary_cursor_snapshot.as_mut() {
            snapshot.row = snapshot.row.min(rows.saturating_sub(1));
            snapshot.col = snapshot.col.min(cols.saturating_sub(1));
            snapshot.pending_wrap = false;
        }

        let old = self.tab_stops.len();
        self.tab_stops.resize(cols as usize, false);
        for col in old..cols as usize {
            self.tab_stops[col] = col % TAB_WIDTH as usize == 0 && col != 0;
        }
    }

    /// Put a character at the current cursor position
    pub fn print(&mut self, ch: char) {
        let ch = self.charsets.translate(ch);
        let width = match ch.width() {
            Some(w) => w.min(2) as u16,
            None => return,
        };

        if width == 0 {
            // Combining character - append to previous cell
            self.append_to_previous_cell(ch);
            return;
        }
        if width > self.cols {
            return;
        }

        if self.cursor.pending_wrap && self.modes.autowrap {
            self.wrap_line();
        }
        if width == 2 && self.cursor.col + 1 >= self.cols {
            if self.modes.autowrap {
                self.wrap_line();
            } else {
                self.cursor.col = self.cols - 2;
            }
        }

        if self.modes.insert {
            self.insert_chars(width);
        }

        let (row, col) = (self.cursor.row, self.cursor.col);
        self.handle_wide_char_overwrite(row, col, width);

        let mut cell = Cell::new(ch, width as u8, self.attrs);
        cell.protected = self.protected;
        cell.hyperlink = self.hyperlink;
        let mut continuation = Cell::continuation(&self.attrs);
        continuation.protected = self.protected;
        continuation.hyperlink = self.hyperlink;

        let screen = self.screen_mut();
        screen.write_char(row, col, cell);
        if width == 2 {
            screen.write_char(row, col + 1, continuation);
        }

        // Move cursor by character width
        let next = col + width;
        if next >= self.cols {
            self.cursor.col = self.cols - 1;
            self.cursor.pending_wrap = self.modes.autowrap;
        } else {
            self.cursor.col = next;
            self.cursor.pending_wrap = false;
        }
        self.last_printed = Some(ch);
    }

    fn wrap_line(&mut self) {
        let row = self.cursor.row;
        if let Some(r) = self.screen_mut().row_mut(row) {
            r.wrapped = true;
        }
        self.cursor.col = 0;
        self.cursor.pending_wrap = false;
        self.index();
    }

    fn append_to_previous_cell(&mut self, ch: char) {
        let (row, mut col) = (self.cursor.row, self.cursor.col);
        if !self.cursor.pending_wrap {
            if col == 0 {
                return;
            }
            col -= 1;
        }
        let screen = self.screen_mut();
        if col > 0 && screen.cell(row, col).is_some_and(Cell::is_continuation) {
            col -= 1;
        }
        if let Some(cell) = screen.cell_mut(row, col) {
            // Bound the number of marks one cell can accumulate
            if cell.combining.len() < 8 {
                cell.combining.push(ch);
            }
        }
    }

    fn handle_wide_char_overwrite(&mut self, row: u16, col: u16, width: u16) {
        let blank = Cell::blank(&self.attrs);
        let screen = self.screen_mut();

        // Check if we're overwriting the right half of a wide char
        if col > 0 && screen.cell(row, col).is_some_and(Cell::is_continuation) {
            screen.write_char(row, col - 1, blank.clone());
        }

        // Check if we're overwriting the left half of a wide char
        let last = col + width - 1;
        if screen.cell(row, last).is_some_and(|c| c.width == 2) {
            screen.write_char(row, last + 1, blank);
        }
    }

    /// Repeat the last printed character (REP).
    pub fn repeat_last(&mut self, count: u16) {
        let Some(ch) = self.last_printed else {
            return;
        };
        let limit = self.cols as usize * self.rows as usize;
        for _ in 0..(count as usize).min(limit) {
            self.print(ch);
        }
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
        self.cursor.pending_wrap = false;
    }

    /// Line feed; LNM also returns the carriage
    pub fn linefeed(&mut self) {
        self.index();
        if self.modes.linefeed_newline {
            self.carriage_return();
        }
    }

    /// Index - cursor down, scroll if at bottom of the region
    pub fn index(&mut self) {
        let (_, bottom) = self.scroll_region();
        self.cursor.pending_wrap = false;
        if self.cursor.row == bottom {
            self.scroll_up(1);
        } else if self.cursor.row + 1 < self.rows {
            self.cursor.row += 1;
        }
    }

    /// Reverse index - cursor up, scroll if at top of the region
    pub fn reverse_index(&mut self) {
        let (top, _) = self.scroll_region();
        self.cursor.pending_wrap = false;
        if self.cursor.row == top {
            self.scroll_down(1);
        } else if self.cursor.row > 0 {
            self.cursor.row -= 1;
        }
    }

    pub fn next_line(&mut self) {
        self.carriage_return();
        self.index();
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        if self.cursor.pending_wrap {
            self.cursor.pending_wrap = false;
        } else if self.cursor.col > 0 {
            self.cursor.col -= 1;
        }
    }

    /// Scroll the region up by n lines
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region();
        let blank = self.blank();
        self.screen_mut()
            .scroll_with(top, bottom, n, ScrollDirection::Up, &blank);
    }

    /// Scroll the region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region();
        let blank = self.blank();
        self.screen_mut()
            .scroll_with(top, bottom, n, ScrollDirection::Down, &blank);
    }

    /// Rows the cursor may reach vertically.
    fn vertical_bounds(&self) -> (u16, u16) {
        if self.modes.origin {
            self.scroll_region()
        } else {
            (0, self.rows.saturating_sub(1))
        }
    }

    pub fn cursor_up(&mut self, n: u16) {
        let (top, _) = self.vertical_bounds();
        let top = if self.cursor.row < top { 0 } else { top };
        self.cursor.row = self.cursor.row.saturating_sub(n).max(top);
        self.cursor.pending_wrap = false;
    }

    pub fn cursor_down(&mut self, n: u16) {
        let (_, bottom) = self.vertical_bounds();
        let bottom = if self.cursor.row > bottom {
            self.rows.saturating_sub(1)
        } else {
            bottom
        };
        self.cursor.row = self.cursor.row.saturating_add(n).min(bottom);
        self.cursor.pending_wrap = false;
    }

    /// Cursor forward (right)
    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor.col = self
            .cursor
            .col
            .saturating_add(n)
            .min(self.cols.saturating_sub(1));
        self.cursor.pending_wrap = false;
    }

    /// Cursor backward (left)
    pub fn cursor_backward(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_sub(n);
        self.cursor.pending_wrap = false;
    }

    /// Set cursor position (0-indexed, relative to the region in origin mode)
    pub fn set_cursor_position(&mut self, row: u16, col: u16) {
        let (top, bottom) = self.vertical_bounds();
        self.cursor.row = row.saturating_add(top).min(bottom);
        self.cursor.col = col.min(self.cols.saturating_sub(1));
        self.cursor.pending_wrap = false;
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.set_cursor_position(row.saturating_sub(1), col.saturating_sub(1));
    }

    pub fn set_column(&mut self, col: u16) {
        self.cursor.col = col.min(self.cols.saturating_sub(1));
        self.cursor.pending_wrap = false;
    }

    pub fn set_row(&mut self, row: u16) {
        let col = self.cursor.col;
        self.set_cursor_position(row, col);
    }

    /// 1-based cursor position as reported by CPR.
    pub fn reported_position(&self) -> (u16, u16) {
        let top = if self.modes.origin {
            self.scroll_region().0
        } else {
            0
        };
        (self.cursor.row - top.min(self.cursor.row) + 1, self.cursor.col + 1)
    }

    /// Erase in display; `selective` spares protected cells
    pub fn erase_in_display(&mut self, mode: u16, selective: bool) {
        let row = self.cursor.row;
        match mode {
            0 => {
                // From cursor to end
                self.erase_in_line(0, selective);
                for r in row + 1..self.rows {
                    self.erase_cells(r, 0, self.cols, selective);
                }
            }
            1 => {
                // From start to cursor
                for r in 0..row {
                    self.erase_cells(r, 0, self.cols, selective);
                }
                self.erase_in_line(1, selective);
            }
            2 => {
                // Entire screen
                for r in 0..self.rows {
                    self.erase_cells(r, 0, self.cols, selective);
                }
            }
            3 => self.screen_mut().clear_scrollback(),
            _ => tracing::debug!("Unknown erase-in-display mode {}", mode),
        }
        self.cursor.pending_wrap = false;
    }

    /// Erase in line; `selective` spares protected cells
    pub fn erase_in_line(&mut self, mode: u16, selective: bool) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        match mode {
            0 => self.erase_cells(row, col, self.cols, selective),
            1 => self.erase_cells(row, 0, col + 1, selective),
            2 => self.erase_cells(row, 0, self.cols, selective),
            _ => tracing::debug!("Unknown erase-in-line mode {}", mode),
        }
        self.cursor.pending_wrap = false;
    }

    /// Erase characters (ECH): blank n cells from the cursor without shifting
    pub fn erase_chars(&mut self, n: u16) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let end = col.saturating_add(n).min(self.cols);
        self.erase_cells(row, col, end, false);
        self.cursor.pending_wrap = false;
    }

    fn erase_cells(&mut self, row: u16, start: u16, end: u16, selective: bool) {
        let blank = self.blank();
        let full_row = start == 0 && end >= self.cols;
        let screen = self.screen_mut();
        let Some(line) = screen.row_mut(row) else {
            return;
        };
        let end = (end as usize).min(line.cells.len());
        let start = (start as usize).min(end);
        for cell in &mut line.cells[start..end] {
            if !(selective && cell.protected) {
                *cell = blank.clone();
            }
        }
        // Erasing half of a wide character erases all of it
        if start > 0 && start < end && line.cells[start].is_continuation() {
            line.cells[start - 1] = blank.clone();
        }
        if end < line.cells.len() && line.cells[end].is_continuation() {
            line.cells[end] = blank.clone();
        }
        if full_row || end == line.cells.len() {
            line.wrapped = false;
        }
    }

    /// Insert blank characters (ICH), shifting the rest of the line right
    pub fn insert_chars(&mut self, n: u16) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let blank = self.blank();
        let Some(line) = self.screen_mut().row_mut(row) else {
            return;
        };
        let len = line.cells.len();
        let col = col as usize;
        if col >= len {
            return;
        }
        if col > 0 && line.cells[col].is_continuation() {
            line.cells[col - 1] = blank.clone();
            line.cells[col] = blank.clone();
        }
        let n = (n as usize).min(len - col);
        line.cells[col..].rotate_right(n);
        for cell in &mut line.cells[col..col + n] {
            *cell = blank.clone();
        }
        // A wide character pushed past the edge loses its right half
        if line.cells[len - 1].width == 2 {
            line.cells[len - 1] = blank;
        }
        self.cursor.pending_wrap = false;
    }

    /// Delete characters (DCH), shifting the rest of the line left
    pub fn delete_chars(&mut self, n: u16) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let blank = self.blank();
        let Some(line) = self.screen_mut().row_mut(row) else {
            return;
        };
        let len = line.cells.len();
        let col = col as usize;
        if col >= len {
            return;
        }
        let n = (n as usize).min(len - col);
        if col > 0 && line.cells[col].is_continuation() {
            line.cells[col - 1] = blank.clone();
        }
        line.cells[col..].rotate_left(n);
        for cell in &mut line.cells[len - n..] {
            *cell = blank.clone();
        }
        if line.cells[col].is_continuation() {
            line.cells[col] = blank;
        }
        self.cursor.pending_wrap = false;
    }

    /// Insert lines at cursor position (IL); no-op outside the region
    pub fn insert_lines(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region();
        let row = self.cursor.row;
        if row < top || row > bottom {
            return;
        }
        let blank = self.blank();
        self.screen_mut()
            .shift_rows(row, bottom, n, ScrollDirection::Down, &blank);
        self.carriage_return();
    }

    /// Delete lines at cursor position (DL); no-op outside the region
    pub fn delete_lines(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region();
        let row = self.cursor.row;
        if row < top || row > bottom {
            return;
        }
        let blank = self.blank();
        self.screen_mut()
            .shift_rows(row, bottom, n, ScrollDirection::Up, &blank);
        self.carriage_return();
    }

    /// Set scroll region (DECSTBM) from 1-based parameters, 0 meaning
    /// default. Invalid regions are ignored; a valid one homes the cursor.
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let top = top.max(1) - 1;
        let bottom = if bottom == 0 { self.rows } else { bottom.min(self.rows) };
        let Some(bottom) = bottom.checked_sub(1) else {
            return;
        };
        if top > bottom {
            tracing::debug!("Ignoring scroll region {}..{}", top, bottom);
            return;
        }
        self.primary.set_scroll_region(top, bottom);
        self.alternate.set_scroll_region(top, bottom);
        self.set_cursor_position(0, 0);
    }

    /// Save cursor (DECSC)
    pub fn save_cursor(&mut self) {
        let saved = SavedCursor {
            row: self.cursor.row,
            col: self.cursor.col,
            pending_wrap: self.cursor.pending_wrap,
            attrs: self.attrs,
            protected: self.protected,
            origin: self.modes.origin,
            autowrap: self.modes.autowrap,
            charsets: self.charsets,
        };
        if self.modes.alternate_screen {
            self.alternate_saved = Some(saved);
        } else {
            self.primary_saved = Some(saved);
        }
    }

    /// Restore cursor (DECRC); without a saved state the cursor goes home
    /// with default attributes
    pub fn restore_cursor(&mut self) {
        let saved = if self.modes.alternate_screen {
            self.alternate_saved.clone()
        } else {
            self.primary_saved.clone()
        };
        match saved {
            Some(saved) => {
                self.cursor.row = saved.row.min(self.rows.saturating_sub(1));
                self.cursor.col = saved.col.min(self.cols.saturating_sub(1));
                self.cursor.pending_wrap = saved.pending_wrap && saved.col < self.cols;
                self.attrs = saved.attrs;
                self.protected = saved.protected;
                self.modes.origin = saved.origin;
                self.modes.autowrap = saved.autowrap;
                self.charsets = saved.charsets;
            }
            None => {
                self.cursor.row = 0;
                self.cursor.col = 0;
                self.cursor.pending_wrap = false;
                self.attrs = SgrAttributes::default();
                self.protected = false;
                self.modes.origin = false;
                self.charsets = CharsetState::default();
            }
        }
    }

    /// ANSI save (`CSI s`): position only, independent of DECSC
    pub fn ansi_save_cursor(&mut self) {
        self.ansi_saved = Some((self.cursor.row, self.cursor.col));
    }

    /// ANSI restore (`CSI u`)
    pub fn ansi_restore_cursor(&mut self) {
        if let Some((row, col)) = self.ansi_saved {
            self.cursor.row = row.min(self.rows.saturating_sub(1));
            self.cursor.col = col.min(self.cols.saturating_sub(1));
            self.cursor.pending_wrap = false;
        }
    }

    fn enter_alternate_screen(&mut self, clear: bool) {
        if self.modes.alternate_screen {
            return;
        }
        self.primary_cursor_snapshot = Some(self.cursor.clone());
        self.modes.alternate_screen = true;
        if clear {
            let blank = self.blank();
            self.alternate.fill(&blank);
        }
        self.alternate.reset_viewport();
    }

    fn exit_alternate_screen(&mut self, clear: bool) {
        if !self.modes.alternate_screen {
            return;
        }
        if clear {
            let blank = self.blank();
            self.alternate.fill(&blank);
        }
        self.modes.alternate_screen = false;
        if let Some(snapshot) = self.primary_cursor_snapshot.take() {
            self.cursor = snapshot;
        }
    }

    /// Set ANSI mode (SM/RM)
    pub fn set_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            4 => self.modes.insert = enable,
            20 => self.modes.linefeed_newline = enable,
            _ => tracing::debug!("Unknown ANSI mode {}", mode),
        }
    }

    pub fn mode(&self, mode: u16) -> Option<bool> {
        match mode {
            4 => Some(self.modes.insert),
            20 => Some(self.modes.linefeed_newline),
            _ => None,
        }
    }

    /// Set private mode (DECSET/DECRST)
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.application_cursor = enable,
            5 => self.modes.reverse_video = enable,
            6 => {
                self.modes.origin = enable;
                self.set_cursor_position(0, 0);
            }
            7 => self.modes.autowrap = enable,
            12 => self.cursor.style.blinking = enable,
            25 => self.modes.cursor_visible = enable,
            66 => self.modes.application_keypad = enable,
            9 | 1000 | 1002 | 1003 => {
                let tracking = match mode {
                    9 => MouseTracking::X10,
                    1000 => MouseTracking::Normal,
                    1002 => MouseTracking::ButtonEvent,
                    _ => MouseTracking::AnyEvent,
                };
                if enable {
                    self.modes.mouse_tracking = tracking;
                } else if self.modes.mouse_tracking == tracking {
                    self.modes.mouse_tracking = MouseTracking::Off;
                }
            }
            1004 => self.modes.focus_reporting = enable,
            1005 | 1006 | 1015 => {
                let encoding = match mode {
                    1005 => MouseEncoding::Utf8,
                    1006 => MouseEncoding::Sgr,
                    _ => MouseEncoding::Urxvt,
                };
                if enable {
                    self.modes.mouse_encoding = encoding;
                } else if self.modes.mouse_encoding == encoding {
                    self.modes.mouse_encoding = MouseEncoding::Default;
                }
            }
            47 => {
                if enable {
                    self.enter_alternate_screen(false);
                } else {
                    self.exit_alternate_screen(false);
                }
            }
            1047 => {
                if enable {
                    self.enter_alternate_screen(true);
                } else {
                    self.exit_alternate_screen(true);
                }
            }
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    if !self.modes.alternate_screen {
                        self.save_cursor();
                        self.enter_alternate_screen(true);
                    }
                } else if self.modes.alternate_screen {
                    self.exit_alternate_screen(false);
                    self.restore_cursor();
                }
            }
            2004 => self.modes.bracketed_paste = enable,
            _ => tracing::debug!("Unknown private mode {}", mode),
        }
    }

    /// Current value of a DEC private mode, `None` when unrecognized
    pub fn private_mode(&self, mode: u16) -> Option<bool> {
        let modes = &self.modes;
        let value = match mode {
            1 => modes.application_cursor,
            5 => modes.reverse_video,
            6 => modes.origin,
            7 => modes.autowrap,
            12 => self.cursor.style.blinking,
            25 => modes.cursor_visible,
            66 => modes.application_keypad,
            9 => modes.mouse_tracking == MouseTracking::X10,
            1000 => modes.mouse_tracking == MouseTracking::Normal,
            1002 => modes.mouse_tracking == MouseTracking::ButtonEvent,
            1003 => modes.mouse_tracking == MouseTracking::AnyEvent,
            1004 => modes.focus_reporting,
            1005 => modes.mouse_encoding == MouseEncoding::Utf8,
            1006 => modes.mouse_encoding == MouseEncoding::Sgr,
            1015 => modes.mouse_encoding == MouseEncoding::Urxvt,
            47 | 1047 | 1049 => modes.alternate_screen,
            2004 => modes.bracketed_paste,
            _ => return None,
        };
        Some(value)
    }

    /// XTSAVE: remember the listed private modes (all saveable ones if empty)
    pub fn save_private_modes(&mut self, modes: &[u16]) {
        let list = if modes.is_empty() { SAVEABLE_PRIVATE_MODES } else { modes };
        for &mode in list {
            if let Some(value) = self.private_mode(mode) {
                self.modes.saved_private.insert(mode, value);
            }
        }
    }

    /// XTRESTORE: reapply previously saved private modes
    pub fn restore_private_modes(&mut self, modes: &[u16]) {
        let list: Vec<u16> = if modes.is_empty() {
            self.modes.saved_private.keys().copied().collect()
        } else {
            modes.to_vec()
        };
        for mode in list {
            if let Some(value) = self.modes.saved_private.get(&mode).copied() {
                self.set_private_mode(mode, value);
            }
        }
    }

    /// Shift-in/shift-out
    pub fn shift_charset(&mut self, slot: CharsetSlot) {
        self.charsets.shift(slot);
    }

    /// Horizontal tab (HT / CHT)
    pub fn forward_tab(&mut self, n: u16) {
        let last = self.cols.saturating_sub(1);
        for _ in 0..n {
            let mut col = self.cursor.col;
            loop {
                if col >= last {
                    col = last;
                    break;
                }
                col += 1;
                if self.tab_stops.get(col as usize).copied().unwrap_or(false) {
                    break;
                }
            }
            self.cursor.col = col;
        }
        self.cursor.pending_wrap = false;
    }

    /// Cursor backward tabulation (CBT)
    pub fn backward_tab(&mut self, n: u16) {
        for _ in 0..n {
            let mut col = self.cursor.col;
            while col > 0 {
                col -= 1;
                if self.tab_stops.get(col as usize).copied().unwrap_or(false) {
                    break;
                }
            }
            self.cursor.col = col;
        }
        self.cursor.pending_wrap = false;
    }

    /// HTS
    pub fn set_tab_stop(&mut self) {
        if let Some(stop) = self.tab_stops.get_mut(self.cursor.col as usize) {
            *stop = true;
        }
    }

    /// TBC: 0 clears the stop at the cursor, 3 clears all
    pub fn clear_tab_stop(&mut self, mode: u16) {
        match mode {
            0 => {
                if let Some(stop) = self.tab_stops.get_mut(self.cursor.col as usize) {
                    *stop = false;
                }
            }
            3 => self.tab_stops.iter_mut().for_each(|stop| *stop = false),
            _ => {}
        }
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn set_icon_name(&mut self, name: &str) {
        self.icon_name = name.to_string();
    }

    /// XTWINOPS 22: push title and icon name
    pub fn push_title(&mut self) {
        if self.title_stack.len() >= TITLE_STACK_DEPTH {
            self.title_stack.remove(0);
        }
        self.title_stack
            .push((self.title.clone(), self.icon_name.clone()));
    }

    /// XTWINOPS 23: pop title and icon name; true when something was popped
    pub fn pop_title(&mut self) -> bool {
        match self.title_stack.pop() {
            Some((title, icon)) => {
                self.title = title;
                self.icon_name = icon;
                true
            }
            None => false,
        }
    }

    /// OSC 8 with a URI opens a link for subsequently printed cells.
    pub fn open_hyperlink(&mut self, id: &str, uri: &str) {
        if let Some(link) = self.hyperlinks.get(id, uri) {
            self.hyperlink = link;
            return;
        }
        if self.hyperlinks.len() >= HYPERLINK_TABLE_LIMIT {
            let referenced = self.referenced_hyperlinks();
            self.hyperlinks.retain(&referenced);
        }
        self.hyperlink = self.hyperlinks.insert(id, uri);
    }

    /// Link ids still carried by a cell of either screen or the scrollback
    fn referenced_hyperlinks(&self) -> HashSet<u32> {
        let mut referenced = HashSet::new();
        referenced.insert(self.hyperlink);
        for screen in [&self.primary, &self.alternate] {
            let history = (0..screen.scrollback_len()).filter_map(|i| screen.scrollback_row(i));
            let grid = (0..screen.rows()).filter_map(|i| screen.row(i));
            for row in history.chain(grid) {
                referenced.extend(row.cells.iter().map(|cell| cell.hyperlink));
            }
        }
        referenced.remove(&0);
        referenced
    }

    /// Number of OSC 8 targets currently remembered
    pub fn hyperlink_count(&self) -> usize {
        self.hyperlinks.len()
    }

    pub fn close_hyperlink(&mut self) {
        self.hyperlink = 0;
    }

    pub fn hyperlink_uri(&self, link: u32) -> Option<&str> {
        self.hyperlinks.uri(link)
    }

    /// DECALN: fill the screen with `E` and reset margins
    pub fn screen_alignment(&mut self) {
        self.primary.reset_scroll_region();
        self.alternate.reset_scroll_region();
        let cell = Cell::new('E', 1, SgrAttributes::default());
        self.screen_mut().fill(&cell);
        self.set_cursor_position(0, 0);
    }

    /// DECSTR
    pub fn soft_reset(&mut self) {
        self.modes.insert = false;
        self.modes.origin = false;
        self.modes.autowrap = true;
        self.modes.cursor_visible = true;
        self.modes.application_keypad = false;
        self.modes.application_cursor = false;
        self.primary.reset_scroll_region();
        self.alternate.reset_scroll_region();
        self.attrs = SgrAttributes::default();
        self.protected = false;
        self.charsets = CharsetState::default();
        self.cursor.pending_wrap = false;
        self.primary_saved = None;
        self.alternate_saved = None;
    }

    /// RIS: everything back to power-on state except size and policy
    pub fn full_reset(&mut self) {
        let limit = self.primary.scrollback_limit();
        *self = Self::new(self.cols, self.rows, limit, self.sgr21_policy);
    }
}

fn default_tab_stops(cols: u16) -> Vec<bool> {
    (0..cols)
        .map(|c| c != 0 && c % TAB_WIDTH == 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::attrs::Color;

    fn state(cols: u16, rows: u16) -> TerminalState {
        TerminalState::new(cols, rows, 100, Sgr21Policy::default())
    }

    fn print_str(state: &mut TerminalState, s: &str) {
        for ch in s.chars() {
            state.print(ch);
        }
    }

    #[test]
    fn test_deferred_wrap() {
        let mut state = state(5, 3);
        print_str(&mut state, "abcde");
        assert_eq!((state.cursor.row, state.cursor.col), (0, 4));
        assert!(state.cursor.pending_wrap);
        print_str(&mut state, "f");
        assert_eq!(state.screen().row_text(1), "f");
        assert!(state.screen().row(0).is_some_and(|r| r.wrapped));
        assert_eq!((state.cursor.row, state.cursor.col), (1, 1));
    }

    #[test]
    fn test_no_autowrap_overwrites_last_column() {
        let mut state = state(3, 2);
        state.set_private_mode(7, false);
        print_str(&mut state, "abcd");
        assert_eq!(state.screen().row_text(0), "abd");
        assert_eq!(state.cursor.row, 0);
    }

    #[test]
    fn test_wide_characters() {
        let mut state = state(5, 2);
        print_str(&mut state, "a日");
        let row = state.screen().get_row(0).map(<[Cell]>::to_vec).unwrap_or_default();
        assert_eq!(row[1].character, '日');
        assert_eq!(row[1].width, 2);
        assert!(row[2].is_continuation());
        assert_eq!(state.cursor.col, 3);

        // Overwriting the right half blanks the left half
        state.set_column(2);
        state.print('x');
        assert_eq!(state.screen().row_text(0), "a x");
    }

    #[test]
    fn test_wide_char_wraps_at_last_column() {
        let mut state = state(3, 2);
        print_str(&mut state, "ab日");
        assert_eq!(state.screen().row_text(0), "ab");
        assert_eq!(state.screen().row_text(1), "日");
    }

    #[test]
    fn test_combining_mark_joins_previous_cell() {
        let mut state = state(5, 1);
        print_str(&mut state, "e\u{301}x");
        assert_eq!(state.screen().row_text(0), "e\u{301}x");
        assert_eq!(state.cursor.col, 2);
    }

    #[test]
    fn test_cursor_moves_clamp_to_screen() {
        let mut state = state(10, 5);
        state.cursor_down(100);
        assert_eq!(state.cursor.row, 4);
        state.cursor_forward(100);
        assert_eq!(state.cursor.col, 9);
        state.cursor_up(100);
        state.cursor_backward(100);
        assert_eq!((state.cursor.row, state.cursor.col), (0, 0));
    }

    #[test]
    fn test_relative_moves_ignore_region_without_origin_mode() {
        let mut state = state(10, 10);
        state.set_scroll_region(3, 6);
        state.set_cursor_position(4, 0);
        state.cursor_down(100);
        assert_eq!(state.cursor.row, 9);
        state.cursor_up(100);
        assert_eq!(state.cursor.row, 0);
    }

    #[test]
    fn test_origin_mode_confines_cursor_to_region() {
        let mut state = state(10, 10);
        state.set_scroll_region(3, 6);
        state.set_private_mode(6, true);
        assert_eq!(state.cursor.row, 2);
        state.cursor_down(100);
        assert_eq!(state.cursor.row, 5);
        state.cursor_position(1, 1);
        assert_eq!(state.cursor.row, 2);
        assert_eq!(state.reported_position(), (1, 1));
    }

    #[test]
    fn test_invalid_scroll_region_is_ignored() {
        let mut state = state(10, 10);
        state.set_scroll_region(6, 3);
        assert_eq!(state.scroll_region(), (0, 9));
        state.set_scroll_region(2, 50);
        assert_eq!(state.scroll_region(), (1, 9));
    }

    #[test]
    fn test_linefeed_in_region_scrolls_region_only() {
        let mut state = state(3, 4);
        for (i, s) in ["a", "b", "c", "d"].iter().enumerate() {
            state.set_cursor_position(i as u16, 0);
            print_str(&mut state, s);
        }
        state.set_scroll_region(2, 3);
        state.set_cursor_position(2, 0);
        state.linefeed();
        assert_eq!(state.screen().text(), "a\nc\n\nd");
        assert_eq!(state.screen().scrollback_len(), 0);
    }

    #[test]
    fn test_erase_uses_background_color() {
        let mut state = state(4, 2);
        print_str(&mut state, "abcd");
        state.attrs.bg = Some(Color::Named(4));
        state.set_column(1);
        state.erase_in_line(0, false);
        let cells = state.screen().get_row(0).map(<[Cell]>::to_vec).unwrap_or_default();
        assert_eq!(cells[0].character, 'a');
        assert_eq!(cells[1].attrs.bg, Some(Color::Named(4)));
        assert_eq!(state.screen().row_text(0), "a");
    }

    #[test]
    fn test_selective_erase_skips_protected() {
        let mut state = state(6, 1);
        print_str(&mut state, "ab");
        state.protected = true;
        print_str(&mut state, "cd");
        state.protected = false;
        print_str(&mut state, "ef");
        state.erase_in_line(2, true);
        assert_eq!(state.screen().row_text(0), "  cd");
        state.erase_in_line(2, false);
        assert_eq!(state.screen().row_text(0), "");
    }

    #[test]
    fn test_erase_display_modes() {
        let mut state = state(3, 3);
        for r in 0..3 {
            state.set_cursor_position(r, 0);
            print_str(&mut state, "xyz");
        }
        state.set_cursor_position(1, 1);
        state.erase_in_display(0, false);
        assert_eq!(state.screen().text(), "xyz\nx\n");
        state.erase_in_display(1, false);
        assert_eq!(state.screen().text(), "\n\n");
    }

    #[test]
    fn test_insert_and_delete_chars() {
        let mut state = state(5, 1);
        print_str(&mut state, "abcde");
        state.set_column(1);
        state.insert_chars(2);
        assert_eq!(state.screen().row_text(0), "a  bc");
        state.delete_chars(3);
        assert_eq!(state.screen().row_text(0), "ac");
        state.erase_chars(10);
        assert_eq!(state.screen().row_text(0), "a");
    }

    #[test]
    fn test_insert_and_delete_lines() {
        let mut state = state(2, 4);
        for (i, s) in ["a", "b", "c", "d"].iter().enumerate() {
            state.set_cursor_position(i as u16, 0);
            print_str(&mut state, s);
        }
        state.set_cursor_position(1, 1);
        state.insert_lines(1);
        assert_eq!(state.screen().text(), "a\n\nb\nc");
        assert_eq!(state.cursor.col, 0);
        state.delete_lines(2);
        assert_eq!(state.screen().text(), "a\nc\n\n");
        assert_eq!(state.screen().scrollback_len(), 0);
    }

    #[test]
    fn test_dec_and_ansi_saves_are_independent() {
        let mut state = state(10, 10);
        state.set_cursor_position(2, 3);
        state.attrs.fg = Some(Color::Named(1));
        state.save_cursor();
        state.set_cursor_position(5, 6);
        state.ansi_save_cursor();

        state.set_cursor_position(0, 0);
        state.attrs.reset();
        state.restore_cursor();
        assert_eq!((state.cursor.row, state.cursor.col), (2, 3));
        assert_eq!(state.attrs.fg, Some(Color::Named(1)));

        state.ansi_restore_cursor();
        assert_eq!((state.cursor.row, state.cursor.col), (5, 6));
        assert_eq!(state.attrs.fg, Some(Color::Named(1)));
    }

    #[test]
    fn test_alternate_screen_restores_primary() {
        for mode in [47, 1047, 1049] {
            let mut state = state(6, 3);
            print_str(&mut state, "hello");
            state.set_cursor_position(1, 2);
            let before = state.primary_screen().text();

            state.set_private_mode(mode, true);
            assert!(state.modes.alternate_screen);
            state.set_cursor_position(2, 4);
            print_str(&mut state, "junk");
            state.erase_in_display(2, false);
            print_str(&mut state, "more");

            state.set_private_mode(mode, false);
            assert!(!state.modes.alternate_screen);
            assert_eq!(state.screen().text(), before, "mode {}", mode);
            assert_eq!((state.cursor.row, state.cursor.col), (1, 2), "mode {}", mode);
        }
    }

    #[test]
    fn test_alternate_screen_has_no_scrollback() {
        let mut state = state(3, 2);
        state.set_private_mode(1049, true);
        for _ in 0..5 {
            state.linefeed();
        }
        assert_eq!(state.screen().scrollback_len(), 0);
        assert_eq!(state.primary_screen().scrollback_len(), 0);
    }

    #[test]
    fn test_xtsave_and_restore() {
        let mut state = state(10, 5);
        state.set_private_mode(2004, true);
        state.save_private_modes(&[2004, 7]);
        state.set_private_mode(2004, false);
        state.set_private_mode(7, false);
        state.restore_private_modes(&[2004]);
        assert!(state.modes.bracketed_paste);
        assert!(!state.modes.autowrap);
        state.restore_private_modes(&[]);
        assert!(state.modes.autowrap);
    }

    #[test]
    fn test_tab_stops() {
        let mut state = state(20, 1);
        state.forward_tab(1);
        assert_eq!(state.cursor.col, 8);
        state.forward_tab(5);
        assert_eq!(state.cursor.col, 19);
        state.backward_tab(1);
        assert_eq!(state.cursor.col, 16);

        state.clear_tab_stop(3);
        state.set_column(3);
        state.set_tab_stop();
        state.set_column(0);
        state.forward_tab(1);
        assert_eq!(state.cursor.col, 3);
    }

    #[test]
    fn test_resize_clamps_cursor() {
        let mut state = state(10, 10);
        state.set_cursor_position(9, 9);
        state.resize(4, 3);
        assert_eq!((state.cursor.row, state.cursor.col), (2, 3));
        assert_eq!(state.scroll_region(), (0, 2));
    }

    #[test]
    fn test_full_reset_keeps_size() {
        let mut state = state(10, 4);
        print_str(&mut state, "abc");
        state.set_title("t");
        state.full_reset();
        assert_eq!(state.screen().text(), "\n\n\n");
        assert_eq!((state.cols(), state.rows()), (10, 4));
        assert!(state.title.is_empty());
    }

    #[test]
    fn test_hyperlink_ids() {
        let mut state = state(10, 1);
        state.open_hyperlink("", "https://example.com");
        print_str(&mut state, "a");
        state.close_hyperlink();
        print_str(&mut state, "b");
        let cells = state.screen().get_row(0).map(<[Cell]>::to_vec).unwrap_or_default();
        assert_eq!(state.hyperlink_uri(cells[0].hyperlink), Some("https://example.com"));
        assert_eq!(cells[1].hyperlink, 0);
    }

    #[test]
    fn test_links_without_id_share_an_entry() {
        let mut state = state(10, 1);
        state.open_hyperlink("", "file:///tmp/a");
        let first = state.hyperlink;
        state.close_hyperlink();
        state.open_hyperlink("", "file:///tmp/a");
        assert_eq!(state.hyperlink, first);
        state.open_hyperlink("other", "file:///tmp/a");
        assert_ne!(state.hyperlink, first);
        assert_eq!(state.hyperlink_count(), 2);
    }

    #[test]
    fn test_hyperlink_table_reclaims_erased_links() {
        let mut state = state(20, 3);
        state.open_hyperlink("", "file:///tmp/keep");
        print_str(&mut state, "k");
        state.close_hyperlink();

        for n in 0..20_000 {
            state.set_cursor_position(1, 0);
            state.open_hyperlink("", &format!("file:///tmp/f{}", n));
            print_str(&mut state, "f");
            state.close_hyperlink();
            state.erase_in_line(2, false);
        }

        assert!(state.hyperlink_count() <= HYPERLINK_TABLE_LIMIT);
        let kept = state.screen().cell(0, 0).map_or(0, |cell| cell.hyperlink);
        assert_eq!(state.hyperlink_uri(kept), Some("file:///tmp/keep"));
    }

    #[test]
    fn test_repeat_last_character() {
        let mut state = state(10, 1);
        print_str(&mut state, "x");
        state.repeat_last(3);
        assert_eq!(state.screen().row_text(0), "xxxx");
    }
}
