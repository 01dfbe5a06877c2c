//! Screen buffer with scrollback
//!
//! A fixed `cols x rows` grid of [`Cell`]s plus a bounded scrollback store.
//! Rows scrolled off the top of a region that starts at row 0 are moved
//! into scrollback; once the cap is reached the oldest rows are evicted.

use std::collections::VecDeque;

use super::attrs::Cell;

/// Default number of scrollback rows kept for the primary screen.
pub const DEFAULT_SCROLLBACK_LIMIT: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Content moves up, blank rows appear at the bottom
    Up,
    /// Content moves down, blank rows appear at the top
    Down,
}

/// A single row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// The row's last column flowed into the next row through autowrap
    pub wrapped: bool,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self::filled(cols, &Cell::default())
    }

    pub fn filled(cols: u16, blank: &Cell) -> Self {
        Self {
            cells: vec![blank.clone(); cols as usize],
            wrapped: false,
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        let new_cols = new_cols as usize;
        self.cells.resize(new_cols, Cell::default());
        // A wide character cut in half loses its glyph
        if let Some(last) = self.cells.last_mut() {
            if last.width == 2 {
                *last = Cell::blank(&last.attrs);
            }
        }
    }

    pub fn fill(&mut self, blank: &Cell) {
        for cell in &mut self.cells {
            *cell = blank.clone();
        }
        self.wrapped = false;
    }

    /// Text of the row with trailing blanks removed.
    pub fn text(&self) -> String {
        let mut s: String = self.cells.iter().map(Cell::text).collect();
        let trimmed = s.trim_end_matches(' ').len();
        s.truncate(trimmed);
        s
    }
}

pub struct ScreenBuffer {
    cols: u16,
    rows: u16,
    grid: Vec<Row>,
    scrollback: VecDeque<Row>,
    scrollback_limit: usize,
    /// Scroll region, 0-indexed and inclusive
    scroll_top: u16,
    scroll_bottom: u16,
    /// 0 = live view, >0 = rows scrolled back into history
    viewport_offset: usize,
}

impl ScreenBuffer {
    pub fn new(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            cols,
            rows,
            grid: (0..rows).map(|_| Row::new(cols)).collect(),
            scrollback: VecDeque::new(),
            scrollback_limit,
            scroll_top: 0,
            scroll_bottom: rows.saturating_sub(1),
            viewport_offset: 0,
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn write_char(&mut self, row: u16, col: u16, cell: Cell) {
        if let Some(slot) = self.cell_mut(row, col) {
            *slot = cell;
        }
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        self.grid.get(row as usize)?.cells.get(col as usize)
    }

    pub fn cell_mut(&mut self, row: u16, col: u16) -> Option<&mut Cell> {
        self.grid.get_mut(row as usize)?.cells.get_mut(col as usize)
    }

    pub fn get_row(&self, row: u16) -> Option<&[Cell]> {
        self.grid.get(row as usize).map(|r| r.cells.as_slice())
    }

    pub fn row(&self, row: u16) -> Option<&Row> {
        self.grid.get(row as usize)
    }

    pub fn row_mut(&mut self, row: u16) -> Option<&mut Row> {
        self.grid.get_mut(row as usize)
    }

    pub fn row_text(&self, row: u16) -> String {
        self.row(row).map(Row::text).unwrap_or_default()
    }

    /// Visible grid as text, one line per row.
    pub fn text(&self) -> String {
        self.grid.iter().map(Row::text).collect::<Vec<_>>().join("\n")
    }

    pub fn fill(&mut self, blank: &Cell) {
        for row in &mut self.grid {
            row.fill(blank);
        }
    }

    pub fn scroll_region(&self) -> (u16, u16) {
        (self.scroll_top, self.scroll_bottom)
    }

    /// Set the region, rejecting anything but `top <= bottom < rows`.
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) -> bool {
        if top <= bottom && bottom < self.rows {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
            true
        } else {
            false
        }
    }

    pub fn reset_scroll_region(&mut self) {
        self.scroll_top = 0;
        self.scroll_bottom = self.rows.saturating_sub(1);
    }

    /// Scroll rows `top..=bottom` by `count`, blank-filling with default cells.
    pub fn scroll(&mut self, top: u16, bottom: u16, count: u16, direction: ScrollDirection) {
        self.scroll_with(top, bottom, count, direction, &Cell::default());
    }

    /// Scroll rows `top..=bottom`, filling exposed rows with `blank`.
    ///
    /// Scrolling up a region anchored at row 0 feeds scrollback.
    pub fn scroll_with(
        &mut self,
        top: u16,
        bottom: u16,
        count: u16,
        direction: ScrollDirection,
        blank: &Cell,
    ) {
        let removed = self.rotate(top, bottom, count, direction, blank);
        if direction == ScrollDirection::Up && top == 0 {
            for row in removed {
                self.push_scrollback(row);
            }
        }
    }

    /// Shift rows without touching scrollback (insert/delete line).
    pub fn shift_rows(
        &mut self,
        top: u16,
        bottom: u16,
        count: u16,
        direction: ScrollDirection,
        blank: &Cell,
    ) {
        self.rotate(top, bottom, count, direction, blank);
    }

    fn rotate(
        &mut self,
        top: u16,
        bottom: u16,
        count: u16,
        direction: ScrollDirection,
        blank: &Cell,
    ) -> Vec<Row> {
        let top = top as usize;
        let bottom = (bottom as usize).min(self.grid.len().saturating_sub(1));
        if self.grid.is_empty() || top > bottom || count == 0 {
            return Vec::new();
        }
        let height = bottom - top + 1;
        let n = (count as usize).min(height);
        let cols = self.cols;
        let region = &mut self.grid[top..=bottom];
        let exposed = match direction {
            ScrollDirection::Up => {
                region.rotate_left(n);
                height - n..height
            }
            ScrollDirection::Down => {
                region.rotate_right(n);
                0..n
            }
        };
        exposed
            .map(|i| std::mem::replace(&mut region[i], Row::filled(cols, blank)))
            .collect()
    }

    pub fn push_scrollback(&mut self, row: Row) {
        if self.scrollback_limit == 0 {
            return;
        }
        self.scrollback.push_back(row);
        while self.scrollback.len() > self.scrollback_limit {
            self.scrollback.pop_front();
        }
        // Keep a scrolled-back viewport pinned to the same history
        if self.viewport_offset > 0 {
            self.viewport_offset = (self.viewport_offset + 1).min(self.scrollback.len());
        }
    }

    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    pub fn scrollback_limit(&self) -> usize {
        self.scrollback_limit
    }

    pub fn set_scrollback_limit(&mut self, limit: usize) {
        self.scrollback_limit = limit;
        while self.scrollback.len() > limit {
            self.scrollback.pop_front();
        }
        self.viewport_offset = self.viewport_offset.min(self.scrollback.len());
    }

    /// Scrollback row by age, 0 being the oldest kept row.
    pub fn scrollback_row(&self, index: usize) -> Option<&Row> {
        self.scrollback.get(index)
    }

    pub fn clear_scrollback(&mut self) {
        self.scrollback.clear();
        self.viewport_offset = 0;
    }

    /// Clip or blank-pad to the new size, keeping content anchored at the
    /// top-left corner. The scroll region resets to the full screen.
    pub fn resize(&mut self, new_cols: u16, new_rows: u16) {
        self.grid.truncate(new_rows as usize);
        while self.grid.len() < new_rows as usize {
            self.grid.push(Row::new(new_cols));
        }

        for row in &mut self.grid {
            row.resize(new_cols);
        }

        // Also resize scrollback rows
        for row in &mut self.scrollback {
            row.resize(new_cols);
        }

        self.cols = new_cols;
        self.rows = new_rows;
        self.reset_scroll_region();
        self.viewport_offset = self.viewport_offset.min(self.scrollback.len());
    }

    pub fn viewport_offset(&self) -> usize {
        self.viewport_offset
    }

    /// Scroll view up by n lines
    pub fn scroll_viewport_up(&mut self, n: usize) {
        self.viewport_offset = (self.viewport_offset + n).min(self.scrollback.len());
    }

    /// Scroll view down by n lines
    pub fn scroll_viewport_down(&mut self, n: usize) {
        self.viewport_offset = self.viewport_offset.saturating_sub(n);
    }

    pub fn reset_viewport(&mut self) {
        self.viewport_offset = 0;
    }

    pub fn viewport(&self) -> Viewport<'_> {
        Viewport {
            buffer: self,
            offset: self.viewport_offset,
        }
    }
}

/// Read-only window of `rows` lines over scrollback plus the grid.
#[derive(Clone, Copy)]
pub struct Viewport<'a> {
    buffer: &'a ScreenBuffer,
    offset: usize,
}

impl<'a> Viewport<'a> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rows(&self) -> u16 {
        self.buffer.rows
    }

    pub fn cols(&self) -> u16 {
        self.buffer.cols
    }

    /// Visible line `index` of the window, counting from its top.
    pub fn row(&self, index: usize) -> Option<&'a Row> {
        if index >= self.buffer.rows as usize {
            return None;
        }
        let history = self.buffer.scrollback.len();
        let absolute = history.saturating_sub(self.offset) + index;
        if absolute < history {
            self.buffer.scrollback.get(absolute)
        } else {
            self.buffer.grid.get(absolute - history)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Row> + '_ {
        (0..self.buffer.rows as usize).filter_map(move |i| self.row(i))
    }

    pub fn text(&self) -> String {
        self.iter().map(Row::text).collect::<Vec<_>>().join("\n")
    }
}
