//! Property-based invariant tests for the terminal emulator.
//!
//! Verifies:
//! 1. Arbitrary bytes never panic and keep the cursor on the grid
//! 2. Splitting the input at any point gives the same screen
//! 3. Resizing keeps the cursor inside the new grid
//! 4. Scrollback never grows past its limit

use headterm::{TerminalEmulator, TerminalOptions};
use proptest::prelude::*;

// ── Strategy helpers ──────────────────────────────────────────────────

/// Bytes biased towards escape sequences
fn arb_terminal_bytes() -> impl Strategy<Value = Vec<u8>> {
    let chunk = prop_oneof![
        4 => proptest::collection::vec(any::<u8>(), 0..16),
        2 => "[ -~]{0,12}".prop_map(String::into_bytes),
        2 => (0u16..300, 0u16..300, prop::sample::select(b"ABCDHJKLMPSTX@`dfghlmnqrs".to_vec()))
            .prop_map(|(a, b, f)| format!("\x1b[{};{}{}", a, b, f as char).into_bytes()),
        1 => (prop::sample::select(vec![1u16, 6, 7, 25, 47, 1047, 1049, 2004]), any::<bool>())
            .prop_map(|(m, set)| format!("\x1b[?{}{}", m, if set { 'h' } else { 'l' }).into_bytes()),
        1 => "[a-z ]{0,8}".prop_map(|t| format!("\x1b]2;{}\x07", t).into_bytes()),
        1 => Just(b"\r\n".to_vec()),
        1 => Just("日本語é\u{301}".as_bytes().to_vec()),
    ];
    proptest::collection::vec(chunk, 0..40).prop_map(|chunks| chunks.concat())
}

fn emulator(cols: u16, rows: u16, scrollback_limit: usize) -> TerminalEmulator {
    TerminalEmulator::new(TerminalOptions {
        cols,
        rows,
        scrollback_limit,
        ..TerminalOptions::default()
    })
    .expect("valid size")
}

fn assert_cursor_on_grid(term: &TerminalEmulator) {
    let cursor = term.cursor();
    assert!(cursor.row < term.rows(), "row {} of {}", cursor.row, term.rows());
    assert!(cursor.col < term.cols(), "col {} of {}", cursor.col, term.cols());
}

// ── Properties ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn garbage_never_escapes_the_grid(
        bytes in arb_terminal_bytes(),
        cols in 1u16..120,
        rows in 1u16..50,
    ) {
        let mut term = emulator(cols, rows, 100);
        term.write(&bytes);
        term.flush();
        assert_cursor_on_grid(&term);
        prop_assert!(term.screen_text().lines().count() <= rows as usize);
    }

    #[test]
    fn split_point_does_not_change_result(
        bytes in arb_terminal_bytes(),
        split in any::<prop::sample::Index>(),
    ) {
        let at = split.index(bytes.len() + 1);

        let mut whole = emulator(40, 10, 50);
        whole.write(&bytes);

        let mut pieces = emulator(40, 10, 50);
        pieces.write(&bytes[..at]);
        pieces.write(&bytes[at..]);

        prop_assert_eq!(whole.screen_text(), pieces.screen_text());
        prop_assert_eq!(whole.cursor(), pieces.cursor());
        prop_assert_eq!(whole.title(), pieces.title());
    }

    #[test]
    fn resize_keeps_cursor_on_grid(
        bytes in arb_terminal_bytes(),
        sizes in proptest::collection::vec((1u16..200, 1u16..80), 1..6),
    ) {
        let mut term = emulator(80, 24, 100);
        term.write(&bytes);
        for (cols, rows) in sizes {
            term.resize(cols, rows).expect("valid size");
            prop_assert_eq!(term.cols(), cols);
            prop_assert_eq!(term.rows(), rows);
            assert_cursor_on_grid(&term);
            term.write(b"x\r\ny");
            assert_cursor_on_grid(&term);
        }
    }

    #[test]
    fn scrollback_respects_limit(
        lines in 0usize..200,
        limit in 0usize..40,
        rows in 1u16..10,
    ) {
        let mut term = emulator(20, rows, limit);
        for i in 0..lines {
            term.write_str(&format!("line {}\r\n", i));
        }
        let kept = term.state().primary_screen().scrollback_len();
        prop_assert!(kept <= limit);
        prop_assert_eq!(kept, lines.saturating_sub(rows as usize - 1).min(limit));
    }
}
