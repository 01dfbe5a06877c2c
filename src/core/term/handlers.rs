//! Message handlers
//!
//! Maps parsed [`Message`]s onto [`TerminalState`] mutations. Anything the
//! child process asked for (reports, title changes, clipboard access) is
//! pushed onto the caller's event queue.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::charset::{Charset, CharsetSlot};
use super::emulator::{ClipboardRequest, TerminalEvent};
use super::message::{Message, Params, StringTerminator};
use super::sgr::{apply_sgr, encode_sgr};
use super::state::{CursorStyle, TerminalState};

/// Colors reported for OSC 10/11 until the application overrides them
pub const DEFAULT_FOREGROUND: (u8, u8, u8) = (229, 229, 229);
pub const DEFAULT_BACKGROUND: (u8, u8, u8) = (0, 0, 0);

/// Response that needs to be sent back to the PTY
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Device status: ESC [ 0 n
    DeviceStatus,
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// DEC extended cursor position report: ESC [ ? row ; col ; page R
    ExtendedCursorPosition(u16, u16),
    /// Device attributes response
    DeviceAttributes,
    /// Secondary device attributes response
    SecondaryDeviceAttributes,
    /// Tertiary device attributes (unit id)
    TertiaryDeviceAttributes,
    /// DECRQM reply; value 0 = unknown, 1 = set, 2 = reset
    ModeReport { private: bool, mode: u16, value: u8 },
    /// Text area size in characters
    WindowSize { rows: u16, cols: u16 },
    /// DECRQSS reply, `None` for an invalid request
    StatusString(Option<String>),
    /// OSC 10/11 color query reply
    DynamicColor {
        code: u16,
        rgb: (u8, u8, u8),
        terminator: StringTerminator,
    },
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::DeviceStatus => b"\x1b[0n".to_vec(),
            Response::CursorPosition(row, col) => format!("\x1b[{};{}R", row, col).into_bytes(),
            Response::ExtendedCursorPosition(row, col) => {
                format!("\x1b[?{};{};1R", row, col).into_bytes()
            }
            Response::DeviceAttributes => {
                // VT220 with ANSI color
                b"\x1b[?62;22c".to_vec()
            }
            Response::SecondaryDeviceAttributes => {
                // VT220 response
                b"\x1b[>1;10;0c".to_vec()
            }
            Response::TertiaryDeviceAttributes => b"\x1bP!|00000000\x1b\\".to_vec(),
            Response::ModeReport {
                private,
                mode,
                value,
            } => {
                let marker = if *private { "?" } else { "" };
                format!("\x1b[{}{};{}$y", marker, mode, value).into_bytes()
            }
            Response::WindowSize { rows, cols } => format!("\x1b[8;{};{}t", rows, cols).into_bytes(),
            Response::StatusString(Some(text)) => format!("\x1bP1$r{}\x1b\\", text).into_bytes(),
            Response::StatusString(None) => b"\x1bP0$r\x1b\\".to_vec(),
            Response::DynamicColor {
                code,
                rgb: (r, g, b),
                terminator,
            } => {
                // 8-bit components widened to 16 bits, as xterm reports them
                let mut out = format!(
                    "\x1b]{};rgb:{:04x}/{:04x}/{:04x}",
                    code,
                    *r as u16 * 257,
                    *g as u16 * 257,
                    *b as u16 * 257
                )
                .into_bytes();
                out.extend_from_slice(terminator.as_bytes());
                out
            }
        }
    }
}

/// Build the OSC 52 reply answering a clipboard query.
pub fn clipboard_reply(selection: &str, contents: &[u8], terminator: StringTerminator) -> Vec<u8> {
    let mut out = format!("\x1b]52;{};{}", selection, STANDARD.encode(contents)).into_bytes();
    out.extend_from_slice(terminator.as_bytes());
    out
}

/// A decoded control sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsiCommand {
    CursorUp(u16),
    CursorDown(u16),
    CursorForward(u16),
    CursorBackward(u16),
    NextLine(u16),
    PrecedingLine(u16),
    /// 1-based column (CHA, HPA)
    CursorColumn(u16),
    /// 1-based row (VPA)
    CursorRow(u16),
    /// 1-based position (CUP, HVP)
    CursorPosition { row: u16, col: u16 },
    ForwardTab(u16),
    BackwardTab(u16),
    EraseInDisplay { mode: u16, selective: bool },
    EraseInLine { mode: u16, selective: bool },
    EraseChars(u16),
    ScrollUp(u16),
    ScrollDown(u16),
    InsertLines(u16),
    DeleteLines(u16),
    InsertChars(u16),
    DeleteChars(u16),
    Repeat(u16),
    TabClear(u16),
    SetMode { modes: Vec<u16>, enable: bool },
    SetPrivateMode { modes: Vec<u16>, enable: bool },
    DeviceStatus(u16),
    PrivateDeviceStatus(u16),
    PrimaryDeviceAttributes,
    SecondaryDeviceAttributes,
    TertiaryDeviceAttributes,
    SetScrollRegion { top: u16, bottom: u16 },
    SaveCursor,
    RestoreCursor,
    SavePrivateModes(Vec<u16>),
    RestorePrivateModes(Vec<u16>),
    WindowOp(Vec<u16>),
    CursorStyle(u16),
    Protection(u16),
    SoftReset,
    RequestMode(u16),
    RequestPrivateMode(u16),
    Unknown,
}

impl CsiCommand {
    pub fn parse(prefix: Option<u8>, params: &Params, intermediates: &[u8], command: u8) -> Self {
        let n = || params.get_nonzero(0, 1);
        let all = || params.values().collect::<Vec<_>>();

        match (prefix, intermediates, command) {
            // Cursor movement
            (None, [], b'A') => CsiCommand::CursorUp(n()),
            (None, [], b'B' | b'e') => CsiCommand::CursorDown(n()),
            (None, [], b'C' | b'a') => CsiCommand::CursorForward(n()),
            (None, [], b'D') => CsiCommand::CursorBackward(n()),
            (None, [], b'E') => CsiCommand::NextLine(n()),
            (None, [], b'F') => CsiCommand::PrecedingLine(n()),
            (None, [], b'G' | b'`') => CsiCommand::CursorColumn(n()),
            (None, [], b'd') => CsiCommand::CursorRow(n()),
            (None, [], b'H' | b'f') => CsiCommand::CursorPosition {
                row: params.get_nonzero(0, 1),
                col: params.get_nonzero(1, 1),
            },
            (None, [], b'I') => CsiCommand::ForwardTab(n()),
            (None, [], b'Z') => CsiCommand::BackwardTab(n()),

            // Erase
            (None | Some(b'?'), [], b'J') => CsiCommand::EraseInDisplay {
                mode: params.get_or(0, 0),
                selective: prefix.is_some(),
            },
            (None | Some(b'?'), [], b'K') => CsiCommand::EraseInLine {
                mode: params.get_or(0, 0),
                selective: prefix.is_some(),
            },
            (None, [], b'X') => CsiCommand::EraseChars(n()),

            // Scroll and editing
            (None, [], b'S') => CsiCommand::ScrollUp(n()),
            (None, [], b'T') => CsiCommand::ScrollDown(n()),
            (None, [], b'L') => CsiCommand::InsertLines(n()),
            (None, [], b'M') => CsiCommand::DeleteLines(n()),
            (None, [], b'@') => CsiCommand::InsertChars(n()),
            (None, [], b'P') => CsiCommand::DeleteChars(n()),
            (None, [], b'b') => CsiCommand::Repeat(n()),
            (None, [], b'g') => CsiCommand::TabClear(params.get_or(0, 0)),

            // Modes
            (None, [], b'h' | b'l') => CsiCommand::SetMode {
                modes: all(),
                enable: command == b'h',
            },
            (Some(b'?'), [], b'h' | b'l') => CsiCommand::SetPrivateMode {
                modes: all(),
                enable: command == b'h',
            },
            (None, [b'$'], b'p') => CsiCommand::RequestMode(params.get_or(0, 0)),
            (Some(b'?'), [b'$'], b'p') => CsiCommand::RequestPrivateMode(params.get_or(0, 0)),
            (Some(b'?'), [], b's') => CsiCommand::SavePrivateModes(all()),
            (Some(b'?'), [], b'r') => CsiCommand::RestorePrivateModes(all()),

            // Reports
            (None, [], b'n') => CsiCommand::DeviceStatus(params.get_or(0, 0)),
            (Some(b'?'), [], b'n') => CsiCommand::PrivateDeviceStatus(params.get_or(0, 0)),
            (None, [], b'c') if params.get_or(0, 0) == 0 => CsiCommand::PrimaryDeviceAttributes,
            (Some(b'>'), [], b'c') if params.get_or(0, 0) == 0 => {
                CsiCommand::SecondaryDeviceAttributes
            }
            (Some(b'='), [], b'c') if params.get_or(0, 0) == 0 => {
                CsiCommand::TertiaryDeviceAttributes
            }

            (None, [], b'r') => CsiCommand::SetScrollRegion {
                top: params.get_or(0, 0),
                bottom: params.get_or(1, 0),
            },
            (None, [], b's') => CsiCommand::SaveCursor,
            (None, [], b'u') => CsiCommand::RestoreCursor,
            (None, [], b't') => CsiCommand::WindowOp(all()),
            (None, [b' '], b'q') => CsiCommand::CursorStyle(params.get_or(0, 0)),
            (None, [b'"'], b'q') => CsiCommand::Protection(params.get_or(0, 0)),
            (None, [b'!'], b'p') => CsiCommand::SoftReset,
            _ => CsiCommand::Unknown,
        }
    }
}

/// An operating system command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscCommand {
    SetTitleAndIcon(String),
    SetIconName(String),
    SetTitle(String),
    /// OSC 8; an empty URI closes the current link
    Hyperlink { id: String, uri: String },
    /// OSC 10/11 with one or more `;`-separated specs, each either `?`
    /// or a color
    DynamicColors { first: u16, specs: Vec<String> },
    ResetDynamicColor(u16),
    Clipboard { selection: String, payload: String },
    Unknown,
}

impl OscCommand {
    pub fn parse(command: Option<u16>, data: &str) -> Self {
        match command {
            Some(0) => OscCommand::SetTitleAndIcon(data.to_string()),
            Some(1) => OscCommand::SetIconName(data.to_string()),
            Some(2) => OscCommand::SetTitle(data.to_string()),
            Some(8) => match data.split_once(';') {
                Some((params, uri)) => OscCommand::Hyperlink {
                    id: params
                        .split(':')
                        .find_map(|kv| kv.strip_prefix("id="))
                        .unwrap_or_default()
                        .to_string(),
                    uri: uri.to_string(),
                },
                None => OscCommand::Unknown,
            },
            Some(code @ (10 | 11)) => OscCommand::DynamicColors {
                first: code,
                specs: data.split(';').map(str::to_string).collect(),
            },
            Some(code @ (110 | 111)) => OscCommand::ResetDynamicColor(code - 100),
            Some(52) => {
                let (selection, payload) = data.split_once(';').unwrap_or(("", data));
                OscCommand::Clipboard {
                    selection: if selection.is_empty() { "c" } else { selection }.to_string(),
                    payload: payload.to_string(),
                }
            }
            _ => OscCommand::Unknown,
        }
    }
}

/// Parse `rgb:r/g/b` (1-4 hex digits per component) or `#rrggbb`.
pub fn parse_color(spec: &str) -> Option<(u8, u8, u8)> {
    if let Some(hex) = spec.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return Some((byte(0)?, byte(2)?, byte(4)?));
    }

    let body = spec.strip_prefix("rgb:")?;
    let mut parts = body.split('/');
    let mut component = || -> Option<u8> {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 4 {
            return None;
        }
        let value = u32::from_str_radix(part, 16).ok()?;
        let max = (1u32 << (4 * part.len())) - 1;
        Some((value * 255 / max) as u8)
    };
    let rgb = (component()?, component()?, component()?);
    if parts.next().is_some() {
        return None;
    }
    Some(rgb)
}

/// Apply one message to the terminal state
pub fn handle_message(state: &mut TerminalState, message: Message, events: &mut Vec<TerminalEvent>) {
    match message {
        Message::Printable { codepoints } => {
            for ch in codepoints {
                state.print(ch);
            }
        }
        Message::Control { byte, .. } => handle_control(state, byte, events),
        Message::Sgr { params } => {
            let policy = state.sgr21_policy;
            apply_sgr(&mut state.attrs, &params, policy);
        }
        Message::Csi {
            prefix,
            params,
            intermediates,
            command,
        } => {
            let csi = CsiCommand::parse(prefix, &params, &intermediates, command);
            if csi == CsiCommand::Unknown {
                tracing::debug!(
                    "Unknown CSI: prefix={:?}, params={}, intermediates={:?}, final={:?}",
                    prefix.map(char::from),
                    params,
                    intermediates,
                    command as char
                );
                return;
            }
            handle_csi(state, csi, events);
        }
        Message::Osc {
            command,
            data,
            terminator,
        } => handle_osc(state, OscCommand::parse(command, &data), terminator, events),
        Message::Esc { sequence } => handle_esc(state, &sequence),
        Message::Dcs {
            intermediates,
            command,
            data,
            ..
        } => match (intermediates.as_slice(), command) {
            ([b'$'], b'q') => {
                let request = String::from_utf8_lossy(&data);
                let reply = status_string(state, &request);
                respond(events, Response::StatusString(reply));
            }
            _ => tracing::debug!(
                "Unknown DCS: intermediates={:?}, final={:?}",
                intermediates,
                command as char
            ),
        },
    }
}

fn respond(events: &mut Vec<TerminalEvent>, response: Response) {
    events.push(TerminalEvent::ResponseEmitted(response.to_bytes()));
}

fn handle_control(state: &mut TerminalState, byte: u8, events: &mut Vec<TerminalEvent>) {
    match byte {
        0x07 => events.push(TerminalEvent::Bell),
        0x08 => state.backspace(),
        0x09 => state.forward_tab(1),
        0x0A..=0x0C => state.linefeed(),
        0x0D => state.carriage_return(),
        0x0E => state.shift_charset(CharsetSlot::G1),
        0x0F => state.shift_charset(CharsetSlot::G0),
        _ => {}
    }
}

fn handle_csi(state: &mut TerminalState, csi: CsiCommand, events: &mut Vec<TerminalEvent>) {
    match csi {
        // Cursor movement
        CsiCommand::CursorUp(n) => state.cursor_up(n),
        CsiCommand::CursorDown(n) => state.cursor_down(n),
        CsiCommand::CursorForward(n) => state.cursor_forward(n),
        CsiCommand::CursorBackward(n) => state.cursor_backward(n),
        CsiCommand::NextLine(n) => {
            state.cursor_down(n);
            state.carriage_return();
        }
        CsiCommand::PrecedingLine(n) => {
            state.cursor_up(n);
            state.carriage_return();
        }
        CsiCommand::CursorColumn(col) => state.set_column(col - 1),
        CsiCommand::CursorRow(row) => state.set_row(row - 1),
        CsiCommand::CursorPosition { row, col } => state.cursor_position(row, col),
        CsiCommand::ForwardTab(n) => state.forward_tab(n),
        CsiCommand::BackwardTab(n) => state.backward_tab(n),

        // Erase
        CsiCommand::EraseInDisplay { mode, selective } => state.erase_in_display(mode, selective),
        CsiCommand::EraseInLine { mode, selective } => state.erase_in_line(mode, selective),
        CsiCommand::EraseChars(n) => state.erase_chars(n),

        CsiCommand::ScrollUp(n) => state.scroll_up(n),
        CsiCommand::ScrollDown(n) => state.scroll_down(n),
        CsiCommand::InsertLines(n) => state.insert_lines(n),
        CsiCommand::DeleteLines(n) => state.delete_lines(n),
        CsiCommand::InsertChars(n) => state.insert_chars(n),
        CsiCommand::DeleteChars(n) => state.delete_chars(n),
        CsiCommand::Repeat(n) => state.repeat_last(n),
        CsiCommand::TabClear(mode) => state.clear_tab_stop(mode),

        // Modes
        CsiCommand::SetMode { modes, enable } => {
            for mode in modes {
                state.set_mode(mode, enable);
            }
        }
        CsiCommand::SetPrivateMode { modes, enable } => {
            for mode in modes {
                state.set_private_mode(mode, enable);
            }
        }
        CsiCommand::RequestMode(mode) => respond(
            events,
            Response::ModeReport {
                private: false,
                mode,
                value: mode_value(state.mode(mode)),
            },
        ),
        CsiCommand::RequestPrivateMode(mode) => respond(
            events,
            Response::ModeReport {
                private: true,
                mode,
                value: mode_value(state.private_mode(mode)),
            },
        ),
        CsiCommand::SavePrivateModes(modes) => state.save_private_modes(&modes),
        CsiCommand::RestorePrivateModes(modes) => state.restore_private_modes(&modes),

        // Device Status Report
        CsiCommand::DeviceStatus(5) => respond(events, Response::DeviceStatus),
        CsiCommand::DeviceStatus(6) => {
            let (row, col) = state.reported_position();
            respond(events, Response::CursorPosition(row, col));
        }
        CsiCommand::PrivateDeviceStatus(6) => {
            let (row, col) = state.reported_position();
            respond(events, Response::ExtendedCursorPosition(row, col));
        }
        CsiCommand::DeviceStatus(code) | CsiCommand::PrivateDeviceStatus(code) => {
            tracing::debug!("Ignoring device status request {}", code);
        }

        // Device Attributes
        CsiCommand::PrimaryDeviceAttributes => respond(events, Response::DeviceAttributes),
        CsiCommand::SecondaryDeviceAttributes => respond(events, Response::SecondaryDeviceAttributes),
        CsiCommand::TertiaryDeviceAttributes => respond(events, Response::TertiaryDeviceAttributes),

        CsiCommand::SetScrollRegion { top, bottom } => state.set_scroll_region(top, bottom),
        CsiCommand::SaveCursor => state.ansi_save_cursor(),
        CsiCommand::RestoreCursor => state.ansi_restore_cursor(),
        CsiCommand::WindowOp(args) => window_op(state, &args, events),
        CsiCommand::CursorStyle(n) => {
            if let Some(style) = CursorStyle::from_decscusr(n) {
                state.cursor.style = style;
            }
        }
        CsiCommand::Protection(n) => state.protected = n == 1,
        CsiCommand::SoftReset => state.soft_reset(),
        CsiCommand::Unknown => {}
    }
}

fn mode_value(mode: Option<bool>) -> u8 {
    match mode {
        Some(true) => 1,
        Some(false) => 2,
        None => 0,
    }
}

fn window_op(state: &mut TerminalState, args: &[u16], events: &mut Vec<TerminalEvent>) {
    match args.first().copied().unwrap_or(0) {
        18 => respond(
            events,
            Response::WindowSize {
                rows: state.rows(),
                cols: state.cols(),
            },
        ),
        22 => state.push_title(),
        23 => {
            if state.pop_title() {
                events.push(TerminalEvent::TitleChanged(state.title.clone()));
                events.push(TerminalEvent::IconNameChanged(state.icon_name.clone()));
            }
        }
        op => tracing::debug!("Ignoring window operation {}", op),
    }
}

fn handle_osc(
    state: &mut TerminalState,
    osc: OscCommand,
    terminator: StringTerminator,
    events: &mut Vec<TerminalEvent>,
) {
    match osc {
        OscCommand::SetTitleAndIcon(text) => {
            state.set_title(&text);
            state.set_icon_name(&text);
            events.push(TerminalEvent::TitleChanged(text.clone()));
            events.push(TerminalEvent::IconNameChanged(text));
        }
        OscCommand::SetIconName(text) => {
            state.set_icon_name(&text);
            events.push(TerminalEvent::IconNameChanged(text));
        }
        OscCommand::SetTitle(text) => {
            state.set_title(&text);
            events.push(TerminalEvent::TitleChanged(text));
        }
        OscCommand::Hyperlink { id, uri } => {
            if uri.is_empty() {
                state.close_hyperlink();
            } else {
                state.open_hyperlink(&id, &uri);
            }
        }
        OscCommand::DynamicColors { first, specs } => {
            // Each extra spec addresses the next color slot
            for (code, spec) in (first..=11).zip(specs.iter()) {
                if spec == "?" {
                    let rgb = match code {
                        10 => state.dynamic_fg.unwrap_or(DEFAULT_FOREGROUND),
                        _ => state.dynamic_bg.unwrap_or(DEFAULT_BACKGROUND),
                    };
                    respond(
                        events,
                        Response::DynamicColor {
                            code,
                            rgb,
                            terminator,
                        },
                    );
                } else if let Some(rgb) = parse_color(spec) {
                    match code {
                        10 => state.dynamic_fg = Some(rgb),
                        _ => state.dynamic_bg = Some(rgb),
                    }
                } else {
                    tracing::debug!("Ignoring color spec {:?}", spec);
                }
            }
        }
        OscCommand::ResetDynamicColor(10) => state.dynamic_fg = None,
        OscCommand::ResetDynamicColor(_) => state.dynamic_bg = None,
        OscCommand::Clipboard { selection, payload } => {
            if payload == "?" {
                events.push(TerminalEvent::ClipboardRequested(ClipboardRequest::Query {
                    selection,
                    terminator,
                }));
                return;
            }
            match STANDARD.decode(payload.as_bytes()) {
                Ok(bytes) => {
                    events.push(TerminalEvent::ClipboardRequested(ClipboardRequest::Set {
                        selection,
                        data: String::from_utf8_lossy(&bytes).into_owned(),
                    }))
                }
                Err(e) => tracing::debug!("Ignoring clipboard payload: {}", e),
            }
        }
        OscCommand::Unknown => tracing::trace!("Ignoring OSC"),
    }
}

fn handle_esc(state: &mut TerminalState, sequence: &[u8]) {
    match sequence {
        b"7" => state.save_cursor(),
        b"8" => state.restore_cursor(),
        b"D" => state.index(),
        b"E" => state.next_line(),
        b"M" => state.reverse_index(),
        b"H" => state.set_tab_stop(),
        b"c" => state.full_reset(),
        b"=" => state.modes.application_keypad = true,
        b">" => state.modes.application_keypad = false,
        b"#8" => state.screen_alignment(),
        // Stray string terminator
        b"\\" => {}
        [slot @ (b'(' | b')'), designator] => match Charset::from_designator(*designator) {
            Some(charset) => {
                let slot = if *slot == b'(' {
                    CharsetSlot::G0
                } else {
                    CharsetSlot::G1
                };
                state.charsets.designate(slot, charset);
            }
            None => tracing::debug!("Unsupported charset {:?}", *designator as char),
        },
        _ => tracing::debug!("Unknown ESC: {:?}", String::from_utf8_lossy(sequence)),
    }
}

/// DECRQSS: the setting named by `request`, formatted as the sequence
/// that would restore it.
fn status_string(state: &TerminalState, request: &str) -> Option<String> {
    match request {
        "m" => Some(format!("{}m", encode_sgr(&state.attrs))),
        "r" => {
            let (top, bottom) = state.scroll_region();
            Some(format!("{};{}r", top + 1, bottom + 1))
        }
        " q" => Some(format!("{} q", state.cursor.style.to_decscusr())),
        "\"q" => Some(format!("{}\"q", u8::from(state.protected))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::parser::Parser;
    use crate::core::term::sgr::Sgr21Policy;

    fn run(state: &mut TerminalState, input: &[u8]) -> Vec<TerminalEvent> {
        let mut parser = Parser::new();
        let mut events = Vec::new();
        for message in parser.push(input) {
            handle_message(state, message, &mut events);
        }
        events
    }

    fn responses(events: &[TerminalEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|e| match e {
                TerminalEvent::ResponseEmitted(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    fn state() -> TerminalState {
        TerminalState::new(80, 24, 100, Sgr21Policy::default())
    }

    #[test]
    fn test_cursor_movement() {
        let mut state = state();
        run(&mut state, b"\x1b[5;10H");
        assert_eq!((state.cursor.row, state.cursor.col), (4, 9));
        run(&mut state, b"\x1b[2A\x1b[3C");
        assert_eq!((state.cursor.row, state.cursor.col), (2, 12));
        run(&mut state, b"\x1b[0G\x1b[7d");
        assert_eq!((state.cursor.row, state.cursor.col), (6, 0));
    }

    #[test]
    fn test_device_reports() {
        let mut state = state();
        let events = run(&mut state, b"\x1b[3;4H\x1b[5n\x1b[6n\x1b[?6n\x1b[c\x1b[>c\x1b[=c");
        assert_eq!(
            responses(&events),
            vec![
                b"\x1b[0n".to_vec(),
                b"\x1b[3;4R".to_vec(),
                b"\x1b[?3;4;1R".to_vec(),
                b"\x1b[?62;22c".to_vec(),
                b"\x1b[>1;10;0c".to_vec(),
                b"\x1bP!|00000000\x1b\\".to_vec(),
            ]
        );
    }

    #[test]
    fn test_mode_requests() {
        let mut state = state();
        let events = run(&mut state, b"\x1b[?2004h\x1b[?2004$p\x1b[?25$p\x1b[?9999$p\x1b[4$p");
        assert_eq!(
            responses(&events),
            vec![
                b"\x1b[?2004;1$y".to_vec(),
                b"\x1b[?25;1$y".to_vec(),
                b"\x1b[?9999;0$y".to_vec(),
                b"\x1b[4;2$y".to_vec(),
            ]
        );
    }

    #[test]
    fn test_window_size_report() {
        let mut state = state();
        let events = run(&mut state, b"\x1b[18t");
        assert_eq!(responses(&events), vec![b"\x1b[8;24;80t".to_vec()]);
    }

    #[test]
    fn test_title_stack() {
        let mut state = state();
        run(&mut state, b"\x1b]2;first\x07\x1b[22t\x1b]2;second\x07");
        assert_eq!(state.title, "second");
        let events = run(&mut state, b"\x1b[23t");
        assert_eq!(state.title, "first");
        assert!(events.contains(&TerminalEvent::TitleChanged("first".to_string())));
    }

    #[test]
    fn test_decrqss() {
        let mut state = state();
        let events = run(
            &mut state,
            b"\x1b[1;31m\x1b[5;20r\x1b[4 q\x1b[1\"q\x1bP$qm\x1b\\\x1bP$qr\x1b\\\x1bP$q q\x1b\\\x1bP$q\"q\x1b\\\x1bP$qx\x1b\\",
        );
        assert_eq!(
            responses(&events),
            vec![
                b"\x1bP1$r0;1;31m\x1b\\".to_vec(),
                b"\x1bP1$r5;20r\x1b\\".to_vec(),
                b"\x1bP1$r4 q\x1b\\".to_vec(),
                b"\x1bP1$r1\"q\x1b\\".to_vec(),
                b"\x1bP0$r\x1b\\".to_vec(),
            ]
        );
    }

    #[test]
    fn test_osc_titles() {
        let mut state = state();
        let events = run(&mut state, b"\x1b]0;both\x07\x1b]1;icon\x1b\\");
        assert_eq!(state.title, "both");
        assert_eq!(state.icon_name, "icon");
        assert_eq!(
            events,
            vec![
                TerminalEvent::TitleChanged("both".to_string()),
                TerminalEvent::IconNameChanged("both".to_string()),
                TerminalEvent::IconNameChanged("icon".to_string()),
            ]
        );
    }

    #[test]
    fn test_dynamic_colors() {
        let mut state = state();
        let events = run(&mut state, b"\x1b]10;?\x07");
        assert_eq!(
            responses(&events),
            vec![b"\x1b]10;rgb:e5e5/e5e5/e5e5\x07".to_vec()]
        );

        let events = run(&mut state, b"\x1b]10;#102030;rgb:f/8/0\x1b\\\x1b]10;?;?\x1b\\");
        assert_eq!(state.dynamic_bg, Some((255, 136, 0)));
        assert_eq!(
            responses(&events),
            vec![
                b"\x1b]10;rgb:1010/2020/3030\x1b\\".to_vec(),
                b"\x1b]11;rgb:ffff/8888/0000\x1b\\".to_vec(),
            ]
        );

        run(&mut state, b"\x1b]110\x07");
        assert_eq!(state.dynamic_fg, None);
    }

    #[test]
    fn test_clipboard_requests() {
        let mut state = state();
        let events = run(&mut state, b"\x1b]52;c;aGVsbG8=\x07\x1b]52;p;?\x1b\\");
        assert_eq!(
            events,
            vec![
                TerminalEvent::ClipboardRequested(ClipboardRequest::Set {
                    selection: "c".to_string(),
                    data: "hello".to_string(),
                }),
                TerminalEvent::ClipboardRequested(ClipboardRequest::Query {
                    selection: "p".to_string(),
                    terminator: StringTerminator::St,
                }),
            ]
        );
        assert_eq!(
            clipboard_reply("c", b"hello", StringTerminator::Bel),
            b"\x1b]52;c;aGVsbG8=\x07".to_vec()
        );
    }

    #[test]
    fn test_hyperlinks() {
        let mut state = state();
        run(&mut state, b"\x1b]8;id=x;https://example.com\x1b\\ab\x1b]8;;\x1b\\c");
        let row = state.screen().get_row(0).map(<[_]>::to_vec).unwrap_or_default();
        assert_eq!(state.hyperlink_uri(row[0].hyperlink), Some("https://example.com"));
        assert_eq!(row[0].hyperlink, row[1].hyperlink);
        assert_eq!(row[2].hyperlink, 0);
    }

    #[test]
    fn test_charset_designation() {
        let mut state = state();
        run(&mut state, b"\x1b(0lqk\x1b(Bq");
        assert_eq!(state.screen().row_text(0), "┌─┐q");
    }

    #[test]
    fn test_selective_erase_sequence() {
        let mut state = state();
        run(&mut state, b"ab\x1b[1\"qcd\x1b[0\"q\x1b[?2K");
        assert_eq!(state.screen().row_text(0), "  cd");
    }

    #[test]
    fn test_bell_event() {
        let mut state = state();
        assert_eq!(run(&mut state, b"\x07"), vec![TerminalEvent::Bell]);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#ff0080"), Some((255, 0, 128)));
        assert_eq!(parse_color("rgb:ffff/0000/8080"), Some((255, 0, 128)));
        assert_eq!(parse_color("rgb:f/0"), None);
        assert_eq!(parse_color("red"), None);
    }
}
