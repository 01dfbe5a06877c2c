//! VT sequence parser
//!
//! Splits a raw byte stream into [`Message`]s following the DEC/ECMA-48
//! state machine used by xterm. The parser owns no terminal state; it only
//! tokenizes, so a sequence split across several [`Parser::push`] calls is
//! carried in the parser until it completes.

use super::message::{control_name, Message, Params, StringTerminator, MAX_SUBPARAMS};

/// Cap on OSC/DCS payloads. Longer strings are dropped at their terminator.
pub const MAX_STRING_LEN: usize = 1024 * 1024;

const MAX_INTERMEDIATES: usize = 4;

/// Parser state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    Csi,
    CsiIntermediate,
    CsiIgnore,
    Osc,
    OscEscape, // ESC received within OSC, waiting for backslash
    Dcs,
    DcsPassthrough,
    DcsEscape,
    /// SOS/PM/APC, or a malformed DCS: swallowed up to ST
    ControlString,
    ControlStringEscape,
}

pub struct Parser {
    state: ParserState,
    prefix: Option<u8>,
    intermediates: Vec<u8>,
    params: Params,
    group: Vec<Option<u16>>,
    current: Option<u16>,
    has_params: bool,
    dcs_command: u8,
    string: Vec<u8>,
    string_overflow: bool,
    utf8: [u8; 4],
    utf8_len: usize,
    utf8_needed: usize,
    printable: Vec<char>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            prefix: None,
            intermediates: Vec::with_capacity(MAX_INTERMEDIATES),
            params: Params::new(),
            group: Vec::with_capacity(MAX_SUBPARAMS),
            current: None,
            has_params: false,
            dcs_command: 0,
            string: Vec::new(),
            string_overflow: false,
            utf8: [0; 4],
            utf8_len: 0,
            utf8_needed: 0,
            printable: Vec::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// True when no partial sequence or partial UTF-8 character is buffered.
    pub fn is_idle(&self) -> bool {
        self.state == ParserState::Ground && self.utf8_needed == 0
    }

    /// Feed bytes and collect every message they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Message> {
        let mut out = Vec::new();
        for &byte in bytes {
            self.advance(byte, &mut out);
        }
        self.flush_printable(&mut out);
        out
    }

    /// Resolve whatever is buffered without waiting for a terminator.
    ///
    /// Pending OSC and DCS strings are dispatched as if ST had arrived,
    /// partial CSI/ESC sequences are dropped and a truncated UTF-8
    /// character becomes U+FFFD.
    pub fn flush_incomplete(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        if self.utf8_needed > 0 {
            self.reset_utf8();
            self.printable.push(char::REPLACEMENT_CHARACTER);
        }
        match self.state {
            ParserState::Osc | ParserState::OscEscape => {
                self.dispatch_osc(StringTerminator::St, &mut out);
            }
            ParserState::DcsPassthrough | ParserState::DcsEscape => {
                self.dispatch_dcs(&mut out);
            }
            ParserState::Ground => {}
            other => {
                tracing::trace!("Dropping incomplete sequence in state {:?}", other);
            }
        }
        self.state = ParserState::Ground;
        self.flush_printable(&mut out);
        out
    }

    fn advance(&mut self, byte: u8, out: &mut Vec<Message>) {
        match self.state {
            ParserState::Ground => self.ground(byte, out),
            ParserState::Escape => self.escape(byte, out),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte, out),
            ParserState::Csi => self.csi_param(byte, out),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, out),
            ParserState::CsiIgnore => self.csi_ignore(byte, out),
            ParserState::Osc => self.osc_string(byte, out),
            ParserState::OscEscape => self.escape_in_osc(byte, out),
            ParserState::Dcs => self.dcs_header(byte),
            ParserState::DcsPassthrough => self.dcs_passthrough(byte),
            ParserState::DcsEscape => self.escape_in_dcs(byte, out),
            ParserState::ControlString => self.control_string(byte),
            ParserState::ControlStringEscape => self.escape_in_control_string(byte, out),
        }
    }

    fn ground(&mut self, byte: u8, out: &mut Vec<Message>) {
        if self.utf8_needed > 0 {
            if (0x80..=0xBF).contains(&byte) {
                self.utf8[self.utf8_len] = byte;
                self.utf8_len += 1;
                if self.utf8_len == self.utf8_needed {
                    let ch = std::str::from_utf8(&self.utf8[..self.utf8_len])
                        .ok()
                        .and_then(|s| s.chars().next())
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    self.reset_utf8();
                    self.printable.push(ch);
                }
                return;
            }
            // Truncated sequence: replace it and reprocess this byte
            self.reset_utf8();
            self.printable.push(char::REPLACEMENT_CHARACTER);
        }

        match byte {
            0x1B => {
                self.flush_printable(out);
                self.enter_escape();
            }
            0x00..=0x1F | 0x7F => self.execute(byte, out),
            0x20..=0x7E => self.printable.push(byte as char),
            0xC2..=0xDF => self.start_utf8(byte, 2),
            0xE0..=0xEF => self.start_utf8(byte, 3),
            0xF0..=0xF4 => self.start_utf8(byte, 4),
            _ => self.printable.push(char::REPLACEMENT_CHARACTER),
        }
    }

    fn escape(&mut self, byte: u8, out: &mut Vec<Message>) {
        match byte {
            b'[' => {
                self.clear_sequence();
                self.state = ParserState::Csi;
            }
            b']' => {
                self.clear_string();
                self.state = ParserState::Osc;
            }
            b'P' => {
                self.clear_sequence();
                self.clear_string();
                self.state = ParserState::Dcs;
            }
            b'X' | b'^' | b'_' => {
                self.state = ParserState::ControlString;
            }
            0x20..=0x2F => {
                // Intermediate bytes
                self.intermediates.push(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            0x30..=0x7E => {
                out.push(Message::Esc { sequence: vec![byte] });
                self.state = ParserState::Ground;
            }
            0x1B => self.enter_escape(),
            0x18 | 0x1A => self.state = ParserState::Ground,
            0x00..=0x1F => self.execute(byte, out),
            0x7F => {}
            _ => {
                self.state = ParserState::Ground;
                self.ground(byte, out);
            }
        }
    }

    fn escape_intermediate(&mut self, byte: u8, out: &mut Vec<Message>) {
        match byte {
            0x20..=0x2F => {
                if self.intermediates.len() < MAX_INTERMEDIATES {
                    self.intermediates.push(byte);
                }
            }
            0x30..=0x7E => {
                // Final byte - e.g. a charset designation
                let mut sequence = std::mem::take(&mut self.intermediates);
                sequence.push(byte);
                out.push(Message::Esc { sequence });
                self.state = ParserState::Ground;
            }
            0x1B => self.enter_escape(),
            0x18 | 0x1A => self.state = ParserState::Ground,
            0x00..=0x1F => self.execute(byte, out),
            0x7F => {}
            _ => {
                self.state = ParserState::Ground;
                self.ground(byte, out);
            }
        }
    }

    fn csi_param(&mut self, byte: u8, out: &mut Vec<Message>) {
        match byte {
            b'0'..=b'9' => self.param_digit(byte),
            b':' => self.param_subseparator(),
            b';' => self.param_separator(),
            b'<'..=b'?' => {
                if self.prefix.is_none() && !self.has_params {
                    self.prefix = Some(byte);
                } else {
                    self.state = ParserState::CsiIgnore;
                }
            }
            0x20..=0x2F => {
                self.finish_params();
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                self.finish_params();
                self.dispatch_csi(byte, out);
            }
            _ => self.sequence_other(byte, out),
        }
    }

    fn csi_intermediate(&mut self, byte: u8, out: &mut Vec<Message>) {
        match byte {
            0x20..=0x2F => {
                if self.intermediates.len() < MAX_INTERMEDIATES {
                    self.intermediates.push(byte);
                } else {
                    self.state = ParserState::CsiIgnore;
                }
            }
            0x30..=0x3F => self.state = ParserState::CsiIgnore,
            0x40..=0x7E => self.dispatch_csi(byte, out),
            _ => self.sequence_other(byte, out),
        }
    }

    fn csi_ignore(&mut self, byte: u8, out: &mut Vec<Message>) {
        match byte {
            0x40..=0x7E => {
                tracing::trace!("Discarding malformed CSI ending in {:?}", byte as char);
                self.state = ParserState::Ground;
            }
            0x20..=0x3F => {}
            _ => self.sequence_other(byte, out),
        }
    }

    /// Bytes that are neither parameters nor finals inside a CSI sequence.
    fn sequence_other(&mut self, byte: u8, out: &mut Vec<Message>) {
        match byte {
            0x1B => self.enter_escape(),
            0x18 | 0x1A => {
                tracing::trace!("CSI cancelled by {}", control_name(byte));
                self.state = ParserState::Ground;
            }
            // C0 controls execute in the middle of a sequence
            0x00..=0x1F => self.execute(byte, out),
            0x7F => {}
            _ => {
                self.state = ParserState::Ground;
                self.ground(byte, out);
            }
        }
    }

    fn osc_string(&mut self, byte: u8, out: &mut Vec<Message>) {
        match byte {
            0x07 => {
                // BEL terminates OSC
                self.dispatch_osc(StringTerminator::Bel, out);
                self.state = ParserState::Ground;
            }
            0x1B => {
                // Could be ST (ESC \)
                self.state = ParserState::OscEscape;
            }
            0x18 | 0x1A => {
                self.clear_string();
                self.state = ParserState::Ground;
            }
            0x00..=0x1F => {}
            _ => self.push_string_byte(byte),
        }
    }

    fn escape_in_osc(&mut self, byte: u8, out: &mut Vec<Message>) {
        self.dispatch_osc(StringTerminator::St, out);
        if byte == b'\\' {
            self.state = ParserState::Ground;
        } else {
            // Not ST: the string is over and this byte starts a new escape
            self.enter_escape();
            self.escape(byte, out);
        }
    }

    fn dcs_header(&mut self, byte: u8) {
        match byte {
            b'0'..=b'9' => self.param_digit(byte),
            b':' => self.param_subseparator(),
            b';' => self.param_separator(),
            b'<'..=b'?' => {
                if self.prefix.is_none() && !self.has_params {
                    self.prefix = Some(byte);
                } else {
                    self.state = ParserState::ControlString;
                }
            }
            0x20..=0x2F => {
                self.finish_params();
                if self.intermediates.len() < MAX_INTERMEDIATES {
                    self.intermediates.push(byte);
                } else {
                    self.state = ParserState::ControlString;
                }
            }
            0x40..=0x7E => {
                self.finish_params();
                self.dcs_command = byte;
                self.state = ParserState::DcsPassthrough;
            }
            0x1B => self.state = ParserState::ControlStringEscape,
            0x18 | 0x1A => self.state = ParserState::Ground,
            0x00..=0x1F | 0x7F => {}
            _ => self.state = ParserState::ControlString,
        }
    }

    fn dcs_passthrough(&mut self, byte: u8) {
        match byte {
            0x1B => self.state = ParserState::DcsEscape,
            0x18 | 0x1A => {
                self.clear_string();
                self.state = ParserState::Ground;
            }
            0x7F => {}
            _ => self.push_string_byte(byte),
        }
    }

    fn escape_in_dcs(&mut self, byte: u8, out: &mut Vec<Message>) {
        self.dispatch_dcs(out);
        if byte == b'\\' {
            self.state = ParserState::Ground;
        } else {
            self.enter_escape();
            self.escape(byte, out);
        }
    }

    fn control_string(&mut self, byte: u8) {
        match byte {
            0x1B => self.state = ParserState::ControlStringEscape,
            0x18 | 0x1A => self.state = ParserState::Ground,
            _ => {}
        }
    }

    fn escape_in_control_string(&mut self, byte: u8, out: &mut Vec<Message>) {
        if byte == b'\\' {
            self.state = ParserState::Ground;
        } else {
            self.enter_escape();
            self.escape(byte, out);
        }
    }

    fn execute(&mut self, byte: u8, out: &mut Vec<Message>) {
        self.flush_printable(out);
        out.push(Message::Control {
            byte,
            name: control_name(byte),
        });
    }

    fn dispatch_csi(&mut self, command: u8, out: &mut Vec<Message>) {
        self.flush_printable(out);
        let params = std::mem::take(&mut self.params);
        let intermediates = std::mem::take(&mut self.intermediates);
        let prefix = self.prefix.take();
        if command == b'm' && prefix.is_none() && intermediates.is_empty() {
            out.push(Message::Sgr { params });
        } else {
            out.push(Message::Csi {
                prefix,
                params,
                intermediates,
                command,
            });
        }
        self.state = ParserState::Ground;
    }

    fn dispatch_osc(&mut self, terminator: StringTerminator, out: &mut Vec<Message>) {
        if self.string_overflow {
            tracing::debug!("Discarding oversized OSC string");
            self.clear_string();
            return;
        }
        self.flush_printable(out);
        let raw = std::mem::take(&mut self.string);
        let text = String::from_utf8_lossy(&raw);
        let (command, data) = match text.split_once(';') {
            Some((code, rest)) => match code.parse::<u16>() {
                Ok(n) => (Some(n), rest.to_string()),
                Err(_) => (None, text.to_string()),
            },
            None => match text.parse::<u16>() {
                Ok(n) => (Some(n), String::new()),
                Err(_) => (None, text.to_string()),
            },
        };
        out.push(Message::Osc {
            command,
            data,
            terminator,
        });
    }

    fn dispatch_dcs(&mut self, out: &mut Vec<Message>) {
        if self.string_overflow {
            tracing::debug!("Discarding oversized DCS string");
            self.clear_string();
            return;
        }
        self.flush_printable(out);
        out.push(Message::Dcs {
            params: std::mem::take(&mut self.params),
            intermediates: std::mem::take(&mut self.intermediates),
            command: self.dcs_command,
            data: std::mem::take(&mut self.string),
        });
        self.prefix = None;
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.clear_sequence();
    }

    fn clear_sequence(&mut self) {
        self.prefix = None;
        self.intermediates.clear();
        self.params = Params::new();
        self.group.clear();
        self.current = None;
        self.has_params = false;
    }

    fn clear_string(&mut self) {
        self.string.clear();
        self.string_overflow = false;
    }

    fn push_string_byte(&mut self, byte: u8) {
        if self.string.len() < MAX_STRING_LEN {
            self.string.push(byte);
        } else {
            self.string_overflow = true;
        }
    }

    fn param_digit(&mut self, byte: u8) {
        self.has_params = true;
        let digit = (byte - b'0') as u16;
        self.current = Some(
            self.current
                .unwrap_or(0)
                .saturating_mul(10)
                .saturating_add(digit),
        );
    }

    fn param_subseparator(&mut self) {
        self.has_params = true;
        if self.group.len() < MAX_SUBPARAMS {
            self.group.push(self.current.take());
        }
        self.current = None;
    }

    fn param_separator(&mut self) {
        self.has_params = true;
        self.push_current_group();
    }

    fn finish_params(&mut self) {
        if self.has_params {
            self.push_current_group();
            self.has_params = false;
        }
    }

    fn push_current_group(&mut self) {
        let mut group = std::mem::take(&mut self.group);
        if group.len() < MAX_SUBPARAMS {
            group.push(self.current.take());
        }
        self.current = None;
        self.params.push_group(group);
    }

    fn start_utf8(&mut self, byte: u8, needed: usize) {
        self.utf8[0] = byte;
        self.utf8_len = 1;
        self.utf8_needed = needed;
    }

    fn reset_utf8(&mut self) {
        self.utf8_len = 0;
        self.utf8_needed = 0;
    }

    fn flush_printable(&mut self, out: &mut Vec<Message>) {
        if !self.printable.is_empty() {
            out.push(Message::Printable {
                codepoints: std::mem::take(&mut self.printable),
            });
        }
    }
}
