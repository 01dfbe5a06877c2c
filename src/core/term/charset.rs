//! G0/G1 character set designation and translation.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    #[default]
    Ascii,
    /// DEC Special Graphics (line drawing), designated with `0`
    DecSpecialGraphics,
    /// United Kingdom national set, designated with `A`
    Uk,
}

impl Charset {
    /// Charset for the final byte of an SCS sequence (`ESC ( F`).
    pub fn from_designator(byte: u8) -> Option<Self> {
        match byte {
            b'B' => Some(Charset::Ascii),
            b'0' => Some(Charset::DecSpecialGraphics),
            b'A' => Some(Charset::Uk),
            _ => None,
        }
    }

    pub fn translate(self, ch: char) -> char {
        match self {
            Charset::Ascii => ch,
            Charset::Uk => {
                if ch == '#' {
                    '£'
                } else {
                    ch
                }
            }
            Charset::DecSpecialGraphics => dec_special_graphics(ch),
        }
    }
}

fn dec_special_graphics(ch: char) -> char {
    match ch {
        '`' => '◆',
        'a' => '▒',
        'b' => '␉',
        'c' => '␌',
        'd' => '␍',
        'e' => '␊',
        'f' => '°',
        'g' => '±',
        'h' => '␤',
        'i' => '␋',
        'j' => '┘',
        'k' => '┐',
        'l' => '┌',
        'm' => '└',
        'n' => '┼',
        'o' => '⎺',
        'p' => '⎻',
        'q' => '─',
        'r' => '⎼',
        's' => '⎽',
        't' => '├',
        'u' => '┤',
        'v' => '┴',
        'w' => '┬',
        'x' => '│',
        'y' => '≤',
        'z' => '≥',
        '{' => 'π',
        '|' => '≠',
        '}' => '£',
        '~' => '·',
        _ => ch,
    }
}

/// Which slot GL currently maps to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CharsetSlot {
    #[default]
    G0,
    G1,
}

/// Designations plus the SI/SO selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CharsetState {
    pub g0: Charset,
    pub g1: Charset,
    pub active: CharsetSlot,
}

impl CharsetState {
    pub fn designate(&mut self, slot: CharsetSlot, charset: Charset) {
        match slot {
            CharsetSlot::G0 => self.g0 = charset,
            CharsetSlot::G1 => self.g1 = charset,
        }
    }

    /// SO (0x0E) selects G1, SI (0x0F) selects G0.
    pub fn shift(&mut self, slot: CharsetSlot) {
        self.active = slot;
    }

    pub fn translate(&self, ch: char) -> char {
        match self.active {
            CharsetSlot::G0 => self.g0.translate(ch),
            CharsetSlot::G1 => self.g1.translate(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_drawing() {
        let mut charsets = CharsetState::default();
        charsets.designate(CharsetSlot::G0, Charset::DecSpecialGraphics);
        assert_eq!(charsets.translate('q'), '─');
        assert_eq!(charsets.translate('x'), '│');
        assert_eq!(charsets.translate('A'), 'A');
    }

    #[test]
    fn test_shift_out_uses_g1() {
        let mut charsets = CharsetState::default();
        charsets.designate(CharsetSlot::G1, Charset::DecSpecialGraphics);
        assert_eq!(charsets.translate('l'), 'l');
        charsets.shift(CharsetSlot::G1);
        assert_eq!(charsets.translate('l'), '┌');
        charsets.shift(CharsetSlot::G0);
        assert_eq!(charsets.translate('l'), 'l');
    }

    #[test]
    fn test_uk_pound() {
        assert_eq!(Charset::Uk.translate('#'), '£');
        assert_eq!(Charset::from_designator(b'Z'), None);
    }
}
