//! Cell and rendition attributes.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const FAINT         = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    /// One of the 16 ANSI colors (0-7 normal, 8-15 bright)
    Named(u8),
    /// 256-color palette entry set through `38;5;n`
    Indexed(u8),
    Rgb(u8, u8, u8),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UnderlineStyle {
    #[default]
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

impl UnderlineStyle {
    /// Style for an SGR `4:n` sub-parameter. 0 means "no underline".
    pub fn from_subparam(n: u16) -> Option<Self> {
        match n {
            1 => Some(UnderlineStyle::Single),
            2 => Some(UnderlineStyle::Double),
            3 => Some(UnderlineStyle::Curly),
            4 => Some(UnderlineStyle::Dotted),
            5 => Some(UnderlineStyle::Dashed),
            _ => None,
        }
    }

    pub fn to_subparam(self) -> u16 {
        match self {
            UnderlineStyle::Single => 1,
            UnderlineStyle::Double => 2,
            UnderlineStyle::Curly => 3,
            UnderlineStyle::Dotted => 4,
            UnderlineStyle::Dashed => 5,
        }
    }
}

/// Graphic rendition of a cell.
///
/// `underline_style` is only meaningful while `UNDERLINE` is set; setting
/// or clearing an underline through SGR keeps the two in step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SgrAttributes {
    pub flags: AttrFlags,
    pub underline_style: Option<UnderlineStyle>,
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub underline_color: Option<Color>,
}

impl SgrAttributes {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// No flags and no colors. Default cells need no background painting.
    pub fn is_default(&self) -> bool {
        self.flags.is_empty()
            && self.underline_style.is_none()
            && self.fg.is_none()
            && self.bg.is_none()
            && self.underline_color.is_none()
    }

    pub fn set_underline(&mut self, style: Option<UnderlineStyle>) {
        match style {
            Some(style) => {
                self.flags |= AttrFlags::UNDERLINE;
                self.underline_style = Some(style);
            }
            None => {
                self.flags &= !AttrFlags::UNDERLINE;
                self.underline_style = None;
            }
        }
    }

    /// Attributes an erased cell takes: only the background survives.
    pub fn erased(&self) -> Self {
        Self {
            bg: self.bg,
            ..Self::default()
        }
    }
}

/// A single cell
///
/// Wide characters occupy two cells: the first has `width == 2`, the
/// second is a continuation with `width == 0` and no character.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub character: char,
    /// Zero-width code points combined with `character`
    pub combining: Vec<char>,
    pub width: u8,
    pub attrs: SgrAttributes,
    /// Set by DECSCA; selective erase leaves these cells alone
    pub protected: bool,
    /// OSC 8 link id, 0 when the cell is not part of a link
    pub hyperlink: u32,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            character: ' ',
            combining: Vec::new(),
            width: 1,
            attrs: SgrAttributes::default(),
            protected: false,
            hyperlink: 0,
        }
    }
}

impl Cell {
    pub fn new(character: char, width: u8, attrs: SgrAttributes) -> Self {
        Self {
            character,
            width,
            attrs,
            ..Self::default()
        }
    }

    /// Blank cell carrying only a background color.
    pub fn blank(attrs: &SgrAttributes) -> Self {
        Self {
            attrs: attrs.erased(),
            ..Self::default()
        }
    }

    pub fn continuation(attrs: &SgrAttributes) -> Self {
        Self {
            character: ' ',
            width: 0,
            attrs: *attrs,
            ..Self::default()
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    pub fn clear(&mut self, attrs: &SgrAttributes) {
        *self = Self::blank(attrs);
    }

    /// The cell's text: the base character followed by combining marks.
    /// Continuation cells contribute nothing.
    pub fn text(&self) -> String {
        if self.is_continuation() {
            return String::new();
        }
        let mut s = String::with_capacity(1 + self.combining.len());
        s.push(self.character);
        s.extend(self.combining.iter());
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_attributes() {
        let mut attrs = SgrAttributes::default();
        assert!(attrs.is_default());
        attrs.fg = Some(Color::Named(1));
        assert!(!attrs.is_default());
        attrs.reset();
        assert!(attrs.is_default());
    }

    #[test]
    fn test_underline_keeps_style_in_step() {
        let mut attrs = SgrAttributes::default();
        attrs.set_underline(Some(UnderlineStyle::Curly));
        assert!(attrs.flags.contains(AttrFlags::UNDERLINE));
        attrs.set_underline(None);
        assert!(attrs.is_default());
    }

    #[test]
    fn test_blank_keeps_background_only() {
        let attrs = SgrAttributes {
            flags: AttrFlags::BOLD,
            fg: Some(Color::Named(2)),
            bg: Some(Color::Indexed(17)),
            ..SgrAttributes::default()
        };
        let cell = Cell::blank(&attrs);
        assert_eq!(cell.character, ' ');
        assert_eq!(cell.attrs.bg, Some(Color::Indexed(17)));
        assert!(cell.attrs.flags.is_empty());
        assert_eq!(cell.attrs.fg, None);
    }

    #[test]
    fn test_cell_text_with_combining() {
        let mut cell = Cell::new('e', 1, SgrAttributes::default());
        cell.combining.push('\u{301}');
        assert_eq!(cell.text(), "e\u{301}");
        assert_eq!(Cell::continuation(&SgrAttributes::default()).text(), "");
    }
}
