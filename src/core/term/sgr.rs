//! Select Graphic Rendition
//!
//! Applies `CSI ... m` parameter lists to [`SgrAttributes`] and encodes the
//! current rendition back into a parameter string for DECRQSS replies.

use serde::{Deserialize, Serialize};

use super::attrs::{AttrFlags, Color, SgrAttributes, UnderlineStyle};
use super::message::Params;

/// Meaning of SGR 21.
///
/// ECMA-48 defines it as doubly underlined, but shells and the Linux
/// console send it to turn bold off. Treating it as an underline paints
/// spurious lines under common prompts, so cancel-bold is the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sgr21Policy {
    #[default]
    CancelBold,
    DoubleUnderline,
}

/// Apply an SGR parameter list. An empty list is a full reset.
pub fn apply_sgr(attrs: &mut SgrAttributes, params: &Params, policy: Sgr21Policy) {
    if params.is_empty() {
        attrs.reset();
        return;
    }

    let groups: Vec<&[Option<u16>]> = params.groups().collect();
    let mut i = 0;
    while i < groups.len() {
        let group = groups[i];
        let code = group.first().copied().flatten().unwrap_or(0);
        i += 1;

        // Colon form carries its arguments inside the group
        if group.len() > 1 {
            match code {
                4 => attrs.set_underline(underline_from_subparam(group[1])),
                38 => {
                    if let Some(color) = colon_color(&group[1..]) {
                        attrs.fg = Some(color);
                    }
                }
                48 => {
                    if let Some(color) = colon_color(&group[1..]) {
                        attrs.bg = Some(color);
                    }
                }
                58 => {
                    if let Some(color) = colon_color(&group[1..]) {
                        attrs.underline_color = Some(color);
                    }
                }
                _ => apply_code(attrs, code, policy),
            }
            continue;
        }

        match code {
            38 | 48 | 58 => {
                let (color, consumed) = semicolon_color(&groups[i..]);
                i += consumed;
                if let Some(color) = color {
                    match code {
                        38 => attrs.fg = Some(color),
                        48 => attrs.bg = Some(color),
                        _ => attrs.underline_color = Some(color),
                    }
                }
            }
            _ => apply_code(attrs, code, policy),
        }
    }
}

fn apply_code(attrs: &mut SgrAttributes, code: u16, policy: Sgr21Policy) {
    match code {
        0 => attrs.reset(),
        1 => attrs.flags |= AttrFlags::BOLD,
        2 => attrs.flags |= AttrFlags::FAINT,
        3 => attrs.flags |= AttrFlags::ITALIC,
        4 => attrs.set_underline(Some(UnderlineStyle::Single)),
        5 | 6 => attrs.flags |= AttrFlags::BLINK,
        7 => attrs.flags |= AttrFlags::INVERSE,
        8 => attrs.flags |= AttrFlags::HIDDEN,
        9 => attrs.flags |= AttrFlags::STRIKETHROUGH,
        21 => match policy {
            Sgr21Policy::CancelBold => attrs.flags &= !AttrFlags::BOLD,
            Sgr21Policy::DoubleUnderline => attrs.set_underline(Some(UnderlineStyle::Double)),
        },
        22 => attrs.flags &= !(AttrFlags::BOLD | AttrFlags::FAINT),
        23 => attrs.flags &= !AttrFlags::ITALIC,
        24 => attrs.set_underline(None),
        25 => attrs.flags &= !AttrFlags::BLINK,
        27 => attrs.flags &= !AttrFlags::INVERSE,
        28 => attrs.flags &= !AttrFlags::HIDDEN,
        29 => attrs.flags &= !AttrFlags::STRIKETHROUGH,
        30..=37 => attrs.fg = Some(Color::Named((code - 30) as u8)),
        39 => attrs.fg = None,
        40..=47 => attrs.bg = Some(Color::Named((code - 40) as u8)),
        49 => attrs.bg = None,
        59 => attrs.underline_color = None,
        90..=97 => attrs.fg = Some(Color::Named((code - 90 + 8) as u8)),
        100..=107 => attrs.bg = Some(Color::Named((code - 100 + 8) as u8)),
        _ => tracing::trace!("Ignoring SGR {}", code),
    }
}

fn underline_from_subparam(sub: Option<u16>) -> Option<UnderlineStyle> {
    match sub {
        Some(0) => None,
        Some(n) => Some(UnderlineStyle::from_subparam(n).unwrap_or(UnderlineStyle::Single)),
        None => Some(UnderlineStyle::Single),
    }
}

fn component(value: Option<u16>) -> Option<u8> {
    u8::try_from(value.unwrap_or(0)).ok()
}

/// `5:n` or `2:r:g:b` / `2:cs:r:g:b` from a colon group.
fn colon_color(args: &[Option<u16>]) -> Option<Color> {
    match args.first().copied().flatten() {
        Some(5) => component(args.get(1).copied().flatten()).map(Color::Indexed),
        Some(2) => {
            // Skip the optional color-space id
            let rgb = if args.len() >= 5 { &args[2..5] } else { args.get(1..4)? };
            Some(Color::Rgb(
                component(rgb[0])?,
                component(rgb[1])?,
                component(rgb[2])?,
            ))
        }
        _ => None,
    }
}

/// `;5;n` or `;2;r;g;b` following a 38/48/58 group. Returns the color and
/// how many groups it consumed.
fn semicolon_color(rest: &[&[Option<u16>]]) -> (Option<Color>, usize) {
    let value = |i: usize| rest.get(i).and_then(|g| g.first().copied().flatten());
    match value(0) {
        Some(5) => {
            if rest.len() < 2 {
                return (None, rest.len());
            }
            (component(value(1)).map(Color::Indexed), 2)
        }
        Some(2) => {
            if rest.len() < 4 {
                return (None, rest.len());
            }
            let color = match (component(value(1)), component(value(2)), component(value(3))) {
                (Some(r), Some(g), Some(b)) => Some(Color::Rgb(r, g, b)),
                _ => None,
            };
            (color, 4)
        }
        Some(_) => (None, 1),
        None => (None, rest.len().min(1)),
    }
}

/// Encode attributes as an SGR parameter string starting with `0`, so
/// that replaying it from any state yields exactly these attributes.
pub fn encode_sgr(attrs: &SgrAttributes) -> String {
    let mut parts: Vec<String> = vec!["0".to_string()];
    let flags = attrs.flags;
    if flags.contains(AttrFlags::BOLD) {
        parts.push("1".into());
    }
    if flags.contains(AttrFlags::FAINT) {
        parts.push("2".into());
    }
    if flags.contains(AttrFlags::ITALIC) {
        parts.push("3".into());
    }
    if flags.contains(AttrFlags::UNDERLINE) {
        match attrs.underline_style.unwrap_or_default() {
            UnderlineStyle::Single => parts.push("4".into()),
            style => parts.push(format!("4:{}", style.to_subparam())),
        }
    }
    if flags.contains(AttrFlags::BLINK) {
        parts.push("5".into());
    }
    if flags.contains(AttrFlags::INVERSE) {
        parts.push("7".into());
    }
    if flags.contains(AttrFlags::HIDDEN) {
        parts.push("8".into());
    }
    if flags.contains(AttrFlags::STRIKETHROUGH) {
        parts.push("9".into());
    }
    if let Some(color) = attrs.fg {
        parts.push(encode_color(color, 30, 90, 38));
    }
    if let Some(color) = attrs.bg {
        parts.push(encode_color(color, 40, 100, 48));
    }
    if let Some(color) = attrs.underline_color {
        parts.push(encode_extended_color(color, 58));
    }
    parts.join(";")
}

fn encode_color(color: Color, base: u16, bright_base: u16, extended: u16) -> String {
    match color {
        Color::Named(n) if n < 8 => (base + n as u16).to_string(),
        Color::Named(n) if n < 16 => (bright_base + n as u16 - 8).to_string(),
        other => encode_extended_color(other, extended),
    }
}

fn encode_extended_color(color: Color, extended: u16) -> String {
    match color {
        Color::Named(n) | Color::Indexed(n) => format!("{};5;{}", extended, n),
        Color::Rgb(r, g, b) => format!("{};2;{};{};{}", extended, r, g, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::parser::Parser;
    use crate::core::term::message::Message;

    fn parse_params(sgr: &str) -> Params {
        let mut parser = Parser::new();
        let messages = parser.push(format!("\x1b[{}m", sgr).as_bytes());
        match messages.into_iter().next() {
            Some(Message::Sgr { params }) => params,
            other => panic!("expected SGR, got {:?}", other),
        }
    }

    fn apply(sgr: &str) -> SgrAttributes {
        let mut attrs = SgrAttributes::default();
        apply_sgr(&mut attrs, &parse_params(sgr), Sgr21Policy::default());
        attrs
    }

    #[test]
    fn test_basic_flags() {
        let attrs = apply("1;3;4;9");
        assert!(attrs.flags.contains(AttrFlags::BOLD | AttrFlags::ITALIC | AttrFlags::STRIKETHROUGH));
        assert_eq!(attrs.underline_style, Some(UnderlineStyle::Single));
    }

    #[test]
    fn test_bold_then_normal_intensity() {
        let attrs = apply("0;1;22");
        assert!(attrs.is_default());
    }

    #[test]
    fn test_named_colors() {
        let attrs = apply("31;102");
        assert_eq!(attrs.fg, Some(Color::Named(1)));
        assert_eq!(attrs.bg, Some(Color::Named(10)));
        let attrs = apply("31;39");
        assert_eq!(attrs.fg, None);
    }

    #[test]
    fn test_extended_colors() {
        let attrs = apply("38;5;196;48;2;10;20;30");
        assert_eq!(attrs.fg, Some(Color::Indexed(196)));
        assert_eq!(attrs.bg, Some(Color::Rgb(10, 20, 30)));

        let attrs = apply("38:2::1:2:3;48:5:17;58:2:4:5:6");
        assert_eq!(attrs.fg, Some(Color::Rgb(1, 2, 3)));
        assert_eq!(attrs.bg, Some(Color::Indexed(17)));
        assert_eq!(attrs.underline_color, Some(Color::Rgb(4, 5, 6)));
    }

    #[test]
    fn test_truncated_extended_color_is_ignored() {
        let attrs = apply("38;2;10");
        assert_eq!(attrs.fg, None);
        let attrs = apply("38;5;300;1");
        assert_eq!(attrs.fg, None);
        assert!(attrs.flags.contains(AttrFlags::BOLD));
    }

    #[test]
    fn test_underline_styles() {
        assert_eq!(apply("4:3").underline_style, Some(UnderlineStyle::Curly));
        assert_eq!(apply("4:2").underline_style, Some(UnderlineStyle::Double));
        assert!(apply("4;4:0").is_default());
    }

    #[test]
    fn test_sgr21_policy() {
        let params = parse_params("1;21");
        let mut attrs = SgrAttributes::default();
        apply_sgr(&mut attrs, &params, Sgr21Policy::CancelBold);
        assert!(attrs.is_default());

        let mut attrs = SgrAttributes::default();
        apply_sgr(&mut attrs, &params, Sgr21Policy::DoubleUnderline);
        assert!(attrs.flags.contains(AttrFlags::BOLD));
        assert_eq!(attrs.underline_style, Some(UnderlineStyle::Double));
    }

    #[test]
    fn test_empty_is_reset() {
        let mut attrs = apply("1;31");
        apply_sgr(&mut attrs, &Params::new(), Sgr21Policy::default());
        assert!(attrs.is_default());
    }

    #[test]
    fn test_encode_reproduces_attributes() {
        let attrs = apply("1;3;4:3;7;38;5;200;101;58;2;1;2;3");
        let encoded = encode_sgr(&attrs);
        assert_eq!(encoded, "0;1;3;4:3;7;38;5;200;101;58;2;1;2;3");
        assert_eq!(apply(&encoded), attrs);
    }

    #[test]
    fn test_encode_default() {
        assert_eq!(encode_sgr(&SgrAttributes::default()), "0");
    }
}
