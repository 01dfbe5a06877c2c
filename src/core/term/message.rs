//! Typed messages produced by the parser.

use std::fmt;

/// Upper bound on parameter groups kept for one sequence.
pub const MAX_PARAMS: usize = 32;
/// Upper bound on colon-separated sub-parameters per group.
pub const MAX_SUBPARAMS: usize = 8;

/// CSI/DCS parameter list.
///
/// Each group is one `;`-separated parameter; colon sub-parameters
/// (`38:2:r:g:b`, `4:3`) stay together in the same group. An empty
/// slot is `None` so handlers can apply their own defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params {
    groups: Vec<Vec<Option<u16>>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_groups(groups: Vec<Vec<Option<u16>>>) -> Self {
        Self { groups }
    }

    /// Build from plain values, one group per value.
    pub fn from_values(values: &[u16]) -> Self {
        Self {
            groups: values.iter().map(|v| vec![Some(*v)]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// First value of group `index`, if present and non-empty.
    pub fn get(&self, index: usize) -> Option<u16> {
        self.groups.get(index).and_then(|g| g.first().copied().flatten())
    }

    pub fn get_or(&self, index: usize, default: u16) -> u16 {
        self.get(index).unwrap_or(default)
    }

    /// Like [`get_or`](Self::get_or) but an explicit 0 also means default.
    /// Cursor movement counts use this.
    pub fn get_nonzero(&self, index: usize, default: u16) -> u16 {
        match self.get(index) {
            Some(0) | None => default,
            Some(v) => v,
        }
    }

    pub fn group(&self, index: usize) -> Option<&[Option<u16>]> {
        self.groups.get(index).map(Vec::as_slice)
    }

    pub fn groups(&self) -> impl Iterator<Item = &[Option<u16>]> {
        self.groups.iter().map(Vec::as_slice)
    }

    /// Iterate first values of every group, with missing values as 0.
    pub fn values(&self) -> impl Iterator<Item = u16> + '_ {
        self.groups
            .iter()
            .map(|g| g.first().copied().flatten().unwrap_or(0))
    }

    pub(crate) fn push_group(&mut self, group: Vec<Option<u16>>) {
        if self.groups.len() < MAX_PARAMS {
            self.groups.push(group);
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            for (j, value) in group.iter().enumerate() {
                if j > 0 {
                    f.write_str(":")?;
                }
                if let Some(v) = value {
                    write!(f, "{}", v)?;
                }
            }
        }
        Ok(())
    }
}

/// How an OSC string was terminated. Replies mirror it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StringTerminator {
    /// BEL (0x07)
    Bel,
    /// ST (`ESC \` or 0x9C)
    #[default]
    St,
}

impl StringTerminator {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            StringTerminator::Bel => b"\x07",
            StringTerminator::St => b"\x1b\\",
        }
    }
}

/// A complete unit of parsed input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Run of printable code points
    Printable { codepoints: Vec<char> },
    /// C0 control or DEL
    Control { byte: u8, name: &'static str },
    /// Control sequence other than plain SGR
    Csi {
        prefix: Option<u8>,
        params: Params,
        intermediates: Vec<u8>,
        command: u8,
    },
    /// `CSI ... m` with no prefix and no intermediates
    Sgr { params: Params },
    /// Operating system command
    Osc {
        command: Option<u16>,
        data: String,
        terminator: StringTerminator,
    },
    /// Simple escape: intermediates followed by the final byte
    Esc { sequence: Vec<u8> },
    /// Device control string
    Dcs {
        params: Params,
        intermediates: Vec<u8>,
        command: u8,
        data: Vec<u8>,
    },
}

/// Mnemonic for a C0 control byte or DEL.
pub fn control_name(byte: u8) -> &'static str {
    const NAMES: [&str; 32] = [
        "NUL", "SOH", "STX", "ETX", "EOT", "ENQ", "ACK", "BEL", "BS", "HT", "LF", "VT", "FF", "CR",
        "SO", "SI", "DLE", "DC1", "DC2", "DC3", "DC4", "NAK", "SYN", "ETB", "CAN", "EM", "SUB",
        "ESC", "FS", "GS", "RS", "US",
    ];
    match byte {
        0x00..=0x1F => NAMES[byte as usize],
        0x7F => "DEL",
        _ => "?",
    }
}
