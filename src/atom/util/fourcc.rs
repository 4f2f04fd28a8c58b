use derive_more::Deref;
use std::fmt;

/// Four character code identifying an atom type
#[derive(Clone, Copy, Deref, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub(crate) [u8; 4]);

impl FourCC {
    pub const fn new(value: &[u8; 4]) -> Self {
        Self(*value)
    }

    pub fn into_bytes(self) -> [u8; 4] {
        self.0
    }

    /// Parses a type code from a string, accepting the `©` glyph as the 0xA9 byte
    pub fn from_str_lossy(value: &str) -> Option<Self> {
        let mut out = [0u8; 4];
        let mut len = 0;
        for ch in value.chars() {
            if len == 4 {
                return None;
            }
            out[len] = match ch {
                '©' => 0xA9,
                c if c.is_ascii() => c as u8,
                _ => return None,
            };
            len += 1;
        }
        (len == 4).then_some(Self(out))
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        FourCC(value)
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(value: &[u8; 4]) -> Self {
        FourCC(*value)
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

impl PartialEq<[u8; 4]> for FourCC {
    fn eq(&self, other: &[u8; 4]) -> bool {
        &self.0 == other
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            std::str::from_utf8(&self.0)
                .map(|s| s.to_owned())
                .unwrap_or_else(|_| convert_mac_roman_to_utf8(&self.0))
        )
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

fn convert_mac_roman_to_utf8(bytes: &[u8]) -> String {
    let mut result = String::new();
    for &byte in bytes {
        match byte {
            0xA9 => result.push('©'),
            0xAE => result.push('®'),
            0x99 => result.push('™'),
            b if b.is_ascii() => result.push(b as char),
            _ => result.push('�'),
        }
    }
    result
}
