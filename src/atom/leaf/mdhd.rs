use bon::Builder;
use std::{fmt, time::Duration};

use crate::{
    atom::{util::unscaled_duration, FourCC},
    parser::{ParseAtomData, ParseError},
    writer::{SerializeAtomData, WriteError},
};

pub const MDHD: &[u8; 4] = b"mdhd";

/// Packed ISO 639-2/T language code (three 5-bit characters offset by 0x60)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanguageCode(pub u16);

impl LanguageCode {
    pub const UNDETERMINED: LanguageCode = LanguageCode(0x55C4);

    /// Packs a three letter lowercase code, returning `None` for anything else
    pub fn from_code(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_lowercase) {
            return None;
        }
        let packed = bytes
            .iter()
            .fold(0u16, |acc, c| (acc << 5) | u16::from(c - 0x60));
        Some(Self(packed))
    }

    /// Unpacks the three characters, or `None` for QuickTime numeric language codes
    pub fn chars(self) -> Option<[char; 3]> {
        let unpack = |shift: u16| -> Option<char> {
            let bits = (self.0 >> shift) & 0x1F;
            (1..=26).contains(&bits).then(|| char::from(bits as u8 + 0x60))
        };
        Some([unpack(10)?, unpack(5)?, unpack(0)?])
    }
}

impl Default for LanguageCode {
    fn default() -> Self {
        Self::UNDETERMINED
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chars() {
            Some([a, b, c]) => write!(f, "{a}{b}{c}"),
            None => write!(f, "#{}", self.0),
        }
    }
}

impl fmt::Debug for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LanguageCode({self})")
    }
}

/// Media Header Atom - timescale, duration and language of a track's media
#[derive(Default, Debug, Clone, PartialEq, Eq, Builder)]
pub struct MediaHeaderAtom {
    /// Creation time (seconds since midnight, Jan. 1, 1904, UTC)
    #[builder(default = 0)]
    pub creation_time: u64,
    /// Modification time (seconds since midnight, Jan. 1, 1904, UTC)
    #[builder(default = 0)]
    pub modification_time: u64,
    /// Media timescale (number of time units per second)
    pub timescale: u32,
    /// Duration of media (in timescale units)
    pub duration: u64,
    /// Language code (ISO 639-2/T language code)
    #[builder(default)]
    pub language: LanguageCode,
    /// Pre-defined value (should be 0)
    #[builder(default = 0)]
    pub pre_defined: u16,
}

impl MediaHeaderAtom {
    pub fn duration(&self) -> Duration {
        unscaled_duration(self.duration, u64::from(self.timescale))
    }
}

impl ParseAtomData for MediaHeaderAtom {
    fn parse_atom_data(_atom_type: FourCC, version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_mdhd_data(version)
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl SerializeAtomData for MediaHeaderAtom {
    fn atom_data_bytes(&self, version: u8) -> Result<Vec<u8>, WriteError> {
        serializer::serialize_mdhd_data(self, version)
    }
}

mod serializer {
    use super::MediaHeaderAtom;
    use crate::{atom::util::serializer::be_u32_or_u64, writer::WriteError};

    pub fn serialize_mdhd_data(
        mdhd: &MediaHeaderAtom,
        version: u8,
    ) -> Result<Vec<u8>, WriteError> {
        let versioned = |name: &'static str, value: u64| {
            be_u32_or_u64(version, value).ok_or_else(|| {
                WriteError::invalid_value(format!(
                    "mdhd {name} {value} does not fit version {version}"
                ))
            })
        };

        let mut data = Vec::with_capacity(32);
        data.extend(versioned("creation_time", mdhd.creation_time)?);
        data.extend(versioned("modification_time", mdhd.modification_time)?);
        data.extend(mdhd.timescale.to_be_bytes());
        data.extend(versioned("duration", mdhd.duration)?);
        data.extend(mdhd.language.0.to_be_bytes());
        data.extend(mdhd.pre_defined.to_be_bytes());
        Ok(data)
    }
}

mod parser {
    use winnow::{
        binary::{be_u16, be_u32},
        combinator::{seq, trace},
        error::{ContextError, ErrMode, StrContext},
        Parser,
    };

    use super::{LanguageCode, MediaHeaderAtom};
    use crate::atom::util::parser::{be_u32_or_u64, Stream};

    pub fn parse_mdhd_data<'i>(
        version: u8,
    ) -> impl Parser<Stream<'i>, MediaHeaderAtom, ErrMode<ContextError>> {
        trace("mdhd", move |input: &mut Stream<'i>| {
            seq!(MediaHeaderAtom {
                creation_time: be_u32_or_u64(version).context(StrContext::Label("creation_time")),
                modification_time: be_u32_or_u64(version)
                    .context(StrContext::Label("modification_time")),
                timescale: be_u32.context(StrContext::Label("timescale")),
                duration: be_u32_or_u64(version).context(StrContext::Label("duration")),
                language: be_u16.map(LanguageCode).context(StrContext::Label("language")),
                pre_defined: be_u16.context(StrContext::Label("pre_defined")),
            })
            .parse_next(input)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_code() {
        let eng = LanguageCode::from_code("eng").unwrap();
        assert_eq!(eng.0, 0x15C7);
        assert_eq!(eng.to_string(), "eng");
        assert_eq!(LanguageCode::default().to_string(), "und");
        assert_eq!(LanguageCode(0).to_string(), "#0");
        assert!(LanguageCode::from_code("EN").is_none());
    }

    #[test]
    fn test_mdhd_roundtrip() {
        let mdhd = MediaHeaderAtom::builder()
            .timescale(44_100)
            .duration(441_000)
            .language(LanguageCode::from_code("deu").unwrap())
            .build();
        let bytes = mdhd.atom_data_bytes(0).unwrap();
        assert_eq!(bytes.len(), 20);
        let decoded = MediaHeaderAtom::parse_atom_data(FourCC(*MDHD), 0, &bytes).unwrap();
        assert_eq!(decoded, mdhd);
        assert_eq!(decoded.duration(), Duration::from_secs(10));
    }
}
