use bon::Builder;
use core::fmt;

use crate::{
    atom::FourCC,
    parser::{ParseAtomData, ParseError},
    writer::{SerializeAtomData, WriteError},
};

pub const HDLR: &[u8; 4] = b"hdlr";

// Common handler types
pub const HANDLER_VIDEO: &[u8; 4] = b"vide";
pub const HANDLER_AUDIO: &[u8; 4] = b"soun";
pub const HANDLER_HINT: &[u8; 4] = b"hint";
pub const HANDLER_META: &[u8; 4] = b"meta";
pub const HANDLER_TEXT: &[u8; 4] = b"text";
pub const HANDLER_MDIR: &[u8; 4] = b"mdir";
pub const HANDLER_SUBTITLE: &[u8; 4] = b"subt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Mdir,
    Subtitle,
    Unknown(FourCC),
}

impl Default for HandlerType {
    fn default() -> Self {
        Self::Unknown(FourCC([0u8; 4]))
    }
}

impl HandlerType {
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        match bytes {
            HANDLER_VIDEO => HandlerType::Video,
            HANDLER_AUDIO => HandlerType::Audio,
            HANDLER_HINT => HandlerType::Hint,
            HANDLER_META => HandlerType::Meta,
            HANDLER_TEXT => HandlerType::Text,
            HANDLER_MDIR => HandlerType::Mdir,
            HANDLER_SUBTITLE => HandlerType::Subtitle,
            _ => HandlerType::Unknown(FourCC(*bytes)),
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            HandlerType::Video => *HANDLER_VIDEO,
            HandlerType::Audio => *HANDLER_AUDIO,
            HandlerType::Hint => *HANDLER_HINT,
            HandlerType::Meta => *HANDLER_META,
            HandlerType::Text => *HANDLER_TEXT,
            HandlerType::Mdir => *HANDLER_MDIR,
            HandlerType::Subtitle => *HANDLER_SUBTITLE,
            HandlerType::Unknown(fourcc) => fourcc.into_bytes(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerType::Video => "Video",
            HandlerType::Audio => "Audio",
            HandlerType::Hint => "Hint",
            HandlerType::Meta => "Metadata",
            HandlerType::Text => "Text",
            HandlerType::Mdir => "Mdir",
            HandlerType::Subtitle => "Subtitle",
            HandlerType::Unknown(_) => "Unknown",
        }
    }
}

impl From<FourCC> for HandlerType {
    fn from(fourcc: FourCC) -> Self {
        HandlerType::from_bytes(&fourcc.into_bytes())
    }
}

/// Handler name, keeping the encoding it was read with so it is written back the same way
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerName {
    /// length byte followed by string data (QuickTime)
    Pascal(String),
    /// null terminated string (ISO)
    CString(String),
    /// anything else, kept verbatim
    Raw(Vec<u8>),
}

impl Default for HandlerName {
    fn default() -> Self {
        Self::CString(String::new())
    }
}

impl HandlerName {
    pub fn decode(data: &[u8]) -> Self {
        match data.split_first() {
            Some((&len, rest)) if usize::from(len) == rest.len() && !rest.contains(&0) => {
                match std::str::from_utf8(rest) {
                    Ok(s) if !s.is_empty() => return HandlerName::Pascal(s.to_owned()),
                    _ => {}
                }
            }
            _ => {}
        }
        if let Some((0, body)) = data.split_last() {
            if !body.contains(&0) {
                if let Ok(s) = std::str::from_utf8(body) {
                    return HandlerName::CString(s.to_owned());
                }
            }
        }
        HandlerName::Raw(data.to_vec())
    }

    pub fn encode(&self) -> Result<Vec<u8>, WriteError> {
        Ok(match self {
            HandlerName::Pascal(s) => {
                let len = u8::try_from(s.len()).map_err(|_| {
                    WriteError::invalid_value(format!(
                        "handler name of {} bytes does not fit a pascal string",
                        s.len()
                    ))
                })?;
                let mut data = Vec::with_capacity(s.len() + 1);
                data.push(len);
                data.extend(s.as_bytes());
                data
            }
            HandlerName::CString(s) => {
                let mut data = Vec::with_capacity(s.len() + 1);
                data.extend(s.as_bytes());
                data.push(0);
                data
            }
            HandlerName::Raw(data) => data.clone(),
        })
    }
}

impl fmt::Display for HandlerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerName::Pascal(s) | HandlerName::CString(s) => f.write_str(s),
            HandlerName::Raw(data) => f.write_str(&String::from_utf8_lossy(data)),
        }
    }
}

/// Handler Reference Atom - declares the media (or metadata) handler
#[derive(Default, Debug, Clone, PartialEq, Eq, Builder)]
pub struct HandlerReferenceAtom {
    /// Component type (pre-defined in ISO, 'mhlr'/'dhlr' in QuickTime)
    #[builder(default = [0u8; 4])]
    pub component_type: [u8; 4],
    /// Handler type (4CC code indicating the type of media handler)
    pub handler_type: HandlerType,
    /// Component manufacturer (usually 0)
    #[builder(default = [0u8; 4])]
    pub component_manufacturer: [u8; 4],
    /// Component flags (usually 0)
    #[builder(default = 0)]
    pub component_flags: u32,
    /// Component flags mask (usually 0)
    #[builder(default = 0)]
    pub component_flags_mask: u32,
    /// Human-readable name of the handler
    #[builder(default)]
    pub name: HandlerName,
}

impl ParseAtomData for HandlerReferenceAtom {
    fn parse_atom_data(_atom_type: FourCC, _version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_hdlr_data
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl SerializeAtomData for HandlerReferenceAtom {
    fn atom_data_bytes(&self, _version: u8) -> Result<Vec<u8>, WriteError> {
        let mut data = Vec::with_capacity(32);
        data.extend(self.component_type);
        data.extend(self.handler_type.to_bytes());
        data.extend(self.component_manufacturer);
        data.extend(self.component_flags.to_be_bytes());
        data.extend(self.component_flags_mask.to_be_bytes());
        data.extend(self.name.encode()?);
        Ok(data)
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::{seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::{HandlerName, HandlerReferenceAtom, HandlerType};
    use crate::atom::util::parser::{byte_array, fourcc, rest_vec, Stream};

    pub fn parse_hdlr_data(input: &mut Stream<'_>) -> ModalResult<HandlerReferenceAtom> {
        trace(
            "hdlr",
            seq!(HandlerReferenceAtom {
                component_type: byte_array.context(StrContext::Label("component_type")),
                handler_type: fourcc
                    .map(HandlerType::from)
                    .context(StrContext::Label("handler_type")),
                component_manufacturer: byte_array
                    .context(StrContext::Label("component_manufacturer")),
                component_flags: be_u32.context(StrContext::Label("component_flags")),
                component_flags_mask: be_u32.context(StrContext::Label("component_flags_mask")),
                name: rest_vec
                    .map(|data| HandlerName::decode(&data))
                    .context(StrContext::Label("name")),
            }),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(name_bytes: &[u8]) -> HandlerReferenceAtom {
        let mut data = vec![0u8; 4];
        data.extend(b"soun");
        data.extend([0u8; 12]);
        data.extend(name_bytes);
        let hdlr = HandlerReferenceAtom::parse_atom_data(FourCC(*HDLR), 0, &data).unwrap();
        assert_eq!(hdlr.atom_data_bytes(0).unwrap(), data);
        hdlr
    }

    #[test]
    fn test_hdlr_cstring_name() {
        let hdlr = roundtrip(b"SoundHandler\0");
        assert_eq!(hdlr.handler_type, HandlerType::Audio);
        assert_eq!(hdlr.name, HandlerName::CString("SoundHandler".to_owned()));
    }

    #[test]
    fn test_hdlr_pascal_name() {
        let hdlr = roundtrip(b"\x0cSoundHandler");
        assert_eq!(hdlr.name, HandlerName::Pascal("SoundHandler".to_owned()));
    }

    #[test]
    fn test_hdlr_odd_names_are_kept_verbatim() {
        assert_eq!(roundtrip(b"").name, HandlerName::Raw(Vec::new()));
        assert_eq!(
            roundtrip(b"Handler\0\0").name,
            HandlerName::Raw(b"Handler\0\0".to_vec())
        );
    }
}
