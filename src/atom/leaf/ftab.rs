use derive_more::{Deref, DerefMut};

use crate::{
    atom::FourCC,
    parser::{ParseAtomData, ParseError},
    writer::{SerializeAtomData, WriteError},
};

pub const FTAB: &[u8; 4] = b"ftab";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRecord {
    pub font_id: u16,
    pub name: String,
}

impl FontRecord {
    pub fn new(font_id: u16, name: impl Into<String>) -> Self {
        Self {
            font_id,
            name: name.into(),
        }
    }
}

/// Font table of a 3GPP timed text sample entry
#[derive(Default, Debug, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct FontTableAtom(pub Vec<FontRecord>);

impl ParseAtomData for FontTableAtom {
    fn parse_atom_data(_atom_type: FourCC, _version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_font_table
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl SerializeAtomData for FontTableAtom {
    fn atom_data_bytes(&self, _version: u8) -> Result<Vec<u8>, WriteError> {
        let count = u16::try_from(self.0.len())
            .map_err(|_| WriteError::size(format!("{} fonts exceed u16 count", self.0.len())))?;
        let mut data = count.to_be_bytes().to_vec();
        for font in &self.0 {
            let len = u8::try_from(font.name.len()).map_err(|_| {
                WriteError::size(format!("font name '{}' exceeds 255 bytes", font.name))
            })?;
            data.extend(font.font_id.to_be_bytes());
            data.push(len);
            data.extend(font.name.as_bytes());
        }
        Ok(data)
    }
}

mod parser {
    use winnow::{
        binary::{be_u16, length_take, u8},
        combinator::{repeat, seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::{FontRecord, FontTableAtom};
    use crate::atom::util::parser::Stream;

    pub fn parse_font_table(input: &mut Stream<'_>) -> ModalResult<FontTableAtom> {
        trace("font_table", |input: &mut Stream<'_>| {
            let count = be_u16.parse_next(input)?;
            repeat(usize::from(count), font_record)
                .map(FontTableAtom)
                .context(StrContext::Label("font records"))
                .parse_next(input)
        })
        .parse_next(input)
    }

    fn font_record(input: &mut Stream<'_>) -> ModalResult<FontRecord> {
        trace(
            "font_record",
            seq!(FontRecord {
                font_id: be_u16.context(StrContext::Label("font_id")),
                name: length_take(u8)
                    .map(|name: &[u8]| String::from_utf8_lossy(name).into_owned())
                    .context(StrContext::Label("font_name")),
            }),
        )
        .parse_next(input)
    }
}
