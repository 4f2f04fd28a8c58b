use bon::Builder;
use core::fmt;

use crate::{
    atom::{util::DebugList, FourCC},
    parser::{ParseAtomData, ParseError},
    writer::{SerializeAtomData, WriteError},
};

pub const ITUNES_GENERIC: &[u8; 4] = b"----";
pub const DATA: &[u8; 4] = b"data";
pub const MEAN: &[u8; 4] = b"mean";
pub const NAME: &[u8; 4] = b"name";

/// `©nam`, the item holding the title
pub const TITLE: &[u8; 4] = &[0xA9, b'n', b'a', b'm'];

pub const DATA_TYPE_BINARY: u32 = 0;
pub const DATA_TYPE_TEXT: u32 = 1;
pub const DATA_TYPE_JPEG: u32 = 13;

/// One `data` atom of a metadata item
#[derive(Clone, PartialEq, Eq, Builder)]
pub struct DataItem {
    #[builder(default = DATA_TYPE_BINARY)]
    pub data_type: u32,
    #[builder(default = 0)]
    pub country: u16,
    #[builder(default = 0)]
    pub language: u16,
    #[builder(into)]
    pub value: Vec<u8>,
}

impl DataItem {
    pub fn text(value: impl Into<String>) -> Self {
        DataItem::builder()
            .data_type(DATA_TYPE_TEXT)
            .value(value.into().into_bytes())
            .build()
    }

    /// Value as text, when the item is a UTF-8 string
    pub fn as_text(&self) -> Option<&str> {
        match self.data_type {
            DATA_TYPE_TEXT => std::str::from_utf8(&self.value).ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DataItem");
        s.field("data_type", &self.data_type)
            .field("country", &self.country)
            .field("language", &self.language);
        match self.as_text() {
            Some(text) => s.field("value", &text),
            None => s.field("value", &DebugList(&self.value, 10)),
        };
        s.finish()
    }
}

/// iTunes metadata item (any child of `ilst` other than `----`): a list of `data` atoms
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ItunesValueAtom {
    pub items: Vec<DataItem>,
}

impl ItunesValueAtom {
    pub fn new(items: impl Into<Vec<DataItem>>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

/// iTunes free-form item (`----`): a reverse-DNS `mean`, a `name` and the `data` atoms
#[derive(Default, Debug, Clone, PartialEq, Eq, Builder)]
pub struct ItunesGenericAtom {
    #[builder(into)]
    pub mean: String,
    #[builder(into)]
    pub name: String,
    #[builder(default)]
    pub items: Vec<DataItem>,
}

impl ParseAtomData for ItunesValueAtom {
    fn parse_atom_data(_atom_type: FourCC, _version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_value_data
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl ParseAtomData for ItunesGenericAtom {
    fn parse_atom_data(_atom_type: FourCC, _version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_generic_data
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl SerializeAtomData for ItunesValueAtom {
    fn atom_data_bytes(&self, _version: u8) -> Result<Vec<u8>, WriteError> {
        serializer::serialize_items(&self.items)
    }
}

impl SerializeAtomData for ItunesGenericAtom {
    fn atom_data_bytes(&self, _version: u8) -> Result<Vec<u8>, WriteError> {
        let mut data = Vec::new();
        data.extend(serializer::serialize_string_atom(MEAN, &self.mean)?);
        data.extend(serializer::serialize_string_atom(NAME, &self.name)?);
        data.extend(serializer::serialize_items(&self.items)?);
        Ok(data)
    }
}

mod serializer {
    use super::{DataItem, DATA};
    use crate::{atom::util::serializer::nested_atom, writer::WriteError};

    fn too_large(atom_type: &[u8; 4]) -> WriteError {
        WriteError::size(format!(
            "'{}' atom exceeds 32-bit size",
            String::from_utf8_lossy(atom_type)
        ))
    }

    pub fn serialize_items(items: &[DataItem]) -> Result<Vec<u8>, WriteError> {
        let mut data = Vec::new();
        for item in items {
            let mut body = Vec::with_capacity(8 + item.value.len());
            body.extend(item.data_type.to_be_bytes());
            body.extend(item.country.to_be_bytes());
            body.extend(item.language.to_be_bytes());
            body.extend(&item.value);
            data.extend(nested_atom(DATA, &body).ok_or_else(|| too_large(DATA))?);
        }
        Ok(data)
    }

    /// `mean` and `name` carry 4 bytes of version/flags before the string
    pub fn serialize_string_atom(atom_type: &[u8; 4], value: &str) -> Result<Vec<u8>, WriteError> {
        let mut body = Vec::with_capacity(4 + value.len());
        body.extend([0u8; 4]);
        body.extend(value.as_bytes());
        nested_atom(atom_type, &body).ok_or_else(|| too_large(atom_type))
    }
}

mod parser {
    use winnow::{
        binary::{be_u16, be_u32},
        combinator::{preceded, repeat, seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::{DataItem, ItunesGenericAtom, ItunesValueAtom, DATA, MEAN, NAME};
    use crate::atom::util::parser::{nested_atom, rest_vec, utf8_string, Stream};

    pub fn parse_value_data(input: &mut Stream<'_>) -> ModalResult<ItunesValueAtom> {
        trace(
            "itunes_value",
            seq!(ItunesValueAtom {
                items: repeat(0.., data_item).context(StrContext::Label("items")),
            }),
        )
        .parse_next(input)
    }

    pub fn parse_generic_data(input: &mut Stream<'_>) -> ModalResult<ItunesGenericAtom> {
        trace(
            "itunes_generic",
            seq!(ItunesGenericAtom {
                mean: nested_atom(MEAN, preceded(be_u32, utf8_string))
                    .context(StrContext::Label("mean")),
                name: nested_atom(NAME, preceded(be_u32, utf8_string))
                    .context(StrContext::Label("name")),
                items: repeat(0.., data_item).context(StrContext::Label("items")),
            }),
        )
        .parse_next(input)
    }

    fn data_item(input: &mut Stream<'_>) -> ModalResult<DataItem> {
        trace(
            "data",
            nested_atom(
                DATA,
                seq!(DataItem {
                    data_type: be_u32,
                    country: be_u16,
                    language: be_u16,
                    value: rest_vec,
                }),
            ),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_atom(data_type: u32, value: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend((16 + value.len() as u32).to_be_bytes());
        data.extend(DATA);
        data.extend(data_type.to_be_bytes());
        data.extend([0u8; 4]);
        data.extend(value);
        data
    }

    #[test]
    fn test_value_atom_roundtrip() {
        let mut input = data_atom(DATA_TYPE_TEXT, b"My Title");
        input.extend(data_atom(DATA_TYPE_JPEG, &[0xFF, 0xD8]));
        let atom = ItunesValueAtom::parse_atom_data(FourCC(*TITLE), 0, &input).unwrap();
        assert_eq!(atom.items.len(), 2);
        assert_eq!(atom.items[0].as_text(), Some("My Title"));
        assert_eq!(atom.items[1].as_text(), None);
        assert_eq!(atom.atom_data_bytes(0).unwrap(), input);
    }

    #[test]
    fn test_generic_atom_roundtrip() {
        let atom = ItunesGenericAtom::builder()
            .mean("com.apple.iTunes")
            .name("iTunSMPB")
            .items(vec![DataItem::text("0 840")])
            .build();
        let bytes = atom.atom_data_bytes(0).unwrap();
        assert_eq!(&bytes[4..8], MEAN);
        assert_eq!(&bytes[8..12], &[0u8; 4]);
        let decoded =
            ItunesGenericAtom::parse_atom_data(FourCC(*ITUNES_GENERIC), 0, &bytes).unwrap();
        assert_eq!(decoded, atom);
    }

    #[test]
    fn test_truncated_data_atom() {
        let mut input = data_atom(DATA_TYPE_TEXT, b"abc");
        input.pop();
        assert!(ItunesValueAtom::parse_atom_data(FourCC(*TITLE), 0, &input).is_err());
    }
}
