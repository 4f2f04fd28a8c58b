use bon::Builder;

use crate::{
    atom::FourCC,
    parser::{ParseAtomData, ParseError},
    writer::{SerializeAtomData, WriteError},
};

pub const FTYP: &[u8; 4] = b"ftyp";

/// Major brands a file must declare to be accepted
pub const SUPPORTED_BRANDS: [&[u8; 4]; 6] = [b"isom", b"iso2", b"mp41", b"mp42", b"M4A ", b"M4V "];

/// File Type Atom (ftyp) - ISO/IEC 14496-12
/// This atom identifies the specifications to which this file complies.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct FileTypeAtom {
    /// Major brand - identifies the 'best use' of the file
    #[builder(into)]
    pub major_brand: FourCC,
    /// Minor version - an informative integer for the minor version of the major brand
    #[builder(default = Default::default())]
    pub minor_version: u32,
    /// Compatible brands - a list of brands compatible with this file
    #[builder(default = vec![major_brand], into)]
    pub compatible_brands: Vec<FourCC>,
}

impl Default for FileTypeAtom {
    fn default() -> Self {
        Self {
            major_brand: FourCC(*b"isom"),
            minor_version: 512,
            compatible_brands: vec![FourCC(*b"isom")],
        }
    }
}

impl FileTypeAtom {
    pub fn is_supported_brand(&self) -> bool {
        SUPPORTED_BRANDS.iter().any(|brand| self.major_brand == *brand)
    }
}

impl ParseAtomData for FileTypeAtom {
    fn parse_atom_data(_atom_type: FourCC, _version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_ftyp_data
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl SerializeAtomData for FileTypeAtom {
    fn atom_data_bytes(&self, _version: u8) -> Result<Vec<u8>, WriteError> {
        Ok(serializer::serialize_ftyp_data(self))
    }
}

mod serializer {
    use super::FileTypeAtom;

    pub fn serialize_ftyp_data(ftyp: &FileTypeAtom) -> Vec<u8> {
        let mut data = Vec::with_capacity(8 + ftyp.compatible_brands.len() * 4);
        data.extend(ftyp.major_brand.into_bytes());
        data.extend(ftyp.minor_version.to_be_bytes());
        for brand in &ftyp.compatible_brands {
            data.extend(brand.into_bytes());
        }
        data
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::{repeat, seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::FileTypeAtom;
    use crate::atom::util::parser::{fourcc, Stream};

    pub fn parse_ftyp_data(input: &mut Stream<'_>) -> ModalResult<FileTypeAtom> {
        trace(
            "ftyp",
            seq!(FileTypeAtom {
                major_brand: fourcc.context(StrContext::Label("major_brand")),
                minor_version: be_u32.context(StrContext::Label("minor_version")),
                compatible_brands: repeat(0.., fourcc)
                    .context(StrContext::Label("compatible_brands")),
            }),
        )
        .parse_next(input)
    }
}
