use derive_more::{Deref, DerefMut};
use std::fmt;

use crate::{
    atom::FourCC,
    parser::{ParseAtomData, ParseError},
    writer::{SerializeAtomData, WriteError},
};

// Common reference types
pub const REFERENCE_HINT: &[u8; 4] = b"hint";
pub const REFERENCE_CHAPTER: &[u8; 4] = b"chap";
pub const REFERENCE_SUBTITLE: &[u8; 4] = b"subt";
/// Subtitle track an audio track plays with by default
pub const REFERENCE_FOLLOW_SUBTITLE: &[u8; 4] = b"folw";
/// Forced-only subtitle track for a full subtitle track of the same language
pub const REFERENCE_FORCED_SUBTITLE: &[u8; 4] = b"forc";

/// Track reference type atom (child of `tref`): the ids of the tracks referenced by its type
#[derive(Default, Debug, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct TrackIdsAtom(pub Vec<u32>);

impl fmt::Display for TrackIdsAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.0
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl ParseAtomData for TrackIdsAtom {
    fn parse_atom_data(_atom_type: FourCC, _version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_track_ids
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl SerializeAtomData for TrackIdsAtom {
    fn atom_data_bytes(&self, _version: u8) -> Result<Vec<u8>, WriteError> {
        Ok(self.0.iter().flat_map(|id| id.to_be_bytes()).collect())
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::{repeat, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::TrackIdsAtom;
    use crate::atom::util::parser::Stream;

    pub fn parse_track_ids(input: &mut Stream<'_>) -> ModalResult<TrackIdsAtom> {
        trace(
            "track_ids",
            repeat(0.., be_u32)
                .map(TrackIdsAtom)
                .context(StrContext::Label("track ids")),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_ids() {
        let data = [0, 0, 0, 2, 0, 0, 0, 3];
        let ids = TrackIdsAtom::parse_atom_data(FourCC(*REFERENCE_CHAPTER), 0, &data).unwrap();
        assert_eq!(*ids, vec![2, 3]);
        assert_eq!(ids.to_string(), "[2, 3]");
        assert_eq!(ids.atom_data_bytes(0).unwrap(), data);
    }

    #[test]
    fn test_truncated_track_id() {
        assert!(TrackIdsAtom::parse_atom_data(FourCC(*REFERENCE_HINT), 0, &[0, 0, 1]).is_err());
    }
}
