use derive_more::{Deref, DerefMut};
use std::fmt;

use crate::{
    atom::util::DebugList,
    parser::ParseError,
    writer::WriteError,
};

pub const STCO: &[u8; 4] = b"stco";
pub const CO64: &[u8; 4] = b"co64";

#[derive(Default, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct ChunkOffsets(Vec<u64>);

impl ChunkOffsets {
    pub fn into_inner(self) -> Vec<u64> {
        self.0
    }

    pub fn inner(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for ChunkOffsets {
    fn from(value: Vec<u64>) -> Self {
        Self(value)
    }
}

impl FromIterator<u64> for ChunkOffsets {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        Self(Vec::from_iter(iter))
    }
}

impl fmt::Debug for ChunkOffsets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&DebugList(&self.0, 10), f)
    }
}

/// Chunk Offset Atom - absolute file offsets of every chunk of a track.
///
/// The same table backs both `stco` (32-bit entries) and `co64` (64-bit entries); the entry
/// width is decided by the atom's kind when reading and writing.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ChunkOffsetAtom {
    pub chunk_offsets: ChunkOffsets,
}

impl ChunkOffsetAtom {
    pub fn new(chunk_offsets: impl Into<ChunkOffsets>) -> Self {
        Self {
            chunk_offsets: chunk_offsets.into(),
        }
    }

    /// Returns the total number of chunks
    pub fn chunk_count(&self) -> usize {
        self.chunk_offsets.len()
    }

    /// Whether every offset can be written to a 32-bit table
    pub fn fits_32bit(&self) -> bool {
        self.chunk_offsets.iter().all(|&o| o <= u64::from(u32::MAX))
    }

    /// Encoded content length for the given entry width
    pub fn table_len(&self, is_64bit: bool) -> u64 {
        let entry_size = if is_64bit { 8 } else { 4 };
        4 + entry_size * self.chunk_offsets.len() as u64
    }

    pub(crate) fn parse_table(input: &[u8], is_64bit: bool) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::chunk_offsets(is_64bit)
            .map(|chunk_offsets| ChunkOffsetAtom { chunk_offsets })
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }

    pub(crate) fn table_bytes(&self, is_64bit: bool) -> Result<Vec<u8>, WriteError> {
        serializer::serialize_chunk_offsets(&self.chunk_offsets, is_64bit)
    }
}

mod serializer {
    use super::ChunkOffsets;
    use crate::writer::WriteError;

    pub fn serialize_chunk_offsets(
        offsets: &ChunkOffsets,
        is_64bit: bool,
    ) -> Result<Vec<u8>, WriteError> {
        let count = u32::try_from(offsets.len()).map_err(|_| {
            WriteError::size(format!("{} chunk offsets exceed u32 entry count", offsets.len()))
        })?;
        let mut data = Vec::with_capacity(4 + offsets.len() * if is_64bit { 8 } else { 4 });
        data.extend(count.to_be_bytes());
        for &offset in offsets.iter() {
            if is_64bit {
                data.extend(offset.to_be_bytes());
            } else {
                let offset = u32::try_from(offset).map_err(|_| {
                    WriteError::size(format!("chunk offset {offset} does not fit stco"))
                })?;
                data.extend(offset.to_be_bytes());
            }
        }
        Ok(data)
    }
}

mod parser {
    use winnow::{
        binary::{be_u32, be_u64},
        combinator::{repeat, trace},
        error::{ContextError, ErrMode, StrContext},
        Parser,
    };

    use super::ChunkOffsets;
    use crate::atom::util::parser::{be_u32_as_u64, Stream};

    pub fn chunk_offsets<'i>(
        is_64bit: bool,
    ) -> impl Parser<Stream<'i>, ChunkOffsets, ErrMode<ContextError>> {
        trace("chunk_offsets", move |input: &mut Stream<'_>| {
            let entry_count = be_u32.parse_next(input)?;
            repeat(entry_count as usize, chunk_offset(is_64bit))
                .map(ChunkOffsets)
                .context(StrContext::Label("chunk_offsets"))
                .parse_next(input)
        })
    }

    fn chunk_offset<'i>(is_64bit: bool) -> impl Parser<Stream<'i>, u64, ErrMode<ContextError>> {
        trace("chunk_offset", move |input: &mut Stream<'_>| {
            if is_64bit {
                be_u64.parse_next(input)
            } else {
                be_u32_as_u64.parse_next(input)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stco_and_co64() {
        let stco = [0, 0, 0, 2, 0, 0, 0, 100, 0, 0, 19, 136];
        let atom = ChunkOffsetAtom::parse_table(&stco, false).unwrap();
        assert_eq!(atom.chunk_offsets.inner(), &[100, 5000]);
        assert_eq!(atom.table_bytes(false).unwrap(), stco);

        let co64 = atom.table_bytes(true).unwrap();
        assert_eq!(co64.len() as u64, atom.table_len(true));
        assert_eq!(ChunkOffsetAtom::parse_table(&co64, true).unwrap(), atom);
    }

    #[test]
    fn test_entry_count_mismatch() {
        let data = [0, 0, 0, 3, 0, 0, 0, 100];
        assert!(ChunkOffsetAtom::parse_table(&data, false).is_err());
    }

    #[test]
    fn test_narrow_overflow() {
        let atom = ChunkOffsetAtom::new(vec![1u64 << 32]);
        assert!(!atom.fits_32bit());
        assert!(atom.table_bytes(false).is_err());
        assert!(atom.table_bytes(true).is_ok());
    }
}
