//! Builders for synthetic MP4 files used by unit tests

use std::io::Cursor;

use crate::{
    atom::{
        AtomTree, FileTypeAtom, HandlerName, HandlerReferenceAtom, HandlerType, MediaHeaderAtom,
        MovieHeaderAtom, TrackHeaderAtom,
    },
    parser::Mp4Parser,
    reader::Mp4Reader,
    writer::SerializeAtomData,
};

/// Encodes an atom with a 32-bit size header
pub fn atom(atom_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(8 + content.len());
    output.extend((8 + content.len() as u32).to_be_bytes());
    output.extend(atom_type);
    output.extend(content);
    output
}

/// Encodes a full atom with zero flags
pub fn full_atom(atom_type: &[u8; 4], version: u8, content: &[u8]) -> Vec<u8> {
    full_atom_with_flags(atom_type, version, 0, content)
}

pub fn full_atom_with_flags(atom_type: &[u8; 4], version: u8, flags: u32, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + content.len());
    body.push(version);
    body.extend(&flags.to_be_bytes()[1..]);
    body.extend(content);
    atom(atom_type, &body)
}

fn concat(parts: impl IntoIterator<Item = Vec<u8>>) -> Vec<u8> {
    parts.into_iter().flatten().collect()
}

/// Builds a single audio track file: `ftyp`, `moov`, `mdat` (or `ftyp`, `mdat`, `moov`).
///
/// Every leaf is encoded with the crate's own field codecs, so re-encoding an unchanged tree
/// reproduces the input exactly.
#[derive(Debug, Clone)]
pub struct Mp4Builder {
    chunk_offsets: Vec<u64>,
    large_offsets: bool,
    mdat_payload: Vec<u8>,
    mdat_first: bool,
    with_tkhd: bool,
    movie_children: Vec<Vec<u8>>,
    free_after_ftyp: Option<u32>,
    free_after_moov: Option<u32>,
}

impl Default for Mp4Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Builder {
    pub fn new() -> Self {
        Self {
            chunk_offsets: Vec::new(),
            large_offsets: false,
            mdat_payload: vec![0xAB; 64],
            mdat_first: false,
            with_tkhd: true,
            movie_children: Vec::new(),
            free_after_ftyp: None,
            free_after_moov: None,
        }
    }

    pub fn chunk_offsets(mut self, chunk_offsets: Vec<u64>) -> Self {
        self.chunk_offsets = chunk_offsets;
        self
    }

    /// Stores the offsets in a `co64` table
    pub fn large_offsets(mut self) -> Self {
        self.large_offsets = true;
        self
    }

    pub fn mdat_payload(mut self, payload: Vec<u8>) -> Self {
        self.mdat_payload = payload;
        self
    }

    /// Places `mdat` before `moov`
    pub fn mdat_first(mut self) -> Self {
        self.mdat_first = true;
        self
    }

    pub fn without_tkhd(mut self) -> Self {
        self.with_tkhd = false;
        self
    }

    /// Appends an encoded atom to `moov`, after the track
    pub fn movie_child(mut self, child: Vec<u8>) -> Self {
        self.movie_children.push(child);
        self
    }

    /// Inserts a `free` atom with `data_size` zero bytes right after `ftyp`
    pub fn free_after_ftyp(mut self, data_size: u32) -> Self {
        self.free_after_ftyp = Some(data_size);
        self
    }

    /// Inserts a `free` atom with `data_size` zero bytes right after `moov`
    pub fn free_after_moov(mut self, data_size: u32) -> Self {
        self.free_after_moov = Some(data_size);
        self
    }

    pub fn ftyp_bytes(&self) -> Vec<u8> {
        let ftyp = FileTypeAtom::builder()
            .major_brand(*b"isom")
            .minor_version(512)
            .compatible_brands(vec![(*b"isom").into(), (*b"mp42").into()])
            .build();
        atom(b"ftyp", &ftyp.atom_data_bytes(0).unwrap())
    }

    pub fn moov_bytes(&self) -> Vec<u8> {
        let mvhd = MovieHeaderAtom::builder()
            .timescale(1000)
            .duration(10_000)
            .next_track_id(2)
            .build();
        let mut children = vec![full_atom(b"mvhd", 0, &mvhd.atom_data_bytes(0).unwrap())];
        children.push(self.trak_bytes());
        children.extend(self.movie_children.iter().cloned());
        atom(b"moov", &concat(children))
    }

    fn trak_bytes(&self) -> Vec<u8> {
        let mut children = Vec::new();
        if self.with_tkhd {
            let tkhd = TrackHeaderAtom::builder().track_id(1).duration(10_000).build();
            children.push(full_atom_with_flags(
                b"tkhd",
                0,
                3,
                &tkhd.atom_data_bytes(0).unwrap(),
            ));
        }
        children.push(self.mdia_bytes());
        atom(b"trak", &concat(children))
    }

    fn mdia_bytes(&self) -> Vec<u8> {
        let mdhd = MediaHeaderAtom::builder()
            .timescale(44_100)
            .duration(441_000)
            .build();
        let hdlr = HandlerReferenceAtom::builder()
            .handler_type(HandlerType::Audio)
            .name(HandlerName::CString("SoundHandler".to_string()))
            .build();
        atom(
            b"mdia",
            &concat([
                full_atom(b"mdhd", 0, &mdhd.atom_data_bytes(0).unwrap()),
                full_atom(b"hdlr", 0, &hdlr.atom_data_bytes(0).unwrap()),
                self.minf_bytes(),
            ]),
        )
    }

    fn minf_bytes(&self) -> Vec<u8> {
        let dref_entries = concat([1u32.to_be_bytes().to_vec(), full_atom_with_flags(b"url ", 0, 1, &[])]);
        atom(
            b"minf",
            &concat([
                full_atom(b"smhd", 0, &[0u8; 4]),
                atom(b"dinf", &full_atom(b"dref", 0, &dref_entries)),
                self.stbl_bytes(),
            ]),
        )
    }

    fn stbl_bytes(&self) -> Vec<u8> {
        let mut prefix = vec![0u8; 28];
        // data reference index
        prefix[7] = 1;
        prefix[17] = 2;
        prefix[19] = 16;
        let stsd_entries = concat([1u32.to_be_bytes().to_vec(), atom(b"mp4a", &prefix)]);

        let mut table = (self.chunk_offsets.len() as u32).to_be_bytes().to_vec();
        for offset in &self.chunk_offsets {
            if self.large_offsets {
                table.extend(offset.to_be_bytes());
            } else {
                table.extend((*offset as u32).to_be_bytes());
            }
        }
        let chunk_offsets = if self.large_offsets {
            full_atom(b"co64", 0, &table)
        } else {
            full_atom(b"stco", 0, &table)
        };

        atom(
            b"stbl",
            &concat([
                full_atom(b"stsd", 0, &stsd_entries),
                full_atom(b"stts", 0, &[0u8; 4]),
                full_atom(b"stsc", 0, &[0u8; 4]),
                full_atom(b"stsz", 0, &[0u8; 8]),
                chunk_offsets,
            ]),
        )
    }

    pub fn mdat_bytes(&self) -> Vec<u8> {
        atom(b"mdat", &self.mdat_payload)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut output = self.ftyp_bytes();
        if let Some(size) = self.free_after_ftyp {
            output.extend(atom(b"free", &vec![0u8; size as usize]));
        }
        let moov = {
            let mut moov = self.moov_bytes();
            if let Some(size) = self.free_after_moov {
                moov.extend(atom(b"free", &vec![0u8; size as usize]));
            }
            moov
        };
        if self.mdat_first {
            output.extend(self.mdat_bytes());
            output.extend(moov);
        } else {
            output.extend(moov);
            output.extend(self.mdat_bytes());
        }
        output
    }

    pub fn parse_tree(&self) -> AtomTree {
        let data = self.build();
        let mut reader = Mp4Reader::new(Cursor::new(data)).unwrap();
        Mp4Parser::default().parse(&mut reader).unwrap()
    }
}

/// Panics with hex dumps of both buffers when they differ
pub fn assert_bytes_equal(actual: &[u8], expected: &[u8]) {
    if actual == expected {
        return;
    }

    fn format_hex_groups(size: usize, data: &[u8]) -> String {
        data.chunks(size)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|b| format!("{:02X}", b))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    let first_difference = actual
        .iter()
        .zip(expected)
        .position(|(a, e)| a != e)
        .unwrap_or(actual.len().min(expected.len()));

    panic!(
        "byte mismatch at offset {first_difference} (actual {} bytes, expected {} bytes)\n\
         actual:   {}\n\
         expected: {}",
        actual.len(),
        expected.len(),
        format_hex_groups(4, actual),
        format_hex_groups(4, expected),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomKind;

    #[test]
    fn test_builder_layouts() {
        let tree = Mp4Builder::new().mdat_first().free_after_ftyp(8).parse_tree();
        let kinds: Vec<_> = tree.roots().iter().map(|id| tree[*id].kind()).collect();
        assert_eq!(
            kinds,
            vec![
                AtomKind::FileType,
                AtomKind::FreeSpace,
                AtomKind::MediaData,
                AtomKind::Movie
            ]
        );
    }

    #[test]
    fn test_large_offsets_build_co64() {
        let tree = Mp4Builder::new()
            .chunk_offsets(vec![1 << 33])
            .large_offsets()
            .parse_tree();
        let table = tree.chunk_offset_tables()[0];
        assert_eq!(tree[table].kind(), AtomKind::ChunkLargeOffset);
        let atom = tree[table].data().as_chunk_offsets().unwrap();
        assert_eq!(atom.chunk_offsets.inner(), &[1 << 33]);
    }
}
