#![allow(dead_code)]

//! Hand-assembled MP4 files for integration tests

use std::io::Cursor;

use mp4_rewrite::{AtomTree, Mp4Parser, Mp4Reader, ParseError};

pub const UNDETERMINED_LANGUAGE: u16 = 0x55C4;

pub fn atom(atom_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut output = ((content.len() + 8) as u32).to_be_bytes().to_vec();
    output.extend(atom_type);
    output.extend(content);
    output
}

pub fn full_atom(atom_type: &[u8; 4], version: u8, flags: u32, content: &[u8]) -> Vec<u8> {
    let mut body = flags.to_be_bytes().to_vec();
    body[0] = version;
    body.extend(content);
    atom(atom_type, &body)
}

fn join(parts: &[Vec<u8>]) -> Vec<u8> {
    parts.concat()
}

/// Big endian field writer
#[derive(Default)]
pub struct Fields(Vec<u8>);

impl Fields {
    pub fn u16(mut self, value: u16) -> Self {
        self.0.extend(value.to_be_bytes());
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.0.extend(value.to_be_bytes());
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.0.extend(value);
        self
    }

    pub fn zeros(mut self, len: usize) -> Self {
        self.0.resize(self.0.len() + len, 0);
        self
    }

    pub fn matrix(self) -> Self {
        [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000]
            .into_iter()
            .fold(self, |fields, value| fields.u32(value))
    }

    pub fn finish(self) -> Vec<u8> {
        self.0
    }
}

pub fn ftyp() -> Vec<u8> {
    atom(
        b"ftyp",
        &Fields::default()
            .bytes(b"isom")
            .u32(512)
            .bytes(b"isom")
            .bytes(b"mp41")
            .finish(),
    )
}

pub fn free(data_size: usize) -> Vec<u8> {
    atom(b"free", &vec![0u8; data_size])
}

pub fn mdat(payload: &[u8]) -> Vec<u8> {
    atom(b"mdat", payload)
}

pub fn mvhd(timescale: u32, duration: u32, next_track_id: u32) -> Vec<u8> {
    let content = Fields::default()
        .u32(0)
        .u32(0)
        .u32(timescale)
        .u32(duration)
        .u32(0x0001_0000)
        .u16(0x0100)
        .zeros(10)
        .matrix()
        .zeros(24)
        .u32(next_track_id)
        .finish();
    full_atom(b"mvhd", 0, 0, &content)
}

#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: u32,
    pub handler: [u8; 4],
    pub timescale: u32,
    pub chunk_offsets: Vec<u64>,
    pub large_offsets: bool,
}

impl Track {
    pub fn audio(track_id: u32, chunk_offsets: Vec<u64>) -> Self {
        Self {
            track_id,
            handler: *b"soun",
            timescale: 48_000,
            chunk_offsets,
            large_offsets: false,
        }
    }

    pub fn video(track_id: u32, chunk_offsets: Vec<u64>) -> Self {
        Self {
            track_id,
            handler: *b"vide",
            timescale: 12_800,
            chunk_offsets,
            large_offsets: false,
        }
    }

    /// A `subt` track with a `tx3g` entry using a serif font
    pub fn subtitle(track_id: u32, chunk_offsets: Vec<u64>) -> Self {
        Self {
            track_id,
            handler: *b"subt",
            timescale: 1000,
            chunk_offsets,
            large_offsets: false,
        }
    }

    pub fn large_offsets(mut self) -> Self {
        self.large_offsets = true;
        self
    }

    pub fn tkhd(&self) -> Vec<u8> {
        let content = Fields::default()
            .u32(0)
            .u32(0)
            .u32(self.track_id)
            .u32(0)
            .u32(10_000)
            .zeros(8)
            .u16(0)
            .u16(0)
            .u16(if self.handler == *b"soun" { 0x0100 } else { 0 })
            .u16(0)
            .matrix()
            .u32(0)
            .u32(0)
            .finish();
        full_atom(b"tkhd", 0, 3, &content)
    }

    pub fn mdhd(&self) -> Vec<u8> {
        let content = Fields::default()
            .u32(0)
            .u32(0)
            .u32(self.timescale)
            .u32(self.timescale * 10)
            .u16(UNDETERMINED_LANGUAGE)
            .u16(0)
            .finish();
        full_atom(b"mdhd", 0, 0, &content)
    }

    pub fn hdlr(&self) -> Vec<u8> {
        let content = Fields::default()
            .u32(0)
            .bytes(&self.handler)
            .zeros(12)
            .bytes(b"Handler\0")
            .finish();
        full_atom(b"hdlr", 0, 0, &content)
    }

    fn sample_entry(&self) -> Option<Vec<u8>> {
        let (atom_type, prefix_len) = match &self.handler {
            b"soun" => (b"mp4a", 28),
            b"vide" => (b"avc1", 78),
            b"subt" => (b"tx3g", 38),
            _ => return None,
        };
        let mut prefix = vec![0u8; prefix_len];
        prefix[7] = 1;
        if atom_type == b"tx3g" {
            // some samples forced, default font size 18
            prefix[8] = 0x40;
            prefix[33] = 18;
            prefix.extend(atom(b"ftab", &font_table(&[(1, "Serif")])));
        }
        Some(atom(atom_type, &prefix))
    }

    pub fn chunk_offset_table(&self) -> Vec<u8> {
        let mut content = Fields::default().u32(self.chunk_offsets.len() as u32);
        for offset in &self.chunk_offsets {
            content = if self.large_offsets {
                content.u32((offset >> 32) as u32).u32(*offset as u32)
            } else {
                content.u32(*offset as u32)
            };
        }
        let atom_type = if self.large_offsets { b"co64" } else { b"stco" };
        full_atom(atom_type, 0, 0, &content.finish())
    }

    pub fn stbl(&self) -> Vec<u8> {
        let entries: Vec<Vec<u8>> = self.sample_entry().into_iter().collect();
        let mut stsd = (entries.len() as u32).to_be_bytes().to_vec();
        stsd.extend(entries.concat());
        atom(
            b"stbl",
            &join(&[
                full_atom(b"stsd", 0, 0, &stsd),
                full_atom(b"stts", 0, 0, &[0u8; 4]),
                full_atom(b"stsc", 0, 0, &[0u8; 4]),
                full_atom(b"stsz", 0, 0, &[0u8; 8]),
                self.chunk_offset_table(),
            ]),
        )
    }

    pub fn minf(&self) -> Vec<u8> {
        let media_header = match &self.handler {
            b"vide" => full_atom(b"vmhd", 0, 1, &[0u8; 8]),
            b"soun" => full_atom(b"smhd", 0, 0, &[0u8; 4]),
            _ => full_atom(b"nmhd", 0, 0, &[]),
        };
        let mut dref = 1u32.to_be_bytes().to_vec();
        dref.extend(full_atom(b"url ", 0, 1, &[]));
        atom(
            b"minf",
            &join(&[
                media_header,
                atom(b"dinf", &full_atom(b"dref", 0, 0, &dref)),
                self.stbl(),
            ]),
        )
    }

    pub fn trak(&self) -> Vec<u8> {
        let mdia = atom(b"mdia", &join(&[self.mdhd(), self.hdlr(), self.minf()]));
        atom(b"trak", &join(&[self.tkhd(), mdia]))
    }
}

/// `ftab` content: a u16 count, then id, name length and name per font
pub fn font_table(fonts: &[(u16, &str)]) -> Vec<u8> {
    let mut content = Fields::default().u16(fonts.len() as u16);
    for (id, name) in fonts {
        content = content.u16(*id).bytes(&[name.len() as u8]).bytes(name.as_bytes());
    }
    content.finish()
}

pub fn moov(tracks: &[Track], extra_children: &[Vec<u8>]) -> Vec<u8> {
    let next_track_id = tracks.iter().map(|track| track.track_id).max().unwrap_or(0) + 1;
    let mut children = vec![mvhd(1000, 10_000, next_track_id)];
    children.extend(tracks.iter().map(Track::trak));
    children.extend(extra_children.iter().cloned());
    atom(b"moov", &join(&children))
}

/// `udta` > `meta` > `ilst` with a `©nam` title
pub fn udta_with_title(title: &str) -> Vec<u8> {
    let data = full_atom(b"data", 0, 1, &Fields::default().u32(0).bytes(title.as_bytes()).finish());
    let ilst = atom(b"ilst", &atom(&[0xA9, b'n', b'a', b'm'], &data));
    let hdlr = full_atom(
        b"hdlr",
        0,
        0,
        &Fields::default()
            .u32(0)
            .bytes(b"mdir")
            .bytes(b"appl")
            .zeros(8)
            .bytes(b"\0")
            .finish(),
    );
    let meta = full_atom(b"meta", 0, 0, &join(&[hdlr, ilst]));
    atom(b"udta", &meta)
}

pub fn parse(data: &[u8]) -> Result<(Mp4Reader<Cursor<&[u8]>>, AtomTree), ParseError> {
    let mut reader = Mp4Reader::new(Cursor::new(data))?;
    let tree = Mp4Parser::default().parse(&mut reader)?;
    Ok((reader, tree))
}

/// Writes every top level atom of `tree` in order
pub fn write_tree(tree: &AtomTree, reader: &mut Mp4Reader<Cursor<&[u8]>>) -> Vec<u8> {
    let mut writer = mp4_rewrite::Mp4Writer::new(Cursor::new(Vec::new())).unwrap();
    for id in tree.roots() {
        writer.write_atom(tree, *id, reader, None).unwrap();
    }
    writer.into_inner().into_inner()
}
