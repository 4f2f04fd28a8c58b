use derive_more::Display;
use std::{
    fs::File,
    io::{self, Cursor, Seek, SeekFrom, Write},
};
use thiserror::Error;

use crate::{
    atom::{AtomData, AtomId, AtomKind, AtomTree, ContentLayout, FourCC},
    reader::{ByteSource, Mp4Reader},
};

/// Default chunk size of streamed range copies
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
#[error("{kind}{}", self.source.as_ref().map(|e| format!(" ({e})")).unwrap_or_default())]
pub struct WriteError {
    /// The kind of error that occurred during writing.
    kind: WriteErrorKind,
    /// The source error that caused this error.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum WriteErrorKind {
    #[display("I/O error")]
    Io,
    #[display("Atom is immutable")]
    Immutable,
    #[display("Invalid value")]
    InvalidValue,
    #[display("Value exceeds its field width")]
    Size,
    #[display("Chunk offset outside of media data")]
    OffsetMapping,
    #[display("Invalid atom structure")]
    Structure,
    #[display("Unsupported file layout")]
    UnsupportedFormat,
}

impl WriteError {
    pub fn new(kind: WriteErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.source = Some(message.into().into());
        self
    }

    pub fn io(err: io::Error) -> Self {
        Self {
            kind: WriteErrorKind::Io,
            source: Some(Box::new(err)),
        }
    }

    pub fn immutable(kind: AtomKind) -> Self {
        Self::new(WriteErrorKind::Immutable).with_message(format!("{kind} cannot be modified"))
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(WriteErrorKind::InvalidValue).with_message(message)
    }

    pub fn size(message: impl Into<String>) -> Self {
        Self::new(WriteErrorKind::Size).with_message(message)
    }

    pub fn kind(&self) -> WriteErrorKind {
        self.kind
    }
}

impl From<io::Error> for WriteError {
    fn from(err: io::Error) -> Self {
        WriteError::io(err)
    }
}

/// Encodes the content of a leaf atom (everything after the header and version/flags)
pub trait SerializeAtomData {
    fn atom_data_bytes(&self, version: u8) -> Result<Vec<u8>, WriteError>;
}

/// A writable, seekable byte sink that can also be cut short
pub trait ByteSink: Write + Seek {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl ByteSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl ByteSink for Cursor<Vec<u8>> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl ByteSink for Cursor<&mut Vec<u8>> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        (**self).truncate(len)
    }
}

pub struct Mp4Writer<W> {
    writer: W,
    offset: u64,
    buffer_size: usize,
}

impl<W: ByteSink> Mp4Writer<W> {
    /// Wraps `writer`, continuing from its current position
    pub fn new(mut writer: W) -> Result<Self, WriteError> {
        let offset = writer.stream_position()?;
        Ok(Self {
            writer,
            offset,
            buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        })
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn current_offset(&self) -> u64 {
        self.offset
    }

    pub fn flush(&mut self) -> Result<(), WriteError> {
        self.writer.flush().map_err(WriteError::io)
    }

    pub fn seek(&mut self, offset: u64) -> Result<(), WriteError> {
        self.offset = self.writer.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Cuts the sink at `len`; the write position is left unchanged
    pub fn truncate(&mut self, len: u64) -> Result<(), WriteError> {
        self.writer.truncate(len).map_err(WriteError::io)
    }

    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), WriteError> {
        self.writer.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(())
    }

    /// Writes `len` zero bytes, at most one buffer at a time
    pub fn write_zeros(&mut self, len: u64) -> Result<(), WriteError> {
        let chunk_size = usize::try_from(len)
            .unwrap_or(usize::MAX)
            .min(self.buffer_size);
        let zeros = vec![0u8; chunk_size];
        let mut written = 0u64;
        while written < len {
            let chunk = (len - written).min(chunk_size as u64) as usize;
            self.write_raw(&zeros[..chunk])?;
            written += chunk as u64;
        }
        Ok(())
    }

    /// Writes an atom header for `data_size` bytes of content, switching to the 16 byte form
    /// when the size does not fit 32 bits
    pub fn write_atom_header(&mut self, atom_type: FourCC, data_size: u64) -> Result<(), WriteError> {
        let header_bytes = serialize_atom_header(atom_type, data_size);
        self.write_raw(&header_bytes)
    }

    /// Streams `len` bytes starting at `offset` of `source` into the sink, one bounded chunk at
    /// a time
    pub fn copy_range<R: ByteSource>(
        &mut self,
        source: &mut Mp4Reader<R>,
        offset: u64,
        len: u64,
    ) -> Result<(), WriteError> {
        let chunk_size = usize::try_from(len)
            .unwrap_or(usize::MAX)
            .min(self.buffer_size);
        let mut buffer = vec![0u8; chunk_size];
        let mut copied = 0u64;
        while copied < len {
            let chunk = (len - copied).min(chunk_size as u64) as usize;
            source
                .read_at(offset + copied, &mut buffer[..chunk])
                .map_err(WriteError::io)?;
            self.write_raw(&buffer[..chunk])?;
            copied += chunk as u64;
        }
        Ok(())
    }

    /// Writes the atom `id` of `tree`.
    ///
    /// An unmodified atom is copied byte for byte from `source`. A modified atom is re-encoded:
    /// a size placeholder, its type (or `alternate_type`), version and flags, its content, and
    /// finally the measured size patched over the placeholder.
    pub fn write_atom<R: ByteSource>(
        &mut self,
        tree: &AtomTree,
        id: AtomId,
        source: &mut Mp4Reader<R>,
        alternate_type: Option<FourCC>,
    ) -> Result<(), WriteError> {
        let node = &tree[id];
        if !node.is_modified() {
            return self.copy_range(source, node.offset(), node.size());
        }

        let start = self.offset;
        let atom_type = alternate_type.unwrap_or(node.atom_type());
        self.write_raw(&[0u8; 4])?;
        self.write_raw(&atom_type.into_bytes())?;
        if let Some(full) = node.full_header() {
            self.write_raw(&[full.version])?;
            self.write_raw(&full.flags)?;
        }

        match node.kind().layout() {
            ContentLayout::Children => self.write_children(tree, id, source)?,
            ContentLayout::EntryList => {
                let entry_count = u32::try_from(node.children().len()).map_err(|_| {
                    WriteError::size(format!("{} entries in {}", node.children().len(), node.kind()))
                })?;
                self.write_raw(&entry_count.to_be_bytes())?;
                self.write_children(tree, id, source)?;
            }
            ContentLayout::SampleEntry => {
                let AtomData::SampleEntry(entry) = node.data() else {
                    return Err(WriteError::new(WriteErrorKind::Structure)
                        .with_message(format!("{} has no sample entry prefix", node.kind())));
                };
                self.write_raw(&entry.prefix.0)?;
                self.write_children(tree, id, source)?;
            }
            ContentLayout::Decoded | ContentLayout::Raw | ContentLayout::Filler => {
                let content = node.data().leaf_bytes(node.kind(), node.version())?;
                self.write_raw(&content)?;
            }
            ContentLayout::Opaque => {
                let header = node.header();
                self.copy_range(source, header.content_offset(), header.content_size())?;
            }
        }
        self.write_raw(node.trailer())?;

        let end = self.offset;
        let size = u32::try_from(end - start).map_err(|_| {
            WriteError::size(format!(
                "{} of {} bytes does not fit a 32-bit size",
                node.kind(),
                end - start
            ))
        })?;
        self.seek(start)?;
        self.write_raw(&size.to_be_bytes())?;
        self.seek(end)
    }

    fn write_children<R: ByteSource>(
        &mut self,
        tree: &AtomTree,
        id: AtomId,
        source: &mut Mp4Reader<R>,
    ) -> Result<(), WriteError> {
        for child in tree.children(id) {
            self.write_atom(tree, *child, source, None)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

pub(crate) fn serialize_atom_header(atom_type: FourCC, data_size: u64) -> Vec<u8> {
    let mut result = Vec::with_capacity(16);

    if 8u64 + data_size > u64::from(u32::MAX) {
        // size=1 followed by the 64-bit size after the type
        result.extend(1u32.to_be_bytes());
        result.extend(atom_type.into_bytes());
        result.extend((16u64 + data_size).to_be_bytes());
    } else {
        result.extend(((8u64 + data_size) as u32).to_be_bytes());
        result.extend(atom_type.into_bytes());
    }

    result
}
