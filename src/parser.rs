use derive_more::Display;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    atom::{
        container::SampleEntryKind,
        leaf::{FTYP, HDLR},
        util::parser::Stream,
        AtomData, AtomHeader, AtomId, AtomKind, AtomNode, AtomTree, ContentLayout, FourCC,
        FreeAtom, FullHeader, RawData, SampleEntry,
    },
    reader::{ByteSource, Mp4Reader},
    registry::{AtomRegistry, ResolveContext},
    validation::{accepts_child, validate_parent, validate_quantities},
};

/// Decodes the content of a leaf atom (everything after the header and version/flags)
pub trait ParseAtomData: Sized {
    fn parse_atom_data(atom_type: FourCC, version: u8, input: &[u8]) -> Result<Self, ParseError>;
}

#[derive(Debug, Error)]
#[error(
    "{kind}{}{}",
    self.location.map(|(offset, length)|
        format!(" at offset {offset} with length {length}")).unwrap_or_default(),
    self.source.as_ref().map(|source| format!(": {source}")).unwrap_or_default()
)]
pub struct ParseError {
    /// The kind of error that occurred during parsing.
    pub(crate) kind: ParseErrorKind,
    /// location is the (offset, length) of the input data related to the error
    pub(crate) location: Option<(u64, u64)>,
    /// The source error that caused this error.
    #[source]
    pub(crate) source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[display("I/O error")]
    Io,
    #[display("EOF error")]
    Eof,
    #[display("Invalid atom header")]
    InvalidHeader,
    #[display("Invalid atom size")]
    InvalidSize,
    #[display("Unsupported file format")]
    UnsupportedFormat,
    #[display("Invalid atom structure")]
    Structure,
    #[display("Atom parsing failed")]
    AtomParsing,
    #[display("Duplicate child atom")]
    DuplicateChild,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, location: Option<(u64, u64)>) -> Self {
        Self {
            kind,
            location,
            source: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.source = Some(message.into().into());
        self
    }

    pub fn with_location(mut self, location: (u64, u64)) -> Self {
        self.location = Some(location);
        self
    }

    pub(crate) fn from_winnow(
        error: winnow::error::ParseError<Stream<'_>, winnow::error::ContextError>,
    ) -> Self {
        let offset = error.offset();
        Self::new(ParseErrorKind::AtomParsing, None).with_message(format!(
            "{} at content byte {offset}",
            error.inner()
        ))
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn location(&self) -> Option<(u64, u64)> {
        self.location
    }

    /// Whether a container may skip the failing child and carry on with its siblings.
    ///
    /// `Structure` errors are fatal at every depth: a misplaced or missing required atom deep
    /// inside a `trak` fails the whole parse.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            ParseErrorKind::Eof
                | ParseErrorKind::InvalidHeader
                | ParseErrorKind::InvalidSize
                | ParseErrorKind::AtomParsing
                | ParseErrorKind::DuplicateChild
        )
    }
}

/// Reads a whole file into an [`AtomTree`]
#[derive(Debug, Clone, Default)]
pub struct Mp4Parser {
    registry: AtomRegistry,
}

impl Mp4Parser {
    pub fn new(registry: AtomRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AtomRegistry {
        &self.registry
    }

    /// Parses every top-level atom of `reader`.
    ///
    /// The first atom must be `ftyp` with a supported major brand. Failures of top-level atoms
    /// are fatal; failures of nested atoms are recovered by their container.
    pub fn parse<R: ByteSource>(&self, reader: &mut Mp4Reader<R>) -> Result<AtomTree, ParseError> {
        let mut tree = AtomTree::new();
        let end = reader.len();
        reader.seek(0)?;

        while reader.current_offset() < end {
            let offset = reader.current_offset();
            if end - offset < 8 {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidHeader,
                    Some((offset, end - offset)),
                )
                .with_message("trailing bytes after the last atom"));
            }
            let header = self.read_header(reader, end)?;
            let is_first = tree.roots().is_empty();
            if is_first && header.atom_type != FTYP {
                return Err(ParseError::new(
                    ParseErrorKind::UnsupportedFormat,
                    Some((header.offset, header.size)),
                )
                .with_message(format!("expected 'ftyp', found '{}'", header.atom_type)));
            }
            let id = self.parse_atom(&mut tree, reader, None, header)?;
            if is_first {
                check_file_type(&tree, id)?;
            }
            tree.attach(None, id);
        }

        if tree.roots().is_empty() {
            return Err(ParseError::new(ParseErrorKind::UnsupportedFormat, Some((0, 0)))
                .with_message("empty file"));
        }
        Ok(tree)
    }

    /// Reads an atom header at the current offset; `scope_end` bounds the atom and resolves
    /// a declared size of 0
    pub(crate) fn read_header<R: ByteSource>(
        &self,
        reader: &mut Mp4Reader<R>,
        scope_end: u64,
    ) -> Result<AtomHeader, ParseError> {
        let offset = reader.current_offset();
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let size = u64::from(u32::from_be_bytes([header[0], header[1], header[2], header[3]]));
        let atom_type = FourCC([header[4], header[5], header[6], header[7]]);

        let (size, header_size) = match size {
            1 => {
                let mut extended_size = [0u8; 8];
                reader.read_exact(&mut extended_size)?;
                let size = u64::from_be_bytes(extended_size);
                if size < 16 {
                    return Err(ParseError::new(ParseErrorKind::InvalidSize, Some((offset, 16)))
                        .with_message(format!("'{atom_type}' declares extended size {size}")));
                }
                (size, 16)
            }
            0 => (scope_end.saturating_sub(offset), 8),
            size if size < 8 => {
                return Err(ParseError::new(ParseErrorKind::InvalidSize, Some((offset, 8)))
                    .with_message(format!("'{atom_type}' declares size {size}")));
            }
            size => (size, 8),
        };

        if offset.saturating_add(size) > scope_end {
            return Err(ParseError::new(ParseErrorKind::InvalidSize, Some((offset, size)))
                .with_message(format!(
                    "'{atom_type}' of size {size} extends past its container ending at {scope_end}"
                )));
        }

        Ok(AtomHeader {
            atom_type,
            offset,
            size,
            header_size,
        })
    }

    fn parse_atom<R: ByteSource>(
        &self,
        tree: &mut AtomTree,
        reader: &mut Mp4Reader<R>,
        parent: Option<AtomId>,
        header: AtomHeader,
    ) -> Result<AtomId, ParseError> {
        let location = (header.offset, header.size);
        let parent_kind = parent.map(|parent| tree[parent].kind());
        let ctx = ResolveContext {
            parent: parent_kind,
            has_media_header: parent.is_some_and(|parent| {
                tree.children(parent)
                    .iter()
                    .any(|child| tree[*child].kind().is_media_header())
            }),
            handler_type: parent.and_then(|parent| tree.enclosing_handler_type(parent)),
        };
        let kind = self.registry.resolve(header.atom_type, &ctx);
        validate_parent(kind, parent_kind, location)?;

        let content_end = header.end();
        let full = if kind.is_full_atom() && self.has_version_flags(reader, kind, &header)? {
            if header.content_size() < 4 {
                return Err(ParseError::new(ParseErrorKind::InvalidSize, Some(location))
                    .with_message(format!("{kind} is too small for version and flags")));
            }
            let mut version_flags = [0u8; 4];
            reader.read_exact(&mut version_flags)?;
            Some(FullHeader::new(
                version_flags[0],
                [version_flags[1], version_flags[2], version_flags[3]],
            ))
        } else {
            None
        };
        let version = full.map(|full| full.version).unwrap_or_default();

        let id = tree.push(AtomNode::new(header, full, kind, AtomData::Opaque));
        tree.node_mut(id).parent = parent;

        let data = match kind.layout() {
            ContentLayout::Children => {
                self.parse_children(tree, reader, id, content_end)?;
                AtomData::Container
            }
            ContentLayout::EntryList => {
                let mut entry_count = [0u8; 4];
                reader.read_exact(&mut entry_count)?;
                let entry_count = u32::from_be_bytes(entry_count);
                self.parse_children(tree, reader, id, content_end)?;
                let entries = tree.children(id).len();
                if entries != entry_count as usize {
                    debug!(
                        atom_type = %header.atom_type,
                        entry_count,
                        entries,
                        "entry count does not match entries"
                    );
                }
                AtomData::Container
            }
            ContentLayout::SampleEntry => {
                let entry = self.read_sample_entry_prefix(reader, kind, &header)?;
                self.parse_children(tree, reader, id, content_end)?;
                AtomData::SampleEntry(entry)
            }
            ContentLayout::Decoded => {
                let input = reader.read_data(content_end - reader.current_offset())?;
                AtomData::parse_decoded(kind, header.atom_type, version, &input)
                    .map_err(|err| err.with_location(location))?
            }
            ContentLayout::Raw => {
                let input = reader.read_data(content_end - reader.current_offset())?;
                AtomData::RawData(RawData(input))
            }
            ContentLayout::Filler => {
                let data_size = content_end - reader.current_offset();
                reader.seek(content_end)?;
                AtomData::Free(FreeAtom::new(data_size))
            }
            ContentLayout::Opaque => {
                reader.seek(content_end)?;
                AtomData::Opaque
            }
        };
        tree.node_mut(id).data = data;

        if reader.current_offset() != content_end {
            return Err(ParseError::new(ParseErrorKind::InvalidSize, Some(location))
                .with_message(format!(
                    "{kind} ended at offset {} instead of {content_end}",
                    reader.current_offset()
                )));
        }
        if kind.is_container() {
            validate_quantities(tree, id)?;
        }
        Ok(id)
    }

    /// Parses children of `parent` until `end`, replacing any child that fails to parse with an
    /// opaque placeholder over its declared span
    fn parse_children<R: ByteSource>(
        &self,
        tree: &mut AtomTree,
        reader: &mut Mp4Reader<R>,
        parent: AtomId,
        end: u64,
    ) -> Result<(), ParseError> {
        while reader.current_offset() < end {
            let start = reader.current_offset();
            if end - start < 8 {
                let trailer = reader.read_data(end - start)?;
                tree.set_trailer(parent, trailer);
                break;
            }
            let mark = tree.len();
            match self.parse_child(tree, reader, parent, end) {
                Ok(child) => tree.attach(Some(parent), child),
                Err(err) if err.is_recoverable() => {
                    tree.truncate(mark);
                    self.insert_placeholder(tree, reader, parent, start, end, err)?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn parse_child<R: ByteSource>(
        &self,
        tree: &mut AtomTree,
        reader: &mut Mp4Reader<R>,
        parent: AtomId,
        end: u64,
    ) -> Result<AtomId, ParseError> {
        let header = self.read_header(reader, end)?;
        let child = self.parse_atom(tree, reader, Some(parent), header)?;
        let kind = tree[child].kind();
        if !accepts_child(tree, parent, kind) {
            return Err(ParseError::new(
                ParseErrorKind::DuplicateChild,
                Some((header.offset, header.size)),
            )
            .with_message(format!("{} already holds its {kind}", tree[parent].kind())));
        }
        Ok(child)
    }

    fn insert_placeholder<R: ByteSource>(
        &self,
        tree: &mut AtomTree,
        reader: &mut Mp4Reader<R>,
        parent: AtomId,
        start: u64,
        end: u64,
        err: ParseError,
    ) -> Result<(), ParseError> {
        reader.seek(start)?;
        let Ok(header) = self.read_header(reader, end) else {
            return Err(err);
        };
        warn!(
            atom_type = %header.atom_type,
            offset = header.offset,
            size = header.size,
            error = %err,
            "keeping atom that failed to parse as opaque"
        );
        let id = tree.push(AtomNode::new(header, None, AtomKind::Opaque, AtomData::Opaque));
        tree.attach(Some(parent), id);
        reader.seek(header.end())
    }

    /// `meta` is a full atom in ISO files but a plain container in QuickTime files, where its
    /// first child (`hdlr`) directly follows the header
    fn has_version_flags<R: ByteSource>(
        &self,
        reader: &mut Mp4Reader<R>,
        kind: AtomKind,
        header: &AtomHeader,
    ) -> Result<bool, ParseError> {
        if kind != AtomKind::Meta || header.content_size() < 8 {
            return Ok(true);
        }
        let start = reader.current_offset();
        let mut peek = [0u8; 8];
        reader.read_exact(&mut peek)?;
        reader.seek(start)?;
        Ok(&peek[4..8] != HDLR)
    }

    fn read_sample_entry_prefix<R: ByteSource>(
        &self,
        reader: &mut Mp4Reader<R>,
        kind: AtomKind,
        header: &AtomHeader,
    ) -> Result<SampleEntry, ParseError> {
        let location = (header.offset, header.size);
        let Some(entry_kind) = SampleEntryKind::from_atom_kind(kind) else {
            return Err(ParseError::new(ParseErrorKind::AtomParsing, Some(location))
                .with_message(format!("{kind} is not a sample entry")));
        };
        let available = header.end() - reader.current_offset();
        let base_len = entry_kind.base_prefix_len() as u64;
        if available < base_len {
            return Err(ParseError::new(ParseErrorKind::InvalidSize, Some(location))
                .with_message(format!("{kind} needs at least {base_len} bytes")));
        }
        let mut prefix = reader.read_data(base_len)?;
        let extra = (entry_kind.prefix_len(&prefix) as u64).saturating_sub(base_len);
        if extra > 0 {
            if available < base_len + extra {
                return Err(ParseError::new(ParseErrorKind::InvalidSize, Some(location))
                    .with_message(format!("{kind} needs at least {} bytes", base_len + extra)));
            }
            prefix.extend(reader.read_data(extra)?);
        }
        Ok(SampleEntry::new(entry_kind, prefix))
    }
}

fn check_file_type(tree: &AtomTree, id: AtomId) -> Result<(), ParseError> {
    let node = &tree[id];
    match node.data().as_file_type() {
        Some(ftyp) if ftyp.is_supported_brand() => Ok(()),
        Some(ftyp) => Err(ParseError::new(
            ParseErrorKind::UnsupportedFormat,
            Some((node.offset(), node.size())),
        )
        .with_message(format!("unsupported major brand '{}'", ftyp.major_brand))),
        None => Err(ParseError::new(
            ParseErrorKind::UnsupportedFormat,
            Some((node.offset(), node.size())),
        )
        .with_message("file type atom could not be decoded")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::test_utils::{atom, full_atom, Mp4Builder};
    use std::io::Cursor;

    fn parse(data: Vec<u8>) -> Result<AtomTree, ParseError> {
        let mut reader = Mp4Reader::new(Cursor::new(data))?;
        Mp4Parser::default().parse(&mut reader)
    }

    #[test]
    fn test_parse_synthetic_file() {
        let data = Mp4Builder::new().chunk_offsets(vec![100, 5000]).build();
        let tree = parse(data.clone()).unwrap();

        let kinds: Vec<_> = tree.roots().iter().map(|id| tree[*id].kind()).collect();
        assert_eq!(
            kinds,
            vec![AtomKind::FileType, AtomKind::Movie, AtomKind::MediaData]
        );
        let last = *tree.roots().last().unwrap();
        assert_eq!(tree[last].end(), data.len() as u64);

        let stco = tree.chunk_offset_tables()[0];
        let offsets = tree[stco].data().as_chunk_offsets().unwrap();
        assert_eq!(offsets.chunk_offsets.inner(), &[100, 5000]);
        assert!(tree.iter().all(|id| !tree[id].is_modified()));
    }

    #[test]
    fn test_extended_size_header() {
        let mut data = Mp4Builder::new().ftyp_bytes();
        data.extend(1u32.to_be_bytes());
        data.extend(b"free");
        data.extend(20u64.to_be_bytes());
        data.extend([0u8; 4]);
        let tree = parse(data).unwrap();
        let free = tree.roots()[1];
        assert_eq!(tree[free].header_size(), 16);
        assert_eq!(tree[free].size(), 20);
        assert_eq!(tree[free].data().as_free().unwrap().data_size, 4);
    }

    #[test]
    fn test_size_zero_extends_to_end() {
        let mut data = Mp4Builder::new().ftyp_bytes();
        data.extend(0u32.to_be_bytes());
        data.extend(b"mdat");
        data.extend([7u8; 10]);
        let len = data.len() as u64;
        let tree = parse(data).unwrap();
        let mdat = tree.roots()[1];
        assert_eq!(tree[mdat].size(), 18);
        assert_eq!(tree[mdat].end(), len);
    }

    #[test]
    fn test_first_atom_must_be_ftyp() {
        let data = atom(b"free", &[0u8; 4]);
        let err = parse(data).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::UnsupportedFormat);

        let mut ftyp = Vec::new();
        ftyp.extend(b"qt  ");
        ftyp.extend(0u32.to_be_bytes());
        let err = parse(atom(b"ftyp", &ftyp)).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_missing_required_child_is_fatal() {
        let data = Mp4Builder::new().without_tkhd().build();
        let err = parse(data).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::Structure);
    }

    #[test]
    fn test_optional_children_may_be_absent() {
        let tree = parse(Mp4Builder::new().build()).unwrap();
        let trak = tree.tracks()[0];
        assert!(tree.find_child(trak, AtomKind::Edit).is_none());
        assert!(tree.find_child(trak, AtomKind::UserData).is_none());
    }

    #[test]
    fn test_misplaced_atom_is_fatal() {
        let mut data = Mp4Builder::new().ftyp_bytes();
        data.extend(full_atom(b"mvhd", 0, &[0u8; 96]));
        let err = parse(data).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::Structure);
    }

    #[test]
    fn test_misplaced_nested_atom_is_fatal() {
        let udta = atom(b"udta", &full_atom(b"mvhd", 0, &[0u8; 96]));
        let data = Mp4Builder::new().movie_child(udta).build();
        let err = parse(data).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::Structure);
    }

    #[test]
    fn test_corrupt_child_becomes_placeholder() {
        // an ISO meta whose only child declares a size of 3
        let mut corrupt = vec![0u8; 4];
        corrupt.extend([0, 0, 0, 3]);
        corrupt.extend(b"hdlr");
        let mut udta = atom(b"meta", &corrupt);
        let mut meta = vec![0u8; 4];
        meta.extend(full_atom(b"hdlr", 0, &[0u8; 25]));
        udta.extend(atom(b"meta", &meta));
        let data = Mp4Builder::new().movie_child(atom(b"udta", &udta)).build();
        let tree = parse(data).unwrap();

        let moov = tree.moov().unwrap();
        let udta = tree.find_child(moov, AtomKind::UserData).unwrap();
        let children = tree.children(udta);
        assert_eq!(children.len(), 2);
        assert_eq!(tree[children[0]].kind(), AtomKind::Opaque);
        assert_eq!(tree[children[0]].size(), 20);
        assert_eq!(tree[children[1]].kind(), AtomKind::Meta);
        assert!(tree
            .find_child(children[1], AtomKind::HandlerReference)
            .is_some());
    }

    #[test]
    fn test_short_trailer_is_kept() {
        let mut udta = atom(b"\xa9xyz", b"abc");
        udta.extend([0u8; 4]);
        let data = Mp4Builder::new().movie_child(atom(b"udta", &udta)).build();
        let tree = parse(data).unwrap();
        let moov = tree.moov().unwrap();
        let udta = tree.find_child(moov, AtomKind::UserData).unwrap();
        assert_eq!(tree[udta].trailer(), &[0u8; 4]);
    }

    #[test]
    fn test_quicktime_meta_without_version() {
        let hdlr = full_atom(b"hdlr", 0, &[0u8; 25]);
        let qt_meta = atom(b"meta", &hdlr);
        let mut iso_content = vec![0u8; 4];
        iso_content.extend(&hdlr);
        let iso_meta = atom(b"meta", &iso_content);

        let mut udta = qt_meta;
        udta.extend(iso_meta);
        let data = Mp4Builder::new().movie_child(atom(b"udta", &udta)).build();
        let tree = parse(data).unwrap();
        let moov = tree.moov().unwrap();
        let udta = tree.find_child(moov, AtomKind::UserData).unwrap();
        let metas: Vec<_> = tree.children_of_kind(udta, AtomKind::Meta).collect();
        assert_eq!(metas.len(), 2);
        assert!(tree[metas[0]].full_header().is_none());
        assert!(tree[metas[1]].full_header().is_some());
        for meta in metas {
            assert!(tree.find_child(meta, AtomKind::HandlerReference).is_some());
        }
    }
}
