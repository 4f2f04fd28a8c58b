pub mod container;
mod iter;
pub mod leaf;
#[cfg(test)]
pub(crate) mod test_utils;
mod tree;
pub mod util;

use std::fmt;

pub use self::{
    container::{SampleEntry, SampleEntryKind},
    iter::Descendants,
    leaf::{
        ChunkOffsetAtom, ChunkOffsets, DataItem, FileTypeAtom, FontRecord, FontTableAtom,
        FreeAtom, HandlerName, HandlerReferenceAtom, HandlerType, ItunesGenericAtom, ItunesValueAtom, LanguageCode,
        MediaHeaderAtom, MovieHeaderAtom, TrackHeaderAtom, TrackIdsAtom,
    },
    tree::{AtomHeader, AtomId, AtomNode, AtomTree, FullHeader},
    util::FourCC,
};

use crate::{
    parser::{ParseAtomData, ParseError},
    validation::{ChildBinding, Placement, PropertyQuantity},
    writer::{SerializeAtomData, WriteError},
};

/// Atom payload kept as raw bytes, re-encoded verbatim
#[derive(Clone, PartialEq, Eq)]
pub struct RawData(pub Vec<u8>);

impl fmt::Debug for RawData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[u8; {}]", self.0.len())
    }
}

/// How an atom's content (after header and optional version/flags) is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLayout {
    /// Only child atoms
    Children,
    /// A u32 entry count followed by one child atom per entry
    EntryList,
    /// A fixed sample entry prefix followed by child atoms
    SampleEntry,
    /// Fields decoded by a field codec
    Decoded,
    /// Bytes kept verbatim
    Raw,
    /// Filler whose bytes are never read
    Filler,
    /// Never read nor decoded, only ever copied
    Opaque,
}

/// The closed set of atom variants this crate distinguishes.
///
/// Each kind carries its capabilities: placement, child bindings, mutability, whether a
/// version/flags prefix follows the header, and its content layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomKind {
    FileType,
    Movie,
    MovieHeader,
    ObjectDescriptor,
    MovieExtends,
    Track,
    TrackHeader,
    Edit,
    EditList,
    TrackReference,
    TrackReferenceType,
    Media,
    MediaHeader,
    HandlerReference,
    MediaInformation,
    VideoMediaHeader,
    SoundMediaHeader,
    HintMediaHeader,
    NullMediaHeader,
    UnknownMediaHeader,
    DataInformation,
    DataReference,
    DataEntry,
    SampleTable,
    SampleDescription,
    AudioSampleEntry,
    VisualSampleEntry,
    MetadataSampleEntry,
    SubtitleSampleEntry,
    FontTable,
    TimeToSample,
    CompositionOffset,
    SampleToChunk,
    SampleSize,
    CompactSampleSize,
    ChunkOffset,
    ChunkLargeOffset,
    SyncSample,
    SampleGroupDescription,
    SampleToGroup,
    UserData,
    Meta,
    ItemList,
    ItunesValue,
    ItunesGeneric,
    MediaData,
    FreeSpace,
    Opaque,
}

const MEDIA_HEADER_KINDS: &[AtomKind] = &[
    AtomKind::VideoMediaHeader,
    AtomKind::SoundMediaHeader,
    AtomKind::HintMediaHeader,
    AtomKind::NullMediaHeader,
    AtomKind::UnknownMediaHeader,
];

const SAMPLE_ENTRY_KINDS: &[AtomKind] = &[
    AtomKind::AudioSampleEntry,
    AtomKind::VisualSampleEntry,
    AtomKind::MetadataSampleEntry,
    AtomKind::SubtitleSampleEntry,
];

const MOVIE_BINDINGS: &[ChildBinding] = &[
    ChildBinding::new("movie header", &[AtomKind::MovieHeader], PropertyQuantity::One),
    ChildBinding::new(
        "object descriptor",
        &[AtomKind::ObjectDescriptor],
        PropertyQuantity::ZeroOrOne,
    ),
    ChildBinding::new("tracks", &[AtomKind::Track], PropertyQuantity::OneOrMore),
    ChildBinding::new("user data", &[AtomKind::UserData], PropertyQuantity::ZeroOrOne),
    ChildBinding::new(
        "movie extends",
        &[AtomKind::MovieExtends],
        PropertyQuantity::ZeroOrOne,
    ),
];

const TRACK_BINDINGS: &[ChildBinding] = &[
    ChildBinding::new("track header", &[AtomKind::TrackHeader], PropertyQuantity::One),
    ChildBinding::new("edit", &[AtomKind::Edit], PropertyQuantity::ZeroOrOne),
    ChildBinding::new("media", &[AtomKind::Media], PropertyQuantity::One),
    ChildBinding::new(
        "track reference",
        &[AtomKind::TrackReference],
        PropertyQuantity::ZeroOrOne,
    ),
    ChildBinding::new("user data", &[AtomKind::UserData], PropertyQuantity::ZeroOrOne),
];

const EDIT_BINDINGS: &[ChildBinding] = &[ChildBinding::new(
    "edit list",
    &[AtomKind::EditList],
    PropertyQuantity::ZeroOrOne,
)];

const TRACK_REFERENCE_BINDINGS: &[ChildBinding] = &[ChildBinding::new(
    "references",
    &[AtomKind::TrackReferenceType],
    PropertyQuantity::ZeroOrMore,
)];

const MEDIA_BINDINGS: &[ChildBinding] = &[
    ChildBinding::new("media header", &[AtomKind::MediaHeader], PropertyQuantity::One),
    ChildBinding::new(
        "handler reference",
        &[AtomKind::HandlerReference],
        PropertyQuantity::One,
    ),
    ChildBinding::new(
        "media information",
        &[AtomKind::MediaInformation],
        PropertyQuantity::One,
    ),
];

const MEDIA_INFORMATION_BINDINGS: &[ChildBinding] = &[
    ChildBinding::new(
        "media information header",
        MEDIA_HEADER_KINDS,
        PropertyQuantity::One,
    ),
    ChildBinding::new(
        "data information",
        &[AtomKind::DataInformation],
        PropertyQuantity::One,
    ),
    ChildBinding::new("sample table", &[AtomKind::SampleTable], PropertyQuantity::One),
];

const DATA_INFORMATION_BINDINGS: &[ChildBinding] = &[ChildBinding::new(
    "data reference",
    &[AtomKind::DataReference],
    PropertyQuantity::One,
)];

const SAMPLE_TABLE_BINDINGS: &[ChildBinding] = &[
    ChildBinding::new(
        "sample description",
        &[AtomKind::SampleDescription],
        PropertyQuantity::One,
    ),
    ChildBinding::new(
        "time to sample",
        &[AtomKind::TimeToSample],
        PropertyQuantity::One,
    ),
    ChildBinding::new(
        "sample to chunk",
        &[AtomKind::SampleToChunk],
        PropertyQuantity::One,
    ),
    ChildBinding::new(
        "sample size",
        &[AtomKind::SampleSize, AtomKind::CompactSampleSize],
        PropertyQuantity::One,
    ),
    ChildBinding::new(
        "chunk offset",
        &[AtomKind::ChunkOffset, AtomKind::ChunkLargeOffset],
        PropertyQuantity::One,
    ),
    ChildBinding::new(
        "composition offset",
        &[AtomKind::CompositionOffset],
        PropertyQuantity::ZeroOrOne,
    ),
    ChildBinding::new("sync sample", &[AtomKind::SyncSample], PropertyQuantity::ZeroOrOne),
    ChildBinding::new(
        "sample group description",
        &[AtomKind::SampleGroupDescription],
        PropertyQuantity::ZeroOrMore,
    ),
    ChildBinding::new(
        "sample to group",
        &[AtomKind::SampleToGroup],
        PropertyQuantity::ZeroOrMore,
    ),
];

const USER_DATA_BINDINGS: &[ChildBinding] = &[ChildBinding::new(
    "meta",
    &[AtomKind::Meta],
    PropertyQuantity::ZeroOrMore,
)];

const META_BINDINGS: &[ChildBinding] = &[
    ChildBinding::new(
        "handler reference",
        &[AtomKind::HandlerReference],
        PropertyQuantity::One,
    ),
    ChildBinding::new("item list", &[AtomKind::ItemList], PropertyQuantity::ZeroOrOne),
];

impl AtomKind {
    /// Type code written for atoms of this kind, when the kind has a single one
    pub fn canonical_type(self) -> Option<FourCC> {
        use container::*;
        use leaf::*;
        let atom_type = match self {
            Self::FileType => FTYP,
            Self::Movie => MOOV,
            Self::MovieHeader => MVHD,
            Self::ObjectDescriptor => IODS,
            Self::MovieExtends => MVEX,
            Self::Track => TRAK,
            Self::TrackHeader => TKHD,
            Self::Edit => EDTS,
            Self::EditList => ELST,
            Self::TrackReference => TREF,
            Self::Media => MDIA,
            Self::MediaHeader => MDHD,
            Self::HandlerReference => HDLR,
            Self::MediaInformation => MINF,
            Self::VideoMediaHeader => VMHD,
            Self::SoundMediaHeader => SMHD,
            Self::HintMediaHeader => HMHD,
            Self::NullMediaHeader => NMHD,
            Self::DataInformation => DINF,
            Self::DataReference => DREF,
            Self::SampleTable => STBL,
            Self::SampleDescription => STSD,
            Self::SubtitleSampleEntry => TX3G,
            Self::FontTable => FTAB,
            Self::TimeToSample => STTS,
            Self::CompositionOffset => CTTS,
            Self::SampleToChunk => STSC,
            Self::SampleSize => STSZ,
            Self::CompactSampleSize => STZ2,
            Self::ChunkOffset => STCO,
            Self::ChunkLargeOffset => CO64,
            Self::SyncSample => STSS,
            Self::SampleGroupDescription => SGPD,
            Self::SampleToGroup => SBGP,
            Self::UserData => UDTA,
            Self::Meta => META,
            Self::ItemList => ILST,
            Self::ItunesGeneric => ITUNES_GENERIC,
            Self::MediaData => MDAT,
            Self::FreeSpace => FREE,
            Self::TrackReferenceType
            | Self::UnknownMediaHeader
            | Self::DataEntry
            | Self::AudioSampleEntry
            | Self::VisualSampleEntry
            | Self::MetadataSampleEntry
            | Self::ItunesValue
            | Self::Opaque => return None,
        };
        Some(FourCC(*atom_type))
    }

    pub fn placement(self) -> Placement {
        use AtomKind::*;
        match self {
            FileType | Movie | MediaData => Placement::ROOT,
            FreeSpace | Opaque | Meta => Placement::ANYWHERE,
            MovieHeader | ObjectDescriptor | MovieExtends | Track => Placement::within(&[Movie]),
            TrackHeader | Edit | TrackReference | Media => Placement::within(&[Track]),
            UserData => Placement::within(&[Movie, Track]),
            EditList => Placement::within(&[Edit]),
            TrackReferenceType => Placement::within(&[TrackReference]),
            MediaHeader | MediaInformation => Placement::within(&[Media]),
            HandlerReference => Placement::within(&[Media, Meta, MediaInformation]),
            VideoMediaHeader | SoundMediaHeader | HintMediaHeader | NullMediaHeader
            | UnknownMediaHeader | SampleTable => Placement::within(&[MediaInformation]),
            DataInformation => Placement::within(&[MediaInformation, Meta]),
            DataReference => Placement::within(&[DataInformation]),
            DataEntry => Placement::within(&[DataReference]),
            SampleDescription | TimeToSample | CompositionOffset | SampleToChunk | SampleSize
            | CompactSampleSize | ChunkOffset | ChunkLargeOffset | SyncSample
            | SampleGroupDescription | SampleToGroup => Placement::within(&[SampleTable]),
            AudioSampleEntry | VisualSampleEntry | MetadataSampleEntry | SubtitleSampleEntry => {
                Placement::within(&[SampleDescription])
            }
            FontTable => Placement::within(&[SubtitleSampleEntry]),
            ItemList => Placement::within(&[Meta]),
            ItunesValue | ItunesGeneric => Placement::within(&[ItemList]),
        }
    }

    /// Named child slots of this container kind
    pub fn bindings(self) -> &'static [ChildBinding] {
        match self {
            Self::Movie => MOVIE_BINDINGS,
            Self::Track => TRACK_BINDINGS,
            Self::Edit => EDIT_BINDINGS,
            Self::TrackReference => TRACK_REFERENCE_BINDINGS,
            Self::Media => MEDIA_BINDINGS,
            Self::MediaInformation => MEDIA_INFORMATION_BINDINGS,
            Self::DataInformation => DATA_INFORMATION_BINDINGS,
            Self::SampleTable => SAMPLE_TABLE_BINDINGS,
            Self::UserData => USER_DATA_BINDINGS,
            Self::Meta => META_BINDINGS,
            _ => &[],
        }
    }

    /// Whether atoms of this kind may be marked modified
    pub fn is_mutable(self) -> bool {
        !matches!(self, Self::MediaData | Self::Opaque)
    }

    /// Whether a 1 byte version and 3 bytes of flags follow the header.
    ///
    /// `meta` is checked per atom since QuickTime writes it without version/flags.
    pub fn is_full_atom(self) -> bool {
        use AtomKind::*;
        matches!(
            self,
            MovieHeader
                | ObjectDescriptor
                | TrackHeader
                | EditList
                | MediaHeader
                | HandlerReference
                | VideoMediaHeader
                | SoundMediaHeader
                | HintMediaHeader
                | NullMediaHeader
                | DataReference
                | DataEntry
                | SampleDescription
                | TimeToSample
                | CompositionOffset
                | SampleToChunk
                | SampleSize
                | CompactSampleSize
                | ChunkOffset
                | ChunkLargeOffset
                | SyncSample
                | SampleGroupDescription
                | SampleToGroup
                | Meta
        )
    }

    pub fn layout(self) -> ContentLayout {
        use AtomKind::*;
        match self {
            Movie | MovieExtends | Track | Edit | TrackReference | Media | MediaInformation
            | DataInformation | SampleTable | UserData | Meta | ItemList => ContentLayout::Children,
            SampleDescription | DataReference => ContentLayout::EntryList,
            AudioSampleEntry | VisualSampleEntry | MetadataSampleEntry | SubtitleSampleEntry => {
                ContentLayout::SampleEntry
            }
            FileType | MovieHeader | TrackHeader | MediaHeader | HandlerReference | ChunkOffset
            | ChunkLargeOffset | TrackReferenceType | FontTable | ItunesValue | ItunesGeneric => {
                ContentLayout::Decoded
            }
            ObjectDescriptor | EditList | VideoMediaHeader | SoundMediaHeader | HintMediaHeader
            | NullMediaHeader | UnknownMediaHeader | DataEntry | TimeToSample
            | CompositionOffset | SampleToChunk | SampleSize | CompactSampleSize | SyncSample
            | SampleGroupDescription | SampleToGroup => ContentLayout::Raw,
            FreeSpace => ContentLayout::Filler,
            MediaData | Opaque => ContentLayout::Opaque,
        }
    }

    pub fn is_container(self) -> bool {
        matches!(
            self.layout(),
            ContentLayout::Children | ContentLayout::EntryList | ContentLayout::SampleEntry
        )
    }

    pub fn is_media_header(self) -> bool {
        MEDIA_HEADER_KINDS.contains(&self)
    }

    pub fn is_sample_entry(self) -> bool {
        SAMPLE_ENTRY_KINDS.contains(&self)
    }

    pub fn name(self) -> &'static str {
        use AtomKind::*;
        match self {
            FileType => "file type",
            Movie => "movie",
            MovieHeader => "movie header",
            ObjectDescriptor => "object descriptor",
            MovieExtends => "movie extends",
            Track => "track",
            TrackHeader => "track header",
            Edit => "edit",
            EditList => "edit list",
            TrackReference => "track reference",
            TrackReferenceType => "track reference type",
            Media => "media",
            MediaHeader => "media header",
            HandlerReference => "handler reference",
            MediaInformation => "media information",
            VideoMediaHeader => "video media header",
            SoundMediaHeader => "sound media header",
            HintMediaHeader => "hint media header",
            NullMediaHeader => "null media header",
            UnknownMediaHeader => "unknown media header",
            DataInformation => "data information",
            DataReference => "data reference",
            DataEntry => "data entry",
            SampleTable => "sample table",
            SampleDescription => "sample description",
            AudioSampleEntry => "audio sample entry",
            VisualSampleEntry => "visual sample entry",
            MetadataSampleEntry => "metadata sample entry",
            SubtitleSampleEntry => "subtitle sample entry",
            FontTable => "font table",
            TimeToSample => "time to sample",
            CompositionOffset => "composition offset",
            SampleToChunk => "sample to chunk",
            SampleSize => "sample size",
            CompactSampleSize => "compact sample size",
            ChunkOffset => "chunk offset",
            ChunkLargeOffset => "chunk large offset",
            SyncSample => "sync sample",
            SampleGroupDescription => "sample group description",
            SampleToGroup => "sample to group",
            UserData => "user data",
            Meta => "meta",
            ItemList => "item list",
            ItunesValue => "iTunes value",
            ItunesGeneric => "iTunes generic",
            MediaData => "media data",
            FreeSpace => "free space",
            Opaque => "opaque",
        }
    }
}

impl fmt::Display for AtomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_type() {
            Some(atom_type) => write!(f, "'{atom_type}' ({})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Decoded content of an atom
#[derive(Debug, Clone)]
pub enum AtomData {
    /// Content is child atoms only (or an entry count followed by child atoms)
    Container,
    SampleEntry(SampleEntry),
    FileType(FileTypeAtom),
    MovieHeader(MovieHeaderAtom),
    TrackHeader(TrackHeaderAtom),
    MediaHeader(MediaHeaderAtom),
    HandlerReference(HandlerReferenceAtom),
    ChunkOffset(ChunkOffsetAtom),
    TrackIds(TrackIdsAtom),
    FontTable(FontTableAtom),
    ItunesValue(ItunesValueAtom),
    ItunesGeneric(ItunesGenericAtom),
    Free(FreeAtom),
    RawData(RawData),
    /// Content was never read; the atom can only be copied
    Opaque,
}

impl AtomData {
    /// Decodes the content of a [`ContentLayout::Decoded`] atom
    pub(crate) fn parse_decoded(
        kind: AtomKind,
        atom_type: FourCC,
        version: u8,
        input: &[u8],
    ) -> Result<Self, ParseError> {
        Ok(match kind {
            AtomKind::FileType => FileTypeAtom::parse_atom_data(atom_type, version, input)?.into(),
            AtomKind::MovieHeader => {
                MovieHeaderAtom::parse_atom_data(atom_type, version, input)?.into()
            }
            AtomKind::TrackHeader => {
                TrackHeaderAtom::parse_atom_data(atom_type, version, input)?.into()
            }
            AtomKind::MediaHeader => {
                MediaHeaderAtom::parse_atom_data(atom_type, version, input)?.into()
            }
            AtomKind::HandlerReference => {
                HandlerReferenceAtom::parse_atom_data(atom_type, version, input)?.into()
            }
            AtomKind::ChunkOffset | AtomKind::ChunkLargeOffset => {
                ChunkOffsetAtom::parse_table(input, kind == AtomKind::ChunkLargeOffset)?.into()
            }
            AtomKind::TrackReferenceType => {
                TrackIdsAtom::parse_atom_data(atom_type, version, input)?.into()
            }
            AtomKind::FontTable => FontTableAtom::parse_atom_data(atom_type, version, input)?.into(),
            AtomKind::ItunesValue => {
                ItunesValueAtom::parse_atom_data(atom_type, version, input)?.into()
            }
            AtomKind::ItunesGeneric => {
                ItunesGenericAtom::parse_atom_data(atom_type, version, input)?.into()
            }
            _ => AtomData::RawData(RawData(input.to_vec())),
        })
    }

    /// Serializes leaf content; containers write their children through the writer instead
    pub(crate) fn leaf_bytes(&self, kind: AtomKind, version: u8) -> Result<Vec<u8>, WriteError> {
        match self {
            AtomData::FileType(atom) => atom.atom_data_bytes(version),
            AtomData::MovieHeader(atom) => atom.atom_data_bytes(version),
            AtomData::TrackHeader(atom) => atom.atom_data_bytes(version),
            AtomData::MediaHeader(atom) => atom.atom_data_bytes(version),
            AtomData::HandlerReference(atom) => atom.atom_data_bytes(version),
            AtomData::ChunkOffset(atom) => atom.table_bytes(kind == AtomKind::ChunkLargeOffset),
            AtomData::TrackIds(atom) => atom.atom_data_bytes(version),
            AtomData::FontTable(atom) => atom.atom_data_bytes(version),
            AtomData::ItunesValue(atom) => atom.atom_data_bytes(version),
            AtomData::ItunesGeneric(atom) => atom.atom_data_bytes(version),
            AtomData::Free(atom) => atom.atom_data_bytes(version),
            AtomData::RawData(raw) => Ok(raw.0.clone()),
            AtomData::Container | AtomData::SampleEntry(_) | AtomData::Opaque => Ok(Vec::new()),
        }
    }

    pub fn as_sample_entry(&self) -> Option<&SampleEntry> {
        match self {
            AtomData::SampleEntry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_file_type(&self) -> Option<&FileTypeAtom> {
        match self {
            AtomData::FileType(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_movie_header(&self) -> Option<&MovieHeaderAtom> {
        match self {
            AtomData::MovieHeader(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_track_header(&self) -> Option<&TrackHeaderAtom> {
        match self {
            AtomData::TrackHeader(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_media_header(&self) -> Option<&MediaHeaderAtom> {
        match self {
            AtomData::MediaHeader(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_handler_reference(&self) -> Option<&HandlerReferenceAtom> {
        match self {
            AtomData::HandlerReference(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_chunk_offsets(&self) -> Option<&ChunkOffsetAtom> {
        match self {
            AtomData::ChunkOffset(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_chunk_offsets_mut(&mut self) -> Option<&mut ChunkOffsetAtom> {
        match self {
            AtomData::ChunkOffset(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_track_ids(&self) -> Option<&TrackIdsAtom> {
        match self {
            AtomData::TrackIds(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_track_ids_mut(&mut self) -> Option<&mut TrackIdsAtom> {
        match self {
            AtomData::TrackIds(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_font_table(&self) -> Option<&FontTableAtom> {
        match self {
            AtomData::FontTable(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_font_table_mut(&mut self) -> Option<&mut FontTableAtom> {
        match self {
            AtomData::FontTable(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_itunes_value(&self) -> Option<&ItunesValueAtom> {
        match self {
            AtomData::ItunesValue(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_itunes_value_mut(&mut self) -> Option<&mut ItunesValueAtom> {
        match self {
            AtomData::ItunesValue(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_free(&self) -> Option<&FreeAtom> {
        match self {
            AtomData::Free(atom) => Some(atom),
            _ => None,
        }
    }
}

impl From<SampleEntry> for AtomData {
    fn from(entry: SampleEntry) -> Self {
        AtomData::SampleEntry(entry)
    }
}

impl From<FileTypeAtom> for AtomData {
    fn from(atom: FileTypeAtom) -> Self {
        AtomData::FileType(atom)
    }
}

impl From<MovieHeaderAtom> for AtomData {
    fn from(atom: MovieHeaderAtom) -> Self {
        AtomData::MovieHeader(atom)
    }
}

impl From<TrackHeaderAtom> for AtomData {
    fn from(atom: TrackHeaderAtom) -> Self {
        AtomData::TrackHeader(atom)
    }
}

impl From<MediaHeaderAtom> for AtomData {
    fn from(atom: MediaHeaderAtom) -> Self {
        AtomData::MediaHeader(atom)
    }
}

impl From<HandlerReferenceAtom> for AtomData {
    fn from(atom: HandlerReferenceAtom) -> Self {
        AtomData::HandlerReference(atom)
    }
}

impl From<ChunkOffsetAtom> for AtomData {
    fn from(atom: ChunkOffsetAtom) -> Self {
        AtomData::ChunkOffset(atom)
    }
}

impl From<TrackIdsAtom> for AtomData {
    fn from(atom: TrackIdsAtom) -> Self {
        AtomData::TrackIds(atom)
    }
}

impl From<FontTableAtom> for AtomData {
    fn from(atom: FontTableAtom) -> Self {
        AtomData::FontTable(atom)
    }
}

impl From<ItunesValueAtom> for AtomData {
    fn from(atom: ItunesValueAtom) -> Self {
        AtomData::ItunesValue(atom)
    }
}

impl From<ItunesGenericAtom> for AtomData {
    fn from(atom: ItunesGenericAtom) -> Self {
        AtomData::ItunesGeneric(atom)
    }
}

impl From<FreeAtom> for AtomData {
    fn from(atom: FreeAtom) -> Self {
        AtomData::Free(atom)
    }
}

impl From<RawData> for AtomData {
    fn from(data: RawData) -> Self {
        AtomData::RawData(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_binding_kind_may_nest_in_its_container() {
        use AtomKind::*;
        let containers = [
            Movie,
            Track,
            Edit,
            TrackReference,
            Media,
            MediaInformation,
            DataInformation,
            SampleTable,
            UserData,
            Meta,
        ];
        for container in containers {
            for binding in container.bindings() {
                for kind in binding.kinds {
                    assert!(
                        kind.placement().allows(Some(container)),
                        "{kind} is bound in {container} but not allowed there"
                    );
                }
            }
        }
    }

    #[test]
    fn test_immutable_kinds() {
        assert!(!AtomKind::MediaData.is_mutable());
        assert!(!AtomKind::Opaque.is_mutable());
        assert!(AtomKind::Movie.is_mutable());
        assert!(AtomKind::FreeSpace.is_mutable());
    }

    #[test]
    fn test_display() {
        assert_eq!(AtomKind::ChunkOffset.to_string(), "'stco' (chunk offset)");
        assert_eq!(AtomKind::ItunesValue.to_string(), "iTunes value");
    }
}
