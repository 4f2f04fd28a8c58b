//! Maps atom type codes, together with where they were found, to an [`AtomKind`].

use std::collections::HashMap;

use tracing::trace;

use crate::atom::{leaf::FTAB, AtomKind, FourCC, HandlerType};

/// Structural context an atom is found in, used when its type alone does not decide its kind
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveContext {
    /// Kind of the enclosing atom, `None` at the top level
    pub parent: Option<AtomKind>,
    /// Whether the enclosing atom already holds a media header (meaningful inside `minf`)
    pub has_media_header: bool,
    /// Handler of the enclosing track, taken from its `mdia`/`hdlr`
    pub handler_type: Option<HandlerType>,
}

impl ResolveContext {
    pub fn top_level() -> Self {
        Self::default()
    }

    pub fn within(parent: AtomKind) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }
}

/// Table from type codes to atom kinds.
///
/// [`AtomRegistry::standard`] knows every kind the crate distinguishes; tests and tools may
/// restrict it with [`AtomRegistry::without`] (the type is then kept as an opaque atom) or extend it
/// with [`AtomRegistry::with`].
#[derive(Debug, Clone)]
pub struct AtomRegistry {
    types: HashMap<FourCC, AtomKind>,
}

impl Default for AtomRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl AtomRegistry {
    /// A registry that resolves nothing by type; only context overrides apply
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        use crate::atom::{container::*, leaf::*};
        let entries: &[(&[u8; 4], AtomKind)] = &[
            (FTYP, AtomKind::FileType),
            (MOOV, AtomKind::Movie),
            (MVHD, AtomKind::MovieHeader),
            (IODS, AtomKind::ObjectDescriptor),
            (MVEX, AtomKind::MovieExtends),
            (TRAK, AtomKind::Track),
            (TKHD, AtomKind::TrackHeader),
            (EDTS, AtomKind::Edit),
            (ELST, AtomKind::EditList),
            (TREF, AtomKind::TrackReference),
            (MDIA, AtomKind::Media),
            (MDHD, AtomKind::MediaHeader),
            (HDLR, AtomKind::HandlerReference),
            (MINF, AtomKind::MediaInformation),
            (VMHD, AtomKind::VideoMediaHeader),
            (SMHD, AtomKind::SoundMediaHeader),
            (HMHD, AtomKind::HintMediaHeader),
            (NMHD, AtomKind::NullMediaHeader),
            (DINF, AtomKind::DataInformation),
            (DREF, AtomKind::DataReference),
            (URL, AtomKind::DataEntry),
            (URN, AtomKind::DataEntry),
            (STBL, AtomKind::SampleTable),
            (STSD, AtomKind::SampleDescription),
            (TX3G, AtomKind::SubtitleSampleEntry),
            (STTS, AtomKind::TimeToSample),
            (CTTS, AtomKind::CompositionOffset),
            (STSC, AtomKind::SampleToChunk),
            (STSZ, AtomKind::SampleSize),
            (STZ2, AtomKind::CompactSampleSize),
            (STCO, AtomKind::ChunkOffset),
            (CO64, AtomKind::ChunkLargeOffset),
            (STSS, AtomKind::SyncSample),
            (SGPD, AtomKind::SampleGroupDescription),
            (SBGP, AtomKind::SampleToGroup),
            (UDTA, AtomKind::UserData),
            (META, AtomKind::Meta),
            (ILST, AtomKind::ItemList),
            (ITUNES_GENERIC, AtomKind::ItunesGeneric),
            (MDAT, AtomKind::MediaData),
            (FREE, AtomKind::FreeSpace),
            (SKIP, AtomKind::FreeSpace),
            (WIDE, AtomKind::FreeSpace),
        ];
        Self {
            types: entries
                .iter()
                .map(|(atom_type, kind)| (FourCC(**atom_type), *kind))
                .collect(),
        }
    }

    pub fn with(mut self, atom_type: impl Into<FourCC>, kind: AtomKind) -> Self {
        self.types.insert(atom_type.into(), kind);
        self
    }

    pub fn without(mut self, atom_type: impl Into<FourCC>) -> Self {
        self.types.remove(&atom_type.into());
        self
    }

    /// Exact table lookup, ignoring context
    pub fn lookup(&self, atom_type: FourCC) -> Option<AtomKind> {
        self.types.get(&atom_type).copied()
    }

    /// Resolves the kind of an atom of `atom_type` found in `ctx`.
    ///
    /// An exact table match wins. Otherwise the enclosing atom decides: children of `ilst` are
    /// iTunes values, children of `tref` list track ids, `ftab` inside a `tx3g` entry is its font
    /// table, an unknown atom in a `minf` that has no media header yet is taken as its media
    /// header, and entries of `stsd` follow the track's handler. Anything else is opaque.
    pub fn resolve(&self, atom_type: FourCC, ctx: &ResolveContext) -> AtomKind {
        if let Some(kind) = self.lookup(atom_type) {
            return kind;
        }
        let kind = match ctx.parent {
            Some(AtomKind::ItemList) => AtomKind::ItunesValue,
            Some(AtomKind::TrackReference) => AtomKind::TrackReferenceType,
            Some(AtomKind::SubtitleSampleEntry) if atom_type == FourCC(*FTAB) => {
                AtomKind::FontTable
            }
            Some(AtomKind::MediaInformation) if !ctx.has_media_header => {
                AtomKind::UnknownMediaHeader
            }
            Some(AtomKind::SampleDescription) => match ctx.handler_type {
                Some(HandlerType::Audio) => AtomKind::AudioSampleEntry,
                Some(HandlerType::Video) => AtomKind::VisualSampleEntry,
                Some(HandlerType::Meta) => AtomKind::MetadataSampleEntry,
                _ => AtomKind::Opaque,
            },
            _ => AtomKind::Opaque,
        };
        trace!(atom_type = %atom_type, ?kind, "resolved from context");
        kind
    }
}
