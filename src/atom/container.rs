/*!
 * Atoms with children.
 */

use std::fmt;

use crate::atom::{AtomKind, RawData};

pub const MOOV: &[u8; 4] = b"moov";
pub const MVEX: &[u8; 4] = b"mvex";
pub const TRAK: &[u8; 4] = b"trak";
pub const EDTS: &[u8; 4] = b"edts";
pub const TREF: &[u8; 4] = b"tref";
pub const MDIA: &[u8; 4] = b"mdia";
pub const MINF: &[u8; 4] = b"minf";
pub const DINF: &[u8; 4] = b"dinf";
pub const STBL: &[u8; 4] = b"stbl";
pub const UDTA: &[u8; 4] = b"udta";
pub const META: &[u8; 4] = b"meta";
pub const ILST: &[u8; 4] = b"ilst";
pub const MDAT: &[u8; 4] = b"mdat";

/// Entry lists: a u32 entry count, then one atom per entry
pub const STSD: &[u8; 4] = b"stsd";
pub const DREF: &[u8; 4] = b"dref";

/// 3GPP timed text sample entry
pub const TX3G: &[u8; 4] = b"tx3g";

/// `tx3g` display flags: some or all samples are forced
pub const TX3G_SOME_SAMPLES_FORCED: u32 = 0x4000_0000;
pub const TX3G_ALL_SAMPLES_FORCED: u32 = 0x8000_0000;

/// Offsets into a `tx3g` prefix
const TX3G_DISPLAY_FLAGS: usize = 8;
const TX3G_FONT_SIZE: usize = 33;

/// Fixed-layout part shared by all sample entries: 6 reserved bytes and a data reference index
pub const SAMPLE_ENTRY_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEntryKind {
    Audio,
    Visual,
    Metadata,
    Subtitle,
}

impl SampleEntryKind {
    pub fn from_atom_kind(kind: AtomKind) -> Option<Self> {
        Some(match kind {
            AtomKind::AudioSampleEntry => Self::Audio,
            AtomKind::VisualSampleEntry => Self::Visual,
            AtomKind::MetadataSampleEntry => Self::Metadata,
            AtomKind::SubtitleSampleEntry => Self::Subtitle,
            _ => return None,
        })
    }

    /// Length of the prefix that is always present for this kind of entry
    pub fn base_prefix_len(self) -> usize {
        match self {
            // reserved, data reference index, version, revision, vendor, channels,
            // sample size, compression id, packet size, sample rate
            Self::Audio => 28,
            // reserved, data reference index, pre-defined, dimensions, resolution,
            // frame count, compressor name, depth
            Self::Visual => 78,
            Self::Metadata => SAMPLE_ENTRY_HEADER_LEN,
            // reserved, data reference index, display flags, justification,
            // background color, default text box, default style
            Self::Subtitle => 38,
        }
    }

    /// Full prefix length, given the first [`Self::base_prefix_len`] bytes of the entry.
    ///
    /// QuickTime sound descriptions grow with their version: v1 adds 16 bytes, v2 adds 36.
    pub fn prefix_len(self, base_prefix: &[u8]) -> usize {
        let base = self.base_prefix_len();
        match self {
            Self::Audio => match base_prefix.get(8..10) {
                Some([0, 1]) => base + 16,
                Some([0, 2]) => base + 36,
                _ => base,
            },
            _ => base,
        }
    }
}

/// Sample entry: a codec specific fixed prefix, kept verbatim, followed by child atoms
#[derive(Clone, PartialEq, Eq)]
pub struct SampleEntry {
    pub entry_kind: SampleEntryKind,
    pub prefix: RawData,
}

impl SampleEntry {
    pub fn new(entry_kind: SampleEntryKind, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            entry_kind,
            prefix: RawData(prefix.into()),
        }
    }

    /// Data reference index (1-based index into `dref`)
    pub fn data_reference_index(&self) -> Option<u16> {
        self.prefix
            .0
            .get(6..8)
            .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Display flags of a subtitle entry
    pub fn display_flags(&self) -> Option<u32> {
        if self.entry_kind != SampleEntryKind::Subtitle {
            return None;
        }
        self.prefix
            .0
            .get(TX3G_DISPLAY_FLAGS..TX3G_DISPLAY_FLAGS + 4)
            .map(|bytes| u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Returns false when this is not a subtitle entry
    pub fn set_display_flags(&mut self, flags: u32) -> bool {
        if self.display_flags().is_none() {
            return false;
        }
        self.prefix.0[TX3G_DISPLAY_FLAGS..TX3G_DISPLAY_FLAGS + 4]
            .copy_from_slice(&flags.to_be_bytes());
        true
    }

    /// Font size of the default style record of a subtitle entry
    pub fn font_size(&self) -> Option<u8> {
        if self.entry_kind != SampleEntryKind::Subtitle {
            return None;
        }
        self.prefix.0.get(TX3G_FONT_SIZE).copied()
    }

    /// Returns false when this is not a subtitle entry
    pub fn set_font_size(&mut self, size: u8) -> bool {
        if self.font_size().is_none() {
            return false;
        }
        self.prefix.0[TX3G_FONT_SIZE] = size;
        true
    }
}

/// Display flags with the forced bits set for "all samples forced" or cleared
pub fn forced_display_flags(flags: u32, forced: bool) -> u32 {
    let cleared = flags & !(TX3G_ALL_SAMPLES_FORCED | TX3G_SOME_SAMPLES_FORCED);
    if forced {
        cleared | TX3G_ALL_SAMPLES_FORCED
    } else {
        cleared
    }
}

impl fmt::Debug for SampleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleEntry")
            .field("entry_kind", &self.entry_kind)
            .field("data_reference_index", &self.data_reference_index())
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_prefix_len_by_version() {
        let mut prefix = vec![0u8; 28];
        assert_eq!(SampleEntryKind::Audio.prefix_len(&prefix), 28);
        prefix[9] = 1;
        assert_eq!(SampleEntryKind::Audio.prefix_len(&prefix), 44);
        prefix[9] = 2;
        assert_eq!(SampleEntryKind::Audio.prefix_len(&prefix), 64);
        assert_eq!(SampleEntryKind::Visual.prefix_len(&[0u8; 78]), 78);
    }

    #[test]
    fn test_subtitle_prefix_fields() {
        let mut prefix = vec![0u8; 38];
        prefix[8] = 0x40;
        prefix[11] = 0x20;
        prefix[33] = 18;
        let mut entry = SampleEntry::new(SampleEntryKind::Subtitle, prefix);
        assert_eq!(entry.display_flags(), Some(0x4000_0020));
        assert_eq!(entry.font_size(), Some(18));

        let flags = forced_display_flags(0x4000_0020, true);
        assert_eq!(flags, 0x8000_0020);
        assert_eq!(forced_display_flags(flags, false), 0x20);
        assert!(entry.set_display_flags(flags));
        assert!(entry.set_font_size(40));
        assert_eq!(&entry.prefix.0[8..12], &[0x80, 0, 0, 0x20]);
        assert_eq!(entry.prefix.0[33], 40);

        let mut audio = SampleEntry::new(SampleEntryKind::Audio, vec![0u8; 28]);
        assert_eq!(audio.font_size(), None);
        assert!(!audio.set_font_size(40));
    }

    #[test]
    fn test_data_reference_index() {
        let entry = SampleEntry::new(SampleEntryKind::Metadata, [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(entry.data_reference_index(), Some(1));
    }
}
