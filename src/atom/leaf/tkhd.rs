use bon::Builder;

use super::mvhd::IDENTITY_MATRIX;
use crate::{
    atom::{
        util::{Fixed16x16, Fixed8x8},
        FourCC,
    },
    parser::{ParseAtomData, ParseError},
    writer::{SerializeAtomData, WriteError},
};

pub const TKHD: &[u8; 4] = b"tkhd";

#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct TrackHeaderAtom {
    /// When the track was created (seconds since Jan 1, 1904 UTC)
    #[builder(default = 0)]
    pub creation_time: u64,
    /// When the track was last modified (seconds since Jan 1, 1904 UTC)
    #[builder(default = 0)]
    pub modification_time: u64,
    /// Unique identifier for this track within the movie
    pub track_id: u32,
    #[builder(default)]
    pub reserved1: [u8; 4],
    /// Duration of the track in movie timescale units
    pub duration: u64,
    #[builder(default)]
    pub reserved2: [u8; 8],
    /// Playback layer (lower numbers are closer to viewer)
    #[builder(default = 0)]
    pub layer: i16,
    /// Group of tracks that are alternatives to each other
    #[builder(default = 0)]
    pub alternate_group: i16,
    /// Audio volume level (1.0 = full volume, 0.0 = muted)
    #[builder(default = Fixed8x8::ONE)]
    pub volume: Fixed8x8,
    #[builder(default)]
    pub reserved3: [u8; 2],
    /// 3x3 transformation matrix for video display positioning/rotation
    #[builder(default = IDENTITY_MATRIX)]
    pub matrix: [i32; 9],
    /// Track width in pixels
    #[builder(default)]
    pub width: Fixed16x16,
    /// Track height in pixels
    #[builder(default)]
    pub height: Fixed16x16,
}

impl ParseAtomData for TrackHeaderAtom {
    fn parse_atom_data(_atom_type: FourCC, version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_tkhd_data(version)
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl SerializeAtomData for TrackHeaderAtom {
    fn atom_data_bytes(&self, version: u8) -> Result<Vec<u8>, WriteError> {
        serializer::serialize_tkhd_data(self, version)
    }
}

mod serializer {
    use super::TrackHeaderAtom;
    use crate::{
        atom::util::serializer::{be_u32_or_u64, fixed_point_16x16, fixed_point_8x8, matrix},
        writer::WriteError,
    };

    pub fn serialize_tkhd_data(
        tkhd: &TrackHeaderAtom,
        version: u8,
    ) -> Result<Vec<u8>, WriteError> {
        let versioned = |name: &'static str, value: u64| {
            be_u32_or_u64(version, value).ok_or_else(|| {
                WriteError::invalid_value(format!(
                    "tkhd {name} {value} does not fit version {version}"
                ))
            })
        };

        let mut data = Vec::with_capacity(92);
        data.extend(versioned("creation_time", tkhd.creation_time)?);
        data.extend(versioned("modification_time", tkhd.modification_time)?);
        data.extend(tkhd.track_id.to_be_bytes());
        data.extend(tkhd.reserved1);
        data.extend(versioned("duration", tkhd.duration)?);
        data.extend(tkhd.reserved2);
        data.extend(tkhd.layer.to_be_bytes());
        data.extend(tkhd.alternate_group.to_be_bytes());
        data.extend(fixed_point_8x8(tkhd.volume));
        data.extend(tkhd.reserved3);
        data.extend(matrix(tkhd.matrix));
        data.extend(fixed_point_16x16(tkhd.width));
        data.extend(fixed_point_16x16(tkhd.height));
        Ok(data)
    }
}

mod parser {
    use winnow::{
        binary::{be_i16, be_u32},
        combinator::{seq, trace},
        error::{ContextError, ErrMode, StrContext},
        Parser,
    };

    use super::TrackHeaderAtom;
    use crate::atom::util::parser::{
        be_u32_or_u64, byte_array, fixed_point_16x16, fixed_point_8x8, matrix, Stream,
    };

    pub fn parse_tkhd_data<'i>(
        version: u8,
    ) -> impl Parser<Stream<'i>, TrackHeaderAtom, ErrMode<ContextError>> {
        trace("tkhd", move |input: &mut Stream<'i>| {
            seq!(TrackHeaderAtom {
                creation_time: be_u32_or_u64(version).context(StrContext::Label("creation_time")),
                modification_time: be_u32_or_u64(version)
                    .context(StrContext::Label("modification_time")),
                track_id: be_u32.context(StrContext::Label("track_id")),
                reserved1: byte_array.context(StrContext::Label("reserved")),
                duration: be_u32_or_u64(version).context(StrContext::Label("duration")),
                reserved2: byte_array.context(StrContext::Label("reserved")),
                layer: be_i16.context(StrContext::Label("layer")),
                alternate_group: be_i16.context(StrContext::Label("alternate_group")),
                volume: fixed_point_8x8.context(StrContext::Label("volume")),
                reserved3: byte_array.context(StrContext::Label("reserved")),
                matrix: matrix,
                width: fixed_point_16x16.context(StrContext::Label("width")),
                height: fixed_point_16x16.context(StrContext::Label("height")),
            })
            .parse_next(input)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tkhd_roundtrip() {
        let tkhd = TrackHeaderAtom::builder()
            .track_id(2)
            .duration(48_000)
            .alternate_group(1)
            .width(Fixed16x16::from_f64(1920.0))
            .height(Fixed16x16::from_f64(1080.0))
            .build();
        let bytes = tkhd.atom_data_bytes(0).unwrap();
        assert_eq!(bytes.len(), 80);
        let decoded = TrackHeaderAtom::parse_atom_data(FourCC(*TKHD), 0, &bytes).unwrap();
        assert_eq!(decoded, tkhd);
        assert_eq!(decoded.width.to_f64(), 1920.0);
    }

    #[test]
    fn test_tkhd_truncated() {
        let tkhd = TrackHeaderAtom::builder().track_id(1).duration(1).build();
        let bytes = tkhd.atom_data_bytes(1).unwrap();
        assert!(TrackHeaderAtom::parse_atom_data(FourCC(*TKHD), 1, &bytes[..60]).is_err());
    }
}
