use bon::Builder;

use crate::{
    atom::{
        util::{Fixed16x16, Fixed8x8},
        FourCC,
    },
    parser::{ParseAtomData, ParseError},
    writer::{SerializeAtomData, WriteError},
};

pub const MVHD: &[u8; 4] = b"mvhd";

pub(crate) const IDENTITY_MATRIX: [i32; 9] = [0x00010000, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000];

/// Movie Header Atom - timescale and duration of the whole presentation
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct MovieHeaderAtom {
    /// When the movie was created (seconds since Jan 1, 1904 UTC)
    #[builder(default = 0)]
    pub creation_time: u64,
    /// When the movie was last modified (seconds since Jan 1, 1904 UTC)
    #[builder(default = 0)]
    pub modification_time: u64,
    /// Number of time units per second (e.g., 90000 for 90kHz)
    pub timescale: u32,
    /// Duration of the movie in timescale units
    pub duration: u64,
    /// Playback rate (1.0 = normal speed, 2.0 = double speed)
    #[builder(default = Fixed16x16::ONE)]
    pub rate: Fixed16x16,
    /// Audio volume level (1.0 = full volume, 0.0 = muted)
    #[builder(default = Fixed8x8::ONE)]
    pub volume: Fixed8x8,
    #[builder(default)]
    pub reserved: [u8; 10],
    /// 3x3 transformation matrix for video display positioning/rotation
    #[builder(default = IDENTITY_MATRIX)]
    pub matrix: [i32; 9],
    /// Time when preview starts (in timescale units)
    #[builder(default = 0)]
    pub preview_time: u32,
    /// Duration of the preview (in timescale units)
    #[builder(default = 0)]
    pub preview_duration: u32,
    /// Time of poster frame to display when movie is not playing
    #[builder(default = 0)]
    pub poster_time: u32,
    /// Start time of current selection (in timescale units)
    #[builder(default = 0)]
    pub selection_time: u32,
    /// Duration of current selection (in timescale units)
    #[builder(default = 0)]
    pub selection_duration: u32,
    /// Current playback time position (in timescale units)
    #[builder(default = 0)]
    pub current_time: u32,
    /// ID to use for the next track added to this movie
    pub next_track_id: u32,
}

impl ParseAtomData for MovieHeaderAtom {
    fn parse_atom_data(_atom_type: FourCC, version: u8, input: &[u8]) -> Result<Self, ParseError> {
        use crate::atom::util::parser::stream;
        use winnow::Parser;
        parser::parse_mvhd_data(version)
            .parse(stream(input))
            .map_err(ParseError::from_winnow)
    }
}

impl SerializeAtomData for MovieHeaderAtom {
    fn atom_data_bytes(&self, version: u8) -> Result<Vec<u8>, WriteError> {
        serializer::serialize_mvhd_data(self, version)
    }
}

mod serializer {
    use super::MovieHeaderAtom;
    use crate::{
        atom::util::serializer::{be_u32_or_u64, fixed_point_16x16, fixed_point_8x8, matrix},
        writer::WriteError,
    };

    pub fn serialize_mvhd_data(mvhd: &MovieHeaderAtom, version: u8) -> Result<Vec<u8>, WriteError> {
        let versioned = |name: &'static str, value: u64| {
            be_u32_or_u64(version, value).ok_or_else(|| {
                WriteError::invalid_value(format!(
                    "mvhd {name} {value} does not fit version {version}"
                ))
            })
        };

        let mut data = Vec::with_capacity(108);
        data.extend(versioned("creation_time", mvhd.creation_time)?);
        data.extend(versioned("modification_time", mvhd.modification_time)?);
        data.extend(mvhd.timescale.to_be_bytes());
        data.extend(versioned("duration", mvhd.duration)?);
        data.extend(fixed_point_16x16(mvhd.rate));
        data.extend(fixed_point_8x8(mvhd.volume));
        data.extend(mvhd.reserved);
        data.extend(matrix(mvhd.matrix));
        data.extend(mvhd.preview_time.to_be_bytes());
        data.extend(mvhd.preview_duration.to_be_bytes());
        data.extend(mvhd.poster_time.to_be_bytes());
        data.extend(mvhd.selection_time.to_be_bytes());
        data.extend(mvhd.selection_duration.to_be_bytes());
        data.extend(mvhd.current_time.to_be_bytes());
        data.extend(mvhd.next_track_id.to_be_bytes());
        Ok(data)
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::{seq, trace},
        error::{ContextError, ErrMode, StrContext},
        Parser,
    };

    use super::MovieHeaderAtom;
    use crate::atom::util::parser::{
        be_u32_or_u64, byte_array, fixed_point_16x16, fixed_point_8x8, matrix, Stream,
    };

    pub fn parse_mvhd_data<'i>(
        version: u8,
    ) -> impl Parser<Stream<'i>, MovieHeaderAtom, ErrMode<ContextError>> {
        trace("mvhd", move |input: &mut Stream<'i>| {
            seq!(MovieHeaderAtom {
                creation_time: be_u32_or_u64(version).context(StrContext::Label("creation_time")),
                modification_time: be_u32_or_u64(version)
                    .context(StrContext::Label("modification_time")),
                timescale: be_u32.context(StrContext::Label("timescale")),
                duration: be_u32_or_u64(version).context(StrContext::Label("duration")),
                rate: fixed_point_16x16.context(StrContext::Label("rate")),
                volume: fixed_point_8x8.context(StrContext::Label("volume")),
                reserved: byte_array.context(StrContext::Label("reserved")),
                matrix: matrix,
                preview_time: be_u32.context(StrContext::Label("preview_time")),
                preview_duration: be_u32.context(StrContext::Label("preview_duration")),
                poster_time: be_u32.context(StrContext::Label("poster_time")),
                selection_time: be_u32.context(StrContext::Label("selection_time")),
                selection_duration: be_u32.context(StrContext::Label("selection_duration")),
                current_time: be_u32.context(StrContext::Label("current_time")),
                next_track_id: be_u32.context(StrContext::Label("next_track_id")),
            })
            .parse_next(input)
        })
    }
}
