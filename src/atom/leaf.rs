/*!
 * Atoms without children.
 */

pub mod free;
pub mod ftab;
pub mod ftyp;
pub mod hdlr;
pub mod ilst;
pub mod mdhd;
pub mod mvhd;
pub mod raw;
pub mod stco_co64;
pub mod tkhd;
pub mod tref;

pub use self::{
    free::{FreeAtom, FREE, SKIP, WIDE},
    ftab::{FontRecord, FontTableAtom, FTAB},
    ftyp::{FileTypeAtom, FTYP, SUPPORTED_BRANDS},
    hdlr::{HandlerName, HandlerReferenceAtom, HandlerType, HDLR},
    ilst::{DataItem, ItunesGenericAtom, ItunesValueAtom, ITUNES_GENERIC, TITLE},
    mdhd::{LanguageCode, MediaHeaderAtom, MDHD},
    mvhd::{MovieHeaderAtom, MVHD},
    raw::*,
    stco_co64::{ChunkOffsetAtom, ChunkOffsets, CO64, STCO},
    tkhd::{TrackHeaderAtom, TKHD},
    tref::TrackIdsAtom,
};
