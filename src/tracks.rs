//! Track level fixups for players that pick audio and subtitle tracks by alternate group,
//! language and `tref` links.

use std::collections::BTreeMap;

use bon::Builder;
use tracing::debug;

use crate::{
    atom::{
        container::{forced_display_flags, TREF},
        leaf::tref::{REFERENCE_FOLLOW_SUBTITLE, REFERENCE_FORCED_SUBTITLE},
        AtomData, AtomId, AtomKind, AtomTree, FourCC, HandlerType, LanguageCode, TrackIdsAtom,
    },
    writer::WriteError,
};

/// Font size set on subtitle entries by [`reset_subtitle_format`]
pub const DEFAULT_SUBTITLE_FONT_SIZE: u8 = 40;
/// Font name set on subtitle font tables by [`reset_subtitle_format`]
pub const DEFAULT_SUBTITLE_FONT: &str = "Sans-Serif";

/// Alternate group given to each kind of track
const VIDEO_GROUP: i16 = 0;
const AUDIO_GROUP: i16 = 1;
const SUBTITLE_GROUP: i16 = 2;
const OTHER_GROUP: i16 = 3;

/// What to set on one audio or subtitle track
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
pub struct TrackSettings {
    pub language: Option<LanguageCode>,
    /// Subtitle tracks only: every sample of the track is forced
    #[builder(default)]
    pub forced: bool,
}

/// Settings keyed by track index (position among the `trak` atoms of `moov`)
pub type TrackSettingsMap = BTreeMap<usize, TrackSettings>;

/// Puts every track into the alternate group of its media type and links tracks to the
/// subtitles they go with.
///
/// Video goes to group 0, audio to 1, subtitles to 2 and anything else to 3. Each audio track
/// in `audio` gets a `folw` reference to a subtitle track of its language, preferring a forced
/// one; each non-forced subtitle track gets a `forc` reference to the forced track of its
/// language. Languages and the forced display flags of `tx3g` entries are applied as given.
pub fn fix_alternate_groups(
    tree: &mut AtomTree,
    audio: &TrackSettingsMap,
    subtitles: &TrackSettingsMap,
) -> Result<(), WriteError> {
    let tracks = tree.tracks();
    let track_ids: Vec<Option<u32>> = tracks
        .iter()
        .map(|trak| {
            tree.find_child(*trak, AtomKind::TrackHeader)
                .and_then(|tkhd| tree[tkhd].data().as_track_header())
                .map(|tkhd| tkhd.track_id)
        })
        .collect();
    let track_id = |index: usize| track_ids.get(index).copied().flatten();

    let mut follow = BTreeMap::new();
    for (audio_index, audio_track) in audio {
        for (subtitle_index, subtitle) in subtitles {
            if audio_track.language == subtitle.language
                && (!follow.contains_key(audio_index) || subtitle.forced)
            {
                if let Some(id) = track_id(*subtitle_index) {
                    follow.insert(*audio_index, id);
                }
            }
        }
    }

    let mut forced_by = BTreeMap::new();
    for (forced_index, forced) in subtitles.iter().filter(|(_, track)| track.forced) {
        for (index, subtitle) in subtitles {
            if index != forced_index && !subtitle.forced && subtitle.language == forced.language {
                if let Some(id) = track_id(*forced_index) {
                    forced_by.insert(*index, id);
                }
            }
        }
    }

    for (index, trak) in tracks.iter().copied().enumerate() {
        let handler_type = tree
            .find_child(trak, AtomKind::Media)
            .and_then(|mdia| tree.media_handler_type(mdia));
        let group = match handler_type {
            Some(HandlerType::Video) => VIDEO_GROUP,
            Some(HandlerType::Audio) => {
                if let Some(settings) = audio.get(&index) {
                    set_language(tree, trak, settings.language)?;
                }
                if let Some(id) = follow.get(&index) {
                    set_reference(tree, trak, FourCC(*REFERENCE_FOLLOW_SUBTITLE), *id)?;
                }
                AUDIO_GROUP
            }
            Some(HandlerType::Subtitle) => {
                if let Some(settings) = subtitles.get(&index) {
                    set_language(tree, trak, settings.language)?;
                    set_forced(tree, trak, settings.forced)?;
                }
                if let Some(id) = forced_by.get(&index) {
                    set_reference(tree, trak, FourCC(*REFERENCE_FORCED_SUBTITLE), *id)?;
                }
                SUBTITLE_GROUP
            }
            _ => OTHER_GROUP,
        };
        set_alternate_group(tree, trak, group)?;
    }
    debug!(
        tracks = tracks.len(),
        follow = follow.len(),
        forced = forced_by.len(),
        "fixed alternate groups"
    );
    Ok(())
}

/// Resets the style of every subtitle track's `tx3g` entries: the default font size becomes
/// [`DEFAULT_SUBTITLE_FONT_SIZE`] and every font in the font table becomes
/// [`DEFAULT_SUBTITLE_FONT`]. Returns the number of entries changed.
pub fn reset_subtitle_format(tree: &mut AtomTree) -> Result<usize, WriteError> {
    let mut changed = 0;
    for entry in subtitle_entries(tree) {
        let mut entry_changed = false;
        let font_size = tree[entry]
            .data()
            .as_sample_entry()
            .and_then(|entry| entry.font_size());
        if font_size.is_some_and(|size| size != DEFAULT_SUBTITLE_FONT_SIZE) {
            if let AtomData::SampleEntry(sample_entry) = tree.data_mut(entry)? {
                sample_entry.set_font_size(DEFAULT_SUBTITLE_FONT_SIZE);
            }
            entry_changed = true;
        }

        let font_tables: Vec<AtomId> = tree.children_of_kind(entry, AtomKind::FontTable).collect();
        for table in font_tables {
            let needs_reset = tree[table].data().as_font_table().is_some_and(|fonts| {
                fonts.iter().any(|font| font.name != DEFAULT_SUBTITLE_FONT)
            });
            if !needs_reset {
                continue;
            }
            if let Some(fonts) = tree.data_mut(table)?.as_font_table_mut() {
                for font in fonts.iter_mut() {
                    font.name = DEFAULT_SUBTITLE_FONT.to_string();
                }
            }
            entry_changed = true;
        }
        changed += usize::from(entry_changed);
    }
    debug!(changed, "reset subtitle format");
    Ok(changed)
}

fn subtitle_entries(tree: &AtomTree) -> Vec<AtomId> {
    tree.tracks()
        .into_iter()
        .filter_map(|trak| tree.find_child(trak, AtomKind::Media))
        .filter(|mdia| tree.media_handler_type(*mdia) == Some(HandlerType::Subtitle))
        .filter_map(|mdia| {
            tree.find_path(
                mdia,
                &[
                    AtomKind::MediaInformation,
                    AtomKind::SampleTable,
                    AtomKind::SampleDescription,
                ],
            )
        })
        .flat_map(|stsd| {
            tree.children_of_kind(stsd, AtomKind::SubtitleSampleEntry)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn set_alternate_group(tree: &mut AtomTree, trak: AtomId, group: i16) -> Result<(), WriteError> {
    let Some(tkhd) = tree.find_child(trak, AtomKind::TrackHeader) else {
        return Ok(());
    };
    let current = tree[tkhd].data().as_track_header().map(|tkhd| tkhd.alternate_group);
    if current.is_none() || current == Some(group) {
        return Ok(());
    }
    if let AtomData::TrackHeader(tkhd) = tree.data_mut(tkhd)? {
        tkhd.alternate_group = group;
    }
    Ok(())
}

fn set_language(
    tree: &mut AtomTree,
    trak: AtomId,
    language: Option<LanguageCode>,
) -> Result<(), WriteError> {
    let Some(language) = language else {
        return Ok(());
    };
    let Some(mdhd) = tree.find_path(trak, &[AtomKind::Media, AtomKind::MediaHeader]) else {
        return Ok(());
    };
    let current = tree[mdhd].data().as_media_header().map(|mdhd| mdhd.language);
    if current.is_none() || current == Some(language) {
        return Ok(());
    }
    if let AtomData::MediaHeader(mdhd) = tree.data_mut(mdhd)? {
        mdhd.language = language;
    }
    Ok(())
}

/// Sets the forced flags of the first `tx3g` entry of a subtitle track
fn set_forced(tree: &mut AtomTree, trak: AtomId, forced: bool) -> Result<(), WriteError> {
    let Some(stsd) = tree.find_path(
        trak,
        &[
            AtomKind::Media,
            AtomKind::MediaInformation,
            AtomKind::SampleTable,
            AtomKind::SampleDescription,
        ],
    ) else {
        return Ok(());
    };
    let Some(entry) = tree
        .children_of_kind(stsd, AtomKind::SubtitleSampleEntry)
        .next()
    else {
        return Ok(());
    };
    let Some(flags) = tree[entry]
        .data()
        .as_sample_entry()
        .and_then(|entry| entry.display_flags())
    else {
        return Ok(());
    };
    let updated = forced_display_flags(flags, forced);
    if updated != flags {
        if let AtomData::SampleEntry(sample_entry) = tree.data_mut(entry)? {
            sample_entry.set_display_flags(updated);
        }
    }
    Ok(())
}

/// Points the `reference_type` child of the track's `tref` at `track_id`, creating the `tref`
/// and the reference as needed
fn set_reference(
    tree: &mut AtomTree,
    trak: AtomId,
    reference_type: FourCC,
    track_id: u32,
) -> Result<(), WriteError> {
    let tref = match tree.find_child(trak, AtomKind::TrackReference) {
        Some(tref) => tref,
        None => tree.append_child(
            trak,
            FourCC(*TREF),
            AtomKind::TrackReference,
            AtomData::Container,
        )?,
    };
    let existing = tree
        .children(tref)
        .iter()
        .copied()
        .find(|id| tree[*id].atom_type() == reference_type);
    match existing {
        Some(reference) => {
            let current = tree[reference].data().as_track_ids().map(|ids| ids.0.clone());
            if current.as_deref() == Some(&[track_id][..]) {
                return Ok(());
            }
            if let Some(ids) = tree.data_mut(reference)?.as_track_ids_mut() {
                ids.0 = vec![track_id];
            }
        }
        None => {
            tree.append_child(
                tref,
                reference_type,
                AtomKind::TrackReferenceType,
                TrackIdsAtom(vec![track_id]),
            )?;
        }
    }
    Ok(())
}
