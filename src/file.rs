//! Path level access: open a file, inspect and edit its tree, then optimize or save it.
//!
//! New output is always written to a temp file next to its destination and only moved into
//! place once it parses back cleanly; on any error the temp file is dropped and the original is
//! left untouched.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::{
    atom::{
        container::{ILST, META, UDTA},
        leaf::{HDLR, TITLE},
        AtomData, AtomId, AtomKind, AtomTree, DataItem, FileTypeAtom, FourCC, HandlerName,
        HandlerReferenceAtom, HandlerType, ItunesValueAtom, LanguageCode,
    },
    optimize::{OptimizeOptions, OptimizeReport, Optimizer},
    parser::{Mp4Parser, ParseError},
    reader::Mp4Reader,
    registry::AtomRegistry,
    save::{SaveReport, Saver},
    tracks::{self, TrackSettingsMap},
    writer::{WriteError, WriteErrorKind},
};

#[derive(Debug, Error)]
pub enum Mp4Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} already exists", .0.display())]
    TargetExists(PathBuf),
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Mp4Error + '_ {
    move |source| Mp4Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Summary of one `trak`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub track_id: Option<u32>,
    pub handler_type: Option<HandlerType>,
    pub timescale: Option<u32>,
    pub duration: Option<Duration>,
    pub language: Option<LanguageCode>,
    pub chunk_count: usize,
    /// Whether chunk offsets are stored in a `co64` table
    pub large_offsets: bool,
}

/// What [`Mp4File::save`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new file of this many bytes was written
    Written(u64),
    /// The source file was patched
    InPlace(SaveReport),
}

#[derive(Debug)]
pub struct Mp4File {
    path: PathBuf,
    registry: AtomRegistry,
    tree: AtomTree,
}

impl Mp4File {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Mp4Error> {
        Self::open_with_registry(path, AtomRegistry::standard())
    }

    pub fn open_with_registry(
        path: impl AsRef<Path>,
        registry: AtomRegistry,
    ) -> Result<Self, Mp4Error> {
        let path = path.as_ref().to_path_buf();
        let tree = parse_path(&path, &registry)?;
        Ok(Self {
            path,
            registry,
            tree,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tree(&self) -> &AtomTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut AtomTree {
        &mut self.tree
    }

    pub fn is_modified(&self) -> bool {
        self.tree.is_modified()
    }

    pub fn tracks(&self) -> Vec<TrackSummary> {
        self.tree
            .tracks()
            .into_iter()
            .map(|trak| self.track_summary(trak))
            .collect()
    }

    fn track_summary(&self, trak: AtomId) -> TrackSummary {
        let tree = &self.tree;
        let tkhd = tree
            .find_child(trak, AtomKind::TrackHeader)
            .and_then(|id| tree[id].data().as_track_header());
        let mdhd = tree
            .find_path(trak, &[AtomKind::Media, AtomKind::MediaHeader])
            .and_then(|id| tree[id].data().as_media_header());
        let handler_type = tree
            .find_child(trak, AtomKind::Media)
            .and_then(|mdia| tree.media_handler_type(mdia));
        let table = tree
            .find_path(
                trak,
                &[
                    AtomKind::Media,
                    AtomKind::MediaInformation,
                    AtomKind::SampleTable,
                ],
            )
            .and_then(|stbl| {
                tree.children(stbl).iter().copied().find(|id| {
                    matches!(
                        tree[*id].kind(),
                        AtomKind::ChunkOffset | AtomKind::ChunkLargeOffset
                    )
                })
            });

        TrackSummary {
            track_id: tkhd.map(|tkhd| tkhd.track_id),
            handler_type,
            timescale: mdhd.map(|mdhd| mdhd.timescale),
            duration: mdhd.map(|mdhd| mdhd.duration()),
            language: mdhd.map(|mdhd| mdhd.language),
            chunk_count: table
                .and_then(|id| tree[id].data().as_chunk_offsets())
                .map_or(0, |atom| atom.chunk_count()),
            large_offsets: table.is_some_and(|id| tree[id].kind() == AtomKind::ChunkLargeOffset),
        }
    }

    fn item_list(&self) -> Option<AtomId> {
        let moov = self.tree.moov()?;
        self.tree
            .find_path(moov, &[AtomKind::UserData, AtomKind::Meta, AtomKind::ItemList])
    }

    /// The iTunes title (`©nam`), when present
    pub fn title(&self) -> Option<&str> {
        let ilst = self.item_list()?;
        self.tree
            .children(ilst)
            .iter()
            .find(|id| self.tree[**id].atom_type() == TITLE)
            .and_then(|id| self.tree[*id].data().as_itunes_value())
            .and_then(|value| value.items.first())
            .and_then(DataItem::as_text)
    }

    /// Sets the iTunes title, creating `udta`, `meta` and `ilst` as needed
    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), Mp4Error> {
        let items = vec![DataItem::text(title)];
        let ilst = self.ensure_item_list()?;
        let existing = self
            .tree
            .children(ilst)
            .iter()
            .copied()
            .find(|id| self.tree[*id].atom_type() == TITLE);
        match existing {
            Some(id) if self.tree[id].data().as_itunes_value().is_some() => {
                if let Some(value) = self.tree.data_mut(id)?.as_itunes_value_mut() {
                    value.items = items;
                }
            }
            Some(id) => {
                self.tree
                    .replace(id, AtomKind::ItunesValue, ItunesValueAtom::new(items))?;
            }
            None => {
                self.tree.append_child(
                    ilst,
                    FourCC(*TITLE),
                    AtomKind::ItunesValue,
                    ItunesValueAtom::new(items),
                )?;
            }
        }
        Ok(())
    }

    fn ensure_item_list(&mut self) -> Result<AtomId, Mp4Error> {
        let tree = &mut self.tree;
        let moov = tree.moov().ok_or_else(|| {
            WriteError::new(WriteErrorKind::Structure).with_message("no moov atom")
        })?;
        let udta = match tree.find_child(moov, AtomKind::UserData) {
            Some(udta) => udta,
            None => tree.append_child(moov, FourCC(*UDTA), AtomKind::UserData, AtomData::Container)?,
        };
        let meta = match tree.find_child(udta, AtomKind::Meta) {
            Some(meta) => meta,
            None => {
                let meta =
                    tree.append_child(udta, FourCC(*META), AtomKind::Meta, AtomData::Container)?;
                let hdlr = HandlerReferenceAtom::builder()
                    .handler_type(HandlerType::Mdir)
                    .component_manufacturer(*b"appl")
                    .name(HandlerName::CString(String::new()))
                    .build();
                tree.append_child(meta, FourCC(*HDLR), AtomKind::HandlerReference, hdlr)?;
                meta
            }
        };
        match tree.find_child(meta, AtomKind::ItemList) {
            Some(ilst) => Ok(ilst),
            None => Ok(tree.append_child(meta, FourCC(*ILST), AtomKind::ItemList, AtomData::Container)?),
        }
    }

    /// Rebrands an ffmpeg style `isom`/512 (or `mp42`/512) header as `M4V `, which some Apple
    /// players need to pick up E-AC-3 audio. Returns whether the header was changed.
    pub fn rebrand_isom_as_m4v(&mut self) -> Result<bool, Mp4Error> {
        let Some(ftyp) = self.tree.file_type() else {
            return Ok(false);
        };
        let rebrand = self.tree[ftyp].data().as_file_type().is_some_and(|ftyp| {
            [b"isom", b"mp42", b"m4v "]
                .iter()
                .any(|brand| ftyp.major_brand == *brand)
                && ftyp.minor_version == 512
        });
        if !rebrand {
            return Ok(false);
        }
        let rebranded = FileTypeAtom::builder()
            .major_brand(*b"M4V ")
            .minor_version(0)
            .compatible_brands(vec![
                FourCC(*b"M4V "),
                FourCC(*b"M4A "),
                FourCC(*b"mp42"),
                FourCC(*b"isom"),
            ])
            .build();
        *self.tree.data_mut(ftyp)? = rebranded.into();
        Ok(true)
    }

    /// Sets alternate groups, languages, forced flags and `folw`/`forc` subtitle references;
    /// see [`tracks::fix_alternate_groups`]
    pub fn fix_alternate_groups_and_tracks(
        &mut self,
        audio: &TrackSettingsMap,
        subtitles: &TrackSettingsMap,
    ) -> Result<(), Mp4Error> {
        Ok(tracks::fix_alternate_groups(&mut self.tree, audio, subtitles)?)
    }

    /// Resets the font size and fonts of subtitle tracks; returns the number of sample entries
    /// changed
    pub fn reset_subtitle_format(&mut self) -> Result<usize, Mp4Error> {
        Ok(tracks::reset_subtitle_format(&mut self.tree)?)
    }

    /// Writes the faststart form of the file to `target`, or over the file itself when `target`
    /// is `None`. Afterwards this handle refers to the optimized file.
    pub fn optimize(
        &mut self,
        target: Option<&Path>,
        options: OptimizeOptions,
    ) -> Result<OptimizeReport, Mp4Error> {
        let destination = self.destination(target)?;
        let mut temp = temp_file_for(&destination)?;
        let report = {
            let mut reader = open_reader(&self.path)?;
            Optimizer::new(options).optimize(self.tree.clone(), &mut reader, temp.as_file_mut())?
        };
        self.finish(temp, destination, target.is_some())?;
        debug!(path = %self.path.display(), total_size = report.total_size, "optimized");
        Ok(report)
    }

    /// Writes every atom, in its current order, to `target`; with `None` the file is patched in
    /// place instead.
    ///
    /// A layout that cannot be patched in place (a top level atom other than `moov` changed
    /// size, as after [`Mp4File::rebrand_isom_as_m4v`], or an oversized open ended last atom) is
    /// rewritten through a temp file that replaces the source.
    pub fn save(&mut self, target: Option<&Path>) -> Result<SaveOutcome, Mp4Error> {
        if target.is_none() {
            let saved = {
                let mut reader = open_reader(&self.path)?;
                let sink = OpenOptions::new()
                    .write(true)
                    .open(&self.path)
                    .map_err(io_error(&self.path))?;
                Saver::new().save_in_place(&self.tree, &mut reader, sink)
            };
            match saved {
                Ok(report) => {
                    self.tree = parse_path(&self.path, &self.registry)?;
                    return Ok(SaveOutcome::InPlace(report));
                }
                Err(err) if err.kind() == WriteErrorKind::UnsupportedFormat => {
                    debug!(
                        path = %self.path.display(),
                        %err,
                        "rewriting instead of patching in place"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        let destination = self.destination(target)?;
        let mut temp = temp_file_for(&destination)?;
        let written = {
            let mut reader = open_reader(&self.path)?;
            Saver::new().write_fresh(self.tree.clone(), &mut reader, temp.as_file_mut())?
        };
        self.finish(temp, destination, target.is_some())?;
        Ok(SaveOutcome::Written(written))
    }

    fn destination(&self, target: Option<&Path>) -> Result<PathBuf, Mp4Error> {
        match target {
            Some(target) if target.exists() => Err(Mp4Error::TargetExists(target.to_path_buf())),
            Some(target) => Ok(target.to_path_buf()),
            None => Ok(self.path.clone()),
        }
    }

    /// Re-parses the finished temp file, then moves it to `destination`
    fn finish(
        &mut self,
        temp: NamedTempFile,
        destination: PathBuf,
        no_clobber: bool,
    ) -> Result<(), Mp4Error> {
        let tree = {
            let file = temp.reopen().map_err(io_error(temp.path()))?;
            let mut reader = Mp4Reader::new(file)?;
            Mp4Parser::new(self.registry.clone()).parse(&mut reader)?
        };
        if no_clobber {
            temp.persist_noclobber(&destination)?;
        } else {
            temp.persist(&destination)?;
        }
        self.path = destination;
        self.tree = tree;
        Ok(())
    }
}

fn open_reader(path: &Path) -> Result<Mp4Reader<File>, Mp4Error> {
    let file = File::open(path).map_err(io_error(path))?;
    Ok(Mp4Reader::new(file)?)
}

fn parse_path(path: &Path, registry: &AtomRegistry) -> Result<AtomTree, Mp4Error> {
    let mut reader = open_reader(path)?;
    Ok(Mp4Parser::new(registry.clone()).parse(&mut reader)?)
}

fn temp_file_for(destination: &Path) -> Result<NamedTempFile, Mp4Error> {
    let dir = destination
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(dir).map_err(io_error(dir))
}
