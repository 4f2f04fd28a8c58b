//! Writing a modified tree back out, either to a new file or by patching the source file in
//! place.

use std::io::Cursor;

use derive_more::Display;
use tracing::debug;

use crate::{
    atom::{leaf::FREE, AtomId, AtomKind, AtomTree, FourCC},
    reader::{ByteSource, Mp4Reader},
    writer::{ByteSink, Mp4Writer, WriteError, WriteErrorKind, DEFAULT_COPY_BUFFER_SIZE},
};

/// How an in-place save lays out the new `moov`
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SaveScenario {
    /// `moov` is unmodified; nothing is written
    #[display("unchanged")]
    Unchanged,
    /// The new `moov` is written over the old one (same size, or growing at the end of file)
    #[display("overwrite")]
    Overwrite,
    /// `moov` is the last atom and shrank; the file is cut after it
    #[display("overwrite and truncate")]
    OverwriteTruncate,
    /// The padding atom after `moov` absorbs the size change
    #[display("overwrite and resize padding")]
    OverwriteResizePadding,
    /// `moov` shrank by at least a header's worth; the freed bytes become a new padding atom
    #[display("overwrite and insert padding")]
    OverwriteInsertPadding,
    /// The old `moov` becomes padding and the new one is appended at end of file
    #[display("replace with padding and append")]
    ReplaceWithPaddingAppend,
}

/// The top level atom right after `moov`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowingAtom {
    Nothing,
    Padding { size: u64 },
    Other,
}

/// Picks the layout for a `moov` that changed size by `size_delta` bytes
pub fn select_scenario(size_delta: i64, following: FollowingAtom) -> SaveScenario {
    use SaveScenario::*;
    if size_delta == 0 {
        return Overwrite;
    }
    match following {
        FollowingAtom::Nothing if size_delta > 0 => Overwrite,
        FollowingAtom::Nothing => OverwriteTruncate,
        FollowingAtom::Padding { size } if size_delta > 0 => {
            if size.saturating_sub(8) >= size_delta.unsigned_abs() {
                OverwriteResizePadding
            } else {
                ReplaceWithPaddingAppend
            }
        }
        // the padding header would have to move back by less than a header
        FollowingAtom::Padding { .. } if size_delta > -8 => ReplaceWithPaddingAppend,
        FollowingAtom::Padding { .. } => OverwriteResizePadding,
        FollowingAtom::Other if size_delta <= -8 => OverwriteInsertPadding,
        FollowingAtom::Other => ReplaceWithPaddingAppend,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    pub scenario: SaveScenario,
    /// Where `moov` now starts
    pub moov_offset: u64,
    pub moov_size: u64,
}

#[derive(Debug, Clone)]
pub struct Saver {
    buffer_size: usize,
}

impl Default for Saver {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        }
    }
}

impl Saver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Writes every top level atom of `tree`, in order, to a new sink.
    ///
    /// Unmodified atoms are copied from `source`. When a re-encoded atom changes size, chunk
    /// offsets pointing into the atoms after it are shifted to follow them. Returns the number of
    /// bytes written.
    pub fn write_fresh<R: ByteSource, W: ByteSink>(
        &self,
        mut tree: AtomTree,
        source: &mut Mp4Reader<R>,
        sink: W,
    ) -> Result<u64, WriteError> {
        let mut shifts = Vec::with_capacity(tree.roots().len());
        let mut shift = 0i64;
        for id in tree.roots().iter().copied() {
            let node = &tree[id];
            shifts.push((node.offset(), node.end(), shift));
            if node.is_modified() {
                let rendered = render(&tree, id, source)?.len() as u64;
                shift += i64::try_from(rendered).unwrap_or(i64::MAX)
                    - i64::try_from(node.size()).unwrap_or(i64::MAX);
            }
        }
        if shifts.iter().any(|(_, _, shift)| *shift != 0) {
            relocate_chunk_offsets(&mut tree, &shifts)?;
        }

        let mut writer = Mp4Writer::new(sink)?.with_buffer_size(self.buffer_size);
        let start = writer.current_offset();
        for id in tree.roots().iter().copied() {
            writer.write_atom(&tree, id, source, None)?;
        }
        let end = writer.current_offset();
        writer.truncate(end)?;
        writer.flush()?;
        debug!(size = end - start, "wrote file");
        Ok(end - start)
    }

    /// Patches the file `tree` was parsed from.
    ///
    /// `source` and `sink` address the same bytes. Only `moov` may change size; other modified
    /// top level atoms must re-encode to their original length. Everything is rendered before
    /// the first byte is written.
    pub fn save_in_place<R: ByteSource, W: ByteSink>(
        &self,
        tree: &AtomTree,
        source: &mut Mp4Reader<R>,
        sink: W,
    ) -> Result<SaveReport, WriteError> {
        let roots = tree.roots();
        let moov = tree.moov().ok_or_else(|| {
            WriteError::new(WriteErrorKind::UnsupportedFormat).with_message("no moov atom")
        })?;

        let mut patches = Vec::new();
        for id in roots.iter().copied().filter(|id| *id != moov) {
            let node = &tree[id];
            if !node.is_modified() {
                continue;
            }
            let rendered = render(tree, id, source)?;
            if rendered.len() as u64 != node.size() {
                return Err(WriteError::new(WriteErrorKind::UnsupportedFormat).with_message(
                    format!(
                        "{} changed size from {} to {} bytes and cannot be patched in place",
                        node.kind(),
                        node.size(),
                        rendered.len()
                    ),
                ));
            }
            patches.push((node.offset(), rendered));
        }

        let moov_node = &tree[moov];
        let moov_offset = moov_node.offset();
        let old_size = moov_node.size();
        let mut writer = Mp4Writer::new(sink)?.with_buffer_size(self.buffer_size);

        if !moov_node.is_modified() {
            for (offset, bytes) in &patches {
                writer.seek(*offset)?;
                writer.write_raw(bytes)?;
            }
            writer.flush()?;
            debug!(scenario = %SaveScenario::Unchanged, patched = patches.len(), "saved in place");
            return Ok(SaveReport {
                scenario: SaveScenario::Unchanged,
                moov_offset,
                moov_size: old_size,
            });
        }

        let content = render(tree, moov, source)?;
        let new_size = content.len() as u64;
        let size_delta = i64::try_from(new_size).unwrap_or(i64::MAX)
            - i64::try_from(old_size).unwrap_or(i64::MAX);
        let following = following_atom(tree, moov);
        let scenario = select_scenario(size_delta, following);
        debug!(%scenario, size_delta, ?following, "saving moov in place");

        if scenario == SaveScenario::ReplaceWithPaddingAppend {
            if let Some(patch) = close_open_ended_atom(tree, source)? {
                patches.push(patch);
            }
        }

        for (offset, bytes) in &patches {
            writer.seek(*offset)?;
            writer.write_raw(bytes)?;
        }

        let mut new_offset = moov_offset;
        match scenario {
            SaveScenario::Unchanged => {}
            SaveScenario::Overwrite => {
                writer.seek(moov_offset)?;
                writer.write_raw(&content)?;
            }
            SaveScenario::OverwriteTruncate => {
                writer.seek(moov_offset)?;
                writer.write_raw(&content)?;
                writer.truncate(moov_offset + new_size)?;
            }
            SaveScenario::OverwriteResizePadding => {
                let (padding_type, padding_size) = match roots
                    .iter()
                    .position(|id| *id == moov)
                    .and_then(|position| roots.get(position + 1))
                {
                    Some(padding) => (tree[*padding].atom_type(), tree[*padding].size()),
                    None => {
                        return Err(WriteError::new(WriteErrorKind::Structure)
                            .with_message("no padding after moov"))
                    }
                };
                let resized = padding_size
                    .checked_add_signed(-size_delta)
                    .ok_or_else(|| WriteError::size("padding size underflow"))?;
                writer.seek(moov_offset)?;
                writer.write_raw(&content)?;
                writer.write_raw(&padding_header(padding_type, resized))?;
            }
            SaveScenario::OverwriteInsertPadding => {
                writer.seek(moov_offset)?;
                writer.write_raw(&content)?;
                writer.write_raw(&padding_header(FourCC(*FREE), size_delta.unsigned_abs()))?;
            }
            SaveScenario::ReplaceWithPaddingAppend => {
                writer.seek(moov_offset)?;
                writer.write_raw(&padding_header(FourCC(*FREE), old_size))?;
                new_offset = source.len();
                writer.seek(new_offset)?;
                writer.write_raw(&content)?;
            }
        }
        writer.flush()?;

        Ok(SaveReport {
            scenario,
            moov_offset: new_offset,
            moov_size: new_size,
        })
    }
}

fn following_atom(tree: &AtomTree, moov: AtomId) -> FollowingAtom {
    let roots = tree.roots();
    let next = roots
        .iter()
        .position(|id| *id == moov)
        .and_then(|position| roots.get(position + 1));
    match next {
        None => FollowingAtom::Nothing,
        Some(id) if tree[*id].kind() == AtomKind::FreeSpace => FollowingAtom::Padding {
            size: tree[*id].size(),
        },
        Some(_) => FollowingAtom::Other,
    }
}

/// An explicit size for a last top level atom whose header declares size 0 ("to end of file").
///
/// Appending after such an atom would otherwise swallow the appended bytes.
fn close_open_ended_atom<R: ByteSource>(
    tree: &AtomTree,
    source: &mut Mp4Reader<R>,
) -> Result<Option<(u64, Vec<u8>)>, WriteError> {
    let Some(last) = tree.roots().last().copied() else {
        return Ok(None);
    };
    let node = &tree[last];
    if node.header_size() != 8 {
        return Ok(None);
    }
    let mut declared = [0u8; 4];
    source.read_at(node.offset(), &mut declared)?;
    if declared != [0u8; 4] {
        return Ok(None);
    }
    let size = u32::try_from(node.size()).map_err(|_| {
        WriteError::new(WriteErrorKind::UnsupportedFormat).with_message(format!(
            "{} runs to end of file and is too large to close in place",
            node.kind()
        ))
    })?;
    debug!(kind = %node.kind(), size, "closing open ended atom before appending");
    Ok(Some((node.offset(), size.to_be_bytes().to_vec())))
}

/// Header of a filler atom of `size` bytes in total
fn padding_header(atom_type: FourCC, size: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(16);
    match u32::try_from(size) {
        Ok(size) => {
            header.extend(size.to_be_bytes());
            header.extend(atom_type.into_bytes());
        }
        Err(_) => {
            header.extend(1u32.to_be_bytes());
            header.extend(atom_type.into_bytes());
            header.extend(size.to_be_bytes());
        }
    }
    header
}

fn render<R: ByteSource>(
    tree: &AtomTree,
    id: AtomId,
    source: &mut Mp4Reader<R>,
) -> Result<Vec<u8>, WriteError> {
    let mut writer = Mp4Writer::new(Cursor::new(Vec::new()))?;
    writer.write_atom(tree, id, source, None)?;
    Ok(writer.into_inner().into_inner())
}

/// Moves chunk offsets along with the top level atom they point into.
///
/// `shifts` holds `(start, end, shift)` for each top level atom in source order.
fn relocate_chunk_offsets(tree: &mut AtomTree, shifts: &[(u64, u64, i64)]) -> Result<(), WriteError> {
    for table in tree.chunk_offset_tables() {
        let relocated = {
            let Some(atom) = tree[table].data().as_chunk_offsets() else {
                continue;
            };
            let mut changed = false;
            let mut offsets = atom.chunk_offsets.to_vec();
            for offset in offsets.iter_mut() {
                let Some((_, _, shift)) = shifts
                    .iter()
                    .find(|(start, end, _)| *offset >= *start && *offset < *end)
                    .or_else(|| shifts.last().filter(|(_, end, _)| *offset == *end))
                else {
                    continue;
                };
                if *shift != 0 {
                    *offset = offset
                        .checked_add_signed(*shift)
                        .ok_or_else(|| WriteError::size("chunk offset underflow"))?;
                    changed = true;
                }
            }
            changed.then_some(offsets)
        };
        if let Some(offsets) = relocated {
            if let Some(atom) = tree.data_mut(table)?.as_chunk_offsets_mut() {
                atom.chunk_offsets = offsets.into();
            }
        }
    }
    Ok(())
}
