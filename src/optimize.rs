//! Faststart rewrite: `ftyp`, `moov`, optional padding, then every media data payload merged
//! into a single trailing `mdat`.

use bon::Builder;
use tracing::debug;

use crate::{
    atom::{container::MDAT, leaf::FREE, AtomId, AtomKind, AtomTree, FourCC},
    reader::{ByteSource, Mp4Reader},
    writer::{
        serialize_atom_header, ByteSink, Mp4Writer, WriteError, WriteErrorKind,
        DEFAULT_COPY_BUFFER_SIZE,
    },
};

/// Smallest automatic padding
pub const MIN_AUTO_PADDING: u64 = 100 * 1024;
/// Largest automatic padding
pub const MAX_AUTO_PADDING: u64 = 1024 * 1024;

/// Amount of free space reserved after `moov`, for later in-place growth of the metadata
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PaddingSize {
    /// 10% of the provisional file size, clamped to 100 KiB..=1 MiB
    #[default]
    Auto,
    Disabled,
    /// Content bytes of the padding atom (its header is added on top)
    Explicit(u64),
}

impl PaddingSize {
    /// Content size of the padding atom for a file of about `provisional_size` bytes
    pub fn resolve(self, provisional_size: u64) -> u64 {
        match self {
            PaddingSize::Disabled => 0,
            PaddingSize::Explicit(size) => size,
            PaddingSize::Auto => (provisional_size / 10).clamp(MIN_AUTO_PADDING, MAX_AUTO_PADDING),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RegionEntry {
    origin_offset: u64,
    origin_size: u64,
    merged_offset: u64,
}

/// Payload ranges of every source `mdat`, laid out back to back in one merged payload
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MediaDataRegion {
    entries: Vec<RegionEntry>,
    data_size: u64,
}

impl MediaDataRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the payload at `origin_offset..origin_offset + origin_size` of the source.
    /// Empty payloads are skipped.
    pub fn push(&mut self, origin_offset: u64, origin_size: u64) {
        if origin_size == 0 {
            return;
        }
        self.entries.push(RegionEntry {
            origin_offset,
            origin_size,
            merged_offset: self.data_size,
        });
        self.data_size += origin_size;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source ranges as `(offset, size)`, in merged order
    pub fn ranges(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries
            .iter()
            .map(|entry| (entry.origin_offset, entry.origin_size))
    }

    /// Total payload bytes
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Header width of the merged `mdat`
    pub fn header_size(&self) -> u64 {
        serialize_atom_header(FourCC(*MDAT), self.data_size).len() as u64
    }

    /// Size of the merged `mdat`, header included
    pub fn total_size(&self) -> u64 {
        self.header_size() + self.data_size
    }

    /// Maps an absolute source offset to its absolute position in the output, given where the
    /// merged payload starts. The end of each range maps as well, since a chunk may be empty.
    pub fn map_offset(&self, old_offset: u64, payload_start: u64) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| {
                old_offset >= entry.origin_offset
                    && old_offset - entry.origin_offset <= entry.origin_size
            })
            .map(|entry| payload_start + entry.merged_offset + (old_offset - entry.origin_offset))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct OptimizeOptions {
    #[builder(default)]
    pub padding: PaddingSize,
    /// Chunk size of streamed payload copies
    #[builder(default = DEFAULT_COPY_BUFFER_SIZE)]
    pub copy_buffer_size: usize,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// What an optimize run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeReport {
    pub moov_size: u64,
    /// Content bytes of the padding atom, 0 when none was written
    pub padding_size: u64,
    /// Absolute offset of the merged payload (just after the `mdat` header)
    pub media_data_offset: u64,
    pub media_data_size: u64,
    pub total_size: u64,
    pub widened_tables: usize,
    pub narrowed_tables: usize,
    /// Top level padding atoms left out of the output
    pub dropped_padding: usize,
}

struct Partition {
    ftyp: AtomId,
    moov: AtomId,
    region: MediaDataRegion,
    dropped_padding: usize,
}

impl Partition {
    fn of(tree: &AtomTree) -> Result<Self, WriteError> {
        let mut ftyp = None;
        let mut moov = None;
        let mut region = MediaDataRegion::new();
        let mut dropped_padding = 0;
        for id in tree.roots().iter().copied() {
            let node = &tree[id];
            match node.kind() {
                AtomKind::FileType if ftyp.is_none() => ftyp = Some(id),
                AtomKind::Movie if moov.is_none() => moov = Some(id),
                AtomKind::MediaData => {
                    let header = node.header();
                    region.push(header.content_offset(), header.content_size());
                }
                AtomKind::FreeSpace => dropped_padding += 1,
                kind => {
                    return Err(unsupported(format!(
                        "cannot relocate top level {kind} atom '{}' at offset {}",
                        node.atom_type(),
                        node.offset()
                    )))
                }
            }
        }
        let ftyp = ftyp.ok_or_else(|| unsupported("no ftyp atom".to_string()))?;
        let moov = moov.ok_or_else(|| unsupported("no moov atom".to_string()))?;
        Ok(Self {
            ftyp,
            moov,
            region,
            dropped_padding,
        })
    }
}

fn unsupported(message: String) -> WriteError {
    WriteError::new(WriteErrorKind::UnsupportedFormat).with_message(message)
}

/// Rewrites a parsed file into faststart order
#[derive(Debug, Default, Clone)]
pub struct Optimizer {
    options: OptimizeOptions,
}

impl Optimizer {
    pub fn new(options: OptimizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OptimizeOptions {
        &self.options
    }

    /// Writes the optimized form of `tree` (parsed from `source`) to `sink`.
    ///
    /// `moov` is written twice at the same position: first to measure it, then with chunk
    /// offsets pointing into the merged `mdat`. Offset table widths are settled between the two
    /// writes, so the second write has exactly the measured length.
    pub fn optimize<R: ByteSource, W: ByteSink>(
        &self,
        mut tree: AtomTree,
        source: &mut Mp4Reader<R>,
        sink: W,
    ) -> Result<OptimizeReport, WriteError> {
        let Partition {
            ftyp,
            moov,
            region,
            dropped_padding,
        } = Partition::of(&tree)?;

        let mut writer = Mp4Writer::new(sink)?.with_buffer_size(self.options.copy_buffer_size);
        let start = writer.current_offset();
        let provisional_size = tree[ftyp].size() + tree[moov].size() + region.total_size();

        writer.write_atom(&tree, ftyp, source, None)?;

        let tables = tree.chunk_offset_tables();
        for table in tables.iter().copied() {
            tree.set_modified(table)?;
        }
        let moov_offset = writer.current_offset();
        writer.write_atom(&tree, moov, source, None)?;
        let measured_moov_size = writer.current_offset() - moov_offset;

        let padding_size = self.options.padding.resolve(provisional_size);
        let padding_atom_size = if padding_size > 0 {
            serialize_atom_header(FourCC(*FREE), padding_size).len() as u64 + padding_size
        } else {
            0
        };

        let final_size = moov_offset + measured_moov_size + padding_atom_size + region.total_size();
        let needs_large_offsets = final_size > u64::from(u32::MAX);
        let widths = resize_offset_tables(&mut tree, &tables, needs_large_offsets)?;
        let moov_size = measured_moov_size
            .checked_add_signed(widths.size_delta)
            .ok_or_else(|| WriteError::size("moov size underflow"))?;

        let media_data_offset = moov_offset + moov_size + padding_atom_size + region.header_size();
        for table in tables.iter().copied() {
            remap_chunk_offsets(&mut tree, table, &region, media_data_offset)?;
        }

        writer.seek(moov_offset)?;
        writer.write_atom(&tree, moov, source, None)?;
        let written = writer.current_offset() - moov_offset;
        if written != moov_size {
            return Err(WriteError::new(WriteErrorKind::Structure).with_message(format!(
                "moov re-encoded to {written} bytes, expected {moov_size}"
            )));
        }

        if padding_size > 0 {
            writer.write_atom_header(FourCC(*FREE), padding_size)?;
            writer.write_zeros(padding_size)?;
        }

        writer.write_atom_header(FourCC(*MDAT), region.data_size())?;
        debug_assert_eq!(writer.current_offset(), media_data_offset);
        for (offset, size) in region.ranges() {
            writer.copy_range(source, offset, size)?;
        }
        let end = writer.current_offset();
        writer.truncate(end)?;
        writer.flush()?;

        let report = OptimizeReport {
            moov_size,
            padding_size,
            media_data_offset,
            media_data_size: region.data_size(),
            total_size: end - start,
            widened_tables: widths.widened,
            narrowed_tables: widths.narrowed,
            dropped_padding,
        };
        debug!(
            moov_size,
            padding_size,
            media_data_offset,
            total_size = report.total_size,
            "optimized layout"
        );
        Ok(report)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TableWidthChange {
    pub(crate) widened: usize,
    pub(crate) narrowed: usize,
    /// Change of the `moov` size, 4 bytes per entry of every switched table
    pub(crate) size_delta: i64,
}

/// Switches every `stco` to `co64` when `large` is set, and every `co64` to `stco` otherwise
pub(crate) fn resize_offset_tables(
    tree: &mut AtomTree,
    tables: &[AtomId],
    large: bool,
) -> Result<TableWidthChange, WriteError> {
    let mut change = TableWidthChange::default();
    for table in tables.iter().copied() {
        let kind = tree[table].kind();
        let target = match (kind, large) {
            (AtomKind::ChunkOffset, true) => AtomKind::ChunkLargeOffset,
            (AtomKind::ChunkLargeOffset, false) => AtomKind::ChunkOffset,
            _ => continue,
        };
        let Some(atom) = tree[table].data().as_chunk_offsets().cloned() else {
            continue;
        };
        let entry_delta = i64::try_from(atom.chunk_count())
            .map_err(|_| WriteError::size("chunk offset table too large"))?
            * 4;
        tree.replace(table, target, atom)?;
        if large {
            change.widened += 1;
            change.size_delta += entry_delta;
        } else {
            change.narrowed += 1;
            change.size_delta -= entry_delta;
        }
        debug!(from = %kind, to = %target, "switched chunk offset width");
    }
    Ok(change)
}

fn remap_chunk_offsets(
    tree: &mut AtomTree,
    table: AtomId,
    region: &MediaDataRegion,
    payload_start: u64,
) -> Result<(), WriteError> {
    let Some(atom) = tree.data_mut(table)?.as_chunk_offsets_mut() else {
        return Ok(());
    };
    for offset in atom.chunk_offsets.iter_mut() {
        let old_offset = *offset;
        *offset = region.map_offset(old_offset, payload_start).ok_or_else(|| {
            WriteError::new(WriteErrorKind::OffsetMapping).with_message(format!(
                "chunk offset {old_offset} is outside every mdat payload"
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{atom::test_utils::Mp4Builder, parser::Mp4Parser};

    fn parse(data: &[u8]) -> (Mp4Reader<Cursor<&[u8]>>, AtomTree) {
        let mut reader = Mp4Reader::new(Cursor::new(data)).unwrap();
        let tree = Mp4Parser::default().parse(&mut reader).unwrap();
        (reader, tree)
    }

    fn optimize(data: &[u8], options: OptimizeOptions) -> (Vec<u8>, OptimizeReport) {
        let (mut reader, tree) = parse(data);
        let mut output = Cursor::new(Vec::new());
        let report = Optimizer::new(options)
            .optimize(tree, &mut reader, &mut output)
            .unwrap();
        (output.into_inner(), report)
    }

    fn offsets_of(tree: &AtomTree) -> Vec<u64> {
        let table = tree.chunk_offset_tables()[0];
        tree[table]
            .data()
            .as_chunk_offsets()
            .unwrap()
            .chunk_offsets
            .to_vec()
    }

    #[test]
    fn test_auto_padding_is_clamped() {
        assert_eq!(PaddingSize::Auto.resolve(0), MIN_AUTO_PADDING);
        assert_eq!(PaddingSize::Auto.resolve(2_000_000), 200_000);
        assert_eq!(PaddingSize::Auto.resolve(1 << 40), MAX_AUTO_PADDING);
        assert_eq!(PaddingSize::Disabled.resolve(1 << 40), 0);
        assert_eq!(PaddingSize::Explicit(12).resolve(0), 12);
    }

    #[test]
    fn test_region_maps_offsets_across_payloads() {
        let mut region = MediaDataRegion::new();
        region.push(100, 50);
        region.push(500, 0);
        region.push(1000, 10);
        assert_eq!(region.data_size(), 60);
        assert_eq!(region.header_size(), 8);
        assert_eq!(region.ranges().count(), 2);

        assert_eq!(region.map_offset(100, 40), Some(40));
        assert_eq!(region.map_offset(150, 40), Some(90));
        assert_eq!(region.map_offset(1005, 40), Some(95));
        assert_eq!(region.map_offset(99, 40), None);
        assert_eq!(region.map_offset(500, 40), None);
    }

    #[test]
    fn test_faststart_moves_moov_before_mdat() {
        let builder = Mp4Builder::new()
            .mdat_first()
            .free_after_ftyp(16)
            .chunk_offsets(vec![0, 0]);
        let data = builder.build();
        let (_, tree) = parse(&data);
        let mdat = tree.find_root(AtomKind::MediaData).unwrap();
        let payload = tree[mdat].header().content_offset();

        let data = builder
            .clone()
            .chunk_offsets(vec![payload, payload + 40])
            .build();
        let options = OptimizeOptions::builder()
            .padding(PaddingSize::Disabled)
            .build();
        let (output, report) = optimize(&data, options);

        let (_, optimized) = parse(&output);
        let kinds: Vec<_> = optimized
            .roots()
            .iter()
            .map(|id| optimized[*id].kind())
            .collect();
        assert_eq!(
            kinds,
            vec![AtomKind::FileType, AtomKind::Movie, AtomKind::MediaData]
        );
        assert_eq!(report.dropped_padding, 1);
        assert_eq!(report.padding_size, 0);
        assert_eq!(report.total_size, output.len() as u64);

        let mdat = optimized.find_root(AtomKind::MediaData).unwrap();
        let base = optimized[mdat].header().content_offset();
        assert_eq!(base, report.media_data_offset);
        assert_eq!(offsets_of(&optimized), vec![base, base + 40]);
        assert_eq!(
            &output[base as usize..],
            &data[payload as usize..payload as usize + 64]
        );
    }

    #[test]
    fn test_padding_is_written_after_moov() {
        let data = Mp4Builder::new().build();
        let options = OptimizeOptions::builder()
            .padding(PaddingSize::Explicit(100))
            .build();
        let (output, report) = optimize(&data, options);
        let (_, optimized) = parse(&output);
        let free = optimized.roots()[2];
        assert_eq!(optimized[free].kind(), AtomKind::FreeSpace);
        assert_eq!(optimized[free].size(), 108);
        assert_eq!(report.padding_size, 100);
    }

    #[test]
    fn test_small_file_narrows_large_offsets() {
        let builder = Mp4Builder::new().large_offsets().chunk_offsets(vec![0]);
        let (_, tree) = parse(&builder.build());
        let mdat = tree.find_root(AtomKind::MediaData).unwrap();
        let payload = tree[mdat].header().content_offset();
        let data = builder.chunk_offsets(vec![payload + 8]).build();

        let options = OptimizeOptions::builder()
            .padding(PaddingSize::Disabled)
            .build();
        let (output, report) = optimize(&data, options);
        assert_eq!(report.narrowed_tables, 1);
        assert_eq!(output.len(), data.len() - 4);

        let (_, optimized) = parse(&output);
        let table = optimized.chunk_offset_tables()[0];
        assert_eq!(optimized[table].kind(), AtomKind::ChunkOffset);
        assert_eq!(offsets_of(&optimized), vec![report.media_data_offset + 8]);
    }

    #[test]
    fn test_resize_tables_reports_size_delta() {
        let mut tree = Mp4Builder::new().chunk_offsets(vec![1, 2, 3]).parse_tree();
        let tables = tree.chunk_offset_tables();
        let change = resize_offset_tables(&mut tree, &tables, true).unwrap();
        assert_eq!(change.widened, 1);
        assert_eq!(change.size_delta, 12);
        assert_eq!(tree[tables[0]].kind(), AtomKind::ChunkLargeOffset);

        let change = resize_offset_tables(&mut tree, &tables, true).unwrap();
        assert_eq!(change, TableWidthChange::default());
    }

    #[test]
    fn test_offset_outside_mdat_is_fatal() {
        let data = Mp4Builder::new().chunk_offsets(vec![3]).build();
        let (mut reader, tree) = parse(&data);
        let err = Optimizer::default()
            .optimize(tree, &mut reader, Cursor::new(Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), WriteErrorKind::OffsetMapping);
    }

    #[test]
    fn test_unknown_top_level_atom_is_rejected() {
        let mut data = Mp4Builder::new().build();
        data.extend(crate::atom::test_utils::atom(b"uuid", &[0u8; 16]));
        let (mut reader, tree) = parse(&data);
        let err = Optimizer::default()
            .optimize(tree, &mut reader, Cursor::new(Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), WriteErrorKind::UnsupportedFormat);
    }
}
