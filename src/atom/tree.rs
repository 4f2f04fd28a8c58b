use std::ops::Index;

use crate::{
    atom::{iter::Descendants, AtomData, AtomKind, ContentLayout, FourCC, HandlerType},
    validation::{accepts_child, binding_for},
    writer::{WriteError, WriteErrorKind},
};

/// Index of an atom in its [`AtomTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(usize);

impl AtomId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where an atom was found in the source and how its header was encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeader {
    pub atom_type: FourCC,
    /// Absolute offset of the first header byte
    pub offset: u64,
    /// Total size including the header
    pub size: u64,
    /// 8, or 16 when the extended size field is used
    pub header_size: u64,
}

impl AtomHeader {
    /// Header of an atom that was constructed rather than parsed
    pub fn detached(atom_type: FourCC) -> Self {
        Self {
            atom_type,
            offset: 0,
            size: 0,
            header_size: 8,
        }
    }

    pub fn content_offset(&self) -> u64 {
        self.offset + self.header_size
    }

    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Version and flags of a full atom
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FullHeader {
    pub version: u8,
    pub flags: [u8; 3],
}

impl FullHeader {
    pub fn new(version: u8, flags: [u8; 3]) -> Self {
        Self { version, flags }
    }

    pub fn flags_u32(&self) -> u32 {
        u32::from_be_bytes([0, self.flags[0], self.flags[1], self.flags[2]])
    }
}

#[derive(Debug, Clone)]
pub struct AtomNode {
    pub(crate) header: AtomHeader,
    pub(crate) full: Option<FullHeader>,
    pub(crate) kind: AtomKind,
    pub(crate) data: AtomData,
    pub(crate) parent: Option<AtomId>,
    pub(crate) children: Vec<AtomId>,
    /// Bytes after the last child that were too short to be an atom
    pub(crate) trailer: Vec<u8>,
    pub(crate) modified: bool,
}

impl AtomNode {
    pub(crate) fn new(
        header: AtomHeader,
        full: Option<FullHeader>,
        kind: AtomKind,
        data: AtomData,
    ) -> Self {
        Self {
            header,
            full,
            kind,
            data,
            parent: None,
            children: Vec::new(),
            trailer: Vec::new(),
            modified: false,
        }
    }

    pub fn header(&self) -> &AtomHeader {
        &self.header
    }

    pub fn atom_type(&self) -> FourCC {
        self.header.atom_type
    }

    pub fn offset(&self) -> u64 {
        self.header.offset
    }

    pub fn size(&self) -> u64 {
        self.header.size
    }

    pub fn header_size(&self) -> u64 {
        self.header.header_size
    }

    pub fn end(&self) -> u64 {
        self.header.end()
    }

    pub fn full_header(&self) -> Option<FullHeader> {
        self.full
    }

    /// Version of a full atom, 0 for plain atoms
    pub fn version(&self) -> u8 {
        self.full.map(|full| full.version).unwrap_or_default()
    }

    pub fn kind(&self) -> AtomKind {
        self.kind
    }

    pub fn data(&self) -> &AtomData {
        &self.data
    }

    pub fn parent(&self) -> Option<AtomId> {
        self.parent
    }

    pub fn children(&self) -> &[AtomId] {
        &self.children
    }

    pub fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

/// Arena holding every atom of a file; parents and children refer to each other by [`AtomId`]
#[derive(Debug, Default, Clone)]
pub struct AtomTree {
    nodes: Vec<AtomNode>,
    roots: Vec<AtomId>,
}

impl Index<AtomId> for AtomTree {
    type Output = AtomNode;

    fn index(&self, id: AtomId) -> &Self::Output {
        &self.nodes[id.0]
    }
}

impl AtomTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Adds a node to the arena without attaching it anywhere
    pub(crate) fn push(&mut self, node: AtomNode) -> AtomId {
        self.nodes.push(node);
        AtomId(self.nodes.len() - 1)
    }

    /// Drops every node added after `len`, discarding a partially parsed subtree
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    pub(crate) fn attach(&mut self, parent: Option<AtomId>, id: AtomId) {
        self.nodes[id.0].parent = parent;
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
    }

    pub(crate) fn set_trailer(&mut self, id: AtomId, trailer: Vec<u8>) {
        self.nodes[id.0].trailer = trailer;
    }

    pub(crate) fn node_mut(&mut self, id: AtomId) -> &mut AtomNode {
        &mut self.nodes[id.0]
    }

    pub fn roots(&self) -> &[AtomId] {
        &self.roots
    }

    pub fn children(&self, id: AtomId) -> &[AtomId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: AtomId) -> Option<AtomId> {
        self.nodes[id.0].parent
    }

    pub fn data(&self, id: AtomId) -> &AtomData {
        &self.nodes[id.0].data
    }

    /// Chain of ancestors of `id`, nearest first
    pub fn ancestors(&self, id: AtomId) -> impl Iterator<Item = AtomId> + '_ {
        std::iter::successors(self.parent(id), move |id| self.parent(*id))
    }

    /// Every atom in the tree, depth first in file order
    pub fn iter(&self) -> Descendants<'_> {
        Descendants::new(self, self.roots.clone())
    }

    /// `id` and everything beneath it, depth first
    pub fn descendants(&self, id: AtomId) -> Descendants<'_> {
        Descendants::new(self, vec![id])
    }

    pub fn find_root(&self, kind: AtomKind) -> Option<AtomId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].kind == kind)
    }

    pub fn file_type(&self) -> Option<AtomId> {
        self.find_root(AtomKind::FileType)
    }

    pub fn moov(&self) -> Option<AtomId> {
        self.find_root(AtomKind::Movie)
    }

    pub fn find_child(&self, id: AtomId, kind: AtomKind) -> Option<AtomId> {
        self.children_of_kind(id, kind).next()
    }

    pub fn children_of_kind(
        &self,
        id: AtomId,
        kind: AtomKind,
    ) -> impl Iterator<Item = AtomId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.nodes[child.0].kind == kind)
    }

    /// Follows a path of kinds from `id`, taking the first matching child at each step
    pub fn find_path(&self, id: AtomId, path: &[AtomKind]) -> Option<AtomId> {
        path.iter()
            .try_fold(id, |current, kind| self.find_child(current, *kind))
    }

    /// All `trak` atoms of the `moov` atom
    pub fn tracks(&self) -> Vec<AtomId> {
        match self.moov() {
            Some(moov) => self.children_of_kind(moov, AtomKind::Track).collect(),
            None => Vec::new(),
        }
    }

    /// Handler type declared by the `hdlr` of a `mdia` atom
    pub fn media_handler_type(&self, mdia: AtomId) -> Option<HandlerType> {
        let hdlr = self.find_child(mdia, AtomKind::HandlerReference)?;
        self.nodes[hdlr.0]
            .data
            .as_handler_reference()
            .map(|hdlr| hdlr.handler_type)
    }

    /// Handler type of the track containing `id`, looked up through the nearest `mdia` ancestor
    pub fn enclosing_handler_type(&self, id: AtomId) -> Option<HandlerType> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|ancestor| self.nodes[ancestor.0].kind == AtomKind::Media)
            .and_then(|mdia| self.media_handler_type(mdia))
    }

    /// Every `stco`/`co64` atom inside `moov`
    pub fn chunk_offset_tables(&self) -> Vec<AtomId> {
        let Some(moov) = self.moov() else {
            return Vec::new();
        };
        self.descendants(moov)
            .filter(|id| {
                matches!(
                    self.nodes[id.0].kind,
                    AtomKind::ChunkOffset | AtomKind::ChunkLargeOffset
                )
            })
            .collect()
    }

    /// Whether any atom (root or nested) is marked modified
    pub fn is_modified(&self) -> bool {
        self.roots.iter().any(|id| self.nodes[id.0].modified)
    }

    /// Marks an atom modified, and with it every ancestor, so they are re-encoded on write
    pub fn set_modified(&mut self, id: AtomId) -> Result<(), WriteError> {
        let kind = self.nodes[id.0].kind;
        if !kind.is_mutable() {
            return Err(WriteError::immutable(kind));
        }
        let mut current = Some(id);
        while let Some(id) = current {
            let node = &mut self.nodes[id.0];
            node.modified = true;
            current = node.parent;
        }
        Ok(())
    }

    /// Mutable access to an atom's data; marks the atom modified
    pub fn data_mut(&mut self, id: AtomId) -> Result<&mut AtomData, WriteError> {
        self.set_modified(id)?;
        Ok(&mut self.nodes[id.0].data)
    }

    pub fn set_full_header(&mut self, id: AtomId, full: FullHeader) -> Result<(), WriteError> {
        if !self.nodes[id.0].kind.is_full_atom() {
            return Err(WriteError::new(WriteErrorKind::InvalidValue)
                .with_message(format!("{} has no version/flags", self.nodes[id.0].kind)));
        }
        self.set_modified(id)?;
        self.nodes[id.0].full = Some(full);
        Ok(())
    }

    /// Replaces the variant of an atom in place, keeping its position and version/flags.
    ///
    /// The new kind must fit the same parent and, for a bound child, the same slot.
    pub fn replace(
        &mut self,
        id: AtomId,
        kind: AtomKind,
        data: impl Into<AtomData>,
    ) -> Result<(), WriteError> {
        let old_kind = self.nodes[id.0].kind;
        if !old_kind.is_mutable() || !kind.is_mutable() {
            return Err(WriteError::immutable(old_kind));
        }
        let parent_kind = self.parent(id).map(|parent| self.nodes[parent.0].kind);
        if !kind.placement().allows(parent_kind) {
            return Err(WriteError::new(WriteErrorKind::Structure)
                .with_message(format!("{kind} cannot replace {old_kind}")));
        }
        if let Some(parent_kind) = parent_kind {
            let old_binding = binding_for(parent_kind, old_kind).map(|binding| binding.name);
            let new_binding = binding_for(parent_kind, kind).map(|binding| binding.name);
            if old_binding != new_binding {
                return Err(WriteError::new(WriteErrorKind::Structure).with_message(format!(
                    "{kind} does not fill the slot of {old_kind} in {parent_kind}"
                )));
            }
        }
        let atom_type = kind
            .canonical_type()
            .unwrap_or(self.nodes[id.0].header.atom_type);
        let node = &mut self.nodes[id.0];
        node.kind = kind;
        node.data = data.into();
        node.header.atom_type = atom_type;
        if kind.is_full_atom() {
            node.full.get_or_insert_with(FullHeader::default);
        } else {
            node.full = None;
        }
        self.set_modified(id)
    }

    /// Creates a new atom and inserts it among the children of `parent` at `index`
    pub fn insert_child(
        &mut self,
        parent: AtomId,
        index: usize,
        atom_type: FourCC,
        kind: AtomKind,
        data: impl Into<AtomData>,
    ) -> Result<AtomId, WriteError> {
        let parent_kind = self.nodes[parent.0].kind;
        if !parent_kind.is_container() {
            return Err(WriteError::new(WriteErrorKind::Structure)
                .with_message(format!("{parent_kind} cannot hold child atoms")));
        }
        if !kind.placement().allows(Some(parent_kind)) {
            return Err(WriteError::new(WriteErrorKind::Structure)
                .with_message(format!("{kind} is not allowed inside {parent_kind}")));
        }
        if !accepts_child(self, parent, kind) {
            return Err(WriteError::new(WriteErrorKind::Structure)
                .with_message(format!("{parent_kind} already holds its {kind}")));
        }
        if !kind.is_mutable() {
            return Err(WriteError::immutable(kind));
        }
        let data = data.into();
        let data = match (kind.layout(), data) {
            (ContentLayout::Children | ContentLayout::EntryList, _) => AtomData::Container,
            (ContentLayout::SampleEntry, AtomData::SampleEntry(entry)) => {
                AtomData::SampleEntry(entry)
            }
            (ContentLayout::SampleEntry, _) => {
                return Err(WriteError::new(WriteErrorKind::InvalidValue)
                    .with_message(format!("{kind} needs a sample entry prefix")));
            }
            (_, data) => data,
        };
        let full = kind.is_full_atom().then(FullHeader::default);
        let mut node = AtomNode::new(AtomHeader::detached(atom_type), full, kind, data);
        node.parent = Some(parent);
        node.modified = true;
        let id = self.push(node);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, id);
        self.set_modified(parent)?;
        Ok(id)
    }

    pub fn append_child(
        &mut self,
        parent: AtomId,
        atom_type: FourCC,
        kind: AtomKind,
        data: impl Into<AtomData>,
    ) -> Result<AtomId, WriteError> {
        let index = self.children(parent).len();
        self.insert_child(parent, index, atom_type, kind, data)
    }

    /// Detaches `child` from `parent`; its node stays in the arena but is no longer written
    pub fn remove_child(&mut self, parent: AtomId, child: AtomId) -> Result<(), WriteError> {
        let parent_kind = self.nodes[parent.0].kind;
        let kind = self.nodes[child.0].kind;
        let Some(position) = self.nodes[parent.0].children.iter().position(|c| *c == child)
        else {
            return Err(WriteError::new(WriteErrorKind::Structure)
                .with_message(format!("{kind} is not a child of {parent_kind}")));
        };
        if let Some(binding) = binding_for(parent_kind, kind) {
            let remaining = self
                .children(parent)
                .iter()
                .filter(|c| binding.binds(self.nodes[c.0].kind))
                .count()
                - 1;
            if !binding.quantity.is_satisfied_by(remaining) {
                return Err(WriteError::new(WriteErrorKind::Structure).with_message(format!(
                    "{parent_kind} requires {} {}",
                    binding.quantity, binding.name
                )));
            }
        }
        self.set_modified(parent)?;
        self.nodes[parent.0].children.remove(position);
        self.nodes[child.0].parent = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{test_utils::Mp4Builder, ChunkOffsetAtom, FreeAtom};

    #[test]
    fn test_set_modified_propagates_to_ancestors() {
        let mut tree = Mp4Builder::new().chunk_offsets(vec![100, 5000]).parse_tree();
        let stco = tree.chunk_offset_tables()[0];
        tree.set_modified(stco).unwrap();

        let ancestors: Vec<_> = tree.ancestors(stco).collect();
        assert_eq!(ancestors.len(), 5);
        assert!(ancestors.iter().all(|id| tree[*id].is_modified()));
        assert_eq!(tree[*ancestors.last().unwrap()].kind(), AtomKind::Movie);

        let mdat = tree.find_root(AtomKind::MediaData).unwrap();
        assert!(!tree[mdat].is_modified());
        let ftyp = tree.file_type().unwrap();
        assert!(!tree[ftyp].is_modified());
    }

    #[test]
    fn test_immutable_atoms_cannot_be_modified() {
        let mut tree = Mp4Builder::new().parse_tree();
        let mdat = tree.find_root(AtomKind::MediaData).unwrap();
        let err = tree.set_modified(mdat).unwrap_err();
        assert_eq!(err.kind(), WriteErrorKind::Immutable);
        assert!(!tree[mdat].is_modified());
    }

    #[test]
    fn test_replace_chunk_offset_width() {
        let mut tree = Mp4Builder::new().chunk_offsets(vec![100]).parse_tree();
        let stco = tree.chunk_offset_tables()[0];
        let atom = tree[stco].data().as_chunk_offsets().cloned().unwrap();
        tree.replace(stco, AtomKind::ChunkLargeOffset, atom).unwrap();
        assert_eq!(tree[stco].kind(), AtomKind::ChunkLargeOffset);
        assert_eq!(tree[stco].atom_type(), FourCC(*b"co64"));
        assert!(tree[stco].full_header().is_some());

        let err = tree
            .replace(stco, AtomKind::SyncSample, ChunkOffsetAtom::default())
            .unwrap_err();
        assert_eq!(err.kind(), WriteErrorKind::Structure);
    }

    #[test]
    fn test_insert_and_remove_children() {
        let mut tree = Mp4Builder::new().parse_tree();
        let moov = tree.moov().unwrap();
        let free = tree
            .append_child(moov, FourCC(*b"free"), AtomKind::FreeSpace, FreeAtom::new(4))
            .unwrap();
        assert_eq!(tree.children(moov).last(), Some(&free));
        assert!(tree[moov].is_modified());

        let mvhd = tree.find_child(moov, AtomKind::MovieHeader).unwrap();
        let err = tree
            .insert_child(moov, 0, FourCC(*b"mvhd"), AtomKind::MovieHeader, AtomData::Container)
            .unwrap_err();
        assert_eq!(err.kind(), WriteErrorKind::Structure);
        assert_eq!(
            tree.remove_child(moov, mvhd).unwrap_err().kind(),
            WriteErrorKind::Structure
        );

        tree.remove_child(moov, free).unwrap();
        assert!(!tree.children(moov).contains(&free));
        assert_eq!(tree.parent(free), None);
    }
}
