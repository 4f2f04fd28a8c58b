use crate::atom::{AtomId, AtomTree};

/// Depth-first, pre-order walk over a subtree, yielding atoms in file order
pub struct Descendants<'a> {
    tree: &'a AtomTree,
    stack: Vec<AtomId>,
}

impl<'a> Descendants<'a> {
    pub(crate) fn new(tree: &'a AtomTree, mut start: Vec<AtomId>) -> Self {
        start.reverse();
        Self { tree, stack: start }
    }
}

impl Iterator for Descendants<'_> {
    type Item = AtomId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}
