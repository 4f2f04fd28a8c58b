//! Structural rules: how many children of each kind a container holds, and where each kind may nest.

use derive_more::Display;

use crate::{
    atom::{AtomId, AtomKind, AtomTree},
    parser::{ParseError, ParseErrorKind},
};

/// How many children of a bound kind a container expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PropertyQuantity {
    #[display("exactly one")]
    One,
    #[display("zero or one")]
    ZeroOrOne,
    #[display("one or more")]
    OneOrMore,
    #[display("zero or more")]
    ZeroOrMore,
}

impl PropertyQuantity {
    /// Whether the slot holds at most one value
    pub fn is_single(self) -> bool {
        matches!(self, Self::One | Self::ZeroOrOne)
    }

    pub fn is_satisfied_by(self, count: usize) -> bool {
        match self {
            Self::One => count == 1,
            Self::ZeroOrOne => count <= 1,
            Self::OneOrMore => count >= 1,
            Self::ZeroOrMore => true,
        }
    }
}

/// A named child slot of a container, filled by any of `kinds`
#[derive(Debug, Clone, Copy)]
pub struct ChildBinding {
    pub name: &'static str,
    pub kinds: &'static [AtomKind],
    pub quantity: PropertyQuantity,
}

impl ChildBinding {
    pub const fn new(
        name: &'static str,
        kinds: &'static [AtomKind],
        quantity: PropertyQuantity,
    ) -> Self {
        Self {
            name,
            kinds,
            quantity,
        }
    }

    pub fn binds(&self, kind: AtomKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Containers an atom kind may be nested in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedParents {
    /// Any container
    Any,
    /// Only the listed container kinds
    Only(&'static [AtomKind]),
    /// No container at all
    Nothing,
}

/// Where an atom kind may appear.
///
/// Appearing at the top level and appearing inside "any container" are separate allowances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub root: bool,
    pub parents: AllowedParents,
}

impl Placement {
    pub const ROOT: Placement = Placement {
        root: true,
        parents: AllowedParents::Nothing,
    };

    pub const ANYWHERE: Placement = Placement {
        root: true,
        parents: AllowedParents::Any,
    };

    pub const fn within(parents: &'static [AtomKind]) -> Self {
        Placement {
            root: false,
            parents: AllowedParents::Only(parents),
        }
    }

    pub const fn root_or_within(parents: &'static [AtomKind]) -> Self {
        Placement {
            root: true,
            parents: AllowedParents::Only(parents),
        }
    }

    pub fn allows(&self, parent: Option<AtomKind>) -> bool {
        match parent {
            None => self.root,
            Some(parent) => match self.parents {
                AllowedParents::Any => true,
                AllowedParents::Only(kinds) => kinds.contains(&parent),
                AllowedParents::Nothing => false,
            },
        }
    }
}

/// Checks that `kind` may be nested under `parent` (`None` meaning the top level)
pub fn validate_parent(
    kind: AtomKind,
    parent: Option<AtomKind>,
    location: (u64, u64),
) -> Result<(), ParseError> {
    if kind.placement().allows(parent) {
        return Ok(());
    }
    let message = match parent {
        Some(parent) => format!("{kind} is not allowed inside {parent}"),
        None => format!("{kind} is not allowed at the top level"),
    };
    Err(ParseError::new(ParseErrorKind::Structure, Some(location)).with_message(message))
}

/// Returns the binding of `parent` that captures children of `kind`, if any
pub fn binding_for(parent: AtomKind, kind: AtomKind) -> Option<&'static ChildBinding> {
    parent.bindings().iter().find(|binding| binding.binds(kind))
}

/// Whether another child of `kind` still fits into the bound slots of `parent`
pub fn accepts_child(tree: &AtomTree, parent: AtomId, kind: AtomKind) -> bool {
    let parent_kind = tree[parent].kind();
    match binding_for(parent_kind, kind) {
        Some(binding) if binding.quantity.is_single() => count_bound(tree, parent, binding) == 0,
        _ => true,
    }
}

/// Enforces every quantity declared by the container at `id`
pub fn validate_quantities(tree: &AtomTree, id: AtomId) -> Result<(), ParseError> {
    let node = &tree[id];
    for binding in node.kind().bindings() {
        let count = count_bound(tree, id, binding);
        if !binding.quantity.is_satisfied_by(count) {
            let message = format!(
                "{} ({}) expects {} in {}, found {count}",
                binding.name,
                binding
                    .kinds
                    .iter()
                    .map(|kind| kind.to_string())
                    .collect::<Vec<_>>()
                    .join(" | "),
                binding.quantity,
                node.kind(),
            );
            return Err(ParseError::new(
                ParseErrorKind::Structure,
                Some((node.offset(), node.size())),
            )
            .with_message(message));
        }
    }
    Ok(())
}

fn count_bound(tree: &AtomTree, parent: AtomId, binding: &ChildBinding) -> usize {
    tree.children(parent)
        .iter()
        .filter(|child| binding.binds(tree[**child].kind()))
        .count()
}
