//! The environment — a map from `Root` to `TaintTree`, with lattice
//! operations lifted pointwise.

use std::fmt;

use taint_core::FxHashMap;

use crate::label::Label;
use crate::leaf_set::LeafSet;
use crate::tree::TaintTree;

/// The root a taint tree is anchored at: a local variable, one of a
/// function's parameters, the function's own return slot, or a global.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Root {
    Variable(String),
    PositionalParameter { position: usize, name: String },
    NamedParameter(String),
    LocalResult,
    Global(String),
}

impl Root {
    pub fn is_parameter(&self) -> bool {
        matches!(self, Self::PositionalParameter { .. } | Self::NamedParameter(_))
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "{name}"),
            Self::PositionalParameter { position, name } => write!(f, "formal({position}:{name})"),
            Self::NamedParameter(name) => write!(f, "formal({name})"),
            Self::LocalResult => write!(f, "result"),
            Self::Global(name) => write!(f, "global({name})"),
        }
    }
}

/// A map from `Root` to `TaintTree`. Absent roots read as the empty tree;
/// writing to a root materializes its entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    trees: FxHashMap<Root, TaintTree>,
}

impl Environment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.values().all(TaintTree::is_empty)
    }

    pub fn tree_for(&self, root: &Root) -> TaintTree {
        self.trees.get(root).cloned().unwrap_or_default()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Root> {
        self.trees.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Root, &TaintTree)> {
        self.trees.iter()
    }

    pub fn read(&self, root: &Root, path: &[Label], transform_non_leaves: &impl Fn(&[Label], &LeafSet) -> LeafSet) -> LeafSet {
        self.tree_for(root).read(path, transform_non_leaves)
    }

    pub fn read_simple(&self, root: &Root, path: &[Label]) -> LeafSet {
        self.tree_for(root).read_simple(path)
    }

    /// Replace or join the subtree at `(root, path)`, materializing the
    /// root's entry if absent.
    pub fn assign(&self, root: Root, path: &[Label], subtree: TaintTree, weak: bool) -> Environment {
        let mut trees = self.trees.clone();
        let existing = trees.remove(&root).unwrap_or_default();
        trees.insert(root, existing.assign(path, subtree, weak));
        Environment { trees }
    }

    /// Overwrite the entire tree at `root` (used when a statement fully
    /// reassigns a variable rather than one of its access paths).
    pub fn set_tree(&self, root: Root, tree: TaintTree) -> Environment {
        let mut trees = self.trees.clone();
        if tree.is_empty() {
            trees.remove(&root);
        } else {
            trees.insert(root, tree);
        }
        Environment { trees }
    }

    pub fn join(&self, other: &Self) -> Self {
        let mut trees = self.trees.clone();
        for (root, other_tree) in &other.trees {
            trees
                .entry(root.clone())
                .and_modify(|existing| *existing = existing.join(other_tree))
                .or_insert_with(|| other_tree.clone());
        }
        Environment { trees }
    }

    pub fn less_or_equal(&self, other: &Self) -> bool {
        self.trees.iter().all(|(root, tree)| tree.less_or_equal(&other.tree_for(root)))
    }

    pub fn widen(&self, other: &Self) -> Self {
        let mut trees = self.trees.clone();
        for (root, other_tree) in &other.trees {
            trees
                .entry(root.clone())
                .and_modify(|existing| *existing = existing.widen(other_tree))
                .or_insert_with(|| other_tree.clone());
        }
        Environment { trees }
    }

    /// Bound per-root branching after widening has run past the driver's
    /// visit cap.
    pub fn collapse_roots_to_depth(&self, depth: usize) -> Self {
        let trees = self.trees.iter().map(|(root, tree)| (root.clone(), tree.collapse_to_depth(depth))).collect();
        Environment { trees }
    }
}
