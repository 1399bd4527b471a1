//! The taint tree — a rose tree keyed by `Label`, each node carrying a
//! `LeafSet` tip.

use std::sync::Arc;

use taint_core::FxHashMap;

use crate::label::{path_of, Label, Path};
use crate::leaf_set::{Kind, LeafFeatures, LeafSet, SimpleFeature};

/// A labeled tree. Children are `Arc`-wrapped so join/widen/shape can reuse
/// unchanged subtrees instead of deep-cloning them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaintTree {
    tip: LeafSet,
    children: FxHashMap<Label, Arc<TaintTree>>,
}

impl TaintTree {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_leaf_set(tip: LeafSet) -> Self {
        Self { tip, children: FxHashMap::default() }
    }

    pub fn leaf(kind: Kind) -> Self {
        Self::from_leaf_set(LeafSet::singleton(kind))
    }

    /// Invariant (2): a node with empty tip and no children is equivalent
    /// to the empty tree. This is a *value* equivalence — `assign`
    /// deliberately still materializes such nodes in the map (intermediate
    /// nodes are materialized with empty tips).
    pub fn is_empty(&self) -> bool {
        self.tip.is_empty() && self.children.is_empty()
    }

    pub fn tip(&self) -> &LeafSet {
        &self.tip
    }

    pub fn children(&self) -> impl Iterator<Item = (&Label, &TaintTree)> {
        self.children.iter().map(|(label, child)| (label, child.as_ref()))
    }

    // ---- Read ----------------------------------------------------

    /// Read along `path`. `transform_non_leaves(remaining_suffix, tip)` is
    /// applied to every tip encountered while descending (including the
    /// target node's own tip, where `remaining_suffix` is empty and the
    /// transform is typically a no-op), letting the caller extend
    /// `ReturnAccessPath` suffixes as the read goes deeper than a model
    /// observed. The "subtree reached" (everything strictly below the
    /// target node) is folded in via `collapse`.
    pub fn read(&self, path: &[Label], transform_non_leaves: &impl Fn(&[Label], &LeafSet) -> LeafSet) -> LeafSet {
        let mut result = transform_non_leaves(path, &self.tip);
        match path.split_first() {
            None => {
                for child in self.children.values() {
                    result = result.join(&child.collapse());
                }
            }
            Some((label, rest)) => {
                if label.is_any() {
                    for child in self.children.values() {
                        result = result.join(&child.read(rest, transform_non_leaves));
                    }
                } else {
                    if let Some(child) = self.children.get(label) {
                        result = result.join(&child.read(rest, transform_non_leaves));
                    }
                    if let Some(any_child) = self.children.get(&Label::Any) {
                        result = result.join(&any_child.read(rest, transform_non_leaves));
                    }
                }
            }
        }
        result
    }

    /// Read with no transform of intermediate tips — the common case.
    pub fn read_simple(&self, path: &[Label]) -> LeafSet {
        self.read(path, &|_, tip| tip.clone())
    }

    // ---- Assign / Prepend -----------------------------------------

    /// Replace (`weak = false`) or join (`weak = true`) the subtree at
    /// `path`. Landing on an existing `Any` edge joins into the `Any`
    /// subtree rather than displacing it.
    pub fn assign(&self, path: &[Label], subtree: TaintTree, weak: bool) -> TaintTree {
        match path.split_first() {
            None => {
                if weak {
                    self.join(&subtree)
                } else {
                    subtree
                }
            }
            Some((label, rest)) => {
                let mut children = self.children.clone();
                let key = if label.is_any() { &Label::Any } else { label };
                let existing = children.get(key).map(|c| c.as_ref().clone()).unwrap_or_default();
                let updated = existing.assign(rest, subtree, weak);
                children.insert(key.clone(), Arc::new(updated));
                TaintTree { tip: self.tip.clone(), children }
            }
        }
    }

    /// `prepend(path, subtree) == assign(path, subtree, empty(), weak=false)`.
    pub fn prepend(path: &[Label], subtree: TaintTree) -> TaintTree {
        TaintTree::empty().assign(path, subtree, false)
    }

    // ---- Collapse ---------------------------------------------------

    /// Join of every leaf and tip in `self`, flattened to a single leaf set.
    pub fn collapse(&self) -> LeafSet {
        let mut acc = self.tip.clone();
        for child in self.children.values() {
            acc = acc.join(&child.collapse());
        }
        acc
    }

    /// Collapse everything strictly below `depth`.
    pub fn collapse_to_depth(&self, depth: usize) -> TaintTree {
        if depth == 0 {
            TaintTree::from_leaf_set(self.collapse())
        } else {
            let children = self
                .children
                .iter()
                .map(|(label, child)| (label.clone(), Arc::new(child.collapse_to_depth(depth - 1))))
                .collect();
            TaintTree { tip: self.tip.clone(), children }
        }
    }

    // ---- Essential / Shape ------------------------------------------

    /// The skeleton of `self`, with every leaf set emptied.
    pub fn essential(&self) -> TaintTree {
        let children = self
            .children
            .iter()
            .map(|(label, child)| (label.clone(), Arc::new(child.essential())))
            .collect();
        TaintTree { tip: LeafSet::empty(), children }
    }

    /// Retain only paths present in `mold`, merging pruned content into the
    /// nearest retained ancestor's tip.
    pub fn shape(&self, mold: &TaintTree) -> TaintTree {
        let mut tip = self.tip.clone();
        let mut children = FxHashMap::default();
        for (label, child) in &self.children {
            if let Some(mold_child) = mold.children.get(label) {
                children.insert(label.clone(), Arc::new(child.shape(mold_child)));
            } else {
                tip = tip.join(&child.collapse());
            }
        }
        TaintTree { tip, children }
    }

    // ---- Partition ---------------------------------------------------

    /// Split `self` into one tree per partition key, keeping each subtree's
    /// shape but restricting leaves at every node to those whose kind maps
    /// to that key under `classify`.
    pub fn partition<P>(&self, classify: &impl Fn(&Kind) -> Option<P>) -> FxHashMap<P, TaintTree>
    where
        P: Eq + std::hash::Hash + Clone,
    {
        let mut result: FxHashMap<P, TaintTree> = FxHashMap::default();

        if !self.tip.is_empty() {
            for (kind, features) in self.tip.iter() {
                if let Some(key) = classify(kind) {
                    let entry = result.entry(key).or_default();
                    entry.tip = entry.tip.join(&LeafSet::from_entry(kind.clone(), features.clone()));
                }
            }
        }

        for (label, child) in &self.children {
            for (key, subtree) in child.partition(classify) {
                let entry = result.entry(key).or_default();
                entry.children.insert(label.clone(), Arc::new(subtree));
            }
        }

        result
    }

    // ---- Transform ---------------------------------------------------

    /// Attach `feature` to every leaf in the tree (call-site stamping).
    pub fn stamp_simple_feature(&self, feature: &SimpleFeature) -> TaintTree {
        let tip = self.tip.clone().with_simple_feature(feature.clone());
        let children = self
            .children
            .iter()
            .map(|(label, child)| (label.clone(), Arc::new(child.stamp_simple_feature(feature))))
            .collect();
        TaintTree { tip, children }
    }

    // ---- Fold ---------------------------------------------------------

    /// Fold over every `(path, tip)` pair with a non-empty tip, in a
    /// deterministic (label-sorted) order.
    pub fn fold_raw_paths<A>(&self, init: A, f: &impl Fn(A, &[Label], &LeafSet) -> A) -> A {
        let mut prefix = Path::new();
        self.fold_raw_paths_rec(&mut prefix, init, f)
    }

    fn fold_raw_paths_rec<A>(&self, prefix: &mut Path, init: A, f: &impl Fn(A, &[Label], &LeafSet) -> A) -> A {
        let mut acc = if self.tip.is_empty() { init } else { f(init, prefix, &self.tip) };
        let mut labels: Vec<&Label> = self.children.keys().collect();
        labels.sort();
        for label in labels {
            let child = &self.children[label];
            prefix.push(label.clone());
            acc = child.fold_raw_paths_rec(prefix, acc, f);
            prefix.pop();
        }
        acc
    }

    pub fn raw_paths(&self) -> Vec<(Path, LeafSet)> {
        self.fold_raw_paths(Vec::new(), &|mut acc, path, tip| {
            acc.push((path_of(path), tip.clone()));
            acc
        })
    }

    pub fn raw_path_count(&self) -> usize {
        self.fold_raw_paths(0usize, &|acc, _, _| acc + 1)
    }

    // ---- Lattice ------------------------------------------------------

    pub fn join(&self, other: &Self) -> Self {
        let tip = self.tip.join(&other.tip);
        let mut children = self.children.clone();
        for (label, other_child) in &other.children {
            children
                .entry(label.clone())
                .and_modify(|existing| *existing = Arc::new(existing.join(other_child)))
                .or_insert_with(|| other_child.clone());
        }
        TaintTree { tip, children }
    }

    pub fn less_or_equal(&self, other: &Self) -> bool {
        if !self.tip.less_or_equal(&other.tip) {
            return false;
        }
        self.children.iter().all(|(label, child)| {
            other.children.get(label).is_some_and(|other_child| child.less_or_equal(other_child))
        })
    }

    /// Join at tips with a bounded complex-feature cardinality; callers
    /// that also need to bound branching should follow with
    /// `collapse_to_depth` (the fixpoint driver's "widen past the visit
    /// cap" step).
    pub fn widen(&self, other: &Self) -> Self {
        let tip = self.tip.widen(&other.tip);
        let mut children = self.children.clone();
        for (label, other_child) in &other.children {
            children
                .entry(label.clone())
                .and_modify(|existing| *existing = Arc::new(existing.widen(other_child)))
                .or_insert_with(|| other_child.clone());
        }
        TaintTree { tip, children }
    }
}

impl LeafSet {
    /// Build a one-entry `LeafSet` from an existing kind/features pair
    /// (used by `TaintTree::partition` to rebuild per-key tips).
    pub fn from_entry(kind: Kind, features: LeafFeatures) -> Self {
        let mut set = LeafSet::singleton(kind);
        for f in features.simple {
            set = set.with_simple_feature(f);
        }
        for f in features.complex {
            set = set.with_complex_feature(f);
        }
        set
    }
}
