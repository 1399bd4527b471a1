//! Finite leaf sets over a kind domain, each kind carrying simple
//! breadcrumb features and complex `ReturnAccessPath` features.

use std::fmt;

use taint_core::FxHashMap;

use crate::label::Path;

/// Bound on the number of distinct `ReturnAccessPath` suffixes kept per
/// kind once widening kicks in, so the lattice stays finite in practice.
pub const MAX_COMPLEX_FEATURES: usize = 4;

/// The taint kind domain. `LocalReturn` is the distinguished sink kind
/// that marks "this value participates in the function's return channel";
/// every other kind is a config-declared source or sink name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    LocalReturn,
    Named(String),
}

impl Kind {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn is_local_return(&self) -> bool {
        matches!(self, Self::LocalReturn)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalReturn => write!(f, "LocalReturn"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

/// A breadcrumb or call-site position attached to a leaf. Cheap to compare
/// and join; does not grow the lattice's height.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SimpleFeature {
    /// A small structured annotation aiding later filtering/reporting,
    /// e.g. `"obscure"`, `"tito"`, or a callee-identity breadcrumb.
    Breadcrumb(String),
    /// The call location a sink/TITO leaf was stamped with.
    CallSite { file: String, line: u32 },
    /// The call location a TITO leaf was produced at.
    TitoPosition { file: String, line: u32 },
}

/// A complex feature: a suffix path recorded so call-site stitching can
/// extend it as a read traverses deeper than the call site observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComplexFeature {
    ReturnAccessPath(Path),
}

/// The features attached to one kind within a `LeafSet`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeafFeatures {
    pub simple: Vec<SimpleFeature>,
    pub complex: Vec<ComplexFeature>,
}

impl LeafFeatures {
    fn insert_simple(&mut self, feature: SimpleFeature) {
        if !self.simple.contains(&feature) {
            self.simple.push(feature);
        }
    }

    fn insert_complex(&mut self, feature: ComplexFeature) {
        if !self.complex.contains(&feature) {
            self.complex.push(feature);
        }
    }

    fn join(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for feature in &other.simple {
            merged.insert_simple(feature.clone());
        }
        for feature in &other.complex {
            merged.insert_complex(feature.clone());
        }
        merged
    }

    fn is_subset_of(&self, other: &Self) -> bool {
        self.simple.iter().all(|f| other.simple.contains(f))
            && self.complex.iter().all(|f| other.complex.contains(f))
    }

    fn widen(&self, other: &Self) -> Self {
        let mut merged = self.join(other);
        if merged.complex.len() > MAX_COMPLEX_FEATURES {
            merged.complex.sort();
            merged.complex.truncate(MAX_COMPLEX_FEATURES);
        }
        merged
    }
}

/// A finite set over the kind domain `K`, each kind tagged with the
/// breadcrumbs and return-access-path suffixes accumulated for it.
/// Structural equality; lattice order is "every kind in self present in
/// other with a subset of features"; join is per-kind feature union.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeafSet {
    entries: FxHashMap<Kind, LeafFeatures>,
}

impl LeafSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn singleton(kind: Kind) -> Self {
        let mut entries = FxHashMap::default();
        entries.insert(kind, LeafFeatures::default());
        Self { entries }
    }

    pub fn contains_kind(&self, kind: &Kind) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.entries.keys()
    }

    pub fn features_for(&self, kind: &Kind) -> Option<&LeafFeatures> {
        self.entries.get(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Kind, &LeafFeatures)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Attach a simple feature to every kind currently in the set (used by
    /// C7's call-site stamping and obscure-fallback tagging).
    pub fn with_simple_feature(mut self, feature: SimpleFeature) -> Self {
        for features in self.entries.values_mut() {
            features.insert_simple(feature.clone());
        }
        self
    }

    pub fn with_complex_feature(mut self, feature: ComplexFeature) -> Self {
        for features in self.entries.values_mut() {
            features.insert_complex(feature.clone());
        }
        self
    }

    /// Apply `f` to every kind's complex features in place, preserving
    /// kinds and simple features (C7's `transform_non_leaves`/call-site
    /// `ReturnAccessPath` suffix extension).
    pub fn map_complex_features(&self, mut f: impl FnMut(&ComplexFeature) -> ComplexFeature) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(kind, features)| {
                let mapped = LeafFeatures {
                    simple: features.simple.clone(),
                    complex: features.complex.iter().map(|c| f(c)).collect(),
                };
                (kind.clone(), mapped)
            })
            .collect();
        Self { entries }
    }

    pub fn join(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (kind, features) in &other.entries {
            entries
                .entry(kind.clone())
                .and_modify(|existing| *existing = existing.join(features))
                .or_insert_with(|| features.clone());
        }
        Self { entries }
    }

    pub fn less_or_equal(&self, other: &Self) -> bool {
        self.entries.iter().all(|(kind, features)| {
            other
                .entries
                .get(kind)
                .is_some_and(|other_features| features.is_subset_of(other_features))
        })
    }

    pub fn widen(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (kind, features) in &other.entries {
            entries
                .entry(kind.clone())
                .and_modify(|existing| *existing = existing.widen(features))
                .or_insert_with(|| features.clone());
        }
        Self { entries }
    }
}
