//! Atomic access-path labels and the paths built from them.

use std::fmt;

use smallvec::SmallVec;

/// A single step in an access path: a named field, a numeric/string index,
/// or the `Any` wildcard.
///
/// `Any` is special on both read and write: reading through it joins across
/// every sibling subtree, and assigning onto or through it joins into the
/// existing `Any` subtree rather than replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Field(String),
    Index(String),
    Any,
}

impl Label {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn index(index: impl Into<String>) -> Self {
        Self::Index(index.into())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Index(index) => write!(f, "[{index}]"),
            Self::Any => write!(f, "[*]"),
        }
    }
}

/// An ordered sequence of labels. The empty path denotes the root.
pub type Path = SmallVec<[Label; 4]>;

/// Render a path as a dotted/bracketed access-path string, e.g.
/// `.foo[0][*]`.
pub fn path_to_string(path: &[Label]) -> String {
    path.iter().map(Label::to_string).collect()
}

/// `Path::new()` shorthand that reads better at call sites than
/// `Path::default()`.
pub fn root_path() -> Path {
    Path::new()
}

/// Build a path from a slice of labels, cloning them.
pub fn path_of(labels: &[Label]) -> Path {
    labels.iter().cloned().collect()
}
