//! # taint-core
//!
//! Foundation crate for the taint analysis engine.
//! Defines the types, traits, errors, and config shared by the analysis
//! engine and whichever program-representation layer embeds it.

pub mod cfg;
pub mod config;
pub mod errors;
pub mod registry;
pub mod resolver;
pub mod types;

pub use errors::{AnalysisError, ErrorCode};
pub use types::collections::{FxHashMap, FxHashSet};
