//! Backward interprocedural taint analysis: abstract domains (C1-C4),
//! access-path normalization (C5), the per-statement transfer function
//! (C6), call-site stitching (C7), models (C8), entry extraction (C9),
//! and the per-function fixpoint driver (C10).

pub mod call_site;
pub mod entry_extract;
pub mod environment;
pub mod fixpoint;
pub mod label;
pub mod leaf_set;
pub mod model;
pub mod model_cache;
pub mod model_parser;
pub mod normalize;
pub mod transfer;
pub mod tree;

pub use call_site::ModelLookup;
pub use environment::{Environment, Root};
pub use fixpoint::analyze_function;
pub use label::{Label, Path};
pub use leaf_set::{Kind, LeafSet};
pub use model::{model_merge, Mode, Model};
pub use model_cache::CachedModelRegistry;
pub use model_parser::parse_models;
pub use normalize::{normalize, AccessPath};
pub use transfer::TransferContext;
pub use tree::TaintTree;
