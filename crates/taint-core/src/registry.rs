//! The interprocedural model registry contract.
//!
//! The registry itself — how models are stored, shared across threads, and
//! persisted between runs — is the external driver's concern. The core
//! only needs to read a callable's published model and publish its own.
//! The model type is left associated rather than concrete here, since
//! `Model` (built from `Environment`/`Root`) lives in `taint-analysis`,
//! one layer up from this foundation crate.
pub trait ModelRegistry {
    type Model: Clone;

    fn get(&self, target: &str) -> Option<Self::Model>;
    fn set(&mut self, target: String, model: Self::Model);
}
