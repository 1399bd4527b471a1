//! A bounded, thread-shared cache in front of a `ModelLookup`. Call sites
//! hit this far more often than they hit a genuinely new target —
//! memoizing avoids re-walking a registry's storage layer on every call
//! site in every function that calls a well-known sink.
//!
//! Optionally also synthesizes a sink model for targets the configuration
//! names as "well-known" (e.g. a shell-execution entry point) instead of
//! falling through to the generic obscure fallback, and memoizes that
//! synthetic model the same way as any other cache hit.

use taint_core::config::Configuration;

use crate::call_site::ModelLookup;
use crate::environment::{Environment, Root};
use crate::leaf_set::Kind;
use crate::model::Model;
use crate::tree::TaintTree;

/// Positions covered by a synthesized well-known-sink model. Most
/// well-known dangerous calls (a shell command, a deserialization entry
/// point) take their tainted payload in one of the first few positional
/// arguments; a keyword-only call to one of these targets falls back to
/// the ordinary obscure path instead.
const WELL_KNOWN_SINK_ARITY: usize = 4;

pub struct CachedModelRegistry<L> {
    inner: L,
    cache: moka::sync::Cache<String, Model>,
    well_known: Option<(Configuration, Kind)>,
}

impl<L: ModelLookup> CachedModelRegistry<L> {
    pub fn new(inner: L, max_capacity: u64) -> Self {
        Self { inner, cache: moka::sync::Cache::new(max_capacity), well_known: None }
    }

    /// Like `new`, but targets named in `configuration.well_known_sinks`
    /// get a synthetic model tagging their first few positional arguments
    /// with `sink_kind` instead of the generic "obscure" breadcrumb.
    pub fn with_well_known_sinks(inner: L, max_capacity: u64, configuration: Configuration, sink_kind: Kind) -> Self {
        Self { inner, cache: moka::sync::Cache::new(max_capacity), well_known: Some((configuration, sink_kind)) }
    }

    /// `is_obscure: false` on purpose: the synthesized model is meant to be
    /// treated by the call site as a known model with a precise sink kind,
    /// not as a trigger for the generic obscure fallback's collapsed
    /// breadcrumb.
    fn synthesize(&self, target: &str) -> Option<Model> {
        let (configuration, sink_kind) = self.well_known.as_ref()?;
        if !configuration.is_well_known_sink(target) {
            return None;
        }
        let mut sink_taint = Environment::empty();
        for position in 0..WELL_KNOWN_SINK_ARITY {
            let root = Root::PositionalParameter { position, name: String::new() };
            sink_taint = sink_taint.assign(root, &[], TaintTree::leaf(sink_kind.clone()), true);
        }
        Some(Model { sink_taint, ..Model::empty() })
    }
}

impl<L: ModelLookup> ModelLookup for CachedModelRegistry<L> {
    fn lookup(&self, target: &str) -> Option<Model> {
        if let Some(model) = self.cache.get(target) {
            return Some(model);
        }
        let model = match self.inner.lookup(target) {
            Some(model) => model,
            None => self.synthesize(target)?,
        };
        self.cache.insert(target.to_string(), model.clone());
        Some(model)
    }
}

impl<L: ModelLookup> taint_core::registry::ModelRegistry for CachedModelRegistry<L> {
    type Model = Model;

    fn get(&self, target: &str) -> Option<Model> {
        self.lookup(target)
    }

    fn set(&mut self, target: String, model: Model) {
        self.cache.insert(target, model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingLookup {
        calls: std::cell::Cell<u32>,
    }
    impl ModelLookup for CountingLookup {
        fn lookup(&self, _target: &str) -> Option<Model> {
            self.calls.set(self.calls.get() + 1);
            Some(Model::empty())
        }
    }

    #[test]
    fn repeated_lookups_hit_the_cache_not_the_inner_registry() {
        let cached = CachedModelRegistry::new(CountingLookup { calls: std::cell::Cell::new(0) }, 64);
        cached.lookup("os.system");
        cached.lookup("os.system");
        cached.lookup("os.system");
        assert_eq!(cached.inner.calls.get(), 1);
    }

    struct EmptyLookup;
    impl ModelLookup for EmptyLookup {
        fn lookup(&self, _target: &str) -> Option<Model> {
            None
        }
    }

    #[test]
    fn well_known_target_gets_a_synthetic_sink_model_instead_of_none() {
        let configuration = Configuration { well_known_sinks: vec!["os.system".to_string()], ..Configuration::default() };
        let cached = CachedModelRegistry::with_well_known_sinks(EmptyLookup, 64, configuration, Kind::named("RemoteCodeExecution"));

        let model = cached.lookup("os.system").expect("well-known target should synthesize a model");
        assert!(!model.is_obscure);
        let root = Root::PositionalParameter { position: 0, name: String::new() };
        assert!(model.sink_taint.tree_for(&root).tip().contains_kind(&Kind::named("RemoteCodeExecution")));
    }

    #[test]
    fn unlisted_target_still_returns_none() {
        let configuration = Configuration { well_known_sinks: vec!["os.system".to_string()], ..Configuration::default() };
        let cached = CachedModelRegistry::with_well_known_sinks(EmptyLookup, 64, configuration, Kind::named("RemoteCodeExecution"));

        assert!(cached.lookup("some.other.call").is_none());
    }
}
