//! Fast hash collection aliases used throughout the engine.
//!
//! The taint-tree lattice ops run per function per fixpoint iteration, so we
//! avoid SipHash's overhead in favor of `rustc-hash`'s FxHash.

pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type FxHashSet<T> = rustc_hash::FxHashSet<T>;
