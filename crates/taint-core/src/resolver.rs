//! The name-resolution and call-target contracts the core consumes but
//! does not implement. A real implementation sits on top of full type
//! inference and import resolution; the core only ever asks narrow,
//! specific questions through these traits.

use crate::cfg::Expression;

/// An opaque type handle from the external type-inference layer. The core
/// never inspects it beyond passing it back through `less_or_equal` and
/// reading `declared_type` off `Parameter` for breadcrumbs, so it is kept
/// as an opaque string (a type's canonical display name) rather than a
/// rich type-algebra value.
pub type ResolvedType = String;

/// A fully-qualified reference to a callable or class, as produced by
/// `parse_reference` and consumed by `ModelRegistry`/`CallTargetResolver`.
pub type QualifiedName = String;

/// A candidate callee resolved from a call expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
    pub qualified_name: QualifiedName,
    /// True when the target was resolved through an override/indirect
    /// (method) dispatch rather than a direct reference.
    pub is_override: bool,
}

/// Name resolution, as narrowly as the core needs it.
pub trait Resolver {
    /// Resolve an expression's static type, if known.
    fn resolve(&self, expr: &Expression) -> Option<ResolvedType>;

    /// Look up a class's qualified name by one of its references (used by
    /// C8 to apply a class-level `TaintSink` annotation to every method).
    fn class_definition(&self, reference: &str) -> Option<QualifiedName>;

    /// Subtyping check used by model verification (C8's optional arity
    /// check piggybacks on the same resolver).
    fn less_or_equal(&self, sub: &ResolvedType, sup: &ResolvedType) -> bool;

    /// Parse a dotted reference into a qualified name, resolving module
    /// aliases. Returns `None` when `reference` is not a known global.
    fn parse_reference(&self, reference: &str) -> Option<QualifiedName>;

    /// True when `name` resolves to a known module or global (used by C5
    /// to decide `Global` vs `Local`).
    fn is_global(&self, name: &str) -> bool {
        self.parse_reference(name).is_some()
    }

    /// True when the attribute access `value.attr` is a zero-argument
    /// property accessor rather than plain field access (C5's property
    /// rewrite).
    fn is_property(&self, _value: &Expression, _attr: &str) -> bool {
        false
    }
}

/// Call-target resolution, as narrowly as the core needs it.
pub trait CallTargetResolver {
    /// Direct call targets for `callee`, each paired with whether the
    /// target was resolved implicitly (e.g. an implicit `self`).
    fn call_targets(&self, callee: &Expression) -> Vec<(CallTarget, bool)>;

    /// Override targets for an indirect (virtual/method) call, used when
    /// `call_targets` alone under-approximates dynamic dispatch.
    fn override_targets(&self, callee: &Expression) -> Vec<CallTarget> {
        let _ = callee;
        Vec::new()
    }
}
