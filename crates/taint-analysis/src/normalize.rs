//! Rewrites a raw `Expression` into one of a small set of canonical
//! access-path forms the transfer function and call-site engine actually
//! dispatch on: a rooted reference (Global/Local, built from field/index
//! labels), a call, or "unrecognized".

use std::fmt;

use taint_core::cfg::{Argument, Constant, Expression, IndexKey, Parameter};
use taint_core::resolver::Resolver;

use crate::environment::Root;
use crate::label::{path_to_string, Label, Path};

/// The canonical shape of an expression, as seen by the transfer function.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    /// A rooted, field/index-addressed reference: `x`, `x.a[0]`, `self.db`.
    Reference { root: Root, path: Path },
    /// A call expression. The callee is itself a normalized access path so
    /// the call-site engine (C7) can recover a qualified name from it via
    /// `Resolver::parse_reference`.
    Call { callee: Box<AccessPath>, arguments: Vec<Argument> },
    /// Anything else (literals, comprehensions, boolean/comparison
    /// expressions, awaited values): the transfer function falls back to
    /// walking the raw sub-expressions itself rather than through here.
    Unknown,
}

impl AccessPath {
    pub fn as_reference(&self) -> Option<(&Root, &[Label])> {
        match self {
            Self::Reference { root, path } => Some((root, path.as_slice())),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }

    /// Reconstruct the raw expression this access path was built from.
    /// A round trip through `normalize` only holds for the non-property
    /// cases: the property-access rewrite (`Attribute` -> `Call`) is a
    /// deliberate, lossy projection, and `Unknown` has no canonical
    /// preimage at all.
    pub fn as_access(&self) -> Expression {
        if let Some((root, path)) = self.as_reference() {
            return path.iter().fold(root_expression(root), |base, label| match label {
                Label::Field(name) => Expression::Attribute { value: Box::new(base), attr: name.clone() },
                Label::Index(key) => Expression::Subscript { value: Box::new(base), index: IndexKey::Constant(key.clone()) },
                Label::Any => Expression::Subscript { value: Box::new(base), index: IndexKey::Dynamic },
            });
        }
        match self {
            Self::Call { callee, arguments } => {
                Expression::Call { callee: Box::new(callee.as_access()), args: arguments.clone() }
            }
            Self::Unknown => Expression::Constant(Constant::None),
            Self::Reference { .. } => unreachable!("handled by as_reference above"),
        }
    }
}

fn root_expression(root: &Root) -> Expression {
    match root {
        Root::Variable(name) | Root::Global(name) | Root::NamedParameter(name) => Expression::Name(name.clone()),
        Root::PositionalParameter { name, .. } => Expression::Name(name.clone()),
        // Never produced by `normalize` itself (no raw expression refers to
        // a callable's own return slot by name); kept for exhaustiveness.
        Root::LocalResult => Expression::Name("$return".to_string()),
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference { root, path } => write!(f, "{root}{}", path_to_string(path)),
            Self::Call { callee, .. } => write!(f, "{callee}(...)"),
            Self::Unknown => write!(f, "<unknown>"),
        }
    }
}

fn root_for_name(name: &str, parameters: &[Parameter], resolver: &dyn Resolver) -> Root {
    if let Some(parameter) = parameters.iter().find(|p| p.name == name) {
        if parameter.is_named {
            Root::NamedParameter(parameter.name.clone())
        } else {
            Root::PositionalParameter { position: parameter.position, name: parameter.name.clone() }
        }
    } else if resolver.is_global(name) {
        Root::Global(name.to_string())
    } else {
        Root::Variable(name.to_string())
    }
}

/// Normalize `expr` into its canonical form. `parameters` is the enclosing
/// function's parameter list, needed to distinguish a bare `Name` that
/// refers to a formal from one that refers to a local variable or global.
pub fn normalize(expr: &Expression, resolver: &dyn Resolver, parameters: &[Parameter]) -> AccessPath {
    match expr {
        Expression::Name(name) => {
            AccessPath::Reference { root: root_for_name(name, parameters, resolver), path: Path::new() }
        }
        Expression::Attribute { value, attr } => {
            let base = normalize(value, resolver, parameters);
            match base {
                AccessPath::Reference { root, mut path } => {
                    path.push(Label::field(attr.clone()));
                    if resolver.is_property(value, attr) {
                        // Property access executes code; route it through
                        // `Call` so the call-site engine matches it
                        // against a getter model instead of treating it as
                        // a plain structural field read.
                        AccessPath::Call {
                            callee: Box::new(AccessPath::Reference { root, path }),
                            arguments: Vec::new(),
                        }
                    } else {
                        AccessPath::Reference { root, path }
                    }
                }
                AccessPath::Call { .. } | AccessPath::Unknown => AccessPath::Unknown,
            }
        }
        Expression::Subscript { value, index } => match normalize(value, resolver, parameters) {
            AccessPath::Reference { root, mut path } => {
                path.push(match index {
                    IndexKey::Constant(key) => Label::index(key.clone()),
                    IndexKey::Dynamic => Label::Any,
                });
                AccessPath::Reference { root, path }
            }
            AccessPath::Call { .. } | AccessPath::Unknown => AccessPath::Unknown,
        },
        Expression::Call { callee, args } => {
            AccessPath::Call { callee: Box::new(normalize(callee, resolver, parameters)), arguments: args.clone() }
        }
        _ => AccessPath::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taint_core::resolver::{CallTarget, QualifiedName, ResolvedType};

    struct StubResolver;
    impl Resolver for StubResolver {
        fn resolve(&self, _expr: &Expression) -> Option<ResolvedType> {
            None
        }
        fn class_definition(&self, _reference: &str) -> Option<QualifiedName> {
            None
        }
        fn less_or_equal(&self, _sub: &ResolvedType, _sup: &ResolvedType) -> bool {
            false
        }
        fn parse_reference(&self, _reference: &str) -> Option<QualifiedName> {
            None
        }
    }

    fn parameters() -> Vec<Parameter> {
        vec![Parameter { name: "x".into(), position: 0, is_named: false, declared_type: None }]
    }

    #[test]
    fn bare_parameter_name_normalizes_to_positional_root() {
        let ap = normalize(&Expression::Name("x".into()), &StubResolver, &parameters());
        assert_eq!(ap.to_string(), "formal(0:x)");
    }

    #[test]
    fn nested_attribute_chain_accumulates_path() {
        let expr = Expression::Attribute {
            value: Box::new(Expression::Attribute { value: Box::new(Expression::Name("x".into())), attr: "a".into() }),
            attr: "b".into(),
        };
        let ap = normalize(&expr, &StubResolver, &parameters());
        assert_eq!(ap.to_string(), "formal(0:x).a.b");
    }

    #[test]
    fn formatting_is_idempotent() {
        let expr = Expression::Subscript {
            value: Box::new(Expression::Name("y".into())),
            index: IndexKey::Constant("0".into()),
        };
        let ap = normalize(&expr, &StubResolver, &parameters());
        let once = ap.to_string();
        let twice = ap.to_string();
        assert_eq!(once, twice);
    }

    fn assert_round_trips(expr: Expression) {
        let ap = normalize(&expr, &StubResolver, &parameters());
        assert_eq!(ap.as_access(), expr);
    }

    #[test]
    fn bare_name_round_trips() {
        assert_round_trips(Expression::Name("x".into()));
    }

    #[test]
    fn nested_attribute_chain_round_trips() {
        assert_round_trips(Expression::Attribute {
            value: Box::new(Expression::Attribute { value: Box::new(Expression::Name("x".into())), attr: "a".into() }),
            attr: "b".into(),
        });
    }

    #[test]
    fn constant_index_subscript_round_trips() {
        assert_round_trips(Expression::Subscript {
            value: Box::new(Expression::Name("x".into())),
            index: IndexKey::Constant("0".into()),
        });
    }

    #[test]
    fn dynamic_index_subscript_round_trips() {
        assert_round_trips(Expression::Subscript { value: Box::new(Expression::Name("x".into())), index: IndexKey::Dynamic });
    }

    #[test]
    fn call_expression_round_trips() {
        let expr = Expression::Call { callee: Box::new(Expression::Name("x".into())), args: Vec::new() };
        let ap = normalize(&expr, &StubResolver, &parameters());
        assert!(ap.is_call());
        assert_eq!(ap.as_access(), expr);
    }

    #[test]
    fn attribute_on_call_result_is_unknown() {
        let expr = Expression::Attribute {
            value: Box::new(Expression::Call { callee: Box::new(Expression::Name("f".into())), args: Vec::new() }),
            attr: "a".into(),
        };
        let ap = normalize(&expr, &StubResolver, &parameters());
        assert_eq!(ap, AccessPath::Unknown);
    }
}
