//! The per-statement/per-expression backward transfer function. The
//! environment flowing through `analyze_statement` represents, at each
//! program point, which sink kinds are reached by each root *later* in
//! execution (hence "backward": transfer runs from a node's successors'
//! state to its own).

use taint_core::cfg::{Expression, Location, Parameter, Statement};
use taint_core::resolver::{CallTargetResolver, Resolver};

use crate::call_site::{apply_call, ModelLookup};
use crate::environment::{Environment, Root};
use crate::label::{path_of, Label};
use crate::leaf_set::{ComplexFeature, Kind, LeafSet};
use crate::normalize::{normalize, AccessPath};
use crate::tree::TaintTree;

/// Prepend `label` onto every `ReturnAccessPath` already recorded in
/// `demand`, and seed a fresh one-label path for any kind that has none
/// yet. Used when descending into a structural position (a dict value at
/// its key, a list/tuple element at its index, a starred unpack) so the
/// suffix recorded against a kind always reads as "where inside the outer
/// value this kind actually lives", the same convention `clear_target`
/// establishes for assignment targets.
fn prepend_return_access_path(demand: &LeafSet, label: Label) -> LeafSet {
    let mapped = demand.map_complex_features(|feature| match feature {
        ComplexFeature::ReturnAccessPath(path) => {
            let mut combined = path_of(&[label.clone()]);
            combined.extend(path.iter().cloned());
            ComplexFeature::ReturnAccessPath(combined)
        }
    });
    demand.kinds().filter(|kind| demand.features_for(kind).is_some_and(|f| f.complex.is_empty())).fold(
        mapped,
        |acc, kind| {
            acc.join(
                &LeafSet::singleton(kind.clone())
                    .with_complex_feature(ComplexFeature::ReturnAccessPath(path_of(&[label.clone()]))),
            )
        },
    )
}

/// Everything the transfer function needs besides the statement/expression
/// itself and the incoming environment. Bundled to keep `analyze_*`
/// signatures manageable.
pub struct TransferContext<'a> {
    pub resolver: &'a dyn Resolver,
    pub call_targets: &'a dyn CallTargetResolver,
    pub models: &'a dyn ModelLookup,
    pub parameters: &'a [Parameter],
    pub callable: &'a str,
    /// Where this callable's "escaping" value is tracked: `LocalResult` for
    /// an ordinary function, `self` for a constructor (a constructor never
    /// has an explicit `return self`).
    pub escape_root: Root,
}

/// Transfer one statement: `post` is the environment after the statement
/// executes; the result is the environment required before it.
pub fn analyze_statement(statement: &Statement, location: &Location, post: &Environment, ctx: &TransferContext) -> Environment {
    match statement {
        Statement::Assign { target, value } => analyze_assign(target, value, location, post, ctx),
        Statement::Return(Some(expr)) => analyze_escape(expr, location, post, ctx),
        Statement::Return(None) => post.clone(),
        Statement::Expr(expr) => post.join(&analyze_expression(expr, &LeafSet::empty(), location, ctx)),
        Statement::Yield(Some(expr)) => analyze_escape(expr, location, post, ctx),
        Statement::Yield(None) => post.clone(),
        Statement::YieldFrom(expr) => analyze_escape(expr, location, post, ctx),
        Statement::Identity => post.clone(),
    }
}

/// `return expr` / `yield expr`: whatever `expr` evaluates to escapes the
/// function's own return channel, so it picks up a `LocalReturn` leaf on
/// top of anything already demanded of `Root::LocalResult` by the exit
/// state (the TITO seed used by entry extraction).
fn analyze_escape(expr: &Expression, location: &Location, post: &Environment, ctx: &TransferContext) -> Environment {
    let demand = post.read_simple(&ctx.escape_root, &[]).join(&LeafSet::singleton(Kind::LocalReturn));
    post.join(&analyze_expression(expr, &demand, location, ctx))
}

fn clear_target(target: &Expression, post: &Environment, ctx: &TransferContext) -> (Environment, LeafSet) {
    match normalize(target, ctx.resolver, ctx.parameters) {
        AccessPath::Reference { root, path } => {
            let transform = |suffix: &[Label], tip: &LeafSet| -> LeafSet {
                if suffix.is_empty() {
                    tip.clone()
                } else {
                    tip.clone().with_complex_feature(ComplexFeature::ReturnAccessPath(path_of(suffix)))
                }
            };
            let demand = post.tree_for(&root).read(&path, &transform);
            let cleared = post.assign(root, &path, TaintTree::empty(), false);
            (cleared, demand)
        }
        _ => {
            tracing::warn!(callable = ctx.callable, "unrecognized assignment target shape, falling back to identity");
            (post.clone(), LeafSet::empty())
        }
    }
}

fn analyze_assign(target: &Expression, value: &Expression, location: &Location, post: &Environment, ctx: &TransferContext) -> Environment {
    match target {
        Expression::TupleLiteral(targets) | Expression::ListLiteral(targets) => {
            let rhs_elements = match value {
                Expression::TupleLiteral(v) | Expression::ListLiteral(v) if v.len() == targets.len() => Some(v),
                _ => None,
            };
            let mut env = post.clone();
            let mut combined_demand = LeafSet::empty();
            // Reverse order: mirrors left-to-right binding order read backward.
            for (index, target_elem) in targets.iter().enumerate().rev() {
                let (cleared, demand) = clear_target(target_elem, &env, ctx);
                env = cleared;
                if let Some(elements) = rhs_elements {
                    env = env.join(&analyze_expression(&elements[index], &demand, location, ctx));
                } else {
                    let positioned = prepend_return_access_path(&demand, Label::index(index.to_string()));
                    combined_demand = combined_demand.join(&positioned);
                }
            }
            if rhs_elements.is_none() {
                env = env.join(&analyze_expression(value, &combined_demand, location, ctx));
            }
            env
        }
        _ => {
            let (cleared, demand) = clear_target(target, post, ctx);
            cleared.join(&analyze_expression(value, &demand, location, ctx))
        }
    }
}

/// Transfer one expression read in a position that demands `demand` of its
/// value, returning the environment delta that propagates that demand
/// onto whatever roots the expression touches.
pub fn analyze_expression(expr: &Expression, demand: &LeafSet, location: &Location, ctx: &TransferContext) -> Environment {
    match expr {
        Expression::Call { callee, args } => apply_call(callee, args, demand, location, ctx),
        Expression::Attribute { value, attr } if ctx.resolver.is_property(value, attr) => {
            apply_call(expr, &[], demand, location, ctx)
        }
        _ => match normalize(expr, ctx.resolver, ctx.parameters) {
            AccessPath::Reference { root, path } => {
                Environment::empty().assign(root, &path, TaintTree::from_leaf_set(demand.clone()), true)
            }
            AccessPath::Call { .. } => {
                // Only reachable via `normalize` called directly (e.g. by tests);
                // the two call-shaped cases above are handled before we get here.
                Environment::empty()
            }
            AccessPath::Unknown => walk_unknown_expression(expr, demand, location, ctx),
        },
    }
}

/// Conservative fallback for expression shapes `normalize` does not
/// canonicalize: walk every sub-expression and propagate `demand` onto
/// each of them, so taint is never silently dropped.
fn walk_unknown_expression(expr: &Expression, demand: &LeafSet, location: &Location, ctx: &TransferContext) -> Environment {
    let mut env = Environment::empty();
    let mut visit = |sub: &Expression, env: &mut Environment, demand: &LeafSet| {
        *env = env.join(&analyze_expression(sub, demand, location, ctx));
    };
    match expr {
        // Each entry's value lives at that key within the dict once built;
        // recording the key as a path prefix lets a later read of
        // `result["k"]` line up with whichever expression actually filled
        // `"k"` in. A `**spread` entry (no literal key) has no field name
        // to record, so it falls back to the wildcard label.
        Expression::Dict(entries) => {
            for (key, value) in entries {
                let label = key.clone().map(Label::field).unwrap_or(Label::Any);
                let positioned = prepend_return_access_path(demand, label);
                visit(value, &mut env, &positioned);
            }
        }
        Expression::ListLiteral(items) | Expression::TupleLiteral(items) => {
            for (index, item) in items.iter().enumerate() {
                let positioned = prepend_return_access_path(demand, Label::index(index.to_string()));
                visit(item, &mut env, &positioned);
            }
        }
        Expression::BoolOp(items) | Expression::Compare(items) => {
            for item in items {
                visit(item, &mut env, demand);
            }
        }
        // A comprehension's element expression is read at the wildcard
        // index; demand flows straight through rather than being wrapped
        // under an extra `Any` label, since the abstraction here has no
        // separate "the comprehension's own collection" node.
        Expression::Comprehension(inner) => visit(inner, &mut env, demand),
        Expression::Starred(inner) => {
            let positioned = prepend_return_access_path(demand, Label::Any);
            visit(inner, &mut env, &positioned);
        }
        Expression::UnaryOp(inner) | Expression::Await(inner) => visit(inner, &mut env, demand),
        Expression::Ternary { test, body, orelse } => {
            visit(test, &mut env, demand);
            visit(body, &mut env, demand);
            visit(orelse, &mut env, demand);
        }
        Expression::Constant(_) => {}
        Expression::Name(_) | Expression::Attribute { .. } | Expression::Subscript { .. } | Expression::Call { .. } => {
            tracing::warn!(
                callable = ctx.callable,
                "unreachable: normalize should have produced Reference/Call for this shape"
            );
        }
    }
    env
}
