//! Call-site stitching — matching a call's actual arguments against a
//! resolved target's formal parameters, applying its declared/inferred
//! sink and TITO contributions back onto the caller's environment, and
//! falling back to a conservative "obscure" model when no target (or no
//! model for a resolved target) is available.

use taint_core::cfg::{Argument, Expression, Location};

use crate::environment::{Environment, Root};
use crate::label::{path_of, Label};
use crate::leaf_set::{ComplexFeature, Kind, LeafSet, SimpleFeature};
use crate::model::{Model, Mode};
use crate::normalize::{normalize, AccessPath};
use crate::transfer::{analyze_expression, TransferContext};
use crate::tree::TaintTree;

/// Read access to a callable's published model. The registry's storage,
/// persistence, and cross-thread sharing are the driver's concern — the
/// analysis only ever needs to ask "what does this target's model say".
pub trait ModelLookup {
    fn lookup(&self, target: &str) -> Option<Model>;
}

enum FormalSlot {
    Position(usize),
    Named(String),
}

struct ActualArgument<'a> {
    expr: &'a Expression,
    formal: FormalSlot,
}

fn effective_arguments<'a>(
    callee: &'a Expression,
    args: &'a [Argument],
    implicit_receiver: bool,
) -> Vec<ActualArgument<'a>> {
    let mut actuals = Vec::with_capacity(args.len() + 1);
    let mut position = 0usize;
    if implicit_receiver {
        if let Expression::Attribute { value, .. } = callee {
            actuals.push(ActualArgument { expr: value.as_ref(), formal: FormalSlot::Position(0) });
            position = 1;
        }
    }
    for argument in args {
        if let Some(name) = &argument.keyword {
            actuals.push(ActualArgument { expr: &argument.value, formal: FormalSlot::Named(name.clone()) });
        } else {
            actuals.push(ActualArgument { expr: &argument.value, formal: FormalSlot::Position(position) });
            position += 1;
        }
    }
    actuals
}

fn tree_for_formal(env: &Environment, formal: &FormalSlot) -> TaintTree {
    match formal {
        FormalSlot::Position(position) => env
            .entries()
            .find(|(root, _)| matches!(root, Root::PositionalParameter { position: p, .. } if p == position))
            .map(|(_, tree)| tree.clone())
            .unwrap_or_default(),
        FormalSlot::Named(name) => env
            .entries()
            .find(|(root, _)| matches!(root, Root::NamedParameter(n) if n == name))
            .map(|(_, tree)| tree.clone())
            .unwrap_or_default(),
    }
}

/// Contribute `demand` and an obscure breadcrumb onto every actual
/// argument, assuming worst-case identity pass-through and no known sink.
fn obscure_contribution(actuals: &[ActualArgument<'_>], demand: &LeafSet, location: &Location, ctx: &TransferContext) -> Environment {
    let mut env = Environment::empty();
    if demand.is_empty() {
        return env;
    }
    let stamped = demand
        .clone()
        .with_simple_feature(SimpleFeature::Breadcrumb("obscure".to_string()))
        .with_simple_feature(SimpleFeature::CallSite { file: location.file.clone(), line: location.line });
    for actual in actuals {
        env = env.join(&analyze_expression(actual.expr, &stamped, location, ctx));
    }
    env
}

/// Prepend a call's own formal path onto any `ReturnAccessPath` suffix
/// already carried by `demand`, so a value escaping through a chain of
/// TITO calls keeps the full field sequence rather than only the
/// innermost call's.
fn extend_return_access_path(demand: &LeafSet, raw_path: &[Label]) -> LeafSet {
    if raw_path.is_empty() {
        return demand.clone();
    }
    demand.map_complex_features(|feature| match feature {
        ComplexFeature::ReturnAccessPath(path) => {
            let mut combined = path_of(raw_path);
            combined.extend(path.iter().cloned());
            ComplexFeature::ReturnAccessPath(combined)
        }
    })
}

fn target_contribution(
    qualified_name: &str,
    model: &Model,
    actuals: &[ActualArgument<'_>],
    demand: &LeafSet,
    location: &Location,
    ctx: &TransferContext,
) -> Environment {
    if model.mode == Mode::Sanitize {
        return Environment::empty();
    }

    let breadcrumb = SimpleFeature::Breadcrumb(qualified_name.to_string());
    let call_site = SimpleFeature::CallSite { file: location.file.clone(), line: location.line };
    let mut env = Environment::empty();

    for actual in &*actuals {
        let sink_tree = tree_for_formal(&model.sink_taint, &actual.formal);
        for (raw_path, leaf_set) in sink_tree.raw_paths() {
            let sink_demand = leaf_set.with_simple_feature(breadcrumb.clone()).with_simple_feature(call_site.clone());
            env = env.join(&assign_onto_argument(actual.expr, &raw_path, &sink_demand, location, ctx));
        }

        if demand.is_empty() {
            continue;
        }
        let tito_tree = tree_for_formal(&model.taint_in_taint_out, &actual.formal);
        let tito_position = SimpleFeature::TitoPosition { file: location.file.clone(), line: location.line };
        for (raw_path, leaf_set) in tito_tree.raw_paths() {
            if !leaf_set.contains_kind(&Kind::LocalReturn) {
                continue;
            }
            let stamped_demand = extend_return_access_path(demand, &raw_path)
                .with_simple_feature(breadcrumb.clone())
                .with_simple_feature(SimpleFeature::Breadcrumb("tito".to_string()))
                .with_simple_feature(tito_position.clone());
            env = env.join(&assign_onto_argument(actual.expr, &raw_path, &stamped_demand, location, ctx));
        }
    }

    env
}

fn assign_onto_argument(expr: &Expression, extra_path: &[Label], demand: &LeafSet, location: &Location, ctx: &TransferContext) -> Environment {
    match normalize(expr, ctx.resolver, ctx.parameters) {
        AccessPath::Reference { root, mut path } => {
            path.extend(extra_path.iter().cloned());
            Environment::empty().assign(root, &path, TaintTree::from_leaf_set(demand.clone()), true)
        }
        _ => analyze_expression(expr, demand, location, ctx),
    }
}

/// Apply a call: `callee` and `args` are the raw (pre-normalization)
/// expression nodes, since `CallTargetResolver` and the property-access
/// rewrite both need the original shape. `demand` is the `LeafSet` needed
/// from the call's return value (empty for a call used only for its side
/// effects).
pub fn apply_call(callee: &Expression, args: &[Argument], demand: &LeafSet, location: &Location, ctx: &TransferContext) -> Environment {
    let mut targets = ctx.call_targets.call_targets(callee);
    for target in ctx.call_targets.override_targets(callee) {
        targets.push((target, true));
    }

    if targets.is_empty() {
        let actuals = effective_arguments(callee, args, false);
        return obscure_contribution(&actuals, demand, location, ctx);
    }

    let mut env = Environment::empty();
    let demand_reaches_return = demand.contains_kind(&Kind::LocalReturn);
    for (target, implicit_receiver) in &targets {
        let actuals = effective_arguments(callee, args, *implicit_receiver);
        let model = ctx.models.lookup(&target.qualified_name);
        match &model {
            Some(model) if model.is_obscure => {
                env = env.join(&obscure_contribution(&actuals, demand, location, ctx));
            }
            Some(model) => {
                env = env.join(&target_contribution(&target.qualified_name, model, &actuals, demand, location, ctx));
            }
            None => {
                env = env.join(&obscure_contribution(&actuals, demand, location, ctx));
            }
        }

        // A call whose result is known to flow to this function's own
        // escape point (the `LocalReturn` marker in `demand`) inherits the
        // target's declared/inferred source taint at that same point —
        // "calling this produces tainted data".
        if demand_reaches_return {
            if let Some(model) = &model {
                let source_tree = model.source_taint.tree_for(&Root::LocalResult);
                if !source_tree.is_empty() {
                    env = env.assign(ctx.escape_root.clone(), &[], source_tree, true);
                }
            }
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use taint_core::cfg::Parameter;
    use taint_core::resolver::{CallTarget, CallTargetResolver, QualifiedName, ResolvedType, Resolver};

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

    struct SingleTarget(&'static str);
    impl CallTargetResolver for SingleTarget {
        fn call_targets(&self, _callee: &Expression) -> Vec<(CallTarget, bool)> {
            vec![(CallTarget { qualified_name: self.0.to_string(), is_override: false }, false)]
        }
    }

    struct NoTargets;
    impl CallTargetResolver for NoTargets {
        fn call_targets(&self, _callee: &Expression) -> Vec<(CallTarget, bool)> {
            Vec::new()
        }
    }

    struct FixedModel(Model);
    impl ModelLookup for FixedModel {
        fn lookup(&self, _target: &str) -> Option<Model> {
            Some(self.0.clone())
        }
    }

    struct NoModel;
    impl ModelLookup for NoModel {
        fn lookup(&self, _target: &str) -> Option<Model> {
            None
        }
    }

    fn call_expr() -> (Expression, Vec<Argument>) {
        let callee = Expression::Name("os_system".into());
        let args = vec![Argument { value: Expression::Name("command".into()), keyword: None, is_starred: false }];
        (callee, args)
    }

    #[test]
    fn unresolved_call_applies_obscure_breadcrumb() {
        let (callee, args) = call_expr();
        let call_targets = NoTargets;
        let models = NoModel;
        let ctx = TransferContext {
            resolver: &StubResolver,
            call_targets: &call_targets,
            models: &models,
            parameters: &[],
            callable: "test",
            escape_root: Root::LocalResult,
        };
        let demand = LeafSet::singleton(Kind::LocalReturn);
        let env = apply_call(&callee, &args, &demand, &Location::default(), &ctx);
        let read = env.read_simple(&Root::Variable("command".into()), &[]);
        let features = read.features_for(&Kind::LocalReturn).unwrap();
        assert!(features.simple.contains(&SimpleFeature::Breadcrumb("obscure".to_string())));
    }

    #[test]
    fn resolved_sink_model_tags_matching_argument() {
        let (callee, args) = call_expr();
        let mut model = Model::empty();
        model.sink_taint = model.sink_taint.assign(
            Root::PositionalParameter { position: 0, name: "command".into() },
            &[],
            TaintTree::leaf(Kind::named("RemoteCodeExecution")),
            false,
        );
        let call_targets = SingleTarget("os.system");
        let models = FixedModel(model);
        let parameters: Vec<Parameter> = Vec::new();
        let ctx = TransferContext {
            resolver: &StubResolver,
            call_targets: &call_targets,
            models: &models,
            parameters: &parameters,
            callable: "test",
            escape_root: Root::LocalResult,
        };
        let env = apply_call(&callee, &args, &LeafSet::empty(), &Location::default(), &ctx);
        let read = env.read_simple(&Root::Variable("command".into()), &[]);
        assert!(read.contains_kind(&Kind::named("RemoteCodeExecution")));
    }

    #[test]
    fn sanitize_mode_contributes_nothing() {
        let (callee, args) = call_expr();
        let model = Model { mode: Mode::Sanitize, ..Model::empty() };
        let call_targets = SingleTarget("trusted.clean");
        let models = FixedModel(model);
        let parameters: Vec<Parameter> = Vec::new();
        let ctx = TransferContext {
            resolver: &StubResolver,
            call_targets: &call_targets,
            models: &models,
            parameters: &parameters,
            callable: "test",
            escape_root: Root::LocalResult,
        };
        let env = apply_call(&callee, &args, &LeafSet::singleton(Kind::LocalReturn), &Location::default(), &ctx);
        assert!(env.is_empty());
    }
}
