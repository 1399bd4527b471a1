//! The per-function fixpoint driver. Worklist iteration over a single
//! function's CFG, reverse-postorder seeded, applying the statement
//! transfer at each node and entry extraction once the entry state
//! converges.

use std::collections::VecDeque;

use taint_core::cfg::{CfgNode, ControlFlowGraph, FunctionContext};
use taint_core::cfg::Location;
use taint_core::resolver::{CallTargetResolver, Resolver};

use crate::call_site::ModelLookup;
use crate::entry_extract::{extract_model, root_for_parameter};
use crate::environment::{Environment, Root};
use crate::leaf_set::Kind;
use crate::model::Model;
use crate::transfer::{analyze_statement, TransferContext};
use crate::tree::TaintTree;

/// Visits a node may take before the driver gives up joining and starts
/// widening instead.
const VISIT_CAP: usize = 10;
/// Depth a node's state is collapsed to once it has been widened past the
/// cap, bounding branching explosion on a pathological loop.
const POST_CAP_COLLAPSE_DEPTH: usize = 4;

/// Where this callable's "escaping" value lives: `LocalResult` for an
/// ordinary function, the first parameter's root for a constructor (a
/// constructor never has an explicit `return self`).
pub fn escape_root(function: &FunctionContext) -> Root {
    match function.is_constructor().then(|| function.parameters.first()).flatten() {
        Some(parameter) => root_for_parameter(parameter),
        None => Root::LocalResult,
    }
}

/// Reverse-postorder over the CFG, starting from `entry`. Nodes
/// unreachable from `entry` (dead code, by construction of a real CFG, but
/// not ruled out here) are appended at the end so every node still gets an
/// initial worklist slot.
fn reverse_postorder(cfg: &ControlFlowGraph) -> Vec<usize> {
    let mut visited = vec![false; cfg.nodes.len()];
    let mut postorder = Vec::with_capacity(cfg.nodes.len());
    let mut stack = vec![(cfg.entry, false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            postorder.push(node);
            continue;
        }
        if visited[node] {
            continue;
        }
        visited[node] = true;
        stack.push((node, true));
        for succ in cfg.successors(node) {
            if !visited[succ] {
                stack.push((succ, false));
            }
        }
    }

    for node in 0..cfg.nodes.len() {
        if !visited[node] {
            postorder.push(node);
        }
    }

    postorder.reverse();
    postorder
}

/// Transfer a whole node's statement list: statements run in reverse
/// source order, since this is a backward analysis (each statement's
/// "post" state is the previous statement's "pre" state).
fn analyze_node(node: &CfgNode, out: &Environment, ctx: &TransferContext) -> Environment {
    let mut state = out.clone();
    for located in node.statements.iter().rev() {
        state = analyze_statement(&located.statement, &located.location, &state, ctx);
    }
    state
}

/// Run the backward fixpoint over `function`'s CFG and publish the model
/// extracted from the converged entry state. Returns the empty model,
/// logged via a `tracing` diagnostic rather than failing the caller, when
/// the CFG has no entry reachable from its exit (`AnalysisNoEntry`).
pub fn analyze_function(
    function: &FunctionContext,
    resolver: &dyn Resolver,
    call_targets: &dyn CallTargetResolver,
    models: &dyn ModelLookup,
) -> Model {
    let cfg = &function.cfg;
    if cfg.nodes.is_empty() || !cfg.entry_reachable_from_exit() {
        tracing::warn!(callable = %function.name, "AnalysisNoEntry: no entry reachable from exit, emitting empty model");
        return Model::empty();
    }

    let escape = escape_root(function);
    let ctx = TransferContext {
        resolver,
        call_targets,
        models,
        parameters: &function.parameters,
        callable: &function.name,
        escape_root: escape.clone(),
    };

    // The fixpoint's one external seed: the function's own escape point
    // carries a `LocalReturn` marker at the exit, so `Return`/`Yield`
    // (via `analyze_escape`) and the call-site engine's source-folding
    // both have something to pull against from the very first pass.
    let seed = Environment::empty().assign(escape, &[], TaintTree::leaf(Kind::LocalReturn), false);

    let mut in_states: Vec<Environment> = vec![Environment::empty(); cfg.nodes.len()];
    let mut visits = vec![0usize; cfg.nodes.len()];

    let order = reverse_postorder(cfg);
    let mut queued = vec![true; cfg.nodes.len()];
    let mut worklist: VecDeque<usize> = order.into_iter().collect();

    while let Some(node) = worklist.pop_front() {
        queued[node] = false;

        let mut out = if node == cfg.exit { seed.clone() } else { Environment::empty() };
        for succ in cfg.successors(node) {
            out = out.join(&in_states[succ]);
        }

        let new_in = analyze_node(&cfg.nodes[node], &out, &ctx);
        let converged = visits[node] > 0 && new_in.less_or_equal(&in_states[node]) && in_states[node].less_or_equal(&new_in);
        if converged {
            continue;
        }

        visits[node] += 1;
        in_states[node] = if visits[node] > VISIT_CAP {
            in_states[node].widen(&new_in).collapse_roots_to_depth(POST_CAP_COLLAPSE_DEPTH)
        } else {
            in_states[node].join(&new_in)
        };

        for pred in cfg.predecessors(node) {
            if !queued[pred] {
                queued[pred] = true;
                worklist.push_back(pred);
            }
        }
    }

    extract_model(&in_states[cfg.entry], function, &escape_root(function))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taint_core::cfg::{CfgNode, Expression, Parameter, Statement};
    use taint_core::resolver::{CallTarget, QualifiedName, ResolvedType};

    use crate::environment::Root;
    use crate::leaf_set::Kind;
    use crate::model::Model;

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

    struct NoTargets;
    impl CallTargetResolver for NoTargets {
        fn call_targets(&self, _callee: &Expression) -> Vec<(CallTarget, bool)> {
            Vec::new()
        }
    }

    struct NoModel;
    impl ModelLookup for NoModel {
        fn lookup(&self, _target: &str) -> Option<Model> {
            None
        }
    }

    struct SingleTarget(&'static str);
    impl CallTargetResolver for SingleTarget {
        fn call_targets(&self, _callee: &Expression) -> Vec<(CallTarget, bool)> {
            vec![(CallTarget { qualified_name: self.0.to_string(), is_override: false }, false)]
        }
    }

    struct FixedModel(Model);
    impl ModelLookup for FixedModel {
        fn lookup(&self, _target: &str) -> Option<Model> {
            Some(self.0.clone())
        }
    }

    fn linear_cfg(statements: Vec<Statement>) -> ControlFlowGraph {
        let statements = statements
            .into_iter()
            .map(|statement| taint_core::cfg::LocatedStatement { statement, location: Location::default() })
            .collect();
        ControlFlowGraph { nodes: vec![CfgNode { statements }], edges: Vec::new(), entry: 0, exit: 0 }
    }

    #[test]
    fn identity_function_infers_tito_for_its_parameter() {
        let function = FunctionContext {
            name: "f".to_string(),
            parameters: vec![Parameter { name: "x".to_string(), position: 0, is_named: false, declared_type: None }],
            cfg: linear_cfg(vec![Statement::Return(Some(Expression::Name("x".into())))]),
        };

        let model = analyze_function(&function, &StubResolver, &NoTargets, &NoModel);

        let root = Root::PositionalParameter { position: 0, name: "x".into() };
        assert!(model.taint_in_taint_out.tree_for(&root).collapse().contains_kind(&Kind::LocalReturn));
    }

    #[test]
    fn sink_pass_through_infers_sink_taint_for_the_argument() {
        let mut sink_model = Model::empty();
        sink_model.sink_taint = sink_model.sink_taint.assign(
            Root::PositionalParameter { position: 0, name: "p".into() },
            &[],
            TaintTree::leaf(Kind::named("Test")),
            false,
        );

        let function = FunctionContext {
            name: "g".to_string(),
            parameters: vec![Parameter { name: "x".to_string(), position: 0, is_named: false, declared_type: None }],
            cfg: linear_cfg(vec![Statement::Expr(Expression::Call {
                callee: Box::new(Expression::Name("sink".into())),
                args: vec![taint_core::cfg::Argument { value: Expression::Name("x".into()), keyword: None, is_starred: false }],
            })]),
        };

        let call_targets = SingleTarget("sink");
        let models = FixedModel(sink_model);
        let model = analyze_function(&function, &StubResolver, &call_targets, &models);

        let root = Root::PositionalParameter { position: 0, name: "x".into() };
        assert!(model.sink_taint.tree_for(&root).collapse().contains_kind(&Kind::named("Test")));
    }

    #[test]
    fn constructor_assignment_to_self_field_infers_tito_with_return_access_path() {
        let function = FunctionContext {
            name: "__init__".to_string(),
            parameters: vec![
                Parameter { name: "self".to_string(), position: 0, is_named: false, declared_type: None },
                Parameter { name: "x".to_string(), position: 1, is_named: false, declared_type: None },
            ],
            cfg: linear_cfg(vec![Statement::Assign {
                target: Expression::Attribute { value: Box::new(Expression::Name("self".into())), attr: "y".into() },
                value: Expression::Name("x".into()),
            }]),
        };

        let model = analyze_function(&function, &StubResolver, &NoTargets, &NoModel);

        let root = Root::PositionalParameter { position: 1, name: "x".into() };
        assert!(model.taint_in_taint_out.tree_for(&root).collapse().contains_kind(&Kind::LocalReturn));
    }

    #[test]
    fn unreachable_entry_yields_empty_model() {
        let mut cfg = linear_cfg(vec![Statement::Identity]);
        cfg.nodes.push(CfgNode::default());
        cfg.exit = 1;
        // entry=0, exit=1, no edge between them: exit can't walk back to entry.
        let function = FunctionContext { name: "f".to_string(), parameters: vec![], cfg };

        let model = analyze_function(&function, &StubResolver, &NoTargets, &NoModel);
        assert!(model.is_empty());
    }
}
