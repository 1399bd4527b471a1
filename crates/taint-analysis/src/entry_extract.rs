//! Entry extraction. Once the per-function fixpoint reports the entry
//! node's environment, split it into the model this callable publishes:
//! per-parameter sink/TITO summaries, plus a source summary at the
//! function's escape root.

use taint_core::cfg::{FunctionContext, Parameter};

use crate::environment::{Environment, Root};
use crate::leaf_set::{Kind, SimpleFeature};
use crate::model::Model;
use crate::tree::TaintTree;

/// Above this many raw paths, a candidate TITO tree is collapsed to depth
/// 0 rather than published with full structure.
const TITO_MAX_RAW_PATHS: usize = 5;

pub(crate) fn root_for_parameter(parameter: &Parameter) -> Root {
    if parameter.is_named {
        Root::NamedParameter(parameter.name.clone())
    } else {
        Root::PositionalParameter { position: parameter.position, name: parameter.name.clone() }
    }
}

/// `shape(essential(t))` is a no-op on `t` itself; it earns its keep once a
/// partition has pruned a tree's leaves but left intermediate nodes behind
/// — running it back through its own skeleton drops those now-pointless
/// branches.
fn simplify(tree: &TaintTree) -> TaintTree {
    tree.shape(&tree.essential())
}

pub fn extract_model(entry_env: &Environment, function: &FunctionContext, escape_root: &Root) -> Model {
    let mut model = Model::empty();

    for parameter in &function.parameters {
        let root = root_for_parameter(parameter);
        debug_assert!(root.is_parameter(), "root_for_parameter must only ever produce a parameter root");
        let tree = entry_env.tree_for(&root);
        if tree.is_empty() {
            continue;
        }

        let parts = tree.partition(&|kind: &Kind| Some(kind.is_local_return()));
        let tito_candidate = parts.get(&true).cloned().unwrap_or_default();
        let mut sink_tree = simplify(&parts.get(&false).cloned().unwrap_or_default());

        if let Some(declared_type) = &parameter.declared_type {
            sink_tree = sink_tree.stamp_simple_feature(&SimpleFeature::Breadcrumb(format!("type:{declared_type}")));
        }

        let tito_tree = if tito_candidate.raw_path_count() > TITO_MAX_RAW_PATHS {
            tito_candidate.collapse_to_depth(0)
        } else {
            simplify(&tito_candidate)
        };

        if !sink_tree.is_empty() {
            model.sink_taint = model.sink_taint.assign(root.clone(), &[], sink_tree, true);
        }
        if !tito_tree.is_empty() {
            model.taint_in_taint_out = model.taint_in_taint_out.assign(root, &[], tito_tree, true);
        }
    }

    let escape_tree = entry_env.tree_for(escape_root);
    if !escape_tree.is_empty() {
        let parts = escape_tree.partition(&|kind: &Kind| (!kind.is_local_return()).then_some(()));
        if let Some(source_tree) = parts.get(&()) {
            if !source_tree.is_empty() {
                model.source_taint = model.source_taint.assign(Root::LocalResult, &[], source_tree.clone(), true);
            }
        }
    }

    model
}
