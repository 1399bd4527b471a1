//! The model declaration grammar. Line forms:
//!
//! ```text
//! def qualified.name(param: TaintSink[Kind], other: TaintInTaintOut) -> TaintSource[Kind]: ...
//! class qualified.Name(TaintSink[Kind]): ...
//!     def method(self, arg): ...
//! name: TaintSource[Kind] = ...
//! SkipAnalysis: qualified.name
//! Sanitize: qualified.name
//! ```
//!
//! `Union[...]` composes any of `TaintSource[...]`/`TaintSink[...]`/
//! `TaintInTaintOut` on a single parameter or return position. Each kind may
//! carry a `Via[feature, ...]` clause, validated against the configured
//! feature allow-list. A class declaration applies its sink annotation to
//! every parameter of every method nested under it (by indentation); a
//! bare module-level assignment attaches its annotation to a synthesized
//! `$global` target at `name`. Parsing is all-or-nothing: the first
//! malformed line or out-of-allow-list kind name aborts the whole parse.

use taint_core::config::Configuration;
use taint_core::errors::AnalysisError;
use taint_core::resolver::Resolver;
use taint_core::FxHashMap;

use crate::environment::Root;
use crate::leaf_set::{Kind, SimpleFeature};
use crate::model::{model_merge, Model, Mode};
use crate::tree::TaintTree;

/// The root every module-level annotation is keyed under.
const GLOBAL_TARGET: &str = "$global";

enum AnnotationKind {
    Source(String, Vec<String>),
    Sink(String, Vec<String>),
    Tito(Vec<String>),
}

fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Separate a bracket's top-level parts into plain kind names and the
/// feature names named by any `Via[...]` clause among them. At most one
/// `Via[...]` clause is expected; a second is folded into the same list.
fn split_via(parts: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut kinds = Vec::new();
    let mut features = Vec::new();
    for part in parts {
        if let Some(inner) = part.strip_prefix("Via[").and_then(|rest| rest.strip_suffix(']')) {
            features.extend(split_top_level(inner));
        } else {
            kinds.push(part);
        }
    }
    (kinds, features)
}

fn validate_features(features: &[String], configuration: &Configuration, callable: &str) -> Result<(), AnalysisError> {
    for feature in features {
        if !configuration.is_known_feature(feature) {
            return Err(AnalysisError::ConfigurationMismatch { callable: callable.to_string(), kind: feature.clone() });
        }
    }
    Ok(())
}

/// Stamp a `via:{feature}` breadcrumb on every leaf of `tree`, mirroring
/// the `type:{declared_type}` breadcrumb convention used for parameter
/// types.
fn stamp_via_features(tree: TaintTree, features: &[String]) -> TaintTree {
    features.iter().fold(tree, |tree, feature| {
        tree.stamp_simple_feature(&SimpleFeature::Breadcrumb(format!("via:{feature}")))
    })
}

fn parse_annotation(text: &str, callable: &str) -> Result<Vec<AnnotationKind>, AnalysisError> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix("Union[").and_then(|rest| rest.strip_suffix(']')) {
        let mut all = Vec::new();
        for part in split_top_level(inner) {
            all.extend(parse_annotation(&part, callable)?);
        }
        return Ok(all);
    }
    if let Some(inner) = text.strip_prefix("TaintSource[").and_then(|rest| rest.strip_suffix(']')) {
        let (kinds, features) = split_via(split_top_level(inner));
        return Ok(kinds.into_iter().map(|kind| AnnotationKind::Source(kind, features.clone())).collect());
    }
    if let Some(inner) = text.strip_prefix("TaintSink[").and_then(|rest| rest.strip_suffix(']')) {
        let (kinds, features) = split_via(split_top_level(inner));
        return Ok(kinds.into_iter().map(|kind| AnnotationKind::Sink(kind, features.clone())).collect());
    }
    if text == "TaintInTaintOut" {
        return Ok(vec![AnnotationKind::Tito(Vec::new())]);
    }
    if let Some(inner) = text.strip_prefix("TaintInTaintOut[").and_then(|rest| rest.strip_suffix(']')) {
        let (kinds, features) = split_via(split_top_level(inner));
        return match kinds.as_slice() {
            [] => Ok(vec![AnnotationKind::Tito(features)]),
            [kind] if kind == "LocalReturn" => Ok(vec![AnnotationKind::Tito(features)]),
            [other] => Err(AnalysisError::InvalidModel {
                callable: callable.to_string(),
                message: format!("`TaintInTaintOut[{other}]` is not a recognized TITO target"),
            }),
            _ => Err(AnalysisError::InvalidModel {
                callable: callable.to_string(),
                message: format!("`TaintInTaintOut[{text}]` names more than one target"),
            }),
        };
    }
    Err(AnalysisError::InvalidModel { callable: callable.to_string(), message: format!("unrecognized annotation `{text}`") })
}

fn apply_parameter_annotation(
    model: &mut Model,
    root: Root,
    text: &str,
    configuration: &Configuration,
    callable: &str,
) -> Result<(), AnalysisError> {
    for kind in parse_annotation(text, callable)? {
        match kind {
            AnnotationKind::Sink(name, features) => {
                if !configuration.is_known_sink(&name) {
                    return Err(AnalysisError::ConfigurationMismatch { callable: callable.to_string(), kind: name });
                }
                validate_features(&features, configuration, callable)?;
                let leaf = stamp_via_features(TaintTree::leaf(Kind::named(name)), &features);
                model.sink_taint = model.sink_taint.assign(root.clone(), &[], leaf, true);
            }
            AnnotationKind::Tito(features) => {
                validate_features(&features, configuration, callable)?;
                let leaf = stamp_via_features(TaintTree::leaf(Kind::LocalReturn), &features);
                model.taint_in_taint_out = model.taint_in_taint_out.assign(root.clone(), &[], leaf, true);
            }
            AnnotationKind::Source(name, _) => {
                return Err(AnalysisError::InvalidModel {
                    callable: callable.to_string(),
                    message: format!("`TaintSource[{name}]` is not valid on a parameter"),
                });
            }
        }
    }
    Ok(())
}

fn apply_return_annotation(
    model: &mut Model,
    text: &str,
    configuration: &Configuration,
    callable: &str,
) -> Result<(), AnalysisError> {
    for kind in parse_annotation(text, callable)? {
        match kind {
            AnnotationKind::Source(name, features) => {
                if !configuration.is_known_source(&name) {
                    return Err(AnalysisError::ConfigurationMismatch { callable: callable.to_string(), kind: name });
                }
                validate_features(&features, configuration, callable)?;
                let leaf = stamp_via_features(TaintTree::leaf(Kind::named(name)), &features);
                model.source_taint = model.source_taint.assign(Root::LocalResult, &[], leaf, true);
            }
            AnnotationKind::Sink(name, _) => {
                return Err(AnalysisError::InvalidModel {
                    callable: callable.to_string(),
                    message: format!("`TaintSink[{name}]` is not valid on a return annotation"),
                });
            }
            AnnotationKind::Tito(_) => {
                return Err(AnalysisError::InvalidModel {
                    callable: callable.to_string(),
                    message: "`TaintInTaintOut` is not valid on a return annotation".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Apply a `TaintSource`/`TaintSink` annotation to the synthesized
/// `$global` target's `name` root. `TaintInTaintOut` has no meaning on a
/// module-level value, since there is no call boundary for it to cross.
fn apply_global_annotation(
    model: &mut Model,
    name: &str,
    text: &str,
    configuration: &Configuration,
    callable: &str,
) -> Result<(), AnalysisError> {
    let root = Root::NamedParameter(name.to_string());
    for kind in parse_annotation(text, callable)? {
        match kind {
            AnnotationKind::Source(kind_name, features) => {
                if !configuration.is_known_source(&kind_name) {
                    return Err(AnalysisError::ConfigurationMismatch { callable: callable.to_string(), kind: kind_name });
                }
                validate_features(&features, configuration, callable)?;
                let leaf = stamp_via_features(TaintTree::leaf(Kind::named(kind_name)), &features);
                model.source_taint = model.source_taint.assign(root.clone(), &[], leaf, true);
            }
            AnnotationKind::Sink(kind_name, features) => {
                if !configuration.is_known_sink(&kind_name) {
                    return Err(AnalysisError::ConfigurationMismatch { callable: callable.to_string(), kind: kind_name });
                }
                validate_features(&features, configuration, callable)?;
                let leaf = stamp_via_features(TaintTree::leaf(Kind::named(kind_name)), &features);
                model.sink_taint = model.sink_taint.assign(root.clone(), &[], leaf, true);
            }
            AnnotationKind::Tito(_) => {
                return Err(AnalysisError::InvalidModel {
                    callable: callable.to_string(),
                    message: "`TaintInTaintOut` is not valid on a module-level declaration".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn parse_def(rest: &str, callable_hint: &str, configuration: &Configuration) -> Result<(String, Model), AnalysisError> {
    let open = rest.find('(').ok_or_else(|| AnalysisError::InvalidModel {
        callable: callable_hint.to_string(),
        message: "expected `(` after callable name".to_string(),
    })?;
    let close = rest.rfind(')').ok_or_else(|| AnalysisError::InvalidModel {
        callable: callable_hint.to_string(),
        message: "expected a closing `)`".to_string(),
    })?;
    if close < open {
        return Err(AnalysisError::InvalidModel { callable: callable_hint.to_string(), message: "malformed parameter list".to_string() });
    }

    let name = rest[..open].trim().to_string();
    if name.is_empty() {
        return Err(AnalysisError::InvalidModel { callable: callable_hint.to_string(), message: "missing callable name".to_string() });
    }
    let params_str = &rest[open + 1..close];
    let trailer = rest[close + 1..].trim().trim_end_matches(':').trim_end_matches("...").trim();

    let mut model = Model::empty();

    for (position, raw_param) in split_top_level(params_str).into_iter().enumerate() {
        if raw_param.is_empty() {
            continue;
        }
        let raw_param = raw_param.split('=').next().unwrap_or(&raw_param).trim();
        let Some((param_name, annotation)) = raw_param.split_once(':') else { continue };
        let param_name = param_name.trim().to_string();
        let root = Root::PositionalParameter { position, name: param_name };
        apply_parameter_annotation(&mut model, root, annotation.trim(), configuration, &name)?;
    }

    if let Some(return_annotation) = trailer.strip_prefix("->") {
        apply_return_annotation(&mut model, return_annotation.trim(), configuration, &name)?;
    }

    Ok((name, model))
}

fn upsert(models: &mut FxHashMap<String, Model>, target: String, model: Model) {
    models
        .entry(target)
        .and_modify(|existing| *existing = model_merge(existing, &model))
        .or_insert(model);
}

/// A class declaration's sink annotation, applied to every parameter of
/// every method lexically nested beneath it until a line returns to the
/// class's own indentation (or shallower).
struct OpenClass {
    indent: usize,
    annotation: String,
    callable_hint: String,
}

/// Apply a class-level sink annotation to every parameter of a nested
/// method (including `self`/`cls`), by position, the same way a direct
/// per-parameter declaration would.
fn apply_class_annotation_to_method(
    model: &mut Model,
    parameter_names: &[String],
    annotation: &str,
    configuration: &Configuration,
    callable: &str,
) -> Result<(), AnalysisError> {
    for (position, name) in parameter_names.iter().enumerate() {
        let root = Root::PositionalParameter { position, name: name.clone() };
        apply_parameter_annotation(model, root, annotation, configuration, callable)?;
    }
    Ok(())
}

fn indent_of(raw_line: &str) -> usize {
    raw_line.len() - raw_line.trim_start().len()
}

/// Parse every declaration in `source`, merging repeated declarations of
/// the same target. Class bodies and their nested methods are tracked
/// purely by indentation, so `resolver` currently goes unused; it is kept
/// on the signature for parity with `Resolver::class_definition`, in case
/// a future grammar needs it to resolve a class's qualified name from a
/// partial reference instead of taking the declared name literally.
pub fn parse_models(
    source: &str,
    _resolver: &dyn Resolver,
    configuration: &Configuration,
) -> Result<FxHashMap<String, Model>, AnalysisError> {
    let mut models: FxHashMap<String, Model> = FxHashMap::default();
    let mut open_class: Option<OpenClass> = None;

    for (line_no, raw_line) in source.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let callable_hint = format!("<line {}>", line_no + 1);
        let indent = indent_of(raw_line);

        if let Some(open) = &open_class {
            if indent <= open.indent {
                open_class = None;
            }
        }

        if let Some(target) = line.strip_prefix("SkipAnalysis:") {
            upsert(&mut models, target.trim().to_string(), Model { mode: Mode::SkipAnalysis, ..Model::empty() });
            continue;
        }
        if let Some(target) = line.strip_prefix("Sanitize:") {
            upsert(&mut models, target.trim().to_string(), Model { mode: Mode::Sanitize, ..Model::empty() });
            continue;
        }
        if let Some(rest) = line.strip_prefix("class ") {
            let header = rest.trim_end().trim_end_matches(':');
            let open = header.find('(').ok_or_else(|| AnalysisError::InvalidModel {
                callable: callable_hint.clone(),
                message: "expected a `TaintSink[...]` base after the class name".to_string(),
            })?;
            let close = header.rfind(')').ok_or_else(|| AnalysisError::InvalidModel {
                callable: callable_hint.clone(),
                message: "expected a closing `)` in the class declaration".to_string(),
            })?;
            let annotation = header[open + 1..close].trim().to_string();
            // Validate eagerly against a zero-parameter callable so a
            // malformed or out-of-allow-list annotation fails at the class
            // line rather than silently at its first method.
            apply_parameter_annotation(&mut Model::empty(), Root::LocalResult, &annotation, configuration, &callable_hint)?;
            open_class = Some(OpenClass { indent, annotation, callable_hint: callable_hint.clone() });
            continue;
        }
        if let Some(rest) = line.strip_prefix("def ") {
            let (target, mut model) = parse_def(rest, &callable_hint, configuration)?;
            if let Some(open) = &open_class {
                let parameter_names: Vec<String> = rest
                    .find('(')
                    .zip(rest.rfind(')'))
                    .map(|(o, c)| {
                        split_top_level(&rest[o + 1..c])
                            .into_iter()
                            .filter(|p| !p.is_empty())
                            .map(|p| p.split('=').next().unwrap_or(&p).trim().split(':').next().unwrap_or("").trim().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                apply_class_annotation_to_method(&mut model, &parameter_names, &open.annotation, configuration, &open.callable_hint)?;
            }
            upsert(&mut models, target, model);
            continue;
        }
        if let Some((name, rest)) = line.split_once(':') {
            if let Some(annotation) = rest.split('=').next() {
                let name = name.trim();
                let annotation = annotation.trim();
                if !name.is_empty() && !annotation.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
                    let mut model = Model::empty();
                    apply_global_annotation(&mut model, GLOBAL_TARGET, annotation, configuration, name)?;
                    upsert(&mut models, name.to_string(), model);
                    continue;
                }
            }
        }
        return Err(AnalysisError::InvalidModel { callable: callable_hint, message: format!("unrecognized declaration: `{line}`") });
    }

    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taint_core::resolver::{CallTarget, QualifiedName, ResolvedType};
    use taint_core::cfg::Expression;

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
    impl taint_core::resolver::CallTargetResolver for StubResolver {
        fn call_targets(&self, _callee: &Expression) -> Vec<(CallTarget, bool)> {
            Vec::new()
        }
    }

    fn configuration() -> Configuration {
        Configuration {
            sources: vec!["UserControlled".into()],
            sinks: vec!["RemoteCodeExecution".into()],
            features: vec!["always-via-cache".into()],
            rules: vec![],
            well_known_sinks: vec![],
        }
    }

    #[test]
    fn parses_sink_parameter_and_return_source() {
        let source = "def os.system(command: TaintSink[RemoteCodeExecution]): ...\ndef json.loads(data) -> TaintSource[UserControlled]: ...";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        let system = &models["os.system"];
        assert!(!system.sink_taint.is_empty());
        let loads = &models["json.loads"];
        assert!(!loads.source_taint.is_empty());
    }

    #[test]
    fn parses_tito_and_union() {
        let source = "def helper.identity(x: Union[TaintInTaintOut, TaintSink[RemoteCodeExecution]]): ...";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        let model = &models["helper.identity"];
        assert!(!model.taint_in_taint_out.is_empty());
        assert!(!model.sink_taint.is_empty());
    }

    #[test]
    fn skip_analysis_and_sanitize_lines() {
        let source = "SkipAnalysis: legacy.unsafe\nSanitize: trusted.clean";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        assert_eq!(models["legacy.unsafe"].mode, Mode::SkipAnalysis);
        assert_eq!(models["trusted.clean"].mode, Mode::Sanitize);
    }

    #[test]
    fn unknown_sink_kind_is_configuration_mismatch() {
        let source = "def os.system(command: TaintSink[NotConfigured]): ...";
        let err = parse_models(source, &StubResolver, &configuration()).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn source_annotation_on_parameter_is_invalid() {
        let source = "def os.system(command: TaintSource[UserControlled]): ...";
        let err = parse_models(source, &StubResolver, &configuration()).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidModel { .. }));
    }

    #[test]
    fn repeated_declarations_merge() {
        let source = "def a.b(x: TaintSink[RemoteCodeExecution]): ...\ndef a.b(y: TaintInTaintOut): ...";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        let model = &models["a.b"];
        assert!(!model.sink_taint.is_empty());
        assert!(!model.taint_in_taint_out.is_empty());
    }

    #[test]
    fn via_clause_stamps_a_breadcrumb_and_validates_the_feature() {
        let source = "def os.system(command: TaintSink[RemoteCodeExecution, Via[always-via-cache]]): ...";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        let tree = models["os.system"]
            .sink_taint
            .tree_for(&Root::PositionalParameter { position: 0, name: "command".into() })
            .collapse();
        assert!(tree.contains_kind(&Kind::named("RemoteCodeExecution")));
        let features = tree.features_for(&Kind::named("RemoteCodeExecution")).unwrap();
        assert!(features.simple.contains(&crate::leaf_set::SimpleFeature::Breadcrumb("via:always-via-cache".to_string())));
    }

    #[test]
    fn via_clause_with_unknown_feature_is_configuration_mismatch() {
        let source = "def os.system(command: TaintSink[RemoteCodeExecution, Via[not-configured]]): ...";
        let err = parse_models(source, &StubResolver, &configuration()).unwrap_err();
        match err {
            AnalysisError::ConfigurationMismatch { kind, .. } => assert_eq!(kind, "not-configured"),
            other => panic!("expected ConfigurationMismatch, got {other:?}"),
        }
    }

    #[test]
    fn bracketed_tito_defaults_to_local_return() {
        let source = "def helper.identity(x: TaintInTaintOut[LocalReturn]): ...";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        assert!(!models["helper.identity"].taint_in_taint_out.is_empty());
    }

    #[test]
    fn bracketed_tito_with_unrecognized_target_is_invalid() {
        let source = "def helper.identity(x: TaintInTaintOut[SomethingElse]): ...";
        let err = parse_models(source, &StubResolver, &configuration()).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidModel { .. }));
    }

    #[test]
    fn class_sink_annotation_applies_to_every_method_parameter() {
        let source = "class db.Cursor(TaintSink[RemoteCodeExecution]):\n    def db.Cursor.execute(self, query): ...\n";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        let model = &models["db.Cursor.execute"];
        assert!(model.sink_taint.tree_for(&Root::PositionalParameter { position: 0, name: "self".into() }).collapse().contains_kind(&Kind::named("RemoteCodeExecution")));
        assert!(model.sink_taint.tree_for(&Root::PositionalParameter { position: 1, name: "query".into() }).collapse().contains_kind(&Kind::named("RemoteCodeExecution")));
    }

    #[test]
    fn class_annotation_does_not_apply_past_dedent() {
        let source = "class db.Cursor(TaintSink[RemoteCodeExecution]):\n    def db.Cursor.execute(self, query): ...\ndef other.function(x): ...\n";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        let model = &models["other.function"];
        assert!(model.sink_taint.is_empty());
    }

    #[test]
    fn module_level_assignment_declares_a_source() {
        let source = "request.GLOBAL_INPUT: TaintSource[UserControlled] = None";
        let models = parse_models(source, &StubResolver, &configuration()).unwrap();
        let model = &models["request.GLOBAL_INPUT"];
        assert!(model.source_taint.tree_for(&Root::NamedParameter(GLOBAL_TARGET.to_string())).collapse().contains_kind(&Kind::named("UserControlled")));
    }
}
