//! A callable's taint summary: what sinks its parameters reach, which
//! parameters flow through to the return value, and what sources its
//! result carries.

use crate::environment::{Environment, Root};

/// How a model's declared taint should be used instead of analyzing a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Analyze normally; this model is either inferred or a plain stub.
    Normal,
    /// Trust the declared model as-is; never run the fixpoint driver on
    /// this callable's body.
    SkipAnalysis,
    /// This callable scrubs all taint passing through it. A sanitizer's
    /// model carries no sink/source/TITO content by construction.
    Sanitize,
}

impl Mode {
    fn merge(self, other: Self) -> Self {
        use Mode::*;
        match (self, other) {
            (Sanitize, _) | (_, Sanitize) => Sanitize,
            (SkipAnalysis, _) | (_, SkipAnalysis) => SkipAnalysis,
            (Normal, Normal) => Normal,
        }
    }
}

/// A callable's taint summary. `sink_taint` and `taint_in_taint_out` are
/// keyed by parameter root; `source_taint` is keyed by `Root::LocalResult`
/// (and, for constructors, the escape root — `self`'s own parameter root).
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub sink_taint: Environment,
    pub taint_in_taint_out: Environment,
    pub source_taint: Environment,
    pub mode: Mode,
    /// True when no declaration or analysis produced a real model — the
    /// call-site engine must assume the worst (every argument reaches
    /// every sink).
    pub is_obscure: bool,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

impl Model {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn obscure() -> Self {
        Self { is_obscure: true, ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.sink_taint.is_empty() && self.taint_in_taint_out.is_empty() && self.source_taint.is_empty()
    }
}

/// Pointwise join of two models. Sanitization wins
/// unconditionally — joining anything with a sanitizer yields an empty,
/// `Sanitize`-mode model, since a sanitizer's guarantee ("nothing escapes
/// here") must not be diluted by a more permissive model for the same
/// target. `is_obscure` is the conjunction, not the union: once either
/// side supplies real declared or inferred content, the merged model is
/// better than a pure obscure fallback.
pub fn model_merge(a: &Model, b: &Model) -> Model {
    let mode = a.mode.merge(b.mode);
    if mode == Mode::Sanitize {
        return Model { mode, ..Model::empty() };
    }
    Model {
        sink_taint: a.sink_taint.join(&b.sink_taint),
        taint_in_taint_out: a.taint_in_taint_out.join(&b.taint_in_taint_out),
        source_taint: a.source_taint.join(&b.source_taint),
        mode,
        is_obscure: a.is_obscure && b.is_obscure,
    }
}
