//! Error taxonomy for the taint analysis engine.

mod error_code;

pub use error_code::ErrorCode;

/// Errors that can occur in the taint analysis core.
///
/// `InvalidModel` and `ConfigurationMismatch` abort the caller's current
/// operation (model parsing is all-or-nothing); `AnalysisNoEntry` and
/// `TransferUnknownNode` are never returned as hard failures from
/// `analyze_function` — they are logged via `tracing` and the analysis
/// falls back to an empty model or identity transfer respectively. The
/// variants exist here so callers that *do* want to observe them (tests,
/// diagnostics tooling) have a typed handle instead of scraping log lines.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid model for `{callable}`: {message}")]
    InvalidModel { callable: String, message: String },

    #[error("function `{callable}` produced no entry state (unreachable body)")]
    AnalysisNoEntry { callable: String },

    #[error("unrecognized {node_kind} shape in `{callable}`: {detail}")]
    TransferUnknownNode {
        callable: String,
        node_kind: &'static str,
        detail: String,
    },

    #[error("model for `{callable}` references `{kind}`, which is outside the configured allow-list")]
    ConfigurationMismatch { callable: String, kind: String },
}

impl ErrorCode for AnalysisError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidModel { .. } => error_code::INVALID_MODEL,
            Self::AnalysisNoEntry { .. } => error_code::ANALYSIS_NO_ENTRY,
            Self::TransferUnknownNode { .. } => error_code::TRANSFER_UNKNOWN_NODE,
            Self::ConfigurationMismatch { .. } => error_code::CONFIGURATION_MISMATCH,
        }
    }
}
