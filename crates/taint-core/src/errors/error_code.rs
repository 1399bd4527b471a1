//! Stable error codes, independent of the `Display` message.

pub const INVALID_MODEL: &str = "TAINT_INVALID_MODEL";
pub const ANALYSIS_NO_ENTRY: &str = "TAINT_ANALYSIS_NO_ENTRY";
pub const TRANSFER_UNKNOWN_NODE: &str = "TAINT_TRANSFER_UNKNOWN_NODE";
pub const CONFIGURATION_MISMATCH: &str = "TAINT_CONFIGURATION_MISMATCH";

/// Implemented by every error enum in the engine so callers can key metrics
/// or suppressions off a stable code rather than parsing `Display` output.
pub trait ErrorCode {
    fn error_code(&self) -> &'static str;
}
