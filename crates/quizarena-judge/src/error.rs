//! Error types for the judge layer.

/// Errors from the external judge.
///
/// All of these map onto the `UpstreamUnavailable` taxonomy entry: the
/// engines degrade (fallback judge) rather than failing the round.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    /// The judge API could not be reached or rejected the request.
    #[error("judge unavailable: {0}")]
    Unavailable(String),

    /// Polling for a result exceeded the budget.
    #[error("judge timed out after {0} seconds")]
    Timeout(u64),

    /// The submitted language has no judge mapping.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}
