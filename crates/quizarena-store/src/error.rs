//! Error types for the store layer.

/// Errors from the persistence collaborator.
///
/// The engines map these onto the user-visible taxonomy: `NotFound` and
/// `Conflict` become error events, `Unavailable` aborts the attempted
/// transition without touching in-memory state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The write conflicts with existing state (duplicate membership,
    /// insufficient challenges, already-completed battle).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store cannot be reached. The initiating transition
    /// must be aborted, not partially applied.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from a question source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source produced fewer questions than requested.
    #[error("insufficient questions: wanted {wanted}, got {got}")]
    Insufficient { wanted: usize, got: usize },

    /// The source (e.g. the external generator) cannot be reached.
    #[error("question source unavailable: {0}")]
    Unavailable(String),
}
