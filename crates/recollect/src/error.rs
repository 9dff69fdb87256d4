use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by session-engine operations.
///
/// Transient oracle failures (query expansion, cluster labeling, question
/// synthesis) are recovered in place with per-context fallbacks and never
/// reach this enum; what does reach it is either caller error or a hard
/// dependency failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was well-formed but not valid for the session's current
    /// state: bad cluster id, unknown backtrack node, answer with no pending
    /// question, help after the question budget is spent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No session with the given id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The vector store returned zero hits for a new search.
    #[error("no results found for query: {0}")]
    NoResults(String),

    /// An embedding or vector-store call failed and the operation could not
    /// proceed without it.
    #[error("oracle unavailable: {0:#}")]
    Oracle(#[source] anyhow::Error),

    /// An internal invariant was violated (missing snapshot, label length
    /// mismatch). Indicates a bug, not caller error.
    #[error("internal error: {0}")]
    Internal(String),
}
