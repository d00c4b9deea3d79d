use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all Galleon operations.
#[derive(Debug, Error, Diagnostic)]
pub enum GalleonError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed caller input (unknown required id, bad range syntax,
    /// inconsistent behavior flags).
    #[error("Invalid resolver input: {message}")]
    #[diagnostic(help("Check the requested package ids and version ranges"))]
    Input { message: String },

    /// Malformed version or range text.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// No solution exists. The message is the diagnostic engine's
    /// explanation and is the only user-visible output for this case.
    #[error("Unable to resolve dependencies: {message}")]
    Constraint { message: String },

    /// Network request to a remote metadata source failed. The walker
    /// retries these once, then counts the lookup as "no match".
    #[error("Network error: {message}")]
    Network { message: String },

    /// The resolution was cancelled via its [`CancelToken`].
    ///
    /// [`CancelToken`]: crate::cancel::CancelToken
    #[error("Resolution cancelled")]
    Cancelled,

    /// The conflict-resolution fixpoint did not stabilize within its
    /// iteration budget.
    #[error("Dependency resolution did not converge after {iterations} iterations")]
    DidNotConverge { iterations: usize },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

impl GalleonError {
    /// Whether the walker may retry the operation that produced this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, GalleonError::Network { .. })
    }
}

/// Convenience alias for `miette::Result<T>`.
pub type GalleonResult<T> = miette::Result<T>;
