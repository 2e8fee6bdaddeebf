//! Error types shared across the runtime.

use thiserror::Error;

/// Convenience alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, VitrineError>;

/// Errors surfaced by page registration, loading, and navigation.
#[derive(Debug, Error)]
pub enum VitrineError {
    /// A page id was registered twice. Reported at registration time.
    #[error("page `{0}` is already registered")]
    DuplicatePage(String),
    /// A navigation or preload request named an id that was never registered.
    #[error("page `{0}` is not registered")]
    UnknownPage(String),
    /// A page factory failed (or panicked) while constructing its page.
    #[error("construction of page `{page_id}` failed: {cause}")]
    Construction {
        /// Id of the page whose factory failed.
        page_id: String,
        /// Stringified failure cause reported by the factory.
        cause: String,
    },
    /// Internal bookkeeping was found in an impossible state.
    #[error("internal state error: {0}")]
    Internal(&'static str),
}

impl VitrineError {
    /// Builds a [`VitrineError::Construction`] from a page id and any cause.
    pub fn construction(page_id: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        VitrineError::Construction {
            page_id: page_id.into(),
            cause: cause.to_string(),
        }
    }
}
