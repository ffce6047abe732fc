//! Cache store error types.

use crate::entry::{CacheKey, StoredResult};

/// Errors raised by cache store operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A commit carried a different result under an identical key.
    ///
    /// Identical (item, scope, fingerprint) means the same unit of work,
    /// so two honest completions must agree; disagreement signals a bug
    /// and must never silently overwrite.
    #[error("conflicting results committed for {key}: {existing:?} vs {incoming:?}")]
    Inconsistent {
        key: CacheKey,
        existing: Box<StoredResult>,
        incoming: Box<StoredResult>,
    },

    /// Backend I/O failure.
    #[error("cache store I/O error at {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted entry could not be decoded.
    #[error("corrupt cache entry at {context}")]
    Corrupt {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
