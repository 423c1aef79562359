//! Document store trait and structured error types.
//!
//! The `DocumentStore` trait abstracts over the backing store so the engine can
//! run against a hosted document database, a JSON fixture directory, or a test
//! double. The store handle is constructed by the caller and passed in; the
//! engine holds no global client.

use thiserror::Error;

use super::document::{Collection, Document, Query};

/// Failure taxonomy of the backing store.
///
/// None of these are fatal to analytics: the fetch ladder turns each into either
/// an empty tier result or a move to the next tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("permission denied reading '{collection}'")]
    PermissionDenied { collection: Collection },

    #[error("query on '{collection}' requires a composite index: {detail}")]
    IndexUnavailable {
        collection: Collection,
        detail: String,
    },

    #[error("collection '{collection}' not found")]
    NotFound { collection: Collection },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Errors that end the ladder with an empty result instead of trying the next tier.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Short label used in fetch reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "permission_denied",
            Self::IndexUnavailable { .. } => "index_unavailable",
            Self::NotFound { .. } => "not_found",
            Self::InvalidQuery(_) => "invalid_query",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Read-only access to a document store.
///
/// Implementations evaluate the whole query (filters, order, limit) server-side
/// and are free to reject shapes they cannot serve, typically with
/// `IndexUnavailable`. The engine never calls anything that writes.
pub trait DocumentStore: Send + Sync {
    /// Human-readable name of this store.
    fn name(&self) -> &str;

    /// Run a query and return matching documents in the requested order.
    fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Point read by document id. `Ok(None)` if the document does not exist.
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        (**self).run_query(query)
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        (**self).get(collection, id)
    }
}
