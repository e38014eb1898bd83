use async_trait::async_trait;
use std::fmt;

use crate::decoder::Document;
use crate::error::BackendResult;
use crate::query::QuerySpec;

/// Opaque handle resuming a paged query (a scroll id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Scroll ids can be kilobytes long
        if self.0.chars().count() > 24 {
            let head: String = self.0.chars().take(24).collect();
            write!(f, "{}…", head)
        } else {
            f.write_str(&self.0)
        }
    }
}

/// One page of hits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub documents: Vec<Document>,
    /// `None` means the backend has no further pages
    pub token: Option<ContinuationToken>,
    /// Total hit count, when the backend reports it
    pub total: Option<u64>,
}

impl ResultPage {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// The three requests the cursor needs from a search backend.
///
/// Wire formats are the implementation's business; the cursor only sees
/// pages and tokens.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Execute the query and return the first page
    async fn search(&self, spec: &QuerySpec) -> BackendResult<ResultPage>;

    /// Continue a paged query
    ///
    /// Re-issuing a token whose request failed must resume from the same
    /// position.
    async fn scroll(&self, token: &ContinuationToken, keep_alive: &str)
        -> BackendResult<ResultPage>;

    /// Release the server-side session behind `token`
    async fn clear(&self, token: &ContinuationToken) -> BackendResult<()>;

    /// Human-readable backend name
    fn backend_name(&self) -> &'static str;
}
