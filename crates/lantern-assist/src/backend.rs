use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{AssistError, ImportRecord, Inspection, ResponseFormat};

/// A request to inspect a span of a document.
#[derive(Debug, Clone)]
pub struct InspectionRequest {
    pub path: PathBuf,
    /// Code body in the backend's [`ResponseFormat`]: line-numbered for JSON, comment-free
    /// for the tagged grammar.
    pub code: String,
    /// Findings the backend already reported, so follow-up requests can skip them.
    pub existing: Vec<Inspection>,
}

/// The remote assistant answering import and inspection queries.
#[async_trait]
pub trait AssistBackend: Send + Sync {
    /// Import statements reachable from the document at `path`.
    ///
    /// An empty list means "nothing available" and is a valid answer.
    async fn resolve_imports(
        &self,
        path: &Path,
        cancel: CancellationToken,
    ) -> Result<Vec<ImportRecord>, AssistError>;

    /// Raw inspection response text.
    async fn run_inspection(
        &self,
        request: InspectionRequest,
        cancel: CancellationToken,
    ) -> Result<String, AssistError>;

    fn response_format(&self) -> ResponseFormat {
        ResponseFormat::Json
    }
}
