//! Local file adapter.

use std::path::Path;

use async_trait::async_trait;

use super::StreamSource;
use crate::error::ResolutionError;
use crate::source::{SourceRef, StreamCandidate};

/// Format id offered for local files.
pub const LOCAL_FORMAT: &str = "file";

/// Serves files from the local disk as `file://` streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSource;

#[async_trait]
impl StreamSource for LocalFileSource {
    async fn candidates(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<StreamCandidate>, ResolutionError> {
        let path = Path::new(&source.id);
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ResolutionError::fetch(&source.id, e))?;

        if !metadata.is_file() {
            return Err(ResolutionError::invalid(&source.id, "not a regular file"));
        }

        let absolute = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| ResolutionError::fetch(&source.id, e))?;

        Ok(vec![
            StreamCandidate::new(LOCAL_FORMAT, format!("file://{}", absolute.display()))
                .with_length(Some(metadata.len())),
        ])
    }
}
