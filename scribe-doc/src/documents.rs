//! The per-process document registry.
//!
//! Each document is backed by three change logs: body and properties
//! on the durable store, carets on the ephemeral store (presence data
//! a restart legitimately forgets). The registry guarantees at most
//! one coordinator bundle per document id.

use crate::control::DocControl;
use crate::error::DocError;
use otcore::{Body, Carets, DocumentId, FileId, FileStore, Flavor, Properties};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// The coordinator bundle for one document.
pub struct DocumentHandles {
    /// The document id.
    pub id: DocumentId,
    /// Rich-text contents.
    pub body: Arc<DocControl<Body>>,
    /// Per-session carets.
    pub carets: Arc<DocControl<Carets>>,
    /// Document metadata.
    pub properties: Arc<DocControl<Properties>>,
}

/// Registry of live documents.
pub struct Documents {
    durable: Arc<dyn FileStore>,
    ephemeral: Arc<dyn FileStore>,
    max_update_attempts: usize,
    docs: Mutex<HashMap<DocumentId, Arc<DocumentHandles>>>,
}

impl Documents {
    /// Create a registry over a durable store (body, properties) and
    /// an ephemeral one (carets).
    pub fn new(durable: Arc<dyn FileStore>, ephemeral: Arc<dyn FileStore>) -> Self {
        Self::with_max_update_attempts(
            durable,
            ephemeral,
            crate::control::DEFAULT_MAX_UPDATE_ATTEMPTS,
        )
    }

    /// Create a registry with an explicit update retry cap.
    pub fn with_max_update_attempts(
        durable: Arc<dyn FileStore>,
        ephemeral: Arc<dyn FileStore>,
        max_update_attempts: usize,
    ) -> Self {
        Self {
            durable,
            ephemeral,
            max_update_attempts,
            docs: Mutex::new(HashMap::new()),
        }
    }

    /// The coordinator bundle for a document, created on first use.
    /// Concurrent calls for the same id observe the same bundle.
    pub async fn document(&self, id: &DocumentId) -> Result<Arc<DocumentHandles>, DocError> {
        let mut docs = self.docs.lock().await;
        if let Some(handles) = docs.get(id) {
            return Ok(handles.clone());
        }
        info!(document = %id, "opening document coordinators");
        let body = self.open::<Body>(&self.durable, id).await?;
        let carets = self.open::<Carets>(&self.ephemeral, id).await?;
        let properties = self.open::<Properties>(&self.durable, id).await?;
        let handles = Arc::new(DocumentHandles {
            id: id.clone(),
            body,
            carets,
            properties,
        });
        docs.insert(id.clone(), handles.clone());
        Ok(handles)
    }

    /// Whether a document has durable state, without creating it.
    pub async fn exists(&self, id: &DocumentId) -> Result<bool, DocError> {
        Ok(self.durable.exists(&file_id::<Body>(id)).await?)
    }

    /// Delete a document: coordinators, caret state, and the whole
    /// durable history.
    pub async fn remove(&self, id: &DocumentId) -> Result<(), DocError> {
        self.docs.lock().await.remove(id);
        self.ephemeral.remove(&file_id::<Carets>(id)).await?;
        self.durable.remove(&file_id::<Body>(id)).await?;
        self.durable.remove(&file_id::<Properties>(id)).await?;
        info!(document = %id, "document deleted");
        Ok(())
    }

    /// How many documents have live coordinators.
    pub async fn active_count(&self) -> usize {
        self.docs.lock().await.len()
    }

    /// The durable store's rough size, for load assessment.
    pub async fn rough_size(&self) -> Result<u64, DocError> {
        Ok(self.durable.rough_size().await?)
    }

    async fn open<F: Flavor>(
        &self,
        store: &Arc<dyn FileStore>,
        id: &DocumentId,
    ) -> Result<Arc<DocControl<F>>, DocError> {
        let file = store.file(&file_id::<F>(id)).await?;
        DocControl::open_with(file, self.max_update_attempts).await
    }
}

/// The change-log file id for one flavor of one document.
fn file_id<F: Flavor>(id: &DocumentId) -> FileId {
    FileId::new(format!("{}:{}", F::NAME, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ids_separate_flavors() {
        let id = DocumentId::new("doc-1");
        assert_eq!(file_id::<Body>(&id).as_str(), "body:doc-1");
        assert_eq!(file_id::<Carets>(&id).as_str(), "caret:doc-1");
        assert_eq!(file_id::<Properties>(&id).as_str(), "property:doc-1");
    }
}
