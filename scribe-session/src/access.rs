//! The per-author, pre-session capability.

use crate::color;
use crate::error::SessionError;
use crate::registry::SessionRegistry;
use crate::session::Session;
use otcore::{AuthorId, Caret, CaretDelta, CaretId, CaretOp, DocumentId, SessionId, TimeMs};
use scribe_doc::Documents;
use std::sync::Arc;
use tracing::info;

/// What an authenticated author can do before holding a session:
/// open new sessions and rebind to existing ones.
pub struct AuthorAccess {
    author_id: AuthorId,
    documents: Arc<Documents>,
    registry: Arc<SessionRegistry>,
}

impl AuthorAccess {
    /// Build the capability for one authenticated author.
    pub fn new(
        author_id: AuthorId,
        documents: Arc<Documents>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            author_id,
            documents,
            registry,
        }
    }

    /// The author this capability speaks for.
    pub fn author_id(&self) -> &AuthorId {
        &self.author_id
    }

    /// Open a fresh session on a document. The new caret is announced
    /// to peers immediately.
    pub async fn make_session(
        &self,
        document_id: &DocumentId,
    ) -> Result<Arc<Session>, SessionError> {
        let doc = self.documents.document(document_id).await?;
        let session_id = self.registry.mint_session_id();
        info!(author = %self.author_id, document = %document_id, session = %session_id,
              "opening session");

        let body_rev = doc.body.current_rev_num().await?;
        let caret_rev = doc.carets.current_rev_num().await?;
        let caret = Caret {
            color: color::pick(&session_id).to_string(),
            rev_num: body_rev,
            last_active: TimeMs::now(),
            ..Caret::new(session_id.clone())
        };
        let hello = CaretDelta::new(vec![CaretOp::begin_session(caret)?])?;
        doc.carets
            .update(caret_rev, hello, Some(self.author_id.clone()), Some(TimeMs::now()))
            .await?;

        let session = Arc::new(Session::new(
            session_id,
            self.author_id.clone(),
            document_id.clone(),
            doc,
        ));
        self.registry.insert(session.clone()).await;
        Ok(session)
    }

    /// Rebind to an existing `(author, document, caret)` triple.
    /// Returns `None` — not an error — when the triple is unknown.
    pub async fn find_session(
        &self,
        document_id: &DocumentId,
        caret_id: &CaretId,
    ) -> Result<Option<Arc<Session>>, SessionError> {
        let session_id = SessionId::from(caret_id.clone());
        let Some(session) = self.registry.get(&session_id).await else {
            return Ok(None);
        };
        let matches = !session.is_ended()
            && session.author_id() == &self.author_id
            && session.document_id() == document_id;
        Ok(matches.then_some(session))
    }
}
