//! One author's live editing session on one document.

use crate::error::SessionError;
use otcore::{
    AuthorId, BodyChange, BodyDelta, BodySnapshot, CaretChange, CaretId, CaretOp, CaretSnapshot,
    DocumentId, DurationMs, OtError, PropertyChange, PropertyDelta, PropertySnapshot, RevNum,
    SessionId, TimeMs,
};
use scribe_doc::DocumentHandles;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// A session binds `(author, document, caret)` to the document's
/// coordinator bundle. Every inbound call refreshes `last_active`;
/// the idle sweep ends sessions that go quiet.
pub struct Session {
    session_id: SessionId,
    author_id: AuthorId,
    document_id: DocumentId,
    doc: Arc<DocumentHandles>,
    last_active: AtomicU64,
    ended: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        session_id: SessionId,
        author_id: AuthorId,
        document_id: DocumentId,
        doc: Arc<DocumentHandles>,
    ) -> Self {
        Self {
            session_id,
            author_id,
            document_id,
            doc,
            last_active: AtomicU64::new(TimeMs::now().as_millis()),
            ended: AtomicBool::new(false),
        }
    }

    /// The session id.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The public id of this session's caret.
    pub fn caret_id(&self) -> CaretId {
        self.session_id.clone().into()
    }

    /// The author this session belongs to.
    pub fn author_id(&self) -> &AuthorId {
        &self.author_id
    }

    /// The document this session edits.
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// When this session last showed signs of life.
    pub fn last_active(&self) -> TimeMs {
        TimeMs::from_millis(self.last_active.load(Ordering::Relaxed))
    }

    /// Whether this session has ended.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Relaxed)
    }

    fn touch(&self) -> Result<(), SessionError> {
        if self.is_ended() {
            return Err(SessionError::Ended);
        }
        self.last_active
            .store(TimeMs::now().as_millis(), Ordering::Relaxed);
        Ok(())
    }

    /// Apply a body delta produced against `base_rev_num`.
    pub async fn body_update(
        &self,
        base_rev_num: RevNum,
        delta: BodyDelta,
    ) -> Result<BodyChange, SessionError> {
        self.touch()?;
        let change = self
            .doc
            .body
            .update(
                base_rev_num,
                delta,
                Some(self.author_id.clone()),
                Some(TimeMs::now()),
            )
            .await?;
        Ok(change)
    }

    /// The body snapshot at `rev_num`, or the current one.
    pub async fn body_snapshot(
        &self,
        rev_num: Option<RevNum>,
    ) -> Result<BodySnapshot, SessionError> {
        self.touch()?;
        Ok(self.doc.body.snapshot(rev_num).await?)
    }

    /// Block for body changes after `rev_num`.
    pub async fn body_delta_after(
        &self,
        rev_num: RevNum,
        timeout: Option<DurationMs>,
    ) -> Result<BodyChange, SessionError> {
        self.touch()?;
        Ok(self.doc.body.delta_after(rev_num, timeout).await?)
    }

    /// Apply a proposed caret change. The change's revision number is
    /// the revision the client wants to produce; its delta may only
    /// touch this session's own caret.
    pub async fn caret_update(&self, change: CaretChange) -> Result<CaretChange, SessionError> {
        self.touch()?;
        for op in change.delta.ops() {
            let target = match op {
                CaretOp::BeginSession { caret } => &caret.session_id,
                CaretOp::EndSession { session_id } => session_id,
                CaretOp::SetField { session_id, .. } => session_id,
            };
            if target != &self.session_id {
                return Err(OtError::BadUse(format!(
                    "caret update for foreign session {target}"
                ))
                .into());
            }
        }
        let base = match change.rev_num.prev() {
            Some(base) => base,
            None => {
                return Err(OtError::BadUse(
                    "a caret update cannot produce the initial revision".into(),
                )
                .into());
            }
        };
        let applied = self
            .doc
            .carets
            .update(
                base,
                change.delta,
                Some(self.author_id.clone()),
                Some(TimeMs::now()),
            )
            .await?;
        Ok(applied)
    }

    /// The caret snapshot at `rev_num`, or the current one.
    pub async fn caret_snapshot(
        &self,
        rev_num: Option<RevNum>,
    ) -> Result<CaretSnapshot, SessionError> {
        self.touch()?;
        Ok(self.doc.carets.snapshot(rev_num).await?)
    }

    /// Block for caret changes after `rev_num`.
    pub async fn caret_delta_after(
        &self,
        rev_num: RevNum,
        timeout: Option<DurationMs>,
    ) -> Result<CaretChange, SessionError> {
        self.touch()?;
        Ok(self.doc.carets.delta_after(rev_num, timeout).await?)
    }

    /// Apply a property delta produced against `base_rev_num`.
    pub async fn property_update(
        &self,
        base_rev_num: RevNum,
        delta: PropertyDelta,
    ) -> Result<PropertyChange, SessionError> {
        self.touch()?;
        let change = self
            .doc
            .properties
            .update(
                base_rev_num,
                delta,
                Some(self.author_id.clone()),
                Some(TimeMs::now()),
            )
            .await?;
        Ok(change)
    }

    /// The property snapshot at `rev_num`, or the current one.
    pub async fn property_snapshot(
        &self,
        rev_num: Option<RevNum>,
    ) -> Result<PropertySnapshot, SessionError> {
        self.touch()?;
        Ok(self.doc.properties.snapshot(rev_num).await?)
    }

    /// Block for property changes after `rev_num`.
    pub async fn property_delta_after(
        &self,
        rev_num: RevNum,
        timeout: Option<DurationMs>,
    ) -> Result<PropertyChange, SessionError> {
        self.touch()?;
        Ok(self.doc.properties.delta_after(rev_num, timeout).await?)
    }

    /// End this session, announcing the departure to peers through an
    /// `end_session` caret op. Ending twice is fine.
    pub async fn end(&self) -> Result<(), SessionError> {
        if self.ended.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        info!(session = %self.session_id, document = %self.document_id, "session ended");
        let current = self.doc.carets.current_rev_num().await?;
        let farewell = otcore::CaretDelta::new(vec![CaretOp::end_session(self.session_id.clone())])
            .map_err(SessionError::Ot)?;
        self.doc
            .carets
            .update(current, farewell, Some(self.author_id.clone()), Some(TimeMs::now()))
            .await?;
        Ok(())
    }
}
