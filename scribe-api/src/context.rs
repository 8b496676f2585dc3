//! The capability context: the shared map from target ids to live
//! capability objects, and the method dispatch over them.

use crate::envelope::RequestEnvelope;
use crate::error::ApiError;
use otcore::{
    BodyDelta, CaretChange, CaretId, DocumentId, DurationMs, PropertyDelta, RevNum, TargetId,
};
use otcore::AuthorId;
use scribe_auth::{RootAccess, TokenAuthority};
use scribe_doc::Documents;
use scribe_session::{AuthorAccess, Session, SessionRegistry};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The bootstrap target every connection may call without holding a
/// capability yet.
pub const AUTH_TARGET: &str = "auth";

/// One capability object callable by remote id.
#[derive(Clone)]
pub enum Target {
    /// The root capability.
    Root(Arc<RootAccess>),
    /// An author's pre-session capability.
    Author(Arc<AuthorAccess>),
    /// A live session.
    Session(Arc<Session>),
}

impl Target {
    /// The class name, for logs and method whitelisting.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Root(_) => "root",
            Self::Author(_) => "author",
            Self::Session(_) => "session",
        }
    }
}

/// The shared target map plus everything dispatch needs to mint new
/// capability objects. One context serves every connection in its
/// scope; mutations are atomic with respect to concurrent reads.
pub struct Context {
    authority: Arc<dyn TokenAuthority>,
    documents: Arc<Documents>,
    registry: Arc<SessionRegistry>,
    root: Arc<RootAccess>,
    id_syntax: otcore::IdPredicate,
    targets: RwLock<HashMap<TargetId, Target>>,
}

impl Context {
    /// Build a context with the default identifier syntax.
    pub fn new(
        authority: Arc<dyn TokenAuthority>,
        documents: Arc<Documents>,
        registry: Arc<SessionRegistry>,
        root: Arc<RootAccess>,
    ) -> Self {
        Self::with_id_syntax(authority, documents, registry, root, otcore::default_id_syntax)
    }

    /// Build a context with an explicit identifier predicate for ids
    /// arriving off the wire.
    pub fn with_id_syntax(
        authority: Arc<dyn TokenAuthority>,
        documents: Arc<Documents>,
        registry: Arc<SessionRegistry>,
        root: Arc<RootAccess>,
        id_syntax: otcore::IdPredicate,
    ) -> Self {
        Self {
            authority,
            documents,
            registry,
            root,
            id_syntax,
            targets: RwLock::new(HashMap::new()),
        }
    }

    fn check_id(&self, index: usize, id: &str) -> Result<(), ApiError> {
        if (self.id_syntax)(id) {
            Ok(())
        } else {
            Err(ApiError::BadArgument {
                index,
                message: format!("malformed identifier: {id:?}"),
            })
        }
    }

    /// The live-session registry behind this context.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// How many targets are attached, for the monitor surface.
    pub async fn target_count(&self) -> usize {
        self.targets.read().await.len()
    }

    /// Look up a target.
    pub async fn get(&self, id: &TargetId) -> Result<Target, ApiError> {
        self.targets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::UnknownTarget(id.clone()))
    }

    /// Verify a presented token and attach the capability it grants.
    /// Returns the target id and its class name.
    pub async fn authorize(&self, presented: &str) -> Result<(TargetId, &'static str), ApiError> {
        let token = self.authority.token_from_string(presented)?;
        for root_token in self.authority.root_tokens().await {
            if !root_token.same_id(&token) {
                continue;
            }
            // Equal ids must carry equal secrets (constant-time check)
            // or access is refused outright.
            if root_token != token {
                return Err(scribe_auth::AuthError::Refused.into());
            }
            let id = TargetId::new(format!("root-{}", token.id()));
            self.attach(id.clone(), Target::Root(self.root.clone())).await;
            return Ok((id, "root"));
        }
        match self.authority.author_for_token(&token).await {
            Some(author_id) => {
                let id = TargetId::new(format!("author-{}", token.id()));
                let access = AuthorAccess::new(
                    author_id,
                    self.documents.clone(),
                    self.registry.clone(),
                );
                self.attach(id.clone(), Target::Author(Arc::new(access))).await;
                Ok((id, "author"))
            }
            None => Err(scribe_auth::AuthError::Refused.into()),
        }
    }

    /// Attach a session as a callable target.
    pub async fn add_session(&self, session: Arc<Session>) -> TargetId {
        let id = TargetId::new(format!("session-{}", session.session_id()));
        self.attach(id.clone(), Target::Session(session)).await;
        id
    }

    async fn attach(&self, id: TargetId, target: Target) {
        self.targets.write().await.insert(id, target);
    }

    /// Detach a target (e.g. an ended session).
    pub async fn remove(&self, id: &TargetId) {
        self.targets.write().await.remove(id);
    }

    /// Decode, whitelist-check, and invoke one request. `watch` never
    /// lands here — the websocket connection intercepts it, and POST
    /// connections get a proper refusal.
    pub async fn dispatch(&self, envelope: &RequestEnvelope) -> Result<Value, ApiError> {
        if envelope.target_id.as_str() == AUTH_TARGET {
            return self.dispatch_auth(envelope).await;
        }
        let target = self.get(&envelope.target_id).await?;
        match target {
            Target::Root(root) => self.dispatch_root(&root, envelope).await,
            Target::Author(access) => self.dispatch_author(&access, envelope).await,
            Target::Session(session) => self.dispatch_session(&session, envelope).await,
        }
    }

    async fn dispatch_auth(&self, envelope: &RequestEnvelope) -> Result<Value, ApiError> {
        match envelope.method.as_str() {
            "authorize" => {
                let presented = envelope
                    .author_token
                    .as_deref()
                    .ok_or(ApiError::MissingToken)?;
                let (target_id, kind) = self.authorize(presented).await?;
                Ok(json!({ "target_id": target_id, "kind": kind }))
            }
            other => Err(ApiError::UnknownMethod(other.into())),
        }
    }

    async fn dispatch_root(
        &self,
        root: &RootAccess,
        envelope: &RequestEnvelope,
    ) -> Result<Value, ApiError> {
        let method = envelope.method.as_str();
        if !root.method_names().iter().any(|name| *name == method) {
            return Err(ApiError::UnknownMethod(envelope.method.clone()));
        }
        let args = &envelope.args;
        match method {
            "make_session_info" => {
                let author_id: AuthorId = arg(args, 0)?;
                let document_id: DocumentId = arg(args, 1)?;
                self.check_id(0, author_id.as_str())?;
                self.check_id(1, document_id.as_str())?;
                encode(&root.make_session_info(&author_id, &document_id).await?)
            }
            "use_token" => {
                let author_id: AuthorId = arg(args, 0)?;
                let presented: String = arg(args, 1)?;
                let token = self.authority.token_from_string(&presented)?;
                root.use_token(&author_id, &token).await?;
                Ok(Value::Null)
            }
            other => Err(ApiError::UnknownMethod(other.into())),
        }
    }

    async fn dispatch_author(
        &self,
        access: &AuthorAccess,
        envelope: &RequestEnvelope,
    ) -> Result<Value, ApiError> {
        match envelope.method.as_str() {
            "make_session" => {
                let document_id: DocumentId = arg(&envelope.args, 0)?;
                self.check_id(0, document_id.as_str())?;
                let session = access.make_session(&document_id).await?;
                let target_id = self.add_session(session.clone()).await;
                Ok(session_descriptor(&target_id, &session))
            }
            "find_session" => {
                let document_id: DocumentId = arg(&envelope.args, 0)?;
                let caret_id: CaretId = arg(&envelope.args, 1)?;
                match access.find_session(&document_id, &caret_id).await? {
                    None => Ok(Value::Null),
                    Some(session) => {
                        let target_id = self.add_session(session.clone()).await;
                        Ok(session_descriptor(&target_id, &session))
                    }
                }
            }
            other => Err(ApiError::UnknownMethod(other.into())),
        }
    }

    async fn dispatch_session(
        &self,
        session: &Arc<Session>,
        envelope: &RequestEnvelope,
    ) -> Result<Value, ApiError> {
        let args = &envelope.args;
        match envelope.method.as_str() {
            "body_update" => {
                let base: RevNum = arg(args, 0)?;
                let delta: BodyDelta = arg(args, 1)?;
                encode(&session.body_update(base, delta).await?)
            }
            "body_snapshot" => {
                let rev: Option<RevNum> = opt_arg(args, 0)?;
                encode(&session.body_snapshot(rev).await?)
            }
            "body_delta_after" => {
                let rev: RevNum = arg(args, 0)?;
                let timeout: Option<DurationMs> = opt_arg(args, 1)?;
                encode(&session.body_delta_after(rev, timeout).await?)
            }
            "caret_update" => {
                let change: CaretChange = arg(args, 0)?;
                encode(&session.caret_update(change).await?)
            }
            "caret_snapshot" => {
                let rev: Option<RevNum> = opt_arg(args, 0)?;
                encode(&session.caret_snapshot(rev).await?)
            }
            "caret_delta_after" => {
                let rev: RevNum = arg(args, 0)?;
                let timeout: Option<DurationMs> = opt_arg(args, 1)?;
                encode(&session.caret_delta_after(rev, timeout).await?)
            }
            "property_update" => {
                let base: RevNum = arg(args, 0)?;
                let delta: PropertyDelta = arg(args, 1)?;
                encode(&session.property_update(base, delta).await?)
            }
            "property_snapshot" => {
                let rev: Option<RevNum> = opt_arg(args, 0)?;
                encode(&session.property_snapshot(rev).await?)
            }
            "property_delta_after" => {
                let rev: RevNum = arg(args, 0)?;
                let timeout: Option<DurationMs> = opt_arg(args, 1)?;
                encode(&session.property_delta_after(rev, timeout).await?)
            }
            "session_end" => {
                session.end().await.map_err(ApiError::from)?;
                self.registry.remove(session.session_id()).await;
                self.remove(&envelope.target_id).await;
                Ok(Value::Null)
            }
            "watch" => Err(ApiError::WrongConnection("watch".into())),
            other => Err(ApiError::UnknownMethod(other.into())),
        }
    }
}

fn session_descriptor(target_id: &TargetId, session: &Session) -> Value {
    json!({
        "target_id": target_id,
        "session_id": session.session_id(),
        "caret_id": session.caret_id(),
        "document_id": session.document_id(),
    })
}

/// Encode a call result for the wire.
fn encode<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(format!("unencodable result: {e}")))
}

/// Decode a required positional argument.
fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, ApiError> {
    let value = args.get(index).ok_or_else(|| ApiError::BadArgument {
        index,
        message: "missing".into(),
    })?;
    serde_json::from_value(value.clone()).map_err(|e| ApiError::BadArgument {
        index,
        message: e.to_string(),
    })
}

/// Decode an optional positional argument; absent or `null` is `None`.
fn opt_arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<Option<T>, ApiError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ApiError::BadArgument {
                index,
                message: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otcore::{BodyOp, Delta, FileStore};
    use scribe_auth::{SessionMinter, default_token_syntax};
    use scribe_auth_static::StaticTokenAuthority;
    use scribe_store_memory::MemoryFileStore;

    async fn context_with_root() -> (Arc<Context>, String) {
        let root_secret = "root0000root0000secret".to_string();
        let root_token =
            scribe_auth::BearerToken::parse(root_secret.clone(), default_token_syntax).unwrap();
        let authority = Arc::new(StaticTokenAuthority::new(vec![root_token]));
        let durable: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
        let ephemeral: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
        let documents = Arc::new(Documents::new(durable, ephemeral));
        let registry = Arc::new(SessionRegistry::new());
        let minter = SessionMinter::new("http://localhost:8080/api", authority.clone());
        let root =
            Arc::new(RootAccess::new(Arc::new(minter), Some(authority.clone())).unwrap());
        let context = Arc::new(Context::new(authority, documents, registry, root));
        (context, root_secret)
    }

    fn request(target: &str, method: &str, args: Vec<Value>) -> RequestEnvelope {
        RequestEnvelope {
            target_id: TargetId::new(target),
            method: method.into(),
            args,
            req_id: None,
            author_token: None,
        }
    }

    async fn authorize_author(context: &Context, root_secret: &str) -> (TargetId, String) {
        // Root mints session info for an author; the author token from
        // it then authorizes an author target.
        let (root_id, kind) = context.authorize(root_secret).await.unwrap();
        assert_eq!(kind, "root");
        let info = context
            .dispatch(&request(
                root_id.as_str(),
                "make_session_info",
                vec![json!("alice"), json!("doc-1")],
            ))
            .await
            .unwrap();
        let author_token = info["author_token"].as_str().unwrap().to_string();
        let (author_id, kind) = context.authorize(&author_token).await.unwrap();
        assert_eq!(kind, "author");
        (author_id, author_token)
    }

    #[tokio::test]
    async fn authorize_rejects_garbage_and_strangers() {
        let (context, _) = context_with_root().await;
        assert!(matches!(
            context.authorize("short").await.unwrap_err(),
            ApiError::Auth(scribe_auth::AuthError::BadToken(_))
        ));
        assert!(matches!(
            context.authorize("nobody0000000000nobody").await.unwrap_err(),
            ApiError::Auth(scribe_auth::AuthError::Refused)
        ));
    }

    #[tokio::test]
    async fn authorize_refuses_root_id_with_wrong_secret() {
        let (context, root_secret) = context_with_root().await;
        let forged = format!("{}{}", &root_secret[..16], "0000000000000000");
        assert!(matches!(
            context.authorize(&forged).await.unwrap_err(),
            ApiError::Auth(scribe_auth::AuthError::Refused)
        ));
    }

    #[tokio::test]
    async fn auth_target_requires_the_token_field() {
        let (context, _) = context_with_root().await;
        let err = context
            .dispatch(&request(AUTH_TARGET, "authorize", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingToken));
    }

    #[tokio::test]
    async fn full_session_flow_over_dispatch() {
        let (context, root_secret) = context_with_root().await;
        let (author_target, _) = authorize_author(&context, &root_secret).await;

        let made = context
            .dispatch(&request(
                author_target.as_str(),
                "make_session",
                vec![json!("doc-1")],
            ))
            .await
            .unwrap();
        let session_target = made["target_id"].as_str().unwrap().to_string();

        let change = context
            .dispatch(&request(
                &session_target,
                "body_update",
                vec![
                    json!(0),
                    serde_json::to_value(
                        Delta::<otcore::Body>::new(vec![BodyOp::text("hello").unwrap()])
                            .unwrap(),
                    )
                    .unwrap(),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(change["rev_num"], 1);

        let snap = context
            .dispatch(&request(&session_target, "body_snapshot", vec![]))
            .await
            .unwrap();
        assert_eq!(snap["rev_num"], 1);
        assert_eq!(snap["contents"][0]["text"], "hello");

        context
            .dispatch(&request(&session_target, "session_end", vec![]))
            .await
            .unwrap();
        let err = context
            .dispatch(&request(&session_target, "body_snapshot", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnknownTarget(_)));
    }

    #[tokio::test]
    async fn find_session_rebinds_or_returns_null() {
        let (context, root_secret) = context_with_root().await;
        let (author_target, _) = authorize_author(&context, &root_secret).await;
        let made = context
            .dispatch(&request(
                author_target.as_str(),
                "make_session",
                vec![json!("doc-1")],
            ))
            .await
            .unwrap();
        let caret_id = made["caret_id"].as_str().unwrap();

        let found = context
            .dispatch(&request(
                author_target.as_str(),
                "find_session",
                vec![json!("doc-1"), json!(caret_id)],
            ))
            .await
            .unwrap();
        assert_eq!(found["caret_id"], made["caret_id"]);

        let missing = context
            .dispatch(&request(
                author_target.as_str(),
                "find_session",
                vec![json!("doc-1"), json!("ghost")],
            ))
            .await
            .unwrap();
        assert_eq!(missing, Value::Null);
    }

    #[tokio::test]
    async fn whitelists_reject_unknown_methods() {
        let (context, root_secret) = context_with_root().await;
        let (root_id, _) = context.authorize(&root_secret).await.unwrap();
        let err = context
            .dispatch(&request(root_id.as_str(), "drop_everything", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnknownMethod(_)));
    }

    #[tokio::test]
    async fn use_token_overrides_author_resolution() {
        let (context, root_secret) = context_with_root().await;
        let (root_id, _) = context.authorize(&root_secret).await.unwrap();
        let chosen = "chosen0000000000token000";
        context
            .dispatch(&request(
                root_id.as_str(),
                "use_token",
                vec![json!("mallory"), json!(chosen)],
            ))
            .await
            .unwrap();
        let (_, kind) = context.authorize(chosen).await.unwrap();
        assert_eq!(kind, "author");
    }

    #[tokio::test]
    async fn watch_is_websocket_only() {
        let (context, root_secret) = context_with_root().await;
        let (author_target, _) = authorize_author(&context, &root_secret).await;
        let made = context
            .dispatch(&request(
                author_target.as_str(),
                "make_session",
                vec![json!("doc-1")],
            ))
            .await
            .unwrap();
        let session_target = made["target_id"].as_str().unwrap().to_string();
        let err = context
            .dispatch(&request(&session_target, "watch", vec![json!(0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::WrongConnection(_)));
    }
}
