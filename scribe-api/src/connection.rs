//! Post and websocket connections.
//!
//! A Post connection is one request/response exchange. A Ws connection
//! carries many exchanges plus server pushes; per target, requests are
//! dispatched in submission order (a queue per target), while distinct
//! targets proceed in parallel. Every request gets a short random
//! label for log correlation.

use crate::context::{Context, Target};
use crate::envelope::{NotificationEnvelope, RequestEnvelope, ResponseEnvelope};
use crate::error::ApiError;
use futures::{SinkExt, StreamExt};
use otcore::{RevNum, StoreError, TargetId};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warp::Filter;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Reply;
use warp::ws::{Message, WebSocket};

/// Shared connection bookkeeping: the admission flag, the live
/// websocket count, and the drain broadcast.
pub struct ConnectionTracker {
    accepting: AtomicBool,
    ws_count: AtomicUsize,
    close: watch::Sender<bool>,
}

impl ConnectionTracker {
    /// A tracker that accepts connections.
    pub fn new() -> Self {
        let (close, _) = watch::channel(false);
        Self {
            accepting: AtomicBool::new(true),
            ws_count: AtomicUsize::new(0),
            close,
        }
    }

    /// How many websocket connections are live.
    pub fn ws_connection_count(&self) -> usize {
        self.ws_count.load(Ordering::Relaxed)
    }

    /// Whether new connections are admitted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Relaxed)
    }

    /// Refuse new connections from now on.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Relaxed);
    }

    /// Ask every live connection to close.
    pub fn close_all(&self) {
        let _ = self.close.send(true);
    }

    fn close_signal(&self) -> watch::Receiver<bool> {
        self.close.subscribe()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the websocket count on drop.
struct WsGuard(Arc<ConnectionTracker>);

impl WsGuard {
    fn new(tracker: Arc<ConnectionTracker>) -> Self {
        tracker.ws_count.fetch_add(1, Ordering::Relaxed);
        Self(tracker)
    }
}

impl Drop for WsGuard {
    fn drop(&mut self) {
        self.0.ws_count.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A short random label correlating one request's log lines.
fn request_label() -> String {
    format!("{:08x}", rand::random::<u32>())
}

/// The API routes: `POST /api[/…]` and websocket upgrades on
/// `GET /api[/…]`. Anything outside the prefix falls through to
/// warp's 404.
pub fn api_routes(
    context: Arc<Context>,
    tracker: Arc<ConnectionTracker>,
) -> BoxedFilter<(warp::reply::Response,)> {
    let post = {
        let context = context.clone();
        let tracker = tracker.clone();
        warp::path("api")
            .and(warp::path::tail())
            .and(warp::post())
            .and(warp::body::json())
            .then(move |_tail: warp::path::Tail, envelope: RequestEnvelope| {
                let context = context.clone();
                let tracker = tracker.clone();
                async move { handle_post(context, tracker, envelope).await }
            })
    };
    let ws = warp::path("api")
        .and(warp::path::tail())
        .and(warp::ws())
        .map(move |_tail: warp::path::Tail, upgrade: warp::ws::Ws| {
            let context = context.clone();
            let tracker = tracker.clone();
            if !tracker.is_accepting() {
                return warp::reply::with_status("draining", StatusCode::SERVICE_UNAVAILABLE)
                    .into_response();
            }
            upgrade
                .on_upgrade(move |socket| ws_connection(socket, context, tracker))
                .into_response()
        });
    post.or(ws)
        .unify()
        .map(|reply: warp::reply::Response| reply.into_response())
        .boxed()
}

/// One-shot POST exchange.
async fn handle_post(
    context: Arc<Context>,
    tracker: Arc<ConnectionTracker>,
    envelope: RequestEnvelope,
) -> warp::reply::Response {
    if !tracker.is_accepting() {
        let body = ResponseEnvelope::error(
            envelope.req_id.clone(),
            crate::envelope::ErrorPayload {
                kind: "refused".into(),
                message: "server is draining".into(),
            },
        );
        return warp::reply::with_status(warp::reply::json(&body), StatusCode::SERVICE_UNAVAILABLE)
            .into_response();
    }
    let response = dispatch_logged(&context, &envelope, "post").await;
    warp::reply::json(&response).into_response()
}

/// Dispatch one envelope with request logging.
async fn dispatch_logged(
    context: &Context,
    envelope: &RequestEnvelope,
    kind: &'static str,
) -> ResponseEnvelope {
    let label = request_label();
    let started = Instant::now();
    let result = context.dispatch(envelope).await;
    let elapsed = started.elapsed().as_millis();
    match &result {
        Ok(_) => info!(
            %label, kind, target = %envelope.target_id, method = %envelope.method, elapsed,
            "request ok"
        ),
        Err(err) => info!(
            %label, kind, target = %envelope.target_id, method = %envelope.method, elapsed,
            error = %err, "request failed"
        ),
    }
    match result {
        Ok(value) => ResponseEnvelope::ok(envelope.req_id.clone(), value),
        Err(err) => ResponseEnvelope::error(envelope.req_id.clone(), err.payload()),
    }
}

/// Per-connection state for a websocket.
struct WsConn {
    context: Arc<Context>,
    outbound: mpsc::UnboundedSender<Message>,
    /// One worker queue per target keeps same-target requests in
    /// submission order while distinct targets interleave.
    workers: Mutex<HashMap<TargetId, mpsc::UnboundedSender<RequestEnvelope>>>,
    watches: Mutex<Vec<JoinHandle<()>>>,
}

impl WsConn {
    fn send(&self, body: &impl serde::Serialize) {
        match serde_json::to_string(body) {
            Ok(text) => {
                let _ = self.outbound.send(Message::text(text));
            }
            Err(err) => warn!(%err, "unencodable websocket payload dropped"),
        }
    }
}

/// The long-lived websocket loop.
async fn ws_connection(socket: WebSocket, context: Arc<Context>, tracker: Arc<ConnectionTracker>) {
    let _guard = WsGuard::new(tracker.clone());
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let conn = Arc::new(WsConn {
        context,
        outbound,
        workers: Mutex::new(HashMap::new()),
        watches: Mutex::new(Vec::new()),
    });

    let mut close_signal = tracker.close_signal();
    info!("websocket connection opened");
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(message)) if message.is_text() => {
                    // A malformed frame drops only this connection.
                    if let Ok(text) = message.to_str() {
                        if handle_ws_message(&conn, text).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(message)) if message.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(%err, "websocket read error");
                    break;
                }
                None => break,
            },
            changed = close_signal.changed() => {
                if changed.is_err() || *close_signal.borrow() {
                    let _ = conn.outbound.send(Message::close());
                    break;
                }
            }
        }
    }

    // Cancel everything bound to this connection. Errors from the
    // cancelled calls are logged where they occur, never relayed.
    for watch_task in conn.watches.lock().await.drain(..) {
        watch_task.abort();
    }
    conn.workers.lock().await.clear();
    writer.abort();
    info!("websocket connection closed");
}

/// Route one inbound websocket frame. `Err` drops the connection.
async fn handle_ws_message(conn: &Arc<WsConn>, text: &str) -> Result<(), ()> {
    let envelope: RequestEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            conn.send(&ResponseEnvelope::error(
                None,
                ApiError::BadEnvelope(err.to_string()).payload(),
            ));
            return Ok(());
        }
    };
    if envelope.req_id.is_none() {
        conn.send(&ResponseEnvelope::error(
            None,
            ApiError::BadEnvelope("websocket requests need a req_id".into()).payload(),
        ));
        return Ok(());
    }
    if envelope.method == "watch" {
        start_watch(conn, envelope).await;
        return Ok(());
    }

    let mut workers = conn.workers.lock().await;
    let worker = workers.entry(envelope.target_id.clone()).or_insert_with(|| {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(target_worker(conn.clone(), rx));
        tx
    });
    if worker.send(envelope).is_err() {
        return Err(());
    }
    Ok(())
}

/// Processes one target's requests in submission order.
async fn target_worker(conn: Arc<WsConn>, mut requests: mpsc::UnboundedReceiver<RequestEnvelope>) {
    while let Some(envelope) = requests.recv().await {
        let response = dispatch_logged(&conn.context, &envelope, "ws").await;
        conn.send(&response);
    }
}

/// Server-push subscription: notify this connection of every body
/// revision after the given one, until the connection closes.
async fn start_watch(conn: &Arc<WsConn>, envelope: RequestEnvelope) {
    let session = match conn.context.get(&envelope.target_id).await {
        Ok(Target::Session(session)) => session,
        Ok(_) => {
            conn.send(&ResponseEnvelope::error(
                envelope.req_id.clone(),
                ApiError::UnknownMethod("watch".into()).payload(),
            ));
            return;
        }
        Err(err) => {
            conn.send(&ResponseEnvelope::error(envelope.req_id.clone(), err.payload()));
            return;
        }
    };
    let mut rev = match envelope
        .args
        .first()
        .cloned()
        .map(serde_json::from_value::<RevNum>)
    {
        Some(Ok(rev)) => rev,
        None => RevNum::ZERO,
        Some(Err(err)) => {
            conn.send(&ResponseEnvelope::error(
                envelope.req_id.clone(),
                ApiError::BadArgument {
                    index: 0,
                    message: err.to_string(),
                }
                .payload(),
            ));
            return;
        }
    };
    conn.send(&ResponseEnvelope::ok(envelope.req_id.clone(), Value::Null));

    let pusher = {
        let conn = conn.clone();
        let target_id = envelope.target_id.clone();
        tokio::spawn(async move {
            loop {
                match session.body_delta_after(rev, None).await {
                    Ok(change) => {
                        rev = change.rev_num;
                        conn.send(&NotificationEnvelope {
                            notify: "revision".into(),
                            target_id: target_id.clone(),
                            payload: json!({ "rev_num": change.rev_num }),
                        });
                    }
                    // Quiet periods just re-arm the wait.
                    Err(scribe_session::SessionError::Doc(scribe_doc::DocError::Store(
                        StoreError::TimedOut(_),
                    ))) => continue,
                    Err(err) => {
                        debug!(target = %target_id, %err, "watch ended");
                        break;
                    }
                }
            }
        })
    };
    conn.watches.lock().await.push(pusher);
}
