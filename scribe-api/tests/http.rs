//! End-to-end exercises of the HTTP and websocket surface, driven
//! through warp's test harness.

use otcore::FileStore;
use scribe_api::{Context, ConnectionTracker, RequestEnvelope, api_routes};
use scribe_auth::{BearerToken, RootAccess, SessionMinter, default_token_syntax};
use scribe_auth_static::StaticTokenAuthority;
use scribe_doc::Documents;
use scribe_session::SessionRegistry;
use scribe_store_memory::MemoryFileStore;
use serde_json::{Value, json};
use std::sync::Arc;

const ROOT_SECRET: &str = "root0000root0000secret";

fn world() -> (Arc<Context>, Arc<ConnectionTracker>) {
    let root_token = BearerToken::parse(ROOT_SECRET, default_token_syntax).unwrap();
    let authority = Arc::new(StaticTokenAuthority::new(vec![root_token]));
    let durable: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
    let ephemeral: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
    let documents = Arc::new(Documents::new(durable, ephemeral));
    let registry = Arc::new(SessionRegistry::new());
    let minter = SessionMinter::new("http://localhost:8080/api", authority.clone());
    let root = Arc::new(RootAccess::new(Arc::new(minter), Some(authority.clone())).unwrap());
    (
        Arc::new(Context::new(authority, documents, registry, root)),
        Arc::new(ConnectionTracker::new()),
    )
}

fn envelope(target: &str, method: &str, args: Vec<Value>) -> Value {
    json!({ "target_id": target, "method": method, "args": args })
}

async fn post(
    routes: &warp::filters::BoxedFilter<(warp::reply::Response,)>,
    body: &Value,
) -> Value {
    let response = warp::test::request()
        .method("POST")
        .path("/api")
        .json(body)
        .reply(routes)
        .await;
    assert_eq!(response.status(), 200, "body: {:?}", response.body());
    serde_json::from_slice(response.body()).unwrap()
}

#[tokio::test]
async fn post_authorize_then_edit() {
    let (context, tracker) = world();
    let routes = api_routes(context, tracker);

    let mut auth = envelope("auth", "authorize", vec![]);
    auth["author_token"] = json!(ROOT_SECRET);
    let reply = post(&routes, &auth).await;
    assert_eq!(reply["status"], "ok");
    let root_target = reply["result"]["target_id"].as_str().unwrap().to_string();
    assert_eq!(reply["result"]["kind"], "root");

    let reply = post(
        &routes,
        &envelope(
            &root_target,
            "make_session_info",
            vec![json!("alice"), json!("doc-1")],
        ),
    )
    .await;
    assert_eq!(reply["status"], "ok");
    let author_token = reply["result"]["author_token"].as_str().unwrap().to_string();
    assert_eq!(reply["result"]["document_id"], "doc-1");

    let mut auth = envelope("auth", "authorize", vec![]);
    auth["author_token"] = json!(author_token);
    let reply = post(&routes, &auth).await;
    let author_target = reply["result"]["target_id"].as_str().unwrap().to_string();

    let reply = post(
        &routes,
        &envelope(&author_target, "make_session", vec![json!("doc-1")]),
    )
    .await;
    let session_target = reply["result"]["target_id"].as_str().unwrap().to_string();

    let reply = post(
        &routes,
        &envelope(
            &session_target,
            "body_update",
            vec![json!(0), json!([{ "op": "text", "text": "hi" }])],
        ),
    )
    .await;
    assert_eq!(reply["status"], "ok");
    assert_eq!(reply["result"]["rev_num"], 1);

    let reply = post(&routes, &envelope(&session_target, "body_snapshot", vec![])).await;
    assert_eq!(reply["result"]["contents"][0]["text"], "hi");
}

#[tokio::test]
async fn carets_and_properties_flow_over_the_same_surface() {
    let (context, tracker) = world();
    let routes = api_routes(context, tracker);

    let mut auth = envelope("auth", "authorize", vec![]);
    auth["author_token"] = json!(ROOT_SECRET);
    let reply = post(&routes, &auth).await;
    let root_target = reply["result"]["target_id"].as_str().unwrap().to_string();
    let reply = post(
        &routes,
        &envelope(
            &root_target,
            "make_session_info",
            vec![json!("alice"), json!("doc-1")],
        ),
    )
    .await;
    let mut auth = envelope("auth", "authorize", vec![]);
    auth["author_token"] = reply["result"]["author_token"].clone();
    let reply = post(&routes, &auth).await;
    let author_target = reply["result"]["target_id"].as_str().unwrap().to_string();
    let reply = post(
        &routes,
        &envelope(&author_target, "make_session", vec![json!("doc-1")]),
    )
    .await;
    let session_target = reply["result"]["target_id"].as_str().unwrap().to_string();
    let session_id = reply["result"]["session_id"].as_str().unwrap().to_string();

    // The freshly announced caret is in the caret snapshot.
    let reply = post(&routes, &envelope(&session_target, "caret_snapshot", vec![])).await;
    assert_eq!(reply["result"]["rev_num"], 1);
    assert_eq!(reply["result"]["contents"][0]["caret"]["session_id"], session_id);

    // Move our own caret by proposing revision 2.
    let reply = post(
        &routes,
        &envelope(
            &session_target,
            "caret_update",
            vec![json!({
                "rev_num": 2,
                "delta": [
                    {"op": "set_field", "session_id": session_id, "field": "index", "value": 5}
                ],
            })],
        ),
    )
    .await;
    assert_eq!(reply["status"], "ok", "body: {reply}");
    assert_eq!(reply["result"]["rev_num"], 2);

    // Properties are last-writer-wins through the same session.
    let reply = post(
        &routes,
        &envelope(
            &session_target,
            "property_update",
            vec![
                json!(0),
                json!([{"op": "set_property", "name": "title", "value": "Draft"}]),
            ],
        ),
    )
    .await;
    assert_eq!(reply["status"], "ok", "body: {reply}");
    let reply = post(
        &routes,
        &envelope(&session_target, "property_snapshot", vec![]),
    )
    .await;
    assert_eq!(reply["result"]["contents"][0]["value"], "Draft");

    // Touching a peer's caret is refused.
    let reply = post(
        &routes,
        &envelope(
            &session_target,
            "caret_update",
            vec![json!({
                "rev_num": 3,
                "delta": [
                    {"op": "set_field", "session_id": "someone-else", "field": "index", "value": 0}
                ],
            })],
        ),
    )
    .await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["error"]["kind"], "bad_use");
}

#[tokio::test]
async fn post_shapes_errors_with_kind_and_message() {
    let (context, tracker) = world();
    let routes = api_routes(context, tracker);
    let reply = post(&routes, &envelope("nobody", "poke", vec![])).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["error"]["kind"], "bad_id");
}

#[tokio::test]
async fn post_is_refused_while_draining() {
    let (context, tracker) = world();
    let routes = api_routes(context, tracker.clone());
    tracker.stop_accepting();
    let response = warp::test::request()
        .method("POST")
        .path("/api")
        .json(&envelope("auth", "authorize", vec![]))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn urls_outside_the_api_prefix_are_not_found() {
    let (context, tracker) = world();
    let routes = api_routes(context, tracker);
    let response = warp::test::request()
        .method("POST")
        .path("/elsewhere")
        .json(&envelope("auth", "authorize", vec![]))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn websocket_round_trip_with_req_id_echo() {
    let (context, tracker) = world();
    let routes = api_routes(context, tracker);

    let mut client = warp::test::ws()
        .path("/api")
        .handshake(routes)
        .await
        .expect("handshake");

    let request = json!({
        "target_id": "auth",
        "method": "authorize",
        "req_id": 41,
        "author_token": ROOT_SECRET,
    });
    client
        .send_text(serde_json::to_string(&request).unwrap())
        .await;
    let reply = client.recv().await.expect("reply");
    let reply: Value = serde_json::from_str(reply.to_str().unwrap()).unwrap();
    assert_eq!(reply["status"], "ok");
    assert_eq!(reply["req_id"], 41);
    assert_eq!(reply["result"]["kind"], "root");
}

#[tokio::test]
async fn websocket_requests_need_a_req_id() {
    let (context, tracker) = world();
    let routes = api_routes(context, tracker);
    let mut client = warp::test::ws()
        .path("/api")
        .handshake(routes)
        .await
        .expect("handshake");
    client
        .send_text(
            serde_json::to_string(&RequestEnvelope {
                target_id: otcore::TargetId::new("auth"),
                method: "authorize".into(),
                args: vec![],
                req_id: None,
                author_token: Some(ROOT_SECRET.into()),
            })
            .unwrap(),
        )
        .await;
    let reply = client.recv().await.expect("reply");
    let reply: Value = serde_json::from_str(reply.to_str().unwrap()).unwrap();
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["error"]["kind"], "bad_value");
}

#[tokio::test]
async fn websocket_watch_pushes_revision_notifications() {
    let (context, tracker) = world();
    let routes = api_routes(context.clone(), tracker);

    // Set up a session out-of-band; the socket only watches.
    let (root_id, _) = context.authorize(ROOT_SECRET).await.unwrap();
    let info = context
        .dispatch(
            &serde_json::from_value(envelope(
                root_id.as_str(),
                "make_session_info",
                vec![json!("alice"), json!("doc-1")],
            ))
            .unwrap(),
        )
        .await
        .unwrap();
    let (author_id, _) = context
        .authorize(info["author_token"].as_str().unwrap())
        .await
        .unwrap();
    let made = context
        .dispatch(
            &serde_json::from_value(envelope(
                author_id.as_str(),
                "make_session",
                vec![json!("doc-1")],
            ))
            .unwrap(),
        )
        .await
        .unwrap();
    let session_target = made["target_id"].as_str().unwrap().to_string();

    let mut client = warp::test::ws()
        .path("/api")
        .handshake(routes)
        .await
        .expect("handshake");
    client
        .send_text(
            serde_json::to_string(&json!({
                "target_id": session_target,
                "method": "watch",
                "args": [0],
                "req_id": 1,
            }))
            .unwrap(),
        )
        .await;
    let ack = client.recv().await.expect("ack");
    let ack: Value = serde_json::from_str(ack.to_str().unwrap()).unwrap();
    assert_eq!(ack["status"], "ok");

    // An edit lands through dispatch; the watcher hears about it.
    context
        .dispatch(
            &serde_json::from_value(envelope(
                &session_target,
                "body_update",
                vec![json!(0), json!([{ "op": "text", "text": "x" }])],
            ))
            .unwrap(),
        )
        .await
        .unwrap();

    let push = client.recv().await.expect("notification");
    let push: Value = serde_json::from_str(push.to_str().unwrap()).unwrap();
    assert_eq!(push["notify"], "revision");
    assert_eq!(push["payload"]["rev_num"], 1);
}
