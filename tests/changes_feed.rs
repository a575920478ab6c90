//! End-to-end feed tests against a streaming HTTP server on loopback.

use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use couchdb_http::changes::{ChangeCallback, Cursor};
use couchdb_http::protocol::options;
use couchdb_http::{Change, Database, Seq};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct FakeCouch {
    requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
    stall: bool,
    unavailable_first: bool,
}

fn change_line(seq: u64, id: &str) -> io::Result<Bytes> {
    Ok(Bytes::from(format!(
        "{{\"seq\":{},\"id\":\"{}\",\"changes\":[{{\"rev\":\"1-{}\"}}]}}\n",
        seq, id, id
    )))
}

async fn changes(
    State(couch): State<FakeCouch>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let attempt = {
        let mut requests = couch.requests.lock();
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        requests.push((query.unwrap_or_default(), authorization));
        requests.len()
    };

    if couch.unavailable_first && attempt == 1 {
        return (StatusCode::SERVICE_UNAVAILABLE, "{\"error\":\"unavailable\"}").into_response();
    }

    let first_with_data = if couch.unavailable_first { 2 } else { 1 };
    let lines = if attempt == first_with_data {
        vec![change_line(1, "a"), Ok(Bytes::from_static(b"\n")), change_line(2, "b")]
    } else {
        vec![change_line(3, "c")]
    };
    let body: BoxStream<'static, io::Result<Bytes>> = if couch.stall {
        stream::iter(lines).chain(stream::pending()).boxed()
    } else {
        stream::iter(lines).boxed()
    };
    Body::from_stream(body).into_response()
}

async fn start(couch: FakeCouch) -> SocketAddr {
    let app = Router::new()
        .route("/feeddb/_changes", get(changes))
        .with_state(couch);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Follow the feed until change `c`, returning the ids seen.
async fn follow(db: &Database) -> Vec<String> {
    let mut seen = Vec::new();
    let mut callback = ChangeCallback::new(|change: &Change| {
        seen.push(change.id.clone());
        change.id != "c"
    });
    tokio::time::timeout(
        Duration::from_secs(10),
        db.changes(&mut callback, &options([("feed", "continuous"), ("heartbeat", "50")])),
    )
    .await
    .expect("feed did not finish")
    .unwrap();
    assert_eq!(callback.last_seq(), Some(&Seq::from(3)));
    drop(callback);
    seen
}

fn queries(couch: &FakeCouch) -> Vec<String> {
    couch.requests.lock().iter().map(|(q, _)| q.clone()).collect()
}

#[tokio::test]
async fn test_feed_resumes_after_server_closes() {
    let couch = FakeCouch::default();
    let addr = start(couch.clone()).await;
    let db = Database::new("127.0.0.1", addr.port(), "feeddb")
        .with_retry_delay(Duration::from_millis(10));

    assert_eq!(follow(&db).await, vec!["a", "b", "c"]);
    assert_eq!(
        queries(&couch),
        vec![
            "feed=continuous&heartbeat=50".to_string(),
            "feed=continuous&since=2&heartbeat=50".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_feed_reconnects_after_silent_connection() {
    let couch = FakeCouch {
        stall: true,
        ..Default::default()
    };
    let addr = start(couch.clone()).await;
    let db = Database::new("127.0.0.1", addr.port(), "feeddb")
        .with_retry_delay(Duration::from_millis(10));

    let started = std::time::Instant::now();
    assert_eq!(follow(&db).await, vec!["a", "b", "c"]);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(queries(&couch)[1], "feed=continuous&since=2&heartbeat=50");
}

#[tokio::test]
async fn test_feed_retries_unavailable_server_with_credentials() {
    let couch = FakeCouch {
        unavailable_first: true,
        ..Default::default()
    };
    let addr = start(couch.clone()).await;
    let db = Database::new("127.0.0.1", addr.port(), "feeddb")
        .with_credentials("me", "secret")
        .with_retry_delay(Duration::from_millis(10));

    assert_eq!(follow(&db).await, vec!["a", "b", "c"]);

    let requests = couch.requests.lock().clone();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].0, requests[1].0);
    assert_eq!(requests[2].0, "feed=continuous&since=2&heartbeat=50");
    assert!(requests
        .iter()
        .all(|(_, auth)| auth.as_deref() == Some("Basic bWU6c2VjcmV0")));
}

#[tokio::test]
async fn test_feed_keeps_retrying_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let db = Database::new("127.0.0.1", port, "feeddb")
        .with_retry_delay(Duration::from_millis(10));
    let mut callback = ChangeCallback::new(|_: &Change| false);
    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        db.changes(&mut callback, &options([("heartbeat", 0)])),
    )
    .await;
    assert!(outcome.is_err());
    assert!(callback.last_seq().is_none());
}

#[tokio::test]
async fn test_cursor_overrides_since_option() {
    let db = Database::new("127.0.0.1", 5984, "feeddb");
    let url = db
        .changes_url(&options([("since", 5), ("heartbeat", 0)]), &Cursor::since(9))
        .unwrap();
    assert_eq!(url.query(), Some("since=9"));
}
