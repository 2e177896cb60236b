#![allow(dead_code)]
//! Shared fixtures: recording/echoing handlers and an in-process driver
//! for the endpoint router.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{Router, body::Body};
use http::{HeaderMap, Request, StatusCode, header};
use http_body_util::BodyExt;
use sockjs::{Session, SessionHandler, SockJsConfig, SockJsEndpoint};
use tower::ServiceExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(String),
    Message(String),
    Close(u16, String),
}

/// Handler that records every callback and keeps the most recent session
/// handle so tests can push outbound messages or close from the
/// application side.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    session: Mutex<Option<Arc<Session>>>,
}

impl Recorder {
    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.events.lock().unwrap())
    }

    pub fn session(&self) -> Arc<Session> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .expect("no session opened yet")
    }
}

impl SessionHandler for Recorder {
    fn on_open(&self, session: Arc<Session>) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Open(session.id().to_string()));
        *self.session.lock().unwrap() = Some(session);
    }

    fn on_message(&self, _session: Arc<Session>, message: String) {
        self.events.lock().unwrap().push(Event::Message(message));
    }

    fn on_close(&self, _session: &Session, code: u16, reason: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Close(code, reason.to_string()));
    }
}

/// Echoes every inbound message straight back.
pub struct Echo;

impl SessionHandler for Echo {
    fn on_message(&self, session: Arc<Session>, message: String) {
        let _ = session.send(message);
    }
}

/// Closes every session as soon as it opens.
pub struct CloseOnOpen;

impl SessionHandler for CloseOnOpen {
    fn on_open(&self, session: Arc<Session>) {
        session.close(3000, "Go away!");
    }

    fn on_message(&self, _session: Arc<Session>, _message: String) {}
}

/// Protocol constants shrunk so poll/expiry paths run in test time.
pub fn test_config() -> SockJsConfig {
    SockJsConfig {
        heartbeat_interval: Duration::from_millis(200),
        disconnect_delay: Duration::from_millis(500),
        ..Default::default()
    }
}

pub fn recording_endpoint(config: SockJsConfig) -> (Router, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let endpoint = SockJsEndpoint::new(Arc::clone(&recorder), config);
    (endpoint.router(), recorder)
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

pub fn options(path: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

pub fn post(path: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .body(body.into())
        .unwrap()
}

pub fn post_form(path: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=UTF-8",
        )
        .body(body.into())
        .unwrap()
}

/// Drive one request through the router and collect the whole response.
/// Only for responses that end on their own; streaming receives need
/// [`open_stream`].
pub async fn send_request(
    router: Router,
    request: Request<Body>,
) -> (StatusCode, HeaderMap, String) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8_lossy(&body).into_owned())
}

/// Drive one request and hand back the live body stream. Dropping the
/// stream is the client abort.
pub async fn open_stream(
    router: Router,
    request: Request<Body>,
) -> (StatusCode, HeaderMap, axum::body::BodyDataStream) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    (status, headers, response.into_body().into_data_stream())
}

/// Next chunk of a streaming body, bounded so a stalled test fails fast.
pub async fn next_chunk(stream: &mut axum::body::BodyDataStream) -> String {
    use futures::StreamExt;
    let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for a body chunk")
        .expect("body ended unexpectedly")
        .expect("body errored");
    String::from_utf8_lossy(&chunk).into_owned()
}

/// Read chunks until `total` bytes have arrived; streamed prologues may be
/// split across writes.
pub async fn read_exact(stream: &mut axum::body::BodyDataStream, total: usize) -> String {
    let mut collected = String::new();
    while collected.len() < total {
        collected.push_str(&next_chunk(stream).await);
    }
    collected
}
