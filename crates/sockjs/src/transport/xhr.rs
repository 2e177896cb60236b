//! XHR transports: long-polling receive, message send, and the streaming
//! variant with its 2 KiB prefix.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    response::Response,
};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::{
    connection::Connection,
    error::SockJsError,
    frame::{self, Frame},
    transport::{self, common},
};

/// `POST /:server/:session/xhr` — one long-poll cycle.
pub(crate) async fn poll(
    State(connection): State<Arc<Connection>>,
    Path((_server, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let config = connection.config();
    let session = connection.get_or_create(&session_id);
    let frame = transport::poll_once(&session, config.heartbeat_interval).await;
    common::receive_response(
        &headers,
        common::JAVASCRIPT_MIME_TYPE,
        config.cookie_needed,
        Body::from(line_frame(&frame)),
    )
}

/// `POST /:server/:session/xhr_send` — deliver a message batch inbound.
pub(crate) async fn send(
    State(connection): State<Arc<Connection>>,
    Path((_server, session_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let cookie_needed = connection.config().cookie_needed;
    let Some(session) = connection.lookup(&session_id) else {
        return common::error_response(&SockJsError::SessionNotOpen, &headers, cookie_needed);
    };
    let messages = match frame::decode_payload(&body) {
        Ok(messages) => messages,
        Err(error) => return common::error_response(&error, &headers, cookie_needed),
    };
    if let Err(error) = session.receive(messages) {
        return common::error_response(&error, &headers, cookie_needed);
    }
    let mut response = common::receive_response(
        &headers,
        common::PLAIN_MIME_TYPE,
        cookie_needed,
        Body::empty(),
    );
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// `POST /:server/:session/xhr_streaming` — keep the response open across
/// frames. The `h`-prefix makes some browsers start delivering the partial
/// body immediately instead of buffering it.
pub(crate) async fn streaming(
    State(connection): State<Arc<Connection>>,
    Path((_server, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let config = connection.config().clone();
    let session = connection.get_or_create(&session_id);
    let mut prelude = "h".repeat(2048);
    prelude.push('\n');
    let body = transport::stream_body(
        session,
        Some(Bytes::from(prelude)),
        |frame| Bytes::from(line_frame(frame)),
        config.heartbeat_interval,
        config.response_limit,
    );
    common::receive_response(
        &headers,
        common::JAVASCRIPT_MIME_TYPE,
        config.cookie_needed,
        body,
    )
}

/// Preflight for the xhr-family POST routes.
pub(crate) async fn options(
    State(connection): State<Arc<Connection>>,
    headers: HeaderMap,
) -> Response {
    common::options_response(&headers, "OPTIONS, POST", connection.config().cookie_needed)
}

fn line_frame(frame: &Frame) -> String {
    let mut line = frame.encode();
    line.push('\n');
    line
}
