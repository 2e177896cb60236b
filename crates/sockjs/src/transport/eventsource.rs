//! EventSource transport: server-sent-events framing over the shared
//! streaming driver.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Response,
};
use bytes::Bytes;
use http::HeaderMap;

use crate::{
    connection::Connection,
    frame::Frame,
    transport::{self, common},
};

/// `GET /:server/:session/eventsource` — browser-native streaming receive.
pub(crate) async fn stream(
    State(connection): State<Arc<Connection>>,
    Path((_server, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let config = connection.config().clone();
    let session = connection.get_or_create(&session_id);
    let body = transport::stream_body(
        session,
        Some(Bytes::from_static(b"\r\n")),
        event_frame,
        config.heartbeat_interval,
        config.response_limit,
    );
    common::receive_response(
        &headers,
        common::EVENT_STREAM_MIME_TYPE,
        config.cookie_needed,
        body,
    )
}

fn event_frame(frame: &Frame) -> Bytes {
    Bytes::from(format!("data: {}\r\n\r\n", frame.encode()))
}
