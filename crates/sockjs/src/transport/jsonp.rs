//! JSONP transports, for browsers restricted to script-tag polling. Frames
//! travel as an argument to the client-supplied callback; inbound messages
//! arrive form-encoded.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    response::Response,
};
use bytes::Bytes;
use http::{HeaderMap, header};

use crate::{
    connection::Connection,
    error::SockJsError,
    frame,
    transport::{self, common},
};

/// `GET /:server/:session/jsonp?c=callback` — one poll cycle, the frame
/// wrapped in a script call.
pub(crate) async fn poll(
    State(connection): State<Arc<Connection>>,
    Path((_server, session_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let config = connection.config();
    let callback = match common::callback_param(&query) {
        Ok(callback) => callback,
        Err(error) => return common::error_response(&error, &headers, config.cookie_needed),
    };
    let session = connection.get_or_create(&session_id);
    let frame = transport::poll_once(&session, config.heartbeat_interval).await;
    let body = format!(
        "{}({});\r\n",
        callback,
        common::js_string_literal(&frame.encode())
    );
    common::receive_response(
        &headers,
        common::JAVASCRIPT_MIME_TYPE,
        config.cookie_needed,
        Body::from(body),
    )
}

/// `POST /:server/:session/jsonp_send` — inbound counterpart. Browsers post
/// the payload as a `d=` form field; a raw JSON body is accepted too.
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
    let form_encoded = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("application/x-www-form-urlencoded"));
    let decoded = if form_encoded {
        frame::decode_form_payload(&body)
    } else {
        frame::decode_payload(&body)
    };
    let messages = match decoded {
        Ok(messages) => messages,
        Err(error) => return common::error_response(&error, &headers, cookie_needed),
    };
    if let Err(error) = session.receive(messages) {
        return common::error_response(&error, &headers, cookie_needed);
    }
    common::receive_response(
        &headers,
        common::PLAIN_MIME_TYPE,
        cookie_needed,
        Body::from("ok"),
    )
}
