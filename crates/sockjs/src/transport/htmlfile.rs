//! HTMLFILE transport: streaming through script tags in a forever-loading
//! HTML document, for browsers with neither XHR streaming nor EventSource.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use bytes::Bytes;
use http::HeaderMap;

use crate::{
    connection::Connection,
    frame::Frame,
    transport::{self, common},
};

const HTML_SHELL: &str = r#"<!doctype html>
<html><head>
  <meta http-equiv="X-UA-Compatible" content="IE=edge" />
  <meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />
</head><body><h2>Don't panic!</h2>
  <script>
    document.domain = document.domain;
    var c = parent.{{ callback }};
    c.start();
    function p(d) {c.message(d);};
    window.onload = function() {c.stop();};
  </script>
"#;

/// `GET /:server/:session/htmlfile?c=callback` — streaming receive inside a
/// script-executing HTML shell.
pub(crate) async fn stream(
    State(connection): State<Arc<Connection>>,
    Path((_server, session_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let config = connection.config().clone();
    let callback = match common::callback_param(&query) {
        Ok(callback) => callback,
        Err(error) => return common::error_response(&error, &headers, config.cookie_needed),
    };
    let session = connection.get_or_create(&session_id);
    let body = transport::stream_body(
        session,
        Some(Bytes::from(shell(&callback))),
        script_frame,
        config.heartbeat_interval,
        config.response_limit,
    );
    common::receive_response(&headers, common::HTML_MIME_TYPE, config.cookie_needed, body)
}

/// The shell is padded past 1 KiB so browsers start parsing (and executing
/// the frame scripts) without waiting for more of the body.
fn shell(callback: &str) -> String {
    let mut page = HTML_SHELL.replace("{{ callback }}", callback);
    let padding = 1024usize.saturating_sub(page.len());
    page.extend(std::iter::repeat_n(' ', padding));
    page.push_str("\r\n\r\n");
    page
}

fn script_frame(frame: &Frame) -> Bytes {
    Bytes::from(format!(
        "<script>\np({});\n</script>\r\n",
        common::js_string_literal(&frame.encode())
    ))
}
