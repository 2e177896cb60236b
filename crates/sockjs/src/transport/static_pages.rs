//! Stateless informational endpoints: the greeting, the capability
//! document clients use to pick a transport, and the iframe bootstrap page
//! for cross-domain setups.

use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use axum::{
    body::Body,
    extract::{Path, State},
    response::Response,
};
use http::{HeaderMap, HeaderValue, StatusCode, header};

use crate::{connection::Connection, transport::common};

/// `GET <prefix>/` — greeting.
pub(crate) async fn welcome() -> Response {
    let mut response = Response::new(Body::from("Welcome to SockJS!\n"));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(common::PLAIN_MIME_TYPE),
    );
    response
}

#[derive(serde::Serialize)]
struct Info {
    websocket: bool,
    origins: [&'static str; 1],
    cookie_needed: bool,
    entropy: u32,
}

/// `GET <prefix>/info` — the capability document.
///
/// `entropy` is a fresh random number per response; clients compare it
/// across requests to detect caching intermediaries.
pub(crate) async fn info(
    State(connection): State<Arc<Connection>>,
    headers: HeaderMap,
) -> Response {
    let info = Info {
        websocket: false,
        origins: ["*:*"],
        cookie_needed: connection.config().cookie_needed,
        entropy: rand::random(),
    };
    let body = serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Body::from(body));
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(common::JSON_MIME_TYPE),
    );
    common::apply_no_cache(response_headers);
    common::apply_cors(response_headers, &headers);
    response
}

/// `OPTIONS <prefix>/info` — preflight for the capability document.
pub(crate) async fn info_options(
    State(connection): State<Arc<Connection>>,
    headers: HeaderMap,
) -> Response {
    common::options_response(&headers, "OPTIONS, GET", connection.config().cookie_needed)
}

const IFRAME_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta http-equiv="X-UA-Compatible" content="IE=edge" />
  <meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />
  <script>
    document.domain = document.domain;
    _sockjs_onload = function(){SockJS.bootstrap_iframe();};
  </script>
  <script src="{{ sockjs_url }}"></script>
</head>
<body onload="_sockjs_onload()">
  <h2>Don't panic!</h2>
  <p>This is a SockJS hidden iframe. It's used for cross domain magic.</p>
</body>
</html>"#;

/// `GET <prefix>/iframe[-…].html` — bootstrap page, routed through the
/// one-segment catch-all. Any other single-segment path is a 404.
pub(crate) async fn page(
    State(connection): State<Arc<Connection>>,
    Path(page): Path<String>,
    headers: HeaderMap,
) -> Response {
    if page.starts_with("iframe") && page.ends_with(".html") {
        iframe(&connection, &headers)
    } else {
        common::not_found()
    }
}

/// The page content never changes for a given `sockjs_url`, so it is served
/// with a year-long cache and an `ETag` honoring `If-None-Match`.
fn iframe(connection: &Connection, headers: &HeaderMap) -> Response {
    let page = IFRAME_PAGE.replace("{{ sockjs_url }}", &connection.config().sockjs_url);
    let etag = etag(&page);

    let matched = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == etag);
    let mut response = if matched {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        response
    } else {
        let mut response = Response::new(Body::from(page));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(common::HTML_MIME_TYPE),
        );
        response
    };
    let response_headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response_headers.insert(header::ETAG, value);
    }
    common::apply_year_cache(response_headers);
    response
}

fn etag(page: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    page.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}
