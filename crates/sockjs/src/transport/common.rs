//! Header plumbing shared by every transport: content types, CORS echoing,
//! cache directives, the session-affinity cookie, and the fixed error-body
//! responses.

use std::collections::HashMap;

use axum::{body::Body, response::Response};
use http::{HeaderMap, HeaderValue, StatusCode, header};

use crate::error::SockJsError;

pub(crate) const PLAIN_MIME_TYPE: &str = "text/plain; charset=UTF-8";
pub(crate) const HTML_MIME_TYPE: &str = "text/html; charset=UTF-8";
pub(crate) const JAVASCRIPT_MIME_TYPE: &str = "application/javascript; charset=UTF-8";
pub(crate) const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream; charset=UTF-8";
pub(crate) const JSON_MIME_TYPE: &str = "application/json; charset=UTF-8";

/// 200 response carrying session frames: mechanism content type, caching
/// disabled, CORS echoed, affinity cookie set.
pub(crate) fn receive_response(
    request: &HeaderMap,
    content_type: &'static str,
    cookie_needed: bool,
    body: Body,
) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    apply_no_cache(headers);
    apply_cors(headers, request);
    apply_session_cookie(headers, request, cookie_needed);
    response
}

/// The fixed error surface: plain text body with the protocol wording.
/// Callback negotiation failures are reported as HTML, everything else as
/// plain text.
pub(crate) fn error_response(
    error: &SockJsError,
    request: &HeaderMap,
    cookie_needed: bool,
) -> Response {
    let content_type = match error {
        SockJsError::CallbackRequired | SockJsError::InvalidCallback => HTML_MIME_TYPE,
        _ => PLAIN_MIME_TYPE,
    };
    let mut response = Response::new(Body::from(error.to_string()));
    *response.status_mut() =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    apply_cors(headers, request);
    apply_session_cookie(headers, request, cookie_needed);
    response
}

/// CORS preflight answer shared by the xhr-family OPTIONS routes and
/// `OPTIONS /info`.
pub(crate) fn options_response(
    request: &HeaderMap,
    allow: &'static str,
    cookie_needed: bool,
) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(header::ALLOW, HeaderValue::from_static(allow));
    apply_year_cache(headers);
    apply_cors(headers, request);
    apply_session_cookie(headers, request, cookie_needed);
    response
}

pub(crate) fn not_found() -> Response {
    let mut response = Response::new(Body::from("Not found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PLAIN_MIME_TYPE),
    );
    response
}

/// Echo the request origin with credentials enabled; `*` when the request
/// carried no usable origin.
pub(crate) fn apply_cors(headers: &mut HeaderMap, request: &HeaderMap) {
    let origin = request
        .get(header::ORIGIN)
        .filter(|value| {
            value
                .to_str()
                .is_ok_and(|origin| !origin.is_empty() && origin != "null")
        })
        .cloned();
    match origin {
        Some(origin) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        None => {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
        }
    }
    if let Some(requested) = request.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
}

/// Sticky-routing cookie: echo the client's `JSESSIONID` value, or `dummy`
/// when it has none, so a balancer can pin the session to one backend.
pub(crate) fn apply_session_cookie(
    headers: &mut HeaderMap,
    request: &HeaderMap,
    cookie_needed: bool,
) {
    if !cookie_needed {
        return;
    }
    let value = request
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|cookie| cookie.trim().strip_prefix("JSESSIONID="))
        })
        .unwrap_or("dummy");
    let cookie = HeaderValue::from_str(&format!("JSESSIONID={value}; path=/"))
        .unwrap_or_else(|_| HeaderValue::from_static("JSESSIONID=dummy; path=/"));
    headers.insert(header::SET_COOKIE, cookie);
}

pub(crate) fn apply_no_cache(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
}

/// Year-long cacheability for content that never changes per deployment
/// (preflights, the iframe page).
pub(crate) fn apply_year_cache(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
    let expires = (chrono::Utc::now() + chrono::TimeDelta::days(365))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&expires) {
        headers.insert(header::EXPIRES, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("1000001"),
    );
}

/// Extract and validate the script-callback name (`c` or `callback` query
/// parameter). Checked before any session is touched.
pub(crate) fn callback_param(query: &HashMap<String, String>) -> Result<String, SockJsError> {
    let Some(callback) = query
        .get("c")
        .or_else(|| query.get("callback"))
        .filter(|callback| !callback.is_empty())
    else {
        return Err(SockJsError::CallbackRequired);
    };
    let safe = callback
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.'));
    if safe {
        Ok(callback.clone())
    } else {
        Err(SockJsError::InvalidCallback)
    }
}

/// Quote arbitrary text as a JavaScript string literal.
pub(crate) fn js_string_literal(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}
