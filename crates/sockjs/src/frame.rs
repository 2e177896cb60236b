//! Wire framing shared by every transport.
//!
//! A SockJS connection is a single canonical stream of frames; each
//! transport wraps these frames in its own envelope (a bare line, a script
//! call, an SSE event). Four frame kinds exist on the wire:
//!
//! * `o` — session opened
//! * `a["…", …]` — a batch of opaque messages
//! * `c[code,"reason"]` — session closed
//! * `h` — heartbeat, keeps intermediaries from dropping an idle connection
//!
//! Frames are encoded here without a terminator; the transport appends its
//! own line/envelope framing.

use std::borrow::Cow;

use crate::error::SockJsError;

/// Close code/reason sent to a receiver that attached while another one was
/// still holding the session.
pub const CLOSE_ANOTHER_CONNECTION: (u16, &str) = (2010, "Another connection still open");

/// Close code/reason for an orderly server-initiated shutdown of a session.
pub const CLOSE_GO_AWAY: (u16, &str) = (3000, "Go away!");

/// Close code/reason reported to the application when a session is reclaimed
/// after sitting without a receiver for the disconnect delay.
pub const CLOSE_SESSION_TIMED_OUT: (u16, &str) = (1001, "Session timed out");

/// Close code/reason for a session whose receiver vanished uncleanly.
pub const CLOSE_INTERRUPTED: (u16, &str) = (1002, "Connection interrupted");

/// One unit of the canonical frame stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Session handshake acknowledgement, sent exactly once per session.
    Open,
    /// Ordered batch of opaque message strings. Never encoded empty.
    Data(Vec<String>),
    /// Terminal frame carrying the close code and human-readable reason.
    Close { code: u16, reason: Cow<'static, str> },
    /// Keep-alive, carries no state.
    Heartbeat,
}

impl Frame {
    /// Build a close frame from a `(code, reason)` protocol constant.
    pub fn close((code, reason): (u16, &'static str)) -> Self {
        Frame::Close {
            code,
            reason: Cow::Borrowed(reason),
        }
    }

    /// Encode to the canonical wire text, without a trailing newline.
    pub fn encode(&self) -> String {
        match self {
            Frame::Open => "o".to_string(),
            Frame::Heartbeat => "h".to_string(),
            Frame::Data(messages) => {
                let payload =
                    serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string());
                format!("a{payload}")
            }
            Frame::Close { code, reason } => {
                let reason =
                    serde_json::to_string(reason.as_ref()).unwrap_or_else(|_| "\"\"".to_string());
                format!("c[{code},{reason}]")
            }
        }
    }

    /// Whether this frame terminates the stream it is written to.
    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close { .. })
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum InboundPayload {
    Batch(Vec<String>),
    Single(String),
}

/// Decode the body of a send request into its ordered message batch.
///
/// Accepts a JSON array of strings, or a single JSON string treated as a
/// one-element batch. An empty body and broken JSON are distinct protocol
/// errors with fixed wording.
pub fn decode_payload(body: &[u8]) -> Result<Vec<String>, SockJsError> {
    if body.is_empty() {
        return Err(SockJsError::PayloadExpected);
    }
    match serde_json::from_slice::<InboundPayload>(body) {
        Ok(InboundPayload::Batch(messages)) => Ok(messages),
        Ok(InboundPayload::Single(message)) => Ok(vec![message]),
        Err(_) => Err(SockJsError::BrokenJson),
    }
}

/// Decode a form-encoded send body (`d=<urlencoded JSON>`), the shape the
/// jsonp_send transport receives from browsers.
pub fn decode_form_payload(body: &[u8]) -> Result<Vec<String>, SockJsError> {
    let data = url::form_urlencoded::parse(body)
        .find(|(name, _)| name == "d")
        .map(|(_, value)| value.into_owned());
    match data {
        Some(data) if !data.is_empty() => decode_payload(data.as_bytes()),
        _ => Err(SockJsError::PayloadExpected),
    }
}
