//! HTTP transports: one module per mechanism, plus the two delivery drivers
//! they share.
//!
//! Every transport adapts one HTTP mechanism to the session's needs and
//! falls into one of two shapes:
//!
//! * **polling** — attach, wait for a single frame (or the heartbeat bound),
//!   write it, detach. The client immediately re-requests to keep receiving.
//! * **streaming** — attach and keep the response open across many frames,
//!   until the session closes or the response byte budget is spent, at
//!   which point the response ends so the client reconnects.
//!
//! Send-style requests (`xhr_send`, `jsonp_send`) and the stateless
//! informational endpoints live in their transport modules and do not go
//! through the drivers.

use std::{convert::Infallible, time::Duration};

use axum::body::Body;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    frame::{self, Frame},
    session::{AttachOutcome, Session},
};

pub(crate) mod common;
pub(crate) mod eventsource;
pub(crate) mod htmlfile;
pub(crate) mod jsonp;
pub(crate) mod static_pages;
pub(crate) mod xhr;

/// Polling driver: one frame per HTTP exchange.
///
/// Resolves to whatever becomes available first — the open frame, buffered
/// data, a close frame — or a heartbeat when the wait bound elapses with
/// nothing pending. A rejected or finishing attach resolves to the
/// corresponding close frame.
pub(crate) async fn poll_once(session: &Session, heartbeat: Duration) -> Frame {
    match session.attach() {
        AttachOutcome::Accepted(mut attachment) => {
            match tokio::time::timeout(heartbeat, attachment.recv()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => Frame::close(frame::CLOSE_GO_AWAY),
                Err(_elapsed) => Frame::Heartbeat,
            }
        }
        AttachOutcome::Rejected(frame) | AttachOutcome::Finished(frame) => frame,
    }
}

/// Streaming driver: a response body fed by a writer task that stays
/// attached until the session closes or `limit` bytes of frames have been
/// written.
///
/// The writer owns the attachment; when the client goes away the body
/// stream is dropped, the channel send fails, the task returns and the
/// attachment guard detaches the session. Heartbeats are emitted whenever
/// `heartbeat` elapses without traffic.
pub(crate) fn stream_body<F>(
    session: std::sync::Arc<Session>,
    prelude: Option<Bytes>,
    format: F,
    heartbeat: Duration,
    limit: usize,
) -> Body
where
    F: Fn(&Frame) -> Bytes + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(16);
    tokio::spawn(async move {
        if let Some(prelude) = prelude {
            if tx.send(Ok(prelude)).await.is_err() {
                return;
            }
        }
        match session.attach() {
            AttachOutcome::Accepted(mut attachment) => {
                let mut written = 0usize;
                loop {
                    let frame = match tokio::time::timeout(heartbeat, attachment.recv()).await {
                        Ok(Some(frame)) => frame,
                        Ok(None) => Frame::close(frame::CLOSE_GO_AWAY),
                        Err(_elapsed) => Frame::Heartbeat,
                    };
                    let done = frame.is_close();
                    let chunk = format(&frame);
                    written += chunk.len();
                    if tx.send(Ok(chunk)).await.is_err() {
                        // Client went away; dropping the attachment detaches.
                        break;
                    }
                    if done {
                        break;
                    }
                    if written >= limit {
                        tracing::debug!(session_id = %attachment.session_id(), written, "response limit reached, cycling");
                        break;
                    }
                }
            }
            AttachOutcome::Rejected(frame) | AttachOutcome::Finished(frame) => {
                let _ = tx.send(Ok(format(&frame))).await;
            }
        }
    });
    Body::from_stream(ReceiverStream::new(rx))
}
