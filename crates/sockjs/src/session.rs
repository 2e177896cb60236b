//! Session lifecycle management.
//!
//! A *session* is the persistent, bidirectional conversation a client keeps
//! with the server across many short-lived HTTP exchanges. The server
//! identifies each session by the ID the client puts in the URL
//! (`/:server/:session/:transport`) and the client repeats that ID on every
//! request belonging to the conversation.
//!
//! The session owns the outbound message buffer and the lifecycle state
//! machine:
//!
//! ```text
//! Connecting --attach--> Open --close--> Closing --deliver--> Closed
//! ```
//!
//! At most one HTTP response (*receiver*) is attached to a session at a
//! time; a competing attach is answered with the reserved
//! `c[2010,"Another connection still open"]` frame and the existing receiver
//! is left undisturbed. While no receiver is attached, outbound messages
//! accumulate in the buffer and a disconnect timer runs; if nothing
//! re-attaches before it fires the session is reclaimed and the application
//! told the session timed out.

use std::{
    borrow::Cow,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::sync::mpsc;

use crate::{
    connection::SessionHandler,
    error::SockJsError,
    frame::{self, Frame},
};

pub mod registry;

use registry::SessionRegistry;

/// Lifecycle state of a [`Session`]. Monotonic; never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created by a handshake request, no receiver has attached yet.
    Connecting,
    /// The open frame has been emitted; traffic flows.
    Open,
    /// A close was initiated; the close frame has not yet reached a receiver.
    Closing,
    /// Terminal. The session is gone from the registry.
    Closed,
}

/// Ordered queue of outbound messages awaiting delivery.
///
/// `drain` is the only read; it atomically empties the buffer under the
/// session lock, so no message is lost or duplicated across a flush.
#[derive(Debug, Default)]
struct MessageBuffer {
    messages: Vec<String>,
}

impl MessageBuffer {
    fn append(&mut self, message: String) {
        self.messages.push(message);
    }

    fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

struct Responder {
    tx: mpsc::UnboundedSender<Frame>,
    epoch: u64,
}

struct SessionInner {
    state: SessionState,
    outbox: MessageBuffer,
    responder: Option<Responder>,
    /// Bumped on every accepted attach; pending disconnect timers carry the
    /// epoch they were scheduled under and give up if it moved on.
    epoch: u64,
    /// Close frame held for the next receiver when none was attached at
    /// close time, or when a polling receiver ended before reading it.
    close_frame: Option<Frame>,
    close_notified: bool,
}

/// One client conversation. See the [module docs](self) for the lifecycle.
///
/// Handed to the application through [`SessionHandler`] callbacks; the
/// application side of the API is [`send`](Session::send),
/// [`close`](Session::close), [`id`](Session::id) and
/// [`state`](Session::state).
pub struct Session {
    id: String,
    weak_self: Weak<Session>,
    registry: Weak<SessionRegistry>,
    handler: Arc<dyn SessionHandler>,
    disconnect_delay: Duration,
    inner: Mutex<SessionInner>,
}

/// Result of trying to attach an HTTP response as the session's receiver.
pub(crate) enum AttachOutcome {
    /// This response is now the one receiver; read frames from the
    /// attachment until done, then drop it to detach.
    Accepted(Attachment),
    /// Another receiver is attached. Answer with this close frame and leave
    /// the session alone.
    Rejected(Frame),
    /// The session was waiting to deliver its close frame (or is already
    /// gone). Answer with the frame; the session has finalized.
    Finished(Frame),
}

impl Session {
    pub(crate) fn new(
        id: String,
        registry: Weak<SessionRegistry>,
        handler: Arc<dyn SessionHandler>,
        disconnect_delay: Duration,
    ) -> Arc<Self> {
        let session = Arc::new_cyclic(|weak_self| Session {
            id,
            weak_self: weak_self.clone(),
            registry,
            handler,
            disconnect_delay,
            inner: Mutex::new(SessionInner {
                state: SessionState::Connecting,
                outbox: MessageBuffer::default(),
                responder: None,
                epoch: 0,
                close_frame: None,
                close_notified: false,
            }),
        });
        tracing::info!(session_id = %session.id, "session created");
        session.schedule_expiry(0);
        session
    }

    /// Session identifier, as taken from the URL of the handshake request.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Queue a message for the client.
    ///
    /// If a receiver is attached the buffer is drained and flushed to it
    /// immediately as a single data frame; otherwise the message waits for
    /// the next attach. Fails once the session is closing or closed.
    pub fn send(&self, message: impl Into<String>) -> Result<(), SockJsError> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Connecting | SessionState::Open => {}
            SessionState::Closing | SessionState::Closed => {
                return Err(SockJsError::SessionNotOpen);
            }
        }
        inner.outbox.append(message.into());
        if inner.responder.is_some() {
            let batch = inner.outbox.drain();
            let undelivered = match inner.responder.as_ref() {
                Some(responder) => responder.tx.send(Frame::Data(batch)).err(),
                None => None,
            };
            if let Some(mpsc::error::SendError(failed)) = undelivered {
                // The receiver vanished before its guard detached; keep the
                // messages for the next one.
                if let Frame::Data(messages) = failed {
                    for message in messages {
                        inner.outbox.append(message);
                    }
                }
                inner.responder = None;
                let epoch = inner.epoch;
                drop(inner);
                self.schedule_expiry(epoch);
            }
        }
        Ok(())
    }

    /// Close the session.
    ///
    /// The close frame goes to the attached receiver if there is one,
    /// otherwise it is held for the next receiver to attach. The
    /// application's close callback fires exactly once, here.
    pub fn close(&self, code: u16, reason: &str) {
        let notify = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Closing | SessionState::Closed => return,
                SessionState::Connecting | SessionState::Open => {}
            }
            let close_frame = Frame::Close {
                code,
                reason: Cow::Owned(reason.to_string()),
            };
            inner.state = SessionState::Closing;
            inner.close_frame = Some(close_frame.clone());
            if let Some(responder) = inner.responder.as_ref() {
                // Delivery is confirmed (or not) when the receiver detaches;
                // see `release`.
                let _ = responder.tx.send(close_frame);
            }
            let notify = !inner.close_notified;
            inner.close_notified = true;
            notify
        };
        tracing::info!(session_id = %self.id, code, reason, "session closing");
        if notify {
            self.handler.on_close(self, code, reason);
        }
    }

    /// Deliver an inbound message batch to the application, in order.
    pub(crate) fn receive(&self, messages: Vec<String>) -> Result<(), SockJsError> {
        {
            let inner = self.lock();
            match inner.state {
                SessionState::Connecting | SessionState::Open => {}
                SessionState::Closing | SessionState::Closed => {
                    return Err(SockJsError::SessionNotOpen);
                }
            }
        }
        let Some(session) = self.weak_self.upgrade() else {
            return Err(SockJsError::SessionNotOpen);
        };
        for message in messages {
            self.handler.on_message(Arc::clone(&session), message);
        }
        Ok(())
    }

    /// Try to make the caller the session's one receiver.
    ///
    /// On first acceptance the session opens: the application's open
    /// callback fires and the open frame is queued. On later acceptances a
    /// non-empty outbox is flushed right away as one data frame.
    pub(crate) fn attach(&self) -> AttachOutcome {
        let (attachment, opened) = {
            let mut inner = self.lock();
            if inner.state == SessionState::Closed {
                let frame = inner
                    .close_frame
                    .clone()
                    .unwrap_or_else(|| Frame::close(frame::CLOSE_GO_AWAY));
                return AttachOutcome::Finished(frame);
            }
            if inner.responder.is_some() {
                tracing::debug!(session_id = %self.id, "second receiver rejected");
                return AttachOutcome::Rejected(Frame::close(frame::CLOSE_ANOTHER_CONNECTION));
            }
            if inner.state == SessionState::Closing {
                let frame = inner
                    .close_frame
                    .take()
                    .unwrap_or_else(|| Frame::close(frame::CLOSE_GO_AWAY));
                inner.state = SessionState::Closed;
                drop(inner);
                self.evict();
                return AttachOutcome::Finished(frame);
            }

            inner.epoch += 1;
            let epoch = inner.epoch;
            let (tx, rx) = mpsc::unbounded_channel();
            let opened = if inner.state == SessionState::Connecting {
                inner.state = SessionState::Open;
                let _ = tx.send(Frame::Open);
                true
            } else {
                if !inner.outbox.is_empty() {
                    let _ = tx.send(Frame::Data(inner.outbox.drain()));
                }
                false
            };
            inner.responder = Some(Responder { tx, epoch });
            let Some(session) = self.weak_self.upgrade() else {
                return AttachOutcome::Finished(Frame::close(frame::CLOSE_GO_AWAY));
            };
            (
                Attachment {
                    session,
                    epoch,
                    rx,
                },
                opened,
            )
        };
        tracing::debug!(session_id = %self.id, opened, "receiver attached");
        if opened {
            self.handler.on_open(Arc::clone(&attachment.session));
        }
        AttachOutcome::Accepted(attachment)
    }

    /// Detach a receiver, re-absorbing whatever it never wrote out.
    ///
    /// Data frames that were queued but not consumed go back to the outbox;
    /// an unconsumed close frame puts the session back into `Closing` so the
    /// next receiver gets it. If the close frame *was* consumed the session
    /// finalizes here.
    fn release(&self, epoch: u64, leftover: Vec<Frame>) {
        let finalize = {
            let mut inner = self.lock();
            match inner.responder.as_ref() {
                Some(responder) if responder.epoch == epoch => {
                    inner.responder = None;
                }
                _ => return,
            }
            let mut close_undelivered = false;
            for frame in leftover {
                match frame {
                    Frame::Data(messages) => {
                        for message in messages {
                            inner.outbox.append(message);
                        }
                    }
                    Frame::Close { .. } => close_undelivered = true,
                    // A handshake the client never read cannot be replayed.
                    Frame::Open | Frame::Heartbeat => {}
                }
            }
            match inner.state {
                SessionState::Closing if !close_undelivered => {
                    inner.state = SessionState::Closed;
                    true
                }
                SessionState::Closed => return,
                _ => {
                    let epoch = inner.epoch;
                    drop(inner);
                    self.schedule_expiry(epoch);
                    tracing::debug!(session_id = %self.id, "receiver detached");
                    return;
                }
            }
        };
        if finalize {
            self.evict();
        }
    }

    fn schedule_expiry(&self, epoch: u64) {
        let Some(session) = self.weak_self.upgrade() else {
            return;
        };
        let delay = self.disconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            session.expire_if_idle(epoch);
        });
    }

    /// Disconnect-timer body: reclaim the session if nothing re-attached
    /// since the timer was scheduled.
    fn expire_if_idle(&self, epoch: u64) {
        let notify = {
            let mut inner = self.lock();
            if inner.state == SessionState::Closed
                || inner.responder.is_some()
                || inner.epoch != epoch
            {
                return;
            }
            inner.state = SessionState::Closed;
            let notify = !inner.close_notified;
            inner.close_notified = true;
            notify
        };
        tracing::info!(session_id = %self.id, "session timed out");
        if notify {
            let (code, reason) = frame::CLOSE_SESSION_TIMED_OUT;
            self.handler.on_close(self, code, reason);
        }
        self.evict();
    }

    fn evict(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.evict(&self.id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Exclusive handle on a session's outbound frame stream, held by the one
/// attached HTTP response. Dropping it detaches — which is also how a client
/// abort is observed, since the response future is dropped with it.
pub(crate) struct Attachment {
    session: Arc<Session>,
    epoch: u64,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl Attachment {
    pub(crate) async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    pub(crate) fn session_id(&self) -> &str {
        self.session.id()
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.rx.close();
        let mut leftover = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            leftover.push(frame);
        }
        self.session.release(self.epoch, leftover);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::connection::SessionHandler;

    #[derive(Debug, PartialEq)]
    enum Event {
        Open(String),
        Message(String),
        Close(u16, String),
    }

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<Event>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            std::mem::take(&mut self.events.lock().unwrap())
        }
    }

    impl SessionHandler for Recorder {
        fn on_open(&self, session: Arc<Session>) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Open(session.id().to_string()));
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

    fn setup(delay: Duration) -> (Arc<SessionRegistry>, Arc<Recorder>, Arc<Session>) {
        let registry = Arc::new(SessionRegistry::new());
        let recorder = Arc::new(Recorder::default());
        let handler: Arc<dyn SessionHandler> = Arc::clone(&recorder) as _;
        let session = registry.get_or_create("s1", &handler, delay);
        (registry, recorder, session)
    }

    fn attach(session: &Session) -> Attachment {
        match session.attach() {
            AttachOutcome::Accepted(attachment) => attachment,
            _ => panic!("attach not accepted"),
        }
    }

    #[tokio::test]
    async fn first_attach_opens_exactly_once() {
        let (_registry, recorder, session) = setup(Duration::from_secs(5));
        assert_eq!(session.state(), SessionState::Connecting);

        let mut attachment = attach(&session);
        assert_eq!(attachment.recv().await, Some(Frame::Open));
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(recorder.events(), [Event::Open("s1".to_string())]);

        drop(attachment);
        let mut attachment = attach(&session);
        session.send("x").unwrap();
        assert_eq!(
            attachment.recv().await,
            Some(Frame::Data(vec!["x".to_string()]))
        );
        // No second open event.
        assert_eq!(recorder.events(), []);
    }

    #[tokio::test]
    async fn buffered_sends_flush_in_order_as_one_frame() {
        let (_registry, _recorder, session) = setup(Duration::from_secs(5));
        drop(attach(&session));

        session.send("m1").unwrap();
        session.send("m2").unwrap();
        session.send("m3").unwrap();

        let mut attachment = attach(&session);
        assert_eq!(
            attachment.recv().await,
            Some(Frame::Data(vec![
                "m1".to_string(),
                "m2".to_string(),
                "m3".to_string()
            ]))
        );
    }

    #[tokio::test]
    async fn second_attach_is_rejected_without_disturbing_the_first() {
        let (_registry, _recorder, session) = setup(Duration::from_secs(5));
        let mut first = attach(&session);
        assert_eq!(first.recv().await, Some(Frame::Open));

        match session.attach() {
            AttachOutcome::Rejected(frame) => {
                assert_eq!(frame, Frame::close(frame::CLOSE_ANOTHER_CONNECTION));
            }
            _ => panic!("expected rejection"),
        }

        // The first receiver still works.
        session.send("still here").unwrap();
        assert_eq!(
            first.recv().await,
            Some(Frame::Data(vec!["still here".to_string()]))
        );
    }

    #[tokio::test]
    async fn close_with_receiver_attached_delivers_through_it() {
        let (registry, recorder, session) = setup(Duration::from_secs(5));
        let mut attachment = attach(&session);
        assert_eq!(attachment.recv().await, Some(Frame::Open));

        session.close(3000, "Go away!");
        assert_eq!(
            attachment.recv().await,
            Some(Frame::Close {
                code: 3000,
                reason: "Go away!".into()
            })
        );
        drop(attachment);

        assert_eq!(session.state(), SessionState::Closed);
        assert!(registry.lookup("s1").is_none());
        assert_eq!(
            recorder.events(),
            [
                Event::Open("s1".to_string()),
                Event::Close(3000, "Go away!".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn close_without_receiver_is_held_for_the_next_attach() {
        let (registry, _recorder, session) = setup(Duration::from_secs(5));
        drop(attach(&session));

        session.close(3000, "Go away!");
        assert_eq!(session.state(), SessionState::Closing);
        assert!(registry.lookup("s1").is_some());

        match session.attach() {
            AttachOutcome::Finished(frame) => {
                assert_eq!(
                    frame,
                    Frame::Close {
                        code: 3000,
                        reason: "Go away!".into()
                    }
                );
            }
            _ => panic!("expected pending close delivery"),
        }
        assert_eq!(session.state(), SessionState::Closed);
        assert!(registry.lookup("s1").is_none());
    }

    #[tokio::test]
    async fn close_unread_by_a_polling_receiver_is_redelivered() {
        let (registry, _recorder, session) = setup(Duration::from_secs(5));
        let mut attachment = attach(&session);
        session.close(3000, "Go away!");

        // The polling receiver only consumed the open frame.
        assert_eq!(attachment.recv().await, Some(Frame::Open));
        drop(attachment);

        assert_eq!(session.state(), SessionState::Closing);
        match session.attach() {
            AttachOutcome::Finished(frame) => {
                assert!(frame.is_close());
            }
            _ => panic!("expected pending close delivery"),
        }
        assert!(registry.lookup("s1").is_none());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (_registry, _recorder, session) = setup(Duration::from_secs(5));
        drop(attach(&session));
        session.close(3000, "Go away!");
        assert_eq!(session.send("late"), Err(SockJsError::SessionNotOpen));
        assert_eq!(
            session.receive(vec!["late".to_string()]),
            Err(SockJsError::SessionNotOpen)
        );
    }

    #[tokio::test]
    async fn inbound_messages_reach_the_handler_in_order() {
        let (_registry, recorder, session) = setup(Duration::from_secs(5));
        let mut attachment = attach(&session);
        assert_eq!(attachment.recv().await, Some(Frame::Open));
        recorder.events();

        session
            .receive(vec!["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(
            recorder.events(),
            [Event::Message("a".to_string()), Event::Message("b".to_string())]
        );
    }

    #[tokio::test]
    async fn idle_session_expires_and_notifies_the_application() {
        let (registry, recorder, session) = setup(Duration::from_millis(30));
        let mut attachment = attach(&session);
        assert_eq!(attachment.recv().await, Some(Frame::Open));
        recorder.events();
        drop(attachment);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(session.state(), SessionState::Closed);
        assert!(registry.lookup("s1").is_none());
        assert_eq!(
            recorder.events(),
            [Event::Close(1001, "Session timed out".to_string())]
        );
    }

    #[tokio::test]
    async fn attached_receiver_keeps_the_session_alive_past_the_delay() {
        let (registry, _recorder, session) = setup(Duration::from_millis(30));
        let mut attachment = attach(&session);
        assert_eq!(attachment.recv().await, Some(Frame::Open));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(session.state(), SessionState::Open);
        assert!(registry.lookup("s1").is_some());
        drop(attachment);
    }
}
