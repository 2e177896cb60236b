//! Endpoint façade: the application-facing side of the library.
//!
//! A [`Connection`] represents one mounted SockJS endpoint (one URL prefix).
//! It owns the session registry and the application's [`SessionHandler`],
//! and is what every transport goes through to resolve or create sessions.

use std::{sync::Arc, time::Duration};

use crate::session::{Session, registry::SessionRegistry};

/// The application's view of session events.
///
/// One capability object per endpoint, supplied to
/// [`Connection::new`]. `on_open` fires exactly once per session, before any
/// message is delivered, so the application can stash the session handle for
/// later [`send`](Session::send)/[`close`](Session::close) calls.
///
/// Callbacks are invoked synchronously from request-handling tasks and must
/// not block; hand off to a task or channel for anything heavy.
pub trait SessionHandler: Send + Sync + 'static {
    /// A session finished its handshake and is open for traffic.
    fn on_open(&self, session: Arc<Session>) {
        let _ = session;
    }

    /// The client sent a message.
    fn on_message(&self, session: Arc<Session>, message: String);

    /// The session closed, whether by the application, the protocol, or the
    /// disconnect timer. Fires exactly once per session.
    fn on_close(&self, session: &Session, code: u16, reason: &str) {
        let _ = (session, code, reason);
    }
}

impl<T: SessionHandler + ?Sized> SessionHandler for Arc<T> {
    fn on_open(&self, session: Arc<Session>) {
        T::on_open(self, session)
    }

    fn on_message(&self, session: Arc<Session>, message: String) {
        T::on_message(self, session, message)
    }

    fn on_close(&self, session: &Session, code: u16, reason: &str) {
        T::on_close(self, session, code, reason)
    }
}

/// Endpoint tuning knobs.
///
/// The defaults are the protocol's published constants; they are what the
/// `sockjs-protocol` test suite expects and should only be changed for
/// tests or unusual deployments.
#[derive(Debug, Clone)]
pub struct SockJsConfig {
    /// URL of the SockJS client script, embedded in the iframe bootstrap
    /// page.
    pub sockjs_url: String,
    /// Whether the deployment needs the `JSESSIONID` affinity cookie for
    /// sticky routing. Controls both the `Set-Cookie` header and the
    /// `cookie_needed` field of `/info`.
    pub cookie_needed: bool,
    /// Heartbeat period for attached receivers; also bounds how long a
    /// single poll waits before answering with a heartbeat frame.
    pub heartbeat_interval: Duration,
    /// How long a session may sit without any receiver before it is
    /// reclaimed.
    pub disconnect_delay: Duration,
    /// Bytes a streaming response may carry before the transport ends it
    /// and forces the client to reconnect.
    pub response_limit: usize,
}

impl SockJsConfig {
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
    pub const DEFAULT_DISCONNECT_DELAY: Duration = Duration::from_secs(5);
    pub const DEFAULT_RESPONSE_LIMIT: usize = 128 * 1024;
    pub const DEFAULT_SOCKJS_URL: &str =
        "https://cdn.jsdelivr.net/npm/sockjs-client@1/dist/sockjs.min.js";
}

impl Default for SockJsConfig {
    fn default() -> Self {
        Self {
            sockjs_url: Self::DEFAULT_SOCKJS_URL.to_string(),
            cookie_needed: true,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            disconnect_delay: Self::DEFAULT_DISCONNECT_DELAY,
            response_limit: Self::DEFAULT_RESPONSE_LIMIT,
        }
    }
}

/// One mounted endpoint: registry plus application handler.
pub struct Connection {
    registry: Arc<SessionRegistry>,
    handler: Arc<dyn SessionHandler>,
    config: SockJsConfig,
}

impl Connection {
    pub fn new(handler: impl SessionHandler, config: SockJsConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(SessionRegistry::new()),
            handler: Arc::new(handler),
            config,
        })
    }

    pub fn config(&self) -> &SockJsConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Find a live session; `None` means the client must handshake anew.
    pub fn lookup(&self, session_id: &str) -> Option<Arc<Session>> {
        self.registry.lookup(session_id)
    }

    /// Resolve the session a receive-style request addresses, creating it
    /// on first contact.
    pub(crate) fn get_or_create(&self, session_id: &str) -> Arc<Session> {
        self.registry
            .get_or_create(session_id, &self.handler, self.config.disconnect_delay)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("sessions", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}
