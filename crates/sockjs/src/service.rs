//! Endpoint assembly: the route table and the standalone server.
//!
//! [`SockJsEndpoint`] turns a [`SessionHandler`] into an [`axum::Router`]
//! carrying the whole protocol surface, for embedding into an existing
//! application. [`SockJsServer`] binds that router to a TCP listener and
//! runs it on its own task until its [`CancellationToken`] fires.

use std::{io, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    connection::{Connection, SessionHandler, SockJsConfig},
    transport::{common, eventsource, htmlfile, jsonp, static_pages, xhr},
};

/// One mounted SockJS endpoint, ready to be turned into a router.
///
/// The route table is built once, at startup; dispatch from
/// `(path suffix, method)` to a transport is entirely static.
pub struct SockJsEndpoint {
    connection: Arc<Connection>,
}

impl SockJsEndpoint {
    pub fn new(handler: impl SessionHandler, config: SockJsConfig) -> Self {
        Self {
            connection: Connection::new(handler, config),
        }
    }

    /// The endpoint façade, for looking up or closing sessions from
    /// outside the handler callbacks.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Build the protocol route table.
    ///
    /// Mount it under the endpoint's URL prefix with
    /// `Router::nest_service` (which keeps the inner 404 fallback), or
    /// serve it at the root.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(static_pages::welcome))
            .route(
                "/info",
                get(static_pages::info).options(static_pages::info_options),
            )
            .route("/{page}", get(static_pages::page))
            .route(
                "/{server}/{session}/xhr",
                post(xhr::poll).get(xhr::poll).options(xhr::options),
            )
            .route(
                "/{server}/{session}/xhr_send",
                post(xhr::send).options(xhr::options),
            )
            .route(
                "/{server}/{session}/xhr_streaming",
                post(xhr::streaming).get(xhr::streaming).options(xhr::options),
            )
            .route("/{server}/{session}/jsonp", get(jsonp::poll))
            .route("/{server}/{session}/jsonp_send", post(jsonp::send))
            .route("/{server}/{session}/eventsource", get(eventsource::stream))
            .route("/{server}/{session}/htmlfile", get(htmlfile::stream))
            .fallback(fallback)
            .with_state(Arc::clone(&self.connection))
    }
}

async fn fallback() -> axum::response::Response {
    common::not_found()
}

/// Where and how [`SockJsServer`] serves an endpoint.
#[derive(Debug, Clone)]
pub struct SockJsServerConfig {
    /// Address to bind; replaced by the actual bound address once the
    /// listener is up (relevant when the port is 0).
    pub bind: SocketAddr,
    /// URL prefix the endpoint is mounted under.
    pub prefix: String,
    /// Cancelling this token shuts the server down gracefully.
    pub ct: CancellationToken,
}

impl Default for SockJsServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            prefix: "/sockjs".to_string(),
            ct: CancellationToken::new(),
        }
    }
}

/// A SockJS endpoint bound to its own TCP listener.
///
/// The accept loop runs on a background task; the returned handle exposes
/// the endpoint façade, the actual bound address and the cancellation
/// token.
pub struct SockJsServer {
    connection: Arc<Connection>,
    config: SockJsServerConfig,
}

impl SockJsServer {
    /// Serve `handler` at `bind` with the protocol-default configuration.
    pub async fn serve(handler: impl SessionHandler, bind: SocketAddr) -> io::Result<Self> {
        Self::serve_with_config(
            handler,
            SockJsConfig::default(),
            SockJsServerConfig {
                bind,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn serve_with_config(
        handler: impl SessionHandler,
        config: SockJsConfig,
        mut server_config: SockJsServerConfig,
    ) -> io::Result<Self> {
        let listener = tokio::net::TcpListener::bind(server_config.bind).await?;
        server_config.bind = listener.local_addr()?;

        let endpoint = SockJsEndpoint::new(handler, config);
        let connection = Arc::clone(endpoint.connection());
        let service = if server_config.prefix.is_empty() || server_config.prefix == "/" {
            endpoint.router()
        } else {
            Router::new().nest_service(&server_config.prefix, endpoint.router())
        };

        let ct = server_config.ct.child_token();
        let server = axum::serve(listener, service).with_graceful_shutdown(async move {
            ct.cancelled().await;
            tracing::info!("sockjs server cancelled");
        });
        tokio::spawn(
            async move {
                if let Err(error) = server.await {
                    tracing::error!(%error, "sockjs server shutdown with error");
                }
            }
            .instrument(tracing::info_span!("sockjs-server", bind_address = %server_config.bind)),
        );
        Ok(Self {
            connection,
            config: server_config,
        })
    }

    /// Actual bound address, useful when the configured port was 0.
    pub fn bind(&self) -> SocketAddr {
        self.config.bind
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn ct(&self) -> &CancellationToken {
        &self.config.ct
    }

    /// Begin a graceful shutdown.
    pub fn cancel(&self) {
        self.config.ct.cancel();
    }
}
