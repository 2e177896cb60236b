//! Server for the `sockjs-protocol` test suite.
//!
//! Mounts the four applications the suite expects and serves them on one
//! listener. Point the suite at it with:
//!
//! ```sh
//! cargo run -p sockjs-conformance --bin conformance-server
//! ./venv/bin/python sockjs-protocol.py
//! ```

use std::sync::Arc;

use axum::Router;
use sockjs::{Session, SessionHandler, SockJsConfig, SockJsEndpoint};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BIND_ADDRESS: &str = "127.0.0.1:8081";

/// `/echo` and friends: send every message straight back.
struct Echo;

impl SessionHandler for Echo {
    fn on_message(&self, session: Arc<Session>, message: String) {
        if let Err(error) = session.send(message) {
            tracing::warn!(session_id = %session.id(), %error, "echo send failed");
        }
    }
}

/// `/close`: close every session as soon as it opens.
struct CloseOnOpen;

impl SessionHandler for CloseOnOpen {
    fn on_open(&self, session: Arc<Session>) {
        session.close(3000, "Go away!");
    }

    fn on_message(&self, _session: Arc<Session>, _message: String) {}
}

fn echo_config(cookie_needed: bool) -> SockJsConfig {
    SockJsConfig {
        cookie_needed,
        // The suite probes streaming cycling with a small budget.
        response_limit: 4096,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let echo = SockJsEndpoint::new(Echo, echo_config(false));
    // WebSocket transports are not implemented, so this endpoint behaves
    // identically to /echo; the suite still expects it to exist.
    let disabled_websocket_echo = SockJsEndpoint::new(Echo, echo_config(false));
    let cookie_needed_echo = SockJsEndpoint::new(Echo, echo_config(true));
    let close = SockJsEndpoint::new(CloseOnOpen, SockJsConfig::default());

    let app = Router::new()
        .nest_service("/echo", echo.router())
        .nest_service("/disabled_websocket_echo", disabled_websocket_echo.router())
        .nest_service("/cookie_needed_echo", cookie_needed_echo.router())
        .nest_service("/close", close.router());

    let listener = tokio::net::TcpListener::bind(BIND_ADDRESS).await?;
    tracing::info!(bind_address = %listener.local_addr()?, "conformance server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("conformance server shutting down");
        })
        .await?;
    Ok(())
}
