#![doc = include_str!("../README.md")]

mod connection;
mod error;
pub mod frame;
mod service;
mod session;
mod transport;

pub use connection::{Connection, SessionHandler, SockJsConfig};
pub use error::SockJsError;
pub use frame::Frame;
pub use service::{SockJsEndpoint, SockJsServer, SockJsServerConfig};
pub use session::{Session, SessionState, registry::SessionRegistry};
