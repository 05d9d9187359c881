//! Connection management: TLS transport, framing, the type-state client
//! and the timed session state machine built on it.

mod client;
mod config;
mod framed;
mod session;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use config::{Config, ConfigBuilder};
pub use framed::FramedStream;
pub use session::{FetchedMessage, Session, SessionState};
pub use stream::{ImapStream, connect_tls, create_tls_connector};
