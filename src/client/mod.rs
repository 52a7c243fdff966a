//! CSRF token acquisition client.
//!
//! # Data Flow
//! ```text
//! caller request
//!     → token_client.rs (NoToken? fetch via service.rs; attach header)
//!     → Transport::send (transport.rs; reqwest with a shared cookie jar)
//!     → 403 on a cached token? refresh once and retry
//!     → response to caller
//! ```
//!
//! # Design Decisions
//! - Transport is injected, so the automaton is tested without a network
//! - One client instance stands for one user session; it is `&mut self`
//!   and not meant to be shared across sessions

pub mod error;
pub mod service;
pub mod token_client;
pub mod transport;

pub use error::ClientError;
pub use service::TokenServiceClient;
pub use token_client::CsrfTokenClient;
pub use transport::{InboundResponse, OutboundRequest, ReqwestTransport, Transport};
