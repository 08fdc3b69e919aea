//! pulsegate client
//!
//! Connects to a pulsegate server and sends commands over the
//! newline-delimited, percent-encoded JSON protocol.

pub mod client;
pub mod transport;

pub use client::{ClientSession, PulseClient};
pub use transport::{TcpConnector, TransportConnector, TransportStream};
