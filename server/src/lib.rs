//! pulsegate server
//!
//! Exposes a PulseBlaster pulse generator to one network client at a time.
//! The client that opens a session owns the hardware until it closes the
//! session or anyone issues `reset`.

pub mod command;
pub mod config;
pub mod server;
pub mod session;

pub use command::{CommandDispatcher, HardwareExecutor, ToolExecutor};
pub use config::{Cli, ServerConfig};
pub use server::CommandServer;
pub use session::SessionStore;
