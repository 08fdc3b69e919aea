//! Session ownership and client connections
//!
//! This module handles:
//! - The persisted record of which client owns the session
//! - Reading frames from and writing responses to one client

mod connection;
mod store;

pub use connection::{ClientConnection, Inbound};
pub use store::{SessionStore, StoreError, OWNER_FILE};
