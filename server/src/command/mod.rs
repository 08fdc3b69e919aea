//! Command dispatch and execution for the server
//!
//! This module handles:
//! - Enforcing session ownership for each request
//! - Validating `load` payloads
//! - Running the hardware utility and capturing its output

mod dispatcher;
mod error;
mod executor;

pub use dispatcher::CommandDispatcher;
pub use error::{CommandError, ProcessError};
pub use executor::{
    locate_tool, HardwareCommand, HardwareExecutor, ToolExecutor, SCRATCH_FILE, TOOL_NAMES,
};
