//! pulsegate shared protocol types
//!
//! This crate provides the message model, the newline-delimited codec and the
//! session-ownership state machine used by the pulsegate server and client.

pub mod codec;
pub mod message;
pub mod state_machine;

// Re-export commonly used types at crate root
pub use message::{Clock, CommandMessage, Response, UnknownVerb, Verb};
pub use state_machine::{Action, Rejection, SessionState};

/// Protocol parameters shared by server and client
pub mod protocol {
    /// TCP port the server listens on by default
    pub const DEFAULT_PORT: u16 = 36576;

    /// Prefix that marks a response as an error
    pub const ERROR_PREFIX: &str = "Error: ";

    /// Usage text returned for unrecognised commands
    pub const HELP: &str = "send as urlencoded (plus) json strings with fields:\n\
\"cmd\" for the command [reset, start, stop, load, open, close]\n\
\"clk\" for a load command\n\
\"code\" for a load command\n\
\n\
response will be urlencoded (plus)\n\
\n\
terminated on \"\\n\"";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_lists_every_verb() {
        for verb in Verb::ALL {
            assert!(protocol::HELP.contains(verb.as_str()), "missing {verb}");
        }
    }
}
