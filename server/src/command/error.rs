//! Errors a single command can end in

use crate::session::StoreError;
use pulsegate_shared::{protocol::HELP, Rejection};
use thiserror::Error;

/// The external tool failed or could not be launched
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },

    #[error("{output}")]
    Failed { code: Option<i32>, output: String },

    #[error("failed to write program file {path}: {source}")]
    ScratchFile {
        path: String,
        source: std::io::Error,
    },
}

/// Per-command failures, turned into an error response by the dispatcher
#[derive(Error, Debug)]
pub enum CommandError {
    /// Missing or invalid request fields
    #[error("{0}")]
    Validation(String),

    /// Not allowed under the current session ownership
    #[error("{0}")]
    Ownership(Rejection),

    /// Unrecognised verb
    #[error("Incorrect command.\n\n{}", HELP)]
    Usage(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("session state could not be saved: {0}")]
    Store(#[from] StoreError),
}

impl From<Rejection> for CommandError {
    fn from(rejection: Rejection) -> Self {
        CommandError::Ownership(rejection)
    }
}
