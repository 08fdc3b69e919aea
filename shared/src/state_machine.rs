//! Session Ownership State Machine
//!
//! Decides, for a verb and the address that sent it, whether the command is
//! allowed under the current ownership and what should happen next. The
//! function is pure; callers apply the returned [`Action`] to their store.

use std::fmt;
use std::net::IpAddr;

use crate::Verb;

/// Ownership of the command surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nobody holds the session
    #[default]
    Unowned,
    /// The session belongs to this client address
    Owned(IpAddr),
}

impl SessionState {
    pub fn from_owner(owner: Option<IpAddr>) -> Self {
        owner.map_or(SessionState::Unowned, SessionState::Owned)
    }

    pub fn owner(&self) -> Option<IpAddr> {
        match self {
            SessionState::Unowned => None,
            SessionState::Owned(addr) => Some(*addr),
        }
    }

    /// Evaluate a verb from `requester` against this state
    pub fn evaluate(&self, verb: Verb, requester: IpAddr) -> Result<Action, Rejection> {
        match (*self, verb) {
            // Reset is an escape hatch open to every requester
            (_, Verb::Reset) => Ok(Action::Reset {
                previous: self.owner(),
            }),

            (SessionState::Unowned, Verb::Open) => Ok(Action::Claim(requester)),
            (SessionState::Unowned, _) => Err(Rejection::NoSession),

            (SessionState::Owned(owner), _) if owner != requester => {
                Err(Rejection::Busy { owner })
            }

            (SessionState::Owned(owner), Verb::Open) => Ok(Action::Confirm(owner)),
            (SessionState::Owned(_), Verb::Start) => Ok(Action::Execute(Verb::Start)),
            (SessionState::Owned(_), Verb::Stop) => Ok(Action::Execute(Verb::Stop)),
            (SessionState::Owned(_), Verb::Load) => Ok(Action::Execute(Verb::Load)),
            (SessionState::Owned(_), Verb::Close) => Ok(Action::Release),
        }
    }

    /// State after `action` has been applied
    pub fn apply(&self, action: &Action) -> SessionState {
        match action {
            Action::Reset { .. } | Action::Release => SessionState::Unowned,
            Action::Claim(addr) => SessionState::Owned(*addr),
            Action::Confirm(_) | Action::Execute(_) => *self,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unowned => write!(f, "unowned"),
            SessionState::Owned(addr) => write!(f, "owned by {addr}"),
        }
    }
}

/// What the dispatcher must do for an allowed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Clear ownership; `previous` is the owner that was displaced, if any
    Reset { previous: Option<IpAddr> },
    /// Record the requester as owner
    Claim(IpAddr),
    /// Requester already owns the session
    Confirm(IpAddr),
    /// Run a hardware verb (`start`, `stop` or `load`)
    Execute(Verb),
    /// Owner gives the session up
    Release,
}

/// Why a command was refused under the current ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No session has been opened
    NoSession,
    /// Another client holds the session
    Busy { owner: IpAddr },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoSession => write!(f, "Client has not started a session."),
            Rejection::Busy { .. } => {
                write!(f, "Another client is in session, try later or force reset.")
            }
        }
    }
}
