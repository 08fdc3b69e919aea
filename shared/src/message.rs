//! Request and response model carried inside frames

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::protocol::ERROR_PREFIX;

/// Verbs understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Clear the session regardless of who holds it
    Reset,
    /// Claim the session for the requesting address
    Open,
    /// Start the loaded pulse program
    Start,
    /// Stop the running pulse program
    Stop,
    /// Load a pulse program and clock frequency
    Load,
    /// Release the session
    Close,
}

impl Verb {
    pub const ALL: [Verb; 6] = [
        Verb::Reset,
        Verb::Open,
        Verb::Start,
        Verb::Stop,
        Verb::Load,
        Verb::Close,
    ];

    /// Lower-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Reset => "reset",
            Verb::Open => "open",
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Load => "load",
            Verb::Close => "close",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a `cmd` value is not one of the known verbs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVerb(pub String);

impl FromStr for Verb {
    type Err = UnknownVerb;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownVerb(s.to_string()))
    }
}

/// Clock value of a `load` request.
///
/// Clients send either a JSON number or a string; both are forwarded to the
/// hardware tool in their textual form once they are known to parse as a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Clock {
    Number(serde_json::Number),
    Text(String),
}

impl Clock {
    /// Numeric value, or `None` if the text does not parse as a float
    pub fn value(&self) -> Option<f64> {
        match self {
            Clock::Number(n) => n.as_f64(),
            Clock::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Text handed to the hardware tool
    pub fn as_argument(&self) -> String {
        match self {
            Clock::Number(n) => n.to_string(),
            Clock::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<f64> for Clock {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(Clock::Number)
            .unwrap_or_else(|| Clock::Text(value.to_string()))
    }
}

impl From<&str> for Clock {
    fn from(value: &str) -> Self {
        Clock::Text(value.to_string())
    }
}

/// A decoded request.
///
/// `cmd` is kept as received so that unknown verbs reach the dispatcher and
/// get a usage response instead of being dropped at the framing layer. A
/// non-string `cmd` is kept as its JSON text for the same reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    #[serde(deserialize_with = "cmd_text")]
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clk: Option<Clock>,
}

impl CommandMessage {
    /// A request carrying only a verb
    pub fn new(verb: Verb) -> Self {
        Self {
            cmd: verb.as_str().to_string(),
            code: None,
            clk: None,
        }
    }

    /// A `load` request
    pub fn load(code: impl Into<String>, clk: impl Into<Clock>) -> Self {
        Self {
            cmd: Verb::Load.as_str().to_string(),
            code: Some(code.into()),
            clk: Some(clk.into()),
        }
    }

    /// Parse the `cmd` field
    pub fn verb(&self) -> Result<Verb, UnknownVerb> {
        self.cmd.parse()
    }
}

fn cmd_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}

/// Exactly one of these is produced per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success(String),
    Error(String),
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Message without the error prefix
    pub fn message(&self) -> &str {
        match self {
            Response::Success(m) | Response::Error(m) => m,
        }
    }

    /// Text as it is sent on the wire, before encoding
    pub fn to_text(&self) -> String {
        match self {
            Response::Success(m) => m.clone(),
            Response::Error(m) => format!("{ERROR_PREFIX}{m}"),
        }
    }

    /// Classify received text by its prefix
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        match text.strip_prefix(ERROR_PREFIX) {
            Some(rest) => Response::Error(rest.to_string()),
            None => Response::Success(text),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_parse_is_case_insensitive() {
        assert_eq!("OPEN".parse::<Verb>(), Ok(Verb::Open));
        assert_eq!(" Load ".parse::<Verb>(), Ok(Verb::Load));
        assert_eq!(
            "launch".parse::<Verb>(),
            Err(UnknownVerb("launch".to_string()))
        );
    }

    #[test]
    fn test_clock_accepts_number_or_string() {
        let msg: CommandMessage =
            serde_json::from_str(r#"{"cmd":"load","code":"x","clk":"1e6"}"#).unwrap();
        assert_eq!(msg.clk.as_ref().and_then(Clock::value), Some(1e6));
        assert_eq!(msg.clk.unwrap().as_argument(), "1e6");

        let msg: CommandMessage =
            serde_json::from_str(r#"{"cmd":"load","code":"x","clk":100}"#).unwrap();
        assert_eq!(msg.clk.as_ref().and_then(Clock::value), Some(100.0));
        assert_eq!(msg.clk.unwrap().as_argument(), "100");
    }

    #[test]
    fn test_non_numeric_clock() {
        assert_eq!(Clock::from("abc").value(), None);
    }

    #[test]
    fn test_missing_cmd_is_rejected() {
        let result = serde_json::from_str::<CommandMessage>(r#"{"code":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_string_cmd_is_kept_as_text() {
        let msg: CommandMessage = serde_json::from_str(r#"{"cmd":5}"#).unwrap();
        assert_eq!(msg.cmd, "5");
        assert_eq!(msg.verb(), Err(UnknownVerb("5".to_string())));

        let msg: CommandMessage = serde_json::from_str(r#"{"cmd":null}"#).unwrap();
        assert!(msg.verb().is_err());
    }

    #[test]
    fn test_response_prefix() {
        let err = Response::Error("Session busy".into());
        assert_eq!(err.to_text(), "Error: Session busy");
        assert_eq!(Response::from_text(err.to_text()), err);

        let ok = Response::from_text("Session closed.");
        assert!(!ok.is_error());
        assert_eq!(ok.message(), "Session closed.");
    }
}
