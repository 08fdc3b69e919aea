//! Newline-delimited codec for TCP framing
//!
//! Every message, in both directions, is framed as:
//! ```text
//! [ percent-plus-encoded UTF-8 payload ][ '\n' ]
//! ```
//!
//! Requests carry a JSON object, responses carry plain text. The payload is
//! percent-encoded as a whole, so it can never contain a bare delimiter.

use bytes::{Bytes, BytesMut};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

use crate::{CommandMessage, Response};

/// Frame terminator
pub const DELIMITER: u8 = b'\n';

/// Maximum frame size (10 MB) to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Characters left as-is besides ASCII alphanumerics. Space is handled
/// separately and becomes `+`.
const PLUS_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes without delimiter (max: {max})", max = MAX_FRAME_SIZE)]
    FrameTooLarge(usize),

    #[error("Frame is not valid UTF-8 after percent-decoding")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Frame is not valid UTF-8")]
    InvalidFrameText,
}

impl CodecError {
    /// Whether the stream is still usable after this error.
    ///
    /// A malformed payload only spoils its own frame; an oversized frame
    /// leaves no reliable way to find the next delimiter.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CodecError::FrameTooLarge(_))
    }
}

/// Percent-encode text, writing spaces as `+`
pub fn percent_plus_encode(text: &str) -> String {
    utf8_percent_encode(text, PLUS_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

/// Inverse of [`percent_plus_encode`]
pub fn percent_plus_decode(text: &str) -> Result<String, CodecError> {
    let spaced = text.replace('+', " ");
    let decoded = percent_decode_str(&spaced).decode_utf8()?;
    Ok(decoded.into_owned())
}

/// Normalise response text: CRLF becomes LF and surrounding whitespace is trimmed
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

fn frame(payload: &str) -> Bytes {
    let encoded = percent_plus_encode(payload);
    let mut buf = BytesMut::with_capacity(encoded.len() + 1);
    buf.extend_from_slice(encoded.as_bytes());
    buf.extend_from_slice(&[DELIMITER]);
    buf.freeze()
}

fn unframe(frame: &[u8]) -> Result<String, CodecError> {
    let body = frame.strip_suffix(&[DELIMITER]).unwrap_or(frame);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    let text = std::str::from_utf8(body).map_err(|_| CodecError::InvalidFrameText)?;
    percent_plus_decode(text)
}

/// Encode a response into a delimited frame
pub fn encode(response: &Response) -> Bytes {
    frame(&normalize_text(&response.to_text()))
}

/// Encode a request into a delimited frame
pub fn encode_command(message: &CommandMessage) -> Result<Bytes, CodecError> {
    let json = serde_json::to_string(message)?;
    Ok(frame(&json))
}

/// Decode one request frame (with or without its delimiter)
pub fn decode(frame: &[u8]) -> Result<CommandMessage, CodecError> {
    let json = unframe(frame)?;
    Ok(serde_json::from_str(&json)?)
}

/// Decode one response frame (with or without its delimiter)
pub fn decode_response(frame: &[u8]) -> Result<Response, CodecError> {
    Ok(Response::from_text(unframe(frame)?))
}

/// Accumulates stream bytes and splits them into frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial frame data being accumulated
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no delimiter
    scanned: usize,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            scanned: 0,
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Split off the next complete frame, delimiter included
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a delimiter was found
    /// - `Ok(None)` if more data is needed
    /// - `Err(FrameTooLarge)` if the buffer outgrew [`MAX_FRAME_SIZE`]
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, CodecError> {
        let found = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == DELIMITER)
            .map(|offset| self.scanned + offset);

        match found {
            Some(pos) if pos > MAX_FRAME_SIZE => Err(CodecError::FrameTooLarge(pos)),
            Some(pos) => {
                self.scanned = 0;
                Ok(Some(self.buffer.split_to(pos + 1).freeze()))
            }
            None => {
                self.scanned = self.buffer.len();
                if self.buffer.len() > MAX_FRAME_SIZE {
                    Err(CodecError::FrameTooLarge(self.buffer.len()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Try to decode the next request from the buffer
    ///
    /// A malformed frame is consumed before its error is returned, so calling
    /// again continues with the following frame.
    pub fn decode_next(&mut self) -> Result<Option<CommandMessage>, CodecError> {
        match self.next_frame()? {
            Some(frame) => decode(&frame).map(Some),
            None => Ok(None),
        }
    }

    /// Try to decode the next response from the buffer
    pub fn decode_next_response(&mut self) -> Result<Option<Response>, CodecError> {
        match self.next_frame()? {
            Some(frame) => decode_response(&frame).map(Some),
            None => Ok(None),
        }
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
