//! Error taxonomy for the streaming core.
//!
//! Per-field wire damage is recoverable and never surfaces here; these types
//! cover the failures that end a record or a pipeline.

use thiserror::Error;

/// A wire record could not be decoded into a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The record carried no `type` field, so it cannot be classified.
    #[error("record is missing its type field")]
    MissingType,

    /// The record's `type` field held a value this version does not know.
    #[error("unknown frame type {0}")]
    UnknownType(u32),

    /// A record length prefix was negative or implausibly large.
    #[error("bad record length {0}")]
    BadLength(i64),

    /// A frame of one kind arrived where the protocol requires another,
    /// e.g. the first record of a stream was not a header.
    #[error("received frame of unexpected type {found} (expected {expected})")]
    UnexpectedFrameType {
        expected: &'static str,
        found: &'static str,
    },
}

/// The lossy sink (or the pipe beneath it) can no longer move bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// No reader is attached to the downstream end.
    #[error("downstream reader disconnected")]
    Disconnected,
}

/// An external encoder or decoder failed. Fatal to its pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("codec error: {message}")]
pub struct CodecError {
    message: String,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Umbrella error for pipeline and session operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SinkError> for std::io::Error {
    fn from(err: SinkError) -> Self {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, err)
    }
}
