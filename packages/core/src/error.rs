//! Parse errors for the text wire formats.

use thiserror::Error;

/// Error produced while parsing a command, log record, or replication
/// command from its line representation.
///
/// The `Display` text of each variant is what a client sees on its
/// response line, so the messages stay short and self-contained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The input line was empty or all whitespace.
    #[error("no command received")]
    Empty,

    /// The first token is not a recognized command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The operation token is not one of `SET`, `DELETE`, `EXPIRE`.
    #[error("unknown operation: {0}")]
    UnknownOp(String),

    /// The command carried the wrong number of tokens.
    ///
    /// Keys and values must not contain whitespace; a value with an
    /// embedded space tokenizes into surplus arguments and is rejected
    /// with this variant before it can corrupt the log stream.
    #[error("{command} {expected}")]
    Arity {
        /// The command being parsed.
        command: &'static str,
        /// Human-readable arity requirement, e.g. "requires a key and a value".
        expected: &'static str,
    },

    /// A numeric field failed to parse.
    #[error("invalid {field}: {value}")]
    InvalidNumber {
        /// Which field was malformed (e.g. "ttl", "version").
        field: &'static str,
        /// The offending token.
        value: String,
    },

    /// A record or replication command line was missing fields.
    #[error("malformed record: missing fields")]
    Truncated,
}
