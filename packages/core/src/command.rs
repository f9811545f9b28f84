//! Client command parsing at the router boundary.
//!
//! One request per line; tokens are separated by one or more spaces and
//! the first token is case-insensitive. Because tokenization splits on
//! whitespace, a key or value containing a space produces surplus
//! tokens and the command is rejected on arity, so unescapable input
//! never reaches the commit log.

use crate::error::WireError;
use crate::repcmd::{RepCommand, REP_TOKEN};
use crate::types::TTL_NO_EXPIRY;

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET key value [ttl_seconds]` -- missing TTL means no expiry.
    Set {
        key: String,
        value: String,
        ttl_seconds: i64,
    },
    /// `GET key`
    Get { key: String },
    /// `DELETE key`
    Delete { key: String },
    /// `EXPIRE key ttl_seconds`
    Expire { key: String, ttl_seconds: i64 },
    /// `TTL key`
    Ttl { key: String },
    /// `PING`
    Ping,
    /// `VERSION`
    Version,
    /// `SHUTDOWN` -- graceful stop.
    Shutdown,
    /// `REP ...` -- a replication command from a peer.
    Replicate(RepCommand),
}

impl Command {
    /// Parses one request line.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Empty`] for a blank line,
    /// [`WireError::UnknownCommand`] for an unrecognized opcode,
    /// [`WireError::Arity`] for a wrong token count, and
    /// [`WireError::InvalidNumber`] for a non-numeric TTL.
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&first, args)) = tokens.split_first() else {
            return Err(WireError::Empty);
        };

        let opcode = first.to_ascii_uppercase();
        match opcode.as_str() {
            "SET" => parse_set(args),
            "GET" => Ok(Command::Get {
                key: single_key("GET", args)?,
            }),
            "DELETE" => Ok(Command::Delete {
                key: single_key("DELETE", args)?,
            }),
            "EXPIRE" => parse_expire(args),
            "TTL" => Ok(Command::Ttl {
                key: single_key("TTL", args)?,
            }),
            "PING" => Ok(Command::Ping),
            "VERSION" => Ok(Command::Version),
            "SHUTDOWN" => Ok(Command::Shutdown),
            REP_TOKEN => Ok(Command::Replicate(RepCommand::from_args(args)?)),
            _ => Err(WireError::UnknownCommand(opcode)),
        }
    }
}

fn parse_set(args: &[&str]) -> Result<Command, WireError> {
    match args {
        [key, value] => Ok(Command::Set {
            key: (*key).to_string(),
            value: (*value).to_string(),
            ttl_seconds: TTL_NO_EXPIRY,
        }),
        [key, value, ttl] => Ok(Command::Set {
            key: (*key).to_string(),
            value: (*value).to_string(),
            ttl_seconds: parse_ttl(ttl)?,
        }),
        _ => Err(WireError::Arity {
            command: "SET",
            expected: "requires a key and a value",
        }),
    }
}

fn parse_expire(args: &[&str]) -> Result<Command, WireError> {
    match args {
        [key, ttl] => Ok(Command::Expire {
            key: (*key).to_string(),
            ttl_seconds: parse_ttl(ttl)?,
        }),
        _ => Err(WireError::Arity {
            command: "EXPIRE",
            expected: "requires a key and a TTL",
        }),
    }
}

fn single_key(command: &'static str, args: &[&str]) -> Result<String, WireError> {
    match args {
        [key] => Ok((*key).to_string()),
        _ => Err(WireError::Arity {
            command,
            expected: "requires a key",
        }),
    }
}

fn parse_ttl(token: &str) -> Result<i64, WireError> {
    token.parse().map_err(|_| WireError::InvalidNumber {
        field: "ttl",
        value: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use crate::op::Op;

    use super::*;

    #[test]
    fn set_without_ttl_defaults_to_no_expiry() {
        assert_eq!(
            Command::parse("SET a b").unwrap(),
            Command::Set {
                key: "a".to_string(),
                value: "b".to_string(),
                ttl_seconds: TTL_NO_EXPIRY,
            }
        );
    }

    #[test]
    fn set_with_ttl() {
        assert_eq!(
            Command::parse("set x y 2").unwrap(),
            Command::Set {
                key: "x".to_string(),
                value: "y".to_string(),
                ttl_seconds: 2,
            }
        );
    }

    #[test]
    fn opcode_is_case_insensitive() {
        assert_eq!(Command::parse("ping").unwrap(), Command::Ping);
        assert_eq!(Command::parse("Version").unwrap(), Command::Version);
        assert_eq!(Command::parse("shutdown").unwrap(), Command::Shutdown);
        assert_eq!(
            Command::parse("get a").unwrap(),
            Command::Get { key: "a".to_string() }
        );
    }

    #[test]
    fn tolerates_repeated_separators() {
        assert_eq!(
            Command::parse("  delete   a  ").unwrap(),
            Command::Delete { key: "a".to_string() }
        );
    }

    #[test]
    fn empty_line_is_rejected() {
        assert_eq!(Command::parse("").unwrap_err(), WireError::Empty);
        assert_eq!(Command::parse("   \t ").unwrap_err(), WireError::Empty);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert_eq!(
            Command::parse("rename a b").unwrap_err(),
            WireError::UnknownCommand("RENAME".to_string())
        );
    }

    #[test]
    fn arity_violations_are_rejected() {
        assert!(matches!(
            Command::parse("SET a").unwrap_err(),
            WireError::Arity { command: "SET", .. }
        ));
        assert!(matches!(
            Command::parse("GET").unwrap_err(),
            WireError::Arity { command: "GET", .. }
        ));
        assert!(matches!(
            Command::parse("GET a b").unwrap_err(),
            WireError::Arity { command: "GET", .. }
        ));
        assert!(matches!(
            Command::parse("EXPIRE a").unwrap_err(),
            WireError::Arity { command: "EXPIRE", .. }
        ));
        assert!(matches!(
            Command::parse("TTL a b").unwrap_err(),
            WireError::Arity { command: "TTL", .. }
        ));
    }

    #[test]
    fn values_with_spaces_cannot_pass() {
        // "a b c d" tokenizes to four SET arguments; nothing with an
        // embedded space can reach the log stream.
        assert!(matches!(
            Command::parse("SET key some value here").unwrap_err(),
            WireError::Arity { command: "SET", .. }
        ));
    }

    #[test]
    fn non_numeric_ttl_is_rejected() {
        assert!(matches!(
            Command::parse("SET a b soon").unwrap_err(),
            WireError::InvalidNumber { field: "ttl", .. }
        ));
        assert!(matches!(
            Command::parse("EXPIRE a never").unwrap_err(),
            WireError::InvalidNumber { field: "ttl", .. }
        ));
    }

    #[test]
    fn negative_and_zero_ttls_parse() {
        // ttl <= 0 means "no expiry" downstream; the parser passes it through.
        assert_eq!(
            Command::parse("SET a b 0").unwrap(),
            Command::Set {
                key: "a".to_string(),
                value: "b".to_string(),
                ttl_seconds: 0,
            }
        );
        assert_eq!(
            Command::parse("EXPIRE a -5").unwrap(),
            Command::Expire {
                key: "a".to_string(),
                ttl_seconds: -5,
            }
        );
    }

    #[test]
    fn rep_line_parses_into_replication_command() {
        let parsed = Command::parse("REP 0 127.0.0.1:7690 5 2 SET k v -1").unwrap();
        let Command::Replicate(cmd) = parsed else {
            panic!("expected a replication command");
        };
        assert_eq!(cmd.partition_id, 0);
        assert_eq!(cmd.origin, "127.0.0.1:7690");
        assert_eq!(cmd.op, Op::Set);
        assert_eq!(cmd.args, vec!["k", "v", "-1"]);
    }

    #[test]
    fn truncated_rep_line_is_rejected() {
        assert_eq!(
            Command::parse("REP 0 node").unwrap_err(),
            WireError::Truncated
        );
    }
}
