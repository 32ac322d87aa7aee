//! Slave-mode line protocol spoken with the external player.
//!
//! Commands are single lines written to the player's stdin. Answers come
//! back on stdout as `ANS_<KEY>=<VALUE>`, the value optionally wrapped in
//! single quotes. Everything else the player prints is chatter.

use std::fmt;
use thiserror::Error;

/// Prefix marking a protocol answer line
pub const ANSWER_PREFIX: &str = "ANS_";

/// Status queries issued by the poller, in order
pub const POLL_QUERIES: [Query; 3] = [Query::FileName, Query::TimePosition, Query::TimeLength];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    FileName,
    TimePosition,
    TimeLength,
}

impl Query {
    pub fn as_str(&self) -> &'static str {
        match self {
            Query::FileName => "get_file_name",
            Query::TimePosition => "get_time_pos",
            Query::TimeLength => "get_time_length",
        }
    }
}

/// A command understood by the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load a file path or URL; `append` adds to the playlist instead of replacing it
    LoadFile { target: String, append: bool },
    /// Toggle play/pause
    Pause,
    Quit,
    /// Query wrapped in `pausing_keep` so polling never resumes a paused player
    Query(Query),
}

impl Command {
    pub fn load(target: impl Into<String>, append: bool) -> Self {
        Command::LoadFile {
            target: target.into(),
            append,
        }
    }

    /// Wire form including the terminating newline
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::LoadFile { target, append } => {
                write!(f, "loadfile \"{}\"", quote_argument(target))?;
                if *append {
                    write!(f, " 1")?;
                }
                Ok(())
            }
            Command::Pause => write!(f, "pause"),
            Command::Quit => write!(f, "quit"),
            Command::Query(query) => write!(f, "pausing_keep {}", query.as_str()),
        }
    }
}

/// Escape characters that would end the quoted argument early
fn quote_argument(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' | '"' => {
                quoted.push('\\');
                quoted.push(c);
            }
            // A newline would split the command in two
            '\n' | '\r' => quoted.push(' '),
            _ => quoted.push(c),
        }
    }
    quoted
}

/// A parsed `ANS_` line. The key is lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub key: String,
    pub value: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("not a protocol answer")]
    NotAnAnswer,

    #[error("answer has no '=' separator: {line}")]
    MissingSeparator { line: String },

    #[error("answer has an empty key: {line}")]
    EmptyKey { line: String },
}

/// Parse one output line.
///
/// Grammar: `"ANS_" KEY "=" VALUE`, where KEY is non-empty and VALUE is the
/// rest of the line (it may itself contain `=`). Surrounding whitespace is
/// trimmed and one pair of wrapping single quotes is removed.
pub fn parse_answer(line: &str) -> Result<Answer, ProtocolError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let rest = line
        .strip_prefix(ANSWER_PREFIX)
        .ok_or(ProtocolError::NotAnAnswer)?;

    let (key, value) = rest
        .split_once('=')
        .ok_or_else(|| ProtocolError::MissingSeparator {
            line: line.to_string(),
        })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(ProtocolError::EmptyKey {
            line: line.to_string(),
        });
    }

    Ok(Answer {
        key: key.to_lowercase(),
        value: unquote(value.trim()).to_string(),
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}
