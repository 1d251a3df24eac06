//! Command line parsing
//!
//! A line is split on whitespace. Double-quoted tokens may contain spaces and
//! the escapes `\"` and `\\`. For `conn` everything after the SSID is the
//! password, so passwords with embedded spaces work without quoting:
//!
//! ```text
//! conn "Home Net" "s3cr3t!"   -> ["Home Net", "s3cr3t!"]
//! conn Cafe open sesame       -> ["Cafe", "open sesame"]
//! ```

use std::fmt;

use crate::commands;

/// One parsed command line
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command line")]
    Empty,
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("command line is not valid UTF-8")]
    InvalidUtf8,
    #[error("command line longer than {limit} bytes")]
    TooLong { limit: usize },
}

impl ParseError {
    /// Text sent back to the client alongside the bad-request status
    pub fn client_message(&self) -> String {
        format!(
            "{self}\nusage: help | scan | list | conn <ssid> [<password>]"
        )
    }
}

impl Command {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Command name compared case-insensitively (phone keyboards like to
    /// capitalise the first letter)
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Debug and Display never show the `conn` password, so a command can be
/// logged as-is.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.is(commands::CONN) && i > 0 {
                write!(f, " ****")?;
            } else {
                write!(f, " {arg:?}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({self})")
    }
}

/// Parse raw bytes of one line
pub fn parse_bytes(raw: &[u8]) -> Result<Command, ParseError> {
    let line = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8)?;
    parse_line(line)
}

/// Parse one line (a trailing `\n` or `\r\n` is ignored)
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);

    let (name, mut rest) = match next_token(line)? {
        Some(t) => t,
        None => return Err(ParseError::Empty),
    };

    let mut args = Vec::new();

    if name.eq_ignore_ascii_case(commands::CONN) {
        if let Some((ssid, after)) = next_token(rest)? {
            args.push(ssid);
            if let Some(password) = rest_of_line(after)? {
                args.push(password);
            }
        }
        return Ok(Command { name, args });
    }

    while let Some((token, after)) = next_token(rest)? {
        args.push(token);
        rest = after;
    }

    Ok(Command { name, args })
}

/// The remainder of a line as one argument: a single quoted token is
/// unquoted, anything else is kept verbatim (trimmed).
fn rest_of_line(s: &str) -> Result<Option<String>, ParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if s.starts_with('"') {
        if let Some((token, after)) = next_token(s)? {
            if after.trim().is_empty() {
                return Ok(Some(token));
            }
        }
    }
    Ok(Some(s.to_string()))
}

/// Split off the next token, returning it with the unconsumed remainder
fn next_token(s: &str) -> Result<Option<(String, &str)>, ParseError> {
    let s = s.trim_start();
    if s.is_empty() {
        return Ok(None);
    }

    if let Some(quoted) = s.strip_prefix('"') {
        let mut token = String::new();
        let mut chars = quoted.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return Ok(Some((token, &quoted[i + 1..]))),
                '\\' => match chars.next() {
                    Some((_, e @ ('"' | '\\'))) => token.push(e),
                    Some((_, other)) => {
                        token.push('\\');
                        token.push(other);
                    }
                    None => return Err(ParseError::UnterminatedQuote),
                },
                c => token.push(c),
            }
        }
        return Err(ParseError::UnterminatedQuote);
    }

    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    Ok(Some((s[..end].to_string(), &s[end..])))
}
