//! Status codes and the result envelope
//!
//! Codes follow the POSIX exit-code convention so a terminal user can read
//! them the same way they would read `$?`.

use std::fmt;

pub const OK: i32 = 0;
/// Generic failure (e.g. the connection attempt did not succeed)
pub const FAILURE: i32 = 1;
/// Malformed or empty command line, bad arguments
pub const BAD_REQUEST: i32 = 2;
/// A command is already executing on this connection (EBUSY)
pub const BUSY: i32 = 16;
/// WiFi radio or network tool not available (EX_UNAVAILABLE)
pub const UNAVAILABLE: i32 = 69;
/// Result not ready yet, try again (EX_TEMPFAIL)
pub const NOT_READY: i32 = 75;
/// Unknown command (the shell's "command not found")
pub const NOT_FOUND: i32 = 127;

/// Outcome of one command: status code plus textual output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub status_code: i32,
    pub output: String,
}

impl CommandResult {
    pub fn new(status_code: i32, output: impl Into<String>) -> Self {
        Self {
            status_code,
            output: output.into(),
        }
    }

    pub fn ok(output: impl Into<String>) -> Self {
        Self::new(OK, output)
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self::new(FAILURE, output)
    }

    pub fn bad_request(output: impl Into<String>) -> Self {
        Self::new(BAD_REQUEST, output)
    }

    pub fn busy() -> Self {
        Self::new(BUSY, "busy: a command is already running")
    }

    pub fn unavailable(output: impl Into<String>) -> Self {
        Self::new(UNAVAILABLE, output)
    }

    pub fn not_ready(output: impl Into<String>) -> Self {
        Self::new(NOT_READY, output)
    }

    pub fn unknown_command() -> Self {
        Self::new(NOT_FOUND, "unknown command")
    }

    pub fn is_success(&self) -> bool {
        self.status_code == OK
    }

    /// The first line sent to the client: the decimal status and a newline
    pub fn status_line(&self) -> String {
        format!("{}\n", self.status_code)
    }

    /// Status line followed by output, as it goes over the wire
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = self.status_line().into_bytes();
        buf.extend_from_slice(self.output.as_bytes());
        buf
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.status_line(), self.output)
    }
}
