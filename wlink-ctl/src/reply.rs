//! Client side of the wire format: building command lines and reading
//! results back.

/// Reassembled result: `status\noutput`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: i32,
    pub output: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("no reply received")]
    Empty,
    #[error("reply is not valid UTF-8")]
    NotUtf8,
    #[error("bad status line {0:?}")]
    BadStatus(String),
}

impl Reply {
    pub fn parse(bytes: &[u8]) -> Result<Self, ReplyError> {
        if bytes.is_empty() {
            return Err(ReplyError::Empty);
        }
        let text = std::str::from_utf8(bytes).map_err(|_| ReplyError::NotUtf8)?;
        let (status, output) = text.split_once('\n').unwrap_or((text, ""));
        let status = status
            .trim()
            .parse()
            .map_err(|_| ReplyError::BadStatus(status.to_string()))?;
        Ok(Self {
            status,
            output: output.to_string(),
        })
    }

    /// Status as a process exit code
    pub fn exit_code(&self) -> i32 {
        self.status.clamp(0, 255)
    }
}

/// Join arguments into one command line, quoting where needed so the
/// bridge splits them back the same way.
///
/// `["conn", "Home Net", "pw"]` -> `conn "Home Net" pw`
pub fn command_line(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"') {
                let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\"")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
