//! wlink wire protocol - commands in, status-prefixed text out
//!
//! A paired phone writes short text lines (`help`, `scan`, `list`,
//! `conn <ssid> [<password>]`) to the command characteristic. The host answers
//! on the output characteristic with the decimal status code on the first
//! line followed by the command's output, split into notification-sized
//! chunks.
//!
//! This crate is pure logic: no Bluetooth and no networking.

pub mod command;
pub mod framer;
pub mod gatt;
pub mod status;

pub use command::{Command, ParseError, parse_line};
pub use framer::{Frames, OutputChunk, frame};
pub use status::CommandResult;

/// Names of the commands the bridge understands
pub mod commands {
    pub const HELP: &str = "help";
    pub const SCAN: &str = "scan";
    pub const LIST: &str = "list";
    pub const CONN: &str = "conn";

    pub const ALL: [&str; 4] = [HELP, SCAN, LIST, CONN];
}
