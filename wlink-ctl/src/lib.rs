//! wlink-ctl
//!
//! BLE client for wlink bridges: find one, send a command line, read back
//! the status and output.
//!
//! # Example
//!
//! ```ignore
//! use wlink_ctl::ble;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     for bridge in ble::scan(5).await?.iter().filter(|d| d.is_bridge) {
//!         println!("{} ({})", bridge.name, bridge.address);
//!     }
//!
//!     let reply = ble::send(None, "scan", &ble::Timing::default()).await?;
//!     println!("{}: {}", reply.status, reply.output);
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod reply;

pub use reply::{Reply, ReplyError, command_line};
