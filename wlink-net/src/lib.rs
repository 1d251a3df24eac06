//! wlink network operations
//!
//! The [`NetworkOps`] trait is the only way the bridge touches the host's
//! WiFi stack. [`Nmcli`] implements it on top of NetworkManager's CLI.
//!
//! # Note
//! Scanning is asynchronous: `start_scan` returns a [`ScanHandle`] right
//! away and `list_networks` only ever reports the last *completed* scan.

pub mod nmcli;
pub mod wifi;

pub use nmcli::{Nmcli, NmcliConfig};
pub use wifi::*;
