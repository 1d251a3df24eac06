//! wlink bridge - BLE command channel for configuring WiFi
//!
//! ```text
//! phone ──write──► gatt ──► Peripheral ──► Dispatcher ──► NetworkOps (nmcli)
//!       ◄─notify── gatt ◄── frame(result) ◄───────────────┘
//! ```
//!
//! [`peripheral`] and [`dispatcher`] are plain async code and run in tests
//! without Bluetooth; [`gatt`] is the BlueZ glue.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gatt;
pub mod peripheral;
pub mod scan_state;

use std::sync::Arc;

pub use config::BridgeConfig;
pub use dispatcher::{Dispatcher, ExecutionGuard, Session, SessionState};
pub use error::{BridgeError, ConfigError};
pub use peripheral::{
    Accepted, LineBuffer, LineEvent, LinkSecurity, NotifyError, NotifySink, PeerId, Peripheral,
    PeripheralConfig, WriteEvent, WriteRejected,
};
pub use scan_state::{ScanState, SharedScanState};

/// Run the bridge against NetworkManager until interrupted
pub async fn run(config: &BridgeConfig) -> Result<(), BridgeError> {
    let network = Arc::new(wlink_net::Nmcli::new(config.nmcli_config()));
    gatt::serve(config, network).await
}
