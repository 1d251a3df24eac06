//! WiFi operation types and the `NetworkOps` trait
//!
//! The bridge never talks to the WiFi stack directly. Everything goes through
//! [`NetworkOps`], which implementations back with NetworkManager, a test
//! fake, or anything else that honours the contract below.

use std::fmt;

use tokio::sync::oneshot;

/// One visible network from the most recent completed scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: String,
    pub bssid: String,
    /// 0-100, as NetworkManager reports it
    pub signal_strength: u8,
    /// e.g. `WPA2`, `WPA1 WPA2`, or empty for open networks
    pub security: String,
    pub channel: u16,
    /// We are currently associated with this network
    pub in_use: bool,
}

impl NetworkInfo {
    pub fn is_open(&self) -> bool {
        self.security.is_empty() || self.security == "--"
    }
}

/// `*Home (AA:BB:CC:DD:EE:FF) WPA2 70 (6)`
impl fmt::Display for NetworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.in_use { "*" } else { "" };
        let security = if self.is_open() { "open" } else { &self.security };
        write!(
            f,
            "{marker}{} ({}) {security} {} ({})",
            self.ssid, self.bssid, self.signal_strength, self.channel
        )
    }
}

/// Result of a successful connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub ssid: String,
    /// Whatever the network tool reported, for the logs
    pub detail: String,
}

/// The radio or the tool behind it cannot be used
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("wifi unavailable: {0}")]
    Unavailable(String),
    #[error("network tool failed: {0}")]
    Tool(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("no network with SSID {ssid}")]
    NotFound { ssid: String },
    #[error("{0}")]
    BadCredentials(String),
    #[error("timeout")]
    Timeout,
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl ConnectError {
    /// Short human readable reason sent back to the client
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Completion side of a background scan
#[derive(Debug)]
pub struct ScanCompletion {
    tx: oneshot::Sender<Result<(), AdapterError>>,
}

impl ScanCompletion {
    pub fn finish(self, result: Result<(), AdapterError>) {
        // the waiting side may be gone (bridge shutting down); nothing to do then
        let _ = self.tx.send(result);
    }
}

/// Handle to a scan started by [`NetworkOps::start_scan`]
#[derive(Debug)]
pub struct ScanHandle {
    rx: oneshot::Receiver<Result<(), AdapterError>>,
}

impl ScanHandle {
    /// A pending scan plus the completion its producer must eventually finish
    pub fn pending() -> (ScanCompletion, ScanHandle) {
        let (tx, rx) = oneshot::channel();
        (ScanCompletion { tx }, ScanHandle { rx })
    }

    /// A scan that already finished (adapters that scan synchronously)
    pub fn completed(result: Result<(), AdapterError>) -> Self {
        let (done, handle) = Self::pending();
        done.finish(result);
        handle
    }

    /// Wait until the scan finishes
    pub async fn wait(self) -> Result<(), AdapterError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Tool("scan abandoned".to_string())),
        }
    }
}

/// Boundary to the host's WiFi stack
///
/// - `start_scan` returns as soon as the scan is running; the handle reports
///   completion. Fails with [`AdapterError`] when the radio is unavailable.
/// - `list_networks` reflects the most recent *completed* scan and is empty
///   before the first one.
/// - `connect` resolves once the attempt succeeded or definitely failed,
///   bounded by the implementation's own timeout.
#[async_trait::async_trait]
pub trait NetworkOps: Send + Sync {
    async fn start_scan(&self) -> Result<ScanHandle, AdapterError>;

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, AdapterError>;

    async fn connect(
        &self,
        ssid: &str,
        password: Option<&str>,
    ) -> Result<ConnectOutcome, ConnectError>;
}
