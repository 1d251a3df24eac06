//! NetworkManager backend: `NetworkOps` on top of the `nmcli` tool
//!
//! - scan: `nmcli device wifi list --rescan yes` runs in a background task;
//!   its parsed output becomes the cache `list_networks` serves
//! - connect: `nmcli --wait <secs> device wifi connect <ssid> [password <pw>]`

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::process::Command;

use crate::wifi::{AdapterError, ConnectError, ConnectOutcome, NetworkInfo, NetworkOps, ScanHandle};

const LIST_FIELDS: &str = "IN-USE,BSSID,SSID,SECURITY,SIGNAL,CHAN";

// nmcli exit codes (see nmcli(1), EXIT STATUS)
const EXIT_TIMEOUT: i32 = 3;
const EXIT_NM_NOT_RUNNING: i32 = 8;
const EXIT_NOT_FOUND: i32 = 10;

/// How to reach NetworkManager
#[derive(Debug, Clone)]
pub struct NmcliConfig {
    /// Path or name of the `nmcli` binary
    pub program: String,
    /// Restrict operations to one WiFi interface (e.g. `wlan0`)
    pub interface: Option<String>,
    pub connect_timeout: Duration,
    pub scan_timeout: Duration,
}

impl Default for NmcliConfig {
    fn default() -> Self {
        Self {
            program: "nmcli".to_string(),
            interface: None,
            connect_timeout: Duration::from_secs(45),
            scan_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct Nmcli {
    config: Arc<NmcliConfig>,
    cache: Arc<Mutex<Vec<NetworkInfo>>>,
}

/// Exit status plus everything the tool printed (stdout then stderr)
struct ToolOutput {
    code: Option<i32>,
    text: String,
}

impl ToolOutput {
    fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl Nmcli {
    pub fn new(config: NmcliConfig) -> Self {
        Self {
            config: Arc::new(config),
            cache: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<ToolOutput, AdapterError> {
        let output = Command::new(&self.config.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AdapterError::Unavailable(format!("cannot run {}: {e}", self.config.program))
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ToolOutput {
            code: output.status.code(),
            text: text.trim().to_string(),
        })
    }

    fn with_interface<'a>(&'a self, mut args: Vec<&'a str>) -> Vec<&'a str> {
        if let Some(ifname) = &self.config.interface {
            args.push("ifname");
            args.push(ifname);
        }
        args
    }

    /// Fails unless NetworkManager is running and the WiFi radio is on
    async fn check_radio(&self) -> Result<(), AdapterError> {
        let out = self.run(&["-t", "-f", "WIFI", "radio"]).await?;
        if !out.success() {
            return Err(AdapterError::Unavailable(out.text));
        }
        match out.text.as_str() {
            "enabled" => Ok(()),
            other => Err(AdapterError::Unavailable(format!("wifi radio is {other}"))),
        }
    }

    fn store(&self, networks: Vec<NetworkInfo>) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = networks;
    }

    async fn scan_to_cache(&self) -> Result<(), AdapterError> {
        let args = self.with_interface(vec![
            "-m", "multiline", "-f", LIST_FIELDS, "device", "wifi", "list", "--rescan", "yes",
        ]);

        let out = tokio::time::timeout(self.config.scan_timeout, self.run(&args))
            .await
            .map_err(|_| AdapterError::Tool("scan timed out".to_string()))??;

        if !out.success() {
            return Err(AdapterError::Tool(out.text));
        }

        let networks = parse_networks(&out.text);
        info!("wifi scan finished, {} networks visible", networks.len());
        self.store(networks);
        Ok(())
    }
}

#[async_trait::async_trait]
impl NetworkOps for Nmcli {
    async fn start_scan(&self) -> Result<ScanHandle, AdapterError> {
        self.check_radio().await?;

        let (done, handle) = ScanHandle::pending();
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.scan_to_cache().await;
            if let Err(e) = &result {
                warn!("wifi scan failed: {e}");
            }
            done.finish(result);
        });

        Ok(handle)
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, AdapterError> {
        Ok(self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn connect(
        &self,
        ssid: &str,
        password: Option<&str>,
    ) -> Result<ConnectOutcome, ConnectError> {
        let wait = self.config.connect_timeout.as_secs().max(1).to_string();
        let mut args = vec!["--wait", wait.as_str(), "device", "wifi", "connect", ssid];
        if let Some(password) = password {
            args.push("password");
            args.push(password);
        }
        let args = self.with_interface(args);

        info!("connecting to {ssid:?}");
        // nmcli enforces --wait itself; the outer bound only catches a hung tool
        let bound = self.config.connect_timeout + Duration::from_secs(5);
        let out = tokio::time::timeout(bound, self.run(&args))
            .await
            .map_err(|_| ConnectError::Timeout)??;

        debug!("nmcli connect exited with {:?}: {}", out.code, out.text);
        classify_connect(ssid, out)
    }
}

fn classify_connect(ssid: &str, out: ToolOutput) -> Result<ConnectOutcome, ConnectError> {
    let reason = out.text.trim_start_matches("Error: ").to_string();
    match out.code {
        Some(0) => Ok(ConnectOutcome {
            ssid: ssid.to_string(),
            detail: out.text,
        }),
        Some(EXIT_NOT_FOUND) => Err(ConnectError::NotFound {
            ssid: ssid.to_string(),
        }),
        Some(EXIT_TIMEOUT) => Err(ConnectError::Timeout),
        Some(EXIT_NM_NOT_RUNNING) => Err(AdapterError::Unavailable(reason).into()),
        _ if looks_like_bad_secret(&reason) => Err(ConnectError::BadCredentials(reason)),
        _ => Err(ConnectError::Failed(reason)),
    }
}

fn looks_like_bad_secret(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("secrets were required") || text.contains("password")
}

/// Parse `nmcli -m multiline` output into key/value records.
///
/// Each line is `KEY:   value`; a record ends when a key repeats.
pub fn parse_multiline(text: &str) -> Vec<Vec<(String, String)>> {
    let mut records = Vec::new();
    let mut current: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if current.iter().any(|(k, _)| k == key) {
            records.push(std::mem::take(&mut current));
        }
        current.push((key.to_string(), value.trim().to_string()));
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// Networks from `device wifi list` multiline output, hidden SSIDs skipped
pub fn parse_networks(text: &str) -> Vec<NetworkInfo> {
    parse_multiline(text)
        .into_iter()
        .filter_map(|record| {
            let field = |name: &str| {
                record
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.as_str())
                    .unwrap_or_default()
            };
            let ssid = field("SSID");
            if ssid.is_empty() || ssid == "--" {
                return None;
            }
            Some(NetworkInfo {
                ssid: ssid.to_string(),
                bssid: field("BSSID").to_string(),
                signal_strength: field("SIGNAL").parse().unwrap_or(0),
                security: field("SECURITY").to_string(),
                channel: field("CHAN").parse().unwrap_or(0),
                in_use: field("IN-USE") == "*",
            })
        })
        .collect()
}
