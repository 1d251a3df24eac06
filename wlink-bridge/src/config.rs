//! Bridge configuration
//!
//! A JSON file, every field optional:
//!
//! ```json
//! { "device_name": "livingroom-pi", "interface": "wlan0", "max_payload": 180 }
//! ```
//!
//! Looked up at `--config <path>`, else `$WLINK_HOME/config.json`, else
//! `<user config dir>/wlink/config.json`. A missing default file means all
//! defaults; a missing explicit file is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use wlink_net::NmcliConfig;

use crate::error::ConfigError;
use crate::peripheral::PeripheralConfig;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bluetooth adapter (e.g. `hci0`); the default adapter when unset
    pub adapter: Option<String>,
    /// Advertised name; the host name when unset
    pub device_name: Option<String>,
    /// WiFi interface handed to nmcli (`ifname`)
    pub interface: Option<String>,
    /// nmcli binary
    pub nmcli: String,
    pub max_payload: usize,
    pub max_line_len: usize,
    pub connect_timeout_secs: u64,
    pub scan_timeout_secs: u64,
    pub disconnect_poll_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            device_name: None,
            interface: None,
            nmcli: "nmcli".to_string(),
            max_payload: 509,
            max_line_len: 512,
            connect_timeout_secs: 45,
            scan_timeout_secs: 30,
            disconnect_poll_secs: 2,
        }
    }
}

/// `$WLINK_HOME`, else `<user config dir>/wlink`
pub fn wlink_home() -> Option<PathBuf> {
    match std::env::var_os("WLINK_HOME") {
        Some(home) => Some(PathBuf::from(home)),
        None => dirs::config_dir().map(|d| d.join("wlink")),
    }
}

impl BridgeConfig {
    pub fn default_path() -> Option<PathBuf> {
        wlink_home().map(|home| home.join("config.json"))
    }

    /// Load from `explicit` if given, else from the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn to_json(&self) -> String {
        // a struct of strings and integers always serializes
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Name to advertise under
    pub fn device_name(&self) -> String {
        self.device_name.clone().unwrap_or_else(host_name)
    }

    pub fn nmcli_config(&self) -> NmcliConfig {
        NmcliConfig {
            program: self.nmcli.clone(),
            interface: self.interface.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            scan_timeout: Duration::from_secs(self.scan_timeout_secs),
        }
    }

    pub fn peripheral_config(&self) -> PeripheralConfig {
        PeripheralConfig {
            max_payload: self.max_payload,
            max_line_len: self.max_line_len,
        }
    }

    pub fn disconnect_poll(&self) -> Duration {
        Duration::from_secs(self.disconnect_poll_secs.max(1))
    }
}

fn host_name() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| std::fs::read_to_string("/etc/hostname"))
        .map(|name| name.trim().to_string())
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "wlink".to_string())
}
