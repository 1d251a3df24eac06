//! BLE client for wlink bridges
//!
//! Scans, connects and runs one command per connection.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info};
use wlink_proto::gatt;

use crate::reply::Reply;

/// A discovered BLE device
#[derive(Debug, Clone)]
pub struct BridgeDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    /// Advertises the wlink service
    pub is_bridge: bool,
}

/// How long to look and listen
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub scan: Duration,
    /// Wait for the first chunk of the reply (covers a slow `conn`)
    pub reply_timeout: Duration,
    /// Reply is complete once no chunk arrived for this long
    pub quiet: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            scan: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(60),
            quiet: Duration::from_millis(500),
        }
    }
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, Box<dyn std::error::Error>> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or_else(|| "No Bluetooth adapter found".into())
}

/// Scan for BLE devices; bridges have `is_bridge = true`
pub async fn scan(duration_secs: u64) -> Result<Vec<BridgeDevice>, Box<dyn std::error::Error>> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let mut devices = Vec::new();
    for peripheral in adapter.peripherals().await? {
        if let Some(props) = peripheral.properties().await? {
            devices.push(BridgeDevice {
                name: props.local_name.unwrap_or_else(|| "Unknown".to_string()),
                address: peripheral.address().to_string(),
                rssi: props.rssi,
                is_bridge: props.services.contains(&gatt::SERVICE_UUID),
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find a bridge by name/address pattern, or the first one advertising the
/// wlink service
pub async fn find_device(
    target: Option<&str>,
    scan_for: Duration,
) -> Result<Peripheral, Box<dyn std::error::Error>> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(scan_for).await;

    for peripheral in adapter.peripherals().await? {
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        let name = props.local_name.unwrap_or_default();
        let addr = peripheral.address().to_string();

        let matches = match target {
            Some(t) => name.contains(t) || addr.eq_ignore_ascii_case(t),
            None => props.services.contains(&gatt::SERVICE_UUID),
        };

        if matches {
            adapter.stop_scan().await?;
            info!("found bridge {name} ({addr})");
            return Ok(peripheral);
        }
    }

    adapter.stop_scan().await?;
    Err("No wlink bridge found".into())
}

/// Send one command line and wait for the complete reply
pub async fn send(
    target: Option<&str>,
    line: &str,
    timing: &Timing,
) -> Result<Reply, Box<dyn std::error::Error>> {
    let mut payload = line.as_bytes().to_vec();
    payload.push(b'\n');
    if payload.len() > gatt::MAX_ATTRIBUTE_LEN {
        return Err("command line too long".into());
    }

    let device = find_device(target, timing.scan).await?;
    device.connect().await?;
    info!("connected");

    let reply = exchange(&device, &payload, timing).await;
    let _ = device.disconnect().await;
    reply
}

async fn exchange(
    device: &Peripheral,
    payload: &[u8],
    timing: &Timing,
) -> Result<Reply, Box<dyn std::error::Error>> {
    device.discover_services().await?;
    let characteristics = device.characteristics();

    let command = characteristics
        .iter()
        .find(|c| c.uuid == gatt::COMMAND_UUID)
        .ok_or("Command characteristic not found")?;
    let output = characteristics
        .iter()
        .find(|c| c.uuid == gatt::OUTPUT_UUID)
        .ok_or("Output characteristic not found")?;

    device.subscribe(output).await?;
    let mut notifications = device.notifications().await?;

    device.write(command, payload, WriteType::WithResponse).await?;

    let mut received = Vec::new();
    let mut wait = timing.reply_timeout;
    loop {
        match tokio::time::timeout(wait, notifications.next()).await {
            Ok(Some(n)) if n.uuid == gatt::OUTPUT_UUID => {
                debug!("chunk of {} bytes", n.value.len());
                received.extend_from_slice(&n.value);
                wait = timing.quiet;
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }

    Ok(Reply::parse(&received)?)
}
