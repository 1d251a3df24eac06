//! Dispatcher behaviour per command, against the mock adapter.

use std::sync::Arc;

use wlink_bridge::{Dispatcher, ScanState};
use wlink_net::AdapterError;
use wlink_proto::status::{BAD_REQUEST, FAILURE, NOT_FOUND, NOT_READY, OK, UNAVAILABLE};

use crate::mock_net::MockNetwork;

fn dispatcher(net: MockNetwork) -> (Dispatcher, Arc<MockNetwork>) {
    let net = Arc::new(net);
    (Dispatcher::new(net.clone()), net)
}

/// Let spawned scan watchers observe completion
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn conn_success() {
    let (d, _) = dispatcher(MockNetwork::new().with_network("Home Net", Some("s3cr3t!"), 80));
    let r = d.handle_line("conn \"Home Net\" \"s3cr3t!\"").await;
    assert_eq!(r.status_code, OK);
    assert_eq!(r.output, "connected to Home Net");
    assert_eq!(r.to_wire(), b"0\nconnected to Home Net");
}

#[tokio::test]
async fn conn_unknown_ssid() {
    let (d, _) = dispatcher(MockNetwork::new());
    let r = d.handle_line("conn BadSSID").await;
    assert_ne!(r.status_code, OK);
    assert_eq!(r.status_code, FAILURE);
    assert!(r.output.contains("BadSSID"), "{}", r.output);
}

#[tokio::test]
async fn conn_wrong_password() {
    let (d, _) = dispatcher(MockNetwork::new().with_network("Home", Some("right"), 80));
    let r = d.handle_line("conn Home wrong").await;
    assert_eq!(r.status_code, FAILURE);
    assert!(r.output.starts_with("failed to connect to Home: "));
    assert!(r.output.contains("Secrets were required"));
}

#[tokio::test]
async fn conn_timeout_reason() {
    let (d, _) = dispatcher(MockNetwork::new().connect_times_out());
    let r = d.handle_line("conn Home pw").await;
    assert_eq!(r.status_code, FAILURE);
    assert_eq!(r.output, "failed to connect to Home: timeout");
}

#[tokio::test]
async fn conn_with_radio_off_is_unavailable() {
    let (d, _) = dispatcher(MockNetwork::new().radio_off());
    let r = d.handle_line("conn Home pw").await;
    assert_eq!(r.status_code, UNAVAILABLE);
}

#[tokio::test]
async fn conn_password_with_spaces() {
    let (d, _) = dispatcher(MockNetwork::new().with_network("Cafe", Some("open sesame"), 50));
    let r = d.handle_line("conn Cafe open sesame").await;
    assert_eq!(r.output, "connected to Cafe");
}

#[tokio::test]
async fn conn_open_network() {
    let (d, _) = dispatcher(MockNetwork::new().with_network("Library", None, 50));
    assert_eq!(d.handle_line("conn Library").await.status_code, OK);
}

#[tokio::test]
async fn unknown_command() {
    let (d, net) = dispatcher(MockNetwork::new());
    let r = d.handle_line("foo").await;
    assert_eq!(r.status_code, NOT_FOUND);
    assert_eq!(r.output, "unknown command");
    assert_eq!(d.scan_state().current(), ScanState::Idle);
    assert_eq!(net.scans() + net.connects(), 0);
}

#[tokio::test]
async fn bad_requests() {
    let (d, net) = dispatcher(MockNetwork::new());
    for line in ["", "   ", "conn", "conn \"Home", "scan now", "list all", "help me"] {
        let r = d.handle_line(line).await;
        assert_eq!(r.status_code, BAD_REQUEST, "{line:?}");
        assert!(r.output.contains("usage:"), "{line:?}: {}", r.output);
    }
    assert_eq!(net.scans() + net.connects(), 0);

    let r = d.handle_bytes(&[0x63, 0xff]).await;
    assert_eq!(r.status_code, BAD_REQUEST);
}

#[tokio::test]
async fn help_describes_commands() {
    let (d, _) = dispatcher(MockNetwork::new());
    let r = d.handle_line("help").await;
    assert_eq!(r.status_code, OK);
    let lines: Vec<_> = r.output.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("help:"));
    assert!(lines[3].starts_with("conn <ssid> [<password>]:"));
}

#[tokio::test]
async fn command_names_ignore_case() {
    let (d, _) = dispatcher(MockNetwork::new());
    assert_eq!(d.handle_line("HELP").await.status_code, OK);
}

#[tokio::test]
async fn scan_then_list_is_not_ready() {
    let (d, net) = dispatcher(MockNetwork::new().with_network("Home", Some("pw"), 80));

    let r = d.handle_line("scan").await;
    assert_eq!(r.status_code, OK);
    assert_eq!(r.output, "scan started");
    assert_eq!(d.scan_state().current(), ScanState::Running);

    let r = d.handle_line("list").await;
    assert_eq!(r.status_code, NOT_READY);

    net.finish_scan(Ok(()));
    settle().await;
    assert!(matches!(d.scan_state().current(), ScanState::Completed(_)));

    let r = d.handle_line("list").await;
    assert_eq!(r.status_code, OK);
    assert_eq!(
        r.output,
        "SSID (BSSID) SECURITY SIGNAL (CHANNEL)\nHome (AA:BB:CC:DD:EE:00) WPA2 80 (6)"
    );
}

#[tokio::test]
async fn synchronous_scan_lists_immediately() {
    let (d, _) = dispatcher(
        MockNetwork::new()
            .with_network("Home", Some("pw"), 80)
            .with_network("Cafe", None, 40)
            .synchronous_scan(),
    );
    d.handle_line("scan").await;
    settle().await;

    let r = d.handle_line("list").await;
    assert_eq!(r.status_code, OK);
    assert_eq!(r.output.lines().count(), 3);
    assert!(r.output.contains("Cafe (AA:BB:CC:DD:EE:01) open 40 (6)"));
}

#[tokio::test]
async fn second_scan_is_a_refresh() {
    let (d, net) = dispatcher(MockNetwork::new());
    d.handle_line("scan").await;
    let r = d.handle_line("scan").await;
    assert_eq!(r.status_code, OK);
    assert_eq!(r.output, "scan already in progress");
    assert_eq!(net.scans(), 1);
}

#[tokio::test]
async fn scan_with_radio_off() {
    let (d, _) = dispatcher(MockNetwork::new().radio_off());
    let r = d.handle_line("scan").await;
    assert_eq!(r.status_code, UNAVAILABLE);
    assert!(r.output.contains("disabled"));
    assert_eq!(d.scan_state().current(), ScanState::Idle);
}

#[tokio::test]
async fn failed_background_scan_returns_to_idle() {
    let (d, net) = dispatcher(MockNetwork::new());
    d.handle_line("scan").await;
    net.finish_scan(Err(AdapterError::Tool("scan timed out".to_string())));
    settle().await;
    assert_eq!(d.scan_state().current(), ScanState::Idle);

    // a new scan may start
    d.handle_line("scan").await;
    assert_eq!(net.scans(), 2);
}

#[tokio::test]
async fn list_before_any_scan() {
    let (d, _) = dispatcher(MockNetwork::new());
    let r = d.handle_line("list").await;
    assert_eq!(r.status_code, OK);
    assert_eq!(r.output, "no networks found; run scan first");
}

#[tokio::test]
async fn list_after_empty_scan() {
    let (d, net) = dispatcher(MockNetwork::new());
    d.handle_line("scan").await;
    net.finish_scan(Ok(()));
    settle().await;
    assert_eq!(d.handle_line("list").await.output, "no networks found");
}
