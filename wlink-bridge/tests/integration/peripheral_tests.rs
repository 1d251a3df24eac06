//! Peripheral: encryption gate, line assembly, busy handling, framing.

use std::sync::Arc;

use wlink_bridge::{
    Dispatcher, LinkSecurity, PeerId, Peripheral, PeripheralConfig, WriteEvent, WriteRejected,
};
use wlink_proto::gatt::DEFAULT_ATT_MTU;

use crate::mock_net::{MockNetwork, RecordingSink};

struct Rig {
    peripheral: Peripheral,
    net: Arc<MockNetwork>,
    sink: Arc<RecordingSink>,
}

fn rig(net: MockNetwork) -> Rig {
    rig_with(net, PeripheralConfig::default())
}

fn rig_with(net: MockNetwork, config: PeripheralConfig) -> Rig {
    let net = Arc::new(net);
    let sink = Arc::new(RecordingSink::new());
    let peripheral = Peripheral::new(Arc::new(Dispatcher::new(net.clone())), sink.clone(), config);
    Rig {
        peripheral,
        net,
        sink,
    }
}

fn phone() -> PeerId {
    PeerId::new("11:22:33:44:55:66")
}

fn write(peer: &PeerId, data: &[u8]) -> WriteEvent {
    WriteEvent {
        peer: peer.clone(),
        mtu: DEFAULT_ATT_MTU,
        offset: 0,
        security: LinkSecurity::Encrypted,
        data: data.to_vec(),
    }
}

#[tokio::test]
async fn conn_scenario_over_the_link() {
    let r = rig(MockNetwork::new().with_network("Home Net", Some("s3cr3t!"), 80));
    let accepted = r
        .peripheral
        .on_write(write(&phone(), b"conn \"Home Net\" \"s3cr3t!\"\n"))
        .unwrap();
    accepted.finished().await;

    assert_eq!(r.sink.results_for(&phone()), vec!["0\nconnected to Home Net"]);
}

#[tokio::test]
async fn unknown_command_over_the_link() {
    let r = rig(MockNetwork::new());
    r.peripheral.on_write(write(&phone(), b"foo\n")).unwrap().finished().await;
    assert_eq!(r.sink.results_for(&phone()), vec!["127\nunknown command"]);
}

#[tokio::test]
async fn unencrypted_write_never_reaches_dispatcher() {
    let r = rig(MockNetwork::new().with_network("Home", Some("pw"), 80));
    let mut event = write(&phone(), b"conn Home pw\n");
    event.security = LinkSecurity::Unencrypted;

    assert_eq!(
        r.peripheral.on_write(event).unwrap_err(),
        WriteRejected::EncryptionRequired
    );
    tokio::task::yield_now().await;
    assert_eq!(r.net.connects(), 0);
    assert!(r.sink.is_empty());
    assert!(r.peripheral.peers().is_empty());
}

#[tokio::test]
async fn second_write_while_executing_is_busy() {
    let r = rig(
        MockNetwork::new()
            .with_network("Home", Some("pw"), 80)
            .hold_connect(),
    );

    let first = r.peripheral.on_write(write(&phone(), b"conn Home pw\n")).unwrap();
    let second = r.peripheral.on_write(write(&phone(), b"help\n")).unwrap();
    second.finished().await;

    assert_eq!(
        r.sink.results_for(&phone()),
        vec!["16\nbusy: a command is already running"]
    );

    r.net.release_connect();
    first.finished().await;

    assert_eq!(
        r.sink.results_for(&phone()),
        vec!["16\nbusy: a command is already running", "0\nconnected to Home"]
    );
    assert_eq!(r.net.connects(), 1);

    // back to idle: the next command runs
    r.peripheral.on_write(write(&phone(), b"help\n")).unwrap().finished().await;
    assert_eq!(r.sink.results_for(&phone()).len(), 3);
}

#[tokio::test]
async fn lines_in_one_write_are_not_pipelined() {
    let r = rig(MockNetwork::new());
    let accepted = r.peripheral.on_write(write(&phone(), b"help\nfoo\n")).unwrap();
    assert_eq!(accepted.lines(), 2);
    accepted.finished().await;

    let results = r.sink.results_for(&phone());
    assert_eq!(results.len(), 2);
    assert!(results.contains(&"16\nbusy: a command is already running".to_string()));
    assert!(results.iter().any(|r| r.starts_with("0\nhelp: ")));
}

#[tokio::test]
async fn connections_are_independent() {
    let r = rig(
        MockNetwork::new()
            .with_network("Home", Some("pw"), 80)
            .hold_connect(),
    );
    let tablet = PeerId::new("AA:AA:AA:AA:AA:AA");

    let slow = r.peripheral.on_write(write(&phone(), b"conn Home pw\n")).unwrap();
    r.peripheral.on_write(write(&tablet, b"foo\n")).unwrap().finished().await;
    assert_eq!(r.sink.results_for(&tablet), vec!["127\nunknown command"]);

    r.net.release_connect();
    slow.finished().await;
    assert_eq!(r.sink.results_for(&phone()), vec!["0\nconnected to Home"]);
    assert_eq!(r.peripheral.peers(), vec![phone(), tablet]);
}

#[tokio::test]
async fn fragments_join_into_one_command() {
    let r = rig(MockNetwork::new().with_network("Home Net", Some("s3cr3t!"), 80));

    // first part of a long write: 22 bytes, more than one default-MTU write
    let first = r.peripheral.on_write(write(&phone(), b"conn \"Home Net\" \"s3cr3")).unwrap();
    assert!(first.is_buffering());

    let mut rest = write(&phone(), b"t!\"\n");
    rest.offset = 22;
    r.peripheral.on_write(rest).unwrap().finished().await;
    assert_eq!(r.sink.results_for(&phone()), vec!["0\nconnected to Home Net"]);
}

#[tokio::test]
async fn full_payload_write_is_a_whole_line() {
    let r = rig(MockNetwork::new().with_network("Home", Some("1234567890"), 80));

    // exactly 20 bytes, the whole payload of a default-MTU write
    let first = r.peripheral.on_write(write(&phone(), b"conn Home 1234567890")).unwrap();
    assert_eq!(first.lines(), 1);
    first.finished().await;

    r.peripheral.on_write(write(&phone(), b"help")).unwrap().finished().await;

    let results = r.sink.results_for(&phone());
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], "0\nconnected to Home");
    assert!(results[1].starts_with("0\nhelp: "));
    assert_eq!(r.net.connects(), 1);
}

#[tokio::test]
async fn output_cap_does_not_limit_input_lines() {
    let r = rig_with(
        MockNetwork::new().with_network("HomeNetwork", Some("longpassword"), 80),
        PeripheralConfig {
            max_payload: 20,
            ..PeripheralConfig::default()
        },
    );

    // 29 bytes without a newline fit in one write at MTU 247
    let mut event = write(&phone(), b"conn HomeNetwork longpassword");
    event.mtu = 247;
    let accepted = r.peripheral.on_write(event).unwrap();
    assert_eq!(accepted.lines(), 1);
    accepted.finished().await;

    assert_eq!(r.sink.results_for(&phone()), vec!["0\nconnected to HomeNetwork"]);
    assert!(r.sink.chunks_for(&phone()).iter().all(|c| c.bytes.len() <= 20));
}

#[tokio::test]
async fn output_is_chunked_to_the_link_payload() {
    let r = rig(MockNetwork::new());
    r.peripheral.on_write(write(&phone(), b"help\n")).unwrap().finished().await;

    let chunks = r.sink.chunks_for(&phone());
    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence_index, i);
        assert!(chunk.bytes.len() <= 20);
    }
    let joined: Vec<u8> = chunks.iter().flat_map(|c| c.bytes.clone()).collect();
    let text = String::from_utf8(joined).unwrap();
    assert!(text.starts_with("0\nhelp: show this help\n"));
    assert!(text.ends_with("conn <ssid> [<password>]: connect to a network"));
}

#[tokio::test]
async fn larger_mtu_means_fewer_chunks() {
    let r = rig(MockNetwork::new());
    let mut event = write(&phone(), b"help\n");
    event.mtu = 247;
    r.peripheral.on_write(event).unwrap().finished().await;
    assert_eq!(r.sink.chunks_for(&phone()).len(), 1);
}

#[tokio::test]
async fn overlong_line_is_a_bad_request() {
    let r = rig(MockNetwork::new());
    let line = format!("conn {}\n", "x".repeat(600));
    r.peripheral.on_write(write(&phone(), line.as_bytes())).unwrap().finished().await;

    let results = r.sink.results_for(&phone());
    assert_eq!(results.len(), 1);
    assert!(results[0].starts_with("2\ncommand line longer than 512 bytes"));
    assert_eq!(r.net.connects(), 0);
}

#[tokio::test]
async fn disconnect_abandons_the_exchange() {
    let r = rig(
        MockNetwork::new()
            .with_network("Home", Some("pw"), 80)
            .hold_connect(),
    );
    let pending = r.peripheral.on_write(write(&phone(), b"conn Home pw\n")).unwrap();

    r.peripheral.on_disconnect(&phone());
    assert!(r.peripheral.peers().is_empty());

    r.net.release_connect();
    pending.finished().await;
    assert!(r.sink.is_empty());

    // reconnecting starts from a clean connection
    r.peripheral.on_write(write(&phone(), b"foo\n")).unwrap().finished().await;
    assert_eq!(r.sink.results_for(&phone()), vec!["127\nunknown command"]);
}
