//! Network, discovery, NMT, and dictionary tests

use std::sync::Arc;
use std::time::Duration;

use canhost_client::{
    ClientError, Network, ObjectDictionary, ObjectEntry, Value,
};
use canhost_common::{DataType, NodeId};

mod utils;
use utils::{reply, MockBus, MockSender};

fn setup() -> (MockBus, Network<MockSender>) {
    let (bus, sender, receiver) = MockBus::new();
    (bus, Network::new(sender, receiver))
}

fn node_id(raw: u8) -> NodeId {
    NodeId::new(raw).unwrap()
}

#[tokio::test]
async fn added_nodes_can_be_looked_up() {
    let (_bus, network) = setup();

    let node = network.add_node(node_id(3), None);
    assert_eq!(node.id().raw(), 3);

    assert!(network.node(node_id(3)).is_some());
    assert!(network.node(node_id(4)).is_none());
}

#[tokio::test(start_paused = true)]
async fn search_reports_responding_nodes() {
    let (bus, network) = setup();
    // nodes 2 and 4 answer the device-type probe; node 2 answers twice
    bus.expect_send(vec![
        reply(5, 0x582, &[0x43, 0x00, 0x10, 0x00, 0x91, 0x01, 0x0F, 0x00]),
        reply(6, 0x582, &[0x43, 0x00, 0x10, 0x00, 0x91, 0x01, 0x0F, 0x00]),
        reply(7, 0x584, &[0x43, 0x00, 0x10, 0x00, 0x91, 0x01, 0x0F, 0x00]),
    ]);

    let found = network.search(5, Duration::from_millis(50)).await.unwrap();

    assert_eq!(found, vec![node_id(2), node_id(4)]);

    let sent = bus.sent_frames();
    assert_eq!(sent.len(), 5);
    for (n, frame) in sent.iter().enumerate() {
        assert_eq!(frame.arbitration_id(), 0x601 + n as u32);
        assert_eq!(frame.data(), &[0x40, 0x00, 0x10, 0x00, 0, 0, 0, 0]);
    }
}

#[tokio::test]
async fn nmt_commands_are_broadcast_with_the_node_id() {
    let (bus, network) = setup();
    let node = network.add_node(node_id(5), None);

    let nmt = node.nmt();
    nmt.set_state(canhost_client::NmtCommand::Start).await.unwrap();
    nmt.set_state(canhost_client::NmtCommand::ResetNode).await.unwrap();

    let sent = bus.sent_frames();
    assert_eq!(sent[0].arbitration_id(), 0x000);
    assert_eq!(sent[0].payload(), &[0x01, 0x05]);
    assert_eq!(sent[1].payload(), &[0x81, 0x05]);
}

#[tokio::test]
async fn heartbeat_listener_tracks_the_latest_state() {
    let (bus, network) = setup();
    let node = network.add_node(node_id(5), None);
    let mut nmt = node.nmt();

    nmt.listen_for_heartbeat().unwrap();
    assert!(nmt.last_heartbeat().is_none());

    bus.inject(0x705, &[0x05]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        nmt.last_heartbeat().map(|h| h.state),
        Some(canhost_client::NmtState::Operational)
    );

    // heartbeats for other nodes are not ours
    bus.inject(0x706, &[0x04]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        nmt.last_heartbeat().map(|h| h.state),
        Some(canhost_client::NmtState::Operational)
    );

    nmt.unlisten_for_heartbeat();
    bus.inject(0x705, &[0x04]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        nmt.last_heartbeat().map(|h| h.state),
        Some(canhost_client::NmtState::Operational)
    );
}

#[tokio::test]
async fn wait_for_bootup_sees_the_bootup_heartbeat() {
    let (bus, network) = setup();
    let node = network.add_node(node_id(5), None);
    let nmt = node.nmt();

    let injector = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        // an operational heartbeat first, then the boot-up marker
        injector.inject(0x705, &[0x05]);
        injector.inject(0x705, &[0x00]);
    });

    nmt.wait_for_bootup(Duration::from_millis(500)).await.unwrap();
}

#[tokio::test]
async fn wait_for_bootup_times_out_without_heartbeat() {
    let (_bus, network) = setup();
    let node = network.add_node(node_id(5), None);

    let err = node
        .nmt()
        .wait_for_bootup(Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout));
}

#[tokio::test]
async fn named_entries_read_through_the_sdo_client() {
    let (bus, network) = setup();

    let mut dictionary = ObjectDictionary::new();
    dictionary.insert(ObjectEntry {
        name: "Device type".into(),
        index: 0x1000,
        sub_index: 0,
        data_type: DataType::Unsigned32,
    });
    let node = network.add_node(node_id(2), Some(Arc::new(dictionary)));

    assert!(node.find_name("Producer heartbeat time").is_none());

    let entry = node.find_name("Device type").unwrap();
    bus.expect_send(vec![reply(
        1,
        0x582,
        &[0x43, 0x00, 0x10, 0x00, 0x91, 0x01, 0x0F, 0x00],
    )]);

    let value = entry.read_value().await.unwrap();
    assert_eq!(value, Value::Unsigned(0x000F_0191));

    let sent = bus.sent_frames();
    assert_eq!(sent[0].arbitration_id(), 0x602);
    assert_eq!(sent[0].data(), &[0x40, 0x00, 0x10, 0x00, 0, 0, 0, 0]);
}
