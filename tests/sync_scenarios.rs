//! End-to-end behavior of the sync manager on small networks.

use can_sync::{
    CanMessage, CanSignal, ComEndpoint, MessageIdentifier, NetworkStore, ProtocolType,
    ReceiveTimeoutMode, SyncError, SyncManager, UniqueId,
};
use can_sync::store::MessageStore;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn build_network(nodes: &[&str], protocol: ProtocolType) -> NetworkStore {
    let mut store: NetworkStore = NetworkStore::default();
    let bus: u32 = store.add_bus("CAN1");
    for name in nodes {
        let node: u32 = store.add_node(name, 1);
        store.connect(node, 0, Some(bus)).unwrap();
        store.add_com_datapool(node, "COM", protocol).unwrap();
    }
    store
}

fn append(
    store: &mut NetworkStore,
    node: u32,
    is_tx: bool,
    name: &str,
    can_id: u32,
) -> MessageIdentifier {
    let protocol: ProtocolType = store.nodes[node as usize].datapools[0].protocol;
    store
        .append_message(
            ComEndpoint::new(node, 0, 0),
            protocol,
            is_tx,
            CanMessage::new(name, can_id, false, 8),
        )
        .unwrap()
}

fn ep(node: u32) -> ComEndpoint {
    ComEndpoint::new(node, 0, 0)
}

/// Every tracked identifier must resolve to a set containing itself, and no identifier
/// may be tracked twice.
fn assert_partition(manager: &SyncManager) {
    let mut seen: Vec<MessageIdentifier> = Vec::new();
    for entry in manager.match_sets() {
        assert!(!entry.members.is_empty());
        for member in &entry.members {
            assert!(!seen.contains(member), "{} tracked twice", member);
            assert!(manager.resolve(member).contains(member));
            seen.push(*member);
        }
    }
}

#[test]
fn test_two_nodes_share_one_message() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB"], ProtocolType::Layer2);
    let tx: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    let rx: MessageIdentifier = append(&mut store, 1, false, "M", 0x100);

    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    assert_eq!(manager.match_sets().len(), 1);
    assert_eq!(manager.resolve(&rx), vec![tx, rx]);
    assert_eq!(manager.unique_message_count(ProtocolType::Layer2), 1);
    assert_partition(&manager);
}

#[test]
fn test_colliding_transmitters_are_critical() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB", "NodeC"], ProtocolType::Layer2);
    let tx_a: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    let rx: MessageIdentifier = append(&mut store, 2, false, "M", 0x100);
    let tx_b: MessageIdentifier = append(&mut store, 1, true, "N", 0x100);

    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    assert!(manager.check_critical_message(&tx_a));
    assert!(manager.check_critical_message(&tx_b));
    assert!(!manager.resolve(&tx_a).contains(&rx));
    assert!(!manager.resolve(&tx_b).contains(&rx));
    assert_eq!(manager.transmitter_of(&rx), None);

    // receivers cannot be added to a critical message
    let result = manager.add_receiver(&mut store, &tx_a, ep(2));
    assert_eq!(result, Err(SyncError::CriticalMessage { id: tx_a }));
    assert_partition(&manager);
}

#[test]
fn test_delete_renumbers_bucket() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB"], ProtocolType::Layer2);
    let ids: Vec<MessageIdentifier> = (0..5)
        .map(|i| append(&mut store, 0, true, &format!("M{}", i), 0x100 + i))
        .collect();
    // NodeB receives the last two
    append(&mut store, 1, false, "M3", 0x103);
    append(&mut store, 1, false, "M4", 0x104);

    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();
    let uid_of_m4: UniqueId = manager.unique_id(&ids[4]).unwrap();
    assert_eq!(manager.match_sets().len(), 5);

    manager.delete_message(&mut store, &ids[2]).unwrap();

    assert_eq!(manager.match_sets().len(), 4);
    let m3: MessageIdentifier = MessageIdentifier { message_index: 2, ..ids[0] };
    let m4: MessageIdentifier = MessageIdentifier { message_index: 3, ..ids[0] };
    assert_eq!(store.message(&m3).unwrap().name, "M3");
    assert_eq!(store.message(&m4).unwrap().name, "M4");
    assert_eq!(manager.resolve(&m4).len(), 2);
    // unique ids survive the renumbering
    assert_eq!(manager.unique_id(&m4), Some(uid_of_m4));
    assert_eq!(manager.message_id_for_unique_id(uid_of_m4), Some(m4));
    assert_partition(&manager);
}

#[test]
fn test_next_valid_message_id_on_empty_bus() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA"], ProtocolType::Layer2);
    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    assert_eq!(manager.next_valid_message_id(&store, false), Some(0));
    for can_id in [0, 1] {
        let message: CanMessage = CanMessage::new(&format!("M{}", can_id), can_id, false, 8);
        manager.add_message(&mut store, ep(0), true, message).unwrap();
    }
    assert_eq!(manager.next_valid_message_id(&store, false), Some(2));
}

#[test]
fn test_canopen_messages_stay_node_local() {
    init_logging();
    let mut store: NetworkStore =
        build_network(&["Master", "Slave1", "Slave2"], ProtocolType::CANopen);
    append(&mut store, 0, true, "RPDO1", 0x201);
    append(&mut store, 1, false, "RPDO1", 0x201);
    append(&mut store, 2, false, "RPDO1", 0x201);
    append(&mut store, 1, true, "TPDO1", 0x181);

    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::CANopen).unwrap();

    assert_eq!(manager.match_sets().len(), 4);
    assert!(manager.match_sets().iter().all(|e| e.members.len() == 1));
    assert_eq!(manager.critical_message_count(), 0);
}

#[test]
fn test_insert_shifts_tracked_ids() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB"], ProtocolType::Layer2);
    let tx: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    let rx: MessageIdentifier = append(&mut store, 1, false, "M", 0x100);
    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    // a new transmitter in front of M
    manager
        .insert_message(&mut store, &tx, CanMessage::new("N", 0x200, false, 8))
        .unwrap();

    let moved_tx: MessageIdentifier = MessageIdentifier { message_index: 1, ..tx };
    assert_eq!(manager.resolve(&rx), vec![moved_tx, rx]);
    assert_eq!(manager.resolve(&tx), vec![tx]);
    assert_eq!(store.message(&moved_tx).unwrap().name, "M");
    assert_partition(&manager);
}

#[test]
fn test_inserted_transmitter_collision() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB", "NodeC"], ProtocolType::Layer2);
    let tx_a: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    let rx: MessageIdentifier = append(&mut store, 2, false, "M", 0x100);
    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    let tx_b: MessageIdentifier = manager
        .add_message(&mut store, ep(1), true, CanMessage::new("N", 0x100, false, 8))
        .unwrap();

    assert!(manager.check_critical_message(&tx_a));
    assert!(manager.check_critical_message(&tx_b));
    assert_eq!(manager.resolve(&rx), vec![rx]);

    // deleting one side resolves the collision and re-attaches the receiver
    manager.delete_message(&mut store, &tx_b).unwrap();
    assert_eq!(manager.critical_message_count(), 0);
    assert_eq!(manager.resolve(&rx), vec![tx_a, rx]);
    assert_partition(&manager);
}

#[test]
fn test_receiver_management() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB", "NodeC"], ProtocolType::Layer2);
    let tx: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    let mut message: CanMessage = store.message(&tx).unwrap().clone();
    message.signals.push(CanSignal::new("Speed", 0, 16));
    message.receive_timeout_mode = ReceiveTimeoutMode::Custom;
    store.set_message_properties(&tx, &message).unwrap();

    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    let rx: MessageIdentifier = manager.add_receiver(&mut store, &tx, ep(1)).unwrap();
    let copy: &CanMessage = store.message(&rx).unwrap();
    assert_eq!(copy.signals.len(), 1);
    assert_eq!(copy.receive_timeout_mode, ReceiveTimeoutMode::Auto);
    assert_eq!(manager.receivers_of(&tx), vec![rx]);

    assert_eq!(
        manager.add_receiver(&mut store, &tx, ep(1)),
        Err(SyncError::ReceiverExists {
            id: tx,
            node_index: 1,
            interface_index: 0
        })
    );

    manager.delete_receiver(&mut store, &rx, ep(1)).unwrap();
    assert!(manager.receivers_of(&tx).is_empty());
    assert!(store.message(&rx).is_none());
    assert!(matches!(
        manager.delete_receiver(&mut store, &tx, ep(2)),
        Err(SyncError::ReceiverMissing { .. })
    ));
}

#[test]
fn test_change_transmitter() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB", "NodeC"], ProtocolType::Layer2);
    let tx: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    append(&mut store, 1, false, "M", 0x100);
    let rx_c: MessageIdentifier = append(&mut store, 2, false, "M", 0x100);
    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();
    let uid: UniqueId = manager.unique_id(&tx).unwrap();

    let new_tx: MessageIdentifier = manager.change_transmitter(&mut store, &rx_c, ep(1)).unwrap();

    assert_eq!(new_tx, MessageIdentifier::new(1, ProtocolType::Layer2, 0, 0, true, 0));
    // the old transmitter and NodeB's receiver are gone
    assert!(store.message(&tx).is_none());
    assert!(store.message_container(1, ProtocolType::Layer2, 0, 0).unwrap().rx_messages.is_empty());
    assert_eq!(manager.resolve(&new_tx), vec![new_tx, rx_c]);
    assert_eq!(manager.unique_id(&new_tx), Some(uid));

    assert!(matches!(
        manager.change_transmitter(&mut store, &new_tx, ep(1)),
        Err(SyncError::SameTransmitter { .. })
    ));
    assert_partition(&manager);
}

#[test]
fn test_set_message_direction() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB"], ProtocolType::Layer2);
    let tx: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    let rx: MessageIdentifier = append(&mut store, 1, false, "M", 0x100);
    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    // NodeB starts sending M as well
    let second_tx: MessageIdentifier =
        manager.set_message_direction(&mut store, &rx, true).unwrap();

    assert!(second_tx.is_tx);
    assert!(manager.check_critical_message(&tx));
    assert!(manager.check_critical_message(&second_tx));

    // and back to receiving
    let back: MessageIdentifier =
        manager.set_message_direction(&mut store, &second_tx, false).unwrap();
    assert_eq!(manager.critical_message_count(), 0);
    assert_eq!(manager.resolve(&back), vec![tx, back]);
    assert_partition(&manager);
}

#[test]
fn test_property_change_then_recheck() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB", "NodeC"], ProtocolType::Layer2);
    let tx_a: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    let rx: MessageIdentifier = append(&mut store, 2, false, "M", 0x100);
    let tx_b: MessageIdentifier = append(&mut store, 1, true, "N", 0x200);
    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    manager.set_message_can_id(&mut store, &tx_b, 0x100, false).unwrap();
    let first = manager.recheck_critical_message(&store, &tx_b).unwrap();
    let second = manager.recheck_critical_message(&store, &tx_b).unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert!(manager.check_critical_message(&tx_a));
    assert_eq!(manager.resolve(&rx), vec![rx]);
    assert_partition(&manager);
}

#[test]
fn test_operations_require_init() {
    let mut store: NetworkStore = build_network(&["NodeA"], ProtocolType::Layer2);
    let tx: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    let mut manager: SyncManager = SyncManager::new();

    assert_eq!(manager.delete_message(&mut store, &tx), Err(SyncError::NotInitialized));
    assert_eq!(
        manager.set_message_name(&mut store, &tx, "X"),
        Err(SyncError::NotInitialized)
    );
    assert!(store.message(&tx).is_some());
}

#[test]
fn test_collision_moves_to_other_partner() {
    init_logging();
    let mut store: NetworkStore =
        build_network(&["NodeA", "NodeB", "NodeC", "Listener"], ProtocolType::Layer2);
    let a: MessageIdentifier = append(&mut store, 0, true, "A_Msg", 0x100);
    let b: MessageIdentifier = append(&mut store, 1, true, "B_Msg", 0x100);
    let c: MessageIdentifier = append(&mut store, 2, true, "C_Msg", 0x200);
    let b_rx: MessageIdentifier = append(&mut store, 3, false, "B_Msg", 0x100);
    let c_rx: MessageIdentifier = append(&mut store, 3, false, "C_Msg", 0x200);
    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();
    assert_eq!(manager.critical_message_count(), 2);

    manager.set_message_can_id(&mut store, &a, 0x200, false).unwrap();
    assert!(manager.recheck_critical_message(&store, &a).unwrap().changed);

    assert!(!manager.check_critical_message(&b));
    assert!(manager.check_critical_message(&a));
    assert!(manager.check_critical_message(&c));
    assert_eq!(manager.critical_message_count(), 2);
    assert_eq!(manager.resolve(&b_rx), vec![b, b_rx]);
    assert_eq!(manager.resolve(&c_rx), vec![c_rx]);

    // B takes receivers again, C does not
    manager.add_receiver(&mut store, &b, ep(2)).unwrap();
    assert_eq!(
        manager.add_receiver(&mut store, &c, ep(1)),
        Err(SyncError::CriticalMessage { id: c })
    );
    assert_partition(&manager);
}

#[test]
fn test_disconnected_node_cannot_join() {
    init_logging();
    let mut store: NetworkStore = build_network(&["NodeA", "NodeB", "NodeC"], ProtocolType::Layer2);
    let a: MessageIdentifier = append(&mut store, 0, true, "M", 0x100);
    store.connect(2, 0, None).unwrap();
    let mut manager: SyncManager = SyncManager::new();
    manager.init_bus(&store, 0, ProtocolType::Layer2).unwrap();

    assert!(matches!(
        manager.add_receiver(&mut store, &a, ep(2)),
        Err(SyncError::EndpointOutOfScope { node_index: 2, .. })
    ));

    let mut rebuilt: SyncManager = SyncManager::new();
    rebuilt.init_bus(&store, 0, ProtocolType::Layer2).unwrap();
    assert_eq!(manager.resolve(&a), rebuilt.resolve(&a));
}
