//! Addressing types.
//!
//! A [`MessageIdentifier`] locates one node-local copy of a CAN message inside the
//! [`MessageStore`](crate::store::MessageStore). Its `message_index` is a plain position
//! inside the tx/rx list of one container, so it is **not** stable across inserts and
//! deletes in the same bucket: the sync manager renumbers every identifier it tracks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Communication protocol a COM datapool is configured for.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Plain CAN layer 2.
    #[default]
    Layer2,
    /// ESX CAN efficient safety protocol.
    ECeS,
    /// ESX CANopen safety protocol.
    ECoS,
    /// CANopen (PDO based). Messages are node-local and never synchronized.
    CANopen,
}

impl ProtocolType {
    /// Returns a user-friendly label (e.g. `"Layer 2"`).
    pub fn to_str(&self) -> String {
        match self {
            ProtocolType::Layer2 => "Layer 2".to_string(),
            ProtocolType::ECeS => "ECeS".to_string(),
            ProtocolType::ECoS => "ECoS".to_string(),
            ProtocolType::CANopen => "CANopen".to_string(),
        }
    }

    /// `true` if messages of this protocol take part in cross-node matching.
    pub fn is_synchronized(&self) -> bool {
        !matches!(self, ProtocolType::CANopen)
    }

    /// Inclusive range of valid CAN IDs for this protocol.
    ///
    /// ECoS only supports standard IDs inside a fixed window; the `extended` flag is ignored.
    pub fn id_range(&self, extended: bool) -> (u32, u32) {
        match self {
            ProtocolType::ECoS => (ECOS_MESSAGE_ID_MIN, ECOS_MESSAGE_ID_MAX),
            _ if extended => (0, CAN_EFF_MASK),
            _ => (0, CAN_SFF_MASK),
        }
    }

    /// Distance between two consecutive valid CAN IDs.
    pub fn id_step(&self) -> u32 {
        match self {
            // every ECoS message occupies the id and its inverted twin
            ProtocolType::ECoS => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

pub const CAN_SFF_MASK: u32 = 0x7FF; // 11 bit
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF; // 29 bit
pub const ECOS_MESSAGE_ID_MIN: u32 = 0x101;
pub const ECOS_MESSAGE_ID_MAX: u32 = 0x17F;

/// Addressing key for one message instance in one node's local store.
///
/// Equality is field-wise.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIdentifier {
    pub node_index: u32,
    pub protocol: ProtocolType,
    pub interface_index: u32,
    pub datapool_index: u32,
    /// `true` for the transmit list, `false` for the receive list.
    pub is_tx: bool,
    /// Position inside the tx or rx list of the container.
    pub message_index: u32,
}

impl MessageIdentifier {
    pub fn new(
        node_index: u32,
        protocol: ProtocolType,
        interface_index: u32,
        datapool_index: u32,
        is_tx: bool,
        message_index: u32,
    ) -> Self {
        MessageIdentifier {
            node_index,
            protocol,
            interface_index,
            datapool_index,
            is_tx,
            message_index,
        }
    }

    /// Builds the identifier of message `message_index` inside `endpoint`.
    pub fn at(
        endpoint: ComEndpoint,
        protocol: ProtocolType,
        is_tx: bool,
        message_index: u32,
    ) -> Self {
        MessageIdentifier::new(
            endpoint.node_index,
            protocol,
            endpoint.interface_index,
            endpoint.datapool_index,
            is_tx,
            message_index,
        )
    }

    /// The node/interface/datapool triple owning this message.
    pub fn endpoint(&self) -> ComEndpoint {
        ComEndpoint {
            node_index: self.node_index,
            interface_index: self.interface_index,
            datapool_index: self.datapool_index,
        }
    }

    /// `true` if both identifiers address the same tx or rx list.
    ///
    /// Within one bucket `message_index` values are contiguous.
    pub fn same_bucket(&self, other: &MessageIdentifier) -> bool {
        self.node_index == other.node_index
            && self.protocol == other.protocol
            && self.interface_index == other.interface_index
            && self.datapool_index == other.datapool_index
            && self.is_tx == other.is_tx
    }

    /// `true` if both identifiers live on the same node interface (any datapool, any direction).
    pub fn same_node_interface(&self, other: &MessageIdentifier) -> bool {
        self.node_index == other.node_index
            && self.interface_index == other.interface_index
            && self.protocol == other.protocol
    }
}

impl fmt::Display for MessageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {} / if {} / dp {} / {} {} #{}",
            self.node_index,
            self.interface_index,
            self.datapool_index,
            self.protocol,
            if self.is_tx { "Tx" } else { "Rx" },
            self.message_index
        )
    }
}

/// One node interface paired with the COM datapool that holds its messages.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComEndpoint {
    pub node_index: u32,
    pub interface_index: u32,
    pub datapool_index: u32,
}

impl ComEndpoint {
    pub fn new(node_index: u32, interface_index: u32, datapool_index: u32) -> Self {
        ComEndpoint {
            node_index,
            interface_index,
            datapool_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_test_identifier(is_tx: bool, message_index: u32) -> MessageIdentifier {
        MessageIdentifier::new(1, ProtocolType::Layer2, 0, 2, is_tx, message_index)
    }

    #[test]
    fn test_same_bucket() {
        let a: MessageIdentifier = build_test_identifier(true, 0);
        let b: MessageIdentifier = build_test_identifier(true, 4);
        let c: MessageIdentifier = build_test_identifier(false, 0);

        // Index does not matter, direction does
        assert!(a.same_bucket(&b));
        assert!(!a.same_bucket(&c));

        // Different datapool is another bucket
        let d = MessageIdentifier {
            datapool_index: 3,
            ..a
        };
        assert!(!a.same_bucket(&d));
    }

    #[test]
    fn test_endpoint_round_trip() {
        let endpoint: ComEndpoint = ComEndpoint::new(4, 1, 0);
        let id: MessageIdentifier = MessageIdentifier::at(endpoint, ProtocolType::ECeS, false, 7);

        assert_eq!(id.endpoint(), endpoint);
        assert_eq!(id.message_index, 7);
        assert!(!id.is_tx);
    }

    #[test]
    fn test_protocol_id_range() {
        assert_eq!(ProtocolType::Layer2.id_range(false), (0, 0x7FF));
        assert_eq!(ProtocolType::Layer2.id_range(true), (0, 0x1FFF_FFFF));
        assert_eq!(ProtocolType::ECoS.id_range(true), (0x101, 0x17F));
        assert_eq!(ProtocolType::ECoS.id_step(), 2);
        assert_eq!(ProtocolType::ECeS.id_step(), 1);
        assert!(!ProtocolType::CANopen.is_synchronized());
    }

    #[test]
    fn test_identifier_serialization() {
        let id: MessageIdentifier = build_test_identifier(true, 3);
        let json: String = serde_json::to_string(&id).unwrap();
        assert!(json.contains("\"protocol\":\"layer2\""));

        let back: MessageIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
