//! # store
//!
//! The message/signal data store the sync manager reads and writes.
//!
//! The manager never owns the store: every operation borrows it, so several managers
//! (one per bus, for example) can work on the same store and other code may edit the
//! store directly between calls. [`NetworkStore`] is the in-memory implementation.

pub mod network;

use serde::{Deserialize, Serialize};

use crate::types::{
    errors::StoreError,
    identifier::{ComEndpoint, MessageIdentifier, ProtocolType},
    message::CanMessage,
    signal::CanSignal,
};

pub use network::{Bus, ComDatapool, Node, NodeInterface, NetworkStore};

/// Messages one COM datapool exchanges on one node interface.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct MessageContainer {
    /// `true` if the interface runs the datapool's protocol.
    pub is_protocol_used_by_interface: bool,
    /// Messages sent by the node.
    pub tx_messages: Vec<CanMessage>,
    /// Messages received by the node.
    pub rx_messages: Vec<CanMessage>,
}

impl MessageContainer {
    /// The tx or rx list.
    pub fn messages(&self, is_tx: bool) -> &Vec<CanMessage> {
        if is_tx {
            &self.tx_messages
        } else {
            &self.rx_messages
        }
    }

    /// The tx or rx list, mutable.
    pub fn messages_mut(&mut self, is_tx: bool) -> &mut Vec<CanMessage> {
        if is_tx {
            &mut self.tx_messages
        } else {
            &mut self.rx_messages
        }
    }
}

/// Contract between the sync manager and the message/signal data store.
///
/// Identifiers are positional: inserting or deleting a message shifts the
/// `message_index` of every later message in the same list. Keeping tracked identifiers
/// valid is the caller's job.
pub trait MessageStore {
    /// Returns the message addressed by `id`, if any.
    fn message(&self, id: &MessageIdentifier) -> Option<&CanMessage>;

    /// Returns the container of one datapool on one node interface.
    fn message_container(
        &self,
        node_index: u32,
        protocol: ProtocolType,
        interface_index: u32,
        datapool_index: u32,
    ) -> Option<&MessageContainer>;

    /// Overwrites the message addressed by `id`.
    fn set_message_properties(
        &mut self,
        id: &MessageIdentifier,
        message: &CanMessage,
    ) -> Result<(), StoreError>;

    /// Inserts `message` at `id.message_index` (which may equal the list length).
    fn insert_message(
        &mut self,
        id: &MessageIdentifier,
        message: CanMessage,
    ) -> Result<(), StoreError>;

    /// Removes the message addressed by `id` and returns it.
    fn delete_message(&mut self, id: &MessageIdentifier) -> Result<CanMessage, StoreError>;

    /// Inserts `signal` at `signal_index` of message `id`.
    fn insert_signal(
        &mut self,
        id: &MessageIdentifier,
        signal_index: u32,
        signal: CanSignal,
    ) -> Result<(), StoreError>;

    /// Appends `signal` to message `id`.
    fn add_signal(&mut self, id: &MessageIdentifier, signal: CanSignal) -> Result<(), StoreError> {
        let signal_index: u32 = self
            .message(id)
            .map(|m| m.signals.len() as u32)
            .ok_or(StoreError::MessageIndexOutOfRange { id: *id })?;
        self.insert_signal(id, signal_index, signal)
    }

    /// Removes signal `signal_index` of message `id`.
    fn delete_signal(
        &mut self,
        id: &MessageIdentifier,
        signal_index: u32,
    ) -> Result<(), StoreError>;

    /// Overwrites signal `signal_index` of message `id`.
    fn set_signal(
        &mut self,
        id: &MessageIdentifier,
        signal_index: u32,
        signal: &CanSignal,
    ) -> Result<(), StoreError>;

    /// Canonical identity predicate.
    ///
    /// With `check_tx_tx_conflict` two transmit-side messages are compared for a
    /// transmitter collision; without it two transmit-side messages never match.
    fn check_message_match(
        &self,
        a: &MessageIdentifier,
        b: &MessageIdentifier,
        check_tx_tx_conflict: bool,
    ) -> Result<bool, StoreError>;

    /// Every node interface connected to `bus_index`, paired with each of the node's
    /// COM datapools of `protocol`.
    fn bus_endpoints(&self, bus_index: u32, protocol: ProtocolType) -> Vec<ComEndpoint>;

    /// Every COM datapool of `protocol` on the node, regardless of connection state.
    fn interface_datapools(
        &self,
        node_index: u32,
        interface_index: u32,
        protocol: ProtocolType,
    ) -> Vec<u32>;
}
