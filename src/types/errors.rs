use thiserror::Error;

use crate::types::identifier::{MessageIdentifier, ProtocolType};

/// Errors reported by a [`MessageStore`](crate::store::MessageStore).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Node {node_index} does not exist")]
    NodeMissing { node_index: u32 },
    #[error("Interface {interface_index} does not exist on node {node_index}")]
    InterfaceMissing {
        node_index: u32,
        interface_index: u32,
    },
    #[error("Datapool {datapool_index} on node {node_index} is not a {protocol} COM datapool")]
    DatapoolMissing {
        node_index: u32,
        datapool_index: u32,
        protocol: ProtocolType,
    },
    #[error("Message index out of range: {id}")]
    MessageIndexOutOfRange { id: MessageIdentifier },
    #[error("Signal index {signal_index} out of range for message {id}")]
    SignalIndexOutOfRange {
        id: MessageIdentifier,
        signal_index: u32,
    },
    #[error("Message {id} already carries the maximum of {limit} signals")]
    SignalLimitReached { id: MessageIdentifier, limit: usize },
}

/// Errors returned by the [`SyncManager`](crate::sync::SyncManager).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("Message sync manager is not initialized")]
    NotInitialized,
    #[error("Message {id} does not belong to the {expected} scope of this manager")]
    ProtocolMismatch {
        id: MessageIdentifier,
        expected: ProtocolType,
    },
    #[error("Node {node_index} interface {interface_index} dp {datapool_index} is out of scope")]
    EndpointOutOfScope {
        node_index: u32,
        interface_index: u32,
        datapool_index: u32,
    },
    #[error("Message not found: {id}")]
    UnknownMessage { id: MessageIdentifier },
    #[error("Node {node_index} interface {interface_index} already exchanges message {id}")]
    ReceiverExists {
        id: MessageIdentifier,
        node_index: u32,
        interface_index: u32,
    },
    #[error("No receiver of {id} on node {node_index} if {interface_index} dp {datapool_index}")]
    ReceiverMissing {
        id: MessageIdentifier,
        node_index: u32,
        interface_index: u32,
        datapool_index: u32,
    },
    #[error("Message {id} has more than one transmitter; receivers cannot be assigned")]
    CriticalMessage { id: MessageIdentifier },
    #[error("Node {node_index} interface {interface_index} already transmits message {id}")]
    SameTransmitter {
        id: MessageIdentifier,
        node_index: u32,
        interface_index: u32,
    },
    #[error("Update stopped after {applied} of {total} matching messages. \nError: {source}")]
    PartiallyApplied {
        applied: usize,
        total: usize,
        #[source]
        source: StoreError,
    },
    #[error("Message sync manager is in an inconsistent state: {details}")]
    Inconsistent { details: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for sync manager operations.
pub type SyncResult<T> = Result<T, SyncError>;
