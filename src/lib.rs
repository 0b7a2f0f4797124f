//! # can_sync
//!
//! Keeps the node-local copies of **CAN messages** consistent across a bus.
//!
//! ## Highlights
//! - **Match sets**: every sender and receiver copy of one logical message is grouped and
//!   reachable from any of its members ([`SyncManager::resolve`]).
//! - **Unique ids**: a stable [`UniqueId`] per logical message, reused smallest-first.
//! - **Collision tracking**: transmitters sharing a CAN ID are flagged critical and never
//!   take receivers until the collision is resolved.
//! - **Propagation**: message properties and signals set through the manager reach every
//!   copy; receive timeouts stay local to each receiver.
//! - **Pluggable store**: the manager works on any [`MessageStore`]; [`NetworkStore`] is
//!   the in-memory one.
//!
//! Logging goes through the [`log`] facade.
//!

pub mod store;
pub mod sync;
pub mod types;

// Top-level re-exports
#[doc(inline)]
pub use crate::store::{MessageContainer, MessageStore, NetworkStore};
#[doc(inline)]
pub use crate::sync::{
    CriticalRecheck, MatchEntry, MatchKind, MatchSets, Registration, SyncManager, SyncScope,
    UniqueId,
};
#[doc(inline)]
pub use crate::types::{
    errors::{StoreError, SyncError, SyncResult},
    identifier::{ComEndpoint, MessageIdentifier, ProtocolType},
    message::{CanMessage, ReceiveTimeoutMode, TxMethod},
    signal::{ByteOrder, CanSignal, MuxType},
};
