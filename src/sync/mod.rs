//! # sync
//!
//! Cross-node message synchronization.
//!
//! On a CAN bus one logical message exists once per node that sends or receives it. The
//! [`SyncManager`] groups those copies into match sets, hands out a stable [`UniqueId`]
//! per logical message, tracks transmitter collisions and keeps all copies consistent
//! while messages, receivers and signals are edited.

pub mod allocation;
pub mod builder;
pub mod comparator;
pub mod critical;
pub mod edit;
pub mod manager;
pub mod properties;
pub(crate) mod shift;

pub use builder::{MatchEntry, MatchSets, Registration, SyncScope, UniqueId};
pub use comparator::{MatchKind, compare};
pub use critical::CriticalRecheck;
pub use manager::SyncManager;
