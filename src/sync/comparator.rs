//! Message identity comparison.
//!
//! Decides whether two identifiers, seen from possibly different nodes of the same bus,
//! describe the same logical message. The actual field comparison is the store's
//! [`check_message_match`](crate::store::MessageStore::check_message_match).

use log::error;

use crate::store::MessageStore;
use crate::types::{errors::SyncResult, identifier::MessageIdentifier};

/// Outcome of comparing a candidate identifier with a reference identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// Both describe one logical message (at least one side is a receiver).
    Normal,
    /// Two transmitters claim the same CAN ID.
    Critical,
    NoMatch,
}

/// Compares `candidate` against `reference`.
///
/// Both identifiers must belong to the same bus and protocol. CANopen messages are never
/// synchronized; passing one here is a programming error.
pub fn compare<S: MessageStore>(
    store: &S,
    reference: &MessageIdentifier,
    candidate: &MessageIdentifier,
) -> SyncResult<MatchKind> {
    if reference == candidate || reference.protocol != candidate.protocol {
        return Ok(MatchKind::NoMatch);
    }
    if !reference.protocol.is_synchronized() {
        error!(
            "CANopen messages are node-local and must not be matched ({} vs {})",
            reference, candidate
        );
        debug_assert!(false, "CANopen message passed to the message comparator");
        return Ok(MatchKind::NoMatch);
    }

    if reference.is_tx && candidate.is_tx {
        if store.check_message_match(reference, candidate, true)? {
            return Ok(MatchKind::Critical);
        }
        return Ok(MatchKind::NoMatch);
    }

    if store.check_message_match(reference, candidate, false)? {
        Ok(MatchKind::Normal)
    } else {
        Ok(MatchKind::NoMatch)
    }
}
