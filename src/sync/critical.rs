//! Critical (colliding) transmitter tracking.
//!
//! A transmitter is critical while another tracked transmitter sends the same CAN ID.
//! Critical transmitters keep a set of their own and never take receivers; the receivers
//! that matched them live in receive-only sets until the collision is resolved.

use log::{debug, info, warn};

use crate::store::MessageStore;
use crate::sync::comparator::{MatchKind, compare};
use crate::sync::manager::SyncManager;
use crate::types::{errors::SyncResult, identifier::MessageIdentifier};

/// Outcome of [`SyncManager::recheck_critical_message`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CriticalRecheck {
    /// `true` if the critical flags or set memberships changed.
    pub changed: bool,
    /// Identifier the caller should continue with. Differs from the checked one when the
    /// checked receiver was split off a set that became critical.
    pub id: MessageIdentifier,
}

impl CriticalRecheck {
    fn unchanged(id: &MessageIdentifier) -> Self {
        CriticalRecheck {
            changed: false,
            id: *id,
        }
    }
}

impl SyncManager {
    /// `true` if `id` is a transmitter in collision.
    pub fn check_critical_message(&self, id: &MessageIdentifier) -> bool {
        self.sets.is_critical(id)
    }

    /// Re-evaluates the collision state of the logical message `id` belongs to, typically
    /// after its CAN ID or name changed.
    ///
    /// Calling it twice in a row reports no change the second time.
    pub fn recheck_critical_message<S: MessageStore>(
        &mut self,
        store: &S,
        id: &MessageIdentifier,
    ) -> SyncResult<CriticalRecheck> {
        self.check_id(id)?;
        let Some(tx) = self.sets.entry_of(id).and_then(|e| e.transmitter().copied()) else {
            return Ok(CriticalRecheck::unchanged(id));
        };
        if !tx.protocol.is_synchronized() {
            return Ok(CriticalRecheck::unchanged(id));
        }

        let colliders: Vec<MessageIdentifier> = self.colliding_transmitters(store, &tx)?;
        let mut changed: bool = false;
        let mut orphans: Vec<MessageIdentifier> = Vec::new();
        if !colliders.is_empty() {
            for critical_tx in std::iter::once(tx).chain(colliders.iter().copied()) {
                if !self.sets.is_critical(&critical_tx) {
                    warn!(
                        "Transmitter collision: {} shares its CAN ID with another transmitter",
                        critical_tx
                    );
                    self.sets.flag_critical(critical_tx);
                    changed = true;
                }
                if let Some(pos) = self.sets.position(&critical_tx)
                    && let Some(entry) = self.sets.entry_mut(pos)
                {
                    orphans.extend(entry.members.iter().filter(|m| !m.is_tx).copied());
                    entry.members.retain(|m| m.is_tx);
                }
            }
        }

        let mut result_id: MessageIdentifier = *id;
        if !orphans.is_empty() {
            changed = true;
            if orphans.contains(id) {
                result_id = tx;
            }
            debug!("Split {} receivers off critical transmitters", orphans.len());
            for orphan in orphans {
                self.sets.register_receiver(store, &orphan)?;
            }
        }

        // former partners of `tx` may have lost their last collider
        if self.release_resolved_collisions(store)? > 0 {
            if colliders.is_empty() {
                info!("Transmitter {} is no longer in collision", tx);
            }
            changed = true;
        }
        Ok(CriticalRecheck {
            changed,
            id: result_id,
        })
    }

    /// Tracked transmitters (other than `tx`) sending the same CAN ID as `tx`.
    pub(crate) fn colliding_transmitters<S: MessageStore>(
        &self,
        store: &S,
        tx: &MessageIdentifier,
    ) -> SyncResult<Vec<MessageIdentifier>> {
        let mut colliders: Vec<MessageIdentifier> = Vec::new();
        for entry in self.sets.entries() {
            if let Some(other) = entry.transmitter()
                && other != tx
                && other.protocol == tx.protocol
                && compare(store, other, tx)? == MatchKind::Critical
            {
                colliders.push(*other);
            }
        }
        Ok(colliders)
    }

    /// Un-flags every critical transmitter that no longer collides and hands it back the
    /// receive-only sets it matches. Returns the number of released transmitters.
    pub(crate) fn release_resolved_collisions<S: MessageStore>(
        &mut self,
        store: &S,
    ) -> SyncResult<usize> {
        let mut released: Vec<MessageIdentifier> = Vec::new();
        for tx in self.sets.critical().to_vec() {
            if self.colliding_transmitters(store, &tx)?.is_empty() {
                self.sets.unflag(&tx);
                released.push(tx);
            }
        }
        for tx in &released {
            self.reattach_receivers(store, tx)?;
        }
        if !released.is_empty() {
            debug!("Released {} transmitters from collision", released.len());
        }
        Ok(released.len())
    }

    /// Merges every receive-only set matching `tx` into the set of `tx`.
    fn reattach_receivers<S: MessageStore>(
        &mut self,
        store: &S,
        tx: &MessageIdentifier,
    ) -> SyncResult<()> {
        loop {
            let mut found: Option<usize> = None;
            for (i, entry) in self.sets.entries().iter().enumerate() {
                if let Some(rep) = entry.representative()
                    && !rep.is_tx
                    && rep.protocol == tx.protocol
                    && compare(store, tx, rep)? == MatchKind::Normal
                {
                    found = Some(i);
                    break;
                }
            }
            let Some(orphan_pos) = found else {
                return Ok(());
            };
            let Some(orphans) = self.sets.remove_entry(orphan_pos) else {
                return Ok(());
            };
            let Some(tx_pos) = self.sets.position(tx) else {
                return Ok(());
            };
            if let Some(entry) = self.sets.entry_mut(tx_pos) {
                entry.members.extend(orphans.members);
            }
        }
    }
}
