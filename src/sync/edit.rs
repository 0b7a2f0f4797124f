//! Structural edits: adding, inserting and deleting messages, receivers and transmitters.
//!
//! Every store insert or delete is followed by an index shift of all tracked identifiers,
//! so the match sets stay valid without a rebuild.

use log::{debug, info, warn};

use crate::store::{MessageContainer, MessageStore};
use crate::sync::critical::CriticalRecheck;
use crate::sync::manager::SyncManager;
use crate::sync::shift::{IndexShift, shift_indices};
use crate::types::{
    errors::{StoreError, SyncError, SyncResult},
    identifier::{ComEndpoint, MessageIdentifier, ProtocolType},
    message::CanMessage,
};

impl SyncManager {
    /// Appends `message` to the tx or rx list of `endpoint` and registers it.
    pub fn add_message<S: MessageStore>(
        &mut self,
        store: &mut S,
        endpoint: ComEndpoint,
        is_tx: bool,
        message: CanMessage,
    ) -> SyncResult<MessageIdentifier> {
        let protocol: ProtocolType = self.ready()?.protocol();
        self.check_endpoint(store, &endpoint)?;
        let message_index: u32 = next_index(store, &endpoint, protocol, is_tx)?;
        let id: MessageIdentifier = MessageIdentifier::at(endpoint, protocol, is_tx, message_index);
        self.insert_message(store, &id, message)?;
        Ok(id)
    }

    /// Inserts `message` at `id` and registers it.
    ///
    /// A transmitter sending an already used CAN ID is registered as critical.
    pub fn insert_message<S: MessageStore>(
        &mut self,
        store: &mut S,
        id: &MessageIdentifier,
        message: CanMessage,
    ) -> SyncResult<()> {
        self.check_id(id)?;
        self.check_endpoint(store, &id.endpoint())?;
        self.insert_untracked(store, id, message)?;
        let registration = self.sets.register(store, id)?;
        debug!("Inserted {} ({:?})", id, registration);
        Ok(())
    }

    /// Deletes every node-local copy of the logical message `id` belongs to.
    pub fn delete_message<S: MessageStore>(
        &mut self,
        store: &mut S,
        id: &MessageIdentifier,
    ) -> SyncResult<()> {
        self.check_id(id)?;
        let Some(pos) = self.sets.position(id) else {
            if store.message(id).is_none() {
                return Err(SyncError::UnknownMessage { id: *id });
            }
            store.delete_message(id)?;
            self.sets.shift(id, IndexShift::Removed);
            return Ok(());
        };

        let mut critical: Vec<MessageIdentifier> = self.sets.entries()[pos]
            .members
            .iter()
            .filter(|m| self.sets.is_critical(m))
            .copied()
            .collect();
        let had_critical: bool = !critical.is_empty();
        let Some(entry) = self.sets.remove_entry(pos) else {
            debug_assert!(false, "match set vanished during delete");
            return Err(SyncError::Inconsistent {
                details: "match set vanished during delete",
            });
        };

        let mut pending: Vec<MessageIdentifier> = entry.members;
        let total: usize = pending.len();
        let mut deleted_critical: bool = false;
        while !pending.is_empty() {
            let member: MessageIdentifier = pending.remove(0);
            if let Err(err) = store.delete_message(&member) {
                // keep what is still in the store tracked under its old handle
                pending.insert(0, member);
                for tx in critical.iter().filter(|c| pending.contains(c)) {
                    self.sets.flag_critical(*tx);
                }
                self.sets.push_entry_with(entry.unique_id, pending);
                if deleted_critical
                    && let Err(release_err) = self.release_resolved_collisions(store)
                {
                    warn!("Collision release after failed delete of {}: {}", id, release_err);
                }
                return Err(err.into());
            }
            if critical.contains(&member) {
                deleted_critical = true;
                critical.retain(|c| *c != member);
            }
            self.sets.shift(&member, IndexShift::Removed);
            shift_indices(
                pending.iter_mut().chain(critical.iter_mut()),
                &member,
                IndexShift::Removed,
            );
        }
        info!("Deleted message {} ({} copies)", id, total);

        if had_critical {
            self.release_resolved_collisions(store)?;
        }
        Ok(())
    }

    /// Adds a receiver of the logical message `id` belongs to on the given endpoint.
    ///
    /// The receiver copies the transmitter's definition with default receive-timeout
    /// settings and is appended to the end of the endpoint's rx list.
    pub fn add_receiver<S: MessageStore>(
        &mut self,
        store: &mut S,
        id: &MessageIdentifier,
        endpoint: ComEndpoint,
    ) -> SyncResult<MessageIdentifier> {
        self.check_id(id)?;
        self.check_endpoint(store, &endpoint)?;
        let pos: usize = self.tracked_position(store, id)?;
        let entry = &self.sets.entries()[pos];
        if let Some(tx) = entry.transmitter()
            && self.sets.is_critical(tx)
        {
            return Err(SyncError::CriticalMessage { id: *id });
        }
        if entry.members.iter().any(|m| {
            m.node_index == endpoint.node_index && m.interface_index == endpoint.interface_index
        }) {
            return Err(SyncError::ReceiverExists {
                id: *id,
                node_index: endpoint.node_index,
                interface_index: endpoint.interface_index,
            });
        }
        let Some(source) = entry.representative().and_then(|rep| store.message(rep)) else {
            return Err(SyncError::UnknownMessage { id: *id });
        };
        let payload: CanMessage = source.with_default_receive_timeout();

        let receiver: MessageIdentifier = MessageIdentifier::at(
            endpoint,
            id.protocol,
            false,
            next_index(store, &endpoint, id.protocol, false)?,
        );
        self.insert_untracked(store, &receiver, payload)?;
        if let Some(entry) = self.sets.entry_mut(pos) {
            entry.members.push(receiver);
        }
        debug!("Added receiver {} of {}", receiver, id);
        Ok(receiver)
    }

    /// Deletes the receiver of the logical message `id` belongs to on the given endpoint.
    pub fn delete_receiver<S: MessageStore>(
        &mut self,
        store: &mut S,
        id: &MessageIdentifier,
        endpoint: ComEndpoint,
    ) -> SyncResult<()> {
        self.check_id(id)?;
        let Some(receiver) = self
            .resolve(id)
            .into_iter()
            .find(|m| !m.is_tx && m.endpoint() == endpoint)
        else {
            return Err(SyncError::ReceiverMissing {
                id: *id,
                node_index: endpoint.node_index,
                interface_index: endpoint.interface_index,
                datapool_index: endpoint.datapool_index,
            });
        };
        self.delete_tracked(store, &receiver)?;
        debug!("Deleted receiver {} of {}", receiver, id);
        Ok(())
    }

    /// Moves the transmitter of the logical message `id` belongs to onto `endpoint`.
    ///
    /// Receivers on the new transmitter's node interface are deleted; the old transmitter
    /// is deleted and does not become a receiver. The unique id is kept. Returns the new
    /// transmitter's identifier.
    pub fn change_transmitter<S: MessageStore>(
        &mut self,
        store: &mut S,
        id: &MessageIdentifier,
        endpoint: ComEndpoint,
    ) -> SyncResult<MessageIdentifier> {
        self.check_id(id)?;
        self.check_endpoint(store, &endpoint)?;
        let pos: usize = self.tracked_position(store, id)?;
        let entry = &self.sets.entries()[pos];
        let old_tx: Option<MessageIdentifier> = entry.transmitter().copied();
        if let Some(tx) = old_tx
            && tx.endpoint() == endpoint
        {
            return Err(SyncError::SameTransmitter {
                id: *id,
                node_index: endpoint.node_index,
                interface_index: endpoint.interface_index,
            });
        }
        let Some(source) = entry.representative().and_then(|rep| store.message(rep)) else {
            return Err(SyncError::UnknownMessage { id: *id });
        };
        let payload: CanMessage = source.with_default_receive_timeout();

        let new_tx: MessageIdentifier = MessageIdentifier::at(
            endpoint,
            id.protocol,
            true,
            next_index(store, &endpoint, id.protocol, true)?,
        );
        self.insert_untracked(store, &new_tx, payload)?;
        if let Some(entry) = self.sets.entry_mut(pos) {
            entry.members.insert(0, new_tx);
        }

        let mut stale: Vec<MessageIdentifier> = self.sets.entries()[pos]
            .members
            .iter()
            .filter(|m| {
                (!m.is_tx && m.same_node_interface(&new_tx)) || (m.is_tx && **m != new_tx)
            })
            .copied()
            .collect();
        let old_was_critical: bool = old_tx.is_some_and(|tx| self.sets.is_critical(&tx));
        while !stale.is_empty() {
            let member: MessageIdentifier = stale.remove(0);
            self.delete_tracked(store, &member)?;
            shift_indices(stale.iter_mut(), &member, IndexShift::Removed);
        }

        let Some(current) = self.sets.entries().get(pos).and_then(|e| e.transmitter().copied())
        else {
            debug_assert!(false, "new transmitter missing from its match set");
            return Err(SyncError::Inconsistent {
                details: "new transmitter missing from its match set",
            });
        };
        info!(
            "Transmitter of {} changed from {:?} to {}",
            self.sets.entries()[pos].unique_id,
            old_tx,
            current
        );

        if old_was_critical {
            self.release_resolved_collisions(store)?;
        }
        let recheck: CriticalRecheck = self.recheck_critical_message(store, &current)?;
        Ok(recheck.id)
    }

    /// Turns `id` into a transmitter (`is_tx`) or a receiver, appending it to the other list
    /// of its endpoint. Returns the new identifier.
    pub fn set_message_direction<S: MessageStore>(
        &mut self,
        store: &mut S,
        id: &MessageIdentifier,
        is_tx: bool,
    ) -> SyncResult<MessageIdentifier> {
        self.check_id(id)?;
        if id.is_tx == is_tx {
            return Ok(*id);
        }
        self.check_endpoint(store, &id.endpoint())?;
        let Some(message) = store.message(id).cloned() else {
            return Err(SyncError::UnknownMessage { id: *id });
        };
        let was_critical: bool = self.sets.is_critical(id);
        self.delete_tracked(store, id)?;
        if was_critical {
            self.release_resolved_collisions(store)?;
        }

        let endpoint: ComEndpoint = id.endpoint();
        let moved: MessageIdentifier = MessageIdentifier::at(
            endpoint,
            id.protocol,
            is_tx,
            next_index(store, &endpoint, id.protocol, is_tx)?,
        );
        self.insert_message(store, &moved, message)?;
        Ok(moved)
    }

    // ---- Helpers ----

    /// Position of the set of `id`, registering `id` first if it is not tracked yet.
    fn tracked_position<S: MessageStore>(
        &mut self,
        store: &S,
        id: &MessageIdentifier,
    ) -> SyncResult<usize> {
        if store.message(id).is_none() {
            return Err(SyncError::UnknownMessage { id: *id });
        }
        Ok(self.sets.register(store, id)?.entry_index())
    }

    /// Store insert plus index shift, without registration.
    fn insert_untracked<S: MessageStore>(
        &mut self,
        store: &mut S,
        id: &MessageIdentifier,
        message: CanMessage,
    ) -> SyncResult<()> {
        store.insert_message(id, message)?;
        self.sets.shift(id, IndexShift::Inserted);
        Ok(())
    }

    /// Store delete plus removal from the match sets and index shift.
    pub(crate) fn delete_tracked<S: MessageStore>(
        &mut self,
        store: &mut S,
        id: &MessageIdentifier,
    ) -> SyncResult<()> {
        store.delete_message(id)?;
        self.sets.remove_member(id);
        self.sets.shift(id, IndexShift::Removed);
        Ok(())
    }
}

/// Index one past the end of the tx or rx list of `endpoint`.
fn next_index<S: MessageStore>(
    store: &S,
    endpoint: &ComEndpoint,
    protocol: ProtocolType,
    is_tx: bool,
) -> Result<u32, StoreError> {
    let container: &MessageContainer = store
        .message_container(
            endpoint.node_index,
            protocol,
            endpoint.interface_index,
            endpoint.datapool_index,
        )
        .ok_or(StoreError::DatapoolMissing {
            node_index: endpoint.node_index,
            datapool_index: endpoint.datapool_index,
            protocol,
        })?;
    Ok(container.messages(is_tx).len() as u32)
}
