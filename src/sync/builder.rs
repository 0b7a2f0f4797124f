//! Match-set construction.
//!
//! A match set is every node-local copy of one logical message. [`MatchSets`] holds all
//! match sets of a scope together with their [`UniqueId`]s and the list of critical
//! transmitters, and implements the registration rules used both by the full rebuild
//! ([`MatchSets::build`]) and by the incremental operations of the sync manager.
//!
//! Registration rules:
//! - a transmitter colliding with the transmitter of an existing set is flagged critical
//!   (together with the other transmitter), starts its own set, and the receivers of the
//!   colliding set are split off since they can no longer tell which transmitter to follow;
//! - a transmitter without collision joins the first receive-only set it matches, as the
//!   set's first member, or starts a new set;
//! - a receiver joins the first set it matches whose transmitter is not critical, or starts
//!   a new set;
//! - CANopen identifiers always form their own single-member set.

use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::{MessageContainer, MessageStore};
use crate::sync::comparator::{MatchKind, compare};
use crate::sync::shift::{IndexShift, shift_indices};
use crate::types::{
    errors::SyncResult,
    identifier::{ComEndpoint, MessageIdentifier, ProtocolType},
};

/// Stable handle of one match set, unique while the set exists.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueId(pub u64);

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the sync manager is initialized for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    /// Every protocol-active node interface connected to the bus.
    Bus {
        bus_index: u32,
        protocol: ProtocolType,
    },
    /// One node interface, connected or not.
    NodeInterface {
        node_index: u32,
        interface_index: u32,
        protocol: ProtocolType,
    },
}

impl SyncScope {
    pub fn protocol(&self) -> ProtocolType {
        match self {
            SyncScope::Bus { protocol, .. } => *protocol,
            SyncScope::NodeInterface { protocol, .. } => *protocol,
        }
    }

    /// Resolves the scope to the endpoints whose messages take part in matching.
    pub fn endpoints<S: MessageStore>(&self, store: &S) -> Vec<ComEndpoint> {
        match *self {
            SyncScope::Bus {
                bus_index,
                protocol,
            } => store
                .bus_endpoints(bus_index, protocol)
                .into_iter()
                .filter(|ep| {
                    store
                        .message_container(
                            ep.node_index,
                            protocol,
                            ep.interface_index,
                            ep.datapool_index,
                        )
                        .is_some_and(|c| c.is_protocol_used_by_interface)
                })
                .collect(),
            SyncScope::NodeInterface {
                node_index,
                interface_index,
                protocol,
            } => store
                .interface_datapools(node_index, interface_index, protocol)
                .into_iter()
                .map(|dp| ComEndpoint::new(node_index, interface_index, dp))
                .collect(),
        }
    }
}

/// One logical message: its handle and every node-local copy.
///
/// When a transmitter is present it is the first member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchEntry {
    pub unique_id: UniqueId,
    pub members: Vec<MessageIdentifier>,
}

impl MatchEntry {
    /// First member; the transmitter if there is one.
    pub fn representative(&self) -> Option<&MessageIdentifier> {
        self.members.first()
    }

    /// The transmitter, if any.
    pub fn transmitter(&self) -> Option<&MessageIdentifier> {
        self.members.first().filter(|id| id.is_tx)
    }
}

/// Where an identifier ended up after registration (index into the entry list).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    /// Joined an existing set.
    Joined(usize),
    /// Started a new set.
    Created(usize),
    /// Collided with at least one transmitter and started its own set.
    Critical(usize),
    /// Was registered before; nothing changed.
    AlreadyExists(usize),
}

impl Registration {
    pub fn entry_index(&self) -> usize {
        match *self {
            Registration::Joined(i)
            | Registration::Created(i)
            | Registration::Critical(i)
            | Registration::AlreadyExists(i) => i,
        }
    }
}

/// All match sets of one scope plus the critical transmitters.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct MatchSets {
    entries: Vec<MatchEntry>,
    critical: Vec<MessageIdentifier>,
}

impl MatchSets {
    /// Full rebuild from the store content.
    pub fn build<S: MessageStore>(store: &S, scope: &SyncScope) -> SyncResult<MatchSets> {
        let protocol: ProtocolType = scope.protocol();
        let mut sets: MatchSets = MatchSets::default();

        for endpoint in scope.endpoints(store) {
            let Some(container) = store.message_container(
                endpoint.node_index,
                protocol,
                endpoint.interface_index,
                endpoint.datapool_index,
            ) else {
                warn!("No {} container for endpoint {:?}", protocol, endpoint);
                continue;
            };
            let (tx_count, rx_count) = message_counts(container);

            for is_tx in [true, false] {
                let count: usize = if is_tx { tx_count } else { rx_count };
                for message_index in 0..count {
                    let id: MessageIdentifier =
                        MessageIdentifier::at(endpoint, protocol, is_tx, message_index as u32);
                    if let Registration::AlreadyExists(_) = sets.register(store, &id)? {
                        trace!("Skipped double registration of {}", id);
                    }
                }
            }
        }
        Ok(sets)
    }

    // ---- Registration ----

    /// Registers one identifier according to the module rules.
    pub fn register<S: MessageStore>(
        &mut self,
        store: &S,
        id: &MessageIdentifier,
    ) -> SyncResult<Registration> {
        if let Some(pos) = self.position(id) {
            return Ok(Registration::AlreadyExists(pos));
        }
        let registration: Registration = if !id.protocol.is_synchronized() {
            Registration::Created(self.push_entry(vec![*id]))
        } else if id.is_tx {
            self.register_transmitter(store, id)?
        } else {
            self.register_receiver(store, id)?
        };
        trace!("Registered {} as {:?}", id, registration);
        Ok(registration)
    }

    fn register_transmitter<S: MessageStore>(
        &mut self,
        store: &S,
        id: &MessageIdentifier,
    ) -> SyncResult<Registration> {
        // collisions first: a match with a receive-only set must not hide them
        let mut colliders: Vec<usize> = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if let Some(tx) = entry.transmitter()
                && tx.protocol == id.protocol
                && compare(store, tx, id)? == MatchKind::Critical
            {
                colliders.push(i);
            }
        }

        if !colliders.is_empty() {
            let mut orphans: Vec<MessageIdentifier> = Vec::new();
            for &i in &colliders {
                let entry: &mut MatchEntry = &mut self.entries[i];
                if let Some(tx) = entry.transmitter().copied() {
                    warn!("Transmitter collision: {} and {} send the same CAN ID", tx, id);
                    Self::flag(&mut self.critical, tx);
                }
                orphans.extend(entry.members.iter().filter(|m| !m.is_tx).copied());
                entry.members.retain(|m| m.is_tx);
            }
            Self::flag(&mut self.critical, *id);
            let pos: usize = self.push_entry(vec![*id]);
            for orphan in orphans {
                self.register_receiver(store, &orphan)?;
            }
            return Ok(Registration::Critical(pos));
        }

        let mut joined: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let Some(rep) = entry.representative() else {
                continue;
            };
            if !rep.is_tx
                && rep.protocol == id.protocol
                && compare(store, rep, id)? == MatchKind::Normal
            {
                joined = Some(i);
                break;
            }
        }
        match joined {
            Some(i) => {
                self.entries[i].members.insert(0, *id);
                Ok(Registration::Joined(i))
            }
            None => Ok(Registration::Created(self.push_entry(vec![*id]))),
        }
    }

    pub(crate) fn register_receiver<S: MessageStore>(
        &mut self,
        store: &S,
        id: &MessageIdentifier,
    ) -> SyncResult<Registration> {
        let mut joined: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let Some(rep) = entry.representative() else {
                continue;
            };
            if rep.protocol != id.protocol || (rep.is_tx && self.critical.contains(rep)) {
                continue;
            }
            if compare(store, rep, id)? == MatchKind::Normal {
                joined = Some(i);
                break;
            }
        }
        match joined {
            Some(i) => {
                self.entries[i].members.push(*id);
                Ok(Registration::Joined(i))
            }
            None => Ok(Registration::Created(self.push_entry(vec![*id]))),
        }
    }

    fn flag(critical: &mut Vec<MessageIdentifier>, id: MessageIdentifier) {
        if !critical.contains(&id) {
            critical.push(id);
        }
    }

    /// Appends a new set and returns its index.
    ///
    /// The handle is the smallest positive integer not used by another set.
    pub(crate) fn push_entry(&mut self, members: Vec<MessageIdentifier>) -> usize {
        let mut candidate: u64 = 1;
        while self.entries.iter().any(|e| e.unique_id.0 == candidate) {
            candidate += 1;
        }
        self.entries.push(MatchEntry {
            unique_id: UniqueId(candidate),
            members,
        });
        self.entries.len() - 1
    }

    /// Appends a set under a handle it owned before (restoring after a failed edit).
    ///
    /// Falls back to a fresh handle if `unique_id` was taken in the meantime.
    pub(crate) fn push_entry_with(
        &mut self,
        unique_id: UniqueId,
        members: Vec<MessageIdentifier>,
    ) -> usize {
        if self.entries.iter().any(|e| e.unique_id == unique_id) {
            return self.push_entry(members);
        }
        self.entries.push(MatchEntry { unique_id, members });
        self.entries.len() - 1
    }

    // ---- Queries ----

    pub fn entries(&self) -> &[MatchEntry] {
        &self.entries
    }

    pub fn critical(&self) -> &[MessageIdentifier] {
        &self.critical
    }

    /// Index of the set containing `id`.
    pub fn position(&self, id: &MessageIdentifier) -> Option<usize> {
        self.entries.iter().position(|e| e.members.contains(id))
    }

    pub fn entry_of(&self, id: &MessageIdentifier) -> Option<&MatchEntry> {
        self.position(id).map(|i| &self.entries[i])
    }

    pub fn is_critical(&self, id: &MessageIdentifier) -> bool {
        self.critical.contains(id)
    }

    // ---- Bookkeeping ----

    pub(crate) fn entry_mut(&mut self, index: usize) -> Option<&mut MatchEntry> {
        self.entries.get_mut(index)
    }

    /// Removes `id` from its set (dropping the set if it becomes empty) and from the
    /// critical list. Returns the index the set had.
    pub(crate) fn remove_member(&mut self, id: &MessageIdentifier) -> Option<usize> {
        self.critical.retain(|c| c != id);
        let pos: usize = self.position(id)?;
        self.entries[pos].members.retain(|m| m != id);
        if self.entries[pos].members.is_empty() {
            self.entries.remove(pos);
        }
        Some(pos)
    }

    /// Removes a whole set and returns it.
    pub(crate) fn remove_entry(&mut self, index: usize) -> Option<MatchEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let entry: MatchEntry = self.entries.remove(index);
        self.critical.retain(|c| !entry.members.contains(c));
        Some(entry)
    }

    pub(crate) fn unflag(&mut self, id: &MessageIdentifier) {
        self.critical.retain(|c| c != id);
    }

    pub(crate) fn flag_critical(&mut self, id: MessageIdentifier) {
        Self::flag(&mut self.critical, id);
    }

    /// Renumbers every tracked identifier after a store change at `anchor`.
    pub(crate) fn shift(&mut self, anchor: &MessageIdentifier, shift: IndexShift) {
        let members = self.entries.iter_mut().flat_map(|e| e.members.iter_mut());
        shift_indices(members.chain(self.critical.iter_mut()), anchor, shift);
    }
}

fn message_counts(container: &MessageContainer) -> (usize, usize) {
    (container.tx_messages.len(), container.rx_messages.len())
}
