//! Synchronization manager: state, initialization and read-only queries.
//!
//! Mutating operations live in the sibling modules (`edit`, `properties`, `critical`,
//! `allocation`); they all extend [`SyncManager`] with further `impl` blocks.

use log::debug;

use crate::store::MessageStore;
use crate::sync::builder::{MatchEntry, MatchSets, SyncScope, UniqueId};
use crate::types::{
    errors::{SyncError, SyncResult},
    identifier::{ComEndpoint, MessageIdentifier, ProtocolType},
};

/// Keeps every node-local copy of a logical CAN message consistent.
///
/// The manager starts uninitialized; [`init`](SyncManager::init) performs a full rebuild
/// for a [`SyncScope`] and every later operation updates the match sets incrementally.
/// The store is never owned: each call borrows it.
#[derive(Default, Clone, Debug)]
pub struct SyncManager {
    scope: Option<SyncScope>,
    pub(crate) sets: MatchSets,
}

impl SyncManager {
    /// Creates an uninitialized manager.
    pub fn new() -> Self {
        SyncManager::default()
    }

    /// Rebuilds all match sets, unique ids and critical transmitters from the store.
    pub fn init<S: MessageStore>(&mut self, store: &S, scope: SyncScope) -> SyncResult<()> {
        self.sets = MatchSets::build(store, &scope)?;
        self.scope = Some(scope);
        debug!(
            "Initialized message sync for {:?}: {} unique messages, {} critical",
            scope,
            self.sets.entries().len(),
            self.sets.critical().len()
        );
        Ok(())
    }

    /// Shortcut for a bus scope.
    pub fn init_bus<S: MessageStore>(
        &mut self,
        store: &S,
        bus_index: u32,
        protocol: ProtocolType,
    ) -> SyncResult<()> {
        self.init(
            store,
            SyncScope::Bus {
                bus_index,
                protocol,
            },
        )
    }

    /// Shortcut for a single node interface scope.
    pub fn init_node_interface<S: MessageStore>(
        &mut self,
        store: &S,
        node_index: u32,
        interface_index: u32,
        protocol: ProtocolType,
    ) -> SyncResult<()> {
        self.init(
            store,
            SyncScope::NodeInterface {
                node_index,
                interface_index,
                protocol,
            },
        )
    }

    pub fn is_initialized(&self) -> bool {
        self.scope.is_some()
    }

    pub fn scope(&self) -> Option<SyncScope> {
        self.scope
    }

    /// All match sets.
    pub fn match_sets(&self) -> &[MatchEntry] {
        self.sets.entries()
    }

    pub(crate) fn ready(&self) -> SyncResult<SyncScope> {
        self.scope.ok_or(SyncError::NotInitialized)
    }

    /// Fails unless the manager is initialized and `id` uses the managed protocol.
    pub(crate) fn check_id(&self, id: &MessageIdentifier) -> SyncResult<SyncScope> {
        let scope: SyncScope = self.ready()?;
        if id.protocol != scope.protocol() {
            return Err(SyncError::ProtocolMismatch {
                id: *id,
                expected: scope.protocol(),
            });
        }
        Ok(scope)
    }

    /// Fails unless `endpoint` takes part in matching for the current scope: connected to
    /// the bus with the protocol active, or on the managed node interface.
    pub(crate) fn check_endpoint<S: MessageStore>(
        &self,
        store: &S,
        endpoint: &ComEndpoint,
    ) -> SyncResult<()> {
        let scope: SyncScope = self.ready()?;
        if !scope.endpoints(store).contains(endpoint) {
            return Err(SyncError::EndpointOutOfScope {
                node_index: endpoint.node_index,
                interface_index: endpoint.interface_index,
                datapool_index: endpoint.datapool_index,
            });
        }
        Ok(())
    }

    // ---- Queries ----

    /// Every node-local copy of the logical message `id` belongs to.
    ///
    /// Untracked identifiers resolve to themselves.
    pub fn resolve(&self, id: &MessageIdentifier) -> Vec<MessageIdentifier> {
        match self.sets.entry_of(id) {
            Some(entry) => entry.members.clone(),
            None => vec![*id],
        }
    }

    /// Another copy of the same logical message on a different node interface, or `id`
    /// itself when there is none. The transmitter is preferred.
    pub fn replace_with_alternate_match(&self, id: &MessageIdentifier) -> MessageIdentifier {
        self.sets
            .entry_of(id)
            .and_then(|entry| {
                entry
                    .members
                    .iter()
                    .find(|m| !m.same_node_interface(id))
                    .copied()
            })
            .unwrap_or(*id)
    }

    /// One representative (the first member) per match set.
    pub fn unique_messages(&self) -> Vec<MessageIdentifier> {
        self.sets
            .entries()
            .iter()
            .filter_map(|e| e.representative().copied())
            .collect()
    }

    /// Number of logical messages of `protocol`.
    pub fn unique_message_count(&self, protocol: ProtocolType) -> usize {
        self.sets
            .entries()
            .iter()
            .filter(|e| e.representative().is_some_and(|r| r.protocol == protocol))
            .count()
    }

    /// Number of transmitters involved in a CAN ID collision.
    pub fn critical_message_count(&self) -> usize {
        self.sets.critical().len()
    }

    pub fn unique_id(&self, id: &MessageIdentifier) -> Option<UniqueId> {
        self.sets.entry_of(id).map(|e| e.unique_id)
    }

    /// Representative of the match set with handle `unique_id`.
    pub fn message_id_for_unique_id(&self, unique_id: UniqueId) -> Option<MessageIdentifier> {
        self.sets
            .entries()
            .iter()
            .find(|e| e.unique_id == unique_id)
            .and_then(|e| e.representative().copied())
    }

    /// Transmitter of the logical message `id` belongs to.
    pub fn transmitter_of(&self, id: &MessageIdentifier) -> Option<MessageIdentifier> {
        match self.sets.entry_of(id) {
            Some(entry) => entry.transmitter().copied(),
            None => id.is_tx.then_some(*id),
        }
    }

    /// Receivers of the logical message `id` belongs to.
    pub fn receivers_of(&self, id: &MessageIdentifier) -> Vec<MessageIdentifier> {
        self.resolve(id).into_iter().filter(|m| !m.is_tx).collect()
    }
}
