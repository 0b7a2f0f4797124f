//! Free CAN ID and message name lookup.

use std::collections::BTreeSet;

use crate::store::MessageStore;
use crate::sync::manager::SyncManager;
use crate::types::{identifier::ProtocolType, message::CanMessage};

impl SyncManager {
    /// Lowest CAN ID not used by any logical message of the scope, honoring the
    /// protocol's ID range and step. `None` if the range is exhausted.
    ///
    /// Standard and extended IDs are separate spaces. An uninitialized manager assumes
    /// Layer 2.
    pub fn next_valid_message_id<S: MessageStore>(
        &self,
        store: &S,
        is_extended: bool,
    ) -> Option<u32> {
        let protocol: ProtocolType = self.scope().map(|s| s.protocol()).unwrap_or_default();
        let used: BTreeSet<u32> = self
            .unique_message_definitions(store)
            .filter(|m| m.is_extended == is_extended)
            .map(|m| m.can_id)
            .collect();

        let (min, max) = protocol.id_range(is_extended);
        let step: u32 = protocol.id_step();
        let mut candidate: u32 = min;
        while candidate <= max {
            if !used.contains(&candidate) {
                return Some(candidate);
            }
            candidate = candidate.checked_add(step)?;
        }
        None
    }

    /// `base` if no logical message of the scope carries that name, otherwise the first
    /// free `base_1`, `base_2`, ...
    pub fn next_valid_message_name<S: MessageStore>(&self, store: &S, base: &str) -> String {
        let used: BTreeSet<&str> = self
            .unique_message_definitions(store)
            .map(|m| m.name.as_str())
            .collect();
        if !used.contains(base) {
            return base.to_string();
        }
        let mut suffix: u32 = 1;
        loop {
            let name: String = format!("{}_{}", base, suffix);
            if !used.contains(name.as_str()) {
                return name;
            }
            suffix += 1;
        }
    }

    fn unique_message_definitions<'a, S: MessageStore>(
        &self,
        store: &'a S,
    ) -> impl Iterator<Item = &'a CanMessage> {
        self.unique_messages()
            .into_iter()
            .filter_map(move |id| store.message(&id))
    }
}
