//! Property and signal propagation.
//!
//! Every setter applies the change to all node-local copies of the logical message, in
//! match-set order. The first store failure stops the update: copies handled before it
//! keep the change and the error reports how far the update got.

use log::{debug, warn};

use crate::store::MessageStore;
use crate::sync::manager::SyncManager;
use crate::types::{
    errors::{StoreError, SyncError, SyncResult},
    identifier::MessageIdentifier,
    message::{CanMessage, ReceiveTimeoutMode, TxMethod},
    signal::{ByteOrder, CanSignal, MuxType},
};

impl SyncManager {
    /// Runs `apply` on every copy of the logical message `id` belongs to.
    fn for_each_match<S, F>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        mut apply: F,
    ) -> SyncResult<()>
    where
        S: MessageStore,
        F: FnMut(&mut S, &MessageIdentifier) -> Result<(), StoreError>,
    {
        self.check_id(id)?;
        let members: Vec<MessageIdentifier> = self.resolve(id);
        let total: usize = members.len();
        for (applied, member) in members.iter().enumerate() {
            if let Err(source) = apply(store, member) {
                if applied == 0 {
                    return Err(source.into());
                }
                warn!(
                    "Update of {} stopped at {} after {} of {} copies",
                    id, member, applied, total
                );
                return Err(SyncError::PartiallyApplied {
                    applied,
                    total,
                    source,
                });
            }
        }
        debug!("Updated {} copies of {}", total, id);
        Ok(())
    }

    /// Edits the shared fields of every copy through `edit`.
    fn update_messages<S, F>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        edit: F,
    ) -> SyncResult<()>
    where
        S: MessageStore,
        F: Fn(&MessageIdentifier, &mut CanMessage) -> Result<(), StoreError>,
    {
        self.for_each_match(store, id, |store, member| {
            let mut message: CanMessage = store
                .message(member)
                .cloned()
                .ok_or(StoreError::MessageIndexOutOfRange { id: *member })?;
            edit(member, &mut message)?;
            store.set_message_properties(member, &message)
        })
    }

    // ---- Message properties ----

    /// Overwrites the message definition of every copy.
    ///
    /// `id` itself takes `message` completely; the other copies keep their own receive
    /// timeout settings.
    pub fn set_message_properties<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        message: &CanMessage,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |member, copy| {
            if member == id {
                *copy = message.clone();
            } else {
                copy.apply_shared_fields(message);
            }
            Ok(())
        })
    }

    pub fn set_message_name<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        name: &str,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |_, copy| {
            copy.name = name.to_string();
            Ok(())
        })
    }

    /// Sets CAN ID and frame format. Follow up with
    /// [`recheck_critical_message`](SyncManager::recheck_critical_message) to update the
    /// collision state.
    pub fn set_message_can_id<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        can_id: u32,
        is_extended: bool,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |_, copy| {
            copy.can_id = can_id;
            copy.is_extended = is_extended;
            Ok(())
        })
    }

    pub fn set_message_dlc<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        dlc: u16,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |_, copy| {
            copy.dlc = dlc;
            Ok(())
        })
    }

    pub fn set_message_tx_method<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        tx_method: TxMethod,
        cycle_time_ms: u32,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |_, copy| {
            copy.tx_method = tx_method;
            copy.cycle_time_ms = cycle_time_ms;
            Ok(())
        })
    }

    pub fn set_message_delay_time<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        delay_time_ms: u16,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |_, copy| {
            copy.delay_time_ms = delay_time_ms;
            Ok(())
        })
    }

    pub fn set_message_comment<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        comment: &str,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |_, copy| {
            copy.comment = comment.to_string();
            Ok(())
        })
    }

    /// Receive timeout of one receiver. Not propagated.
    pub fn set_receive_timeout<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        mode: ReceiveTimeoutMode,
        timeout_ms: u32,
    ) -> SyncResult<()> {
        self.check_id(id)?;
        let Some(message) = store.message(id) else {
            return Err(SyncError::UnknownMessage { id: *id });
        };
        let message: CanMessage = CanMessage {
            receive_timeout_mode: mode,
            receive_timeout_ms: timeout_ms,
            ..message.clone()
        };
        store.set_message_properties(id, &message)?;
        Ok(())
    }

    // ---- Signals ----

    pub fn add_signal<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        signal: &CanSignal,
    ) -> SyncResult<()> {
        self.for_each_match(store, id, |store, member| store.add_signal(member, signal.clone()))
    }

    pub fn insert_signal<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        signal_index: u32,
        signal: &CanSignal,
    ) -> SyncResult<()> {
        self.for_each_match(store, id, |store, member| {
            store.insert_signal(member, signal_index, signal.clone())
        })
    }

    pub fn delete_signal<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        signal_index: u32,
    ) -> SyncResult<()> {
        self.for_each_match(store, id, |store, member| store.delete_signal(member, signal_index))
    }

    pub fn set_signal<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        signal_index: u32,
        signal: &CanSignal,
    ) -> SyncResult<()> {
        self.for_each_match(store, id, |store, member| {
            store.set_signal(member, signal_index, signal)
        })
    }

    /// Moves signal `signal_index` within the payload.
    pub fn set_signal_position<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        signal_index: u32,
        bit_start: u16,
        bit_length: u16,
        byte_order: ByteOrder,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |member, copy| {
            let signal: &mut CanSignal = signal_mut(copy, member, signal_index)?;
            signal.bit_start = bit_start;
            signal.bit_length = bit_length;
            signal.byte_order = byte_order;
            Ok(())
        })
    }

    /// Changes the multiplexing role of signal `signal_index`.
    pub fn set_signal_mux_value<S: MessageStore>(
        &self,
        store: &mut S,
        id: &MessageIdentifier,
        signal_index: u32,
        mux: MuxType,
    ) -> SyncResult<()> {
        self.update_messages(store, id, |member, copy| {
            signal_mut(copy, member, signal_index)?.mux = mux;
            Ok(())
        })
    }
}

fn signal_mut<'a>(
    message: &'a mut CanMessage,
    id: &MessageIdentifier,
    signal_index: u32,
) -> Result<&'a mut CanSignal, StoreError> {
    message
        .signals
        .get_mut(signal_index as usize)
        .ok_or(StoreError::SignalIndexOutOfRange {
            id: *id,
            signal_index,
        })
}
