use crate::types::signal::CanSignal;
use serde::{Deserialize, Serialize};

/// Default receive timeout offset added on top of three cycle times.
pub const AUTO_RECEIVE_TIMEOUT_OFFSET_MS: u32 = 10;

/// CAN message as stored in one node's COM datapool.
///
/// Every node that exchanges a logical message keeps its own copy. The sync manager
/// keeps the shared fields (`name`, `can_id`, `dlc`, transmission settings, signals)
/// identical across those copies, while the receive-timeout fields stay node-local.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CanMessage {
    /// Message name.
    pub name: String,
    /// Associated comment.
    pub comment: String,
    /// Numeric CAN ID (without any extended flag bit).
    pub can_id: u32,
    /// `true` for 29 bit identifiers.
    pub is_extended: bool,
    /// Payload length in bytes.
    pub dlc: u16,
    /// Transmission trigger.
    pub tx_method: TxMethod,
    /// Cycle time in milliseconds (only meaningful for `Cyclic` and `OnChange`).
    pub cycle_time_ms: u32,
    /// Minimum distance between two transmissions in milliseconds.
    pub delay_time_ms: u16,
    /// Receive timeout handling on the receiving node.
    pub receive_timeout_mode: ReceiveTimeoutMode,
    /// Receive timeout in milliseconds (used with `ReceiveTimeoutMode::Custom`).
    pub receive_timeout_ms: u32,
    /// Signals composing the payload.
    pub signals: Vec<CanSignal>,
}

impl CanMessage {
    /// Creates an empty cyclic message.
    pub fn new(name: &str, can_id: u32, is_extended: bool, dlc: u16) -> Self {
        CanMessage {
            name: name.to_string(),
            can_id,
            is_extended,
            dlc,
            ..Default::default()
        }
    }

    /// Resets all fields to their default values.
    pub fn clear(&mut self) {
        *self = CanMessage::default();
    }

    /// Effective receive timeout in milliseconds, `None` when timeout monitoring is off.
    ///
    /// In `Auto` mode the timeout is three cycle times plus a fixed offset; non cyclic
    /// messages have no automatic timeout.
    pub fn effective_receive_timeout(&self) -> Option<u32> {
        match self.receive_timeout_mode {
            ReceiveTimeoutMode::Disabled => None,
            ReceiveTimeoutMode::Custom => Some(self.receive_timeout_ms),
            ReceiveTimeoutMode::Auto => match self.tx_method {
                TxMethod::OnEvent => None,
                _ => Some(
                    self.cycle_time_ms
                        .saturating_mul(3)
                        .saturating_add(AUTO_RECEIVE_TIMEOUT_OFFSET_MS),
                ),
            },
        }
    }

    /// Copies every field shared across nodes from `source`, keeping this copy's
    /// receiver-local settings.
    pub fn apply_shared_fields(&mut self, source: &CanMessage) {
        let receive_timeout_mode: ReceiveTimeoutMode = self.receive_timeout_mode;
        let receive_timeout_ms: u32 = self.receive_timeout_ms;
        *self = source.clone();
        self.receive_timeout_mode = receive_timeout_mode;
        self.receive_timeout_ms = receive_timeout_ms;
    }

    /// Copy of this message with the receiver-local settings reset to defaults.
    pub fn with_default_receive_timeout(&self) -> CanMessage {
        CanMessage {
            receive_timeout_mode: ReceiveTimeoutMode::default(),
            receive_timeout_ms: 0,
            ..self.clone()
        }
    }
}

/// Transmission trigger of a message.
#[derive(Default, Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMethod {
    #[default]
    Cyclic,
    /// Sent on value change, at least once per cycle time.
    OnChange,
    /// Sent by the application only.
    OnEvent,
}

impl TxMethod {
    pub fn to_str(&self) -> String {
        match self {
            TxMethod::Cyclic => "Cyclic".to_string(),
            TxMethod::OnChange => "On Change".to_string(),
            TxMethod::OnEvent => "On Event".to_string(),
        }
    }
}

/// Receive timeout handling on a receiving node.
#[derive(Default, Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveTimeoutMode {
    /// Derived from the transmitter's cycle time.
    #[default]
    Auto,
    /// User defined value.
    Custom,
    /// No timeout monitoring.
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::signal::CanSignal;

    fn build_test_message() -> CanMessage {
        CanMessage {
            name: "Engine_Status".to_string(),
            comment: "Engine state broadcast".to_string(),
            can_id: 0x100,
            is_extended: false,
            dlc: 8,
            tx_method: TxMethod::Cyclic,
            cycle_time_ms: 100,
            delay_time_ms: 0,
            receive_timeout_mode: ReceiveTimeoutMode::Custom,
            receive_timeout_ms: 500,
            signals: vec![CanSignal::new("Engine_Speed", 0, 16)],
        }
    }

    #[test]
    fn test_clear() {
        let mut msg: CanMessage = build_test_message();

        // Check that everything is back to default value
        msg.clear();
        assert_eq!(msg, CanMessage::default());
    }

    #[test]
    fn test_effective_receive_timeout() {
        let mut msg: CanMessage = build_test_message();
        assert_eq!(msg.effective_receive_timeout(), Some(500));

        // Auto: 3 * cycle + offset
        msg.receive_timeout_mode = ReceiveTimeoutMode::Auto;
        assert_eq!(msg.effective_receive_timeout(), Some(310));

        // Event driven messages have no automatic timeout
        msg.tx_method = TxMethod::OnEvent;
        assert_eq!(msg.effective_receive_timeout(), None);

        msg.receive_timeout_mode = ReceiveTimeoutMode::Disabled;
        assert_eq!(msg.effective_receive_timeout(), None);
    }

    #[test]
    fn test_apply_shared_fields_keeps_receive_timeout() {
        let mut rx_copy: CanMessage = build_test_message();

        let mut source: CanMessage = build_test_message();
        source.name = "Engine_Status_2".to_string();
        source.cycle_time_ms = 20;
        source.receive_timeout_mode = ReceiveTimeoutMode::Disabled;
        source.receive_timeout_ms = 0;

        rx_copy.apply_shared_fields(&source);

        assert_eq!(rx_copy.name, "Engine_Status_2");
        assert_eq!(rx_copy.cycle_time_ms, 20);
        // receiver-local settings untouched
        assert_eq!(rx_copy.receive_timeout_mode, ReceiveTimeoutMode::Custom);
        assert_eq!(rx_copy.receive_timeout_ms, 500);
    }
}
