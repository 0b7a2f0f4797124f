use serde::{Deserialize, Serialize};

/// Maximum number of signals a single message may carry.
pub const MAX_SIGNALS_PER_MESSAGE: usize = 64;

/// Definition of a signal within a CAN message.
///
/// Describes position/bit-length, byte order, sign, scaling (factor/offset),
/// valid range, unit of measure and multiplexing role.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CanSignal {
    /// Signal name.
    pub name: String,
    /// Associated comment.
    pub comment: String,
    /// Bit start in the payload (bit 0 = LSB of the first byte).
    pub bit_start: u16,
    /// Bit length.
    pub bit_length: u16,
    /// Byte order of the raw value.
    pub byte_order: ByteOrder,
    /// `true` for two's complement raw values.
    pub is_signed: bool,
    /// Scaling factor.
    pub factor: f64,
    /// Scaling offset.
    pub offset: f64,
    /// Minimum physical value.
    pub min: f64,
    /// Maximum physical value.
    pub max: f64,
    /// Unit of measure.
    pub unit: String,
    /// Physical value before the first reception.
    pub init_value: f64,
    /// Multiplexing role.
    pub mux: MuxType,
}

impl CanSignal {
    /// Creates an unsigned Intel signal with identity scaling.
    pub fn new(name: &str, bit_start: u16, bit_length: u16) -> Self {
        CanSignal {
            name: name.to_string(),
            bit_start,
            bit_length,
            factor: 1.0,
            ..Default::default()
        }
    }

    /// Resets all fields to their default values.
    pub fn clear(&mut self) {
        *self = CanSignal::default();
    }

    /// `true` if the signal lies completely inside a payload of `dlc` bytes.
    pub fn fits_in(&self, dlc: u16) -> bool {
        if self.bit_length == 0 {
            return false;
        }
        let total_bits: i32 = i32::from(dlc) * 8;
        let start: i32 = i32::from(self.bit_start);
        let length: i32 = i32::from(self.bit_length);
        match self.byte_order {
            ByteOrder::Intel => start + length <= total_bits,
            ByteOrder::Motorola => {
                // start bit is the MSB; walk MSB-first in the linearized layout
                let linear_start: i32 = (start / 8) * 8 + (7 - start % 8);
                linear_start < total_bits && linear_start + length <= total_bits
            }
        }
    }
}

#[derive(Default, Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Little endian.
    #[default]
    Intel,
    /// Big endian.
    Motorola,
}

/// What role (if any) a signal plays in multiplexing.
#[derive(Default, Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuxType {
    /// Not multiplexed (always present).
    #[default]
    Default,
    /// This signal is the multiplexer switch.
    Multiplexer,
    /// Present only when the multiplexer equals the given value.
    Multiplexed(u16),
}
