//! State carried through deep sleep in RTC memory.
//!
//! Layout (little endian):
//!
//! | bytes | field                                       |
//! |-------|---------------------------------------------|
//! | 0..4  | magic                                       |
//! | 4     | display powered (0/1)                       |
//! | 5     | last travel (0 none, 1 open, 2 close)       |
//! | 6..8  | reserved, zero                              |
//! | 8..12 | last temperature, `f32`, NaN when unknown   |
//!
//! RTC memory holds garbage or zeros after a power-on reset; the magic word
//! makes that decode as `None` so cold boot falls back to defaults.
//!
//! Position itself is not retained. It is re-resolved from the endstops on
//! every wake with `last_travel` as the hint.

use crate::types::Direction;

pub const RETAINED_LEN: usize = 12;
const MAGIC: u32 = 0x5749_4e44;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetainedState {
    /// The panel keeps its own power state while the MCU sleeps.
    pub oled_enabled: bool,
    pub last_travel: Option<Direction>,
    pub last_temp_c: Option<f32>,
}

impl Default for RetainedState {
    fn default() -> Self {
        Self {
            oled_enabled: true,
            last_travel: None,
            last_temp_c: None,
        }
    }
}

impl RetainedState {
    pub fn encode(&self) -> [u8; RETAINED_LEN] {
        let mut raw = [0_u8; RETAINED_LEN];
        raw[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        raw[4] = u8::from(self.oled_enabled);
        raw[5] = match self.last_travel {
            None => 0,
            Some(Direction::Open) => 1,
            Some(Direction::Close) => 2,
        };
        let temp = self.last_temp_c.unwrap_or(f32::NAN);
        raw[8..12].copy_from_slice(&temp.to_le_bytes());
        raw
    }

    pub fn decode(raw: &[u8; RETAINED_LEN]) -> Option<Self> {
        let magic = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if magic != MAGIC {
            return None;
        }

        let oled_enabled = match raw[4] {
            0 => false,
            1 => true,
            _ => return None,
        };
        let last_travel = match raw[5] {
            0 => None,
            1 => Some(Direction::Open),
            2 => Some(Direction::Close),
            _ => return None,
        };
        let temp = f32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);

        Some(Self {
            oled_enabled,
            last_travel,
            last_temp_c: temp.is_finite().then_some(temp),
        })
    }

    /// Decodes, falling back to defaults for a cold or corrupted record.
    pub fn restore(raw: &[u8; RETAINED_LEN]) -> Self {
        Self::decode(raw).unwrap_or_default()
    }
}
