//! Raw keypad report decoding
//!
//! Report layout (8 bytes, interrupt endpoint 1):
//!
//! ```text
//! [0]     unused
//! [1]     stick X (0-255)
//! [2]     stick Y (0-255)
//! [3..8]  40-bit key bitmap, canonical key order,
//!         key i at byte 3 + i/8, mask 1 << (i % 8)
//! ```

use crate::keys::KeyIndex;

/// Size of one key state report.
pub const REPORT_SIZE: usize = 8;

/// First byte of the key bitmap.
pub const KEY_BITMAP_OFFSET: usize = 3;

/// A raw stick sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StickSample {
    pub x: i32,
    pub y: i32,
}

/// One decoded hardware report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    raw: [u8; REPORT_SIZE],
}

impl Report {
    pub fn new(raw: [u8; REPORT_SIZE]) -> Self {
        Self { raw }
    }

    /// Decode a report read from the device.
    ///
    /// Returns `None` for short or oversized reads.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let raw: [u8; REPORT_SIZE] = data.try_into().ok()?;
        Some(Self { raw })
    }

    pub fn stick(&self) -> StickSample {
        StickSample {
            x: self.raw[1] as i32,
            y: self.raw[2] as i32,
        }
    }

    /// Whether the key at `key` is pressed in this report.
    pub fn is_pressed(&self, key: KeyIndex) -> bool {
        self.raw
            .get(KEY_BITMAP_OFFSET + key.offset)
            .is_some_and(|byte| byte & key.mask != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEYPAD_KEY_COUNT;
    use proptest::prelude::*;

    #[test]
    fn test_stick_bytes() {
        let report = Report::new([0, 12, 250, 0, 0, 0, 0, 0]);
        assert_eq!(report.stick(), StickSample { x: 12, y: 250 });
    }

    #[test]
    fn test_rejects_wrong_size() {
        assert!(Report::from_bytes(&[0; 7]).is_none());
        assert!(Report::from_bytes(&[0; 9]).is_none());
        assert!(Report::from_bytes(&[0; REPORT_SIZE]).is_some());
    }

    #[test]
    fn test_first_and_last_key() {
        let report = Report::new([0, 0, 0, 0x01, 0, 0, 0, 0x80]);
        assert!(report.is_pressed(KeyIndex::new(0)));
        assert!(report.is_pressed(KeyIndex::new(39)));
        assert!(!report.is_pressed(KeyIndex::new(1)));
        assert!(!report.is_pressed(KeyIndex::new(38)));
    }

    proptest! {
        #[test]
        fn prop_single_bit_maps_to_single_key(i in 0usize..KEYPAD_KEY_COUNT) {
            let mut raw = [0u8; REPORT_SIZE];
            raw[KEY_BITMAP_OFFSET + i / 8] = 1 << (i % 8);
            let report = Report::new(raw);
            for j in 0..KEYPAD_KEY_COUNT {
                prop_assert_eq!(report.is_pressed(KeyIndex::new(j)), i == j);
            }
        }

        #[test]
        fn prop_decoding_reads_offset_and_mask(raw in any::<[u8; REPORT_SIZE]>(), i in 0usize..KEYPAD_KEY_COUNT) {
            let report = Report::new(raw);
            let expected = raw[3 + i / 8] & (1 << (i % 8)) != 0;
            prop_assert_eq!(report.is_pressed(KeyIndex::new(i)), expected);
        }
    }
}
