//! Per-node identity hashing
//!
//! Every frame a node sends carries a 16-bit hash of its 32-bit UID in the low identifier
//! bits, so that two nodes never generate identical identifiers. Three of those bits are a
//! rolling counter slot, reducing collisions further across frames sent in quick
//! succession -- unless the legacy marker pattern is used for compatibility with older bus
//! participants.

/// Bit offset of the rolling counter slot within the 16-bit hash
const COUNTER_SHIFT: u16 = 7;
/// Mask covering the 3-bit rolling counter slot (bits 7..10)
const COUNTER_MASK: u16 = 0b111 << COUNTER_SHIFT;

/// Derive the 16-bit node hash from a 32-bit UID
///
/// A direct structural hash (high half XOR low half), not cryptographic, and with no
/// collision retry.
pub fn node_hash(uid: u32) -> u16 {
    let low = uid as u16;
    let high = (uid >> 16) as u16;
    low ^ high
}

/// Mix the rolling counter (or the fixed legacy marker) into a node hash
///
/// In legacy mode bit 7 is cleared and the fixed `0x0300` marker is set, matching
/// what older bus participants expect. Otherwise the 3-bit counter slot is cleared and the
/// low three bits of `counter` are placed there; all other bits pass through unchanged.
///
/// Advancing the counter is the sender's responsibility.
pub fn mix_counter(hash: u16, counter: u8, legacy: bool) -> u16 {
    if legacy {
        (hash & 0xFF7F) | 0x0300
    } else {
        (hash & !COUNTER_MASK) | (((counter & 0b111) as u16) << COUNTER_SHIFT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_hash_reference_uid() {
        // 0x4711 ^ 0xEEF0 == 0xA9E1
        assert_eq!(node_hash(0x4711EEF0), 0xA9E1);
    }

    #[test]
    fn test_mix_counter_sets_counter_slot() {
        let mixed = mix_counter(0xA9E1, 0b101, false);
        assert_eq!(mixed, 0xAAE1);
        // Bits outside the counter slot are unchanged
        assert_eq!(mixed & !COUNTER_MASK, 0xA9E1 & !COUNTER_MASK);
        assert_eq!((mixed & COUNTER_MASK) >> COUNTER_SHIFT, 0b101);

        // Slot is cleared before the counter is set
        assert_eq!((mix_counter(0xFFFF, 0, false) & COUNTER_MASK), 0);
    }

    #[test]
    fn test_mix_counter_legacy_marker() {
        for hash in [0x0000u16, 0xFFFF, 0xA9E1, 0x1234] {
            assert_eq!(mix_counter(hash, 0b101, true), (hash & 0xFF7F) | 0x0300);
        }
        assert_eq!(mix_counter(node_hash(0x4711EEF0), 0, true), 0xAB61);
    }

    #[test]
    fn test_counter_wraps_into_three_bits() {
        assert_eq!(
            mix_counter(0x0000, 0b1101, false),
            mix_counter(0x0000, 0b101, false)
        );
    }
}
