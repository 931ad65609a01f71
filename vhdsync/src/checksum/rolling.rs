//! Weak rolling checksum used to pre-filter block matches.
//!
//! The checksum keeps two 16-bit accumulators over a window `d[0..L)`:
//!
//! ```text
//! a = sum(d[k])              mod 2^16
//! b = sum((L - k) * d[k])    mod 2^16
//! ```
//!
//! Every byte is weighted by its distance from the end of the window, which
//! lets the window slide one byte at a time in constant time (see
//! [`RollingChecksum::roll`]). Equal checksums only mark a *candidate*
//! match; the strong digest stored next to it decides.

use std::fmt;

/// Size of an encoded checksum in a fingerprint record.
pub const ROLLING_CHECKSUM_LEN: usize = 4;

/// Two-accumulator weak checksum over a byte window.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct RollingChecksum {
    /// Byte sum, truncated to 16 bits.
    pub a: u16,
    /// Position-weighted byte sum, truncated to 16 bits.
    pub b: u16,
}

impl RollingChecksum {
    /// Create a checksum from raw accumulator values.
    pub const fn new(a: u16, b: u16) -> Self {
        Self { a, b }
    }

    /// Compute the checksum of a complete window in a single pass.
    ///
    /// # Examples
    ///
    /// ```
    /// use vhdsync::checksum::RollingChecksum;
    ///
    /// let sum = RollingChecksum::compute(b"abcd");
    /// assert_eq!(sum.a, 394);
    /// assert_eq!(sum.b, 980);
    /// ```
    pub fn compute(data: &[u8]) -> Self {
        let mut a: u16 = 0;
        let mut b: u16 = 0;
        let mut weight = data.len();

        for &byte in data {
            a = a.wrapping_add(u16::from(byte));
            // Only the low 16 bits of the weight survive the modulo.
            b = b.wrapping_add((weight as u16).wrapping_mul(u16::from(byte)));
            weight -= 1;
        }

        Self { a, b }
    }

    /// Slide the window forward by one byte.
    ///
    /// `window_len` is the (unchanged) window length, `outgoing` the byte
    /// leaving at the front and `incoming` the byte entering at the back.
    /// The result equals [`compute`](Self::compute) over the shifted window.
    #[inline]
    pub fn roll(&mut self, window_len: usize, outgoing: u8, incoming: u8) {
        let out = u16::from(outgoing);
        self.a = self.a.wrapping_sub(out).wrapping_add(u16::from(incoming));
        self.b = self
            .b
            .wrapping_sub((window_len as u16).wrapping_mul(out))
            .wrapping_add(self.a);
    }

    /// Pack both accumulators into one value, `b` in the high half.
    pub const fn packed(&self) -> u32 {
        ((self.b as u32) << 16) | self.a as u32
    }

    /// Encode as stored in a fingerprint record (little-endian `a`, then `b`).
    pub fn to_le_bytes(&self) -> [u8; ROLLING_CHECKSUM_LEN] {
        let a = self.a.to_le_bytes();
        let b = self.b.to_le_bytes();
        [a[0], a[1], b[0], b[1]]
    }

    /// Decode from the record encoding produced by [`to_le_bytes`](Self::to_le_bytes).
    pub fn from_le_bytes(bytes: [u8; ROLLING_CHECKSUM_LEN]) -> Self {
        Self {
            a: u16::from_le_bytes([bytes[0], bytes[1]]),
            b: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }
}

impl fmt::Display for RollingChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.packed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_window() {
        assert_eq!(RollingChecksum::compute(&[]), RollingChecksum::new(0, 0));
    }

    #[test]
    fn test_known_values() {
        // a = 97+98+99+100, b = 4*97 + 3*98 + 2*99 + 1*100
        let sum = RollingChecksum::compute(b"abcd");
        assert_eq!(sum.a, 394);
        assert_eq!(sum.b, 980);
        assert_eq!(sum.packed(), (980 << 16) | 394);
    }

    #[test]
    fn test_accumulators_wrap() {
        let data = vec![0xFFu8; 1000];
        let sum = RollingChecksum::compute(&data);

        let expected_a = (255u64 * 1000) % 65536;
        let expected_b = (255u64 * (1000 * 1001 / 2)) % 65536;
        assert_eq!(u64::from(sum.a), expected_a);
        assert_eq!(u64::from(sum.b), expected_b);
    }

    #[test]
    fn test_weights_wrap_for_long_windows() {
        // Window longer than 2^16: weights must be reduced modulo 2^16 too.
        let mut data = vec![0u8; 70_000];
        data[0] = 3;
        let sum = RollingChecksum::compute(&data);

        assert_eq!(sum.a, 3);
        assert_eq!(u64::from(sum.b), (3 * 70_000u64) % 65536);
    }

    #[test]
    fn test_single_byte_changes_are_detected() {
        let base = b"The quick brown fox jumps over the lazy dog".to_vec();
        let reference = RollingChecksum::compute(&base);

        let spots = [0usize, 1, 7, 20, base.len() - 2, base.len() - 1];
        for &pos in &spots {
            for delta in [1u8, 2, 17, 128, 255] {
                let mut changed = base.clone();
                changed[pos] = changed[pos].wrapping_add(delta);
                assert_ne!(
                    RollingChecksum::compute(&changed),
                    reference,
                    "change of {delta} at {pos} went unnoticed"
                );
            }
        }
    }

    #[test]
    fn test_roll_matches_recompute() {
        let data = b"abcdefgh";
        let mut sum = RollingChecksum::compute(&data[0..4]);

        sum.roll(4, b'a', b'e');
        assert_eq!(sum, RollingChecksum::compute(&data[1..5]));
        assert_eq!(sum.a, 398);
        assert_eq!(sum.b, 990);
    }

    #[test]
    fn test_le_bytes_layout() {
        let sum = RollingChecksum::new(0x0102, 0x0304);
        assert_eq!(sum.to_le_bytes(), [0x02, 0x01, 0x04, 0x03]);
        assert_eq!(RollingChecksum::from_le_bytes(sum.to_le_bytes()), sum);
    }

    #[test]
    fn test_display_is_packed_hex() {
        assert_eq!(RollingChecksum::new(0x1, 0x2).to_string(), "00020001");
    }

    proptest! {
        #[test]
        fn prop_compute_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(RollingChecksum::compute(&data), RollingChecksum::compute(&data.clone()));
        }

        #[test]
        fn prop_roll_equals_recompute(
            data in proptest::collection::vec(any::<u8>(), 2..400),
            window in 1usize..64,
        ) {
            let window = window.min(data.len() - 1);
            let mut rolling = RollingChecksum::compute(&data[..window]);

            for start in 1..=(data.len() - window) {
                rolling.roll(window, data[start - 1], data[start + window - 1]);
                prop_assert_eq!(rolling, RollingChecksum::compute(&data[start..start + window]));
            }
        }
    }
}
