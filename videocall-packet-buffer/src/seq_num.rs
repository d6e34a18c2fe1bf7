/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Wrap-around arithmetic for 16-bit RTP sequence numbers.
//!
//! Half of the number space counts as "ahead" of a given value and the other
//! half as "behind". When two values are exactly half the space apart the
//! numerically larger one is treated as ahead, so the relation stays
//! antisymmetric.

const HALF_RANGE: u16 = 0x8000;

/// Returns `true` if `a` is ahead of `b` or equal to it.
pub fn ahead_or_at(a: u16, b: u16) -> bool {
    let diff = a.wrapping_sub(b);
    if diff == HALF_RANGE {
        return b < a;
    }
    diff < HALF_RANGE
}

/// Returns `true` if `a` is strictly ahead of `b`.
pub fn ahead_of(a: u16, b: u16) -> bool {
    a != b && ahead_or_at(a, b)
}

/// Number of increments needed to get from `a` to `b`.
pub fn forward_diff(a: u16, b: u16) -> u16 {
    b.wrapping_sub(a)
}

/// Signed circular distance from `reference` to `seq_num`, consistent with
/// [`ahead_of`].
pub fn signed_diff(reference: u16, seq_num: u16) -> i64 {
    if ahead_or_at(seq_num, reference) {
        forward_diff(reference, seq_num) as i64
    } else {
        -(forward_diff(seq_num, reference) as i64)
    }
}

/// Maps `seq_num` onto the unwrapped (monotonic) line, relative to an
/// already-unwrapped reference point.
pub fn unwrap_relative(reference_unwrapped: i64, seq_num: u16) -> i64 {
    let reference = reference_unwrapped.rem_euclid(1 << 16) as u16;
    reference_unwrapped + signed_diff(reference, seq_num)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ahead_of_simple() {
        assert!(ahead_of(2, 1));
        assert!(!ahead_of(1, 2));
        assert!(!ahead_of(5, 5));
        assert!(ahead_or_at(5, 5));
    }

    #[test]
    fn test_ahead_of_wraparound() {
        assert!(ahead_of(0, 65535));
        assert!(ahead_of(10, 65530));
        assert!(!ahead_of(65535, 0));
    }

    #[test]
    fn test_half_range_tie_break() {
        assert!(ahead_of(0x8000, 0));
        assert!(!ahead_of(0, 0x8000));
    }

    #[test]
    fn test_forward_diff() {
        assert_eq!(forward_diff(10, 15), 5);
        assert_eq!(forward_diff(65535, 1), 2);
        assert_eq!(forward_diff(1, 0), 65535);
    }

    #[test]
    fn test_unwrap_relative_crosses_boundary() {
        assert_eq!(unwrap_relative(65535, 0), 65536);
        assert_eq!(unwrap_relative(65536, 65535), 65535);
        assert_eq!(unwrap_relative(70000, 4464), 70000);
    }

    proptest! {
        #[test]
        fn ahead_of_is_antisymmetric(a: u16, b: u16) {
            prop_assume!(a != b);
            prop_assert!(ahead_of(a, b) != ahead_of(b, a));
        }

        #[test]
        fn successor_is_ahead(a: u16) {
            prop_assert!(ahead_of(a.wrapping_add(1), a));
        }

        #[test]
        fn unwrap_preserves_ordering(reference in 0i64..1_000_000, seq: u16) {
            let unwrapped = unwrap_relative(reference, seq);
            let reference_seq = reference.rem_euclid(1 << 16) as u16;
            prop_assert_eq!(unwrapped.rem_euclid(1 << 16) as u16, seq);
            prop_assert_eq!(unwrapped > reference, ahead_of(seq, reference_seq));
        }
    }
}
