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

//! Tracks sequence numbers that have been skipped but not yet received.

use std::collections::BTreeSet;

use crate::seq_num::unwrap_relative;

/// How far behind the newest sequence number a gap is still remembered.
pub const MAX_PADDING_AGE: i64 = 1000;

/// Ordered set of missing sequence numbers.
///
/// Entries are kept unwrapped relative to the newest inserted sequence number,
/// so the `BTreeSet` order matches wrap-around order. All entries live within
/// [`MAX_PADDING_AGE`] of the newest one.
#[derive(Debug, Default)]
pub(crate) struct MissingSet {
    newest_inserted: Option<i64>,
    missing: BTreeSet<i64>,
}

impl MissingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.missing.len()
    }

    #[cfg(test)]
    pub fn contains(&self, seq_num: u16) -> bool {
        self.unwrap(seq_num)
            .is_some_and(|unwrapped| self.missing.contains(&unwrapped))
    }

    /// Records that `seq_num` arrived (as media or padding).
    pub fn update(&mut self, seq_num: u16) {
        let Some(newest) = self.newest_inserted else {
            self.newest_inserted = Some(seq_num as i64);
            return;
        };

        let unwrapped = unwrap_relative(newest, seq_num);
        if unwrapped > newest {
            let oldest_kept = unwrapped - MAX_PADDING_AGE;
            self.missing = self.missing.split_off(&oldest_kept);

            // Guard against inserting a large amount of missing packets if
            // there is a jump in the sequence number.
            let mut next = newest.max(oldest_kept) + 1;
            while next < unwrapped {
                self.missing.insert(next);
                next += 1;
            }
            self.newest_inserted = Some(unwrapped);
        } else {
            self.missing.remove(&unwrapped);
        }
    }

    /// Drops every entry at or behind `seq_num`.
    pub fn erase_up_to(&mut self, seq_num: u16) {
        if let Some(limit) = self.unwrap(seq_num) {
            self.missing = self.missing.split_off(&(limit + 1));
        }
    }

    /// Returns `true` if any entry is at or behind `seq_num`.
    pub fn has_missing_at_or_before(&self, seq_num: u16) -> bool {
        match (self.unwrap(seq_num), self.missing.first()) {
            (Some(limit), Some(&oldest)) => oldest <= limit,
            _ => false,
        }
    }

    /// Drops entries older than the newest entry at or before `seq_num`;
    /// that newest entry itself is kept.
    pub fn clear_to(&mut self, seq_num: u16) {
        let Some(limit) = self.unwrap(seq_num) else {
            return;
        };
        if let Some(&keep_from) = self.missing.range(..=limit).next_back() {
            self.missing = self.missing.split_off(&keep_from);
        }
    }

    pub fn clear(&mut self) {
        self.newest_inserted = None;
        self.missing.clear();
    }

    fn unwrap(&self, seq_num: u16) -> Option<i64> {
        self.newest_inserted
            .map(|newest| unwrap_relative(newest, seq_num))
    }

    #[cfg(test)]
    fn to_vec(&self) -> Vec<u16> {
        self.missing
            .iter()
            .map(|&unwrapped| unwrapped.rem_euclid(1 << 16) as u16)
            .collect()
    }
}
