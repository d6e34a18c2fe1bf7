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

use std::collections::BTreeSet;

use crate::seq_num::unwrap_relative;

/// Sequence numbers of packets already handed out in a frame.
///
/// Frames may complete out of order, so this is a set rather than a high-water
/// mark. Entries are unwrapped relative to the newest recorded one and only the
/// last `window` sequence numbers are kept.
#[derive(Debug)]
pub(crate) struct EmittedHistory {
    window: i64,
    newest: Option<i64>,
    emitted: BTreeSet<i64>,
}

impl EmittedHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window as i64,
            newest: None,
            emitted: BTreeSet::new(),
        }
    }

    /// Records every sequence number in `[first, last]`.
    pub fn record(&mut self, first_seq_num: u16, last_seq_num: u16) {
        let mut seq_num = first_seq_num;
        loop {
            let unwrapped = match self.newest {
                Some(newest) => unwrap_relative(newest, seq_num),
                None => seq_num as i64,
            };
            self.emitted.insert(unwrapped);
            if self.newest.map_or(true, |newest| unwrapped > newest) {
                self.newest = Some(unwrapped);
            }
            if seq_num == last_seq_num {
                break;
            }
            seq_num = seq_num.wrapping_add(1);
        }

        if let Some(newest) = self.newest {
            self.emitted = self.emitted.split_off(&(newest - self.window + 1));
        }
    }

    pub fn contains(&self, seq_num: u16) -> bool {
        self.newest
            .is_some_and(|newest| self.emitted.contains(&unwrap_relative(newest, seq_num)))
    }

    pub fn clear(&mut self) {
        self.newest = None;
        self.emitted.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.emitted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_closed_range() {
        let mut history = EmittedHistory::new(64);
        history.record(10, 12);
        assert!(!history.contains(9));
        assert!(history.contains(10));
        assert!(history.contains(11));
        assert!(history.contains(12));
        assert!(!history.contains(13));
    }

    #[test]
    fn test_out_of_order_ranges() {
        let mut history = EmittedHistory::new(64);
        history.record(7, 7);
        history.record(3, 4);
        assert!(history.contains(3));
        assert!(history.contains(7));
        assert!(!history.contains(5));
    }

    #[test]
    fn test_range_across_wraparound() {
        let mut history = EmittedHistory::new(64);
        history.record(65534, 1);
        for seq in [65534u16, 65535, 0, 1] {
            assert!(history.contains(seq), "missing {seq}");
        }
        assert!(!history.contains(2));
        assert!(!history.contains(65533));
    }

    #[test]
    fn test_window_drops_old_entries() {
        let mut history = EmittedHistory::new(4);
        history.record(1, 3);
        history.record(6, 6);
        assert!(!history.contains(1));
        assert!(!history.contains(2));
        assert!(history.contains(3));
        assert!(history.contains(6));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut history = EmittedHistory::new(64);
        history.record(1, 1);
        history.clear();
        assert!(!history.contains(1));
    }
}
