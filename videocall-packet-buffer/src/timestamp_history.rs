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

use std::collections::{HashSet, VecDeque};

const MAX_TIMESTAMPS_HISTORY: usize = 1000;

/// Counts distinct RTP timestamps (i.e. frames) over a bounded history.
#[derive(Debug, Default)]
pub(crate) struct TimestampHistory {
    seen: HashSet<u32>,
    order: VecDeque<u32>,
    unique_frames_seen: u64,
}

impl TimestampHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the timestamp was not in the history.
    pub fn observe(&mut self, rtp_timestamp: u32) -> bool {
        if !self.seen.insert(rtp_timestamp) {
            return false;
        }

        self.order.push_back(rtp_timestamp);
        self.unique_frames_seen += 1;
        if self.seen.len() > MAX_TIMESTAMPS_HISTORY {
            if let Some(discarded) = self.order.pop_front() {
                self.seen.remove(&discarded);
            }
        }
        true
    }

    pub fn unique_frames_seen(&self) -> u64 {
        self.unique_frames_seen
    }

    /// Forgets the history; the running count is kept.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_unique_timestamps() {
        let mut history = TimestampHistory::new();
        assert!(history.observe(100));
        assert!(!history.observe(100));
        assert!(history.observe(200));
        assert_eq!(history.unique_frames_seen(), 2);
    }

    #[test]
    fn test_oldest_timestamp_is_evicted() {
        let mut history = TimestampHistory::new();
        for ts in 0..=MAX_TIMESTAMPS_HISTORY as u32 {
            history.observe(ts);
        }
        assert_eq!(history.seen.len(), MAX_TIMESTAMPS_HISTORY);
        // 0 fell out of the window, so it counts again.
        assert!(history.observe(0));
        assert!(!history.observe(MAX_TIMESTAMPS_HISTORY as u32));
        assert_eq!(
            history.unique_frames_seen(),
            MAX_TIMESTAMPS_HISTORY as u64 + 2
        );
    }

    #[test]
    fn test_clear_keeps_count() {
        let mut history = TimestampHistory::new();
        history.observe(1);
        history.clear();
        assert!(history.observe(1));
        assert_eq!(history.unique_frames_seen(), 2);
    }
}
