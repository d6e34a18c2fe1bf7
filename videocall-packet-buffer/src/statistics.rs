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

use serde::{Deserialize, Serialize};

/// Lifetime counters; these survive `PacketBuffer::clear`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeStatistics {
    pub packets_inserted: u64,
    pub duplicate_packets: u64,
    /// Packets dropped because the buffer was already cleared past them.
    pub stale_packets: u64,
    pub padding_packets: u64,
    pub frames_assembled: u64,
    pub buffer_expansions: u64,
    /// Times the buffer had to be cleared and a keyframe requested.
    pub buffer_overflows: u64,
}

/// Snapshot returned by `PacketBuffer::stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketBufferStats {
    pub capacity: usize,
    pub used_slots: usize,
    pub missing_packets: usize,
    pub unique_frames_seen: u64,
    pub lifetime: LifetimeStatistics,
}

#[derive(Debug, Default)]
pub(crate) struct StatisticsCalculator {
    lifetime: LifetimeStatistics,
}

impl StatisticsCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packet_inserted(&mut self) {
        self.lifetime.packets_inserted += 1;
    }

    pub fn duplicate_packet(&mut self) {
        self.lifetime.duplicate_packets += 1;
    }

    pub fn stale_packet(&mut self) {
        self.lifetime.stale_packets += 1;
    }

    pub fn padding_packet(&mut self) {
        self.lifetime.padding_packets += 1;
    }

    pub fn frames_assembled(&mut self, count: usize) {
        self.lifetime.frames_assembled += count as u64;
    }

    pub fn buffer_expanded(&mut self) {
        self.lifetime.buffer_expansions += 1;
    }

    pub fn buffer_overflow(&mut self) {
        self.lifetime.buffer_overflows += 1;
    }

    pub fn lifetime(&self) -> &LifetimeStatistics {
        &self.lifetime
    }
}
