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

//! The PacketBuffer, which stores incoming video packets and hands out
//! complete frames.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::PacketBufferConfig;
use crate::emitted_history::EmittedHistory;
use crate::frame::AssembledFrame;
use crate::frame_assembler::FrameAssembler;
use crate::missing_set::MissingSet;
use crate::packet::Packet;
use crate::seq_num::{ahead_of, forward_diff};
use crate::sequence_ring::SequenceRing;
use crate::statistics::{PacketBufferStats, StatisticsCalculator};
use crate::timestamp_history::TimestampHistory;
use crate::Result;

/// Receives every frame the buffer completes.
///
/// Called without the buffer lock held, so implementations may call back into
/// the buffer.
pub trait OnAssembledFrame: Send + Sync {
    fn on_assembled_frame(&self, frame: AssembledFrame);
}

impl<F> OnAssembledFrame for F
where
    F: Fn(AssembledFrame) + Send + Sync,
{
    fn on_assembled_frame(&self, frame: AssembledFrame) {
        self(frame)
    }
}

/// Outcome of storing a packet while the lock is held.
enum Insertion {
    Stored(Vec<AssembledFrame>),
    Dropped,
    Overflow,
}

/// Everything guarded by the buffer lock.
struct BufferState {
    ring: SequenceRing,
    missing: MissingSet,
    timestamps: TimestampHistory,
    emitted: EmittedHistory,
    statistics: StatisticsCalculator,
    /// Oldest sequence number the buffer still cares about.
    first_seq_num: u16,
    first_packet_received: bool,
    /// `clear_to` has moved `first_seq_num` forward; older packets are stale.
    is_cleared_to_first_seq_num: bool,
    last_received_packet_ms: Option<i64>,
    last_received_keyframe_packet_ms: Option<i64>,
}

impl BufferState {
    fn new(config: &PacketBufferConfig) -> Self {
        Self {
            ring: SequenceRing::new(config.start_buffer_size, config.max_buffer_size),
            missing: MissingSet::new(),
            timestamps: TimestampHistory::new(),
            emitted: EmittedHistory::new(config.max_buffer_size),
            statistics: StatisticsCalculator::new(),
            first_seq_num: 0,
            first_packet_received: false,
            is_cleared_to_first_seq_num: false,
            last_received_packet_ms: None,
            last_received_keyframe_packet_ms: None,
        }
    }

    fn insert(&mut self, packet: Packet, assembler: &FrameAssembler, now_ms: i64) -> Insertion {
        self.timestamps.observe(packet.timestamp);

        let seq_num = packet.seq_num;
        if self.emitted.contains(seq_num) {
            log::debug!("Discarding packet {seq_num} of an already assembled frame");
            self.statistics.duplicate_packet();
            return Insertion::Dropped;
        }

        if !self.first_packet_received {
            self.first_seq_num = seq_num;
            self.first_packet_received = true;
        } else if ahead_of(self.first_seq_num, seq_num) {
            // We have explicitly cleared past this packet, it's old.
            if self.is_cleared_to_first_seq_num {
                log::debug!(
                    "Dropping stale packet {seq_num}, buffer cleared to {}",
                    self.first_seq_num
                );
                self.statistics.stale_packet();
                return Insertion::Dropped;
            }
            self.first_seq_num = seq_num;
        }

        if self.ring.is_occupied(seq_num) {
            if self.ring.get(seq_num).is_some() {
                log::debug!("Discarding duplicate packet: seq={seq_num}");
                self.statistics.duplicate_packet();
                return Insertion::Dropped;
            }

            // The buffer is full, try to expand it.
            while self.ring.expand() {
                self.statistics.buffer_expanded();
                if !self.ring.is_occupied(seq_num) {
                    break;
                }
            }

            if self.ring.is_occupied(seq_num) {
                log::warn!("Clear PacketBuffer and request key frame.");
                self.clear();
                self.statistics.buffer_overflow();
                return Insertion::Overflow;
            }
        }

        let is_keyframe_packet = packet.is_keyframe_packet();
        self.ring.store(packet);
        self.statistics.packet_inserted();
        self.missing.update(seq_num);

        self.last_received_packet_ms = Some(now_ms);
        if is_keyframe_packet {
            self.last_received_keyframe_packet_ms = Some(now_ms);
        }

        let found_frames = assembler.find_frames(&mut self.ring, &mut self.missing, seq_num);
        self.record_emitted(&found_frames);
        Insertion::Stored(found_frames)
    }

    fn record_emitted(&mut self, found_frames: &[AssembledFrame]) {
        self.statistics.frames_assembled(found_frames.len());
        for frame in found_frames {
            self.emitted.record(frame.first_seq_num, frame.last_seq_num);
        }
    }

    fn clear_to(&mut self, seq_num: u16) {
        // We have already cleared past this sequence number.
        if self.is_cleared_to_first_seq_num && ahead_of(self.first_seq_num, seq_num) {
            return;
        }
        // The buffer was cleared between a frame being created and returned.
        if !self.first_packet_received {
            return;
        }

        let clear_to = seq_num.wrapping_add(1);
        let diff = forward_diff(self.first_seq_num, clear_to) as usize;
        let iterations = diff.min(self.ring.capacity());
        for _ in 0..iterations {
            let index = self.ring.index(self.first_seq_num);
            let slot = self.ring.slot(index);
            if slot.used() && ahead_of(clear_to, slot.seq_num) {
                self.ring.release_index(index);
            }
            self.first_seq_num = self.first_seq_num.wrapping_add(1);
        }

        // When `diff` exceeds the capacity the loop stops short of `clear_to`.
        self.first_seq_num = clear_to;
        self.is_cleared_to_first_seq_num = true;
        self.missing.clear_to(clear_to);
    }

    fn clear(&mut self) {
        self.ring.clear();
        self.first_packet_received = false;
        self.is_cleared_to_first_seq_num = false;
        self.last_received_packet_ms = None;
        self.last_received_keyframe_packet_ms = None;
        self.missing.clear();
        self.timestamps.clear();
        self.emitted.clear();
    }
}

/// Reorders RTP video packets and assembles them into frames.
///
/// All state sits behind a single lock; frames are delivered to the
/// [`OnAssembledFrame`] callback after the lock is released, in ascending
/// sequence order per call.
pub struct PacketBuffer {
    state: Mutex<BufferState>,
    assembler: FrameAssembler,
    clock: Arc<dyn Clock>,
    assembled_frame_callback: Box<dyn OnAssembledFrame>,
}

impl PacketBuffer {
    /// Create a new packet buffer
    pub fn new(
        config: PacketBufferConfig,
        clock: Arc<dyn Clock>,
        assembled_frame_callback: impl OnAssembledFrame + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(BufferState::new(&config)),
            assembler: FrameAssembler::new(config.sps_pps_idr_is_h264_keyframe),
            clock,
            assembled_frame_callback: Box::new(assembled_frame_callback),
        })
    }

    /// Create a new packet buffer driven by the system clock
    pub fn with_system_clock(
        config: PacketBufferConfig,
        assembled_frame_callback: impl OnAssembledFrame + 'static,
    ) -> Result<Self> {
        Self::new(config, Arc::new(SystemClock::new()), assembled_frame_callback)
    }

    /// Insert a packet, taking ownership of its payload.
    ///
    /// Returns `false` only if the buffer overflowed and was cleared, in which
    /// case the caller should request a keyframe. Duplicates and stale packets
    /// are dropped and still return `true`.
    pub fn insert_packet(&self, packet: Packet) -> bool {
        let now_ms = self.clock.now_ms();
        let insertion = self.state.lock().insert(packet, &self.assembler, now_ms);

        match insertion {
            Insertion::Stored(found_frames) => {
                self.deliver(found_frames);
                true
            }
            Insertion::Dropped => true,
            Insertion::Overflow => false,
        }
    }

    /// Discard every packet up to and including `seq_num`. Packets older than
    /// that are dropped on arrival from now on.
    pub fn clear_to(&self, seq_num: u16) {
        self.state.lock().clear_to(seq_num);
    }

    /// Drop every packet and forget all sequence number state.
    pub fn clear(&self) {
        self.state.lock().clear();
    }

    /// A padding packet carries no media but closes a sequence number gap,
    /// which may complete frames waiting behind it.
    pub fn padding_received(&self, seq_num: u16) {
        let found_frames = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.statistics.padding_packet();
            state.missing.update(seq_num);
            let found_frames = self.assembler.find_frames(
                &mut state.ring,
                &mut state.missing,
                seq_num.wrapping_add(1),
            );
            state.record_emitted(&found_frames);
            found_frames
        };
        self.deliver(found_frames);
    }

    /// Returns `true` if the packet with `seq_num` is currently stored.
    pub fn contains_packet(&self, seq_num: u16) -> bool {
        self.state.lock().ring.get(seq_num).is_some()
    }

    pub fn last_received_packet_ms(&self) -> Option<i64> {
        self.state.lock().last_received_packet_ms
    }

    pub fn last_received_keyframe_packet_ms(&self) -> Option<i64> {
        self.state.lock().last_received_keyframe_packet_ms
    }

    /// Number of distinct RTP timestamps seen, a rough count of frames.
    pub fn unique_frames_seen(&self) -> u64 {
        self.state.lock().timestamps.unique_frames_seen()
    }

    pub fn stats(&self) -> PacketBufferStats {
        let state = self.state.lock();
        PacketBufferStats {
            capacity: state.ring.capacity(),
            used_slots: state.ring.used_slots(),
            missing_packets: state.missing.len(),
            unique_frames_seen: state.timestamps.unique_frames_seen(),
            lifetime: state.statistics.lifetime().clone(),
        }
    }

    fn deliver(&self, found_frames: Vec<AssembledFrame>) {
        for frame in found_frames {
            self.assembled_frame_callback.on_assembled_frame(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::frame::FrameType;
    use std::sync::{Mutex as StdMutex, OnceLock};

    type FrameLog = Arc<StdMutex<Vec<AssembledFrame>>>;

    /// A helper to create a PacketBuffer that records assembled frames.
    fn create_test_packet_buffer(
        start_size: usize,
        max_size: usize,
    ) -> (PacketBuffer, FrameLog, Arc<SimulatedClock>) {
        let frames: FrameLog = Arc::new(StdMutex::new(Vec::new()));
        let sink = frames.clone();
        let clock = Arc::new(SimulatedClock::new(1000));
        let config = PacketBufferConfig::default().with_buffer_sizes(start_size, max_size);
        let buffer = PacketBuffer::new(config, clock.clone(), move |frame: AssembledFrame| {
            sink.lock().unwrap().push(frame);
        })
        .unwrap();
        (buffer, frames, clock)
    }

    fn create_test_packet(seq_num: u16, timestamp: u32, first: bool, last: bool) -> Packet {
        Packet::new(seq_num, timestamp, vec![seq_num as u8]).with_frame_boundaries(first, last)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PacketBufferConfig::default().with_buffer_sizes(48, 64);
        let result = PacketBuffer::with_system_clock(config, |_frame: AssembledFrame| {});
        assert!(result.is_err());
    }

    #[test]
    fn test_stale_packet_after_clear_to_is_dropped() {
        let (buffer, frames, _) = create_test_packet_buffer(16, 16);
        assert!(buffer.insert_packet(create_test_packet(10, 100, true, false)));
        buffer.clear_to(10);
        assert!(!buffer.contains_packet(10));

        assert!(buffer.insert_packet(create_test_packet(9, 90, true, true)));
        assert!(frames.lock().unwrap().is_empty());
        assert_eq!(buffer.stats().lifetime.stale_packets, 1);
        assert_eq!(buffer.stats().used_slots, 0);
    }

    #[test]
    fn test_older_packet_before_clear_to_moves_first_seq_num_back() {
        let (buffer, frames, _) = create_test_packet_buffer(16, 16);
        buffer.insert_packet(create_test_packet(10, 100, false, true));
        buffer.insert_packet(create_test_packet(9, 100, true, false));
        assert_eq!(frames.lock().unwrap().len(), 1);

        buffer.insert_packet(create_test_packet(5, 50, false, false));
        buffer.clear_to(7);
        assert!(!buffer.contains_packet(5));
    }

    #[test]
    fn test_clear_to_leaves_newer_packets() {
        let (buffer, _, _) = create_test_packet_buffer(16, 16);
        for seq in [1u16, 2, 3, 5, 6] {
            buffer.insert_packet(create_test_packet(seq, seq as u32, false, false));
        }
        buffer.clear_to(3);
        assert!(!buffer.contains_packet(1));
        assert!(!buffer.contains_packet(3));
        assert!(buffer.contains_packet(5));
        assert!(buffer.contains_packet(6));
        assert_eq!(buffer.stats().used_slots, 2);
    }

    #[test]
    fn test_clear_to_before_any_packet_is_noop() {
        let (buffer, frames, _) = create_test_packet_buffer(16, 16);
        buffer.clear_to(100);
        // Nothing was ever received, so 50 is not considered stale.
        buffer.insert_packet(create_test_packet(50, 1, true, true));
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_last_received_times() {
        let (buffer, _, clock) = create_test_packet_buffer(16, 16);
        assert_eq!(buffer.last_received_packet_ms(), None);

        buffer.insert_packet(
            create_test_packet(1, 100, true, false).with_frame_type(FrameType::KeyFrame),
        );
        clock.advance_ms(40);
        buffer.insert_packet(create_test_packet(5, 200, false, false));

        assert_eq!(buffer.last_received_packet_ms(), Some(1040));
        assert_eq!(buffer.last_received_keyframe_packet_ms(), Some(1000));

        buffer.clear();
        assert_eq!(buffer.last_received_packet_ms(), None);
        assert_eq!(buffer.last_received_keyframe_packet_ms(), None);
    }

    #[test]
    fn test_unique_frames_seen() {
        let (buffer, _, _) = create_test_packet_buffer(16, 16);
        buffer.insert_packet(create_test_packet(1, 100, true, false));
        buffer.insert_packet(create_test_packet(2, 100, false, false));
        buffer.insert_packet(create_test_packet(3, 200, true, false));
        // Duplicates and stale packets still count towards the history.
        buffer.insert_packet(create_test_packet(3, 200, true, false));
        assert_eq!(buffer.unique_frames_seen(), 2);
        assert_eq!(buffer.stats().unique_frames_seen, 2);
    }

    #[test]
    fn test_clear_resets_state() {
        let (buffer, frames, _) = create_test_packet_buffer(16, 16);
        buffer.insert_packet(create_test_packet(1, 100, true, false));
        buffer.insert_packet(create_test_packet(4, 100, false, false));
        assert_eq!(buffer.stats().missing_packets, 2);

        buffer.clear();
        let stats = buffer.stats();
        assert_eq!(stats.used_slots, 0);
        assert_eq!(stats.missing_packets, 0);

        // After a clear any sequence number is accepted again.
        buffer.insert_packet(create_test_packet(60000, 7, true, true));
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_padding_updates_statistics() {
        let (buffer, _, _) = create_test_packet_buffer(16, 16);
        buffer.insert_packet(create_test_packet(1, 100, true, true));
        buffer.insert_packet(create_test_packet(4, 200, true, false));
        assert_eq!(buffer.stats().missing_packets, 2);
        buffer.padding_received(2);
        buffer.padding_received(3);
        let stats = buffer.stats();
        assert_eq!(stats.missing_packets, 0);
        assert_eq!(stats.lifetime.padding_packets, 2);
    }

    #[test]
    fn test_resent_frame_is_not_emitted_again() {
        let (buffer, frames, _) = create_test_packet_buffer(16, 16);
        assert!(buffer.insert_packet(create_test_packet(7, 100, true, true)));
        assert!(buffer.insert_packet(create_test_packet(7, 100, true, true)));
        assert_eq!(frames.lock().unwrap().len(), 1);

        for _ in 0..2 {
            assert!(buffer.insert_packet(create_test_packet(1, 50, true, false)));
            assert!(buffer.insert_packet(create_test_packet(2, 50, false, true)));
        }
        let starts: Vec<u16> = frames.lock().unwrap().iter().map(|f| f.first_seq_num).collect();
        assert_eq!(starts, vec![7, 1]);

        let stats = buffer.stats();
        assert_eq!(stats.used_slots, 0);
        assert_eq!(stats.lifetime.duplicate_packets, 3);
        assert_eq!(stats.lifetime.frames_assembled, 2);
    }

    #[test]
    fn test_clear_forgets_assembled_frames() {
        let (buffer, frames, _) = create_test_packet_buffer(16, 16);
        buffer.insert_packet(create_test_packet(7, 100, true, true));
        buffer.clear();
        buffer.insert_packet(create_test_packet(7, 100, true, true));
        assert_eq!(frames.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_callback_runs_without_lock() {
        let slot: Arc<OnceLock<Arc<PacketBuffer>>> = Arc::new(OnceLock::new());
        let observed = Arc::new(StdMutex::new(Vec::new()));

        let callback_slot = slot.clone();
        let callback_observed = observed.clone();
        let config = PacketBufferConfig::default().with_buffer_sizes(16, 16);
        let buffer = Arc::new(
            PacketBuffer::with_system_clock(config, move |frame: AssembledFrame| {
                // Re-entering the buffer would deadlock if the lock were held.
                if let Some(buffer) = callback_slot.get() {
                    let used = buffer.stats().used_slots;
                    callback_observed.lock().unwrap().push((frame.first_seq_num, used));
                }
            })
            .unwrap(),
        );
        assert!(slot.set(buffer.clone()).is_ok());

        buffer.insert_packet(create_test_packet(1, 100, true, true));
        assert_eq!(*observed.lock().unwrap(), vec![(1, 0)]);
    }

    #[test]
    fn test_concurrent_inserts() {
        let (buffer, frames, _) = create_test_packet_buffer(64, 512);
        let buffer = Arc::new(buffer);

        let handles: Vec<_> = (0..4u16)
            .map(|thread_idx| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for frame_idx in 0..25u16 {
                        let base = (thread_idx * 25 + frame_idx) * 2;
                        let ts = base as u32;
                        buffer.insert_packet(create_test_packet(base + 1, ts, false, true));
                        buffer.insert_packet(create_test_packet(base, ts, true, false));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 100);
        assert!(frames.iter().all(|f| f.num_packets() == 2));
        assert_eq!(buffer.stats().used_slots, 0);
    }
}
