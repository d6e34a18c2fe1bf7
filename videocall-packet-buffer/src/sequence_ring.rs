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

//! Power-of-two ring that maps sequence numbers to packet slots.

use crate::packet::Packet;
use crate::seq_num::forward_diff;

/// A single ring position: continuity bookkeeping plus the owned packet.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub seq_num: u16,
    pub frame_begin: bool,
    pub frame_end: bool,
    /// Every packet from the frame start up to this one has been seen.
    pub continuous: bool,
    /// Claimed by a frame that is currently being assembled.
    pub frame_created: bool,
    pub packet: Option<Packet>,
}

impl Slot {
    pub fn used(&self) -> bool {
        self.packet.is_some()
    }

    /// Returns `true` if the slot currently stores `seq_num`.
    pub fn holds(&self, seq_num: u16) -> bool {
        self.used() && self.seq_num == seq_num
    }

    pub fn timestamp(&self) -> Option<u32> {
        self.packet.as_ref().map(|p| p.timestamp)
    }

    fn release(&mut self) -> Option<Packet> {
        self.packet.take()
    }
}

/// Fixed-capacity ring indexed by `seq_num % capacity`.
#[derive(Debug)]
pub(crate) struct SequenceRing {
    slots: Vec<Slot>,
    max_capacity: usize,
}

impl SequenceRing {
    /// Both sizes must be powers of two with `start_capacity <= max_capacity`.
    pub fn new(start_capacity: usize, max_capacity: usize) -> Self {
        debug_assert!(start_capacity.is_power_of_two());
        debug_assert!(max_capacity.is_power_of_two());
        debug_assert!(start_capacity <= max_capacity);
        Self {
            slots: empty_slots(start_capacity),
            max_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn index(&self, seq_num: u16) -> usize {
        seq_num as usize % self.slots.len()
    }

    pub fn prev_index(&self, index: usize) -> usize {
        if index > 0 {
            index - 1
        } else {
            self.slots.len() - 1
        }
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }

    /// The slot `seq_num` maps to is taken, by this or another sequence number.
    pub fn is_occupied(&self, seq_num: u16) -> bool {
        self.slots[self.index(seq_num)].used()
    }

    pub fn get(&self, seq_num: u16) -> Option<&Packet> {
        let slot = &self.slots[self.index(seq_num)];
        if slot.holds(seq_num) {
            slot.packet.as_ref()
        } else {
            None
        }
    }

    pub fn used_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.used()).count()
    }

    /// Stores `packet` in its slot, overwriting whatever was there.
    pub fn store(&mut self, packet: Packet) {
        let index = self.index(packet.seq_num);
        let slot = &mut self.slots[index];
        slot.seq_num = packet.seq_num;
        slot.frame_begin = packet.is_first_packet_in_frame;
        slot.frame_end = packet.is_last_packet_in_frame;
        slot.continuous = false;
        slot.frame_created = false;
        slot.packet = Some(packet);
    }

    /// Doubles the capacity (capped at the maximum), moving every used slot
    /// to its new index. Returns `false` if already at the maximum.
    pub fn expand(&mut self) -> bool {
        let size = self.slots.len();
        if size == self.max_capacity {
            log::warn!("PacketBuffer is already at max size ({size}), failed to increase size.");
            return false;
        }

        let new_size = self.max_capacity.min(2 * size);
        let mut new_slots = empty_slots(new_size);
        for slot in self.slots.drain(..).filter(Slot::used) {
            let index = slot.seq_num as usize % new_size;
            new_slots[index] = slot;
        }
        self.slots = new_slots;
        log::info!("PacketBuffer size expanded to {new_size}");
        true
    }

    /// Frees the slot at `index`, returning the packet it owned.
    pub fn release_index(&mut self, index: usize) -> Option<Packet> {
        self.slots[index].release()
    }

    /// Frees the closed range `[start, stop]` and returns its packets in
    /// sequence order.
    ///
    /// # Panics
    ///
    /// If a slot in the range does not store the expected sequence number.
    pub fn clear_interval(&mut self, start_seq_num: u16, stop_seq_num: u16) -> Vec<Packet> {
        let iterations = forward_diff(start_seq_num, stop_seq_num.wrapping_add(1)) as usize;
        assert!(
            iterations <= self.slots.len(),
            "interval {start_seq_num}..={stop_seq_num} exceeds ring capacity"
        );

        let mut packets = Vec::with_capacity(iterations);
        let mut seq_num = start_seq_num;
        for _ in 0..iterations {
            let index = self.index(seq_num);
            let slot = &mut self.slots[index];
            assert!(
                slot.holds(seq_num),
                "slot {index} does not hold sequence number {seq_num}"
            );
            packets.extend(slot.release());
            seq_num = seq_num.wrapping_add(1);
        }
        packets
    }

    /// Frees every slot.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.release();
        }
    }
}

fn empty_slots(size: usize) -> Vec<Slot> {
    (0..size).map(|_| Slot::default()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq_num: u16) -> Packet {
        Packet::new(seq_num, 1000, vec![seq_num as u8])
    }

    #[test]
    fn test_index_wraps_modulo_capacity() {
        let ring = SequenceRing::new(8, 16);
        assert_eq!(ring.index(3), 3);
        assert_eq!(ring.index(11), 3);
        assert_eq!(ring.index(65535), 7);
        assert_eq!(ring.prev_index(0), 7);
        assert_eq!(ring.next_index(7), 0);
    }

    #[test]
    fn test_store_and_get() {
        let mut ring = SequenceRing::new(8, 16);
        ring.store(packet(5).with_frame_boundaries(true, false));
        assert!(ring.is_occupied(5));
        assert!(ring.is_occupied(13));
        assert!(ring.get(13).is_none());
        let slot = ring.slot(5);
        assert!(slot.frame_begin);
        assert!(!slot.frame_end);
        assert_eq!(ring.get(5).map(|p| p.payload.clone()), Some(vec![5]));
        assert_eq!(ring.used_slots(), 1);
    }

    #[test]
    fn test_expand_rehashes_used_slots() {
        let mut ring = SequenceRing::new(4, 16);
        for seq in [2u16, 3, 4, 5] {
            ring.store(packet(seq));
        }
        ring.slot_mut(2).continuous = true;
        assert!(ring.is_occupied(6));

        assert!(ring.expand());
        assert_eq!(ring.capacity(), 8);
        for seq in [2u16, 3, 4, 5] {
            let index = ring.index(seq);
            assert_eq!(ring.slot(index).seq_num, seq);
            assert!(ring.get(seq).is_some());
        }
        assert!(ring.slot(2).continuous);
        assert!(!ring.is_occupied(6));
    }

    #[test]
    fn test_expand_stops_at_max() {
        let mut ring = SequenceRing::new(4, 8);
        assert!(ring.expand());
        assert!(!ring.expand());
        assert_eq!(ring.capacity(), 8);
    }

    #[test]
    fn test_clear_interval_returns_packets_in_order() {
        let mut ring = SequenceRing::new(8, 8);
        for seq in [65534u16, 65535, 0, 1] {
            ring.store(packet(seq));
        }
        let packets = ring.clear_interval(65535, 1);
        let seqs: Vec<u16> = packets.iter().map(|p| p.seq_num).collect();
        assert_eq!(seqs, vec![65535, 0, 1]);
        assert_eq!(ring.used_slots(), 1);
        assert!(ring.get(65534).is_some());
    }

    #[test]
    #[should_panic]
    fn test_clear_interval_panics_on_mismatch() {
        let mut ring = SequenceRing::new(8, 8);
        ring.store(packet(1));
        ring.clear_interval(1, 2);
    }

    #[test]
    fn test_clear_frees_everything() {
        let mut ring = SequenceRing::new(8, 8);
        for seq in 0..8u16 {
            ring.store(packet(seq));
        }
        ring.clear();
        assert_eq!(ring.used_slots(), 0);
    }
}
