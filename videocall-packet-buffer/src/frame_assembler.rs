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

//! Detects complete frames in the ring and materialises them.
//!
//! Starting from a freshly inserted sequence number the assembler walks
//! forward as long as continuity can be proven. Whenever it reaches a packet
//! flagged as the last one of a frame it walks backward to the first packet,
//! drains the packets out of the ring and concatenates their payloads.
//!
//! H.264 packets carry no reliable begin-of-frame bit, so for that codec the
//! backward walk instead stops at the first packet with a different RTP
//! timestamp, and the NAL units seen along the way decide whether the frame is
//! a keyframe.

use crate::frame::{AssembledFrame, FrameType};
use crate::missing_set::MissingSet;
use crate::packet::{
    CodecHeader, NaluType, Packet, PacketInfo, VideoCodecType, MAX_NALUS_PER_PACKET,
};
use crate::sequence_ring::SequenceRing;

#[derive(Debug, Clone, Copy, PartialEq)]
enum WalkError {
    /// A slot inside a continuous run no longer holds its packet.
    MissingPacket,
    /// An H.264 frame contains a packet without a usable H.264 header.
    MalformedH264,
}

/// Running totals collected during the backward walk.
struct FrameSummary {
    frame_size: usize,
    max_nack_count: Option<u32>,
    min_recv_time_ms: i64,
    max_recv_time_ms: i64,
    packet_infos: Vec<PacketInfo>,
}

impl FrameSummary {
    fn new(receive_time_ms: i64) -> Self {
        Self {
            frame_size: 0,
            max_nack_count: None,
            min_recv_time_ms: receive_time_ms,
            max_recv_time_ms: receive_time_ms,
            packet_infos: Vec::new(),
        }
    }

    fn add(&mut self, packet: &Packet) {
        let receive_time_ms = packet.packet_info.receive_time_ms;
        self.frame_size += packet.payload.len();
        self.max_nack_count = self.max_nack_count.max(packet.times_nacked);
        self.min_recv_time_ms = self.min_recv_time_ms.min(receive_time_ms);
        self.max_recv_time_ms = self.max_recv_time_ms.max(receive_time_ms);
        // Walking backwards; the order is fixed up once the walk is done.
        self.packet_infos.push(packet.packet_info.clone());
    }
}

#[derive(Debug, Default)]
struct H264KeyframeDetector {
    has_sps: bool,
    has_pps: bool,
    has_idr: bool,
    is_keyframe: bool,
}

impl H264KeyframeDetector {
    fn observe(&mut self, packet: &Packet, sps_pps_idr_required: bool) -> Result<(), WalkError> {
        let header = match &packet.video_header.codec_header {
            CodecHeader::H264(header) => header,
            CodecHeader::None | CodecHeader::Vp8(_) | CodecHeader::Vp9(_) => {
                return Err(WalkError::MalformedH264)
            }
        };
        if header.nalus.len() >= MAX_NALUS_PER_PACKET {
            return Err(WalkError::MalformedH264);
        }

        for nalu in &header.nalus {
            match nalu.nalu_type {
                NaluType::Sps => self.has_sps = true,
                NaluType::Pps => self.has_pps = true,
                NaluType::Idr => self.has_idr = true,
                _ => {}
            }
        }

        self.is_keyframe = if sps_pps_idr_required {
            self.has_idr && self.has_sps && self.has_pps
        } else {
            self.has_idr
        };
        Ok(())
    }
}

/// Returns `true` if the packet at `seq_num` could be part of a frame whose
/// start has been proven reachable.
pub(crate) fn potential_new_frame(ring: &SequenceRing, seq_num: u16) -> bool {
    let index = ring.index(seq_num);
    let slot = ring.slot(index);
    if !slot.holds(seq_num) || slot.frame_created {
        return false;
    }
    if slot.frame_begin {
        return true;
    }

    let prev = ring.slot(ring.prev_index(index));
    prev.holds(seq_num.wrapping_sub(1))
        && !prev.frame_created
        && prev.timestamp() == slot.timestamp()
        && prev.continuous
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameAssembler {
    sps_pps_idr_is_h264_keyframe: bool,
}

impl FrameAssembler {
    pub fn new(sps_pps_idr_is_h264_keyframe: bool) -> Self {
        Self {
            sps_pps_idr_is_h264_keyframe,
        }
    }

    /// Scans forward from `seq_num` and returns every frame that can be
    /// completed, in ascending sequence order. Packets of returned frames are
    /// removed from the ring.
    pub fn find_frames(
        &self,
        ring: &mut SequenceRing,
        missing: &mut MissingSet,
        mut seq_num: u16,
    ) -> Vec<AssembledFrame> {
        let mut found_frames = Vec::new();
        let mut iterations = 0;
        while iterations < ring.capacity() && potential_new_frame(ring, seq_num) {
            iterations += 1;
            let index = ring.index(seq_num);
            ring.slot_mut(index).continuous = true;

            if ring.slot(index).frame_end {
                match self.assemble_frame(ring, missing, seq_num) {
                    Some(frame) => found_frames.push(frame),
                    None => return found_frames,
                }
            }
            seq_num = seq_num.wrapping_add(1);
        }
        found_frames
    }

    /// Walks backward from the last packet of a frame. Returns `None` if the
    /// frame cannot be emitted now; its slots are left in the ring unclaimed.
    fn assemble_frame(
        &self,
        ring: &mut SequenceRing,
        missing: &mut MissingSet,
        end_seq_num: u16,
    ) -> Option<AssembledFrame> {
        let capacity = ring.capacity();
        let end_index = ring.index(end_seq_num);
        let (frame_timestamp, is_h264, end_recv_time_ms) = {
            let end_packet = ring.slot(end_index).packet.as_ref()?;
            (
                end_packet.timestamp,
                end_packet.codec == VideoCodecType::H264,
                end_packet.packet_info.receive_time_ms,
            )
        };

        let mut summary = FrameSummary::new(end_recv_time_ms);
        let mut h264 = H264KeyframeDetector::default();
        let mut start_seq_num = end_seq_num;
        let mut start_index = end_index;
        let mut tested_packets = 0;

        loop {
            tested_packets += 1;

            let visit = {
                let slot = ring.slot_mut(start_index);
                slot.frame_created = true;
                let frame_begin = slot.frame_begin;
                match &slot.packet {
                    Some(packet) if slot.seq_num == start_seq_num => {
                        summary.add(packet);
                        if is_h264 && !h264.is_keyframe {
                            h264.observe(packet, self.sps_pps_idr_is_h264_keyframe)
                                .map(|()| frame_begin)
                        } else {
                            Ok(frame_begin)
                        }
                    }
                    _ => Err(WalkError::MissingPacket),
                }
            };

            let frame_begin = match visit {
                Ok(frame_begin) => frame_begin,
                Err(err) => {
                    log::debug!(
                        "Abandoning frame ending at {end_seq_num}: {err:?} at {start_seq_num}"
                    );
                    release_claims(ring, start_index, end_index);
                    return None;
                }
            };

            if !is_h264 && frame_begin {
                break;
            }
            if tested_packets == capacity {
                break;
            }

            let prev_index = ring.prev_index(start_index);
            let prev_seq_num = start_seq_num.wrapping_sub(1);
            if is_h264 {
                let prev = ring.slot(prev_index);
                if !prev.holds(prev_seq_num) || prev.timestamp() != Some(frame_timestamp) {
                    break;
                }
            }

            start_index = prev_index;
            start_seq_num = prev_seq_num;
        }

        summary.packet_infos.reverse();

        if is_h264 {
            if h264.has_idr && (!h264.has_sps || !h264.has_pps) {
                log::warn!(
                    "Received H.264-IDR frame (SPS: {}, PPS: {}). Treating as {} frame since sps_pps_idr_is_h264_keyframe is {}.",
                    h264.has_sps,
                    h264.has_pps,
                    if self.sps_pps_idr_is_h264_keyframe { "delta" } else { "key" },
                    if self.sps_pps_idr_is_h264_keyframe { "enabled" } else { "disabled" },
                );
            }

            let frame_type = if h264.is_keyframe {
                FrameType::KeyFrame
            } else {
                FrameType::DeltaFrame
            };
            let temporal_id = ring
                .slot_mut(start_index)
                .packet
                .as_mut()
                .and_then(|first_packet| {
                    first_packet.video_header.frame_type = frame_type;
                    first_packet.video_header.frame_marking.temporal_id
                });

            // Without temporal layers every delta frame depends on all
            // packets before it.
            if temporal_id.is_none()
                && !h264.is_keyframe
                && missing.has_missing_at_or_before(start_seq_num)
            {
                log::debug!(
                    "Holding back H.264 delta frame {start_seq_num}..={end_seq_num}: missing packets before it"
                );
                release_claims(ring, start_index, end_index);
                return None;
            }
        }

        missing.erase_up_to(end_seq_num);
        let packets = ring.clear_interval(start_seq_num, end_seq_num);
        let frame = build_frame(packets, summary)?;
        log::trace!(
            "Assembled frame {}..={} ({} bytes, {} packets)",
            frame.first_seq_num,
            frame.last_seq_num,
            frame.size(),
            frame.num_packets()
        );
        Some(frame)
    }
}

/// Clears the `frame_created` claim on every slot from `from` to `to`
/// (inclusive, walking forward).
fn release_claims(ring: &mut SequenceRing, from: usize, to: usize) {
    let mut index = from;
    loop {
        ring.slot_mut(index).frame_created = false;
        if index == to {
            break;
        }
        index = ring.next_index(index);
    }
}

/// Concatenates the payloads of `packets` (in sequence order) into a frame.
///
/// # Panics
///
/// If the payloads add up to more than the size accounted for during the walk.
fn build_frame(packets: Vec<Packet>, summary: FrameSummary) -> Option<AssembledFrame> {
    let mut data = Vec::with_capacity(summary.frame_size);
    for packet in &packets {
        assert!(
            data.len() + packet.payload.len() <= summary.frame_size,
            "frame payload exceeds accounted size of {} bytes",
            summary.frame_size
        );
        data.extend_from_slice(&packet.payload);
    }

    let mut packets = packets.into_iter();
    let first = packets.next()?;
    let last = packets.last();
    let last_ref = last.as_ref().unwrap_or(&first);
    let last_seq_num = last_ref.seq_num;
    let marker_bit = last_ref.marker_bit;
    let video_timing = last_ref.video_header.video_timing;
    let rotation = last_ref.video_header.rotation;
    let content_type = last_ref.video_header.content_type;
    let color_space = last_ref.video_header.color_space;

    Some(AssembledFrame {
        first_seq_num: first.seq_num,
        last_seq_num,
        marker_bit,
        times_nacked: summary.max_nack_count,
        first_packet_received_time_ms: summary.min_recv_time_ms,
        last_packet_received_time_ms: summary.max_recv_time_ms,
        timestamp: first.timestamp,
        ntp_time_ms: first.ntp_time_ms,
        video_timing,
        payload_type: first.payload_type,
        codec: first.codec,
        rotation,
        content_type,
        video_header: first.video_header,
        color_space,
        generic_descriptor: first.generic_descriptor,
        packet_infos: summary.packet_infos,
        data,
    })
}
