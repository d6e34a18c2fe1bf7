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

//! Contains the frame produced once every packet of it has arrived.

use serde::{Deserialize, Serialize};

use crate::packet::{
    ColorSpace, GenericFrameDescriptor, PacketInfo, VideoCodecType, VideoContentType, VideoHeader,
    VideoRotation, VideoSendTiming,
};

/// The type of a video frame, indicating its dependency on other frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FrameType {
    /// A KeyFrame (or I-frame) can be decoded independently of any other frame.
    KeyFrame,
    /// A DeltaFrame (or P-frame) can only be decoded if the preceding frame has been decoded.
    #[default]
    DeltaFrame,
    /// The frame carries no media.
    EmptyFrame,
}

/// A complete encoded frame reassembled from one or more packets.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledFrame {
    pub first_seq_num: u16,
    pub last_seq_num: u16,
    /// Marker bit of the last packet.
    pub marker_bit: bool,
    /// Highest NACK count among the packets, `None` if no packet tracked it.
    pub times_nacked: Option<u32>,
    pub first_packet_received_time_ms: i64,
    pub last_packet_received_time_ms: i64,
    /// RTP timestamp shared by all packets of the frame.
    pub timestamp: u32,
    pub ntp_time_ms: i64,
    pub video_timing: VideoSendTiming,
    pub payload_type: u8,
    pub codec: VideoCodecType,
    pub rotation: VideoRotation,
    pub content_type: VideoContentType,
    /// Video header of the first packet. For H.264 its `frame_type` holds the
    /// key/delta decision made during assembly.
    pub video_header: VideoHeader,
    pub color_space: Option<ColorSpace>,
    pub generic_descriptor: Option<GenericFrameDescriptor>,
    /// Receive info of every packet, in sequence number order.
    pub packet_infos: Vec<PacketInfo>,
    pub data: Vec<u8>,
}

impl AssembledFrame {
    pub fn frame_type(&self) -> FrameType {
        self.video_header.frame_type
    }

    pub fn is_keyframe(&self) -> bool {
        self.frame_type() == FrameType::KeyFrame
    }

    pub fn num_packets(&self) -> usize {
        self.packet_infos.len()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
