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

//! Depacketized RTP video packets as handed to the packet buffer.

use serde::{Deserialize, Serialize};

use crate::frame::FrameType;

/// Upper bound on NAL units a single H.264 packet may describe. Headers listing
/// this many or more are treated as malformed.
pub const MAX_NALUS_PER_PACKET: usize = 10;

/// Codec the packet payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VideoCodecType {
    #[default]
    Generic,
    Vp8,
    Vp9,
    Av1,
    H264,
}

/// H.264 NAL unit types relevant to keyframe detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NaluType {
    Slice,
    Idr,
    Sei,
    Sps,
    Pps,
    Aud,
    EndOfSequence,
    EndOfStream,
    Filler,
    StapA,
    FuA,
    Other(u8),
}

impl NaluType {
    /// Decodes the type from the first byte of a NAL unit header.
    pub fn from_header_byte(byte: u8) -> Self {
        match byte & 0x1f {
            1 => NaluType::Slice,
            5 => NaluType::Idr,
            6 => NaluType::Sei,
            7 => NaluType::Sps,
            8 => NaluType::Pps,
            9 => NaluType::Aud,
            10 => NaluType::EndOfSequence,
            11 => NaluType::EndOfStream,
            12 => NaluType::Filler,
            24 => NaluType::StapA,
            28 => NaluType::FuA,
            other => NaluType::Other(other),
        }
    }
}

/// One NAL unit described by an H.264 packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaluInfo {
    pub nalu_type: NaluType,
    /// `None` when the NAL unit does not reference an SPS.
    pub sps_id: Option<u8>,
    /// `None` when the NAL unit does not reference a PPS.
    pub pps_id: Option<u8>,
}

impl NaluInfo {
    pub fn new(nalu_type: NaluType) -> Self {
        Self {
            nalu_type,
            sps_id: None,
            pps_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum H264PacketizationType {
    #[default]
    SingleNalu,
    StapA,
    FuA,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct H264Header {
    pub nalus: Vec<NaluInfo>,
    pub packetization_type: H264PacketizationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Vp8Header {
    pub picture_id: Option<u16>,
    pub tl0_pic_idx: Option<u8>,
    pub temporal_idx: Option<u8>,
    pub non_reference: bool,
    pub beginning_of_partition: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Vp9Header {
    pub picture_id: Option<u16>,
    pub inter_picture_predicted: bool,
    pub flexible_mode: bool,
    pub spatial_idx: Option<u8>,
    pub temporal_idx: Option<u8>,
}

/// Codec specific part of the video header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CodecHeader {
    #[default]
    None,
    Vp8(Vp8Header),
    Vp9(Vp9Header),
    H264(H264Header),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VideoRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VideoContentType {
    #[default]
    Unspecified,
    Screenshare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColorSpace {
    pub primaries: u8,
    pub transfer: u8,
    pub matrix: u8,
    pub full_range: bool,
}

/// Frame marking extension; only the temporal layer id is used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FrameMarking {
    pub temporal_id: Option<u8>,
}

/// Send-side timing deltas reported by the video-timing header extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VideoSendTiming {
    pub encode_start_delta_ms: u16,
    pub encode_finish_delta_ms: u16,
    pub packetization_finish_delta_ms: u16,
    pub pacer_exit_delta_ms: u16,
    pub network_timestamp_delta_ms: u16,
    pub network2_timestamp_delta_ms: u16,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VideoHeader {
    pub frame_type: FrameType,
    pub width: u16,
    pub height: u16,
    pub rotation: VideoRotation,
    pub content_type: VideoContentType,
    pub video_timing: VideoSendTiming,
    pub color_space: Option<ColorSpace>,
    pub frame_marking: FrameMarking,
    pub codec_header: CodecHeader,
}

/// Generic frame descriptor header extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenericFrameDescriptor {
    pub first_packet_in_sub_frame: bool,
    pub last_packet_in_sub_frame: bool,
    pub frame_id: u16,
    pub spatial_layers_bitmask: u8,
    pub temporal_layer: u8,
    pub frame_dependency_diffs: Vec<u16>,
    pub width: u16,
    pub height: u16,
}

/// Receive-side information kept for every packet of an assembled frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PacketInfo {
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    pub rtp_timestamp: u32,
    pub receive_time_ms: i64,
}

/// A depacketized video packet.
///
/// The payload is moved into the buffer on insertion; the buffer owns it until
/// the packet is emitted as part of a frame or discarded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    /// RTP sequence number
    pub seq_num: u16,
    /// RTP timestamp, shared by every packet of a frame
    pub timestamp: u32,
    /// Estimated capture time in NTP milliseconds, -1 if unknown
    pub ntp_time_ms: i64,
    pub payload_type: u8,
    pub marker_bit: bool,
    pub codec: VideoCodecType,
    pub is_first_packet_in_frame: bool,
    pub is_last_packet_in_frame: bool,
    /// Number of times this packet was NACKed, `None` if not tracked.
    pub times_nacked: Option<u32>,
    pub video_header: VideoHeader,
    pub generic_descriptor: Option<GenericFrameDescriptor>,
    pub packet_info: PacketInfo,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a packet with default metadata.
    pub fn new(seq_num: u16, timestamp: u32, payload: Vec<u8>) -> Self {
        Self {
            seq_num,
            timestamp,
            ntp_time_ms: -1,
            packet_info: PacketInfo {
                rtp_timestamp: timestamp,
                ..Default::default()
            },
            payload,
            ..Default::default()
        }
    }

    /// Marks the packet as the first and/or last packet of its frame.
    pub fn with_frame_boundaries(mut self, first: bool, last: bool) -> Self {
        self.is_first_packet_in_frame = first;
        self.is_last_packet_in_frame = last;
        self
    }

    pub fn with_codec(mut self, codec: VideoCodecType, codec_header: CodecHeader) -> Self {
        self.codec = codec;
        self.video_header.codec_header = codec_header;
        self
    }

    pub fn with_frame_type(mut self, frame_type: FrameType) -> Self {
        self.video_header.frame_type = frame_type;
        self
    }

    pub fn with_receive_time_ms(mut self, receive_time_ms: i64) -> Self {
        self.packet_info.receive_time_ms = receive_time_ms;
        self
    }

    pub fn with_times_nacked(mut self, times_nacked: u32) -> Self {
        self.times_nacked = Some(times_nacked);
        self
    }

    /// Get the size of the payload in bytes
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_keyframe_packet(&self) -> bool {
        self.video_header.frame_type == FrameType::KeyFrame
    }
}
