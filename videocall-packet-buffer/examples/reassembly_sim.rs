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

use std::sync::{mpsc, Arc};

use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use videocall_packet_buffer::{
    AssembledFrame, Clock, CodecHeader, FrameType, H264Header, NaluInfo, NaluType, Packet,
    PacketBuffer, PacketBufferConfig, PacketBufferStats, SimulatedClock, VideoCodecType,
};

// This example does the following:
// 1. Generates a stream of video frames and splits each into RTP-like packets.
// 2. Reorders, duplicates and drops a configurable share of the packets and
//    sprinkles in padding packets.
// 3. Feeds the result to a PacketBuffer driven by a simulated clock.
// 4. Acts as the decoder: every assembled frame is consumed and the buffer is
//    cleared up to it.

#[derive(Parser, Debug)]
#[clap(about = "Packet buffer reassembly simulation", version)]
struct Args {
    #[clap(long, default_value_t = 300, help = "Number of frames to generate")]
    frames: u32,

    #[clap(long, default_value_t = 6, help = "Maximum packets per frame")]
    max_packets_per_frame: u16,

    #[clap(long, default_value_t = 30, help = "Send a keyframe every N frames")]
    keyframe_interval: u32,

    #[clap(
        long,
        default_value_t = 8,
        help = "Packets are shuffled within windows of this many packets (0 disables)"
    )]
    reorder_window: usize,

    #[clap(long, default_value_t = 0.02, help = "Probability a packet is sent twice")]
    duplicate_rate: f64,

    #[clap(long, default_value_t = 0.0, help = "Probability a packet is lost")]
    loss_rate: f64,

    #[clap(
        long,
        default_value_t = 0.05,
        help = "Probability a padding packet follows a frame"
    )]
    padding_rate: f64,

    #[clap(long, help = "Packetize as H.264 instead of the generic format")]
    h264: bool,

    #[clap(long, help = "Require SPS and PPS for H.264 keyframes")]
    sps_pps_idr_is_h264_keyframe: bool,

    #[clap(long, default_value_t = 65000, help = "First RTP sequence number")]
    start_seq_num: u16,

    #[clap(long, default_value_t = 64, help = "Initial packet buffer size")]
    start_buffer_size: usize,

    #[clap(long, default_value_t = 512, help = "Maximum packet buffer size")]
    max_buffer_size: usize,

    #[clap(long, default_value_t = 7, help = "Seed for the random generator")]
    seed: u64,

    #[clap(long, help = "Print the final statistics as JSON")]
    json_stats: bool,
}

enum Arrival {
    Media(Packet),
    Padding(u16),
}

#[derive(Debug, Default, Serialize)]
struct SimulationReport {
    frames_sent: u32,
    packets_sent: usize,
    frames_received: u32,
    keyframes_received: u32,
    bytes_received: usize,
    keyframe_requests: u32,
    buffer: PacketBufferStats,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let arrivals = generate_stream(&args, &mut rng);
    let packets_sent = arrivals
        .iter()
        .filter(|arrival| matches!(arrival, Arrival::Media(_)))
        .count();
    let arrivals = impair(arrivals, &args, &mut rng);
    log::info!(
        "Generated {} frames in {} packets, {} arrivals after impairment",
        args.frames,
        packets_sent,
        arrivals.len()
    );

    let config = PacketBufferConfig::default()
        .with_buffer_sizes(args.start_buffer_size, args.max_buffer_size)
        .with_sps_pps_idr_is_h264_keyframe(args.sps_pps_idr_is_h264_keyframe);
    let clock = Arc::new(SimulatedClock::new(0));
    let (frame_tx, frame_rx) = mpsc::channel::<AssembledFrame>();
    let buffer = PacketBuffer::new(config, clock.clone(), move |frame: AssembledFrame| {
        let _ = frame_tx.send(frame);
    })?;

    let mut report = SimulationReport {
        frames_sent: args.frames,
        packets_sent,
        ..Default::default()
    };

    for arrival in arrivals {
        clock.advance_ms(1);
        match arrival {
            Arrival::Media(packet) => {
                let packet = packet.with_receive_time_ms(clock.now_ms());
                if !buffer.insert_packet(packet) {
                    log::warn!("Packet buffer overflow, requesting keyframe");
                    report.keyframe_requests += 1;
                }
            }
            Arrival::Padding(seq_num) => buffer.padding_received(seq_num),
        }

        while let Ok(frame) = frame_rx.try_recv() {
            log::debug!(
                "Frame {}..={} ts={} {:?} ({} bytes)",
                frame.first_seq_num,
                frame.last_seq_num,
                frame.timestamp,
                frame.frame_type(),
                frame.size()
            );
            report.frames_received += 1;
            report.bytes_received += frame.size();
            if frame.is_keyframe() {
                report.keyframes_received += 1;
            }
            buffer.clear_to(frame.last_seq_num);
        }
    }

    report.buffer = buffer.stats();
    if args.json_stats {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        log::info!(
            "Received {}/{} frames ({} keyframes, {} bytes), {} keyframe requests",
            report.frames_received,
            report.frames_sent,
            report.keyframes_received,
            report.bytes_received,
            report.keyframe_requests
        );
        log::info!("Buffer statistics: {:?}", report.buffer);
    }
    Ok(())
}

/// Packetizes `args.frames` frames in sending order.
fn generate_stream(args: &Args, rng: &mut StdRng) -> Vec<Arrival> {
    let mut arrivals = Vec::new();
    let mut seq_num = args.start_seq_num;
    let keyframe_interval = args.keyframe_interval.max(1);

    for frame_idx in 0..args.frames {
        let timestamp = frame_idx.wrapping_mul(3000);
        let is_keyframe = frame_idx % keyframe_interval == 0;
        let num_packets = rng.random_range(1..=args.max_packets_per_frame.max(1));

        for i in 0..num_packets {
            let first = i == 0;
            let last = i + 1 == num_packets;
            let payload_len: usize = rng.random_range(50..1200);
            let payload: Vec<u8> = (0..payload_len).map(|_| rng.random()).collect();
            let mut packet = Packet::new(seq_num, timestamp, payload)
                .with_frame_boundaries(first, last)
                .with_frame_type(if is_keyframe {
                    FrameType::KeyFrame
                } else {
                    FrameType::DeltaFrame
                });
            packet.marker_bit = last;

            if args.h264 {
                let nalus: &[NaluType] = match (is_keyframe, first) {
                    (true, true) => &[NaluType::Sps, NaluType::Pps, NaluType::Idr],
                    (true, false) => &[NaluType::Idr],
                    (false, _) => &[NaluType::Slice],
                };
                let header = H264Header {
                    nalus: nalus.iter().copied().map(NaluInfo::new).collect(),
                    ..Default::default()
                };
                packet = packet.with_codec(VideoCodecType::H264, CodecHeader::H264(header));
            }

            arrivals.push(Arrival::Media(packet));
            seq_num = seq_num.wrapping_add(1);
        }

        if rng.random_bool(args.padding_rate.clamp(0.0, 1.0)) {
            arrivals.push(Arrival::Padding(seq_num));
            seq_num = seq_num.wrapping_add(1);
        }
    }
    arrivals
}

/// Applies loss, duplication and local reordering.
fn impair(arrivals: Vec<Arrival>, args: &Args, rng: &mut StdRng) -> Vec<Arrival> {
    let loss_rate = args.loss_rate.clamp(0.0, 1.0);
    let duplicate_rate = args.duplicate_rate.clamp(0.0, 1.0);

    let mut impaired = Vec::with_capacity(arrivals.len());
    for arrival in arrivals {
        if rng.random_bool(loss_rate) {
            continue;
        }
        if let Arrival::Media(packet) = &arrival {
            if rng.random_bool(duplicate_rate) {
                impaired.push(Arrival::Media(packet.clone()));
            }
        }
        impaired.push(arrival);
    }

    if args.reorder_window > 1 {
        for window in impaired.chunks_mut(args.reorder_window) {
            window.shuffle(rng);
        }
    }
    impaired
}
