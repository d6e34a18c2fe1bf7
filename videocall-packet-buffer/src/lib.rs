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

//! An RTP video packet buffer that reorders packets and assembles complete
//! frames.
//!
//! Packets are inserted in arrival order, possibly duplicated or out of order.
//! Whenever a run of contiguous packets forms a whole frame the frame is handed
//! to an [`OnAssembledFrame`] callback. H.264 streams, which carry no reliable
//! frame-begin bit, are delimited by RTP timestamp instead.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use videocall_packet_buffer::{AssembledFrame, Packet, PacketBuffer, PacketBufferConfig};
//!
//! let frames = Arc::new(Mutex::new(Vec::new()));
//! let sink = frames.clone();
//! let buffer = PacketBuffer::with_system_clock(
//!     PacketBufferConfig::default(),
//!     move |frame: AssembledFrame| sink.lock().unwrap().push(frame),
//! )
//! .unwrap();
//!
//! buffer.insert_packet(Packet::new(2, 3000, vec![2]).with_frame_boundaries(false, true));
//! buffer.insert_packet(Packet::new(1, 3000, vec![1]).with_frame_boundaries(true, false));
//!
//! let frames = frames.lock().unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].data, vec![1, 2]);
//! ```

pub mod clock;
pub mod config;
mod emitted_history;
pub mod error;
pub mod frame;
mod frame_assembler;
mod missing_set;
pub mod packet;
pub mod packet_buffer;
pub mod seq_num;
mod sequence_ring;
pub mod statistics;
mod timestamp_history;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use config::PacketBufferConfig;
pub use error::{PacketBufferError, Result};
pub use frame::{AssembledFrame, FrameType};
pub use packet::{
    CodecHeader, H264Header, NaluInfo, NaluType, Packet, VideoCodecType, VideoHeader,
};
pub use packet_buffer::{OnAssembledFrame, PacketBuffer};
pub use statistics::{LifetimeStatistics, PacketBufferStats};
