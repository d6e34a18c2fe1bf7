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

use thiserror::Error;

/// Result type for packet buffer operations
pub type Result<T> = std::result::Result<T, PacketBufferError>;

/// Errors that can occur while setting up a packet buffer.
///
/// Runtime conditions (duplicates, overflow, malformed codec headers) are
/// absorbed by the buffer and never surface as errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PacketBufferError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Buffer size {0} is not a power of two")]
    NotPowerOfTwo(usize),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),
}

impl From<serde_json::Error> for PacketBufferError {
    fn from(err: serde_json::Error) -> Self {
        PacketBufferError::ConfigParse(err.to_string())
    }
}
