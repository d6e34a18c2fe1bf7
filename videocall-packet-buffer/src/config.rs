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

use crate::{PacketBufferError, Result};

/// Largest useful ring: one slot per 16-bit sequence number.
pub const MAX_SUPPORTED_BUFFER_SIZE: usize = 1 << 16;

/// Packet buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketBufferConfig {
    /// Initial number of packet slots (power of two)
    pub start_buffer_size: usize,
    /// Number of slots the buffer may grow to (power of two)
    pub max_buffer_size: usize,
    /// Require SPS and PPS next to the IDR before an H.264 frame counts as a
    /// keyframe. When disabled an IDR alone is enough.
    pub sps_pps_idr_is_h264_keyframe: bool,
}

impl Default for PacketBufferConfig {
    fn default() -> Self {
        Self {
            start_buffer_size: 512,
            max_buffer_size: 2048,
            sps_pps_idr_is_h264_keyframe: false,
        }
    }
}

impl PacketBufferConfig {
    pub fn with_buffer_sizes(mut self, start_buffer_size: usize, max_buffer_size: usize) -> Self {
        self.start_buffer_size = start_buffer_size;
        self.max_buffer_size = max_buffer_size;
        self
    }

    pub fn with_sps_pps_idr_is_h264_keyframe(mut self, enabled: bool) -> Self {
        self.sps_pps_idr_is_h264_keyframe = enabled;
        self
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PacketBufferConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for size in [self.start_buffer_size, self.max_buffer_size] {
            if !size.is_power_of_two() {
                return Err(PacketBufferError::NotPowerOfTwo(size));
            }
        }
        if self.start_buffer_size > self.max_buffer_size {
            return Err(PacketBufferError::InvalidConfig(format!(
                "start_buffer_size ({}) exceeds max_buffer_size ({})",
                self.start_buffer_size, self.max_buffer_size
            )));
        }
        if self.max_buffer_size > MAX_SUPPORTED_BUFFER_SIZE {
            return Err(PacketBufferError::InvalidConfig(format!(
                "max_buffer_size ({}) exceeds {MAX_SUPPORTED_BUFFER_SIZE}",
                self.max_buffer_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PacketBufferConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let config = PacketBufferConfig::default().with_buffer_sizes(100, 2048);
        assert_eq!(config.validate(), Err(PacketBufferError::NotPowerOfTwo(100)));

        let config = PacketBufferConfig::default().with_buffer_sizes(0, 2048);
        assert_eq!(config.validate(), Err(PacketBufferError::NotPowerOfTwo(0)));
    }

    #[test]
    fn test_rejects_start_above_max() {
        let config = PacketBufferConfig::default().with_buffer_sizes(1024, 512);
        assert!(matches!(
            config.validate(),
            Err(PacketBufferError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_max() {
        let config = PacketBufferConfig::default().with_buffer_sizes(512, 1 << 17);
        assert!(matches!(
            config.validate(),
            Err(PacketBufferError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config =
            PacketBufferConfig::from_json_str(r#"{"sps_pps_idr_is_h264_keyframe": true}"#)
                .unwrap();
        assert!(config.sps_pps_idr_is_h264_keyframe);
        assert_eq!(config.start_buffer_size, 512);
        assert_eq!(config.max_buffer_size, 2048);
    }

    #[test]
    fn test_from_json_reports_errors() {
        assert!(matches!(
            PacketBufferConfig::from_json_str("{not json"),
            Err(PacketBufferError::ConfigParse(_))
        ));
        assert!(matches!(
            PacketBufferConfig::from_json_str(r#"{"start_buffer_size": 3}"#),
            Err(PacketBufferError::NotPowerOfTwo(3))
        ));
    }
}
