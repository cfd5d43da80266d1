//! Inbound frame decoding
//!
//! One frame is one text line of comma-separated readings, one per channel,
//! in wire order. A line either decodes completely or is rejected; partial
//! frames never leave this module.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Field separator used by the acquisition board
pub const FRAME_DELIMITER: char = ',';

/// One decoded arrival: timestamp plus a raw reading per channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Arrival time in seconds since session start
    pub timestamp: f64,
    /// Raw readings, index i is channel i
    pub values: Vec<f64>,
}

impl Frame {
    pub fn new(timestamp: f64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }

    pub fn channel_count(&self) -> usize {
        self.values.len()
    }
}

/// Reason a line was rejected by the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Line was empty after trimming
    Empty,
    /// Token count differs from the configured channel count
    ChannelCount { expected: usize, found: usize },
    /// Token did not parse as a number
    InvalidToken { index: usize, token: String },
    /// Token parsed but is NaN or infinite
    NonFinite { index: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty line"),
            DecodeError::ChannelCount { expected, found } => {
                write!(f, "expected {} channels, found {}", expected, found)
            }
            DecodeError::InvalidToken { index, token } => {
                write!(f, "channel {}: '{}' is not a number", index, token)
            }
            DecodeError::NonFinite { index } => {
                write!(f, "channel {}: value is not finite", index)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Fixed-width line decoder
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    channel_count: usize,
    delimiter: char,
}

impl FrameDecoder {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            delimiter: FRAME_DELIMITER,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Decode one line received at `timestamp`
    pub fn decode(&self, line: &str, timestamp: f64) -> Result<Frame, DecodeError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }

        let tokens: Vec<&str> = line.split(self.delimiter).collect();
        if tokens.len() != self.channel_count {
            return Err(DecodeError::ChannelCount {
                expected: self.channel_count,
                found: tokens.len(),
            });
        }

        let mut values = Vec::with_capacity(self.channel_count);
        for (index, token) in tokens.iter().enumerate() {
            let token = token.trim();
            let value: f64 = token.parse().map_err(|_| DecodeError::InvalidToken {
                index,
                token: token.to_string(),
            })?;
            if !value.is_finite() {
                return Err(DecodeError::NonFinite { index });
            }
            values.push(value);
        }

        Ok(Frame::new(timestamp, values))
    }
}
