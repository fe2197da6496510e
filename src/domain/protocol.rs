//! HeartRate-Sense Protocol
//!
//! GATT identifiers of the heart-rate peripheral and the decoder for the
//! samples it streams.

use anyhow::Result;
use thiserror::Error;
use uuid::Uuid;

/// Data service exposed by the peripheral
pub const SERVICE_UUID: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";

/// Heart-rate characteristic, notify only
pub const HEART_RATE_CHAR_UUID: &str = "0000000a-0000-1000-8000-00805f9b34fb";

pub const HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);
pub const HEART_RATE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000000a_0000_1000_8000_00805f9b34fb);

/// Bytes consumed from each notification
pub const SAMPLE_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("sample truncated: got {len} bytes, need 4")]
    Truncated { len: usize },
    #[error("sample is not a number")]
    NotANumber,
}

/// Decode one heart-rate notification into beats per minute
///
/// # Sample Structure
///
/// ```text
/// [0-3]   : BPM (f32 little-endian)
/// [4..]   : ignored
/// ```
///
/// The float is rounded half away from zero. Values outside the `i32` range,
/// infinities included, saturate.
pub fn decode_sample(bytes: &[u8]) -> Result<i32, DecodeError> {
    let Some(&[b0, b1, b2, b3]) = bytes.get(..SAMPLE_LEN) else {
        return Err(DecodeError::Truncated { len: bytes.len() });
    };

    let bpm = f32::from_le_bytes([b0, b1, b2, b3]);
    if bpm.is_nan() {
        return Err(DecodeError::NotANumber);
    }

    Ok(bpm.round() as i32)
}

/// Parse a UUID string from settings
pub fn parse_uuid(uuid_str: &str) -> Result<Uuid> {
    Uuid::parse_str(uuid_str)
        .map_err(|e| anyhow::anyhow!("Invalid UUID format {:?}: {}", uuid_str, e))
}
