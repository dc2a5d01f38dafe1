use super::{ATTITUDE_SIZE, PACKET_LEN, ParseResult, ProtocolError, SEQ_OFFSET};
use crate::{Attitude, Reading};

/// A notification payload split into its integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawSample {
    pub sensor0: Attitude,
    pub sensor1: Attitude,
    pub seq: u16,
}

impl RawSample {
    pub fn from_bytes(bytes: &[u8]) -> ParseResult<Self> {
        if bytes.len() < PACKET_LEN {
            return Err(ProtocolError::InsufficientData {
                needed: PACKET_LEN,
                available: bytes.len(),
            });
        }

        Ok(Self {
            sensor0: Attitude::from_le_bytes(&bytes[..ATTITUDE_SIZE]),
            sensor1: Attitude::from_le_bytes(&bytes[ATTITUDE_SIZE..SEQ_OFFSET]),
            seq: u16::from_le_bytes([bytes[SEQ_OFFSET], bytes[SEQ_OFFSET + 1]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let mut bytes = [0u8; PACKET_LEN];

        bytes[..ATTITUDE_SIZE].copy_from_slice(&self.sensor0.to_le_bytes());
        bytes[ATTITUDE_SIZE..SEQ_OFFSET].copy_from_slice(&self.sensor1.to_le_bytes());
        bytes[SEQ_OFFSET..].copy_from_slice(&self.seq.to_le_bytes());

        bytes
    }

    pub fn to_reading(&self) -> Reading {
        Reading::from_attitudes(self.seq, self.sensor0, self.sensor1)
    }
}

impl Attitude {
    // caller guarantees at least ATTITUDE_SIZE bytes
    fn from_le_bytes(bytes: &[u8]) -> Self {
        Self {
            roll: i16::from_le_bytes([bytes[0], bytes[1]]),
            pitch: i16::from_le_bytes([bytes[2], bytes[3]]),
            yaw: i16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }

    fn to_le_bytes(self) -> [u8; ATTITUDE_SIZE] {
        let mut bytes = [0u8; ATTITUDE_SIZE];

        bytes[0..2].copy_from_slice(&self.roll.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.pitch.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.yaw.to_le_bytes());

        bytes
    }
}
