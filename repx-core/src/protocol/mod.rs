//! Notification packet layout.
//!
//! ```text
//!  0      2      4      6      8      10     12     14
//!  +------+------+------+------+------+------+------+- - - - -
//!  |  r0  |  p0  |  y0  |  r1  |  p1  |  y1  | seq  | trailer (ignored)
//!  +------+------+------+------+------+------+------+- - - - -
//!   i16 LE centi-degrees                      u16 LE
//! ```

mod error;
mod packet;

pub use error::{ParseResult, ProtocolError};
pub use packet::RawSample;

use crate::Reading;

/// Minimum length of a notification carrying a full sample.
pub const PACKET_LEN: usize = 14;
pub const ATTITUDE_SIZE: usize = 6;
pub const SEQ_OFFSET: usize = 2 * ATTITUDE_SIZE;

/// Decode a notification payload.
///
/// Buffers shorter than [`PACKET_LEN`] yield `None`. Partial notifications
/// are expected on the wire and are not an error.
pub fn decode(bytes: &[u8]) -> Option<Reading> {
    RawSample::from_bytes(bytes)
        .ok()
        .map(|sample| sample.to_reading())
}
