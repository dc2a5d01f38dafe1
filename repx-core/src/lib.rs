pub mod profile;
pub mod protocol;
pub mod sequence;

pub use profile::RepProfile;
pub use protocol::{PACKET_LEN, ProtocolError, RawSample, decode};
pub use sequence::{SeqObservation, SeqTracker};

use serde::{Deserialize, Serialize};

/// Orientation of one sensor as sent on the wire, in centi-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attitude {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
}

/// One decoded sample relayed to subscribers.
///
/// Sensor 0 is the forearm, sensor 1 the upper arm. All angles are in
/// degrees. The derived `dP`/`dR`/`dY` fields hold the relative joint angle
/// (sensor 1 minus sensor 0) and are what most consumers care about.
///
/// Field order matches the JSON object sent to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    /// Packet counter, wraps at 65536.
    pub seq: u16,
    pub r0: f64,
    pub p0: f64,
    pub y0: f64,
    pub r1: f64,
    pub p1: f64,
    pub y1: f64,
    /// Relative pitch.
    #[serde(rename = "dP")]
    pub dp: f64,
    /// Relative roll.
    #[serde(rename = "dR")]
    pub dr: f64,
    /// Relative yaw.
    #[serde(rename = "dY")]
    pub dy: f64,
}

/// Centi-degrees per degree on the wire.
pub const CENTI_PER_DEGREE: f64 = 100.0;

impl Reading {
    /// Build a reading from the two raw attitudes, converting to degrees and
    /// deriving the relative angles.
    pub fn from_attitudes(seq: u16, s0: Attitude, s1: Attitude) -> Self {
        Self {
            seq,
            r0: to_degrees(s0.roll as i32),
            p0: to_degrees(s0.pitch as i32),
            y0: to_degrees(s0.yaw as i32),
            r1: to_degrees(s1.roll as i32),
            p1: to_degrees(s1.pitch as i32),
            y1: to_degrees(s1.yaw as i32),
            // widen before subtracting so i16 extremes don't overflow
            dp: to_degrees(s1.pitch as i32 - s0.pitch as i32),
            dr: to_degrees(s1.roll as i32 - s0.roll as i32),
            dy: to_degrees(s1.yaw as i32 - s0.yaw as i32),
        }
    }

    /// A reading with every angle at zero.
    pub fn rest(seq: u16) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }
}

fn to_degrees(centi: i32) -> f64 {
    centi as f64 / CENTI_PER_DEGREE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_angles_are_sensor1_minus_sensor0() {
        let s0 = Attitude {
            roll: 150,
            pitch: -2000,
            yaw: 9000,
        };
        let s1 = Attitude {
            roll: -50,
            pitch: 4500,
            yaw: 9000,
        };

        let reading = Reading::from_attitudes(7, s0, s1);

        assert_eq!(reading.seq, 7);
        assert!((reading.dp - 65.0).abs() < 1e-9);
        assert!((reading.dr - -2.0).abs() < 1e-9);
        assert!(reading.dy.abs() < 1e-9);
    }

    #[test]
    fn json_shape_uses_wire_field_names_in_order() {
        let reading = Reading::from_attitudes(
            3,
            Attitude::default(),
            Attitude {
                roll: 100,
                pitch: 250,
                yaw: -100,
            },
        );

        let json = serde_json::to_string(&reading).unwrap();
        let keys: Vec<&str> = json
            .trim_matches(|c| c == '{' || c == '}')
            .split(',')
            .map(|kv| kv.split(':').next().unwrap().trim_matches('"'))
            .collect();

        assert_eq!(
            keys,
            ["seq", "r0", "p0", "y0", "r1", "p1", "y1", "dP", "dR", "dY"]
        );

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["seq"], 3);
        assert_eq!(value["dP"].as_f64(), Some(2.5));
        assert_eq!(value["dY"].as_f64(), Some(-1.0));
    }
}
