//! Errors, time and address helpers, and the decoded Mode S message set.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeaskyError {
    #[error("invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unrecognized downlink format: {0}")]
    UnknownDf(u8),
    #[error("unsupported message format: {0}")]
    UnsupportedFormat(String),
    #[error("CRC validation failed")]
    CrcFailed,
    #[error("address {0} not seen in a validated frame")]
    UnknownAddress(String),
    #[error("NMEA checksum mismatch: {0}")]
    Checksum(String),
    #[error("malformed NMEA sentence: {0}")]
    Sentence(String),
    #[error("AIS decode failed: {0}")]
    Ais(String),
    #[error("track store error: {0}")]
    Store(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SeaskyError>;

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or(0)
}

/// 24-bit aircraft address, kept as bytes so frames never allocate for it.
pub type Icao = [u8; 3];

/// Lowercase hex form of an address; also the aircraft track id.
pub fn icao_to_string(icao: &Icao) -> String {
    icao.iter().map(|b| format!("{b:02x}")).collect()
}

/// Bytes from a hex string, either case, surrounding whitespace ignored.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let digits = hex.trim().as_bytes();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            if !pair.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            u8::from_str_radix(std::str::from_utf8(pair).ok()?, 16).ok()
        })
        .collect()
}

/// Six-bit ADS-B callsign alphabet.
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ##### ###############0123456789######";

// ---------------------------------------------------------------------------
// Decoded Mode S message types
// ---------------------------------------------------------------------------

/// Callsign and emitter category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationMsg {
    pub icao: Icao,
    pub callsign: String,
    /// Emitter category such as "A3", `None` when not reported.
    pub category: Option<String>,
    pub timestamp: Millis,
}

/// One CPR-encoded position, airborne or surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionMsg {
    pub icao: Icao,
    pub altitude_ft: Option<i32>,
    pub cpr_lat: u32,
    pub cpr_lon: u32,
    pub cpr_odd: bool,
    pub is_surface: bool,
    /// Surface movement, knots.
    pub ground_speed_kts: Option<f64>,
    /// Surface ground track, degrees.
    pub ground_track_deg: Option<f64>,
    pub timestamp: Millis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityMsg {
    pub icao: Icao,
    pub speed_kts: Option<f64>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub speed_type: SpeedType,
    pub timestamp: Millis,
}

/// What `speed_kts` measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeedType {
    Ground,
    IAS,
    TAS,
}

/// Altitude from a surveillance or ACAS reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AltitudeMsg {
    pub icao: Icao,
    pub altitude_ft: Option<i32>,
    /// From the flight status / vertical status field, when it is definite.
    pub on_ground: Option<bool>,
    pub timestamp: Millis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SquawkMsg {
    pub icao: Icao,
    pub squawk: String,
    pub timestamp: Millis,
}

/// A structurally valid message that carries nothing the track table uses
/// (all-call replies, ES status, TCAS, target state, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtherMsg {
    pub icao: Icao,
    pub kind: &'static str,
    pub timestamp: Millis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DecodedMsg {
    Identification(IdentificationMsg),
    Position(PositionMsg),
    Velocity(VelocityMsg),
    Altitude(AltitudeMsg),
    Squawk(SquawkMsg),
    Other(OtherMsg),
}

impl DecodedMsg {
    /// Sender address and receive time.
    pub fn origin(&self) -> (Icao, Millis) {
        match self {
            DecodedMsg::Identification(m) => (m.icao, m.timestamp),
            DecodedMsg::Position(m) => (m.icao, m.timestamp),
            DecodedMsg::Velocity(m) => (m.icao, m.timestamp),
            DecodedMsg::Altitude(m) => (m.icao, m.timestamp),
            DecodedMsg::Squawk(m) => (m.icao, m.timestamp),
            DecodedMsg::Other(m) => (m.icao, m.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icao_to_string_pads() {
        assert_eq!(icao_to_string(&[0x48, 0x40, 0xD6]), "4840d6");
        assert_eq!(icao_to_string(&[0x00, 0x0A, 0x01]), "000a01");
    }

    #[test]
    fn test_hex_decode() {
        assert_eq!(hex_decode(" 4840d6\n"), Some(vec![0x48, 0x40, 0xD6]));
        assert_eq!(hex_decode(""), Some(vec![]));
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_decode("ZZ"), None);
        assert_eq!(hex_decode("+1"), None);
    }

    #[test]
    fn test_origin() {
        let msg = DecodedMsg::Squawk(SquawkMsg {
            icao: [1, 2, 3],
            squawk: "7000".into(),
            timestamp: 42,
        });
        assert_eq!(msg.origin(), ([1, 2, 3], 42));
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01
        assert!(now_millis() > 1_577_836_800_000);
    }
}
