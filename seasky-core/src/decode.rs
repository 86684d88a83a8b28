//! Mode S frames to typed aircraft messages.
//!
//! Extended squitters (DF17, and DF18 with CF=0) are routed by type code:
//! identification (TC 1-4), surface position (5-8), airborne position
//! (9-18 and 20-22) and airborne velocity (19). Surveillance and ACAS
//! replies yield altitude (DF0/4/16/20) or squawk (DF5/21). DF11 and the
//! status type codes are recognised but carried as [`DecodedMsg::Other`].

use crate::frame::ModeFrame;
use crate::types::*;

// Bit positions inside a 13-bit AC/ID field, most significant first:
// C1 A1 C2 A2 C4 A4 M B1 Q/D1 B2 D2 B4 D4
const C: [u32; 3] = [12, 10, 8];
const A: [u32; 3] = [11, 9, 7];
const B: [u32; 3] = [5, 3, 1];
const D: [u32; 3] = [4, 2, 0];
const M_BIT: u32 = 6;
const Q_BIT: u32 = 4;

fn bit(code: u32, pos: u32) -> u32 {
    (code >> pos) & 1
}

/// Octal digit from its 1, 2 and 4 weighted bits (given 1 first).
fn octal(code: u32, [one, two, four]: [u32; 3]) -> u32 {
    bit(code, one) | (bit(code, two) << 1) | (bit(code, four) << 2)
}

/// Gray code to binary, bits given most significant first.
fn ungray(code: u32, positions: &[u32]) -> u32 {
    let gray = positions.iter().fold(0, |acc, &p| (acc << 1) | bit(code, p));
    let mut bin = gray;
    let mut shift = gray >> 1;
    while shift != 0 {
        bin ^= shift;
        shift >>= 1;
    }
    bin
}

/// 100-ft Gillham altitude from a 13-bit AC field with M=0 and Q=0.
fn gillham(code: u32) -> Option<i32> {
    let hundreds = match ungray(code, &C) {
        h @ 1..=4 => h,
        7 => 5,
        _ => return None,
    };
    let five_hundreds = ungray(code, &[D[1], D[2], A[0], A[1], A[2], B[0], B[1], B[2]]);
    let hundreds = if five_hundreds & 1 == 1 {
        6 - hundreds
    } else {
        hundreds
    };
    Some((five_hundreds as i32 * 5 + hundreds as i32 - 13) * 100)
}

/// Altitude in feet from a 13-bit AC field (DF0/4/16/20).
///
/// Metric altitudes (M=1) are not decoded.
pub fn decode_ac13(code: u32) -> Option<i32> {
    if code == 0 || bit(code, M_BIT) == 1 {
        return None;
    }
    if bit(code, Q_BIT) == 0 {
        return gillham(code);
    }
    let n = ((code >> 7) << 5) | (((code >> 5) & 1) << 4) | (code & 0x0F);
    Some(n as i32 * 25 - 1000)
}

/// Altitude in feet from the 12-bit field of an airborne position.
///
/// The 12-bit field is the 13-bit one without its M bit.
pub fn decode_ac12(code: u32) -> Option<i32> {
    decode_ac13(((code & 0xFC0) << 1) | (code & 0x3F))
}

/// Four-digit octal squawk from a 13-bit ID field.
pub fn decode_squawk(code: u32) -> String {
    format!(
        "{}{}{}{}",
        octal(code, A),
        octal(code, B),
        octal(code, C),
        octal(code, D)
    )
}

/// Knots from the 7-bit surface movement field.
///
/// Quantisation coarsens with speed. 0 and 125-127 carry no speed.
pub fn decode_movement(mov: u32) -> Option<f64> {
    let (base, first, step) = match mov {
        1 => return Some(0.0),
        2..=8 => (0.125, 2, 0.125),
        9..=12 => (1.0, 9, 0.25),
        13..=38 => (2.0, 13, 0.5),
        39..=93 => (15.0, 39, 1.0),
        94..=108 => (70.0, 94, 2.0),
        109..=123 => (100.0, 109, 5.0),
        124 => return Some(175.0),
        _ => return None,
    };
    Some(base + f64::from(mov - first) * step)
}

/// The 56-bit ME field of an extended squitter.
#[derive(Clone, Copy)]
struct Me(u64);

impl Me {
    fn of(frame: &ModeFrame) -> Option<Me> {
        let bytes: [u8; 7] = frame.me().try_into().ok()?;
        let bits = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        Some(Me(bits))
    }

    /// `len` bits starting at ME bit `start` (1-based, as numbered in DO-260).
    fn field(self, start: u32, len: u32) -> u32 {
        let shift = 56 - (start + len - 1);
        ((self.0 >> shift) & ((1u64 << len) - 1)) as u32
    }

    fn flag(self, pos: u32) -> bool {
        self.field(pos, 1) == 1
    }

    /// Signed velocity component: a direction flag followed by a 10-bit
    /// magnitude offset by one. `None` when the magnitude is unavailable.
    fn component(self, dir: u32) -> Option<f64> {
        let raw = self.field(dir + 1, 10);
        let value = f64::from(raw.checked_sub(1)?);
        Some(if self.flag(dir) { -value } else { value })
    }

    fn vertical_rate(self) -> Option<i32> {
        let magnitude = self.field(38, 9).checked_sub(1)? as i32 * 64;
        Some(if self.flag(37) { -magnitude } else { magnitude })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Extended squitter decoders
// ---------------------------------------------------------------------------

/// TC 1-4: callsign and emitter category.
pub fn decode_identification(frame: &ModeFrame) -> Option<IdentificationMsg> {
    let tc = frame.type_code().filter(|tc| (1..=4).contains(tc))?;
    let me = Me::of(frame)?;

    let callsign = (0..8)
        .map(|i| CALLSIGN_CHARSET[me.field(9 + i * 6, 6) as usize] as char)
        .collect();

    // Set A is TC 4, counting down to set D at TC 1
    let set = [' ', 'D', 'C', 'B', 'A'][tc as usize];

    Some(IdentificationMsg {
        icao: frame.icao,
        callsign,
        category: Some(format!("{set}{}", me.field(6, 3))),
        timestamp: frame.timestamp,
    })
}

/// TC 5-8 (surface) or TC 9-18 and 20-22 (airborne): CPR position.
pub fn decode_position(frame: &ModeFrame) -> Option<PositionMsg> {
    let tc = frame.type_code()?;
    let is_surface = match tc {
        5..=8 => true,
        9..=18 | 20..=22 => false,
        _ => return None,
    };
    let me = Me::of(frame)?;

    let mut msg = PositionMsg {
        icao: frame.icao,
        altitude_ft: None,
        cpr_lat: me.field(23, 17),
        cpr_lon: me.field(40, 17),
        cpr_odd: me.flag(22),
        is_surface,
        ground_speed_kts: None,
        ground_track_deg: None,
        timestamp: frame.timestamp,
    };
    if is_surface {
        msg.ground_speed_kts = decode_movement(me.field(6, 7));
        msg.ground_track_deg = me
            .flag(13)
            .then(|| round2(f64::from(me.field(14, 7)) * 360.0 / 128.0));
    } else {
        msg.altitude_ft = decode_ac12(me.field(9, 12));
    }
    Some(msg)
}

/// TC 19: ground speed (subtypes 1-2) or airspeed (3-4).
pub fn decode_velocity(frame: &ModeFrame) -> Option<VelocityMsg> {
    if frame.type_code()? != 19 {
        return None;
    }
    let me = Me::of(frame)?;

    let (speed_kts, heading_deg, speed_type) = match me.field(6, 3) {
        1 | 2 => {
            let track = me.component(14).zip(me.component(25)).map(|(vx, vy)| {
                let speed = vx.hypot(vy);
                let heading = vx.atan2(vy).to_degrees().rem_euclid(360.0);
                (round2(speed), round2(heading))
            });
            (track.map(|t| t.0), track.map(|t| t.1), SpeedType::Ground)
        }
        3 | 4 => {
            let heading = me
                .flag(14)
                .then(|| round2(f64::from(me.field(15, 10)) * 360.0 / 1024.0));
            let speed = me.field(26, 10).checked_sub(1).map(f64::from);
            let kind = if me.flag(25) {
                SpeedType::TAS
            } else {
                SpeedType::IAS
            };
            (speed, heading, kind)
        }
        _ => return None,
    };

    Some(VelocityMsg {
        icao: frame.icao,
        speed_kts,
        heading_deg,
        vertical_rate_fpm: me.vertical_rate(),
        speed_type,
        timestamp: frame.timestamp,
    })
}

// ---------------------------------------------------------------------------
// Surveillance and ACAS replies
// ---------------------------------------------------------------------------

/// The 13-bit AC or ID field shared by DF0/4/5/16/20/21.
fn reply_code(frame: &ModeFrame) -> Option<u32> {
    let [hi, lo]: [u8; 2] = frame.raw.get(2..4)?.try_into().ok()?;
    Some((u32::from(hi & 0x1F) << 8) | u32::from(lo))
}

/// DF0/4/16/20: altitude, plus on-ground when the reply says so.
pub fn decode_df_altitude(frame: &ModeFrame) -> Option<AltitudeMsg> {
    if !matches!(frame.df, 0 | 4 | 16 | 20) {
        return None;
    }
    let code = reply_code(frame)?;

    let on_ground = match frame.df {
        // ACAS vertical status
        0 | 16 => Some(frame.raw[0] & 0x04 != 0),
        // Flight status; 2 and 3 carry an alert, 4 and up are indeterminate
        _ => match frame.first_field() {
            0 | 2 => Some(false),
            1 | 3 => Some(true),
            _ => None,
        },
    };

    Some(AltitudeMsg {
        icao: frame.icao,
        altitude_ft: decode_ac13(code),
        on_ground,
        timestamp: frame.timestamp,
    })
}

/// DF5/21: squawk.
pub fn decode_df_squawk(frame: &ModeFrame) -> Option<SquawkMsg> {
    if !matches!(frame.df, 5 | 21) {
        return None;
    }
    Some(SquawkMsg {
        icao: frame.icao,
        squawk: decode_squawk(reply_code(frame)?),
        timestamp: frame.timestamp,
    })
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

fn other(frame: &ModeFrame, kind: &'static str) -> DecodedMsg {
    DecodedMsg::Other(OtherMsg {
        icao: frame.icao,
        kind,
        timestamp: frame.timestamp,
    })
}

fn malformed(frame: &ModeFrame) -> SeaskyError {
    SeaskyError::UnsupportedFormat(format!(
        "DF{} from {} did not decode",
        frame.df,
        icao_to_string(&frame.icao)
    ))
}

fn extended_squitter(frame: &ModeFrame) -> Result<DecodedMsg> {
    let tc = frame.type_code().ok_or_else(|| malformed(frame))?;
    let decoded = match tc {
        1..=4 => decode_identification(frame).map(DecodedMsg::Identification),
        5..=18 | 20..=22 => decode_position(frame).map(DecodedMsg::Position),
        19 => Some(
            decode_velocity(frame)
                .map_or_else(|| other(frame, "reserved velocity subtype"), DecodedMsg::Velocity),
        ),
        0 => Some(other(frame, "no position information")),
        23 => Some(other(frame, "test message")),
        24 => Some(other(frame, "surface system status")),
        28 => Some(other(frame, "aircraft status")),
        29 => Some(other(frame, "target state and status")),
        31 => Some(other(frame, "operational status")),
        _ => Some(other(frame, "reserved type code")),
    };
    decoded.ok_or_else(|| malformed(frame))
}

/// Decode a parsed frame. Frames that failed parity are rejected.
pub fn decode(frame: &ModeFrame) -> Result<DecodedMsg> {
    if !frame.crc_ok {
        return Err(SeaskyError::CrcFailed);
    }

    match frame.df {
        17 => extended_squitter(frame),
        18 => match frame.first_field() {
            0 => extended_squitter(frame),
            cf => Err(SeaskyError::UnsupportedFormat(format!("DF18 with CF={cf}"))),
        },
        0 | 4 | 16 | 20 => decode_df_altitude(frame)
            .map(DecodedMsg::Altitude)
            .ok_or_else(|| malformed(frame)),
        5 | 21 => decode_df_squawk(frame)
            .map(DecodedMsg::Squawk)
            .ok_or_else(|| malformed(frame)),
        11 => Ok(other(frame, "all-call reply")),
        df => Err(SeaskyError::UnknownDf(df)),
    }
}
