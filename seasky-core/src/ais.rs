//! AIS decode from NMEA 0183 `!AIVDM` / `!AIVDO` sentences.
//!
//! Pipeline per line:
//! 1. Strip any tag block, verify the `*hh` XOR checksum
//! 2. Reassemble multi-fragment messages (keyed by sequence id and channel)
//! 3. De-armor the 6-bit payload and decode by message type
//!
//! Values are converted to physical units but not filtered: "not available"
//! codes (lat 91, lon 181, COG 360, SOG 102.3, heading 511) come through as
//! decoded and are left for the merge policy to discard.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{Result, SeaskyError};

/// Latitude "not available" in degrees.
pub const LAT_NOT_AVAILABLE: f64 = 91.0;
/// Longitude "not available" in degrees.
pub const LON_NOT_AVAILABLE: f64 = 181.0;
/// Course over ground "not available" in degrees.
pub const COG_NOT_AVAILABLE: f64 = 360.0;
/// Speed over ground "not available" in knots.
pub const SOG_NOT_AVAILABLE: f64 = 102.3;
/// True heading "not available".
pub const HEADING_NOT_AVAILABLE: u16 = 511;
/// Navigation status "not defined".
pub const NAV_STATUS_NOT_DEFINED: u8 = 15;

// ---------------------------------------------------------------------------
// NMEA sentence layer
// ---------------------------------------------------------------------------

/// One `!xxVDM` sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub fragment_count: u8,
    pub fragment_number: u8,
    pub sequence_id: Option<u8>,
    pub channel: Option<char>,
    pub payload: String,
    pub fill_bits: u8,
}

/// XOR checksum of the characters between the start delimiter and `*`.
pub fn nmea_checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Parse and checksum-verify a single sentence.
pub fn parse_sentence(line: &str) -> Result<Sentence> {
    let line = line.trim();
    // Tag blocks precede the sentence: \s:rx,c:1234*hh\!AIVDM,...
    let start = line
        .find('!')
        .ok_or_else(|| SeaskyError::Sentence(format!("no start delimiter: {line}")))?;
    let sentence = &line[start..];

    let (body, checksum) = sentence[1..]
        .split_once('*')
        .ok_or_else(|| SeaskyError::Sentence(format!("no checksum: {sentence}")))?;
    let expected = u8::from_str_radix(checksum.get(..2).unwrap_or(checksum), 16)
        .map_err(|_| SeaskyError::Sentence(format!("bad checksum field: {sentence}")))?;
    let actual = nmea_checksum(body);
    if actual != expected {
        return Err(SeaskyError::Checksum(format!(
            "expected {expected:02X}, computed {actual:02X}"
        )));
    }

    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < 7 {
        return Err(SeaskyError::Sentence(format!(
            "expected 7 fields, got {}",
            fields.len()
        )));
    }
    let talker = fields[0];
    if !(talker.ends_with("VDM") || talker.ends_with("VDO")) {
        return Err(SeaskyError::Sentence(format!("not an AIS sentence: {talker}")));
    }

    let num = |s: &str, what: &str| -> Result<u8> {
        s.parse()
            .map_err(|_| SeaskyError::Sentence(format!("bad {what}: {s:?}")))
    };

    let fragment_count = num(fields[1], "fragment count")?;
    let fragment_number = num(fields[2], "fragment number")?;
    if fragment_count == 0 || fragment_number == 0 || fragment_number > fragment_count {
        return Err(SeaskyError::Sentence(format!(
            "fragment {fragment_number} of {fragment_count}"
        )));
    }

    Ok(Sentence {
        fragment_count,
        fragment_number,
        sequence_id: fields[3].parse().ok(),
        channel: fields[4].chars().next(),
        payload: fields[5].to_string(),
        fill_bits: if fields[6].is_empty() {
            0
        } else {
            num(fields[6], "fill bits")?
        },
    })
}

// ---------------------------------------------------------------------------
// Fragment reassembly
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Partial {
    total: u8,
    next: u8,
    payload: String,
}

/// Reassembles multi-sentence messages. One per input stream.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    pending: HashMap<(Option<u8>, Option<char>), Partial>,
}

impl FragmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sentence. Returns the full payload and its fill bits once the
    /// last fragment is in.
    pub fn push(&mut self, sentence: Sentence) -> Result<Option<(String, u8)>> {
        if sentence.fragment_count == 1 {
            return Ok(Some((sentence.payload, sentence.fill_bits)));
        }

        let key = (sentence.sequence_id, sentence.channel);
        if sentence.fragment_number == 1 {
            self.pending.insert(
                key,
                Partial {
                    total: sentence.fragment_count,
                    next: 2,
                    payload: sentence.payload,
                },
            );
            return Ok(None);
        }

        let in_order = matches!(
            self.pending.get(&key),
            Some(p) if p.next == sentence.fragment_number && p.total == sentence.fragment_count
        );
        if !in_order {
            self.pending.remove(&key);
            return Err(SeaskyError::Sentence(format!(
                "unexpected fragment {} of {}",
                sentence.fragment_number, sentence.fragment_count
            )));
        }
        let Some(partial) = self.pending.get_mut(&key) else {
            return Ok(None);
        };

        partial.payload.push_str(&sentence.payload);
        partial.next += 1;

        if sentence.fragment_number == sentence.fragment_count {
            let done = self.pending.remove(&key).map(|p| p.payload);
            return Ok(done.map(|payload| (payload, sentence.fill_bits)));
        }
        Ok(None)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// 6-bit payload
// ---------------------------------------------------------------------------

/// De-armored AIS payload with big-endian bit access.
struct Payload {
    bits: Vec<bool>,
}

impl Payload {
    fn new(armored: &str, fill_bits: u8) -> Result<Self> {
        let mut bits = Vec::with_capacity(armored.len() * 6);
        for c in armored.bytes() {
            if !(48..=119).contains(&c) || (88..=95).contains(&c) {
                return Err(SeaskyError::Ais(format!("invalid armor character {:?}", c as char)));
            }
            let mut v = c - 48;
            if v > 40 {
                v -= 8;
            }
            for shift in (0..6).rev() {
                bits.push((v >> shift) & 1 == 1);
            }
        }
        let keep = bits.len().saturating_sub(fill_bits as usize);
        bits.truncate(keep);
        Ok(Payload { bits })
    }

    fn len(&self) -> usize {
        self.bits.len()
    }

    fn require(&self, msg_type: u8, needed: usize) -> Result<()> {
        if self.len() < needed {
            return Err(SeaskyError::Ais(format!(
                "type {msg_type} needs {needed} bits, got {}",
                self.len()
            )));
        }
        Ok(())
    }

    fn uint(&self, start: usize, len: usize) -> u32 {
        self.bits[start..start + len]
            .iter()
            .fold(0u32, |acc, &b| (acc << 1) | b as u32)
    }

    fn int(&self, start: usize, len: usize) -> i32 {
        let raw = self.uint(start, len);
        let shift = 32 - len as u32;
        ((raw << shift) as i32) >> shift
    }

    fn text(&self, start: usize, len: usize) -> String {
        let end = (start + len).min(self.len());
        (start..end)
            .step_by(6)
            .filter(|i| i + 6 <= end)
            .map(|i| {
                let v = self.uint(i, 6) as u8;
                if v < 32 {
                    (v + 64) as char
                } else {
                    v as char
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Decoded messages
// ---------------------------------------------------------------------------

/// Kinematic fields shared by the position report types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AisPosition {
    pub lat: f64,
    pub lon: f64,
    pub sog: f64,
    pub cog: f64,
    /// `None` for message types that carry no heading.
    pub heading: Option<u16>,
}

/// Static data report part (type 24).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StaticPart {
    A { name: String },
    B { ship_type: u8, callsign: String },
}

/// A decoded AIS message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AisMessage {
    /// Types 1, 2, 3
    ClassAPosition {
        msg_type: u8,
        mmsi: u32,
        nav_status: u8,
        position: AisPosition,
    },
    /// Type 4
    BaseStation { mmsi: u32, lat: f64, lon: f64 },
    /// Type 5
    StaticVoyage {
        mmsi: u32,
        callsign: String,
        name: String,
        ship_type: u8,
        destination: String,
    },
    /// Type 9
    SarAircraft {
        mmsi: u32,
        altitude_m: u16,
        position: AisPosition,
    },
    /// Type 11
    UtcResponse { mmsi: u32, lat: f64, lon: f64 },
    /// Type 18
    ClassBPosition { mmsi: u32, position: AisPosition },
    /// Type 19
    ExtendedClassB {
        mmsi: u32,
        name: String,
        ship_type: u8,
        position: AisPosition,
    },
    /// Type 21
    AidToNavigation {
        mmsi: u32,
        aid_type: u8,
        name: String,
        lat: f64,
        lon: f64,
    },
    /// Type 24
    StaticData { mmsi: u32, part: StaticPart },
    /// Type 27
    LongRange {
        mmsi: u32,
        nav_status: u8,
        position: AisPosition,
    },
    /// Anything else: binary messages, acknowledgements, interrogations.
    Other { msg_type: u8, mmsi: u32 },
}

impl AisMessage {
    pub fn mmsi(&self) -> u32 {
        match self {
            AisMessage::ClassAPosition { mmsi, .. }
            | AisMessage::BaseStation { mmsi, .. }
            | AisMessage::StaticVoyage { mmsi, .. }
            | AisMessage::SarAircraft { mmsi, .. }
            | AisMessage::UtcResponse { mmsi, .. }
            | AisMessage::ClassBPosition { mmsi, .. }
            | AisMessage::ExtendedClassB { mmsi, .. }
            | AisMessage::AidToNavigation { mmsi, .. }
            | AisMessage::StaticData { mmsi, .. }
            | AisMessage::LongRange { mmsi, .. }
            | AisMessage::Other { mmsi, .. } => *mmsi,
        }
    }
}

/// Standard-resolution coordinate: 1/10000 minute.
fn coord(raw: i32) -> f64 {
    raw as f64 / 600_000.0
}

fn tenths(raw: u32) -> f64 {
    raw as f64 / 10.0
}

/// Position block for types 1-3 (`offset` 0) and 18/19 (SOG at bit 46).
fn read_position(p: &Payload, sog_at: usize, with_heading: bool) -> AisPosition {
    let heading_at = sog_at + 78;
    AisPosition {
        sog: tenths(p.uint(sog_at, 10)),
        lon: coord(p.int(sog_at + 11, 28)),
        lat: coord(p.int(sog_at + 39, 27)),
        cog: tenths(p.uint(sog_at + 66, 12)),
        heading: with_heading.then(|| p.uint(heading_at, 9) as u16),
    }
}

/// Decode an assembled payload.
pub fn decode_payload(armored: &str, fill_bits: u8) -> Result<AisMessage> {
    let p = Payload::new(armored, fill_bits)?;
    p.require(0, 38)?;

    let msg_type = p.uint(0, 6) as u8;
    let mmsi = p.uint(8, 30);

    let msg = match msg_type {
        1..=3 => {
            p.require(msg_type, 137)?;
            AisMessage::ClassAPosition {
                msg_type,
                mmsi,
                nav_status: p.uint(38, 4) as u8,
                position: read_position(&p, 50, true),
            }
        }
        4 | 11 => {
            p.require(msg_type, 134)?;
            let lon = coord(p.int(79, 28));
            let lat = coord(p.int(107, 27));
            if msg_type == 4 {
                AisMessage::BaseStation { mmsi, lat, lon }
            } else {
                AisMessage::UtcResponse { mmsi, lat, lon }
            }
        }
        5 => {
            p.require(msg_type, 422)?;
            AisMessage::StaticVoyage {
                mmsi,
                callsign: p.text(70, 42),
                name: p.text(112, 120),
                ship_type: p.uint(232, 8) as u8,
                destination: p.text(302, 120),
            }
        }
        9 => {
            p.require(msg_type, 128)?;
            let sog = p.uint(50, 10);
            AisMessage::SarAircraft {
                mmsi,
                altitude_m: p.uint(38, 12) as u16,
                position: AisPosition {
                    // Whole knots for SAR aircraft
                    sog: sog as f64,
                    lon: coord(p.int(61, 28)),
                    lat: coord(p.int(89, 27)),
                    cog: tenths(p.uint(116, 12)),
                    heading: None,
                },
            }
        }
        18 => {
            p.require(msg_type, 133)?;
            AisMessage::ClassBPosition {
                mmsi,
                position: read_position(&p, 46, true),
            }
        }
        19 => {
            p.require(msg_type, 271)?;
            AisMessage::ExtendedClassB {
                mmsi,
                name: p.text(143, 120),
                ship_type: p.uint(263, 8) as u8,
                position: read_position(&p, 46, true),
            }
        }
        21 => {
            p.require(msg_type, 219)?;
            let mut name = p.text(43, 120);
            // Optional name extension after the fixed 272 bits
            if p.len() > 272 {
                name.push_str(&p.text(272, p.len() - 272));
            }
            AisMessage::AidToNavigation {
                mmsi,
                aid_type: p.uint(38, 5) as u8,
                name,
                lon: coord(p.int(164, 28)),
                lat: coord(p.int(192, 27)),
            }
        }
        24 => {
            p.require(msg_type, 40)?;
            let part = match p.uint(38, 2) {
                0 => {
                    p.require(msg_type, 160)?;
                    StaticPart::A {
                        name: p.text(40, 120),
                    }
                }
                1 => {
                    p.require(msg_type, 132)?;
                    StaticPart::B {
                        ship_type: p.uint(40, 8) as u8,
                        callsign: p.text(90, 42),
                    }
                }
                n => return Err(SeaskyError::Ais(format!("type 24 part number {n}"))),
            };
            AisMessage::StaticData { mmsi, part }
        }
        27 => {
            p.require(msg_type, 94)?;
            // Long-range reports use their own "not available" codes
            let lon_raw = p.int(44, 18);
            let lat_raw = p.int(62, 17);
            let sog_raw = p.uint(79, 6);
            let cog_raw = p.uint(85, 9);
            AisMessage::LongRange {
                mmsi,
                nav_status: p.uint(40, 4) as u8,
                position: AisPosition {
                    lon: lon_raw as f64 / 600.0,
                    lat: lat_raw as f64 / 600.0,
                    sog: if sog_raw == 63 {
                        SOG_NOT_AVAILABLE
                    } else {
                        sog_raw as f64
                    },
                    cog: if cog_raw == 511 {
                        COG_NOT_AVAILABLE
                    } else {
                        cog_raw as f64
                    },
                    heading: None,
                },
            }
        }
        _ => AisMessage::Other { msg_type, mmsi },
    };

    Ok(msg)
}

/// Line-in, message-out AIS decoder. One per input stream.
#[derive(Debug, Default)]
pub struct AisDecoder {
    fragments: FragmentAssembler,
}

impl AisDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one NMEA line. `Ok(None)` means a fragment was buffered.
    pub fn push_line(&mut self, line: &str) -> Result<Option<AisMessage>> {
        let sentence = parse_sentence(line)?;
        match self.fragments.push(sentence)? {
            Some((payload, fill)) => decode_payload(&payload, fill).map(Some),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
