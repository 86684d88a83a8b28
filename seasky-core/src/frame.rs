//! Raw Mode S bytes to [`ModeFrame`]s.
//!
//! All-call replies and squitters (DF11/17/18) carry the aircraft address in
//! bytes 1-3 and plain parity. Every other supported format overlays the
//! address on the parity field, so the address is whatever the CRC leaves
//! behind. Noise turns into plausible addresses that way, which is why those
//! frames are checked against [`KnownAddresses`].

use std::collections::HashMap;

use crate::crc;
use crate::types::{icao_to_string, Icao, Millis, Result, SeaskyError};

/// How long an address stays known after its last explicit sighting.
pub const ADDRESS_TTL_MS: Millis = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressField {
    Explicit,
    Parity,
}

/// Frame length in bytes and where the address lives, per DF.
fn layout(df: u8) -> Option<(usize, AddressField)> {
    match df {
        11 => Some((7, AddressField::Explicit)),
        17 | 18 => Some((14, AddressField::Explicit)),
        0 | 4 | 5 => Some((7, AddressField::Parity)),
        16 | 20 | 21 => Some((14, AddressField::Parity)),
        _ => None,
    }
}

/// Addresses recently seen in frames with explicit, parity-checked
/// addresses.
#[derive(Debug)]
pub struct KnownAddresses {
    ttl_ms: Millis,
    last_seen: HashMap<Icao, Millis>,
}

impl Default for KnownAddresses {
    fn default() -> Self {
        KnownAddresses::new(ADDRESS_TTL_MS)
    }
}

impl KnownAddresses {
    pub fn new(ttl_ms: Millis) -> Self {
        KnownAddresses {
            ttl_ms,
            last_seen: HashMap::new(),
        }
    }

    pub fn seen(&mut self, icao: Icao, at: Millis) {
        self.last_seen.insert(icao, at);
    }

    /// Whether `icao` was seen within the TTL before `at`. Expired entries
    /// are dropped on lookup.
    pub fn recent(&mut self, icao: &Icao, at: Millis) -> bool {
        match self.last_seen.get(icao) {
            Some(&t) if at - t <= self.ttl_ms => true,
            Some(_) => {
                self.last_seen.remove(icao);
                false
            }
            None => false,
        }
    }

    pub fn prune(&mut self, now: Millis) {
        let ttl = self.ttl_ms;
        self.last_seen.retain(|_, t| now - *t <= ttl);
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

/// A parity-checked Mode S frame.
#[derive(Debug, Clone)]
pub struct ModeFrame {
    pub df: u8,
    pub icao: Icao,
    /// Frame bytes, repaired if `corrected`.
    pub raw: Vec<u8>,
    pub timestamp: Millis,
    pub crc_ok: bool,
    pub corrected: bool,
}

impl ModeFrame {
    pub fn is_long(&self) -> bool {
        self.raw.len() == 14
    }

    /// CA (DF11/17), CF (DF18) or FS (DF4/5/20/21).
    pub fn first_field(&self) -> u8 {
        self.raw[0] & 0x07
    }

    /// The 7-byte ME field of a long frame, empty otherwise.
    pub fn me(&self) -> &[u8] {
        match self.raw.get(4..11) {
            Some(me) if self.is_long() => me,
            _ => &[],
        }
    }

    /// ADS-B type code, for DF17/18 only.
    pub fn type_code(&self) -> Option<u8> {
        if !matches!(self.df, 17 | 18) {
            return None;
        }
        self.me().first().map(|b| b >> 3)
    }
}

/// Parse and parity-check one frame.
///
/// With `known` set, explicit addresses are recorded and parity-derived
/// addresses must already be known. Only DF17/18 are repaired; other
/// explicit-address frames with a bad CRC are rejected.
pub fn parse_frame(
    data: &[u8],
    timestamp: Millis,
    known: Option<&mut KnownAddresses>,
) -> Result<ModeFrame> {
    let df = data.first().map(|b| b >> 3).ok_or(SeaskyError::InvalidLength {
        expected: 7,
        actual: 0,
    })?;
    let (len, field) = layout(df).ok_or(SeaskyError::UnknownDf(df))?;
    if data.len() != len {
        return Err(SeaskyError::InvalidLength {
            expected: len,
            actual: data.len(),
        });
    }

    let remainder = crc::crc24(data);
    let mut frame = ModeFrame {
        df,
        icao: [0; 3],
        raw: data.to_vec(),
        timestamp,
        crc_ok: true,
        corrected: false,
    };

    match field {
        AddressField::Explicit => {
            if remainder != 0 {
                if df == 11 {
                    return Err(SeaskyError::CrcFailed);
                }
                frame.raw = crc::try_fix(data).ok_or(SeaskyError::CrcFailed)?;
                frame.corrected = true;
            }
            frame.icao = [frame.raw[1], frame.raw[2], frame.raw[3]];
            if let Some(known) = known {
                known.seen(frame.icao, timestamp);
            }
        }
        AddressField::Parity => {
            let [_, a, b, c] = remainder.to_be_bytes();
            frame.icao = [a, b, c];
            if let Some(known) = known {
                if !known.recent(&frame.icao, timestamp) {
                    return Err(SeaskyError::UnknownAddress(icao_to_string(&frame.icao)));
                }
            }
        }
    }

    Ok(frame)
}

/// Parse without address bookkeeping.
pub fn parse_frame_uncached(data: &[u8], timestamp: Millis) -> Result<ModeFrame> {
    parse_frame(data, timestamp, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hex_decode;

    const IDENT: &str = "8D4840D6202CC371C32CE0576098";

    fn bytes(hex: &str) -> Vec<u8> {
        hex_decode(hex).unwrap()
    }

    #[test]
    fn test_squitter_fields() {
        let frame = parse_frame_uncached(&bytes(IDENT), 1000).unwrap();
        assert_eq!(frame.df, 17);
        assert_eq!(icao_to_string(&frame.icao), "4840d6");
        assert!(frame.crc_ok && !frame.corrected);
        assert_eq!(frame.first_field(), 5);
        assert_eq!(frame.me().len(), 7);
        assert_eq!(frame.type_code(), Some(4));

        let position = parse_frame_uncached(&bytes("8D40621D58C382D690C8AC2863A7"), 0).unwrap();
        assert_eq!(position.type_code(), Some(11));
    }

    #[test]
    fn test_surveillance_address_from_parity() {
        let frame = parse_frame_uncached(&bytes("20001838CA3804"), 0).unwrap();
        assert_eq!(frame.df, 4);
        assert_eq!(frame.icao, [0xDB, 0xBB, 0x5F]);
        assert!(frame.me().is_empty());
        assert_eq!(frame.type_code(), None);
    }

    #[test]
    fn test_length_and_df_checks() {
        assert!(matches!(
            parse_frame_uncached(&bytes("8D4840D6"), 0),
            Err(SeaskyError::InvalidLength { expected: 14, actual: 4 })
        ));
        assert!(matches!(
            parse_frame_uncached(&[], 0),
            Err(SeaskyError::InvalidLength { .. })
        ));
        assert!(matches!(
            parse_frame_uncached(&[0x18, 0, 0, 0, 0, 0, 0], 0),
            Err(SeaskyError::UnknownDf(3))
        ));
    }

    #[test]
    fn test_known_addresses_expire() {
        let mut known = KnownAddresses::new(60_000);
        let icao = [0x48, 0x40, 0xD6];

        assert!(!known.recent(&icao, 0));
        known.seen(icao, 1_000);
        assert!(known.recent(&icao, 61_000));
        assert!(!known.recent(&icao, 61_001));
        assert!(known.is_empty());
    }

    #[test]
    fn test_known_addresses_prune() {
        let mut known = KnownAddresses::new(10_000);
        known.seen([1, 2, 3], 0);
        known.seen([4, 5, 6], 5_000);
        known.prune(12_000);
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn test_parity_address_needs_prior_sighting() {
        let mut known = KnownAddresses::default();
        let reply = bytes("20001838CA3804");
        assert!(matches!(
            parse_frame(&reply, 1_000, Some(&mut known)),
            Err(SeaskyError::UnknownAddress(_))
        ));

        known.seen([0xDB, 0xBB, 0x5F], 500);
        assert!(parse_frame(&reply, 1_000, Some(&mut known)).is_ok());

        parse_frame(&bytes(IDENT), 2_000, Some(&mut known)).unwrap();
        assert!(known.recent(&[0x48, 0x40, 0xD6], 3_000));
    }

    #[test]
    fn test_squitter_repaired_all_call_rejected() {
        let mut data = bytes(IDENT);
        data[5] ^= 0x01;
        let frame = parse_frame_uncached(&data, 1000).unwrap();
        assert!(frame.corrected);
        assert_eq!(frame.raw, bytes(IDENT));

        let mut all_call = bytes("5D4840D6000000");
        all_call[6] ^= 0x01;
        assert!(matches!(
            parse_frame_uncached(&all_call, 0),
            Err(SeaskyError::CrcFailed)
        ));
    }
}
