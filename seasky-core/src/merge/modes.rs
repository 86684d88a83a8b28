//! Mode S merge: raw frames from BEAST or AVR feeds into aircraft tracks.
//!
//! - Identification: callsign and emitter category
//! - Airborne position: fix, altitude, airborne
//! - Surface position: fix, on ground, altitude 0, speed, course/heading
//! - Velocity: speed, course/heading, vertical rate
//! - Altitude replies and ACAS: altitude, on-ground when the frame says so
//! - Identity replies: squawk
//! - Everything else (all-call, ES status, TCAS, target state): no-op

use std::collections::HashMap;

use crate::cpr;
use crate::decode::decode;
use crate::frame::{parse_frame, KnownAddresses};
use crate::merge::{valid_position, MergeOutcome};
use crate::table::TrackTable;
use crate::track::Track;
use crate::types::*;

/// Prune per-aircraft decode state after this many merges.
const PRUNE_EVERY: u64 = 10_000;

#[derive(Debug, Clone, Copy)]
struct CprFrame {
    lat: u32,
    lon: u32,
    time: Millis,
}

/// Latest airborne even/odd CPR frames for one aircraft.
#[derive(Debug, Default, Clone, Copy)]
struct CprFrames {
    even: Option<CprFrame>,
    odd: Option<CprFrame>,
}

impl CprFrames {
    fn record(&mut self, msg: &PositionMsg) {
        let frame = Some(CprFrame {
            lat: msg.cpr_lat,
            lon: msg.cpr_lon,
            time: msg.timestamp,
        });
        if msg.cpr_odd {
            self.odd = frame;
        } else {
            self.even = frame;
        }
    }

    fn global(&self) -> Option<(f64, f64)> {
        let (even, odd) = (self.even?, self.odd?);
        cpr::global_decode(even.lat, even.lon, odd.lat, odd.lon, even.time, odd.time)
    }

    fn newest(&self) -> Millis {
        self.even
            .map(|f| f.time)
            .max(self.odd.map(|f| f.time))
            .unwrap_or(0)
    }
}

/// Per-stream Mode S merger.
pub struct ModeSMerger {
    known: KnownAddresses,
    cpr: HashMap<Icao, CprFrames>,
    /// Receiver position for single-frame (local) CPR resolution.
    reference: Option<(f64, f64)>,
    merges: u64,
}

impl Default for ModeSMerger {
    fn default() -> Self {
        ModeSMerger::new(None)
    }
}

impl ModeSMerger {
    pub fn new(reference: Option<(f64, f64)>) -> Self {
        ModeSMerger {
            known: KnownAddresses::default(),
            cpr: HashMap::new(),
            reference,
            merges: 0,
        }
    }

    /// Parse, decode and merge one Mode S payload (BEAST header already
    /// stripped).
    pub fn merge_payload(
        &mut self,
        table: &TrackTable,
        payload: &[u8],
        now: Millis,
    ) -> Result<MergeOutcome> {
        let mut frame = parse_frame(payload, now, Some(&mut self.known))?;

        // MLAT results arrive as DF18 CF=2, which the decoder does not
        // support. Rewrite to CF=0; parity was checked during parse.
        if frame.df == 18 && frame.first_field() == 2 {
            frame.raw[0] &= 0xF8;
        }

        let msg = decode(&frame)?;

        self.merges += 1;
        if self.merges % PRUNE_EVERY == 0 {
            self.prune(now);
        }

        Ok(self.merge_decoded(table, &msg))
    }

    /// Merge an already decoded message.
    pub fn merge_decoded(&mut self, table: &TrackTable, msg: &DecodedMsg) -> MergeOutcome {
        if let DecodedMsg::Other(_) = msg {
            return MergeOutcome::NoOp;
        }

        let (icao, ts) = msg.origin();
        let id = icao_to_string(&icao);

        let global = match msg {
            DecodedMsg::Position(p) if !p.is_surface => {
                let frames = self.cpr.entry(icao).or_default();
                frames.record(p);
                frames.global()
            }
            _ => None,
        };
        let reference = self.reference;

        table.upsert(
            &id,
            |_| Track::aircraft(id.as_str(), ts),
            |t, _, created| {
                apply(t, msg, global, reference, ts);
                MergeOutcome::touched(id.clone(), created)
            },
        )
    }

    /// Forget CPR frames too old to pair and addresses no longer known.
    pub fn prune(&mut self, now: Millis) {
        self.cpr
            .retain(|_, f| now - f.newest() <= cpr::MAX_PAIR_AGE_MS);
        self.known.prune(now);
    }
}

fn apply(
    t: &mut Track,
    msg: &DecodedMsg,
    global: Option<(f64, f64)>,
    reference: Option<(f64, f64)>,
    ts: Millis,
) {
    match msg {
        DecodedMsg::Identification(m) => {
            let callsign = m.callsign.trim();
            if !callsign.is_empty() {
                t.set_callsign(callsign.to_string(), ts);
            }
            if let Some(cat) = &m.category {
                t.set_category(cat.clone(), ts);
            }
        }
        DecodedMsg::Position(m) => {
            let fix = global.or_else(|| {
                let (ref_lat, ref_lon) = reference
                    .or_else(|| t.latest_position().map(|p| (p.lat, p.lon)))?;
                Some(cpr::local_decode(
                    m.cpr_lat,
                    m.cpr_lon,
                    m.cpr_odd,
                    m.is_surface,
                    ref_lat,
                    ref_lon,
                ))
            });
            if let Some((lat, lon)) = fix.filter(|&(lat, lon)| valid_position(lat, lon)) {
                t.append_position(lat, lon, ts);
            }

            if m.is_surface {
                t.set_on_ground(true, ts);
                t.set_altitude(0.0, ts);
                if let Some(spd) = m.ground_speed_kts {
                    t.set_speed(spd, ts);
                }
                if let Some(trk) = m.ground_track_deg {
                    t.set_course(trk, ts);
                    t.set_heading(trk, ts);
                }
            } else {
                t.set_on_ground(false, ts);
                if let Some(alt) = m.altitude_ft {
                    t.set_altitude(alt as f64, ts);
                }
            }
        }
        DecodedMsg::Velocity(m) => {
            if let Some(spd) = m.speed_kts {
                t.set_speed(spd, ts);
            }
            if let Some(hdg) = m.heading_deg {
                t.set_course(hdg, ts);
                t.set_heading(hdg, ts);
            }
            if let Some(vr) = m.vertical_rate_fpm {
                t.set_vertical_rate(vr as f64, ts);
            }
        }
        DecodedMsg::Altitude(m) => {
            if let Some(alt) = m.altitude_ft {
                t.set_altitude(alt as f64, ts);
            }
            if let Some(on_ground) = m.on_ground {
                t.set_on_ground(on_ground, ts);
            }
        }
        DecodedMsg::Squawk(m) => t.set_squawk(m.squawk.clone(), ts),
        DecodedMsg::Other(_) => {}
    }
    t.touch_metadata(ts);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc;
    use crate::table::TableSettings;

    fn table() -> TrackTable {
        TrackTable::new(TableSettings::default())
    }

    fn bytes(hex: &str) -> Vec<u8> {
        hex_decode(hex).unwrap()
    }

    /// Rewrite the first byte of a long frame and fix up its parity.
    fn with_first_byte(hex: &str, first: u8) -> Vec<u8> {
        let mut data = bytes(hex);
        data[0] = first;
        data[11..].fill(0);
        let parity = crc::crc24(&data);
        data[11] = (parity >> 16) as u8;
        data[12] = (parity >> 8) as u8;
        data[13] = parity as u8;
        data
    }

    #[test]
    fn test_identification_sets_callsign_and_category() {
        let table = table();
        let mut merger = ModeSMerger::default();
        let outcome = merger
            .merge_payload(&table, &bytes("8D4840D6202CC371C32CE0576098"), 1_000)
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Created("4840d6".into()));

        let t = table.get("4840d6").unwrap();
        assert_eq!(t.callsign.as_deref(), Some("KLM1023"));
        assert!(matches!(
            t.ext,
            Some(crate::track::TrackExt::Aircraft { category: Some(ref c), .. }) if c == "A0"
        ));
        assert_eq!(t.metadata_updated, Some(1_000));
    }

    #[test]
    fn test_position_pair_global_decode() {
        let table = table();
        let mut merger = ModeSMerger::default();
        // Odd frame first, even frame newest
        merger
            .merge_payload(&table, &bytes("8D40621D58C386435CC412692AD6"), 1_000)
            .unwrap();
        // One frame and no reference: no fix yet, altitude still merged
        let t = table.get("40621d").unwrap();
        assert!(t.history().is_empty());
        assert_eq!(t.altitude, Some(38000.0));
        assert_eq!(t.on_ground(), Some(false));

        let outcome = merger
            .merge_payload(&table, &bytes("8D40621D58C382D690C8AC2863A7"), 2_000)
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Updated("40621d".into()));

        let t = table.get("40621d").unwrap();
        let fix = t.latest_position().unwrap();
        assert!((fix.lat - 52.2572).abs() < 0.01, "lat {}", fix.lat);
        assert!((fix.lon - 3.9194).abs() < 0.01, "lon {}", fix.lon);
        assert_eq!(t.position_updated, Some(2_000));
    }

    #[test]
    fn test_single_frame_local_decode_with_reference() {
        let table = table();
        let mut merger = ModeSMerger::new(Some((52.25, 3.92)));
        merger
            .merge_payload(&table, &bytes("8D40621D58C382D690C8AC2863A7"), 1_000)
            .unwrap();
        let t = table.get("40621d").unwrap();
        let fix = t.latest_position().expect("local fix");
        assert!((fix.lat - 52.2572).abs() < 0.01);
        assert!((fix.lon - 3.9194).abs() < 0.01);
    }

    #[test]
    fn test_velocity_sets_course_and_heading() {
        let table = table();
        let mut merger = ModeSMerger::default();
        merger
            .merge_payload(&table, &bytes("8D485020994409940838175B284F"), 1_000)
            .unwrap();
        let t = table.get("485020").unwrap();
        assert!((t.speed.unwrap() - 159.0).abs() < 1.0);
        assert_eq!(t.course, t.heading);
        assert!((t.course.unwrap() - 182.88).abs() < 0.1);
        assert_eq!(t.vertical_rate, Some(-832.0));
    }

    #[test]
    fn test_mlat_df18_cf2_rewritten() {
        let table = table();
        let mut merger = ModeSMerger::default();
        // DF18, CF=2
        let data = with_first_byte("8D4840D6202CC371C32CE0576098", (18 << 3) | 2);
        let outcome = merger.merge_payload(&table, &data, 1_000).unwrap();
        assert_eq!(outcome, MergeOutcome::Created("4840d6".into()));
        assert_eq!(
            table.get("4840d6").unwrap().callsign.as_deref(),
            Some("KLM1023")
        );
    }

    #[test]
    fn test_df18_other_control_field_rejected() {
        let table = table();
        let mut merger = ModeSMerger::default();
        let data = with_first_byte("8D4840D6202CC371C32CE0576098", (18 << 3) | 6);
        let err = merger.merge_payload(&table, &data, 1_000).unwrap_err();
        assert!(matches!(err, SeaskyError::UnsupportedFormat(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_bad_crc_does_not_touch_table() {
        let table = table();
        let mut merger = ModeSMerger::default();
        let mut data = bytes("8D4840D6202CC371C32CE0576098");
        data[4] ^= 0xFF;
        data[8] ^= 0xFF;
        assert!(merger.merge_payload(&table, &data, 1_000).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_other_message_is_noop() {
        let table = table();
        let mut merger = ModeSMerger::default();
        let msg = DecodedMsg::Other(OtherMsg {
            icao: [0x48, 0x40, 0xD6],
            kind: "all-call reply",
            timestamp: 1_000,
        });
        assert_eq!(merger.merge_decoded(&table, &msg), MergeOutcome::NoOp);
        assert!(table.is_empty());
    }

    #[test]
    fn test_last_merged_wins_per_field() {
        let table = table();
        let mut merger = ModeSMerger::default();
        let icao = [0x40, 0x62, 0x1D];

        merger.merge_decoded(
            &table,
            &DecodedMsg::Squawk(SquawkMsg {
                icao,
                squawk: "7700".into(),
                timestamp: 5_000,
            }),
        );
        // Older message arriving late: carries altitude only
        merger.merge_decoded(
            &table,
            &DecodedMsg::Altitude(AltitudeMsg {
                icao,
                altitude_ft: Some(1200),
                on_ground: None,
                timestamp: 3_000,
            }),
        );
        let t = table.get("40621d").unwrap();
        assert_eq!(t.squawk.as_deref(), Some("7700"));
        assert_eq!(t.altitude, Some(1200.0));

        // An older squawk is still applied: no timestamp rejection
        merger.merge_decoded(
            &table,
            &DecodedMsg::Squawk(SquawkMsg {
                icao,
                squawk: "1200".into(),
                timestamp: 1_000,
            }),
        );
        assert_eq!(table.get("40621d").unwrap().squawk.as_deref(), Some("1200"));
    }

    #[test]
    fn test_altitude_reply_on_ground() {
        let table = table();
        let mut merger = ModeSMerger::default();
        merger.merge_decoded(
            &table,
            &DecodedMsg::Altitude(AltitudeMsg {
                icao: [0x40, 0x62, 0x1D],
                altitude_ft: None,
                on_ground: Some(true),
                timestamp: 1_000,
            }),
        );
        let t = table.get("40621d").unwrap();
        assert_eq!(t.on_ground(), Some(true));
        assert_eq!(t.altitude, None);
    }

    #[test]
    fn test_surface_position() {
        let table = table();
        let mut merger = ModeSMerger::new(Some((52.3, 4.76)));
        let msg = DecodedMsg::Position(PositionMsg {
            icao: [0x48, 0x40, 0xD6],
            altitude_ft: None,
            cpr_lat: 93000,
            cpr_lon: 51372,
            cpr_odd: false,
            is_surface: true,
            ground_speed_kts: Some(15.0),
            ground_track_deg: Some(90.0),
            timestamp: 1_000,
        });
        merger.merge_decoded(&table, &msg);

        let t = table.get("4840d6").unwrap();
        assert_eq!(t.on_ground(), Some(true));
        assert_eq!(t.altitude, Some(0.0));
        assert_eq!(t.speed, Some(15.0));
        assert_eq!(t.course, Some(90.0));
        assert_eq!(t.history().len(), 1);
    }

    #[test]
    fn test_prune_drops_old_cpr_frames() {
        let table = table();
        let mut merger = ModeSMerger::default();
        merger
            .merge_payload(&table, &bytes("8D40621D58C382D690C8AC2863A7"), 1_000)
            .unwrap();
        assert_eq!(merger.cpr.len(), 1);
        merger.prune(1_000 + cpr::MAX_PAIR_AGE_MS + 1);
        assert!(merger.cpr.is_empty());
    }
}
