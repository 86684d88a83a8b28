//! AIS merge: NMEA lines into ship, shore station and AtoN tracks.
//!
//! Not-available codes are dropped here rather than stored: lat 91 /
//! lon 181, COG 360, SOG 102.3, heading 511 (and 0, which many class B
//! sets send when they have no compass), nav status 15.

use crate::ais::{
    AisDecoder, AisMessage, AisPosition, StaticPart, COG_NOT_AVAILABLE, HEADING_NOT_AVAILABLE,
    NAV_STATUS_NOT_DEFINED, SOG_NOT_AVAILABLE,
};
use crate::merge::{normalize_text, valid_position, MergeOutcome};
use crate::table::{NameCache, TrackTable};
use crate::track::{Track, TrackType};
use crate::types::{Millis, Result};

/// Per-stream AIS merger.
#[derive(Debug, Default)]
pub struct AisMerger {
    decoder: AisDecoder,
}

impl AisMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and merge one NMEA line.
    pub fn merge_line(&mut self, table: &TrackTable, line: &str, now: Millis) -> Result<MergeOutcome> {
        match self.decoder.push_line(line)? {
            Some(msg) => Ok(merge_message(table, &msg, now)),
            None => Ok(MergeOutcome::Pending),
        }
    }
}

/// Merge one decoded AIS message.
pub fn merge_message(table: &TrackTable, msg: &AisMessage, now: Millis) -> MergeOutcome {
    if matches!(msg, AisMessage::SarAircraft { .. } | AisMessage::Other { .. }) {
        // SAR aircraft also show up over ADS-B
        return MergeOutcome::NoOp;
    }

    let mmsi = msg.mmsi();
    let id = mmsi.to_string();

    table.upsert(
        &id,
        |names| new_contact(mmsi, names, now),
        |t, names, created| {
            apply(t, names, msg, now);
            MergeOutcome::touched(id.clone(), created)
        },
    )
}

/// New AIS track, named from the cache when the contact has been seen before.
fn new_contact(mmsi: u32, names: &NameCache, now: Millis) -> Track {
    let mut t = Track::ship(mmsi, now);
    t.name = names.get(mmsi).map(str::to_string);
    t
}

fn apply(t: &mut Track, names: &mut NameCache, msg: &AisMessage, now: Millis) {
    match msg {
        AisMessage::ClassAPosition {
            nav_status,
            position,
            ..
        } => {
            mark_ship(t);
            apply_position(t, position, now);
            apply_nav_status(t, *nav_status, now);
        }
        AisMessage::BaseStation { lat, lon, .. } => {
            t.make_fixed(TrackType::AisShoreStation);
            add_fix(t, *lat, *lon, now);
        }
        AisMessage::StaticVoyage {
            mmsi,
            callsign,
            name,
            ship_type,
            destination,
        } => {
            mark_ship(t);
            apply_name(t, names, *mmsi, name, now);
            apply_callsign(t, callsign, now);
            t.set_ship_type(*ship_type, now);
            if let Some(dest) = normalize_text(destination) {
                t.set_destination(dest, now);
            }
        }
        AisMessage::UtcResponse { lat, lon, .. } => {
            add_fix(t, *lat, *lon, now);
        }
        AisMessage::ClassBPosition { position, .. } => {
            mark_ship(t);
            apply_position(t, position, now);
        }
        AisMessage::ExtendedClassB {
            mmsi,
            name,
            ship_type,
            position,
        } => {
            mark_ship(t);
            apply_name(t, names, *mmsi, name, now);
            t.set_ship_type(*ship_type, now);
            apply_position(t, position, now);
        }
        AisMessage::AidToNavigation {
            mmsi,
            name,
            lat,
            lon,
            ..
        } => {
            t.make_fixed(TrackType::AisAton);
            apply_name(t, names, *mmsi, name, now);
            add_fix(t, *lat, *lon, now);
        }
        AisMessage::StaticData { mmsi, part } => {
            mark_ship(t);
            match part {
                StaticPart::A { name } => apply_name(t, names, *mmsi, name, now),
                StaticPart::B {
                    ship_type,
                    callsign,
                } => {
                    t.set_ship_type(*ship_type, now);
                    apply_callsign(t, callsign, now);
                }
            }
        }
        AisMessage::LongRange {
            nav_status,
            position,
            ..
        } => {
            mark_ship(t);
            apply_position(t, position, now);
            apply_nav_status(t, *nav_status, now);
        }
        AisMessage::SarAircraft { .. } | AisMessage::Other { .. } => return,
    }
    t.touch_metadata(now);
}

fn mark_ship(t: &mut Track) {
    if !t.is_fixed() {
        t.track_type = TrackType::Ship;
    }
}

/// Append a fix unless it is the not-available position. Fixed stations
/// that repeat their position only refresh the update time.
fn add_fix(t: &mut Track, lat: f64, lon: f64, now: Millis) {
    if !valid_position(lat, lon) {
        return;
    }
    let repeat = t
        .latest_position()
        .is_some_and(|p| p.lat == lat && p.lon == lon);
    if t.is_fixed() && repeat {
        t.position_updated = Some(now);
    } else {
        t.append_position(lat, lon, now);
    }
}

fn apply_position(t: &mut Track, pos: &AisPosition, now: Millis) {
    add_fix(t, pos.lat, pos.lon, now);
    if pos.cog < COG_NOT_AVAILABLE {
        t.set_course(pos.cog, now);
    }
    if let Some(hdg) = pos.heading {
        if hdg != 0 && hdg != HEADING_NOT_AVAILABLE && hdg < 360 {
            t.set_heading(hdg as f64, now);
        }
    }
    if pos.sog < SOG_NOT_AVAILABLE {
        t.set_speed(pos.sog, now);
    }
}

fn apply_nav_status(t: &mut Track, status: u8, now: Millis) {
    if status != NAV_STATUS_NOT_DEFINED {
        t.set_nav_status(status, now);
    }
}

fn apply_name(t: &mut Track, names: &mut NameCache, mmsi: u32, raw: &str, now: Millis) {
    if let Some(name) = normalize_text(raw) {
        names.insert(mmsi, name.clone());
        t.set_name(name, now);
    }
}

fn apply_callsign(t: &mut Track, raw: &str, now: Millis) {
    if let Some(cs) = normalize_text(raw) {
        t.set_callsign(cs, now);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
