//! Track model: one live or fixed object under surveillance.
//!
//! Pure data with setters. The merge policy decides what to write; the
//! track only records values and refreshes its update timestamps.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Millis;

// ---------------------------------------------------------------------------
// Track type
// ---------------------------------------------------------------------------

/// Discriminant for the track variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackType {
    Aircraft,
    Ship,
    AisShoreStation,
    AisAton,
    BaseStation,
    Airport,
    Seaport,
}

impl TrackType {
    pub const ALL: [TrackType; 7] = [
        TrackType::Aircraft,
        TrackType::Ship,
        TrackType::AisShoreStation,
        TrackType::AisAton,
        TrackType::BaseStation,
        TrackType::Airport,
        TrackType::Seaport,
    ];

    /// Types loaded from reference data rather than received over the air.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            TrackType::BaseStation | TrackType::Airport | TrackType::Seaport
        )
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackType::Aircraft => "AIRCRAFT",
            TrackType::Ship => "SHIP",
            TrackType::AisShoreStation => "AIS_SHORE_STATION",
            TrackType::AisAton => "AIS_ATON",
            TrackType::BaseStation => "BASE_STATION",
            TrackType::Airport => "AIRPORT",
            TrackType::Seaport => "SEAPORT",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Position history
// ---------------------------------------------------------------------------

/// One timestamped fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionPoint {
    pub time: Millis,
    pub lat: f64,
    pub lon: f64,
}

// ---------------------------------------------------------------------------
// Variant extension
// ---------------------------------------------------------------------------

/// Fields that only exist for some track variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackExt {
    Aircraft {
        on_ground: Option<bool>,
        /// Emitter category, e.g. "A3".
        category: Option<String>,
    },
    Ais {
        mmsi: u32,
        ship_type: Option<u8>,
        nav_status: Option<u8>,
        destination: Option<String>,
    },
    Airport {
        icao_code: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    id: String,
    pub track_type: TrackType,
    pub fixed: bool,
    history: Vec<PositionPoint>,

    pub course: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    /// Feet.
    pub altitude: Option<f64>,
    /// Feet per minute.
    pub vertical_rate: Option<f64>,
    pub callsign: Option<String>,
    pub squawk: Option<String>,
    pub name: Option<String>,

    pub ext: Option<TrackExt>,

    pub created_time: Millis,
    pub position_updated: Option<Millis>,
    pub metadata_updated: Option<Millis>,
}

impl Track {
    pub fn new(id: impl Into<String>, track_type: TrackType, now: Millis) -> Self {
        let ext = match track_type {
            TrackType::Aircraft => Some(TrackExt::Aircraft {
                on_ground: None,
                category: None,
            }),
            TrackType::Airport => Some(TrackExt::Airport { icao_code: None }),
            _ => None,
        };
        Track {
            id: id.into(),
            track_type,
            fixed: !matches!(track_type, TrackType::Aircraft | TrackType::Ship),
            history: Vec::new(),
            course: None,
            heading: None,
            speed: None,
            altitude: None,
            vertical_rate: None,
            callsign: None,
            squawk: None,
            name: None,
            ext,
            created_time: now,
            position_updated: None,
            metadata_updated: None,
        }
    }

    /// A live aircraft keyed by its hex address.
    pub fn aircraft(id: impl Into<String>, now: Millis) -> Self {
        Track::new(id, TrackType::Aircraft, now)
    }

    /// A live AIS contact keyed by its MMSI.
    pub fn ship(mmsi: u32, now: Millis) -> Self {
        let mut t = Track::new(mmsi.to_string(), TrackType::Ship, now);
        t.ext = Some(TrackExt::Ais {
            mmsi,
            ship_type: None,
            nav_status: None,
            destination: None,
        });
        t
    }

    /// A fixed reference entity at a known position.
    pub fn fixed_at(
        id: impl Into<String>,
        track_type: TrackType,
        name: &str,
        lat: f64,
        lon: f64,
        now: Millis,
    ) -> Self {
        let mut t = Track::new(id, track_type, now);
        t.fixed = true;
        t.name = Some(name.to_string());
        t.append_position(lat, lon, now);
        t.metadata_updated = Some(now);
        t
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn history(&self) -> &[PositionPoint] {
        &self.history
    }

    pub fn latest_position(&self) -> Option<&PositionPoint> {
        self.history.last()
    }

    // -- Position --

    /// Append a fix. Callers are expected to have rejected implausible values.
    pub fn append_position(&mut self, lat: f64, lon: f64, time: Millis) {
        self.history.push(PositionPoint { time, lat, lon });
        self.position_updated = Some(time);
    }

    /// Drop fixes older than `retention_ms`. Fixed tracks keep everything.
    pub fn cull_history(&mut self, now: Millis, retention_ms: Millis) -> usize {
        if self.fixed {
            return 0;
        }
        let before = self.history.len();
        self.history.retain(|p| now - p.time <= retention_ms);
        before - self.history.len()
    }

    // -- Metadata setters --

    pub fn touch_metadata(&mut self, now: Millis) {
        self.metadata_updated = Some(now);
    }

    pub fn set_course(&mut self, course: f64, now: Millis) {
        self.course = Some(course);
        self.touch_metadata(now);
    }

    pub fn set_heading(&mut self, heading: f64, now: Millis) {
        self.heading = Some(heading);
        self.touch_metadata(now);
    }

    pub fn set_speed(&mut self, speed: f64, now: Millis) {
        self.speed = Some(speed);
        self.touch_metadata(now);
    }

    pub fn set_altitude(&mut self, altitude: f64, now: Millis) {
        self.altitude = Some(altitude);
        self.touch_metadata(now);
    }

    pub fn set_vertical_rate(&mut self, rate: f64, now: Millis) {
        self.vertical_rate = Some(rate);
        self.touch_metadata(now);
    }

    pub fn set_callsign(&mut self, callsign: String, now: Millis) {
        self.callsign = Some(callsign);
        self.touch_metadata(now);
    }

    pub fn set_squawk(&mut self, squawk: String, now: Millis) {
        self.squawk = Some(squawk);
        self.touch_metadata(now);
    }

    pub fn set_name(&mut self, name: String, now: Millis) {
        self.name = Some(name);
        self.touch_metadata(now);
    }

    pub fn set_on_ground(&mut self, on_ground: bool, now: Millis) {
        if let Some(TrackExt::Aircraft { on_ground: g, .. }) = &mut self.ext {
            *g = Some(on_ground);
        }
        self.touch_metadata(now);
    }

    pub fn set_category(&mut self, category: String, now: Millis) {
        if let Some(TrackExt::Aircraft { category: c, .. }) = &mut self.ext {
            *c = Some(category);
        }
        self.touch_metadata(now);
    }

    pub fn set_ship_type(&mut self, ship_type: u8, now: Millis) {
        if let Some(TrackExt::Ais { ship_type: s, .. }) = &mut self.ext {
            *s = Some(ship_type);
        }
        self.touch_metadata(now);
    }

    pub fn set_nav_status(&mut self, status: u8, now: Millis) {
        if let Some(TrackExt::Ais { nav_status: s, .. }) = &mut self.ext {
            *s = Some(status);
        }
        self.touch_metadata(now);
    }

    pub fn set_destination(&mut self, destination: String, now: Millis) {
        if let Some(TrackExt::Ais { destination: d, .. }) = &mut self.ext {
            *d = Some(destination);
        }
        self.touch_metadata(now);
    }

    /// Switch an AIS contact to a fixed variant (shore station, AtoN).
    pub fn make_fixed(&mut self, track_type: TrackType) {
        self.track_type = track_type;
        self.fixed = true;
    }

    pub fn on_ground(&self) -> Option<bool> {
        match &self.ext {
            Some(TrackExt::Aircraft { on_ground, .. }) => *on_ground,
            _ => None,
        }
    }

    // -- Lifecycle --

    /// Most recent of the position and metadata timestamps.
    pub fn last_update(&self) -> Option<Millis> {
        self.position_updated.max(self.metadata_updated)
    }

    /// True if this live track has gone quiet for longer than `stale_ms`.
    ///
    /// Needs both the newest fix (if any) and the last metadata update to
    /// be older than the threshold. Fixed tracks are never dropped.
    pub fn should_drop(&self, now: Millis, stale_ms: Millis) -> bool {
        if self.fixed {
            return false;
        }
        let position_stale = self
            .history
            .last()
            .map_or(true, |p| now - p.time > stale_ms);
        let metadata_stale = self.metadata_updated.map_or(true, |t| now - t > stale_ms);
        position_stale && metadata_stale
    }

    // -- Display --

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.callsign.as_deref())
            .unwrap_or(&self.id)
    }

    /// Short human-readable summary for table dumps.
    pub fn description(&self) -> String {
        let mut parts = Vec::new();
        if let Some(alt) = self.altitude {
            parts.push(format!("{alt:.0} ft"));
        }
        if let Some(spd) = self.speed {
            parts.push(format!("{spd:.1} kt"));
        }
        if let Some(crs) = self.course {
            parts.push(format!("{crs:03.0}°"));
        }
        if let Some(sq) = &self.squawk {
            parts.push(format!("sq {sq}"));
        }
        match &self.ext {
            Some(TrackExt::Ais {
                destination: Some(d),
                ..
            }) if !d.is_empty() => parts.push(format!("to {d}")),
            Some(TrackExt::Airport {
                icao_code: Some(code),
            }) => parts.push(code.clone()),
            _ => {}
        }
        parts.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
