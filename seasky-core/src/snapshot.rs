//! Full and delta snapshots of the track table for API clients.
//!
//! A client calls the full snapshot once to get every track with its
//! history, then polls the delta for the fields that change.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::table::TrackTable;
use crate::track::{PositionPoint, Track, TrackExt, TrackType};
use crate::types::{Millis, Result};

/// Every track including fixed entities and full position history.
#[derive(Debug, Clone, Serialize)]
pub struct FullSnapshot {
    pub time: Millis,
    pub version: String,
    pub tracks: BTreeMap<String, Track>,
}

/// Mutable fields of live tracks. No history, no fixed entities.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaSnapshot {
    pub time: Millis,
    pub tracks: BTreeMap<String, TrackDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDelta {
    pub track_type: TrackType,
    pub position: Option<PositionPoint>,
    pub course: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
    pub vertical_rate: Option<f64>,
    pub callsign: Option<String>,
    pub squawk: Option<String>,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_ground: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nav_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub position_updated: Option<Millis>,
    pub metadata_updated: Option<Millis>,
}

impl From<&Track> for TrackDelta {
    fn from(t: &Track) -> Self {
        let (nav_status, destination) = match &t.ext {
            Some(TrackExt::Ais {
                nav_status,
                destination,
                ..
            }) => (*nav_status, destination.clone()),
            _ => (None, None),
        };
        TrackDelta {
            track_type: t.track_type,
            position: t.latest_position().copied(),
            course: t.course,
            heading: t.heading,
            speed: t.speed,
            altitude: t.altitude,
            vertical_rate: t.vertical_rate,
            callsign: t.callsign.clone(),
            squawk: t.squawk.clone(),
            name: t.name.clone(),
            on_ground: t.on_ground(),
            nav_status,
            destination,
            position_updated: t.position_updated,
            metadata_updated: t.metadata_updated,
        }
    }
}

/// Build the full snapshot under one read of the table.
pub fn full_snapshot(table: &TrackTable, now: Millis, version: &str) -> FullSnapshot {
    let tracks = table.with_tracks(|tracks| {
        tracks
            .iter()
            .map(|(id, t)| (id.clone(), t.clone()))
            .collect()
    });
    FullSnapshot {
        time: now,
        version: version.to_string(),
        tracks,
    }
}

/// Build the delta snapshot under one read of the table.
pub fn delta_snapshot(table: &TrackTable, now: Millis) -> DeltaSnapshot {
    let tracks = table.with_tracks(|tracks| {
        tracks
            .iter()
            .filter(|(_, t)| !t.is_fixed())
            .map(|(id, t)| (id.clone(), TrackDelta::from(t)))
            .collect()
    });
    DeltaSnapshot { time: now, tracks }
}

/// Serialize a snapshot, indented when `readable` is set.
pub fn to_json<T: Serialize>(snapshot: &T, readable: bool) -> Result<String> {
    let json = if readable {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string(snapshot)?
    };
    Ok(json)
}
