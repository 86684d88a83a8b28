//! Static reference data: base stations, airports, seaports and a seed for
//! the AIS name cache.
//!
//! ```json
//! {
//!   "base_stations": [{ "name": "Home", "lat": 50.7, "lon": -1.8 }],
//!   "airports": [{ "name": "Southampton", "icao_code": "EGHI", "lat": 50.95, "lon": -1.36 }],
//!   "seaports": [{ "name": "Poole", "lat": 50.71, "lon": -1.99 }],
//!   "ais_names": [{ "mmsi": 235009802, "name": "RED FALCON" }]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::track::{Track, TrackExt, TrackType};
use crate::types::{Millis, Result, SeaskyError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Airport {
    pub name: String,
    #[serde(default)]
    pub icao_code: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AisName {
    pub mmsi: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub base_stations: Vec<Place>,
    pub airports: Vec<Airport>,
    pub seaports: Vec<Place>,
    pub ais_names: Vec<AisName>,
}

impl ReferenceData {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SeaskyError::Config(format!("reference data {}: {e}", path.display()))
        })?;
        let data = Self::parse(&text)?;
        info!(
            path = %path.display(),
            base_stations = data.base_stations.len(),
            airports = data.airports.len(),
            seaports = data.seaports.len(),
            ais_names = data.ais_names.len(),
            "loaded reference data"
        );
        Ok(data)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Fixed tracks for every base station, airport and seaport.
    pub fn fixed_tracks(&self, now: Millis) -> Vec<Track> {
        let bases = self.base_stations.iter().map(|p| {
            Track::fixed_at(
                format!("BASE-{}", p.name),
                TrackType::BaseStation,
                &p.name,
                p.lat,
                p.lon,
                now,
            )
        });
        let airports = self.airports.iter().map(|a| {
            let key = a.icao_code.as_deref().unwrap_or(&a.name);
            let mut t = Track::fixed_at(
                format!("APT-{key}"),
                TrackType::Airport,
                &a.name,
                a.lat,
                a.lon,
                now,
            );
            t.ext = Some(TrackExt::Airport {
                icao_code: a.icao_code.clone(),
            });
            t
        });
        let seaports = self.seaports.iter().map(|p| {
            Track::fixed_at(
                format!("SEA-{}", p.name),
                TrackType::Seaport,
                &p.name,
                p.lat,
                p.lon,
                now,
            )
        });
        bases.chain(airports).chain(seaports).collect()
    }

    /// `(mmsi, name)` pairs for seeding the name cache.
    pub fn name_seed(&self) -> impl Iterator<Item = (u32, String)> + '_ {
        self.ais_names.iter().map(|n| (n.mmsi, n.name.clone()))
    }

    /// Position of the first base station, used to resolve single CPR frames.
    pub fn reference_position(&self) -> Option<(f64, f64)> {
        self.base_stations.first().map(|p| (p.lat, p.lon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "base_stations": [{ "name": "Home", "lat": 50.7, "lon": -1.8 }],
        "airports": [
            { "name": "Southampton", "icao_code": "EGHI", "lat": 50.95, "lon": -1.36 },
            { "name": "Sandown", "lat": 50.65, "lon": -1.18 }
        ],
        "seaports": [{ "name": "Poole", "lat": 50.71, "lon": -1.99 }],
        "ais_names": [{ "mmsi": 235009802, "name": "RED FALCON" }]
    }"#;

    #[test]
    fn test_parse_and_build_tracks() {
        let data = ReferenceData::parse(SAMPLE).unwrap();
        let tracks = data.fixed_tracks(1_000);
        let ids: Vec<&str> = tracks.iter().map(|t| t.id()).collect();
        assert_eq!(ids, ["BASE-Home", "APT-EGHI", "APT-Sandown", "SEA-Poole"]);
        assert!(tracks.iter().all(|t| t.is_fixed()));
        assert_eq!(tracks[1].description(), "EGHI");
        assert_eq!(tracks[3].latest_position().map(|p| p.lat), Some(50.71));
    }

    #[test]
    fn test_reference_position_and_names() {
        let data = ReferenceData::parse(SAMPLE).unwrap();
        assert_eq!(data.reference_position(), Some((50.7, -1.8)));
        let names: Vec<_> = data.name_seed().collect();
        assert_eq!(names, [(235_009_802, "RED FALCON".to_string())]);
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let data = ReferenceData::parse("{}").unwrap();
        assert_eq!(data, ReferenceData::default());
        assert_eq!(data.reference_position(), None);
        assert!(ReferenceData::parse("[1,2]").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let data = ReferenceData::load(&path).unwrap();
        assert_eq!(data.airports.len(), 2);
        assert!(ReferenceData::load(&dir.path().join("nope.json")).is_err());
    }
}
