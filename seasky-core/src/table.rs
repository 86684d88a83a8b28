//! The Track Table: every live and fixed track plus the AIS name cache.
//!
//! One instance is shared by all ingestion sources, the maintenance cycle
//! and the snapshot API. All access goes through a single `RwLock` so a
//! reader never sees a track mid-update.
//!
//! Persistence is a JSON image of the whole table written to `<path>.tmp`
//! and renamed over `<path>`. A store that fails to load is deleted and the
//! table starts empty.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use comfy_table::{Cell, Table};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::track::{Track, TrackType};
use crate::types::{Millis, Result, SeaskyError};

// ---------------------------------------------------------------------------
// Name cache
// ---------------------------------------------------------------------------

/// MMSI → last known vessel name. Outlives the tracks it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameCache(HashMap<u32, String>);

impl NameCache {
    pub fn get(&self, mmsi: u32) -> Option<&str> {
        self.0.get(&mmsi).map(String::as_str)
    }

    pub fn insert(&mut self, mmsi: u32, name: String) {
        self.0.insert(mmsi, name);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Retention and staleness thresholds plus the store location.
#[derive(Debug, Clone)]
pub struct TableSettings {
    pub store_path: PathBuf,
    /// Position history kept for live tracks.
    pub retention_ms: Millis,
    pub aircraft_stale_ms: Millis,
    /// Applies to ships and every other non-aircraft live track.
    pub ship_stale_ms: Millis,
}

impl Default for TableSettings {
    fn default() -> Self {
        TableSettings {
            store_path: PathBuf::from("track_data_store.json"),
            retention_ms: 60 * 60_000,
            aircraft_stale_ms: 300_000,
            ship_stale_ms: 1_800_000,
        }
    }
}

impl TableSettings {
    pub fn stale_ms(&self, track_type: TrackType) -> Millis {
        match track_type {
            TrackType::Aircraft => self.aircraft_stale_ms,
            _ => self.ship_stale_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableState {
    tracks: HashMap<String, Track>,
    ais_names: NameCache,
}

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub points_culled: usize,
    pub tracks_dropped: usize,
}

pub struct TrackTable {
    state: RwLock<TableState>,
    settings: TableSettings,
}

impl TrackTable {
    pub fn new(settings: TableSettings) -> Self {
        TrackTable {
            state: RwLock::new(TableState::default()),
            settings,
        }
    }

    pub fn settings(&self) -> &TableSettings {
        &self.settings
    }

    fn read(&self) -> RwLockReadGuard<'_, TableState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TableState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Insert / update --

    /// Atomic insert-or-fetch followed by an update, under one write lock.
    ///
    /// `create` builds the track when `id` is unseen; it can read the name
    /// cache to pre-populate a name. `update` gets the track, the name cache
    /// and whether the track was just created.
    pub fn upsert<C, U, R>(&self, id: &str, create: C, update: U) -> R
    where
        C: FnOnce(&NameCache) -> Track,
        U: FnOnce(&mut Track, &mut NameCache, bool) -> R,
    {
        let mut guard = self.write();
        let TableState { tracks, ais_names } = &mut *guard;

        let mut created = false;
        let track = tracks.entry(id.to_string()).or_insert_with(|| {
            created = true;
            create(&*ais_names)
        });
        update(track, ais_names, created)
    }

    /// Insert or replace a whole track.
    pub fn insert(&self, track: Track) {
        self.write().tracks.insert(track.id().to_string(), track);
    }

    /// Clone of one track.
    pub fn get(&self, id: &str) -> Option<Track> {
        self.read().tracks.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().tracks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().tracks.is_empty()
    }

    pub fn cached_name(&self, mmsi: u32) -> Option<String> {
        self.read().ais_names.get(mmsi).map(str::to_string)
    }

    pub fn name_cache_len(&self) -> usize {
        self.read().ais_names.len()
    }

    /// Run `f` over all tracks while holding the read lock.
    pub fn with_tracks<R>(&self, f: impl FnOnce(&HashMap<String, Track>) -> R) -> R {
        f(&self.read().tracks)
    }

    // -- Maintenance --

    /// Drop history points older than the retention window on live tracks.
    pub fn cull_position_history(&self, now: Millis) -> usize {
        let retention = self.settings.retention_ms;
        self.write()
            .tracks
            .values_mut()
            .map(|t| t.cull_history(now, retention))
            .sum()
    }

    /// Remove every track that satisfies the drop predicate.
    pub fn drop_expired_tracks(&self, now: Millis) -> usize {
        let settings = &self.settings;
        let mut state = self.write();
        let before = state.tracks.len();
        state.tracks.retain(|id, t| {
            let drop = t.should_drop(now, settings.stale_ms(t.track_type));
            if drop {
                debug!(track = %id, track_type = %t.track_type, "dropping expired track");
            }
            !drop
        });
        before - state.tracks.len()
    }

    /// One cull pass followed by one expiry pass.
    pub fn maintain(&self, now: Millis) -> MaintenanceReport {
        MaintenanceReport {
            points_culled: self.cull_position_history(now),
            tracks_dropped: self.drop_expired_tracks(now),
        }
    }

    /// Startup: load the store, then cull and expire what went stale while
    /// the process was down.
    pub fn initialise(&self, now: Millis) -> MaintenanceReport {
        self.load_from_store();
        self.maintain(now)
    }

    // -- Persistence --

    /// Replace the table contents with the persisted store.
    ///
    /// Missing store: empty table. Unreadable store: logged, deleted, empty
    /// table. Returns the number of tracks loaded.
    pub fn load_from_store(&self) -> usize {
        let path = &self.settings.store_path;
        if !path.exists() {
            info!(path = %path.display(), "no track data store, probably first startup");
            return 0;
        }

        match read_store(path) {
            Ok(loaded) => {
                let mut state = self.write();
                *state = loaded;
                info!(
                    tracks = state.tracks.len(),
                    ais_names = state.ais_names.len(),
                    path = %path.display(),
                    "loaded track data store"
                );
                state.tracks.len()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not load track data store, deleting it");
                if let Err(e) = std::fs::remove_file(path) {
                    error!(path = %path.display(), error = %e, "could not delete track data store");
                }
                *self.write() = TableState::default();
                0
            }
        }
    }

    /// Read the store into the table, leaving the file untouched whatever
    /// its state. Fails when the file is missing or does not parse.
    pub fn read_store_only(&self) -> Result<usize> {
        let loaded = read_store(&self.settings.store_path)?;
        let mut state = self.write();
        *state = loaded;
        Ok(state.tracks.len())
    }

    /// Write the whole table to the store.
    pub fn save_to_store(&self) -> Result<()> {
        let path = &self.settings.store_path;
        let (json, tracks, names) = {
            let state = self.read();
            (
                serde_json::to_vec(&*state)?,
                state.tracks.len(),
                state.ais_names.len(),
            )
        };

        let tmp = tmp_path(path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        info!(tracks, ais_names = names, path = %path.display(), "saved track data store");
        Ok(())
    }

    // -- Reference data --

    /// Replace every base station, airport and seaport with `entities`.
    pub fn load_fixed_reference_entities(&self, entities: Vec<Track>) -> usize {
        let mut state = self.write();
        state.tracks.retain(|_, t| !t.track_type.is_reference());
        let count = entities.len();
        for track in entities {
            state.tracks.insert(track.id().to_string(), track);
        }
        info!(count, "loaded fixed reference tracks");
        count
    }

    /// Seed the name cache. Existing entries are overwritten.
    pub fn load_name_cache_seed(&self, names: impl IntoIterator<Item = (u32, String)>) -> usize {
        let mut state = self.write();
        let mut count = 0;
        for (mmsi, name) in names {
            state.ais_names.insert(mmsi, name);
            count += 1;
        }
        info!(count, "seeded AIS name cache");
        count
    }

    // -- Reporting --

    pub fn counts_by_type(&self) -> BTreeMap<TrackType, usize> {
        let state = self.read();
        let mut counts = BTreeMap::new();
        for t in state.tracks.values() {
            *counts.entry(t.track_type).or_insert(0) += 1;
        }
        counts
    }

    /// One-line summary, e.g. `12 AIRCRAFT   3 SHIP`.
    pub fn summary(&self) -> String {
        let counts = self.counts_by_type();
        TrackType::ALL
            .iter()
            .filter_map(|t| counts.get(t).map(|n| format!("{n} {t}")))
            .collect::<Vec<_>>()
            .join("   ")
    }

    /// Render every track as a text table, oldest update last.
    pub fn render(&self, now: Millis) -> String {
        let state = self.read();
        let mut rows: Vec<&Track> = state.tracks.values().collect();
        rows.sort_by_key(|t| std::cmp::Reverse(t.last_update()));

        let mut table = Table::new();
        table.set_header(vec!["Name", "Type", "Description", "Age (s)"]);
        for t in rows {
            table.add_row(vec![
                Cell::new(t.display_name()),
                Cell::new(t.track_type),
                Cell::new(t.description()),
                Cell::new(
                    t.last_update()
                        .map(|u| format!("{}", (now - u) / 1000))
                        .unwrap_or_else(|| "-".into()),
                ),
            ]);
        }
        table.to_string()
    }
}

fn read_store(path: &Path) -> Result<TableState> {
    let bytes = std::fs::read(path)?;
    let state: TableState = serde_json::from_slice(&bytes)?;
    for (id, track) in &state.tracks {
        if id != track.id() {
            return Err(SeaskyError::Store(format!(
                "track keyed {id} carries id {}",
                track.id()
            )));
        }
    }
    Ok(state)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn table_in(dir: &tempfile::TempDir) -> TrackTable {
        TrackTable::new(TableSettings {
            store_path: dir.path().join("store.json"),
            ..TableSettings::default()
        })
    }

    fn seed(table: &TrackTable) {
        table.upsert("4840d6", |_| Track::aircraft("4840d6", 0), |t, _, _| {
            t.append_position(52.0, 4.0, 1_000);
            t.set_callsign("KLM1023".into(), 1_000);
        });
        table.upsert("235009802", |_| Track::ship(235_009_802, 0), |t, names, _| {
            t.set_name("SEA BREEZE".into(), 1_000);
            names.insert(235_009_802, "SEA BREEZE".into());
        });
        table.insert(Track::fixed_at(
            "APT-EGHI",
            TrackType::Airport,
            "Southampton",
            50.95,
            -1.36,
            0,
        ));
    }

    #[test]
    fn test_upsert_creates_once() {
        let table = TrackTable::new(TableSettings::default());
        let first = table.upsert("abc123", |_| Track::aircraft("abc123", 0), |_, _, c| c);
        let second = table.upsert("abc123", |_| Track::aircraft("abc123", 0), |_, _, c| c);
        assert!(first);
        assert!(!second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_upsert_factory_reads_name_cache() {
        let table = TrackTable::new(TableSettings::default());
        table.load_name_cache_seed([(1234, "OLD NAME".to_string())]);
        table.upsert(
            "1234",
            |names| {
                let mut t = Track::ship(1234, 0);
                t.name = names.get(1234).map(str::to_string);
                t
            },
            |_, _, _| {},
        );
        assert_eq!(table.get("1234").unwrap().name.as_deref(), Some("OLD NAME"));
    }

    #[test]
    fn test_drop_expired_uses_per_type_threshold() {
        let table = TrackTable::new(TableSettings::default());
        seed(&table);
        // 10 minutes later: aircraft stale (5 min), ship not (30 min)
        let dropped = table.drop_expired_tracks(1_000 + 600_000);
        assert_eq!(dropped, 1);
        assert!(!table.contains("4840d6"));
        assert!(table.contains("235009802"));
        assert!(table.contains("APT-EGHI"));
    }

    #[test]
    fn test_fixed_survives_expiry() {
        let table = TrackTable::new(TableSettings::default());
        seed(&table);
        table.drop_expired_tracks(i64::MAX / 2);
        assert_eq!(table.len(), 1);
        assert!(table.contains("APT-EGHI"));
    }

    #[test]
    fn test_cull_position_history() {
        let table = TrackTable::new(TableSettings::default());
        seed(&table);
        let culled = table.cull_position_history(1_000 + 2 * 60 * 60_000);
        assert_eq!(culled, 1);
        assert!(table.get("4840d6").unwrap().history().is_empty());
        assert_eq!(table.get("APT-EGHI").unwrap().history().len(), 1);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);
        seed(&table);
        table.save_to_store().unwrap();
        assert!(!tmp_path(&table.settings().store_path).exists());

        let restored = table_in(&dir);
        assert_eq!(restored.load_from_store(), 3);
        assert_eq!(restored.cached_name(235_009_802).as_deref(), Some("SEA BREEZE"));
        assert_eq!(restored.get("4840d6"), table.get("4840d6"));
    }

    #[test]
    fn test_corrupt_store_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);
        seed(&table);
        std::fs::write(&table.settings().store_path, b"{\"tracks\": {\"x\": 1").unwrap();

        assert_eq!(table.load_from_store(), 0);
        assert!(table.is_empty());
        assert!(!table.settings().store_path.exists());

        // Second attempt finds no file and still succeeds
        assert_eq!(table.load_from_store(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_read_store_only_keeps_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);
        assert!(matches!(table.read_store_only(), Err(SeaskyError::Io(_))));

        std::fs::write(&table.settings().store_path, b"{\"tracks\": {\"x\": 1").unwrap();
        assert!(matches!(table.read_store_only(), Err(SeaskyError::Json(_))));
        assert!(table.settings().store_path.exists());

        seed(&table);
        table.save_to_store().unwrap();
        let reader = table_in(&dir);
        assert_eq!(reader.read_store_only().unwrap(), 3);
        assert!(reader.contains("4840d6"));
    }

    #[test]
    fn test_incompatible_store_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);
        std::fs::write(
            &table.settings().store_path,
            br#"{"tracks": [], "ais_names": {}}"#,
        )
        .unwrap();
        assert_eq!(table.load_from_store(), 0);
        assert!(!table.settings().store_path.exists());
    }

    #[test]
    fn test_initialise_expires_after_downtime() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);
        seed(&table);
        table.save_to_store().unwrap();

        let restarted = table_in(&dir);
        let report = restarted.initialise(1_000 + 24 * 60 * 60_000);
        assert_eq!(report.tracks_dropped, 2);
        assert_eq!(restarted.len(), 1);
        assert_eq!(restarted.cached_name(235_009_802).as_deref(), Some("SEA BREEZE"));
    }

    #[test]
    fn test_reference_entities_replace_previous_set() {
        let table = TrackTable::new(TableSettings::default());
        seed(&table);
        let entities = vec![
            Track::fixed_at("BASE-Home", TrackType::BaseStation, "Home", 50.9, -1.4, 0),
            Track::fixed_at("SEA-Cowes", TrackType::Seaport, "Cowes", 50.76, -1.3, 0),
        ];
        table.load_fixed_reference_entities(entities.clone());
        table.load_fixed_reference_entities(entities);

        assert!(!table.contains("APT-EGHI"));
        assert!(table.contains("BASE-Home"));
        assert!(table.contains("SEA-Cowes"));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_summary_and_render() {
        let table = TrackTable::new(TableSettings::default());
        seed(&table);
        assert_eq!(table.summary(), "1 AIRCRAFT   1 SHIP   1 AIRPORT");
        let text = table.render(2_000);
        assert!(text.contains("KLM1023"));
        assert!(text.contains("SEA BREEZE"));
        assert!(text.contains("Southampton"));
    }
}
