//! Configuration file management for seasky.
//!
//! Reads/writes `~/.seasky/config.yaml` with source endpoints, the web
//! listener, track lifecycle settings and the reference-data path.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::table::TableSettings;
use crate::types::{Millis, Result, SeaskyError};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sources: SourcesConfig,
    pub web: WebConfig,
    pub tracks: TracksConfig,
    pub reference: ReferenceConfig,
}

/// Feed endpoints. A port of 0 disables that source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcesConfig {
    pub adsb_host: String,
    pub adsb_port: u16,
    pub mlat_host: String,
    pub mlat_port: u16,
    pub avr_host: String,
    pub avr_port: u16,
    pub ais_port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub readable_json: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TracksConfig {
    pub store_path: String,
    pub history_minutes: u64,
    pub aircraft_stale_secs: u64,
    pub ship_stale_secs: u64,
    pub maintenance_secs: u64,
    pub backup_secs: u64,
    pub print_table: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferenceConfig {
    pub path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sources: SourcesConfig {
                adsb_host: "localhost".into(),
                adsb_port: 30005,
                mlat_host: "localhost".into(),
                mlat_port: 30105,
                avr_host: "localhost".into(),
                avr_port: 0,
                ais_port: 10110,
            },
            web: WebConfig {
                host: "0.0.0.0".into(),
                port: 8090,
                readable_json: false,
            },
            tracks: TracksConfig {
                store_path: "track_data_store.json".into(),
                history_minutes: 60,
                aircraft_stale_secs: 300,
                ship_stale_secs: 1800,
                maintenance_secs: 10,
                backup_secs: 600,
                print_table: false,
            },
            reference: ReferenceConfig::default(),
        }
    }
}

impl Config {
    /// Lifecycle settings for the track table.
    pub fn table_settings(&self) -> TableSettings {
        TableSettings {
            store_path: PathBuf::from(&self.tracks.store_path),
            retention_ms: secs_to_ms(self.tracks.history_minutes.saturating_mul(60)),
            aircraft_stale_ms: secs_to_ms(self.tracks.aircraft_stale_secs),
            ship_stale_ms: secs_to_ms(self.tracks.ship_stale_secs),
        }
    }
}

fn secs_to_ms(secs: u64) -> Millis {
    Millis::try_from(secs.saturating_mul(1000)).unwrap_or(Millis::MAX)
}

/// Get the config directory path (`~/.seasky/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".seasky")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `path`, or `~/.seasky/config.yaml` when `None`.
///
/// Returns default config if the file doesn't exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map_or_else(config_file, Path::to_path_buf);
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| SeaskyError::Config(format!("{}: {e}", path.display())))?;
    Ok(parse_config(&text))
}

/// Save config to `path`, creating parent directories.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| SeaskyError::Config(e.to_string()))?;
    }
    std::fs::write(path, serialize_config(config))
        .map_err(|e| SeaskyError::Config(e.to_string()))?;
    Ok(())
}

/// Parse simple YAML-like config text. Unknown keys are ignored and bad
/// values keep the default.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }
        let Some(section) = current_section.as_deref() else {
            continue;
        };

        let c = &mut config;
        match (section, key) {
            ("sources", "adsb_host") => set_string(&mut c.sources.adsb_host, val),
            ("sources", "adsb_port") => set_parsed(&mut c.sources.adsb_port, key, val),
            ("sources", "mlat_host") => set_string(&mut c.sources.mlat_host, val),
            ("sources", "mlat_port") => set_parsed(&mut c.sources.mlat_port, key, val),
            ("sources", "avr_host") => set_string(&mut c.sources.avr_host, val),
            ("sources", "avr_port") => set_parsed(&mut c.sources.avr_port, key, val),
            ("sources", "ais_port") => set_parsed(&mut c.sources.ais_port, key, val),
            ("web", "host") => set_string(&mut c.web.host, val),
            ("web", "port") => set_parsed(&mut c.web.port, key, val),
            ("web", "readable_json") => set_parsed(&mut c.web.readable_json, key, val),
            ("tracks", "store_path") => set_string(&mut c.tracks.store_path, val),
            ("tracks", "history_minutes") => {
                set_parsed(&mut c.tracks.history_minutes, key, val)
            }
            ("tracks", "aircraft_stale_secs") => {
                set_parsed(&mut c.tracks.aircraft_stale_secs, key, val)
            }
            ("tracks", "ship_stale_secs") => set_parsed(&mut c.tracks.ship_stale_secs, key, val),
            ("tracks", "maintenance_secs") => {
                set_parsed(&mut c.tracks.maintenance_secs, key, val)
            }
            ("tracks", "backup_secs") => set_parsed(&mut c.tracks.backup_secs, key, val),
            ("tracks", "print_table") => set_parsed(&mut c.tracks.print_table, key, val),
            ("reference", "path") => c.reference.path = parse_string_value(val),
            _ => {}
        }
    }

    config
}

fn set_string(slot: &mut String, val: &str) {
    if let Some(v) = parse_string_value(val) {
        *slot = v;
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, val: &str) {
    let Some(v) = parse_string_value(val) else {
        return;
    };
    match v.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = %v, "ignoring unparsable config value"),
    }
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let s = &config.sources;
    let t = &config.tracks;
    let mut lines = vec!["# seasky configuration".to_string(), String::new()];

    lines.push("sources:".into());
    lines.push(format!("  adsb_host: \"{}\"", s.adsb_host));
    lines.push(format!("  adsb_port: {}", s.adsb_port));
    lines.push(format!("  mlat_host: \"{}\"", s.mlat_host));
    lines.push(format!("  mlat_port: {}", s.mlat_port));
    lines.push(format!("  avr_host: \"{}\"", s.avr_host));
    lines.push(format!("  avr_port: {}", s.avr_port));
    lines.push(format!("  ais_port: {}", s.ais_port));
    lines.push(String::new());

    lines.push("web:".into());
    lines.push(format!("  host: \"{}\"", config.web.host));
    lines.push(format!("  port: {}", config.web.port));
    lines.push(format!("  readable_json: {}", config.web.readable_json));
    lines.push(String::new());

    lines.push("tracks:".into());
    lines.push(format!("  store_path: \"{}\"", t.store_path));
    lines.push(format!("  history_minutes: {}", t.history_minutes));
    lines.push(format!("  aircraft_stale_secs: {}", t.aircraft_stale_secs));
    lines.push(format!("  ship_stale_secs: {}", t.ship_stale_secs));
    lines.push(format!("  maintenance_secs: {}", t.maintenance_secs));
    lines.push(format!("  backup_secs: {}", t.backup_secs));
    lines.push(format!("  print_table: {}", t.print_table));
    lines.push(String::new());

    lines.push("reference:".into());
    match &config.reference.path {
        Some(p) => lines.push(format!("  path: \"{p}\"")),
        None => lines.push("  path: null".into()),
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sources.adsb_port, 30005);
        assert_eq!(config.sources.mlat_port, 30105);
        assert_eq!(config.sources.avr_port, 0);
        assert_eq!(config.web.port, 8090);
        assert_eq!(config.tracks.history_minutes, 60);
        assert!(config.reference.path.is_none());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
sources:
  adsb_host: "radar.local"
  adsb_port: 30005
  mlat_port: 0
  ais_port: 10111

web:
  host: "127.0.0.1"
  port: 9090
  readable_json: true

tracks:
  store_path: '/var/lib/seasky/tracks.json'
  aircraft_stale_secs: 120
  print_table: true

reference:
  path: "reference.json"
"#;
        let config = parse_config(text);
        assert_eq!(config.sources.adsb_host, "radar.local");
        assert_eq!(config.sources.mlat_port, 0);
        assert_eq!(config.sources.ais_port, 10111);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.web.port, 9090);
        assert!(config.web.readable_json);
        assert_eq!(config.tracks.store_path, "/var/lib/seasky/tracks.json");
        assert_eq!(config.tracks.aircraft_stale_secs, 120);
        assert_eq!(config.tracks.ship_stale_secs, 1800);
        assert!(config.tracks.print_table);
        assert_eq!(config.reference.path.as_deref(), Some("reference.json"));
    }

    #[test]
    fn test_parse_config_null_and_bad_values() {
        let text = r#"
web:
  port: lots
  host: ~

reference:
  path: null
"#;
        let config = parse_config(text);
        assert_eq!(config.web.port, 8090);
        assert_eq!(config.web.host, "0.0.0.0");
        assert!(config.reference.path.is_none());
    }

    #[test]
    fn test_key_outside_section_ignored() {
        let config = parse_config("port: 1234\n  port: 4321\n");
        assert_eq!(config.web.port, 8090);
    }

    #[test]
    fn test_table_settings() {
        let mut config = Config::default();
        config.tracks.history_minutes = 30;
        let settings = config.table_settings();
        assert_eq!(settings.retention_ms, 30 * 60 * 1000);
        assert_eq!(settings.aircraft_stale_ms, 300_000);
        assert_eq!(settings.ship_stale_ms, 1_800_000);
        assert_eq!(settings.store_path, PathBuf::from("track_data_store.json"));
    }

    #[test]
    fn test_table_settings_huge_values_saturate() {
        let config = parse_config(
            "tracks:\n  history_minutes: 18446744073709551615\n  aircraft_stale_secs: 18446744073709551615\n",
        );
        assert_eq!(config.tracks.history_minutes, u64::MAX);
        let settings = config.table_settings();
        assert_eq!(settings.retention_ms, Millis::MAX);
        assert_eq!(settings.aircraft_stale_ms, Millis::MAX);
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.sources.avr_port = 30002;
        config.web.readable_json = true;
        config.tracks.backup_secs = 60;
        config.reference.path = Some("ref.json".into());
        let parsed = parse_config(&serialize_config(&config));
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        config.web.port = 8123;
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), config);

        let missing = dir.path().join("absent.yaml");
        assert_eq!(load_config(Some(&missing)).unwrap(), Config::default());
    }
}
