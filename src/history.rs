//! Player history collected from the server log
//!
//! Stored as JSON: `{ "<steamid>": { "name", "first_seen", "last_seen" } }`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    pub first_seen: String,
    pub last_seen: String,
}

/// Identity fields found on one log line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSighting {
    pub steamid: Option<String>,
    pub name: Option<String>,
}

impl PlayerSighting {
    pub fn is_empty(&self) -> bool {
        self.steamid.is_none() && self.name.is_none()
    }
}

fn steamid_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:SteamID|steamid|ID)[:\s=]+(7656\d{13})").ok())
        .as_ref()
}

fn name_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"AddClient:\s+(\S+)").ok()).as_ref()
}

fn first_capture(re: Option<&Regex>, line: &str) -> Option<String> {
    re?.captures(line)?.get(1).map(|m| m.as_str().to_string())
}

/// Best-effort extraction of player identity from a log line
pub fn parse_player_line(line: &str) -> PlayerSighting {
    PlayerSighting {
        steamid: first_capture(steamid_re(), line),
        name: first_capture(name_re(), line),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid history file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent map of players seen on the server
#[derive(Debug, Default)]
pub struct PlayerHistory {
    path: Option<PathBuf>,
    players: BTreeMap<String, PlayerRecord>,
    /// Name from a join line still waiting for its id
    pending_name: Option<String>,
}

impl PlayerHistory {
    /// Load from `path`; a missing file starts empty
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let players = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            players,
            pending_name: None,
        })
    }

    /// Load, falling back to an empty history that still writes to `path`
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            log::warn!("Ignoring player history {}: {}", path.display(), e);
            Self {
                path: Some(path.to_path_buf()),
                ..Self::default()
            }
        })
    }

    pub fn players(&self) -> &BTreeMap<String, PlayerRecord> {
        &self.players
    }

    /// Record a sighting of `steamid`
    pub fn record(&mut self, steamid: &str, name: Option<&str>, now: DateTime<Local>) {
        let now = now.format(TIME_FORMAT).to_string();
        match self.players.get_mut(steamid) {
            Some(record) => {
                record.last_seen = now;
                if let Some(name) = name {
                    record.name = name.to_string();
                }
            }
            None => {
                self.players.insert(
                    steamid.to_string(),
                    PlayerRecord {
                        name: name.unwrap_or("Unknown").to_string(),
                        first_seen: now.clone(),
                        last_seen: now,
                    },
                );
            }
        }
    }

    /// Feed one log line; a name seen without an id is paired with the next id
    pub fn observe_line(&mut self, line: &str, now: DateTime<Local>) -> bool {
        let sighting = parse_player_line(line);
        match (sighting.steamid, sighting.name) {
            (Some(id), name) => {
                let name = name.or_else(|| self.pending_name.take());
                self.record(&id, name.as_deref(), now);
                true
            }
            (None, Some(name)) => {
                self.pending_name = Some(name);
                false
            }
            (None, None) => false,
        }
    }

    pub fn save(&self) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.players)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 14, h, 0, 0).earliest().unwrap()
    }

    #[test]
    fn test_parse_steamid() {
        let s = parse_player_line("LogOnline: Player joined SteamID: 76561198000000001");
        assert_eq!(s.steamid.as_deref(), Some("76561198000000001"));
        assert!(s.name.is_none());

        let s = parse_player_line("LogNet: steamid=76561198000000002 connected");
        assert_eq!(s.steamid.as_deref(), Some("76561198000000002"));
    }

    #[test]
    fn test_parse_name() {
        let s = parse_player_line("LogVein: AddClient: Ranger42 (slot 3)");
        assert_eq!(s.name.as_deref(), Some("Ranger42"));
        assert!(s.steamid.is_none());
    }

    #[test]
    fn test_parse_ignores_short_ids() {
        let s = parse_player_line("ID: 12345");
        assert!(s.is_empty());
    }

    #[test]
    fn test_record_and_update() {
        let mut history = PlayerHistory::default();
        history.record("76561198000000001", Some("Ranger"), at(10));
        history.record("76561198000000001", Some("Ranger42"), at(12));

        let rec = &history.players()["76561198000000001"];
        assert_eq!(rec.name, "Ranger42");
        assert_eq!(rec.first_seen, "2026-10-14 10:00:00");
        assert_eq!(rec.last_seen, "2026-10-14 12:00:00");
    }

    #[test]
    fn test_pending_name_paired_with_next_id() {
        let mut history = PlayerHistory::default();
        assert!(!history.observe_line("AddClient: Scavenger", at(10)));
        assert!(history.observe_line("SteamID: 76561198000000003", at(10)));
        assert_eq!(history.players()["76561198000000003"].name, "Scavenger");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player_history.json");

        let mut history = PlayerHistory::load(&path).unwrap();
        history.record("76561198000000001", Some("Ranger"), at(10));
        history.save().unwrap();

        let loaded = PlayerHistory::load(&path).unwrap();
        assert_eq!(loaded.players(), history.players());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player_history.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(PlayerHistory::load(&path), Err(HistoryError::Json(_))));
        assert!(PlayerHistory::load_or_empty(&path).players().is_empty());
    }
}
