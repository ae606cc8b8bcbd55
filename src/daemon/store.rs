//! Durable per-game and total death counts (`death_state.json`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::write_atomic;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CounterState {
    pub total_deaths: u64,
    pub game_deaths: BTreeMap<String, u64>,
    pub current_game: Option<String>,
    /// Ticks processed across runs
    pub tick: u64,
}

/// Counts right after a confirmed death.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathCounts {
    pub game: String,
    pub game_deaths: u64,
    pub total_deaths: u64,
}

impl CounterState {
    /// Records one death for `game`, creating its entry if needed.
    pub fn apply_death(&mut self, game: &str) -> DeathCounts {
        let count = self.game_deaths.entry(game.to_string()).or_insert(0);
        *count += 1;
        self.total_deaths += 1;
        DeathCounts {
            game: game.to_string(),
            game_deaths: *count,
            total_deaths: self.total_deaths,
        }
    }

    /// Zeroes every count, keeping the set of known games.
    pub fn reset_all(&mut self) {
        self.total_deaths = 0;
        for count in self.game_deaths.values_mut() {
            *count = 0;
        }
    }

    pub fn deaths_for(&self, game: &str) -> u64 {
        self.game_deaths.get(game).copied().unwrap_or(0)
    }

    /// Adds a zero entry for `game` if it has none.
    pub fn ensure_game(&mut self, game: &str) {
        self.game_deaths.entry(game.to_string()).or_insert(0);
    }
}

/// Loads the state file. Missing, unreadable, or corrupt files load as
/// defaults; the latter two with a warning.
pub fn load_state(path: &Path) -> CounterState {
    if !path.exists() {
        return CounterState::default();
    }

    let parsed = fs::read_to_string(path)
        .context("Failed to read state")
        .and_then(|contents| {
            serde_json::from_str::<CounterState>(&contents).context("Failed to parse state")
        });

    match parsed {
        Ok(state) => state,
        Err(e) => {
            log::warn!("{} ({:#}). Starting from zero.", path.display(), e);
            CounterState::default()
        }
    }
}

pub fn save_state(path: &Path, state: &CounterState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    write_atomic(path, json.as_bytes())
}

/// In-memory counter state bound to its file. Memory is authoritative; a
/// failed save is logged and retried on the next one.
#[derive(Debug)]
pub struct CounterStore {
    path: PathBuf,
    state: CounterState,
}

impl CounterStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state(&path);
        Self { path, state }
    }

    pub fn state(&self) -> &CounterState {
        &self.state
    }

    pub fn apply_death(&mut self, game: &str) -> DeathCounts {
        self.state.apply_death(game)
    }

    pub fn set_current_game(&mut self, game: &str) {
        self.state.ensure_game(game);
        self.state.current_game = Some(game.to_string());
    }

    pub fn bump_tick(&mut self) -> u64 {
        self.state.tick += 1;
        self.state.tick
    }

    pub fn save(&self) -> Result<()> {
        save_state(&self.path, &self.state)
    }

    /// Saves, logging instead of failing.
    pub fn save_or_log(&self) {
        if let Err(e) = self.save() {
            log::error!("Failed to save state: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_apply_death_updates_both_counts() {
        let mut state = CounterState::default();
        state.apply_death("Elden Ring");
        state.apply_death("Elden Ring");
        let counts = state.apply_death("Sekiro");

        assert_eq!(
            counts,
            DeathCounts {
                game: "Sekiro".to_string(),
                game_deaths: 1,
                total_deaths: 3
            }
        );
        assert_eq!(state.deaths_for("Elden Ring"), 2);
        assert_eq!(
            state.total_deaths,
            state.game_deaths.values().sum::<u64>()
        );
    }

    #[test]
    fn test_reset_all_keeps_keys() {
        let mut state = CounterState::default();
        state.apply_death("Elden Ring");
        state.apply_death("Dark Souls 3");
        state.ensure_game("Sekiro");

        state.reset_all();

        assert_eq!(state.total_deaths, 0);
        assert_eq!(state.game_deaths.len(), 3);
        assert!(state.game_deaths.values().all(|&c| c == 0));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("death_state.json");

        let mut store = CounterStore::load(&path);
        store.set_current_game("Dark Souls 3");
        store.apply_death("Dark Souls 3");
        store.bump_tick();
        store.save().unwrap();

        let reloaded = CounterStore::load(&path);
        assert_eq!(reloaded.state(), store.state());
        assert_eq!(reloaded.state().current_game.as_deref(), Some("Dark Souls 3"));
    }

    #[test]
    fn test_corrupt_state_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("death_state.json");
        fs::write(&path, "{\"total_deaths\": ").unwrap();

        assert_eq!(load_state(&path), CounterState::default());
    }

    #[test]
    fn test_missing_fields_and_unknown_keys_are_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("death_state.json");
        fs::write(
            &path,
            r#"{"total_deaths": 4, "game_deaths": {"Sekiro": 4}, "streak": 1, "last_death_ts": 1700000000.5}"#,
        )
        .unwrap();

        let state = load_state(&path);
        assert_eq!(state.total_deaths, 4);
        assert_eq!(state.deaths_for("Sekiro"), 4);
        assert_eq!(state.current_game, None);
        assert_eq!(state.tick, 0);
    }
}
