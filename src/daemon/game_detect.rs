//! Picks the active game from running processes.

use std::collections::{BTreeMap, HashSet};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use super::config::{normalize_process_name, GameProfile};

/// Reports which configured game, if any, is currently running.
pub trait GameDetector {
    fn detect(&mut self, profiles: &BTreeMap<String, GameProfile>) -> Option<String>;
}

/// Scans the process table through `sysinfo`.
pub struct ProcessGameDetector {
    system: System,
}

impl ProcessGameDetector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn running_processes(&mut self) -> HashSet<String> {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::new());
        self.system
            .processes()
            .values()
            .map(|p| normalize_process_name(&p.name().to_string_lossy()))
            .collect()
    }
}

impl Default for ProcessGameDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GameDetector for ProcessGameDetector {
    fn detect(&mut self, profiles: &BTreeMap<String, GameProfile>) -> Option<String> {
        let running = self.running_processes();
        match_running_game(&running, profiles)
    }
}

/// First profile (in name order) with a process in `running`.
pub fn match_running_game(
    running: &HashSet<String>,
    profiles: &BTreeMap<String, GameProfile>,
) -> Option<String> {
    profiles
        .values()
        .find(|profile| profile.process_names.iter().any(|p| running.contains(p)))
        .map(|profile| profile.name.clone())
}
