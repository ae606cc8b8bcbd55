//! Text-file sinks for overlays and chat bots.
//!
//! Every file is overwritten with a single value, so readers always see the
//! latest count.

use anyhow::{anyhow, Result};

use crate::paths::{write_text, Paths};

use super::store::CounterState;

/// Receives the counts whenever they change or the active game switches.
pub trait CounterSink {
    fn publish(&mut self, game: &str, state: &CounterState) -> Result<()>;
}

/// Writes the five counter text files into the base directory.
pub struct TextOutputs {
    paths: Paths,
}

impl TextOutputs {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }
}

impl CounterSink for TextOutputs {
    fn publish(&mut self, game: &str, state: &CounterState) -> Result<()> {
        let game_deaths = state.deaths_for(game).to_string();
        let total = state.total_deaths.to_string();

        let files = [
            (self.paths.death_counter_txt(), game_deaths.as_str()),
            (self.paths.game_counter_txt(game), game_deaths.as_str()),
            (self.paths.current_game_txt(), game),
            (self.paths.current_deaths_txt(), game_deaths.as_str()),
            (self.paths.total_deaths_txt(), total.as_str()),
        ];

        // One bad file must not leave the others stale
        let failed: Vec<String> = files
            .iter()
            .filter_map(|(path, contents)| write_text(path, contents).err())
            .map(|e| format!("{:#}", e))
            .collect();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{}", failed.join("; ")))
        }
    }
}
