//! Streak/cooldown state machine that turns noisy per-tick detections into
//! one confirmation per real death.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A death that passed the streak and cooldown checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub game: String,
}

#[derive(Debug)]
pub struct Debouncer {
    consecutive_hits: u32,
    cooldown: Duration,
    game: String,
    streak: u32,
    /// Last confirmation per game; a missing entry means never confirmed.
    last_confirmed: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new(consecutive_hits: u32, cooldown: Duration, game: &str) -> Self {
        Self {
            consecutive_hits: consecutive_hits.max(1),
            cooldown,
            game: game.to_string(),
            streak: 0,
            last_confirmed: HashMap::new(),
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Changes the active game. Resets the streak; cooldowns stay per game.
    pub fn switch_game(&mut self, game: &str) {
        if self.game != game {
            self.game = game.to_string();
            self.streak = 0;
        }
    }

    /// Folds one tick's detection result into the state.
    pub fn observe(&mut self, detected: bool, now: Instant) -> Option<Confirmation> {
        if !detected {
            self.streak = 0;
            return None;
        }

        self.streak = self.streak.saturating_add(1);
        if self.streak < self.consecutive_hits || !self.cooldown_elapsed(now) {
            return None;
        }

        self.last_confirmed.insert(self.game.clone(), now);
        self.streak = 0;
        Some(Confirmation {
            game: self.game.clone(),
        })
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_confirmed.get(&self.game) {
            Some(last) => now.saturating_duration_since(*last) >= self.cooldown,
            None => true,
        }
    }
}
