//! Daemon runner - startup checks, the detection loop, and shutdown.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::capture::{self, ScreenCapture};
use crate::ocr::setup::{ensure_language_data, find_tesseract_executable};
use crate::ocr::TesseractEngine;
use crate::paths::Paths;

use super::config::{load_config, set_current_game, GameProfile};
use super::game_detect::{GameDetector, ProcessGameDetector};
use super::lock::InstanceLock;
use super::outputs::TextOutputs;
use super::state::{DaemonContext, Pipeline};
use super::store::CounterStore;

/// Chooses the game to start with: a running game, then the one saved in the
/// state file, then the config's `current_game`, then the first profile.
pub fn select_initial_game(
    profiles: &BTreeMap<String, GameProfile>,
    detected: Option<&str>,
    from_state: Option<&str>,
    from_config: Option<&str>,
) -> Option<String> {
    [detected, from_state, from_config]
        .into_iter()
        .flatten()
        .find(|name| profiles.contains_key(*name))
        .map(str::to_string)
        .or_else(|| profiles.keys().next().cloned())
}

/// Runs the daemon until the STOP file appears.
///
/// Fails early if another instance holds the lock, no valid game is
/// configured, or Tesseract and its language data cannot be found.
pub fn run_daemon(paths: &Paths) -> Result<()> {
    paths
        .ensure_directories()
        .with_context(|| format!("Failed to create {}", paths.base().display()))?;

    let mut lock = InstanceLock::acquire(&paths.lock_file())?;

    let stop_file = paths.stop_file();
    if stop_file.exists() {
        log::info!("Removing stale STOP file");
        std::fs::remove_file(&stop_file).with_context(|| {
            format!("Failed to remove stale STOP file {}", stop_file.display())
        })?;
    }

    capture::enable_dpi_awareness();

    let config = load_config(&paths.config_file());
    let settings = config.settings.clone().sanitized();
    let profiles = config.profiles()?;
    log::info!(
        "Games: {}",
        profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    let tesseract = find_tesseract_executable()?;
    log::info!("Tesseract: {}", tesseract.display());

    let mut languages: Vec<&str> = profiles
        .values()
        .flat_map(|p| p.engine.languages())
        .collect();
    languages.sort_unstable();
    languages.dedup();
    let tessdata = ensure_language_data(&paths.local_tessdata_dir(), &languages)?;

    lock.mark_ready(&paths.ready_file())?;

    let store = CounterStore::load(paths.state_file());
    let mut detector = ProcessGameDetector::new();
    let detected = detector.detect(&profiles);
    if let Some(game) = &detected {
        log::info!("Detected running game: {}", game);
    }

    let initial = select_initial_game(
        &profiles,
        detected.as_deref(),
        store.state().current_game.as_deref(),
        config.current_game.as_deref(),
    )
    .unwrap_or_default();

    // Keep the config's manual choice in sync so it does not override us later
    if config.current_game.as_deref() != Some(initial.as_str()) {
        if let Err(e) = set_current_game(&paths.config_file(), &initial) {
            log::warn!("Failed to record current game in config: {:#}", e);
        }
    }

    let pipeline = Pipeline {
        source: Box::new(ScreenCapture::new()),
        recognizer: Box::new(TesseractEngine::new(
            tesseract,
            Some(tessdata),
            Duration::from_secs_f64(settings.ocr_timeout_seconds),
        )),
        detector: Box::new(detector),
        sink: Box::new(TextOutputs::new(paths.clone())),
    };

    let mut ctx = DaemonContext::new(
        settings.clone(),
        profiles,
        &initial,
        store,
        pipeline,
        paths.clone(),
    )?;

    log::info!(
        "Daemon started: tick={}s hits={} cooldown={}s (create {} to stop)",
        settings.tick_seconds,
        settings.consecutive_hits,
        settings.cooldown_seconds,
        stop_file.display()
    );
    ctx.start();
    ctx.run(|| stop_file.exists());

    let _ = std::fs::remove_file(&stop_file);
    log::info!("Daemon stopped");
    drop(lock);
    Ok(())
}
