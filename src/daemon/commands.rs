//! One-shot CLI commands that work alongside (or without) a running daemon.

use anyhow::{anyhow, Result};
use std::fs;
use std::time::Duration;

use crate::capture::{enumerate_monitors, FrameSource, ScreenCapture};
use crate::ocr::setup::{ensure_language_data, find_tesseract_executable};
use crate::ocr::{is_death, normalize_text, preprocess_for_ocr, TesseractEngine};
use crate::paths::Paths;

use super::config::{load_config, set_current_game};
use super::lock::is_locked;
use super::outputs::{CounterSink, TextOutputs};
use super::store::{load_state, save_state};

/// Asks a running daemon to stop by creating the STOP file.
pub fn stop(paths: &Paths) -> Result<()> {
    if !is_locked(&paths.lock_file()) {
        log::info!("No daemon is running");
        return Ok(());
    }
    fs::write(paths.stop_file(), "")?;
    log::info!("Stop requested ({})", paths.stop_file().display());
    Ok(())
}

/// Zeroes every count (keeping the known games) and refreshes the sinks.
pub fn reset(paths: &Paths) -> Result<()> {
    if is_locked(&paths.lock_file()) {
        return Err(anyhow!(
            "The daemon is running; stop it first so it does not overwrite the reset"
        ));
    }

    let mut state = load_state(&paths.state_file());
    state.reset_all();
    save_state(&paths.state_file(), &state)?;

    if let Some(game) = state.current_game.clone() {
        TextOutputs::new(paths.clone()).publish(&game, &state)?;
    }
    log::info!("All death counts reset ({} games)", state.game_deaths.len());
    Ok(())
}

/// Makes `game` the active game.
///
/// A running daemon picks the change up from the config file on its next
/// auto-detect pass; otherwise the state and sinks are updated here.
pub fn switch(paths: &Paths, game: &str) -> Result<()> {
    let config = load_config(&paths.config_file());
    let profiles = config.profiles()?;
    if !profiles.contains_key(game) {
        return Err(anyhow!(
            "Unknown game \"{}\". Configured games: {}",
            game,
            profiles.keys().cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    set_current_game(&paths.config_file(), game)?;

    if is_locked(&paths.lock_file()) {
        log::info!(
            "Switch to {} requested; the running daemon will pick it up",
            game
        );
        return Ok(());
    }

    let mut state = load_state(&paths.state_file());
    state.ensure_game(game);
    state.current_game = Some(game.to_string());
    save_state(&paths.state_file(), &state)?;
    TextOutputs::new(paths.clone()).publish(game, &state)?;
    log::info!("Switched to {} ({} deaths)", game, state.deaths_for(game));
    Ok(())
}

/// Prints the persisted counts.
pub fn status(paths: &Paths) -> Result<()> {
    let state = load_state(&paths.state_file());
    let running = if is_locked(&paths.lock_file()) {
        "running"
    } else {
        "stopped"
    };

    println!("Daemon: {}", running);
    println!(
        "Current game: {}",
        state.current_game.as_deref().unwrap_or("(none)")
    );
    println!("Total deaths: {}", state.total_deaths);
    for (game, count) in &state.game_deaths {
        println!("  {:<45} {}", game, count);
    }
    Ok(())
}

/// Captures the configured region once, saves the debug images, and prints
/// what OCR reads.
pub fn capture_debug(paths: &Paths, game: Option<&str>) -> Result<()> {
    let config = load_config(&paths.config_file());
    let settings = config.settings.clone().sanitized();
    let profiles = config.profiles()?;

    let state = load_state(&paths.state_file());
    let name = game
        .map(str::to_string)
        .or(state.current_game)
        .or(config.current_game.clone())
        .ok_or_else(|| anyhow!("No game selected; pass --game"))?;
    let profile = profiles
        .get(&name)
        .ok_or_else(|| anyhow!("Unknown game \"{}\"", name))?;

    let monitor = profile.monitor(&settings);
    let mut source = ScreenCapture::new();
    let rect = source.resolve(monitor, &profile.region)?;
    log::info!("{}: region {} -> {:?} on monitor {}", name, profile.region, rect, monitor);

    let raw = source.grab(monitor, &profile.region)?;
    raw.save(paths.debug_raw_image())?;

    let (binary, info) = preprocess_for_ocr(&raw);
    binary.save(paths.debug_ocr_image())?;

    let tessdata = ensure_language_data(&paths.local_tessdata_dir(), &profile.engine.languages())?;
    let engine = TesseractEngine::new(
        find_tesseract_executable()?,
        Some(tessdata),
        Duration::from_secs_f64(settings.ocr_timeout_seconds),
    );
    let raw_text = engine.recognize_raw(&binary, &profile.engine)?;
    let text = normalize_text(&raw_text, &profile.engine);

    println!("Mode: {} (coverage {:.4})", info.mode, info.coverage);
    println!("Raw OCR: {:?}", raw_text.trim());
    println!("Normalized: {}", text);
    println!(
        "Death detected: {}",
        is_death(&text, &profile.keywords, &profile.exclusions)
    );
    println!("Saved {}", paths.debug_raw_image().display());
    println!("Saved {}", paths.debug_ocr_image().display());
    Ok(())
}

/// Prints the enumerated monitors with their indices.
pub fn monitors() -> Result<()> {
    for (i, m) in enumerate_monitors()?.iter().enumerate() {
        let label = if i == 0 { " (all monitors)" } else { "" };
        println!("{}: {}{}", i, m, label);
    }
    Ok(())
}
