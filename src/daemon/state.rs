//! Per-tick detection pipeline.
//!
//! Each tick runs: capture → preprocess → OCR → keyword match → debounce →
//! (on confirmation) counter update, save, and sink refresh.

use image::{GrayImage, RgbImage};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::capture::FrameSource;
use crate::ocr::{is_death, preprocess_for_ocr, PreprocessInfo, TextRecognizer};
use crate::paths::Paths;

use super::config::{self, DetectionSettings, GameProfile};
use super::debounce::Debouncer;
use super::game_detect::GameDetector;
use super::outputs::CounterSink;
use super::store::{CounterStore, DeathCounts};

/// What a single tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Keyword seen, streak growing or cooldown pending
    Detected { streak: u32 },
    /// OCR ran and read no keyword (includes empty text)
    NotDetected,
    /// Screen grab failed; the streak is left as it was
    CaptureFailed(String),
    /// The OCR engine failed; counted as a negative tick, so the streak resets
    OcrFailed(String),
    /// A death was confirmed and counted
    Confirmed(DeathCounts),
}

impl std::fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickOutcome::Detected { streak } => write!(f, "Detected (streak {})", streak),
            TickOutcome::NotDetected => write!(f, "Not detected"),
            TickOutcome::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            TickOutcome::OcrFailed(msg) => write!(f, "OCR failed: {}", msg),
            TickOutcome::Confirmed(c) => write!(
                f,
                "Confirmed: {} deaths in {}, {} total",
                c.game_deaths, c.game, c.total_deaths
            ),
        }
    }
}

/// The replaceable collaborators of the daemon.
pub struct Pipeline {
    pub source: Box<dyn FrameSource>,
    pub recognizer: Box<dyn TextRecognizer>,
    pub detector: Box<dyn GameDetector>,
    pub sink: Box<dyn CounterSink>,
}

/// Everything the detection loop needs, built once at startup.
pub struct DaemonContext {
    settings: DetectionSettings,
    profiles: BTreeMap<String, GameProfile>,
    active: GameProfile,
    debouncer: Debouncer,
    store: CounterStore,
    pipeline: Pipeline,
    paths: Paths,
    /// Ticks since this process started
    ticks: u64,
}

impl DaemonContext {
    /// Creates the context with `initial_game` active. Falls back to the first
    /// profile if `initial_game` is unknown.
    pub fn new(
        settings: DetectionSettings,
        profiles: BTreeMap<String, GameProfile>,
        initial_game: &str,
        store: CounterStore,
        pipeline: Pipeline,
        paths: Paths,
    ) -> anyhow::Result<Self> {
        let active = profiles
            .get(initial_game)
            .or_else(|| profiles.values().next())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No valid games configured"))?;

        let debouncer = Debouncer::new(
            settings.consecutive_hits,
            Duration::from_secs_f64(settings.cooldown_seconds),
            &active.name,
        );

        let mut ctx = Self {
            settings,
            profiles,
            active,
            debouncer,
            store,
            pipeline,
            paths,
            ticks: 0,
        };
        let name = ctx.active.name.clone();
        ctx.store.set_current_game(&name);
        Ok(ctx)
    }

    pub fn active_game(&self) -> &str {
        &self.active.name
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    /// Writes the sinks and state for the initial game.
    pub fn start(&mut self) {
        log::info!(
            "Active game: {} ({} deaths, {} total)",
            self.active.name,
            self.store.state().deaths_for(&self.active.name),
            self.store.state().total_deaths
        );
        self.log_profile();
        self.publish();
        self.store.save_or_log();
    }

    /// Makes `game` the active game. Unknown names are ignored with a warning.
    pub fn switch_game(&mut self, game: &str) {
        if game == self.active.name {
            return;
        }
        let Some(profile) = self.profiles.get(game).cloned() else {
            log::warn!("Unknown game \"{}\", staying on {}", game, self.active.name);
            return;
        };

        log::info!("Switching game: {} -> {}", self.active.name, profile.name);
        self.active = profile;
        self.log_profile();
        self.debouncer.switch_game(&self.active.name);
        self.store.set_current_game(&self.active.name);
        self.store.save_or_log();
        self.publish();

        if let Err(e) = config::set_current_game(&self.paths.config_file(), &self.active.name) {
            log::warn!("Failed to record current game in config: {:#}", e);
        }
    }

    /// Running game first, then a manual choice written to the config file.
    fn refresh_active_game(&mut self) {
        let target = self.pipeline.detector.detect(&self.profiles).or_else(|| {
            config::read_current_game(&self.paths.config_file())
                .filter(|g| self.profiles.contains_key(g))
        });
        if let Some(game) = target {
            self.switch_game(&game);
        }
    }

    /// Advances the pipeline by one tick.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.ticks += 1;
        self.store.bump_tick();

        if self.ticks % self.settings.auto_detect_every_ticks == 0 {
            self.refresh_active_game();
        }

        let debug = self.ticks % self.settings.debug_every_ticks == 0;
        let monitor = self.active.monitor(&self.settings);

        let outcome = match self.pipeline.source.grab(monitor, &self.active.region) {
            Err(e) => {
                log::warn!("Capture failed: {:#}", e);
                TickOutcome::CaptureFailed(format!("{:#}", e))
            }
            Ok(raw) => {
                let (binary, info) = preprocess_for_ocr(&raw);
                match self
                    .pipeline
                    .recognizer
                    .recognize(&binary, &self.active.engine)
                {
                    Ok(text) => {
                        let detected =
                            is_death(&text, &self.active.keywords, &self.active.exclusions);
                        if debug {
                            self.write_debug(&raw, &binary, &info, &text, detected);
                        }
                        self.observe(detected, &text, now)
                    }
                    Err(e) => {
                        log::warn!("OCR failed: {:#}", e);
                        if debug {
                            self.write_debug(&raw, &binary, &info, "", false);
                        }
                        // Same as a negative tick: the streak restarts
                        self.debouncer.observe(false, now);
                        TickOutcome::OcrFailed(format!("{:#}", e))
                    }
                }
            }
        };

        if self.ticks % self.settings.save_every_ticks == 0 {
            self.store.save_or_log();
        }

        if debug {
            log::info!(
                "Status: game={} deaths={} total={} tick={} last={}",
                self.active.name,
                self.store.state().deaths_for(&self.active.name),
                self.store.state().total_deaths,
                self.store.state().tick,
                outcome
            );
        } else {
            log::debug!("Tick {}: {}", self.ticks, outcome);
        }

        outcome
    }

    /// Feeds one match result to the debouncer and counts a confirmed death.
    fn observe(&mut self, detected: bool, text: &str, now: Instant) -> TickOutcome {
        match self.debouncer.observe(detected, now) {
            Some(confirmation) => {
                let counts = self.store.apply_death(&confirmation.game);
                log::info!(
                    "DEATH {}: {} (total {}), text='{}'",
                    counts.game,
                    counts.game_deaths,
                    counts.total_deaths,
                    text
                );
                self.store.save_or_log();
                self.publish();
                TickOutcome::Confirmed(counts)
            }
            None if detected => TickOutcome::Detected {
                streak: self.debouncer.streak(),
            },
            None => TickOutcome::NotDetected,
        }
    }

    /// Ticks until `should_stop` returns true, then saves.
    pub fn run(&mut self, mut should_stop: impl FnMut() -> bool) {
        let interval = Duration::from_secs_f64(self.settings.tick_seconds);

        while !should_stop() {
            let started = Instant::now();
            self.tick(started);
            std::thread::sleep(interval.saturating_sub(started.elapsed()));
        }

        self.shutdown();
    }

    /// Persists the final state.
    pub fn shutdown(&mut self) {
        log::info!(
            "Stopping after {} ticks; {} deaths in {}, {} total",
            self.ticks,
            self.store.state().deaths_for(&self.active.name),
            self.active.name,
            self.store.state().total_deaths
        );
        self.store.save_or_log();
    }

    fn log_profile(&self) {
        log::info!(
            "Region: {} on monitor {}; OCR lang={} whitelist={}",
            self.active.region,
            self.active.monitor(&self.settings),
            self.active.engine.language,
            self.active.engine.whitelist().unwrap_or("-")
        );
    }

    fn publish(&mut self) {
        if let Err(e) = self
            .pipeline
            .sink
            .publish(&self.active.name, self.store.state())
        {
            log::error!("Failed to write counter files: {:#}", e);
        }
    }

    fn write_debug(
        &self,
        raw: &RgbImage,
        binary: &GrayImage,
        info: &PreprocessInfo,
        text: &str,
        detected: bool,
    ) {
        log::info!(
            "[{}] mode={} coverage={:.4} text='{}' detected={}",
            self.active.name,
            info.mode,
            info.coverage,
            text,
            detected
        );
        if let Err(e) = raw.save(self.paths.debug_raw_image()) {
            log::warn!("Failed to save debug capture: {}", e);
        }
        if let Err(e) = binary.save(self.paths.debug_ocr_image()) {
            log::warn!("Failed to save debug OCR image: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Region;
    use crate::daemon::config::ConfigFile;
    use crate::daemon::store::CounterState;
    use crate::ocr::EngineConfig;
    use anyhow::{anyhow, Result};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use tempfile::tempdir;

    /// Scripted frames: `true` yields an image, `false` a capture error.
    struct FakeSource(VecDeque<bool>);

    impl FrameSource for FakeSource {
        fn grab(&mut self, _monitor: usize, _region: &Region) -> Result<RgbImage> {
            match self.0.pop_front() {
                Some(false) => Err(anyhow!("display asleep")),
                _ => Ok(RgbImage::new(320, 160)),
            }
        }
    }

    /// Scripted OCR text; `FAIL` stands for an engine error.
    struct FakeRecognizer(VecDeque<&'static str>);

    const FAIL: &str = "<engine error>";

    impl TextRecognizer for FakeRecognizer {
        fn recognize(&mut self, _img: &GrayImage, _config: &EngineConfig) -> Result<String> {
            match self.0.pop_front() {
                Some(FAIL) => Err(anyhow!("tesseract timed out")),
                text => Ok(text.unwrap_or("").to_string()),
            }
        }
    }

    struct FakeDetector(Option<String>);

    impl GameDetector for FakeDetector {
        fn detect(&mut self, _profiles: &BTreeMap<String, GameProfile>) -> Option<String> {
            self.0.clone()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Rc<RefCell<Vec<(String, u64, u64)>>>);

    impl CounterSink for RecordingSink {
        fn publish(&mut self, game: &str, state: &CounterState) -> Result<()> {
            self.0.borrow_mut().push((
                game.to_string(),
                state.deaths_for(game),
                state.total_deaths,
            ));
            Ok(())
        }
    }

    fn settings() -> DetectionSettings {
        DetectionSettings {
            tick_seconds: 0.001,
            consecutive_hits: 2,
            cooldown_seconds: 0.0,
            debug_every_ticks: 1000,
            auto_detect_every_ticks: 1000,
            save_every_ticks: 1000,
            ..DetectionSettings::default()
        }
    }

    fn context(
        paths: &Paths,
        settings: DetectionSettings,
        frames: &[bool],
        texts: &[&'static str],
        detected_game: Option<&str>,
        sink: RecordingSink,
    ) -> DaemonContext {
        let profiles = ConfigFile::default().profiles().unwrap();
        let pipeline = Pipeline {
            source: Box::new(FakeSource(frames.iter().copied().collect())),
            recognizer: Box::new(FakeRecognizer(texts.iter().copied().collect())),
            detector: Box::new(FakeDetector(detected_game.map(str::to_string))),
            sink: Box::new(sink),
        };
        DaemonContext::new(
            settings,
            profiles,
            "Elden Ring",
            CounterStore::load(paths.state_file()),
            pipeline,
            paths.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_two_hits_confirm_and_persist() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let sink = RecordingSink::default();
        let mut ctx = context(&paths, settings(), &[], &["YOUDIED", "YOUDIED"], None, sink.clone());

        let now = Instant::now();
        assert_eq!(ctx.tick(now), TickOutcome::Detected { streak: 1 });
        let outcome = ctx.tick(now + Duration::from_millis(300));
        assert_eq!(
            outcome,
            TickOutcome::Confirmed(DeathCounts {
                game: "Elden Ring".to_string(),
                game_deaths: 1,
                total_deaths: 1
            })
        );

        // Saved before the next tick
        let saved = crate::daemon::store::load_state(&paths.state_file());
        assert_eq!(saved.deaths_for("Elden Ring"), 1);
        assert_eq!(
            sink.0.borrow().last().cloned(),
            Some(("Elden Ring".to_string(), 1, 1))
        );
    }

    #[test]
    fn test_capture_failure_keeps_streak() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut ctx = context(
            &paths,
            settings(),
            &[true, false, true],
            &["YOUDIED", "YOUDIED"],
            None,
            RecordingSink::default(),
        );

        let now = Instant::now();
        assert!(matches!(ctx.tick(now), TickOutcome::Detected { .. }));
        assert!(matches!(ctx.tick(now), TickOutcome::CaptureFailed(_)));
        assert!(matches!(ctx.tick(now), TickOutcome::Confirmed(_)));
    }

    #[test]
    fn test_ocr_failure_is_reported_and_resets_streak() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut ctx = context(
            &paths,
            settings(),
            &[],
            &["YOUDIED", FAIL, "YOUDIED", "YOUDIED"],
            None,
            RecordingSink::default(),
        );

        let now = Instant::now();
        assert_eq!(ctx.tick(now), TickOutcome::Detected { streak: 1 });
        match ctx.tick(now) {
            TickOutcome::OcrFailed(msg) => assert!(msg.contains("timed out")),
            other => panic!("expected OcrFailed, got {:?}", other),
        }
        // The streak starts over after the failure
        assert_eq!(ctx.tick(now), TickOutcome::Detected { streak: 1 });
        assert!(matches!(ctx.tick(now), TickOutcome::Confirmed(_)));
    }

    #[test]
    fn test_excluded_text_is_not_detected() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut ctx = context(
            &paths,
            settings(),
            &[],
            &["ENEMYFELLED", "ENEMYFELLED", ""],
            None,
            RecordingSink::default(),
        );

        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(ctx.tick(now), TickOutcome::NotDetected);
        }
        assert_eq!(ctx.store().state().total_deaths, 0);
    }

    #[test]
    fn test_auto_detect_switches_game() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let sink = RecordingSink::default();
        let mut settings = settings();
        settings.auto_detect_every_ticks = 1;
        let mut ctx = context(&paths, settings, &[], &[], Some("Sekiro"), sink.clone());

        ctx.tick(Instant::now());

        assert_eq!(ctx.active_game(), "Sekiro");
        assert_eq!(
            ctx.store().state().current_game.as_deref(),
            Some("Sekiro")
        );
        assert_eq!(sink.0.borrow().last().map(|e| e.0.clone()), Some("Sekiro".to_string()));
        assert_eq!(
            config::read_current_game(&paths.config_file()).as_deref(),
            Some("Sekiro")
        );
    }

    #[test]
    fn test_manual_switch_from_config_file() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut settings = settings();
        settings.auto_detect_every_ticks = 2;
        let mut ctx = context(&paths, settings, &[], &[], None, RecordingSink::default());

        config::set_current_game(&paths.config_file(), "Dark Souls 3").unwrap();
        ctx.tick(Instant::now());
        assert_eq!(ctx.active_game(), "Elden Ring");
        ctx.tick(Instant::now());
        assert_eq!(ctx.active_game(), "Dark Souls 3");
    }

    #[test]
    fn test_unknown_game_is_ignored() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut ctx = context(&paths, settings(), &[], &[], None, RecordingSink::default());
        ctx.switch_game("Not A Game");
        assert_eq!(ctx.active_game(), "Elden Ring");
    }

    #[test]
    fn test_run_stops_on_predicate_and_saves() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut ctx = context(&paths, settings(), &[], &[], None, RecordingSink::default());

        let mut calls = 0;
        ctx.run(|| {
            calls += 1;
            calls > 3
        });

        let saved = crate::daemon::store::load_state(&paths.state_file());
        assert_eq!(saved.tick, 3);
        assert_eq!(saved.current_game.as_deref(), Some("Elden Ring"));
    }

    #[test]
    fn test_debug_tick_writes_images() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut settings = settings();
        settings.debug_every_ticks = 1;
        let mut ctx = context(&paths, settings, &[], &["NOTHING"], None, RecordingSink::default());

        ctx.tick(Instant::now());

        assert!(paths.debug_raw_image().exists());
        assert!(paths.debug_ocr_image().exists());
    }
}
