//! Configuration types for the daemon.
//!
//! Loads `games_config.json` at startup: global detection settings plus one
//! entry per game (capture region, keywords, OCR parameters, process names).
//! User entries are merged over the built-in game table.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::capture::{PixelRect, Region, RelativeRect};
use crate::ocr::{normalize_text, EngineConfig};
use crate::paths::write_atomic;

/// Global timing and debounce parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Seconds between ticks
    pub tick_seconds: f64,
    /// Save debug images and log OCR text every N ticks
    pub debug_every_ticks: u64,
    /// Consecutive positive ticks needed to confirm a death
    pub consecutive_hits: u32,
    /// Minimum seconds between two confirmed deaths of the same game
    pub cooldown_seconds: f64,
    /// Monitor used when a game does not name one (1 = primary)
    pub monitor_index: usize,
    /// Re-check running processes every N ticks
    pub auto_detect_every_ticks: u64,
    /// Persist the counter state every N ticks
    pub save_every_ticks: u64,
    /// Upper bound for a single Tesseract run
    pub ocr_timeout_seconds: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            tick_seconds: 0.30,
            debug_every_ticks: 30,
            consecutive_hits: 2,
            cooldown_seconds: 8.0,
            monitor_index: 1,
            auto_detect_every_ticks: 30,
            save_every_ticks: 10,
            ocr_timeout_seconds: 5.0,
        }
    }
}

impl DetectionSettings {
    /// Clamps out-of-range values to the nearest valid value, logging each fix.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        if !self.tick_seconds.is_finite() || self.tick_seconds <= 0.0 {
            log::warn!(
                "tick_seconds must be > 0 (got {}), using {}",
                self.tick_seconds,
                defaults.tick_seconds
            );
            self.tick_seconds = defaults.tick_seconds;
        }
        if self.consecutive_hits == 0 {
            log::warn!("consecutive_hits must be >= 1, using 1");
            self.consecutive_hits = 1;
        }
        if !self.cooldown_seconds.is_finite() || self.cooldown_seconds < 0.0 {
            log::warn!(
                "cooldown_seconds must be >= 0 (got {}), using 0",
                self.cooldown_seconds
            );
            self.cooldown_seconds = 0.0;
        }
        if self.debug_every_ticks == 0 {
            log::warn!("debug_every_ticks must be >= 1, using 1");
            self.debug_every_ticks = 1;
        }
        if self.auto_detect_every_ticks == 0 {
            log::warn!("auto_detect_every_ticks must be >= 1, using 1");
            self.auto_detect_every_ticks = 1;
        }
        if self.save_every_ticks == 0 {
            log::warn!("save_every_ticks must be >= 1, using 1");
            self.save_every_ticks = 1;
        }
        if !self.ocr_timeout_seconds.is_finite() || self.ocr_timeout_seconds <= 0.0 {
            log::warn!(
                "ocr_timeout_seconds must be > 0 (got {}), using {}",
                self.ocr_timeout_seconds,
                defaults.ocr_timeout_seconds
            );
            self.ocr_timeout_seconds = defaults.ocr_timeout_seconds;
        }

        self
    }
}

/// Region as written in the config file.
///
/// `use_percentages` selects fractional coordinates; when it is missing the
/// region is fractional if all four values lie in (0, 1].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RegionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_percentages: Option<bool>,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_resolution_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_resolution_height: Option<u32>,
}

impl RegionConfig {
    fn fractional(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            use_percentages: Some(true),
            left,
            top,
            width,
            height,
            base_resolution_width: None,
            base_resolution_height: None,
        }
    }

    fn looks_fractional(&self) -> bool {
        [self.left, self.top, self.width, self.height]
            .iter()
            .all(|v| *v > 0.0 && *v <= 1.0)
    }

    pub fn to_region(&self) -> Result<Region> {
        let fractional = self
            .use_percentages
            .unwrap_or_else(|| self.looks_fractional());

        let region = if fractional {
            Region::Fractional(RelativeRect {
                left: self.left,
                top: self.top,
                width: self.width,
                height: self.height,
            })
        } else {
            if self.width < 0.0 || self.height < 0.0 {
                return Err(anyhow!(
                    "region size must be positive, got {}x{}",
                    self.width,
                    self.height
                ));
            }
            let base_resolution = match (self.base_resolution_width, self.base_resolution_height) {
                (Some(w), Some(h)) => Some((w, h)),
                (None, None) => None,
                _ => {
                    return Err(anyhow!(
                        "base_resolution_width and base_resolution_height must be set together"
                    ))
                }
            };
            Region::Absolute {
                rect: PixelRect {
                    left: self.left.round() as i32,
                    top: self.top.round() as i32,
                    width: self.width.round() as u32,
                    height: self.height.round() as u32,
                },
                base_resolution,
            }
        };

        region.validate()?;
        Ok(region)
    }
}

/// One game entry as written in the config file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub region: RegionConfig,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
    #[serde(default = "default_tesseract_config")]
    pub tesseract_config: String,
    #[serde(default = "default_tesseract_lang")]
    pub tesseract_lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_index: Option<usize>,
    #[serde(default)]
    pub process_names: Vec<String>,
}

fn default_exclusions() -> Vec<String> {
    strings(&["ENEMYFELLED", "ENEMYFELLE", "TARGETDESTROYED", "TARGETDESTROYE"])
}

fn default_tesseract_config() -> String {
    "--oem 3 --psm 7 -c tessedit_char_whitelist=YOUDIEADFT".to_string()
}

fn default_tesseract_lang() -> String {
    "eng".to_string()
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Whole `games_config.json`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: DetectionSettings,
    #[serde(default)]
    pub games: BTreeMap<String, GameConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_game: Option<String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            settings: DetectionSettings::default(),
            games: builtin_games(),
            current_game: Some("Elden Ring".to_string()),
        }
    }
}

/// The built-in game table. Souls titles share the centered banner region.
pub fn builtin_games() -> BTreeMap<String, GameConfig> {
    let souls = |keywords: &[&str], processes: &[&str]| GameConfig {
        region: RegionConfig::fractional(0.2708, 0.4352, 0.4583, 0.1852),
        keywords: strings(keywords),
        exclusions: default_exclusions(),
        tesseract_config: default_tesseract_config(),
        tesseract_lang: default_tesseract_lang(),
        monitor_index: Some(2),
        process_names: strings(processes),
    };
    let ds_keywords = [
        "YOUDIED", "YOUDIE", "YOUD1ED", "YOUDlED", "YOUDI", "OUDIED", "YOUDIE0",
    ];

    let mut games = BTreeMap::new();
    games.insert(
        "Elden Ring".to_string(),
        souls(&["YOUDIED", "YOUDIE", "DIED"], &["eldenring", "elden ring"]),
    );
    games.insert(
        "Dark Souls 3".to_string(),
        souls(&ds_keywords, &["darksoulsiii", "dark souls iii"]),
    );
    games.insert(
        "Dark Souls Remastered".to_string(),
        souls(
            &ds_keywords,
            &["darksoulsremastered", "dark souls remastered"],
        ),
    );
    games.insert(
        "Dark Souls II: Scholar of the First Sin".to_string(),
        souls(&ds_keywords, &["darksoulsii", "dark souls ii", "darksouls2"]),
    );
    games.insert(
        "Sekiro".to_string(),
        GameConfig {
            region: RegionConfig::fractional(0.3802, 0.2685, 0.2240, 0.4074),
            keywords: strings(&["DEATH", "死"]),
            exclusions: default_exclusions(),
            tesseract_config: "--oem 3 --psm 7".to_string(),
            tesseract_lang: "jpn+eng".to_string(),
            monitor_index: Some(2),
            process_names: strings(&["sekiro"]),
        },
    );
    games
}

/// Validated, ready-to-use game profile.
#[derive(Clone, Debug, PartialEq)]
pub struct GameProfile {
    pub name: String,
    pub region: Region,
    pub monitor_index: Option<usize>,
    pub keywords: Vec<String>,
    pub exclusions: Vec<String>,
    pub engine: EngineConfig,
    /// Lowercased process names without `.exe`
    pub process_names: Vec<String>,
}

impl GameProfile {
    pub fn from_config(name: &str, cfg: &GameConfig) -> Result<Self> {
        let region = cfg.region.to_region()?;
        let engine = EngineConfig::parse(&cfg.tesseract_config, &cfg.tesseract_lang)?;

        // Same normalization as the OCR text they are matched against
        let normalize = |list: &[String]| -> Vec<String> {
            let mut out: Vec<String> = Vec::new();
            for s in list {
                let s = normalize_text(s, &engine);
                if !s.is_empty() && !out.contains(&s) {
                    out.push(s);
                }
            }
            out
        };

        let keywords = normalize(&cfg.keywords);
        if keywords.is_empty() {
            return Err(anyhow!("no keywords configured"));
        }

        Ok(Self {
            name: name.to_string(),
            region,
            monitor_index: cfg.monitor_index,
            keywords,
            exclusions: normalize(&cfg.exclusions),
            process_names: cfg
                .process_names
                .iter()
                .map(|p| normalize_process_name(p))
                .filter(|p| !p.is_empty())
                .collect(),
            engine,
        })
    }

    /// Monitor to capture from, falling back to the global setting.
    pub fn monitor(&self, settings: &DetectionSettings) -> usize {
        self.monitor_index.unwrap_or(settings.monitor_index)
    }
}

/// Lowercases and strips a trailing `.exe`.
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower
        .strip_suffix(".exe")
        .map(str::to_string)
        .unwrap_or(lower)
}

impl ConfigFile {
    /// Builds validated profiles. Invalid entries are logged and skipped; an
    /// empty result is an error.
    pub fn profiles(&self) -> Result<BTreeMap<String, GameProfile>> {
        let mut profiles = BTreeMap::new();
        for (name, cfg) in &self.games {
            match GameProfile::from_config(name, cfg) {
                Ok(profile) => {
                    profiles.insert(name.clone(), profile);
                }
                Err(e) => log::error!("Skipping game \"{}\": {:#}", name, e),
            }
        }

        if profiles.is_empty() {
            return Err(anyhow!("No valid games configured"));
        }
        Ok(profiles)
    }
}

/// Loads `games_config.json` and merges it over the built-in games.
///
/// A missing file is created with the defaults. An unreadable or unparseable
/// file is left untouched and the defaults are used.
pub fn load_config(path: &Path) -> ConfigFile {
    log::info!("Looking for config at: {}", path.display());

    if !path.exists() {
        log::info!("Config not found, writing defaults");
        let config = ConfigFile::default();
        if let Err(e) = save_config(path, &config) {
            log::warn!("Failed to write default config: {:#}", e);
        }
        return config;
    }

    let parsed = fs::read_to_string(path)
        .context("Failed to read config")
        .and_then(|contents| {
            serde_json::from_str::<ConfigFile>(&contents).context("Failed to parse config")
        });

    match parsed {
        Ok(mut config) => {
            for (name, game) in builtin_games() {
                config.games.entry(name).or_insert(game);
            }
            log::info!("Config loaded ({} games)", config.games.len());
            config
        }
        Err(e) => {
            log::warn!("{:#}. Using defaults.", e);
            ConfigFile::default()
        }
    }
}

pub fn save_config(path: &Path, config: &ConfigFile) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    write_atomic(path, json.as_bytes())
}

/// Reads only the `current_game` field, used to pick up manual switches.
pub fn read_current_game(path: &Path) -> Option<String> {
    #[derive(Deserialize)]
    struct CurrentGameOnly {
        #[serde(default)]
        current_game: Option<String>,
    }

    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str::<CurrentGameOnly>(&contents)
        .ok()?
        .current_game
}

/// Sets `current_game` in the config file, leaving every other key as written.
pub fn set_current_game(path: &Path, game: &str) -> Result<()> {
    let mut root = match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str::<serde_json::Value>(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
        Err(_) => serde_json::json!({}),
    };

    let obj = root
        .as_object_mut()
        .ok_or_else(|| anyhow!("{} is not a JSON object", path.display()))?;
    obj.insert(
        "current_game".to_string(),
        serde_json::Value::String(game.to_string()),
    );

    let json = serde_json::to_string_pretty(&root)?;
    write_atomic(path, json.as_bytes())
}
