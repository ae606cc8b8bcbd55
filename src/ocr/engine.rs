use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use regex::Regex;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

use super::TextRecognizer;

/// How often a running Tesseract process is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tesseract parameters for one game, parsed from a config string such as
/// `--oem 3 --psm 7 -c tessedit_char_whitelist=YOUDIEADFT`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Languages passed to `-l`, e.g. `eng` or `jpn+eng`
    pub language: String,
    /// OCR engine mode (`--oem`)
    pub oem: Option<u8>,
    /// Page segmentation mode (`--psm`)
    pub psm: Option<u8>,
    /// `-c name=value` variables, in order of appearance
    pub variables: Vec<(String, String)>,
}

impl EngineConfig {
    pub fn parse(config: &str, language: &str) -> Result<Self> {
        let oem_re = Regex::new(r"--oem\s+(\d+)")?;
        let psm_re = Regex::new(r"--psm\s+(\d+)")?;
        let var_re = Regex::new(r"-c\s+([A-Za-z_][A-Za-z0-9_]*)=(\S+)")?;

        let number = |re: &Regex, name: &str| -> Result<Option<u8>> {
            match re.captures(config) {
                Some(caps) => {
                    let value = caps[1]
                        .parse::<u8>()
                        .with_context(|| format!("Invalid {} value in \"{}\"", name, config))?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        };

        let oem = number(&oem_re, "--oem")?;
        let psm = number(&psm_re, "--psm")?;
        let variables = var_re
            .captures_iter(config)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect();

        let language = language.trim();
        if language.is_empty() {
            return Err(anyhow!("Tesseract language must not be empty"));
        }

        Ok(Self {
            language: language.to_string(),
            oem,
            psm,
            variables,
        })
    }

    /// Character whitelist, if one is configured.
    pub fn whitelist(&self) -> Option<&str> {
        self.variables
            .iter()
            .find(|(name, _)| name == "tessedit_char_whitelist")
            .map(|(_, value)| value.as_str())
    }

    /// True for plain English models (`eng`, `eng_best`, ...) without a
    /// second language joined by `+`.
    pub fn is_latin_only(&self) -> bool {
        self.language == "eng" || (self.language.starts_with("eng") && !self.language.contains('+'))
    }

    /// Individual language codes, e.g. `["jpn", "eng"]` for `jpn+eng`.
    pub fn languages(&self) -> Vec<&str> {
        self.language
            .split('+')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["-l".to_string(), self.language.clone()];
        if let Some(oem) = self.oem {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }
        if let Some(psm) = self.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }
        for (name, value) in &self.variables {
            args.push("-c".to_string());
            args.push(format!("{}={}", name, value));
        }
        args
    }
}

/// Normalizes raw OCR output for keyword matching.
///
/// Latin-only models keep alphabetic characters and uppercase them, so
/// `"You  Died!\n"` becomes `"YOUDIED"`. Other languages only drop whitespace.
pub fn normalize_text(raw: &str, config: &EngineConfig) -> String {
    if config.is_latin_only() {
        raw.chars()
            .filter(|c| c.is_alphabetic())
            .flat_map(char::to_uppercase)
            .collect()
    } else {
        raw.chars().filter(|c| !c.is_whitespace()).collect()
    }
}

/// Runs the external Tesseract executable.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(executable: PathBuf, tessdata: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable,
            tessdata,
            timeout,
        }
    }

    /// Runs Tesseract on `img` and returns its raw stdout.
    pub fn recognize_raw(&self, img: &GrayImage, config: &EngineConfig) -> Result<String> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())
            .context("Failed to write OCR input image")?;

        let mut command = Command::new(&self.executable);
        command.arg(temp_input.path()).arg("stdout");
        if let Some(tessdata) = &self.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        command
            .args(config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start {}", self.executable.display()))?;

        let started = Instant::now();
        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!(
                    "Tesseract timed out after {:.1}s",
                    self.timeout.as_secs_f64()
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed ({}): {}", output.status, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl TextRecognizer for TesseractEngine {
    fn recognize(&mut self, img: &GrayImage, config: &EngineConfig) -> Result<String> {
        let raw = self.recognize_raw(img, config)?;
        Ok(normalize_text(&raw, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let cfg = EngineConfig::parse(
            "--oem 3 --psm 7 -c tessedit_char_whitelist=YOUDIEADFT",
            "eng",
        )
        .unwrap();
        assert_eq!(cfg.oem, Some(3));
        assert_eq!(cfg.psm, Some(7));
        assert_eq!(cfg.whitelist(), Some("YOUDIEADFT"));
        assert_eq!(
            cfg.args(),
            vec![
                "-l",
                "eng",
                "--oem",
                "3",
                "--psm",
                "7",
                "-c",
                "tessedit_char_whitelist=YOUDIEADFT"
            ]
        );
    }

    #[test]
    fn test_parse_without_whitelist() {
        let cfg = EngineConfig::parse("--oem 3 --psm 7", "jpn+eng").unwrap();
        assert_eq!(cfg.whitelist(), None);
        assert_eq!(cfg.languages(), vec!["jpn", "eng"]);
        assert!(!cfg.is_latin_only());
    }

    #[test]
    fn test_parse_rejects_empty_language() {
        assert!(EngineConfig::parse("--psm 7", "  ").is_err());
    }

    #[test]
    fn test_normalize_latin_keeps_letters_uppercased() {
        let cfg = EngineConfig::parse("--psm 7", "eng").unwrap();
        assert_eq!(normalize_text("You  Died!\n", &cfg), "YOUDIED");
        assert_eq!(normalize_text("Y0U D1ED", &cfg), "YUDED");
    }

    #[test]
    fn test_normalize_mixed_language_strips_whitespace_only() {
        let cfg = EngineConfig::parse("--psm 7", "jpn+eng").unwrap();
        assert_eq!(normalize_text(" 死 \n", &cfg), "死");
        assert_eq!(normalize_text("De ath1", &cfg), "Death1");
    }

    #[test]
    fn test_missing_executable_is_an_error() {
        let mut engine = TesseractEngine::new(
            PathBuf::from("definitely-not-a-tesseract-binary"),
            None,
            Duration::from_secs(1),
        );
        let cfg = EngineConfig::parse("--psm 7", "eng").unwrap();
        let img = GrayImage::new(10, 10);
        assert!(engine.recognize_raw(&img, &cfg).is_err());
        let err = engine.recognize(&img, &cfg).unwrap_err();
        assert!(format!("{:#}", err).contains("definitely-not-a-tesseract-binary"));
    }
}
