use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Every file the daemon reads or writes, resolved against one base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `<base>/games_config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base.join("games_config.json")
    }

    /// `<base>/death_state.json`
    pub fn state_file(&self) -> PathBuf {
        self.base.join("death_state.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.base.join("daemon.lock")
    }

    pub fn ready_file(&self) -> PathBuf {
        self.base.join("daemon.ready")
    }

    pub fn stop_file(&self) -> PathBuf {
        self.base.join("STOP")
    }

    pub fn log_file(&self) -> PathBuf {
        self.base.join("debug.log")
    }

    pub fn debug_raw_image(&self) -> PathBuf {
        self.base.join("debug_capture_raw.png")
    }

    pub fn debug_ocr_image(&self) -> PathBuf {
        self.base.join("debug_capture.png")
    }

    /// Count of the active game, read by the overlay.
    pub fn death_counter_txt(&self) -> PathBuf {
        self.base.join("death_counter.txt")
    }

    /// `<base>/death_counter_<Game_Name>.txt`. Spaces and characters Windows
    /// rejects in file names become underscores.
    pub fn game_counter_txt(&self, game: &str) -> PathBuf {
        let name: String = game
            .chars()
            .map(|c| match c {
                ' ' | '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        self.base.join(format!("death_counter_{}.txt", name))
    }

    pub fn current_game_txt(&self) -> PathBuf {
        self.base.join("current_game.txt")
    }

    pub fn current_deaths_txt(&self) -> PathBuf {
        self.base.join("current_deaths.txt")
    }

    pub fn total_deaths_txt(&self) -> PathBuf {
        self.base.join("total_deaths.txt")
    }

    /// Local Tesseract language data: `<base>/tesseract/tessdata/`
    pub fn local_tessdata_dir(&self) -> PathBuf {
        self.base.join("tesseract").join("tessdata")
    }

    /// Ensures the base directory exists. Call at startup.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)
    }
}

/// Writes `contents` to a sibling temp file, then renames it over `path`, so
/// readers see either the old or the new file, never a truncated one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Overwrites a small text file in place.
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_counter_txt_replaces_spaces() {
        let paths = Paths::new("/tmp/dc");
        assert_eq!(
            paths.game_counter_txt("Dark Souls 3"),
            PathBuf::from("/tmp/dc/death_counter_Dark_Souls_3.txt")
        );
    }

    #[test]
    fn test_game_counter_txt_replaces_reserved_characters() {
        let paths = Paths::new("/tmp/dc");
        assert_eq!(
            paths.game_counter_txt("Dark Souls II: Scholar of the First Sin"),
            PathBuf::from("/tmp/dc/death_counter_Dark_Souls_II__Scholar_of_the_First_Sin.txt")
        );
        assert_eq!(
            paths.game_counter_txt("A/B\\C?*"),
            PathBuf::from("/tmp/dc/death_counter_A_B_C__.txt")
        );
    }

    #[test]
    fn test_write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "old contents that are longer").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        // No temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
