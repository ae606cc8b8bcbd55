use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Common Windows installation paths for the Tesseract executable.
const COMMON_EXECUTABLES: [&str; 2] = [
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

/// Finds the Tesseract executable: PATH first, then common install paths.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    // Check PATH
    if let Ok(output) = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
    {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for path in &COMMON_EXECUTABLES {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Please install Tesseract-OCR:\n\
         1. Download from: https://github.com/UB-Mannheim/tesseract/releases\n\
         2. Run the installer (choose to add to PATH)\n\
         3. Restart the death counter"
    ))
}

/// System directories that may hold `*.traineddata`, most specific first.
fn system_tessdata_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        dirs.push(p.join("tessdata"));
        dirs.push(p);
    }

    for path in [
        r"C:\Program Files\Tesseract-OCR\tessdata",
        r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4.00/tessdata",
        "/usr/share/tessdata",
        "/usr/local/share/tessdata",
        "/opt/homebrew/share/tessdata",
    ] {
        dirs.push(PathBuf::from(path));
    }

    dirs
}

fn traineddata(dir: &Path, lang: &str) -> PathBuf {
    dir.join(format!("{}.traineddata", lang))
}

fn has_all(dir: &Path, languages: &[&str]) -> bool {
    languages.iter().all(|lang| traineddata(dir, lang).exists())
}

/// Makes sure language data for every language in `languages` is available.
///
/// Returns the tessdata directory to pass to Tesseract:
/// - the local directory if it already holds everything,
/// - a system directory if one holds everything,
/// - otherwise the local directory after copying (from a system directory)
///   or downloading each missing file.
pub fn ensure_language_data(local_dir: &Path, languages: &[&str]) -> Result<PathBuf> {
    if has_all(local_dir, languages) {
        log::info!("Tesseract language data found at: {}", local_dir.display());
        return Ok(local_dir.to_path_buf());
    }

    let system_dirs = system_tessdata_dirs();
    if let Some(dir) = system_dirs.iter().find(|d| has_all(d, languages)) {
        log::info!("Tesseract language data found at: {}", dir.display());
        return Ok(dir.clone());
    }

    fs::create_dir_all(local_dir)
        .with_context(|| format!("Failed to create {}", local_dir.display()))?;

    for lang in languages {
        let target = traineddata(local_dir, lang);
        if target.exists() {
            continue;
        }

        if let Some(source) = system_dirs
            .iter()
            .map(|d| traineddata(d, lang))
            .find(|p| p.exists())
        {
            log::info!("Copying {}.traineddata from: {}", lang, source.display());
            fs::copy(&source, &target)?;
            continue;
        }

        download_traineddata(lang, &target)?;
    }

    log::info!("Tesseract language data ready at: {}", local_dir.display());
    Ok(local_dir.to_path_buf())
}

/// Downloads `<lang>.traineddata` from the tessdata repository.
fn download_traineddata(lang: &str, target: &Path) -> Result<()> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, lang);
    log::info!("Downloading {}.traineddata...", lang);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "death-counter")
        .send()
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            lang,
            response.status()
        ));
    }

    let bytes = response.bytes()?;

    // Write next to the target and rename so a partial download never looks complete
    let partial = target.with_extension("traineddata.part");
    let mut file = fs::File::create(&partial)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&partial, target)?;

    log::info!("Downloaded {}.traineddata ({} bytes)", lang, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_dir_with_all_languages_is_used() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("eng.traineddata"), b"x").unwrap();
        fs::write(dir.path().join("jpn.traineddata"), b"x").unwrap();

        let found = ensure_language_data(dir.path(), &["jpn", "eng"]).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn test_has_all_requires_every_language() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("eng.traineddata"), b"x").unwrap();
        assert!(has_all(dir.path(), &["eng"]));
        assert!(!has_all(dir.path(), &["eng", "jpn"]));
    }
}
