pub mod engine;
pub mod matcher;
pub mod preprocess;
pub mod setup;

use anyhow::Result;
use image::GrayImage;

pub use engine::{normalize_text, EngineConfig, TesseractEngine};
pub use matcher::is_death;
pub use preprocess::{preprocess_for_ocr, PreprocessInfo};

/// Turns a preprocessed image into normalized text.
///
/// `Ok("")` means the engine ran and read nothing; engine failures (spawn,
/// exit status, timeout) are errors.
pub trait TextRecognizer {
    fn recognize(&mut self, img: &GrayImage, config: &EngineConfig) -> Result<String>;
}
