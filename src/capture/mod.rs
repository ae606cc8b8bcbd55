//! Screen capture of configured regions.
//!
//! This module provides:
//! - Monitor enumeration and index selection (`monitor`)
//! - Region descriptors and pixel resolution (`region`)
//! - Desktop grabbing (`ScreenCapture`)

#[cfg(windows)]
mod gdi;
pub mod monitor;
pub mod region;
pub mod screen;

use anyhow::Result;
use image::RgbImage;

pub use monitor::enumerate_monitors;
pub use region::{PixelRect, Region, RelativeRect};
pub use screen::ScreenCapture;

/// Source of raw frames for the detection loop.
pub trait FrameSource {
    /// Captures `region` on the monitor at `monitor_index`.
    fn grab(&mut self, monitor_index: usize, region: &Region) -> Result<RgbImage>;
}

/// Makes captured coordinates match physical pixels on scaled displays.
#[cfg(windows)]
pub fn enable_dpi_awareness() {
    gdi::enable_dpi_awareness();
}

#[cfg(not(windows))]
pub fn enable_dpi_awareness() {}
