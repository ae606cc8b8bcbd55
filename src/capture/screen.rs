//! Screen-region capture used by the detection loop.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::monitor::{enumerate_monitors, select_monitor, MonitorInfo};
use super::region::{PixelRect, Region};
use super::FrameSource;

/// Captures smaller than this are upscaled 2x before preprocessing.
const SMALL_CAPTURE_WIDTH: u32 = 200;
const SMALL_CAPTURE_HEIGHT: u32 = 100;

/// Grabs configured regions from the desktop.
///
/// The monitor layout is enumerated lazily and re-enumerated after a failed
/// grab so that hot-plugged monitors are picked up on the next tick.
pub struct ScreenCapture {
    monitors: Vec<MonitorInfo>,
}

impl ScreenCapture {
    pub fn new() -> Self {
        let monitors = match enumerate_monitors() {
            Ok(list) => {
                for (i, m) in list.iter().enumerate() {
                    log::info!("Monitor {}: {}", i, m);
                }
                list
            }
            Err(e) => {
                log::warn!("Could not enumerate monitors: {:#}", e);
                Vec::new()
            }
        };
        Self { monitors }
    }

    fn monitors(&mut self) -> Result<&[MonitorInfo]> {
        if self.monitors.is_empty() {
            self.monitors = enumerate_monitors()?;
        }
        Ok(&self.monitors)
    }

    /// Resolves `region` on the monitor at `monitor_index`.
    pub fn resolve(&mut self, monitor_index: usize, region: &Region) -> Result<PixelRect> {
        let (_, monitor) = select_monitor(self.monitors()?, monitor_index)?;
        let rect = region.resolve(&monitor);
        if rect.width == 0 || rect.height == 0 {
            return Err(anyhow!(
                "Region {} resolves to an empty rectangle on monitor {}",
                region,
                monitor
            ));
        }
        Ok(rect)
    }
}

impl Default for ScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScreenCapture {
    fn grab(&mut self, monitor_index: usize, region: &Region) -> Result<RgbImage> {
        let rect = self.resolve(monitor_index, region)?;
        match grab_rect(&rect) {
            Ok(img) => Ok(upscale_small(img)),
            Err(e) => {
                // Layout may have changed; enumerate again next time
                self.monitors.clear();
                Err(e)
            }
        }
    }
}

/// Doubles tiny captures with Lanczos resampling.
pub fn upscale_small(img: RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    if w < SMALL_CAPTURE_WIDTH || h < SMALL_CAPTURE_HEIGHT {
        imageops::resize(&img, w * 2, h * 2, FilterType::Lanczos3)
    } else {
        img
    }
}

#[cfg(windows)]
fn grab_rect(rect: &PixelRect) -> Result<RgbImage> {
    super::gdi::grab_rect(rect)
}

#[cfg(not(windows))]
fn grab_rect(_rect: &PixelRect) -> Result<RgbImage> {
    Err(anyhow!("Screen capture is only supported on Windows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upscale_small_doubles_narrow_capture() {
        let img = RgbImage::new(150, 120);
        assert_eq!(upscale_small(img).dimensions(), (300, 240));
    }

    #[test]
    fn test_upscale_small_doubles_short_capture() {
        let img = RgbImage::new(400, 80);
        assert_eq!(upscale_small(img).dimensions(), (800, 160));
    }

    #[test]
    fn test_upscale_small_keeps_large_capture() {
        let img = RgbImage::new(880, 200);
        assert_eq!(upscale_small(img).dimensions(), (880, 200));
    }
}
