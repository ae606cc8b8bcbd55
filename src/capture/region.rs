//! Capture region descriptors and their resolution to absolute screen pixels.

use anyhow::{anyhow, Result};

use super::monitor::MonitorInfo;

/// A rectangle in absolute screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// A rectangle in relative coordinates (0.0 to 1.0) of the monitor it is
/// captured from. Works unchanged across resolutions and ultrawide layouts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub left: f64,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub top: f64,
    /// Width as fraction of monitor width
    pub width: f64,
    /// Height as fraction of monitor height
    pub height: f64,
}

/// Where on the selected monitor to capture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Region {
    /// Pixel offsets from the monitor origin. When `base_resolution` is set the
    /// rectangle was measured on a monitor of that size and is scaled to the
    /// actual one.
    Absolute {
        rect: PixelRect,
        base_resolution: Option<(u32, u32)>,
    },
    Fractional(RelativeRect),
}

impl Region {
    /// Checks the region invariants: positive size, fractions within (0, 1].
    pub fn validate(&self) -> Result<()> {
        match self {
            Region::Absolute {
                rect,
                base_resolution,
            } => {
                if rect.width == 0 || rect.height == 0 {
                    return Err(anyhow!(
                        "region size must be positive, got {}x{}",
                        rect.width,
                        rect.height
                    ));
                }
                if let Some((w, h)) = base_resolution {
                    if *w == 0 || *h == 0 {
                        return Err(anyhow!("base resolution must be positive, got {}x{}", w, h));
                    }
                }
                Ok(())
            }
            Region::Fractional(r) => {
                let in_range = |v: f64| v > 0.0 && v <= 1.0;
                // left/top may sit exactly on the monitor edge
                let origin_ok = |v: f64| (0.0..=1.0).contains(&v);
                if !origin_ok(r.left) || !origin_ok(r.top) || !in_range(r.width) || !in_range(r.height)
                {
                    return Err(anyhow!(
                        "fractional region values must lie in (0, 1], got left={} top={} width={} height={}",
                        r.left,
                        r.top,
                        r.width,
                        r.height
                    ));
                }
                Ok(())
            }
        }
    }

    /// Converts the region to absolute screen pixels on `monitor`.
    pub fn resolve(&self, monitor: &MonitorInfo) -> PixelRect {
        let mon_w = monitor.width as f64;
        let mon_h = monitor.height as f64;

        match self {
            Region::Fractional(r) => PixelRect {
                left: monitor.left + (r.left * mon_w) as i32,
                top: monitor.top + (r.top * mon_h) as i32,
                width: (r.width * mon_w) as u32,
                height: (r.height * mon_h) as u32,
            },
            Region::Absolute {
                rect,
                base_resolution: Some((base_w, base_h)),
            } => {
                let scale_x = mon_w / *base_w as f64;
                let scale_y = mon_h / *base_h as f64;
                PixelRect {
                    left: monitor.left + (rect.left as f64 * scale_x) as i32,
                    top: monitor.top + (rect.top as f64 * scale_y) as i32,
                    width: (rect.width as f64 * scale_x) as u32,
                    height: (rect.height as f64 * scale_y) as u32,
                }
            }
            Region::Absolute {
                rect,
                base_resolution: None,
            } => PixelRect {
                left: monitor.left + rect.left,
                top: monitor.top + rect.top,
                width: rect.width,
                height: rect.height,
            },
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Fractional(r) => write!(
                f,
                "{:.4},{:.4} {:.4}x{:.4} (fraction of monitor)",
                r.left, r.top, r.width, r.height
            ),
            Region::Absolute {
                rect,
                base_resolution,
            } => {
                write!(f, "{},{} {}x{} px", rect.left, rect.top, rect.width, rect.height)?;
                if let Some((w, h)) = base_resolution {
                    write!(f, " (measured at {}x{})", w, h)?;
                }
                Ok(())
            }
        }
    }
}
