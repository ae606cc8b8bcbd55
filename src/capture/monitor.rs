//! Monitor layout and index selection.
//!
//! Monitors are numbered the way screen-grabbing tools usually do it:
//! index 0 is the virtual screen spanning every monitor, index 1 is the
//! primary monitor, and the remaining physical monitors follow in
//! enumeration order.

use anyhow::{anyhow, Result};

/// Position and size of a monitor in virtual-screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorInfo {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
    pub primary: bool,
}

impl std::fmt::Display for MonitorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {}){}",
            self.width,
            self.height,
            self.left,
            self.top,
            if self.primary { " [primary]" } else { "" }
        )
    }
}

/// Builds the indexed monitor list from the physical monitors reported by
/// the OS: the virtual bounding box first, then the primary, then the rest.
pub fn build_monitor_list(physical: &[MonitorInfo]) -> Vec<MonitorInfo> {
    if physical.is_empty() {
        return Vec::new();
    }

    let left = physical.iter().map(|m| m.left).min().unwrap_or(0);
    let top = physical.iter().map(|m| m.top).min().unwrap_or(0);
    let right = physical
        .iter()
        .map(|m| m.left + m.width as i32)
        .max()
        .unwrap_or(0);
    let bottom = physical
        .iter()
        .map(|m| m.top + m.height as i32)
        .max()
        .unwrap_or(0);

    let mut list = Vec::with_capacity(physical.len() + 1);
    list.push(MonitorInfo {
        left,
        top,
        width: (right - left).max(0) as u32,
        height: (bottom - top).max(0) as u32,
        primary: false,
    });
    list.extend(physical.iter().filter(|m| m.primary).copied());
    list.extend(physical.iter().filter(|m| !m.primary).copied());
    list
}

/// Picks the monitor at `index`, falling back to the primary monitor (index 1)
/// with a warning when the index does not exist.
///
/// Returns the index actually used together with the monitor.
pub fn select_monitor(monitors: &[MonitorInfo], index: usize) -> Result<(usize, MonitorInfo)> {
    if let Some(monitor) = monitors.get(index) {
        return Ok((index, *monitor));
    }

    let fallback = if monitors.len() > 1 { 1 } else { 0 };
    let monitor = monitors
        .get(fallback)
        .ok_or_else(|| anyhow!("No monitors available"))?;
    log::warn!(
        "Monitor {} not found ({} available), using monitor {} instead",
        index,
        monitors.len().saturating_sub(1),
        fallback
    );
    Ok((fallback, *monitor))
}

/// Enumerates monitors through the OS and returns the indexed list.
pub fn enumerate_monitors() -> Result<Vec<MonitorInfo>> {
    let physical = platform_monitors()?;
    if physical.is_empty() {
        return Err(anyhow!("The system reported no monitors"));
    }
    Ok(build_monitor_list(&physical))
}

#[cfg(windows)]
fn platform_monitors() -> Result<Vec<MonitorInfo>> {
    super::gdi::physical_monitors()
}

#[cfg(not(windows))]
fn platform_monitors() -> Result<Vec<MonitorInfo>> {
    Err(anyhow!("Monitor enumeration is only supported on Windows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dual_layout() -> Vec<MonitorInfo> {
        vec![
            MonitorInfo {
                left: -2560,
                top: 0,
                width: 2560,
                height: 1440,
                primary: false,
            },
            MonitorInfo {
                left: 0,
                top: 0,
                width: 1920,
                height: 1080,
                primary: true,
            },
        ]
    }

    #[test]
    fn test_build_monitor_list_orders_virtual_then_primary() {
        let list = build_monitor_list(&dual_layout());
        assert_eq!(list.len(), 3);

        assert_eq!(list[0].left, -2560);
        assert_eq!(list[0].width, 2560 + 1920);
        assert_eq!(list[0].height, 1440);

        assert!(list[1].primary);
        assert_eq!(list[1].width, 1920);
        assert_eq!(list[2].left, -2560);
    }

    #[test]
    fn test_select_monitor_valid_index() {
        let list = build_monitor_list(&dual_layout());
        let (idx, mon) = select_monitor(&list, 2).unwrap();
        assert_eq!(idx, 2);
        assert_eq!(mon.width, 2560);
    }

    #[test]
    fn test_select_monitor_falls_back_to_primary() {
        let list = build_monitor_list(&dual_layout());
        let (idx, mon) = select_monitor(&list, 7).unwrap();
        assert_eq!(idx, 1);
        assert!(mon.primary);
    }

    #[test]
    fn test_select_monitor_empty_list_errors() {
        assert!(select_monitor(&[], 1).is_err());
    }
}
