//! GDI-based desktop capture and monitor enumeration (Windows only).

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Rgb, RgbImage};

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
    EnumDisplayMonitors, GetDC, GetDIBits, GetMonitorInfoW, ReleaseDC, SelectObject, BITMAPINFO,
    BITMAPINFOHEADER, BI_RGB, CAPTUREBLT, DIB_RGB_COLORS, HDC, HGDIOBJ, HMONITOR, MONITORINFO,
    SRCCOPY,
};
use windows::Win32::UI::HiDpi::{SetProcessDpiAwareness, PROCESS_PER_MONITOR_DPI_AWARE};

use super::monitor::MonitorInfo;
use super::region::PixelRect;

/// `MONITORINFOF_PRIMARY` flag in `MONITORINFO::dwFlags`.
const MONITOR_PRIMARY_FLAG: u32 = 1;

/// Opts the process into per-monitor DPI awareness so captured coordinates
/// match physical pixels on scaled displays.
pub fn enable_dpi_awareness() {
    // Fails harmlessly when awareness was already set (e.g. by a manifest)
    if let Err(e) = unsafe { SetProcessDpiAwareness(PROCESS_PER_MONITOR_DPI_AWARE) } {
        log::debug!("SetProcessDpiAwareness: {}", e);
    }
}

/// Lists the physical monitors in OS enumeration order.
pub fn physical_monitors() -> Result<Vec<MonitorInfo>> {
    unsafe extern "system" fn enum_callback(
        hmonitor: HMONITOR,
        _hdc: HDC,
        _rect: *mut RECT,
        lparam: LPARAM,
    ) -> BOOL {
        unsafe {
            let monitors = &mut *(lparam.0 as *mut Vec<MonitorInfo>);

            let mut info = MONITORINFO {
                cbSize: std::mem::size_of::<MONITORINFO>() as u32,
                ..Default::default()
            };
            if !GetMonitorInfoW(hmonitor, &mut info).as_bool() {
                return TRUE;
            }

            let rc = info.rcMonitor;
            monitors.push(MonitorInfo {
                left: rc.left,
                top: rc.top,
                width: (rc.right - rc.left).max(0) as u32,
                height: (rc.bottom - rc.top).max(0) as u32,
                primary: info.dwFlags & MONITOR_PRIMARY_FLAG != 0,
            });
            TRUE
        }
    }

    let mut monitors: Vec<MonitorInfo> = Vec::new();
    let ok = unsafe {
        EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(enum_callback),
            LPARAM(&mut monitors as *mut _ as isize),
        )
    };
    if !ok.as_bool() {
        return Err(anyhow!("EnumDisplayMonitors failed"));
    }
    Ok(monitors)
}

/// Copies a rectangle of the desktop into an RGB image.
pub fn grab_rect(rect: &PixelRect) -> Result<RgbImage> {
    let width = rect.width as i32;
    let height = rect.height as i32;
    if width <= 0 || height <= 0 {
        return Err(anyhow!("Capture rectangle is empty: {}x{}", rect.width, rect.height));
    }

    unsafe {
        let screen_dc = GetDC(HWND::default());
        if screen_dc.is_invalid() {
            return Err(anyhow!("GetDC failed for the desktop"));
        }

        let mem_dc = CreateCompatibleDC(screen_dc);
        let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
        let previous = SelectObject(mem_dc, HGDIOBJ(bitmap.0));

        let result = copy_pixels(screen_dc, mem_dc, bitmap, rect);

        SelectObject(mem_dc, previous);
        let _ = DeleteObject(HGDIOBJ(bitmap.0));
        let _ = DeleteDC(mem_dc);
        ReleaseDC(HWND::default(), screen_dc);

        result
    }
}

unsafe fn copy_pixels(
    screen_dc: HDC,
    mem_dc: HDC,
    bitmap: windows::Win32::Graphics::Gdi::HBITMAP,
    rect: &PixelRect,
) -> Result<RgbImage> {
    let width = rect.width as i32;
    let height = rect.height as i32;

    unsafe {
        BitBlt(
            mem_dc,
            0,
            0,
            width,
            height,
            screen_dc,
            rect.left,
            rect.top,
            SRCCOPY | CAPTUREBLT,
        )?;

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                // Negative height: top-down rows
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut buffer = vec![0u8; (width * height * 4) as usize];
        let lines = GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            Some(buffer.as_mut_ptr() as *mut _),
            &mut info,
            DIB_RGB_COLORS,
        );
        if lines == 0 {
            return Err(anyhow!("GetDIBits returned no scan lines"));
        }

        // BGRA -> RGB
        let img: RgbImage = ImageBuffer::from_fn(rect.width, rect.height, |x, y| {
            let offset = ((y * rect.width + x) * 4) as usize;
            Rgb([buffer[offset + 2], buffer[offset + 1], buffer[offset]])
        });
        Ok(img)
    }
}
