//! Monitor enumeration. Runs once on the worker thread at engine start;
//! sessions are keyed by the enumeration index, which follows the
//! `EnumDisplayMonitors` callback order.

use anyhow::{bail, Result};
use windows::{
    core::{BOOL, PCWSTR},
    Win32::{
        Foundation::{LPARAM, RECT},
        Graphics::Gdi::{
            EnumDisplayMonitors, EnumDisplaySettingsW, GetMonitorInfoW, DEVMODEW,
            ENUM_CURRENT_SETTINGS, HDC, HMONITOR, MONITORINFO, MONITORINFOEXW,
            MONITORINFOF_PRIMARY,
        },
    },
};

/// One attached display as seen at enumeration time.
#[derive(Debug, Clone)]
pub struct MonitorTarget {
    pub handle: HMONITOR,
    pub index: usize,
    /// Desktop coordinates of the top-left corner; negative for monitors
    /// left of or above the primary.
    pub origin: (i32, i32),
    pub size: (i32, i32),
    pub refresh_hz: u32,
    pub primary: bool,
    pub device_name: String,
}

pub fn enumerate() -> Result<Vec<MonitorTarget>> {
    let mut monitors: Vec<MonitorTarget> = Vec::new();
    unsafe {
        let _ = EnumDisplayMonitors(
            None,
            None,
            Some(collect_monitor),
            LPARAM(&mut monitors as *mut _ as isize),
        );
    }
    if monitors.is_empty() {
        bail!("no active monitors enumerated");
    }
    Ok(monitors)
}

unsafe extern "system" fn collect_monitor(
    handle: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let monitors = &mut *(lparam.0 as *mut Vec<MonitorTarget>);

    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
    if GetMonitorInfoW(handle, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO).as_bool() {
        let rect = info.monitorInfo.rcMonitor;
        let device_name = utf16_name(&info.szDevice);

        // Current mode refresh rate; duplication refines this later from
        // the output description.
        let mut mode = DEVMODEW {
            dmSize: std::mem::size_of::<DEVMODEW>() as u16,
            ..Default::default()
        };
        let refresh_hz = if EnumDisplaySettingsW(
            PCWSTR(info.szDevice.as_ptr()),
            ENUM_CURRENT_SETTINGS,
            &mut mode,
        )
        .as_bool()
            && mode.dmDisplayFrequency > 1
        {
            mode.dmDisplayFrequency
        } else {
            60
        };

        monitors.push(MonitorTarget {
            handle,
            index: monitors.len(),
            origin: (rect.left, rect.top),
            size: (rect.right - rect.left, rect.bottom - rect.top),
            refresh_hz,
            primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
            device_name,
        });
    }

    true.into()
}

fn utf16_name(raw: &[u16]) -> String {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_name_stops_at_the_terminator() {
        let mut raw = [0u16; 32];
        for (i, c) in "\\\\.\\DISPLAY1".encode_utf16().enumerate() {
            raw[i] = c;
        }
        assert_eq!(utf16_name(&raw), "\\\\.\\DISPLAY1");
        assert_eq!(utf16_name(&[0u16; 4]), "");
        // No terminator takes the whole slice.
        let full = [0x41u16; 3];
        assert_eq!(utf16_name(&full), "AAA");
    }
}
