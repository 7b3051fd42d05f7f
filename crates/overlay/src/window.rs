//! Per-monitor overlay windows.
//!
//! Each corrected monitor gets a borderless layered window spanning the whole
//! output. The window is click-through, excluded from desktop capture so the
//! overlay never feeds back into its own input, and starts fully transparent
//! until the first corrected frame has been composed.

use anyhow::Result;

use lumaveil_core::log_warn;

use windows::{
    core::*,
    Win32::{
        Foundation::*,
        System::{LibraryLoader::GetModuleHandleW, Power::*},
        UI::WindowsAndMessaging::*,
    },
};

use crate::monitor::MonitorTarget;

pub const CLASS_NAME: PCWSTR = w!("LumaVeilOverlay");

/// GUID_CONSOLE_DISPLAY_STATE, delivered through WM_POWERBROADCAST once
/// registered: 0 off, 1 on, 2 dimmed.
const CONSOLE_DISPLAY_STATE: GUID = GUID::from_values(
    0x6fe6_9556,
    0x704a,
    0x47a0,
    [0x8f, 0x24, 0xc2, 0x8d, 0x93, 0x6f, 0xda, 0x47],
);

/// Registers the shared overlay window class. Re-registration after an engine
/// restart fails with the class still in place, which CreateWindowExW accepts.
pub fn register_class(wnd_proc: WNDPROC) -> Result<()> {
    unsafe {
        let hinstance = GetModuleHandleW(None)?;
        let class = WNDCLASSW {
            lpfnWndProc: wnd_proc,
            hInstance: hinstance.into(),
            lpszClassName: CLASS_NAME,
            ..Default::default()
        };
        RegisterClassW(&class);
    }
    Ok(())
}

pub struct OverlayWindow {
    hwnd: HWND,
}

impl OverlayWindow {
    pub fn create(target: &MonitorTarget) -> Result<Self> {
        unsafe {
            let hinstance = GetModuleHandleW(None)?;
            let title = HSTRING::from(format!("LumaVeil monitor {}", target.index));

            // Tool window keeps the overlay off the taskbar and out of alt-tab.
            let hwnd = CreateWindowExW(
                WS_EX_LAYERED
                    | WS_EX_TRANSPARENT
                    | WS_EX_TOPMOST
                    | WS_EX_NOACTIVATE
                    | WS_EX_TOOLWINDOW,
                CLASS_NAME,
                &title,
                WS_POPUP,
                target.origin.0,
                target.origin.1,
                target.size.0,
                target.size.1,
                None,
                None,
                Some(HINSTANCE(hinstance.0)),
                None,
            )?;

            // Without the exclusion the overlay captures its own output and
            // the correction compounds every frame.
            if let Err(err) = SetWindowDisplayAffinity(hwnd, WDA_EXCLUDEFROMCAPTURE) {
                log_warn!(
                    "Monitor {}: capture exclusion unavailable: {err}",
                    target.index
                );
            }

            // Fully transparent until the first corrected frame is committed.
            SetLayeredWindowAttributes(hwnd, COLORREF(0), 0, LWA_ALPHA)?;

            Ok(Self { hwnd })
        }
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    /// Shows the window without taking focus. Called one frame after the
    /// composition commit so the first visible frame is already corrected.
    pub fn reveal(&self) {
        unsafe {
            let _ = SetLayeredWindowAttributes(self.hwnd, COLORREF(0), 255, LWA_ALPHA);
            let _ = ShowWindow(self.hwnd, SW_SHOWNA);
        }
    }

    pub fn hide(&self) {
        unsafe {
            let _ = ShowWindow(self.hwnd, SW_HIDE);
        }
    }

    /// Drops the window back to zero alpha. The next reveal raises it again.
    pub fn make_transparent(&self) {
        unsafe {
            let _ = SetLayeredWindowAttributes(self.hwnd, COLORREF(0), 0, LWA_ALPHA);
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        unsafe {
            let _ = SetWindowPos(
                self.hwnd,
                None,
                0,
                0,
                width as i32,
                height as i32,
                SWP_NOMOVE | SWP_NOZORDER | SWP_NOACTIVATE,
            );
        }
    }

    /// Fullscreen apps climb the z-order on focus changes; the render loop
    /// pushes the overlay back on a timer.
    pub fn reassert_topmost(&self) {
        unsafe {
            let _ = SetWindowPos(
                self.hwnd,
                Some(HWND_TOPMOST),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            );
        }
    }
}

impl Drop for OverlayWindow {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyWindow(self.hwnd);
        }
    }
}

/// Display power notifications for one window. Dropping unregisters.
pub struct PowerNotification {
    handle: HPOWERNOTIFY,
}

impl PowerNotification {
    pub fn register(hwnd: HWND) -> Result<Self> {
        let handle = unsafe {
            RegisterPowerSettingNotification(
                HANDLE(hwnd.0),
                &CONSOLE_DISPLAY_STATE,
                DEVICE_NOTIFY_WINDOW_HANDLE,
            )?
        };
        Ok(Self { handle })
    }
}

impl Drop for PowerNotification {
    fn drop(&mut self) {
        unsafe {
            let _ = UnregisterPowerSettingNotification(self.handle);
        }
    }
}

/// Extracts the display state from a PBT_POWERSETTINGCHANGE payload.
/// Returns the raw state when the setting is the console display: 0 off,
/// 1 on, 2 dimmed.
pub fn console_display_state(lparam: LPARAM) -> Option<u32> {
    if lparam.0 == 0 {
        return None;
    }
    unsafe {
        let setting = &*(lparam.0 as *const POWERBROADCAST_SETTING);
        if setting.PowerSetting != CONSOLE_DISPLAY_STATE {
            return None;
        }
        Some(std::ptr::read_unaligned(
            setting.Data.as_ptr() as *const u32
        ))
    }
}
