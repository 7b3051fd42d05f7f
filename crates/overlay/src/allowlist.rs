//! Gamma allow-list: while a listed process is running, the desktop gamma
//! reshape is forced off so games author against the stock sRGB response.
//!
//! Matching and gating are pure so they can be exercised without a process
//! table; the poller thread in the engine feeds them ToolHelp snapshots.

/// Case-insensitive process match. A pattern matches the snapshot name
/// outright or with the name's trailing `.exe` ignored, so `game`,
/// `game.exe`, and `GAME.EXE` all describe the same binary.
pub fn matches_pattern(process: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    process.eq_ignore_ascii_case(pattern) || strip_exe(process).eq_ignore_ascii_case(pattern)
}

fn strip_exe(process: &str) -> &str {
    if process.len() > 4 {
        if let Some(ext) = process.get(process.len() - 4..) {
            if ext.eq_ignore_ascii_case(".exe") {
                return &process[..process.len() - 4];
            }
        }
    }
    process
}

/// Effect of one allow-list evaluation on the effective gamma flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateChange {
    None,
    /// A listed process appeared; force effective gamma off.
    Disable { process: String },
    /// The trigger cleared; effective gamma returns to the user preference.
    Restore { process: String },
}

/// Gate state across polls, including the user-override rule: a manual
/// gamma toggle while the gate is active wins until the matched process
/// exits, then normal gating resumes.
#[derive(Debug, Default)]
pub struct AllowlistState {
    active: bool,
    matched: Option<String>,
    override_process: Option<String>,
}

impl AllowlistState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn matched(&self) -> Option<&str> {
        self.matched.as_deref()
    }

    /// The user flipped gamma while the gate held it. Remember which
    /// process triggered the gate so the override can expire with it.
    pub fn record_user_override(&mut self) {
        if self.active {
            self.override_process = self.matched.clone();
        }
    }

    /// One poll: evaluate the list against a process snapshot. The gate
    /// only engages while the list is non-empty, the user wants gamma on,
    /// and at least one session is in HDR mode; otherwise it releases.
    pub fn evaluate(
        &mut self,
        patterns: &[String],
        user_gamma: bool,
        any_hdr: bool,
        processes: &[String],
    ) -> GateChange {
        if patterns.is_empty() || !user_gamma || !any_hdr {
            self.override_process = None;
            return self.release();
        }

        let mut found: Option<String> = None;
        let mut override_running = false;
        for process in processes {
            if let Some(override_pattern) = &self.override_process {
                if matches_pattern(process, override_pattern) {
                    override_running = true;
                }
            }
            if found.is_none() && patterns.iter().any(|p| matches_pattern(process, p)) {
                found = Some(process.clone());
            }
        }

        if self.override_process.is_some() {
            if override_running {
                // Hands off while the user's choice stands.
                return GateChange::None;
            }
            self.override_process = None;
        }

        match (found, self.active) {
            (Some(process), false) => {
                self.active = true;
                self.matched = Some(process.clone());
                GateChange::Disable { process }
            }
            (None, true) => self.release(),
            _ => GateChange::None,
        }
    }

    fn release(&mut self) -> GateChange {
        if self.active {
            self.active = false;
            let process = self.matched.take().unwrap_or_default();
            GateChange::Restore { process }
        } else {
            GateChange::None
        }
    }
}

#[cfg(windows)]
pub fn snapshot_process_names() -> anyhow::Result<Vec<String>> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
        TH32CS_SNAPPROCESS,
    };

    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)?;
        let mut names = Vec::new();
        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                names.push(String::from_utf16_lossy(&entry.szExeFile[..len]));
                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
        let _ = CloseHandle(snapshot);
        Ok(names)
    }
}
