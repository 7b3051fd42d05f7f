//! Engine lifecycle: the control-side handle, the worker thread that owns
//! every GPU object, and the render loop driving all monitor sessions.
//!
//! Control and worker share only atomics, the update queue, and the event
//! channel. COM objects never cross the thread boundary; the worker creates
//! and drops everything device-side within its own run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use lumaveil_core::{
    analysis::{FrameAnalysis, SessionStats},
    display::DisplayControl,
    error::CorrectionError,
    log_debug, log_error, log_info, log_warn,
    lut::LutImage,
    settings::{CorrectionSettings, EngineSettings, LutReference},
};

use windows::Win32::{
    Foundation::{HWND, LPARAM, LRESULT, WPARAM},
    System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED},
    UI::{
        HiDpi::{SetThreadDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2},
        WindowsAndMessaging::{
            DefWindowProcW, DispatchMessageW, MessageBeep, PeekMessageW, TranslateMessage,
            MB_ICONERROR, MSG, PBT_APMRESUMEAUTOMATIC, PBT_APMRESUMESUSPEND,
            PBT_POWERSETTINGCHANGE, PM_REMOVE, WM_POWERBROADCAST,
        },
    },
};

use crate::allowlist::{snapshot_process_names, AllowlistState, GateChange};
use crate::gpu::GpuBackend;
use crate::monitor;
use crate::pacing::{
    Watchdog, DEVICE_HEALTH_INTERVAL_FRAMES, DEVICE_RECOVERY_DELAY, FORCED_REINIT_DELAY,
    POLL_INITIAL_DELAY, POLL_INTERVAL, POLL_SLICE, STOP_WAIT_LIMIT, STOP_WAIT_SLICE,
    TOPMOST_INTERVAL,
};
use crate::session::{FrameContext, MonitorSession, RenderOutcome};
use crate::updates::{PendingCorrection, UpdateQueue};
use crate::window::{self, PowerNotification};

/// Worker control flags. The window procedure has no instance pointer, so
/// these are process-wide; one engine runs at a time.
struct EngineSignals {
    running: AtomicBool,
    force_reinit: AtomicBool,
    display_off: AtomicBool,
}

static SIGNALS: EngineSignals = EngineSignals {
    running: AtomicBool::new(false),
    force_reinit: AtomicBool::new(false),
    display_off: AtomicBool::new(false),
};

/// Messages from the worker to whoever started the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The worker is up with at least one monitor session.
    Started,
    /// The worker exited; the payload says why.
    Stopped(String),
    /// Human-readable progress line.
    Status(String),
    /// Frame statistics from the primary monitor's analysis pass.
    Analysis {
        monitor: usize,
        frame: FrameAnalysis,
        stats: SessionStats,
    },
    /// Dynamic peak detection readback.
    DetectedPeak { monitor: usize, nits: f32 },
    /// The gamma allow-list engaged or released.
    GammaAllowlist { active: bool, process: String },
}

/// State shared between the control handle, the worker, and the poller.
struct EngineShared {
    updates: UpdateQueue,
    allowlist: Mutex<AllowlistState>,
    user_gamma: AtomicBool,
    effective_gamma: AtomicBool,
    tetrahedral: AtomicBool,
    log_peak: AtomicBool,
    analysis: AtomicBool,
    any_hdr: AtomicBool,
    force_topmost: AtomicBool,
    events: Sender<EngineEvent>,
}

/// Control surface for a running engine. Everything a front end needs is
/// here: parameter updates, runtime toggles, the event stream, and stop.
pub struct EngineHandle {
    worker: Option<JoinHandle<()>>,
    shared: Arc<EngineShared>,
    events: Receiver<EngineEvent>,
}

impl EngineHandle {
    /// Spawns the worker thread and returns the control handle. The worker
    /// owns every COM object; this side only flips atomics and queues
    /// parameter updates.
    pub fn start(
        settings: EngineSettings,
        lut_dir: PathBuf,
        monitor_filter: Vec<usize>,
        display: Arc<dyn DisplayControl>,
    ) -> EngineHandle {
        let (events_tx, events_rx) = unbounded();
        let shared = Arc::new(EngineShared {
            updates: UpdateQueue::new(),
            allowlist: Mutex::new(AllowlistState::new()),
            user_gamma: AtomicBool::new(settings.user_gamma),
            effective_gamma: AtomicBool::new(settings.user_gamma),
            tetrahedral: AtomicBool::new(settings.tetrahedral),
            log_peak: AtomicBool::new(false),
            analysis: AtomicBool::new(false),
            any_hdr: AtomicBool::new(false),
            force_topmost: AtomicBool::new(false),
            events: events_tx,
        });

        SIGNALS.force_reinit.store(false, Ordering::Relaxed);
        SIGNALS.display_off.store(false, Ordering::Relaxed);
        SIGNALS.running.store(true, Ordering::Relaxed);

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            worker_entry(settings, lut_dir, monitor_filter, display, worker_shared);
        });

        EngineHandle {
            worker: Some(worker),
            shared,
            events: events_rx,
        }
    }

    /// Signals the worker to stop and waits up to two seconds. A worker
    /// stuck below a blocking API call is detached rather than joined.
    pub fn stop(&mut self) {
        SIGNALS.running.store(false, Ordering::Relaxed);
        let Some(worker) = self.worker.take() else {
            return;
        };

        let deadline = Instant::now() + STOP_WAIT_LIMIT;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(STOP_WAIT_SLICE);
        }
        if worker.is_finished() {
            if worker.join().is_err() {
                log_error!("engine worker panicked during shutdown");
            }
        } else {
            log_warn!("engine worker did not stop within {STOP_WAIT_LIMIT:?}, detaching");
        }
    }

    /// Queues a correction update for one monitor/mode pair. The worker
    /// applies it between frames; no GPU objects are rebuilt.
    pub fn update_correction(&self, monitor_index: usize, hdr: bool, settings: &CorrectionSettings) {
        self.shared.updates.push(PendingCorrection {
            monitor_index,
            hdr,
            data: settings.resolve(hdr),
        });
    }

    /// Applies the user's gamma toggle. Flipping it while the allow-list
    /// holds the gate overrides the gate until the matched process exits.
    pub fn set_user_gamma(&self, enabled: bool) {
        self.shared.user_gamma.store(enabled, Ordering::Relaxed);
        let mut gate = self.shared.allowlist.lock();
        if gate.active() {
            let process = gate.matched().unwrap_or_default();
            log_info!("gamma toggled to {enabled} over the allow-list gate held by {process}");
        }
        gate.record_user_override();
        self.shared.effective_gamma.store(enabled, Ordering::Relaxed);
    }

    pub fn set_tetrahedral(&self, enabled: bool) {
        self.shared.tetrahedral.store(enabled, Ordering::Relaxed);
    }

    /// Logs each dynamic peak readback at info level.
    pub fn set_log_peak(&self, enabled: bool) {
        self.shared.log_peak.store(enabled, Ordering::Relaxed);
    }

    /// Enables the per-frame analysis readback on the primary monitor.
    /// Session statistics restart on each rising edge.
    pub fn set_analysis(&self, enabled: bool) {
        self.shared.analysis.store(enabled, Ordering::Relaxed);
    }

    /// Asks the worker to reassert TOPMOST on every overlay now instead of
    /// waiting for the periodic pass.
    pub fn request_topmost(&self) {
        self.shared.force_topmost.store(true, Ordering::Relaxed);
    }

    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    pub fn running(&self) -> bool {
        SIGNALS.running.load(Ordering::Relaxed)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Window procedure for every overlay window. Power transitions land here;
/// the handlers only flip atomics because the worker owns all device state.
unsafe extern "system" fn overlay_wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_POWERBROADCAST {
        match wparam.0 as u32 {
            PBT_APMRESUMEAUTOMATIC | PBT_APMRESUMESUSPEND => {
                log_info!("power resume, scheduling capture restart");
                SIGNALS.force_reinit.store(true, Ordering::Relaxed);
            }
            PBT_POWERSETTINGCHANGE => match window::console_display_state(lparam) {
                Some(0) => {
                    log_info!("display powered off, capture recovery paused");
                    SIGNALS.display_off.store(true, Ordering::Relaxed);
                }
                Some(_) => {
                    if SIGNALS.display_off.swap(false, Ordering::Relaxed) {
                        log_info!("display powered on, scheduling capture restart");
                        SIGNALS.force_reinit.store(true, Ordering::Relaxed);
                    }
                }
                None => {}
            },
            _ => {}
        }
        return LRESULT(1);
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

fn worker_entry(
    settings: EngineSettings,
    lut_dir: PathBuf,
    monitor_filter: Vec<usize>,
    display: Arc<dyn DisplayControl>,
    shared: Arc<EngineShared>,
) {
    // Desktop duplication and DirectComposition both want an STA, and the
    // overlay windows need per-monitor DPI so they span each output exactly.
    let com = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
    if com.is_err() {
        log_warn!("COM init on worker thread failed: {:#x}", com.0);
    }
    unsafe {
        let _ = SetThreadDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
    }

    let reason = run_worker(&settings, &lut_dir, &monitor_filter, &display, &shared);

    SIGNALS.running.store(false, Ordering::Relaxed);
    if com.is_ok() {
        unsafe { CoUninitialize() };
    }
    log_info!("engine stopped: {reason}");
    let _ = shared.events.send(EngineEvent::Stopped(reason));
}

fn run_worker(
    settings: &EngineSettings,
    lut_dir: &Path,
    monitor_filter: &[usize],
    display: &Arc<dyn DisplayControl>,
    shared: &Arc<EngineShared>,
) -> String {
    let targets = match monitor::enumerate() {
        Ok(targets) if !targets.is_empty() => targets,
        Ok(_) => {
            log_error!("no active monitors found");
            return "no active monitors".into();
        }
        Err(e) => {
            log_error!("monitor enumeration failed: {e:#}");
            return "monitor enumeration failed".into();
        }
    };

    if let Err(e) = window::register_class(Some(overlay_wnd_proc)) {
        log_error!("overlay window class registration failed: {e:#}");
        return "window class registration failed".into();
    }

    let mut gpu = match GpuBackend::new() {
        Ok(gpu) => gpu,
        Err(e) => {
            log_error!("GPU backend init failed: {e:#}");
            return "GPU initialization failed".into();
        }
    };

    let total = targets.len();
    let mut lut_cache: HashMap<PathBuf, LutImage> = HashMap::new();
    let mut sessions: Vec<MonitorSession> = Vec::new();
    for target in targets {
        let index = target.index;
        if !monitor_filter.is_empty() && !monitor_filter.contains(&index) {
            continue;
        }
        let monitor_settings = settings.monitor(index);
        if !monitor_settings.wants_session() {
            log_info!("Monitor {index}: disabled in settings, skipping");
            continue;
        }
        let sdr_lut = load_lut_cached(
            &mut lut_cache,
            &monitor_settings.sdr.lut,
            lut_dir,
            index,
            "SDR",
        );
        let hdr_lut = load_lut_cached(
            &mut lut_cache,
            &monitor_settings.hdr.lut,
            lut_dir,
            index,
            "HDR",
        );
        match MonitorSession::create(&gpu, target, monitor_settings, sdr_lut, hdr_lut) {
            Ok(session) => sessions.push(session),
            Err(e) => log_error!("Monitor {index}: session init failed: {e:#}"),
        }
    }

    if sessions.is_empty() {
        log_error!("no usable monitors, engine exiting");
        return "no usable monitors".into();
    }

    // Resume and display-state broadcasts arrive on the first session's
    // window; the worker pumps that queue every iteration.
    let power = match PowerNotification::register(sessions[0].hwnd()) {
        Ok(power) => Some(power),
        Err(e) => {
            log_warn!("power notification registration failed: {e:#}");
            None
        }
    };

    reapply_peak_overrides(display.as_ref(), &sessions);
    shared.any_hdr.store(
        sessions.iter().any(MonitorSession::hdr_active),
        Ordering::Relaxed,
    );

    let _ = shared.events.send(EngineEvent::Started);
    let _ = shared.events.send(EngineEvent::Status(format!(
        "{} of {total} monitors active",
        sessions.len()
    )));

    let poller = (!settings.gamma_allowlist.is_empty())
        .then(|| spawn_poller(Arc::clone(shared), settings.gamma_allowlist.clone()));

    let reason = render_loop(&mut gpu, &mut sessions, settings, display.as_ref(), shared);

    // The poller loops on the running flag; clear it before joining so a
    // fatal loop exit cannot leave the join hanging.
    SIGNALS.running.store(false, Ordering::Relaxed);
    for session in &mut sessions {
        session.hide_overlay();
    }
    if let Some(poller) = poller {
        if poller.join().is_err() {
            log_warn!("allow-list poller panicked");
        }
    }
    drop(power);
    drop(sessions);
    pump_messages();

    reason
}

/// Loads a referenced LUT once per path; sessions sharing a file share the
/// decoded image. A missing or malformed file logs and leaves that
/// monitor/mode in passthrough instead of failing the session.
fn load_lut_cached(
    cache: &mut HashMap<PathBuf, LutImage>,
    reference: &Option<LutReference>,
    lut_dir: &Path,
    monitor_index: usize,
    mode: &str,
) -> Option<LutImage> {
    let reference = reference.as_ref()?;
    if let Some(image) = cache.get(&reference.path) {
        return Some(image.clone());
    }
    match reference.load(lut_dir) {
        Ok(image) => {
            cache.insert(reference.path.clone(), image.clone());
            Some(image)
        }
        Err(e) => {
            log_error!("Monitor {monitor_index}: {mode} LUT load failed: {e:#}");
            None
        }
    }
}

/// One iteration: pump messages, watchdog and maintenance checks, drain
/// parameter updates, render every session, then classify the outcomes.
fn render_loop(
    gpu: &mut GpuBackend,
    sessions: &mut Vec<MonitorSession>,
    settings: &EngineSettings,
    display: &dyn DisplayControl,
    shared: &Arc<EngineShared>,
) -> String {
    let mut watchdog = Watchdog::new();
    let mut recovery_attempted = false;
    let mut last_topmost = Instant::now();
    let mut analysis_was_on = false;
    let mut frames: u64 = 0;

    while SIGNALS.running.load(Ordering::Relaxed) {
        pump_messages();

        if watchdog.expired() {
            if SIGNALS.display_off.load(Ordering::Relaxed) {
                // Screens are off; nothing can present. Not a stall.
                watchdog.pet();
            } else {
                let fault = CorrectionError::WatchdogExpired(watchdog.stalled_for());
                log_error!("{fault}; no monitor produced a frame, exiting");
                for session in sessions.iter_mut() {
                    session.disable();
                }
                let _ = unsafe { MessageBeep(MB_ICONERROR) };
                return "render watchdog expired".into();
            }
        }

        if SIGNALS.force_reinit.swap(false, Ordering::Relaxed) {
            log_info!("forced capture restart");
            thread::sleep(FORCED_REINIT_DELAY);
            for session in sessions.iter_mut() {
                session.drop_capture();
            }
            reapply_peak_overrides(display, sessions);
            watchdog.pet();
        }

        if shared.force_topmost.swap(false, Ordering::Relaxed)
            || last_topmost.elapsed() >= TOPMOST_INTERVAL
        {
            for session in sessions.iter() {
                session.reassert_topmost();
            }
            last_topmost = Instant::now();
        }

        let analysis_wanted = shared.analysis.load(Ordering::Relaxed);
        if analysis_wanted && !analysis_was_on {
            // A fresh subscription starts fresh session statistics.
            if let Some(primary) = sessions.iter_mut().find(|s| s.index() == 0) {
                primary.reset_stats();
            }
        }
        analysis_was_on = analysis_wanted;

        for update in shared.updates.drain() {
            if let Some(session) = sessions
                .iter_mut()
                .find(|s| s.index() == update.monitor_index)
            {
                session.apply_update(update.hdr, update.data);
            }
        }

        let ctx = FrameContext {
            desktop_gamma: shared.effective_gamma.load(Ordering::Relaxed),
            tetrahedral: shared.tetrahedral.load(Ordering::Relaxed),
            sdr_white_nits: settings.sdr_white_nits,
            log_peak: shared.log_peak.load(Ordering::Relaxed),
            analysis_wanted,
            events: &shared.events,
        };

        let mut presented = false;
        let mut mode_changed = false;
        let mut device_lost = false;
        for session in sessions.iter_mut() {
            match session.render(gpu, &ctx) {
                RenderOutcome::Presented => presented = true,
                RenderOutcome::Idle => watchdog.pet(),
                RenderOutcome::ModeChanged => {
                    mode_changed = true;
                    watchdog.pet();
                }
                RenderOutcome::DeviceLost => device_lost = true,
                RenderOutcome::Recovering | RenderOutcome::Skipped => {}
            }
        }

        if presented {
            watchdog.pet();
            frames = frames.wrapping_add(1);
            // A device can die behind a present stream that still reports
            // success; poll the removal reason on a frame cadence.
            if frames % DEVICE_HEALTH_INTERVAL_FRAMES == 0 {
                if let Some(reason) = gpu.device_removed_reason() {
                    let fault = CorrectionError::DeviceRemoved { reason: reason.0 };
                    log_error!("health poll: {fault}");
                    device_lost = true;
                }
            }
        }

        if device_lost {
            if try_device_recovery(gpu, sessions, display, shared, &mut recovery_attempted) {
                watchdog.pet();
            } else {
                return "device recovery failed".into();
            }
        } else if mode_changed {
            reapply_peak_overrides(display, sessions);
        }

        shared.any_hdr.store(
            sessions.iter().any(|s| s.enabled() && s.hdr_active()),
            Ordering::Relaxed,
        );

        if sessions.iter().all(|s| !s.enabled()) {
            log_error!("all monitor sessions disabled, engine exiting");
            return "all monitors disabled".into();
        }
    }

    "stopped".into()
}

/// One-shot device recovery: drop every GPU object, settle, rebuild the
/// backend and every session from retained CPU-side data. A second loss
/// after a successful recovery exits instead of looping.
fn try_device_recovery(
    gpu: &mut GpuBackend,
    sessions: &mut Vec<MonitorSession>,
    display: &dyn DisplayControl,
    shared: &Arc<EngineShared>,
    attempted: &mut bool,
) -> bool {
    for session in sessions.iter_mut() {
        session.release_device_resources();
    }

    if *attempted {
        log_error!("device lost again after recovery, giving up");
        let _ = unsafe { MessageBeep(MB_ICONERROR) };
        for session in sessions.iter_mut() {
            session.disable();
        }
        return false;
    }
    *attempted = true;

    let _ = shared
        .events
        .send(EngineEvent::Status("recovering GPU device".into()));
    thread::sleep(DEVICE_RECOVERY_DELAY);

    match GpuBackend::new() {
        Ok(new_gpu) => *gpu = new_gpu,
        Err(e) => {
            log_error!("GPU backend rebuild failed: {e:#}");
            let _ = unsafe { MessageBeep(MB_ICONERROR) };
            for session in sessions.iter_mut() {
                session.disable();
            }
            return false;
        }
    }

    for session in sessions.iter_mut() {
        if let Err(e) = session.rebuild(gpu) {
            log_error!(
                "Monitor {}: rebuild after device loss failed: {e:#}",
                session.index()
            );
            session.disable();
        }
    }
    reapply_peak_overrides(display, sessions);
    shared.any_hdr.store(
        sessions.iter().any(|s| s.enabled() && s.hdr_active()),
        Ordering::Relaxed,
    );

    log_info!("GPU device recovered");
    let _ = shared
        .events
        .send(EngineEvent::Status("GPU device recovered".into()));
    true
}

/// Background process poller for the gamma allow-list. Only spawned when
/// the list is non-empty; exits when the engine stops.
fn spawn_poller(shared: Arc<EngineShared>, patterns: Vec<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        sleep_while_running(POLL_INITIAL_DELAY);
        while SIGNALS.running.load(Ordering::Relaxed) {
            let processes = match snapshot_process_names() {
                Ok(processes) => processes,
                Err(e) => {
                    log_debug!("process snapshot failed: {e:#}");
                    Vec::new()
                }
            };

            let user_gamma = shared.user_gamma.load(Ordering::Relaxed);
            let any_hdr = shared.any_hdr.load(Ordering::Relaxed);
            // The effective-gamma store happens under the same lock the
            // user toggle takes, so gate and toggle serialize.
            let change = {
                let mut gate = shared.allowlist.lock();
                let change = gate.evaluate(&patterns, user_gamma, any_hdr, &processes);
                match &change {
                    GateChange::Disable { .. } => {
                        shared.effective_gamma.store(false, Ordering::Relaxed);
                    }
                    GateChange::Restore { .. } => {
                        shared
                            .effective_gamma
                            .store(shared.user_gamma.load(Ordering::Relaxed), Ordering::Relaxed);
                    }
                    GateChange::None => {}
                }
                change
            };

            match change {
                GateChange::Disable { process } => {
                    log_info!("gamma paused while {process} is running");
                    let _ = shared.events.send(EngineEvent::GammaAllowlist {
                        active: true,
                        process,
                    });
                }
                GateChange::Restore { process } => {
                    log_info!("gamma restored after {process} exited");
                    let _ = shared.events.send(EngineEvent::GammaAllowlist {
                        active: false,
                        process,
                    });
                }
                GateChange::None => {}
            }

            sleep_while_running(POLL_INTERVAL);
        }
    })
}

/// Sleeps in short slices so engine shutdown is never held up by a poll
/// interval.
fn sleep_while_running(total: Duration) {
    let mut remaining = total;
    while !remaining.is_zero() && SIGNALS.running.load(Ordering::Relaxed) {
        let slice = remaining.min(POLL_SLICE);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

/// Drains the worker thread's message queue; the overlay windows and the
/// power notification both deliver through here.
fn pump_messages() {
    let mut msg = MSG::default();
    unsafe {
        while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// Pushes configured peak-luminance overrides through the display-control
/// seam. Failures log; a monitor that rejects the override still gets
/// corrected output.
fn reapply_peak_overrides(display: &dyn DisplayControl, sessions: &[MonitorSession]) {
    for session in sessions {
        let peak = session.peak_override();
        if peak.enabled {
            if let Err(e) = display.apply_peak_override(session.index(), peak.nits) {
                log_warn!("Monitor {}: peak override failed: {e:#}", session.index());
            }
        }
    }
}
