//! Console driver for the overlay engine.
//!
//! Reads the settings document the front end maintains, starts the engine
//! over the selected monitors, and relays engine events to stdout until the
//! engine stops. A front end that embeds the engine links the library and
//! talks to `EngineHandle` directly; this binary is the same surface over a
//! pipe.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;

/// Newest log files kept per session directory.
const LOG_RETENTION: usize = 10;

#[derive(Debug, Default)]
struct CliArgs {
    settings_path: Option<PathBuf>,
    monitors: Vec<usize>,
    log_peak: bool,
    analysis: bool,
    sdr_white_nits: Option<f32>,
    debug: bool,
}

/// `--monitor` repeats to select several outputs; no `--monitor` means all.
/// Unknown flags and unparseable values are ignored so an older front end
/// can spawn a newer binary.
fn parse_args(args: &[String]) -> CliArgs {
    let mut parsed = CliArgs::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--settings" => {
                if i + 1 < args.len() {
                    parsed.settings_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--monitor" => {
                if i + 1 < args.len() {
                    if let Ok(index) = args[i + 1].parse() {
                        parsed.monitors.push(index);
                    }
                    i += 1;
                }
            }
            "--sdr-nits" => {
                if i + 1 < args.len() {
                    parsed.sdr_white_nits = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--log-peak" => parsed.log_peak = true,
            "--analysis" => parsed.analysis = true,
            "--debug" => parsed.debug = true,
            _ => {}
        }
        i += 1;
    }
    parsed
}

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use lumaveil_core::logger::{finalize_logs, init_logger, set_debug_logging};
    use lumaveil_core::settings::EngineSettings;
    use lumaveil_core::{log_info, NoopDisplayControl};
    use lumaveil_overlay::engine::{EngineEvent, EngineHandle};

    let args = parse_args(&std::env::args().collect::<Vec<_>>());

    let app_data = std::env::var("LOCALAPPDATA").context("LOCALAPPDATA not set")?;
    let app_dir = PathBuf::from(app_data).join("LumaVeil");
    init_logger(app_dir.join("logs"), "overlay", LOG_RETENTION)?;
    set_debug_logging(args.debug);
    log_info!("=== LumaVeil Overlay Session Started ===");

    let settings_path = args
        .settings_path
        .clone()
        .unwrap_or_else(|| app_dir.join("settings.json"));
    let mut settings = if settings_path.exists() {
        EngineSettings::load(&settings_path)
            .with_context(|| format!("loading {}", settings_path.display()))?
    } else {
        log_info!(
            "no settings document at {}, correcting with defaults",
            settings_path.display()
        );
        EngineSettings::default()
    };
    if let Some(nits) = args.sdr_white_nits {
        settings.sdr_white_nits = nits;
    }
    let settings = settings.validated();

    // LUT references in the document resolve relative to the document.
    let lut_dir = settings_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or(app_dir);

    let mut handle = EngineHandle::start(
        settings,
        lut_dir,
        args.monitors,
        Arc::new(NoopDisplayControl),
    );
    handle.set_log_peak(args.log_peak);
    handle.set_analysis(args.analysis);

    for event in handle.events().iter() {
        match event {
            EngineEvent::Started => println!("engine started"),
            EngineEvent::Status(status) => println!("status: {status}"),
            EngineEvent::Analysis {
                monitor,
                frame,
                stats,
            } => {
                println!(
                    "monitor {monitor}: avg {:.1} nits, peak {:.1} nits (session MaxCLL {:.1}, MaxFALL {:.1})",
                    frame.avg_nits, frame.peak_nits, stats.max_cll, stats.max_fall
                );
            }
            EngineEvent::DetectedPeak { monitor, nits } => {
                println!("monitor {monitor}: detected peak {nits:.1} nits");
            }
            EngineEvent::GammaAllowlist { active, process } => {
                if active {
                    println!("gamma paused for {process}");
                } else {
                    println!("gamma restored after {process}");
                }
            }
            EngineEvent::Stopped(reason) => {
                println!("engine stopped: {reason}");
                break;
            }
        }
    }

    handle.stop();
    finalize_logs()?;
    Ok(())
}

#[cfg(not(windows))]
fn main() {
    eprintln!("the overlay engine runs on Windows only");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("lumaveil-overlay")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn monitor_flag_repeats_and_collects_in_order() {
        let parsed = parse_args(&args(&["--monitor", "1", "--monitor", "0"]));
        assert_eq!(parsed.monitors, vec![1, 0]);
        assert!(parsed.settings_path.is_none());
    }

    #[test]
    fn value_flags_consume_their_argument() {
        let parsed = parse_args(&args(&[
            "--settings",
            r"C:\profiles\night.json",
            "--sdr-nits",
            "240",
            "--log-peak",
        ]));
        assert_eq!(
            parsed.settings_path,
            Some(PathBuf::from(r"C:\profiles\night.json"))
        );
        assert_eq!(parsed.sdr_white_nits, Some(240.0));
        assert!(parsed.log_peak);
        assert!(!parsed.analysis);
    }

    #[test]
    fn malformed_values_and_unknown_flags_are_ignored() {
        let parsed = parse_args(&args(&[
            "--monitor",
            "two",
            "--sdr-nits",
            "bright",
            "--future-flag",
            "--debug",
        ]));
        assert!(parsed.monitors.is_empty());
        assert!(parsed.sdr_white_nits.is_none());
        assert!(parsed.debug);
    }

    #[test]
    fn trailing_value_flag_without_value_is_safe() {
        let parsed = parse_args(&args(&["--analysis", "--settings"]));
        assert!(parsed.analysis);
        assert!(parsed.settings_path.is_none());
    }
}
