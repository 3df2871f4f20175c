//! GPS Calibrator - command line front end
//!
//! Run with: cargo run --bin gps-calibrator -- <command> [track] [options]

use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context};
use gps_calibrator::{
    AppSettings, CalibrationSession, GpsCalibrator, Journal, LiveCorrectionLoop, ReplaySource,
    TracingSink,
};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage:
  gps-calibrator calibrate [TRACK] [--json]
  gps-calibrator live [TRACK] [--seconds N]
  gps-calibrator settings [--save]

TRACK is a recorded fix file (lat, lon[, accuracy] per line). It defaults to
TRACK_PATH or the saved settings.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let settings = apply_env_overrides(AppSettings::load());

    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };

    match command {
        "calibrate" => run_calibrate(&settings, &args[1..]).await,
        "live" => run_live(&settings, &args[1..]).await,
        "settings" => run_settings(&settings, &args[1..]),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

/// Let environment variables override saved settings.
fn apply_env_overrides(mut settings: AppSettings) -> AppSettings {
    fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
        env::var(name).ok().and_then(|s| s.parse().ok())
    }

    if let Some(v) = var("REFERENCE_LAT") {
        settings.reference_lat = v;
    }
    if let Some(v) = var("REFERENCE_LON") {
        settings.reference_lon = v;
    }
    if let Some(v) = var("CALIB_MIN_DURATION_MS") {
        settings.min_duration_ms = v;
    }
    if let Some(v) = var("CALIB_MIN_SAMPLES") {
        settings.min_samples = v;
    }
    if let Some(v) = var("CALIB_SAMPLE_INTERVAL_MS") {
        settings.sample_interval_ms = v;
    }
    if let Some(v) = var("CALIB_Z_THRESHOLD") {
        settings.z_threshold = v;
    }
    if let Some(v) = var("CALIB_MAX_DURATION_MS") {
        settings.max_duration_ms = v;
    }
    if let Some(v) = var("LIVE_INTERVAL_MS") {
        settings.tick_interval_ms = v;
    }
    if let Some(v) = var("LIVE_SETTLE_DELAY_MS") {
        settings.settle_delay_ms = v;
    }
    if let Ok(v) = env::var("TRACK_PATH") {
        settings.track_path = v;
    }

    settings
}

/// First positional argument, else the configured track.
fn track_path(settings: &AppSettings, args: &[String]) -> anyhow::Result<PathBuf> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--seconds" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with("--") {
            return Ok(PathBuf::from(arg));
        }
    }

    if settings.track_path.is_empty() {
        bail!("No track given and TRACK_PATH is not set\n\n{}", USAGE);
    }
    Ok(PathBuf::from(&settings.track_path))
}

fn print_header(settings: &AppSettings, track: &Path) {
    println!("🛰️  GPS Calibrator");
    println!("================================================");
    println!(
        "Reference point: {:.6}, {:.6}",
        settings.reference_lat, settings.reference_lon
    );
    println!(
        "Window: >= {} ms and >= {} samples (every {} ms, max {} ms)",
        settings.min_duration_ms,
        settings.min_samples,
        settings.sample_interval_ms,
        settings.max_duration_ms
    );
    println!("Outlier threshold: z <= {}", settings.z_threshold);
    println!("Track: {}", track.display());
    println!("================================================\n");
}

async fn run_calibrate(settings: &AppSettings, args: &[String]) -> anyhow::Result<()> {
    let track = track_path(settings, args)?;
    let json = args.iter().any(|a| a == "--json");
    let source = ReplaySource::load(&track)
        .with_context(|| format!("Loading track {}", track.display()))?;

    if !json {
        print_header(settings, &track);
        println!("🎯 Calibrating... stay still on the reference point.\n");
    }

    let calibrator = GpsCalibrator::new(settings.calibration_config());
    let outcome = calibrator
        .calibrate(&source, settings.reference_lat, settings.reference_lon)
        .await;

    if json {
        let result = outcome?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let mut journal = Journal::new();
    journal.record_calibration(&outcome);
    println!("{}", journal.format_all());

    outcome?;
    Ok(())
}

async fn run_live(settings: &AppSettings, args: &[String]) -> anyhow::Result<()> {
    let track = track_path(settings, args)?;
    let seconds: Option<u64> = args
        .iter()
        .position(|a| a == "--seconds")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok());

    let source = Arc::new(
        ReplaySource::load(&track)
            .with_context(|| format!("Loading track {}", track.display()))?
            .looping(),
    );
    print_header(settings, &track);

    let journal = Arc::new(Mutex::new(live_journal()));

    println!("🎯 Calibrating... stay still on the reference point.\n");
    let session = CalibrationSession::new(GpsCalibrator::new(settings.calibration_config()));
    let outcome = session
        .run(source.as_ref(), settings.reference_lat, settings.reference_lon)
        .await;
    if let Ok(mut j) = journal.lock() {
        j.record_calibration(&outcome);
        println!("{}\n", j.format_all());
    }
    if outcome.is_err() {
        println!("⚠️ Continuing with a zero offset.\n");
    }

    let event_journal = journal.clone();
    let mut live: LiveCorrectionLoop<ReplaySource> = LiveCorrectionLoop::new(
        settings.live_loop_config(),
    )
    .with_event_callback(move |event| {
        if let Ok(mut j) = event_journal.lock() {
            j.record_loop_event(event);
            if let Some(entry) = j.entries().last() {
                println!("{}", entry.format_display());
            }
        }
    });

    let sink = Arc::new(TracingSink::new());
    if let Err(e) = live
        .start(session.current_offset(), source.clone(), sink)
        .await
    {
        if let Ok(mut j) = journal.lock() {
            j.record_loop_error(&e);
        }
        save_journal(&journal);
        return Err(e.into());
    }

    match seconds {
        Some(s) => {
            println!("\nRunning for {} s (Ctrl-C to stop early)\n", s);
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = tokio::time::sleep(Duration::from_secs(s)) => {}
            }
        }
        None => {
            println!("\nRunning until Ctrl-C\n");
            tokio::signal::ctrl_c().await?;
        }
    }

    if let Err(e) = live.stop().await {
        if let Ok(mut j) = journal.lock() {
            j.record_loop_error(&e);
        }
    }
    println!("\n🛑 Live correction stopped.");

    save_journal(&journal);
    Ok(())
}

/// Journal that streams every entry to the logs dir as it is written.
fn live_journal() -> Journal {
    let Some(dir) = AppSettings::logs_dir() else {
        return Journal::new();
    };
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("⚠️ Cannot create logs directory {}: {}", dir.display(), e);
        return Journal::new();
    }

    let path = dir.join("calibration_live.log");
    println!("📝 Streaming journal to {}\n", path.display());
    Journal::new().with_mirror(path)
}

fn save_journal(journal: &Mutex<Journal>) {
    let Ok(j) = journal.lock() else {
        return;
    };
    match j.save_to_logs_dir() {
        Ok(path) => println!("📝 Journal saved to {}", path.display()),
        Err(e) => eprintln!("❌ Failed to save journal: {}", e),
    }
}

fn run_settings(settings: &AppSettings, args: &[String]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);

    match AppSettings::settings_path() {
        Some(path) => println!("\nSettings file: {}", path.display()),
        None => println!("\nSettings file: <no config directory>"),
    }

    if args.iter().any(|a| a == "--save") {
        let path = settings.save().map_err(anyhow::Error::msg)?;
        println!("✅ Saved to {}", path.display());
    }

    Ok(())
}
