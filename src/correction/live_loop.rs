//! Live correction loop: substitutes calibrated fixes for raw ones.
//!
//! While running, a ticker task pulls one reading per interval from the
//! position source, adds the calibration offset and forwards the corrected fix
//! to the sink. At most one ticker exists per loop: `start` always retires the
//! previous one before spawning a new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::position::{fetch_valid, GeoError, OffsetDeg, PositionSink, PositionSource};

/// Default interval between correction ticks (milliseconds).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Default pause between stopping the ticker and resuming the source (milliseconds).
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 100;

/// Errors surfaced by `start` and `stop`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LiveLoopError {
    #[error("Position source failed on startup: {0}")]
    SourceStartupFailure(GeoError),
    #[error("Failed to hand position updates back to the source: {0}")]
    HandoffFailure(GeoError),
}

/// Configuration for the live correction loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveLoopConfig {
    /// Interval between ticks (milliseconds).
    pub interval_ms: u64,
    /// Delay before resuming the source after a stop (milliseconds).
    pub settle_delay_ms: u64,
}

impl Default for LiveLoopConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_TICK_INTERVAL_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }
}

impl LiveLoopConfig {
    /// Set the tick interval.
    pub fn with_interval(mut self, ms: u64) -> Self {
        self.interval_ms = ms;
        self
    }

    /// Set the settle delay.
    pub fn with_settle_delay(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }
}

/// Observable events, for a UI to render as log lines or alerts.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// The immediate fix injected by `start`.
    Started { latitude: f64, longitude: f64 },
    /// A corrected fix injected by a tick.
    Injected { latitude: f64, longitude: f64 },
    /// A tick whose read failed; nothing was injected.
    TickSkipped(GeoError),
    Stopped,
    /// The source refused to resume after a stop.
    HandoffFailed(GeoError),
}

/// Callback for loop events.
pub type EventCallback = Arc<dyn Fn(&LoopEvent) + Send + Sync>;

/// Running or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Stopped,
    Running,
}

/// A spawned ticker and its cancellation flag.
struct Ticker {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Ticker {
    fn cancel(self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

/// State owned by the loop controller. Only `start` and `stop` mutate it.
pub struct LiveLoopState {
    running: bool,
    offset_deg: OffsetDeg,
    ticker: Option<Ticker>,
}

impl LiveLoopState {
    pub fn running(&self) -> bool {
        self.running
    }

    /// Offset recorded by the last successful `start`.
    pub fn offset_deg(&self) -> OffsetDeg {
        self.offset_deg
    }

    pub fn has_ticker(&self) -> bool {
        self.ticker.is_some()
    }
}

/// Cancellable periodic task applying a calibration offset to a live stream.
///
/// Dropping the loop aborts its ticker.
pub struct LiveCorrectionLoop<S> {
    config: LiveLoopConfig,
    state: LiveLoopState,
    /// Source to hand updates back to on `stop`.
    source: Option<Arc<S>>,
    event_callback: Option<EventCallback>,
}

impl<S: PositionSource> LiveCorrectionLoop<S> {
    pub fn new(config: LiveLoopConfig) -> Self {
        Self {
            config,
            state: LiveLoopState {
                running: false,
                offset_deg: OffsetDeg::ZERO,
                ticker: None,
            },
            source: None,
            event_callback: None,
        }
    }

    /// Set a callback for loop events.
    pub fn with_event_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LoopEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &LiveLoopConfig {
        &self.config
    }

    pub fn state(&self) -> &LiveLoopState {
        &self.state
    }

    pub fn status(&self) -> LoopStatus {
        if self.state.running {
            LoopStatus::Running
        } else {
            LoopStatus::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Start correcting `source` with `offset`, forwarding fixes to `sink`.
    ///
    /// Restarts cleanly if already running, handing updates back to the
    /// previous source when it differs from `source`. One fix is read, corrected and
    /// injected before this returns; if that read fails the loop stays
    /// stopped and the source gets its autonomous updates back.
    pub async fn start<K: PositionSink>(
        &mut self,
        offset: OffsetDeg,
        source: Arc<S>,
        sink: Arc<K>,
    ) -> Result<(), LiveLoopError> {
        if let Some(ticker) = self.state.ticker.take() {
            tracing::info!("Live correction already running, restarting");
            ticker.cancel();
        }
        self.state.running = false;
        if let Some(previous) = self.source.take() {
            if !Arc::ptr_eq(&previous, &source) {
                let _ = self.hand_back(previous.as_ref()).await;
            }
        }

        if source.supports_autonomous_updates() {
            if let Err(e) = source.pause_autonomous_updates().await {
                tracing::warn!("Could not pause autonomous position updates: {}", e);
            }
        }

        let reading = match fetch_valid(source.as_ref()).await {
            Ok(reading) => reading,
            Err(e) => {
                tracing::error!("Live correction start aborted [{}]: {}", e.code(), e);
                let _ = self.hand_back(source.as_ref()).await;
                return Err(LiveLoopError::SourceStartupFailure(e));
            }
        };

        let (latitude, longitude) = offset.apply(reading.latitude, reading.longitude);
        sink.inject_corrected_position(longitude, latitude);
        tracing::info!(
            "Live correction started (lat: {:.6}, lon: {:.6})",
            latitude,
            longitude
        );
        emit(&self.event_callback, LoopEvent::Started { latitude, longitude });

        self.state.offset_deg = offset;
        self.state.running = true;
        self.state.ticker = Some(self.spawn_ticker(offset, source.clone(), sink));
        self.source = Some(source);

        Ok(())
    }

    fn spawn_ticker<K: PositionSink>(
        &self,
        offset: OffsetDeg,
        source: Arc<S>,
        sink: Arc<K>,
    ) -> Ticker {
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let callback = self.event_callback.clone();
        let period = Duration::from_millis(self.config.interval_ms.max(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !flag.load(Ordering::SeqCst) {
                    break;
                }

                match fetch_valid(source.as_ref()).await {
                    Ok(reading) => {
                        // Stopped while the read was in flight.
                        if !flag.load(Ordering::SeqCst) {
                            break;
                        }
                        let (latitude, longitude) =
                            offset.apply(reading.latitude, reading.longitude);
                        sink.inject_corrected_position(longitude, latitude);
                        tracing::debug!(
                            "Live correction -> lat: {:.6}, lon: {:.6}",
                            latitude,
                            longitude
                        );
                        emit(&callback, LoopEvent::Injected { latitude, longitude });
                    }
                    Err(e) => {
                        tracing::warn!("Skipped correction tick: {}", e);
                        emit(&callback, LoopEvent::TickSkipped(e));
                    }
                }
            }
        });

        Ticker { active, task }
    }

    /// Stop correcting and hand updates back to the source.
    ///
    /// Always leaves the loop stopped. A no-op when already stopped. Returns
    /// `HandoffFailure` if the source refused to resume; that is not retried.
    pub async fn stop(&mut self) -> Result<(), LiveLoopError> {
        let Some(ticker) = self.state.ticker.take() else {
            return Ok(());
        };
        ticker.cancel();
        self.state.running = false;
        tracing::info!("Live correction stopped");
        emit(&self.event_callback, LoopEvent::Stopped);

        match self.source.take() {
            Some(source) => self.hand_back(source.as_ref()).await,
            None => Ok(()),
        }
    }

    /// Resume the source's own updates after the settle delay.
    async fn hand_back(&self, source: &S) -> Result<(), LiveLoopError> {
        if !source.supports_autonomous_updates() {
            return Ok(());
        }

        sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        match source.resume_autonomous_updates().await {
            Ok(()) => {
                tracing::info!("Position updates handed back to the source");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Resuming autonomous position updates failed: {}", e);
                emit(&self.event_callback, LoopEvent::HandoffFailed(e.clone()));
                Err(LiveLoopError::HandoffFailure(e))
            }
        }
    }
}

impl<S> LiveCorrectionLoop<S> {
    /// Abort the ticker without handing updates back. Used on teardown.
    pub fn shutdown(&mut self) {
        if let Some(ticker) = self.state.ticker.take() {
            ticker.cancel();
            tracing::debug!("Live correction ticker torn down");
        }
        self.state.running = false;
    }
}

impl<S> Drop for LiveCorrectionLoop<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn emit(callback: &Option<EventCallback>, event: LoopEvent) {
    if let Some(callback) = callback {
        callback(&event);
    }
}
