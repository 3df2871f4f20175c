//! Live correction of a position stream with a calibration offset.

mod live_loop;

pub use live_loop::{
    EventCallback, LiveCorrectionLoop, LiveLoopConfig, LiveLoopError, LiveLoopState, LoopEvent,
    LoopStatus, DEFAULT_SETTLE_DELAY_MS, DEFAULT_TICK_INTERVAL_MS,
};
