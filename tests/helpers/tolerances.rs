//! Tolerance constants for timing assertions.
//!
//! Row times are exact fractions; these only cover the f64 conversions
//! and the granularity of tick-driven playback.

/// f64 rounding on converted fraction times.
pub const TIME_EPSILON: f64 = 1e-9;

/// Accumulated drift after many small `tick` steps.
pub const TICK_DRIFT: f64 = 1e-6;

/// Sample-clock quantization of `play_stream` at 44.1 kHz.
pub const STREAM_EPSILON: f64 = 1.0 / 44_100.0;
