//! Tuning parameters for the live output backend.

use std::time::Duration;

/// Settings for the live (cpal) output backend.
#[derive(Clone, Debug)]
pub struct LiveOutputConfig {
    /// Output device name substring (case-insensitive); `None` uses the
    /// host default device.
    pub device: Option<String>,
    /// Requested hardware period in frames. The mix buffer is sized to
    /// one period.
    pub period_frames: u32,
    /// Ring capacity between the engine and the stream callback, in
    /// periods. Larger values tolerate tick jitter at the cost of
    /// latency.
    pub ring_periods: usize,
    /// How long `drain` waits for queued audio to reach the device.
    pub drain_timeout: Duration,
}

impl Default for LiveOutputConfig {
    /// Defaults tuned for a 60 Hz game loop on common hardware.
    fn default() -> Self {
        Self {
            device: None,
            period_frames: 1024,
            ring_periods: 4,
            drain_timeout: Duration::from_secs(2),
        }
    }
}
