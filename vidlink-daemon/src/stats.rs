//! Per-window encode statistics for the sender's 1 Hz stats tick.

use tracing::info;

use crate::rtt::RttEstimator;

/// Counters reset every window; RTT estimates persist across windows.
#[derive(Debug, Default)]
pub struct EncodeStats {
    num_frames: u32,
    total_ms: f64,
    max_ms: f64,
}

impl EncodeStats {
    pub fn record(&mut self, encode_ms: f64) {
        self.num_frames += 1;
        self.total_ms += encode_ms;
        self.max_ms = self.max_ms.max(encode_ms);
    }

    pub fn log_window(&mut self, rtt: &RttEstimator) {
        info!("frames encoded in the last ~1s: {}", self.num_frames);
        if self.num_frames > 0 {
            info!(
                "  - avg/max encoding time (ms): {:.2}/{:.2}",
                self.total_ms / self.num_frames as f64,
                self.max_ms
            );
        }
        if let (Some(min), Some(ewma)) = (rtt.min_rtt_us(), rtt.ewma_rtt_us()) {
            info!(
                "  - min/EWMA RTT (ms): {:.2}/{:.2}",
                min as f64 / 1000.0,
                ewma / 1000.0
            );
        }

        self.num_frames = 0;
        self.total_ms = 0.0;
        self.max_ms = 0.0;
    }
}
