//! Round-trip time estimation from ACK timestamp echoes.

/// Weight of a new sample in the EWMA.
const ALPHA: f64 = 0.2;

/// Running minimum and exponentially weighted moving average of RTT samples,
/// in microseconds. Both are `None` until the first sample arrives.
#[derive(Debug, Default)]
pub struct RttEstimator {
    min_rtt_us: Option<u64>,
    ewma_rtt_us: Option<f64>,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, rtt_us: u64) {
        if self.min_rtt_us.map_or(true, |min| rtt_us < min) {
            self.min_rtt_us = Some(rtt_us);
        }

        self.ewma_rtt_us = Some(match self.ewma_rtt_us {
            None => rtt_us as f64,
            Some(ewma) => ALPHA * rtt_us as f64 + (1.0 - ALPHA) * ewma,
        });
    }

    pub fn min_rtt_us(&self) -> Option<u64> {
        self.min_rtt_us
    }

    pub fn ewma_rtt_us(&self) -> Option<f64> {
        self.ewma_rtt_us
    }
}
