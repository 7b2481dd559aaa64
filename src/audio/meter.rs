// Output metering - lock-free level readout for the UI
// The render side writes block peaks, the UI polls once per frame

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// f32 shared between threads, stored as its bit pattern
#[derive(Debug, Clone)]
pub struct AtomicF32 {
    inner: Arc<AtomicU32>,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    pub fn set(&self, value: f32) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

/// Output level reading for UI metering
pub trait Meter {
    /// Current level in dBFS
    fn read(&self) -> f32;
}

pub fn linear_to_db(level: f32) -> f32 {
    if level > 0.0 {
        20.0 * level.log10()
    } else {
        f32::NEG_INFINITY
    }
}

/// Peak of the most recent block, shared between writer and reader
#[derive(Debug, Clone)]
pub struct PeakMeter {
    peak_db: AtomicF32,
}

impl PeakMeter {
    pub fn new() -> Self {
        Self {
            peak_db: AtomicF32::new(f32::NEG_INFINITY),
        }
    }

    /// Record the peak of a block of samples
    pub fn update(&self, samples: &[f32]) {
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        self.peak_db.set(linear_to_db(peak));
    }

    pub fn reset(&self) {
        self.peak_db.set(f32::NEG_INFINITY);
    }
}

impl Default for PeakMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter for PeakMeter {
    fn read(&self) -> f32 {
        self.peak_db.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_meter() {
        let meter = PeakMeter::new();
        assert_eq!(meter.read(), f32::NEG_INFINITY);

        let reader = meter.clone();
        meter.update(&[0.1, -0.5, 0.25]);
        assert!((reader.read() - (-6.0206)).abs() < 0.01);

        meter.update(&[0.0; 4]);
        assert_eq!(reader.read(), f32::NEG_INFINITY);
        meter.update(&[1.0]);
        assert_eq!(reader.read(), 0.0);
        meter.reset();
        assert_eq!(reader.read(), f32::NEG_INFINITY);
    }
}
