// Timeline - Musical time for the step sequencer
// Converts between 16th-note steps, bars and seconds at a given tempo and swing

use std::fmt;

/// Number of 16th-note steps in one bar (4/4 only)
pub const STEPS_PER_BAR: usize = 16;

/// Number of 16th-note steps in one quarter-note beat
pub const STEPS_PER_BEAT: usize = 4;

/// Number of bars addressable by the song arranger
pub const MAX_SONG_BARS: usize = 72;

/// Number of steps covered by song-mode playback
pub const SONG_STEPS: usize = MAX_SONG_BARS * STEPS_PER_BAR;

/// Number of playlist tracks
pub const TRACK_COUNT: usize = 32;

/// Swing amounts at or below this value are treated as disabled
pub const SWING_THRESHOLD: f64 = 0.01;

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo
    /// Out-of-range values are clamped to [20.0, 999.0]
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: Self::sanitize(bpm),
        }
    }

    fn sanitize(bpm: f64) -> f64 {
        if bpm.is_finite() {
            bpm.clamp(Self::MIN_BPM, Self::MAX_BPM)
        } else {
            120.0
        }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set BPM value (clamped)
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = Self::sanitize(bpm);
    }

    /// Duration of one quarter-note beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one 16th-note step in seconds (`60 / bpm / 4`)
    pub fn step_duration_seconds(&self) -> f64 {
        60.0 / self.bpm / STEPS_PER_BEAT as f64
    }

    /// Duration of one bar (16 steps) in seconds
    pub fn bar_duration_seconds(&self) -> f64 {
        self.step_duration_seconds() * STEPS_PER_BAR as f64
    }

    /// Convert a (possibly fractional) number of steps to seconds
    pub fn steps_to_seconds(&self, steps: f64) -> f64 {
        steps * self.step_duration_seconds()
    }

    /// Convert seconds to a fractional number of steps
    pub fn seconds_to_steps(&self, seconds: f64) -> f64 {
        seconds / self.step_duration_seconds()
    }

    /// Convert a (possibly fractional) number of bars to seconds
    pub fn bars_to_seconds(&self, bars: f64) -> f64 {
        bars * self.bar_duration_seconds()
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Swing amount (0.0 = straight, 1.0 = off-beats delayed by half a step)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Swing {
    amount: f64,
}

impl Swing {
    pub fn new(amount: f64) -> Self {
        let amount = if amount.is_finite() {
            amount.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { amount }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Whether swing shifts off-beat steps at all
    pub fn is_active(&self) -> bool {
        self.amount > SWING_THRESHOLD
    }

    /// Delay applied to a step: odd steps move by `amount * step / 2`
    pub fn offset_seconds(&self, step_index: u64, step_seconds: f64) -> f64 {
        if self.is_active() && step_index % 2 == 1 {
            self.amount * (step_seconds / 2.0)
        } else {
            0.0
        }
    }
}

/// Maps step indices onto absolute clock time
///
/// Every trigger time is derived from the step index and the origin, never by
/// accumulating per-step deltas, so long songs do not drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepClock {
    pub tempo: Tempo,
    pub swing: Swing,
    /// Clock time (seconds) of step 0
    pub origin: f64,
}

impl StepClock {
    pub fn new(tempo: Tempo, swing: Swing, origin: f64) -> Self {
        Self {
            tempo,
            swing,
            origin,
        }
    }

    pub fn step_seconds(&self) -> f64 {
        self.tempo.step_duration_seconds()
    }

    /// Absolute time of a step without swing
    pub fn straight_time(&self, step_index: u64) -> f64 {
        self.origin + step_index as f64 * self.step_seconds()
    }

    /// Absolute time of a step including swing
    pub fn step_time(&self, step_index: u64) -> f64 {
        let step_seconds = self.step_seconds();
        self.origin
            + step_index as f64 * step_seconds
            + self.swing.offset_seconds(step_index, step_seconds)
    }

    /// Fractional step position of a clock time (negative before the origin)
    pub fn position_steps(&self, now: f64) -> f64 {
        (now - self.origin) / self.step_seconds()
    }

    /// Re-anchor the clock for a new tempo so that `now` keeps its musical position
    pub fn retimed(&self, tempo: Tempo, now: f64) -> Self {
        let position = self.position_steps(now);
        Self {
            tempo,
            swing: self.swing,
            origin: now - position * tempo.step_duration_seconds(),
        }
    }
}
