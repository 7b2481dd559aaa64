// Step - One 16th-note slot of a pattern grid
// 0 = silent, 1 = single hit, 2/3/4 = roll with that many evenly spaced sub-hits

use serde::{Deserialize, Serialize};

/// A step value in {0, 1, 2, 3, 4}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Step(u8);

impl Step {
    pub const OFF: Step = Step(0);
    pub const HIT: Step = Step(1);

    /// Create a step value, saturating anything above 4 to a 4-hit roll
    pub fn new(value: u8) -> Self {
        Self(value.min(4))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_active(self) -> bool {
        self.0 > 0
    }

    /// Number of sub-hits this step triggers
    pub fn sub_hits(self) -> usize {
        self.0 as usize
    }

    /// Next value of the toggle cycle `0 -> 1 -> 2 -> 4 -> 3 -> 1`
    pub fn cycled(self) -> Self {
        match self.0 {
            0 => Step(1),
            1 => Step(2),
            2 => Step(4),
            4 => Step(3),
            _ => Step(1),
        }
    }

    /// Offsets of each sub-hit within the step, in fractions of a step
    pub fn sub_hit_offsets(self) -> impl Iterator<Item = f64> {
        let hits = self.sub_hits();
        (0..hits).map(move |i| i as f64 / hits as f64)
    }
}

impl From<u8> for Step {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> Self {
        step.0
    }
}
