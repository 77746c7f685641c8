use chrono::TimeDelta;

use crate::quantity::{Amperes, AmperesPerSecond};

/// Bounds how fast an allowed current may grow between cycles.
///
/// Decreases always pass through: tightening a safety limit must never wait.
#[derive(Copy, Clone, Debug, Default)]
pub struct Ramp {
    max_increase_per_second: Option<AmperesPerSecond>,
}

impl Ramp {
    pub const fn new(max_increase_per_second: Option<AmperesPerSecond>) -> Self {
        Self { max_increase_per_second }
    }

    /// Cap the increase of `candidate` over `previous` for the elapsed time.
    ///
    /// Without a configured cap, without a previous cycle (`elapsed` is
    /// `None`), or with a non-positive elapsed time, the candidate passes
    /// through unchanged.
    pub fn limit(
        self,
        candidate: Amperes,
        previous: Amperes,
        elapsed: Option<TimeDelta>,
    ) -> Amperes {
        if candidate <= previous {
            return candidate;
        }
        let (Some(max_increase_per_second), Some(elapsed)) =
            (self.max_increase_per_second, elapsed)
        else {
            return candidate;
        };
        if elapsed <= TimeDelta::zero() {
            return candidate;
        }
        candidate.min(previous + max_increase_per_second * elapsed)
    }
}
