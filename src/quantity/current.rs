use std::ops::Mul;

use chrono::TimeDelta;

use crate::quantity::Percent;

quantity!(Amperes, "A");
quantity!(AmperesPerSecond, "A/s");

impl Amperes {
    /// Scale by a derating percentage.
    pub const fn derate(self, percent: Percent) -> Self {
        Self(self.0 * percent.0 / 100.0)
    }

    pub const fn clamp(self, min: Self, max: Self) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

impl Mul<TimeDelta> for AmperesPerSecond {
    type Output = Amperes;

    fn mul(self, rhs: TimeDelta) -> Self::Output {
        Amperes(self.0 * rhs.as_seconds_f64())
    }
}
