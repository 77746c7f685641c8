use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::quantity::Percent;

/// Single vertex of a derating curve.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint<X> {
    pub x: X,
    pub percent: Percent,
}

impl<X> CurvePoint<X> {
    pub const fn new(x: X, percent: Percent) -> Self {
        Self { x, percent }
    }
}

/// Piecewise-linear mapping from a measurement to a derating percentage.
///
/// Outside the defined domain the nearest endpoint's percentage applies —
/// the curve never extrapolates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    bound(
        serialize = "X: Copy + Serialize",
        deserialize = "X: Copy + Into<f64> + ::serde::Deserialize<'de>"
    ),
    into = "Vec<CurvePoint<X>>",
    try_from = "Vec<CurvePoint<X>>"
)]
pub struct Curve<X: Copy> {
    points: Vec<CurvePoint<X>>,
}

impl<X: Copy + Into<f64>> Curve<X> {
    pub fn try_from_points(
        points: impl IntoIterator<Item = CurvePoint<X>>,
    ) -> Result<Self, InvalidCurve> {
        let points: Vec<CurvePoint<X>> = points.into_iter().collect();
        if points.is_empty() {
            return Err(InvalidCurve::Empty);
        }
        for point in &points {
            let x: f64 = point.x.into();
            if !x.is_finite() {
                return Err(InvalidCurve::NonFiniteX { x });
            }
            if !point.percent.is_finite()
                || point.percent < Percent::ZERO
                || point.percent > Percent::HUNDRED
            {
                return Err(InvalidCurve::PercentOutOfRange { percent: point.percent });
            }
        }
        let strictly_increasing = points.iter().tuple_windows().all(|(lower, upper)| {
            let (lower_x, upper_x): (f64, f64) = (lower.x.into(), upper.x.into());
            lower_x < upper_x
        });
        if !strictly_increasing {
            return Err(InvalidCurve::NotStrictlyIncreasing);
        }
        Ok(Self { points })
    }

    /// Map the measurement to its derating percentage.
    pub fn evaluate(&self, x: X) -> Percent {
        let x: f64 = x.into();
        // Number of points at or below the measurement:
        let index = self.points.partition_point(|point| {
            let point_x: f64 = point.x.into();
            point_x <= x
        });
        let Some(upper) = self.points.get(index).copied() else {
            // At or beyond the largest defined x:
            return self.points[self.points.len() - 1].percent;
        };
        let Some(lower) = index.checked_sub(1).map(|index| self.points[index]) else {
            // At or below the smallest defined x:
            return upper.percent;
        };
        let (x0, y0) = (lower.x.into(), lower.percent.0);
        let (x1, y1) = (upper.x.into(), upper.percent.0);
        Percent(y0 + (x - x0) * (y1 - y0) / (x1 - x0))
    }
}

impl<X: Copy + Into<f64>> TryFrom<Vec<CurvePoint<X>>> for Curve<X> {
    type Error = InvalidCurve;

    fn try_from(points: Vec<CurvePoint<X>>) -> Result<Self, Self::Error> {
        Self::try_from_points(points)
    }
}

impl<X: Copy> From<Curve<X>> for Vec<CurvePoint<X>> {
    fn from(curve: Curve<X>) -> Self {
        curve.points
    }
}

/// Curve construction failure. Fatal: no handler is built from a bad curve.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum InvalidCurve {
    #[error("a derating curve requires at least one point")]
    Empty,

    #[error("curve x-values must be strictly increasing")]
    NotStrictlyIncreasing,

    #[error("curve x-values must be finite, got {x}")]
    NonFiniteX { x: f64 },

    #[error("curve percentages must lie within 0-100 %, got {percent}")]
    PercentOutOfRange { percent: Percent },
}
