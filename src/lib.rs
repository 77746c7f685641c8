//! Battery charge/discharge current protection.
//!
//! Once per control cycle the engine computes the maximum current a battery
//! may safely be charged or discharged with, from the live max-cell-voltage
//! and max-cell-temperature telemetry:
//!
//! 1. each configured derating curve maps its measurement to a percentage,
//! 2. the more restrictive axis wins,
//! 3. the percentage scales the max-ever-allowed ratchet, which only grows
//!    as the BMS reports higher capability,
//! 4. increases are ramp-limited, decreases apply immediately,
//! 5. the charge direction may be forced to zero by the over-voltage
//!    hysteresis,
//! 6. the result is clamped into `[0, max-ever-allowed]`.
//!
//! A missing measurement never skips the update: the affected axis derates
//! to zero, so the output falls toward the safe side. Channel plumbing,
//! scheduling, and device transport belong to the host runtime.

pub mod curve;
pub mod error;
pub mod force_discharge;
pub mod handler;
pub mod protection;
pub mod quantity;
pub mod ramp;

pub use self::{
    curve::{Curve, CurvePoint, InvalidCurve},
    error::Error,
    force_discharge::{ForceDischarge, InvalidThresholds, State, Thresholds},
    handler::{HandlerConfig, MaxCurrentHandler},
    protection::{BatteryProtection, CellSample, Definition, Limits},
    quantity::{Amperes, AmperesPerSecond, Celsius, Millivolts, Percent},
    ramp::Ramp,
};
