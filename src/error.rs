use crate::{curve::InvalidCurve, force_discharge::InvalidThresholds, quantity::Amperes};

/// Construction-time failure.
///
/// These surface before a handler is handed to the cycle thread: a battery
/// must never run with a misconfigured handler. Per-cycle computation never
/// fails — missing measurements degrade the output instead.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    InvalidCurve(#[from] InvalidCurve),

    #[error(transparent)]
    InvalidThresholds(#[from] InvalidThresholds),

    #[error("initial max-ever-allowed current must be finite and positive, got {0}")]
    NonPositiveInitialCurrent(Amperes),
}
