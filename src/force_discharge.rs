use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::quantity::Millivolts;

/// Cell-voltage thresholds driving the force-discharge hysteresis,
/// strictly ordered `start > discharge > block`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedThresholds")]
pub struct Thresholds {
    /// Start forcing discharge when the max cell voltage exceeds this,
    /// e.g. 3660 mV.
    start: Millivolts,

    /// Keep forcing discharge while the max cell voltage exceeds this,
    /// e.g. 3640 mV.
    discharge: Millivolts,

    /// After a forced discharge, keep blocking charge while the max cell
    /// voltage exceeds this, e.g. 3450 mV.
    block: Millivolts,
}

impl Thresholds {
    pub fn try_new(
        start: Millivolts,
        discharge: Millivolts,
        block: Millivolts,
    ) -> Result<Self, InvalidThresholds> {
        let all_finite = [start, discharge, block].iter().all(|voltage| voltage.is_finite());
        if all_finite && start > discharge && discharge > block {
            Ok(Self { start, discharge, block })
        } else {
            Err(InvalidThresholds { start, discharge, block })
        }
    }
}

#[derive(Copy, Clone, Deserialize)]
struct UncheckedThresholds {
    start: Millivolts,
    discharge: Millivolts,
    block: Millivolts,
}

impl TryFrom<UncheckedThresholds> for Thresholds {
    type Error = InvalidThresholds;

    fn try_from(unchecked: UncheckedThresholds) -> Result<Self, Self::Error> {
        Self::try_new(unchecked.start, unchecked.discharge, unchecked.block)
    }
}

/// Threshold construction failure. Fatal: no handler is built from a bad
/// threshold set.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error(
    "force-discharge thresholds must be finite and strictly ordered \
     start > discharge > block, got {start}, {discharge}, {block}"
)]
pub struct InvalidThresholds {
    pub start: Millivolts,
    pub discharge: Millivolts,
    pub block: Millivolts,
}

/// Force-discharge hysteresis state.
///
/// Driven purely by the latest max-cell-voltage sample against the
/// thresholds — no timers involved.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum State {
    /// The cell voltage is in the safe band.
    #[default]
    Normal,

    /// Actively forcing discharge to bring the cell voltage down.
    ForceDischarge,

    /// The voltage relaxed below the discharge threshold; charging stays
    /// blocked until it also falls below the block threshold.
    BlockCharge,
}

impl State {
    #[must_use]
    pub fn next(self, voltage: Millivolts, thresholds: &Thresholds) -> Self {
        match self {
            Self::Normal if voltage > thresholds.start => Self::ForceDischarge,
            Self::Normal => Self::Normal,
            Self::ForceDischarge if voltage > thresholds.discharge => Self::ForceDischarge,
            Self::ForceDischarge => Self::BlockCharge,
            // Re-arm if the voltage climbs over the start threshold again:
            Self::BlockCharge if voltage > thresholds.start => Self::ForceDischarge,
            Self::BlockCharge if voltage > thresholds.block => Self::BlockCharge,
            Self::BlockCharge => Self::Normal,
        }
    }

    /// While engaged, the charge direction is forced to zero amperes.
    pub const fn is_charge_blocked(self) -> bool {
        matches!(self, Self::ForceDischarge | Self::BlockCharge)
    }
}

/// The over-voltage protection attached to a charge handler.
#[derive(Copy, Clone, Debug)]
pub struct ForceDischarge {
    thresholds: Thresholds,
    state: State,
}

impl ForceDischarge {
    pub const fn new(thresholds: Thresholds) -> Self {
        Self { thresholds, state: State::Normal }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    /// Feed the cycle's max-cell-voltage sample and return the new state.
    ///
    /// A missing sample holds the current state: without a measurement there
    /// is nothing to transition on, and the derate fail-safe already forces
    /// the charge output to zero for that cycle.
    pub fn update(&mut self, voltage: Option<Millivolts>) -> State {
        if let Some(voltage) = voltage {
            let next = self.state.next(voltage, &self.thresholds);
            if next != self.state {
                debug!(from = ?self.state, to = ?next, %voltage, "force-discharge transition");
                self.state = next;
            }
        }
        self.state
    }
}
