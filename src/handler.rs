use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use crate::{
    curve::Curve,
    error::Error,
    force_discharge::{ForceDischarge, State, Thresholds},
    protection::CellSample,
    quantity::{Amperes, AmperesPerSecond, Celsius, Millivolts, Percent},
    ramp::Ramp,
};

/// Construction-time configuration shared by the charge and discharge
/// directions.
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    /// Seed for the max-ever-allowed ratchet. Must be finite and positive:
    /// it is the reference all percentage derates scale against.
    pub initial_max_ever_current: Amperes,

    /// Cell-voltage derating. Absent means no derating on this axis.
    pub voltage_to_percent: Option<Curve<Millivolts>>,

    /// Cell-temperature derating. Absent means no derating on this axis.
    pub temperature_to_percent: Option<Curve<Celsius>>,

    /// Cap on how fast the allowed current may grow. Absent means unbounded.
    pub max_increase_per_second: Option<AmperesPerSecond>,
}

impl HandlerConfig {
    pub const fn new(initial_max_ever_current: Amperes) -> Self {
        Self {
            initial_max_ever_current,
            voltage_to_percent: None,
            temperature_to_percent: None,
            max_increase_per_second: None,
        }
    }
}

/// The only difference between the two directions: charging may be vetoed
/// by the over-voltage protection, discharging never is — discharging is
/// the remedial action.
#[derive(Copy, Clone, Debug)]
enum Mode {
    Charge { force_discharge: Option<ForceDischarge> },
    Discharge,
}

/// Per-cycle engine computing the allowed current for one direction of one
/// battery.
///
/// The runtime state is thread-confined: the handler is built once, handed
/// to the cycle thread, and its `compute` calls must be serialized by the
/// caller.
#[derive(Clone, Debug)]
pub struct MaxCurrentHandler {
    voltage_to_percent: Option<Curve<Millivolts>>,
    temperature_to_percent: Option<Curve<Celsius>>,
    ramp: Ramp,
    mode: Mode,

    /// Monotonically non-decreasing reference the percentage derates scale
    /// against. Seeded from configuration, grown by BMS reports, reset only
    /// by rebuilding the handler.
    max_ever_allowed: Amperes,

    /// Timestamp and value of the previous cycle's output.
    previous: Option<(DateTime<Utc>, Amperes)>,
}

impl MaxCurrentHandler {
    /// Build the charge-direction handler.
    ///
    /// Without thresholds the over-voltage state machine is disabled and the
    /// charge current is only derated by curves, ratchet, and ramp — for
    /// batteries without documented force-discharge behaviour.
    pub fn charge(config: HandlerConfig, thresholds: Option<Thresholds>) -> Result<Self, Error> {
        Self::new(config, Mode::Charge { force_discharge: thresholds.map(ForceDischarge::new) })
    }

    /// Build the discharge-direction handler.
    pub fn discharge(config: HandlerConfig) -> Result<Self, Error> {
        Self::new(config, Mode::Discharge)
    }

    fn new(config: HandlerConfig, mode: Mode) -> Result<Self, Error> {
        let initial = config.initial_max_ever_current;
        if !initial.is_finite() || initial <= Amperes::ZERO {
            return Err(Error::NonPositiveInitialCurrent(initial));
        }
        Ok(Self {
            voltage_to_percent: config.voltage_to_percent,
            temperature_to_percent: config.temperature_to_percent,
            ramp: Ramp::new(config.max_increase_per_second),
            mode,
            max_ever_allowed: initial,
            previous: None,
        })
    }

    /// Compute the cycle's allowed current from the latest telemetry.
    ///
    /// Never fails: a missing or non-finite measurement on a derated axis
    /// collapses that axis to 0 %, so the output falls toward zero instead
    /// of the update being skipped.
    pub fn compute(&mut self, sample: &CellSample, now: DateTime<Utc>) -> Amperes {
        let voltage = sample.max_cell_voltage.filter(|voltage| voltage.is_finite());
        let temperature =
            sample.max_cell_temperature.filter(|temperature| temperature.is_finite());

        let voltage_percent = derate(self.voltage_to_percent.as_ref(), voltage, "max_cell_voltage");
        let temperature_percent =
            derate(self.temperature_to_percent.as_ref(), temperature, "max_cell_temperature");
        // The more restrictive axis wins:
        let effective_percent = voltage_percent.min(temperature_percent);

        // A higher BMS report proves higher capability; a lower one never
        // shrinks the long-term ceiling:
        if let Some(bms_limit) = self.bms_limit(sample).filter(|limit| limit.is_finite()) {
            self.max_ever_allowed = self.max_ever_allowed.max(bms_limit);
        }

        let candidate = self.max_ever_allowed.derate(effective_percent);
        let limited = match self.previous {
            Some((previous_at, previous)) => {
                self.ramp.limit(candidate, previous, Some(now - previous_at))
            }
            None => candidate,
        };

        let charge_blocked = match &mut self.mode {
            Mode::Charge { force_discharge: Some(force_discharge) } => {
                force_discharge.update(voltage).is_charge_blocked()
            }
            Mode::Charge { force_discharge: None } | Mode::Discharge => false,
        };
        let allowed = if charge_blocked { Amperes::ZERO } else { limited };
        let allowed = allowed.clamp(Amperes::ZERO, self.max_ever_allowed);

        trace!(
            %voltage_percent,
            %temperature_percent,
            %effective_percent,
            max_ever_allowed = %self.max_ever_allowed,
            %allowed,
            "computed allowed current"
        );
        self.previous = Some((now, allowed));
        allowed
    }

    /// Current ratchet ceiling.
    pub const fn max_ever_allowed(&self) -> Amperes {
        self.max_ever_allowed
    }

    /// Over-voltage protection state, for charge handlers with thresholds
    /// configured.
    pub const fn force_discharge_state(&self) -> Option<State> {
        match &self.mode {
            Mode::Charge { force_discharge: Some(force_discharge) } => {
                Some(force_discharge.state())
            }
            Mode::Charge { force_discharge: None } | Mode::Discharge => None,
        }
    }

    const fn bms_limit(&self, sample: &CellSample) -> Option<Amperes> {
        match self.mode {
            Mode::Charge { .. } => sample.bms_charge_limit,
            Mode::Discharge => sample.bms_discharge_limit,
        }
    }
}

/// One axis' contribution to the combined derating percentage.
fn derate<X: Copy + Into<f64>>(
    curve: Option<&Curve<X>>,
    measurement: Option<X>,
    axis: &'static str,
) -> Percent {
    let Some(curve) = curve else {
        // No curve configured — this axis never derates:
        return Percent::HUNDRED;
    };
    measurement.map_or_else(
        || {
            // Fail safe: without a usable measurement, assume the worst.
            warn!(axis, "measurement missing or non-finite, derating to zero");
            Percent::ZERO
        },
        |value| curve.evaluate(value),
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::TimeDelta;

    use super::*;
    use crate::curve::CurvePoint;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + TimeDelta::seconds(seconds)
    }

    fn voltage_curve() -> Curve<Millivolts> {
        Curve::try_from_points([
            CurvePoint::new(Millivolts(3000.0), Percent::HUNDRED),
            CurvePoint::new(Millivolts(3500.0), Percent::ZERO),
        ])
        .unwrap()
    }

    #[test]
    fn test_steady_state_without_derating() {
        let mut handler =
            MaxCurrentHandler::charge(HandlerConfig::new(Amperes(100.0)), None).unwrap();
        let sample = CellSample::builder().max_cell_voltage(Millivolts(3300.0)).build();
        for cycle in 0..5 {
            assert_eq!(handler.compute(&sample, at(cycle)), Amperes(100.0));
        }
    }

    #[test]
    fn test_ratchet_grows_and_never_shrinks() {
        let mut handler =
            MaxCurrentHandler::charge(HandlerConfig::new(Amperes(100.0)), None).unwrap();
        let reports = [Some(120.0), Some(80.0), None, Some(119.0)];
        for (cycle, report) in reports.into_iter().enumerate() {
            let sample = CellSample::builder()
                .max_cell_voltage(Millivolts(3300.0))
                .maybe_bms_charge_limit(report.map(Amperes))
                .build();
            let allowed = handler.compute(&sample, at(i64::try_from(cycle).unwrap()));
            assert_eq!(allowed, Amperes(120.0));
            assert_eq!(handler.max_ever_allowed(), Amperes(120.0));
        }
    }

    #[test]
    fn test_missing_voltage_fails_safe() {
        let mut config = HandlerConfig::new(Amperes(100.0));
        config.voltage_to_percent = Some(voltage_curve());
        let mut handler = MaxCurrentHandler::charge(config, None).unwrap();
        assert_eq!(handler.compute(&CellSample::builder().build(), at(0)), Amperes::ZERO);
        // The ratchet is untouched — the next good sample recovers:
        assert_eq!(handler.max_ever_allowed(), Amperes(100.0));
        let good = CellSample::builder().max_cell_voltage(Millivolts(3000.0)).build();
        assert_eq!(handler.compute(&good, at(1)), Amperes(100.0));
    }

    #[test]
    fn test_non_finite_voltage_fails_safe() {
        let mut config = HandlerConfig::new(Amperes(100.0));
        config.voltage_to_percent = Some(voltage_curve());
        let mut handler = MaxCurrentHandler::charge(config, None).unwrap();
        let sample = CellSample::builder().max_cell_voltage(Millivolts(f64::NAN)).build();
        assert_eq!(handler.compute(&sample, at(0)), Amperes::ZERO);
    }

    #[test]
    fn test_dominant_constraint_is_minimum_not_average() {
        let mut config = HandlerConfig::new(Amperes(100.0));
        config.voltage_to_percent = Some(voltage_curve());
        config.temperature_to_percent = Some(
            Curve::try_from_points([
                CurvePoint::new(Celsius(0.0), Percent::HUNDRED),
                CurvePoint::new(Celsius(50.0), Percent::ZERO),
            ])
            .unwrap(),
        );
        let mut handler = MaxCurrentHandler::charge(config, None).unwrap();
        // Voltage axis says 100 %, temperature axis says 20 %:
        let sample = CellSample::builder()
            .max_cell_voltage(Millivolts(3000.0))
            .max_cell_temperature(Celsius(40.0))
            .build();
        assert_relative_eq!(handler.compute(&sample, at(0)).0, 20.0);
    }

    #[test]
    fn test_ramp_up_is_capped_and_drop_is_immediate() {
        let mut config = HandlerConfig::new(Amperes(100.0));
        config.voltage_to_percent = Some(voltage_curve());
        config.max_increase_per_second = Some(AmperesPerSecond(5.0));
        let mut handler = MaxCurrentHandler::charge(config, None).unwrap();

        // First cycle has no measurement, so the output starts at zero:
        assert_eq!(handler.compute(&CellSample::builder().build(), at(0)), Amperes::ZERO);

        // Recovery is ramped at 5 A/s:
        let good = CellSample::builder().max_cell_voltage(Millivolts(3000.0)).build();
        assert_eq!(handler.compute(&good, at(1)), Amperes(5.0));
        assert_eq!(handler.compute(&good, at(2)), Amperes(10.0));

        // A derate to 2 % applies immediately, no ramp on the way down:
        let hot = CellSample::builder().max_cell_voltage(Millivolts(3490.0)).build();
        assert_relative_eq!(handler.compute(&hot, at(3)).0, 2.0);
    }

    #[test]
    fn test_first_cycle_is_not_rate_limited() {
        let mut config = HandlerConfig::new(Amperes(100.0));
        config.max_increase_per_second = Some(AmperesPerSecond(5.0));
        let mut handler = MaxCurrentHandler::charge(config, None).unwrap();
        let sample = CellSample::builder().max_cell_voltage(Millivolts(3300.0)).build();
        assert_eq!(handler.compute(&sample, at(0)), Amperes(100.0));
    }

    #[test]
    fn test_force_discharge_zeroes_charge_current() {
        let thresholds =
            Thresholds::try_new(Millivolts(3660.0), Millivolts(3640.0), Millivolts(3450.0))
                .unwrap();
        let mut handler =
            MaxCurrentHandler::charge(HandlerConfig::new(Amperes(100.0)), Some(thresholds))
                .unwrap();

        let outputs: Vec<Amperes> = [3661.0, 3641.0, 3451.0, 3449.0]
            .into_iter()
            .enumerate()
            .map(|(cycle, millivolts)| {
                let sample =
                    CellSample::builder().max_cell_voltage(Millivolts(millivolts)).build();
                handler.compute(&sample, at(i64::try_from(cycle).unwrap()))
            })
            .collect();
        assert_eq!(
            outputs,
            [Amperes::ZERO, Amperes::ZERO, Amperes::ZERO, Amperes(100.0)],
        );
        assert_eq!(handler.force_discharge_state(), Some(State::Normal));
    }

    #[test]
    fn test_charge_without_thresholds_is_never_blocked() {
        let mut handler =
            MaxCurrentHandler::charge(HandlerConfig::new(Amperes(100.0)), None).unwrap();
        let sample = CellSample::builder().max_cell_voltage(Millivolts(3700.0)).build();
        assert_eq!(handler.compute(&sample, at(0)), Amperes(100.0));
        assert_eq!(handler.force_discharge_state(), None);
    }

    #[test]
    fn test_discharge_is_unaffected_by_overvoltage() {
        let mut handler =
            MaxCurrentHandler::discharge(HandlerConfig::new(Amperes(100.0))).unwrap();
        let sample = CellSample::builder().max_cell_voltage(Millivolts(3700.0)).build();
        assert_eq!(handler.compute(&sample, at(0)), Amperes(100.0));
    }

    #[test]
    fn test_ratchet_uses_direction_matching_bms_report() {
        let mut handler =
            MaxCurrentHandler::discharge(HandlerConfig::new(Amperes(100.0))).unwrap();
        let sample = CellSample::builder()
            .max_cell_voltage(Millivolts(3300.0))
            .bms_charge_limit(Amperes(500.0))
            .bms_discharge_limit(Amperes(130.0))
            .build();
        handler.compute(&sample, at(0));
        assert_eq!(handler.max_ever_allowed(), Amperes(130.0));
    }

    #[test]
    fn test_rejects_non_positive_seed() {
        assert_eq!(
            MaxCurrentHandler::discharge(HandlerConfig::new(Amperes::ZERO)).unwrap_err(),
            Error::NonPositiveInitialCurrent(Amperes::ZERO),
        );
        assert!(MaxCurrentHandler::discharge(HandlerConfig::new(Amperes(f64::NAN))).is_err());
    }
}
