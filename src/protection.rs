use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    curve::Curve,
    error::Error,
    force_discharge::Thresholds,
    handler::{HandlerConfig, MaxCurrentHandler},
    quantity::{Amperes, AmperesPerSecond, Celsius, Millivolts},
};

/// Per-cycle snapshot of the battery telemetry the engine consumes.
///
/// Absent fields are measurements the collaborators could not provide this
/// cycle; the engine fails safe on them instead of skipping the update.
#[derive(Copy, Clone, Debug, Default, Builder)]
pub struct CellSample {
    pub max_cell_voltage: Option<Millivolts>,
    pub max_cell_temperature: Option<Celsius>,
    pub bms_charge_limit: Option<Amperes>,
    pub bms_discharge_limit: Option<Amperes>,
}

/// The cycle's outputs: what the inverter may draw from and feed into the
/// battery.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Limits {
    pub charge: Amperes,
    pub discharge: Amperes,
}

/// Declarative protection profile for one battery type.
///
/// The charge side gets the force-discharge thresholds; the discharge side
/// never does — discharging is the remedial action.
#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
pub struct Definition {
    pub initial_charge_current: Amperes,
    pub initial_discharge_current: Amperes,

    #[serde(default)]
    pub charge_voltage_to_percent: Option<Curve<Millivolts>>,

    #[serde(default)]
    pub discharge_voltage_to_percent: Option<Curve<Millivolts>>,

    #[serde(default)]
    pub charge_temperature_to_percent: Option<Curve<Celsius>>,

    #[serde(default)]
    pub discharge_temperature_to_percent: Option<Curve<Celsius>>,

    #[serde(default)]
    pub force_discharge: Option<Thresholds>,

    #[serde(default)]
    pub max_increase_per_second: Option<AmperesPerSecond>,
}

/// Both protection directions for one managed battery.
///
/// Built once per management session; discarded on battery removal. The
/// max-ever-allowed ratchets restart from their configured seeds on
/// rebuild.
#[derive(Clone, Debug)]
pub struct BatteryProtection {
    charge: MaxCurrentHandler,
    discharge: MaxCurrentHandler,
}

impl BatteryProtection {
    pub fn try_from_definition(definition: Definition) -> Result<Self, Error> {
        let charge = MaxCurrentHandler::charge(
            HandlerConfig {
                initial_max_ever_current: definition.initial_charge_current,
                voltage_to_percent: definition.charge_voltage_to_percent,
                temperature_to_percent: definition.charge_temperature_to_percent,
                max_increase_per_second: definition.max_increase_per_second,
            },
            definition.force_discharge,
        )?;
        let discharge = MaxCurrentHandler::discharge(HandlerConfig {
            initial_max_ever_current: definition.initial_discharge_current,
            voltage_to_percent: definition.discharge_voltage_to_percent,
            temperature_to_percent: definition.discharge_temperature_to_percent,
            max_increase_per_second: definition.max_increase_per_second,
        })?;
        Ok(Self { charge, discharge })
    }

    /// Run both directions against the same telemetry snapshot.
    pub fn apply(&mut self, sample: &CellSample, now: DateTime<Utc>) -> Limits {
        Limits {
            charge: self.charge.compute(sample, now),
            discharge: self.discharge.compute(sample, now),
        }
    }

    pub const fn charge(&self) -> &MaxCurrentHandler {
        &self.charge
    }

    pub const fn discharge(&self) -> &MaxCurrentHandler {
        &self.discharge
    }
}
