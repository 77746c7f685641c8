#[macro_use]
mod macros;

pub mod current;
pub mod proportions;
pub mod temperature;
pub mod voltage;

pub use self::{
    current::{Amperes, AmperesPerSecond},
    proportions::Percent,
    temperature::Celsius,
    voltage::Millivolts,
};
