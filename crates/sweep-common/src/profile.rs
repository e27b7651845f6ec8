//! Travel profiles and their assumed speeds.
//!
//! Speeds mirror `route_calculator.py::_calculate_route_stats`'s hardcoded
//! table; they describe the planner's own time estimate, independent of
//! whatever per-edge speed `GraphBuilder` assigned from `highway` tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    DrivingCar,
    DrivingHgv,
    CyclingRegular,
    FootWalking,
}

impl Profile {
    /// Assumed travel speed, in meters per second, used for route duration
    /// estimates in `RouteAssembler`.
    pub fn speed_mps(self) -> f64 {
        match self {
            Profile::DrivingCar => 10.0,
            Profile::DrivingHgv => 8.0,
            Profile::CyclingRegular => 4.0,
            Profile::FootWalking => 1.4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::DrivingCar => "driving-car",
            Profile::DrivingHgv => "driving-hgv",
            Profile::CyclingRegular => "cycling-regular",
            Profile::FootWalking => "foot-walking",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driving-car" => Ok(Profile::DrivingCar),
            "driving-hgv" => Ok(Profile::DrivingHgv),
            "cycling-regular" => Ok(Profile::CyclingRegular),
            "foot-walking" => Ok(Profile::FootWalking),
            other => Err(crate::error::Error::InvalidInput(format!(
                "unknown travel profile: {other}"
            ))),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::DrivingCar
    }
}
