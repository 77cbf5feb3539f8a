//! Facility classification and operating status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    Court,
    Pool,
    Gym,
    Field,
}

impl FacilityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Court => "court",
            Self::Pool => "pool",
            Self::Gym => "gym",
            Self::Field => "field",
        }
    }
}

impl FromStr for FacilityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "court" => Ok(Self::Court),
            "pool" => Ok(Self::Pool),
            "gym" => Ok(Self::Gym),
            "field" => Ok(Self::Field),
            other => Err(format!("unknown facility type '{other}'")),
        }
    }
}

/// Operating status. The only facility field the core mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityStatus {
    Active,
    Maintenance,
    Closed,
}

impl FacilityStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Closed => "closed",
        }
    }

    pub fn accepts_bookings(self) -> bool {
        self != Self::Closed
    }
}

impl fmt::Display for FacilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacilityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "maintenance" => Ok(Self::Maintenance),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown facility status '{other}'")),
        }
    }
}
