//! Values exchanged with the controller, as callers see them.

use std::net::Ipv4Addr;

use serde::Serialize;

use crate::codec::{Application, register_enum};

/// Outdoor temperatures the controller defines its heat curve at, in °C.
pub const OUTDOOR_TEMPERATURES: [i16; 6] = [-30, -15, -5, 0, 5, 15];

/// A heating circuit, 1 through 3.
///
/// Obtain one with [`crate::validate::circuit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Circuit(u8);

impl Circuit {
    pub const HEATING: Circuit = Circuit(1);
    pub const WARM_WATER: Circuit = Circuit(2);
    /// Only present when the controller is fitted with the extension for a third loop.
    pub const THIRD: Circuit = Circuit(3);
    pub const ALL: [Circuit; 3] = [Self::HEATING, Self::WARM_WATER, Self::THIRD];

    pub(crate) const fn new_unchecked(number: u8) -> Self {
        Circuit(number)
    }

    pub const fn number(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvePoint {
    pub outdoor_temp: i16,
    pub flow_temp: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatCurve {
    pub circuit: Circuit,
    pub slope: f32,
    pub min_flow_temp: u16,
    pub max_flow_temp: u16,
    pub curve_points: [CurvePoint; 6],
}

/// Requested change of a heat curve by its slope. `None` leaves the value as it is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlopeUpdate {
    pub slope: Option<f32>,
    pub min_flow_temp: Option<i32>,
    pub max_flow_temp: Option<i32>,
}

/// Requested flow temperature at one of the [`OUTDOOR_TEMPERATURES`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointUpdate {
    pub outdoor_temp: i32,
    pub flow_temp: i32,
}

impl std::str::FromStr for PointUpdate {
    type Err = String;

    /// Parses `OUTDOOR:FLOW`, e.g. `-15:63`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (outdoor, flow) =
            s.split_once(':').ok_or_else(|| format!("`{s}` is not in OUTDOOR:FLOW form"))?;
        let parse = |v: &str| v.trim().parse::<i32>().map_err(|e| format!("`{v}`: {e}"));
        Ok(PointUpdate { outdoor_temp: parse(outdoor)?, flow_temp: parse(flow)? })
    }
}

/// Requested change of a heat curve by its individual points. `None` leaves limits as they are.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointsUpdate {
    pub min_flow_temp: Option<i32>,
    pub max_flow_temp: Option<i32>,
    pub curve_points: Vec<PointUpdate>,
}

register_enum! {
    pub enum CircuitMode as "circuit mode" {
        Manual = 0,
        Scheduled = 1,
        ConstantComfortTemp = 2,
        ConstantSetbackTemp = 3,
        FrostProtection = 4,
    }
}

register_enum! {
    pub enum CircuitState as "circuit state" {
        Setback = 0,
        PreComfort = 1,
        Comfort = 2,
        PreSetback = 3,
    }
}

register_enum! {
    /// How the controller obtains its IP configuration.
    pub enum AddressType as "address type" {
        Dhcp = 0,
        Static = 1,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CircuitStatus {
    pub mode: CircuitMode,
    #[serde(rename = "status")]
    pub state: CircuitState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuits {
    pub heating: CircuitStatus,
    pub warm_water: CircuitStatus,
    /// `None` when the third circuit could not be read, usually because it is not installed.
    pub circuit3: Option<CircuitStatus>,
}

impl Circuits {
    pub fn iter(&self) -> impl Iterator<Item = (Circuit, Option<CircuitStatus>)> {
        Circuit::ALL.into_iter().zip([Some(self.heating), Some(self.warm_water), self.circuit3])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemIdentity {
    pub hardware_revision: String,
    pub software_version: u16,
    pub serial_number: u32,
    pub address_type: AddressType,
    pub ip_address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub application: Application,
    pub application_version: String,
    pub production_year: u16,
    pub production_week: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub auto_daylight_saving: bool,
}

impl DeviceDateTime {
    /// Takes the calendar fields of `datetime`. Seconds are dropped, the controller has none.
    ///
    /// Years the controller cannot represent map to 0, which validation rejects.
    pub fn from_civil(datetime: jiff::civil::DateTime, auto_daylight_saving: bool) -> Self {
        Self {
            year: u16::try_from(datetime.year()).unwrap_or(0),
            month: datetime.month() as u8,
            day: datetime.day() as u8,
            hour: datetime.hour() as u8,
            minute: datetime.minute() as u8,
            auto_daylight_saving,
        }
    }
}

impl std::fmt::Display for DeviceDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:0>4}-{:0>2}-{:0>2} {:0>2}:{:0>2}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Fail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: HealthStatus,
}

impl Health {
    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}
