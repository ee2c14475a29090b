//! Checks applied to caller input before anything is sent to the controller.

use crate::model::{Circuit, DeviceDateTime, OUTDOOR_TEMPERATURES};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {constraint}")]
pub struct Invalid {
    pub field: String,
    pub constraint: String,
}

impl Invalid {
    fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self { field: field.into(), constraint: constraint.into() }
    }
}

pub const MIN_FLOW_TEMPERATURE: i32 = 10;
pub const MAX_FLOW_TEMPERATURE: i32 = 150;
pub const MIN_SLOPE: f32 = -10.0;
pub const MAX_SLOPE: f32 = -0.1;
pub const MIN_YEAR: u16 = 2009;
pub const MAX_YEAR: u16 = 2099;

pub fn circuit(number: u8) -> Result<Circuit, Invalid> {
    if !(1..=3).contains(&number) {
        return Err(Invalid::new("circuit number", format!("{number} is not in [1, 3]")));
    }
    Ok(Circuit::new_unchecked(number))
}

/// Slopes lie in [-10, -0.1]. Both `None` and `0` mean "leave unchanged".
pub fn slope(value: Option<f32>) -> Result<Option<f32>, Invalid> {
    match value {
        None => Ok(None),
        Some(v) if v == 0.0 => Ok(None),
        Some(v) if (MIN_SLOPE..=MAX_SLOPE).contains(&v) => Ok(Some(v)),
        Some(v) => Err(Invalid::new("slope", format!("{v} is not in [{MIN_SLOPE}, {MAX_SLOPE}]"))),
    }
}

/// Flow temperatures lie in [10, 150] °C. Both `None` and `0` mean "leave unchanged".
pub fn flow_temperature(field: &str, value: Option<i32>) -> Result<Option<u16>, Invalid> {
    match value {
        None | Some(0) => Ok(None),
        Some(v @ MIN_FLOW_TEMPERATURE..=MAX_FLOW_TEMPERATURE) => Ok(Some(v as u16)),
        Some(v) => Err(Invalid::new(
            field,
            format!("{v} is not in [{MIN_FLOW_TEMPERATURE}, {MAX_FLOW_TEMPERATURE}]"),
        )),
    }
}

/// Returns the position of `value` among the curve's fixed outdoor temperatures.
pub fn outdoor_temperature(value: i32) -> Result<usize, Invalid> {
    OUTDOOR_TEMPERATURES.iter().position(|t| i32::from(*t) == value).ok_or_else(|| {
        Invalid::new("outdoor temperature", format!("{value} is not one of {OUTDOOR_TEMPERATURES:?}"))
    })
}

/// Leap years as the controller understands them. Good for 2009 through 2099 only.
pub fn is_leap_year(year: u16) -> bool {
    year % 4 == 0
}

pub fn days_in_month(month: u8, year: u16) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

pub fn date_time(value: &DeviceDateTime) -> Result<(), Invalid> {
    let DeviceDateTime { year, month, day, hour, minute, .. } = *value;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(Invalid::new("year", format!("year {year} is not in [{MIN_YEAR}, {MAX_YEAR}]")));
    }
    if !(1..=12).contains(&month) {
        return Err(Invalid::new("month", format!("month {month} is not in [1, 12]")));
    }
    let days = days_in_month(month, year);
    if !(1..=days).contains(&day) {
        return Err(Invalid::new(
            "day",
            format!("day {day} for month {month} of {year} is not in [1, {days}]"),
        ));
    }
    if hour > 23 {
        return Err(Invalid::new("hour", format!("hour {hour} is not in [0, 23]")));
    }
    if minute > 59 {
        return Err(Invalid::new("minute", format!("minute {minute} is not in [0, 59]")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(year: u16, month: u8, day: u8, hour: u8, minute: u8) -> DeviceDateTime {
        DeviceDateTime { year, month, day, hour, minute, auto_daylight_saving: false }
    }

    #[test]
    fn circuits() {
        assert!(circuit(0).is_err());
        assert_eq!(circuit(1), Ok(Circuit::HEATING));
        assert_eq!(circuit(3), Ok(Circuit::THIRD));
        assert_eq!(circuit(4).unwrap_err().to_string(), "invalid circuit number: 4 is not in [1, 3]");
    }

    #[test]
    fn flow_temperature_boundaries() {
        assert!(flow_temperature("min flow temp", Some(9)).is_err());
        assert_eq!(flow_temperature("min flow temp", Some(10)), Ok(Some(10)));
        assert_eq!(flow_temperature("min flow temp", Some(150)), Ok(Some(150)));
        assert!(flow_temperature("min flow temp", Some(151)).is_err());
        assert!(flow_temperature("min flow temp", Some(-5)).is_err());
        assert_eq!(flow_temperature("min flow temp", Some(0)), Ok(None));
        assert_eq!(flow_temperature("min flow temp", None), Ok(None));
        let error = flow_temperature("max flow temp", Some(151)).unwrap_err();
        assert_eq!(error.field, "max flow temp");
    }

    #[test]
    fn slope_boundaries() {
        assert_eq!(slope(Some(-0.1)), Ok(Some(-0.1)));
        assert_eq!(slope(Some(-10.0)), Ok(Some(-10.0)));
        assert!(slope(Some(-10.1)).is_err());
        assert!(slope(Some(-0.05)).is_err());
        assert!(slope(Some(1.0)).is_err());
        assert!(slope(Some(f32::NAN)).is_err());
        assert_eq!(slope(Some(0.0)), Ok(None));
    }

    #[test]
    fn outdoor_temperatures_are_fixed() {
        assert_eq!(outdoor_temperature(-30), Ok(0));
        assert_eq!(outdoor_temperature(0), Ok(3));
        assert_eq!(outdoor_temperature(15), Ok(5));
        assert!(outdoor_temperature(-10).is_err());
        assert!(outdoor_temperature(20).is_err());
    }

    #[test]
    fn date_time_ranges() {
        assert!(date_time(&at(2009, 1, 1, 0, 0)).is_ok());
        assert!(date_time(&at(2099, 12, 31, 23, 59)).is_ok());
        assert!(date_time(&at(1999, 2, 1, 12, 2)).unwrap_err().to_string().contains("year 1999"));
        assert!(date_time(&at(2100, 2, 1, 12, 2)).is_err());
        assert!(date_time(&at(2009, 13, 1, 12, 2)).unwrap_err().to_string().contains("month 13"));
        assert!(date_time(&at(2009, 0, 1, 12, 2)).is_err());
        assert!(date_time(&at(2009, 2, 32, 12, 2)).unwrap_err().to_string().contains("day 32"));
        assert!(date_time(&at(2009, 2, 0, 12, 2)).is_err());
        assert!(date_time(&at(2009, 2, 1, 24, 2)).unwrap_err().to_string().contains("hour 24"));
        assert!(date_time(&at(2009, 2, 1, 10, 60)).unwrap_err().to_string().contains("minute 60"));
        assert!(date_time(&at(2009, 4, 31, 10, 0)).is_err());
    }

    #[test]
    fn february() {
        let error = date_time(&at(2009, 2, 29, 10, 11)).unwrap_err();
        assert!(error.to_string().contains("day 29 for month 2"));
        assert!(date_time(&at(2016, 2, 29, 10, 11)).is_ok());
        let error = date_time(&at(2016, 2, 30, 10, 11)).unwrap_err();
        assert!(error.to_string().contains("day 30 for month 2"));
        assert_eq!(days_in_month(2, 2022), 28);
        assert_eq!(days_in_month(2, 2024), 29);
    }
}
