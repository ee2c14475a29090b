//! Ordering of the register writes that move the controller's clock to a new date and time.
//!
//! Day, month and year live in separate registers and the controller checks every write against
//! the date it currently stores. Writing the fields in a careless order passes through dates
//! such as February 30th, which the controller refuses or mangles. [`plan`] picks an order in
//! which every intermediate date is a real one.

use crate::model::DeviceDateTime;
use crate::registers::pnu;
use crate::validate::days_in_month;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    DaylightSaving,
}

impl Field {
    /// The PNU holding this field.
    pub const fn address(self) -> u16 {
        match self {
            Field::Year => pnu::YEAR,
            Field::Month => pnu::MONTH,
            Field::Day => pnu::DAY,
            Field::Hour => pnu::HOUR,
            Field::Minute => pnu::MINUTE,
            Field::DaylightSaving => pnu::AUTO_DAYLIGHT_SAVING,
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub field: Field,
    pub value: u16,
}

/// Order in which the date registers are written to go from `current` to `target`.
pub fn date_order(current: &DeviceDateTime, target: &DeviceDateTime) -> [Field; 3] {
    if target.month == 2 && target.day == 29 {
        // The 29th only exists once the year is a leap year.
        [Field::Year, Field::Day, Field::Month]
    } else if days_in_month(target.month, target.year) > days_in_month(current.month, current.year)
    {
        // Widen the month first so the new day always fits.
        [Field::Month, Field::Day, Field::Year]
    } else {
        // Shrink the day first so it fits the shorter month.
        [Field::Day, Field::Month, Field::Year]
    }
}

/// All writes needed to move the controller from `current` to `target`, in order.
///
/// Date fields come first, ordered by [`date_order`], followed by hour, minute and the
/// daylight saving flag. Every field is listed even if it already holds its target value.
pub fn plan(current: &DeviceDateTime, target: &DeviceDateTime) -> Vec<Step> {
    let value = |field: Field| match field {
        Field::Year => target.year,
        Field::Month => u16::from(target.month),
        Field::Day => u16::from(target.day),
        Field::Hour => u16::from(target.hour),
        Field::Minute => u16::from(target.minute),
        Field::DaylightSaving => u16::from(target.auto_daylight_saving),
    };
    date_order(current, target)
        .into_iter()
        .chain([Field::Hour, Field::Minute, Field::DaylightSaving])
        .map(|field| Step { field, value: value(field) })
        .collect()
}
