//! The ECL Comfort 310 parameters (PNUs) this tool knows about.
//!
//! All addresses here are PNUs, i.e. one-based. See [`crate::access`] for the translation to
//! wire addresses.

use crate::codec;

/// How the raw word of a register is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Kind {
    U16,
    /// Heat curve slope, stored multiplied by -10.
    Slope,
    Celsius,
    /// Ordinal of an enumeration.
    Enum,
    Flag,
    /// One octet of an IPv4 address in the low byte.
    Octet,
    /// ASCII letter in the low byte.
    Letter,
    /// Two independent bytes.
    BytePair,
}

impl Kind {
    pub fn render(self, raw: u16) -> String {
        match self {
            Kind::U16 | Kind::Enum | Kind::Flag => raw.to_string(),
            Kind::Slope => codec::decode_slope(raw).to_string(),
            Kind::Celsius => format!("{raw} °C"),
            Kind::Octet => codec::byte_pair(raw).1.to_string(),
            Kind::Letter => char::from(codec::byte_pair(raw).1).to_string(),
            Kind::BytePair => {
                let (high, low) = codec::byte_pair(raw);
                format!("{high}.{low}")
            }
        }
    }
}

impl serde::Serialize for Kind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(<&'static str>::from(self))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct Mode(u8);

impl serde::Serialize for Mode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0 & Self::R.0 == 0 { "-" } else { "R" })?;
        f.write_str(if self.0 & Self::W.0 == 0 { "-" } else { "W" })
    }
}

impl Mode {
    pub const R: Self = Self(1 << 0);
    pub const W: Self = Self(1 << 1);
    pub const RW: Self = Self(Self::R.0 | Self::W.0);
    const R_: Self = Self::R;

    pub const fn is_writable(self) -> bool {
        self.0 & Self::W.0 != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterIndex(usize);

impl RegisterIndex {
    pub fn from_address(address: u16) -> Option<RegisterIndex> {
        let index = ADDRESSES.partition_point(|v| *v < address);
        (ADDRESSES.get(index) == Some(&address)).then_some(Self(index))
    }

    pub fn from_name(name: &str) -> Option<RegisterIndex> {
        NAMES.iter().position(|v| v.eq_ignore_ascii_case(name)).map(Self)
    }

    pub fn all() -> impl Iterator<Item = RegisterIndex> {
        (0..ADDRESSES.len()).map(Self)
    }

    pub fn address(&self) -> u16 {
        ADDRESSES[self.0]
    }

    pub fn name(&self) -> &'static str {
        NAMES[self.0]
    }

    pub fn mode(&self) -> Mode {
        MODES[self.0]
    }

    pub fn kind(&self) -> Kind {
        KINDS[self.0]
    }

    pub fn description(&self) -> &'static str {
        DESCRIPTIONS[self.0]
    }

    /// Whether `pattern` appears in the name, description or address, ignoring case.
    pub fn is_match(&self, pattern: &str) -> bool {
        let pattern = pattern.to_uppercase();
        self.name().contains(&pattern)
            || self.description().to_uppercase().contains(&pattern)
            || self.address().to_string().contains(&pattern)
    }
}

macro_rules! for_each_register {
    ($m:ident) => {
        $m! {
               19: U16,      R_, "HARDWARE_REVISION";
               35: U16,      R_, "SOFTWARE_VERSION";
               36: U16,      R_, "SERIAL_NUMBER_HIGH";
               37: U16,      R_, "SERIAL_NUMBER_LOW";
              258: Enum,     R_, "ADDRESS_TYPE";
              278: Octet,    R_, "IP_ADDRESS_1";
              279: Octet,    R_, "IP_ADDRESS_2";
              280: Octet,    R_, "IP_ADDRESS_3";
              281: Octet,    R_, "IP_ADDRESS_4";
              282: Octet,    R_, "GATEWAY_1";
              283: Octet,    R_, "GATEWAY_2";
              284: Octet,    R_, "GATEWAY_3";
              285: Octet,    R_, "GATEWAY_4";
              286: Octet,    R_, "NETMASK_1";
              287: Octet,    R_, "NETMASK_2";
              288: Octet,    R_, "NETMASK_3";
              289: Octet,    R_, "NETMASK_4";
             2060: Letter,   R_, "APPLICATION_LETTER";
             2061: U16,      R_, "APPLICATION_MAJOR";
             2062: U16,      R_, "APPLICATION_MINOR";
             2063: BytePair, R_, "APPLICATION_VERSION";
             2099: BytePair, R_, "PRODUCTION_DATE";
             4201: Enum,     RW, "CIRCUIT_1_MODE";
             4202: Enum,     RW, "CIRCUIT_2_MODE";
             4203: Enum,     RW, "CIRCUIT_3_MODE";
             4211: Enum,     R_, "CIRCUIT_1_STATE";
             4212: Enum,     R_, "CIRCUIT_2_STATE";
             4213: Enum,     R_, "CIRCUIT_3_STATE";
            10198: Flag,     RW, "AUTO_DAYLIGHT_SAVING";
            11175: Slope,    RW, "CIRCUIT_1_SLOPE";
            11177: Celsius,  RW, "CIRCUIT_1_MIN_FLOW_TEMP";
            11178: Celsius,  RW, "CIRCUIT_1_MAX_FLOW_TEMP";
            11400: Celsius,  RW, "CIRCUIT_1_FLOW_TEMP_AT_MINUS_30";
            11401: Celsius,  RW, "CIRCUIT_1_FLOW_TEMP_AT_MINUS_15";
            11402: Celsius,  RW, "CIRCUIT_1_FLOW_TEMP_AT_MINUS_5";
            11403: Celsius,  RW, "CIRCUIT_1_FLOW_TEMP_AT_0";
            11404: Celsius,  RW, "CIRCUIT_1_FLOW_TEMP_AT_5";
            11405: Celsius,  RW, "CIRCUIT_1_FLOW_TEMP_AT_15";
            12175: Slope,    RW, "CIRCUIT_2_SLOPE";
            12177: Celsius,  RW, "CIRCUIT_2_MIN_FLOW_TEMP";
            12178: Celsius,  RW, "CIRCUIT_2_MAX_FLOW_TEMP";
            12400: Celsius,  RW, "CIRCUIT_2_FLOW_TEMP_AT_MINUS_30";
            12401: Celsius,  RW, "CIRCUIT_2_FLOW_TEMP_AT_MINUS_15";
            12402: Celsius,  RW, "CIRCUIT_2_FLOW_TEMP_AT_MINUS_5";
            12403: Celsius,  RW, "CIRCUIT_2_FLOW_TEMP_AT_0";
            12404: Celsius,  RW, "CIRCUIT_2_FLOW_TEMP_AT_5";
            12405: Celsius,  RW, "CIRCUIT_2_FLOW_TEMP_AT_15";
            13175: Slope,    RW, "CIRCUIT_3_SLOPE";
            13177: Celsius,  RW, "CIRCUIT_3_MIN_FLOW_TEMP";
            13178: Celsius,  RW, "CIRCUIT_3_MAX_FLOW_TEMP";
            13400: Celsius,  RW, "CIRCUIT_3_FLOW_TEMP_AT_MINUS_30";
            13401: Celsius,  RW, "CIRCUIT_3_FLOW_TEMP_AT_MINUS_15";
            13402: Celsius,  RW, "CIRCUIT_3_FLOW_TEMP_AT_MINUS_5";
            13403: Celsius,  RW, "CIRCUIT_3_FLOW_TEMP_AT_0";
            13404: Celsius,  RW, "CIRCUIT_3_FLOW_TEMP_AT_5";
            13405: Celsius,  RW, "CIRCUIT_3_FLOW_TEMP_AT_15";
            64045: U16,      RW, "HOUR";
            64046: U16,      RW, "MINUTE";
            64047: U16,      RW, "DAY";
            64048: U16,      RW, "MONTH";
            64049: U16,      RW, "YEAR";
        }
    };
}

macro_rules! make_lists {
    ($($regnum: literal: $kind: ident, $mode: ident, $name: literal;)+) => {
        pub const ADDRESSES: &[u16] = &[$($regnum),*];
        pub static NAMES: &[&str] = &[$($name),*];
        pub static MODES: &[Mode] = &[$(Mode::$mode),*];
        pub static KINDS: &[Kind] = &[$(Kind::$kind),*];
    };
}

for_each_register!(make_lists);

pub static DESCRIPTIONS: &[&str] = &const {
    let mut result = [""; ADDRESSES.len()];
    let mut index = 0;
    let mut previous_address = 0;
    while index < result.len() {
        let address = ADDRESSES[index];
        if address <= previous_address {
            panic!("ADDRESSES is not sorted (or has duplicate values)!");
        }
        previous_address = address;
        result[index] = match address {
            19 => "Hardware revision, shown as 087H followed by the value",
            35 => "Controller software version",
            36 | 37 => "Serial number, most significant word first",
            258 => "How the network address is obtained. 0=DHCP, 1=Static",
            278..=281 => "IP address, one octet per register in the low byte",
            282..=285 => "Default gateway, one octet per register in the low byte",
            286..=289 => "Network mask, one octet per register in the low byte",
            2060 => "Application key letter in the low byte",
            2061 | 2062 => "Application key number, e.g. 266 and 1 for A266.1",
            2063 => "Application version. High byte is the major, low byte the minor version",
            2099 => "Production date. High byte is the year after 2000, low byte the week",
            4201..=4203 => {
                "Circuit mode. 0=Manual, 1=Scheduled, 2=Constant comfort, 3=Constant setback, \
                 4=Frost protection"
            }
            4211..=4213 => "Circuit state. 0=Setback, 1=Pre-comfort, 2=Comfort, 3=Pre-setback",
            10198 => "Automatic change to and from daylight saving time. 0=Off, 1=On",
            11175 | 12175 | 13175 => "Heat curve slope multiplied by -10, e.g. 18 for -1.8",
            11177 | 12177 | 13177 => "Lowest allowed flow temperature",
            11178 | 12178 | 13178 => "Highest allowed flow temperature",
            11400..=11405 | 12400..=12405 | 13400..=13405 => {
                "Desired flow temperature at one of the outdoor temperatures -30, -15, -5, 0, 5 \
                 and 15 °C"
            }
            64045 => "Controller clock, hour",
            64046 => "Controller clock, minute",
            64047 => "Controller clock, day of month",
            64048 => "Controller clock, month",
            64049 => "Controller clock, year",
            _ => "",
        };
        index += 1;
    }
    result
};

/// PNUs the domain operations read and write.
pub mod pnu {
    use crate::model::Circuit;

    pub const HARDWARE_REVISION: u16 = 19;
    /// Start of a four register block: unused, software version and the serial number.
    pub const SOFTWARE: u16 = 34;
    pub const ADDRESS_TYPE: u16 = 258;
    /// Start of twelve registers: IP address, gateway and netmask.
    pub const NETWORK: u16 = 278;
    /// Start of four registers: application letter, major, minor and version.
    pub const APPLICATION: u16 = 2060;
    pub const PRODUCTION_DATE: u16 = 2099;
    pub const AUTO_DAYLIGHT_SAVING: u16 = 10198;
    pub const HOUR: u16 = 64045;
    pub const MINUTE: u16 = 64046;
    pub const DAY: u16 = 64047;
    pub const MONTH: u16 = 64048;
    pub const YEAR: u16 = 64049;

    pub const fn circuit_mode(circuit: Circuit) -> u16 {
        4200 + circuit.number() as u16
    }

    pub const fn circuit_state(circuit: Circuit) -> u16 {
        4210 + circuit.number() as u16
    }

    pub const fn slope(circuit: Circuit) -> u16 {
        10175 + 1000 * circuit.number() as u16
    }

    /// Minimum flow temperature, followed by the maximum.
    pub const fn flow_limits(circuit: Circuit) -> u16 {
        10177 + 1000 * circuit.number() as u16
    }

    /// Six flow temperatures, in the order of [`crate::model::OUTDOOR_TEMPERATURES`].
    pub const fn curve_points(circuit: Circuit) -> u16 {
        10400 + 1000 * circuit.number() as u16
    }
}
