//! Conversions between raw register words and the values they stand for.

use std::net::Ipv4Addr;

/// Contents of consecutive registers as one modbus operation returned them.
///
/// Words are stored big-endian, exactly as on the wire.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RegisterBlock(Vec<u8>);

impl RegisterBlock {
    /// Returns `None` if `bytes` does not hold a whole number of words.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() % 2 == 0).then_some(Self(bytes))
    }

    pub fn from_words(words: &[u16]) -> Self {
        Self(words.iter().flat_map(|w| w.to_be_bytes()).collect())
    }

    /// Number of words in the block.
    pub fn len(&self) -> usize {
        self.0.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The word at `index`.
    ///
    /// Panics if the block is too short; blocks are always requested with the length their
    /// decoder expects.
    pub fn word(&self, index: usize) -> u16 {
        u16::from_be_bytes([self.0[2 * index], self.0[2 * index + 1]])
    }

    /// Two consecutive words starting at `index`, most significant first.
    pub fn double_word(&self, index: usize) -> u32 {
        u32::from(self.word(index)) << 16 | u32::from(self.word(index + 1))
    }

    pub fn words(&self) -> impl Iterator<Item = u16> + '_ {
        let mut bs = &self.0[..];
        std::iter::from_fn(move || {
            let (v, remainder) = bs.split_first_chunk::<2>()?;
            bs = remainder;
            Some(u16::from_be_bytes(*v))
        })
    }

    pub(crate) fn expect_len(&self, words: usize) {
        debug_assert_eq!(self.len(), words, "register block of unexpected length");
    }
}

/// A raw register value that does not correspond to anything the controller documents.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{value} is not a known {kind}")]
pub struct UnknownValue {
    pub value: u16,
    pub kind: &'static str,
}

/// Enumerations stored in a register as their ordinal.
pub trait RegisterEnum: Sized + Copy {
    /// What the register holds, for error messages.
    const KIND: &'static str;
    fn from_register(raw: u16) -> Option<Self>;
    fn to_register(self) -> u16;
}

pub fn decode_enum<E: RegisterEnum>(raw: u16) -> Result<E, UnknownValue> {
    E::from_register(raw).ok_or(UnknownValue { value: raw, kind: E::KIND })
}

/// On/off flags: 0 is off, 1 is on, anything else is an error.
pub fn decode_flag(raw: u16, kind: &'static str) -> Result<bool, UnknownValue> {
    match raw {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(UnknownValue { value, kind }),
    }
}

pub fn encode_flag(value: bool) -> u16 {
    u16::from(value)
}

/// Heat curve slopes are stored multiplied by -10, so that -1.7 is stored as 17.
pub fn decode_slope(raw: u16) -> f32 {
    f32::from(raw) / -10.0
}

pub fn encode_slope(slope: f32) -> u16 {
    (slope * -10.0).round() as u16
}

/// Splits a word into its high and low byte.
pub fn byte_pair(word: u16) -> (u8, u8) {
    let [high, low] = word.to_be_bytes();
    (high, low)
}

/// Four consecutive words starting at `start`, each carrying one octet in its low byte.
pub fn decode_quad(block: &RegisterBlock, start: usize) -> Ipv4Addr {
    let octet = |i| byte_pair(block.word(start + i)).1;
    Ipv4Addr::new(octet(0), octet(1), octet(2), octet(3))
}

/// Application identifier such as `A266.1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Application {
    pub prefix: char,
    pub major: u16,
    pub minor: u16,
}

impl std::fmt::Display for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}.{}", self.prefix, self.major, self.minor)
    }
}

impl serde::Serialize for Application {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decodes a three word application identifier: letter, major, minor.
pub fn decode_application(block: &RegisterBlock) -> Application {
    Application {
        prefix: char::from(byte_pair(block.word(0)).1),
        major: block.word(1),
        minor: block.word(2),
    }
}

/// Declares an enumeration stored in a register as its ordinal.
///
/// Variants are displayed and serialized in `SCREAMING_SNAKE_CASE`.
macro_rules! register_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),* $(,)?
        }
    ) => {
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            strum::VariantArray,
            strum::FromRepr,
            strum::IntoStaticStr,
            strum::Display,
        )]
        #[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
        #[repr(u16)]
        $(#[$meta])*
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),*
        }

        impl $crate::codec::RegisterEnum for $name {
            const KIND: &'static str = $kind;
            fn from_register(raw: u16) -> Option<Self> {
                Self::from_repr(raw)
            }
            fn to_register(self) -> u16 {
                self as u16
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(<&'static str>::from(self))
            }
        }
    };
}

pub(crate) use register_enum;
