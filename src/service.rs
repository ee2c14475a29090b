//! Domain operations on the controller, built from single register reads and writes.
//!
//! Every operation validates its input before touching the controller, so that a rejected
//! request never causes any register traffic. Writes go one register at a time: the current
//! value is read first and the write is skipped if it already holds the requested value.
//! A failed write in the middle of an operation leaves the earlier writes in place.

use tracing::{debug, info};

use crate::access::{AccessError, RegisterAccess};
use crate::codec::{RegisterBlock, UnknownValue};
use crate::validate::Invalid;

mod heating;
mod system;

/// The register access that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read { address: u16, count: u16 },
    Write { address: u16, value: u16 },
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Access::Read { address, count } => write!(f, "reading PNU{address}:{count}"),
            Access::Write { address, value } => write!(f, "writing {value} to PNU{address}"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    InvalidInput(#[from] Invalid),
    #[error("{operation} failed")]
    UpstreamUnavailable {
        operation: Access,
        #[source]
        source: AccessError,
    },
    #[error("PNU{address} holds a value this tool does not understand")]
    UnexpectedDeviceValue {
        address: u16,
        #[source]
        source: UnknownValue,
    },
}

impl Error {
    /// Whether the error was caused by the caller rather than the controller.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

pub(crate) fn decode<T>(address: u16, value: Result<T, UnknownValue>) -> Result<T, Error> {
    value.map_err(|source| Error::UnexpectedDeviceValue { address, source })
}

pub struct Service<R> {
    access: R,
}

impl<R: RegisterAccess> Service<R> {
    pub fn new(access: R) -> Self {
        Self { access }
    }

    pub fn access(&self) -> &R {
        &self.access
    }

    async fn read(&self, address: u16, count: u16) -> Result<RegisterBlock, Error> {
        debug!(message = "reading", pnu = address, count);
        let block = self.access.read_holdings(address, count).await.map_err(|source| {
            Error::UpstreamUnavailable { operation: Access::Read { address, count }, source }
        })?;
        block.expect_len(usize::from(count));
        Ok(block)
    }

    /// Write `value` to `address` unless the register already holds it.
    async fn update(&self, address: u16, value: u16, label: &str) -> Result<(), Error> {
        let old = self.read(address, 1).await?.word(0);
        if old == value {
            debug!(message = "already up to date", label, pnu = address, value);
            return Ok(());
        }
        info!(message = "updating", label, pnu = address, old, new = value);
        self.access.write_holding(address, value).await.map_err(|source| {
            Error::UpstreamUnavailable { operation: Access::Write { address, value }, source }
        })
    }
}
