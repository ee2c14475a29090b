//! One-based register access on top of a zero-based modbus transport.
//!
//! The controller documentation numbers its parameters (PNUs) starting at one, while the modbus
//! wire protocol addresses registers starting at zero. Everything above this module speaks PNUs;
//! everything below it speaks wire addresses.

use std::future::Future;

use crate::codec::RegisterBlock;
use crate::modbus::{self, Operation, ResponseKind};

/// Something that can carry out a modbus operation against the controller.
///
/// Addresses in the operation are zero-based. Exception responses are returned as
/// [`ResponseKind::Exception`], errors are reserved for failures to talk to the device at all.
pub trait Transport {
    type Error: std::error::Error + Send + Sync + 'static;

    fn execute(
        &self,
        operation: Operation,
    ) -> impl Future<Output = Result<ResponseKind, Self::Error>> + Send;
}

/// The register operations the domain layer needs, addressed by PNU.
pub trait RegisterAccess {
    fn read_holdings(
        &self,
        address: u16,
        count: u16,
    ) -> impl Future<Output = Result<RegisterBlock, AccessError>> + Send;

    fn write_holding(
        &self,
        address: u16,
        value: u16,
    ) -> impl Future<Output = Result<(), AccessError>> + Send;
}

#[derive(thiserror::Error, Debug)]
pub enum AccessError {
    #[error("could not exchange data with the controller")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("the controller responded with exception code {0}")]
    Exception(u8),
    #[error("the controller responded to `{0}` with an unrelated response")]
    UnexpectedResponse(Operation),
    #[error("expected {expected} bytes of data, the controller returned {actual}")]
    Length { expected: usize, actual: usize },
}

/// Translate a one-based PNU into the zero-based wire address.
///
/// A PNU of 0 does not exist; asking for it is a bug in the caller.
pub fn to_transport(address: u16) -> u16 {
    debug_assert!(address >= 1, "PNU 0 does not exist");
    address.wrapping_sub(1)
}

/// Translate a zero-based wire address back into the one-based PNU.
pub fn to_caller(address: u16) -> u16 {
    address.wrapping_add(1)
}

/// Exposes a zero-based [`Transport`] with one-based addressing for every access type.
pub struct OneBased<T> {
    transport: T,
}

impl<T: Transport + Sync> OneBased<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn execute(&self, operation: Operation) -> Result<ResponseKind, AccessError> {
        let operation = operation.map_addresses(to_transport);
        match self.transport.execute(operation).await {
            Err(e) => Err(AccessError::Transport(Box::new(e))),
            Ok(ResponseKind::Exception(code)) => Err(AccessError::Exception(code)),
            Ok(kind) => Ok(kind),
        }
    }

    async fn read_words(&self, operation: Operation, count: u16) -> Result<RegisterBlock, AccessError> {
        let kind = self.execute(operation.clone()).await?;
        let ResponseKind::Words { values } = kind else {
            return Err(AccessError::UnexpectedResponse(operation));
        };
        let expected = 2 * usize::from(count);
        let actual = values.len();
        match RegisterBlock::from_bytes(values) {
            Some(block) if actual == expected => Ok(block),
            _ => Err(AccessError::Length { expected, actual }),
        }
    }

    async fn read_bits(&self, operation: Operation, count: u16) -> Result<Vec<bool>, AccessError> {
        let kind = self.execute(operation.clone()).await?;
        let ResponseKind::Bits { bytes } = kind else {
            return Err(AccessError::UnexpectedResponse(operation));
        };
        let expected = usize::from(count).div_ceil(8);
        if bytes.len() < expected {
            return Err(AccessError::Length { expected, actual: bytes.len() });
        }
        Ok(modbus::unpack_bits(&bytes, usize::from(count)))
    }

    async fn write(&self, operation: Operation) -> Result<(), AccessError> {
        match self.execute(operation.clone()).await? {
            ResponseKind::Written { .. }
            | ResponseKind::WrittenMany { .. }
            | ResponseKind::Masked { .. } => Ok(()),
            _ => Err(AccessError::UnexpectedResponse(operation)),
        }
    }

    pub async fn read_coils(&self, address: u16, count: u16) -> Result<Vec<bool>, AccessError> {
        self.read_bits(Operation::GetCoils { address, count }, count).await
    }

    pub async fn read_discrete_inputs(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, AccessError> {
        self.read_bits(Operation::GetDiscreteInputs { address, count }, count).await
    }

    pub async fn read_inputs(&self, address: u16, count: u16) -> Result<RegisterBlock, AccessError> {
        self.read_words(Operation::GetInputs { address, count }, count).await
    }

    pub async fn write_coil(&self, address: u16, value: bool) -> Result<(), AccessError> {
        self.write(Operation::SetCoil { address, value }).await
    }

    pub async fn write_coils(&self, address: u16, values: Vec<bool>) -> Result<(), AccessError> {
        self.write(Operation::SetCoils { address, values }).await
    }

    pub async fn write_holdings(&self, address: u16, values: Vec<u16>) -> Result<(), AccessError> {
        self.write(Operation::SetHoldings { address, values }).await
    }

    pub async fn mask_write_holding(
        &self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<(), AccessError> {
        self.write(Operation::MaskHolding { address, and_mask, or_mask }).await
    }

    /// Write `values` at `write_address`, then read `read_count` registers at `read_address`, as
    /// a single modbus transaction.
    pub async fn read_write_holdings(
        &self,
        read_address: u16,
        read_count: u16,
        write_address: u16,
        values: Vec<u16>,
    ) -> Result<RegisterBlock, AccessError> {
        let operation =
            Operation::GetSetHoldings { read_address, read_count, write_address, values };
        self.read_words(operation, read_count).await
    }

    pub async fn read_fifo(&self, address: u16) -> Result<RegisterBlock, AccessError> {
        let operation = Operation::GetFifo { address };
        let kind = self.execute(operation.clone()).await?;
        let ResponseKind::Fifo { values } = kind else {
            return Err(AccessError::UnexpectedResponse(operation));
        };
        let actual = values.len();
        RegisterBlock::from_bytes(values).ok_or(AccessError::Length { expected: actual + 1, actual })
    }
}

impl<T: Transport + Sync> RegisterAccess for OneBased<T> {
    async fn read_holdings(&self, address: u16, count: u16) -> Result<RegisterBlock, AccessError> {
        self.read_words(Operation::GetHoldings { address, count }, count).await
    }

    async fn write_holding(&self, address: u16, value: u16) -> Result<(), AccessError> {
        self.write(Operation::SetHolding { address, value }).await
    }
}
