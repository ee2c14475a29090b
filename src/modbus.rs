use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// The most registers a single read response can carry.
pub const MAX_READ_COUNT: u16 = 125;
/// The most registers a single write request can carry.
pub const MAX_WRITE_COUNT: usize = 123;
/// The most coils a single write request can carry.
pub const MAX_WRITE_COILS: usize = 1968;

const SERVER_BUSY: u8 = 6;

#[derive(Debug, Clone)]
pub struct Request {
    pub unit_id: u8,
    pub transaction_id: u16,
    pub operation: Operation,
}

/// A modbus operation.
///
/// Addresses carried here are the zero-based addresses that go out on the wire. The one-based
/// PNUs of the controller documentation are translated by [`crate::access`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetCoils { address: u16, count: u16 },
    GetDiscreteInputs { address: u16, count: u16 },
    GetHoldings { address: u16, count: u16 },
    GetInputs { address: u16, count: u16 },
    SetCoil { address: u16, value: bool },
    SetCoils { address: u16, values: Vec<bool> },
    SetHolding { address: u16, value: u16 },
    SetHoldings { address: u16, values: Vec<u16> },
    MaskHolding { address: u16, and_mask: u16, or_mask: u16 },
    GetSetHoldings { read_address: u16, read_count: u16, write_address: u16, values: Vec<u16> },
    GetFifo { address: u16 },
}

impl Operation {
    pub fn function_code(&self) -> u8 {
        match self {
            Operation::GetCoils { .. } => 0x01,
            Operation::GetDiscreteInputs { .. } => 0x02,
            Operation::GetHoldings { .. } => 0x03,
            Operation::GetInputs { .. } => 0x04,
            Operation::SetCoil { .. } => 0x05,
            Operation::SetHolding { .. } => 0x06,
            Operation::SetCoils { .. } => 0x0F,
            Operation::SetHoldings { .. } => 0x10,
            Operation::MaskHolding { .. } => 0x16,
            Operation::GetSetHoldings { .. } => 0x17,
            Operation::GetFifo { .. } => 0x18,
        }
    }

    /// Rewrite every address this operation refers to.
    ///
    /// The combined read/write operation has two independent addresses, both are mapped.
    pub fn map_addresses(self, mut f: impl FnMut(u16) -> u16) -> Self {
        match self {
            Operation::GetCoils { address, count } => Operation::GetCoils { address: f(address), count },
            Operation::GetDiscreteInputs { address, count } => {
                Operation::GetDiscreteInputs { address: f(address), count }
            }
            Operation::GetHoldings { address, count } => {
                Operation::GetHoldings { address: f(address), count }
            }
            Operation::GetInputs { address, count } => Operation::GetInputs { address: f(address), count },
            Operation::SetCoil { address, value } => Operation::SetCoil { address: f(address), value },
            Operation::SetCoils { address, values } => {
                Operation::SetCoils { address: f(address), values }
            }
            Operation::SetHolding { address, value } => {
                Operation::SetHolding { address: f(address), value }
            }
            Operation::SetHoldings { address, values } => {
                Operation::SetHoldings { address: f(address), values }
            }
            Operation::MaskHolding { address, and_mask, or_mask } => {
                Operation::MaskHolding { address: f(address), and_mask, or_mask }
            }
            Operation::GetSetHoldings { read_address, read_count, write_address, values } => {
                Operation::GetSetHoldings {
                    read_address: f(read_address),
                    read_count,
                    write_address: f(write_address),
                    values,
                }
            }
            Operation::GetFifo { address } => Operation::GetFifo { address: f(address) },
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::GetCoils { address, count } => write!(f, "read {count} coils at {address}"),
            Operation::GetDiscreteInputs { address, count } => {
                write!(f, "read {count} discrete inputs at {address}")
            }
            Operation::GetHoldings { address, count } => {
                write!(f, "read {count} holding registers at {address}")
            }
            Operation::GetInputs { address, count } => {
                write!(f, "read {count} input registers at {address}")
            }
            Operation::SetCoil { address, value } => write!(f, "set coil {address} to {value}"),
            Operation::SetCoils { address, values } => {
                write!(f, "set {} coils at {address}", values.len())
            }
            Operation::SetHolding { address, value } => {
                write!(f, "write {value} to holding register {address}")
            }
            Operation::SetHoldings { address, values } => {
                write!(f, "write {} holding registers at {address}", values.len())
            }
            Operation::MaskHolding { address, and_mask, or_mask } => {
                write!(f, "mask holding register {address} with {and_mask:#06x}/{or_mask:#06x}")
            }
            Operation::GetSetHoldings { read_address, read_count, write_address, values } => write!(
                f,
                "write {} holding registers at {write_address} and read {read_count} at \
                 {read_address}",
                values.len()
            ),
            Operation::GetFifo { address } => write!(f, "read the FIFO queue at {address}"),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub unit_id: u8,
    pub transaction_id: u16,
    pub kind: ResponseKind,
}

impl Response {
    pub fn exception_code(&self) -> Option<u8> {
        match &self.kind {
            ResponseKind::Exception(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_server_busy(&self) -> bool {
        self.exception_code() == Some(SERVER_BUSY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    Exception(u8),
    /// Packed coil or discrete input states, least significant bit first.
    Bits { bytes: Vec<u8> },
    /// Big-endian register contents.
    Words { values: Vec<u8> },
    /// Echo of a single coil or register write.
    Written { address: u16, value: u16 },
    /// Acknowledgement of a multiple coil or register write.
    WrittenMany { address: u16, count: u16 },
    Masked { address: u16, and_mask: u16, or_mask: u16 },
    Fifo { values: Vec<u8> },
}

pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len().div_ceil(8)];
    for (index, _) in values.iter().enumerate().filter(|(_, v)| **v) {
        bytes[index / 8] |= 1 << (index % 8);
    }
    bytes
}

pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count).map(|i| bytes.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0)).collect()
}

fn too_long(what: &str, len: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("{len} {what} do not fit into a single modbus request"),
    )
}

fn encode_words(values: &[u16], pdu: &mut Vec<u8>) -> Result<(), std::io::Error> {
    if values.len() > MAX_WRITE_COUNT {
        return Err(too_long("registers", values.len()));
    }
    pdu.extend((values.len() as u16).to_be_bytes());
    pdu.push((values.len() * 2) as u8);
    for value in values {
        pdu.extend(value.to_be_bytes());
    }
    Ok(())
}

fn encode_pdu(operation: &Operation, pdu: &mut Vec<u8>) -> Result<(), std::io::Error> {
    pdu.push(operation.function_code());
    match operation {
        Operation::GetHoldings { address, count } | Operation::GetInputs { address, count } => {
            if *count > MAX_READ_COUNT {
                return Err(too_long("registers", usize::from(*count)));
            }
            pdu.extend(address.to_be_bytes());
            pdu.extend(count.to_be_bytes());
        }
        Operation::GetCoils { address, count } | Operation::GetDiscreteInputs { address, count } => {
            pdu.extend(address.to_be_bytes());
            pdu.extend(count.to_be_bytes());
        }
        Operation::SetCoil { address, value } => {
            pdu.extend(address.to_be_bytes());
            pdu.extend(if *value { [0xFF, 0x00] } else { [0x00, 0x00] });
        }
        Operation::SetCoils { address, values } => {
            if values.len() > MAX_WRITE_COILS {
                return Err(too_long("coils", values.len()));
            }
            let packed = pack_bits(values);
            pdu.extend(address.to_be_bytes());
            pdu.extend((values.len() as u16).to_be_bytes());
            pdu.push(packed.len() as u8);
            pdu.extend(packed);
        }
        Operation::SetHolding { address, value } => {
            pdu.extend(address.to_be_bytes());
            pdu.extend(value.to_be_bytes());
        }
        Operation::SetHoldings { address, values } => {
            pdu.extend(address.to_be_bytes());
            encode_words(values, pdu)?;
        }
        Operation::MaskHolding { address, and_mask, or_mask } => {
            pdu.extend(address.to_be_bytes());
            pdu.extend(and_mask.to_be_bytes());
            pdu.extend(or_mask.to_be_bytes());
        }
        Operation::GetSetHoldings { read_address, read_count, write_address, values } => {
            pdu.extend(read_address.to_be_bytes());
            pdu.extend(read_count.to_be_bytes());
            pdu.extend(write_address.to_be_bytes());
            encode_words(values, pdu)?;
        }
        Operation::GetFifo { address } => {
            pdu.extend(address.to_be_bytes());
        }
    }
    Ok(())
}

fn be16(data: &[u8], at: usize) -> Option<u16> {
    let (word, _) = data.get(at..)?.split_first_chunk::<2>()?;
    Some(u16::from_be_bytes(*word))
}

/// Interpret the bytes following the function code of a non-exception response.
fn decode_pdu(function_code: u8, body: &[u8]) -> Option<ResponseKind> {
    Some(match function_code {
        0x01 | 0x02 => {
            let (_, bytes) = body.split_first()?;
            ResponseKind::Bits { bytes: bytes.to_vec() }
        }
        // NOTE: The byte count prefix is ignored in favour of the MBAP length, which covers
        // responses of any size.
        0x03 | 0x04 | 0x17 => {
            let (_, values) = body.split_first()?;
            ResponseKind::Words { values: values.to_vec() }
        }
        0x05 | 0x06 => ResponseKind::Written { address: be16(body, 0)?, value: be16(body, 2)? },
        0x0F | 0x10 => ResponseKind::WrittenMany { address: be16(body, 0)?, count: be16(body, 2)? },
        0x16 => ResponseKind::Masked {
            address: be16(body, 0)?,
            and_mask: be16(body, 2)?,
            or_mask: be16(body, 4)?,
        },
        0x18 => ResponseKind::Fifo { values: body.get(4..)?.to_vec() },
        _ => return None,
    })
}

/// Modbus TCP framing: a 7 byte MBAP header followed by the PDU.
#[derive(Default)]
pub struct TcpCodec {}

impl Encoder<&Request> for TcpCodec {
    type Error = std::io::Error;
    fn encode(&mut self, req: &Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut pdu = Vec::with_capacity(16);
        encode_pdu(&req.operation, &mut pdu)?;
        dst.reserve(7 + pdu.len());
        dst.extend(req.transaction_id.to_be_bytes());
        dst.extend([0, 0]);
        dst.extend((pdu.len() as u16 + 1).to_be_bytes());
        dst.extend([req.unit_id]);
        dst.extend(pdu);
        trace!(message = "sending encoded", buffer = ?dst);
        Ok(())
    }
}

impl Decoder for TcpCodec {
    type Item = Response;
    type Error = std::io::Error;
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            trace!(message = "attempt at decoding", buffer = ?src);
            if src.len() < 8 {
                return Ok(None);
            }
            let Some(transaction_id) = be16(src, 0) else { return Ok(None) };
            let Some(proto) = be16(src, 2) else { return Ok(None) };
            if proto != 0 {
                src.advance(1);
                continue;
            }
            let Some(length) = be16(src, 4) else { return Ok(None) };
            let frame_length = 6 + usize::from(length);
            let Some(data) = src.get(6..frame_length) else {
                src.reserve(frame_length - src.len());
                return Ok(None);
            };
            let [unit_id, function_code, body @ ..] = data else {
                src.advance(1);
                continue;
            };
            let (unit_id, function_code) = (*unit_id, *function_code);
            let kind = if function_code & 0x80 != 0 {
                Some(ResponseKind::Exception(body.first().copied().unwrap_or(0)))
            } else {
                decode_pdu(function_code, body)
            };
            src.advance(frame_length);
            match kind {
                Some(kind) => return Ok(Some(Response { unit_id, transaction_id, kind })),
                None => {
                    trace!(message = "skipping an undecodable frame", function_code, transaction_id);
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(operation: Operation) -> Vec<u8> {
        let request = Request { unit_id: 1, transaction_id: 0x0102, operation };
        let mut dst = BytesMut::new();
        TcpCodec::default().encode(&request, &mut dst).unwrap();
        dst.to_vec()
    }

    #[test]
    fn encodes_read_holdings() {
        let bytes = encode(Operation::GetHoldings { address: 11174, count: 1 });
        assert_eq!(bytes, [0x01, 0x02, 0, 0, 0, 6, 1, 0x03, 0x2B, 0xA6, 0, 1]);
    }

    #[test]
    fn encodes_write_multiple() {
        let bytes = encode(Operation::SetHoldings { address: 64044, values: vec![9, 13] });
        assert_eq!(
            bytes,
            [0x01, 0x02, 0, 0, 0, 11, 1, 0x10, 0xFA, 0x2C, 0, 2, 4, 0, 9, 0, 13]
        );
    }

    #[test]
    fn encodes_coils_least_significant_first() {
        let bytes = encode(Operation::SetCoils {
            address: 0,
            values: vec![true, false, true, true, false, false, false, false, true],
        });
        assert_eq!(&bytes[7..], [0x0F, 0, 0, 0, 9, 2, 0b0000_1101, 0b0000_0001]);
    }

    #[test]
    fn rejects_oversized_requests() {
        let request = Request {
            unit_id: 1,
            transaction_id: 0,
            operation: Operation::SetHoldings { address: 0, values: vec![0; 124] },
        };
        assert!(TcpCodec::default().encode(&request, &mut BytesMut::new()).is_err());
        let request = Request {
            unit_id: 1,
            transaction_id: 0,
            operation: Operation::GetHoldings { address: 0, count: 126 },
        };
        assert!(TcpCodec::default().encode(&request, &mut BytesMut::new()).is_err());
        let request = Request {
            unit_id: 1,
            transaction_id: 0,
            operation: Operation::GetHoldings { address: 0, count: MAX_READ_COUNT },
        };
        assert!(TcpCodec::default().encode(&request, &mut BytesMut::new()).is_ok());
    }

    #[test]
    fn decodes_holdings_and_exceptions() {
        let mut src = BytesMut::from(
            &[
                0, 7, 0, 0, 0, 7, 1, 0x03, 4, 0, 33, 0, 66, // read response
                0, 8, 0, 0, 0, 3, 1, 0x86, 2, // illegal address on write
            ][..],
        );
        let mut codec = TcpCodec::default();
        let response = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(response.transaction_id, 7);
        assert_eq!(response.kind, ResponseKind::Words { values: vec![0, 33, 0, 66] });
        let response = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(response.transaction_id, 8);
        assert_eq!(response.exception_code(), Some(2));
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert!(src.is_empty());
    }

    #[test]
    fn waits_for_the_whole_frame() {
        let mut src = BytesMut::from(&[0, 1, 0, 0, 0, 6, 1, 0x06, 0xFA][..]);
        let mut codec = TcpCodec::default();
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend([0x2C, 0, 9]);
        let response = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(response.kind, ResponseKind::Written { address: 64044, value: 9 });
    }

    #[test]
    fn resynchronizes_after_garbage() {
        let mut src = BytesMut::from(&[0xFF, 0, 3, 0, 0, 0, 3, 1, 0x83, 6][..]);
        let response = TcpCodec::default().decode(&mut src).unwrap().unwrap();
        assert_eq!(response.transaction_id, 3);
        assert!(response.is_server_busy());
    }

    #[test]
    fn maps_both_read_write_addresses() {
        let operation = Operation::GetSetHoldings {
            read_address: 10,
            read_count: 2,
            write_address: 20,
            values: vec![1],
        };
        assert_eq!(
            operation.map_addresses(|a| a * 2),
            Operation::GetSetHoldings {
                read_address: 20,
                read_count: 2,
                write_address: 40,
                values: vec![1]
            }
        );
    }

    #[test]
    fn bits_round_trip() {
        let values = [true, false, false, true, true, false, true, false, false, true];
        assert_eq!(unpack_bits(&pack_bits(&values), values.len()), values);
    }
}
