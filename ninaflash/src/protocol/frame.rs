//! Command sketch wire format.
//!
//! Every request is a fixed 11-byte header followed by an optional payload:
//!
//! ```text
//! +--------+-----------+-----------+-------------+-----------------+
//! | Opcode |  Address  |   Value   | Payload len |     Payload     |
//! +--------+-----------+-----------+-------------+-----------------+
//! | 1 byte | 4 (BE)    | 4 (BE)    | 2 (BE)      | payload len     |
//! +--------+-----------+-----------+-------------+-----------------+
//! ```
//!
//! Responses are unframed: raw data, then the two byte `OK` acknowledgement
//! (and for checksum queries, 16 raw MD5 bytes after the ack).

use {
    crate::error::{Error, Result},
    byteorder::{BigEndian, WriteBytesExt},
    std::fmt,
};

/// Size of the request header in bytes.
pub const HEADER_LEN: usize = 11;

/// Acknowledgement literal sent by the command sketch.
pub const ACK: [u8; 2] = *b"OK";

/// Length of the MD5 digest returned by a checksum query.
pub const DIGEST_LEN: usize = 16;

/// Smallest payload size the flasher is willing to work with.
pub const MIN_PAYLOAD_SIZE: u16 = 1024;

/// Command sketch opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Read a block of flash (0x01).
    Read = 0x01,
    /// Write a block of flash (0x02).
    Write = 0x02,
    /// Erase a block of flash (0x03).
    Erase = 0x03,
    /// MD5 of the most recently written data (0x04).
    Md5 = 0x04,
    /// Query the maximum payload size (0x50).
    MaxPayloadSize = 0x50,
}

impl Opcode {
    /// Short human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Erase => "erase",
            Self::Md5 => "md5sum",
            Self::MaxPayloadSize => "max payload size",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), *self as u8)
    }
}

#[cfg(test)]
impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Read),
            0x02 => Ok(Self::Write),
            0x03 => Ok(Self::Erase),
            0x04 => Ok(Self::Md5),
            0x50 => Ok(Self::MaxPayloadSize),
            other => Err(Error::Protocol(format!("unknown opcode 0x{other:02X}"))),
        }
    }
}

/// A single request to the command sketch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame<'a> {
    opcode: Opcode,
    address: u32,
    value: u32,
    payload: &'a [u8],
}

impl<'a> CommandFrame<'a> {
    /// Create a frame, rejecting payloads that do not fit the length field.
    pub fn new(opcode: Opcode, address: u32, value: u32, payload: &'a [u8]) -> Result<Self> {
        if u16::try_from(payload.len()).is_err() {
            return Err(Error::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            opcode,
            address,
            value,
            payload,
        })
    }

    /// `MAX_PAYLOAD_SIZE` query.
    pub fn max_payload_size() -> Self {
        Self::bare(Opcode::MaxPayloadSize, 0, 0)
    }

    /// `FLASH_READ` of `length` bytes at `address`.
    pub fn read(address: u32, length: u32) -> Self {
        Self::bare(Opcode::Read, address, length)
    }

    /// `FLASH_WRITE` of `data` at `address`.
    pub fn write(address: u32, data: &'a [u8]) -> Result<Self> {
        Self::new(Opcode::Write, address, 0, data)
    }

    /// `FLASH_ERASE` of `length` bytes at `address`.
    pub fn erase(address: u32, length: u32) -> Self {
        Self::bare(Opcode::Erase, address, length)
    }

    /// `MD5` over the first `length` bytes of the last write.
    pub fn md5(length: u32) -> Self {
        Self::bare(Opcode::Md5, 0, length)
    }

    fn bare(opcode: Opcode, address: u32, value: u32) -> Self {
        Self {
            opcode,
            address,
            value,
            payload: &[],
        }
    }

    /// Serialize header and payload into one buffer.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.opcode as u8);
        buf.write_u32::<BigEndian>(self.address)
            .unwrap();
        buf.write_u32::<BigEndian>(self.value)
            .unwrap();
        // Length checked in the constructors
        buf.write_u16::<BigEndian>(self.payload.len() as u16)
            .unwrap();
        buf.extend_from_slice(self.payload);
        buf
    }

    /// Command opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Target flash address.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Value field (length for read/erase/md5).
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Raw payload.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Decoded request header, as the simulated sketch sees it.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub opcode: Opcode,
    pub address: u32,
    pub value: u32,
    pub payload_len: u16,
}

#[cfg(test)]
impl FrameHeader {
    pub(crate) fn parse(data: &[u8; HEADER_LEN]) -> Result<Self> {
        Ok(Self {
            opcode: Opcode::try_from(data[0])?,
            address: u32::from_be_bytes([data[1], data[2], data[3], data[4]]),
            value: u32::from_be_bytes([data[5], data[6], data[7], data[8]]),
            payload_len: u16::from_be_bytes([data[9], data[10]]),
        })
    }
}
