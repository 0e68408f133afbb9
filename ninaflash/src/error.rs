//! Error types for ninaflash.

use crate::protocol::frame::Opcode;
use std::io;
use thiserror::Error;

/// Result type for ninaflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ninaflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port read/write, deadline expiry, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The transport returned zero bytes while a response was still expected.
    #[error("Serial port closed unexpectedly while waiting for {opcode} response")]
    UnexpectedEof {
        /// Command whose response was being read.
        opcode: Opcode,
    },

    /// The device answered with something other than the `OK` literal.
    #[error(
        "Missing ack on {opcode} at 0x{address:08X}: got {actual:02X?} ({}){}",
        String::from_utf8_lossy(actual),
        format_partial(partial)
    )]
    Ack {
        /// Command that was not acknowledged.
        opcode: Opcode,
        /// Flash address the command targeted.
        address: u32,
        /// The two bytes received in place of the ack.
        actual: [u8; 2],
        /// Payload received before the ack (read commands only).
        partial: Vec<u8>,
    },

    /// The device reported a maximum payload size below the usable minimum.
    #[error("Programmer reports {reported} as maximum payload size ({required} is needed)")]
    Negotiation {
        /// Size reported by the device.
        reported: u16,
        /// Minimum size required by the flasher.
        required: u16,
    },

    /// MD5 digest reported by the device differs from the local one.
    #[error("MD5 mismatch: expected {expected}, device reported {actual}")]
    Verification {
        /// Locally computed digest (hex).
        expected: String,
        /// Digest reported by the device (hex).
        actual: String,
    },

    /// Checksum was requested without a matching transfer immediately before it.
    #[error("Verify must directly follow a transfer of the same data: {0}")]
    VerifyOutOfOrder(String),

    /// Frame payload does not fit in the 16-bit length field.
    #[error("Payload of {0} bytes exceeds the 65535 byte frame limit")]
    PayloadTooLarge(usize),

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Device not present.
    #[error("Device not found")]
    DeviceNotFound,

    /// Unexpected response outside the framed protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Unsupported bootloader or operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Operation stopped by the embedding application.
    #[error("Interrupted")]
    Interrupted,
}

fn format_partial(partial: &[u8]) -> String {
    if partial.is_empty() {
        String::new()
    } else {
        format!(
            ", after {} payload bytes: {}",
            partial.len(),
            String::from_utf8_lossy(partial)
        )
    }
}
