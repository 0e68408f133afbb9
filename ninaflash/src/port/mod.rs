//! Port abstraction for the serial link to the command sketch.
//!
//! The protocol layer only needs partial reads and writes (`std::io::Read`
//! and `std::io::Write`), a read deadline and a way to close the link. The
//! [`Port`] trait adds the DTR line used to reset boards.
//!
//! ```text
//! +------------------+
//! |  CommandChannel  |   framing, acks, read-exact
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    Port trait    |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    NativePort    |   serialport crate
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use ninaflash::port::{NativePort, Port, SerialConfig};
//!
//! fn main() -> ninaflash::Result<()> {
//!     let mut port = NativePort::open(&SerialConfig::new("/dev/ttyACM0", 1_000_000))?;
//!     port.write_all_bytes(b"v")?;
//!     port.close()
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod fake;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate the command sketch listens on.
pub const COMMAND_SKETCH_BAUD: u32 = 1_000_000;

/// Serial port configuration.
///
/// The command sketch always talks 8N1 without flow control, so only the
/// name, speed and deadline are configurable.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: COMMAND_SKETCH_BAUD,
            timeout: Duration::from_secs(30),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Byte-stream transport to the device.
///
/// Reads and writes may be partial; callers that need whole frames loop.
pub trait Port: Read + Write + Send {
    /// Set the read/write deadline.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current deadline.
    fn timeout(&self) -> Duration;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Set DTR (Data Terminal Ready) pin state.
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Lists the serial ports currently known to the operating system.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports(&self) -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator, touch_1200bps};
