//! Flash session: one open port plus one negotiated payload size.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ninaflash::target::nina::{NinaFlasher, SessionConfig};
//!
//! fn main() -> ninaflash::Result<()> {
//!     let firmware = std::fs::read("NINA_W102.bin")?;
//!
//!     let mut flasher = NinaFlasher::open("/dev/ttyACM0", &SessionConfig::default())?
//!         .with_progress(|percent| eprint!("Flashing progress: {percent}%\r"));
//!     flasher.upload_firmware(&firmware)?;
//!     flasher.close();
//!     Ok(())
//! }
//! ```

use {
    crate::{
        error::{Error, Result},
        port::{COMMAND_SKETCH_BAUD, Port},
        protocol::{CommandChannel, MIN_PAYLOAD_SIZE},
        target::nina::sketch,
    },
    log::{debug, info, warn},
    std::{thread, time::Duration},
};

/// Progress callback, receives a percentage in `0..=100`.
pub type ProgressCallback = Box<dyn FnMut(u8) + Send>;

/// Session bring-up parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Baud rate of the command sketch.
    pub baud_rate: u32,
    /// Read deadline applied to the port for the whole session.
    ///
    /// Must cover the slowest erase the module can perform.
    pub read_timeout: Duration,
    /// Pause after opening the port and again after the reboot byte.
    pub settle: Duration,
    /// Send the reboot byte before negotiating.
    pub reboot: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: COMMAND_SKETCH_BAUD,
            read_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(2),
            reboot: true,
        }
    }
}

impl SessionConfig {
    /// Set the read deadline.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the settle delay.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Enable or disable the reboot byte.
    #[must_use]
    pub fn with_reboot(mut self, reboot: bool) -> Self {
        self.reboot = reboot;
        self
    }
}

/// Flasher for the NINA command sketch.
///
/// Generic over the port type `P`, which must implement the `Port` trait.
/// A value of this type always holds a negotiated payload size of at least
/// 1024 bytes; construction fails otherwise.
pub struct NinaFlasher<P: Port> {
    pub(super) channel: CommandChannel<P>,
    pub(super) max_payload_size: usize,
    pub(super) progress: Option<ProgressCallback>,
    /// Length of the transfer the next checksum query refers to.
    pub(super) last_transfer: Option<usize>,
}

impl<P: Port> NinaFlasher<P> {
    /// Bring up a session over an already opened port.
    ///
    /// Applies the read deadline, optionally reboots the sketch, then
    /// negotiates the payload size.
    pub fn new(mut port: P, config: &SessionConfig) -> Result<Self> {
        port.set_timeout(config.read_timeout)?;

        // The sketch needs a moment after the port opens
        thread::sleep(config.settle);
        if config.reboot {
            sketch::reboot(&mut port)?;
            thread::sleep(config.settle);
        }

        let mut channel = CommandChannel::new(port);
        let reported = channel.query_max_payload_size()?;
        if reported < MIN_PAYLOAD_SIZE {
            warn!("Rejecting session: device payload size {reported} < {MIN_PAYLOAD_SIZE}");
            let _ = channel.port_mut().close();
            return Err(Error::Negotiation {
                reported,
                required: MIN_PAYLOAD_SIZE,
            });
        }

        info!(
            "Session open on {} (max payload {reported} bytes)",
            channel.port().name()
        );
        Ok(Self {
            channel,
            max_payload_size: usize::from(reported),
            progress: None,
            last_transfer: None,
        })
    }

    /// Register a progress callback.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Replace or remove the progress callback.
    pub fn set_progress(&mut self, callback: Option<ProgressCallback>) {
        self.progress = callback;
    }

    /// Negotiated chunk size.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        self.channel.port()
    }

    /// Consume the session and return the underlying port.
    pub fn into_port(self) -> P {
        self.channel.into_port()
    }

    /// Read `length` bytes of flash starting at `address`.
    ///
    /// Large reads are split into payload-sized requests.
    pub fn read_region(&mut self, address: u32, length: u32) -> Result<Vec<u8>> {
        self.last_transfer = None;
        let end = address.checked_add(length).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "read of {length} bytes at 0x{address:08X} overflows the address space"
            ))
        })?;

        let mut result = Vec::with_capacity(length as usize);
        let mut cursor = address;
        while cursor < end {
            #[allow(clippy::cast_possible_truncation)] // bounded by u16 payload size
            let step = (end - cursor).min(self.max_payload_size as u32);
            debug!("Reading {step} bytes at 0x{cursor:08X}");
            result.extend(self.channel.read_flash(cursor, step)?);
            cursor += step;
        }
        Ok(result)
    }

    /// Send the reboot byte to the sketch.
    pub fn reboot(&mut self) -> Result<()> {
        self.last_transfer = None;
        sketch::reboot(self.channel.port_mut())
    }

    /// Close the port. The session cannot be used afterwards.
    pub fn close(&mut self) {
        self.last_transfer = None;
        if let Err(e) = self.channel.port_mut().close() {
            debug!("Error while closing port: {e}");
        }
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{NinaFlasher, Result, SessionConfig};
    use crate::port::{NativePort, SerialConfig};

    impl NinaFlasher<NativePort> {
        /// Open `port_name` and bring up a session on it.
        pub fn open(port_name: &str, config: &SessionConfig) -> Result<Self> {
            let serial = SerialConfig::new(port_name, config.baud_rate)
                .with_timeout(config.read_timeout);
            let port = NativePort::open(&serial)?;
            Self::new(port, config)
        }
    }
}
