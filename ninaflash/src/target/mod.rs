//! Bootloader abstraction.
//!
//! A board is flashed through whichever bootloader it is running. The kind is
//! chosen once, when the flasher is created; after that callers only see the
//! [`Flasher`] trait.

pub mod nina;

use crate::error::{Error, Result};
use crate::port::Port;
use crate::target::nina::{NinaFlasher, ProgressCallback, SessionConfig};
use std::fmt;

/// Bootloaders a board may be running when the flasher connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BootloaderKind {
    /// NINA command sketch speaking the framed binary protocol.
    #[default]
    CommandSketch,
    /// SAMD SAM-BA bootloader, driven by `bossac`.
    Bossa,
    /// megaAVR UPDI programming, driven by `avrdude`.
    Avrdude,
    /// RP2040 boot ROM, driven by `rp2040load`.
    Rp2040,
}

impl BootloaderKind {
    /// External program that owns the flashing algorithm, if any.
    #[must_use]
    pub fn external_tool(&self) -> Option<&'static str> {
        match self {
            Self::CommandSketch => None,
            Self::Bossa => Some("bossac"),
            Self::Avrdude => Some("avrdude"),
            Self::Rp2040 => Some("rp2040load"),
        }
    }

    /// Parse a bootloader kind from its name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sketch" | "command-sketch" | "nina" => Some(Self::CommandSketch),
            "bossa" | "bossac" | "samba" => Some(Self::Bossa),
            "avrdude" | "updi" => Some(Self::Avrdude),
            "rp2040" | "rp2040load" | "picoboot" => Some(Self::Rp2040),
            _ => None,
        }
    }

    fn unsupported(self) -> Error {
        Error::Unsupported(format!(
            "{self} is flashed by {}, not by the command protocol",
            self.external_tool().unwrap_or("an external tool")
        ))
    }
}

impl fmt::Display for BootloaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandSketch => write!(f, "command sketch"),
            Self::Bossa => write!(f, "SAM-BA"),
            Self::Avrdude => write!(f, "UPDI"),
            Self::Rp2040 => write!(f, "RP2040 boot ROM"),
        }
    }
}

/// Flashing operations shared by every supported bootloader.
pub trait Flasher {
    /// Negotiated chunk size.
    fn max_payload_size(&self) -> usize;

    /// Register or remove the progress callback used by [`Flasher::flash_region`].
    fn set_progress(&mut self, callback: Option<ProgressCallback>);

    /// Erase a region and write `data` into it.
    fn flash_region(&mut self, offset: u32, data: &[u8]) -> Result<()>;

    /// Check the MD5 of the transfer that just completed.
    fn verify(&mut self, data: &[u8]) -> Result<()>;

    /// Read back a flash region.
    fn read_region(&mut self, address: u32, length: u32) -> Result<Vec<u8>>;

    /// Write and verify a WiFi firmware image.
    fn upload_firmware(&mut self, firmware: &[u8]) -> Result<()>;

    /// Write a root certificate bundle.
    fn upload_certificates(&mut self, certificates: &[u8]) -> Result<()>;

    /// Close the flasher and release the port.
    ///
    /// Safe to call more than once. The flasher cannot be used afterwards.
    fn close(&mut self);
}

impl<P: Port> Flasher for NinaFlasher<P> {
    fn max_payload_size(&self) -> usize {
        self.max_payload_size()
    }

    fn set_progress(&mut self, callback: Option<ProgressCallback>) {
        self.set_progress(callback);
    }

    fn flash_region(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.flash_region(offset, data)
    }

    fn verify(&mut self, data: &[u8]) -> Result<()> {
        self.verify(data)
    }

    fn read_region(&mut self, address: u32, length: u32) -> Result<Vec<u8>> {
        self.read_region(address, length)
    }

    fn upload_firmware(&mut self, firmware: &[u8]) -> Result<()> {
        self.upload_firmware(firmware)
    }

    fn upload_certificates(&mut self, certificates: &[u8]) -> Result<()> {
        self.upload_certificates(certificates)
    }

    fn close(&mut self) {
        self.close();
    }
}

impl BootloaderKind {
    /// Open `port_name` and create a flasher for this bootloader.
    ///
    /// Any reset that may move the board to another port must be resolved
    /// with [`crate::watcher::PortWatcher`] before calling this.
    #[cfg(feature = "native")]
    pub fn create_flasher(
        &self,
        port_name: &str,
        config: &SessionConfig,
    ) -> Result<Box<dyn Flasher>> {
        match self {
            Self::CommandSketch => Ok(Box::new(NinaFlasher::open(port_name, config)?)),
            Self::Bossa | Self::Avrdude | Self::Rp2040 => Err(self.unsupported()),
        }
    }

    /// Create a flasher over an existing port (works for any `Port` type).
    pub fn create_flasher_with_port<P: Port + 'static>(
        &self,
        port: P,
        config: &SessionConfig,
    ) -> Result<Box<dyn Flasher>> {
        match self {
            Self::CommandSketch => Ok(Box::new(NinaFlasher::new(port, config)?)),
            Self::Bossa | Self::Avrdude | Self::Rp2040 => Err(self.unsupported()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::fake::FakeBootloader;
    use std::time::Duration;

    fn quick() -> SessionConfig {
        SessionConfig::default()
            .with_settle(Duration::ZERO)
            .with_reboot(false)
    }

    #[test]
    fn test_bootloader_from_name() {
        assert_eq!(
            BootloaderKind::from_name("nina"),
            Some(BootloaderKind::CommandSketch)
        );
        assert_eq!(
            BootloaderKind::from_name("BOSSAC"),
            Some(BootloaderKind::Bossa)
        );
        assert_eq!(BootloaderKind::from_name("unknown"), None);
    }

    #[test]
    fn test_external_tools() {
        assert_eq!(BootloaderKind::CommandSketch.external_tool(), None);
        assert_eq!(BootloaderKind::Avrdude.external_tool(), Some("avrdude"));
    }

    #[test]
    fn test_create_flasher_with_port_dispatches() {
        let mut flasher = BootloaderKind::CommandSketch
            .create_flasher_with_port(FakeBootloader::new(2048), &quick())
            .unwrap();
        assert_eq!(flasher.max_payload_size(), 2048);

        flasher.flash_region(0, &[9u8; 3000]).unwrap();
        flasher.verify(&[9u8; 3000]).unwrap();
        assert_eq!(flasher.read_region(0, 4).unwrap(), vec![9u8; 4]);
        flasher.close();
    }

    #[test]
    fn test_external_bootloaders_unsupported() {
        let result =
            BootloaderKind::Rp2040.create_flasher_with_port(FakeBootloader::new(1024), &quick());
        match result {
            Err(Error::Unsupported(msg)) => assert!(msg.contains("rp2040load")),
            Err(other) => panic!("expected unsupported, got {other:?}"),
            Ok(_) => panic!("expected unsupported"),
        }
    }
}
