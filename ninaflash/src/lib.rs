//! # ninaflash
//!
//! A library for flashing the u-blox NINA WiFi module found on Arduino boards.
//!
//! The board's main controller runs a small "command sketch" that bridges its
//! USB serial port to the module's flash. This crate speaks that sketch's
//! framed binary protocol:
//!
//! - Command channel with fixed-size, big-endian request frames and a
//!   two-byte `"OK"` acknowledgement
//! - Erase-then-write transfers split by the negotiated payload size
//! - End-to-end MD5 verification of the written image
//! - A port watcher that follows the board when a reset re-enumerates it
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use ninaflash::{BootloaderKind, PortWatcher, SessionConfig};
//!
//! fn main() -> ninaflash::Result<()> {
//!     let firmware = std::fs::read("NINA_W102-v1.5.0.bin")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let mut watcher = PortWatcher::new(ninaflash::NativePortEnumerator);
//!         let before = watcher.snapshot()?;
//!         ninaflash::port::touch_1200bps("/dev/ttyACM0")?;
//!         let port = watcher.wait_for_new_port(&before)?.resolve("/dev/ttyACM0");
//!
//!         let mut flasher =
//!             BootloaderKind::CommandSketch.create_flasher(&port, &SessionConfig::default())?;
//!         flasher.upload_firmware(&firmware)?;
//!         flasher.close();
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod port;
pub mod protocol;
pub mod target;
pub mod watcher;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    error::{Error, Result},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{CommandChannel, CommandFrame, Opcode},
    target::{
        BootloaderKind, Flasher,
        nina::{NinaFlasher, ProgressCallback, SessionConfig},
    },
    watcher::{PortChange, PortSnapshot, PortSource, PortWatcher, WatchConfig},
};
