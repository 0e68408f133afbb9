//! NINA command sketch support.

mod session;
pub mod sketch;
mod transfer;
mod verify;

pub use session::{NinaFlasher, ProgressCallback, SessionConfig};
pub use transfer::{CERTIFICATES_LIMIT, CERTIFICATES_OFFSET, FIRMWARE_OFFSET};
