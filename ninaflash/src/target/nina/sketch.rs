//! Single-byte commands understood by the sketch outside the framed protocol.

use {
    crate::{
        error::{Error, Result},
        port::Port,
    },
    log::{debug, info},
    std::{thread, time::Duration},
};

/// Restarts the WiFi module into its ROM bootloader.
pub const REBOOT: u8 = b'r';

/// Asks the sketch to print the module's firmware version.
pub const VERSION: u8 = b'v';

/// Largest version string the sketch prints.
const VERSION_BUF_LEN: usize = 30;

/// Send the reboot byte.
pub fn reboot<P: Port + ?Sized>(port: &mut P) -> Result<()> {
    debug!("Sending reboot byte");
    port.write_all_bytes(&[REBOOT])
}

/// Ask the sketch for the firmware version string.
///
/// The sketch answers with a short line after a delay, so this waits
/// `settle` before a single read bounded by a one second deadline. The
/// port's previous deadline is restored afterwards.
pub fn read_firmware_version<P: Port + ?Sized>(port: &mut P, settle: Duration) -> Result<String> {
    port.write_all_bytes(&[VERSION])?;
    thread::sleep(settle);

    let previous = port.timeout();
    port.set_timeout(Duration::from_secs(1))?;
    let mut buf = [0u8; VERSION_BUF_LEN];
    let read = port.read(&mut buf);
    port.set_timeout(previous)?;

    let n = read?;
    if n == 0 {
        return Err(Error::Protocol("couldn't read serial buffer".into()));
    }

    let version = String::from_utf8_lossy(&buf[..n])
        .trim()
        .to_string();
    info!("Firmware version: {version}");
    Ok(version)
}
