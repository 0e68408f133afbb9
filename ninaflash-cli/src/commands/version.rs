//! Firmware version query.

use anyhow::{Context, Result};
use log::debug;
use ninaflash::port::{NativePort, Port, SerialConfig};
use ninaflash::target::nina::sketch;
use std::thread;
use std::time::Duration;

use crate::Cli;
use crate::commands::{baud_rate, ensure_not_interrupted, prepare_port, select_port};
use crate::config::Config;

/// Time for the serial port to become usable after opening.
const PORT_SETTLE: Duration = Duration::from_secs(2);

/// Time the sketch needs to print the version string.
const VERSION_DELAY: Duration = Duration::from_secs(1);

/// Version command implementation.
///
/// Prints the version on stdout so it can be captured by scripts.
pub(crate) fn cmd_version(cli: &Cli, config: &Config) -> Result<()> {
    let port_name = select_port(cli, config)?;
    let port_name = prepare_port(cli, config, &port_name)?;

    let serial = SerialConfig::new(&port_name, baud_rate(cli, config));
    let mut port =
        NativePort::open(&serial).with_context(|| format!("Failed to open {port_name}"))?;

    thread::sleep(PORT_SETTLE);
    let version = ensure_not_interrupted().and_then(|()| {
        sketch::read_firmware_version(&mut port, VERSION_DELAY)
            .context("Failed to read firmware version")
    });
    if let Err(e) = port.close() {
        debug!("Error while closing port: {e}");
    }

    println!("{}", version?);
    Ok(())
}
