//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.
//! Device commands share the preparation steps below.

pub(crate) mod flash;
pub(crate) mod ports;
pub(crate) mod read;
pub(crate) mod version;

use anyhow::{Context, Result};
use console::style;
use log::{debug, info};
use ninaflash::port::{COMMAND_SKETCH_BAUD, touch_1200bps};
use ninaflash::{
    BootloaderKind, Flasher, NativePortEnumerator, PortEnumerator, PortWatcher, SessionConfig,
};

use crate::config::Config;
use crate::{Cli, CliError, was_interrupted};

/// Fail with a cancellation error once Ctrl-C was pressed.
pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

/// Baud rate from the command line, the config file, or the default.
pub(crate) fn baud_rate(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or(COMMAND_SKETCH_BAUD)
}

/// Pick the serial port given by the user, or the only one present.
pub(crate) fn select_port(cli: &Cli, config: &Config) -> Result<String> {
    if let Some(port) = cli
        .port
        .clone()
        .or_else(|| config.connection.serial.clone())
    {
        return Ok(port);
    }

    let ports = NativePortEnumerator
        .list_ports()
        .context("Failed to list serial ports")?;
    match ports.as_slice() {
        [] => Err(ninaflash::Error::DeviceNotFound.into()),
        [only] => {
            info!("Auto-detected port {}", only.name);
            Ok(only.name.clone())
        },
        _ => {
            let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
            Err(CliError::Usage(format!(
                "multiple serial ports found ({}), choose one with --port",
                names.join(", ")
            ))
            .into())
        },
    }
}

/// Whether `--reset` or `flash.reset` asked for the 1200-bps touch.
pub(crate) fn wants_reset(cli: &Cli, config: &Config) -> bool {
    cli.reset || config.flash.reset
}

/// Return the port the command sketch answers on.
///
/// By default the board is used as found, and the session's reboot byte is
/// the only preparation. With a reset requested the board is touched at
/// 1200 bps and followed to the port it comes back on.
pub(crate) fn prepare_port(cli: &Cli, config: &Config, port: &str) -> Result<String> {
    if !wants_reset(cli, config) {
        debug!("No 1200-bps reset requested, using {port}");
        return Ok(port.to_string());
    }

    let mut watcher = PortWatcher::with_config(NativePortEnumerator, config.watch_config());
    let before = watcher.snapshot()?;

    if !cli.quiet {
        eprintln!("{} Resetting board on {}", style("🔄").cyan(), port);
    }
    touch_1200bps(port).with_context(|| format!("Failed to reset board on {port}"))?;

    let resolved = watcher.wait_for_new_port(&before)?.resolve(port);
    ensure_not_interrupted()?;
    Ok(resolved)
}

/// Session parameters derived from flags and config.
pub(crate) fn session_config(cli: &Cli, config: &Config) -> SessionConfig {
    let mut session = SessionConfig {
        baud_rate: baud_rate(cli, config),
        ..SessionConfig::default()
    };
    if let Some(timeout) = config.read_timeout() {
        session = session.with_read_timeout(timeout);
    }
    session
}

/// Select, prepare and open the device.
pub(crate) fn open_flasher(cli: &Cli, config: &Config) -> Result<Box<dyn Flasher>> {
    let port = select_port(cli, config)?;
    let port = prepare_port(cli, config, &port)?;

    let session = session_config(cli, config);
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            port,
            session.baud_rate
        );
        eprintln!("{} Waiting for the command sketch...", style("⏳").yellow());
    }

    let flasher = BootloaderKind::CommandSketch
        .create_flasher(&port, &session)
        .with_context(|| format!("Failed to open session on {port}"))?;
    if !cli.quiet {
        eprintln!(
            "{} Connected (max payload {} bytes)",
            style("✓").green(),
            flasher.max_payload_size()
        );
    }
    Ok(flasher)
}
