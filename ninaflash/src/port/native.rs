//! Native serial port implementation using the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortEnumerator, PortInfo, SerialConfig},
    },
    log::{debug, trace},
    std::{
        io::{Read, Write},
        thread,
        time::Duration,
    },
};

/// Baud rate that asks native-USB boards to jump into their bootloader.
pub const TOUCH_BAUD: u32 = 1200;

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!(
            "Opening {} at {} baud (timeout {:?})",
            config.port_name, config.baud_rate, config.timeout
        );
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            timeout: config.timeout,
        })
    }

    fn closed() -> Error {
        Error::Serial(serialport::Error::new(
            serialport::ErrorKind::NoDevice,
            "Port is closed",
        ))
    }

    fn inner_mut(&mut self) -> std::io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_timeout(timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        trace!("Setting DTR to {level}");
        match self.port {
            Some(ref mut p) => Ok(p.write_data_terminal_ready(level)?),
            None => Err(Self::closed()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner_mut()?.read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner_mut()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner_mut()?.flush()
    }
}

/// Reset a native-USB board into its bootloader.
///
/// Opening the CDC port at 1200 baud and dropping DTR is the conventional
/// "touch" that makes the board reboot. The port usually disappears right
/// after, so callers snapshot ports first and resolve the new address with
/// [`crate::watcher::PortWatcher`].
pub fn touch_1200bps(port_name: &str) -> Result<()> {
    debug!("Touching {port_name} at {TOUCH_BAUD} baud");
    let config = SerialConfig::new(port_name, TOUCH_BAUD).with_timeout(Duration::from_millis(100));
    let mut port = NativePort::open(&config)?;

    // Some drivers refuse to toggle lines on a port that is going away.
    if let Err(e) = port.set_dtr(false) {
        debug!("Ignoring DTR error during touch: {e}");
    }
    port.close()?;

    // Give the OS time to tear the device down before anyone re-enumerates.
    thread::sleep(Duration::from_millis(500));
    Ok(())
}

/// Native port enumerator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let (vid, pid, manufacturer, product, serial_number) = match p.port_type {
                    serialport::SerialPortType::UsbPort(info) => (
                        Some(info.vid),
                        Some(info.pid),
                        info.manufacturer,
                        info.product,
                        info.serial_number,
                    ),
                    _ => (None, None, None, None, None),
                };

                PortInfo {
                    name: p.port_name,
                    vid,
                    pid,
                    manufacturer,
                    product,
                    serial_number,
                }
            })
            .collect())
    }
}
