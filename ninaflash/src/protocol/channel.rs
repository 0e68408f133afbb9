//! Command channel: one request, one response, over a partial-I/O port.
//!
//! The command sketch is strictly half-duplex. [`CommandChannel`] owns the
//! port and every operation takes `&mut self`, so a second request can never
//! be issued while a response is still outstanding.
//!
//! There is no timeout here. The deadline configured on the port decides
//! how long a read may block, and an expired deadline surfaces as
//! [`Error::Io`].

use {
    crate::{
        error::{Error, Result},
        port::Port,
        protocol::frame::{ACK, CommandFrame, DIGEST_LEN, Opcode},
    },
    log::{debug, trace},
    std::io::ErrorKind,
};

/// Framed request/response exchange with the command sketch.
pub struct CommandChannel<P: Port> {
    port: P,
}

impl<P: Port> CommandChannel<P> {
    /// Wrap an open port.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the channel and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Serialize `frame` and push every byte to the port.
    ///
    /// Short writes are continued until the whole frame is accepted.
    pub fn send(&mut self, frame: &CommandFrame<'_>) -> Result<()> {
        let data = frame.build();
        trace!(
            "Sending {} @ 0x{:08X} value={} ({} bytes)",
            frame.opcode(),
            frame.address(),
            frame.value(),
            data.len()
        );

        let mut remaining = data.as_slice();
        while !remaining.is_empty() {
            match self.port.write(remaining) {
                Ok(0) => {
                    return Err(Error::Io(std::io::Error::new(
                        ErrorKind::WriteZero,
                        format!("port accepted no bytes while sending {}", frame.opcode()),
                    )));
                },
                Ok(n) => {
                    if n < remaining.len() {
                        trace!("Short write: {n}/{} bytes", remaining.len());
                    }
                    remaining = &remaining[n..];
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }
        self.port.flush()?;
        Ok(())
    }

    /// Block until exactly `buf.len()` bytes have been received.
    ///
    /// A read returning zero bytes means the link went away.
    pub fn read_exact(&mut self, opcode: Opcode, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => return Err(Error::UnexpectedEof { opcode }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    fn read_ack(&mut self, opcode: Opcode, address: u32, partial: &[u8]) -> Result<()> {
        let mut ack = [0u8; 2];
        self.read_exact(opcode, &mut ack)?;
        if ack == ACK {
            Ok(())
        } else {
            Err(Error::Ack {
                opcode,
                address,
                actual: ack,
                partial: partial.to_vec(),
            })
        }
    }

    /// Ask the sketch for the largest payload it accepts in one frame.
    pub fn query_max_payload_size(&mut self) -> Result<u16> {
        self.send(&CommandFrame::max_payload_size())?;
        let mut res = [0u8; 2];
        self.read_exact(Opcode::MaxPayloadSize, &mut res)?;
        let size = u16::from_be_bytes(res);
        debug!("Device reports maximum payload size {size}");
        Ok(size)
    }

    /// Read `length` bytes of flash starting at `address`.
    pub fn read_flash(&mut self, address: u32, length: u32) -> Result<Vec<u8>> {
        self.send(&CommandFrame::read(address, length))?;
        let mut result = vec![0u8; length as usize];
        self.read_exact(Opcode::Read, &mut result)?;
        self.read_ack(Opcode::Read, address, &result)?;
        Ok(result)
    }

    /// Write `data` to flash at `address`.
    pub fn write_flash(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.send(&CommandFrame::write(address, data)?)?;
        self.read_ack(Opcode::Write, address, &[])
    }

    /// Erase `length` bytes of flash starting at `address`.
    pub fn erase_flash(&mut self, address: u32, length: u32) -> Result<()> {
        self.send(&CommandFrame::erase(address, length))?;
        self.read_ack(Opcode::Erase, address, &[])
    }

    /// Ask the sketch for the MD5 of the first `length` bytes it last wrote.
    pub fn md5(&mut self, length: u32) -> Result<[u8; DIGEST_LEN]> {
        self.send(&CommandFrame::md5(length))?;
        self.read_ack(Opcode::Md5, 0, &[])?;
        let mut digest = [0u8; DIGEST_LEN];
        self.read_exact(Opcode::Md5, &mut digest)?;
        Ok(digest)
    }
}
