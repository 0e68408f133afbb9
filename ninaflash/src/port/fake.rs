//! Simulated command sketch used by unit tests.
//!
//! Bytes written by the host are parsed as request frames and answered the
//! way the real sketch does, with knobs for short writes, fragmented reads,
//! rejected acks and a closed link.

use {
    crate::{
        error::Result,
        port::Port,
        protocol::frame::{ACK, FrameHeader, HEADER_LEN, Opcode},
    },
    md5::{Digest, Md5},
    std::{
        collections::VecDeque,
        io::{Read, Write},
        time::Duration,
    },
};

/// One request as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Recorded {
    pub opcode: Opcode,
    pub address: u32,
    pub value: u32,
    pub payload_len: usize,
}

struct Nack {
    opcode: Opcode,
    occurrence: usize,
    reply: [u8; 2],
}

pub(crate) struct FakeBootloader {
    flash: Vec<u8>,
    max_payload: u16,
    rx: Vec<u8>,
    tx: VecDeque<u8>,
    commands: Vec<Recorded>,
    write_calls: usize,
    write_limit: Option<usize>,
    fail_write: Option<usize>,
    read_limit: Option<usize>,
    nack: Option<Nack>,
    seen: Vec<Opcode>,
    region_start: u32,
    hung_up: bool,
    reboots: usize,
    version: String,
    timeout: Duration,
}

impl FakeBootloader {
    const FLASH_SIZE: usize = 0x40000;

    pub(crate) fn new(max_payload: u16) -> Self {
        Self {
            flash: vec![0xA5; Self::FLASH_SIZE],
            max_payload,
            rx: Vec::new(),
            tx: VecDeque::new(),
            commands: Vec::new(),
            write_calls: 0,
            write_limit: None,
            fail_write: None,
            read_limit: None,
            nack: None,
            seen: Vec::new(),
            region_start: 0,
            hung_up: false,
            reboots: 0,
            version: "1.5.0\r\n".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Accept at most `limit` bytes per `write` call.
    pub(crate) fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Fail the `call`-th (1-based) `write` call and every one after it.
    pub(crate) fn with_write_failure(mut self, call: usize) -> Self {
        self.fail_write = Some(call);
        self
    }

    /// Return at most `limit` bytes per `read` call.
    pub(crate) fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = Some(limit);
        self
    }

    /// Answer the `occurrence`-th (0-based) `opcode` request with `reply`.
    pub(crate) fn with_nack(mut self, opcode: Opcode, occurrence: usize, reply: [u8; 2]) -> Self {
        self.nack = Some(Nack {
            opcode,
            occurrence,
            reply,
        });
        self
    }

    pub(crate) fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Reads return `Ok(0)` once the queued response is drained.
    pub(crate) fn hang_up(&mut self) {
        self.hung_up = true;
    }

    pub(crate) fn commands(&self) -> &[Recorded] {
        &self.commands
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.write_calls
    }

    pub(crate) fn reboots(&self) -> usize {
        self.reboots
    }

    pub(crate) fn flash(&self, address: u32, len: usize) -> &[u8] {
        let start = address as usize;
        &self.flash[start..start + len]
    }

    /// Queue raw bytes for the host to read.
    pub(crate) fn push_response(&mut self, data: &[u8]) {
        self.tx.extend(data);
    }

    fn process(&mut self) {
        loop {
            match self.rx.first() {
                None => break,
                Some(b'r') => {
                    self.rx.remove(0);
                    self.reboots += 1;
                    continue;
                },
                Some(b'v') => {
                    self.rx.remove(0);
                    let version = self.version.clone();
                    self.tx.extend(version.as_bytes());
                    continue;
                },
                Some(_) => {},
            }

            if self.rx.len() < HEADER_LEN {
                break;
            }
            let header: [u8; HEADER_LEN] = self.rx[..HEADER_LEN].try_into().unwrap();
            let header = FrameHeader::parse(&header).expect("host sent an unknown opcode");
            let total = HEADER_LEN + usize::from(header.payload_len);
            if self.rx.len() < total {
                break;
            }
            let payload: Vec<u8> = self.rx.drain(..total).skip(HEADER_LEN).collect();
            self.handle(header, &payload);
        }
    }

    fn in_range(&self, address: u32, len: usize) -> bool {
        (address as usize)
            .checked_add(len)
            .is_some_and(|end| end <= self.flash.len())
    }

    fn handle(&mut self, header: FrameHeader, payload: &[u8]) {
        self.commands.push(Recorded {
            opcode: header.opcode,
            address: header.address,
            value: header.value,
            payload_len: payload.len(),
        });
        let occurrence = self
            .seen
            .iter()
            .filter(|op| **op == header.opcode)
            .count();
        self.seen.push(header.opcode);

        let start = header.address as usize;
        let len = header.value as usize;
        let ack = match &self.nack {
            Some(n) if n.opcode == header.opcode && n.occurrence == occurrence => n.reply,
            _ => ACK,
        };

        match header.opcode {
            Opcode::MaxPayloadSize => {
                self.tx.extend(self.max_payload.to_be_bytes());
            },
            Opcode::Read => {
                if self.in_range(header.address, len) {
                    let data = self.flash[start..start + len].to_vec();
                    self.tx.extend(data);
                    self.tx.extend(ack);
                } else {
                    self.tx.extend(*b"ER");
                }
            },
            Opcode::Write => {
                if ack == ACK && self.in_range(header.address, payload.len()) {
                    self.flash[start..start + payload.len()].copy_from_slice(payload);
                    self.tx.extend(ACK);
                } else {
                    self.tx.extend(if ack == ACK { *b"ER" } else { ack });
                }
            },
            Opcode::Erase => {
                if ack == ACK && self.in_range(header.address, len) {
                    self.flash[start..start + len].fill(0xFF);
                    self.region_start = header.address;
                    self.tx.extend(ACK);
                } else {
                    self.tx.extend(if ack == ACK { *b"ER" } else { ack });
                }
            },
            Opcode::Md5 => {
                self.tx.extend(ack);
                if ack == ACK {
                    let begin = self.region_start as usize;
                    let end = (begin + len).min(self.flash.len());
                    let digest = Md5::digest(&self.flash[begin..end]);
                    self.tx.extend(digest.as_slice());
                }
            },
        }
    }
}

impl Read for FakeBootloader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.tx.is_empty() {
            if self.hung_up {
                return Ok(0);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no data",
            ));
        }
        let n = buf
            .len()
            .min(self.tx.len())
            .min(self.read_limit.unwrap_or(usize::MAX));
        for b in buf.iter_mut().take(n) {
            *b = self.tx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for FakeBootloader {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_calls += 1;
        if self.fail_write.is_some_and(|call| self.write_calls >= call) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device gone",
            ));
        }
        let n = buf.len().min(self.write_limit.unwrap_or(usize::MAX));
        self.rx.extend_from_slice(&buf[..n]);
        self.process();
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for FakeBootloader {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn set_dtr(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.hung_up = true;
        Ok(())
    }
}
