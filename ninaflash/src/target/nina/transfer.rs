//! Erase-then-write transfer of a buffer into a flash region.

use {
    crate::{
        error::{Error, Result},
        port::Port,
        target::nina::NinaFlasher,
    },
    log::{debug, info},
};

/// Flash offset of the WiFi firmware image.
pub const FIRMWARE_OFFSET: u32 = 0x0000;

/// Flash offset of the root certificate bundle.
pub const CERTIFICATES_OFFSET: u32 = 0x10000;

/// Largest certificate bundle the firmware reserves space for.
pub const CERTIFICATES_LIMIT: usize = 0x20000;

/// Percentage of `sent` over `total`, rounded down.
#[allow(clippy::cast_possible_truncation)] // sent <= total, so the result is <= 100
pub(crate) fn progress_percent(sent: usize, total: usize) -> u8 {
    ((sent * 100) / total) as u8
}

impl<P: Port> NinaFlasher<P> {
    /// Erase `[offset, offset + data.len())` and write `data` into it.
    ///
    /// The region is erased in one command before the first chunk is sent.
    /// Chunks are `max_payload_size` bytes (the last one may be shorter) and
    /// go out in ascending offset order. Before each chunk the progress
    /// callback sees the percentage already sent, so it starts at 0 and
    /// never reaches 100; report completion yourself once this returns.
    ///
    /// Any failure aborts the whole transfer and leaves the region in an
    /// unspecified state. Retrying means calling this again.
    pub fn flash_region(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.last_transfer = None;

        if data.is_empty() {
            return Err(Error::InvalidArgument("nothing to flash".into()));
        }
        let total = data.len();
        let len = u32::try_from(total)
            .ok()
            .filter(|len| offset.checked_add(*len).is_some())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{total} bytes at 0x{offset:08X} overflow the address space"
                ))
            })?;

        info!("Erasing {total} bytes at 0x{offset:08X}");
        self.channel.erase_flash(offset, len)?;

        let mut chunk_offset = offset;
        for (index, chunk) in data
            .chunks(self.max_payload_size)
            .enumerate()
        {
            let sent = index * self.max_payload_size;
            if let Some(progress) = self.progress.as_mut() {
                progress(progress_percent(sent, total));
            }

            debug!("Writing {} bytes at 0x{chunk_offset:08X}", chunk.len());
            self.channel.write_flash(chunk_offset, chunk)?;
            // Cannot overflow: the whole region was range-checked above
            #[allow(clippy::cast_possible_truncation)]
            {
                chunk_offset += chunk.len() as u32;
            }
        }

        debug!("Wrote {total} bytes at 0x{offset:08X}");
        self.last_transfer = Some(total);
        Ok(())
    }

    /// Write a firmware image at offset 0 and check its MD5.
    pub fn upload_firmware(&mut self, firmware: &[u8]) -> Result<()> {
        info!("Uploading firmware ({} bytes)", firmware.len());
        self.flash_region(FIRMWARE_OFFSET, firmware)?;
        self.verify(firmware)
    }

    /// Write a certificate bundle at 0x10000.
    ///
    /// The bundle is zero-padded to a whole number of payloads. It is not
    /// checksummed.
    pub fn upload_certificates(&mut self, certificates: &[u8]) -> Result<()> {
        if certificates.len() > CERTIFICATES_LIMIT {
            return Err(Error::InvalidArgument(format!(
                "certificates data {} exceeds limit of {CERTIFICATES_LIMIT} bytes",
                certificates.len()
            )));
        }

        let mut padded = certificates.to_vec();
        let rem = padded.len() % self.max_payload_size;
        if rem != 0 {
            padded.resize(padded.len() + self.max_payload_size - rem, 0);
        }

        info!(
            "Uploading certificates ({} bytes, {} padded)",
            certificates.len(),
            padded.len()
        );
        self.flash_region(CERTIFICATES_OFFSET, &padded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;
    use crate::target::nina::session::tests::{quick_config, session};
    use crate::port::fake::FakeBootloader;
    use std::sync::{Arc, Mutex};

    fn pattern(len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| u8::try_from(i % 251).unwrap())
            .collect()
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 2500), 0);
        assert_eq!(progress_percent(1024, 2500), 40);
        assert_eq!(progress_percent(2048, 2500), 81);
        assert_eq!(progress_percent(2500, 2500), 100);
    }

    #[test]
    fn test_chunking_and_progress_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut flasher = session(1024).with_progress(move |p| sink.lock().unwrap().push(p));

        let base = 0x2000;
        flasher
            .flash_region(base, &pattern(2500))
            .unwrap();

        let commands = flasher.port().commands();
        // Negotiation, erase, then three writes
        assert_eq!(commands[0].opcode, Opcode::MaxPayloadSize);
        assert_eq!(commands[1].opcode, Opcode::Erase);
        assert_eq!((commands[1].address, commands[1].value), (base, 2500));

        let writes: Vec<(u32, usize)> = commands[2..]
            .iter()
            .map(|c| {
                assert_eq!(c.opcode, Opcode::Write);
                (c.address, c.payload_len)
            })
            .collect();
        assert_eq!(
            writes,
            vec![(base, 1024), (base + 1024, 1024), (base + 2048, 452)]
        );
        assert_eq!(*seen.lock().unwrap(), vec![0, 40, 81]);
    }

    #[test]
    fn test_flash_then_read_back() {
        let mut flasher = session(1024);
        let data = pattern(3000);

        flasher.flash_region(0x8000, &data).unwrap();
        let back = flasher.read_region(0x8000, 3000).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_flash_round_trip_with_short_writes() {
        let port = FakeBootloader::new(1024)
            .with_write_limit(100)
            .with_read_limit(7);
        let mut flasher = NinaFlasher::new(port, &quick_config()).unwrap();
        let data = pattern(1500);

        flasher.flash_region(0x300, &data).unwrap();
        assert_eq!(flasher.port().flash(0x300, 1500), data.as_slice());
        assert_eq!(flasher.read_region(0x300, 1500).unwrap(), data);
    }

    #[test]
    fn test_single_short_buffer_is_one_write() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut flasher = session(4096).with_progress(move |p| sink.lock().unwrap().push(p));

        flasher.flash_region(0, b"tiny").unwrap();
        let writes = flasher
            .port()
            .commands()
            .iter()
            .filter(|c| c.opcode == Opcode::Write)
            .count();
        assert_eq!(writes, 1);
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_write_nack_aborts_with_chunk_offset() {
        let port = FakeBootloader::new(1024).with_nack(Opcode::Write, 1, *b"NO");
        let mut flasher = NinaFlasher::new(port, &quick_config()).unwrap();

        let err = flasher
            .flash_region(0x4000, &pattern(2500))
            .unwrap_err();
        match err {
            Error::Ack {
                opcode,
                address,
                actual,
                ..
            } => {
                assert_eq!(opcode, Opcode::Write);
                assert_eq!(address, 0x4400);
                assert_eq!(&actual, b"NO");
            },
            other => panic!("expected ack error, got {other:?}"),
        }

        // Nothing after the rejected chunk
        let writes = flasher
            .port()
            .commands()
            .iter()
            .filter(|c| c.opcode == Opcode::Write)
            .count();
        assert_eq!(writes, 2);
    }

    #[test]
    fn test_erase_failure_prevents_writes() {
        let port = FakeBootloader::new(1024).with_nack(Opcode::Erase, 0, *b"NO");
        let mut flasher = NinaFlasher::new(port, &quick_config()).unwrap();

        assert!(flasher.flash_region(0, &pattern(10)).is_err());
        assert!(
            flasher
                .port()
                .commands()
                .iter()
                .all(|c| c.opcode != Opcode::Write)
        );
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let mut flasher = session(1024);
        assert!(matches!(
            flasher.flash_region(0, &[]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_region_overflow_rejected() {
        let mut flasher = session(1024);
        assert!(matches!(
            flasher.flash_region(u32::MAX - 1, &[0; 4]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_upload_firmware_writes_at_zero_and_verifies() {
        let mut flasher = session(1024);
        let firmware = pattern(2048 + 17);

        flasher.upload_firmware(&firmware).unwrap();
        let commands = flasher.port().commands();
        assert_eq!(commands[1].opcode, Opcode::Erase);
        assert_eq!(commands[1].address, FIRMWARE_OFFSET);
        let last = commands.last().unwrap();
        assert_eq!(last.opcode, Opcode::Md5);
        assert_eq!(last.value, 2065);
    }

    #[test]
    fn test_upload_certificates_pads_to_payload_multiple() {
        let mut flasher = session(1024);
        let certs = pattern(1500);

        flasher.upload_certificates(&certs).unwrap();
        let port = flasher.port();
        let erase = port.commands()[1];
        assert_eq!((erase.address, erase.value), (CERTIFICATES_OFFSET, 2048));
        assert_eq!(port.flash(CERTIFICATES_OFFSET, 1500), certs.as_slice());
        assert!(
            port.flash(CERTIFICATES_OFFSET + 1500, 548)
                .iter()
                .all(|b| *b == 0)
        );
        assert!(port.commands().iter().all(|c| c.opcode != Opcode::Md5));
    }

    #[test]
    fn test_upload_certificates_exact_multiple_not_padded() {
        let mut flasher = session(1024);
        flasher.upload_certificates(&pattern(2048)).unwrap();
        assert_eq!(flasher.port().commands()[1].value, 2048);
    }

    #[test]
    fn test_upload_certificates_limit() {
        let mut flasher = session(1024);
        let too_big = vec![0u8; CERTIFICATES_LIMIT + 1];
        assert!(matches!(
            flasher.upload_certificates(&too_big),
            Err(Error::InvalidArgument(_))
        ));
        // Rejected before touching the device
        assert_eq!(flasher.port().commands().len(), 1);
    }
}
