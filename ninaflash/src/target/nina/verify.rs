//! End-to-end MD5 check of the data just written.

use {
    crate::{
        error::{Error, Result},
        port::Port,
        target::nina::NinaFlasher,
    },
    log::info,
    md5::{Digest, Md5},
    std::fmt::Write as _,
};

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl<P: Port> NinaFlasher<P> {
    /// Compare the device's MD5 of the last transfer with the MD5 of `data`.
    ///
    /// The checksum query carries no address: the sketch hashes the region
    /// it was last asked to write. This must therefore directly follow a
    /// successful [`flash_region`](Self::flash_region) of the same length in
    /// this session, with no other command in between. Otherwise it fails
    /// with [`Error::VerifyOutOfOrder`] without sending anything.
    ///
    /// A mismatch is a hard failure and is never retried.
    pub fn verify(&mut self, data: &[u8]) -> Result<()> {
        let written = self.last_transfer.take().ok_or_else(|| {
            Error::VerifyOutOfOrder("no transfer precedes the checksum query".into())
        })?;
        if written != data.len() {
            return Err(Error::VerifyOutOfOrder(format!(
                "last transfer wrote {written} bytes, asked to verify {}",
                data.len()
            )));
        }
        // Same length as a successful transfer, so it fits in u32
        #[allow(clippy::cast_possible_truncation)]
        let length = data.len() as u32;

        let expected = Md5::digest(data);
        let actual = self.channel.md5(length)?;

        if expected.as_slice() != actual.as_slice() {
            return Err(Error::Verification {
                expected: to_hex(&expected),
                actual: to_hex(&actual),
            });
        }

        info!("MD5 verified ({})", to_hex(&expected));
        Ok(())
    }
}
