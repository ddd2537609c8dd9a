//! Streaming integrity checking
//!
//! Read and write adapters computing a running CRC-64 (ISO polynomial)
//! over the bytes flowing through. Integrity is a read-stream vs
//! write-stream comparison at end of transfer; a mismatch fails the job.

use crc::{Crc, Digest, CRC_64_GO_ISO};
use std::io::{self, Read, Write};

static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Read adapter computing a CRC-64 of everything read through it
pub struct ChecksumReader<R> {
    inner: R,
    digest: Digest<'static, u64>,
    bytes: u64,
}

impl<R> ChecksumReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
            bytes: 0,
        }
    }

    /// Checksum of the bytes read so far
    pub fn checksum(&self) -> u64 {
        self.digest.clone().finalize()
    }

    /// Total bytes read through this adapter
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.bytes += n as u64;
            self.digest.update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Write adapter computing a CRC-64 of everything written through it
pub struct ChecksumWriter<W> {
    inner: W,
    digest: Digest<'static, u64>,
    bytes: u64,
}

impl<W> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
            bytes: 0,
        }
    }

    /// Checksum of the bytes written so far
    pub fn checksum(&self) -> u64 {
        self.digest.clone().finalize()
    }

    /// Total bytes written through this adapter
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if n > 0 {
            self.bytes += n as u64;
            self.digest.update(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
