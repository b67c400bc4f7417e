//! Chunked stream copy with an incremental SHA-256 digest.

use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

/// Default copy chunk: 80 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 80 * 1024;

/// Length of a SHA-256 digest in bytes.
pub const CHECKSUM_LEN: usize = 32;

/// A SHA-256 digest.
pub type Checksum = [u8; CHECKSUM_LEN];

/// Copies `reader` into `writer` in chunks of `chunk_size` bytes, hashing as
/// it goes. Returns the number of bytes copied and their digest.
///
/// Only one chunk is held in memory at a time. Interrupted reads are
/// retried; every other error is returned as-is.
///
/// # Errors
///
/// Returns the first read or write error.
pub fn copy_hashed<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> io::Result<(u64, Checksum)>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut hasher = Sha256::new();
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        writer.write_all(&buffer[..n])?;
        total += n as u64;
    }
    writer.flush()?;

    Ok((total, hasher.finalize().into()))
}

/// Hashes a whole stream without keeping it.
///
/// # Errors
///
/// Returns the first read error.
pub fn hash_reader<R: Read + ?Sized>(reader: &mut R, chunk_size: usize) -> io::Result<(u64, Checksum)> {
    copy_hashed(reader, &mut io::sink(), chunk_size)
}
