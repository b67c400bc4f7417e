//! Large binary payload storage.
//!
//! Three interchangeable providers implement [`BlobProvider`]:
//!
//! - [`FileBlobProvider`] stores each blob as a file under a root directory
//! - [`TableBlobProvider`] stores blobs in a binary column of a table
//! - [`LargeObjectProvider`] uses the driver's large-object API
//!
//! Paths and ids are not portable between providers. No provider retries;
//! callers own their transaction and retry policy. Concurrent operations on
//! the same id are not coordinated.

mod file;
mod large_object;
mod table;

pub use file::{FileBlobProvider, FILE_BLOB_SEQUENCE};
pub use large_object::{LargeObjectProvider, LARGE_OBJECT_SEQUENCE};
pub use table::TableBlobProvider;

use crate::digest::{hash_reader, Checksum};
use crate::driver::DbTransaction;
use crate::error::{StorageError, StorageResult};
use std::io::Read;

/// Identifier of a stored blob.
pub type BlobId = u64;

/// What a completed write produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRecord {
    /// Blob id.
    pub id: BlobId,
    /// Payload size in bytes.
    pub size: u64,
    /// SHA-256 of the payload.
    pub checksum: Checksum,
}

impl BlobRecord {
    /// The checksum as lowercase hex.
    #[must_use]
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }
}

/// A pluggable sink and source for large payloads.
pub trait BlobProvider: Send + Sync {
    /// Reserves a new id from a sequence of the active transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence cannot be advanced.
    fn allocate_id(&self, txn: &mut dyn DbTransaction) -> StorageResult<BlobId>;

    /// Consumes `reader` completely and stores it under `id`.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors. The file and large-object providers also fail
    /// with [`StorageError::AlreadyExists`] if `id` was already written.
    fn write(
        &self,
        id: BlobId,
        reader: &mut dyn Read,
        txn: &mut dyn DbTransaction,
    ) -> StorageResult<BlobRecord>;

    /// Opens the blob for reading from offset 0.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no blob exists for `id`.
    fn read(&self, id: BlobId, txn: &mut dyn DbTransaction) -> StorageResult<Box<dyn Read + Send>>;

    /// Removes the blob. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or driver failure.
    fn delete(&self, id: BlobId, txn: &mut dyn DbTransaction) -> StorageResult<bool>;
}

/// Re-reads a stream and checks it against a record.
///
/// # Errors
///
/// Returns an error if the stream cannot be read.
pub fn verify(reader: &mut dyn Read, expected: &BlobRecord, chunk_size: usize) -> StorageResult<bool> {
    let (size, checksum) = hash_reader(reader, chunk_size)?;
    Ok(size == expected.size && checksum == expected.checksum)
}

pub(crate) fn sequence_id(txn: &mut dyn DbTransaction, sequence: &str) -> StorageResult<BlobId> {
    let next = txn.next_sequence(sequence)?;
    BlobId::try_from(next)
        .map_err(|_| StorageError::corrupted(format!("sequence {sequence} returned {next}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DEFAULT_CHUNK_SIZE;
    use sha2::{Digest, Sha256};

    #[test]
    fn checksum_hex_is_lowercase() {
        let record = BlobRecord {
            id: 1,
            size: 3,
            checksum: Sha256::digest(b"abc").into(),
        };
        assert_eq!(
            record.checksum_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn verify_detects_changes() {
        let record = BlobRecord {
            id: 1,
            size: 3,
            checksum: Sha256::digest(b"abc").into(),
        };
        assert!(verify(&mut &b"abc"[..], &record, DEFAULT_CHUNK_SIZE).unwrap());
        assert!(!verify(&mut &b"abd"[..], &record, DEFAULT_CHUNK_SIZE).unwrap());
        assert!(!verify(&mut &b"abcd"[..], &record, DEFAULT_CHUNK_SIZE).unwrap());
    }
}
