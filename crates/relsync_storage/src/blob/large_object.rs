//! Blob provider backed by the driver's large-object API.

use super::{sequence_id, BlobId, BlobProvider, BlobRecord};
use crate::digest::{copy_hashed, DEFAULT_CHUNK_SIZE};
use crate::driver::{DbTransaction, LargeObjects};
use crate::error::{StorageError, StorageResult};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sequence the large-object provider draws ids from.
pub const LARGE_OBJECT_SEQUENCE: &str = "large_object_seq";

/// Stores blobs as driver large objects.
///
/// Without a staging directory the payload is streamed straight into a new
/// large object. With one, it is first copied to a staging file and then
/// imported; the staging file is always removed afterwards.
#[derive(Debug, Clone, Default)]
pub struct LargeObjectProvider {
    staging: Option<PathBuf>,
    chunk_size: usize,
}

impl LargeObjectProvider {
    /// Creates a provider that streams directly.
    #[must_use]
    pub fn new() -> Self {
        Self {
            staging: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Stages payloads in `dir` before importing them.
    #[must_use]
    pub fn with_staging(mut self, dir: &Path) -> Self {
        self.staging = Some(dir.to_path_buf());
        self
    }

    /// Sets the copy chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn api(txn: &mut dyn DbTransaction) -> StorageResult<&mut dyn LargeObjects> {
        txn.large_objects()
            .ok_or_else(|| StorageError::driver("driver has no large-object support"))
    }

    fn write_direct(
        &self,
        id: BlobId,
        reader: &mut dyn Read,
        objects: &mut dyn LargeObjects,
    ) -> StorageResult<(u64, [u8; 32])> {
        objects.create(id)?;
        let copied = {
            let mut sink = objects.open_write(id)?;
            copy_hashed(reader, &mut sink, self.chunk_size)
        };
        match copied {
            Ok(done) => Ok(done),
            Err(e) => {
                if let Err(cleanup) = objects.unlink(id) {
                    warn!(id, error = %cleanup, "failed to unlink partial large object");
                }
                Err(e.into())
            }
        }
    }

    fn write_staged(
        &self,
        dir: &Path,
        id: BlobId,
        reader: &mut dyn Read,
        objects: &mut dyn LargeObjects,
    ) -> StorageResult<(u64, [u8; 32])> {
        fs::create_dir_all(dir)?;
        let staged = StagingFile::new(dir.join(format!("{}.lo", uuid::Uuid::new_v4())));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(staged.path())?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let (size, checksum) = copy_hashed(reader, &mut writer, self.chunk_size)?;
        drop(writer);

        let imported = objects.import(id, staged.path())?;
        if imported != size {
            return Err(StorageError::corrupted(format!(
                "large object {id} imported {imported} bytes, staged {size}"
            )));
        }
        Ok((size, checksum))
    }
}

/// Removes the staging file when dropped, whatever the outcome.
struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "staging file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove staging file"),
        }
    }
}

impl BlobProvider for LargeObjectProvider {
    fn allocate_id(&self, txn: &mut dyn DbTransaction) -> StorageResult<BlobId> {
        sequence_id(txn, LARGE_OBJECT_SEQUENCE)
    }

    fn write(
        &self,
        id: BlobId,
        reader: &mut dyn Read,
        txn: &mut dyn DbTransaction,
    ) -> StorageResult<BlobRecord> {
        let objects = Self::api(txn)?;
        let (size, checksum) = match &self.staging {
            Some(dir) => self.write_staged(dir, id, reader, objects)?,
            None => self.write_direct(id, reader, objects)?,
        };
        debug!(id, size, staged = self.staging.is_some(), "large object written");
        Ok(BlobRecord { id, size, checksum })
    }

    fn read(&self, id: BlobId, txn: &mut dyn DbTransaction) -> StorageResult<Box<dyn Read + Send>> {
        Self::api(txn)?.open_read(id)
    }

    fn delete(&self, id: BlobId, txn: &mut dyn DbTransaction) -> StorageResult<bool> {
        Self::api(txn)?.unlink(id)
    }
}
