//! File-system blob provider.

use super::{sequence_id, BlobId, BlobProvider, BlobRecord};
use crate::digest::{copy_hashed, DEFAULT_CHUNK_SIZE};
use crate::driver::DbTransaction;
use crate::error::{StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sequence the file provider draws ids from.
pub const FILE_BLOB_SEQUENCE: &str = "file_blob_seq";

/// Stores each blob as one file below a root directory.
///
/// The path of a blob is derived from its id alone: the id is written as 16
/// hex digits and its two lowest bytes select two levels of subdirectories,
/// so `0x2a` lives at `root/2a/00/000000000000002a`.
///
/// Files are created with `create_new`; writing an id twice fails with
/// [`StorageError::AlreadyExists`]. A partially written file is removed
/// before the error is returned.
///
/// # Example
///
/// ```no_run
/// use relsync_storage::{BlobProvider, Driver, FileBlobProvider, MemoryDriver};
/// use std::path::Path;
///
/// let provider = FileBlobProvider::new(Path::new("blobs"));
/// let driver = MemoryDriver::new();
/// let mut txn = driver.begin().unwrap();
/// let id = provider.allocate_id(txn.as_mut()).unwrap();
/// let record = provider.write(id, &mut &b"payload"[..], txn.as_mut()).unwrap();
/// assert_eq!(record.size, 7);
/// ```
#[derive(Debug, Clone)]
pub struct FileBlobProvider {
    root: PathBuf,
    chunk_size: usize,
}

impl FileBlobProvider {
    /// Creates a provider rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the copy chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path a blob id maps to.
    #[must_use]
    pub fn path_for(&self, id: BlobId) -> PathBuf {
        let name = format!("{id:016x}");
        self.root.join(&name[14..16]).join(&name[12..14]).join(name)
    }

    fn write_file(&self, path: &Path, reader: &mut dyn Read) -> StorageResult<(u64, [u8; 32])> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let result = copy_hashed(reader, &mut writer, self.chunk_size);
        let outcome = result.and_then(|copied| {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            Ok(copied)
        });
        outcome.map_err(StorageError::from)
    }
}

impl BlobProvider for FileBlobProvider {
    fn allocate_id(&self, txn: &mut dyn DbTransaction) -> StorageResult<BlobId> {
        sequence_id(txn, FILE_BLOB_SEQUENCE)
    }

    fn write(
        &self,
        id: BlobId,
        reader: &mut dyn Read,
        _txn: &mut dyn DbTransaction,
    ) -> StorageResult<BlobRecord> {
        let path = self.path_for(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match self.write_file(&path, reader) {
            Ok((size, checksum)) => {
                debug!(id, size, path = %path.display(), "blob file written");
                Ok(BlobRecord { id, size, checksum })
            }
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::already_exists(format!("blob {id}")))
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!(id, error = %cleanup, "failed to remove partial blob file");
                }
                Err(err)
            }
        }
    }

    fn read(&self, id: BlobId, _txn: &mut dyn DbTransaction) -> StorageResult<Box<dyn Read + Send>> {
        let file = File::open(self.path_for(id))
            .map_err(|e| StorageError::from_io_for(e, format!("blob {id}")))?;
        Ok(Box::new(BufReader::with_capacity(self.chunk_size, file)))
    }

    fn delete(&self, id: BlobId, _txn: &mut dyn DbTransaction) -> StorageResult<bool> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
