//! Blob command implementations.
//!
//! Operates on a filesystem blob store. The file provider does not touch the
//! database, so an in-memory transaction stands in for one.

use relsync_storage::{
    BlobId, BlobProvider, BlobRecord, DbTransaction, Driver, FileBlobProvider, MemoryDriver,
};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

fn open(root: &Path) -> Result<(FileBlobProvider, Box<dyn DbTransaction>), Box<dyn std::error::Error>> {
    let txn = MemoryDriver::new().begin()?;
    Ok((FileBlobProvider::new(root), txn))
}

/// Stores everything `reader` yields under `id`.
pub fn store(
    root: &Path,
    id: BlobId,
    reader: &mut dyn Read,
) -> Result<BlobRecord, Box<dyn std::error::Error>> {
    let (provider, mut txn) = open(root)?;
    let record = provider.write(id, reader, txn.as_mut())?;
    info!(id, size = record.size, "blob stored");
    Ok(record)
}

/// Copies the blob stored under `id` into `writer`. Returns the byte count.
pub fn fetch(
    root: &Path,
    id: BlobId,
    writer: &mut dyn Write,
) -> Result<u64, Box<dyn std::error::Error>> {
    let (provider, mut txn) = open(root)?;
    let mut reader = provider.read(id, txn.as_mut())?;
    let copied = io::copy(&mut reader, writer)?;
    writer.flush()?;
    Ok(copied)
}

/// Runs `blob put`.
pub fn put(root: &Path, id: BlobId, file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let record = match file {
        Some(path) => store(root, id, &mut File::open(path)?)?,
        None => store(root, id, &mut io::stdin().lock())?,
    };
    println!("id:       {}", record.id);
    println!("size:     {}", record.size);
    println!("checksum: {}", record.checksum_hex());
    Ok(())
}

/// Runs `blob get`.
pub fn get(root: &Path, id: BlobId, file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let copied = match file {
        Some(path) => fetch(root, id, &mut BufWriter::new(File::create(path)?))?,
        None => fetch(root, id, &mut io::stdout().lock())?,
    };
    info!(id, size = copied, "blob fetched");
    Ok(())
}

/// Runs `blob rm`.
pub fn rm(root: &Path, id: BlobId) -> Result<(), Box<dyn std::error::Error>> {
    let (provider, mut txn) = open(root)?;
    if provider.delete(id, txn.as_mut())? {
        println!("removed blob {id}");
    } else {
        println!("no blob {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_then_fetch() {
        let dir = tempdir().unwrap();
        let record = store(dir.path(), 7, &mut &b"payload"[..]).unwrap();
        assert_eq!(record.size, 7);
        assert_eq!(record.checksum_hex().len(), 64);

        let mut out = Vec::new();
        assert_eq!(fetch(dir.path(), 7, &mut out).unwrap(), 7);
        assert_eq!(out, b"payload");
    }

    #[test]
    fn store_refuses_existing_id() {
        let dir = tempdir().unwrap();
        store(dir.path(), 1, &mut &b"a"[..]).unwrap();
        assert!(store(dir.path(), 1, &mut &b"b"[..]).is_err());
    }

    #[test]
    fn fetch_missing_fails() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        assert!(fetch(dir.path(), 99, &mut out).is_err());
        assert!(rm(dir.path(), 99).is_ok());
    }
}
