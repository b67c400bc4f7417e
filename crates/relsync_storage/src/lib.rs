//! # relsync storage
//!
//! The lowest layer of relsync: everything that touches a database driver or
//! the file system.
//!
//! ## Driver boundary
//!
//! The engine needs three things from a database driver: parametrized
//! command execution, a forward-only row cursor, and transactions. These are
//! the [`Driver`], [`DbTransaction`] and [`RowCursor`] traits. Drivers that
//! offer a large-object API expose it through [`LargeObjects`].
//!
//! [`MemoryDriver`] implements the boundary in memory for tests and tools.
//!
//! ## Blob providers
//!
//! - [`FileBlobProvider`] - One file per blob, path derived from the id
//! - [`TableBlobProvider`] - Binary column in a table
//! - [`LargeObjectProvider`] - Driver large objects, optionally staged
//!
//! Streaming providers copy in fixed-size chunks (80 KiB by default) and
//! compute a SHA-256 digest as they go.
//!
//! ## Example
//!
//! ```rust
//! use relsync_storage::{BlobProvider, Driver, MemoryDriver, TableBlobProvider};
//! use std::io::Read;
//!
//! let driver = MemoryDriver::new();
//! let blobs = TableBlobProvider::default();
//! let mut txn = driver.begin().unwrap();
//! let id = blobs.allocate_id(txn.as_mut()).unwrap();
//! let record = blobs.write(id, &mut &b"hello"[..], txn.as_mut()).unwrap();
//! assert_eq!(record.size, 5);
//!
//! let mut back = String::new();
//! blobs.read(id, txn.as_mut()).unwrap().read_to_string(&mut back).unwrap();
//! assert_eq!(back, "hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob;
mod digest;
mod driver;
mod error;
mod memory;

pub use blob::{
    verify, BlobId, BlobProvider, BlobRecord, FileBlobProvider, LargeObjectProvider,
    TableBlobProvider, FILE_BLOB_SEQUENCE, LARGE_OBJECT_SEQUENCE,
};
pub use digest::{copy_hashed, hash_reader, Checksum, CHECKSUM_LEN, DEFAULT_CHUNK_SIZE};
pub use driver::{
    CommandKind, DbCommand, DbParameter, DbTransaction, Driver, LargeObjects, NativeType,
    PlaceholderStyle, RowCursor,
};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryCursor, MemoryDriver, Procedure};
