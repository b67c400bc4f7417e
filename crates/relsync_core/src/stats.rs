//! Engine statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = workspace.stats().snapshot();
//! println!("materialized: {}", stats.rows_materialized);
//! println!("stale rows skipped: {}", stats.stale_rows_skipped);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct EngineStats {
    // Materializer
    rows_materialized: AtomicU64,
    stale_rows_skipped: AtomicU64,
    fields_protected: AtomicU64,
    instances_attached: AtomicU64,
    reads_cancelled: AtomicU64,

    // Graph codec
    objects_written: AtomicU64,
    objects_omitted: AtomicU64,
    objects_read: AtomicU64,

    // Write-back
    commands_executed: AtomicU64,

    // Blobs
    blobs_written: AtomicU64,
    blob_bytes_written: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_materialized(&self) {
        self.rows_materialized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_skip(&self) {
        self.stale_rows_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_protected(&self, fields: u64) {
        self.fields_protected.fetch_add(fields, Ordering::Relaxed);
    }

    pub(crate) fn record_attach(&self) {
        self.instances_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancel(&self) {
        self.reads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_object_written(&self) {
        self.objects_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_object_omitted(&self) {
        self.objects_omitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_object_read(&self) {
        self.objects_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_command(&self) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed blob write.
    pub fn record_blob_write(&self, bytes: u64) {
        self.blobs_written.fetch_add(1, Ordering::Relaxed);
        self.blob_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Rows applied to an instance by the materializer.
    pub fn rows_materialized(&self) -> u64 {
        self.rows_materialized.load(Ordering::Relaxed)
    }

    /// Rows not applied because the cached instance was as new or newer.
    pub fn stale_rows_skipped(&self) -> u64 {
        self.stale_rows_skipped.load(Ordering::Relaxed)
    }

    /// Fields left untouched because they had unsaved local changes.
    pub fn fields_protected(&self) -> u64 {
        self.fields_protected.load(Ordering::Relaxed)
    }

    /// Instances added to a table cache.
    pub fn instances_attached(&self) -> u64 {
        self.instances_attached.load(Ordering::Relaxed)
    }

    /// Reads stopped by a cancel token.
    pub fn reads_cancelled(&self) -> u64 {
        self.reads_cancelled.load(Ordering::Relaxed)
    }

    /// Objects emitted by graph writers.
    pub fn objects_written(&self) -> u64 {
        self.objects_written.load(Ordering::Relaxed)
    }

    /// Objects skipped by graph writers because they were already written.
    pub fn objects_omitted(&self) -> u64 {
        self.objects_omitted.load(Ordering::Relaxed)
    }

    /// Objects applied by graph readers.
    pub fn objects_read(&self) -> u64 {
        self.objects_read.load(Ordering::Relaxed)
    }

    /// Commands sent to a driver.
    pub fn commands_executed(&self) -> u64 {
        self.commands_executed.load(Ordering::Relaxed)
    }

    /// Completed blob writes.
    pub fn blobs_written(&self) -> u64 {
        self.blobs_written.load(Ordering::Relaxed)
    }

    /// Bytes of completed blob writes.
    pub fn blob_bytes_written(&self) -> u64 {
        self.blob_bytes_written.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rows_materialized: self.rows_materialized(),
            stale_rows_skipped: self.stale_rows_skipped(),
            fields_protected: self.fields_protected(),
            instances_attached: self.instances_attached(),
            reads_cancelled: self.reads_cancelled(),
            objects_written: self.objects_written(),
            objects_omitted: self.objects_omitted(),
            objects_read: self.objects_read(),
            commands_executed: self.commands_executed(),
            blobs_written: self.blobs_written(),
            blob_bytes_written: self.blob_bytes_written(),
        }
    }
}

/// A point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Rows applied to an instance by the materializer.
    pub rows_materialized: u64,
    /// Rows skipped as stale.
    pub stale_rows_skipped: u64,
    /// Fields protected from reloads.
    pub fields_protected: u64,
    /// Instances added to a table cache.
    pub instances_attached: u64,
    /// Reads stopped by a cancel token.
    pub reads_cancelled: u64,
    /// Objects emitted by graph writers.
    pub objects_written: u64,
    /// Objects omitted by graph writers.
    pub objects_omitted: u64,
    /// Objects applied by graph readers.
    pub objects_read: u64,
    /// Commands sent to a driver.
    pub commands_executed: u64,
    /// Completed blob writes.
    pub blobs_written: u64,
    /// Bytes of completed blob writes.
    pub blob_bytes_written: u64,
}
