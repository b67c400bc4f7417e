//! # relsync core
//!
//! Relational persistence and synchronization engine.
//!
//! This crate provides:
//! - Schema metadata and backend dialects ([`Schema`], [`Dialect`])
//! - Command synthesis for insert/update/delete/select ([`CommandBuilder`])
//! - Change-tracked rows ([`TrackedRow`], [`Tracker`]) in per-table identity
//!   caches ([`TableCache`])
//! - Result materialization with stamp-based staleness checks and
//!   dirty-field protection ([`Materializer`])
//! - The depth-bounded, cycle-safe reference-graph codec ([`GraphWriter`],
//!   [`GraphReader`])
//! - The change buffer exported to the notification transport
//!   ([`ChangeBuffer`])
//!
//! [`Workspace`] ties them together. Blob providers live in
//! `relsync_storage` and are reachable from a workspace.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod change_buffer;
mod command;
mod config;
mod dialect;
mod error;
mod graph;
mod reader;
mod row;
mod schema;
mod stats;
mod tracking;
mod workspace;

pub use cache::{CacheRegistry, TableCache};
pub use change_buffer::{
    decode as decode_changes, encode as encode_changes, group_by_table, ChangeBuffer,
    ChangeEntry, ChangeOperation, TableChanges,
};
pub use command::{bind, CommandBuilder};
pub use config::{
    Config, WireOptions, WireProfile, HEADER_INCLUDE_REFERENCED, HEADER_INCLUDE_REFERENCING,
    HEADER_MAX_DEPTH, HEADER_WIRE_PROFILE,
};
pub use dialect::{Dialect, DialectKind, Postgres, SqlServer, Sqlite};
pub use error::{CoreError, CoreResult};
pub use graph::{GraphReader, GraphWriter};
pub use reader::{
    CancelToken, MaterializedRow, Materializer, QuerySource, ReadOptions, ReadOutcome,
    SourceEntry, StaleRow,
};
pub use row::TrackedRow;
pub use schema::{
    Column, ColumnRoles, Constraint, ConstraintKind, DataType, ForeignKey, ItemType, Reference,
    Schema, SchemaBuilder, TableSchema, TableSchemaBuilder,
};
pub use stats::{EngineStats, StatsSnapshot};
pub use tracking::{Ledger, RowStatus, Tracker};
pub use workspace::Workspace;

pub use relsync_codec::{RowKey, Value};
