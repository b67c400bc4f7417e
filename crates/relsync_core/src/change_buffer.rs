//! Buffer of committed row changes for the notification transport.
//!
//! Every successful save or delete appends a [`ChangeEntry`]. The transport
//! drains or exports the buffer; the other side feeds the entries to
//! [`Workspace::apply_changes`](crate::Workspace::apply_changes).
//!
//! Entries can also be observed as they happen:
//!
//! ```rust,ignore
//! let receiver = workspace.changes().subscribe();
//! std::thread::spawn(move || {
//!     while let Ok(entry) = receiver.recv() {
//!         println!("{} {} {}", entry.operation, entry.table, entry.key);
//!     }
//! });
//! ```

use parking_lot::{Mutex, RwLock};
use relsync_codec::{from_cbor, to_canonical_cbor, CodecError, CodecResult, RowKey, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::warn;

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOperation {
    /// Row was inserted.
    Insert,
    /// Row was updated.
    Update,
    /// Row was deleted.
    Delete,
}

impl ChangeOperation {
    /// Wire code.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            ChangeOperation::Insert => 1,
            ChangeOperation::Update => 2,
            ChangeOperation::Delete => 3,
        }
    }

    /// Operation of a wire code.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ChangeOperation::Insert),
            2 => Some(ChangeOperation::Update),
            3 => Some(ChangeOperation::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        })
    }
}

/// One committed change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEntry {
    /// Table name.
    pub table: String,
    /// Item type of the row.
    pub discriminator: i64,
    /// Operation.
    pub operation: ChangeOperation,
    /// Primary key.
    pub key: RowKey,
}

impl ChangeEntry {
    /// Creates an entry.
    pub fn new(
        table: impl Into<String>,
        discriminator: i64,
        operation: ChangeOperation,
        key: RowKey,
    ) -> Self {
        Self {
            table: table.into(),
            discriminator,
            operation,
            key,
        }
    }
}

/// Changes of one table, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChanges {
    /// Table name.
    pub table: String,
    /// The table's entries.
    pub entries: Vec<ChangeEntry>,
}

/// Groups entries by table, in order of each table's first appearance.
#[must_use]
pub fn group_by_table(entries: &[ChangeEntry]) -> Vec<TableChanges> {
    let mut groups: Vec<TableChanges> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|g| g.table == entry.table) {
            Some(group) => group.entries.push(entry.clone()),
            None => groups.push(TableChanges {
                table: entry.table.clone(),
                entries: vec![entry.clone()],
            }),
        }
    }
    groups
}

/// Encodes grouped changes to canonical CBOR.
///
/// Each group is a map `{"table": name, "changes": [[discriminator, op, key], ...]}`.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode(groups: &[TableChanges]) -> CodecResult<Vec<u8>> {
    let groups: Vec<Value> = groups
        .iter()
        .map(|group| {
            let changes = group
                .entries
                .iter()
                .map(|e| {
                    Value::Array(vec![
                        Value::Integer(e.discriminator),
                        Value::Integer(e.operation.code()),
                        e.key.to_value(),
                    ])
                })
                .collect();
            Value::map(vec![
                (Value::Text("table".into()), Value::Text(group.table.clone())),
                (Value::Text("changes".into()), Value::Array(changes)),
            ])
        })
        .collect();
    to_canonical_cbor(&Value::Array(groups))
}

/// Decodes changes encoded by [`encode`] back into a flat sequence.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid change export.
pub fn decode(bytes: &[u8]) -> CodecResult<Vec<ChangeEntry>> {
    let value = from_cbor(bytes)?;
    let groups = value
        .as_array()
        .ok_or_else(|| CodecError::invalid_structure("expected array of table changes"))?;

    let mut entries = Vec::new();
    for group in groups {
        let table = group
            .get("table")
            .and_then(Value::as_text)
            .ok_or_else(|| CodecError::invalid_structure("missing table"))?;
        let changes = group
            .get("changes")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::invalid_structure("missing changes"))?;

        for change in changes {
            let [discriminator, operation, key] = change.as_array().unwrap_or_default() else {
                return Err(CodecError::invalid_structure("change must have three fields"));
            };
            let discriminator = discriminator
                .as_integer()
                .ok_or_else(|| CodecError::invalid_structure("invalid discriminator"))?;
            let operation = operation
                .as_integer()
                .and_then(ChangeOperation::from_code)
                .ok_or_else(|| CodecError::invalid_structure("invalid operation"))?;
            let key = RowKey::from_value(key)
                .ok_or_else(|| CodecError::invalid_structure("invalid key"))?;
            entries.push(ChangeEntry::new(table, discriminator, operation, key));
        }
    }
    Ok(entries)
}

/// Bounded, ordered buffer of committed changes.
///
/// When full, the oldest entry is dropped. Subscribers receive every entry
/// pushed after they subscribed.
pub struct ChangeBuffer {
    entries: Mutex<VecDeque<ChangeEntry>>,
    subscribers: RwLock<Vec<Sender<ChangeEntry>>>,
    capacity: usize,
}

impl ChangeBuffer {
    /// Creates a buffer holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of buffered entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an entry and forwards it to subscribers.
    pub fn push(&self, entry: ChangeEntry) {
        {
            let mut entries = self.entries.lock();
            if entries.len() == self.capacity {
                if let Some(dropped) = entries.pop_front() {
                    warn!(
                        table = %dropped.table,
                        key = %dropped.key,
                        capacity = self.capacity,
                        "change buffer full, dropping oldest entry"
                    );
                }
            }
            entries.push_back(entry.clone());
        }
        self.subscribers
            .write()
            .retain(|tx| tx.send(entry.clone()).is_ok());
    }

    /// Receives every entry pushed from now on.
    pub fn subscribe(&self) -> Receiver<ChangeEntry> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Buffered entries in commit order.
    #[must_use]
    pub fn entries(&self) -> Vec<ChangeEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Removes and returns every buffered entry.
    pub fn drain(&self) -> Vec<ChangeEntry> {
        self.entries.lock().drain(..).collect()
    }

    /// Buffered entries grouped by table.
    #[must_use]
    pub fn export(&self) -> Vec<TableChanges> {
        group_by_table(&self.entries())
    }
}

impl Default for ChangeBuffer {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl fmt::Debug for ChangeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
