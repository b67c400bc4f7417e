//! Per-instance change tracking.
//!
//! A [`Tracker`] is a small state machine driven by explicit calls:
//!
//! ```text
//!            record_change           record_change (back to original)
//!   Actual ───────────────▶ Edit ───────────────────────────────▶ Actual
//!     ▲                      │ accept / reject
//!     └──────────────────────┘
//!
//!   any ── begin_load ──▶ Load ── end_load ──▶ Actual | Edit
//!   any ── suspend ─────▶ Suspend ── resume ──▶ previous
//! ```
//!
//! The ledger maps each changed field to its value before the first change.
//! It is non-empty only in [`RowStatus::Edit`].

use relsync_codec::Value;
use std::collections::BTreeMap;

/// Tracking status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowStatus {
    /// Created locally, never written back.
    New,
    /// Has unsaved changes.
    Edit,
    /// Values are being applied from a load.
    Load,
    /// In sync with the backend as far as known.
    Actual,
    /// Tracking is off.
    Suspend,
}

/// Original field values by field name.
pub type Ledger = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
struct Saved {
    status: RowStatus,
    ledger: Ledger,
}

/// Change-tracking state of one instance.
#[derive(Debug, Clone)]
pub struct Tracker {
    status: RowStatus,
    ledger: Ledger,
    pre_load: Option<Saved>,
    suspended: Option<Saved>,
}

impl Tracker {
    /// Tracker of a locally created instance.
    #[must_use]
    pub fn new() -> Self {
        Self::with_status(RowStatus::New)
    }

    /// Tracker of an instance known to match the backend.
    #[must_use]
    pub fn actual() -> Self {
        Self::with_status(RowStatus::Actual)
    }

    fn with_status(status: RowStatus) -> Self {
        Self {
            status,
            ledger: Ledger::new(),
            pre_load: None,
            suspended: None,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RowStatus {
        self.status
    }

    /// Status before the current load, while loading.
    #[must_use]
    pub fn pre_load_status(&self) -> Option<RowStatus> {
        self.pre_load.as_ref().map(|s| s.status)
    }

    /// Original values of changed fields.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Returns true if `field` has an unsaved change.
    #[must_use]
    pub fn is_dirty(&self, field: &str) -> bool {
        self.ledger.contains_key(field)
    }

    /// Returns true if a load in progress must not overwrite `field`: the
    /// instance was being edited and `field` is one of the edits.
    #[must_use]
    pub fn is_protected(&self, field: &str) -> bool {
        self.pre_load
            .as_ref()
            .is_some_and(|s| s.status == RowStatus::Edit && s.ledger.contains_key(field))
    }

    /// Records a mutation of `field` from `old` to `new`.
    ///
    /// Returns true if the ledger changed.
    pub fn record_change(&mut self, field: &str, old: &Value, new: &Value) -> bool {
        match self.status {
            RowStatus::Actual => {
                if old == new {
                    return false;
                }
                self.ledger.insert(field.to_string(), old.clone());
                self.status = RowStatus::Edit;
                true
            }
            RowStatus::Edit => match self.ledger.get(field) {
                Some(original) if original == new => {
                    self.ledger.remove(field);
                    if self.ledger.is_empty() {
                        self.status = RowStatus::Actual;
                    }
                    true
                }
                Some(_) => false,
                None if old == new => false,
                None => {
                    self.ledger.insert(field.to_string(), old.clone());
                    true
                }
            },
            RowStatus::New | RowStatus::Load | RowStatus::Suspend => false,
        }
    }

    /// Enters load mode.
    pub fn begin_load(&mut self) {
        if self.status == RowStatus::Load {
            return;
        }
        self.pre_load = Some(Saved {
            status: self.status,
            ledger: std::mem::take(&mut self.ledger),
        });
        self.status = RowStatus::Load;
    }

    /// Leaves load mode.
    ///
    /// An instance that was being edited returns to Edit with its ledger;
    /// a suspended one stays suspended; everything else becomes Actual.
    pub fn end_load(&mut self) {
        let Some(saved) = self.pre_load.take() else {
            return;
        };
        match saved.status {
            RowStatus::Edit if !saved.ledger.is_empty() => {
                self.ledger = saved.ledger;
                self.status = RowStatus::Edit;
            }
            RowStatus::Suspend => self.status = RowStatus::Suspend,
            _ => self.status = RowStatus::Actual,
        }
    }

    /// Marks a successful write-back.
    pub fn accept(&mut self) {
        self.ledger.clear();
        self.pre_load = None;
        self.status = RowStatus::Actual;
    }

    /// Discards unsaved changes. Returns the original values to restore.
    ///
    /// A new instance has nothing to reject and stays new.
    pub fn reject(&mut self) -> Ledger {
        let ledger = std::mem::take(&mut self.ledger);
        if self.status == RowStatus::Edit {
            self.status = RowStatus::Actual;
        }
        ledger
    }

    /// Turns tracking off until [`Tracker::resume`].
    pub fn suspend(&mut self) {
        if self.status == RowStatus::Suspend {
            return;
        }
        self.suspended = Some(Saved {
            status: self.status,
            ledger: std::mem::take(&mut self.ledger),
        });
        self.status = RowStatus::Suspend;
    }

    /// Restores the status and ledger saved by [`Tracker::suspend`].
    pub fn resume(&mut self) {
        if self.status != RowStatus::Suspend {
            return;
        }
        match self.suspended.take() {
            Some(saved) => {
                self.status = saved.status;
                self.ledger = saved.ledger;
            }
            None => self.status = RowStatus::Actual,
        }
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}
