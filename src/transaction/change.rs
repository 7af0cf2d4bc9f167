// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Writes are buffered per object (last value wins) and turned into reversible
// row changes only at commit.
//
// ============================================================================

use crate::core::{Row, RowKey, Value};
use crate::lifecycle::State;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single reversible row operation applied at commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertRow {
        table: String,
        row: Row,
    },

    /// `old_row` is what the writer last saw; a different stored row is a conflict.
    UpdateRow {
        table: String,
        key: RowKey,
        old_row: Row,
        new_row: Row,
    },

    /// Physical removal. Only the maintenance API produces these.
    DeleteRow {
        table: String,
        key: RowKey,
        old_row: Row,
    },
}

impl Change {
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::UpdateRow { table, .. } => table,
            Change::DeleteRow { table, .. } => table,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Change::InsertRow { .. })
    }
}

/// Identity of one live object: its table and text primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub table: String,
    pub id: String,
}

impl ObjectRef {
    pub fn new(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Primary key of the live row.
    pub fn key(&self) -> RowKey {
        vec![Value::Text(self.id.clone())]
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.id)
    }
}

/// Latest buffered value of an object plus the committed row it replaces.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRow {
    pub row: Row,
    /// `None` when the object did not exist before this transaction.
    pub original: Option<Row>,
}

impl PendingRow {
    pub fn is_insert(&self) -> bool {
        self.original.is_none()
    }

    /// True when the write leaves every value and its type as it was.
    ///
    /// `Value` equality treats `Integer(2)` and `Float(2.0)` as equal; a write
    /// that only changes the type must still reach the live row and history.
    pub fn is_noop(&self) -> bool {
        let Some(original) = &self.original else {
            return false;
        };
        original.len() == self.row.len()
            && original
                .iter()
                .zip(&self.row)
                .all(|(old, new)| old.type_name() == new.type_name() && old == new)
    }
}

/// Per-transaction buffer of live writes, in first-touch order.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    order: Vec<ObjectRef>,
    rows: HashMap<ObjectRef, PendingRow>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, object: &ObjectRef) -> Option<&PendingRow> {
        self.rows.get(object)
    }

    /// Buffers `row` for `object`. The first staging decides `original`; later
    /// stagings only replace the row.
    pub fn stage(&mut self, object: ObjectRef, row: Row, original: Option<Row>) {
        match self.rows.get_mut(&object) {
            Some(pending) => pending.row = row,
            None => {
                self.order.push(object.clone());
                self.rows.insert(object, PendingRow { row, original });
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectRef, &PendingRow)> {
        self.order
            .iter()
            .filter_map(|object| self.rows.get(object).map(|pending| (object, pending)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.rows.clear();
    }

    /// Row changes that bring storage to the buffered state. No-op writes are dropped.
    pub fn to_changes(&self) -> Vec<Change> {
        self.iter()
            .filter(|(_, pending)| !pending.is_noop())
            .map(|(object, pending)| match &pending.original {
                None => Change::InsertRow {
                    table: object.table.clone(),
                    row: pending.row.clone(),
                },
                Some(original) => Change::UpdateRow {
                    table: object.table.clone(),
                    key: object.key(),
                    old_row: original.clone(),
                    new_row: pending.row.clone(),
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    New,
    Changed,
    Deleted,
}

impl ChangeCategory {
    /// Fixed processing order for commit hooks.
    pub const ORDER: [ChangeCategory; 3] = [
        ChangeCategory::New,
        ChangeCategory::Changed,
        ChangeCategory::Deleted,
    ];
}

/// The unit of work of one transaction, split into three ordered collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    new: Vec<ObjectRef>,
    changed: Vec<ObjectRef>,
    deleted: Vec<ObjectRef>,
}

impl ChangeSet {
    /// Classifies buffered writes.
    ///
    /// `state_index` gives the `state` column of a table, if it has one. An
    /// existing row whose state moves to `deleted` lands in `deleted`; any other
    /// effective update lands in `changed`.
    pub fn classify<F>(writes: &WriteSet, state_index: F) -> Self
    where
        F: Fn(&str) -> Option<usize>,
    {
        let mut set = Self::default();
        for (object, pending) in writes.iter() {
            let Some(original) = &pending.original else {
                set.new.push(object.clone());
                continue;
            };
            if pending.is_noop() {
                continue;
            }
            let soft_deleted = state_index(&object.table)
                .map(|idx| {
                    let deleted = |row: &Row| {
                        row.get(idx).and_then(Value::as_str) == Some(State::Deleted.as_str())
                    };
                    !deleted(original) && deleted(&pending.row)
                })
                .unwrap_or(false);
            if soft_deleted {
                set.deleted.push(object.clone());
            } else {
                set.changed.push(object.clone());
            }
        }
        set
    }

    pub fn new_objects(&self) -> &[ObjectRef] {
        &self.new
    }

    pub fn changed_objects(&self) -> &[ObjectRef] {
        &self.changed
    }

    pub fn deleted_objects(&self) -> &[ObjectRef] {
        &self.deleted
    }

    pub fn category(&self, category: ChangeCategory) -> &[ObjectRef] {
        match category {
            ChangeCategory::New => &self.new,
            ChangeCategory::Changed => &self.changed,
            ChangeCategory::Deleted => &self.deleted,
        }
    }

    pub fn category_of(&self, object: &ObjectRef) -> Option<ChangeCategory> {
        ChangeCategory::ORDER
            .into_iter()
            .find(|category| self.category(*category).contains(object))
    }

    /// Every object in new, changed, deleted order.
    pub fn iter(&self) -> impl Iterator<Item = (ChangeCategory, &ObjectRef)> {
        ChangeCategory::ORDER.into_iter().flat_map(move |category| {
            self.category(category)
                .iter()
                .map(move |object| (category, object))
        })
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.changed.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
