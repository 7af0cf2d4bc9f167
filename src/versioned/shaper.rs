use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::descriptor::{AggregateBinding, LiveEntityDescriptor};
use super::entity::{AggregateMember, AggregateRoot, Versioned, resolve_member_root};
use super::{
    CONTINUITY_ID_COLUMN, CURRENT_COLUMN, DEFAULT_HISTORY_SUFFIX, EXPIRED_ID_COLUMN,
    EXPIRED_TIMESTAMP_COLUMN, HISTORY_COLUMNS, ID_COLUMN, REVISION_ID_COLUMN,
    REVISION_TIMESTAMP_COLUMN, STATE_COLUMN, expiry_sentinel,
};
use crate::activity::{ACTIVITY_DETAIL_TABLE, ACTIVITY_TABLE, ActivityDetail, Activity};
use crate::core::{Column, DataType, DbError, Result, Row, Value};
use crate::revision::{REVISION_TABLE, Revision};
use crate::storage::{InMemoryStorage, TableRole, TableSchema};

/// History rows point back at their live row by identity only.
///
/// Unlike a foreign key it never blocks the live row from changing state, and
/// it stays resolvable while the live row sits in `Deleted` forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuityRelation {
    pub history_table: String,
    pub history_column: String,
    pub live_table: String,
    pub live_column: String,
}

/// A live table paired with its history ("shadow") table.
#[derive(Debug, Clone)]
pub struct VersionedTable {
    descriptor: LiveEntityDescriptor,
    live: TableSchema,
    history: TableSchema,
    continuity: ContinuityRelation,
    id_index: usize,
    state_index: usize,
}

impl VersionedTable {
    fn shape(descriptor: LiveEntityDescriptor, suffix: &str) -> Result<Self> {
        descriptor.validate(&HISTORY_COLUMNS)?;

        let live = TableSchema::new(descriptor.table(), descriptor.columns().to_vec());
        let history_name = format!("{}{}", descriptor.table(), suffix);

        let mut history_columns: Vec<Column> = descriptor
            .columns()
            .iter()
            .map(|column| Column {
                primary_key: column.name == ID_COLUMN,
                unique: false,
                ..column.clone()
            })
            .collect();
        history_columns.extend([
            Column::new(REVISION_ID_COLUMN, DataType::Uuid).primary_key(),
            Column::new(CONTINUITY_ID_COLUMN, DataType::Text).not_null(),
            Column::new(EXPIRED_ID_COLUMN, DataType::Uuid),
            Column::new(EXPIRED_TIMESTAMP_COLUMN, DataType::Timestamp).not_null(),
            Column::new(REVISION_TIMESTAMP_COLUMN, DataType::Timestamp).not_null(),
            Column::new(CURRENT_COLUMN, DataType::Boolean).not_null(),
        ]);
        let history = TableSchema::new(history_name.clone(), history_columns)
            .with_index(CONTINUITY_ID_COLUMN)
            .with_index(REVISION_ID_COLUMN);

        let id_index = live.schema().find_column_index(ID_COLUMN).ok_or_else(|| {
            DbError::ColumnNotFound(ID_COLUMN.to_string(), descriptor.table().to_string())
        })?;
        let state_index = live.schema().find_column_index(STATE_COLUMN).ok_or_else(|| {
            DbError::ColumnNotFound(STATE_COLUMN.to_string(), descriptor.table().to_string())
        })?;

        Ok(Self {
            continuity: ContinuityRelation {
                history_table: history_name,
                history_column: CONTINUITY_ID_COLUMN.to_string(),
                live_table: descriptor.table().to_string(),
                live_column: ID_COLUMN.to_string(),
            },
            descriptor,
            live,
            history,
            id_index,
            state_index,
        })
    }

    pub fn name(&self) -> &str {
        self.live.name()
    }

    pub fn history_name(&self) -> &str {
        self.history.name()
    }

    pub fn descriptor(&self) -> &LiveEntityDescriptor {
        &self.descriptor
    }

    pub fn live_schema(&self) -> &TableSchema {
        &self.live
    }

    pub fn history_schema(&self) -> &TableSchema {
        &self.history
    }

    pub fn continuity(&self) -> &ContinuityRelation {
        &self.continuity
    }

    pub fn binding(&self) -> &AggregateBinding {
        self.descriptor.binding()
    }

    pub fn is_root(&self) -> bool {
        matches!(self.binding(), AggregateBinding::Root)
    }

    pub fn object_type(&self) -> &str {
        self.descriptor.object_type_name()
    }

    pub fn live_column_count(&self) -> usize {
        self.live.schema().column_count()
    }

    pub fn state_index(&self) -> usize {
        self.state_index
    }

    pub fn id_of(&self, live_row: &Row) -> Result<String> {
        live_row
            .get(self.id_index)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                DbError::Serialization(format!("'{}' row has no text identity", self.name()))
            })
    }

    /// `(root table, root id)` owning this row, if it has one.
    pub fn root_of(&self, live_row: &Row) -> Result<Option<(String, String)>> {
        let root_table = match self.binding() {
            AggregateBinding::Root => self.name().to_string(),
            AggregateBinding::Member { root_table, .. } => root_table.clone(),
            AggregateBinding::Unbound => return Ok(None),
        };
        Ok(self
            .descriptor
            .resolve_root_id(live_row)?
            .map(|root_id| (root_table, root_id)))
    }

    /// Snapshot of `live_row` stamped with `revision`, not yet expired.
    pub fn history_row(&self, live_row: &Row, revision: &Revision) -> Result<Row> {
        self.live.schema().validate_row(live_row)?;
        let continuity_id = self.id_of(live_row)?;

        let mut row = Vec::with_capacity(live_row.len() + HISTORY_COLUMNS.len());
        row.extend(live_row.iter().cloned());
        row.push(revision.id().into());
        row.push(continuity_id.into());
        row.push(Value::Null);
        row.push(expiry_sentinel().into());
        row.push(revision.timestamp().into());
        row.push(true.into());
        Ok(row)
    }

    /// Whether nothing has superseded this history row yet.
    pub fn is_unexpired(&self, history_row: &Row) -> bool {
        history_row.get(self.live_column_count() + 3) == Some(&Value::from(expiry_sentinel()))
    }

    /// Copy of a history row marked as superseded by `revision`.
    pub fn expire_history_row(&self, history_row: &Row, revision_id: uuid::Uuid, at: DateTime<Utc>) -> Row {
        let base = self.live_column_count();
        let mut expired = history_row.clone();
        expired[base + 2] = revision_id.into();
        expired[base + 3] = at.into();
        expired[base + 5] = false.into();
        expired
    }
}

/// Every versioned and plain table of one database, composed once at startup.
#[derive(Debug, Clone)]
pub struct VersionedSchema {
    tables: Vec<VersionedTable>,
    by_name: HashMap<String, usize>,
    plain: Vec<TableSchema>,
    history_suffix: String,
}

impl VersionedSchema {
    pub fn builder() -> VersionedSchemaBuilder {
        VersionedSchemaBuilder::default()
    }

    pub fn tables(&self) -> &[VersionedTable] {
        &self.tables
    }

    pub fn versioned(&self, table: &str) -> Option<&VersionedTable> {
        self.by_name.get(table).map(|idx| &self.tables[*idx])
    }

    pub fn is_versioned(&self, table: &str) -> bool {
        self.by_name.contains_key(table)
    }

    pub fn plain_tables(&self) -> &[TableSchema] {
        &self.plain
    }

    pub fn history_suffix(&self) -> &str {
        &self.history_suffix
    }

    pub fn system_tables() -> Vec<TableSchema> {
        vec![
            Revision::table_schema(),
            Activity::table_schema(),
            ActivityDetail::table_schema(),
        ]
    }

    /// Creates every table of the schema in `storage`.
    pub fn install(&self, storage: &mut InMemoryStorage) -> Result<()> {
        for schema in Self::system_tables() {
            storage.create_table(schema, TableRole::System)?;
        }
        for table in &self.tables {
            storage.create_table(table.live.clone(), TableRole::Live)?;
            storage.create_table(table.history.clone(), TableRole::History)?;
        }
        for schema in &self.plain {
            storage.create_table(schema.clone(), TableRole::Live)?;
        }
        Ok(())
    }
}

pub struct VersionedSchemaBuilder {
    descriptors: Vec<LiveEntityDescriptor>,
    plain: Vec<TableSchema>,
    history_suffix: String,
}

impl Default for VersionedSchemaBuilder {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
            plain: Vec::new(),
            history_suffix: DEFAULT_HISTORY_SUFFIX.to_string(),
        }
    }
}

impl VersionedSchemaBuilder {
    pub fn history_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.history_suffix = suffix.into();
        self
    }

    pub fn root<T: AggregateRoot>(mut self) -> Self {
        self.descriptors
            .push(T::descriptor().as_root().object_type(T::object_type()));
        self
    }

    pub fn member<T: AggregateMember>(mut self) -> Self {
        self.descriptors.push(
            T::descriptor()
                .member_with(T::Root::TABLE, resolve_member_root::<T>)
                .object_type(<T as AggregateMember>::object_type()),
        );
        self
    }

    pub fn entity<T: Versioned>(mut self) -> Self {
        self.descriptors.push(T::descriptor());
        self
    }

    pub fn descriptor(mut self, descriptor: LiveEntityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// An unversioned table: written by transactions, never shadowed or audited.
    pub fn plain_table(mut self, schema: TableSchema) -> Self {
        self.plain.push(schema);
        self
    }

    pub fn build(self) -> Result<VersionedSchema> {
        if self.history_suffix.is_empty() {
            return Err(DbError::SchemaError("history suffix cannot be empty".into()));
        }

        let mut taken: Vec<String> = vec![
            REVISION_TABLE.to_string(),
            ACTIVITY_TABLE.to_string(),
            ACTIVITY_DETAIL_TABLE.to_string(),
        ];
        let mut claim = |name: &str| -> Result<()> {
            if taken.iter().any(|t| t == name) {
                return Err(DbError::TableExists(name.to_string()));
            }
            taken.push(name.to_string());
            Ok(())
        };

        let mut tables = Vec::with_capacity(self.descriptors.len());
        let mut by_name = HashMap::new();
        for descriptor in self.descriptors {
            let table = VersionedTable::shape(descriptor, &self.history_suffix)?;
            claim(table.name())?;
            claim(table.history_name())?;
            by_name.insert(table.name().to_string(), tables.len());
            tables.push(table);
        }

        for schema in &self.plain {
            claim(schema.name())?;
            let keys = schema.schema().primary_key_indices();
            let single_text_key = keys.len() == 1
                && schema.schema().columns()[keys[0]].data_type == DataType::Text;
            if !single_text_key {
                return Err(DbError::SchemaError(format!(
                    "plain table '{}' needs a single TEXT primary key",
                    schema.name()
                )));
            }
        }

        for table in &tables {
            if let AggregateBinding::Member { root_table, .. } = table.binding() {
                let root_ok = by_name
                    .get(root_table)
                    .map(|idx| tables[*idx].is_root())
                    .unwrap_or(false);
                if !root_ok {
                    return Err(DbError::SchemaError(format!(
                        "'{}' is a member of '{}', which is not a registered aggregate root",
                        table.name(),
                        root_table
                    )));
                }
            }
        }

        Ok(VersionedSchema {
            tables,
            by_name,
            plain: self.plain,
            history_suffix: self.history_suffix,
        })
    }
}
