use crate::core::{Column, DataType, DbError, Result, Row, Value};
use std::fmt;

use super::{ID_COLUMN, STATE_COLUMN};

pub type RootResolverFn = fn(&Row) -> Result<Option<String>>;

/// How a member row finds the identity of its aggregate root.
#[derive(Clone)]
pub enum RootResolver {
    /// The root id is stored in this column of the member row.
    Column(String),
    /// Resolved through a typed entity's `AggregateMember` impl.
    Typed(RootResolverFn),
}

impl fmt::Debug for RootResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootResolver::Column(column) => f.debug_tuple("Column").field(column).finish(),
            RootResolver::Typed(_) => f.write_str("Typed(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AggregateBinding {
    /// The entity is an aggregate root and owns its own activity stream.
    Root,
    /// The entity belongs to a root of `root_table`.
    Member {
        root_table: String,
        resolver: RootResolver,
    },
    /// Versioned, but never audit-worthy on its own.
    Unbound,
}

/// The live shape of one versioned entity type.
#[derive(Debug, Clone)]
pub struct LiveEntityDescriptor {
    table: String,
    columns: Vec<Column>,
    binding: AggregateBinding,
    object_type: String,
}

impl LiveEntityDescriptor {
    pub fn new(table: impl Into<String>, columns: Vec<Column>) -> Self {
        let table = table.into();
        Self {
            object_type: table.clone(),
            table,
            columns,
            binding: AggregateBinding::Unbound,
        }
    }

    pub fn as_root(mut self) -> Self {
        self.binding = AggregateBinding::Root;
        self
    }

    pub fn member_of(mut self, root_table: impl Into<String>, column: impl Into<String>) -> Self {
        self.binding = AggregateBinding::Member {
            root_table: root_table.into(),
            resolver: RootResolver::Column(column.into()),
        };
        self
    }

    pub fn member_with(mut self, root_table: impl Into<String>, resolver: RootResolverFn) -> Self {
        self.binding = AggregateBinding::Member {
            root_table: root_table.into(),
            resolver: RootResolver::Typed(resolver),
        };
        self
    }

    /// Name recorded as `object_type` in activity details. Defaults to the table name.
    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = object_type.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn binding(&self) -> &AggregateBinding {
        &self.binding
    }

    pub fn object_type_name(&self) -> &str {
        &self.object_type
    }

    pub(crate) fn validate(&self, reserved: &[&str]) -> Result<()> {
        let invalid = |msg: String| DbError::SchemaError(format!("table '{}': {}", self.table, msg));

        let keys: Vec<&Column> = self.columns.iter().filter(|c| c.primary_key).collect();
        match keys.as_slice() {
            [key] if key.name == ID_COLUMN && key.data_type == DataType::Text => {}
            _ => {
                return Err(invalid(format!(
                    "expected a single TEXT primary key column '{}'",
                    ID_COLUMN
                )));
            }
        }

        match self.columns.iter().find(|c| c.name == STATE_COLUMN) {
            Some(column) if column.data_type == DataType::Text => {}
            _ => return Err(invalid(format!("missing TEXT column '{}'", STATE_COLUMN))),
        }

        for (idx, column) in self.columns.iter().enumerate() {
            if reserved.contains(&column.name.as_str()) {
                return Err(invalid(format!(
                    "column '{}' is reserved for history rows",
                    column.name
                )));
            }
            if self.columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(invalid(format!("duplicate column '{}'", column.name)));
            }
        }

        if let AggregateBinding::Member {
            resolver: RootResolver::Column(column),
            ..
        } = &self.binding
        {
            if !self.columns.iter().any(|c| &c.name == column) {
                return Err(invalid(format!("root column '{}' does not exist", column)));
            }
        }
        Ok(())
    }

    pub(crate) fn resolve_root_id(&self, row: &Row) -> Result<Option<String>> {
        match &self.binding {
            AggregateBinding::Root => {
                let idx = self.column_index(ID_COLUMN)?;
                Ok(row.get(idx).and_then(Value::as_str).map(str::to_string))
            }
            AggregateBinding::Member {
                resolver: RootResolver::Column(column),
                ..
            } => {
                let idx = self.column_index(column)?;
                match row.get(idx) {
                    Some(Value::Null) | None => Ok(None),
                    Some(Value::Text(id)) => Ok(Some(id.clone())),
                    Some(other) => Err(DbError::TypeMismatch(format!(
                        "root reference '{}' in '{}' must be TEXT, got {}",
                        column,
                        self.table,
                        other.type_name()
                    ))),
                }
            }
            AggregateBinding::Member {
                resolver: RootResolver::Typed(resolve),
                ..
            } => resolve(row),
            AggregateBinding::Unbound => Ok(None),
        }
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DbError::ColumnNotFound(name.to_string(), self.table.clone()))
    }
}
