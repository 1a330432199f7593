// crates/fssync-core/src/runtime/statements.rs
// ============================================================================
// Module: Statement Builder
// Description: Deterministic SQL text for one entity layout.
// Purpose: Generate DDL, insert, update, and select statements per dialect and cache them.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Statements are derived from an [`EntityLayout`], whose attribute columns are
//! already lower-cased and sorted, so the same schema always yields
//! byte-identical text regardless of the order fields arrived in. The
//! coordinate columns are appended after the attribute columns and are never
//! part of the sorted set.
//!
//! Placeholder order is part of the contract with the stores:
//!
//! | Statement | Parameters |
//! |-----------|------------|
//! | `insert_current` | columns, `geometry_x`, `geometry_y`, `updated` |
//! | `insert_history` | columns, `geometry_x`, `geometry_y`, `created`, `version` |
//! | `update_current` | non-identity columns, `geometry_x`, `geometry_y`, `updated`, identity |
//! | `select_snapshot` | id list (JSON array text on SQLite, `BIGINT[]` on Postgres) |
//! | `select_max_version` | identity |

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::core::CREATED_COLUMN;
use crate::core::ColumnSpec;
use crate::core::EntityLayout;
use crate::core::FieldKind;
use crate::core::GEOMETRY_X_COLUMN;
use crate::core::GEOMETRY_Y_COLUMN;
use crate::core::UPDATED_COLUMN;
use crate::core::VERSION_COLUMN;

// ============================================================================
// SECTION: Dialects
// ============================================================================

/// SQL dialect of the destination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite: `?N` placeholders, `json_each` id filters.
    Sqlite,
    /// PostgreSQL: `$N` placeholders, `= ANY($1)` id filters, text projection.
    Postgres,
}

impl Dialect {
    /// Returns the placeholder for a 1-based parameter index.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Postgres => format!("${index}"),
        }
    }

    /// Returns the column type for a field kind.
    #[must_use]
    pub const fn column_type(self, kind: FieldKind) -> &'static str {
        match (self, kind) {
            (Self::Sqlite, FieldKind::Integer) => "INTEGER",
            (Self::Sqlite, FieldKind::Float) => "REAL",
            (Self::Postgres, FieldKind::Integer) => "BIGINT",
            (Self::Postgres, FieldKind::Float) => "DOUBLE PRECISION",
            (_, FieldKind::Text) => "TEXT",
        }
    }

    /// Returns the projection of a column rendered for snapshot reads.
    fn text_projection(self, column: &str) -> String {
        match self {
            Self::Sqlite => column.to_string(),
            Self::Postgres => format!("{column}::text AS {column}"),
        }
    }
}

// ============================================================================
// SECTION: Statement Sets
// ============================================================================

/// All statements the stores need for one entity layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementSet {
    /// Creates the current-state table.
    pub create_current: String,
    /// Creates the history table with its `(identity, version)` uniqueness.
    pub create_history: String,
    /// Inserts a current-state row.
    pub insert_current: String,
    /// Inserts a history row.
    pub insert_history: String,
    /// Overwrites a current-state row by identity.
    pub update_current: String,
    /// Bulk-selects current rows for an id list.
    pub select_snapshot: String,
    /// Selects the highest history version for one identity.
    pub select_max_version: String,
    /// Selects every current row ordered by identity.
    pub select_current_all: String,
    /// Selects every history row ordered by identity and version.
    pub select_history_all: String,
}

impl StatementSet {
    /// Builds every statement for a layout.
    #[must_use]
    pub fn build(layout: &EntityLayout, dialect: Dialect) -> Self {
        Self {
            create_current: create_current_table(layout, dialect),
            create_history: create_history_table(layout, dialect),
            insert_current: insert_current(layout, dialect),
            insert_history: insert_history(layout, dialect),
            update_current: update_current(layout, dialect),
            select_snapshot: select_snapshot(layout, dialect),
            select_max_version: select_max_version(layout, dialect),
            select_current_all: select_current_all(layout, dialect),
            select_history_all: select_history_all(layout, dialect),
        }
    }
}

// ============================================================================
// SECTION: Statement Cache
// ============================================================================

/// Built statement sets keyed by current table name.
///
/// An entry is reused while the layout it was built from is unchanged and
/// rebuilt once the layout gains columns.
#[derive(Debug)]
pub struct StatementCache {
    /// Dialect every cached set is built for.
    dialect: Dialect,
    /// Layout and statements per current table.
    entries: Mutex<BTreeMap<String, (EntityLayout, Arc<StatementSet>)>>,
}

impl StatementCache {
    /// Creates an empty cache for a dialect.
    #[must_use]
    pub const fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the statements for a layout, building them on first use.
    #[must_use]
    pub fn statements(&self, layout: &EntityLayout) -> Arc<StatementSet> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, statements)) =
            entries.get(&layout.current_table).filter(|(cached, _)| cached == layout)
        {
            return Arc::clone(statements);
        }
        let statements = Arc::new(StatementSet::build(layout, self.dialect));
        entries.insert(layout.current_table.clone(), (layout.clone(), Arc::clone(&statements)));
        drop(entries);
        statements
    }
}

// ============================================================================
// SECTION: DDL
// ============================================================================

/// Builds `CREATE TABLE IF NOT EXISTS` for the current-state table.
#[must_use]
pub fn create_current_table(layout: &EntityLayout, dialect: Dialect) -> String {
    let mut definitions: Vec<String> = layout
        .columns
        .iter()
        .map(|column| {
            let mut definition = column_definition(column, dialect);
            if column.name == layout.identity_column {
                definition.push_str(" PRIMARY KEY");
            }
            definition
        })
        .collect();
    definitions.extend(geometry_definitions(dialect));
    definitions.push(format!(
        "{UPDATED_COLUMN} {} NOT NULL",
        dialect.column_type(FieldKind::Integer)
    ));
    format!("CREATE TABLE IF NOT EXISTS {} ({})", layout.current_table, definitions.join(", "))
}

/// Builds `CREATE TABLE IF NOT EXISTS` for the history table.
#[must_use]
pub fn create_history_table(layout: &EntityLayout, dialect: Dialect) -> String {
    let integer = dialect.column_type(FieldKind::Integer);
    let mut definitions: Vec<String> = layout
        .columns
        .iter()
        .map(|column| {
            let mut definition = column_definition(column, dialect);
            if column.name == layout.identity_column {
                definition.push_str(" NOT NULL");
            }
            definition
        })
        .collect();
    definitions.extend(geometry_definitions(dialect));
    definitions.push(format!("{CREATED_COLUMN} {integer} NOT NULL"));
    definitions.push(format!("{VERSION_COLUMN} {integer} NOT NULL CHECK ({VERSION_COLUMN} >= 1)"));
    definitions.push(format!("UNIQUE ({}, {VERSION_COLUMN})", layout.identity_column));
    format!("CREATE TABLE IF NOT EXISTS {} ({})", layout.history_table, definitions.join(", "))
}

/// Builds `ALTER TABLE ... ADD COLUMN` for a column new to an existing table.
#[must_use]
pub fn add_column(table: &str, column: &ColumnSpec, dialect: Dialect) -> String {
    format!("ALTER TABLE {table} ADD COLUMN {}", column_definition(column, dialect))
}

/// Renders `name TYPE` for an attribute column.
fn column_definition(column: &ColumnSpec, dialect: Dialect) -> String {
    format!("{} {}", column.name, dialect.column_type(column.kind))
}

/// Renders the two coordinate column definitions.
fn geometry_definitions(dialect: Dialect) -> [String; 2] {
    let real = dialect.column_type(FieldKind::Float);
    [format!("{GEOMETRY_X_COLUMN} {real}"), format!("{GEOMETRY_Y_COLUMN} {real}")]
}

// ============================================================================
// SECTION: Writes
// ============================================================================

/// Builds the current-state insert statement.
#[must_use]
pub fn insert_current(layout: &EntityLayout, dialect: Dialect) -> String {
    let mut columns = column_names(layout.columns.iter());
    columns.extend([GEOMETRY_X_COLUMN, GEOMETRY_Y_COLUMN, UPDATED_COLUMN].map(String::from));
    insert_statement(&layout.current_table, &columns, dialect)
}

/// Builds the history insert statement.
#[must_use]
pub fn insert_history(layout: &EntityLayout, dialect: Dialect) -> String {
    let mut columns = column_names(layout.columns.iter());
    columns.extend(
        [GEOMETRY_X_COLUMN, GEOMETRY_Y_COLUMN, CREATED_COLUMN, VERSION_COLUMN].map(String::from),
    );
    insert_statement(&layout.history_table, &columns, dialect)
}

/// Builds the current-state update statement keyed by identity.
#[must_use]
pub fn update_current(layout: &EntityLayout, dialect: Dialect) -> String {
    let mut columns = column_names(layout.non_identity_columns());
    columns.extend([GEOMETRY_X_COLUMN, GEOMETRY_Y_COLUMN, UPDATED_COLUMN].map(String::from));
    let mut sql = format!("UPDATE {} SET ", layout.current_table);
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            sql.push_str(", ");
        }
        let _ = write!(sql, "{column} = {}", dialect.placeholder(index + 1));
    }
    let _ = write!(
        sql,
        " WHERE {} = {}",
        layout.identity_column,
        dialect.placeholder(columns.len() + 1)
    );
    sql
}

/// Renders `INSERT INTO table (cols) VALUES (placeholders)`.
fn insert_statement(table: &str, columns: &[String], dialect: Dialect) -> String {
    let placeholders: Vec<String> =
        (1..=columns.len()).map(|index| dialect.placeholder(index)).collect();
    format!("INSERT INTO {table} ({}) VALUES ({})", columns.join(", "), placeholders.join(", "))
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Builds the bulk snapshot select filtered by an id list.
#[must_use]
pub fn select_snapshot(layout: &EntityLayout, dialect: Dialect) -> String {
    let projection = text_projection(layout, dialect);
    let filter = match dialect {
        Dialect::Sqlite => {
            format!("{} IN (SELECT value FROM json_each(?1))", layout.identity_column)
        }
        Dialect::Postgres => format!("{} = ANY($1)", layout.identity_column),
    };
    format!("SELECT {projection} FROM {} WHERE {filter}", layout.current_table)
}

/// Builds the max-version select for one identity.
#[must_use]
pub fn select_max_version(layout: &EntityLayout, dialect: Dialect) -> String {
    format!(
        "SELECT MAX({VERSION_COLUMN}) FROM {} WHERE {} = {}",
        layout.history_table,
        layout.identity_column,
        dialect.placeholder(1)
    )
}

/// Builds the full current-state read used by audits.
#[must_use]
pub fn select_current_all(layout: &EntityLayout, dialect: Dialect) -> String {
    format!(
        "SELECT {}, {UPDATED_COLUMN} FROM {} ORDER BY {}",
        text_projection(layout, dialect),
        layout.current_table,
        layout.identity_column
    )
}

/// Builds the full history read used by audits.
#[must_use]
pub fn select_history_all(layout: &EntityLayout, dialect: Dialect) -> String {
    format!(
        "SELECT {}, {CREATED_COLUMN}, {VERSION_COLUMN} FROM {} ORDER BY {}, {VERSION_COLUMN}",
        text_projection(layout, dialect),
        layout.history_table,
        layout.identity_column
    )
}

/// Renders the attribute and coordinate projection for text reads.
fn text_projection(layout: &EntityLayout, dialect: Dialect) -> String {
    projection_columns(layout)
        .iter()
        .map(|column| dialect.text_projection(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects column names in order.
fn column_names<'a>(columns: impl Iterator<Item = &'a ColumnSpec>) -> Vec<String> {
    columns.map(|column| column.name.clone()).collect()
}

/// Returns the names of the text-projected columns in projection order.
#[must_use]
pub fn projection_columns(layout: &EntityLayout) -> Vec<String> {
    let mut columns = column_names(layout.columns.iter());
    columns.extend([GEOMETRY_X_COLUMN, GEOMETRY_Y_COLUMN].map(String::from));
    columns
}
