//! SQLite-backed [`EntityRepository`]: one table, its encrypted columns.
//!
//! Rows are paged by `rowid`, so a run needs constant memory however large the
//! table is, and each batch is committed in its own transaction.

use std::sync::Arc;

use fieldcrypt::{Accessor, Declaration, Encryptable, EngineError, EntityRepository, FieldSpec, FieldValue};
use rusqlite::{params, params_from_iter, types::Value, Connection};

use crate::settings::TableSpec;

/// Table name and encrypted columns, shared by every row read from it.
#[derive(Debug)]
pub struct TableSchema {
    name: String,
    columns: Vec<String>,
}

/// One row: its `rowid` and the values of the encrypted columns.
#[derive(Debug, Clone)]
pub struct StoredRow {
    schema: Arc<TableSchema>,
    rowid: i64,
    values: Vec<Value>,
}

impl StoredRow {
    /// Value of the `index`-th encrypted column.
    #[cfg(test)]
    fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

struct ColumnAccessor {
    index: usize,
}

impl Accessor<StoredRow> for ColumnAccessor {
    fn read<'a>(&self, row: &'a StoredRow) -> FieldValue<'a> {
        match row.values.get(self.index) {
            Some(Value::Text(text)) => FieldValue::Text(text),
            Some(Value::Null) | None => FieldValue::Null,
            Some(_) => FieldValue::Other,
        }
    }

    fn write(&self, row: &mut StoredRow, value: String) {
        if let Some(slot) = row.values.get_mut(self.index) {
            *slot = Value::Text(value);
        }
    }
}

impl Encryptable for StoredRow {
    fn entity_type(&self) -> &str {
        &self.schema.name
    }

    fn declare(&self, decl: &mut Declaration<Self>) {
        for (index, column) in self.schema.columns.iter().enumerate() {
            decl.encrypted(FieldSpec::accessor(column.as_str(), Arc::new(ColumnAccessor { index })));
        }
    }
}

/// Encrypted columns of one SQLite table.
pub struct SqliteRepository<'c> {
    conn: &'c Connection,
    schema: Arc<TableSchema>,
    select: String,
    update: String,
}

impl<'c> SqliteRepository<'c> {
    /// Bind `spec` to `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if the table or one of its
    /// columns does not exist.
    pub fn open(conn: &'c Connection, spec: TableSpec) -> Result<Self, EngineError> {
        let columns = spec.columns.join(", ");
        let assignments = spec
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");

        let select = format!(
            "SELECT rowid, {columns} FROM {table} WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
            table = spec.name
        );
        let update = format!(
            "UPDATE {table} SET {assignments} WHERE rowid = ?{n}",
            table = spec.name,
            n = spec.columns.len() + 1
        );

        conn.prepare(&select).map_err(|e| {
            EngineError::configuration(format!("cannot read table {}: {e}", spec.name))
        })?;

        Ok(Self {
            conn,
            schema: Arc::new(TableSchema {
                name: spec.name,
                columns: spec.columns,
            }),
            select,
            update,
        })
    }
}

impl EntityRepository for SqliteRepository<'_> {
    type Record = StoredRow;
    type Key = i64;

    fn blank(&self) -> StoredRow {
        StoredRow {
            schema: Arc::clone(&self.schema),
            rowid: 0,
            values: vec![Value::Null; self.schema.columns.len()],
        }
    }

    fn count(&mut self) -> Result<u64, EngineError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.schema.name);
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(store_error)?;
        Ok(count.max(0) as u64)
    }

    fn key_of(&self, row: &StoredRow) -> i64 {
        row.rowid
    }

    fn fetch_after(&mut self, after: Option<&i64>, limit: usize) -> Result<Vec<StoredRow>, EngineError> {
        let width = self.schema.columns.len();
        let mut stmt = self.conn.prepare_cached(&self.select).map_err(store_error)?;
        let rows = stmt
            .query_map(params![after.copied().unwrap_or(i64::MIN), limit as i64], |row| {
                let rowid: i64 = row.get(0)?;
                let values = (1..=width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(StoredRow {
                    schema: Arc::clone(&self.schema),
                    rowid,
                    values,
                })
            })
            .map_err(store_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_error)
    }

    fn write_batch(&mut self, rows: &[StoredRow]) -> Result<(), EngineError> {
        let tx = self.conn.unchecked_transaction().map_err(store_error)?;
        {
            let mut stmt = tx.prepare_cached(&self.update).map_err(store_error)?;
            for row in rows {
                let rowid = Value::Integer(row.rowid);
                stmt.execute(params_from_iter(row.values.iter().chain(std::iter::once(&rowid))))
                    .map_err(store_error)?;
            }
        }
        tx.commit().map_err(store_error)
    }
}

fn store_error(e: rusqlite::Error) -> EngineError {
    EngineError::Store(e.to_string())
}
