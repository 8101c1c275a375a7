//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Rows are decoded through typed per-entity mappers ([`FromRow`]).
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

use crate::db::migrations::latest_version;
use rusqlite::{Connection, Params, Row};

pub mod catalog_repo;
pub mod membership_repo;

/// Typed row mapper implemented once per persisted entity.
pub(crate) trait FromRow: Sized {
    /// Column list matching what [`FromRow::from_row`] reads, in order.
    const COLUMNS: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// First schema requirement a connection fails to meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchemaGap {
    Version { expected: u32, actual: u32 },
    Table(&'static str),
    Column {
        table: &'static str,
        column: &'static str,
    },
}

/// Checks schema version and the presence of `required` tables/columns.
pub(crate) fn find_schema_gap(
    conn: &Connection,
    required: &[(&'static str, &[&'static str])],
) -> rusqlite::Result<Option<SchemaGap>> {
    let expected = latest_version();
    let actual: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual != expected {
        return Ok(Some(SchemaGap::Version { expected, actual }));
    }

    for &(table, columns) in required {
        if !table_exists(conn, table)? {
            return Ok(Some(SchemaGap::Table(table)));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Ok(Some(SchemaGap::Column { table, column }));
            }
        }
    }
    Ok(None)
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Runs `sql` and maps every returned row with `T`'s mapper.
pub(crate) fn query_all<T: FromRow, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(T::from_row(row)?);
    }
    Ok(items)
}
