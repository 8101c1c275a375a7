//! Catalog schema migrations.
//!
//! # Responsibility
//! - Keep the ordered list of catalog schema steps.
//! - Bring a connection from its recorded version up to [`latest_version`].
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - The recorded version lives in `PRAGMA user_version` and moves in the same
//!   transaction as the step that produced it.
//! - The upgrade runs under an `IMMEDIATE` transaction and re-reads the
//!   version there, so two processes opening a fresh file never both migrate.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};
use std::time::Instant;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "catalog",
        sql: include_str!("0001_catalog.sql"),
    },
    SchemaStep {
        version: 2,
        name: "list_posters",
        sql: include_str!("0002_list_posters.sql"),
    },
    SchemaStep {
        version: 3,
        name: "poster_records",
        sql: include_str!("0003_poster_records.sql"),
    },
];

/// Schema version this build writes and expects.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Upgrades `conn` to [`latest_version`].
///
/// Returns the number of steps applied; `0` for an up-to-date database.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let latest = latest_version();
    if ensure_supported(current_user_version(conn)?, latest)? == latest {
        return Ok(0);
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let from = ensure_supported(current_user_version(&tx)?, latest)?;
    let mut applied = 0;
    for step in SCHEMA_STEPS.iter().filter(|step| step.version > from) {
        let started_at = Instant::now();
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        applied += 1;
        info!(
            "event=db_migrate module=db status=ok version={} name={} duration_ms={}",
            step.version,
            step.name,
            started_at.elapsed().as_millis()
        );
    }
    tx.commit()?;

    Ok(applied)
}

/// Reads the schema version recorded on `conn`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn ensure_supported(recorded: u32, latest: u32) -> DbResult<u32> {
    if recorded > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: recorded,
            latest_supported: latest,
        });
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, current_user_version, latest_version, SCHEMA_STEPS};
    use rusqlite::Connection;

    #[test]
    fn step_versions_are_consecutive_from_one() {
        let versions: Vec<u32> = SCHEMA_STEPS.iter().map(|step| step.version).collect();
        let expected: Vec<u32> = (1..=SCHEMA_STEPS.len() as u32).collect();
        assert_eq!(versions, expected);
    }

    #[test]
    fn fresh_database_applies_every_step_once() {
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(apply_migrations(&mut conn).unwrap(), SCHEMA_STEPS.len());
        assert_eq!(current_user_version(&conn).unwrap(), latest_version());
        assert_eq!(apply_migrations(&mut conn).unwrap(), 0);
    }

    #[test]
    fn partially_migrated_database_only_runs_missing_steps() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_STEPS[0].sql).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        assert_eq!(
            apply_migrations(&mut conn).unwrap(),
            SCHEMA_STEPS.len() - 1
        );
        let roots: i64 = conn
            .query_row("SELECT COUNT(*) FROM lists WHERE is_root = 1;", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(roots, 1);
    }
}
