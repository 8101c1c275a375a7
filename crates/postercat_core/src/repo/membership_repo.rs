//! List-membership store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist `(list_id, poster_id, position)` rows, one statement per call.
//! - Expose a transaction handle so the membership engine can group several
//!   statements into one atomic unit.
//!
//! # Invariants
//! - The store never enforces position contiguity; callers supply positions.
//! - Listing is ordered by `position ASC`.
//! - An empty list is reported by `list_members` as `NotFound`.
//! - Transactions are `IMMEDIATE`: concurrent writers serialize at `begin`.

use crate::db::DbError;
use crate::model::catalog::{ListId, ListMembership, Position, PosterId};
use crate::repo::{find_schema_gap, query_all, FromRow, SchemaGap};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const MEMBERSHIP_COLUMNS: &[&str] = &["id", "list_id", "poster_id", "position"];

pub type MembershipRepoResult<T> = Result<T, MembershipRepoError>;

/// Errors from membership store operations.
///
/// Every variant names the store operation that produced it.
#[derive(Debug)]
pub enum MembershipRepoError {
    /// Underlying SQLite failure.
    Db { op: &'static str, source: DbError },
    /// The operation matched no membership row (or the list has none).
    NotFound { op: &'static str },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl MembershipRepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Display for MembershipRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db { op, source } => write!(f, "executing membership `{op}`: {source}"),
            Self::NotFound { op } => {
                write!(f, "executing membership `{op}`: membership not found")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "membership store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "membership store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "membership store requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for MembershipRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SchemaGap> for MembershipRepoError {
    fn from(value: SchemaGap) -> Self {
        match value {
            SchemaGap::Version { expected, actual } => Self::UninitializedConnection {
                expected_version: expected,
                actual_version: actual,
            },
            SchemaGap::Table(table) => Self::MissingRequiredTable(table),
            SchemaGap::Column { table, column } => Self::MissingRequiredColumn { table, column },
        }
    }
}

fn db_err(op: &'static str) -> impl FnOnce(rusqlite::Error) -> MembershipRepoError {
    move |err| MembershipRepoError::Db {
        op,
        source: DbError::Sqlite(err),
    }
}

/// Single-statement persistence operations over list memberships.
pub trait MembershipStore {
    /// Lists members of one list ordered by position.
    fn list_members(&self, list_id: ListId) -> MembershipRepoResult<Vec<ListMembership>>;
    /// Inserts one membership row at the caller-supplied position.
    fn append(
        &self,
        list_id: ListId,
        poster_id: PosterId,
        position: Position,
    ) -> MembershipRepoResult<()>;
    /// Deletes one membership row.
    fn remove(&self, list_id: ListId, poster_id: PosterId) -> MembershipRepoResult<()>;
    /// Counts members of one list; `0` for an empty list.
    fn count_members(&self, list_id: ListId) -> MembershipRepoResult<i64>;
    /// Loads the position of one poster inside one list.
    fn current_position(
        &self,
        list_id: ListId,
        poster_id: PosterId,
    ) -> MembershipRepoResult<Position>;
    /// Adds `delta` to every position in `[start, end]` of one list.
    ///
    /// Returns the number of rows shifted.
    fn shift_range(
        &self,
        list_id: ListId,
        start: Position,
        end: Position,
        delta: i64,
    ) -> MembershipRepoResult<usize>;
    /// Overwrites the position of one poster.
    fn set_position(
        &self,
        list_id: ListId,
        poster_id: PosterId,
        position: Position,
    ) -> MembershipRepoResult<()>;
    /// Finds the list a poster currently belongs to.
    fn list_of_poster(&self, poster_id: PosterId) -> MembershipRepoResult<Option<ListId>>;
}

/// Open store transaction. Dropping it without `commit` rolls back.
pub trait StoreTransaction: MembershipStore {
    fn commit(self) -> MembershipRepoResult<()>;
    fn rollback(self) -> MembershipRepoResult<()>;
}

/// Membership store able to open transactions.
pub trait TransactionalStore: MembershipStore {
    type Tx<'t>: StoreTransaction
    where
        Self: 't;

    fn begin(&self) -> MembershipRepoResult<Self::Tx<'_>>;
}

impl FromRow for ListMembership {
    const COLUMNS: &'static str = "list_id, poster_id, position";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            list_id: row.get("list_id")?,
            poster_id: row.get("poster_id")?,
            position: row.get("position")?,
        })
    }
}

/// SQLite-backed membership store.
pub struct SqliteMembershipStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMembershipStore<'conn> {
    /// Creates store from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> MembershipRepoResult<Self> {
        let gap = find_schema_gap(conn, &[("list_posters", MEMBERSHIP_COLUMNS)])
            .map_err(db_err("schema_check"))?;
        if let Some(gap) = gap {
            return Err(gap.into());
        }
        Ok(Self { conn })
    }
}

impl MembershipStore for SqliteMembershipStore<'_> {
    fn list_members(&self, list_id: ListId) -> MembershipRepoResult<Vec<ListMembership>> {
        const OP: &str = "list_members";
        let members: Vec<ListMembership> = query_all(
            self.conn,
            &format!(
                "SELECT {}
                 FROM list_posters
                 WHERE list_id = ?1
                 ORDER BY position ASC, id ASC;",
                ListMembership::COLUMNS
            ),
            [list_id],
        )
        .map_err(db_err(OP))?;
        if members.is_empty() {
            return Err(MembershipRepoError::NotFound { op: OP });
        }
        Ok(members)
    }

    fn append(
        &self,
        list_id: ListId,
        poster_id: PosterId,
        position: Position,
    ) -> MembershipRepoResult<()> {
        self.conn
            .execute(
                "INSERT INTO list_posters (list_id, poster_id, position)
                 VALUES (?1, ?2, ?3);",
                params![list_id, poster_id, position],
            )
            .map_err(db_err("append"))?;
        Ok(())
    }

    fn remove(&self, list_id: ListId, poster_id: PosterId) -> MembershipRepoResult<()> {
        const OP: &str = "remove";
        let changed = self
            .conn
            .execute(
                "DELETE FROM list_posters
                 WHERE list_id = ?1
                   AND poster_id = ?2;",
                params![list_id, poster_id],
            )
            .map_err(db_err(OP))?;
        if changed == 0 {
            return Err(MembershipRepoError::NotFound { op: OP });
        }
        Ok(())
    }

    fn count_members(&self, list_id: ListId) -> MembershipRepoResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*)
                 FROM list_posters
                 WHERE list_id = ?1;",
                [list_id],
                |row| row.get(0),
            )
            .map_err(db_err("count_members"))
    }

    fn current_position(
        &self,
        list_id: ListId,
        poster_id: PosterId,
    ) -> MembershipRepoResult<Position> {
        const OP: &str = "current_position";
        self.conn
            .query_row(
                "SELECT position
                 FROM list_posters
                 WHERE list_id = ?1
                   AND poster_id = ?2;",
                params![list_id, poster_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err(OP))?
            .ok_or(MembershipRepoError::NotFound { op: OP })
    }

    fn shift_range(
        &self,
        list_id: ListId,
        start: Position,
        end: Position,
        delta: i64,
    ) -> MembershipRepoResult<usize> {
        self.conn
            .execute(
                "UPDATE list_posters
                 SET position = position + ?4
                 WHERE list_id = ?1
                   AND position BETWEEN ?2 AND ?3;",
                params![list_id, start, end, delta],
            )
            .map_err(db_err("shift_range"))
    }

    fn set_position(
        &self,
        list_id: ListId,
        poster_id: PosterId,
        position: Position,
    ) -> MembershipRepoResult<()> {
        const OP: &str = "set_position";
        let changed = self
            .conn
            .execute(
                "UPDATE list_posters
                 SET position = ?3
                 WHERE list_id = ?1
                   AND poster_id = ?2;",
                params![list_id, poster_id, position],
            )
            .map_err(db_err(OP))?;
        if changed == 0 {
            return Err(MembershipRepoError::NotFound { op: OP });
        }
        Ok(())
    }

    fn list_of_poster(&self, poster_id: PosterId) -> MembershipRepoResult<Option<ListId>> {
        self.conn
            .query_row(
                "SELECT list_id
                 FROM list_posters
                 WHERE poster_id = ?1;",
                [poster_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("list_of_poster"))
    }
}

impl<'conn> TransactionalStore for SqliteMembershipStore<'conn> {
    type Tx<'t>
        = SqliteMembershipTx<'t>
    where
        Self: 't;

    fn begin(&self) -> MembershipRepoResult<SqliteMembershipTx<'_>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(db_err("begin"))?;
        Ok(SqliteMembershipTx { tx })
    }
}

/// Membership store bound to one open SQLite transaction.
pub struct SqliteMembershipTx<'conn> {
    tx: Transaction<'conn>,
}

impl SqliteMembershipTx<'_> {
    fn store(&self) -> SqliteMembershipStore<'_> {
        SqliteMembershipStore { conn: &self.tx }
    }
}

impl MembershipStore for SqliteMembershipTx<'_> {
    fn list_members(&self, list_id: ListId) -> MembershipRepoResult<Vec<ListMembership>> {
        self.store().list_members(list_id)
    }

    fn append(
        &self,
        list_id: ListId,
        poster_id: PosterId,
        position: Position,
    ) -> MembershipRepoResult<()> {
        self.store().append(list_id, poster_id, position)
    }

    fn remove(&self, list_id: ListId, poster_id: PosterId) -> MembershipRepoResult<()> {
        self.store().remove(list_id, poster_id)
    }

    fn count_members(&self, list_id: ListId) -> MembershipRepoResult<i64> {
        self.store().count_members(list_id)
    }

    fn current_position(
        &self,
        list_id: ListId,
        poster_id: PosterId,
    ) -> MembershipRepoResult<Position> {
        self.store().current_position(list_id, poster_id)
    }

    fn shift_range(
        &self,
        list_id: ListId,
        start: Position,
        end: Position,
        delta: i64,
    ) -> MembershipRepoResult<usize> {
        self.store().shift_range(list_id, start, end, delta)
    }

    fn set_position(
        &self,
        list_id: ListId,
        poster_id: PosterId,
        position: Position,
    ) -> MembershipRepoResult<()> {
        self.store().set_position(list_id, poster_id, position)
    }

    fn list_of_poster(&self, poster_id: PosterId) -> MembershipRepoResult<Option<ListId>> {
        self.store().list_of_poster(poster_id)
    }
}

impl StoreTransaction for SqliteMembershipTx<'_> {
    fn commit(self) -> MembershipRepoResult<()> {
        self.tx.commit().map_err(db_err("commit"))
    }

    fn rollback(self) -> MembershipRepoResult<()> {
        self.tx.rollback().map_err(db_err("rollback"))
    }
}
