//! List tree and poster repositories.
//!
//! # Responsibility
//! - Provide the list/poster rows that memberships point at.
//! - Resolve the global root and per-user root lists.
//!
//! # Invariants
//! - Exactly one list has `is_root = 1`; it is seeded by migration.
//! - Deleting a list removes its sublists and all their memberships.
//! - Deleting a poster removes its membership and its watch-history records.

use crate::db::DbError;
use crate::model::catalog::{
    join_genres, split_genres, CatalogList, ListId, NewPoster, Poster, PosterId, PosterRecord,
    RecordId, UserId,
};
use crate::repo::{find_schema_gap, query_all, FromRow, SchemaGap};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const LIST_COLUMNS: &[&str] = &["id", "parent_id", "name", "user_id", "is_root"];
const POSTER_COLUMNS: &[&str] = &[
    "id",
    "name",
    "year",
    "genres",
    "chrono",
    "user_id",
    "created_at",
];
const RECORD_COLUMNS: &[&str] = &["id", "poster_id", "user_id", "created_at"];

pub type CatalogRepoResult<T> = Result<T, CatalogRepoError>;

/// Errors from list/poster repository operations.
#[derive(Debug)]
pub enum CatalogRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    ListNotFound(ListId),
    PosterNotFound(PosterId),
    /// The seeded global root list is missing.
    RootMissing,
    /// User has no root list under the global root.
    UserRootNotFound(UserId),
    /// User has no watch-history records.
    NoUserRecords(UserId),
    /// Connection schema is not usable by this repository.
    Schema(String),
}

impl Display for CatalogRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ListNotFound(id) => write!(f, "list not found: {id}"),
            Self::PosterNotFound(id) => write!(f, "poster not found: {id}"),
            Self::RootMissing => write!(f, "global root list is missing"),
            Self::UserRootNotFound(user_id) => {
                write!(f, "root list not found for user {user_id}")
            }
            Self::NoUserRecords(user_id) => write!(f, "no poster records for user {user_id}"),
            Self::Schema(message) => write!(f, "catalog repository schema error: {message}"),
        }
    }
}

impl Error for CatalogRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for CatalogRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CatalogRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SchemaGap> for CatalogRepoError {
    fn from(value: SchemaGap) -> Self {
        let message = match value {
            SchemaGap::Version { expected, actual } => {
                format!("expected schema version {expected}, got {actual}")
            }
            SchemaGap::Table(table) => format!("missing table `{table}`"),
            SchemaGap::Column { table, column } => {
                format!("missing column `{column}` in table `{table}`")
            }
        };
        Self::Schema(message)
    }
}

/// Repository interface for the list tree.
pub trait ListRepository {
    /// Returns the id of the global root list.
    fn root_id(&self) -> CatalogRepoResult<ListId>;
    /// Returns the root list of one user (a direct child of the global root).
    fn user_root(&self, user_id: UserId) -> CatalogRepoResult<CatalogList>;
    fn get_list(&self, list_id: ListId) -> CatalogRepoResult<CatalogList>;
    /// Lists direct children; empty when there are none.
    fn sublists(&self, list_id: ListId) -> CatalogRepoResult<Vec<CatalogList>>;
    fn create_list(&self, parent_id: ListId, name: &str, user_id: UserId)
        -> CatalogRepoResult<ListId>;
    fn rename_list(&self, list_id: ListId, name: &str) -> CatalogRepoResult<()>;
    /// Deletes one list with its subtree and memberships.
    fn delete_list(&self, list_id: ListId) -> CatalogRepoResult<()>;
}

/// Repository interface for posters.
pub trait PosterRepository {
    fn create_poster(&self, poster: &NewPoster) -> CatalogRepoResult<PosterId>;
    fn get_poster(&self, poster_id: PosterId) -> CatalogRepoResult<Poster>;
    /// Overwrites name, year, genres and runtime of `poster.id`.
    ///
    /// Owner and creation time are not touched.
    fn update_poster(&self, poster: &Poster) -> CatalogRepoResult<()>;
    /// Deletes one poster together with its membership row.
    fn delete_poster(&self, poster_id: PosterId) -> CatalogRepoResult<()>;
}

/// Repository interface for watch-history records.
pub trait PosterRecordRepository {
    /// Records that `user_id` watched `poster_id`.
    fn create_record(&self, poster_id: PosterId, user_id: UserId) -> CatalogRepoResult<RecordId>;
    /// Lists one user's records, oldest first; `NoUserRecords` when none.
    fn user_records(&self, user_id: UserId) -> CatalogRepoResult<Vec<PosterRecord>>;
    /// Deletes every record of one poster and returns how many went away.
    fn delete_records(&self, poster_id: PosterId) -> CatalogRepoResult<usize>;
}

impl FromRow for CatalogList {
    const COLUMNS: &'static str = "id, parent_id, name, user_id, is_root";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            parent_id: row.get("parent_id")?,
            name: row.get("name")?,
            user_id: row.get("user_id")?,
            is_root: row.get::<_, i64>("is_root")? == 1,
        })
    }
}

impl FromRow for Poster {
    const COLUMNS: &'static str = "id, name, year, genres, chrono, user_id, created_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let genres: String = row.get("genres")?;
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            year: row.get("year")?,
            genres: split_genres(&genres),
            chrono: row.get("chrono")?,
            user_id: row.get("user_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl FromRow for PosterRecord {
    const COLUMNS: &'static str = "id, poster_id, user_id, created_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            poster_id: row.get("poster_id")?,
            user_id: row.get("user_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// SQLite-backed list, poster and watch-history repository.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CatalogRepoResult<Self> {
        let gap = find_schema_gap(
            conn,
            &[
                ("lists", LIST_COLUMNS),
                ("posters", POSTER_COLUMNS),
                ("poster_records", RECORD_COLUMNS),
            ],
        )?;
        if let Some(gap) = gap {
            return Err(gap.into());
        }
        Ok(Self { conn })
    }

    fn find_list(&self, list_id: ListId) -> CatalogRepoResult<Option<CatalogList>> {
        let mut lists: Vec<CatalogList> = query_all(
            self.conn,
            &format!("SELECT {} FROM lists WHERE id = ?1;", CatalogList::COLUMNS),
            [list_id],
        )?;
        Ok(lists.pop())
    }

    fn poster_exists(&self, poster_id: PosterId) -> CatalogRepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM posters WHERE id = ?1);",
            [poster_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl ListRepository for SqliteCatalogRepository<'_> {
    fn root_id(&self) -> CatalogRepoResult<ListId> {
        self.conn
            .query_row("SELECT id FROM lists WHERE is_root = 1;", [], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(CatalogRepoError::RootMissing)
    }

    fn user_root(&self, user_id: UserId) -> CatalogRepoResult<CatalogList> {
        let root_id = self.root_id()?;
        let mut lists: Vec<CatalogList> = query_all(
            self.conn,
            &format!(
                "SELECT {}
                 FROM lists
                 WHERE parent_id = ?1
                   AND user_id = ?2
                 ORDER BY id ASC
                 LIMIT 1;",
                CatalogList::COLUMNS
            ),
            params![root_id, user_id],
        )?;
        lists.pop().ok_or(CatalogRepoError::UserRootNotFound(user_id))
    }

    fn get_list(&self, list_id: ListId) -> CatalogRepoResult<CatalogList> {
        self.find_list(list_id)?
            .ok_or(CatalogRepoError::ListNotFound(list_id))
    }

    fn sublists(&self, list_id: ListId) -> CatalogRepoResult<Vec<CatalogList>> {
        let lists = query_all(
            self.conn,
            &format!(
                "SELECT {}
                 FROM lists
                 WHERE parent_id = ?1
                 ORDER BY id ASC;",
                CatalogList::COLUMNS
            ),
            [list_id],
        )?;
        Ok(lists)
    }

    fn create_list(
        &self,
        parent_id: ListId,
        name: &str,
        user_id: UserId,
    ) -> CatalogRepoResult<ListId> {
        if self.find_list(parent_id)?.is_none() {
            return Err(CatalogRepoError::ListNotFound(parent_id));
        }
        self.conn.execute(
            "INSERT INTO lists (parent_id, name, user_id, is_root)
             VALUES (?1, ?2, ?3, 0);",
            params![parent_id, name, user_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn rename_list(&self, list_id: ListId, name: &str) -> CatalogRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE lists SET name = ?2 WHERE id = ?1;",
            params![list_id, name],
        )?;
        if changed == 0 {
            return Err(CatalogRepoError::ListNotFound(list_id));
        }
        Ok(())
    }

    fn delete_list(&self, list_id: ListId) -> CatalogRepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM lists WHERE id = ?1;", [list_id])?;
        if changed == 0 {
            return Err(CatalogRepoError::ListNotFound(list_id));
        }
        Ok(())
    }
}

impl PosterRepository for SqliteCatalogRepository<'_> {
    fn create_poster(&self, poster: &NewPoster) -> CatalogRepoResult<PosterId> {
        self.conn.execute(
            "INSERT INTO posters (name, year, genres, chrono, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                poster.name.as_str(),
                poster.year,
                join_genres(&poster.genres),
                poster.chrono,
                poster.user_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_poster(&self, poster_id: PosterId) -> CatalogRepoResult<Poster> {
        let mut posters: Vec<Poster> = query_all(
            self.conn,
            &format!("SELECT {} FROM posters WHERE id = ?1;", Poster::COLUMNS),
            [poster_id],
        )?;
        posters
            .pop()
            .ok_or(CatalogRepoError::PosterNotFound(poster_id))
    }

    fn update_poster(&self, poster: &Poster) -> CatalogRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE posters
             SET name = ?2, year = ?3, genres = ?4, chrono = ?5
             WHERE id = ?1;",
            params![
                poster.id,
                poster.name.as_str(),
                poster.year,
                join_genres(&poster.genres),
                poster.chrono,
            ],
        )?;
        if changed == 0 {
            return Err(CatalogRepoError::PosterNotFound(poster.id));
        }
        Ok(())
    }

    fn delete_poster(&self, poster_id: PosterId) -> CatalogRepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM posters WHERE id = ?1;", [poster_id])?;
        if changed == 0 {
            return Err(CatalogRepoError::PosterNotFound(poster_id));
        }
        Ok(())
    }
}

impl PosterRecordRepository for SqliteCatalogRepository<'_> {
    fn create_record(&self, poster_id: PosterId, user_id: UserId) -> CatalogRepoResult<RecordId> {
        if !self.poster_exists(poster_id)? {
            return Err(CatalogRepoError::PosterNotFound(poster_id));
        }
        self.conn.execute(
            "INSERT INTO poster_records (poster_id, user_id) VALUES (?1, ?2);",
            params![poster_id, user_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn user_records(&self, user_id: UserId) -> CatalogRepoResult<Vec<PosterRecord>> {
        let records: Vec<PosterRecord> = query_all(
            self.conn,
            &format!(
                "SELECT {}
                 FROM poster_records
                 WHERE user_id = ?1
                 ORDER BY created_at ASC, id ASC;",
                PosterRecord::COLUMNS
            ),
            [user_id],
        )?;
        if records.is_empty() {
            return Err(CatalogRepoError::NoUserRecords(user_id));
        }
        Ok(records)
    }

    fn delete_records(&self, poster_id: PosterId) -> CatalogRepoResult<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM poster_records WHERE poster_id = ?1;", [poster_id])?;
        Ok(deleted)
    }
}
