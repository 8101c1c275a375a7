//! Lists, posters and the membership triple that ties them together.

use serde::{Deserialize, Serialize};

/// Stable identifier of a catalog list (folder).
pub type ListId = i64;

/// Stable identifier of a poster (movie).
pub type PosterId = i64;

/// Identifier of the owning user. Users themselves live outside the core.
pub type UserId = i64;

/// Identifier of one watch-history record.
pub type RecordId = i64;

/// 1-based slot of a poster among the members of one list.
pub type Position = i64;

/// One node of the list tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogList {
    pub id: ListId,
    /// `None` only for the global root list.
    pub parent_id: Option<ListId>,
    pub name: String,
    pub user_id: UserId,
    /// Marks the single system-wide root.
    pub is_root: bool,
}

/// A poster as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poster {
    pub id: PosterId,
    pub name: String,
    pub year: i32,
    pub genres: Vec<String>,
    /// Runtime in minutes.
    pub chrono: i32,
    pub user_id: UserId,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// Insert payload for [`Poster`]; the id and timestamp are assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPoster {
    pub name: String,
    pub year: i32,
    pub genres: Vec<String>,
    pub chrono: i32,
    pub user_id: UserId,
}

impl NewPoster {
    pub fn new(name: impl Into<String>, user_id: UserId) -> Self {
        Self {
            name: name.into(),
            user_id,
            ..Self::default()
        }
    }
}

/// Placement of one poster inside one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMembership {
    pub list_id: ListId,
    pub poster_id: PosterId,
    pub position: Position,
}

/// One entry of a user's watch history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosterRecord {
    pub id: RecordId,
    pub poster_id: PosterId,
    pub user_id: UserId,
    /// Epoch ms.
    pub created_at: i64,
}

/// Genres are persisted as one comma-joined column.
pub(crate) fn join_genres(genres: &[String]) -> String {
    genres.join(",")
}

pub(crate) fn split_genres(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(',').map(str::to_string).collect()
}
