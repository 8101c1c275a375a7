//! Core domain logic for the poster catalog.
//! Owns the ordered list-membership invariant: every list's poster positions
//! are `1..=N`, and a poster sits in at most one list.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{open_catalog_db, CatalogConfig, ConfigError};
pub use logging::{
    default_log_level, init_logging, init_logging_from, logging_status, LoggingError,
};
pub use model::catalog::{
    CatalogList, ListId, ListMembership, NewPoster, Position, Poster, PosterId, PosterRecord,
    RecordId, UserId,
};
pub use repo::catalog_repo::{
    CatalogRepoError, CatalogRepoResult, ListRepository, PosterRecordRepository,
    PosterRepository, SqliteCatalogRepository,
};
pub use repo::membership_repo::{
    MembershipRepoError, MembershipRepoResult, MembershipStore, SqliteMembershipStore,
    SqliteMembershipTx, StoreTransaction, TransactionalStore,
};
pub use service::membership_service::{
    AddOutcome, GapPolicy, MembershipEngine, MembershipError, MembershipResult,
};
pub use service::reindex::{plan_gap_close, plan_reposition, ShiftPlan};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
