//! List-membership engine.
//!
//! # Responsibility
//! - Place posters into lists, move them between lists and reorder them.
//! - Group every multi-statement mutation into one store transaction.
//!
//! # Invariants
//! - This is the only writer of membership rows.
//! - A poster sits in at most one list; adding it elsewhere relocates it.
//! - With [`GapPolicy::Close`] positions of every list stay exactly `1..=N`
//!   after any sequence of operations.
//! - A failed transaction is rolled back before the error is returned; a
//!   rollback failure is reported together with the triggering error.
//! - Nothing is retried.

use crate::config::CatalogConfig;
use crate::model::catalog::{ListId, ListMembership, Position, PosterId};
use crate::repo::membership_repo::{
    MembershipRepoError, MembershipStore, StoreTransaction, TransactionalStore,
};
use crate::service::reindex::{plan_gap_close, plan_reposition};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MembershipResult<T> = Result<T, MembershipError>;

/// What happens to the slot a poster leaves behind on delete or move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Later siblings shift down by one in the same transaction.
    #[default]
    Close,
    /// The slot stays empty; later siblings keep their positions.
    Leave,
}

/// Successful result of [`MembershipEngine::add_poster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new membership row was appended.
    Created { position: Position },
    /// The poster was relocated from another list and appended.
    Moved { from: ListId, position: Position },
    /// The poster already belonged to the target list; nothing changed.
    AlreadyMember { position: Position },
}

impl AddOutcome {
    /// `true` only when a brand-new membership row exists now.
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }

    pub fn position(&self) -> Position {
        match self {
            Self::Created { position }
            | Self::Moved { position, .. }
            | Self::AlreadyMember { position } => *position,
        }
    }
}

/// Errors from membership engine operations.
#[derive(Debug)]
pub enum MembershipError {
    /// The list has no members, or the poster is not a member of the list.
    NotFound {
        list_id: ListId,
        poster_id: Option<PosterId>,
    },
    /// Store-level failure.
    Store(MembershipRepoError),
    /// An operation failed and rolling its transaction back failed too.
    RollbackFailed {
        cause: Box<MembershipError>,
        rollback: MembershipRepoError,
    },
}

impl MembershipError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::RollbackFailed { cause, .. } => cause.is_not_found(),
            Self::Store(_) => false,
        }
    }
}

impl Display for MembershipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound {
                list_id,
                poster_id: Some(poster_id),
            } => write!(f, "poster {poster_id} is not in list {list_id}"),
            Self::NotFound {
                list_id,
                poster_id: None,
            } => write!(f, "list {list_id} has no posters"),
            Self::Store(err) => write!(f, "{err}"),
            Self::RollbackFailed { cause, rollback } => {
                write!(f, "{cause}; rollback failed: {rollback}")
            }
        }
    }
}

impl Error for MembershipError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound { .. } => None,
            Self::Store(err) => Some(err),
            Self::RollbackFailed { cause, .. } => Some(cause.as_ref()),
        }
    }
}

impl From<MembershipRepoError> for MembershipError {
    fn from(value: MembershipRepoError) -> Self {
        Self::Store(value)
    }
}

/// Maps store `NotFound` onto the engine's own `NotFound` for one membership.
fn not_found_as(
    list_id: ListId,
    poster_id: Option<PosterId>,
) -> impl FnOnce(MembershipRepoError) -> MembershipError {
    move |err| {
        if err.is_not_found() {
            MembershipError::NotFound { list_id, poster_id }
        } else {
            MembershipError::Store(err)
        }
    }
}

/// Membership engine over a transactional store.
pub struct MembershipEngine<S: TransactionalStore> {
    store: S,
    gap_policy: GapPolicy,
}

impl<S: TransactionalStore> MembershipEngine<S> {
    /// Creates engine with the default gap policy ([`GapPolicy::Close`]).
    pub fn new(store: S) -> Self {
        Self::with_gap_policy(store, GapPolicy::default())
    }

    pub fn with_gap_policy(store: S, gap_policy: GapPolicy) -> Self {
        Self { store, gap_policy }
    }

    /// Creates engine with the gap policy named by `config`.
    pub fn from_config(store: S, config: &CatalogConfig) -> Self {
        Self::with_gap_policy(store, config.gap_policy)
    }

    pub fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }

    /// Returns members of one list ordered by position.
    ///
    /// An empty list is `NotFound`, not an empty vector.
    pub fn get_posters(&self, list_id: ListId) -> MembershipResult<Vec<ListMembership>> {
        self.store
            .list_members(list_id)
            .map_err(not_found_as(list_id, None))
    }

    /// Puts one poster at the end of `list_id`.
    ///
    /// A poster already sitting in another list is moved, exactly as
    /// [`MembershipEngine::move_poster`] would.
    pub fn add_poster(
        &self,
        list_id: ListId,
        poster_id: PosterId,
    ) -> MembershipResult<AddOutcome> {
        let tx = self.store.begin()?;
        let outcome = self.add_within(&tx, list_id, poster_id);
        let outcome = finish("poster_add", tx, outcome)?;
        debug!(
            "event=poster_add module=membership status=ok list_id={list_id} poster_id={poster_id} outcome={outcome:?}"
        );
        Ok(outcome)
    }

    /// Moves one poster from `source_list_id` to the end of `dest_list_id`.
    ///
    /// Returns the poster's position in the destination list.
    pub fn move_poster(
        &self,
        source_list_id: ListId,
        dest_list_id: ListId,
        poster_id: PosterId,
    ) -> MembershipResult<Position> {
        let tx = self.store.begin()?;
        let outcome = self.move_within(&tx, source_list_id, dest_list_id, poster_id);
        let position = finish("poster_move", tx, outcome)?;
        debug!(
            "event=poster_move module=membership status=ok from={source_list_id} to={dest_list_id} poster_id={poster_id} position={position}"
        );
        Ok(position)
    }

    /// Moves one poster to `new_position` inside `list_id`, shifting the
    /// siblings in between by one.
    ///
    /// `new_position` is not range-checked.
    pub fn change_poster_position(
        &self,
        list_id: ListId,
        poster_id: PosterId,
        new_position: Position,
    ) -> MembershipResult<()> {
        let tx = self.store.begin()?;
        let outcome = reposition_within(&tx, list_id, poster_id, new_position);
        finish("poster_reposition", tx, outcome)?;
        debug!(
            "event=poster_reposition module=membership status=ok list_id={list_id} poster_id={poster_id} position={new_position}"
        );
        Ok(())
    }

    /// Removes one poster from `list_id`.
    pub fn delete_poster(&self, list_id: ListId, poster_id: PosterId) -> MembershipResult<()> {
        match self.gap_policy {
            GapPolicy::Leave => self
                .store
                .remove(list_id, poster_id)
                .map_err(not_found_as(list_id, Some(poster_id)))?,
            GapPolicy::Close => {
                let tx = self.store.begin()?;
                let outcome = remove_closing_gap(&tx, list_id, poster_id);
                finish("poster_delete", tx, outcome)?;
            }
        }
        debug!(
            "event=poster_delete module=membership status=ok list_id={list_id} poster_id={poster_id} gap_policy={:?}",
            self.gap_policy
        );
        Ok(())
    }

    fn add_within(
        &self,
        store: &impl MembershipStore,
        list_id: ListId,
        poster_id: PosterId,
    ) -> MembershipResult<AddOutcome> {
        match store.list_of_poster(poster_id)? {
            Some(current) if current == list_id => {
                let position = store
                    .current_position(list_id, poster_id)
                    .map_err(not_found_as(list_id, Some(poster_id)))?;
                Ok(AddOutcome::AlreadyMember { position })
            }
            Some(current) => {
                debug!(
                    "event=poster_add module=membership status=relocating from={current} to={list_id} poster_id={poster_id}"
                );
                let position = self.move_within(store, current, list_id, poster_id)?;
                Ok(AddOutcome::Moved {
                    from: current,
                    position,
                })
            }
            None => {
                let position = store.count_members(list_id)? + 1;
                store.append(list_id, poster_id, position)?;
                Ok(AddOutcome::Created { position })
            }
        }
    }

    fn move_within(
        &self,
        store: &impl MembershipStore,
        source_list_id: ListId,
        dest_list_id: ListId,
        poster_id: PosterId,
    ) -> MembershipResult<Position> {
        if source_list_id == dest_list_id {
            let last = store.count_members(source_list_id)?;
            reposition_within(store, source_list_id, poster_id, last)?;
            return Ok(last);
        }

        match self.gap_policy {
            GapPolicy::Close => remove_closing_gap(store, source_list_id, poster_id)?,
            GapPolicy::Leave => store
                .remove(source_list_id, poster_id)
                .map_err(not_found_as(source_list_id, Some(poster_id)))?,
        }

        let position = store.count_members(dest_list_id)? + 1;
        store.append(dest_list_id, poster_id, position)?;
        Ok(position)
    }
}

fn reposition_within(
    store: &impl MembershipStore,
    list_id: ListId,
    poster_id: PosterId,
    new_position: Position,
) -> MembershipResult<()> {
    let current = store
        .current_position(list_id, poster_id)
        .map_err(not_found_as(list_id, Some(poster_id)))?;
    let Some(plan) = plan_reposition(current, new_position) else {
        return Ok(());
    };

    store.shift_range(list_id, plan.start, plan.end, plan.delta)?;
    store
        .set_position(list_id, poster_id, new_position)
        .map_err(not_found_as(list_id, Some(poster_id)))?;
    Ok(())
}

fn remove_closing_gap(
    store: &impl MembershipStore,
    list_id: ListId,
    poster_id: PosterId,
) -> MembershipResult<()> {
    let removed = store
        .current_position(list_id, poster_id)
        .map_err(not_found_as(list_id, Some(poster_id)))?;
    let last = store.count_members(list_id)?;
    store
        .remove(list_id, poster_id)
        .map_err(not_found_as(list_id, Some(poster_id)))?;

    if let Some(plan) = plan_gap_close(removed, last) {
        store.shift_range(list_id, plan.start, plan.end, plan.delta)?;
    }
    Ok(())
}

/// Commits on success; otherwise rolls back and returns the triggering error,
/// joined with the rollback error when that fails too.
fn finish<T, Tx: StoreTransaction>(
    event: &'static str,
    tx: Tx,
    outcome: MembershipResult<T>,
) -> MembershipResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => match tx.rollback() {
            Ok(()) => {
                if err.is_not_found() {
                    debug!("event={event} module=membership status=rolled_back error={err}");
                } else {
                    warn!("event={event} module=membership status=rolled_back error={err}");
                }
                Err(err)
            }
            Err(rollback) => {
                error!(
                    "event={event} module=membership status=error error_code=rollback_failed error={err} rollback_error={rollback}"
                );
                Err(MembershipError::RollbackFailed {
                    cause: Box::new(err),
                    rollback,
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{AddOutcome, GapPolicy, MembershipEngine, MembershipError};
    use crate::config::CatalogConfig;
    use crate::db::DbError;
    use crate::model::catalog::{ListId, ListMembership, Position, PosterId};
    use crate::repo::membership_repo::{
        MembershipRepoError, MembershipRepoResult, MembershipStore, StoreTransaction,
        TransactionalStore,
    };
    use std::cell::{Cell, RefCell};

    const LIST_A: ListId = 10;
    const LIST_B: ListId = 20;

    fn injected(op: &'static str) -> MembershipRepoError {
        MembershipRepoError::Db {
            op,
            source: DbError::Sqlite(rusqlite::Error::InvalidQuery),
        }
    }

    /// In-memory store; transactions work on a staged copy of the rows.
    #[derive(Default)]
    struct FakeStore {
        rows: RefCell<Vec<ListMembership>>,
        fail_append_to: Cell<Option<ListId>>,
        fail_rollback: Cell<bool>,
    }

    impl FakeStore {
        fn with_rows(rows: &[(ListId, PosterId, Position)]) -> Self {
            let store = Self::default();
            store.rows.borrow_mut().extend(rows.iter().map(
                |&(list_id, poster_id, position)| ListMembership {
                    list_id,
                    poster_id,
                    position,
                },
            ));
            store
        }

        fn snapshot(&self) -> Vec<(ListId, PosterId, Position)> {
            let mut rows: Vec<_> = self
                .rows
                .borrow()
                .iter()
                .map(|row| (row.list_id, row.poster_id, row.position))
                .collect();
            rows.sort_unstable();
            rows
        }
    }

    impl MembershipStore for FakeStore {
        fn list_members(&self, list_id: ListId) -> MembershipRepoResult<Vec<ListMembership>> {
            let mut members: Vec<_> = self
                .rows
                .borrow()
                .iter()
                .filter(|row| row.list_id == list_id)
                .copied()
                .collect();
            if members.is_empty() {
                return Err(MembershipRepoError::NotFound { op: "list_members" });
            }
            members.sort_by_key(|row| row.position);
            Ok(members)
        }

        fn append(
            &self,
            list_id: ListId,
            poster_id: PosterId,
            position: Position,
        ) -> MembershipRepoResult<()> {
            if self.fail_append_to.get() == Some(list_id) {
                return Err(injected("append"));
            }
            self.rows.borrow_mut().push(ListMembership {
                list_id,
                poster_id,
                position,
            });
            Ok(())
        }

        fn remove(&self, list_id: ListId, poster_id: PosterId) -> MembershipRepoResult<()> {
            let mut rows = self.rows.borrow_mut();
            let before = rows.len();
            rows.retain(|row| !(row.list_id == list_id && row.poster_id == poster_id));
            if rows.len() == before {
                return Err(MembershipRepoError::NotFound { op: "remove" });
            }
            Ok(())
        }

        fn count_members(&self, list_id: ListId) -> MembershipRepoResult<i64> {
            Ok(self
                .rows
                .borrow()
                .iter()
                .filter(|row| row.list_id == list_id)
                .count() as i64)
        }

        fn current_position(
            &self,
            list_id: ListId,
            poster_id: PosterId,
        ) -> MembershipRepoResult<Position> {
            self.rows
                .borrow()
                .iter()
                .find(|row| row.list_id == list_id && row.poster_id == poster_id)
                .map(|row| row.position)
                .ok_or(MembershipRepoError::NotFound {
                    op: "current_position",
                })
        }

        fn shift_range(
            &self,
            list_id: ListId,
            start: Position,
            end: Position,
            delta: i64,
        ) -> MembershipRepoResult<usize> {
            let mut shifted = 0;
            for row in self.rows.borrow_mut().iter_mut() {
                if row.list_id == list_id && (start..=end).contains(&row.position) {
                    row.position += delta;
                    shifted += 1;
                }
            }
            Ok(shifted)
        }

        fn set_position(
            &self,
            list_id: ListId,
            poster_id: PosterId,
            position: Position,
        ) -> MembershipRepoResult<()> {
            let mut rows = self.rows.borrow_mut();
            let row = rows
                .iter_mut()
                .find(|row| row.list_id == list_id && row.poster_id == poster_id)
                .ok_or(MembershipRepoError::NotFound { op: "set_position" })?;
            row.position = position;
            Ok(())
        }

        fn list_of_poster(&self, poster_id: PosterId) -> MembershipRepoResult<Option<ListId>> {
            Ok(self
                .rows
                .borrow()
                .iter()
                .find(|row| row.poster_id == poster_id)
                .map(|row| row.list_id))
        }
    }

    struct FakeTx<'a> {
        owner: &'a FakeStore,
        staged: FakeStore,
    }

    impl MembershipStore for FakeTx<'_> {
        fn list_members(&self, list_id: ListId) -> MembershipRepoResult<Vec<ListMembership>> {
            self.staged.list_members(list_id)
        }

        fn append(
            &self,
            list_id: ListId,
            poster_id: PosterId,
            position: Position,
        ) -> MembershipRepoResult<()> {
            self.staged.append(list_id, poster_id, position)
        }

        fn remove(&self, list_id: ListId, poster_id: PosterId) -> MembershipRepoResult<()> {
            self.staged.remove(list_id, poster_id)
        }

        fn count_members(&self, list_id: ListId) -> MembershipRepoResult<i64> {
            self.staged.count_members(list_id)
        }

        fn current_position(
            &self,
            list_id: ListId,
            poster_id: PosterId,
        ) -> MembershipRepoResult<Position> {
            self.staged.current_position(list_id, poster_id)
        }

        fn shift_range(
            &self,
            list_id: ListId,
            start: Position,
            end: Position,
            delta: i64,
        ) -> MembershipRepoResult<usize> {
            self.staged.shift_range(list_id, start, end, delta)
        }

        fn set_position(
            &self,
            list_id: ListId,
            poster_id: PosterId,
            position: Position,
        ) -> MembershipRepoResult<()> {
            self.staged.set_position(list_id, poster_id, position)
        }

        fn list_of_poster(&self, poster_id: PosterId) -> MembershipRepoResult<Option<ListId>> {
            self.staged.list_of_poster(poster_id)
        }
    }

    impl StoreTransaction for FakeTx<'_> {
        fn commit(self) -> MembershipRepoResult<()> {
            *self.owner.rows.borrow_mut() = self.staged.rows.into_inner();
            Ok(())
        }

        fn rollback(self) -> MembershipRepoResult<()> {
            if self.owner.fail_rollback.get() {
                return Err(injected("rollback"));
            }
            Ok(())
        }
    }

    impl TransactionalStore for FakeStore {
        type Tx<'t>
            = FakeTx<'t>
        where
            Self: 't;

        fn begin(&self) -> MembershipRepoResult<FakeTx<'_>> {
            let staged = FakeStore {
                rows: RefCell::new(self.rows.borrow().clone()),
                fail_append_to: Cell::new(self.fail_append_to.get()),
                fail_rollback: Cell::new(false),
            };
            Ok(FakeTx {
                owner: self,
                staged,
            })
        }
    }

    #[test]
    fn failed_insert_leaves_source_list_untouched() {
        let store = FakeStore::with_rows(&[(LIST_A, 1, 1), (LIST_A, 2, 2)]);
        store.fail_append_to.set(Some(LIST_B));
        let engine = MembershipEngine::new(store);

        let err = engine.move_poster(LIST_A, LIST_B, 1).unwrap_err();
        assert!(matches!(err, MembershipError::Store(_)));
        assert_eq!(
            engine.store.snapshot(),
            vec![(LIST_A, 1, 1), (LIST_A, 2, 2)]
        );
    }

    #[test]
    fn rollback_failure_is_reported_with_the_triggering_error() {
        let store = FakeStore::with_rows(&[(LIST_A, 1, 1)]);
        store.fail_append_to.set(Some(LIST_B));
        store.fail_rollback.set(true);
        let engine = MembershipEngine::new(store);

        let err = engine.move_poster(LIST_A, LIST_B, 1).unwrap_err();
        match &err {
            MembershipError::RollbackFailed { cause, rollback } => {
                assert!(matches!(cause.as_ref(), MembershipError::Store(_)));
                assert!(rollback.to_string().contains("rollback"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("rollback failed"));
    }

    #[test]
    fn not_found_inside_transaction_rolls_back_and_stays_not_found() {
        let engine = MembershipEngine::new(FakeStore::with_rows(&[(LIST_A, 1, 1)]));

        let err = engine.change_poster_position(LIST_A, 99, 1).unwrap_err();
        assert!(matches!(
            err,
            MembershipError::NotFound {
                list_id: LIST_A,
                poster_id: Some(99)
            }
        ));
        assert_eq!(engine.store.snapshot(), vec![(LIST_A, 1, 1)]);
    }

    #[test]
    fn configured_leave_policy_keeps_the_gap_on_delete() {
        let config = CatalogConfig::from_json_str(r#"{"gap_policy": "leave"}"#).unwrap();
        let engine = MembershipEngine::from_config(
            FakeStore::with_rows(&[(LIST_A, 1, 1), (LIST_A, 2, 2), (LIST_A, 3, 3)]),
            &config,
        );
        assert_eq!(engine.gap_policy(), GapPolicy::Leave);

        engine.delete_poster(LIST_A, 1).unwrap();
        assert_eq!(engine.store.snapshot(), vec![(LIST_A, 2, 2), (LIST_A, 3, 3)]);

        let engine = MembershipEngine::from_config(
            FakeStore::with_rows(&[(LIST_A, 1, 1), (LIST_A, 2, 2)]),
            &CatalogConfig::default(),
        );
        engine.delete_poster(LIST_A, 1).unwrap();
        assert_eq!(engine.store.snapshot(), vec![(LIST_A, 2, 1)]);
    }

    #[test]
    fn add_reports_created_then_moved() {
        let engine = MembershipEngine::new(FakeStore::default());

        let created = engine.add_poster(LIST_A, 7).unwrap();
        assert_eq!(created, AddOutcome::Created { position: 1 });
        assert!(created.is_created());

        let moved = engine.add_poster(LIST_B, 7).unwrap();
        assert_eq!(
            moved,
            AddOutcome::Moved {
                from: LIST_A,
                position: 1
            }
        );
        assert!(!moved.is_created());
        assert_eq!(engine.store.snapshot(), vec![(LIST_B, 7, 1)]);
    }

    #[test]
    fn leave_policy_delete_is_a_single_statement() {
        let store = FakeStore::with_rows(&[(LIST_A, 1, 1), (LIST_A, 2, 2)]);
        store.fail_rollback.set(true);
        let engine = MembershipEngine::with_gap_policy(store, GapPolicy::Leave);

        engine.delete_poster(LIST_A, 1).unwrap();
        assert_eq!(engine.store.snapshot(), vec![(LIST_A, 2, 2)]);

        let err = engine.delete_poster(LIST_A, 1).unwrap_err();
        assert!(err.is_not_found());
    }
}
