//! Position reindexing plans.
//!
//! Pure computation: given where an item is and where it should go, say which
//! sibling range shifts and in which direction. Nothing here touches storage.

use crate::model::catalog::Position;

/// One range shift: add `delta` to every position in `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftPlan {
    pub start: Position,
    pub end: Position,
    pub delta: i64,
}

/// Plans the sibling shift for moving an item from `current` to `target`
/// inside one list.
///
/// - Moving down (`current < target`): `[current + 1, target]` decrement.
/// - Moving up (`current > target`): `[target, current - 1]` increment.
/// - Same slot: `None`; callers should skip the write entirely.
///
/// The moving item itself is written to `target` after the shift.
pub fn plan_reposition(current: Position, target: Position) -> Option<ShiftPlan> {
    match current.cmp(&target) {
        std::cmp::Ordering::Less => Some(ShiftPlan {
            start: current + 1,
            end: target,
            delta: -1,
        }),
        std::cmp::Ordering::Greater => Some(ShiftPlan {
            start: target,
            end: current - 1,
            delta: 1,
        }),
        std::cmp::Ordering::Equal => None,
    }
}

/// Plans the shift that closes the hole left at `removed` in a list whose last
/// occupied position (before removal) was `last`.
///
/// `None` when the removed item was the last one.
pub fn plan_gap_close(removed: Position, last: Position) -> Option<ShiftPlan> {
    if removed >= last {
        return None;
    }
    Some(ShiftPlan {
        start: removed + 1,
        end: last,
        delta: -1,
    })
}
