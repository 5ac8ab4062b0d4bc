//! Adjacency rules for moving an environment within the organizational-unit
//! tree.
//!
//! A move is legal only to the current unit's parent or to one of its
//! immediate children, because each of those is a single add-or-remove edit
//! on one unit's membership. The hierarchy can change between runs, so it is
//! re-read from the control plane on every call.

use crate::remote::UnitDirectory;
use crate::types::{MoveDirection, Placement, UnitId};
use crate::{clog_debug, Error, Result};

/// Decide whether `requested` is adjacent to `current` and which unit to patch.
///
/// Reads `current` first and accepts its parent without listing children.
/// Otherwise lists the immediate children of `current`. Fails with
/// [`Error::InvalidPlacement`] naming the parent and every child when the
/// requested unit is neither.
pub async fn validate_move<D>(directory: &D, current: &UnitId, requested: &UnitId) -> Result<Placement>
where
    D: UnitDirectory + ?Sized,
{
    let unit = directory
        .read_unit(current)
        .await
        .map_err(|e| Error::remote("read organizational unit", current, e))?;

    if unit.parent_id.as_ref() == Some(requested) {
        clog_debug!("[hierarchy] {} -> {} is a move to the parent", current, requested);
        return Ok(Placement {
            target_unit: current.clone(),
            direction: MoveDirection::ToParent,
        });
    }

    let children = directory
        .list_child_units(current)
        .await
        .map_err(|e| Error::remote("list child units", current, e))?;

    // Trust the id set, but only rows that actually name `current` as parent.
    let child_ids: Vec<UnitId> = children
        .into_iter()
        .filter(|child| child.parent_id.as_ref() == Some(current))
        .map(|child| child.id)
        .collect();

    if child_ids.iter().any(|id| id == requested) {
        clog_debug!("[hierarchy] {} -> {} is a move to a child", current, requested);
        return Ok(Placement {
            target_unit: requested.clone(),
            direction: MoveDirection::ToChild,
        });
    }

    let mut allowed = Vec::with_capacity(child_ids.len() + 1);
    allowed.extend(unit.parent_id);
    allowed.extend(child_ids);

    Err(Error::InvalidPlacement {
        current: current.clone(),
        requested: requested.clone(),
        allowed,
    })
}
