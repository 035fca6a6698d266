use serde::{Deserialize, Serialize};

use crate::domain::staff::StaffId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub staff_id: StaffId,
    /// The stored cursor pointed at an analyst no longer on the roster
    /// (deactivated or removed); the walk restarted from the head.
    pub cursor_was_stale: bool,
}

/// Round-robin step over an ordered roster. The roster must already be
/// sorted by staff creation time ascending (id ascending as tie-break);
/// callers read it and the cursor under the same transaction that will
/// persist the result.
pub fn next_assignee(roster: &[StaffId], cursor: Option<&StaffId>) -> Option<Assignment> {
    let first = roster.first()?;

    let Some(last_assigned) = cursor else {
        return Some(Assignment { staff_id: first.clone(), cursor_was_stale: false });
    };

    match roster.iter().position(|id| id == last_assigned) {
        Some(index) => {
            let staff_id = roster[(index + 1) % roster.len()].clone();
            Some(Assignment { staff_id, cursor_was_stale: false })
        }
        None => Some(Assignment { staff_id: first.clone(), cursor_was_stale: true }),
    }
}
