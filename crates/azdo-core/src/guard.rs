use serde_json::Value;
use tracing::{debug, info};

use crate::boards::{show_work_item_fields, AzScope};
use crate::error::{AzdoError, OwnershipMismatch, Result};
use crate::identity::{assigned_identity, who_am_i};
use crate::runner::CommandRunner;
use crate::work_item::{field_str, FIELD_STATE, FIELD_TITLE, FIELD_WORK_ITEM_TYPE, GUARD_FIELDS};

/// What the guard saw when it let a mutation through.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipCheck {
    pub caller: Option<String>,
    pub snapshot: Option<Value>,
}

/// Best-effort identity comparison: case-insensitive equality or containment either way,
/// so `jdoe` matches `jdoe@example.com`.
pub fn identities_match(caller: &str, assigned: &str) -> bool {
    let caller = caller.to_lowercase();
    let assigned = assigned.to_lowercase();
    caller == assigned || assigned.contains(&caller) || caller.contains(&assigned)
}

/// Fails with `NotAssignedToMe` when the work item is visibly assigned to someone else.
///
/// When either identity is unknown the check passes: it cannot be verified, and only a
/// definite mismatch blocks the mutation.
pub async fn ensure_assigned_to_me(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    id: u32,
) -> Result<OwnershipCheck> {
    let caller = who_am_i(runner).await?;
    let snapshot = show_work_item_fields(runner, scope, id, &GUARD_FIELDS).await?;
    let assigned = snapshot.as_ref().and_then(assigned_identity);

    match (&caller, &assigned) {
        (Some(me), Some(assigned)) => {
            if !identities_match(me, assigned) {
                info!(id, assigned = %assigned, caller = %me, "work item not assigned to caller");
                let field = |name: &str| {
                    snapshot
                        .as_ref()
                        .and_then(|item| field_str(item, name))
                        .map(str::to_string)
                };
                return Err(AzdoError::NotAssignedToMe(Box::new(OwnershipMismatch {
                    id,
                    assigned: assigned.clone(),
                    caller: me.clone(),
                    title: field(FIELD_TITLE),
                    work_item_type: field(FIELD_WORK_ITEM_TYPE),
                    state: field(FIELD_STATE),
                })));
            }
            debug!(id, caller = %me, "ownership verified");
        }
        _ => {
            info!(
                id,
                caller_known = caller.is_some(),
                assignee_known = assigned.is_some(),
                "ownership unverifiable, allowing"
            );
        }
    }

    Ok(OwnershipCheck { caller, snapshot })
}
