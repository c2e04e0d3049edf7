//! Task status transitions and the permission checks guarding them.
//!
//! Every status change goes through [`plan`], which validates the acting
//! user against the task's current state and returns the resulting
//! [`Transition`]. Storage applies the transition with a compare-and-set on
//! the previous status and helper, so a plan built from a stale snapshot
//! cannot land, even if the task has since returned to the same status.

use thiserror::Error;

use crate::types::{Task, TaskStatus, UserRole, UserStatus};

/// The user attempting a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: UserRole,
    pub status: UserStatus,
}

impl Actor {
    pub fn new(user_id: i64, role: UserRole, status: UserStatus) -> Self {
        Self {
            user_id,
            role,
            status,
        }
    }
}

/// The parts of a task the rules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRef {
    pub status: TaskStatus,
    pub creator_id: i64,
    pub helper_id: Option<i64>,
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        Self {
            status: task.status,
            creator_id: task.creator_id,
            helper_id: task.helper_id,
        }
    }
}

/// Requested change to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Accept,
    Cancel,
    Complete,
    AdminSet(TaskStatus),
}

impl TaskAction {
    /// Label used for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::AdminSet(_) => "admin_set",
        }
    }
}

/// How the helper column changes alongside the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperChange {
    Keep,
    Set(i64),
    Clear,
}

/// Validated state change, ready to be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TaskStatus,
    /// Helper the plan was made against; part of the compare-and-set.
    pub from_helper: Option<i64>,
    pub to: TaskStatus,
    pub helper: HelperChange,
}

impl Transition {
    /// Helper id after the transition is applied.
    pub fn resulting_helper(&self, current: Option<i64>) -> Option<i64> {
        match self.helper {
            HelperChange::Keep => current,
            HelperChange::Set(id) => Some(id),
            HelperChange::Clear => None,
        }
    }
}

/// Reasons a transition is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("cannot {action} a task that is {from}")]
    InvalidState {
        from: TaskStatus,
        action: &'static str,
    },
    #[error("task is already {0}")]
    SameStatus(TaskStatus),
    #[error("status {0} cannot be requested directly")]
    NotRequestable(TaskStatus),
}

/// Validates `action` by `actor` against `task`.
pub fn plan(task: TaskRef, actor: Actor, action: TaskAction) -> Result<Transition, TransitionError> {
    if matches!(actor.status, UserStatus::Suspended) {
        return Err(TransitionError::Forbidden("account_suspended"));
    }

    match action {
        TaskAction::Accept => {
            if actor.user_id == task.creator_id {
                return Err(TransitionError::Forbidden("creator_cannot_accept"));
            }
            require_status(task, &[TaskStatus::Open], action)?;
            Ok(Transition {
                from: task.status,
                from_helper: task.helper_id,
                to: TaskStatus::Assigned,
                helper: HelperChange::Set(actor.user_id),
            })
        }
        TaskAction::Cancel => {
            if actor.user_id != task.creator_id {
                return Err(TransitionError::Forbidden("only_creator_can_cancel"));
            }
            require_status(task, &[TaskStatus::Open, TaskStatus::Assigned], action)?;
            Ok(Transition {
                from: task.status,
                from_helper: task.helper_id,
                to: TaskStatus::Cancelled,
                helper: HelperChange::Keep,
            })
        }
        TaskAction::Complete => {
            if task.helper_id != Some(actor.user_id) {
                return Err(TransitionError::Forbidden("only_helper_can_complete"));
            }
            require_status(task, &[TaskStatus::Assigned], action)?;
            Ok(Transition {
                from: task.status,
                from_helper: task.helper_id,
                to: TaskStatus::Completed,
                helper: HelperChange::Keep,
            })
        }
        TaskAction::AdminSet(target) => {
            if !actor.role.is_admin() {
                return Err(TransitionError::Forbidden("admin_required"));
            }
            if target == task.status {
                return Err(TransitionError::SameStatus(target));
            }
            let helper = match target {
                TaskStatus::Open => HelperChange::Clear,
                TaskStatus::Assigned if task.helper_id.is_none() => {
                    return Err(TransitionError::InvalidState {
                        from: task.status,
                        action: "assign without a helper",
                    });
                }
                _ => HelperChange::Keep,
            };
            Ok(Transition {
                from: task.status,
                from_helper: task.helper_id,
                to: target,
                helper,
            })
        }
    }
}

/// Maps a status submitted to the generic status endpoint onto a user action.
pub fn action_for_status(target: TaskStatus) -> Result<TaskAction, TransitionError> {
    match target {
        TaskStatus::Assigned => Ok(TaskAction::Accept),
        TaskStatus::Cancelled => Ok(TaskAction::Cancel),
        TaskStatus::Completed => Ok(TaskAction::Complete),
        TaskStatus::Open => Err(TransitionError::NotRequestable(target)),
    }
}

fn require_status(
    task: TaskRef,
    allowed: &[TaskStatus],
    action: TaskAction,
) -> Result<(), TransitionError> {
    if allowed.contains(&task.status) {
        Ok(())
    } else {
        Err(TransitionError::InvalidState {
            from: task.status,
            action: action.as_str(),
        })
    }
}
