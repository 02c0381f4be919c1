//! The single declarative source for allowed state transitions.
//!
//! Every lifecycle action names a [`TransitionRule`] from this module; the
//! repository's conditional-update builder turns the rule's allowed-from
//! set into the `status IN (…)` guard, so validation and the race-safe
//! UPDATE can never drift apart.

use crate::types::{ProjectState, TaskStatus};

/// A target status together with the statuses it may be entered from.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub to: TaskStatus,
    pub allowed_from: &'static [TaskStatus],
}

use TaskStatus::*;

/// `task_start`: begin (or resume) implementation.
pub const START: TransitionRule = TransitionRule {
    to: Implementing,
    allowed_from: &[Requirements, ChangesRequested],
};

/// `task_request_review` when human review is required.
pub const REQUEST_REVIEW: TransitionRule = TransitionRule {
    to: ReviewRequested,
    allowed_from: &[Implementing, ChangesRequested],
};

/// Auto-promotion used when the task does not require human review.
pub const AUTO_APPROVE: TransitionRule = TransitionRule {
    to: Approved,
    allowed_from: &[Implementing, ChangesRequested],
};

/// `task_approve` for a review-gated task.
pub const APPROVE: TransitionRule = TransitionRule {
    to: Approved,
    allowed_from: &[ReviewRequested],
};

/// `task_approve` when the task does not require human review.
pub const APPROVE_UNREVIEWED: TransitionRule = TransitionRule {
    to: Approved,
    allowed_from: &[ReviewRequested, Implementing, ChangesRequested],
};

/// `task_request_changes`.
pub const REQUEST_CHANGES: TransitionRule = TransitionRule {
    to: ChangesRequested,
    allowed_from: &[ReviewRequested],
};

/// `task_merge` entering the actual git merge. `merging` itself is
/// tolerated so a retry after `task_resolve_conflict` can re-enter.
pub const BEGIN_MERGE: TransitionRule = TransitionRule {
    to: Merging,
    allowed_from: &[Approved, MergeConflict, Merging],
};

/// Conflict detected while merging.
pub const MARK_CONFLICT: TransitionRule = TransitionRule {
    to: MergeConflict,
    allowed_from: &[Merging],
};

/// `task_resolve_conflict`: back to merging for a retry.
pub const RESOLVE_CONFLICT: TransitionRule = TransitionRule {
    to: Merging,
    allowed_from: &[MergeConflict],
};

/// Post-merge advance into the build step.
pub const ADVANCE_TO_BUILD: TransitionRule = TransitionRule {
    to: Building,
    allowed_from: &[Merging],
};

/// Post-merge advance straight into the deploy step.
pub const ADVANCE_TO_DEPLOY: TransitionRule = TransitionRule {
    to: Deploying,
    allowed_from: &[Merging],
};

/// Post-merge finish with no build or deploy step configured.
pub const ADVANCE_TO_DONE: TransitionRule = TransitionRule {
    to: Done,
    allowed_from: &[Merging],
};

/// `task_merge` on a non-branching task, advancing into the build step.
pub const SKIP_MERGE_TO_BUILD: TransitionRule = TransitionRule {
    to: Building,
    allowed_from: &[Approved, Implementing],
};

/// `task_merge` on a non-branching task, advancing into the deploy step.
pub const SKIP_MERGE_TO_DEPLOY: TransitionRule = TransitionRule {
    to: Deploying,
    allowed_from: &[Approved, Implementing],
};

/// `task_build` completing the build step.
pub const BUILD_TO_DEPLOY: TransitionRule = TransitionRule {
    to: Deploying,
    allowed_from: &[Building, Merging, Approved],
};

/// `task_build` when no deploy step is configured.
pub const BUILD_TO_DONE: TransitionRule = TransitionRule {
    to: Done,
    allowed_from: &[Building, Merging, Approved],
};

/// `task_deploy`.
pub const DEPLOY: TransitionRule = TransitionRule {
    to: Done,
    allowed_from: &[Deploying, Building, Merging, Approved],
};

/// `task_complete`: force-finish from any live state.
pub const COMPLETE: TransitionRule = TransitionRule {
    to: Done,
    allowed_from: &[
        Requirements,
        Implementing,
        ReviewRequested,
        ChangesRequested,
        Approved,
        Merging,
        MergeConflict,
        Building,
        Deploying,
        Blocked,
    ],
};

/// `task_cancel`: allowed from every status except `cancelled` itself,
/// including `done`.
pub const CANCEL: TransitionRule = TransitionRule {
    to: Cancelled,
    allowed_from: &[
        Requirements,
        Implementing,
        ReviewRequested,
        ChangesRequested,
        Approved,
        Merging,
        MergeConflict,
        Building,
        Deploying,
        Done,
        Blocked,
    ],
};

/// `task_block`: any non-terminal, non-blocked status may be blocked.
/// Blocking a blocked task would clobber `status_before_blocked`.
pub const BLOCK: TransitionRule = TransitionRule {
    to: Blocked,
    allowed_from: &[
        Requirements,
        Implementing,
        ReviewRequested,
        ChangesRequested,
        Approved,
        Merging,
        MergeConflict,
        Building,
        Deploying,
    ],
};

/// Statuses eligible for `task_next` selection.
pub const NEXT_ELIGIBLE: &[TaskStatus] = &[
    Requirements,
    Implementing,
    ChangesRequested,
    ReviewRequested,
    Approved,
    MergeConflict,
];

/// Allowed project state transitions as `(from, to)` pairs.
const PROJECT_TRANSITIONS: &[(ProjectState, ProjectState)] = &[
    (ProjectState::Planning, ProjectState::Active),
    (ProjectState::Active, ProjectState::Paused),
    (ProjectState::Active, ProjectState::Complete),
    (ProjectState::Paused, ProjectState::Active),
    (ProjectState::Paused, ProjectState::Archived),
    (ProjectState::Complete, ProjectState::Archived),
    (ProjectState::Archived, ProjectState::Active),
];

/// Whether a project may move from `from` to `to`.
#[must_use]
pub fn project_transition_allowed(from: ProjectState, to: ProjectState) -> bool {
    PROJECT_TRANSITIONS.iter().any(|&(f, t)| f == from && t == to)
}
