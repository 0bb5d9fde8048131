//! Visibility and permission computation
//!
//! Pure function from (relationship facts, agenda level) to view/vote/comment
//! permissions. Never cached: a single score update can change the answer for
//! every current viewer, so every read recomputes from the stored level.

use serde::{Deserialize, Serialize};

use crate::engine::levels::AgendaLevel;

/// Relationship facts between a viewer and a voice, derived by the
/// organization directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerFacts {
    pub same_department: bool,
    pub same_facility: bool,
    pub same_corporation: bool,
    /// Viewer holds a manager-or-above organizational tier
    pub is_manager: bool,
}

/// Computed permissions for one viewer/voice pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_view: bool,
    pub can_vote: bool,
    pub can_comment: bool,
    pub scope_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restriction_reason: Option<String>,
}

/// Compute permissions for a viewer against a voice at the given level
pub fn permissions(level: AgendaLevel, facts: ViewerFacts) -> Permissions {
    match level {
        AgendaLevel::Pending => {
            if facts.same_department {
                Permissions::granted(
                    "Visible to the proposing department",
                    true,
                    true,
                    true,
                )
            } else if facts.same_facility && facts.is_manager {
                Permissions::view_only(
                    "Visible to the proposing department; facility managers may observe",
                    "Only members of the proposing department may vote or comment while pending",
                )
            } else {
                Permissions::denied(
                    "Visible to the proposing department",
                    "Pending voices are visible only within their department",
                )
            }
        }
        AgendaLevel::DeptReview | AgendaLevel::DeptAgenda => {
            if facts.same_department {
                Permissions::granted(
                    "Open to the department; facility managers may observe",
                    true,
                    true,
                    true,
                )
            } else if facts.same_facility && facts.is_manager {
                Permissions::view_only(
                    "Open to the department; facility managers may observe",
                    "Voting and commenting stay within the proposing department at this level",
                )
            } else {
                Permissions::denied(
                    "Open to the department; facility managers may observe",
                    "Department-level voices are not visible outside the department",
                )
            }
        }
        AgendaLevel::FacilityAgenda => {
            if !facts.same_corporation {
                return Permissions::denied(
                    "Open to the whole corporation for viewing; the facility votes",
                    "Viewer is outside the corporation",
                );
            }
            if facts.same_facility {
                Permissions::granted(
                    "Open to the whole corporation for viewing; the facility votes",
                    true,
                    true,
                    true,
                )
            } else {
                Permissions::view_only(
                    "Open to the whole corporation for viewing; the facility votes",
                    "Voting and commenting are reserved for the proposing facility",
                )
            }
        }
        AgendaLevel::CorpReview | AgendaLevel::CorpAgenda => {
            if facts.same_corporation {
                Permissions::granted(
                    "Open to everyone in the corporation",
                    true,
                    true,
                    true,
                )
            } else {
                Permissions::denied(
                    "Open to everyone in the corporation",
                    "Viewer is outside the corporation",
                )
            }
        }
    }
}

impl Permissions {
    fn granted(scope: &str, view: bool, vote: bool, comment: bool) -> Self {
        Self {
            can_view: view,
            can_vote: vote,
            can_comment: comment,
            scope_description: scope.to_string(),
            restriction_reason: None,
        }
    }

    fn view_only(scope: &str, reason: &str) -> Self {
        Self {
            can_view: true,
            can_vote: false,
            can_comment: false,
            scope_description: scope.to_string(),
            restriction_reason: Some(reason.to_string()),
        }
    }

    fn denied(scope: &str, reason: &str) -> Self {
        Self {
            can_view: false,
            can_vote: false,
            can_comment: false,
            scope_description: scope.to_string(),
            restriction_reason: Some(reason.to_string()),
        }
    }
}
