//! Notification dispatch
//!
//! Fire-and-forget fan-out to the audience a decision affects. Delivery to
//! the external HR system is a collaborator behind this seam; the engine
//! only needs the success/failure counts back for its result reporting, and
//! a delivery failure never rolls back the decision that triggered it.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::voice::{AudienceScope, DecisionRecord, Voice};

/// Counts reported back to the engine after a fan-out
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOutcome {
    pub sent: u32,
    pub failed: u32,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(
        &self,
        scope: AudienceScope,
        voice: &Voice,
        decision: &DecisionRecord,
    ) -> NotificationOutcome;
}

/// Dispatcher that records the fan-out in the structured log. Stands in for
/// the HR-system webhook collaborator.
#[derive(Default)]
pub struct LoggingDispatcher;

impl LoggingDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn notify(
        &self,
        scope: AudienceScope,
        voice: &Voice,
        decision: &DecisionRecord,
    ) -> NotificationOutcome {
        let audience = match scope {
            AudienceScope::Department => voice.department.as_str(),
            AudienceScope::Facility => voice.facility.as_str(),
            AudienceScope::Corporation => voice.corporation.as_str(),
        };
        info!(
            voice = %voice.id,
            decision = decision.decision.as_str(),
            scope = scope.as_str(),
            audience,
            "📣 Decision notification dispatched"
        );
        NotificationOutcome { sent: 1, failed: 0 }
    }
}
