//! Approvals and their state machine.

use crate::action::ActionRequest;
use crate::error::CoreError;
use crate::event::ActorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an approval.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Approval lifecycle. The only transitions are
/// `pending -> approved | denied | expired`; terminal states are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ApprovalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalState::Pending => "pending",
            ApprovalState::Approved => "approved",
            ApprovalState::Denied => "denied",
            ApprovalState::Expired => "expired",
        }
    }
}

/// A pending or settled approval for an action request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub request: ActionRequest,
    pub state: ApprovalState,
    pub requester: ActorId,
    pub approver: Option<ActorId>,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_rationale: Option<String>,
}

impl Approval {
    pub fn new(request: ActionRequest, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: ApprovalId::generate(),
            requester: request.actor.clone(),
            request,
            state: ApprovalState::Pending,
            approver: None,
            requested_at: Utc::now(),
            expires_at,
            decided_at: None,
            decision_rationale: None,
        }
    }

    /// Expiry exactly at the deadline counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.state == ApprovalState::Pending && now >= self.expires_at
    }

    pub fn approve(
        &mut self,
        approver: ActorId,
        rationale: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.settle(ApprovalState::Approved, Some(approver), rationale.into())
    }

    pub fn deny(
        &mut self,
        approver: ActorId,
        rationale: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.settle(ApprovalState::Denied, Some(approver), rationale.into())
    }

    pub fn expire(&mut self) -> Result<(), CoreError> {
        self.settle(ApprovalState::Expired, None, "expired".to_string())
    }

    fn settle(
        &mut self,
        next: ApprovalState,
        approver: Option<ActorId>,
        rationale: String,
    ) -> Result<(), CoreError> {
        if self.state.is_terminal() {
            return Err(CoreError::internal(format!(
                "approval {} is {} and cannot transition to {}",
                self.id,
                self.state.as_str(),
                next.as_str()
            )));
        }
        self.state = next;
        self.approver = approver;
        self.decided_at = Some(Utc::now());
        self.decision_rationale = Some(rationale);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, RiskTier};
    use chrono::Duration;

    fn pending() -> Approval {
        let request = ActionRequest::new(
            ActorId::system(),
            ActionKind::new("apply_code_patch"),
            "src/a.py",
            RiskTier::Medium,
        );
        Approval::new(request, Utc::now() + Duration::minutes(30))
    }

    #[test]
    fn approve_settles_once() {
        let mut a = pending();
        a.approve(ActorId::new("operator"), "looks safe").unwrap();
        assert_eq!(a.state, ApprovalState::Approved);
        assert!(a.decided_at.is_some());

        let err = a.deny(ActorId::new("operator"), "changed my mind");
        assert!(err.is_err());
        assert_eq!(a.state, ApprovalState::Approved);
    }

    #[test]
    fn expiry_at_exact_deadline_counts() {
        let mut a = pending();
        a.expires_at = Utc::now() - Duration::seconds(0);
        assert!(a.is_expired_at(a.expires_at));
        a.expire().unwrap();
        assert_eq!(a.state, ApprovalState::Expired);
    }

    #[test]
    fn terminal_states_do_not_expire() {
        let mut a = pending();
        a.deny(ActorId::new("operator"), "no").unwrap();
        assert!(!a.is_expired_at(Utc::now() + Duration::hours(2)));
        assert!(a.expire().is_err());
    }
}
