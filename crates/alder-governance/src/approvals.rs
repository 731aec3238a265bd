//! The approval queue. All mutation happens under one lock, per the
//! concurrency contract; replay from the audit stream rebuilds the queue
//! after a restart.

use crate::GovernanceError;
use alder_audit::AuditEntry;
use alder_types::{event_types, Approval, ApprovalId, ApprovalState, RiskTier};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// FIFO-by-priority store of approvals.
#[derive(Default)]
pub struct ApprovalQueue {
    inner: Mutex<HashMap<String, Approval>>,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, approval: Approval) {
        let mut inner = self.inner.lock().expect("approval store poisoned");
        inner.insert(approval.id.0.clone(), approval);
    }

    pub fn get(&self, id: &ApprovalId) -> Option<Approval> {
        let inner = self.inner.lock().expect("approval store poisoned");
        inner.get(&id.0).cloned()
    }

    /// Pending approvals, highest risk tier first, FIFO within a tier.
    pub fn pending(&self) -> Vec<Approval> {
        let inner = self.inner.lock().expect("approval store poisoned");
        let mut pending: Vec<Approval> = inner
            .values()
            .filter(|a| a.state == ApprovalState::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.request
                .risk_tier
                .cmp(&a.request.risk_tier)
                .then(a.requested_at.cmp(&b.requested_at))
        });
        pending
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("approval store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a settle function to a pending approval and return the
    /// updated record.
    pub fn settle<F>(&self, id: &ApprovalId, settle: F) -> Result<Approval, GovernanceError>
    where
        F: FnOnce(&mut Approval) -> Result<(), alder_types::CoreError>,
    {
        let mut inner = self.inner.lock().expect("approval store poisoned");
        let approval = inner
            .get_mut(&id.0)
            .ok_or_else(|| GovernanceError::UnknownApproval(id.0.clone()))?;
        if approval.state.is_terminal() {
            return Err(GovernanceError::NotPending {
                id: id.0.clone(),
                state: approval.state.as_str().to_string(),
            });
        }
        settle(approval).map_err(|e| GovernanceError::NotPending {
            id: id.0.clone(),
            state: e.to_string(),
        })?;
        Ok(approval.clone())
    }

    /// Transition every pending approval whose deadline has passed (the
    /// deadline itself counts) and return them.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<Approval> {
        let mut inner = self.inner.lock().expect("approval store poisoned");
        let mut expired = Vec::new();
        for approval in inner.values_mut() {
            if approval.is_expired_at(now) && approval.expire().is_ok() {
                expired.push(approval.clone());
            }
        }
        expired
    }

    /// Rebuild queue state from `approval.*` audit events. Later events win;
    /// the stream's order is the queue's history.
    pub fn replay(&self, entries: &[AuditEntry]) {
        let mut inner = self.inner.lock().expect("approval store poisoned");
        inner.clear();
        for entry in entries {
            let event = &entry.event;
            match event.event_type.as_str() {
                event_types::APPROVAL_REQUESTED => {
                    if let Ok(approval) =
                        serde_json::from_value::<Approval>(event.payload["approval"].clone())
                    {
                        inner.insert(approval.id.0.clone(), approval);
                    }
                }
                event_types::APPROVAL_GRANTED
                | event_types::APPROVAL_DENIED
                | event_types::APPROVAL_EXPIRED => {
                    if let Ok(approval) =
                        serde_json::from_value::<Approval>(event.payload["approval"].clone())
                    {
                        inner.insert(approval.id.0.clone(), approval);
                    }
                }
                _ => {}
            }
        }
        let pending = inner
            .values()
            .filter(|a| a.state == ApprovalState::Pending)
            .count();
        tracing::info!(total = inner.len(), pending, "approval queue rebuilt from audit stream");
    }

    /// Count of pending approvals at or above a risk tier.
    pub fn pending_at_or_above(&self, tier: RiskTier) -> usize {
        self.pending()
            .into_iter()
            .filter(|a| a.request.risk_tier >= tier)
            .count()
    }
}
