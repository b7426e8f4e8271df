//! Approval gate
//!
//! Turns a UI-driven human decision into a single resolution of a pending
//! sign request. The gate holds at most one request; the UI observes it
//! through a `watch` channel and answers with [`ApprovalGate::approve`] or
//! [`ApprovalGate::cancel`]. If neither arrives within the timeout the request
//! resolves as rejected.
//!
//! Exactly one of approve, cancel or timeout wins. Whoever takes the slot
//! delivers the decision; every later call finds the slot empty and is a no-op.

use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::simulator::AssetChange;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApprovalError {
    /// A request is already waiting for the user
    #[error("Approval request {pending_id} is still pending")]
    Busy { pending_id: u64 },
}

impl ApprovalError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Busy { .. } => "busy",
        }
    }
}

/// What the user is asked to approve
#[derive(Debug, Clone)]
pub enum ApprovalPayload {
    Transactions(Vec<VersionedTransaction>),
    Message(Vec<u8>),
}

/// Balance-diff preview shown alongside a transaction request
#[derive(Debug, Clone, Default)]
pub enum SimulationPreview {
    /// No simulator attached, or the payload is not a transaction
    #[default]
    Unavailable,
    Changes(Vec<AssetChange>),
    /// The chain rejected the dry run
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub id: u64,
    pub payload: ApprovalPayload,
    pub preview: SimulationPreview,
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
}

/// What the UI should currently display
#[derive(Debug, Clone, Default)]
pub enum ApprovalView {
    #[default]
    Hidden,
    Pending(Arc<PendingApproval>),
    /// The approved request finished signing
    Completed { id: u64 },
    /// The request ended in rejection or a signing error
    Failed { id: u64, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    TimedOut,
}

impl ApprovalDecision {
    pub fn is_approved(self) -> bool {
        self == Self::Approved
    }
}

/// Completion handle for a resolved request; reports the outcome of the
/// work the decision unlocked back to the UI
#[derive(Debug)]
pub struct ApprovalTicket {
    id: u64,
    view: Arc<watch::Sender<ApprovalView>>,
}

impl ApprovalTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn complete(self) {
        self.view.send_replace(ApprovalView::Completed { id: self.id });
    }

    pub fn fail(self, error: impl Into<String>) {
        self.view.send_replace(ApprovalView::Failed {
            id: self.id,
            error: error.into(),
        });
    }
}

struct Slot {
    id: u64,
    responder: oneshot::Sender<bool>,
}

pub struct ApprovalGate {
    timeout: Duration,
    slot: Mutex<Option<Slot>>,
    view: Arc<watch::Sender<ApprovalView>>,
    next_id: AtomicU64,
}

impl ApprovalGate {
    pub fn new(timeout: Duration) -> Self {
        let (view, _) = watch::channel(ApprovalView::Hidden);
        Self {
            timeout,
            slot: Mutex::new(None),
            view: Arc::new(view),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Observe the display slot
    pub fn subscribe(&self) -> watch::Receiver<ApprovalView> {
        self.view.subscribe()
    }

    /// The request currently waiting for a decision, if any
    pub fn current(&self) -> Option<Arc<PendingApproval>> {
        match &*self.view.borrow() {
            ApprovalView::Pending(pending) => Some(pending.clone()),
            _ => None,
        }
    }

    /// Surface `payload` to the UI and wait for a decision.
    ///
    /// Resolves to `TimedOut` if the user does not answer within the gate's
    /// timeout. Dropping the returned future withdraws the request.
    pub async fn request(
        &self,
        payload: ApprovalPayload,
        preview: SimulationPreview,
        correlation_id: CorrelationId,
    ) -> Result<(ApprovalDecision, ApprovalTicket), ApprovalError> {
        let (responder, mut rx) = oneshot::channel();

        let id = {
            let mut slot = self.slot.lock();
            if let Some(existing) = slot.as_ref() {
                return Err(ApprovalError::Busy {
                    pending_id: existing.id,
                });
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            *slot = Some(Slot { id, responder });
            id
        };

        let _release = scopeguard::guard((), |_| self.release(id));

        let pending = Arc::new(PendingApproval {
            id,
            payload,
            preview,
            correlation_id: correlation_id.clone(),
            created_at: Utc::now(),
        });
        self.view.send_replace(ApprovalView::Pending(pending));
        metrics().pending_approvals.inc();
        let started = Instant::now();
        debug!(approval_id = id, %correlation_id, "Awaiting user approval");

        let outcome = tokio::select! {
            res = &mut rx => Some(res),
            _ = tokio::time::sleep(self.timeout) => None,
        };

        let decision = match outcome {
            Some(Ok(true)) => ApprovalDecision::Approved,
            Some(_) => ApprovalDecision::Rejected,
            None => {
                let expired = self.take_if(id).is_some();
                if expired {
                    ApprovalDecision::TimedOut
                } else {
                    // approve/cancel took the slot as the timer fired; its answer wins
                    match rx.await {
                        Ok(true) => ApprovalDecision::Approved,
                        _ => ApprovalDecision::Rejected,
                    }
                }
            }
        };

        metrics().approval_wait.observe(started.elapsed().as_secs_f64());
        match decision {
            ApprovalDecision::Approved => metrics().approvals_granted.inc(),
            ApprovalDecision::Rejected => metrics().approvals_rejected.inc(),
            ApprovalDecision::TimedOut => metrics().approval_timeouts.inc(),
        }
        info!(approval_id = id, %correlation_id, ?decision, "Approval resolved");

        Ok((
            decision,
            ApprovalTicket {
                id,
                view: self.view.clone(),
            },
        ))
    }

    /// Approve the pending request. Returns `false` if nothing was pending.
    pub fn approve(&self) -> bool {
        self.resolve(true)
    }

    /// Reject the pending request. Returns `false` if nothing was pending.
    pub fn cancel(&self) -> bool {
        self.resolve(false)
    }

    fn resolve(&self, approved: bool) -> bool {
        let slot = self.slot.lock().take();
        match slot {
            Some(slot) => {
                // The receiver only disappears if the request was withdrawn
                let _ = slot.responder.send(approved);
                true
            }
            None => false,
        }
    }

    fn take_if(&self, id: u64) -> Option<Slot> {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|s| s.id) == Some(id) {
            slot.take()
        } else {
            None
        }
    }

    /// Clear whatever is left of request `id`: its slot and its display
    fn release(&self, id: u64) {
        self.take_if(id);
        self.view.send_if_modified(|view| match view {
            ApprovalView::Pending(p) if p.id == id => {
                *view = ApprovalView::Hidden;
                true
            }
            _ => false,
        });
        metrics().pending_approvals.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_payload() -> ApprovalPayload {
        ApprovalPayload::Message(b"hello".to_vec())
    }

    async fn wait_pending(gate: &ApprovalGate) -> u64 {
        let mut rx = gate.subscribe();
        let view = rx
            .wait_for(|v| matches!(v, ApprovalView::Pending(_)))
            .await
            .unwrap()
            .clone();
        match view {
            ApprovalView::Pending(p) => p.id,
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_resolves_once() {
        let gate = Arc::new(ApprovalGate::new(Duration::from_secs(60)));

        let g = gate.clone();
        let task = tokio::spawn(async move {
            g.request(message_payload(), SimulationPreview::Unavailable, CorrelationId::new())
                .await
        });

        wait_pending(&gate).await;
        assert!(gate.approve());
        assert!(!gate.approve(), "second approve is a no-op");
        assert!(!gate.cancel(), "cancel after approve is a no-op");

        let (decision, ticket) = task.await.unwrap().unwrap();
        assert_eq!(decision, ApprovalDecision::Approved);
        assert!(matches!(*gate.subscribe().borrow(), ApprovalView::Hidden));

        let id = ticket.id();
        ticket.complete();
        assert!(matches!(
            *gate.subscribe().borrow(),
            ApprovalView::Completed { id: done } if done == id
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_rejects() {
        let gate = Arc::new(ApprovalGate::new(Duration::from_secs(60)));

        let g = gate.clone();
        let task = tokio::spawn(async move {
            g.request(message_payload(), SimulationPreview::Unavailable, CorrelationId::new())
                .await
        });

        wait_pending(&gate).await;
        assert!(gate.cancel());

        let (decision, ticket) = task.await.unwrap().unwrap();
        assert_eq!(decision, ApprovalDecision::Rejected);
        ticket.fail("User rejected the request");
        assert!(matches!(
            *gate.subscribe().borrow(),
            ApprovalView::Failed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_auto_rejects_after_window() {
        let gate = Arc::new(ApprovalGate::new(Duration::from_secs(60)));
        let started = tokio::time::Instant::now();

        let (decision, _) = gate
            .request(message_payload(), SimulationPreview::Unavailable, CorrelationId::new())
            .await
            .unwrap();

        assert_eq!(decision, ApprovalDecision::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert!(!gate.approve(), "late approve is a no-op");
        assert!(gate.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_while_pending_is_busy() {
        let gate = Arc::new(ApprovalGate::new(Duration::from_secs(60)));

        let g = gate.clone();
        let first = tokio::spawn(async move {
            g.request(message_payload(), SimulationPreview::Unavailable, CorrelationId::new())
                .await
        });
        let pending_id = wait_pending(&gate).await;

        let second = gate
            .request(message_payload(), SimulationPreview::Unavailable, CorrelationId::new())
            .await;
        assert_eq!(second.unwrap_err(), ApprovalError::Busy { pending_id });

        gate.cancel();
        first.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_frees_the_slot() {
        let gate = Arc::new(ApprovalGate::new(Duration::from_secs(60)));

        let g = gate.clone();
        let task = tokio::spawn(async move {
            g.request(message_payload(), SimulationPreview::Unavailable, CorrelationId::new())
                .await
        });
        wait_pending(&gate).await;

        task.abort();
        let _ = task.await;

        assert!(gate.current().is_none());
        assert!(!gate.approve());

        let g = gate.clone();
        let retry = tokio::spawn(async move {
            g.request(message_payload(), SimulationPreview::Unavailable, CorrelationId::new())
                .await
        });
        wait_pending(&gate).await;
        gate.approve();
        let (decision, _) = retry.await.unwrap().unwrap();
        assert!(decision.is_approved());
    }
}
