//! Human-in-the-loop confirmation
//!
//! The executor asks a [`Confirmer`] before running risky actions. Every
//! request is answered exactly once; an unanswered request counts as a
//! decline once the caller tears down.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// How dangerous an action is, as judged by the validator or the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Root,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Root => write!(f, "root"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationRequest {
    pub tool_name: String,
    pub reason: String,
    pub details: String,
    pub risk: RiskLevel,
}

#[async_trait]
pub trait Confirmer: Send + Sync {
    /// `true` approves the action
    async fn confirm(&self, request: ConfirmationRequest) -> bool;
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl Confirmer for AutoApprove {
    async fn confirm(&self, _request: ConfirmationRequest) -> bool {
        true
    }
}

/// Declines everything; used where no human is attached
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecline;

#[async_trait]
impl Confirmer for AutoDecline {
    async fn confirm(&self, _request: ConfirmationRequest) -> bool {
        false
    }
}

/// A confirmation waiting for its answer
#[derive(Debug)]
pub struct PendingConfirmation {
    pub request: ConfirmationRequest,
    responder: oneshot::Sender<bool>,
}

impl PendingConfirmation {
    /// Answer the request. Consumes `self`, so it can only happen once.
    pub fn respond(self, approved: bool) {
        let _ = self.responder.send(approved);
    }
}

/// Forwards requests to whoever holds the receiving end (a UI, the CLI).
/// Dropping a [`PendingConfirmation`] unanswered declines it.
#[derive(Debug, Clone)]
pub struct ChannelConfirmer {
    tx: mpsc::UnboundedSender<PendingConfirmation>,
}

impl ChannelConfirmer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingConfirmation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Confirmer for ChannelConfirmer {
    async fn confirm(&self, request: ConfirmationRequest) -> bool {
        let (responder, answer) = oneshot::channel();
        if self
            .tx
            .send(PendingConfirmation { request, responder })
            .is_err()
        {
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConfirmationRequest {
        ConfirmationRequest {
            tool_name: "delete_file".to_string(),
            reason: "permanent delete".to_string(),
            details: "path: a.txt".to_string(),
            risk: RiskLevel::High,
        }
    }

    #[tokio::test]
    async fn test_channel_confirmer_round_trip() {
        let (confirmer, mut rx) = ChannelConfirmer::new();
        let ui = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.request.tool_name, "delete_file");
            pending.respond(true);
        });
        assert!(confirmer.confirm(request()).await);
        ui.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_request_declines() {
        let (confirmer, mut rx) = ChannelConfirmer::new();
        let ui = tokio::spawn(async move {
            drop(rx.recv().await);
        });
        assert!(!confirmer.confirm(request()).await);
        ui.await.unwrap();

        let (confirmer, rx) = ChannelConfirmer::new();
        drop(rx);
        assert!(!confirmer.confirm(request()).await);
    }

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Root > RiskLevel::High);
        assert!(RiskLevel::Low < RiskLevel::Medium);
    }
}
