//! Collaborators provided by the host application.

use crate::plan::GcAction;
use async_trait::async_trait;

/// A question put to the user before a collection pass writes anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub action: GcAction,
    pub title: String,
    pub message: String,
}

/// Interactive confirmation dialog.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Whether the user accepted.
    async fn confirm(&self, request: &ConfirmRequest) -> bool;
}

/// Accepts every request.
pub struct AutoConfirm;

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, request: &ConfirmRequest) -> bool {
        tracing::debug!(action = %request.action, "confirmation skipped");
        true
    }
}

/// User-facing notice channel.
pub trait Notifier: Send + Sync {
    fn notice(&self, message: &str);
}

/// Sends notices to the log.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notice(&self, message: &str) {
        tracing::info!(target: "vellum::notice", "{message}");
    }
}

/// Cache of derived chunk hashes, stale after any chunk write.
pub trait HashCache: Send + Sync {
    fn clear(&self);
}

pub struct NoHashCache;

impl HashCache for NoHashCache {
    fn clear(&self) {}
}
