//! Recording host collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use vellum_gc::{ConfirmRequest, Confirmer, HashCache, Notifier};

/// Keeps every notice.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.notices.lock().last().cloned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.notices.lock().iter().any(|n| n.contains(needle))
    }
}

impl Notifier for RecordingNotifier {
    fn notice(&self, message: &str) {
        self.notices.lock().push(message.to_string());
    }
}

/// Gives a fixed answer and keeps every request.
pub struct ScriptedConfirmer {
    answer: bool,
    requests: Mutex<Vec<ConfirmRequest>>,
}

#[allow(dead_code)]
impl ScriptedConfirmer {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ConfirmRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: &ConfirmRequest) -> bool {
        self.requests.lock().push(request.clone());
        self.answer
    }
}

#[derive(Default)]
pub struct CountingHashCache {
    clears: AtomicUsize,
}

#[allow(dead_code)]
impl CountingHashCache {
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl HashCache for CountingHashCache {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}
