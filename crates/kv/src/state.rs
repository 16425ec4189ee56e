//! Handle lifecycle state machine.
//!
//! ```text
//! Unopened ──open──▶ Opening ──ok──▶ Ready ──close──▶ Closed
//!    ▲                  │              │ │               │
//!    └──────failed──────┘              │ └─VersionChange─▶ Blocked ──▶ Closed
//!    └────────── Terminated ◀─terminated┘
//! any (not destroyed) ──destroy──▶ Destroying ──▶ Destroyed
//! ```
//!
//! `Closed`, `Unopened` and `Terminated` reopen lazily. `Destroyed` is terminal.

use crate::error::{KvError, KvResult};
use crate::traits::{Connection, ConnectionEvent, ConnectionObserver};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Observable lifecycle status of a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleStatus {
    Unopened,
    Opening,
    Ready,
    Blocked,
    Closed,
    Terminated,
    Destroying,
    Destroyed,
}

enum HandleState {
    Unopened,
    Opening { closed_while_opening: bool },
    Ready(Arc<dyn Connection>),
    Blocked,
    Closed,
    Terminated,
    Destroying,
    Destroyed,
}

impl HandleState {
    fn status(&self) -> HandleStatus {
        match self {
            Self::Unopened => HandleStatus::Unopened,
            Self::Opening { .. } => HandleStatus::Opening,
            Self::Ready(_) => HandleStatus::Ready,
            Self::Blocked => HandleStatus::Blocked,
            Self::Closed => HandleStatus::Closed,
            Self::Terminated => HandleStatus::Terminated,
            Self::Destroying => HandleStatus::Destroying,
            Self::Destroyed => HandleStatus::Destroyed,
        }
    }
}

fn same_connection(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Lifecycle of one handle. The lock is never held across an await point.
pub(crate) struct Lifecycle {
    name: String,
    state: Mutex<HandleState>,
    destroyed: watch::Sender<bool>,
}

impl Lifecycle {
    pub(crate) fn new(name: &str) -> Self {
        let (destroyed, _) = watch::channel(false);
        Self {
            name: name.to_string(),
            state: Mutex::new(HandleState::Unopened),
            destroyed,
        }
    }

    fn set(&self, state: &mut HandleState, next: HandleState) {
        tracing::debug!(
            db = %self.name,
            from = ?state.status(),
            to = ?next.status(),
            "handle transition"
        );
        *state = next;
    }

    fn destroyed_error(&self) -> KvError {
        KvError::DatabaseDestroyed(self.name.clone())
    }

    pub(crate) fn status(&self) -> HandleStatus {
        self.state.lock().status()
    }

    /// The live connection, if ready. Fails fast once destruction started.
    pub(crate) fn ready(&self) -> KvResult<Option<Arc<dyn Connection>>> {
        match &*self.state.lock() {
            HandleState::Ready(conn) => Ok(Some(conn.clone())),
            HandleState::Destroying | HandleState::Destroyed => Err(self.destroyed_error()),
            _ => Ok(None),
        }
    }

    pub(crate) fn begin_open(&self) -> KvResult<()> {
        let mut state = self.state.lock();
        match &*state {
            HandleState::Destroying | HandleState::Destroyed => Err(self.destroyed_error()),
            HandleState::Ready(_) | HandleState::Opening { .. } => Ok(()),
            _ => {
                self.set(
                    &mut state,
                    HandleState::Opening {
                        closed_while_opening: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// Finish an open. Fails if a version change arrived before the handle
    /// became ready; the connection is closed in that case.
    pub(crate) fn opened(&self, conn: Arc<dyn Connection>) -> KvResult<()> {
        let mut state = self.state.lock();
        match &*state {
            HandleState::Opening {
                closed_while_opening: true,
            } => {
                self.set(&mut state, HandleState::Closed);
                drop(state);
                conn.close();
                Err(KvError::ConnectionClosed(self.name.clone()))
            }
            _ => {
                self.set(&mut state, HandleState::Ready(conn));
                Ok(())
            }
        }
    }

    pub(crate) fn open_failed(&self) {
        let mut state = self.state.lock();
        if matches!(&*state, HandleState::Opening { .. }) {
            self.set(&mut state, HandleState::Unopened);
        }
    }

    /// Ready → Blocked → Closed. Returns the connection to close.
    fn version_change(&self) -> Option<Arc<dyn Connection>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, HandleState::Blocked) {
            HandleState::Ready(conn) => {
                tracing::debug!(db = %self.name, from = ?HandleStatus::Ready, to = ?HandleStatus::Blocked, "handle transition");
                self.set(&mut state, HandleState::Closed);
                Some(conn)
            }
            HandleState::Opening { .. } => {
                *state = HandleState::Opening {
                    closed_while_opening: true,
                };
                None
            }
            other => {
                *state = other;
                None
            }
        }
    }

    /// Ready → Terminated → Unopened.
    fn terminated(&self) {
        let mut state = self.state.lock();
        if matches!(&*state, HandleState::Ready(_)) {
            self.set(&mut state, HandleState::Terminated);
            self.set(&mut state, HandleState::Unopened);
        }
    }

    /// Forget `conn` after it failed, so the next operation reopens.
    pub(crate) fn discard(&self, conn: &Arc<dyn Connection>) {
        let mut state = self.state.lock();
        if let HandleState::Ready(current) = &*state
            && same_connection(current, conn)
        {
            self.set(&mut state, HandleState::Unopened);
        }
    }

    /// Ready → Closed. Returns the connection to close. A close during an
    /// open makes that open close its connection instead of becoming ready.
    pub(crate) fn close(&self) -> Option<Arc<dyn Connection>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, HandleState::Closed) {
            HandleState::Ready(conn) => {
                tracing::debug!(db = %self.name, from = ?HandleStatus::Ready, to = ?HandleStatus::Closed, "handle transition");
                Some(conn)
            }
            HandleState::Opening { .. } => {
                *state = HandleState::Opening {
                    closed_while_opening: true,
                };
                None
            }
            HandleState::Unopened | HandleState::Terminated | HandleState::Closed => None,
            other => {
                *state = other;
                None
            }
        }
    }

    /// Enter Destroying. Returns the connection to close, or an error if the
    /// handle is already destroyed.
    pub(crate) fn begin_destroy(&self) -> KvResult<Option<Arc<dyn Connection>>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, HandleState::Destroying) {
            other @ (HandleState::Destroying | HandleState::Destroyed) => {
                *state = other;
                Err(self.destroyed_error())
            }
            HandleState::Ready(conn) => {
                tracing::debug!(db = %self.name, from = ?HandleStatus::Ready, to = ?HandleStatus::Destroying, "handle transition");
                Ok(Some(conn))
            }
            other => {
                tracing::debug!(db = %self.name, from = ?other.status(), to = ?HandleStatus::Destroying, "handle transition");
                Ok(None)
            }
        }
    }

    pub(crate) fn finish_destroy(&self) {
        let mut state = self.state.lock();
        self.set(&mut state, HandleState::Destroyed);
        drop(state);
        self.destroyed.send_replace(true);
    }

    /// Resolve once destruction has completed.
    pub(crate) async fn wait_destroyed(&self) {
        let mut rx = self.destroyed.subscribe();
        // The sender lives as long as self, so this only ends on `true`.
        let _ = rx.wait_for(|destroyed| *destroyed).await;
    }
}

/// Routes engine events to a handle's lifecycle.
pub(crate) struct LifecycleObserver {
    lifecycle: Weak<Lifecycle>,
}

impl LifecycleObserver {
    pub(crate) fn new(lifecycle: &Arc<Lifecycle>) -> Self {
        Self {
            lifecycle: Arc::downgrade(lifecycle),
        }
    }
}

impl ConnectionObserver for LifecycleObserver {
    fn on_event(&self, name: &str, event: ConnectionEvent) {
        let Some(lifecycle) = self.lifecycle.upgrade() else {
            return;
        };
        match event {
            ConnectionEvent::VersionChange => {
                tracing::debug!(db = name, "version change requested, closing stale connection");
                if let Some(conn) = lifecycle.version_change() {
                    conn.close();
                }
            }
            ConnectionEvent::Terminated => {
                tracing::debug!(db = name, "connection terminated by engine");
                lifecycle.terminated();
            }
        }
    }
}
