//! Single-flight gate for heavy persistence jobs
//!
//! At most one of SAVE, BGSAVE and BGREWRITEAOF runs at a time. The holder
//! gets a guard; dropping it, on success, failure or panic unwinding, puts the
//! gate back to idle.

use crate::error::{PersistError, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// The kind of job holding the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Save,
    BgSave,
    Rewrite,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Save => write!(f, "Save"),
            JobKind::BgSave => write!(f, "Background save"),
            JobKind::Rewrite => write!(f, "Background append only file rewriting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Running(JobKind),
}

/// Shared gate; clones refer to the same state
#[derive(Clone)]
pub struct PersistenceGate {
    state: Arc<watch::Sender<GateState>>,
}

impl Default for PersistenceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Idle);
        PersistenceGate {
            state: Arc::new(state),
        }
    }

    /// Take the gate for `kind`, or fail naming the job that holds it
    pub fn try_acquire(&self, kind: JobKind) -> Result<GateGuard> {
        let mut holder = None;
        let acquired = self.state.send_if_modified(|state| match *state {
            GateState::Idle => {
                *state = GateState::Running(kind);
                true
            }
            GateState::Running(running) => {
                holder = Some(running);
                false
            }
        });

        if acquired {
            return Ok(GateGuard {
                state: Arc::clone(&self.state),
                kind,
            });
        }
        let running = holder.unwrap_or(kind);
        debug!("{} rejected: {} already in progress", kind, running);
        Err(PersistError::InProgress(running))
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    /// The running job, if any
    pub fn running(&self) -> Option<JobKind> {
        match self.state() {
            GateState::Idle => None,
            GateState::Running(kind) => Some(kind),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state() == GateState::Idle
    }

    /// Resolve once no job holds the gate
    pub async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == GateState::Idle).await;
    }
}

/// Proof of holding the gate; releases it when dropped
#[derive(Debug)]
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard {
    state: Arc<watch::Sender<GateState>>,
    kind: JobKind,
}

impl GateGuard {
    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.state.send_replace(GateState::Idle);
    }
}
