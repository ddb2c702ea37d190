//! Work-unit progress monitor with cooperative cancellation
//!
//! A monitor tracks `worked / total` units for one operation. Sub-monitors
//! own a slice of their parent's units: as the child advances through its own
//! total, the proportional share is forwarded to the parent. Every monitor in
//! a tree shares one [`CancellationToken`].

use std::sync::{Arc, Mutex, PoisonError};

use fman_errors::InstallError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{AppEvent, EventEmitter, EventSender, ProgressEvent};

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    worked: u64,
    forwarded: u64,
    done: bool,
}

#[derive(Debug)]
struct Node {
    id: String,
    counters: Mutex<Counters>,
    parent: Option<(Arc<Node>, u64)>,
    sender: Option<EventSender>,
}

impl Node {
    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            sender.emit(AppEvent::Progress(event));
        }
    }

    fn advance(&self, units: u64) {
        let (forward, current, total) = {
            let mut c = self.lock();
            c.worked = if c.total > 0 {
                (c.worked + units).min(c.total)
            } else {
                c.worked + units
            };
            let forward = match &self.parent {
                Some((_, share)) if c.total > 0 => {
                    let target = share.saturating_mul(c.worked) / c.total;
                    let delta = target.saturating_sub(c.forwarded);
                    c.forwarded = target;
                    delta
                }
                _ => 0,
            };
            (forward, c.worked, c.total)
        };

        match &self.parent {
            Some((parent, _)) => {
                if forward > 0 {
                    parent.advance(forward);
                }
            }
            None => self.emit(ProgressEvent::updated(&self.id, current, total)),
        }
    }
}

/// Progress sink threaded through a transaction
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    node: Arc<Node>,
    token: CancellationToken,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMonitor {
    /// A root monitor that publishes nothing
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, CancellationToken::new())
    }

    /// A root monitor publishing `ProgressEvent`s on `sender`
    #[must_use]
    pub fn with_sender(sender: EventSender) -> Self {
        Self::build(Some(sender), CancellationToken::new())
    }

    /// Share an externally owned cancellation token
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// A fresh root monitor for one transaction. Cancelling this monitor
    /// does not reach back into `self`; cancelling `self` still stops it.
    #[must_use]
    pub fn transaction(&self) -> Self {
        Self::build(self.node.sender.clone(), self.token.child_token())
    }

    fn build(sender: Option<EventSender>, token: CancellationToken) -> Self {
        Self {
            node: Arc::new(Node {
                id: Uuid::new_v4().to_string(),
                counters: Mutex::new(Counters::default()),
                parent: None,
                sender,
            }),
            token,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.node.id
    }

    /// Start an operation of `total` units
    pub fn begin(&self, operation: impl Into<String>, total: u64) {
        {
            let mut c = self.node.lock();
            c.total = total;
            c.worked = 0;
            c.done = false;
        }
        let parent_id = self.node.parent.as_ref().map(|(p, _)| p.id.clone());
        self.node.emit(ProgressEvent::started(
            &self.node.id,
            operation,
            total,
            parent_id,
        ));
    }

    /// Record `units` of completed work
    pub fn worked(&self, units: u64) {
        if units > 0 {
            self.node.advance(units);
        }
    }

    /// Mark the operation complete, forwarding any remaining share to the parent
    pub fn done(&self) {
        let remaining = {
            let mut c = self.node.lock();
            if c.done {
                return;
            }
            c.done = true;
            if c.total == 0 {
                c.total = 1;
            }
            c.total - c.worked
        };
        self.node.advance(remaining);
        self.node.emit(ProgressEvent::Completed {
            id: self.node.id.clone(),
        });
    }

    /// A child monitor that owns `parent_units` of this monitor's total
    #[must_use]
    pub fn sub(&self, parent_units: u64) -> Self {
        Self {
            node: Arc::new(Node {
                id: Uuid::new_v4().to_string(),
                counters: Mutex::new(Counters::default()),
                parent: Some((Arc::clone(&self.node), parent_units)),
                sender: self.node.sender.clone(),
            }),
            token: self.token.clone(),
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.node.lock().total
    }

    #[must_use]
    pub fn worked_units(&self) -> u64 {
        self.node.lock().worked
    }

    /// Set the shared cancellation token
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            self.node.emit(ProgressEvent::Cancelled {
                id: self.node.id.clone(),
            });
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the shared token is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Convert a set token into an abort
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Aborted` once the monitor tree is cancelled.
    pub fn check_cancelled(&self) -> Result<(), InstallError> {
        if self.token.is_cancelled() {
            Err(InstallError::cancelled())
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl EventEmitter for ProgressMonitor {
    fn event_sender(&self) -> Option<&EventSender> {
        self.node.sender.as_ref()
    }
}
