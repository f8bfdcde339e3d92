use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::LinkError;
use crate::hash::Hash;

/// How often a blocked waiter re-checks its cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

enum LinkState {
    Pending,
    Resolved(Hash),
    Released,
}

struct LinkInner {
    state: Mutex<LinkState>,
    ready: Condvar,
}

/// Handle to an object's running hash, filled in by the hashing pipeline.
///
/// Clones share the same slot. The first [`resolve`](Self::resolve) wins;
/// readers block in [`value`](Self::value) until then. A waiter whose
/// cancellation token fires gets [`LinkError::Cancelled`], never a default
/// hash.
#[derive(Clone)]
pub struct RunningHashLink {
    inner: Arc<LinkInner>,
}

impl RunningHashLink {
    /// A link that has not been resolved yet.
    pub fn pending() -> Self {
        Self {
            inner: Arc::new(LinkInner {
                state: Mutex::new(LinkState::Pending),
                ready: Condvar::new(),
            }),
        }
    }

    /// A link that already holds `hash`.
    pub fn resolved(hash: Hash) -> Self {
        let link = Self::pending();
        link.resolve(hash);
        link
    }

    /// Publish the hash. Returns `false` if the link was already resolved or
    /// released, in which case the stored state is left untouched.
    pub fn resolve(&self, hash: Hash) -> bool {
        let mut state = self.lock();
        if !matches!(*state, LinkState::Pending) {
            return false;
        }
        *state = LinkState::Resolved(hash);
        self.inner.ready.notify_all();
        true
    }

    /// Block until the hash is available.
    ///
    /// The token is checked on entry and every time the waiter wakes up.
    pub fn value(&self, cancel: &CancellationToken) -> Result<Hash, LinkError> {
        if cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        let mut state = self.lock();
        loop {
            match *state {
                LinkState::Resolved(hash) => return Ok(hash),
                LinkState::Released => return Err(LinkError::Released),
                LinkState::Pending => {}
            }
            if cancel.is_cancelled() {
                return Err(LinkError::Cancelled);
            }
            let (guard, _) = self
                .inner
                .ready
                .wait_timeout(state, CANCEL_POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Non-blocking read. `None` while pending or after release.
    pub fn try_value(&self) -> Option<Hash> {
        match *self.lock() {
            LinkState::Resolved(hash) => Some(hash),
            _ => None,
        }
    }

    /// Abandon the wait. A pending link becomes released and every current
    /// and future waiter fails with [`LinkError::Released`]. Returns `true`
    /// if this call performed the release.
    pub fn try_release(&self) -> bool {
        let mut state = self.lock();
        if !matches!(*state, LinkState::Pending) {
            return false;
        }
        *state = LinkState::Released;
        self.inner.ready.notify_all();
        true
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock(), LinkState::Resolved(_))
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RunningHashLink {
    fn default() -> Self {
        Self::pending()
    }
}

impl fmt::Debug for RunningHashLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.lock() {
            LinkState::Pending => f.write_str("RunningHashLink(pending)"),
            LinkState::Resolved(hash) => write!(f, "RunningHashLink({})", hash.short_hex()),
            LinkState::Released => f.write_str("RunningHashLink(released)"),
        }
    }
}
