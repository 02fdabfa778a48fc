use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::orchestrator::error::{HarnessError, Result};
use crate::orchestrator::types::{FailureKind, PoolState};

/// Handle to one pooled connection slot.
///
/// The session epoch identifies the server-side session generation the
/// connection is bound to; a handle whose epoch predates the pool's current
/// epoch references a session that no longer exists.
#[derive(Debug, Clone)]
pub struct PooledConnection {
    id: u64,
    session_epoch: u64,
}

impl PooledConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session_epoch(&self) -> u64 {
        self.session_epoch
    }
}

#[derive(Debug)]
struct PoolInner {
    in_use: usize,
    state: PoolState,
    session_epoch: u64,
    live: HashSet<u64>,
}

/// Bounded connection pool for the database-facing side of the topology.
///
/// `max_size` is deliberately small so exhaustion is reachable
/// deterministically within test time budgets. All mutation happens under a
/// single non-async lock; no lock is held across a suspension point.
///
/// Passive validation (pinging before use) is insufficient after a
/// process-level restart: a connection can appear alive and still be bound
/// to a stale server-side session. `dispose` is the recovery path: it
/// discards all pooled state unconditionally so every subsequent acquire
/// builds a fresh connection.
#[derive(Debug)]
pub struct ConnectionPoolManager {
    max_size: usize,
    next_id: AtomicU64,
    inner: Mutex<PoolInner>,
}

impl ConnectionPoolManager {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            next_id: AtomicU64::new(0),
            inner: Mutex::new(PoolInner {
                in_use: 0,
                state: PoolState::Healthy,
                session_epoch: 0,
                live: HashSet::new(),
            }),
        }
    }

    /// Acquire a connection slot, failing when every slot is in use.
    ///
    /// The first successful acquire after a disposal returns a fresh-epoch
    /// connection and resets the pool to healthy.
    pub fn acquire(&self) -> Result<PooledConnection> {
        let mut inner = self.inner.lock();
        if inner.in_use == self.max_size {
            tracing::warn!(max_size = self.max_size, "Connection pool exhausted");
            return Err(HarnessError::PoolExhausted {
                max_size: self.max_size,
            });
        }

        let was_stale = inner.state == PoolState::Stale;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        inner.in_use += 1;
        inner.live.insert(id);
        inner.state = if inner.in_use == self.max_size {
            PoolState::Exhausted
        } else {
            PoolState::Healthy
        };

        if was_stale {
            tracing::info!(
                connection_id = id,
                session_epoch = inner.session_epoch,
                "Fresh connection built after disposal; pool healthy again"
            );
        }

        Ok(PooledConnection {
            id,
            session_epoch: inner.session_epoch,
        })
    }

    /// Return a connection slot to the pool.
    ///
    /// Releasing a handle from a disposed session is a logged no-op (its
    /// slot no longer exists); releasing a live handle twice fails loudly.
    pub fn release(&self, conn: &PooledConnection) -> Result<()> {
        let mut inner = self.inner.lock();
        if conn.session_epoch != inner.session_epoch {
            tracing::debug!(
                connection_id = conn.id,
                handle_epoch = conn.session_epoch,
                pool_epoch = inner.session_epoch,
                "Release of handle from disposed session; ignoring"
            );
            return Ok(());
        }

        if !inner.live.remove(&conn.id) {
            return Err(HarnessError::DoubleRelease { id: conn.id });
        }

        inner.in_use -= 1;
        inner.state = if inner.in_use == self.max_size {
            PoolState::Exhausted
        } else {
            PoolState::Healthy
        };
        Ok(())
    }

    /// Unconditionally discard all pooled state and mark the pool stale.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        let discarded = inner.in_use;
        inner.live.clear();
        inner.in_use = 0;
        inner.session_epoch += 1;
        inner.state = PoolState::Stale;
        tracing::warn!(
            discarded = discarded,
            session_epoch = inner.session_epoch,
            "Disposed all pooled connections"
        );
    }

    /// Invoked on detecting an upstream failure class (the database was
    /// externally killed or restarted). Existing pooled connections are
    /// invalid even if keep-alive checks have not yet caught it, so the
    /// whole pool is discarded rather than validated connection by
    /// connection.
    pub fn on_upstream_failure_detected(&self, kind: FailureKind) {
        tracing::warn!(
            failure_kind = %kind,
            "Upstream failure detected; forcing pool disposal"
        );
        self.dispose();
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn in_use(&self) -> usize {
        self.inner.lock().in_use
    }

    pub fn state(&self) -> PoolState {
        self.inner.lock().state
    }

    pub fn session_epoch(&self) -> u64 {
        self.inner.lock().session_epoch
    }
}
