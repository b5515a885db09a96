//! Bounded pool of upstream sessions.
//!
//! The semaphore is the only backpressure point: at most `size` sessions are
//! checked out at once. A checked-out session always goes back to the idle
//! list when its guard drops, unless it was explicitly discarded or the pool
//! has been shut down. A session whose call was abandoned mid-flight is
//! returned dirty and reset before its next use.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::upstream::{GraphConnector, GraphSession, Statement, UpstreamError, UpstreamRows};

struct IdleSession<T> {
    session: T,
    dirty: bool,
}

struct Shared<T> {
    idle: Mutex<Vec<IdleSession<T>>>,
    closed: AtomicBool,
}

/// Session acquisition failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    /// Every session stayed checked out for the whole wait.
    #[error("no graph session available after {waited_ms} ms")]
    Exhausted {
        /// Time spent waiting.
        waited_ms: u64,
    },
    /// Opening or resetting a session ran past the deadline.
    #[error("graph session setup exceeded {limit_ms} ms")]
    Timeout {
        /// The deadline that was exceeded.
        limit_ms: u64,
    },
    /// The pool has been shut down.
    #[error("graph session pool is closed")]
    Closed,
    /// The connector failed to open a session.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionPoolStats {
    /// Maximum concurrently checked-out sessions.
    pub size: usize,
    /// Permits currently free.
    pub available: usize,
    /// Open sessions waiting in the idle list.
    pub idle: usize,
    /// Sessions opened over the pool's lifetime.
    pub opened: u64,
}

/// Bounded pool of [`GraphSession`]s.
pub struct SessionPool<C: GraphConnector> {
    connector: Arc<C>,
    permits: Arc<Semaphore>,
    shared: Arc<Shared<C::Session>>,
    size: usize,
    opened: AtomicU64,
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

impl<C: GraphConnector> SessionPool<C> {
    /// Create an empty pool. Sessions are opened lazily.
    ///
    /// A pool of size zero never hands out a session;
    /// [`ExecutorConfig::validate`](super::ExecutorConfig::validate) rejects it.
    pub fn new(connector: Arc<C>, size: usize) -> Self {
        Self {
            connector,
            permits: Arc::new(Semaphore::new(size)),
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::with_capacity(size)),
                closed: AtomicBool::new(false),
            }),
            size,
            opened: AtomicU64::new(0),
        }
    }

    /// The connector sessions are opened with.
    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// Check out a session, waiting at most `wait` in total.
    pub async fn acquire(&self, wait: Duration) -> Result<PooledSession<C::Session>, PoolError> {
        let started = Instant::now();
        let deadline = started + wait;

        let permit = match tokio::time::timeout(wait, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                return Err(PoolError::Exhausted {
                    waited_ms: millis(started.elapsed()),
                })
            }
        };
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let idle = self.shared.idle.lock().pop();
        let session = match idle {
            Some(IdleSession { session, dirty: false }) => session,
            Some(IdleSession {
                mut session,
                dirty: true,
            }) => {
                let reset = tokio::time::timeout_at(deadline, session.reset()).await;
                match reset {
                    Ok(Ok(())) => {
                        debug!("Reset dirty graph session");
                        session
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Graph session failed to reset, replacing");
                        drop(session);
                        self.open(deadline, wait).await?
                    }
                    Err(_) => {
                        warn!("Graph session reset timed out, replacing");
                        drop(session);
                        self.open(deadline, wait).await?
                    }
                }
            }
            None => self.open(deadline, wait).await?,
        };

        Ok(PooledSession {
            session: Some(session),
            dirty: false,
            shared: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    async fn open(&self, deadline: Instant, wait: Duration) -> Result<C::Session, PoolError> {
        match tokio::time::timeout_at(deadline, self.connector.connect()).await {
            Ok(Ok(session)) => {
                let opened = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(opened = opened, "Opened graph session");
                Ok(session)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(PoolError::Timeout {
                limit_ms: millis(wait),
            }),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> SessionPoolStats {
        SessionPoolStats {
            size: self.size,
            available: self.permits.available_permits(),
            idle: self.shared.idle.lock().len(),
            opened: self.opened.load(Ordering::Relaxed),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Close the pool: drop idle sessions and fail further acquisitions.
    ///
    /// Sessions checked out at this point are dropped when their guards are.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.permits.close();
        let drained = std::mem::take(&mut *self.shared.idle.lock());
        debug!(sessions = drained.len(), "Graph session pool closed");
    }
}

/// A checked-out session. Returns to the pool on drop.
pub struct PooledSession<T: Send + 'static> {
    session: Option<T>,
    dirty: bool,
    shared: Arc<Shared<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T: Send + 'static> fmt::Debug for PooledSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("held", &self.session.is_some())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl<T: GraphSession> PooledSession<T> {
    /// Run a statement on the session.
    ///
    /// If the returned future is dropped before completion the session is
    /// handed back dirty.
    pub async fn run(&mut self, statement: &Statement, row_limit: usize) -> Result<UpstreamRows, UpstreamError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| UpstreamError::Unavailable("graph session already released".to_string()))?;
        self.dirty = true;
        let result = session.run(statement, row_limit).await;
        self.dirty = false;
        result
    }

    /// Reset the session in place.
    pub async fn reset(&mut self) -> Result<(), UpstreamError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| UpstreamError::Unavailable("graph session already released".to_string()))?;
        self.dirty = true;
        session.reset().await?;
        self.dirty = false;
        Ok(())
    }

    /// Whether the session will be reset before its next use.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drop the session instead of returning it to the pool.
    pub fn discard(mut self) {
        self.session = None;
    }
}

impl<T: Send + 'static> Drop for PooledSession<T> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        self.shared.idle.lock().push(IdleSession {
            session,
            dirty: self.dirty,
        });
        // The permit is released after this body, so a waiter woken by it
        // finds the session already idle.
    }
}
