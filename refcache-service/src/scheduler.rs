//! Decoupled background refresh.
//!
//! [`RefreshScheduler::enqueue`] never waits on upstream work. It hands a
//! one-shot task to a [`Scheduler`] and returns. At most one refresh per
//! (key, scope) is pending or running at a time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use refcache_core::{ReferenceKey, ScheduleError, ScopeId};
use tokio::runtime::Handle;

use crate::chain::{RefreshError, SourceChain};

/// A unit of deferred work.
pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs one-shot tasks after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) -> Result<(), ScheduleError>;
}

/// Scheduler that spawns onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> Result<Self, ScheduleError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| ScheduleError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) -> Result<(), ScheduleError> {
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });
        Ok(())
    }
}

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Scheduled,
    /// A refresh for the same (key, scope) is already pending or running.
    AlreadyQueued,
}

type InFlight = DashMap<(ScopeId, ReferenceKey), ()>;

/// Removes the in-flight marker when the refresh finishes or is dropped.
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    slot: (ScopeId, ReferenceKey),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.slot);
    }
}

#[derive(Clone)]
pub struct RefreshScheduler {
    chain: SourceChain,
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    in_flight: Arc<InFlight>,
}

impl RefreshScheduler {
    pub fn new(chain: SourceChain, scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            chain,
            scheduler,
            delay,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Number of refreshes currently pending or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_queued(&self, key: &ReferenceKey, scope: &ScopeId) -> bool {
        self.in_flight.contains_key(&(scope.clone(), key.clone()))
    }

    /// Schedule a background refresh of (key, scope).
    pub fn enqueue(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
    ) -> Result<EnqueueOutcome, ScheduleError> {
        let slot = (scope.clone(), key.clone());
        match self.in_flight.entry(slot.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::debug!(key = %key, scope = %scope, "Refresh already queued");
                return Ok(EnqueueOutcome::AlreadyQueued);
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(());
            }
        }

        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            slot,
        };
        let chain = self.chain.clone();
        let (key, scope) = (key.clone(), scope.clone());

        let task: ScheduledTask = Box::pin(async move {
            let _guard = guard;
            match chain.refresh(&key, &scope).await {
                Ok(entry) => tracing::debug!(
                    key = %key,
                    scope = %scope,
                    provenance = %entry.provenance,
                    "Background refresh completed"
                ),
                Err(RefreshError::Sources(failure)) => tracing::warn!(
                    key = %key,
                    scope = %scope,
                    error_kind = %failure.error_kind(),
                    "Background refresh failed; cached value kept"
                ),
                Err(RefreshError::Persist(e)) => tracing::warn!(
                    key = %key,
                    scope = %scope,
                    error = %e,
                    "Background refresh could not be persisted; cached value kept"
                ),
            }
        });

        // On rejection the task (and its guard) is dropped, clearing the marker.
        self.scheduler.schedule_once(self.delay, task)?;
        Ok(EnqueueOutcome::Scheduled)
    }
}
