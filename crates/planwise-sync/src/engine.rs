//! Reconciliation engine
//!
//! The [`ReconciliationEngine`] runs sync passes against the remote store.
//!
//! ## Pass Flow
//!
//! 1. **Preconditions**: authenticated user, suitable connectivity, no other
//!    pass in flight (overlapping triggers are dropped, not queued)
//! 2. **Drain**: push queued mutations in priority order; settle each item
//!    as synced, requeued with backoff, or dropped
//! 3. **Pull**: fetch every tracked entity and classify it as unchanged,
//!    remote update or conflict; a full refresh also adopts remote entities
//!    this device has never seen
//! 4. **Bookkeeping**: stamp the completion time when the pass reached its
//!    end without being superseded
//!
//! ## Failure Handling
//!
//! Remote failures are handled per item and never abort the pass. Losing
//! connectivity ends the pass early; what was settled so far stays settled
//! and the rest waits for the next pass.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error, info, warn};

use planwise_conflict::{ConflictDetector, DetectionResult};
use planwise_core::domain::{
    DataType, EntityKey, Operation, PassResult, RetryPolicy, SyncMetadata, SyncQueueItem,
    SyncStatus,
};
use planwise_core::ports::{
    Clock, IAuthProvider, ILocalStore, IRemoteStore, ISyncStateRepository, MetadataWrite,
    QueueChange, LAST_SYNC_COMPLETED_KEY,
};

use crate::connectivity::ConnectivityMonitor;
use crate::events::{EventBus, SyncEvent};
use crate::metadata::MetadataStore;
use crate::queue::SyncQueue;
use crate::SyncError;

// ============================================================================
// Wiring
// ============================================================================

/// Adapters the engine works through
///
/// Passed explicitly at construction; the engine owns no global state.
#[derive(Clone)]
pub struct SyncPorts {
    pub repository: Arc<dyn ISyncStateRepository>,
    pub remote: Arc<dyn IRemoteStore>,
    pub local: Arc<dyn ILocalStore>,
    pub auth: Arc<dyn IAuthProvider>,
    pub clock: Arc<dyn Clock>,
}

/// How a pass was requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOptions {
    /// Only require being online, ignoring the quality threshold
    pub force: bool,
    /// Also list the remote store and adopt unknown entities
    pub full_refresh: bool,
}

impl PassOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn full_refresh() -> Self {
        Self {
            full_refresh: true,
            ..Self::default()
        }
    }
}

/// Clears the in-flight flag when a pass ends, including by panic
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// ReconciliationEngine
// ============================================================================

pub struct ReconciliationEngine {
    repo: Arc<dyn ISyncStateRepository>,
    remote: Arc<dyn IRemoteStore>,
    local: Arc<dyn ILocalStore>,
    auth: Arc<dyn IAuthProvider>,
    clock: Arc<dyn Clock>,
    connectivity: Arc<ConnectivityMonitor>,
    events: EventBus,
    metadata: MetadataStore,
    queue: SyncQueue,
    policy: RetryPolicy,
    /// Set while a pass runs
    running: AtomicBool,
    passes_started: AtomicU64,
    /// Bumped when all sync state is cleared; a pass that observes a bump
    /// stops writing and does not stamp completion
    generation: AtomicU64,
}

impl ReconciliationEngine {
    pub fn new(
        ports: SyncPorts,
        connectivity: Arc<ConnectivityMonitor>,
        events: EventBus,
        policy: RetryPolicy,
    ) -> Self {
        let metadata = MetadataStore::new(ports.repository.clone(), events.clone());
        let queue = SyncQueue::new(ports.repository.clone(), metadata.clone(), ports.clock.clone());
        Self {
            repo: ports.repository,
            remote: ports.remote,
            local: ports.local,
            auth: ports.auth,
            clock: ports.clock,
            connectivity,
            events,
            metadata,
            queue,
            policy,
            running: AtomicBool::new(false),
            passes_started: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn local(&self) -> &Arc<dyn ILocalStore> {
        &self.local
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of passes that got past the preconditions
    pub fn passes_started(&self) -> u64 {
        self.passes_started.load(Ordering::SeqCst)
    }

    /// Completion time of the last pass that ran to its end
    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.repo.get_state(LAST_SYNC_COMPLETED_KEY).await? else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid {} value '{}': {}", LAST_SYNC_COMPLETED_KEY, raw, e))?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    /// Wipes metadata, queue and bookkeeping for the current user
    ///
    /// A pass running concurrently stops at its next checkpoint and does not
    /// record completion.
    pub async fn clear_all(&self) -> Result<(), SyncError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.repo.clear_all().await?;
        info!("All sync state cleared");
        self.events.emit(SyncEvent::StateCleared);
        Ok(())
    }

    // ========================================================================
    // run_pass()
    // ========================================================================

    /// Runs one reconciliation pass
    ///
    /// # Errors
    ///
    /// - `SyncError::NotAuthenticated` without a signed-in user
    /// - `SyncError::Offline` when connectivity is missing, or below the
    ///   sync threshold (heavy threshold for a full refresh) unless forced
    /// - `SyncError::PassInProgress` when another pass is running
    ///
    /// Everything that goes wrong after the preconditions is reported in the
    /// returned [`PassResult`].
    #[tracing::instrument(skip(self))]
    pub async fn run_pass(&self, options: PassOptions) -> Result<PassResult, SyncError> {
        if !self.auth.is_authenticated() {
            debug!("Skipping pass: not authenticated");
            return Err(SyncError::NotAuthenticated);
        }

        let connected = if options.force {
            self.connectivity.is_online()
        } else if options.full_refresh {
            self.connectivity.is_suitable_for_heavy_operations()
        } else {
            self.connectivity.is_suitable_for_sync()
        };
        if !connected {
            debug!(quality = self.connectivity.quality(), "Skipping pass: connectivity not suitable");
            return Err(SyncError::Offline);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Skipping pass: another pass is in progress");
            return Err(SyncError::PassInProgress);
        }
        let _guard = RunningGuard(&self.running);

        let pass = self.passes_started.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.load(Ordering::SeqCst);
        let started = std::time::Instant::now();
        info!(pass, "Sync pass started");
        self.events.emit(SyncEvent::PassStarted);

        let mut result = PassResult::default();
        let drained = self.drain(generation, &mut result).await;
        let pulled = drained && self.pull(generation, options.full_refresh, &mut result).await;

        result.completed = drained && pulled && self.is_current(generation);
        if result.completed {
            let stamp = self.clock.now().to_rfc3339_opts(SecondsFormat::Micros, true);
            if let Err(e) = self.repo.set_state(LAST_SYNC_COMPLETED_KEY, &stamp).await {
                error!(error = %e, "Failed to record pass completion");
                result.errors.push(format!("bookkeeping: {e:#}"));
                result.completed = false;
            }
        }
        result.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            pass,
            synced = result.synced,
            failed = result.failed,
            conflicts = result.conflicts,
            pulled = result.pulled,
            skipped = result.skipped,
            completed = result.completed,
            duration_ms = result.duration_ms,
            "Sync pass finished"
        );
        self.events.emit(SyncEvent::PassFinished(result.clone()));
        Ok(result)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Checkpoint before each remote call
    fn keep_going(&self, generation: u64) -> bool {
        if !self.is_current(generation) {
            warn!("Sync state was cleared, abandoning pass");
            return false;
        }
        if !self.connectivity.is_online() {
            warn!("Connectivity lost, ending pass early");
            return false;
        }
        true
    }

    // ========================================================================
    // Drain phase
    // ========================================================================

    /// Pushes queued mutations; returns false if the pass must stop early
    async fn drain(&self, generation: u64, result: &mut PassResult) -> bool {
        let items = match self.queue.dequeue_all().await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Failed to read sync queue");
                result.errors.push(format!("queue: {e:#}"));
                return false;
            }
        };
        if items.is_empty() {
            debug!("Sync queue empty");
            return true;
        }
        info!(count = items.len(), "Draining sync queue");

        for item in items {
            if !self.keep_going(generation) {
                return false;
            }
            let key = match item.entity_key() {
                Ok(key) => key,
                Err(e) => {
                    error!(id = %item.id, error = %e, "Dropping malformed queue item");
                    result.failed += 1;
                    result.errors.push(format!("{}: {}", item.id, e));
                    if let Err(e) = self.queue.remove(&item.id).await {
                        error!(id = %item.id, error = %e, "Failed to drop malformed queue item");
                    }
                    continue;
                }
            };
            if let Err(e) = self.push_item(generation, &key, &item, result).await {
                error!(id = %item.id, error = %e, "Failed to settle queue item");
                result.errors.push(format!("{}: {e:#}", item.id));
            }
        }
        true
    }

    async fn push_item(
        &self,
        generation: u64,
        key: &EntityKey,
        item: &SyncQueueItem,
        result: &mut PassResult,
    ) -> Result<()> {
        match self.metadata.get(key).await?.map(|m| m.status) {
            Some(SyncStatus::Conflict) => {
                debug!(id = %item.id, "Entity in conflict, item stays queued");
                result.skipped += 1;
                return Ok(());
            }
            Some(SyncStatus::Local) => {
                warn!(id = %item.id, "Dropping queued item of local-only entity");
                self.queue.remove(&item.id).await?;
                result.skipped += 1;
                return Ok(());
            }
            Some(_) => {}
            None => warn!(key = %key, "Queued item without metadata, recreating it"),
        }

        let now = self.clock.now();
        if !item.should_retry(&self.policy, now) {
            if item.retry_count >= self.policy.max_retries {
                warn!(
                    id = %item.id,
                    retry_count = item.retry_count,
                    "Dropping queue item past the retry ceiling"
                );
                self.queue.remove(&item.id).await?;
            } else {
                debug!(
                    id = %item.id,
                    retry_count = item.retry_count,
                    "Backoff window still open"
                );
            }
            result.skipped += 1;
            return Ok(());
        }

        debug!(id = %item.id, operation = %item.operation, "Pushing mutation");
        let applied = self
            .remote
            .apply(item.data_type, &item.data_id, item.operation, &item.payload)
            .await;
        if !self.is_current(generation) {
            // State was cleared while the request was in flight
            return Ok(());
        }

        // Metadata may have changed during the request; every write below
        // is computed from what is stored when the item settles
        let now = self.clock.now();
        let stored_or_new = |current: Option<SyncMetadata>| {
            current.unwrap_or_else(|| SyncMetadata::new_pending(key.clone(), item.created_at))
        };
        match applied {
            Ok(outcome) => {
                let is_delete = item.operation == Operation::Delete;
                let settled = self
                    .queue
                    .settle(key, QueueChange::Remove(item.id.clone()), &|current, remaining| {
                        let mut meta = stored_or_new(current);
                        if matches!(meta.status, SyncStatus::Conflict | SyncStatus::Local) {
                            return Ok(MetadataWrite::Keep);
                        }
                        if is_delete && remaining == 0 {
                            return Ok(MetadataWrite::Delete);
                        }
                        let modified = meta.last_modified;
                        meta.mark_synced(outcome.server_version.clone(), now)?;
                        if remaining > 0 {
                            // Later mutations still wait
                            meta.mark_dirty(modified);
                        }
                        Ok(MetadataWrite::Save(meta))
                    })
                    .await?;
                result.synced += 1;
                debug!(id = %item.id, write = ?settled.write, "Mutation synced");
            }
            Err(err) => {
                result.failed += 1;
                result.errors.push(format!("{}: {}", item.id, err));

                let requeue = err.is_transient() && item.retry_count + 1 < self.policy.max_retries;
                let change = if requeue {
                    QueueChange::Requeue(item.requeue_with_backoff(now))
                } else {
                    QueueChange::Remove(item.id.clone())
                };
                let message = err.to_string();
                self.queue
                    .settle(key, change, &|current, _| {
                        let mut meta = stored_or_new(current);
                        if matches!(meta.status, SyncStatus::Conflict | SyncStatus::Local) {
                            return Ok(MetadataWrite::Keep);
                        }
                        meta.mark_sync_error(message.clone(), now)?;
                        Ok(MetadataWrite::Save(meta))
                    })
                    .await?;

                if requeue {
                    warn!(id = %item.id, error = %err, "Transient failure, item requeued");
                } else {
                    warn!(
                        id = %item.id,
                        error = %err,
                        attempts = item.retry_count + 1,
                        "Dropping queue item"
                    );
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Pull phase
    // ========================================================================

    /// Pulls remote state; returns false if the pass must stop early
    async fn pull(&self, generation: u64, full_refresh: bool, result: &mut PassResult) -> bool {
        let tracked = match self.metadata.all().await {
            Ok(tracked) => tracked,
            Err(e) => {
                error!(error = %e, "Failed to read sync metadata");
                result.errors.push(format!("metadata: {e:#}"));
                return false;
            }
        };

        let mut known = HashSet::with_capacity(tracked.len());
        for meta in tracked {
            known.insert(meta.key.clone());
            if matches!(meta.status, SyncStatus::Conflict | SyncStatus::Local) {
                continue;
            }
            if !self.keep_going(generation) {
                return false;
            }
            if let Err(e) = self.pull_entity(generation, &meta.key, result).await {
                error!(key = %meta.key, error = %e, "Failed to apply pulled state");
                result.errors.push(format!("{}: {e:#}", meta.key));
            }
        }

        if full_refresh {
            return self.discover(generation, &known, result).await;
        }
        true
    }

    async fn pull_entity(
        &self,
        generation: u64,
        key: &EntityKey,
        result: &mut PassResult,
    ) -> Result<()> {
        let record = match self.remote.fetch(key.data_type(), key.id()).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(key = %key, "Entity not on remote store");
                return Ok(());
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Remote fetch failed, skipping entity");
                result.skipped += 1;
                return Ok(());
            }
        };
        if !self.is_current(generation) {
            return Ok(());
        }

        // Classify against current metadata, not the copy listed at the
        // start of the phase; a local edit may have landed meanwhile
        let Some(seen) = self.metadata.get(key).await? else {
            return Ok(());
        };
        let now = self.clock.now();
        match ConflictDetector::check_remote(&seen, &record) {
            DetectionResult::Unchanged | DetectionResult::Ignored => {}
            DetectionResult::RemoteUpdate => {
                self.local
                    .apply_remote(key.data_type(), key.id(), &record.payload)
                    .await?;
                let updated = self
                    .metadata
                    .update(key, &|current, _| match current {
                        Some(mut meta) if untouched_since(&meta, &seen) => {
                            meta.mark_synced(Some(record.server_version.clone()), now)?;
                            Ok(MetadataWrite::Save(meta))
                        }
                        _ => Ok(MetadataWrite::Keep),
                    })
                    .await?;
                if updated.write == MetadataWrite::Keep {
                    warn!(
                        key = %key,
                        "Local mutation arrived during pull, remote update not recorded"
                    );
                } else {
                    result.pulled += 1;
                }
            }
            DetectionResult::Conflicted => {
                let updated = self
                    .metadata
                    .update(key, &|current, _| {
                        let Some(mut meta) = current else {
                            return Ok(MetadataWrite::Keep);
                        };
                        if ConflictDetector::check_remote(&meta, &record) != DetectionResult::Conflicted {
                            return Ok(MetadataWrite::Keep);
                        }
                        meta.mark_conflict(record.payload.clone(), now)?;
                        // conflict_data and server_version describe the same remote revision
                        meta.server_version = Some(record.server_version.clone());
                        Ok(MetadataWrite::Save(meta))
                    })
                    .await?;
                if updated.write != MetadataWrite::Keep {
                    result.conflicts += 1;
                    warn!(key = %key, "Entity moved to conflict");
                    self.events.emit(SyncEvent::ConflictDetected { key: key.clone() });
                }
            }
        }
        Ok(())
    }

    /// Adopts remote entities that have no local metadata yet
    async fn discover(
        &self,
        generation: u64,
        known: &HashSet<EntityKey>,
        result: &mut PassResult,
    ) -> bool {
        for data_type in DataType::ALL {
            if !self.keep_going(generation) {
                return false;
            }
            let entries = match self.remote.list(data_type).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(data_type = %data_type, error = %e, "Remote listing failed");
                    result.errors.push(format!("list {data_type}: {e}"));
                    continue;
                }
            };

            for entry in entries {
                let key = match EntityKey::new(data_type, entry.id.clone()) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(data_type = %data_type, error = %e, "Ignoring malformed remote entry");
                        continue;
                    }
                };
                if known.contains(&key) {
                    continue;
                }
                if !self.keep_going(generation) {
                    return false;
                }
                match self.adopt(generation, &key).await {
                    Ok(true) => result.pulled += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to adopt remote entity");
                        result.skipped += 1;
                    }
                }
            }
        }
        true
    }

    async fn adopt(&self, generation: u64, key: &EntityKey) -> Result<bool> {
        let Some(record) = self.remote.fetch(key.data_type(), key.id()).await? else {
            return Ok(false);
        };
        if !self.is_current(generation) {
            return Ok(false);
        }
        // A local mutation may have created metadata since the listing started
        if self.metadata.get(key).await?.is_some() {
            return Ok(false);
        }
        self.local
            .apply_remote(key.data_type(), key.id(), &record.payload)
            .await?;
        let now = self.clock.now();
        let adopted = self
            .metadata
            .update(key, &|current, _| match current {
                Some(_) => Ok(MetadataWrite::Keep),
                None => Ok(MetadataWrite::Save(SyncMetadata::discovered(
                    key.clone(),
                    record.server_version.clone(),
                    now,
                ))),
            })
            .await?;
        let adopted = adopted.write != MetadataWrite::Keep;
        if adopted {
            debug!(key = %key, "Adopted remote entity");
        }
        Ok(adopted)
    }
}

/// Whether `current` still carries the local state `seen` was read with
fn untouched_since(current: &SyncMetadata, seen: &SyncMetadata) -> bool {
    current.status == seen.status
        && current.is_dirty == seen.is_dirty
        && current.last_modified == seen.last_modified
}
