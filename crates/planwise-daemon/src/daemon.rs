//! Daemon wiring
//!
//! Builds the adapters from configuration and hands them to the sync
//! engine. The same wiring serves the long-running `run` command and the
//! one-shot `sync` / `status` commands.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use planwise_cache::{DatabasePool, SqliteSyncRepository};
use planwise_core::{
    config::Config,
    domain::{DataType, Operation, PassResult, Payload, UserId},
    ports::{
        ApplyOutcome, Clock, IAuthProvider, IRemoteStore, RemoteEntry, RemoteError, RemoteRecord,
        SystemClock,
    },
};
use planwise_remote::{HttpRemoteStore, RemoteClient, TokenAuth};
use planwise_sync::{
    ConnectivityMonitor, EventBus, PassOptions, ReconciliationEngine, SchedulerSettings,
    SyncEvent, SyncPorts, SyncScheduler, SyncService, SyncSummary,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{local_store::JsonFileStore, network::NetworkObserver};

/// Repository scope used when no user is configured
const ANONYMOUS_USER: &str = "anonymous";

// ============================================================================
// Unconfigured remote
// ============================================================================

/// Stand-in remote when no `remote.base_url` is set
///
/// Paired with a signed-out auth provider, so passes are refused before
/// any of these methods are reached.
struct UnconfiguredRemote;

impl UnconfiguredRemote {
    fn error() -> RemoteError {
        RemoteError::Transient("no remote store configured".into())
    }
}

#[async_trait::async_trait]
impl IRemoteStore for UnconfiguredRemote {
    async fn apply(
        &self,
        _data_type: DataType,
        _id: &str,
        _operation: Operation,
        _payload: &Payload,
    ) -> Result<ApplyOutcome, RemoteError> {
        Err(Self::error())
    }

    async fn fetch(&self, _data_type: DataType, _id: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        Err(Self::error())
    }

    async fn list(&self, _data_type: DataType) -> Result<Vec<RemoteEntry>, RemoteError> {
        Err(Self::error())
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Fully wired sync stack
pub struct DaemonService {
    config: Config,
    engine: Arc<ReconciliationEngine>,
    service: SyncService,
    monitor: Arc<ConnectivityMonitor>,
    /// Kept open for the lifetime of the service
    _db_pool: DatabasePool,
}

impl DaemonService {
    /// Opens storage and builds every adapter named by `config`
    pub async fn new(config: Config) -> Result<Self> {
        let user_id = match &config.remote.user_id {
            Some(id) => UserId::new(id.as_str()).context("Invalid remote.user_id")?,
            None => UserId::new(ANONYMOUS_USER)?,
        };

        let db_pool = DatabasePool::new(&config.storage.database_path)
            .await
            .context("Failed to open database")?;
        let repository = Arc::new(SqliteSyncRepository::new(
            db_pool.pool().clone(),
            user_id.clone(),
        ));

        let (remote, auth) = build_remote(&config, user_id)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let monitor = Arc::new(ConnectivityMonitor::new(&config.connectivity, clock.clone()));
        let local = Arc::new(JsonFileStore::new(entities_dir(&config)));
        debug!(root = %local.root().display(), "Local entity store");

        let engine = Arc::new(ReconciliationEngine::new(
            SyncPorts {
                repository,
                remote,
                local,
                auth,
                clock,
            },
            monitor.clone(),
            EventBus::new(),
            config.sync.retry_policy(),
        ));
        let service = SyncService::new(engine.clone(), config.sync.default_priority);

        Ok(Self {
            config,
            engine,
            service,
            monitor,
            _db_pool: db_pool,
        })
    }

    fn observer(&self) -> NetworkObserver {
        NetworkObserver::new(
            self.monitor.clone(),
            std::time::Duration::from_secs(self.config.connectivity.probe_interval_secs),
        )
    }

    /// Runs the scheduler until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let observer = self.observer();
        observer.probe().await;
        info!(
            connectivity = %self.monitor.state().describe(),
            pending = self.service.pending_count().await?,
            "Daemon ready"
        );

        let observer_task = tokio::spawn(observer.run(shutdown.child_token()));
        let events_task = tokio::spawn(log_events(self.service.subscribe_events(), shutdown.child_token()));

        let (scheduler, handle) = SyncScheduler::new(
            self.engine.clone(),
            SchedulerSettings::from_config(&self.config.sync),
        );
        // Catch up on anything queued while the daemon was down
        handle.request_sync(PassOptions::default());

        scheduler.run(shutdown.child_token()).await;
        drop(handle);

        let _ = observer_task.await;
        let _ = events_task.await;
        info!("Sync loop terminated");
        Ok(())
    }

    /// Probes the network once, then runs a single pass
    pub async fn sync_once(&self, options: PassOptions) -> Result<PassResult> {
        self.observer().probe().await;
        info!(connectivity = %self.monitor.state().describe(), ?options, "Running one pass");
        Ok(self.engine.run_pass(options).await?)
    }

    /// Current queue and connectivity summary
    pub async fn summary(&self) -> Result<SyncSummary> {
        self.observer().probe().await;
        Ok(self.service.summary().await?)
    }
}

fn build_remote(
    config: &Config,
    user_id: UserId,
) -> Result<(Arc<dyn IRemoteStore>, Arc<dyn IAuthProvider>)> {
    let Some(base_url) = &config.remote.base_url else {
        warn!("No remote.base_url configured, sync passes are disabled");
        return Ok((Arc::new(UnconfiguredRemote), Arc::new(TokenAuth::signed_out())));
    };

    let auth = TokenAuth::from_env(config.remote.user_id.as_deref(), &config.remote.token_env)
        .context("Invalid remote credentials")?;
    if !auth.is_authenticated() {
        warn!(
            token_env = %config.remote.token_env,
            "No credentials available, sync passes are disabled until a token is provided"
        );
    }

    let mut client = RemoteClient::new(
        base_url,
        std::time::Duration::from_secs(config.remote.request_timeout_secs),
    )?;
    if let Some(token) = auth.token() {
        client.set_access_token(token);
    }
    info!(base_url = %client.base_url(), user = %user_id, "Remote store configured");

    Ok((
        Arc::new(HttpRemoteStore::new(client, user_id)),
        Arc::new(auth),
    ))
}

/// Local entity documents live next to the database
fn entities_dir(config: &Config) -> PathBuf {
    config
        .storage
        .database_path
        .parent()
        .map(|p| p.join("entities"))
        .unwrap_or_else(|| PathBuf::from("entities"))
}

async fn log_events(
    mut events: tokio::sync::broadcast::Receiver<SyncEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(SyncEvent::ConflictDetected { key }) => {
                warn!(%key, "Conflict needs resolution")
            }
            Ok(SyncEvent::PassFinished(result)) if !result.errors.is_empty() => {
                for error in &result.errors {
                    warn!(error = %error, "Pass error");
                }
            }
            Ok(event) => debug!(?event, "Sync event"),
            Err(RecvError::Lagged(missed)) => debug!(missed, "Event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
