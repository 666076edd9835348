//! Serve command: wire the store, workflow, scheduler, and API together.

use std::sync::Arc;
use std::time::Duration;

use miette::{IntoDiagnostic, Result};
use tokio::sync::watch;
use tracing::{error, info};

use usher_join::{AttendeeClient, CredentialResolver, JoinWorkflow, WorkflowConfig};
use usher_scheduler::{JobExecutor, Scheduler};
use usher_store::{MemoryStore, RedisStore, StateStore};
use usher_web::{AppState, create_router};

/// Configuration for the serve command.
pub struct ServeConfig {
    pub port: u16,
    pub redis_url: Option<String>,
    pub join_endpoint: String,
    pub credential_endpoint: Option<String>,
    pub internal_secret: Option<String>,
    pub api_key: Option<String>,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
    pub create_attempts: u32,
    pub create_retry_delay_secs: u64,
}

/// Run the scheduling service until ctrl-c.
pub async fn run(config: ServeConfig) -> Result<()> {
    info!("starting usher");

    let store: Arc<dyn StateStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisStore::connect(url).await.into_diagnostic()?),
        None => {
            info!("no redis url configured, using in-process state store");
            Arc::new(MemoryStore::new())
        }
    };

    // Cold-start reset: stale join states and sweep claims from a previous
    // run would otherwise block every re-attempt forever
    store.reset().await.into_diagnostic()?;

    let resolver = Arc::new(
        CredentialResolver::new(
            store.clone(),
            config.credential_endpoint.clone(),
            config.internal_secret.clone(),
        )
        .with_default_key(config.api_key.clone()),
    );
    let client = AttendeeClient::new(&config.join_endpoint);
    let workflow = Arc::new(JoinWorkflow::new(
        store.clone(),
        client,
        resolver,
        WorkflowConfig {
            create_attempts: config.create_attempts,
            create_retry_delay: Duration::from_secs(config.create_retry_delay_secs),
            max_polls: config.max_polls,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        },
    ));

    let scheduler = Arc::new(Scheduler::new());

    let executor: JobExecutor = Box::new(move |job| {
        let workflow = workflow.clone();
        Box::pin(async move {
            workflow
                .run(&job.meeting_url, &job.bot_name)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_scheduler = scheduler.clone();
    let scheduler_handle = tokio::spawn(async move {
        loop_scheduler.run(shutdown_rx, executor).await;
    });

    let router = create_router(Arc::new(AppState { scheduler }));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .into_diagnostic()?;
    info!("scheduler API listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!(%error, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await
        .into_diagnostic()?;

    // Stop the timer loop and wait for it to drain
    let _ = shutdown_tx.send(true);
    scheduler_handle.await.into_diagnostic()?;

    info!("usher stopped");
    Ok(())
}
