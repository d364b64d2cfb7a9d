//! The amber-relay workflow engine daemon.
//!
//! Listens for execute/cancel events on NATS, drives workflow runs
//! through the orchestrator, and publishes realtime status updates back
//! out. Each run executes in its own task; a panicking run is closed by
//! the crash-recovery hook so its record never stays RUNNING.

mod config;
mod db;

use amber_relay_integration::Base64Cipher;
use amber_relay_workflow::{
    CancelWorkflowEvent, CancellationHandler, CancellationRegistry, ExecuteWorkflowEvent,
    ExecutionStore, ExecutorRegistry, ExecutorServices, GraphStore, NatsTransport, Orchestrator,
    PassthroughStepRunner, StatusSink,
};
use config::EngineConfig;
use db::{PostgresExecutionStore, PostgresGraphStore, PostgresVault};
use futures::StreamExt;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let transport = NatsTransport::connect(config.nats.clone())
        .await
        .expect("failed to connect to NATS");
    tracing::info!(url = %config.nats.url, "Connected to NATS");

    let graphs: Arc<dyn GraphStore> = Arc::new(PostgresGraphStore::new(db_pool.clone()));
    let executions: Arc<dyn ExecutionStore> =
        Arc::new(PostgresExecutionStore::new(db_pool.clone()));
    let status: Arc<dyn StatusSink> = Arc::new(transport.clone());
    let cancellations = Arc::new(CancellationRegistry::new());

    let services = ExecutorServices::new(
        Arc::new(PostgresVault::new(db_pool.clone())),
        Arc::new(Base64Cipher),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&graphs),
        Arc::clone(&executions),
        Arc::new(ExecutorRegistry::with_builtins()),
        services,
        Arc::clone(&status),
        Arc::new(PassthroughStepRunner),
        Arc::clone(&cancellations),
    ));

    let cancel_handler = Arc::new(CancellationHandler::new(
        Arc::clone(&cancellations),
        Arc::clone(&executions),
        Arc::clone(&graphs),
        Arc::clone(&status),
    ));

    let mut execute_sub = transport
        .subscribe_execute()
        .await
        .expect("failed to subscribe to execute events");
    let mut cancel_sub = transport
        .subscribe_cancel()
        .await
        .expect("failed to subscribe to cancel events");
    tracing::info!("Engine ready");

    loop {
        tokio::select! {
            Some(message) = execute_sub.next() => {
                let event = match ExecuteWorkflowEvent::from_json(&message.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping malformed execute event");
                        continue;
                    }
                };
                spawn_run(Arc::clone(&orchestrator), event);
            }
            Some(message) = cancel_sub.next() => {
                let event = match CancelWorkflowEvent::from_json(&message.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping malformed cancel event");
                        continue;
                    }
                };
                let handler = Arc::clone(&cancel_handler);
                tokio::spawn(async move {
                    if let Err(e) = handler.handle(event).await {
                        tracing::error!(error = %e, "Cancel handling failed");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }
}

/// Runs one workflow in its own task, with the crash hook as the last
/// line of defense: if the task panics, the execution record is closed
/// FAILED instead of staying RUNNING forever.
fn spawn_run(orchestrator: Arc<Orchestrator>, event: ExecuteWorkflowEvent) {
    let workflow_id = event.workflow_id;
    let event_id = event.event_id;

    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            if let Err(e) = orchestrator.run(event).await {
                tracing::warn!(%workflow_id, error = %e, "Run finished with error");
            }
        }
    });

    tokio::spawn(async move {
        if let Err(join_err) = run.await
            && join_err.is_panic()
        {
            tracing::error!(%workflow_id, "Run panicked; closing abandoned execution");
            if let Err(e) = orchestrator
                .fail_abandoned(workflow_id, event_id, "engine task panicked")
                .await
            {
                tracing::error!(%workflow_id, error = %e, "Crash hook failed");
            }
        }
    });
}
