//! Job runtime host process.
//!
//! Registers the demo job types, opens the configured store, schedules a
//! recurring demo job and consumes a demo queue until interrupted.

use std::time::Duration;

use actors::{
    EntityRegistry, FnJob, JobContext, JobFuture, JobScheduler, JobTypeRegistry, QueueClient,
    RuntimeConfig,
};
use jobs_core::QueueMessage;
use tracing_subscriber::EnvFilter;

fn demo_job_types() -> JobTypeRegistry {
    let mut job_types = JobTypeRegistry::new();

    // Demo: Echo job
    job_types.register(FnJob::new("echo", |ctx: JobContext| -> JobFuture {
        Box::pin(async move {
            tracing::info!(job = %ctx.job_name, run_id = %ctx.run_id, "Echo job: {:?}", ctx.parameters);
            Ok(())
        })
    }));

    // Demo: Sleep job, stops early when cancelled
    job_types.register(FnJob::new("sleep", |ctx: JobContext| -> JobFuture {
        let seconds = ctx
            .parameters
            .get("seconds")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5);
        Box::pin(async move {
            tracing::info!("Sleeping for {} seconds", seconds);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => Ok(()),
                _ = ctx.cancellation.cancelled() => Err("Sleep cancelled".to_string()),
            }
        })
    }));

    // Demo: Failing job
    job_types.register(FnJob::new("fail", |_ctx: JobContext| -> JobFuture {
        Box::pin(async { Err("Intentional failure".to_string()) })
    }));

    job_types
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Initializing job runtime...");

    let config = RuntimeConfig::from_env()?;
    let registry = EntityRegistry::open(config, demo_job_types()).await?;

    let scheduler = JobScheduler::new(registry.clone());
    scheduler
        .schedule_recurring("echo", "demo-echo", Duration::from_secs(30))
        .await?;

    let queues = QueueClient::new(registry.clone());
    queues
        .register_handler("demo", |message: QueueMessage| async move {
            tracing::info!(message_id = %message.id, "Received: {}", message.content);
            Ok(())
        })
        .await?;
    queues
        .send_message("demo", QueueMessage::new("hello from the job runtime"))
        .await?;

    tracing::info!("Job runtime initialized, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    queues.shutdown().await;
    registry.shutdown().await;
    Ok(())
}
