//! Tether Runner
//!
//! Dispatches a handful of jobs to an in-process worker and supervises
//! their connections until every job has finished or been stopped.
//!
//! The runner registers a task worker with a local transport, hands each
//! job to the execution delegator, and stops anything still running once
//! the job timeout expires.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{Constraint, JobInvocation, JobResult, Trigger};
use tether_runner::config::Config;
use tether_runner::{ExecutionDelegator, LocalTransport, TaskWorker};
use tokio::time::{self, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_SERVICE: &str = "demo-worker";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tether Runner");

    let config = load_config()?;
    info!(
        "Loaded configuration: runner_id={}, max_active_jobs={}, job_timeout={:?}",
        config.runner_id, config.max_active_jobs, config.job_timeout
    );

    let transport = Arc::new(LocalTransport::new(config.connect_delay));
    transport.register_service(DEMO_SERVICE, Arc::new(demo_worker()));

    let (delegator, mut completions) = ExecutionDelegator::new(transport.clone(), &config);

    for job in demo_jobs().context("Failed to build demo jobs")? {
        let tag = job.tag.clone();
        match delegator.execute_job(job) {
            Ok(id) => info!("Job '{}' bound through connection {}", tag, id),
            Err(e) if e.is_bind_failure() => error!("No worker reachable for job '{}': {}", tag, e),
            Err(e) => error!("Failed to dispatch job '{}': {}", tag, e),
        }
    }

    let deadline = Instant::now() + config.job_timeout;

    while !delegator.active_jobs().is_empty() {
        match time::timeout_at(deadline, delegator.next_completion(&mut completions)).await {
            Ok(Some(completion)) if completion.result.is_success() => {
                info!("Job '{}' completed: {}", completion.tag, completion.result);
            }
            Ok(Some(completion)) => {
                warn!("Job '{}' failed: {}", completion.tag, completion.result);
            }
            Ok(None) => break,
            Err(_) => {
                for tag in delegator.active_jobs() {
                    warn!("Job '{}' exceeded {:?}, stopping", tag, config.job_timeout);
                    delegator.stop_job(&tag, true);
                }
            }
        }

        delegator.prune_unbound();
    }

    // Results reported by jobs that were stopped
    while let Ok(completion) = completions.try_recv() {
        info!("Job '{}' completed: {}", completion.tag, completion.result);
    }

    info!(
        "All jobs finished, {} binding(s) left open",
        transport.active_bindings()
    );

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(_) => {
            info!("Failed to load config from environment, using defaults");
            let mut config = Config::default();
            config.job_timeout = Duration::from_secs(5);
            config.validate()?;
            Ok(config)
        }
    }
}

/// Worker that sleeps for the job's `duration_ms` extra and reports the
/// result named by its `result` extra
fn demo_worker() -> TaskWorker {
    TaskWorker::new(DEMO_SERVICE, |job: JobInvocation| async move {
        let duration = job
            .extra("duration_ms")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or_default();

        time::sleep(duration).await;

        match job.extra("result").and_then(|v| v.as_str()) {
            Some("fail") => JobResult::FailNoRetry,
            Some("retry") => JobResult::FailRetry,
            _ => JobResult::Success,
        }
    })
}

fn demo_jobs() -> Result<Vec<JobInvocation>> {
    Ok(vec![
        JobInvocation::builder()
            .tag("greeting")
            .service(DEMO_SERVICE)
            .trigger(Trigger::now())
            .extra("duration_ms", serde_json::json!(200))
            .build()?,
        JobInvocation::builder()
            .tag("nightly-report")
            .service(DEMO_SERVICE)
            .trigger(Trigger::execution_window(0, 60)?)
            .constraint(Constraint::DeviceCharging)
            .extra("duration_ms", serde_json::json!(600_000))
            .build()?,
        JobInvocation::builder()
            .tag("flaky-upload")
            .service(DEMO_SERVICE)
            .constraint(Constraint::OnUnmeteredNetwork)
            .extra("duration_ms", serde_json::json!(500))
            .extra("result", serde_json::json!("fail"))
            .build()?,
        JobInvocation::builder()
            .tag("orphan")
            .service("missing-worker")
            .build()?,
    ])
}
