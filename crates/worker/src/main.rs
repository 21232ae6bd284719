use jobflow::api;
use jobflow::config;
use jobflow::db;
use jobflow::telemetry;

use jobflow::jobs::{EchoExecutor, JobRunner, JobService, JobsRepo, WorkerConfig, WorkerPool};
use jobflow::queue::RedisQueue;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    telemetry::init(cfg.log_json);

    info!(
        worker_id = %cfg.worker_id,
        workers = cfg.worker_count,
        queue_key = %cfg.queue_key,
        pop_timeout_secs = cfg.pop_timeout.as_secs(),
        api = %cfg.api_addr.clone().unwrap_or_else(|| "disabled".to_string()),
        migrate_on_startup = cfg.migrate_on_startup,
        "jobflow starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let store = JobsRepo::new(pool).with_list_max_limit(cfg.list_max_limit);
    let queue = RedisQueue::connect(&cfg.redis_url, cfg.queue_key.clone()).await?;
    let executor = EchoExecutor::new(cfg.task_delay).fail_on_prefix(cfg.fail_prefix.clone());

    let runner = JobRunner::new(Arc::new(store), Arc::new(queue), Arc::new(executor));
    let service = JobService::new(runner.clone())
        .with_default_max_retries(cfg.default_max_retries)
        .with_list_max_limit(cfg.list_max_limit);

    let shutdown = CancellationToken::new();

    // ---- Worker tasks ----
    let workers = WorkerPool::spawn(
        cfg.worker_count,
        &cfg.worker_id,
        runner,
        WorkerConfig {
            pop_timeout: cfg.pop_timeout,
            ..WorkerConfig::default()
        },
        shutdown.clone(),
    );

    // ---- API task ----
    let app = api::router(service);
    let api_addr = cfg.api_addr.clone();
    let api_shutdown = shutdown.clone();
    let mut api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("api listening on http://{addr}");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
                .await?;
        } else {
            api_shutdown.cancelled().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    let early_api_exit = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("ctrl-c received, shutting down");
            None
        }
        res = &mut api_handle => Some(res),
    };

    // in-flight jobs finish; workers exit at their next loop check
    workers.shutdown();
    workers.join().await;

    let api_result = match early_api_exit {
        Some(res) => res,
        None => api_handle.await,
    };
    match api_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "api server failed"),
        Err(e) => error!(error = %e, "api task panicked"),
    }

    info!("jobflow stopped");
    Ok(())
}
