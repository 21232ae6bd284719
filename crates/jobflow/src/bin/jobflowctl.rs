use std::env;
use std::sync::Arc;

use jobflow::config::Config;
use jobflow::db;
use jobflow::jobs::{EchoExecutor, Job, JobRunner, JobService, JobStatus, JobStore, JobsRepo};
use jobflow::queue::{DispatchQueue, RedisQueue};
use uuid::Uuid;

const USAGE: &str = "jobflowctl <command>\n\
     Commands:\n\
     - migrate\n\
     - reset\n\
     - seed <n> [max_retries]\n\
     - stats\n\
     - list [status] [limit]\n\
     - show <job_id>\n\
     - requeue <job_id>\n\
     - run <job_id>\n\
     - set-status <job_id> <status>\n\
     \n\
     Uses DATABASE_URL and REDIS_URL.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let cfg = Config::from_env()?;
    let pool = db::make_pool(&cfg.database_url).await?;

    if args[1] == "migrate" {
        db::run_migrations(&pool).await?;
        println!("migrations OK");
        return Ok(());
    }

    let store = JobsRepo::new(pool).with_list_max_limit(cfg.list_max_limit);
    let queue = RedisQueue::connect(&cfg.redis_url, cfg.queue_key.clone()).await?;
    let runner = JobRunner::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        Arc::new(EchoExecutor::new(cfg.task_delay).fail_on_prefix(cfg.fail_prefix.clone())),
    );
    let service = JobService::new(runner)
        .with_default_max_retries(cfg.default_max_retries)
        .with_list_max_limit(cfg.list_max_limit);

    match args[1].as_str() {
        "reset" => {
            let n = store.reset().await?;
            queue.clear().await?;
            println!("reset OK (removed {n} jobs, cleared {})", queue.key());
        }
        "seed" => {
            let n: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
            let max_retries: Option<i32> = args.get(3).and_then(|s| s.parse().ok());
            for i in 0..n {
                let payload = if i % 2 == 0 {
                    format!("job-{i}")
                } else {
                    format!("fail-{i}")
                };
                let job = service.create_job(payload, max_retries).await?;
                println!("+ inserted job id={} payload={}", job.id, job.payload);
            }
        }
        "stats" => {
            let stats = service.job_stats().await?;
            let depth = queue.depth().await?;
            println!(
                "jobs: total={} queued={} processing={} done={} failed={} | dispatch depth={}",
                stats.total, stats.queued, stats.processing, stats.done, stats.failed, depth
            );
        }
        "list" => {
            let status = args.get(2).map(|s| s.parse::<JobStatus>()).transpose()?;
            let limit: Option<i64> = args.get(3).and_then(|s| s.parse().ok());
            for job in service.list_jobs(status, limit, None).await? {
                print_job(&job);
            }
        }
        "show" => {
            let id = parse_id(args.get(2), "usage: jobflowctl show <job_id>")?;
            print_job(&service.get_job(id).await?);
        }
        "requeue" => {
            let id = parse_id(args.get(2), "usage: jobflowctl requeue <job_id>")?;
            print_job(&service.requeue_job(id).await?);
        }
        "run" => {
            let id = parse_id(args.get(2), "usage: jobflowctl run <job_id>")?;
            print_job(&service.run_job_sync(id).await?);
        }
        "set-status" => {
            let id = parse_id(args.get(2), "usage: jobflowctl set-status <job_id> <status>")?;
            let status = args
                .get(3)
                .ok_or_else(|| anyhow::anyhow!("usage: jobflowctl set-status <job_id> <status>"))?
                .parse::<JobStatus>()?;
            print_job(&service.update_job_status(id, status).await?);
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn parse_id(raw: Option<&String>, usage: &str) -> anyhow::Result<Uuid> {
    let raw = raw.ok_or_else(|| anyhow::anyhow!("{usage}"))?;
    Ok(raw.parse()?)
}

fn print_job(job: &Job) {
    println!(
        "JOB: id={} status={} attempts={}/{} created_at={} updated_at={} payload={:?} result={:?} error={:?}",
        job.id,
        job.status,
        job.attempts,
        job.attempt_budget(),
        job.created_at.to_rfc3339(),
        job.updated_at.to_rfc3339(),
        job.payload,
        job.result,
        job.error
    );
}
