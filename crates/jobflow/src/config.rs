use std::time::Duration;

use crate::jobs::service::DEFAULT_MAX_RETRIES;
use crate::jobs::store::DEFAULT_LIST_MAX_LIMIT;
use crate::queue::redis_list::DEFAULT_QUEUE_KEY;

/// Runtime configuration, loaded from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub queue_key: String,
    pub worker_id: String,
    pub worker_count: usize,
    pub pop_timeout: Duration,
    pub task_delay: Duration,
    pub fail_prefix: String,
    pub default_max_retries: i32,
    pub list_max_limit: i64,
    pub api_addr: Option<String>,
    pub migrate_on_startup: bool,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "redis://localhost:6379/0".to_string());

        let queue_key = env_or_fallback("JOBFLOW_QUEUE_KEY", "JOB_QUEUE_KEY")
            .unwrap_or_else(|| DEFAULT_QUEUE_KEY.to_string());

        let worker_id = env_or_fallback("JOBFLOW_WORKER_ID", "WORKER_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker".to_string());

        let worker_count = env_parse::<usize>("JOBFLOW_WORKERS")
            .unwrap_or(1)
            .clamp(1, 64);

        let pop_timeout = Duration::from_secs(
            env_parse::<u64>("JOBFLOW_POP_TIMEOUT_SECS")
                .unwrap_or(1)
                .clamp(1, 60),
        );

        let task_delay =
            Duration::from_millis(env_parse::<u64>("JOBFLOW_TASK_DELAY_MS").unwrap_or(0));

        let fail_prefix =
            std::env::var("JOBFLOW_FAIL_PREFIX").unwrap_or_else(|_| "fail".to_string());

        let default_max_retries = env_parse::<i32>("JOBFLOW_DEFAULT_MAX_RETRIES")
            .unwrap_or(DEFAULT_MAX_RETRIES)
            .max(0);

        let list_max_limit = env_parse::<i64>("JOBFLOW_LIST_MAX_LIMIT")
            .unwrap_or(DEFAULT_LIST_MAX_LIMIT)
            .max(1);

        let api_addr = match env_or_fallback("JOBFLOW_API_ADDR", "API_ADDR") {
            Some(v) => normalize_optional_addr(&v),
            None => Some("0.0.0.0:8000".to_string()),
        };

        let migrate_on_startup = env_bool("JOBFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);
        let log_json = env_bool("JOBFLOW_LOG_JSON").unwrap_or(false);

        Ok(Self {
            database_url,
            redis_url,
            queue_key,
            worker_id,
            worker_count,
            pop_timeout,
            task_delay,
            fail_prefix,
            default_max_retries,
            list_max_limit,
            api_addr,
            migrate_on_startup,
            log_json,
        })
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| parse_bool(&v))
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_can_be_switched_off() {
        assert_eq!(normalize_optional_addr("off"), None);
        assert_eq!(normalize_optional_addr(" NONE "), None);
        assert_eq!(normalize_optional_addr(""), None);
        assert_eq!(
            normalize_optional_addr("127.0.0.1:9000"),
            Some("127.0.0.1:9000".to_string())
        );
    }

    #[test]
    fn truthy_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("Yes"));
        assert!(parse_bool(" on "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }
}
