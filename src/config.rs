use std::env;
use std::time::Duration;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(default)
}

/// Scheduler tunables, read once at startup instead of per use site.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// How often the loop polls for due posts.
    pub poll_interval: Duration,
    /// Maximum number of due posts fetched per tick.
    pub tick_batch_limit: i64,
    /// How many posts execute concurrently within a tick.
    pub publish_concurrency: usize,
    /// Attempt ceiling before a post is forced into `failed`.
    pub max_publish_attempts: i32,
    /// A post attempted more recently than this is not re-selected, so the
    /// inter-attempt delay is explicit rather than implied by the tick rate.
    pub min_retry_delay: Duration,
    /// Caller-side timeout on content-store and generation calls.
    pub external_call_timeout: Duration,
}

impl SchedulerSettings {
    pub fn from_env() -> Self {
        SchedulerSettings {
            poll_interval: Duration::from_secs(env_u64("SCHEDULER_POLL_INTERVAL_SECONDS", 60)),
            tick_batch_limit: env_i64("SCHEDULER_TICK_BATCH_LIMIT", 100),
            publish_concurrency: env_u64("SCHEDULER_PUBLISH_CONCURRENCY", 10).max(1) as usize,
            max_publish_attempts: env_i32("MAX_PUBLISH_ATTEMPTS", 3).max(1),
            min_retry_delay: Duration::from_secs(env_u64("MIN_RETRY_DELAY_SECONDS", 300)),
            external_call_timeout: Duration::from_secs(env_u64(
                "EXTERNAL_CALL_TIMEOUT_SECONDS",
                90,
            )),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            poll_interval: Duration::from_secs(60),
            tick_batch_limit: 100,
            publish_concurrency: 10,
            max_publish_attempts: 3,
            min_retry_delay: Duration::from_secs(300),
            external_call_timeout: Duration::from_secs(90),
        }
    }
}

pub struct Config {
    pub database_url: String,
    pub generation_service_url: String,
    pub generation_service_token: Option<String>,
    pub scheduler: SchedulerSettings,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let generation_service_url =
            env::var("GENERATION_SERVICE_URL").expect("GENERATION_SERVICE_URL must be set");

        let generation_service_token = env::var("GENERATION_SERVICE_TOKEN").ok();

        Config {
            database_url,
            generation_service_url,
            generation_service_token,
            scheduler: SchedulerSettings::from_env(),
        }
    }
}
