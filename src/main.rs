use std::sync::Arc;

use reqwest::Client;
use sqlx::PgPool;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use postline_publisher::config::Config;
use postline_publisher::db::campaign_repository::CampaignRepository;
use postline_publisher::db::postgres_campaign_repository::PostgresCampaignRepository;
use postline_publisher::db::postgres_scheduled_post_repository::PostgresScheduledPostRepository;
use postline_publisher::db::scheduled_post_repository::ScheduledPostRepository;
use postline_publisher::scheduler::PublishScheduler;
use postline_publisher::services::content_store::{ContentStore, PostgresContentStore};
use postline_publisher::services::generation::{ContentGenerator, HttpContentGenerator};
use postline_publisher::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Arc::new(Config::from_env());

    let pg_pool = establish_connection(&config.database_url).await?;

    let scheduled_posts = Arc::new(PostgresScheduledPostRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn ScheduledPostRepository>;

    let campaigns = Arc::new(PostgresCampaignRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn CampaignRepository>;

    let content_store = Arc::new(PostgresContentStore {
        pool: pg_pool.clone(),
    }) as Arc<dyn ContentStore>;

    let http_client = Client::builder()
        .timeout(config.scheduler.external_call_timeout)
        .build()?;
    let content_generator = Arc::new(HttpContentGenerator::new(
        http_client,
        config.generation_service_url.clone(),
        config.generation_service_token.clone(),
    )) as Arc<dyn ContentGenerator>;

    let state = AppState {
        scheduled_posts,
        campaigns,
        content_store,
        content_generator,
        config,
    };

    let scheduler = PublishScheduler::new(state);
    scheduler.start().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    scheduler.stop().await;

    Ok(())
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url).await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    info!("✅ Successfully connected to the database");
    Ok(pool)
}
