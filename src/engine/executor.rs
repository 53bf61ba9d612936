use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::article::ArticleStatus;
use crate::models::scheduled_post::{ContentSource, ScheduledPost};
use crate::services::content_store::{ContentStoreError, NewArticle};
use crate::services::generation::GenerationError;
use crate::state::AppState;

const PERSISTENCE_MAX_ATTEMPTS: usize = 3;
#[cfg(test)]
const PERSISTENCE_INITIAL_BACKOFF: Duration = Duration::from_millis(5);
#[cfg(not(test))]
const PERSISTENCE_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

pub const MAX_ATTEMPTS_MESSAGE: &str = "exceeded maximum retry attempts";

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(
        "executor persistence operation `{operation}` failed for post {post_id} after {attempts} attempts: {source}"
    )]
    Persistence {
        post_id: Uuid,
        operation: &'static str,
        attempts: usize,
        #[source]
        source: sqlx::Error,
    },
}

impl ExecutorError {
    pub fn post_id(&self) -> Uuid {
        match self {
            ExecutorError::Persistence { post_id, .. } => *post_id,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            ExecutorError::Persistence { operation, .. } => operation,
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            ExecutorError::Persistence { attempts, .. } => *attempts,
        }
    }
}

/// One attempt's failure. The `Display` string is what lands on the post's
/// `error_message` for the user to see.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("scheduled post has no content source")]
    MissingSource,
    #[error("article {0} no longer exists")]
    ContentMissing(Uuid),
    #[error("generation prompt rejected: {0}")]
    PromptRejected(String),
    #[error("content generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("content store call failed: {0}")]
    ContentStore(#[from] ContentStoreError),
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
}

/// Runs one scheduled post through a single publish attempt. Errors from the
/// attempt itself (generation, content store) never escape: they are
/// recorded on the post and retried by re-polling. Only exhausted
/// persistence retries bubble, so the dispatcher can log them.
pub async fn execute_post(state: AppState, post_id: Uuid) -> Result<(), ExecutorError> {
    let repo = state.scheduled_posts.clone();
    let post = retry_with_backoff(post_id, "find_for_execution", || {
        let repo = repo.clone();
        async move { repo.find_for_execution(post_id).await }
    })
    .await?;

    let Some(post) = post else {
        warn!(%post_id, "Scheduled post vanished before execution");
        return Ok(());
    };

    if post.status.is_terminal() {
        debug!(%post_id, status = %post.status, "Skipping already-settled post");
        return Ok(());
    }

    let now = OffsetDateTime::now_utc();
    if post.scheduled_at > now {
        debug!(%post_id, scheduled_at = %post.scheduled_at, "Post not due yet");
        return Ok(());
    }

    let max_attempts = state.config.scheduler.max_publish_attempts;
    if post.publish_attempts >= max_attempts {
        warn!(
            %post_id,
            attempts = post.publish_attempts,
            "Attempt ceiling already reached, failing post"
        );
        mark_failed_with_retry(&state, post_id, MAX_ATTEMPTS_MESSAGE).await?;
        return Ok(());
    }

    // Claim the attempt. This is the only write not retried: retrying an
    // ambiguous claim could record a phantom attempt against the ceiling.
    let claimed = match state.scheduled_posts.claim_for_attempt(post_id, now).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            debug!(%post_id, "Post was claimed elsewhere or already advanced");
            return Ok(());
        }
        Err(source) => {
            return Err(ExecutorError::Persistence {
                post_id,
                operation: "claim_for_attempt",
                attempts: 1,
                source,
            });
        }
    };

    match publish_content(&state, &claimed).await {
        Ok(created_content_id) => {
            if let Some(content_id) = created_content_id {
                let repo = state.scheduled_posts.clone();
                retry_with_backoff(post_id, "set_content_id", move || {
                    let repo = repo.clone();
                    async move { repo.set_content_id(post_id, content_id).await }
                })
                .await?;
            }

            let repo = state.scheduled_posts.clone();
            retry_with_backoff(post_id, "mark_published", move || {
                let repo = repo.clone();
                async move { repo.mark_published(post_id).await }
            })
            .await?;

            info!(
                %post_id,
                attempt = claimed.publish_attempts,
                "Scheduled post published"
            );

            if let Some(campaign_id) = claimed.campaign_id {
                apply_campaign_side_effects(&state, post_id, campaign_id).await;
            }

            Ok(())
        }
        Err(publish_err) => {
            let message = publish_err.to_string();
            warn!(
                %post_id,
                attempt = claimed.publish_attempts,
                max_attempts,
                %message,
                "Publish attempt failed"
            );

            if claimed.publish_attempts >= max_attempts {
                let final_message = format!("{MAX_ATTEMPTS_MESSAGE}: {message}");
                mark_failed_with_retry(&state, post_id, &final_message).await?;
            } else {
                let repo = state.scheduled_posts.clone();
                let recorded = message.clone();
                retry_with_backoff(post_id, "record_failure", move || {
                    let repo = repo.clone();
                    let message = recorded.clone();
                    async move { repo.record_failure(post_id, &message).await }
                })
                .await?;
            }

            Ok(())
        }
    }
}

/// Resolves the post's content source and performs the publish. Returns the
/// id of a newly created article on the generation path so the caller can
/// record it on the post.
async fn publish_content(
    state: &AppState,
    post: &ScheduledPost,
) -> Result<Option<Uuid>, PublishError> {
    let call_timeout = state.config.scheduler.external_call_timeout;

    match post.content_source() {
        None => Err(PublishError::MissingSource),
        Some(ContentSource::Existing(content_id)) => {
            let article = with_timeout(
                call_timeout,
                "article lookup",
                state.content_store.find_by_id(content_id, post.site_id),
            )
            .await??
            .ok_or(PublishError::ContentMissing(content_id))?;

            if article.status != ArticleStatus::Published {
                with_timeout(
                    call_timeout,
                    "article publish",
                    state
                        .content_store
                        .publish(content_id, post.site_id, post.user_id),
                )
                .await??
                .ok_or(PublishError::ContentMissing(content_id))?;
            }

            Ok(None)
        }
        Some(ContentSource::Generated(prompt)) => {
            let analysis = with_timeout(
                call_timeout,
                "prompt analysis",
                state.content_generator.analyze_prompt(&prompt),
            )
            .await??;

            if !analysis.is_valid {
                let reason = analysis
                    .rejection_reason
                    .unwrap_or_else(|| "prompt did not pass analysis".to_string());
                return Err(PublishError::PromptRejected(reason));
            }

            let generated = with_timeout(
                call_timeout,
                "article generation",
                state.content_generator.generate_article(&prompt, &analysis),
            )
            .await??;

            let article = with_timeout(
                call_timeout,
                "article create",
                state.content_store.create(
                    post.site_id,
                    post.user_id,
                    NewArticle {
                        title: generated.title,
                        body: generated.body,
                        excerpt: generated.excerpt,
                        status: ArticleStatus::Published,
                    },
                ),
            )
            .await??;

            Ok(Some(article.id))
        }
    }
}

async fn with_timeout<T, E>(
    limit: Duration,
    operation: &'static str,
    fut: impl std::future::Future<Output = Result<T, E>>,
) -> Result<Result<T, E>, PublishError> {
    timeout(limit, fut).await.map_err(|_| PublishError::Timeout {
        operation,
        seconds: limit.as_secs(),
    })
}

/// Campaign bookkeeping after a successful publish. Awaited synchronously
/// but fully contained: a failure here is logged and never unwinds the
/// already-published post.
async fn apply_campaign_side_effects(state: &AppState, post_id: Uuid, campaign_id: Uuid) {
    let campaigns = state.campaigns.clone();
    let incremented = retry_with_backoff(post_id, "increment_published", || {
        let campaigns = campaigns.clone();
        async move { campaigns.increment_published(campaign_id).await }
    })
    .await;

    match incremented {
        Ok(true) => {}
        Ok(false) => {
            warn!(%post_id, %campaign_id, "Campaign missing while recording published post");
            return;
        }
        Err(err) => {
            warn!(%post_id, %campaign_id, ?err, "Failed to record published post on campaign");
            return;
        }
    }

    let now = OffsetDateTime::now_utc();
    let campaigns = state.campaigns.clone();
    match retry_with_backoff(post_id, "complete_if_ended", move || {
        let campaigns = campaigns.clone();
        async move { campaigns.complete_if_ended(campaign_id, now).await }
    })
    .await
    {
        Ok(true) => {
            info!(%campaign_id, "Campaign window closed, marked completed");
        }
        Ok(false) => {}
        Err(err) => {
            warn!(%post_id, %campaign_id, ?err, "Failed to run campaign completion check");
        }
    }
}

async fn mark_failed_with_retry(
    state: &AppState,
    post_id: Uuid,
    message: &str,
) -> Result<(), ExecutorError> {
    let repo = state.scheduled_posts.clone();
    let message = message.to_string();

    retry_with_backoff(post_id, "mark_failed", move || {
        let repo = repo.clone();
        let message = message.clone();
        async move { repo.mark_failed(post_id, &message).await }
    })
    .await
}

async fn retry_with_backoff<T, Fut, F>(
    post_id: Uuid,
    operation: &'static str,
    mut op: F,
) -> Result<T, ExecutorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0usize;
    let mut backoff = PERSISTENCE_INITIAL_BACKOFF;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < PERSISTENCE_MAX_ATTEMPTS => {
                warn!(
                    %post_id,
                    operation,
                    attempt,
                    ?err,
                    "executor persistence operation failed; retrying"
                );
                sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => {
                error!(
                    %post_id,
                    operation,
                    attempt,
                    ?err,
                    "executor persistence operation exhausted retries"
                );
                return Err(ExecutorError::Persistence {
                    post_id,
                    operation,
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SchedulerSettings};
    use crate::db::campaign_repository::MockCampaignRepository;
    use crate::db::scheduled_post_repository::MockScheduledPostRepository;
    use crate::models::article::Article;
    use crate::models::scheduled_post::ScheduledPostStatus;
    use crate::services::content_store::MockContentStore;
    use crate::services::generation::{
        ContentGenerator, GeneratedArticle, MockContentGenerator, PromptAnalysis,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use time::Duration as TimeDuration;

    fn build_state(
        posts: MockScheduledPostRepository,
        campaigns: MockCampaignRepository,
        store: MockContentStore,
        generator: MockContentGenerator,
    ) -> AppState {
        AppState {
            scheduled_posts: Arc::new(posts),
            campaigns: Arc::new(campaigns),
            content_store: Arc::new(store),
            content_generator: Arc::new(generator),
            config: Arc::new(Config {
                database_url: String::new(),
                generation_service_url: String::new(),
                generation_service_token: None,
                scheduler: SchedulerSettings {
                    external_call_timeout: Duration::from_millis(200),
                    ..SchedulerSettings::default()
                },
            }),
        }
    }

    fn due_post(status: ScheduledPostStatus, attempts: i32) -> ScheduledPost {
        let now = OffsetDateTime::now_utc();
        ScheduledPost {
            id: Uuid::new_v4(),
            site_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            campaign_id: None,
            content_id: Some(Uuid::new_v4()),
            auto_generate: false,
            generation_prompt: None,
            scheduled_at: now - TimeDuration::minutes(1),
            timezone: "UTC".into(),
            status,
            publish_attempts: attempts,
            last_attempt_at: None,
            error_message: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn generated_post(attempts: i32) -> ScheduledPost {
        let mut post = due_post(ScheduledPostStatus::Pending, attempts);
        post.content_id = None;
        post.auto_generate = true;
        post.generation_prompt = Some("weekly digest of release notes".into());
        post
    }

    fn article_fixture(id: Uuid, site_id: Uuid, status: ArticleStatus) -> Article {
        let now = OffsetDateTime::now_utc();
        Article {
            id,
            site_id,
            user_id: Uuid::new_v4(),
            title: "A title".into(),
            body: "A body".into(),
            excerpt: None,
            status,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn valid_analysis() -> PromptAnalysis {
        PromptAnalysis {
            is_valid: true,
            topic: "releases".into(),
            domain: "software".into(),
            audience: "developers".into(),
            purpose: "inform".into(),
            rejection_reason: None,
        }
    }

    #[tokio::test]
    async fn publishes_existing_draft_article() {
        let post = due_post(ScheduledPostStatus::Pending, 0);
        let post_id = post.id;
        let site_id = post.site_id;
        let content_id = post.content_id.unwrap();

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            claimed.last_attempt_at = Some(OffsetDateTime::now_utc());
            Ok(Some(claimed))
        });
        posts
            .expect_mark_published()
            .times(1)
            .withf(move |id| *id == post_id)
            .returning(|_| Ok(()));

        let mut store = MockContentStore::new();
        store
            .expect_find_by_id()
            .withf(move |id, site| *id == content_id && *site == site_id)
            .returning(move |id, site| Ok(Some(article_fixture(id, site, ArticleStatus::Draft))));
        store
            .expect_publish()
            .times(1)
            .returning(move |id, site, _| {
                Ok(Some(article_fixture(id, site, ArticleStatus::Published)))
            });

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            store,
            MockContentGenerator::new(),
        );

        execute_post(state, post_id)
            .await
            .expect("publish should succeed");
    }

    #[tokio::test]
    async fn skips_article_publish_when_already_published() {
        let post = due_post(ScheduledPostStatus::Scheduled, 0);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            Ok(Some(claimed))
        });
        posts.expect_mark_published().times(1).returning(|_| Ok(()));

        let mut store = MockContentStore::new();
        store.expect_find_by_id().returning(move |id, site| {
            Ok(Some(article_fixture(id, site, ArticleStatus::Published)))
        });
        // No expect_publish: re-publishing an already-published article would
        // trip the mock.

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            store,
            MockContentGenerator::new(),
        );

        execute_post(state, post_id)
            .await
            .expect("already-published article should settle the post");
    }

    #[tokio::test]
    async fn generates_article_and_records_content_id() {
        let post = generated_post(0);
        let post_id = post.id;
        let new_article_id = Uuid::new_v4();

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            Ok(Some(claimed))
        });
        posts
            .expect_set_content_id()
            .times(1)
            .withf(move |id, content| *id == post_id && *content == new_article_id)
            .returning(|_, _| Ok(()));
        posts.expect_mark_published().times(1).returning(|_| Ok(()));

        let mut generator = MockContentGenerator::new();
        generator
            .expect_analyze_prompt()
            .returning(|_| Ok(valid_analysis()));
        generator.expect_generate_article().returning(|_, _| {
            Ok(GeneratedArticle {
                title: "What's New".into(),
                body: "Long body".into(),
                excerpt: Some("Short excerpt".into()),
            })
        });

        let mut store = MockContentStore::new();
        store
            .expect_create()
            .times(1)
            .withf(|_, _, article| article.status == ArticleStatus::Published)
            .returning(move |site_id, _, _| {
                Ok(article_fixture(
                    new_article_id,
                    site_id,
                    ArticleStatus::Published,
                ))
            });

        let state = build_state(posts, MockCampaignRepository::new(), store, generator);

        execute_post(state, post_id)
            .await
            .expect("generated publish should succeed");
    }

    #[tokio::test]
    async fn terminal_post_is_left_alone() {
        let post = due_post(ScheduledPostStatus::Published, 1);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(post.clone())));
        // No further expectations: any write would panic the mock.

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            MockContentStore::new(),
            MockContentGenerator::new(),
        );

        execute_post(state, post_id)
            .await
            .expect("terminal post should be a no-op");
    }

    #[tokio::test]
    async fn future_post_is_left_alone() {
        let mut post = due_post(ScheduledPostStatus::Pending, 0);
        post.scheduled_at = OffsetDateTime::now_utc() + TimeDuration::hours(1);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(post.clone())));

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            MockContentStore::new(),
            MockContentGenerator::new(),
        );

        execute_post(state, post_id)
            .await
            .expect("not-yet-due post should be a no-op");
    }

    #[tokio::test]
    async fn missing_post_is_left_alone() {
        let mut posts = MockScheduledPostRepository::new();
        posts.expect_find_for_execution().returning(|_| Ok(None));

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            MockContentStore::new(),
            MockContentGenerator::new(),
        );

        execute_post(state, Uuid::new_v4())
            .await
            .expect("missing post should be a no-op");
    }

    #[tokio::test]
    async fn ceiling_reached_before_claim_fails_post() {
        let post = due_post(ScheduledPostStatus::Pending, 3);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(post.clone())));
        posts
            .expect_mark_failed()
            .times(1)
            .withf(move |id, message| *id == post_id && message == MAX_ATTEMPTS_MESSAGE)
            .returning(|_, _| Ok(()));

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            MockContentStore::new(),
            MockContentGenerator::new(),
        );

        execute_post(state, post_id)
            .await
            .expect("ceiling check should settle the post");
    }

    #[tokio::test]
    async fn lost_claim_is_a_noop() {
        let post = due_post(ScheduledPostStatus::Pending, 0);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(post.clone())));
        posts.expect_claim_for_attempt().returning(|_, _| Ok(None));

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            MockContentStore::new(),
            MockContentGenerator::new(),
        );

        execute_post(state, post_id)
            .await
            .expect("losing the claim race should be a no-op");
    }

    #[tokio::test]
    async fn missing_article_records_retryable_failure() {
        let post = due_post(ScheduledPostStatus::Pending, 0);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            Ok(Some(claimed))
        });
        posts
            .expect_record_failure()
            .times(1)
            .withf(|_, message| message.contains("no longer exists"))
            .returning(|_, _| Ok(()));

        let mut store = MockContentStore::new();
        store.expect_find_by_id().returning(|_, _| Ok(None));

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            store,
            MockContentGenerator::new(),
        );

        execute_post(state, post_id)
            .await
            .expect("vanished article should count as a failed attempt");
    }

    #[tokio::test]
    async fn prompt_rejection_is_retried_not_failed() {
        let post = generated_post(0);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            Ok(Some(claimed))
        });
        posts
            .expect_record_failure()
            .times(1)
            .withf(|_, message| message.contains("prompt is too vague"))
            .returning(|_, _| Ok(()));

        let mut generator = MockContentGenerator::new();
        generator.expect_analyze_prompt().returning(|_| {
            Ok(PromptAnalysis {
                is_valid: false,
                topic: String::new(),
                domain: String::new(),
                audience: String::new(),
                purpose: String::new(),
                rejection_reason: Some("prompt is too vague".into()),
            })
        });

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            MockContentStore::new(),
            generator,
        );

        execute_post(state, post_id)
            .await
            .expect("rejected prompt should stay retryable");
    }

    #[tokio::test]
    async fn third_attempt_succeeds_after_two_failures() {
        let post = generated_post(0);
        let post_id = post.id;
        let new_article_id = Uuid::new_v4();

        let attempts = Arc::new(std::sync::Mutex::new(0i32));

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        let fetch_attempts = attempts.clone();
        posts.expect_find_for_execution().returning(move |_| {
            let mut current = fetched.clone();
            current.publish_attempts = *fetch_attempts.lock().unwrap();
            Ok(Some(current))
        });
        let claim_attempts = attempts.clone();
        let claim_post = post.clone();
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut count = claim_attempts.lock().unwrap();
            *count += 1;
            let mut claimed = claim_post.clone();
            claimed.publish_attempts = *count;
            claimed.last_attempt_at = Some(OffsetDateTime::now_utc());
            Ok(Some(claimed))
        });
        posts
            .expect_record_failure()
            .times(2)
            .withf(|_, message| message.contains("504"))
            .returning(|_, _| Ok(()));
        posts
            .expect_set_content_id()
            .times(1)
            .withf(move |id, content| *id == post_id && *content == new_article_id)
            .returning(|_, _| Ok(()));
        posts.expect_mark_published().times(1).returning(|_| Ok(()));

        let generation_calls = Arc::new(std::sync::Mutex::new(0u32));
        let mut generator = MockContentGenerator::new();
        generator.expect_analyze_prompt().times(3).returning(move |_| {
            let mut calls = generation_calls.lock().unwrap();
            *calls += 1;
            if *calls < 3 {
                Err(GenerationError::Service {
                    status: 504,
                    message: "generation timed out".into(),
                })
            } else {
                Ok(valid_analysis())
            }
        });
        generator
            .expect_generate_article()
            .times(1)
            .returning(|_, _| {
                Ok(GeneratedArticle {
                    title: "What's New".into(),
                    body: "Long body".into(),
                    excerpt: None,
                })
            });

        let mut store = MockContentStore::new();
        store.expect_create().times(1).returning(move |site_id, _, _| {
            Ok(article_fixture(
                new_article_id,
                site_id,
                ArticleStatus::Published,
            ))
        });

        let state = build_state(posts, MockCampaignRepository::new(), store, generator);

        // Each tick re-selects the post until the third attempt lands.
        for _ in 0..3 {
            execute_post(state.clone(), post_id)
                .await
                .expect("each attempt should settle");
        }
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn failure_at_ceiling_marks_post_failed() {
        let post = generated_post(2);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 3;
            Ok(Some(claimed))
        });
        posts
            .expect_mark_failed()
            .times(1)
            .withf(|_, message| {
                message.starts_with(MAX_ATTEMPTS_MESSAGE) && message.contains("unavailable")
            })
            .returning(|_, _| Ok(()));

        let mut generator = MockContentGenerator::new();
        generator.expect_analyze_prompt().returning(|_| {
            Err(GenerationError::Service {
                status: 503,
                message: "unavailable".into(),
            })
        });

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            MockContentStore::new(),
            generator,
        );

        execute_post(state, post_id)
            .await
            .expect("ceiling failure should settle the post");
    }

    #[tokio::test]
    async fn slow_generation_counts_as_attempt_failure() {
        struct StallingGenerator;

        #[async_trait]
        impl ContentGenerator for StallingGenerator {
            async fn analyze_prompt(
                &self,
                _prompt: &str,
            ) -> Result<PromptAnalysis, GenerationError> {
                std::future::pending().await
            }

            async fn generate_article(
                &self,
                _prompt: &str,
                _analysis: &PromptAnalysis,
            ) -> Result<GeneratedArticle, GenerationError> {
                std::future::pending().await
            }
        }

        let post = generated_post(0);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            Ok(Some(claimed))
        });
        posts
            .expect_record_failure()
            .times(1)
            .withf(|_, message| message.contains("timed out"))
            .returning(|_, _| Ok(()));

        let state = AppState {
            scheduled_posts: Arc::new(posts),
            campaigns: Arc::new(MockCampaignRepository::new()),
            content_store: Arc::new(MockContentStore::new()),
            content_generator: Arc::new(StallingGenerator),
            config: Arc::new(Config {
                database_url: String::new(),
                generation_service_url: String::new(),
                generation_service_token: None,
                scheduler: SchedulerSettings {
                    external_call_timeout: Duration::from_millis(20),
                    ..SchedulerSettings::default()
                },
            }),
        };

        execute_post(state, post_id)
            .await
            .expect("timeout should count as a failed attempt");
    }

    #[tokio::test]
    async fn publish_completes_ended_campaign() {
        let mut post = due_post(ScheduledPostStatus::Pending, 0);
        let campaign_id = Uuid::new_v4();
        post.campaign_id = Some(campaign_id);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            Ok(Some(claimed))
        });
        posts.expect_mark_published().times(1).returning(|_| Ok(()));

        let mut store = MockContentStore::new();
        store.expect_find_by_id().returning(|id, site| {
            Ok(Some(article_fixture(id, site, ArticleStatus::Published)))
        });

        let mut campaigns = MockCampaignRepository::new();
        campaigns
            .expect_increment_published()
            .times(1)
            .withf(move |id| *id == campaign_id)
            .returning(|_| Ok(true));
        campaigns
            .expect_complete_if_ended()
            .times(1)
            .withf(move |id, _| *id == campaign_id)
            .returning(|_, _| Ok(true));

        let state = build_state(posts, campaigns, store, MockContentGenerator::new());

        execute_post(state, post_id)
            .await
            .expect("publish with campaign side effects should succeed");
    }

    #[tokio::test]
    async fn campaign_counter_failure_is_contained() {
        let mut post = due_post(ScheduledPostStatus::Pending, 0);
        post.campaign_id = Some(Uuid::new_v4());
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            Ok(Some(claimed))
        });
        posts.expect_mark_published().times(1).returning(|_| Ok(()));

        let mut store = MockContentStore::new();
        store.expect_find_by_id().returning(|id, site| {
            Ok(Some(article_fixture(id, site, ArticleStatus::Published)))
        });

        let mut campaigns = MockCampaignRepository::new();
        campaigns
            .expect_increment_published()
            .times(PERSISTENCE_MAX_ATTEMPTS)
            .returning(|_| Err(sqlx::Error::PoolTimedOut));

        let state = build_state(posts, campaigns, store, MockContentGenerator::new());

        execute_post(state, post_id)
            .await
            .expect("campaign bookkeeping failure must not unwind the publish");
    }

    #[tokio::test]
    async fn mark_published_failure_bubbles() {
        let post = due_post(ScheduledPostStatus::Pending, 0);
        let post_id = post.id;

        let mut posts = MockScheduledPostRepository::new();
        let fetched = post.clone();
        posts
            .expect_find_for_execution()
            .returning(move |_| Ok(Some(fetched.clone())));
        posts.expect_claim_for_attempt().returning(move |_, _| {
            let mut claimed = post.clone();
            claimed.publish_attempts = 1;
            Ok(Some(claimed))
        });
        posts
            .expect_mark_published()
            .times(PERSISTENCE_MAX_ATTEMPTS)
            .returning(|_| Err(sqlx::Error::RowNotFound));

        let mut store = MockContentStore::new();
        store.expect_find_by_id().returning(|id, site| {
            Ok(Some(article_fixture(id, site, ArticleStatus::Published)))
        });

        let state = build_state(
            posts,
            MockCampaignRepository::new(),
            store,
            MockContentGenerator::new(),
        );

        let err = execute_post(state, post_id)
            .await
            .expect_err("exhausted persistence retries should bubble");
        assert_eq!(err.operation(), "mark_published");
        assert_eq!(err.attempts(), PERSISTENCE_MAX_ATTEMPTS);
        assert_eq!(err.post_id(), post_id);
    }
}
