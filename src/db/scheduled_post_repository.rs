use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::scheduled_post::ScheduledPost;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
#[allow(clippy::too_many_arguments)]
pub trait ScheduledPostRepository: Send + Sync {
    async fn create_scheduled_post<'a>(
        &self,
        site_id: Uuid,
        user_id: Uuid,
        campaign_id: Option<Uuid>,
        content_id: Option<Uuid>,
        auto_generate: bool,
        generation_prompt: Option<&'a str>,
        scheduled_at: OffsetDateTime,
        timezone: &str,
    ) -> Result<ScheduledPost, sqlx::Error>;

    async fn find_scheduled_post(
        &self,
        site_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPost>, sqlx::Error>;

    /// Unscoped fetch used by the executor, which is handed bare ids by the
    /// scheduler and never crosses a tenant boundary itself.
    async fn find_for_execution(
        &self,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPost>, sqlx::Error>;

    async fn list_scheduled_posts(
        &self,
        site_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ScheduledPost>, sqlx::Error>;

    async fn list_for_campaign(
        &self,
        site_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Vec<ScheduledPost>, sqlx::Error>;

    /// Due work for one tick: non-terminal, at-or-past `now`, and not
    /// attempted within the last `min_retry_delay_seconds`. Ordered by
    /// `scheduled_at` ascending, capped at `limit`.
    async fn list_due(
        &self,
        now: OffsetDateTime,
        min_retry_delay_seconds: i64,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, sqlx::Error>;

    /// The non-terminal post currently holding a link to this article, if
    /// any. Backs the one-active-schedule-per-article invariant.
    async fn find_active_by_content(
        &self,
        content_id: Uuid,
    ) -> Result<Option<ScheduledPost>, sqlx::Error>;

    async fn update_scheduled_post<'a>(
        &self,
        site_id: Uuid,
        post_id: Uuid,
        scheduled_at: OffsetDateTime,
        timezone: &str,
        content_id: Option<Uuid>,
        auto_generate: bool,
        generation_prompt: Option<&'a str>,
    ) -> Result<Option<ScheduledPost>, sqlx::Error>;

    async fn set_campaign(
        &self,
        site_id: Uuid,
        post_id: Uuid,
        campaign_id: Option<Uuid>,
    ) -> Result<Option<ScheduledPost>, sqlx::Error>;

    async fn cancel_scheduled_post(
        &self,
        site_id: Uuid,
        post_id: Uuid,
    ) -> Result<bool, sqlx::Error>;

    async fn delete_scheduled_post(
        &self,
        site_id: Uuid,
        post_id: Uuid,
    ) -> Result<bool, sqlx::Error>;

    // Executor operations. Each is a narrow, guarded write so concurrent
    // executions cannot lose updates to each other.

    /// Atomically record an attempt: increments `publish_attempts` and stamps
    /// `last_attempt_at` while the row is still non-terminal and due.
    /// Returns the updated row, or `None` when another worker got there
    /// first or the row has advanced.
    async fn claim_for_attempt(
        &self,
        post_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<ScheduledPost>, sqlx::Error>;

    /// Records the article created for an auto-generated post.
    async fn set_content_id(&self, post_id: Uuid, content_id: Uuid) -> Result<(), sqlx::Error>;

    async fn mark_published(&self, post_id: Uuid) -> Result<(), sqlx::Error>;

    async fn mark_failed(&self, post_id: Uuid, error: &str) -> Result<(), sqlx::Error>;

    /// Persists the last failure reason without leaving the non-terminal
    /// state, so the next tick retries naturally.
    async fn record_failure(&self, post_id: Uuid, error: &str) -> Result<(), sqlx::Error>;

    /// Cascade used by campaign cancellation: cancels every member post
    /// still pending or scheduled. Returns how many were cancelled.
    async fn cancel_all_for_campaign(&self, campaign_id: Uuid) -> Result<u64, sqlx::Error>;

    async fn count_active_for_campaign(&self, campaign_id: Uuid) -> Result<i64, sqlx::Error>;
}
