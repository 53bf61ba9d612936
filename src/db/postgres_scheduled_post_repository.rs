use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::scheduled_post_repository::ScheduledPostRepository;
use crate::models::scheduled_post::ScheduledPost;

pub struct PostgresScheduledPostRepository {
    pub pool: PgPool,
}

#[async_trait]
impl ScheduledPostRepository for PostgresScheduledPostRepository {
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
    ) -> Result<ScheduledPost, sqlx::Error> {
        let result = sqlx::query_as::<_, ScheduledPost>(
            r#"
            INSERT INTO scheduled_posts (site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt, scheduled_at, timezone, status, publish_attempts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 0, now(), now())
            RETURNING id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt, scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message, published_at, created_at, updated_at
            "#
        )
        .bind(site_id)
        .bind(user_id)
        .bind(campaign_id)
        .bind(content_id)
        .bind(auto_generate)
        .bind(generation_prompt)
        .bind(scheduled_at)
        .bind(timezone)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn find_scheduled_post(
        &self,
        site_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPost>, sqlx::Error> {
        let result = sqlx::query_as::<_, ScheduledPost>(
            r#"
            SELECT id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt,
                   scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message,
                   published_at, created_at, updated_at
            FROM scheduled_posts
            WHERE site_id = $1 AND id = $2
            "#,
        )
        .bind(site_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn find_for_execution(
        &self,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPost>, sqlx::Error> {
        let result = sqlx::query_as::<_, ScheduledPost>(
            r#"
            SELECT id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt,
                   scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message,
                   published_at, created_at, updated_at
            FROM scheduled_posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_scheduled_posts(
        &self,
        site_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ScheduledPost>, sqlx::Error> {
        let results = sqlx::query_as::<_, ScheduledPost>(
            r#"
            SELECT id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt,
                   scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message,
                   published_at, created_at, updated_at
            FROM scheduled_posts
            WHERE site_id = $1
            ORDER BY scheduled_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(site_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_for_campaign(
        &self,
        site_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Vec<ScheduledPost>, sqlx::Error> {
        let results = sqlx::query_as::<_, ScheduledPost>(
            r#"
            SELECT id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt,
                   scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message,
                   published_at, created_at, updated_at
            FROM scheduled_posts
            WHERE site_id = $1 AND campaign_id = $2
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(site_id)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_due(
        &self,
        now: OffsetDateTime,
        min_retry_delay_seconds: i64,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, sqlx::Error> {
        let results = sqlx::query_as::<_, ScheduledPost>(
            r#"
            SELECT id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt,
                   scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message,
                   published_at, created_at, updated_at
            FROM scheduled_posts
            WHERE status IN ('pending', 'scheduled')
              AND scheduled_at <= $1
              AND (last_attempt_at IS NULL
                   OR last_attempt_at <= $1 - ($2::bigint * INTERVAL '1 second'))
            ORDER BY scheduled_at ASC
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(min_retry_delay_seconds)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn find_active_by_content(
        &self,
        content_id: Uuid,
    ) -> Result<Option<ScheduledPost>, sqlx::Error> {
        let result = sqlx::query_as::<_, ScheduledPost>(
            r#"
            SELECT id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt,
                   scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message,
                   published_at, created_at, updated_at
            FROM scheduled_posts
            WHERE content_id = $1 AND status IN ('pending', 'scheduled')
            LIMIT 1
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn update_scheduled_post<'a>(
        &self,
        site_id: Uuid,
        post_id: Uuid,
        scheduled_at: OffsetDateTime,
        timezone: &str,
        content_id: Option<Uuid>,
        auto_generate: bool,
        generation_prompt: Option<&'a str>,
    ) -> Result<Option<ScheduledPost>, sqlx::Error> {
        let result = sqlx::query_as::<_, ScheduledPost>(
            r#"
            UPDATE scheduled_posts
            SET scheduled_at = $3,
                timezone = $4,
                content_id = $5,
                auto_generate = $6,
                generation_prompt = $7,
                updated_at = now()
            WHERE site_id = $1 AND id = $2 AND status IN ('pending', 'scheduled')
            RETURNING id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt, scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message, published_at, created_at, updated_at
            "#
        )
        .bind(site_id)
        .bind(post_id)
        .bind(scheduled_at)
        .bind(timezone)
        .bind(content_id)
        .bind(auto_generate)
        .bind(generation_prompt)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn set_campaign(
        &self,
        site_id: Uuid,
        post_id: Uuid,
        campaign_id: Option<Uuid>,
    ) -> Result<Option<ScheduledPost>, sqlx::Error> {
        let result = sqlx::query_as::<_, ScheduledPost>(
            r#"
            UPDATE scheduled_posts
            SET campaign_id = $3, updated_at = now()
            WHERE site_id = $1 AND id = $2 AND status IN ('pending', 'scheduled')
            RETURNING id, site_id, user_id, campaign_id, content_id, auto_generate, generation_prompt, scheduled_at, timezone, status, publish_attempts, last_attempt_at, error_message, published_at, created_at, updated_at
            "#
        )
        .bind(site_id)
        .bind(post_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn cancel_scheduled_post(
        &self,
        site_id: Uuid,
        post_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'cancelled', updated_at = now()
            WHERE site_id = $1 AND id = $2 AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(site_id)
        .bind(post_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_scheduled_post(
        &self,
        site_id: Uuid,
        post_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"
            DELETE FROM scheduled_posts
            WHERE site_id = $1 AND id = $2 AND status <> 'published'
            "#,
        )
        .bind(site_id)
        .bind(post_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn claim_for_attempt(
        &self,
        post_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<ScheduledPost>, sqlx::Error> {
        // Atomically claim the post for one attempt. The row lock plus the
        // status/due guard means two workers racing on the same post hand
        // exactly one of them the updated row.
        let result = sqlx::query_as::<_, ScheduledPost>(
            r#"
            WITH sel AS (
              SELECT id
              FROM scheduled_posts
              WHERE id = $1
                AND status IN ('pending', 'scheduled')
                AND scheduled_at <= $2
              FOR UPDATE SKIP LOCKED
            )
            UPDATE scheduled_posts sp
            SET publish_attempts = sp.publish_attempts + 1,
                last_attempt_at = now(),
                updated_at = now()
            FROM sel
            WHERE sp.id = sel.id
            RETURNING sp.id, sp.site_id, sp.user_id, sp.campaign_id, sp.content_id, sp.auto_generate, sp.generation_prompt, sp.scheduled_at, sp.timezone, sp.status, sp.publish_attempts, sp.last_attempt_at, sp.error_message, sp.published_at, sp.created_at, sp.updated_at
            "#
        )
        .bind(post_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn set_content_id(&self, post_id: Uuid, content_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET content_id = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .bind(content_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_published(&self, post_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'published',
                published_at = COALESCE(published_at, now()),
                error_message = NULL,
                updated_at = now()
            WHERE id = $1 AND status NOT IN ('published', 'cancelled')
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, post_id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'failed', error_message = $2, updated_at = now()
            WHERE id = $1 AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(post_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(&self, post_id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET error_message = $2, updated_at = now()
            WHERE id = $1 AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(post_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_all_for_campaign(&self, campaign_id: Uuid) -> Result<u64, sqlx::Error> {
        let res = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'cancelled', updated_at = now()
            WHERE campaign_id = $1 AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn count_active_for_campaign(&self, campaign_id: Uuid) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM scheduled_posts
            WHERE campaign_id = $1 AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
