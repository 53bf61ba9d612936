use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::campaign_repository::CampaignRepository;
use crate::models::campaign::{Campaign, PostingFrequency};

pub struct PostgresCampaignRepository {
    pub pool: PgPool,
}

#[async_trait]
impl CampaignRepository for PostgresCampaignRepository {
    async fn create_campaign<'a>(
        &self,
        site_id: Uuid,
        user_id: Uuid,
        name: &str,
        goal: Option<&'a str>,
        start_date: OffsetDateTime,
        end_date: OffsetDateTime,
        posting_frequency: PostingFrequency,
    ) -> Result<Campaign, sqlx::Error> {
        let result = sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (site_id, user_id, name, goal, start_date, end_date, posting_frequency, status, posts_published, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'draft', 0, now(), now())
            RETURNING id, site_id, user_id, name, goal, start_date, end_date, posting_frequency, status, posts_published, created_at, updated_at
            "#
        )
        .bind(site_id)
        .bind(user_id)
        .bind(name)
        .bind(goal)
        .bind(start_date)
        .bind(end_date)
        .bind(posting_frequency)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn find_campaign(
        &self,
        site_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let result = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, site_id, user_id, name, goal, start_date, end_date,
                   posting_frequency, status, posts_published, created_at, updated_at
            FROM campaigns
            WHERE site_id = $1 AND id = $2
            "#,
        )
        .bind(site_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_campaigns(&self, site_id: Uuid) -> Result<Vec<Campaign>, sqlx::Error> {
        let results = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, site_id, user_id, name, goal, start_date, end_date,
                   posting_frequency, status, posts_published, created_at, updated_at
            FROM campaigns
            WHERE site_id = $1
            ORDER BY start_date ASC
            "#,
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn update_campaign<'a>(
        &self,
        site_id: Uuid,
        campaign_id: Uuid,
        name: &str,
        goal: Option<&'a str>,
        start_date: OffsetDateTime,
        end_date: OffsetDateTime,
        posting_frequency: PostingFrequency,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let result = sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns
            SET name = $3,
                goal = $4,
                start_date = $5,
                end_date = $6,
                posting_frequency = $7,
                updated_at = now()
            WHERE site_id = $1 AND id = $2 AND status NOT IN ('completed', 'cancelled')
            RETURNING id, site_id, user_id, name, goal, start_date, end_date, posting_frequency, status, posts_published, created_at, updated_at
            "#
        )
        .bind(site_id)
        .bind(campaign_id)
        .bind(name)
        .bind(goal)
        .bind(start_date)
        .bind(end_date)
        .bind(posting_frequency)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn activate_campaign(&self, campaign_id: Uuid) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'active', updated_at = now()
            WHERE id = $1 AND status IN ('draft', 'paused')
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn pause_campaign(&self, campaign_id: Uuid) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'paused', updated_at = now()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn cancel_campaign(&self, campaign_id: Uuid) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'cancelled', updated_at = now()
            WHERE id = $1 AND status IN ('draft', 'active', 'paused')
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn complete_if_ended(
        &self,
        campaign_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'completed', updated_at = now()
            WHERE id = $1 AND status = 'active' AND end_date <= $2
            "#,
        )
        .bind(campaign_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn increment_published(&self, campaign_id: Uuid) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"
            UPDATE campaigns
            SET posts_published = posts_published + 1, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_campaign(
        &self,
        site_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"
            DELETE FROM campaigns
            WHERE site_id = $1 AND id = $2
            "#,
        )
        .bind(site_id)
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
