use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::campaign::{Campaign, PostingFrequency};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
#[allow(clippy::too_many_arguments)]
pub trait CampaignRepository: Send + Sync {
    async fn create_campaign<'a>(
        &self,
        site_id: Uuid,
        user_id: Uuid,
        name: &str,
        goal: Option<&'a str>,
        start_date: OffsetDateTime,
        end_date: OffsetDateTime,
        posting_frequency: PostingFrequency,
    ) -> Result<Campaign, sqlx::Error>;

    async fn find_campaign(
        &self,
        site_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<Campaign>, sqlx::Error>;

    async fn list_campaigns(&self, site_id: Uuid) -> Result<Vec<Campaign>, sqlx::Error>;

    async fn update_campaign<'a>(
        &self,
        site_id: Uuid,
        campaign_id: Uuid,
        name: &str,
        goal: Option<&'a str>,
        start_date: OffsetDateTime,
        end_date: OffsetDateTime,
        posting_frequency: PostingFrequency,
    ) -> Result<Option<Campaign>, sqlx::Error>;

    // Guarded status transitions. Each returns whether a row matched, so the
    // caller can tell a no-op from a real transition.

    async fn activate_campaign(&self, campaign_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn pause_campaign(&self, campaign_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn cancel_campaign(&self, campaign_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Transitions an active campaign whose window has closed to completed.
    async fn complete_if_ended(
        &self,
        campaign_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;

    /// Bumps `posts_published` by one. Counter-only write so concurrent
    /// member publishes never lose an increment.
    async fn increment_published(&self, campaign_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn delete_campaign(&self, site_id: Uuid, campaign_id: Uuid)
        -> Result<bool, sqlx::Error>;
}
