use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "campaign_status", rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory posting cadence. The executor does not enforce it; it exists so
/// the planning UI can spread member posts over the campaign window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "posting_frequency", rename_all = "lowercase")]
pub enum PostingFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Custom,
}

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct Campaign {
    pub id: Uuid,
    pub site_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub goal: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub posting_frequency: PostingFrequency,
    pub status: CampaignStatus,
    pub posts_published: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Campaign {
    /// An active campaign whose window has closed is due for auto-completion
    /// the next time anything touches it.
    pub fn window_closed(&self, now: OffsetDateTime) -> bool {
        self.status == CampaignStatus::Active && self.end_date <= now
    }
}
