use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle states of a scheduled post. `Pending` and `Scheduled` are both
/// eligible for polling; `Published`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "scheduled_post_status", rename_all = "lowercase")]
pub enum ScheduledPostStatus {
    Pending,
    Scheduled,
    Published,
    Failed,
    Cancelled,
}

impl ScheduledPostStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Published => "published",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ScheduledPostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the article to publish comes from: either an existing article in the
/// content store, or a generation prompt the executor turns into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    Existing(Uuid),
    Generated(String),
}

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct ScheduledPost {
    pub id: Uuid,
    pub site_id: Uuid,
    pub user_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub content_id: Option<Uuid>,
    pub auto_generate: bool,
    pub generation_prompt: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    /// Display-only IANA timezone name; all comparisons use absolute instants.
    pub timezone: String,
    pub status: ScheduledPostStatus,
    pub publish_attempts: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ScheduledPost {
    /// Resolves the content linkage into its closed variant. A row carrying
    /// neither an article reference nor a generation prompt violates the
    /// creation-time invariant and yields `None`.
    pub fn content_source(&self) -> Option<ContentSource> {
        if let Some(content_id) = self.content_id {
            return Some(ContentSource::Existing(content_id));
        }
        if self.auto_generate {
            if let Some(prompt) = self.generation_prompt.as_deref() {
                if !prompt.trim().is_empty() {
                    return Some(ContentSource::Generated(prompt.to_string()));
                }
            }
        }
        None
    }
}
