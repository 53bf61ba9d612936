use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::models::campaign::Campaign;
use crate::models::scheduled_post::{ContentSource, ScheduledPost, ScheduledPostStatus};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePostRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    pub timezone: String,
    #[serde(default)]
    pub content_id: Option<Uuid>,
    #[serde(default)]
    pub auto_generate: bool,
    #[serde(default)]
    pub generation_prompt: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
}

fn validate_schedule_time(
    scheduled_at: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<(), SchedulingError> {
    if scheduled_at <= now {
        return Err(SchedulingError::Validation(
            "scheduled time must be in the future".into(),
        ));
    }
    Ok(())
}

fn validate_timezone(timezone: &str) -> Result<(), SchedulingError> {
    timezone
        .parse::<chrono_tz::Tz>()
        .map_err(|_| SchedulingError::Validation(format!("unknown timezone '{timezone}'")))?;
    Ok(())
}

/// Resolves the request's content linkage into its closed variant: exactly
/// one of an existing article or a generation prompt.
fn resolve_content_source(request: &SchedulePostRequest) -> Result<ContentSource, SchedulingError> {
    match (request.content_id, request.auto_generate) {
        (Some(_), true) => Err(SchedulingError::Validation(
            "choose either an existing article or auto-generation, not both".into(),
        )),
        (Some(content_id), false) => Ok(ContentSource::Existing(content_id)),
        (None, true) => match request.generation_prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => {
                Ok(ContentSource::Generated(prompt.to_string()))
            }
            _ => Err(SchedulingError::Validation(
                "auto-generated posts need a generation prompt".into(),
            )),
        },
        (None, false) => Err(SchedulingError::Validation(
            "a scheduled post needs an existing article or a generation prompt".into(),
        )),
    }
}

async fn validate_campaign_link(
    state: &AppState,
    site_id: Uuid,
    user_id: Uuid,
    campaign_id: Uuid,
) -> Result<Campaign, SchedulingError> {
    let campaign = state
        .campaigns
        .find_campaign(site_id, campaign_id)
        .await?
        .ok_or(SchedulingError::NotFound("campaign"))?;

    if campaign.user_id != user_id {
        return Err(SchedulingError::Forbidden(
            "campaign belongs to another user".into(),
        ));
    }
    if campaign.status.is_terminal() {
        return Err(SchedulingError::Conflict(format!(
            "cannot attach posts to a {} campaign",
            campaign.status
        )));
    }
    Ok(campaign)
}

/// Rejects an article that is already linked to another non-terminal
/// scheduled post. `exclude` skips the post being updated.
async fn ensure_content_unused(
    state: &AppState,
    content_id: Uuid,
    exclude: Option<Uuid>,
) -> Result<(), SchedulingError> {
    if let Some(existing) = state.scheduled_posts.find_active_by_content(content_id).await? {
        if Some(existing.id) != exclude {
            return Err(SchedulingError::Conflict(
                "this article already has an active schedule".into(),
            ));
        }
    }
    Ok(())
}

pub async fn create_scheduled_post(
    state: &AppState,
    site_id: Uuid,
    user_id: Uuid,
    request: SchedulePostRequest,
) -> Result<ScheduledPost, SchedulingError> {
    let now = OffsetDateTime::now_utc();
    validate_schedule_time(request.scheduled_at, now)?;
    validate_timezone(&request.timezone)?;
    let source = resolve_content_source(&request)?;

    if let ContentSource::Existing(content_id) = &source {
        ensure_content_unused(state, *content_id, None).await?;
    }
    if let Some(campaign_id) = request.campaign_id {
        validate_campaign_link(state, site_id, user_id, campaign_id).await?;
    }

    let (content_id, auto_generate, prompt) = match &source {
        ContentSource::Existing(content_id) => (Some(*content_id), false, None),
        ContentSource::Generated(prompt) => (None, true, Some(prompt.as_str())),
    };

    let post = state
        .scheduled_posts
        .create_scheduled_post(
            site_id,
            user_id,
            request.campaign_id,
            content_id,
            auto_generate,
            prompt,
            request.scheduled_at,
            &request.timezone,
        )
        .await?;

    info!(post_id = %post.id, %site_id, scheduled_at = %post.scheduled_at, "Scheduled post created");
    Ok(post)
}

pub async fn get_scheduled_post(
    state: &AppState,
    site_id: Uuid,
    post_id: Uuid,
) -> Result<ScheduledPost, SchedulingError> {
    state
        .scheduled_posts
        .find_scheduled_post(site_id, post_id)
        .await?
        .ok_or(SchedulingError::NotFound("scheduled post"))
}

pub async fn list_scheduled_posts(
    state: &AppState,
    site_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<ScheduledPost>, SchedulingError> {
    Ok(state
        .scheduled_posts
        .list_scheduled_posts(site_id, limit, offset)
        .await?)
}

pub async fn list_campaign_posts(
    state: &AppState,
    site_id: Uuid,
    campaign_id: Uuid,
) -> Result<Vec<ScheduledPost>, SchedulingError> {
    Ok(state
        .scheduled_posts
        .list_for_campaign(site_id, campaign_id)
        .await?)
}

pub async fn update_scheduled_post(
    state: &AppState,
    site_id: Uuid,
    post_id: Uuid,
    request: SchedulePostRequest,
) -> Result<ScheduledPost, SchedulingError> {
    let post = get_scheduled_post(state, site_id, post_id).await?;
    if post.status.is_terminal() {
        return Err(SchedulingError::Conflict(format!(
            "cannot update a {} post",
            post.status
        )));
    }

    let now = OffsetDateTime::now_utc();
    validate_schedule_time(request.scheduled_at, now)?;
    validate_timezone(&request.timezone)?;
    let source = resolve_content_source(&request)?;

    if let ContentSource::Existing(content_id) = &source {
        if Some(*content_id) != post.content_id {
            ensure_content_unused(state, *content_id, Some(post.id)).await?;
        }
    }

    let (content_id, auto_generate, prompt) = match &source {
        ContentSource::Existing(content_id) => (Some(*content_id), false, None),
        ContentSource::Generated(prompt) => (None, true, Some(prompt.as_str())),
    };

    state
        .scheduled_posts
        .update_scheduled_post(
            site_id,
            post_id,
            request.scheduled_at,
            &request.timezone,
            content_id,
            auto_generate,
            prompt,
        )
        .await?
        .ok_or_else(|| {
            SchedulingError::Conflict("the post changed state before the update landed".into())
        })
}

/// Idempotent when the post is already cancelled; forbidden once published.
pub async fn cancel_scheduled_post(
    state: &AppState,
    site_id: Uuid,
    post_id: Uuid,
) -> Result<(), SchedulingError> {
    let post = get_scheduled_post(state, site_id, post_id).await?;
    match post.status {
        ScheduledPostStatus::Cancelled => Ok(()),
        ScheduledPostStatus::Published => Err(SchedulingError::Conflict(
            "a published post cannot be cancelled".into(),
        )),
        _ => {
            let cancelled = state
                .scheduled_posts
                .cancel_scheduled_post(site_id, post_id)
                .await?;
            if cancelled {
                info!(%post_id, %site_id, "Scheduled post cancelled");
                Ok(())
            } else {
                Err(SchedulingError::Conflict(
                    "the post changed state before it could be cancelled".into(),
                ))
            }
        }
    }
}

/// Published posts are never deleted; they are the audit trail of what
/// actually went out.
pub async fn delete_scheduled_post(
    state: &AppState,
    site_id: Uuid,
    post_id: Uuid,
) -> Result<(), SchedulingError> {
    let post = get_scheduled_post(state, site_id, post_id).await?;
    if post.status == ScheduledPostStatus::Published {
        return Err(SchedulingError::Conflict(
            "published posts cannot be deleted".into(),
        ));
    }

    let deleted = state
        .scheduled_posts
        .delete_scheduled_post(site_id, post_id)
        .await?;
    if deleted {
        Ok(())
    } else {
        Err(SchedulingError::Conflict(
            "the post changed state before it could be deleted".into(),
        ))
    }
}

/// Moves the post into another campaign, or out of any campaign with `None`.
/// Neither side of the old link is deleted.
pub async fn set_post_campaign(
    state: &AppState,
    site_id: Uuid,
    user_id: Uuid,
    post_id: Uuid,
    campaign_id: Option<Uuid>,
) -> Result<ScheduledPost, SchedulingError> {
    let post = get_scheduled_post(state, site_id, post_id).await?;
    if post.status.is_terminal() {
        return Err(SchedulingError::Conflict(format!(
            "cannot move a {} post between campaigns",
            post.status
        )));
    }

    if let Some(campaign_id) = campaign_id {
        validate_campaign_link(state, site_id, user_id, campaign_id).await?;
    }

    state
        .scheduled_posts
        .set_campaign(site_id, post_id, campaign_id)
        .await?
        .ok_or_else(|| {
            SchedulingError::Conflict("the post changed state before the move landed".into())
        })
}
