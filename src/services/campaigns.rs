use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::models::campaign::{Campaign, CampaignStatus, PostingFrequency};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("{0}")]
    Validation(String),
    #[error("campaign not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRequest {
    pub name: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub posting_frequency: PostingFrequency,
}

fn validate_window(request: &CampaignRequest) -> Result<(), CampaignError> {
    if request.name.trim().is_empty() {
        return Err(CampaignError::Validation("campaign name is required".into()));
    }
    if request.end_date <= request.start_date {
        return Err(CampaignError::Validation(
            "campaign end date must be after its start date".into(),
        ));
    }
    Ok(())
}

pub async fn create_campaign(
    state: &AppState,
    site_id: Uuid,
    user_id: Uuid,
    request: CampaignRequest,
) -> Result<Campaign, CampaignError> {
    validate_window(&request)?;
    if request.start_date < OffsetDateTime::now_utc() {
        return Err(CampaignError::Validation(
            "campaign start date must not be in the past".into(),
        ));
    }

    let campaign = state
        .campaigns
        .create_campaign(
            site_id,
            user_id,
            request.name.trim(),
            request.goal.as_deref(),
            request.start_date,
            request.end_date,
            request.posting_frequency,
        )
        .await?;

    info!(campaign_id = %campaign.id, %site_id, "Campaign created");
    Ok(campaign)
}

/// Fetches a campaign, applying the auto-complete transition first when an
/// active campaign's window has already closed.
pub async fn get_campaign(
    state: &AppState,
    site_id: Uuid,
    campaign_id: Uuid,
) -> Result<Campaign, CampaignError> {
    let campaign = state
        .campaigns
        .find_campaign(site_id, campaign_id)
        .await?
        .ok_or(CampaignError::NotFound)?;

    let now = OffsetDateTime::now_utc();
    if campaign.window_closed(now) && state.campaigns.complete_if_ended(campaign_id, now).await? {
        info!(%campaign_id, "Campaign window closed, marked completed");
        return state
            .campaigns
            .find_campaign(site_id, campaign_id)
            .await?
            .ok_or(CampaignError::NotFound);
    }
    Ok(campaign)
}

pub async fn list_campaigns(
    state: &AppState,
    site_id: Uuid,
) -> Result<Vec<Campaign>, CampaignError> {
    let mut campaigns = state.campaigns.list_campaigns(site_id).await?;

    let now = OffsetDateTime::now_utc();
    for campaign in campaigns.iter_mut() {
        if campaign.window_closed(now)
            && state.campaigns.complete_if_ended(campaign.id, now).await?
        {
            campaign.status = CampaignStatus::Completed;
        }
    }
    Ok(campaigns)
}

pub async fn update_campaign(
    state: &AppState,
    site_id: Uuid,
    campaign_id: Uuid,
    request: CampaignRequest,
) -> Result<Campaign, CampaignError> {
    validate_window(&request)?;

    let campaign = get_campaign(state, site_id, campaign_id).await?;
    if campaign.status.is_terminal() {
        return Err(CampaignError::Conflict(format!(
            "cannot update a {} campaign",
            campaign.status
        )));
    }

    state
        .campaigns
        .update_campaign(
            site_id,
            campaign_id,
            request.name.trim(),
            request.goal.as_deref(),
            request.start_date,
            request.end_date,
            request.posting_frequency,
        )
        .await?
        .ok_or(CampaignError::NotFound)
}

pub async fn activate_campaign(
    state: &AppState,
    site_id: Uuid,
    campaign_id: Uuid,
) -> Result<(), CampaignError> {
    let campaign = state
        .campaigns
        .find_campaign(site_id, campaign_id)
        .await?
        .ok_or(CampaignError::NotFound)?;

    if campaign.status == CampaignStatus::Active {
        return Ok(());
    }
    if campaign.status.is_terminal() {
        return Err(CampaignError::Conflict(format!(
            "cannot activate a {} campaign",
            campaign.status
        )));
    }
    if campaign.end_date <= OffsetDateTime::now_utc() {
        return Err(CampaignError::Validation(
            "campaign window has already ended".into(),
        ));
    }

    let activated = state.campaigns.activate_campaign(campaign_id).await?;
    if activated {
        info!(%campaign_id, "Campaign activated");
        Ok(())
    } else {
        Err(CampaignError::Conflict(
            "the campaign changed state before activation landed".into(),
        ))
    }
}

pub async fn pause_campaign(
    state: &AppState,
    site_id: Uuid,
    campaign_id: Uuid,
) -> Result<(), CampaignError> {
    let campaign = state
        .campaigns
        .find_campaign(site_id, campaign_id)
        .await?
        .ok_or(CampaignError::NotFound)?;

    if campaign.status != CampaignStatus::Active {
        return Err(CampaignError::Conflict(format!(
            "only an active campaign can be paused, this one is {}",
            campaign.status
        )));
    }

    let paused = state.campaigns.pause_campaign(campaign_id).await?;
    if paused {
        info!(%campaign_id, "Campaign paused");
        Ok(())
    } else {
        Err(CampaignError::Conflict(
            "the campaign changed state before the pause landed".into(),
        ))
    }
}

/// Cancels the campaign and cascades cancellation to every member post still
/// pending or scheduled. Returns how many member posts were cancelled.
pub async fn cancel_campaign(
    state: &AppState,
    site_id: Uuid,
    campaign_id: Uuid,
) -> Result<u64, CampaignError> {
    let campaign = state
        .campaigns
        .find_campaign(site_id, campaign_id)
        .await?
        .ok_or(CampaignError::NotFound)?;

    match campaign.status {
        CampaignStatus::Cancelled => return Ok(0),
        CampaignStatus::Completed => {
            return Err(CampaignError::Conflict(
                "a completed campaign cannot be cancelled".into(),
            ));
        }
        _ => {}
    }

    let cancelled = state.campaigns.cancel_campaign(campaign_id).await?;
    if !cancelled {
        return Err(CampaignError::Conflict(
            "the campaign changed state before cancellation landed".into(),
        ));
    }

    let members = state
        .scheduled_posts
        .cancel_all_for_campaign(campaign_id)
        .await?;
    info!(%campaign_id, member_posts_cancelled = members, "Campaign cancelled");
    Ok(members)
}

/// Deletion is refused while member posts are still in flight so scheduled
/// work is never silently orphaned.
pub async fn delete_campaign(
    state: &AppState,
    site_id: Uuid,
    campaign_id: Uuid,
) -> Result<(), CampaignError> {
    let active = state
        .scheduled_posts
        .count_active_for_campaign(campaign_id)
        .await?;
    if active > 0 {
        return Err(CampaignError::Conflict(format!(
            "campaign still has {active} scheduled posts; cancel or complete them first"
        )));
    }

    let deleted = state.campaigns.delete_campaign(site_id, campaign_id).await?;
    if deleted {
        info!(%campaign_id, %site_id, "Campaign deleted");
        Ok(())
    } else {
        Err(CampaignError::NotFound)
    }
}
