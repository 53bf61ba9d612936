use crate::config::Config;
use crate::db::{
    campaign_repository::CampaignRepository, scheduled_post_repository::ScheduledPostRepository,
};
use crate::services::content_store::ContentStore;
use crate::services::generation::ContentGenerator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub scheduled_posts: Arc<dyn ScheduledPostRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub content_store: Arc<dyn ContentStore>,
    pub content_generator: Arc<dyn ContentGenerator>,
    pub config: Arc<Config>,
}
