use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::article::{Article, ArticleStatus};

mod postgres_impl;

pub use postgres_impl::PostgresContentStore;

#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("content store unavailable: {0}")]
    Storage(#[source] sqlx::Error),
}

impl From<sqlx::Error> for ContentStoreError {
    fn from(err: sqlx::Error) -> Self {
        ContentStoreError::Storage(err)
    }
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub status: ArticleStatus,
}

/// The content store owns article-like entities. The publishing engine only
/// needs these three operations, all scoped to a tenant site.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create(
        &self,
        site_id: Uuid,
        user_id: Uuid,
        article: NewArticle,
    ) -> Result<Article, ContentStoreError>;

    async fn find_by_id(
        &self,
        content_id: Uuid,
        site_id: Uuid,
    ) -> Result<Option<Article>, ContentStoreError>;

    /// Flips an article to published. Returns `None` when the article does
    /// not exist for this site/owner.
    async fn publish(
        &self,
        content_id: Uuid,
        site_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Article>, ContentStoreError>;
}
