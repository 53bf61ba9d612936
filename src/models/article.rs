use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "article_status", rename_all = "lowercase")]
pub enum ArticleStatus {
    Draft,
    Published,
}

/// The article-like entity owned by the content store. The publishing engine
/// only ever creates, looks up and publishes these; everything else about
/// articles lives behind the store boundary.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct Article {
    pub id: Uuid,
    pub site_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub status: ArticleStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
