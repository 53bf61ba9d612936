use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::article::{Article, ArticleStatus};

use super::{ContentStore, ContentStoreError, NewArticle};

pub struct PostgresContentStore {
    pub pool: PgPool,
}

#[async_trait]
impl ContentStore for PostgresContentStore {
    async fn create(
        &self,
        site_id: Uuid,
        user_id: Uuid,
        article: NewArticle,
    ) -> Result<Article, ContentStoreError> {
        let published = article.status == ArticleStatus::Published;
        let result = sqlx::query_as::<_, Article>(
            r#"
            INSERT INTO articles (site_id, user_id, title, body, excerpt, status, published_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $7 THEN now() ELSE NULL END, now(), now())
            RETURNING id, site_id, user_id, title, body, excerpt, status, published_at, created_at, updated_at
            "#
        )
        .bind(site_id)
        .bind(user_id)
        .bind(&article.title)
        .bind(&article.body)
        .bind(&article.excerpt)
        .bind(article.status)
        .bind(published)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn find_by_id(
        &self,
        content_id: Uuid,
        site_id: Uuid,
    ) -> Result<Option<Article>, ContentStoreError> {
        let result = sqlx::query_as::<_, Article>(
            r#"
            SELECT id, site_id, user_id, title, body, excerpt, status, published_at, created_at, updated_at
            FROM articles
            WHERE id = $1 AND site_id = $2
            "#,
        )
        .bind(content_id)
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn publish(
        &self,
        content_id: Uuid,
        site_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Article>, ContentStoreError> {
        let result = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
            SET status = 'published',
                published_at = COALESCE(published_at, now()),
                updated_at = now()
            WHERE id = $1 AND site_id = $2 AND user_id = $3
            RETURNING id, site_id, user_id, title, body, excerpt, status, published_at, created_at, updated_at
            "#,
        )
        .bind(content_id)
        .bind(site_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }
}
