//! Content repository
//!
//! Read access to the movie and TV catalog, plus `create` for administrators.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Content, ContentQuery, ContentSort};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Catalog store
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// One page of matching content and the total number of matches
    async fn list(&self, query: &ContentQuery) -> Result<(Vec<Content>, i64)>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Content>>;

    /// Insert a catalog entry and return it with its assigned id
    async fn create(&self, content: &Content) -> Result<Content>;
}

/// SQLx-backed catalog for SQLite and MySQL
pub struct SqlxContentRepository {
    pool: DynDatabasePool,
}

impl SqlxContentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContentRepository> {
        Arc::new(Self::new(pool))
    }

    fn sqlite(&self) -> Result<&SqlitePool> {
        self.pool.as_sqlite().context("Pool is not a SQLite pool")
    }

    fn mysql(&self) -> Result<&MySqlPool> {
        self.pool.as_mysql().context("Pool is not a MySQL pool")
    }
}

const SELECT_CONTENT: &str = "SELECT id, title, description, release_date, genre, rating, \
     content_type, duration, episodes, image_url FROM content";

/// Empty filter values match everything
const FILTER: &str = "WHERE (? = '' OR content_type = ?) AND (? = '' OR LOWER(title) LIKE ?)";

fn order_by(sort: ContentSort) -> &'static str {
    match sort {
        ContentSort::Default => "ORDER BY id",
        ContentSort::TopRated => "ORDER BY rating DESC, id",
    }
}

/// Bind values for [`FILTER`]: type twice, then search and its LIKE pattern
fn filter_values(query: &ContentQuery) -> (String, String, String) {
    let content_type = query.content_type.clone().unwrap_or_default();
    let search = query.search.clone().unwrap_or_default();
    let pattern = format!("%{}%", search.to_lowercase());
    (content_type, search, pattern)
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn list(&self, query: &ContentQuery) -> Result<(Vec<Content>, i64)> {
        let (content_type, search, pattern) = filter_values(query);
        let count_sql = format!("SELECT COUNT(*) as count FROM content {}", FILTER);
        let list_sql = format!(
            "{} {} {} LIMIT ? OFFSET ?",
            SELECT_CONTENT,
            FILTER,
            order_by(query.sort)
        );

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.sqlite()?;
                let total: i64 = sqlx::query(&count_sql)
                    .bind(&content_type)
                    .bind(&content_type)
                    .bind(&search)
                    .bind(&pattern)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count content")?
                    .get("count");
                let rows = sqlx::query(&list_sql)
                    .bind(&content_type)
                    .bind(&content_type)
                    .bind(&search)
                    .bind(&pattern)
                    .bind(query.limit)
                    .bind(query.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list content")?;
                Ok((rows.iter().map(row_to_content_sqlite).collect(), total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.mysql()?;
                let total: i64 = sqlx::query(&count_sql)
                    .bind(&content_type)
                    .bind(&content_type)
                    .bind(&search)
                    .bind(&pattern)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count content")?
                    .get("count");
                let rows = sqlx::query(&list_sql)
                    .bind(&content_type)
                    .bind(&content_type)
                    .bind(&search)
                    .bind(&pattern)
                    .bind(query.limit)
                    .bind(query.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list content")?;
                Ok((rows.iter().map(row_to_content_mysql).collect(), total))
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Content>> {
        let sql = format!("{} WHERE id = ?", SELECT_CONTENT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.sqlite()?)
                    .await
                    .context("Failed to get content by ID")?;
                Ok(row.as_ref().map(row_to_content_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.mysql()?)
                    .await
                    .context("Failed to get content by ID")?;
                Ok(row.as_ref().map(row_to_content_mysql))
            }
        }
    }

    async fn create(&self, content: &Content) -> Result<Content> {
        let sql = r#"
            INSERT INTO content
                (title, description, release_date, genre, rating, content_type, duration, episodes, image_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&content.title)
                .bind(&content.description)
                .bind(content.release_date)
                .bind(&content.genre)
                .bind(content.rating)
                .bind(&content.content_type)
                .bind(&content.duration)
                .bind(content.episodes)
                .bind(&content.image_url)
                .execute(self.sqlite()?)
                .await
                .context("Failed to create content")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&content.title)
                .bind(&content.description)
                .bind(content.release_date)
                .bind(&content.genre)
                .bind(content.rating)
                .bind(&content.content_type)
                .bind(&content.duration)
                .bind(content.episodes)
                .bind(&content.image_url)
                .execute(self.mysql()?)
                .await
                .context("Failed to create content")?
                .last_insert_id() as i64,
        };

        Ok(Content {
            id,
            ..content.clone()
        })
    }
}

fn row_to_content_sqlite(row: &sqlx::sqlite::SqliteRow) -> Content {
    Content {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        release_date: row.get("release_date"),
        genre: row.get("genre"),
        rating: row.get("rating"),
        content_type: row.get("content_type"),
        duration: row.get("duration"),
        episodes: row.get("episodes"),
        image_url: row.get("image_url"),
    }
}

fn row_to_content_mysql(row: &sqlx::mysql::MySqlRow) -> Content {
    Content {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        release_date: row.get("release_date"),
        genre: row.get("genre"),
        rating: row.get("rating"),
        content_type: row.get("content_type"),
        duration: row.get("duration"),
        episodes: row.get("episodes"),
        image_url: row.get("image_url"),
    }
}
