//! Catalog service
//!
//! Paged browsing and lookup of movies and TV shows, and creation of new
//! entries by administrators.

use crate::db::repositories::ContentRepository;
use crate::models::{Content, ContentPage, ContentQuery};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

/// Largest page size a client may request
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MOVIE: &str = "movie";
pub const TV_SHOW: &str = "tv_show";

/// Error types for catalog writes
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for a new catalog entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewContentInput {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub genre: Option<String>,
    pub rating: Option<f64>,
    #[serde(default)]
    pub content_type: String,
    /// Kept for movies only
    pub duration: Option<String>,
    /// Kept for TV shows only
    pub episodes: Option<i64>,
    pub image_url: Option<String>,
}

pub struct CatalogService {
    content: Arc<dyn ContentRepository>,
}

impl CatalogService {
    pub fn new(content: Arc<dyn ContentRepository>) -> Self {
        Self { content }
    }

    /// One page of content matching the query.
    ///
    /// Page and limit are clamped to sane bounds before querying.
    pub async fn browse(&self, mut query: ContentQuery) -> Result<ContentPage> {
        query.page = query.page.max(1);
        query.limit = query.limit.clamp(1, MAX_PAGE_SIZE);

        let (content, total) = self
            .content
            .list(&query)
            .await
            .context("Failed to browse catalog")?;

        Ok(ContentPage::new(content, total, &query))
    }

    pub async fn get(&self, id: i64) -> Result<Option<Content>> {
        self.content
            .get_by_id(id)
            .await
            .with_context(|| format!("Failed to load content {}", id))
    }

    /// Add a movie or TV show. Movies keep a duration and no episode count,
    /// TV shows the reverse.
    pub async fn create(&self, input: NewContentInput) -> Result<Content, CatalogError> {
        let title = input.title.trim().to_string();
        let content_type = input.content_type.trim().to_string();

        let rating = match input.rating {
            Some(rating) if !title.is_empty() && !content_type.is_empty() => rating,
            _ => {
                return Err(CatalogError::ValidationError(
                    "Title, Rating, and Type are required fields.".to_string(),
                ))
            }
        };
        if !(0.0..=10.0).contains(&rating) {
            return Err(CatalogError::ValidationError(
                "Rating must be between 0 and 10.".to_string(),
            ));
        }
        if content_type != MOVIE && content_type != TV_SHOW {
            return Err(CatalogError::ValidationError(format!(
                "Type must be '{}' or '{}'.",
                MOVIE, TV_SHOW
            )));
        }

        let is_movie = content_type == MOVIE;
        let content = Content {
            id: 0,
            title,
            description: input.description,
            release_date: input.release_date,
            genre: input.genre,
            rating,
            duration: input.duration.filter(|_| is_movie),
            episodes: input.episodes.filter(|_| !is_movie),
            content_type,
            image_url: input.image_url,
        };

        let created = self
            .content
            .create(&content)
            .await
            .context("Failed to create content")?;
        tracing::info!("Content {} created: {}", created.id, created.title);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::content::tests::sample;
    use crate::db::repositories::SqlxContentRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup_service(count: usize) -> CatalogService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxContentRepository::boxed(pool);
        for i in 0..count {
            repo.create(&sample(&format!("Title {}", i), "movie", 5.0))
                .await
                .unwrap();
        }
        CatalogService::new(repo)
    }

    #[tokio::test]
    async fn test_browse_pages() {
        let service = setup_service(25).await;

        let page = service.browse(ContentQuery::default()).await.unwrap();
        assert_eq!(page.total_items, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 1);
        assert_eq!(page.content.len(), 12);

        let last = service
            .browse(ContentQuery {
                page: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(last.content.len(), 1);
    }

    #[tokio::test]
    async fn test_browse_clamps_bounds() {
        let service = setup_service(3).await;

        let page = service
            .browse(ContentQuery {
                page: 0,
                limit: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.current_page, 1);
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.total_pages, 3);
    }

    #[tokio::test]
    async fn test_browse_huge_page_is_empty() {
        let service = setup_service(3).await;

        let page = service
            .browse(ContentQuery {
                page: i64::MAX,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.content.is_empty());
        assert_eq!(page.total_items, 3);
        assert_eq!(page.current_page, i64::MAX);
    }

    #[tokio::test]
    async fn test_create_keeps_type_specific_fields() {
        let service = setup_service(0).await;

        let movie = service
            .create(NewContentInput {
                title: " Heat ".to_string(),
                rating: Some(8.3),
                content_type: MOVIE.to_string(),
                duration: Some("170 min".to_string()),
                episodes: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(movie.title, "Heat");
        assert_eq!(movie.duration.as_deref(), Some("170 min"));
        assert_eq!(movie.episodes, None);

        let show = service
            .create(NewContentInput {
                title: "Dark".to_string(),
                rating: Some(8.7),
                content_type: TV_SHOW.to_string(),
                duration: Some("60 min".to_string()),
                episodes: Some(26),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(show.duration, None);
        assert_eq!(show.episodes, Some(26));

        assert_eq!(service.get(show.id).await.unwrap().unwrap().title, "Dark");
    }

    #[tokio::test]
    async fn test_create_validation() {
        let service = setup_service(0).await;

        let missing = service
            .create(NewContentInput {
                title: "Untitled".to_string(),
                content_type: MOVIE.to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(missing.to_string(), "Title, Rating, and Type are required fields.");

        let out_of_range = service
            .create(NewContentInput {
                title: "Heat".to_string(),
                rating: Some(11.0),
                content_type: MOVIE.to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(out_of_range, CatalogError::ValidationError(_)));

        let bad_type = service
            .create(NewContentInput {
                title: "Heat".to_string(),
                rating: Some(8.0),
                content_type: "podcast".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(bad_type, CatalogError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_get() {
        let service = setup_service(1).await;
        assert_eq!(service.get(1).await.unwrap().unwrap().title, "Title 0");
        assert!(service.get(2).await.unwrap().is_none());
    }
}
