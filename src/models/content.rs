//! Catalog content model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A movie or TV show in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub genre: Option<String>,
    pub rating: f64,
    /// `movie` or `tv_show`
    pub content_type: String,
    /// Running time, movies only
    pub duration: Option<String>,
    /// Episode count, TV shows only
    pub episodes: Option<i64>,
    pub image_url: Option<String>,
}

/// Sort order for catalog listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentSort {
    /// Insertion order
    #[default]
    Default,
    /// Highest rating first
    TopRated,
}

impl ContentSort {
    /// Unknown values fall back to the default order
    pub fn parse(value: &str) -> Self {
        match value {
            "top_rated" => Self::TopRated,
            _ => Self::Default,
        }
    }
}

/// Filters and pagination for a catalog query
#[derive(Debug, Clone, PartialEq)]
pub struct ContentQuery {
    /// Exact content type match
    pub content_type: Option<String>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
    pub sort: ContentSort,
    /// 1-based page number
    pub page: i64,
    pub limit: i64,
}

impl Default for ContentQuery {
    fn default() -> Self {
        Self {
            content_type: None,
            search: None,
            sort: ContentSort::Default,
            page: 1,
            limit: 12,
        }
    }
}

impl ContentQuery {
    /// Rows to skip. Saturates instead of overflowing on huge page numbers.
    pub fn offset(&self) -> i64 {
        self.page
            .saturating_sub(1)
            .max(0)
            .saturating_mul(self.limit.max(0))
    }
}

/// One page of catalog results
#[derive(Debug, Clone, Serialize)]
pub struct ContentPage {
    pub content: Vec<Content>,
    pub total_pages: i64,
    pub current_page: i64,
    pub total_items: i64,
}

impl ContentPage {
    pub fn new(content: Vec<Content>, total_items: i64, query: &ContentQuery) -> Self {
        let total_pages = (total_items + query.limit - 1) / query.limit;
        Self {
            content,
            total_pages,
            current_page: query.page,
            total_items,
        }
    }
}
