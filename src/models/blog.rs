//! Blog post model
//!
//! This module provides:
//! - `Blog` entity and its `BlogStatus`
//! - input types for creating and patching posts
//! - `BlogQuery`, the filter set shared by every list endpoint
//! - the list and detail views returned to clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::comment::CommentNode;
use super::pagination::{SortField, SortOrder};
use super::{Category, UserSummary};

/// Reading speed used for `reading_time`
pub const WORDS_PER_MINUTE: usize = 200;

/// Blog post entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    pub id: Uuid,
    pub title: String,
    /// Unique, derived from the title at creation and never changed afterwards
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub featured_image: Option<String>,
    pub author_id: Uuid,
    pub category_id: Option<Uuid>,
    pub status: BlogStatus,
    pub is_featured: bool,
    pub allow_comments: bool,
    pub meta_title: String,
    pub meta_description: String,
    /// Comma separated
    pub tags: String,
    pub views_count: i64,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set the first time the post is published
    pub published_at: Option<DateTime<Utc>>,
}

impl Blog {
    /// Estimated minutes to read, never less than one
    pub fn reading_time(&self) -> u32 {
        reading_time(&self.content)
    }

    pub fn tags_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }

    pub fn is_published(&self) -> bool {
        self.status == BlogStatus::Published
    }

    /// Published posts are public; anything else is seen by its author only
    pub fn is_visible_to(&self, viewer: Option<Uuid>) -> bool {
        self.is_published() || viewer == Some(self.author_id)
    }
}

/// `max(1, round(words / 200))` with ties rounded to even
pub fn reading_time(content: &str) -> u32 {
    let words = content.split_whitespace().count();
    let minutes = (words as f64 / WORDS_PER_MINUTE as f64).round_ties_even() as u32;
    minutes.max(1)
}

/// Split a comma separated tag string, dropping blanks
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Publication status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlogStatus {
    /// Visible to its author only
    #[default]
    Draft,
    Published,
    /// Hidden but kept
    Archived,
}

impl BlogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlogStatus::Draft => "draft",
            BlogStatus::Published => "published",
            BlogStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Some(BlogStatus::Draft),
            "published" => Some(BlogStatus::Published),
            "archived" => Some(BlogStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for BlogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating a post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBlogInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub category: Option<Uuid>,
    #[serde(default)]
    pub status: Option<BlogStatus>,
    #[serde(default)]
    pub is_featured: Option<bool>,
    #[serde(default)]
    pub allow_comments: Option<bool>,
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub tags: String,
}

/// Partial update of a post
///
/// `category` and `featured_image` distinguish "absent" (`None`) from an
/// explicit `null` (`Some(None)`), which clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBlogInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub featured_image: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<Uuid>>,
    pub status: Option<BlogStatus>,
    pub is_featured: Option<bool>,
    pub allow_comments: Option<bool>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub tags: Option<String>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Columns post lists can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlogSortField {
    CreatedAt,
    UpdatedAt,
    ViewsCount,
    LikesCount,
    Title,
}

impl SortField for BlogSortField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            "views_count" => Some(Self::ViewsCount),
            "likes_count" => Some(Self::LikesCount),
            "title" => Some(Self::Title),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::ViewsCount => "views_count",
            Self::LikesCount => "likes_count",
            Self::Title => "title",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "b.created_at",
            Self::UpdatedAt => "b.updated_at",
            Self::ViewsCount => "b.views_count",
            Self::LikesCount => "b.likes_count",
            Self::Title => "b.title",
        }
    }
}

pub type BlogOrdering = SortOrder<BlogSortField>;

/// Newest first
pub fn default_blog_ordering() -> BlogOrdering {
    SortOrder::desc(BlogSortField::CreatedAt)
}

/// Filters accepted by post list queries. Unset fields do not filter.
#[derive(Debug, Clone, PartialEq)]
pub struct BlogQuery {
    pub status: Option<BlogStatus>,
    pub author_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub is_featured: Option<bool>,
    /// Matches title, content, excerpt or tags
    pub search: Option<String>,
    /// Substring of the category name
    pub category_name: Option<String>,
    /// Substring of the author's username, first or last name
    pub author_name: Option<String>,
    /// Every tag must appear in the post's tags
    pub tags: Vec<String>,
    pub ordering: BlogOrdering,
}

impl Default for BlogQuery {
    fn default() -> Self {
        Self {
            status: None,
            author_id: None,
            category_id: None,
            is_featured: None,
            search: None,
            category_name: None,
            author_name: None,
            tags: Vec::new(),
            ordering: default_blog_ordering(),
        }
    }
}

impl BlogQuery {
    /// Published posts only, newest first
    pub fn published() -> Self {
        Self {
            status: Some(BlogStatus::Published),
            ..Self::default()
        }
    }

    /// Stable textual form used to build cache keys
    ///
    /// Text folds ASCII case only, matching SQLite `LIKE`.
    pub fn cache_key(&self) -> String {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        let mut tags: Vec<String> = self.tags.iter().map(|t| t.to_ascii_lowercase()).collect();
        tags.sort();
        format!(
            "s={}|a={}|c={}|f={}|q={}|cn={}|an={}|t={}|o={}",
            opt(&self.status),
            opt(&self.author_id),
            opt(&self.category_id),
            opt(&self.is_featured),
            self.search.as_deref().unwrap_or("").to_ascii_lowercase(),
            self.category_name.as_deref().unwrap_or("").to_ascii_lowercase(),
            self.author_name.as_deref().unwrap_or("").to_ascii_lowercase(),
            tags.join(","),
            self.ordering.as_param(),
        )
    }
}

/// Post as shown in lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogListItem {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub featured_image: Option<String>,
    pub author: UserSummary,
    pub category: Option<Category>,
    pub status: BlogStatus,
    pub is_featured: bool,
    pub views_count: i64,
    pub likes_count: i64,
    pub reading_time: u32,
    /// Approved comments only
    pub comments_count: i64,
    pub tags_list: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Full post with its comment tree
#[derive(Debug, Clone, Serialize)]
pub struct BlogDetail {
    #[serde(flatten)]
    pub blog: Blog,
    pub author: UserSummary,
    pub category: Option<Category>,
    pub tags_list: Vec<String>,
    pub reading_time: u32,
    pub is_liked_by_user: bool,
    pub comments: Vec<CommentNode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reading_time_minimum_one_minute() {
        assert_eq!(reading_time(""), 1);
        assert_eq!(reading_time("just a few words"), 1);
    }

    #[test]
    fn test_reading_time_rounds() {
        let words = |n: usize| vec!["word"; n].join(" ");
        assert_eq!(reading_time(&words(200)), 1);
        assert_eq!(reading_time(&words(299)), 1);
        assert_eq!(reading_time(&words(301)), 2);
        // 500 / 200 = 2.5 rounds to even
        assert_eq!(reading_time(&words(500)), 2);
        assert_eq!(reading_time(&words(700)), 4);
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags(" rust, web ,, api "), vec!["rust", "web", "api"]);
        assert!(split_tags("").is_empty());
        assert!(split_tags(" , ").is_empty());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(BlogStatus::parse("Published"), Some(BlogStatus::Published));
        assert_eq!(BlogStatus::parse("archived"), Some(BlogStatus::Archived));
        assert_eq!(BlogStatus::parse("pending"), None);
        assert_eq!(BlogStatus::default(), BlogStatus::Draft);
    }

    #[test]
    fn test_update_input_distinguishes_null_from_absent() {
        let absent: UpdateBlogInput = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(absent.category.is_none());

        let cleared: UpdateBlogInput = serde_json::from_str(r#"{"category":null}"#).unwrap();
        assert_eq!(cleared.category, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateBlogInput =
            serde_json::from_str(&format!(r#"{{"category":"{}"}}"#, id)).unwrap();
        assert_eq!(set.category, Some(Some(id)));
    }

    #[test]
    fn test_cache_key_normalises_tags_and_case() {
        let a = BlogQuery {
            tags: vec!["Rust".into(), "web".into()],
            search: Some("Axum".into()),
            ..BlogQuery::published()
        };
        let b = BlogQuery {
            tags: vec!["web".into(), "rust".into()],
            search: Some("axum".into()),
            ..BlogQuery::published()
        };
        assert_eq!(a.cache_key(), b.cache_key());

        let c = BlogQuery {
            ordering: SortOrder::asc(BlogSortField::Title),
            ..b
        };
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_cache_key_keeps_non_ascii_case() {
        let upper = BlogQuery {
            search: Some("CAFÉ".into()),
            ..BlogQuery::published()
        };
        let lower = BlogQuery {
            search: Some("café".into()),
            ..BlogQuery::published()
        };
        let mixed = BlogQuery {
            search: Some("CafÉ".into()),
            ..BlogQuery::published()
        };
        assert_ne!(upper.cache_key(), lower.cache_key());
        assert_eq!(upper.cache_key(), mixed.cache_key());
    }

    proptest! {
        #[test]
        fn reading_time_is_at_least_one(words in 0usize..3000) {
            let content = vec!["w"; words].join(" ");
            prop_assert!(reading_time(&content) >= 1);
        }

        #[test]
        fn split_tags_never_yields_blank(raw in "[a-z ,]{0,40}") {
            for tag in split_tags(&raw) {
                prop_assert!(!tag.is_empty());
                prop_assert_eq!(tag.trim(), tag.as_str());
            }
        }
    }
}
