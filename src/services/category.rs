//! Category service
//!
//! Categories are a flat, name-ordered list. The full list is small and
//! read on most pages, so it is cached as a whole and dropped on any write.

use crate::cache::{CacheLayer, MemoryCache};
use crate::db::repositories::{is_unique_violation, CategoryRepository};
use crate::models::{Category, CreateCategoryInput};
use crate::services::slug::{slugify_or, unique_slug};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default cache TTL for the category list (1 hour)
const CATEGORY_CACHE_TTL: Duration = Duration::from_secs(3600);

const CACHE_KEY_CATEGORY_LIST: &str = "categories:list";

const NAME_MAX_LEN: usize = 100;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<MemoryCache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<MemoryCache>) -> Self {
        Self {
            repo,
            cache,
            cache_ttl: CATEGORY_CACHE_TTL,
        }
    }

    /// Every category ordered by name
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<Vec<Category>>(CACHE_KEY_CATEGORY_LIST).await {
            return Ok(cached);
        }

        let categories = self.repo.list().await.context("Failed to list categories")?;

        if let Err(e) = self
            .cache
            .set(CACHE_KEY_CATEGORY_LIST, &categories, self.cache_ttl)
            .await
        {
            tracing::warn!("Failed to cache categories: {}", e);
        }
        Ok(categories)
    }

    /// Create a category
    ///
    /// # Errors
    /// - `ValidationError` for an empty or over-long name
    /// - `DuplicateName` if the name exists, ignoring case
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > NAME_MAX_LEN {
            return Err(CategoryServiceError::ValidationError(format!(
                "Category name must be at most {} characters",
                NAME_MAX_LEN
            )));
        }

        if self
            .repo
            .get_by_name(&name)
            .await
            .context("Failed to check category name")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let base = slugify_or(&name, "category");
        let repo = self.repo.clone();
        let slug = unique_slug(&base, |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate).await }
        })
        .await
        .context("Failed to pick category slug")?;

        let category = Category::new(name.clone(), slug, input.description.trim().to_string());
        let created = match self.repo.create(&category).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(CategoryServiceError::DuplicateName(name))
            }
            Err(e) => return Err(e.context("Failed to create category").into()),
        };

        self.invalidate_cache().await;
        tracing::info!(slug = %created.slug, "Category created");
        Ok(created)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete(CACHE_KEY_CATEGORY_LIST).await {
            tracing::warn!("Failed to invalidate category cache: {}", e);
        }
    }
}
