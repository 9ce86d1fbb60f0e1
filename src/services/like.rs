//! Like service
//!
//! A user likes a post at most once. The post's `likes_count` is
//! recomputed from the likes table after every change so it cannot drift.

use crate::cache::MemoryCache;
use crate::db::repositories::{BlogRepository, LikeRepository};
use crate::models::{Blog, User};
use crate::services::blog::invalidate_blog_cache;
use anyhow::Context;
use std::sync::Arc;

/// Error types for like service operations
#[derive(Debug, thiserror::Error)]
pub enum LikeServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Blog not liked")]
    NotLiked,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// What a like request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Created,
    AlreadyLiked,
}

/// Result of a like or unlike, with the post's new total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeResult {
    pub outcome: LikeOutcome,
    pub likes_count: i64,
}

pub struct LikeService {
    blog_repo: Arc<dyn BlogRepository>,
    like_repo: Arc<dyn LikeRepository>,
    cache: Arc<MemoryCache>,
}

impl LikeService {
    pub fn new(
        blog_repo: Arc<dyn BlogRepository>,
        like_repo: Arc<dyn LikeRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            blog_repo,
            like_repo,
            cache,
        }
    }

    /// Like a post; liking twice is not an error
    pub async fn like(&self, user: &User, slug: &str) -> Result<LikeResult, LikeServiceError> {
        let blog = self.visible_blog(user, slug).await?;
        let created = self
            .like_repo
            .add(blog.id, user.id)
            .await
            .context("Failed to add like")?;

        let likes_count = self.refresh(&blog, created).await?;
        let outcome = if created {
            tracing::debug!(blog = %blog.slug, user_id = %user.id, "Blog liked");
            LikeOutcome::Created
        } else {
            LikeOutcome::AlreadyLiked
        };
        Ok(LikeResult {
            outcome,
            likes_count,
        })
    }

    /// Remove a like
    ///
    /// # Errors
    /// `NotLiked` if the user had not liked the post
    pub async fn unlike(&self, user: &User, slug: &str) -> Result<i64, LikeServiceError> {
        let blog = self.visible_blog(user, slug).await?;
        let removed = self
            .like_repo
            .remove(blog.id, user.id)
            .await
            .context("Failed to remove like")?;
        if !removed {
            return Err(LikeServiceError::NotLiked);
        }
        self.refresh(&blog, true).await
    }

    async fn visible_blog(&self, user: &User, slug: &str) -> Result<Blog, LikeServiceError> {
        self.blog_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get blog")?
            .filter(|blog| blog.is_visible_to(Some(user.id)))
            .ok_or_else(|| LikeServiceError::NotFound(format!("blog {}", slug)))
    }

    async fn refresh(&self, blog: &Blog, changed: bool) -> Result<i64, LikeServiceError> {
        let likes = self
            .blog_repo
            .refresh_likes_count(blog.id)
            .await
            .context("Failed to refresh likes count")?;
        if changed {
            invalidate_blog_cache(&self.cache).await;
        }
        Ok(likes)
    }
}
