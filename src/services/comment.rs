//! Comment service
//!
//! Threaded comments on posts. Only approved comments are listed; new
//! comments start approved or pending depending on configuration, and
//! staff moderate the rest.

use crate::cache::MemoryCache;
use crate::db::repositories::{BlogRepository, CommentRepository};
use crate::models::{
    build_comment_tree, build_thread, Blog, Comment, CommentNode, CommentWithAuthor, User,
};
use crate::services::blog::invalidate_blog_cache;
use crate::services::validate::char_len;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const CONTENT_MIN_LEN: usize = 10;

/// Error types for comment service operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for a new comment or reply
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub content: String,
    #[serde(default)]
    pub parent: Option<Uuid>,
}

pub struct CommentService {
    comment_repo: Arc<dyn CommentRepository>,
    blog_repo: Arc<dyn BlogRepository>,
    cache: Arc<MemoryCache>,
    auto_approve: bool,
}

impl CommentService {
    pub fn new(
        comment_repo: Arc<dyn CommentRepository>,
        blog_repo: Arc<dyn BlogRepository>,
        cache: Arc<MemoryCache>,
        auto_approve: bool,
    ) -> Self {
        Self {
            comment_repo,
            blog_repo,
            cache,
            auto_approve,
        }
    }

    /// Approved top-level comments of a post with their approved replies
    pub async fn list_for_blog(
        &self,
        slug: &str,
        viewer: Option<&User>,
    ) -> Result<Vec<CommentNode>, CommentServiceError> {
        let blog = self.visible_blog(slug, viewer).await?;
        let comments = self
            .comment_repo
            .list_approved(blog.id)
            .await
            .context("Failed to list comments")?;
        Ok(build_comment_tree(comments))
    }

    /// Comment on a post, optionally replying to one of its comments
    ///
    /// # Errors
    /// - `NotFound` if the post does not exist or is hidden from `author`
    /// - `ValidationError` for short content, a post closed to comments,
    ///   or a parent from another post
    pub async fn create(
        &self,
        author: &User,
        slug: &str,
        input: CreateCommentInput,
    ) -> Result<CommentNode, CommentServiceError> {
        let blog = self.visible_blog(slug, Some(author)).await?;
        if !blog.allow_comments {
            return Err(CommentServiceError::ValidationError(
                "Comments are disabled for this blog.".to_string(),
            ));
        }
        let content = validate_content(&input.content)?;

        if let Some(parent_id) = input.parent {
            let parent = self
                .comment_repo
                .get_by_id(parent_id)
                .await
                .context("Failed to get parent comment")?;
            if parent.map_or(true, |p| p.blog_id != blog.id) {
                return Err(CommentServiceError::ValidationError(
                    "Parent comment must belong to the same blog.".to_string(),
                ));
            }
        }

        let comment = Comment::new(blog.id, author.id, input.parent, content, self.auto_approve);
        self.comment_repo
            .create(&comment)
            .await
            .context("Failed to create comment")?;
        if comment.is_approved {
            invalidate_blog_cache(&self.cache).await;
        }
        tracing::info!(comment_id = %comment.id, blog = %blog.slug, "Comment created");

        Ok(CommentNode::leaf(CommentWithAuthor {
            comment,
            author: author.summary(),
        }))
    }

    /// One comment with its approved replies
    ///
    /// Comments on a post the viewer cannot see are reported missing.
    /// Staff see every comment.
    pub async fn get(&self, viewer: &User, id: Uuid) -> Result<CommentNode, CommentServiceError> {
        self.visible_comment(viewer, id).await?;
        self.thread(id).await
    }

    /// Edit the text of one's own comment
    pub async fn update(
        &self,
        actor: &User,
        id: Uuid,
        content: &str,
    ) -> Result<CommentNode, CommentServiceError> {
        self.owned_comment(actor, id, "edit").await?;
        let content = validate_content(content)?;

        self.comment_repo
            .update_content(id, &content)
            .await
            .context("Failed to update comment")?;
        self.thread(id).await
    }

    /// Delete one's own comment together with its replies
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), CommentServiceError> {
        self.owned_comment(actor, id, "delete").await?;
        self.comment_repo
            .delete(id)
            .await
            .context("Failed to delete comment")?;
        invalidate_blog_cache(&self.cache).await;
        Ok(())
    }

    /// Approve or hide a comment; callers must check staff rights
    pub async fn moderate(
        &self,
        id: Uuid,
        approved: bool,
    ) -> Result<CommentNode, CommentServiceError> {
        let updated = self
            .comment_repo
            .set_approved(id, approved)
            .await
            .context("Failed to moderate comment")?;
        if !updated {
            return Err(CommentServiceError::NotFound(format!("comment {}", id)));
        }
        invalidate_blog_cache(&self.cache).await;
        tracing::info!(comment_id = %id, approved, "Comment moderated");
        self.thread(id).await
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn visible_blog(
        &self,
        slug: &str,
        viewer: Option<&User>,
    ) -> Result<Blog, CommentServiceError> {
        self.blog_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get blog")?
            .filter(|blog| blog.is_visible_to(viewer.map(|v| v.id)))
            .ok_or_else(|| CommentServiceError::NotFound(format!("blog {}", slug)))
    }

    /// Comment `id` with its approved replies, unchecked
    async fn thread(&self, id: Uuid) -> Result<CommentNode, CommentServiceError> {
        let entry = self
            .comment_repo
            .get_with_author(id)
            .await
            .context("Failed to get comment")?
            .ok_or_else(|| CommentServiceError::NotFound(format!("comment {}", id)))?;

        let mut entries = self
            .comment_repo
            .list_approved(entry.comment.blog_id)
            .await
            .context("Failed to list replies")?;
        if !entry.comment.is_approved {
            entries.push(entry);
        }

        build_thread(id, entries)
            .ok_or_else(|| anyhow!("Comment {} vanished while loading its thread", id).into())
    }

    /// Comment `id` if the post it belongs to is visible to `viewer`
    async fn visible_comment(
        &self,
        viewer: &User,
        id: Uuid,
    ) -> Result<Comment, CommentServiceError> {
        let missing = || CommentServiceError::NotFound(format!("comment {}", id));
        let comment = self
            .comment_repo
            .get_by_id(id)
            .await
            .context("Failed to get comment")?
            .ok_or_else(missing)?;
        let blog = self
            .blog_repo
            .get_by_id(comment.blog_id)
            .await
            .context("Failed to get blog")?
            .ok_or_else(missing)?;
        if !viewer.is_staff && !blog.is_visible_to(Some(viewer.id)) {
            return Err(missing());
        }
        Ok(comment)
    }

    async fn owned_comment(
        &self,
        actor: &User,
        id: Uuid,
        action: &str,
    ) -> Result<Comment, CommentServiceError> {
        let comment = self.visible_comment(actor, id).await?;
        if comment.author_id != actor.id {
            return Err(CommentServiceError::Forbidden(format!(
                "You can only {} your own comments.",
                action
            )));
        }
        Ok(comment)
    }
}

fn validate_content(content: &str) -> Result<String, CommentServiceError> {
    let content = content.trim();
    if char_len(content) < CONTENT_MIN_LEN {
        return Err(CommentServiceError::ValidationError(
            "Comment must be at least 10 characters long.".to_string(),
        ));
    }
    Ok(content.to_string())
}
