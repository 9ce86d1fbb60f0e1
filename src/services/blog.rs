//! Blog service
//!
//! Implements business logic for posts:
//! - create, update and delete by the author
//! - detail view with comment tree, like state and view counting
//! - published lists (filtered, searched, featured, popular, per author)
//!
//! Published list pages are cached for ten minutes and dropped on any
//! write that could change them.

use crate::cache::{CacheLayer, MemoryCache};
use crate::db::repositories::{
    is_unique_violation, BlogRepository, CategoryRepository, CommentRepository, LikeRepository,
    UserRepository,
};
use crate::models::{
    build_comment_tree, Blog, BlogDetail, BlogListItem, BlogOrdering, BlogQuery, BlogStatus,
    Category, CreateBlogInput, ListParams, PagedResult, UpdateBlogInput, User, MAX_PAGE_SIZE,
};
use crate::services::slug::{slugify_or, unique_slug};
use crate::services::validate::{char_len, is_http_url};
use anyhow::{anyhow, Context};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Published list pages (10 minutes)
const BLOG_LIST_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

pub(crate) const CACHE_KEY_BLOG_PREFIX: &str = "blogs:";
const CACHE_KEY_BLOG_LIST: &str = "blogs:list:";

const POPULAR_LIMIT: i64 = 10;

/// Path segments under `/blogs/` owned by fixed routes
const RESERVED_SLUGS: &[&str] = &["create", "featured", "popular", "search"];
/// Inserts retried when a concurrent create claims the chosen slug
const SLUG_ATTEMPTS: u32 = 3;

const TITLE_MIN_LEN: usize = 10;
const TITLE_MAX_LEN: usize = 200;
const CONTENT_MIN_LEN: usize = 100;
const EXCERPT_MAX_LEN: usize = 500;
const META_TITLE_MAX_LEN: usize = 60;
const META_DESCRIPTION_MAX_LEN: usize = 160;
const TAGS_MAX_LEN: usize = 500;

/// Error types for blog service operations
#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("Blog not found: {0}")]
    NotFound(String),

    /// The actor is not the post's author
    #[error("{0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Filters for one author's post list
#[derive(Debug, Clone, Default)]
pub struct UserBlogFilter {
    pub status: Option<BlogStatus>,
    pub is_featured: Option<bool>,
    pub ordering: Option<BlogOrdering>,
}

/// Free-text search over published posts
#[derive(Debug, Clone, Default)]
pub struct BlogSearch {
    pub q: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
}

pub struct BlogService {
    blog_repo: Arc<dyn BlogRepository>,
    user_repo: Arc<dyn UserRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    comment_repo: Arc<dyn CommentRepository>,
    like_repo: Arc<dyn LikeRepository>,
    cache: Arc<MemoryCache>,
}

impl BlogService {
    pub fn new(
        blog_repo: Arc<dyn BlogRepository>,
        user_repo: Arc<dyn UserRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        comment_repo: Arc<dyn CommentRepository>,
        like_repo: Arc<dyn LikeRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            blog_repo,
            user_repo,
            category_repo,
            comment_repo,
            like_repo,
            cache,
        }
    }

    /// Create a post for `author`
    ///
    /// The slug is derived from the title; clashes get `-2`, `-3`, ...
    ///
    /// # Errors
    /// - `ValidationError` for field limits, an unknown category, or a
    ///   title the author already uses
    pub async fn create(
        &self,
        author: &User,
        input: CreateBlogInput,
    ) -> Result<BlogDetail, BlogServiceError> {
        let now = Utc::now();
        let status = input.status.unwrap_or_default();
        let mut blog = Blog {
            id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            slug: String::new(),
            content: input.content,
            excerpt: input.excerpt,
            featured_image: input.featured_image.filter(|url| !url.trim().is_empty()),
            author_id: author.id,
            category_id: input.category,
            status,
            is_featured: input.is_featured.unwrap_or(false),
            allow_comments: input.allow_comments.unwrap_or(true),
            meta_title: input.meta_title,
            meta_description: input.meta_description,
            tags: input.tags,
            views_count: 0,
            likes_count: 0,
            created_at: now,
            updated_at: now,
            published_at: (status == BlogStatus::Published).then_some(now),
        };

        validate_blog(&blog)?;
        let category = self.resolve_category(blog.category_id).await?;
        self.ensure_title_free(author.id, &blog.title, None).await?;

        let base = slugify_or(&blog.title, "post");
        let mut attempt = 0;
        let created = loop {
            attempt += 1;
            blog.slug = self.free_slug(&base).await?;
            match self.blog_repo.create(&blog).await {
                Ok(created) => break created,
                Err(e) if is_unique_violation(&e) => {
                    // Either the title or the slug was claimed after the checks
                    self.ensure_title_free(author.id, &blog.title, None).await?;
                    if attempt >= SLUG_ATTEMPTS {
                        return Err(e.context("Failed to claim a free blog slug").into());
                    }
                    tracing::debug!(slug = %blog.slug, "Blog slug claimed concurrently, retrying");
                }
                Err(e) => return Err(e.context("Failed to create blog").into()),
            }
        };

        self.invalidate_list_cache().await;
        tracing::info!(slug = %created.slug, author = %author.username, "Blog created");

        Ok(BlogDetail {
            author: author.summary(),
            category,
            tags_list: created.tags_list(),
            reading_time: created.reading_time(),
            is_liked_by_user: false,
            comments: Vec::new(),
            blog: created,
        })
    }

    /// Apply a partial update; only the author may edit
    ///
    /// The slug never changes. `published_at` is stamped the first time the
    /// post becomes published.
    pub async fn update(
        &self,
        actor: &User,
        slug: &str,
        input: UpdateBlogInput,
    ) -> Result<BlogDetail, BlogServiceError> {
        let mut blog = self.find_by_slug(slug).await?;
        if blog.author_id != actor.id {
            return Err(BlogServiceError::Forbidden(
                "You can only edit your own blog posts.".to_string(),
            ));
        }

        let title_changed = match input.title {
            Some(title) => {
                let title = title.trim().to_string();
                let changed = title != blog.title;
                blog.title = title;
                changed
            }
            None => false,
        };
        if let Some(content) = input.content {
            blog.content = content;
        }
        if let Some(excerpt) = input.excerpt {
            blog.excerpt = excerpt;
        }
        if let Some(image) = input.featured_image {
            blog.featured_image = image.filter(|url| !url.trim().is_empty());
        }
        if let Some(category) = input.category {
            blog.category_id = category;
        }
        if let Some(status) = input.status {
            blog.status = status;
        }
        if let Some(is_featured) = input.is_featured {
            blog.is_featured = is_featured;
        }
        if let Some(allow_comments) = input.allow_comments {
            blog.allow_comments = allow_comments;
        }
        if let Some(meta_title) = input.meta_title {
            blog.meta_title = meta_title;
        }
        if let Some(meta_description) = input.meta_description {
            blog.meta_description = meta_description;
        }
        if let Some(tags) = input.tags {
            blog.tags = tags;
        }
        if blog.is_published() && blog.published_at.is_none() {
            blog.published_at = Some(Utc::now());
        }

        validate_blog(&blog)?;
        let category = self.resolve_category(blog.category_id).await?;
        if title_changed {
            self.ensure_title_free(blog.author_id, &blog.title, Some(blog.id))
                .await?;
        }

        let updated = match self.blog_repo.update(&blog).await {
            Ok(updated) => updated,
            Err(e) if is_unique_violation(&e) => {
                return Err(BlogServiceError::ValidationError(
                    "You already have a blog post with this title.".to_string(),
                ))
            }
            Err(e) => return Err(e.context("Failed to update blog").into()),
        };
        self.invalidate_list_cache().await;

        let comments = self.comment_tree(updated.id).await?;
        let is_liked_by_user = self
            .like_repo
            .exists(updated.id, actor.id)
            .await
            .context("Failed to check like")?;

        Ok(BlogDetail {
            author: actor.summary(),
            category,
            tags_list: updated.tags_list(),
            reading_time: updated.reading_time(),
            is_liked_by_user,
            comments,
            blog: updated,
        })
    }

    /// Delete a post with its comments and likes; only the author may
    pub async fn delete(&self, actor: &User, slug: &str) -> Result<(), BlogServiceError> {
        let blog = self.find_by_slug(slug).await?;
        if blog.author_id != actor.id {
            return Err(BlogServiceError::Forbidden(
                "You can only delete your own blog posts.".to_string(),
            ));
        }

        self.blog_repo
            .delete(blog.id)
            .await
            .context("Failed to delete blog")?;
        self.invalidate_list_cache().await;
        tracing::info!(slug = %blog.slug, "Blog deleted");
        Ok(())
    }

    /// Detail view of a post
    ///
    /// Unpublished posts are reported missing to everyone but their
    /// author. Viewing a published post counts one view.
    pub async fn get_for_viewer(
        &self,
        slug: &str,
        viewer: Option<&User>,
    ) -> Result<BlogDetail, BlogServiceError> {
        let mut blog = self.find_by_slug(slug).await?;
        if !blog.is_visible_to(viewer.map(|v| v.id)) {
            return Err(BlogServiceError::NotFound(slug.to_string()));
        }

        if blog.is_published() {
            blog.views_count = self
                .blog_repo
                .increment_views(blog.id)
                .await
                .context("Failed to count view")?;
        }

        let author = self
            .user_repo
            .get_by_id(blog.author_id)
            .await
            .context("Failed to get blog author")?
            .ok_or_else(|| anyhow!("Author {} of blog {} is missing", blog.author_id, blog.id))?;
        // A deleted category has already nulled `category_id`
        let category = match blog.category_id {
            Some(id) => self
                .category_repo
                .get_by_id(id)
                .await
                .context("Failed to get category")?,
            None => None,
        };
        let comments = self.comment_tree(blog.id).await?;
        let is_liked_by_user = match viewer {
            Some(viewer) => self
                .like_repo
                .exists(blog.id, viewer.id)
                .await
                .context("Failed to check like")?,
            None => false,
        };

        Ok(BlogDetail {
            author: author.summary(),
            category,
            tags_list: blog.tags_list(),
            reading_time: blog.reading_time(),
            is_liked_by_user,
            comments,
            blog,
        })
    }

    /// Page of published posts matching `filter`
    pub async fn list_published(
        &self,
        filter: BlogQuery,
        params: &ListParams,
    ) -> Result<PagedResult<BlogListItem>, BlogServiceError> {
        let query = BlogQuery {
            status: Some(BlogStatus::Published),
            ..filter
        };
        let cache_key = format!(
            "{}{}:{}:{}",
            CACHE_KEY_BLOG_LIST,
            params.page,
            params.page_size,
            query.cache_key()
        );
        if let Ok(Some(cached)) = self
            .cache
            .get::<PagedResult<BlogListItem>>(&cache_key)
            .await
        {
            return Ok(cached);
        }

        let page = self.query_page(&query, params).await?;

        if let Err(e) = self.cache.set(&cache_key, &page, BLOG_LIST_CACHE_TTL).await {
            tracing::warn!("Failed to cache blog list: {}", e);
        }
        Ok(page)
    }

    /// Posts by one user; the owner also sees drafts and archived posts
    pub async fn list_by_user(
        &self,
        user_id: Uuid,
        viewer: Option<&User>,
        filter: UserBlogFilter,
        params: &ListParams,
    ) -> Result<PagedResult<BlogListItem>, BlogServiceError> {
        let owner = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| BlogServiceError::NotFound(format!("user {}", user_id)))?;

        let is_owner = viewer.map_or(false, |v| v.id == owner.id);
        let status = if is_owner {
            filter.status
        } else {
            match filter.status {
                None | Some(BlogStatus::Published) => Some(BlogStatus::Published),
                // Hidden statuses of someone else's posts match nothing
                Some(_) => return Ok(PagedResult::new(Vec::new(), 0, params)),
            }
        };

        let query = BlogQuery {
            status,
            author_id: Some(owner.id),
            is_featured: filter.is_featured,
            ordering: filter.ordering.unwrap_or_else(crate::models::default_blog_ordering),
            ..BlogQuery::default()
        };
        self.query_page(&query, params).await
    }

    /// Newest-first search over published posts
    pub async fn search(
        &self,
        search: BlogSearch,
        params: &ListParams,
    ) -> Result<PagedResult<BlogListItem>, BlogServiceError> {
        let query = BlogQuery {
            search: search.q,
            category_name: search.category,
            author_name: search.author,
            tags: search.tags,
            ..BlogQuery::published()
        };
        self.query_page(&query, params).await
    }

    /// Every published featured post, newest first
    pub async fn featured(&self) -> Result<Vec<BlogListItem>, BlogServiceError> {
        let query = BlogQuery {
            is_featured: Some(true),
            ..BlogQuery::published()
        };
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let params = ListParams::new(page, MAX_PAGE_SIZE);
            let (batch, total) = self
                .blog_repo
                .list(&query, &params)
                .await
                .context("Failed to list featured blogs")?;
            let done = batch.is_empty() || (items.len() + batch.len()) as i64 >= total;
            items.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    /// Top published posts by views, then likes
    pub async fn popular(&self) -> Result<Vec<BlogListItem>, BlogServiceError> {
        let items = self
            .blog_repo
            .list_popular(POPULAR_LIMIT)
            .await
            .context("Failed to list popular blogs")?;
        Ok(items)
    }

    /// Post by slug regardless of status
    pub async fn find_by_slug(&self, slug: &str) -> Result<Blog, BlogServiceError> {
        self.blog_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get blog")?
            .ok_or_else(|| BlogServiceError::NotFound(slug.to_string()))
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn query_page(
        &self,
        query: &BlogQuery,
        params: &ListParams,
    ) -> Result<PagedResult<BlogListItem>, BlogServiceError> {
        let (items, total) = self
            .blog_repo
            .list(query, params)
            .await
            .context("Failed to list blogs")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// First slug from `base` that is neither stored nor a fixed route
    async fn free_slug(&self, base: &str) -> Result<String, BlogServiceError> {
        let repo = self.blog_repo.clone();
        let slug = unique_slug(base, |candidate| {
            let repo = repo.clone();
            async move {
                if RESERVED_SLUGS.contains(&candidate.as_str()) {
                    return Ok(true);
                }
                repo.slug_exists(&candidate).await
            }
        })
        .await
        .context("Failed to pick blog slug")?;
        Ok(slug)
    }

    async fn resolve_category(
        &self,
        category_id: Option<Uuid>,
    ) -> Result<Option<Category>, BlogServiceError> {
        let Some(id) = category_id else {
            return Ok(None);
        };
        let category = self
            .category_repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| BlogServiceError::ValidationError("Invalid category.".to_string()))?;
        Ok(Some(category))
    }

    async fn ensure_title_free(
        &self,
        author_id: Uuid,
        title: &str,
        exclude: Option<Uuid>,
    ) -> Result<(), BlogServiceError> {
        let taken = self
            .blog_repo
            .title_taken(author_id, title, exclude)
            .await
            .context("Failed to check blog title")?;
        if taken {
            return Err(BlogServiceError::ValidationError(
                "You already have a blog post with this title.".to_string(),
            ));
        }
        Ok(())
    }

    async fn comment_tree(
        &self,
        blog_id: Uuid,
    ) -> Result<Vec<crate::models::CommentNode>, BlogServiceError> {
        let comments = self
            .comment_repo
            .list_approved(blog_id)
            .await
            .context("Failed to list comments")?;
        Ok(build_comment_tree(comments))
    }

    async fn invalidate_list_cache(&self) {
        invalidate_blog_cache(&self.cache).await;
    }
}

/// Drop every cached blog page
pub(crate) async fn invalidate_blog_cache(cache: &MemoryCache) {
    if let Err(e) = cache
        .delete_pattern(&format!("{}*", CACHE_KEY_BLOG_PREFIX))
        .await
    {
        tracing::warn!("Failed to invalidate blog cache: {}", e);
    }
}

/// Check every field limit of a post
fn validate_blog(blog: &Blog) -> Result<(), BlogServiceError> {
    let invalid = |msg: &str| Err(BlogServiceError::ValidationError(msg.to_string()));

    let title_len = char_len(&blog.title);
    if title_len < TITLE_MIN_LEN {
        return invalid("Title must be at least 10 characters long.");
    }
    if title_len > TITLE_MAX_LEN {
        return invalid("Title must be at most 200 characters.");
    }
    if char_len(blog.content.trim()) < CONTENT_MIN_LEN {
        return invalid("Content must be at least 100 characters long.");
    }
    if char_len(&blog.excerpt) > EXCERPT_MAX_LEN {
        return invalid("Excerpt must be at most 500 characters.");
    }
    if char_len(&blog.meta_title) > META_TITLE_MAX_LEN {
        return invalid("Meta title must be at most 60 characters.");
    }
    if char_len(&blog.meta_description) > META_DESCRIPTION_MAX_LEN {
        return invalid("Meta description must be at most 160 characters.");
    }
    if char_len(&blog.tags) > TAGS_MAX_LEN {
        return invalid("Tags must be at most 500 characters.");
    }
    if let Some(image) = &blog.featured_image {
        if !is_http_url(image) {
            return invalid("Featured image must be a valid http(s) URL.");
        }
    }
    Ok(())
}
