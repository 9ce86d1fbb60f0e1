//! Blog repository
//!
//! This module provides:
//! - `BlogRepository` trait defining the interface for post data access
//! - `SqlxBlogRepository` implementing it on SQLite
//!
//! List queries join the author and category and count approved comments
//! in one statement, so a page of posts costs two queries (count + page).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::sync::Arc;
use uuid::Uuid;

use super::{contains_pattern, non_empty, row_to_author};
use crate::db::DbPool;
use crate::models::{
    reading_time, split_tags, Blog, BlogListItem, BlogQuery, BlogStatus, Category, ListParams,
};

/// Blog repository trait
#[async_trait]
pub trait BlogRepository: Send + Sync {
    async fn create(&self, blog: &Blog) -> Result<Blog>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Blog>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Blog>>;

    /// Persist editable columns, bumping `updated_at`
    async fn update(&self, blog: &Blog) -> Result<Blog>;

    /// Returns whether a row was removed
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Whether `author_id` already has a post titled `title`, ignoring `exclude`
    async fn title_taken(&self, author_id: Uuid, title: &str, exclude: Option<Uuid>)
        -> Result<bool>;

    /// Atomically add one view, returning the new count
    async fn increment_views(&self, id: Uuid) -> Result<i64>;

    /// Recount likes from the likes table, returning the stored count
    async fn refresh_likes_count(&self, id: Uuid) -> Result<i64>;

    /// Filtered, ordered page of posts with the total match count
    async fn list(&self, query: &BlogQuery, params: &ListParams)
        -> Result<(Vec<BlogListItem>, i64)>;

    /// Published posts ranked by views, then likes
    async fn list_popular(&self, limit: i64) -> Result<Vec<BlogListItem>>;
}

pub struct SqlxBlogRepository {
    pool: DbPool,
}

impl SqlxBlogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }
}

const BLOG_COLUMNS: &str = "id, title, slug, content, excerpt, featured_image, author_id, \
    category_id, status, is_featured, allow_comments, meta_title, meta_description, tags, \
    views_count, likes_count, created_at, updated_at, published_at";

const LIST_SELECT: &str = r#"
    SELECT b.id, b.title, b.slug, b.excerpt, b.content, b.featured_image, b.status,
           b.is_featured, b.views_count, b.likes_count, b.tags, b.created_at, b.published_at,
           u.id AS author_id, u.username AS author_username,
           u.first_name AS author_first_name, u.last_name AS author_last_name,
           u.profile_picture AS author_profile_picture,
           c.id AS category_id, c.name AS category_name, c.slug AS category_slug,
           c.description AS category_description, c.created_at AS category_created_at,
           c.updated_at AS category_updated_at,
           (SELECT COUNT(*) FROM comments cm
             WHERE cm.blog_id = b.id AND cm.is_approved = 1) AS comments_count
    FROM blogs b
    JOIN users u ON u.id = b.author_id
    LEFT JOIN categories c ON c.id = b.category_id"#;

const LIST_FROM: &str = r#"
    FROM blogs b
    JOIN users u ON u.id = b.author_id
    LEFT JOIN categories c ON c.id = b.category_id"#;

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn create(&self, blog: &Blog) -> Result<Blog> {
        create_blog(&self.pool, blog).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Blog>> {
        let sql = format!("SELECT {} FROM blogs WHERE id = ?", BLOG_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get blog by ID")?;
        row.as_ref().map(row_to_blog).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Blog>> {
        let sql = format!("SELECT {} FROM blogs WHERE slug = ?", BLOG_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get blog by slug")?;
        row.as_ref().map(row_to_blog).transpose()
    }

    async fn update(&self, blog: &Blog) -> Result<Blog> {
        update_blog(&self.pool, blog).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blogs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete blog")?;
        Ok(result.rows_affected() > 0)
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blogs WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check blog slug")?;
        Ok(count > 0)
    }

    async fn title_taken(
        &self,
        author_id: Uuid,
        title: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM blogs WHERE author_id = ? AND title = ? AND (? IS NULL OR id != ?)",
        )
        .bind(author_id)
        .bind(title)
        .bind(exclude)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check blog title")?;
        Ok(count > 0)
    }

    async fn increment_views(&self, id: Uuid) -> Result<i64> {
        let views: i64 = sqlx::query_scalar(
            "UPDATE blogs SET views_count = views_count + 1 WHERE id = ? RETURNING views_count",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to increment views")?;
        Ok(views)
    }

    async fn refresh_likes_count(&self, id: Uuid) -> Result<i64> {
        let likes: i64 = sqlx::query_scalar(
            r#"
            UPDATE blogs
            SET likes_count = (SELECT COUNT(*) FROM likes WHERE blog_id = blogs.id)
            WHERE id = ?
            RETURNING likes_count
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to refresh likes count")?;
        Ok(likes)
    }

    async fn list(
        &self,
        query: &BlogQuery,
        params: &ListParams,
    ) -> Result<(Vec<BlogListItem>, i64)> {
        list_blogs(&self.pool, query, params).await
    }

    async fn list_popular(&self, limit: i64) -> Result<Vec<BlogListItem>> {
        let sql = format!(
            "{} WHERE b.status = ? ORDER BY b.views_count DESC, b.likes_count DESC, b.created_at DESC LIMIT ?",
            LIST_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(BlogStatus::Published.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list popular blogs")?;
        rows.iter().map(row_to_list_item).collect()
    }
}

async fn create_blog(pool: &DbPool, blog: &Blog) -> Result<Blog> {
    sqlx::query(
        r#"
        INSERT INTO blogs (id, title, slug, content, excerpt, featured_image, author_id,
                           category_id, status, is_featured, allow_comments, meta_title,
                           meta_description, tags, views_count, likes_count, created_at,
                           updated_at, published_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(blog.id)
    .bind(&blog.title)
    .bind(&blog.slug)
    .bind(&blog.content)
    .bind(&blog.excerpt)
    .bind(&blog.featured_image)
    .bind(blog.author_id)
    .bind(blog.category_id)
    .bind(blog.status.as_str())
    .bind(blog.is_featured)
    .bind(blog.allow_comments)
    .bind(&blog.meta_title)
    .bind(&blog.meta_description)
    .bind(&blog.tags)
    .bind(blog.views_count)
    .bind(blog.likes_count)
    .bind(blog.created_at)
    .bind(blog.updated_at)
    .bind(blog.published_at)
    .execute(pool)
    .await
    .context("Failed to create blog")?;

    Ok(blog.clone())
}

async fn update_blog(pool: &DbPool, blog: &Blog) -> Result<Blog> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE blogs
        SET title = ?, content = ?, excerpt = ?, featured_image = ?, category_id = ?,
            status = ?, is_featured = ?, allow_comments = ?, meta_title = ?,
            meta_description = ?, tags = ?, published_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&blog.title)
    .bind(&blog.content)
    .bind(&blog.excerpt)
    .bind(&blog.featured_image)
    .bind(blog.category_id)
    .bind(blog.status.as_str())
    .bind(blog.is_featured)
    .bind(blog.allow_comments)
    .bind(&blog.meta_title)
    .bind(&blog.meta_description)
    .bind(&blog.tags)
    .bind(blog.published_at)
    .bind(now)
    .bind(blog.id)
    .execute(pool)
    .await
    .context("Failed to update blog")?;

    let mut updated = blog.clone();
    updated.updated_at = now;
    Ok(updated)
}

fn push_like<'a>(qb: &mut QueryBuilder<'a, Sqlite>, column: &str, pattern: String) {
    qb.push(column)
        .push(" LIKE ")
        .push_bind(pattern)
        .push(" ESCAPE '\\'");
}

/// Append the WHERE clause for `query` to a builder that already has its FROM
fn push_blog_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, query: &'a BlogQuery) {
    qb.push(" WHERE 1 = 1");

    if let Some(status) = query.status {
        qb.push(" AND b.status = ").push_bind(status.as_str());
    }
    if let Some(author_id) = query.author_id {
        qb.push(" AND b.author_id = ").push_bind(author_id);
    }
    if let Some(category_id) = query.category_id {
        qb.push(" AND b.category_id = ").push_bind(category_id);
    }
    if let Some(is_featured) = query.is_featured {
        qb.push(" AND b.is_featured = ").push_bind(is_featured);
    }
    if let Some(search) = non_empty(&query.search) {
        let pattern = contains_pattern(search);
        qb.push(" AND (");
        push_like(qb, "b.title", pattern.clone());
        qb.push(" OR ");
        push_like(qb, "b.content", pattern.clone());
        qb.push(" OR ");
        push_like(qb, "b.excerpt", pattern.clone());
        qb.push(" OR ");
        push_like(qb, "b.tags", pattern);
        qb.push(")");
    }
    if let Some(name) = non_empty(&query.category_name) {
        qb.push(" AND ");
        push_like(qb, "c.name", contains_pattern(name));
    }
    if let Some(author) = non_empty(&query.author_name) {
        let pattern = contains_pattern(author);
        qb.push(" AND (");
        push_like(qb, "u.username", pattern.clone());
        qb.push(" OR ");
        push_like(qb, "u.first_name", pattern.clone());
        qb.push(" OR ");
        push_like(qb, "u.last_name", pattern);
        qb.push(")");
    }
    for tag in query.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        qb.push(" AND ");
        push_like(qb, "b.tags", contains_pattern(tag));
    }
}

async fn list_blogs(
    pool: &DbPool,
    query: &BlogQuery,
    params: &ListParams,
) -> Result<(Vec<BlogListItem>, i64)> {
    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    count_qb.push(LIST_FROM);
    push_blog_filters(&mut count_qb, query);
    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .context("Failed to count blogs")?;

    let mut qb = QueryBuilder::<Sqlite>::new(LIST_SELECT);
    push_blog_filters(&mut qb, query);
    qb.push(" ORDER BY ")
        .push(query.ordering.to_sql())
        .push(", b.id ASC LIMIT ")
        .push_bind(params.limit())
        .push(" OFFSET ")
        .push_bind(params.offset());

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list blogs")?;

    let items = rows
        .iter()
        .map(row_to_list_item)
        .collect::<Result<Vec<_>>>()?;
    Ok((items, total))
}

fn parse_status(raw: &str) -> Result<BlogStatus> {
    BlogStatus::parse(raw).with_context(|| format!("Invalid blog status in database: {}", raw))
}

fn row_to_blog(row: &SqliteRow) -> Result<Blog> {
    let status: String = row.try_get("status")?;
    Ok(Blog {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        content: row.try_get("content")?,
        excerpt: row.try_get("excerpt")?,
        featured_image: row.try_get("featured_image")?,
        author_id: row.try_get("author_id")?,
        category_id: row.try_get("category_id")?,
        status: parse_status(&status)?,
        is_featured: row.try_get("is_featured")?,
        allow_comments: row.try_get("allow_comments")?,
        meta_title: row.try_get("meta_title")?,
        meta_description: row.try_get("meta_description")?,
        tags: row.try_get("tags")?,
        views_count: row.try_get("views_count")?,
        likes_count: row.try_get("likes_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        published_at: row.try_get("published_at")?,
    })
}

fn row_to_joined_category(row: &SqliteRow) -> Result<Option<Category>> {
    let id: Option<Uuid> = row.try_get("category_id")?;
    match id {
        Some(id) => Ok(Some(Category {
            id,
            name: row.try_get("category_name")?,
            slug: row.try_get("category_slug")?,
            description: row.try_get("category_description")?,
            created_at: row.try_get("category_created_at")?,
            updated_at: row.try_get("category_updated_at")?,
        })),
        None => Ok(None),
    }
}

fn row_to_list_item(row: &SqliteRow) -> Result<BlogListItem> {
    let status: String = row.try_get("status")?;
    let content: String = row.try_get("content")?;
    let tags: String = row.try_get("tags")?;
    Ok(BlogListItem {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        excerpt: row.try_get("excerpt")?,
        featured_image: row.try_get("featured_image")?,
        author: row_to_author(row)?,
        category: row_to_joined_category(row)?,
        status: parse_status(&status)?,
        is_featured: row.try_get("is_featured")?,
        views_count: row.try_get("views_count")?,
        likes_count: row.try_get("likes_count")?,
        reading_time: reading_time(&content),
        comments_count: row.try_get("comments_count")?,
        tags_list: split_tags(&tags),
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
    })
}
