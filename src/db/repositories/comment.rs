//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

use super::row_to_author;
use crate::db::DbPool;
use crate::models::{Comment, CommentWithAuthor};

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Comment>>;

    async fn get_with_author(&self, id: Uuid) -> Result<Option<CommentWithAuthor>>;

    /// Approved comments of one post, replies included, in no particular order
    async fn list_approved(&self, blog_id: Uuid) -> Result<Vec<CommentWithAuthor>>;

    async fn update_content(&self, id: Uuid, content: &str) -> Result<bool>;

    async fn set_approved(&self, id: Uuid, approved: bool) -> Result<bool>;

    /// Removes the comment and, through the foreign key, its replies
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

pub struct SqlxCommentRepository {
    pool: DbPool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const JOINED_SELECT: &str = r#"
    SELECT cm.id, cm.blog_id, cm.author_id, cm.parent_id, cm.content, cm.is_approved,
           cm.created_at, cm.updated_at,
           u.username AS author_username, u.first_name AS author_first_name,
           u.last_name AS author_last_name, u.profile_picture AS author_profile_picture
    FROM comments cm
    JOIN users u ON u.id = cm.author_id"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, blog_id, author_id, parent_id, content, is_approved,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(comment.id)
        .bind(comment.blog_id)
        .bind(comment.author_id)
        .bind(comment.parent_id)
        .bind(&comment.content)
        .bind(comment.is_approved)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to create comment")?;
        Ok(comment.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT id, blog_id, author_id, parent_id, content, is_approved, created_at, updated_at
             FROM comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get comment")?;
        row.as_ref().map(row_to_comment).transpose()
    }

    async fn get_with_author(&self, id: Uuid) -> Result<Option<CommentWithAuthor>> {
        let sql = format!("{} WHERE cm.id = ?", JOINED_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get comment")?;
        row.as_ref().map(row_to_comment_with_author).transpose()
    }

    async fn list_approved(&self, blog_id: Uuid) -> Result<Vec<CommentWithAuthor>> {
        let sql = format!(
            "{} WHERE cm.blog_id = ? AND cm.is_approved = 1 ORDER BY cm.created_at DESC",
            JOINED_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(blog_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list comments")?;
        rows.iter().map(row_to_comment_with_author).collect()
    }

    async fn update_content(&self, id: Uuid, content: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update comment")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_approved(&self, id: Uuid, approved: bool) -> Result<bool> {
        let result =
            sqlx::query("UPDATE comments SET is_approved = ?, updated_at = ? WHERE id = ?")
                .bind(approved)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .context("Failed to update comment approval")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete comment")?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_comment(row: &SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        blog_id: row.try_get("blog_id")?,
        author_id: row.try_get("author_id")?,
        parent_id: row.try_get("parent_id")?,
        content: row.try_get("content")?,
        is_approved: row.try_get("is_approved")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_comment_with_author(row: &SqliteRow) -> Result<CommentWithAuthor> {
    Ok(CommentWithAuthor {
        comment: row_to_comment(row)?,
        author: row_to_author(row)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        test_support::migrated_pool, BlogRepository, SqlxBlogRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::models::{Blog, BlogStatus, User};

    async fn setup() -> (SqlxCommentRepository, Uuid, Uuid) {
        let pool = migrated_pool().await;
        let user = User::new("c@example.com".into(), "commenter".into(), "hash".into());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();

        let now = Utc::now();
        let blog = Blog {
            id: Uuid::new_v4(),
            title: "Comment Target".into(),
            slug: "comment-target".into(),
            content: "x".repeat(120),
            excerpt: String::new(),
            featured_image: None,
            author_id: user.id,
            category_id: None,
            status: BlogStatus::Published,
            is_featured: false,
            allow_comments: true,
            meta_title: String::new(),
            meta_description: String::new(),
            tags: String::new(),
            views_count: 0,
            likes_count: 0,
            created_at: now,
            updated_at: now,
            published_at: Some(now),
        };
        SqlxBlogRepository::new(pool.clone()).create(&blog).await.unwrap();
        (SqlxCommentRepository::new(pool), blog.id, user.id)
    }

    #[tokio::test]
    async fn test_list_approved_only() {
        let (repo, blog_id, user_id) = setup().await;
        let approved = Comment::new(blog_id, user_id, None, "approved comment".into(), true);
        let pending = Comment::new(blog_id, user_id, None, "pending comment".into(), false);
        repo.create(&approved).await.unwrap();
        repo.create(&pending).await.unwrap();

        let listed = repo.list_approved(blog_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].comment.id, approved.id);
        assert_eq!(listed[0].author.username, "commenter");

        assert!(repo.set_approved(pending.id, true).await.unwrap());
        assert_eq!(repo.list_approved(blog_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let (repo, blog_id, user_id) = setup().await;
        let parent = Comment::new(blog_id, user_id, None, "parent comment".into(), true);
        repo.create(&parent).await.unwrap();
        let reply = Comment::new(blog_id, user_id, Some(parent.id), "reply comment".into(), true);
        repo.create(&reply).await.unwrap();

        assert!(repo.delete(parent.id).await.unwrap());
        assert!(repo.get_by_id(reply.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_content() {
        let (repo, blog_id, user_id) = setup().await;
        let comment = Comment::new(blog_id, user_id, None, "original text".into(), true);
        repo.create(&comment).await.unwrap();

        assert!(repo.update_content(comment.id, "edited text here").await.unwrap());
        let found = repo.get_with_author(comment.id).await.unwrap().unwrap();
        assert_eq!(found.comment.content, "edited text here");
        assert!(!repo.update_content(Uuid::new_v4(), "nothing").await.unwrap());
    }
}
