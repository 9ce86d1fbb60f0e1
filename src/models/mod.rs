//! Data models
//!
//! Database entities (User, AuthToken, Category, Blog, Comment, Like),
//! the input types services accept and the views they return.

mod blog;
mod category;
mod comment;
mod pagination;
mod token;
mod user;

pub use blog::{
    default_blog_ordering, reading_time, split_tags, Blog, BlogDetail, BlogListItem,
    BlogOrdering, BlogQuery, BlogSortField, BlogStatus, CreateBlogInput, UpdateBlogInput,
    WORDS_PER_MINUTE,
};
pub use category::{Category, CreateCategoryInput};
pub use comment::{build_comment_tree, build_thread, Comment, CommentNode, CommentWithAuthor, Like};
pub use pagination::{ListParams, PagedResult, SortField, SortOrder, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use token::AuthToken;
pub use user::{PublicProfile, UpdateProfileInput, User, UserSummary};

/// Columns user lists can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSortField {
    Username,
    CreatedAt,
}

impl SortField for UserSortField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "username" => Some(Self::Username),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::CreatedAt => "created_at",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::Username => "u.username",
            Self::CreatedAt => "u.created_at",
        }
    }
}

pub type UserOrdering = SortOrder<UserSortField>;

/// Filters for the public user directory
#[derive(Debug, Clone, PartialEq)]
pub struct UserQuery {
    /// Matches username, first name, last name or bio
    pub search: Option<String>,
    /// Exact location match
    pub location: Option<String>,
    /// Exact username match
    pub username: Option<String>,
    pub ordering: UserOrdering,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            search: None,
            location: None,
            username: None,
            ordering: SortOrder::desc(UserSortField::CreatedAt),
        }
    }
}

impl UserQuery {
    pub fn cache_key(&self) -> String {
        format!(
            "q={}|l={}|u={}|o={}",
            self.search.as_deref().unwrap_or("").to_lowercase(),
            self.location.as_deref().unwrap_or(""),
            self.username.as_deref().unwrap_or("").to_lowercase(),
            self.ordering.as_param()
        )
    }
}
