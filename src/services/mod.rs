//! Services layer - Business logic
//!
//! This module contains the business logic of the Inkpost blog API.
//! Services are responsible for:
//! - Implementing business rules
//! - Coordinating between repositories and cache
//! - Handling validation and error cases

pub mod blog;
pub mod category;
pub mod comment;
pub mod like;
pub mod password;
pub mod rate_limiter;
pub mod slug;
pub mod user;
pub mod validate;

pub use blog::{BlogSearch, BlogService, BlogServiceError, UserBlogFilter};
pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError, CreateCommentInput};
pub use like::{LikeOutcome, LikeResult, LikeService, LikeServiceError};
pub use password::{hash_password, verify_password};
pub use rate_limiter::{LoginRateLimiter, RateDecision, RequestThrottle, SlidingWindowLimiter};
pub use slug::{slugify, slugify_or, unique_slug};
pub use user::{ChangePasswordInput, RegisterInput, UserService, UserServiceError};
