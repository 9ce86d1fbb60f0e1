//! User service
//!
//! Accounts and token authentication:
//! - registration and login, each returning the user's API token
//! - logout and password change, which revoke the current token
//! - profile reads and partial updates
//! - the public user directory (cached)

use crate::cache::{CacheLayer, MemoryCache};
use crate::config::AuthConfig;
use crate::db::repositories::{is_unique_violation, TokenRepository, UserRepository};
use crate::models::{
    AuthToken, ListParams, PagedResult, PublicProfile, UpdateProfileInput, User, UserQuery,
};
use crate::services::password::{hash_password, verify_password};
use crate::services::validate::{char_len, is_http_url};
use anyhow::{anyhow, Context, Result};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{Duration, Utc};
use data_encoding::HEXLOWER;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const USER_LIST_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(15 * 60);
const USER_DETAIL_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(30 * 60);

const CACHE_KEY_USER_LIST: &str = "users:list:";
const CACHE_KEY_USER_DETAIL: &str = "users:detail:";

const USERNAME_MAX_LEN: usize = 150;
const BIO_MAX_LEN: usize = 500;
const LOCATION_MAX_LEN: usize = 100;

/// Random bytes per token; hex-encoded to 40 characters
const TOKEN_BYTES: usize = 20;

static PHONE_NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\+?1?\d{9,15}$").ok());

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials or inactive account
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Email or username already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Input for a password change
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    token_repo: Arc<dyn TokenRepository>,
    cache: Arc<MemoryCache>,
    token_ttl_days: u32,
    min_password_length: usize,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        token_repo: Arc<dyn TokenRepository>,
        cache: Arc<MemoryCache>,
        auth: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            token_repo,
            cache,
            token_ttl_days: auth.token_ttl_days,
            min_password_length: auth.min_password_length,
        }
    }

    /// Register a new account and issue its first token
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed email or username, a short
    ///   password, or mismatched confirmation
    /// - `UserExists` if the email or username is taken (ignoring case)
    pub async fn register(&self, input: RegisterInput) -> Result<(User, String), UserServiceError> {
        let email = normalize_email(&input.email);
        let username = input.username.trim().to_string();

        validate_email(&email)?;
        validate_username(&username)?;
        self.validate_new_password(&input.password, &input.password_confirm)?;

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(
                "A user with this email already exists.".to_string(),
            ));
        }
        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(
                "A user with that username already exists.".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let mut user = User::new(email, username, password_hash);
        user.first_name = input.first_name.unwrap_or_default().trim().to_string();
        user.last_name = input.last_name.unwrap_or_default().trim().to_string();

        // Two concurrent registrations can both pass the lookups above
        let user = match self.user_repo.create(&user).await {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(
                    "A user with this email or username already exists.".to_string(),
                ))
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        let token = self.issue_token(user.id).await?;
        self.invalidate_user_caches(None).await;
        tracing::info!(user_id = %user.id, username = %user.username, "User registered");

        Ok((user, token.key))
    }

    /// Log in by email and password
    ///
    /// Reuses the user's current token when it is still valid. Unknown
    /// email, wrong password and inactive account all fail the same way.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), UserServiceError> {
        let invalid = || {
            UserServiceError::AuthenticationError(
                "Unable to log in with provided credentials.".to_string(),
            )
        };

        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        let password_valid =
            verify_password(password, &user.password_hash).context("Failed to verify password")?;
        if !password_valid || !user.is_active {
            return Err(invalid());
        }

        let existing = self
            .token_repo
            .get_by_user(user.id)
            .await
            .context("Failed to get token")?;
        let key = match existing {
            Some(token) if !token.is_expired() => token.key,
            _ => self.issue_token(user.id).await?.key,
        };

        Ok((user, key))
    }

    /// Revoke the user's token
    pub async fn logout(&self, user_id: Uuid) -> Result<(), UserServiceError> {
        self.token_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to delete token")?;
        Ok(())
    }

    /// Change the password and rotate the token, returning the new key
    pub async fn change_password(
        &self,
        user: &User,
        input: ChangePasswordInput,
    ) -> Result<String, UserServiceError> {
        let old_valid = verify_password(&input.old_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !old_valid {
            return Err(UserServiceError::ValidationError(
                "Old password is incorrect.".to_string(),
            ));
        }
        self.validate_new_password(&input.new_password, &input.new_password_confirm)?;

        let password_hash =
            hash_password(&input.new_password).context("Failed to hash password")?;
        self.user_repo
            .update_password(user.id, &password_hash)
            .await
            .context("Failed to update password")?;

        let token = self.issue_token(user.id).await?;
        tracing::info!(user_id = %user.id, "Password changed");
        Ok(token.key)
    }

    /// Resolve a token key to its active owner
    ///
    /// Expired tokens are deleted on sight.
    pub async fn authenticate(&self, key: &str) -> Result<Option<User>, UserServiceError> {
        let token = match self.token_repo.get(key).await.context("Failed to get token")? {
            Some(token) => token,
            None => return Ok(None),
        };

        if token.is_expired() {
            self.token_repo
                .delete_by_user(token.user_id)
                .await
                .context("Failed to delete expired token")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(token.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user.filter(|u| u.is_active))
    }

    /// Fresh copy of the caller's own account
    pub async fn get_profile(&self, user_id: Uuid) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound)
    }

    /// Apply a partial profile update
    ///
    /// Empty strings clear `profile_picture`; every other field is stored
    /// as given after validation.
    pub async fn update_profile(
        &self,
        user: &User,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut updated = self.get_profile(user.id).await?;
        if !input.has_changes() {
            return Ok(updated);
        }

        if let Some(username) = input.username {
            let username = username.trim().to_string();
            validate_username(&username)?;
            if !username.eq_ignore_ascii_case(&updated.username) {
                let taken = self
                    .user_repo
                    .get_by_username(&username)
                    .await
                    .context("Failed to check username")?
                    .is_some();
                if taken {
                    return Err(UserServiceError::UserExists(
                        "A user with that username already exists.".to_string(),
                    ));
                }
            }
            updated.username = username;
        }
        if let Some(first_name) = input.first_name {
            updated.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = input.last_name {
            updated.last_name = last_name.trim().to_string();
        }
        if let Some(bio) = input.bio {
            check_max_len("bio", &bio, BIO_MAX_LEN)?;
            updated.bio = bio;
        }
        if let Some(picture) = input.profile_picture {
            let picture = picture.trim().to_string();
            updated.profile_picture = if picture.is_empty() {
                None
            } else {
                validate_url("profile_picture", &picture)?;
                Some(picture)
            };
        }
        if let Some(website) = input.website {
            let website = website.trim().to_string();
            if !website.is_empty() {
                validate_url("website", &website)?;
            }
            updated.website = website;
        }
        if let Some(location) = input.location {
            check_max_len("location", &location, LOCATION_MAX_LEN)?;
            updated.location = location.trim().to_string();
        }
        if let Some(date_of_birth) = input.date_of_birth {
            if date_of_birth > Utc::now().date_naive() {
                return Err(UserServiceError::ValidationError(
                    "date_of_birth cannot be in the future.".to_string(),
                ));
            }
            updated.date_of_birth = Some(date_of_birth);
        }
        if let Some(phone) = input.phone_number {
            let phone = phone.trim().to_string();
            if !phone.is_empty() {
                validate_phone(&phone)?;
            }
            updated.phone_number = phone;
        }

        let saved = match self.user_repo.update(&updated).await {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(
                    "A user with that username already exists.".to_string(),
                ))
            }
            Err(e) => return Err(e.context("Failed to update profile").into()),
        };

        self.invalidate_user_caches(Some(saved.id)).await;
        Ok(saved)
    }

    /// Page of the public user directory
    pub async fn list_users(
        &self,
        query: &UserQuery,
        params: &ListParams,
    ) -> Result<PagedResult<PublicProfile>, UserServiceError> {
        let cache_key = format!(
            "{}{}:{}:{}",
            CACHE_KEY_USER_LIST,
            params.page,
            params.page_size,
            query.cache_key()
        );
        if let Ok(Some(cached)) = self.cache.get::<PagedResult<PublicProfile>>(&cache_key).await {
            return Ok(cached);
        }

        let (users, total) = self
            .user_repo
            .list_active(query, params)
            .await
            .context("Failed to list users")?;
        let page = PagedResult::new(
            users.iter().map(User::public_profile).collect(),
            total,
            params,
        );

        if let Err(e) = self.cache.set(&cache_key, &page, USER_LIST_CACHE_TTL).await {
            tracing::warn!("Failed to cache user list: {}", e);
        }
        Ok(page)
    }

    /// Public profile of an active user
    pub async fn get_user(&self, id: Uuid) -> Result<PublicProfile, UserServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_USER_DETAIL, id);
        if let Ok(Some(cached)) = self.cache.get::<PublicProfile>(&cache_key).await {
            return Ok(cached);
        }

        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .filter(|u| u.is_active)
            .ok_or(UserServiceError::NotFound)?;
        let profile = user.public_profile();

        if let Err(e) = self.cache.set(&cache_key, &profile, USER_DETAIL_CACHE_TTL).await {
            tracing::warn!("Failed to cache user detail: {}", e);
        }
        Ok(profile)
    }

    /// Remove every expired token
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, UserServiceError> {
        let removed = self
            .token_repo
            .delete_expired()
            .await
            .context("Failed to delete expired tokens")?;
        Ok(removed)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    fn validate_new_password(&self, password: &str, confirm: &str) -> Result<(), UserServiceError> {
        if char_len(password) < self.min_password_length {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters long.",
                self.min_password_length
            )));
        }
        if password != confirm {
            return Err(UserServiceError::ValidationError(
                "Passwords don't match.".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a token for the user, replacing any previous one
    async fn issue_token(&self, user_id: Uuid) -> Result<AuthToken, UserServiceError> {
        let now = Utc::now();
        let expires_at = match self.token_ttl_days {
            0 => None,
            days => Some(
                now.checked_add_signed(Duration::days(i64::from(days)))
                    .ok_or_else(|| anyhow!("Token lifetime of {} days is out of range", days))?,
            ),
        };
        let token = AuthToken {
            key: generate_token_key()?,
            user_id,
            created_at: now,
            expires_at,
        };
        self.token_repo
            .replace(&token)
            .await
            .context("Failed to store token")?;
        Ok(token)
    }

    async fn invalidate_user_caches(&self, user_id: Option<Uuid>) {
        if let Err(e) = self.cache.delete_pattern(&format!("{}*", CACHE_KEY_USER_LIST)).await {
            tracing::warn!("Failed to invalidate user list cache: {}", e);
        }
        if let Some(id) = user_id {
            let key = format!("{}{}", CACHE_KEY_USER_DETAIL, id);
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!("Failed to invalidate user detail cache: {}", e);
            }
        }
    }
}

/// 40 lowercase hex characters from the OS random source
fn generate_token_key() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| anyhow!("Failed to generate token: {}", e))?;
    Ok(HEXLOWER.encode(&bytes))
}

/// Trim and lowercase the domain part
fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(UserServiceError::ValidationError(
            "Enter a valid email address.".to_string(),
        ))
    }
}

fn validate_username(username: &str) -> Result<(), UserServiceError> {
    if username.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty.".to_string(),
        ));
    }
    check_max_len("username", username, USERNAME_MAX_LEN)?;
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if !username.chars().all(allowed) {
        return Err(UserServiceError::ValidationError(
            "Username may contain only letters, numbers, and @/./+/-/_ characters.".to_string(),
        ));
    }
    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), UserServiceError> {
    if is_http_url(value) {
        Ok(())
    } else {
        Err(UserServiceError::ValidationError(format!(
            "{} must be a valid http(s) URL.",
            field
        )))
    }
}

fn validate_phone(phone: &str) -> Result<(), UserServiceError> {
    let valid = PHONE_NUMBER.as_ref().map_or(false, |re| re.is_match(phone));
    if valid {
        Ok(())
    } else {
        Err(UserServiceError::ValidationError(
            "Phone number must be entered in the format: '+999999999'. Up to 15 digits allowed."
                .to_string(),
        ))
    }
}

fn check_max_len(field: &str, value: &str, max: usize) -> Result<(), UserServiceError> {
    if char_len(value) > max {
        return Err(UserServiceError::ValidationError(format!(
            "{} must be at most {} characters.",
            field, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        test_support::migrated_pool, SqlxTokenRepository, SqlxUserRepository,
    };
    use crate::db::DbPool;
    use crate::models::UserSortField;
    use chrono::NaiveDate;

    async fn setup_test_service() -> (DbPool, UserService) {
        let pool = migrated_pool().await;
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxTokenRepository::boxed(pool.clone()),
            Arc::new(MemoryCache::new()),
            &AuthConfig::default(),
        );
        (pool, service)
    }

    fn register_input(email: &str, username: &str) -> RegisterInput {
        RegisterInput {
            email: email.to_string(),
            username: username.to_string(),
            password: "password123".to_string(),
            password_confirm: "password123".to_string(),
            first_name: None,
            last_name: None,
        }
    }

    // ========================================================================
    // Registration tests
    // ========================================================================

    #[tokio::test]
    async fn test_out_of_range_token_lifetime_is_an_error() {
        let pool = migrated_pool().await;
        let auth = AuthConfig {
            token_ttl_days: u32::MAX,
            ..AuthConfig::default()
        };
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxTokenRepository::boxed(pool.clone()),
            Arc::new(MemoryCache::new()),
            &auth,
        );

        let result = service.register(register_input("far@example.com", "far")).await;
        assert!(matches!(result, Err(UserServiceError::InternalError(_))));
    }

    #[tokio::test]
    async fn test_register_issues_token() {
        let (_pool, service) = setup_test_service().await;
        let mut input = register_input("writer@Example.COM", "writer");
        input.first_name = Some(" Wren ".into());

        let (user, token) = service.register(input).await.unwrap();

        assert_eq!(user.email, "writer@example.com");
        assert_eq!(user.first_name, "Wren");
        assert_eq!(token.len(), 40);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_duplicates_ignore_case() {
        let (_pool, service) = setup_test_service().await;
        service.register(register_input("a@example.com", "alice")).await.unwrap();

        let same_email = service.register(register_input("A@example.com", "other")).await;
        assert!(matches!(same_email, Err(UserServiceError::UserExists(_))));

        let same_name = service.register(register_input("b@example.com", "ALICE")).await;
        assert!(matches!(same_name, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup_test_service().await;

        let mut mismatch = register_input("a@example.com", "alice");
        mismatch.password_confirm = "password124".into();
        assert!(matches!(
            service.register(mismatch).await,
            Err(UserServiceError::ValidationError(_))
        ));

        let mut short = register_input("a@example.com", "alice");
        short.password = "short".into();
        short.password_confirm = "short".into();
        assert!(matches!(
            service.register(short).await,
            Err(UserServiceError::ValidationError(_))
        ));

        for email in ["", "no-at-sign", "@example.com", "a@", "a@b@c"] {
            let result = service.register(register_input(email, "alice")).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))), "{}", email);
        }

        for username in ["", "has space", "semi;colon"] {
            let result = service.register(register_input("a@example.com", username)).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))), "{}", username);
        }
    }

    // ========================================================================
    // Login and token tests
    // ========================================================================

    #[tokio::test]
    async fn test_login_reuses_token() {
        let (_pool, service) = setup_test_service().await;
        let (_, registered) = service.register(register_input("l@example.com", "lee")).await.unwrap();

        let (user, token) = service.login("L@EXAMPLE.com", "password123").await.unwrap();
        assert_eq!(user.username, "lee");
        assert_eq!(token, registered);
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let (pool, service) = setup_test_service().await;
        let (user, _) = service.register(register_input("l@example.com", "lee")).await.unwrap();

        let wrong = service.login("l@example.com", "wrong-password").await.unwrap_err();
        let missing = service.login("nobody@example.com", "password123").await.unwrap_err();

        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();
        let inactive = service.login("l@example.com", "password123").await.unwrap_err();

        assert_eq!(wrong.to_string(), missing.to_string());
        assert_eq!(wrong.to_string(), inactive.to_string());
    }

    #[tokio::test]
    async fn test_authenticate_and_logout() {
        let (_pool, service) = setup_test_service().await;
        let (user, token) = service.register(register_input("a@example.com", "ann")).await.unwrap();

        let found = service.authenticate(&token).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(service.authenticate("0".repeat(40).as_str()).await.unwrap().is_none());

        service.logout(user.id).await.unwrap();
        assert!(service.authenticate(&token).await.unwrap().is_none());

        // Logging in again issues a fresh token
        let (_, fresh) = service.login("a@example.com", "password123").await.unwrap();
        assert_ne!(fresh, token);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_and_replaced() {
        let (pool, service) = setup_test_service().await;
        let (user, token) = service.register(register_input("e@example.com", "eve")).await.unwrap();

        sqlx::query("UPDATE auth_tokens SET expires_at = ? WHERE user_id = ?")
            .bind(Utc::now() - Duration::hours(1))
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(service.authenticate(&token).await.unwrap().is_none());
        let (_, fresh) = service.login("e@example.com", "password123").await.unwrap();
        assert_ne!(fresh, token);
        assert!(service.authenticate(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_change_password_rotates_token() {
        let (_pool, service) = setup_test_service().await;
        let (user, old_token) =
            service.register(register_input("p@example.com", "pat")).await.unwrap();

        let wrong_old = ChangePasswordInput {
            old_password: "not-it-at-all".into(),
            new_password: "newpassword1".into(),
            new_password_confirm: "newpassword1".into(),
        };
        assert!(matches!(
            service.change_password(&user, wrong_old).await,
            Err(UserServiceError::ValidationError(_))
        ));

        let input = ChangePasswordInput {
            old_password: "password123".into(),
            new_password: "newpassword1".into(),
            new_password_confirm: "newpassword1".into(),
        };
        let new_token = service.change_password(&user, input).await.unwrap();

        assert_ne!(new_token, old_token);
        assert!(service.authenticate(&old_token).await.unwrap().is_none());
        assert!(service.login("p@example.com", "password123").await.is_err());
        assert!(service.login("p@example.com", "newpassword1").await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_expired_tokens() {
        let (pool, service) = setup_test_service().await;
        let (user, _) = service.register(register_input("c@example.com", "cal")).await.unwrap();
        sqlx::query("UPDATE auth_tokens SET expires_at = ? WHERE user_id = ?")
            .bind(Utc::now() - Duration::days(1))
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(service.cleanup_expired_tokens().await.unwrap(), 1);
    }

    // ========================================================================
    // Profile tests
    // ========================================================================

    #[tokio::test]
    async fn test_update_profile() {
        let (_pool, service) = setup_test_service().await;
        let (user, _) = service.register(register_input("u@example.com", "uma")).await.unwrap();

        let input = UpdateProfileInput {
            bio: Some("Writes about Rust".into()),
            website: Some("https://uma.dev".into()),
            location: Some("Lisbon".into()),
            phone_number: Some("+351912345678".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 17),
            ..Default::default()
        };
        let updated = service.update_profile(&user, input).await.unwrap();

        assert_eq!(updated.bio, "Writes about Rust");
        assert_eq!(updated.website, "https://uma.dev");
        assert_eq!(updated.phone_number, "+351912345678");
        assert_eq!(service.get_profile(user.id).await.unwrap().location, "Lisbon");
    }

    #[tokio::test]
    async fn test_update_profile_validation() {
        let (_pool, service) = setup_test_service().await;
        let (user, _) = service.register(register_input("u@example.com", "uma")).await.unwrap();
        service.register(register_input("v@example.com", "vic")).await.unwrap();

        let cases = vec![
            UpdateProfileInput { bio: Some("x".repeat(501)), ..Default::default() },
            UpdateProfileInput { location: Some("x".repeat(101)), ..Default::default() },
            UpdateProfileInput { website: Some("ftp://files".into()), ..Default::default() },
            UpdateProfileInput { profile_picture: Some("not a url".into()), ..Default::default() },
            UpdateProfileInput { phone_number: Some("12-34".into()), ..Default::default() },
        ];
        for input in cases {
            assert!(matches!(
                service.update_profile(&user, input).await,
                Err(UserServiceError::ValidationError(_))
            ));
        }

        let taken = UpdateProfileInput { username: Some("VIC".into()), ..Default::default() };
        assert!(matches!(
            service.update_profile(&user, taken).await,
            Err(UserServiceError::UserExists(_))
        ));

        // Re-casing one's own username is not a clash
        let recased = UpdateProfileInput { username: Some("Uma".into()), ..Default::default() };
        assert_eq!(service.update_profile(&user, recased).await.unwrap().username, "Uma");
    }

    // ========================================================================
    // Directory tests
    // ========================================================================

    #[tokio::test]
    async fn test_list_users_and_cache_invalidation() {
        let (_pool, service) = setup_test_service().await;
        let (first, _) = service.register(register_input("a@example.com", "anna")).await.unwrap();
        service.register(register_input("b@example.com", "bert")).await.unwrap();

        let query = UserQuery {
            ordering: crate::models::SortOrder::asc(UserSortField::Username),
            ..Default::default()
        };
        let page = service.list_users(&query, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].username, "anna");

        let patch = UpdateProfileInput { username: Some("zoe".into()), ..Default::default() };
        service.update_profile(&first, patch).await.unwrap();

        let page = service.list_users(&query, &ListParams::default()).await.unwrap();
        assert_eq!(page.items[0].username, "bert");
        assert_eq!(page.items[1].username, "zoe");
    }

    #[tokio::test]
    async fn test_get_user_hides_inactive() {
        let (pool, service) = setup_test_service().await;
        let (user, token) = service.register(register_input("a@example.com", "anna")).await.unwrap();
        assert_eq!(service.get_user(user.id).await.unwrap().username, "anna");

        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();
        let other = Uuid::new_v4();
        assert!(matches!(service.get_user(other).await, Err(UserServiceError::NotFound)));
        assert!(service.authenticate(&token).await.unwrap().is_none());
    }

    #[test]
    fn test_validators() {
        assert!(validate_phone("+15551234567").is_ok());
        assert!(validate_phone("123456789").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("+1555-123-4567").is_err());

        assert!(validate_url("website", "http://a.io").is_ok());
        assert!(validate_url("website", "javascript:alert(1)").is_err());

        assert!(validate_username("a.b+c@d-e_f").is_ok());
        assert!(validate_username(&"x".repeat(151)).is_err());
    }
}
