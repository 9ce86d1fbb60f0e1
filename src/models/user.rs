//! User model
//!
//! Users log in with their email address. `username` is the public handle
//! shown next to posts and comments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Login identifier, unique ignoring case
    pub email: String,
    /// Public handle, unique ignoring case
    pub username: String,
    /// Argon2 PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub profile_picture: Option<String>,
    pub website: String,
    pub location: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a new active, unverified account.
    ///
    /// The password must already be hashed.
    pub fn new(email: String, username: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            profile_picture: None,
            website: String::new(),
            location: String::new(),
            date_of_birth: None,
            phone_number: String::new(),
            is_verified: false,
            is_active: true,
            is_staff: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// `"first last"`, trimmed; empty when neither is set
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Publicly listable view of the account, without contact details
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: self.full_name(),
            bio: self.bio.clone(),
            profile_picture: self.profile_picture.clone(),
            website: self.website.clone(),
            location: self.location.clone(),
            created_at: self.created_at,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            full_name: self.full_name(),
            profile_picture: self.profile_picture.clone(),
        }
    }
}

/// Author block embedded in posts and comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
}

/// Entry of the public user directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub bio: String,
    pub profile_picture: Option<String>,
    pub website: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

/// Partial profile update. `None` leaves a field untouched.
///
/// For the nullable fields an empty string clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
}

impl UpdateProfileInput {
    pub fn has_changes(&self) -> bool {
        self.username.is_some()
            || self.first_name.is_some()
            || self.last_name.is_some()
            || self.bio.is_some()
            || self.profile_picture.is_some()
            || self.website.is_some()
            || self.location.is_some()
            || self.date_of_birth.is_some()
            || self.phone_number.is_some()
    }
}
