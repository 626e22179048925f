//! User profile and balance DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::User;
use utoipa::ToSchema;
use validator::Validate;

/// Profile sync request
///
/// Any balance sent by the client is ignored.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({"clerk_id": "user_2abc", "email": "ada@example.com", "first_name": "Ada", "last_name": "Lovelace"}))]
pub struct SyncProfileRequest {
    #[validate(custom(function = "non_blank"), length(max = 255))]
    pub clerk_id: String,

    #[validate(email, length(max = 320))]
    pub email: String,

    #[validate(custom(function = "non_blank"), length(max = 255))]
    pub first_name: String,

    #[validate(custom(function = "non_blank"), length(max = 255))]
    pub last_name: String,

    #[validate(url)]
    pub photo_url: Option<String>,
}

/// Profile as returned to clients
#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfileResponse {
    pub clerk_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
    pub credits: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfileResponse {
    fn from(user: User) -> Self {
        Self {
            clerk_id: user.clerk_id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            photo_url: user.photo_url,
            credits: user.credits,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Balance lookup response
#[derive(Debug, Serialize, ToSchema)]
pub struct CreditsResponse {
    pub credits: i32,
}

/// Result of the image operation
#[derive(Debug, Serialize, ToSchema)]
pub struct RemoveBackgroundResponse {
    /// Processed image, base64-encoded
    pub image_base64: String,
    pub remaining_credits: i32,
}

fn non_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("Must not be blank".into());
        return Err(err);
    }
    Ok(())
}
