use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::mailer::TemplateKey;

/// Request body for user registration. A missing/blank password triggers
/// temp-password generation plus the welcome notification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: Option<String>,
    pub name: Option<String>,
    pub email_subject: Option<String>,
    pub email_template_key: Option<TemplateKey>,
    pub email_template_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
    pub email_subject: Option<String>,
    pub email_template_key: Option<TemplateKey>,
    pub email_template_text: Option<String>,
    pub email_link_base: Option<String>,
    pub email_link_query_name: Option<String>,
    pub email_link_template_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendVerificationRequest {
    pub email: String,
    pub email_subject: Option<String>,
    pub email_template_key: Option<TemplateKey>,
    pub email_template_text: Option<String>,
    pub email_link_base: Option<String>,
    pub email_link_query_name: Option<String>,
    pub email_link_template_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivationRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftDeleteUserRequest {
    pub user_id: Uuid,
}

/// Sanitized user returned to callers: no password hash, no action tokens.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            is_verified: user.is_verified,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Response returned after register and login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct UserMessageResponse {
    pub user: PublicUser,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "User@Example.com".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            name: Some("User".into()),
            is_verified: true,
            is_active: true,
            verification_token: Some("pending-token".into()),
            reset_token: Some("pending-reset".into()),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn public_user_carries_no_secrets() {
        let public: PublicUser = sample_user().into();
        let json = serde_json::to_value(&public).unwrap();
        assert_eq!(json["email"], "User@Example.com");
        assert_eq!(json["isVerified"], true);
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("verificationToken").is_none());
        assert!(json.get("resetToken").is_none());
    }

    #[test]
    fn user_row_serialization_skips_secret_columns() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("verification_token").is_none());
        assert!(json.get("reset_token").is_none());
    }

    #[test]
    fn auth_response_uses_camel_case_wire_names() {
        let response = AuthResponse {
            user: sample_user().into(),
            access_token: "a".into(),
            refresh_token: "r".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("accessToken").is_some());
        assert!(json.get("refreshToken").is_some());
    }

    #[test]
    fn register_request_accepts_camel_case_body() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "a@b.com",
            "emailTemplateKey": "welcomeTempPassword",
            "emailSubject": "Welcome"
        }))
        .unwrap();
        assert_eq!(req.email, "a@b.com");
        assert!(req.password.is_none());
        assert_eq!(
            req.email_template_key,
            Some(crate::mailer::TemplateKey::WelcomeTempPassword)
        );
    }
}
