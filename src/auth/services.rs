use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;
use uuid::Uuid;

use crate::auth::dto::{
    AccessTokenResponse, AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    MessageResponse, PublicUser, RefreshTokenRequest, RegisterRequest, ResendVerificationRequest,
    ResetPasswordRequest, SuccessResponse, UserMessageResponse, UserResponse, VerifyEmailRequest,
};
use crate::auth::extractors::AuthUser;
use crate::auth::jwt::{JwtKeys, TokenClass};
use crate::auth::password::{
    generate_temp_password, hash_password, verify_password, TEMP_PASSWORD_LENGTH,
};
use crate::auth::repo_types::User;
use crate::error::ApiError;
use crate::mailer::{send_templated, TemplateKey, TemplatedMail};
use crate::state::AppState;

fn invalid_credentials() -> ApiError {
    // Unknown email and wrong password are deliberately indistinguishable.
    ApiError::Authentication("Invalid credentials".to_string())
}

fn account_deactivated() -> ApiError {
    ApiError::Forbidden("User account is deactivated".to_string())
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

fn invalid_refresh_token() -> ApiError {
    // Covers bad signature, expiry, unknown user and deactivated accounts.
    ApiError::Authentication("Invalid refresh token".to_string())
}

fn invalid_reset_token() -> ApiError {
    ApiError::validation("Invalid or expired reset token", vec![])
}

fn invalid_verification_token() -> ApiError {
    ApiError::validation("Invalid or expired verification token", vec![])
}

fn name_or_email(user: &User) -> String {
    user.name.clone().unwrap_or_else(|| user.email.clone())
}

pub async fn register(state: &AppState, input: RegisterRequest) -> Result<AuthResponse, ApiError> {
    let email = input.email.trim();

    if User::find_by_email(&state.db, email).await?.is_some() {
        return Err(ApiError::Conflict("Email already in use".to_string()));
    }

    let provided = input
        .password
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let (password, temp_password) = match provided {
        Some(p) => (p.to_string(), None),
        None => {
            let generated = generate_temp_password(TEMP_PASSWORD_LENGTH);
            (generated.clone(), Some(generated))
        }
    };

    let password_hash = hash_password(&password)?;
    let user = match User::create(&state.db, email, &password_hash, input.name.as_deref()).await {
        Ok(user) => user,
        // The unique index wins races the pre-check cannot see.
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(ApiError::Conflict("Email already in use".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let keys = JwtKeys::new(&state.config.jwt);
    let access_token = keys.issue_access(user.id, Some(user.email.clone()))?;
    let refresh_token = keys.issue_refresh(user.id, Some(user.email.clone()))?;

    if let Some(temp_password) = temp_password {
        let mut variables: HashMap<&str, String> = HashMap::new();
        variables.insert("nameOrEmail", name_or_email(&user));
        variables.insert("tempPassword", temp_password);
        send_templated(
            state.mailer.as_ref(),
            TemplatedMail {
                to: &user.email,
                subject: input.email_subject.as_deref(),
                template_key: input.email_template_key,
                template_text: input.email_template_text.as_deref(),
                variables,
            },
        )
        .await?;
    }

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(AuthResponse {
        user: user.into(),
        access_token,
        refresh_token,
    })
}

pub async fn login(state: &AppState, input: LoginRequest) -> Result<AuthResponse, ApiError> {
    let user = User::find_by_email(&state.db, input.email.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&input.password, &user.password_hash) {
        return Err(invalid_credentials());
    }
    // Deactivation supersedes everything else once credentials check out;
    // verification state never blocks login.
    if !user.is_active {
        return Err(account_deactivated());
    }

    let keys = JwtKeys::new(&state.config.jwt);
    let access_token = keys.issue_access(user.id, Some(user.email.clone()))?;
    let refresh_token = keys.issue_refresh(user.id, Some(user.email.clone()))?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(AuthResponse {
        user: user.into(),
        access_token,
        refresh_token,
    })
}

/// No server-side token store: tokens stay valid until natural expiry.
pub fn logout() -> SuccessResponse {
    SuccessResponse::ok()
}

pub fn revoke_token() -> SuccessResponse {
    SuccessResponse::ok()
}

pub async fn me(state: &AppState, user_id: Uuid) -> Result<PublicUser, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(user_not_found)?;
    if !user.is_active {
        return Err(account_deactivated());
    }
    Ok(user.into())
}

pub async fn refresh_token(
    state: &AppState,
    input: RefreshTokenRequest,
) -> Result<AccessTokenResponse, ApiError> {
    let keys = JwtKeys::new(&state.config.jwt);
    let claims = keys
        .verify(&input.refresh_token, TokenClass::Refresh)
        .map_err(|_| invalid_refresh_token())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(invalid_refresh_token)?;
    if !user.is_active {
        return Err(invalid_refresh_token());
    }

    let access_token = keys.issue_access(user.id, Some(user.email.clone()))?;
    Ok(AccessTokenResponse { access_token })
}

pub async fn forgot_password(
    state: &AppState,
    input: ForgotPasswordRequest,
) -> Result<SuccessResponse, ApiError> {
    // Unknown emails get the same answer as known ones.
    let Some(user) = User::find_by_email(&state.db, input.email.trim()).await? else {
        return Ok(SuccessResponse::ok());
    };

    let keys = JwtKeys::new(&state.config.jwt);
    let reset_token = keys.issue_reset(user.id)?;
    User::set_reset_token(&state.db, user.id, &reset_token).await?;

    let action_url = build_action_url(
        &reset_token,
        input.email_link_base.as_deref(),
        input.email_link_query_name.as_deref(),
        input.email_link_template_text.as_deref(),
    );

    let mut variables: HashMap<&str, String> = HashMap::new();
    variables.insert("nameOrEmail", name_or_email(&user));
    variables.insert("resetToken", reset_token);
    variables.insert("actionUrl", action_url.unwrap_or_default());
    send_templated(
        state.mailer.as_ref(),
        TemplatedMail {
            to: &user.email,
            subject: Some(input.email_subject.as_deref().unwrap_or("Password Reset")),
            template_key: Some(
                input
                    .email_template_key
                    .unwrap_or(TemplateKey::PasswordReset),
            ),
            template_text: input.email_template_text.as_deref(),
            variables,
        },
    )
    .await?;

    info!(user_id = %user.id, "password reset token issued");
    Ok(SuccessResponse::ok())
}

pub async fn reset_password(
    state: &AppState,
    input: ResetPasswordRequest,
) -> Result<SuccessResponse, ApiError> {
    let keys = JwtKeys::new(&state.config.jwt);
    let claims = keys
        .verify(&input.token, TokenClass::Refresh)
        .map_err(|_| invalid_reset_token())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(invalid_reset_token)?;
    // Single-use gate: a validly signed token that is not the most recently
    // issued one no longer matches and is rejected.
    if user.reset_token.as_deref() != Some(input.token.as_str()) {
        return Err(invalid_reset_token());
    }

    let password_hash = hash_password(&input.new_password)?;
    User::set_password_and_clear_reset(&state.db, user.id, &password_hash).await?;

    info!(user_id = %user.id, "password reset");
    Ok(SuccessResponse::ok())
}

pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    input: ChangePasswordRequest,
) -> Result<SuccessResponse, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(user_not_found)?;
    if !user.is_active {
        return Err(account_deactivated());
    }
    if !verify_password(&input.current_password, &user.password_hash) {
        return Err(ApiError::Authentication(
            "Invalid current password".to_string(),
        ));
    }

    let password_hash = hash_password(&input.new_password)?;
    User::set_password(&state.db, user.id, &password_hash).await?;

    info!(user_id = %user.id, "password changed");
    Ok(SuccessResponse::ok())
}

pub async fn verify_email(
    state: &AppState,
    input: VerifyEmailRequest,
) -> Result<SuccessResponse, ApiError> {
    let keys = JwtKeys::new(&state.config.jwt);
    let claims = keys
        .verify(&input.token, TokenClass::Access)
        .map_err(|_| invalid_verification_token())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(invalid_verification_token)?;
    if user.verification_token.as_deref() != Some(input.token.as_str()) {
        return Err(invalid_verification_token());
    }
    // A deactivated account collapses into the same failure as a bad token.
    if !user.is_active {
        return Err(invalid_verification_token());
    }

    User::mark_verified(&state.db, user.id).await?;

    info!(user_id = %user.id, "email verified");
    Ok(SuccessResponse::ok())
}

pub async fn resend_verification(
    state: &AppState,
    input: ResendVerificationRequest,
) -> Result<SuccessResponse, ApiError> {
    let Some(user) = User::find_by_email(&state.db, input.email.trim()).await? else {
        return Ok(SuccessResponse::ok());
    };
    if !user.is_active {
        return Err(account_deactivated());
    }

    let keys = JwtKeys::new(&state.config.jwt);
    let verification_token = keys.issue_verification(user.id)?;
    User::set_verification_token(&state.db, user.id, &verification_token).await?;

    let action_url = build_action_url(
        &verification_token,
        input.email_link_base.as_deref(),
        input.email_link_query_name.as_deref(),
        input.email_link_template_text.as_deref(),
    );

    let mut variables: HashMap<&str, String> = HashMap::new();
    variables.insert("nameOrEmail", name_or_email(&user));
    variables.insert("verificationToken", verification_token);
    variables.insert("actionUrl", action_url.unwrap_or_default());
    send_templated(
        state.mailer.as_ref(),
        TemplatedMail {
            to: &user.email,
            subject: Some(
                input
                    .email_subject
                    .as_deref()
                    .unwrap_or("Verify your email"),
            ),
            template_key: Some(input.email_template_key.unwrap_or(TemplateKey::VerifyEmail)),
            template_text: input.email_template_text.as_deref(),
            variables,
        },
    )
    .await?;

    info!(user_id = %user.id, "verification token issued");
    Ok(SuccessResponse::ok())
}

pub async fn set_user_active(
    state: &AppState,
    target_id: Uuid,
    active: bool,
) -> Result<UserResponse, ApiError> {
    let user = User::find_by_id(&state.db, target_id)
        .await?
        .ok_or_else(user_not_found)?;

    // Idempotent: already in the target state means no store write.
    if user.is_active == active {
        return Ok(UserResponse { user: user.into() });
    }

    let updated = User::set_active(&state.db, target_id, active).await?;
    info!(user_id = %target_id, active, "user activation state changed");
    Ok(UserResponse {
        user: updated.into(),
    })
}

pub async fn delete_account(state: &AppState, user_id: Uuid) -> Result<MessageResponse, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(user_not_found)?;

    User::delete_by_id(&state.db, user.id).await?;

    info!(user_id = %user.id, email = %user.email, "account deleted");
    Ok(MessageResponse {
        success: true,
        message: "Account deleted successfully".to_string(),
    })
}

pub async fn soft_delete_user(
    state: &AppState,
    caller: &AuthUser,
    target_id: Uuid,
) -> Result<UserMessageResponse, ApiError> {
    // The caller's email comes from its token claims, matched against the
    // configured allow-list; it is not re-verified against the store.
    let caller_email = caller.email.as_deref().unwrap_or_default();
    if !state.config.is_admin_email(caller_email) {
        return Err(ApiError::Forbidden(
            "Admin privileges required".to_string(),
        ));
    }

    let target = User::find_by_id(&state.db, target_id)
        .await?
        .ok_or_else(user_not_found)?;

    if target.email.trim().to_lowercase() == caller_email.trim().to_lowercase() {
        return Err(ApiError::validation(
            "Cannot soft-delete your own account",
            vec![],
        ));
    }
    if state.config.is_admin_email(&target.email) {
        return Err(ApiError::Forbidden(
            "Cannot soft-delete an admin account".to_string(),
        ));
    }
    if !target.is_active {
        return Ok(UserMessageResponse {
            user: target.into(),
            message: "User is already deactivated".to_string(),
        });
    }

    let updated = User::set_active(&state.db, target_id, false).await?;
    info!(user_id = %target_id, admin = %caller_email, "user soft-deleted");
    Ok(UserMessageResponse {
        user: updated.into(),
        message: "User soft-deleted successfully".to_string(),
    })
}

/// Builds the link embedded in reset/verification mails. A custom template
/// takes precedence, then a base URL with the token appended as a query
/// parameter; with neither, only the raw token is communicated.
pub fn build_action_url(
    token: &str,
    base: Option<&str>,
    query_name: Option<&str>,
    template_text: Option<&str>,
) -> Option<String> {
    lazy_static! {
        static ref TOKEN_RE: Regex = Regex::new(r"\{\{\s*token\s*\}\}").unwrap();
    }

    if let Some(template) = template_text {
        let encoded = urlencoding::encode(token);
        return Some(
            TOKEN_RE
                .replace_all(template, regex::NoExpand(encoded.as_ref()))
                .into_owned(),
        );
    }
    if let Some(base) = base {
        let sep = if base.contains('?') { '&' } else { '?' };
        let name = query_name.unwrap_or("token");
        return Some(format!(
            "{base}{sep}{}={}",
            urlencoding::encode(name),
            urlencoding::encode(token)
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn soft_delete_requires_admin_caller() {
        let state = AppState::fake();
        let caller = AuthUser {
            id: Uuid::new_v4(),
            email: Some("user@example.com".into()),
        };
        let err = soft_delete_user(&state, &caller, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn soft_delete_rejects_caller_without_email_claim() {
        let state = AppState::fake();
        let caller = AuthUser {
            id: Uuid::new_v4(),
            email: None,
        };
        let err = soft_delete_user(&state, &caller, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn refresh_collapses_garbage_token_to_unauthorized() {
        let state = AppState::fake();
        let err = refresh_token(
            &state,
            RefreshTokenRequest {
                refresh_token: "junk".into(),
            },
        )
        .await
        .unwrap_err();
        match err {
            ApiError::Authentication(message) => assert_eq!(message, "Invalid refresh token"),
            other => panic!("expected authentication error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_collapses_garbage_token_to_bad_request() {
        let state = AppState::fake();
        let err = reset_password(
            &state,
            ResetPasswordRequest {
                token: "junk".into(),
                new_password: "new-password-1!".into(),
            },
        )
        .await
        .unwrap_err();
        match err {
            ApiError::Validation { message, .. } => {
                assert_eq!(message, "Invalid or expired reset token");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_email_collapses_garbage_token_to_bad_request() {
        let state = AppState::fake();
        let err = verify_email(
            &state,
            VerifyEmailRequest {
                token: "junk".into(),
            },
        )
        .await
        .unwrap_err();
        match err {
            ApiError::Validation { message, .. } => {
                assert_eq!(message, "Invalid or expired verification token");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn action_url_from_template_text() {
        let url = build_action_url(
            "tok.abc",
            Some("https://app.example.com/reset"),
            None,
            Some("https://app.example.com/r?code={{token}}"),
        );
        assert_eq!(
            url.as_deref(),
            Some("https://app.example.com/r?code=tok.abc")
        );
    }

    #[test]
    fn action_url_template_tolerates_spaces_and_repeats() {
        let url = build_action_url("t", None, None, Some("x={{ token }}&y={{token}}"));
        assert_eq!(url.as_deref(), Some("x=t&y=t"));
    }

    #[test]
    fn action_url_from_base_appends_query() {
        let url = build_action_url("tok", Some("https://app.example.com/reset"), None, None);
        assert_eq!(
            url.as_deref(),
            Some("https://app.example.com/reset?token=tok")
        );
    }

    #[test]
    fn action_url_respects_existing_query_and_custom_name() {
        let url = build_action_url(
            "tok",
            Some("https://app.example.com/reset?lang=en"),
            Some("code"),
            None,
        );
        assert_eq!(
            url.as_deref(),
            Some("https://app.example.com/reset?lang=en&code=tok")
        );
    }

    #[test]
    fn action_url_percent_encodes_token() {
        let url = build_action_url("a b+c", Some("https://x/reset"), None, None);
        assert_eq!(url.as_deref(), Some("https://x/reset?token=a%20b%2Bc"));
    }

    #[test]
    fn action_url_absent_without_inputs() {
        assert_eq!(build_action_url("tok", None, None, None), None);
    }
}
