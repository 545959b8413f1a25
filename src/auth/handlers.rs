use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::instrument;

use crate::auth::dto::{
    AccessTokenResponse, AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    LogoutRequest, MessageResponse, PublicUser, RefreshTokenRequest, RegisterRequest,
    ResendVerificationRequest, ResetPasswordRequest, SoftDeleteUserRequest, SuccessResponse,
    UserActivationRequest, UserMessageResponse, UserResponse, VerifyEmailRequest,
};
use crate::auth::extractors::AuthUser;
use crate::auth::services;
use crate::error::{ApiError, FieldError};
use crate::state::AppState;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh_token))
        .route("/token/revoke", post(revoke_token))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset", post(reset_password))
        .route("/verify-email", post(verify_email))
        .route("/resend-verification", post(resend_verification))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/password/change", post(change_password))
        .route("/users/activate", post(activate_user))
        .route("/users/deactivate", post(deactivate_user))
        .route("/account", delete(delete_account))
        .route("/users/soft-delete", post(soft_delete_user))
}

// Boundary shape checks; business invariants live in the engine.

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_email(errors: &mut Vec<FieldError>, email: &str) {
    if !is_valid_email(email.trim()) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
}

fn check_password(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().len() < 8 {
        errors.push(FieldError::new(field, "must be at least 8 characters"));
    }
}

fn check_non_empty(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    }
}

fn checked(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation("Validation failed", errors))
    }
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let mut errors = Vec::new();
    check_email(&mut errors, &payload.email);
    if let Some(password) = &payload.password {
        check_password(&mut errors, "password", password);
    }
    checked(errors)?;

    let result = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let mut errors = Vec::new();
    check_email(&mut errors, &payload.email);
    check_password(&mut errors, "password", &payload.password);
    checked(errors)?;

    Ok(Json(services::login(&state, payload).await?))
}

#[instrument(skip_all)]
async fn logout(payload: Option<Json<LogoutRequest>>) -> Json<SuccessResponse> {
    let _ = payload;
    Json(services::logout())
}

#[instrument(skip(state))]
async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<PublicUser>, ApiError> {
    Ok(Json(services::me(&state, auth.id).await?))
}

#[instrument(skip(state, payload))]
async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let mut errors = Vec::new();
    check_non_empty(&mut errors, "refreshToken", &payload.refresh_token);
    checked(errors)?;

    Ok(Json(services::refresh_token(&state, payload).await?))
}

#[instrument(skip_all)]
async fn revoke_token(
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut errors = Vec::new();
    check_non_empty(&mut errors, "refreshToken", &payload.refresh_token);
    checked(errors)?;

    Ok(Json(services::revoke_token()))
}

#[instrument(skip(state, payload))]
async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut errors = Vec::new();
    check_email(&mut errors, &payload.email);
    checked(errors)?;

    Ok(Json(services::forgot_password(&state, payload).await?))
}

#[instrument(skip(state, payload))]
async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut errors = Vec::new();
    check_non_empty(&mut errors, "token", &payload.token);
    check_password(&mut errors, "newPassword", &payload.new_password);
    checked(errors)?;

    Ok(Json(services::reset_password(&state, payload).await?))
}

#[instrument(skip(state, payload))]
async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut errors = Vec::new();
    check_password(&mut errors, "currentPassword", &payload.current_password);
    check_password(&mut errors, "newPassword", &payload.new_password);
    checked(errors)?;

    Ok(Json(services::change_password(&state, auth.id, payload).await?))
}

#[instrument(skip(state, payload))]
async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut errors = Vec::new();
    check_non_empty(&mut errors, "token", &payload.token);
    checked(errors)?;

    Ok(Json(services::verify_email(&state, payload).await?))
}

#[instrument(skip(state, payload))]
async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut errors = Vec::new();
    check_email(&mut errors, &payload.email);
    checked(errors)?;

    Ok(Json(services::resend_verification(&state, payload).await?))
}

#[instrument(skip(state))]
async fn activate_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<UserActivationRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(
        services::set_user_active(&state, payload.user_id, true).await?,
    ))
}

#[instrument(skip(state))]
async fn deactivate_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<UserActivationRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(
        services::set_user_active(&state, payload.user_id, false).await?,
    ))
}

#[instrument(skip(state))]
async fn delete_account(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    Ok(Json(services::delete_account(&state, auth.id).await?))
}

#[instrument(skip(state))]
async fn soft_delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SoftDeleteUserRequest>,
) -> Result<Json<UserMessageResponse>, ApiError> {
    Ok(Json(
        services::soft_delete_user(&state, &auth, payload.user_id).await?,
    ))
}
