//! Registration, signin, and session management endpoints.

use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cache::CacheOtpResult;
use crate::constants::ERR_INVALID_USER_ID;
use crate::db::sanitize_table_name;
use crate::error::{AppError, Result};
use crate::ingest::store::delete_table;
use crate::models::{
    looks_like_email, ActivityRecord, PendingRegistration, SessionType, User, UserProfile,
};
use crate::security::{create_access_token, generate_otp, hash_password, verify_password};
use crate::session::{client_meta, SessionContext};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterInitiateRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub user_type: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterInitiateResponse {
    pub message: String,
    pub request_id: String,
    pub email: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVerifyRequest {
    pub email: String,
    pub otp_code: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SigninResponse {
    pub message: String,
    pub user: UserProfile,
    pub access_token: String,
    pub token_type: String,
    pub session_id: String,
}

async fn fetch_user_by_email(state: &AppState, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT user_id, name, email, password_hash, user_type, created_at \
         FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(&state.pool)
    .await?;
    Ok(user)
}

/// Start a registration: stash the hashed details in the pending cache and
/// dispatch an OTP
///
/// Rejects emails that already have an account or an unexpired pending
/// registration.
pub async fn register_initiate(
    State(state): State<AppState>,
    Json(payload): Json<RegisterInitiateRequest>,
) -> Result<Json<RegisterInitiateResponse>> {
    let name = payload.name.trim();
    let email = payload.email.trim().to_lowercase();
    let user_type = payload.user_type.trim();

    if name.is_empty() || email.is_empty() || payload.password.is_empty() || user_type.is_empty() {
        return Err(AppError::InvalidInput(
            "name, email, password and user_type are all required".to_string(),
        ));
    }
    if !looks_like_email(&email) {
        return Err(AppError::InvalidInput("Invalid email address".to_string()));
    }

    if fetch_user_by_email(&state, &email).await?.is_some() {
        return Err(AppError::InvalidInput(
            "Email is already registered".to_string(),
        ));
    }

    let request_id = Uuid::new_v4().to_string();
    let otp_code = generate_otp(state.config.otp_length);
    let ttl = Duration::from_secs(state.config.registration_otp_expiry_secs);

    let entry = PendingRegistration {
        request_id: request_id.clone(),
        name: name.to_string(),
        email: email.clone(),
        password_hash: hash_password(&payload.password)?,
        user_type: user_type.to_string(),
        otp_code: otp_code.clone(),
        attempts: 0,
        created_at: Instant::now(),
        ttl,
    };

    // Insert is the authoritative duplicate check; it holds the cache lock
    if !state.cache.insert(entry) {
        return Err(AppError::InvalidInput(
            "A registration is already pending for this email".to_string(),
        ));
    }

    // Delivery happens off the request path; a failed send only loses the code
    let mailer = state.mailer.clone();
    let mail_to = email.clone();
    let expiry = state.config.registration_otp_expiry_secs;
    tokio::spawn(async move {
        if let Err(e) = mailer.send_otp(&mail_to, &otp_code, "registration", expiry).await {
            tracing::error!("OTP dispatch failed for {}: {:?}", mail_to, e);
        }
    });

    tracing::info!("Registration initiated for {}", email);

    Ok(Json(RegisterInitiateResponse {
        message: "OTP sent. Please verify to complete registration.".to_string(),
        request_id,
        email,
        expires_in_seconds: state.config.registration_otp_expiry_secs,
    }))
}

/// Complete a registration by checking the OTP
///
/// A correct code promotes the pending entry to a user row and opens a
/// "registration" session. Three wrong codes burn the entry.
pub async fn register_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterVerifyRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let email = payload.email.trim().to_lowercase();

    let entry = match state.cache.check_otp(&email, payload.otp_code.trim()) {
        CacheOtpResult::NotFound => {
            return Err(AppError::NotFound(
                "No pending registration found for this email".to_string(),
            ));
        }
        CacheOtpResult::Exhausted => {
            return Err(AppError::InvalidInput(
                "Maximum OTP attempts exceeded. Please register again.".to_string(),
            ));
        }
        CacheOtpResult::Mismatch { remaining } => {
            return Err(AppError::InvalidInput(format!(
                "Invalid OTP. {remaining} attempts remaining."
            )));
        }
        CacheOtpResult::Verified(entry) => entry,
    };

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email, password_hash, user_type) \
         VALUES ($1, $2, $3, $4) \
         RETURNING user_id, name, email, password_hash, user_type, created_at",
    )
    .bind(&entry.name)
    .bind(&entry.email)
    .bind(&entry.password_hash)
    .bind(&entry.user_type)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Email is already registered".to_string())
        }
        _ => AppError::Database(e),
    })?;

    let (ip_address, user_agent) = client_meta(&headers);
    let created = state
        .sessions
        .create(
            &user.user_id.to_string(),
            &user.email,
            SessionType::Registration,
            ip_address.as_deref(),
            user_agent.as_deref(),
        )
        .await?;

    state
        .sessions
        .log_activity(
            &created.session_id,
            ActivityRecord {
                endpoint: "/api/auth/register/verify".to_string(),
                method: "POST".to_string(),
                request_path: "/api/auth/register/verify".to_string(),
                response_status: Some(StatusCode::CREATED.as_u16() as i32),
                ip_address,
                user_agent,
                additional_info: Some(json!({"action": "registration_completed"})),
                ..Default::default()
            },
        )
        .await;

    tracing::info!("User registered: {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful",
            "user": UserProfile::from(user),
            "session_id": created.session_id,
        })),
    ))
}

/// Pending-registration status for an email
pub async fn register_status(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Json<Value> {
    let email = email.trim().to_lowercase();
    match state.cache.get(&email) {
        Some(entry) => Json(json!({
            "status": "pending",
            "request_id": entry.request_id,
            "attempts_remaining": entry.attempts_remaining(),
        })),
        None => Json(json!({"status": "none"})),
    }
}

/// Sign a user in, returning a bearer token and a fresh "login" session
pub async fn signin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SigninRequest>,
) -> Result<Json<SigninResponse>> {
    let email = payload.email.trim().to_lowercase();

    // A missing user and a wrong password look identical to the caller
    let Some(user) = fetch_user_by_email(&state, &email).await? else {
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    };
    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let access_token = create_access_token(
        &user.email,
        &state.config.secret_key,
        state.config.access_token_expire_minutes,
    )?;

    let (ip_address, user_agent) = client_meta(&headers);
    let created = state
        .sessions
        .create(
            &user.user_id.to_string(),
            &user.email,
            SessionType::Login,
            ip_address.as_deref(),
            user_agent.as_deref(),
        )
        .await?;

    state
        .sessions
        .log_activity(
            &created.session_id,
            ActivityRecord {
                endpoint: "/api/auth/signin".to_string(),
                method: "POST".to_string(),
                request_path: "/api/auth/signin".to_string(),
                response_status: Some(200),
                ip_address,
                user_agent,
                additional_info: Some(json!({"action": "signin"})),
                ..Default::default()
            },
        )
        .await;

    tracing::info!("User signed in: {}", user.email);

    Ok(Json(SigninResponse {
        message: "Signin successful".to_string(),
        user: UserProfile::from(user),
        access_token,
        token_type: "bearer".to_string(),
        session_id: created.session_id,
    }))
}

/// Invalidate the caller's session
pub async fn logout(State(state): State<AppState>, ctx: SessionContext) -> Result<Json<Value>> {
    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/auth/logout".to_string(),
                method: "POST".to_string(),
                request_path: "/api/auth/logout".to_string(),
                response_status: Some(200),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                additional_info: Some(json!({"action": "logout"})),
                ..Default::default()
            },
        )
        .await;

    state.sessions.invalidate(&ctx.session_id).await?;

    Ok(Json(json!({"message": "Logged out successfully"})))
}

/// Echo the caller's session metadata; reaching this handler proves validity
pub async fn verify_session(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<Value>> {
    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/auth/verify-session".to_string(),
                method: "GET".to_string(),
                request_path: "/api/auth/verify-session".to_string(),
                response_status: Some(200),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                ..Default::default()
            },
        )
        .await;

    Ok(Json(json!({
        "valid": true,
        "session": {
            "session_id": ctx.session.session_id,
            "user_id": ctx.session.user_id,
            "email": ctx.session.email,
            "session_type": ctx.session.session_type,
            "created_at": ctx.session.created_at,
            "last_activity": ctx.session.last_activity,
        },
    })))
}

/// Full activity log of the caller's session, newest first
pub async fn session_history(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<Value>> {
    let history = state.sessions.history(&ctx.session_id).await?;

    Ok(Json(json!({
        "session_id": ctx.session_id,
        "count": history.len(),
        "history": history,
    })))
}

async fn remove_user_and_data(state: &AppState, user: User) -> Result<Json<Value>> {
    let table_name = sanitize_table_name(&user.user_id.to_string());
    if !table_name.is_empty() {
        delete_table(&state.pool, &table_name).await?;
    }

    tracing::info!("User deleted: {}", user.email);

    Ok(Json(json!({
        "message": "User and associated data deleted",
        "user_id": user.user_id,
        "email": user.email,
    })))
}

/// Delete a user by id, along with their upload table
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    let user_id = Uuid::parse_str(user_id.trim())
        .map_err(|_| AppError::InvalidInput(ERR_INVALID_USER_ID.to_string()))?;

    let user = sqlx::query_as::<_, User>(
        "DELETE FROM users WHERE user_id = $1 \
         RETURNING user_id, name, email, password_hash, user_type, created_at",
    )
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    remove_user_and_data(&state, user).await
}

/// Delete a user by email, along with their upload table
pub async fn delete_user_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Value>> {
    let email = email.trim().to_lowercase();
    if !looks_like_email(&email) {
        return Err(AppError::InvalidInput("Invalid email address".to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        "DELETE FROM users WHERE email = $1 \
         RETURNING user_id, name, email, password_hash, user_type, created_at",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    remove_user_and_data(&state, user).await
}
