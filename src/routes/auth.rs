use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{password, CurrentUser},
    error::{AppError, AppResult, FieldError},
    models::{NewUser, User},
    response,
    schema::users,
    state::AppState,
};

pub const USER_TYPES: &[&str] = &[
    "property_owner",
    "family_member",
    "contractor",
    "tenant",
    "realtor",
];

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateMeRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

fn validate_registration(payload: &RegisterRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        errors.push(FieldError::new("email", "a valid email address is required"));
    }
    if payload.password.len() < 8 {
        errors.push(FieldError::new(
            "password",
            "password must be at least 8 characters",
        ));
    }
    if payload.first_name.trim().is_empty() {
        errors.push(FieldError::new("first_name", "first name is required"));
    }
    if payload.last_name.trim().is_empty() {
        errors.push(FieldError::new("last_name", "last name is required"));
    }
    if let Some(user_type) = payload.user_type.as_deref() {
        if !USER_TYPES.contains(&user_type) {
            errors.push(FieldError::new(
                "user_type",
                format!("user_type must be one of: {}", USER_TYPES.join(", ")),
            ));
        }
    }
    errors
}

fn auth_payload(state: &AppState, user: &User) -> AppResult<Value> {
    let token = state
        .jwt
        .generate_token(user.id, &user.email, &user.user_type)
        .map_err(AppError::from)?;
    Ok(json!({
        "token": token,
        "token_type": "Bearer",
        "expires_in": state.jwt.expiry_seconds(),
        "user": CurrentUser::from(user.clone()),
    }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let errors = validate_registration(&payload);
    if !errors.is_empty() {
        return Err(AppError::validation("invalid registration request", errors));
    }

    let mut conn = state.db()?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: payload.email.trim().to_lowercase(),
        password_hash: password::hash_password(&payload.password)?,
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        user_type: payload
            .user_type
            .unwrap_or_else(|| "property_owner".to_string()),
    };

    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::conflict("an account with this email already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let user: User = users::table.find(new_user.id).first(&mut conn)?;
    info!(user_id = %user.id, "user registered");

    Ok(response::created(auth_payload(&state, &user)?))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;

    let user: Option<User> = users::table
        .filter(users::email.eq(payload.email.trim().to_lowercase()))
        .first(&mut conn)
        .optional()?;

    // Same failure for unknown email and wrong password.
    let user = user.ok_or_else(|| AppError::unauthorized("invalid credentials"))?;
    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized("invalid credentials"))?;
    if !valid {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    info!(user_id = %user.id, "user logged in");
    Ok(response::ok(auth_payload(&state, &user)?))
}

pub async fn me(user: CurrentUser) -> Json<Value> {
    response::ok(user)
}

pub async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<UpdateMeRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let now = Utc::now();

    if let Some(new_password) = payload.new_password.as_deref() {
        if new_password.len() < 8 {
            return Err(AppError::validation(
                "invalid profile update",
                vec![FieldError::new(
                    "new_password",
                    "password must be at least 8 characters",
                )],
            ));
        }
        let current = payload
            .current_password
            .as_deref()
            .ok_or_else(|| AppError::bad_request("current_password is required to change password"))?;

        let stored: User = users::table.find(user.id).first(&mut conn)?;
        let valid = password::verify_password(current, &stored.password_hash)
            .map_err(|_| AppError::unauthorized("invalid credentials"))?;
        if !valid {
            return Err(AppError::unauthorized("current password is incorrect"));
        }

        diesel::update(users::table.find(user.id))
            .set((
                users::password_hash.eq(password::hash_password(new_password)?),
                users::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
    }

    if payload.first_name.is_some() || payload.last_name.is_some() {
        let first_name = payload
            .first_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&user.first_name)
            .to_string();
        let last_name = payload
            .last_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&user.last_name)
            .to_string();

        diesel::update(users::table.find(user.id))
            .set((
                users::first_name.eq(first_name),
                users::last_name.eq(last_name),
                users::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
    }

    let updated: User = users::table.find(user.id).first(&mut conn)?;
    Ok(response::ok(CurrentUser::from(updated)))
}

/// Tokens are stateless, so logout is an acknowledgment; clients drop the
/// token.
pub async fn logout(user: CurrentUser) -> Json<Value> {
    info!(user_id = %user.id, "user logged out");
    response::ok(json!({ "message": "logged out" }))
}
