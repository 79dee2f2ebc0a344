use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    access::{self, Role},
    auth::CurrentUser,
    error::{AppError, AppResult, FieldError},
    models::{NewProperty, NewPropertyPermission, Property, PropertyPermission},
    pagination::{ListParams, Pagination},
    response,
    schema::{properties, property_permissions, users},
    state::AppState,
};

const SORT_COLUMNS: &[&str] = &["name", "created_at", "updated_at", "year_built"];

#[derive(Deserialize)]
pub struct CreatePropertyRequest {
    pub name: String,
    pub address: String,
    pub property_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_footage: Option<i32>,
    pub lot_size: Option<f64>,
    pub year_built: Option<i32>,
}

#[derive(Deserialize)]
pub struct UpdatePropertyRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_footage: Option<i32>,
    pub lot_size: Option<f64>,
    pub year_built: Option<i32>,
}

#[derive(Deserialize)]
pub struct GrantPermissionRequest {
    pub user_id: Uuid,
    pub role: String,
}

pub async fn list_properties(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let ids = access::accessible_property_ids(&mut conn, user.id)?;

    let total: i64 = properties::table
        .filter(properties::id.eq_any(&ids))
        .select(count_star())
        .first(&mut conn)?;

    let mut query = properties::table
        .filter(properties::id.eq_any(&ids))
        .limit(params.limit())
        .offset(params.offset())
        .into_boxed();

    query = match (params.sort_column(SORT_COLUMNS, "created_at"), params.descending()) {
        ("name", false) => query.order(properties::name.asc()),
        ("name", true) => query.order(properties::name.desc()),
        ("updated_at", false) => query.order(properties::updated_at.asc()),
        ("updated_at", true) => query.order(properties::updated_at.desc()),
        ("year_built", false) => query.order(properties::year_built.asc()),
        ("year_built", true) => query.order(properties::year_built.desc()),
        (_, false) => query.order(properties::created_at.asc()),
        (_, true) => query.order(properties::created_at.desc()),
    };

    let rows: Vec<Property> = query.load(&mut conn)?;

    Ok(response::list(
        rows,
        Pagination::new(params.page(), params.limit(), total),
    ))
}

pub async fn create_property(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreatePropertyRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    if payload.name.trim().is_empty() {
        errors.push(FieldError::new("name", "name is required"));
    }
    if payload.address.trim().is_empty() {
        errors.push(FieldError::new("address", "address is required"));
    }
    if !errors.is_empty() {
        return Err(AppError::validation("invalid property", errors));
    }

    let mut conn = state.db()?;
    let new_property = NewProperty {
        id: Uuid::new_v4(),
        owner_id: user.id,
        name: payload.name.trim().to_string(),
        address: payload.address.trim().to_string(),
        property_type: payload.property_type,
        bedrooms: payload.bedrooms,
        bathrooms: payload.bathrooms,
        square_footage: payload.square_footage,
        lot_size: payload.lot_size,
        year_built: payload.year_built,
    };

    diesel::insert_into(properties::table)
        .values(&new_property)
        .execute(&mut conn)?;

    let property: Property = properties::table.find(new_property.id).first(&mut conn)?;
    info!(property_id = %property.id, owner_id = %user.id, "property created");

    Ok(response::created(property))
}

pub async fn get_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (property, access) = access::resolve_property_access(&mut conn, user.id, property_id)?;

    Ok(response::ok(serde_json::json!({
        "property": property,
        "permissions": access.permissions,
        "is_owner": access.is_owner,
    })))
}

pub async fn update_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<UpdatePropertyRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (property, access) = access::resolve_property_access(&mut conn, user.id, property_id)?;

    // Property attributes are mutable by the owner only.
    if !access.is_owner {
        return Err(AppError::forbidden("only the owner can modify a property"));
    }

    diesel::update(properties::table.find(property.id))
        .set((
            properties::name.eq(payload.name.map(|v| v.trim().to_string()).unwrap_or(property.name)),
            properties::address
                .eq(payload.address.map(|v| v.trim().to_string()).unwrap_or(property.address)),
            properties::property_type.eq(payload.property_type.or(property.property_type)),
            properties::bedrooms.eq(payload.bedrooms.or(property.bedrooms)),
            properties::bathrooms.eq(payload.bathrooms.or(property.bathrooms)),
            properties::square_footage.eq(payload.square_footage.or(property.square_footage)),
            properties::lot_size.eq(payload.lot_size.or(property.lot_size)),
            properties::year_built.eq(payload.year_built.or(property.year_built)),
            properties::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let updated: Property = properties::table.find(property_id).first(&mut conn)?;
    Ok(response::ok(updated))
}

pub async fn delete_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (property, access) = access::resolve_property_access(&mut conn, user.id, property_id)?;

    if !access.is_owner {
        return Err(AppError::forbidden("only the owner can delete a property"));
    }

    diesel::delete(properties::table.find(property.id)).execute(&mut conn)?;
    info!(property_id = %property.id, "property deleted");

    Ok(response::ok(serde_json::json!({ "deleted": true })))
}

pub async fn list_permissions(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (_, access) = access::resolve_property_access(&mut conn, user.id, property_id)?;
    if !access.is_owner {
        return Err(AppError::forbidden("only the owner can view permission grants"));
    }

    let rows: Vec<(PropertyPermission, String)> = property_permissions::table
        .inner_join(users::table)
        .filter(property_permissions::property_id.eq(property_id))
        .select((property_permissions::all_columns, users::email))
        .load(&mut conn)?;

    let grants: Vec<Value> = rows
        .into_iter()
        .map(|(grant, email)| {
            serde_json::json!({
                "id": grant.id,
                "user_id": grant.user_id,
                "email": email,
                "role": grant.role,
                "created_at": grant.created_at,
                "updated_at": grant.updated_at,
            })
        })
        .collect();

    Ok(response::ok(grants))
}

/// Grants are owner-only and unique per (property, user): re-granting
/// updates the existing row.
pub async fn grant_permission(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<GrantPermissionRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let role = Role::parse(&payload.role).ok_or_else(|| {
        AppError::validation(
            "invalid permission grant",
            vec![FieldError::new(
                "role",
                format!("role must be one of: {}", access::ROLES.join(", ")),
            )],
        )
    })?;

    let mut conn = state.db()?;
    let (property, access) = access::resolve_property_access(&mut conn, user.id, property_id)?;
    if !access.is_owner {
        return Err(AppError::forbidden("only the owner can grant permissions"));
    }

    if payload.user_id == property.owner_id {
        return Err(AppError::bad_request("the owner already has full access"));
    }

    let grantee_exists = diesel::select(diesel::dsl::exists(
        users::table.filter(users::id.eq(payload.user_id)),
    ))
    .get_result::<bool>(&mut conn)?;
    if !grantee_exists {
        return Err(AppError::not_found("user not found"));
    }

    let existing: Option<PropertyPermission> = property_permissions::table
        .filter(property_permissions::property_id.eq(property_id))
        .filter(property_permissions::user_id.eq(payload.user_id))
        .first(&mut conn)
        .optional()?;

    let grant = if let Some(existing) = existing {
        diesel::update(property_permissions::table.find(existing.id))
            .set((
                property_permissions::role.eq(role.as_str()),
                property_permissions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        property_permissions::table.find(existing.id).first(&mut conn)?
    } else {
        let new_grant = NewPropertyPermission {
            id: Uuid::new_v4(),
            property_id,
            user_id: payload.user_id,
            role: role.as_str().to_string(),
        };
        diesel::insert_into(property_permissions::table)
            .values(&new_grant)
            .execute(&mut conn)?;
        property_permissions::table.find(new_grant.id).first(&mut conn)?
    };

    let grant: PropertyPermission = grant;
    info!(
        property_id = %property_id,
        grantee = %grant.user_id,
        role = %grant.role,
        "property permission granted"
    );

    Ok(response::created(grant))
}

pub async fn revoke_permission(
    State(state): State<AppState>,
    Path((property_id, target_user_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (_, access) = access::resolve_property_access(&mut conn, user.id, property_id)?;
    if !access.is_owner {
        return Err(AppError::forbidden("only the owner can revoke permissions"));
    }

    let deleted = diesel::delete(
        property_permissions::table
            .filter(property_permissions::property_id.eq(property_id))
            .filter(property_permissions::user_id.eq(target_user_id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::not_found("permission grant not found"));
    }

    Ok(response::ok(serde_json::json!({ "revoked": true })))
}
