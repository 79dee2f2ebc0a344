use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    access,
    auth::CurrentUser,
    error::{AppError, AppResult, FieldError},
    models::{MaintenanceRecord, MaintenanceSchedule, NewMaintenanceRecord, NewMaintenanceSchedule},
    pagination::{ListParams, Pagination},
    recurrence::{self, Frequency},
    response,
    schema::{maintenance_records, maintenance_schedules},
    state::AppState,
};

const SORT_COLUMNS: &[&str] = &["title", "next_due_date", "frequency", "created_at"];

#[derive(Deserialize)]
pub struct ScheduleListQuery {
    pub property_id: Option<Uuid>,
    // String for the same reason as the ListParams numbers: flattening makes
    // every query value arrive as a string.
    pub is_active: Option<String>,
    #[serde(flatten)]
    pub list: ListParams,
}

#[derive(Deserialize)]
pub struct DueQuery {
    pub property_id: Option<Uuid>,
    /// Horizon in days; due means next_due_date <= today + within_days.
    pub within_days: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    pub property_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub frequency: String,
    pub frequency_multiplier: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<String>,
    pub frequency_multiplier: Option<i32>,
    pub next_due_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CompleteScheduleRequest {
    pub completed_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub actual_duration_minutes: Option<i32>,
}

fn parse_frequency(label: &str) -> AppResult<Frequency> {
    Frequency::parse(label).ok_or_else(|| {
        AppError::validation(
            "invalid frequency",
            vec![FieldError::new(
                "frequency",
                format!(
                    "frequency must be one of: {}",
                    recurrence::FREQUENCIES.join(", ")
                ),
            )],
        )
    })
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Query(params): Query<ScheduleListQuery>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;

    let property_ids = match params.property_id {
        Some(property_id) => {
            let (_, acc) = access::resolve_property_access(&mut conn, user.id, property_id)?;
            if !acc.permissions.view_maintenance {
                return Err(AppError::forbidden("access denied"));
            }
            vec![property_id]
        }
        None => access::accessible_property_ids(&mut conn, user.id)?,
    };

    let base = || {
        let mut q = maintenance_schedules::table
            .filter(maintenance_schedules::property_id.eq_any(&property_ids))
            .into_boxed();
        if let Some(is_active) = params.is_active.as_deref().and_then(|v| v.parse::<bool>().ok()) {
            q = q.filter(maintenance_schedules::is_active.eq(is_active));
        }
        q
    };

    let total: i64 = base().select(count_star()).first(&mut conn)?;

    let mut query = base().limit(params.list.limit()).offset(params.list.offset());
    query = match (
        params.list.sort_column(SORT_COLUMNS, "next_due_date"),
        params.list.descending(),
    ) {
        ("title", false) => query.order(maintenance_schedules::title.asc()),
        ("title", true) => query.order(maintenance_schedules::title.desc()),
        ("frequency", false) => query.order(maintenance_schedules::frequency.asc()),
        ("frequency", true) => query.order(maintenance_schedules::frequency.desc()),
        ("created_at", false) => query.order(maintenance_schedules::created_at.asc()),
        ("created_at", true) => query.order(maintenance_schedules::created_at.desc()),
        // Nulls (as_needed schedules) sort last either way.
        (_, false) => query.order(maintenance_schedules::next_due_date.asc().nulls_last()),
        (_, true) => query.order(maintenance_schedules::next_due_date.desc().nulls_last()),
    };

    let rows: Vec<MaintenanceSchedule> = query.load(&mut conn)?;

    Ok(response::list(
        rows,
        Pagination::new(params.list.page(), params.list.limit(), total),
    ))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateScheduleRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if payload.title.trim().is_empty() {
        return Err(AppError::validation(
            "invalid schedule",
            vec![FieldError::new("title", "title is required")],
        ));
    }
    let frequency = parse_frequency(&payload.frequency)?;

    let mut conn = state.db()?;
    let (_, acc) = access::resolve_property_access(&mut conn, user.id, payload.property_id)?;
    if !acc.permissions.manage_maintenance {
        return Err(AppError::forbidden("not permitted to manage maintenance"));
    }

    let multiplier = payload.frequency_multiplier.unwrap_or(1);
    let start = payload
        .start_date
        .unwrap_or_else(|| Utc::now().date_naive());
    // An explicit due date wins over the recurrence calculation.
    let next_due = match payload.next_due_date {
        Some(date) => Some(date),
        None => recurrence::next_due_date(frequency, multiplier.max(1) as u32, start),
    };

    let new_schedule = NewMaintenanceSchedule {
        id: Uuid::new_v4(),
        property_id: payload.property_id,
        created_by: user.id,
        title: payload.title.trim().to_string(),
        description: payload.description,
        frequency: frequency.as_str().to_string(),
        frequency_multiplier: multiplier,
        next_due_date: next_due,
        is_active: true,
        assigned_to: payload.assigned_to,
    };

    diesel::insert_into(maintenance_schedules::table)
        .values(&new_schedule)
        .execute(&mut conn)?;

    let schedule: MaintenanceSchedule = maintenance_schedules::table
        .find(new_schedule.id)
        .first(&mut conn)?;
    info!(schedule_id = %schedule.id, property_id = %schedule.property_id, "maintenance schedule created");

    Ok(response::created(schedule))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (schedule, acc) = access::resolve_schedule_access(&mut conn, user.id, schedule_id)?;
    if !acc.permissions.view_maintenance {
        return Err(AppError::forbidden("access denied"));
    }

    Ok(response::ok(schedule))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<UpdateScheduleRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (schedule, acc) = access::resolve_schedule_access(&mut conn, user.id, schedule_id)?;
    if !acc.permissions.manage_maintenance {
        return Err(AppError::forbidden("not permitted to manage maintenance"));
    }

    let frequency = match payload.frequency.as_deref() {
        Some(label) => parse_frequency(label)?.as_str().to_string(),
        None => schedule.frequency.clone(),
    };

    diesel::update(maintenance_schedules::table.find(schedule.id))
        .set((
            maintenance_schedules::title
                .eq(payload.title.map(|v| v.trim().to_string()).unwrap_or(schedule.title)),
            maintenance_schedules::description.eq(payload.description.or(schedule.description)),
            maintenance_schedules::frequency.eq(frequency),
            maintenance_schedules::frequency_multiplier
                .eq(payload.frequency_multiplier.unwrap_or(schedule.frequency_multiplier)),
            maintenance_schedules::next_due_date
                .eq(payload.next_due_date.or(schedule.next_due_date)),
            maintenance_schedules::is_active.eq(payload.is_active.unwrap_or(schedule.is_active)),
            maintenance_schedules::assigned_to.eq(payload.assigned_to.or(schedule.assigned_to)),
            maintenance_schedules::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let updated: MaintenanceSchedule = maintenance_schedules::table
        .find(schedule_id)
        .first(&mut conn)?;
    Ok(response::ok(updated))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (schedule, acc) = access::resolve_schedule_access(&mut conn, user.id, schedule_id)?;
    if !acc.permissions.manage_maintenance {
        return Err(AppError::forbidden("not permitted to manage maintenance"));
    }

    diesel::delete(maintenance_schedules::table.find(schedule.id)).execute(&mut conn)?;
    info!(schedule_id = %schedule.id, "maintenance schedule deleted");

    Ok(response::ok(serde_json::json!({ "deleted": true })))
}

/// Record a completion and roll the schedule forward from the completion
/// date, in one transaction.
pub async fn complete_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<CompleteScheduleRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db()?;
    let (schedule, acc) = access::resolve_schedule_access(&mut conn, user.id, schedule_id)?;
    if !acc.permissions.manage_maintenance {
        return Err(AppError::forbidden("not permitted to manage maintenance"));
    }

    let frequency = Frequency::parse(&schedule.frequency)
        .ok_or_else(|| AppError::internal("stored frequency is invalid"))?;
    let completed_date = payload
        .completed_date
        .unwrap_or_else(|| Utc::now().date_naive());
    // Roll forward from the completion date unless the caller overrides it.
    let next_due = match payload.next_due_date {
        Some(date) => Some(date),
        None => recurrence::next_due_date(
            frequency,
            schedule.frequency_multiplier.max(1) as u32,
            completed_date,
        ),
    };

    let (record, updated) = conn
        .transaction::<(MaintenanceRecord, MaintenanceSchedule), AppError, _>(|conn| {
            let new_record = NewMaintenanceRecord {
                id: Uuid::new_v4(),
                schedule_id: schedule.id,
                completed_by: user.id,
                completed_date,
                notes: payload.notes.clone(),
                actual_duration_minutes: payload.actual_duration_minutes,
                status: "completed".to_string(),
            };
            diesel::insert_into(maintenance_records::table)
                .values(&new_record)
                .execute(conn)?;

            diesel::update(maintenance_schedules::table.find(schedule.id))
                .set((
                    maintenance_schedules::last_completed_date.eq(Some(completed_date)),
                    maintenance_schedules::next_due_date.eq(next_due),
                    maintenance_schedules::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            let record: MaintenanceRecord =
                maintenance_records::table.find(new_record.id).first(conn)?;
            let updated: MaintenanceSchedule =
                maintenance_schedules::table.find(schedule.id).first(conn)?;
            Ok((record, updated))
        })?;

    info!(
        schedule_id = %updated.id,
        next_due = ?updated.next_due_date,
        "maintenance completed"
    );

    Ok(response::created(serde_json::json!({
        "record": record,
        "schedule": updated,
    })))
}

pub async fn list_due(
    State(state): State<AppState>,
    Query(params): Query<DueQuery>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;

    let property_ids = match params.property_id {
        Some(property_id) => {
            let (_, acc) = access::resolve_property_access(&mut conn, user.id, property_id)?;
            if !acc.permissions.view_maintenance {
                return Err(AppError::forbidden("access denied"));
            }
            vec![property_id]
        }
        None => access::accessible_property_ids(&mut conn, user.id)?,
    };

    let horizon = Utc::now().date_naive() + chrono::Duration::days(params.within_days.unwrap_or(0));

    let rows: Vec<MaintenanceSchedule> = maintenance_schedules::table
        .filter(maintenance_schedules::property_id.eq_any(&property_ids))
        .filter(maintenance_schedules::is_active.eq(true))
        .filter(maintenance_schedules::next_due_date.le(horizon))
        .order(maintenance_schedules::next_due_date.asc())
        .load(&mut conn)?;

    Ok(response::ok(rows))
}

pub async fn list_history(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (schedule, acc) = access::resolve_schedule_access(&mut conn, user.id, schedule_id)?;
    if !acc.permissions.view_maintenance {
        return Err(AppError::forbidden("access denied"));
    }

    let records: Vec<MaintenanceRecord> = maintenance_records::table
        .filter(maintenance_records::schedule_id.eq(schedule.id))
        .order(maintenance_records::completed_date.desc())
        .load(&mut conn)?;

    Ok(response::ok(records))
}
