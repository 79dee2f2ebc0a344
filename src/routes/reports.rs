use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    access,
    auth::CurrentUser,
    error::{AppError, AppResult},
    models::{MaintenanceSchedule, Project, ProjectTask},
    response,
    schema::{documents, insurance_items, maintenance_schedules, project_tasks, projects},
    state::AppState,
};

fn status_counts(statuses: &[String]) -> Value {
    let mut counts = serde_json::Map::new();
    for status in statuses {
        let entry = counts.entry(status.clone()).or_insert(Value::from(0));
        *entry = Value::from(entry.as_i64().unwrap_or(0) + 1);
    }
    Value::Object(counts)
}

/// Cross-property rollup for the landing dashboard.
pub async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let property_ids = access::accessible_property_ids(&mut conn, user.id)?;
    let today = Utc::now().date_naive();

    let property_count = property_ids.len();

    let project_statuses: Vec<String> = projects::table
        .filter(projects::property_id.eq_any(&property_ids))
        .select(projects::status)
        .load(&mut conn)?;

    let task_statuses: Vec<String> = project_tasks::table
        .inner_join(projects::table)
        .filter(projects::property_id.eq_any(&property_ids))
        .select(project_tasks::status)
        .load(&mut conn)?;

    let overdue_maintenance: i64 = maintenance_schedules::table
        .filter(maintenance_schedules::property_id.eq_any(&property_ids))
        .filter(maintenance_schedules::is_active.eq(true))
        .filter(maintenance_schedules::next_due_date.lt(today))
        .select(count_star())
        .first(&mut conn)?;

    let due_soon: Vec<MaintenanceSchedule> = maintenance_schedules::table
        .filter(maintenance_schedules::property_id.eq_any(&property_ids))
        .filter(maintenance_schedules::is_active.eq(true))
        .filter(maintenance_schedules::next_due_date.le(today + chrono::Duration::days(30)))
        .order(maintenance_schedules::next_due_date.asc())
        .limit(10)
        .load(&mut conn)?;

    let document_count: i64 = documents::table
        .filter(documents::property_id.eq_any(property_ids.iter().copied().map(Some)))
        .filter(documents::status.eq("active"))
        .select(count_star())
        .first(&mut conn)?;

    let insured_values: Vec<Option<f64>> = insurance_items::table
        .filter(insurance_items::property_id.eq_any(&property_ids))
        .filter(insurance_items::status.ne("deleted"))
        .select(insurance_items::current_value)
        .load(&mut conn)?;

    let my_open_tasks: Vec<ProjectTask> = project_tasks::table
        .filter(project_tasks::assigned_to.eq(user.id))
        .filter(project_tasks::status.ne_all(vec!["completed", "cancelled"]))
        .order(project_tasks::due_date.asc().nulls_last())
        .limit(10)
        .load(&mut conn)?;

    Ok(response::ok(serde_json::json!({
        "properties": property_count,
        "projects": {
            "total": project_statuses.len(),
            "by_status": status_counts(&project_statuses),
        },
        "tasks": {
            "total": task_statuses.len(),
            "by_status": status_counts(&task_statuses),
        },
        "maintenance": {
            "overdue": overdue_maintenance,
            "due_soon": due_soon,
        },
        "documents": document_count,
        "insurance": {
            "item_count": insured_values.len(),
            "total_value": insured_values.into_iter().flatten().sum::<f64>(),
        },
        "my_open_tasks": my_open_tasks,
    })))
}

/// Everything attached to one property, for its detail page.
pub async fn property_details(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (property, acc) = access::resolve_property_access(&mut conn, user.id, property_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let project_rows: Vec<Project> = projects::table
        .filter(projects::property_id.eq(property.id))
        .order(projects::created_at.desc())
        .load(&mut conn)?;

    let project_ids: Vec<Uuid> = project_rows.iter().map(|p| p.id).collect();
    let tasks: Vec<ProjectTask> = project_tasks::table
        .filter(project_tasks::project_id.eq_any(&project_ids))
        .load(&mut conn)?;

    let project_summaries: Vec<Value> = project_rows
        .iter()
        .map(|project| {
            let scoped: Vec<&ProjectTask> =
                tasks.iter().filter(|t| t.project_id == project.id).collect();
            let completed = scoped.iter().filter(|t| t.status == "completed").count();
            serde_json::json!({
                "project": project,
                "task_count": scoped.len(),
                "completed_tasks": completed,
                "total_cost": scoped.iter().filter_map(|t| t.cost).sum::<f64>(),
            })
        })
        .collect();

    let schedules: Vec<MaintenanceSchedule> = maintenance_schedules::table
        .filter(maintenance_schedules::property_id.eq(property.id))
        .filter(maintenance_schedules::is_active.eq(true))
        .order(maintenance_schedules::next_due_date.asc().nulls_last())
        .load(&mut conn)?;

    let document_count: i64 = documents::table
        .filter(documents::property_id.eq(property.id))
        .filter(documents::status.eq("active"))
        .select(count_star())
        .first(&mut conn)?;

    let insurance_count: i64 = insurance_items::table
        .filter(insurance_items::property_id.eq(property.id))
        .filter(insurance_items::status.ne("deleted"))
        .select(count_star())
        .first(&mut conn)?;

    // Budget rollups only for roles that may see financials.
    let budget = if acc.permissions.view_financials {
        serde_json::json!({
            "total_budget": project_rows.iter().filter_map(|p| p.budget).sum::<f64>(),
            "total_actual_cost": project_rows.iter().filter_map(|p| p.actual_cost).sum::<f64>(),
        })
    } else {
        Value::Null
    };

    Ok(response::ok(serde_json::json!({
        "property": property,
        "projects": project_summaries,
        "maintenance_schedules": schedules,
        "documents": document_count,
        "insurance_items": insurance_count,
        "budget": budget,
    })))
}
