use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    access,
    auth::CurrentUser,
    error::{AppError, AppResult, FieldError},
    models::{NewTaskComment, ProjectTask, TaskComment, TaskDependency, TaskTimeSession},
    response,
    schema::{project_tasks, task_comments, task_dependencies, task_time_sessions, users},
    state::AppState,
    taskflow::{self, TaskStatus},
};

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub cost: Option<f64>,
    pub sort_order: Option<i32>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub progress_percentage: Option<i32>,
}

#[derive(Deserialize)]
pub struct AddDependencyRequest {
    pub depends_on_task_id: Uuid,
}

#[derive(Deserialize)]
pub struct AddCommentRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct BulkUpdateRequest {
    pub task_ids: Vec<Uuid>,
    pub status: Option<String>,
    pub progress_percentage: Option<i32>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    pub task_ids: Vec<Uuid>,
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let dependencies: Vec<TaskDependency> = task_dependencies::table
        .filter(task_dependencies::task_id.eq(task.id))
        .load(&mut conn)?;
    let tracked_hours = taskflow::tracked_hours(&mut conn, task.id)?;

    Ok(response::ok(serde_json::json!({
        "task": task,
        "dependencies": dependencies,
        "tracked_hours": tracked_hours,
        "permissions": acc.permissions,
    })))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<UpdateTaskRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.edit_projects {
        return Err(AppError::forbidden("not permitted to edit this task"));
    }

    if let Some(title) = payload.title.as_deref() {
        if title.trim().is_empty() {
            return Err(AppError::validation(
                "invalid task",
                vec![FieldError::new("title", "title must not be empty")],
            ));
        }
    }

    diesel::update(project_tasks::table.find(task.id))
        .set((
            project_tasks::title
                .eq(payload.title.map(|v| v.trim().to_string()).unwrap_or(task.title)),
            project_tasks::description.eq(payload.description.or(task.description)),
            project_tasks::assigned_to.eq(payload.assigned_to.or(task.assigned_to)),
            project_tasks::due_date.eq(payload.due_date.or(task.due_date)),
            project_tasks::estimated_hours.eq(payload.estimated_hours.or(task.estimated_hours)),
            project_tasks::cost.eq(payload.cost.or(task.cost)),
            project_tasks::sort_order.eq(payload.sort_order.unwrap_or(task.sort_order)),
            project_tasks::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let updated: ProjectTask = project_tasks::table.find(task_id).first(&mut conn)?;
    Ok(response::ok(updated))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.edit_projects {
        return Err(AppError::forbidden("not permitted to delete this task"));
    }

    diesel::delete(project_tasks::table.find(task.id)).execute(&mut conn)?;
    info!(task_id = %task.id, "task deleted");

    Ok(response::ok(serde_json::json!({ "deleted": true })))
}

/// Assignees may move their own task even when their role grants view only.
pub async fn update_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<Value>> {
    let new_status = TaskStatus::parse(&payload.status).ok_or_else(|| {
        AppError::validation(
            "invalid status",
            vec![FieldError::new(
                "status",
                format!("status must be one of: {}", taskflow::TASK_STATUSES.join(", ")),
            )],
        )
    })?;

    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    let is_assignee = task.assigned_to == Some(user.id);
    if !(acc.permissions.edit_projects || is_assignee) {
        return Err(AppError::forbidden("not permitted to change this task's status"));
    }

    let updated = taskflow::change_status(
        &mut conn,
        &task,
        user.id,
        new_status,
        payload.progress_percentage,
    )?;

    info!(task_id = %updated.id, status = %updated.status, "task status changed");
    Ok(response::ok(updated))
}

pub async fn add_dependency(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<AddDependencyRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.edit_projects {
        return Err(AppError::forbidden("not permitted to edit this task"));
    }

    let edge = taskflow::create_dependency(&mut conn, task.id, payload.depends_on_task_id)?;
    Ok(response::created(edge))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let rows: Vec<(TaskComment, String, String)> = task_comments::table
        .inner_join(users::table)
        .filter(task_comments::task_id.eq(task.id))
        .order(task_comments::created_at.asc())
        .select((task_comments::all_columns, users::first_name, users::last_name))
        .load(&mut conn)?;

    let comments: Vec<Value> = rows
        .into_iter()
        .map(|(comment, first_name, last_name)| {
            serde_json::json!({
                "id": comment.id,
                "task_id": comment.task_id,
                "user_id": comment.user_id,
                "author": format!("{first_name} {last_name}"),
                "content": comment.content,
                "comment_type": comment.comment_type,
                "metadata": comment.metadata,
                "created_at": comment.created_at,
            })
        })
        .collect();

    Ok(response::ok(comments))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<AddCommentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if payload.content.trim().is_empty() {
        return Err(AppError::validation(
            "invalid comment",
            vec![FieldError::new("content", "content is required")],
        ));
    }

    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let new_comment = NewTaskComment {
        id: Uuid::new_v4(),
        task_id: task.id,
        user_id: user.id,
        content: payload.content.trim().to_string(),
        comment_type: "comment".to_string(),
        metadata: serde_json::json!({}),
    };
    diesel::insert_into(task_comments::table)
        .values(&new_comment)
        .execute(&mut conn)?;

    let comment: TaskComment = task_comments::table.find(new_comment.id).first(&mut conn)?;
    Ok(response::created(comment))
}

pub async fn time_tracking_summary(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let sessions: Vec<TaskTimeSession> = task_time_sessions::table
        .filter(task_time_sessions::task_id.eq(task.id))
        .order(task_time_sessions::started_at.asc())
        .load(&mut conn)?;

    let total_minutes: i64 = sessions
        .iter()
        .filter(|s| !s.is_active)
        .filter_map(|s| s.duration_minutes)
        .map(i64::from)
        .sum();
    let active = sessions.iter().any(|s| s.is_active && s.user_id == user.id);

    Ok(response::ok(serde_json::json!({
        "sessions": sessions,
        "total_minutes": total_minutes,
        "total_hours": taskflow::minutes_to_hours(total_minutes),
        "has_active_session": active,
    })))
}

pub async fn start_time_tracking(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let session = taskflow::start_timer(&mut conn, task.id, user.id)?;
    info!(task_id = %task.id, session_id = %session.id, "time tracking started");

    Ok(response::created(session))
}

pub async fn stop_time_tracking(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (task, acc) = access::resolve_task_access(&mut conn, user.id, task_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let session = taskflow::stop_timer(&mut conn, task.id, user.id)?;
    info!(
        task_id = %task.id,
        session_id = %session.id,
        minutes = session.duration_minutes.unwrap_or(0),
        "time tracking stopped"
    );

    Ok(response::ok(session))
}

/// All-or-nothing: access to every named task is verified before anything is
/// written, and the writes share one transaction.
pub async fn bulk_update(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<BulkUpdateRequest>,
) -> AppResult<Json<Value>> {
    if payload.task_ids.is_empty() {
        return Err(AppError::bad_request("task_ids must not be empty"));
    }
    let new_status = payload
        .status
        .as_deref()
        .map(|label| {
            TaskStatus::parse(label).ok_or_else(|| {
                AppError::validation(
                    "invalid status",
                    vec![FieldError::new(
                        "status",
                        format!("status must be one of: {}", taskflow::TASK_STATUSES.join(", ")),
                    )],
                )
            })
        })
        .transpose()?;

    let mut conn = state.db()?;
    let tasks = load_accessible_tasks(&mut conn, user.id, &payload.task_ids)?;

    let updated = conn.transaction::<Vec<ProjectTask>, AppError, _>(|conn| {
        let mut updated = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let task = if payload.assigned_to.is_some() || payload.due_date.is_some() {
                diesel::update(project_tasks::table.find(task.id))
                    .set((
                        project_tasks::assigned_to.eq(payload.assigned_to.or(task.assigned_to)),
                        project_tasks::due_date.eq(payload.due_date.or(task.due_date)),
                        project_tasks::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
                project_tasks::table.find(task.id).first(conn)?
            } else {
                task.clone()
            };

            let task = match new_status {
                Some(status) => taskflow::change_status(
                    conn,
                    &task,
                    user.id,
                    status,
                    payload.progress_percentage,
                )?,
                None => match payload.progress_percentage {
                    Some(progress) => {
                        diesel::update(project_tasks::table.find(task.id))
                            .set((
                                project_tasks::progress_percentage
                                    .eq(taskflow::clamp_progress(progress)),
                                project_tasks::updated_at.eq(Utc::now()),
                            ))
                            .execute(conn)?;
                        project_tasks::table.find(task.id).first(conn)?
                    }
                    None => task,
                },
            };
            updated.push(task);
        }
        Ok(updated)
    })?;

    info!(count = updated.len(), "bulk task update applied");
    Ok(response::ok(updated))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<BulkDeleteRequest>,
) -> AppResult<Json<Value>> {
    if payload.task_ids.is_empty() {
        return Err(AppError::bad_request("task_ids must not be empty"));
    }

    let mut conn = state.db()?;
    let tasks = load_accessible_tasks(&mut conn, user.id, &payload.task_ids)?;

    let deleted = conn.transaction::<usize, AppError, _>(|conn| {
        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let deleted =
            diesel::delete(project_tasks::table.filter(project_tasks::id.eq_any(&ids)))
                .execute(conn)?;
        Ok(deleted)
    })?;

    info!(count = deleted, "bulk task delete applied");
    Ok(response::ok(serde_json::json!({ "deleted": deleted })))
}

/// Load every named task and confirm the caller may touch each one. A single
/// missing task is a 404 and a single inaccessible task is a 403, before any
/// write happens. Repeated ids count once.
fn load_accessible_tasks(
    conn: &mut PgConnection,
    user_id: Uuid,
    task_ids: &[Uuid],
) -> AppResult<Vec<ProjectTask>> {
    let mut unique_ids = task_ids.to_vec();
    unique_ids.sort_unstable();
    unique_ids.dedup();

    let tasks: Vec<ProjectTask> = project_tasks::table
        .filter(project_tasks::id.eq_any(&unique_ids))
        .load(conn)?;

    if tasks.len() != unique_ids.len() {
        return Err(AppError::not_found("one or more tasks not found"));
    }

    for task in &tasks {
        if !access::user_can_access_task(conn, user_id, task)? {
            return Err(AppError::forbidden("access denied to one or more tasks"));
        }
    }

    Ok(tasks)
}
