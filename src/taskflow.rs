//! Task status transitions, dependency gating and time tracking.
//!
//! The only transition gate is on entering `in_progress`: every prerequisite
//! must already be completed. Other transitions, including backward ones such
//! as `completed` back to `pending`, are permitted. Entering `completed`
//! forces progress to 100 and stamps the completion time regardless of what
//! the caller supplied. Every transition appends an immutable `status_update`
//! comment; that trail is the audit log.

use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::PgConnection;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    NewTaskComment, NewTaskDependency, NewTaskTimeSession, ProjectTask, TaskDependency,
    TaskTimeSession,
};
use crate::schema::{project_tasks, task_comments, task_dependencies, task_time_sessions};

pub const TASK_STATUSES: &[&str] = &["pending", "in_progress", "completed", "on_hold", "cancelled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    OnHold,
    Cancelled,
}

impl TaskStatus {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "on_hold" => Some(TaskStatus::OnHold),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::OnHold => "on_hold",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

pub fn clamp_progress(value: i32) -> i32 {
    value.clamp(0, 100)
}

/// Round minutes to hours with two decimal places.
pub fn minutes_to_hours(minutes: i64) -> f64 {
    ((minutes as f64 / 60.0) * 100.0).round() / 100.0
}

/// Apply a status transition in one transaction: gate, update, audit comment.
pub fn change_status(
    conn: &mut PgConnection,
    task: &ProjectTask,
    user_id: Uuid,
    new_status: TaskStatus,
    progress: Option<i32>,
) -> AppResult<ProjectTask> {
    if new_status == TaskStatus::InProgress {
        // First incomplete prerequisite found blocks the transition; no
        // ordering guarantee among multiple blockers.
        let blocker: Option<String> = task_dependencies::table
            .inner_join(
                project_tasks::table.on(project_tasks::id.eq(task_dependencies::depends_on_task_id)),
            )
            .filter(task_dependencies::task_id.eq(task.id))
            .filter(project_tasks::status.ne(TaskStatus::Completed.as_str()))
            .select(project_tasks::title)
            .first(conn)
            .optional()?;

        if let Some(title) = blocker {
            return Err(AppError::bad_request(format!(
                "cannot start task: prerequisite task \"{title}\" is not completed"
            )));
        }
    }

    let now = Utc::now();
    let new_progress = if new_status == TaskStatus::Completed {
        100
    } else {
        clamp_progress(progress.unwrap_or(task.progress_percentage))
    };
    let completed_at = (new_status == TaskStatus::Completed).then_some(now);

    let updated = conn.transaction::<ProjectTask, AppError, _>(|conn| {
        diesel::update(project_tasks::table.find(task.id))
            .set((
                project_tasks::status.eq(new_status.as_str()),
                project_tasks::progress_percentage.eq(new_progress),
                project_tasks::status_changed_at.eq(Some(now)),
                project_tasks::completed_at.eq(completed_at),
                project_tasks::updated_at.eq(now),
            ))
            .execute(conn)?;

        let comment = NewTaskComment {
            id: Uuid::new_v4(),
            task_id: task.id,
            user_id,
            content: format!(
                "Status changed from {} to {}",
                task.status,
                new_status.as_str()
            ),
            comment_type: "status_update".to_string(),
            metadata: json!({
                "old_status": task.status,
                "new_status": new_status.as_str(),
                "progress_percentage": new_progress,
            }),
        };
        diesel::insert_into(task_comments::table)
            .values(&comment)
            .execute(conn)?;

        let task: ProjectTask = project_tasks::table.find(task.id).first(conn)?;
        Ok(task)
    })?;

    Ok(updated)
}

/// Create a dependency edge. Only the direct reverse edge is rejected;
/// transitive cycles (A -> B -> C -> A) are not detected.
pub fn create_dependency(
    conn: &mut PgConnection,
    task_id: Uuid,
    depends_on_task_id: Uuid,
) -> AppResult<TaskDependency> {
    if task_id == depends_on_task_id {
        return Err(AppError::bad_request("a task cannot depend on itself"));
    }

    let prerequisite_exists = diesel::select(diesel::dsl::exists(
        project_tasks::table.filter(project_tasks::id.eq(depends_on_task_id)),
    ))
    .get_result::<bool>(conn)?;
    if !prerequisite_exists {
        return Err(AppError::not_found("prerequisite task not found"));
    }

    let reverse_exists = diesel::select(diesel::dsl::exists(
        task_dependencies::table
            .filter(task_dependencies::task_id.eq(depends_on_task_id))
            .filter(task_dependencies::depends_on_task_id.eq(task_id)),
    ))
    .get_result::<bool>(conn)?;
    if reverse_exists {
        return Err(AppError::bad_request(
            "circular dependency: the prerequisite task already depends on this task",
        ));
    }

    let new_edge = NewTaskDependency {
        id: Uuid::new_v4(),
        task_id,
        depends_on_task_id,
    };

    match diesel::insert_into(task_dependencies::table)
        .values(&new_edge)
        .execute(conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request("dependency already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let edge: TaskDependency = task_dependencies::table.find(new_edge.id).first(conn)?;
    Ok(edge)
}

/// Start a timer for the user on a task. A partial unique index allows at
/// most one active session per user across all tasks, so this is a single
/// conditional insert and the duplicate case surfaces as a unique violation
/// even under concurrent starts.
pub fn start_timer(
    conn: &mut PgConnection,
    task_id: Uuid,
    user_id: Uuid,
) -> AppResult<TaskTimeSession> {
    let session = NewTaskTimeSession {
        id: Uuid::new_v4(),
        task_id,
        user_id,
        started_at: Utc::now(),
        is_active: true,
    };

    match diesel::insert_into(task_time_sessions::table)
        .values(&session)
        .execute(conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(
                "a time tracking session is already active for this user",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let stored: TaskTimeSession = task_time_sessions::table.find(session.id).first(conn)?;
    Ok(stored)
}

/// Stop the caller's active session on exactly this task. Duration is the
/// floor of elapsed whole minutes.
pub fn stop_timer(
    conn: &mut PgConnection,
    task_id: Uuid,
    user_id: Uuid,
) -> AppResult<TaskTimeSession> {
    let active: Option<TaskTimeSession> = task_time_sessions::table
        .filter(task_time_sessions::task_id.eq(task_id))
        .filter(task_time_sessions::user_id.eq(user_id))
        .filter(task_time_sessions::is_active.eq(true))
        .first(conn)
        .optional()?;

    let session =
        active.ok_or_else(|| AppError::bad_request("no active time tracking session for this task"))?;

    let now = Utc::now();
    let elapsed = now.signed_duration_since(session.started_at);
    let duration_minutes = (elapsed.num_seconds().max(0) / 60) as i32;

    diesel::update(task_time_sessions::table.find(session.id))
        .set((
            task_time_sessions::ended_at.eq(Some(now)),
            task_time_sessions::duration_minutes.eq(Some(duration_minutes)),
            task_time_sessions::is_active.eq(false),
        ))
        .execute(conn)?;

    let stored: TaskTimeSession = task_time_sessions::table.find(session.id).first(conn)?;
    Ok(stored)
}

/// Total tracked hours over all closed sessions for a task.
pub fn tracked_hours(conn: &mut PgConnection, task_id: Uuid) -> AppResult<f64> {
    let minutes: Vec<Option<i32>> = task_time_sessions::table
        .filter(task_time_sessions::task_id.eq(task_id))
        .filter(task_time_sessions::is_active.eq(false))
        .select(task_time_sessions::duration_minutes)
        .load(conn)?;

    let total: i64 = minutes.into_iter().flatten().map(i64::from).sum();
    Ok(minutes_to_hours(total))
}
