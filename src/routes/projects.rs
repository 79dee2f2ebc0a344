use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    access::{self, Role},
    auth::CurrentUser,
    error::{AppError, AppResult, FieldError},
    models::{
        NewProject, NewProjectAssignment, NewProjectTask, Project, ProjectAssignment, ProjectTask,
    },
    pagination::{ListParams, Pagination},
    response,
    schema::{project_assignments, project_tasks, projects, users},
    state::AppState,
    taskflow::TaskStatus,
};

const SORT_COLUMNS: &[&str] = &["title", "status", "priority", "created_at", "updated_at"];

#[derive(Deserialize)]
pub struct ProjectListQuery {
    pub property_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(flatten)]
    pub list: ListParams,
}

#[derive(Deserialize)]
pub struct InitialTaskInput {
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub property_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub budget: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub tasks: Vec<InitialTaskInput>,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub budget: Option<f64>,
    pub actual_cost: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct AssignUserRequest {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub cost: Option<f64>,
    pub sort_order: Option<i32>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<ProjectListQuery>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;

    let property_ids = match params.property_id {
        Some(property_id) => {
            let (_, acc) = access::resolve_property_access(&mut conn, user.id, property_id)?;
            if !acc.permissions.view_projects {
                return Err(AppError::forbidden("access denied"));
            }
            vec![property_id]
        }
        None => access::accessible_property_ids(&mut conn, user.id)?,
    };

    let base = || {
        let mut q = projects::table
            .filter(projects::property_id.eq_any(&property_ids))
            .into_boxed();
        if let Some(status) = params.status.as_deref() {
            q = q.filter(projects::status.eq(status.to_owned()));
        }
        q
    };

    let total: i64 = base().select(count_star()).first(&mut conn)?;

    let mut query = base().limit(params.list.limit()).offset(params.list.offset());
    query = match (
        params.list.sort_column(SORT_COLUMNS, "created_at"),
        params.list.descending(),
    ) {
        ("title", false) => query.order(projects::title.asc()),
        ("title", true) => query.order(projects::title.desc()),
        ("status", false) => query.order(projects::status.asc()),
        ("status", true) => query.order(projects::status.desc()),
        ("priority", false) => query.order(projects::priority.asc()),
        ("priority", true) => query.order(projects::priority.desc()),
        ("updated_at", false) => query.order(projects::updated_at.asc()),
        ("updated_at", true) => query.order(projects::updated_at.desc()),
        (_, false) => query.order(projects::created_at.asc()),
        (_, true) => query.order(projects::created_at.desc()),
    };

    let rows: Vec<Project> = query.load(&mut conn)?;

    Ok(response::list(
        rows,
        Pagination::new(params.list.page(), params.list.limit(), total),
    ))
}

pub async fn create_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if payload.title.trim().is_empty() {
        return Err(AppError::validation(
            "invalid project",
            vec![FieldError::new("title", "title is required")],
        ));
    }

    let mut conn = state.db()?;
    let (_, acc) = access::resolve_property_access(&mut conn, user.id, payload.property_id)?;
    if !acc.permissions.create_projects {
        return Err(AppError::forbidden("not permitted to create projects"));
    }

    let project_id = Uuid::new_v4();
    let new_project = NewProject {
        id: project_id,
        property_id: payload.property_id,
        created_by: user.id,
        title: payload.title.trim().to_string(),
        description: payload.description,
        status: payload.status.unwrap_or_else(|| "planning".to_string()),
        priority: payload.priority.unwrap_or_else(|| "medium".to_string()),
        budget: payload.budget,
        actual_cost: None,
        start_date: payload.start_date,
        end_date: payload.end_date,
    };

    // Project and its initial tasks land together or not at all.
    let (project, tasks) = conn.transaction::<(Project, Vec<ProjectTask>), AppError, _>(|conn| {
        diesel::insert_into(projects::table)
            .values(&new_project)
            .execute(conn)?;

        for (index, task) in payload.tasks.iter().enumerate() {
            if task.title.trim().is_empty() {
                return Err(AppError::bad_request("task title must not be empty"));
            }
            let new_task = NewProjectTask {
                id: Uuid::new_v4(),
                project_id,
                title: task.title.trim().to_string(),
                description: task.description.clone(),
                status: TaskStatus::Pending.as_str().to_string(),
                progress_percentage: 0,
                assigned_to: task.assigned_to,
                due_date: task.due_date,
                estimated_hours: task.estimated_hours,
                cost: None,
                sort_order: index as i32,
            };
            diesel::insert_into(project_tasks::table)
                .values(&new_task)
                .execute(conn)?;
        }

        let project: Project = projects::table.find(project_id).first(conn)?;
        let tasks: Vec<ProjectTask> = project_tasks::table
            .filter(project_tasks::project_id.eq(project_id))
            .order(project_tasks::sort_order.asc())
            .load(conn)?;
        Ok((project, tasks))
    })?;

    info!(project_id = %project.id, property_id = %project.property_id, "project created");

    Ok(response::created(serde_json::json!({
        "project": project,
        "tasks": tasks,
    })))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (project, acc) = access::resolve_project_access(&mut conn, user.id, project_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let tasks: Vec<ProjectTask> = project_tasks::table
        .filter(project_tasks::project_id.eq(project_id))
        .order(project_tasks::sort_order.asc())
        .load(&mut conn)?;

    Ok(response::ok(serde_json::json!({
        "project": project,
        "tasks": tasks,
        "permissions": acc.permissions,
    })))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<UpdateProjectRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (project, acc) = access::resolve_project_access(&mut conn, user.id, project_id)?;
    if !acc.permissions.edit_projects {
        return Err(AppError::forbidden("not permitted to edit this project"));
    }

    diesel::update(projects::table.find(project.id))
        .set((
            projects::title.eq(payload.title.map(|v| v.trim().to_string()).unwrap_or(project.title)),
            projects::description.eq(payload.description.or(project.description)),
            projects::status.eq(payload.status.unwrap_or(project.status)),
            projects::priority.eq(payload.priority.unwrap_or(project.priority)),
            projects::budget.eq(payload.budget.or(project.budget)),
            projects::actual_cost.eq(payload.actual_cost.or(project.actual_cost)),
            projects::start_date.eq(payload.start_date.or(project.start_date)),
            projects::end_date.eq(payload.end_date.or(project.end_date)),
            projects::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let updated: Project = projects::table.find(project_id).first(&mut conn)?;
    Ok(response::ok(updated))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (project, acc) = access::resolve_project_access(&mut conn, user.id, project_id)?;
    if !acc.permissions.delete_projects {
        return Err(AppError::forbidden("not permitted to delete this project"));
    }

    diesel::delete(projects::table.find(project.id)).execute(&mut conn)?;
    info!(project_id = %project.id, "project deleted");

    Ok(response::ok(serde_json::json!({ "deleted": true })))
}

pub async fn assign_user(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<AssignUserRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let role = Role::parse(&payload.role).ok_or_else(|| {
        AppError::validation(
            "invalid assignment",
            vec![FieldError::new(
                "role",
                format!("role must be one of: {}", access::ROLES.join(", ")),
            )],
        )
    })?;

    let mut conn = state.db()?;
    let (_, acc) = access::resolve_project_access(&mut conn, user.id, project_id)?;
    if !(acc.is_owner || acc.permissions.edit_projects) {
        return Err(AppError::forbidden("not permitted to manage assignments"));
    }

    let assignee_exists = diesel::select(diesel::dsl::exists(
        users::table.filter(users::id.eq(payload.user_id)),
    ))
    .get_result::<bool>(&mut conn)?;
    if !assignee_exists {
        return Err(AppError::not_found("user not found"));
    }

    let new_assignment = NewProjectAssignment {
        id: Uuid::new_v4(),
        project_id,
        user_id: payload.user_id,
        role: role.as_str().to_string(),
    };

    match diesel::insert_into(project_assignments::table)
        .values(&new_assignment)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            // Unique per (project, user): re-assigning updates the role.
            diesel::update(
                project_assignments::table
                    .filter(project_assignments::project_id.eq(project_id))
                    .filter(project_assignments::user_id.eq(payload.user_id)),
            )
            .set(project_assignments::role.eq(role.as_str()))
            .execute(&mut conn)?;
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let assignment: ProjectAssignment = project_assignments::table
        .filter(project_assignments::project_id.eq(project_id))
        .filter(project_assignments::user_id.eq(payload.user_id))
        .first(&mut conn)?;

    info!(
        project_id = %project_id,
        assignee = %assignment.user_id,
        role = %assignment.role,
        "user assigned to project"
    );

    Ok(response::created(assignment))
}

pub async fn unassign_user(
    State(state): State<AppState>,
    Path((project_id, target_user_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (_, acc) = access::resolve_project_access(&mut conn, user.id, project_id)?;
    if !(acc.is_owner || acc.permissions.edit_projects) {
        return Err(AppError::forbidden("not permitted to manage assignments"));
    }

    let deleted = diesel::delete(
        project_assignments::table
            .filter(project_assignments::project_id.eq(project_id))
            .filter(project_assignments::user_id.eq(target_user_id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::not_found("assignment not found"));
    }

    Ok(response::ok(serde_json::json!({ "removed": true })))
}

pub async fn list_assignments(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (_, acc) = access::resolve_project_access(&mut conn, user.id, project_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let rows: Vec<(ProjectAssignment, String)> = project_assignments::table
        .inner_join(users::table)
        .filter(project_assignments::project_id.eq(project_id))
        .select((project_assignments::all_columns, users::email))
        .load(&mut conn)?;

    let assignments: Vec<Value> = rows
        .into_iter()
        .map(|(assignment, email)| {
            serde_json::json!({
                "id": assignment.id,
                "user_id": assignment.user_id,
                "email": email,
                "role": assignment.role,
                "created_at": assignment.created_at,
            })
        })
        .collect();

    Ok(response::ok(assignments))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (_, acc) = access::resolve_project_access(&mut conn, user.id, project_id)?;
    if !acc.permissions.view_projects {
        return Err(AppError::forbidden("access denied"));
    }

    let tasks: Vec<ProjectTask> = project_tasks::table
        .filter(project_tasks::project_id.eq(project_id))
        .order(project_tasks::sort_order.asc())
        .load(&mut conn)?;

    Ok(response::ok(tasks))
}

pub async fn create_task(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if payload.title.trim().is_empty() {
        return Err(AppError::validation(
            "invalid task",
            vec![FieldError::new("title", "title is required")],
        ));
    }

    let mut conn = state.db()?;
    let (_, acc) = access::resolve_project_access(&mut conn, user.id, project_id)?;
    if !acc.permissions.edit_projects {
        return Err(AppError::forbidden("not permitted to add tasks"));
    }

    let sort_order = match payload.sort_order {
        Some(order) => order,
        None => {
            let max: Option<i32> = project_tasks::table
                .filter(project_tasks::project_id.eq(project_id))
                .select(diesel::dsl::max(project_tasks::sort_order))
                .first(&mut conn)?;
            max.map_or(0, |m| m + 1)
        }
    };

    let new_task = NewProjectTask {
        id: Uuid::new_v4(),
        project_id,
        title: payload.title.trim().to_string(),
        description: payload.description,
        status: TaskStatus::Pending.as_str().to_string(),
        progress_percentage: 0,
        assigned_to: payload.assigned_to,
        due_date: payload.due_date,
        estimated_hours: payload.estimated_hours,
        cost: payload.cost,
        sort_order,
    };

    diesel::insert_into(project_tasks::table)
        .values(&new_task)
        .execute(&mut conn)?;

    let task: ProjectTask = project_tasks::table.find(new_task.id).first(&mut conn)?;
    info!(task_id = %task.id, project_id = %project_id, "task created");

    Ok(response::created(task))
}
