//! Capability resolution for property-scoped resources.
//!
//! Every route answers the same two questions before touching anything:
//! may this user see the resource at all, and which operations may they
//! perform on it. Owners get the full permission set unconditionally;
//! everyone else goes through a grant (a property permission or a project
//! assignment) whose role maps onto a fixed permission table.

use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{MaintenanceSchedule, Project, ProjectTask, Property};
use crate::schema::{
    project_assignments, project_tasks, projects, properties, property_permissions,
};

pub const ROLES: &[&str] = &["viewer", "editor", "admin", "contractor", "tenant", "manager"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Viewer,
    Editor,
    Admin,
    Contractor,
    Tenant,
    Manager,
}

impl Role {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "viewer" => Some(Role::Viewer),
            "editor" => Some(Role::Editor),
            "admin" => Some(Role::Admin),
            "contractor" => Some(Role::Contractor),
            "tenant" => Some(Role::Tenant),
            "manager" => Some(Role::Manager),
            _ => None,
        }
    }

    /// Unknown labels resolve to the least-privileged role.
    pub fn parse_or_viewer(label: &str) -> Self {
        Self::parse(label).unwrap_or(Role::Viewer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
            Role::Contractor => "contractor",
            Role::Tenant => "tenant",
            Role::Manager => "manager",
        }
    }

    /// The single role-to-permission table. Pure and identical for every
    /// resource kind.
    pub fn permissions(&self) -> PermissionSet {
        match self {
            Role::Viewer | Role::Tenant => PermissionSet {
                view_projects: true,
                view_maintenance: true,
                ..PermissionSet::none()
            },
            Role::Editor => PermissionSet {
                view_projects: true,
                create_projects: true,
                edit_projects: true,
                view_maintenance: true,
                manage_maintenance: true,
                ..PermissionSet::none()
            },
            Role::Contractor => PermissionSet {
                view_projects: true,
                edit_projects: true,
                view_maintenance: true,
                manage_maintenance: true,
                ..PermissionSet::none()
            },
            Role::Admin | Role::Manager => PermissionSet::all(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    pub view_projects: bool,
    pub create_projects: bool,
    pub edit_projects: bool,
    pub delete_projects: bool,
    pub view_maintenance: bool,
    pub manage_maintenance: bool,
    pub view_financials: bool,
    pub manage_vendors: bool,
}

impl PermissionSet {
    pub fn all() -> Self {
        Self {
            view_projects: true,
            create_projects: true,
            edit_projects: true,
            delete_projects: true,
            view_maintenance: true,
            manage_maintenance: true,
            view_financials: true,
            manage_vendors: true,
        }
    }

    pub fn none() -> Self {
        Self {
            view_projects: false,
            create_projects: false,
            edit_projects: false,
            delete_projects: false,
            view_maintenance: false,
            manage_maintenance: false,
            view_financials: false,
            manage_vendors: false,
        }
    }
}

/// The outcome of a successful capability resolution, handed to the route
/// handler to check the specific write bit it needs.
#[derive(Debug, Clone, Copy)]
pub struct ResourceAccess {
    pub property_id: Uuid,
    pub is_owner: bool,
    pub permissions: PermissionSet,
}

impl ResourceAccess {
    fn owner(property_id: Uuid) -> Self {
        Self {
            property_id,
            is_owner: true,
            permissions: PermissionSet::all(),
        }
    }

    fn granted(property_id: Uuid, role_label: &str) -> Self {
        Self {
            property_id,
            is_owner: false,
            permissions: Role::parse_or_viewer(role_label).permissions(),
        }
    }
}

fn property_grant(
    conn: &mut PgConnection,
    user_id: Uuid,
    property_id: Uuid,
) -> AppResult<Option<String>> {
    let role = property_permissions::table
        .filter(property_permissions::property_id.eq(property_id))
        .filter(property_permissions::user_id.eq(user_id))
        .select(property_permissions::role)
        .first::<String>(conn)
        .optional()?;
    Ok(role)
}

/// Existence is checked before authorization, so a missing resource is a 404
/// even for callers with no rights at all.
pub fn resolve_property_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    property_id: Uuid,
) -> AppResult<(Property, ResourceAccess)> {
    let property: Property = properties::table
        .find(property_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("property not found"))?;

    if property.owner_id == user_id {
        let access = ResourceAccess::owner(property.id);
        return Ok((property, access));
    }

    match property_grant(conn, user_id, property.id)? {
        Some(role) => {
            let access = ResourceAccess::granted(property.id, &role);
            Ok((property, access))
        }
        None => Err(AppError::forbidden("access denied")),
    }
}

/// Project access: property owner, then a project assignment, then a
/// property-level grant.
pub fn resolve_project_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    project_id: Uuid,
) -> AppResult<(Project, ResourceAccess)> {
    let project: Project = projects::table
        .find(project_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    let owner_id: Uuid = properties::table
        .find(project.property_id)
        .select(properties::owner_id)
        .first(conn)?;

    if owner_id == user_id {
        let access = ResourceAccess::owner(project.property_id);
        return Ok((project, access));
    }

    let assignment_role = project_assignments::table
        .filter(project_assignments::project_id.eq(project.id))
        .filter(project_assignments::user_id.eq(user_id))
        .select(project_assignments::role)
        .first::<String>(conn)
        .optional()?;

    if let Some(role) = assignment_role {
        let access = ResourceAccess::granted(project.property_id, &role);
        return Ok((project, access));
    }

    match property_grant(conn, user_id, project.property_id)? {
        Some(role) => {
            let access = ResourceAccess::granted(project.property_id, &role);
            Ok((project, access))
        }
        None => Err(AppError::forbidden("access denied")),
    }
}

/// Schedules inherit property-level permissions only; there is no
/// schedule-level grant.
pub fn resolve_schedule_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    schedule_id: Uuid,
) -> AppResult<(MaintenanceSchedule, ResourceAccess)> {
    let schedule: MaintenanceSchedule = crate::schema::maintenance_schedules::table
        .find(schedule_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("maintenance schedule not found"))?;

    let owner_id: Uuid = properties::table
        .find(schedule.property_id)
        .select(properties::owner_id)
        .first(conn)?;

    if owner_id == user_id {
        let access = ResourceAccess::owner(schedule.property_id);
        return Ok((schedule, access));
    }

    match property_grant(conn, user_id, schedule.property_id)? {
        Some(role) => {
            let access = ResourceAccess::granted(schedule.property_id, &role);
            Ok((schedule, access))
        }
        None => Err(AppError::forbidden("access denied")),
    }
}

/// Task access for bulk operations: property owner, the task's assignee, a
/// property-level grant, or a project-level assignment.
pub fn user_can_access_task(
    conn: &mut PgConnection,
    user_id: Uuid,
    task: &ProjectTask,
) -> AppResult<bool> {
    if task.assigned_to == Some(user_id) {
        return Ok(true);
    }

    let property_id: Uuid = projects::table
        .find(task.project_id)
        .select(projects::property_id)
        .first(conn)?;

    let owner_id: Uuid = properties::table
        .find(property_id)
        .select(properties::owner_id)
        .first(conn)?;

    if owner_id == user_id {
        return Ok(true);
    }

    if property_grant(conn, user_id, property_id)?.is_some() {
        return Ok(true);
    }

    let assigned = diesel::select(diesel::dsl::exists(
        project_assignments::table
            .filter(project_assignments::project_id.eq(task.project_id))
            .filter(project_assignments::user_id.eq(user_id)),
    ))
    .get_result::<bool>(conn)?;

    Ok(assigned)
}

/// Resolve a task through its project, applying the same chain as
/// `resolve_project_access` but also letting the task assignee through.
pub fn resolve_task_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    task_id: Uuid,
) -> AppResult<(ProjectTask, ResourceAccess)> {
    let task: ProjectTask = project_tasks::table
        .find(task_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("task not found"))?;

    match resolve_project_access(conn, user_id, task.project_id) {
        Ok((_, access)) => Ok((task, access)),
        Err(err) if err.status() == axum::http::StatusCode::FORBIDDEN => {
            if task.assigned_to == Some(user_id) {
                let property_id: Uuid = projects::table
                    .find(task.project_id)
                    .select(projects::property_id)
                    .first(conn)?;
                let access = ResourceAccess {
                    property_id,
                    is_owner: false,
                    permissions: Role::Viewer.permissions(),
                };
                Ok((task, access))
            } else {
                Err(err)
            }
        }
        Err(err) => Err(err),
    }
}

/// Every property the user owns or holds a grant on. Used by list endpoints
/// and the reporting queries.
pub fn accessible_property_ids(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    let mut owned: Vec<Uuid> = properties::table
        .filter(properties::owner_id.eq(user_id))
        .select(properties::id)
        .load(conn)?;

    let granted: Vec<Uuid> = property_permissions::table
        .filter(property_permissions::user_id.eq(user_id))
        .select(property_permissions::property_id)
        .load(conn)?;

    for id in granted {
        if !owned.contains(&id) {
            owned.push(id);
        }
    }
    Ok(owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_table_matches_role_grid() {
        let viewer = Role::Viewer.permissions();
        assert!(viewer.view_projects && viewer.view_maintenance);
        assert!(!viewer.create_projects && !viewer.edit_projects && !viewer.delete_projects);
        assert!(!viewer.manage_maintenance && !viewer.view_financials && !viewer.manage_vendors);

        let editor = Role::Editor.permissions();
        assert!(editor.create_projects && editor.edit_projects && editor.manage_maintenance);
        assert!(!editor.delete_projects && !editor.view_financials && !editor.manage_vendors);

        let contractor = Role::Contractor.permissions();
        assert!(contractor.edit_projects && contractor.manage_maintenance);
        assert!(!contractor.create_projects && !contractor.delete_projects);

        assert_eq!(Role::Tenant.permissions(), Role::Viewer.permissions());
        assert_eq!(Role::Admin.permissions(), PermissionSet::all());
        assert_eq!(Role::Manager.permissions(), PermissionSet::all());
    }

    #[test]
    fn permissions_are_idempotent() {
        for role in [
            Role::Viewer,
            Role::Editor,
            Role::Admin,
            Role::Contractor,
            Role::Tenant,
            Role::Manager,
        ] {
            assert_eq!(role.permissions(), role.permissions());
        }
    }

    #[test]
    fn unknown_role_falls_back_to_viewer() {
        assert_eq!(Role::parse_or_viewer("superuser"), Role::Viewer);
        assert_eq!(
            Role::parse_or_viewer("superuser").permissions(),
            Role::Viewer.permissions()
        );
        assert_eq!(Role::parse_or_viewer(""), Role::Viewer);
    }

    #[test]
    fn role_labels_roundtrip() {
        for label in ROLES {
            let role = Role::parse(label).expect("listed role must parse");
            assert_eq!(role.as_str(), *label);
        }
        assert!(Role::parse("Editor ").is_some());
        assert!(Role::parse("landlord").is_none());
    }
}
