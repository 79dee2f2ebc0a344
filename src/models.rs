use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::*;

// Deliberately not Serialize: carries the password hash. Responses go
// through `auth::CurrentUser`.
#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: String,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = properties)]
#[diesel(belongs_to(User, foreign_key = owner_id))]
pub struct Property {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    pub property_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_footage: Option<i32>,
    pub lot_size: Option<f64>,
    pub year_built: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = properties)]
pub struct NewProperty {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    pub property_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_footage: Option<i32>,
    pub lot_size: Option<f64>,
    pub year_built: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = property_permissions)]
#[diesel(belongs_to(Property))]
#[diesel(belongs_to(User))]
pub struct PropertyPermission {
    pub id: Uuid,
    pub property_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = property_permissions)]
pub struct NewPropertyPermission {
    pub id: Uuid,
    pub property_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = projects)]
#[diesel(belongs_to(Property))]
pub struct Project {
    pub id: Uuid,
    pub property_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub budget: Option<f64>,
    pub actual_cost: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub id: Uuid,
    pub property_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub budget: Option<f64>,
    pub actual_cost: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = project_assignments)]
#[diesel(belongs_to(Project))]
#[diesel(belongs_to(User))]
pub struct ProjectAssignment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_assignments)]
pub struct NewProjectAssignment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = project_tasks)]
#[diesel(belongs_to(Project))]
pub struct ProjectTask {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub progress_percentage: i32,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub cost: Option<f64>,
    pub sort_order: i32,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_tasks)]
pub struct NewProjectTask {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub progress_percentage: i32,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub cost: Option<f64>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = task_dependencies)]
pub struct TaskDependency {
    pub id: Uuid,
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_dependencies)]
pub struct NewTaskDependency {
    pub id: Uuid,
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = task_time_sessions)]
pub struct TaskTimeSession {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub is_active: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_time_sessions)]
pub struct NewTaskTimeSession {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = task_comments)]
pub struct TaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub comment_type: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_comments)]
pub struct NewTaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub comment_type: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = maintenance_schedules)]
#[diesel(belongs_to(Property))]
pub struct MaintenanceSchedule {
    pub id: Uuid,
    pub property_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub frequency: String,
    pub frequency_multiplier: i32,
    pub next_due_date: Option<NaiveDate>,
    pub last_completed_date: Option<NaiveDate>,
    pub is_active: bool,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = maintenance_schedules)]
pub struct NewMaintenanceSchedule {
    pub id: Uuid,
    pub property_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub frequency: String,
    pub frequency_multiplier: i32,
    pub next_due_date: Option<NaiveDate>,
    pub is_active: bool,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = maintenance_records)]
#[diesel(belongs_to(MaintenanceSchedule, foreign_key = schedule_id))]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub completed_by: Uuid,
    pub completed_date: NaiveDate,
    pub notes: Option<String>,
    pub actual_duration_minutes: Option<i32>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = maintenance_records)]
pub struct NewMaintenanceRecord {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub completed_by: Uuid,
    pub completed_date: NaiveDate,
    pub notes: Option<String>,
    pub actual_duration_minutes: Option<i32>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub uploaded_by: Uuid,
    pub title: String,
    pub document_type: Option<String>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub document_date: Option<NaiveDate>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub content_hash: Option<String>,
    pub tags: serde_json::Value,
    pub status: String,
    pub view_count: i32,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub uploaded_by: Uuid,
    pub title: String,
    pub document_type: Option<String>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub document_date: Option<NaiveDate>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub content_hash: Option<String>,
    pub tags: serde_json::Value,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = insurance_items)]
#[diesel(belongs_to(Property))]
pub struct InsuranceItem {
    pub id: Uuid,
    pub property_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<f64>,
    pub current_value: Option<f64>,
    pub condition: Option<String>,
    pub location: Option<String>,
    pub policy_number: Option<String>,
    pub coverage_amount: Option<f64>,
    pub tags: serde_json::Value,
    pub status: String,
    pub is_favorite: bool,
    pub priority: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = insurance_items)]
pub struct NewInsuranceItem {
    pub id: Uuid,
    pub property_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<f64>,
    pub current_value: Option<f64>,
    pub condition: Option<String>,
    pub location: Option<String>,
    pub policy_number: Option<String>,
    pub coverage_amount: Option<f64>,
    pub tags: serde_json::Value,
    pub status: String,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = insurance_item_photos)]
#[diesel(belongs_to(InsuranceItem, foreign_key = item_id))]
pub struct InsuranceItemPhoto {
    pub id: Uuid,
    pub item_id: Uuid,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = insurance_item_photos)]
pub struct NewInsuranceItemPhoto {
    pub id: Uuid,
    pub item_id: Uuid,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = insurance_item_documents)]
pub struct InsuranceItemDocument {
    pub id: Uuid,
    pub item_id: Uuid,
    pub document_id: Uuid,
    pub relationship_type: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = insurance_item_documents)]
pub struct NewInsuranceItemDocument {
    pub id: Uuid,
    pub item_id: Uuid,
    pub document_id: Uuid,
    pub relationship_type: String,
    pub notes: Option<String>,
}
