use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::{
    access,
    auth::CurrentUser,
    error::{AppError, AppResult, FieldError},
    models::{Document, NewDocument},
    pagination::{ListParams, Pagination},
    response,
    schema::{documents, project_assignments, projects},
    state::AppState,
};

const SORT_COLUMNS: &[&str] = &["title", "document_date", "amount", "created_at", "view_count"];

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub category: Option<String>,
    pub document_type: Option<String>,
    #[serde(flatten)]
    pub list: ListParams,
}

#[derive(Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub document_type: Option<String>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub document_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub document_type: Option<String>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub document_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
    pub is_favorite: Option<bool>,
}

#[derive(Default)]
struct UploadFields {
    title: Option<String>,
    property_id: Option<Uuid>,
    project_id: Option<Uuid>,
    document_type: Option<String>,
    category: Option<String>,
    vendor: Option<String>,
    amount: Option<f64>,
    document_date: Option<NaiveDate>,
    tags: Option<Vec<String>>,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Option<Vec<u8>>,
}

/// The caller must hold view access on the scope a document is attached to;
/// unscoped documents are private to their uploader.
fn check_document_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    document: &Document,
) -> AppResult<()> {
    if document.uploaded_by == user_id {
        return Ok(());
    }
    if let Some(project_id) = document.project_id {
        let (_, acc) = access::resolve_project_access(conn, user_id, project_id)?;
        if acc.permissions.view_projects {
            return Ok(());
        }
        return Err(AppError::forbidden("access denied"));
    }
    if let Some(property_id) = document.property_id {
        access::resolve_property_access(conn, user_id, property_id)?;
        return Ok(());
    }
    Err(AppError::forbidden("access denied"))
}

/// Mutations need an edit-level grant on the document's scope; view access
/// alone is not enough. The uploader may always manage their own documents.
fn check_document_manage(
    conn: &mut PgConnection,
    user_id: Uuid,
    document: &Document,
) -> AppResult<()> {
    if document.uploaded_by == user_id {
        return Ok(());
    }
    let acc = if let Some(project_id) = document.project_id {
        access::resolve_project_access(conn, user_id, project_id)?.1
    } else if let Some(property_id) = document.property_id {
        access::resolve_property_access(conn, user_id, property_id)?.1
    } else {
        return Err(AppError::forbidden("access denied"));
    };
    if acc.is_owner || acc.permissions.edit_projects {
        return Ok(());
    }
    Err(AppError::forbidden("not permitted to modify this document"))
}

fn check_scope_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    property_id: Option<Uuid>,
    project_id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(project_id) = project_id {
        let (project, acc) = access::resolve_project_access(conn, user_id, project_id)?;
        if !acc.permissions.view_projects {
            return Err(AppError::forbidden("access denied"));
        }
        if let Some(property_id) = property_id {
            if project.property_id != property_id {
                return Err(AppError::bad_request(
                    "project does not belong to the given property",
                ));
            }
        }
        return Ok(());
    }
    if let Some(property_id) = property_id {
        access::resolve_property_access(conn, user_id, property_id)?;
    }
    Ok(())
}

fn tags_json(tags: Option<Vec<String>>) -> Value {
    serde_json::json!(tags.unwrap_or_default())
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    check_scope_access(&mut conn, user.id, params.property_id, params.project_id)?;

    let property_ids = access::accessible_property_ids(&mut conn, user.id)?;

    // Projects reachable through those properties or through a direct
    // assignment; a project-scoped document may carry no property_id.
    let project_ids: Vec<Uuid> = projects::table
        .filter(
            projects::property_id.eq_any(&property_ids).or(projects::id.eq_any(
                project_assignments::table
                    .filter(project_assignments::user_id.eq(user.id))
                    .select(project_assignments::project_id),
            )),
        )
        .select(projects::id)
        .load(&mut conn)?;

    let base = || {
        let mut q = documents::table
            .filter(documents::status.eq("active"))
            .filter(
                documents::uploaded_by
                    .eq(user.id)
                    .or(documents::property_id.eq_any(property_ids.iter().copied().map(Some)))
                    .or(documents::project_id.eq_any(project_ids.iter().copied().map(Some))),
            )
            .into_boxed();
        if let Some(property_id) = params.property_id {
            q = q.filter(documents::property_id.eq(property_id));
        }
        if let Some(project_id) = params.project_id {
            q = q.filter(documents::project_id.eq(project_id));
        }
        if let Some(category) = params.category.as_deref() {
            q = q.filter(documents::category.eq(category.to_owned()));
        }
        if let Some(document_type) = params.document_type.as_deref() {
            q = q.filter(documents::document_type.eq(document_type.to_owned()));
        }
        q
    };

    let total: i64 = base().select(count_star()).first(&mut conn)?;

    let mut query = base().limit(params.list.limit()).offset(params.list.offset());
    query = match (
        params.list.sort_column(SORT_COLUMNS, "created_at"),
        params.list.descending(),
    ) {
        ("title", false) => query.order(documents::title.asc()),
        ("title", true) => query.order(documents::title.desc()),
        ("document_date", false) => query.order(documents::document_date.asc().nulls_last()),
        ("document_date", true) => query.order(documents::document_date.desc().nulls_last()),
        ("amount", false) => query.order(documents::amount.asc().nulls_last()),
        ("amount", true) => query.order(documents::amount.desc().nulls_last()),
        ("view_count", false) => query.order(documents::view_count.asc()),
        ("view_count", true) => query.order(documents::view_count.desc()),
        (_, false) => query.order(documents::created_at.asc()),
        (_, true) => query.order(documents::created_at.desc()),
    };

    let rows: Vec<Document> = query.load(&mut conn)?;

    Ok(response::list(
        rows,
        Pagination::new(params.list.page(), params.list.limit(), total),
    ))
}

/// Metadata-only document, no file attached.
pub async fn create_document(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateDocumentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if payload.title.trim().is_empty() {
        return Err(AppError::validation(
            "invalid document",
            vec![FieldError::new("title", "title is required")],
        ));
    }

    let mut conn = state.db()?;
    check_scope_access(&mut conn, user.id, payload.property_id, payload.project_id)?;

    let new_document = NewDocument {
        id: Uuid::new_v4(),
        property_id: payload.property_id,
        project_id: payload.project_id,
        uploaded_by: user.id,
        title: payload.title.trim().to_string(),
        document_type: payload.document_type,
        category: payload.category,
        vendor: payload.vendor,
        amount: payload.amount,
        document_date: payload.document_date,
        file_path: None,
        file_size: None,
        mime_type: None,
        content_hash: None,
        tags: tags_json(payload.tags),
        status: "active".to_string(),
    };

    diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(&mut conn)?;

    let document: Document = documents::table.find(new_document.id).first(&mut conn)?;
    info!(document_id = %document.id, "document created");

    Ok(response::created(document))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut fields = UploadFields::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                fields.file_name = field.file_name().map(ToString::to_string);
                fields.content_type = field.content_type().map(ToString::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("failed to read file: {err}")))?;
                fields.bytes = Some(data.to_vec());
            }
            "title" => fields.title = Some(text_field(field).await?),
            "property_id" => fields.property_id = Some(uuid_field(field).await?),
            "project_id" => fields.project_id = Some(uuid_field(field).await?),
            "document_type" => fields.document_type = Some(text_field(field).await?),
            "category" => fields.category = Some(text_field(field).await?),
            "vendor" => fields.vendor = Some(text_field(field).await?),
            "amount" => {
                let raw = text_field(field).await?;
                fields.amount = Some(raw.parse().map_err(|_| {
                    AppError::bad_request("amount must be a number")
                })?);
            }
            "document_date" => {
                let raw = text_field(field).await?;
                fields.document_date = Some(raw.parse().map_err(|_| {
                    AppError::bad_request("document_date must be YYYY-MM-DD")
                })?);
            }
            "tags" => {
                let raw = text_field(field).await?;
                fields.tags = Some(serde_json::from_str(&raw).map_err(|_| {
                    AppError::bad_request("tags must be a JSON array of strings")
                })?);
            }
            _ => {}
        }
    }

    let bytes = fields
        .bytes
        .ok_or_else(|| AppError::bad_request("a file part is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("uploaded file is empty"));
    }
    let file_name = fields
        .file_name
        .unwrap_or_else(|| "document.bin".to_string());
    let title = fields
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| file_name.clone());

    let mut conn = state.db()?;
    check_scope_access(&mut conn, user.id, fields.property_id, fields.project_id)?;

    let content_hash = hex::encode(Sha256::digest(&bytes));

    // Duplicate content in the same scope is rejected; the same bytes under a
    // different property or project are a fresh document.
    let duplicate: Option<Uuid> = documents::table
        .filter(documents::content_hash.eq(&content_hash))
        .filter(documents::status.eq("active"))
        .filter(documents::property_id.is_not_distinct_from(fields.property_id))
        .filter(documents::project_id.is_not_distinct_from(fields.project_id))
        .select(documents::id)
        .first(&mut conn)
        .optional()?;
    if let Some(existing_id) = duplicate {
        return Err(AppError::conflict(format!(
            "an identical document already exists in this scope: {existing_id}"
        )));
    }

    let mime_type = fields.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });

    let document_id = Uuid::new_v4();
    let key = format!("documents/{document_id}/{file_name}");
    let file_size = bytes.len() as i64;

    state
        .storage
        .put_object(
            &key,
            bytes,
            Some(mime_type.clone()),
            inline_content_disposition(&file_name),
        )
        .await
        .map_err(AppError::from)?;

    let new_document = NewDocument {
        id: document_id,
        property_id: fields.property_id,
        project_id: fields.project_id,
        uploaded_by: user.id,
        title: title.trim().to_string(),
        document_type: fields.document_type,
        category: fields.category,
        vendor: fields.vendor,
        amount: fields.amount,
        document_date: fields.document_date,
        file_path: Some(key.clone()),
        file_size: Some(file_size),
        mime_type: Some(mime_type),
        content_hash: Some(content_hash),
        tags: tags_json(fields.tags),
        status: "active".to_string(),
    };

    match diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            // Lost a race with a concurrent upload of the same bytes; the
            // orphaned object is cleaned up before reporting the conflict.
            if let Err(err) = state.storage.delete_object(&key).await {
                tracing::warn!(key = %key, error = %err, "failed to delete orphaned upload");
            }
            return Err(AppError::conflict(
                "an identical document already exists in this scope",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let document: Document = documents::table.find(document_id).first(&mut conn)?;
    info!(document_id = %document.id, size = file_size, "document uploaded");

    Ok(response::created(document))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let document = find_active_document(&mut conn, document_id)?;
    check_document_access(&mut conn, user.id, &document)?;

    diesel::update(documents::table.find(document.id))
        .set(documents::view_count.eq(documents::view_count + 1))
        .execute(&mut conn)?;

    let document: Document = documents::table.find(document.id).first(&mut conn)?;
    Ok(response::ok(document))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<UpdateDocumentRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let document = find_active_document(&mut conn, document_id)?;
    check_document_manage(&mut conn, user.id, &document)?;

    let tags = match payload.tags {
        Some(tags) => serde_json::json!(tags),
        None => document.tags.clone(),
    };

    diesel::update(documents::table.find(document.id))
        .set((
            documents::title
                .eq(payload.title.map(|v| v.trim().to_string()).unwrap_or(document.title)),
            documents::document_type.eq(payload.document_type.or(document.document_type)),
            documents::category.eq(payload.category.or(document.category)),
            documents::vendor.eq(payload.vendor.or(document.vendor)),
            documents::amount.eq(payload.amount.or(document.amount)),
            documents::document_date.eq(payload.document_date.or(document.document_date)),
            documents::tags.eq(tags),
            documents::is_favorite.eq(payload.is_favorite.unwrap_or(document.is_favorite)),
            documents::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let updated: Document = documents::table.find(document_id).first(&mut conn)?;
    Ok(response::ok(updated))
}

/// Soft delete: the row is retained with `deleted` status and the stored
/// object stays in place, so the document no longer blocks re-uploads of the
/// same content.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let document = find_active_document(&mut conn, document_id)?;
    check_document_manage(&mut conn, user.id, &document)?;

    diesel::update(documents::table.find(document.id))
        .set((
            documents::status.eq("deleted"),
            documents::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    info!(document_id = %document.id, "document deleted");
    Ok(response::ok(serde_json::json!({ "deleted": true })))
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let document = find_active_document(&mut conn, document_id)?;
    check_document_access(&mut conn, user.id, &document)?;

    let key = document
        .file_path
        .as_deref()
        .ok_or_else(|| AppError::bad_request("document has no file attached"))?;

    let expires_in = Duration::from_secs(state.config.download_url_expiry_seconds);
    let url = state
        .storage
        .presign_get_object(key, expires_in)
        .await
        .map_err(AppError::from)?;

    Ok(response::ok(serde_json::json!({
        "url": url,
        "expires_in": expires_in.as_secs(),
        "file_name": key.rsplit('/').next(),
        "mime_type": document.mime_type,
    })))
}

fn find_active_document(conn: &mut PgConnection, document_id: Uuid) -> AppResult<Document> {
    documents::table
        .find(document_id)
        .filter(documents::status.ne("deleted"))
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("document not found"))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart field: {err}")))
}

async fn uuid_field(field: axum::extract::multipart::Field<'_>) -> AppResult<Uuid> {
    let raw = text_field(field).await?;
    raw.parse()
        .map_err(|_| AppError::bad_request("expected a UUID"))
}
