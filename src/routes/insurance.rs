use axum::{
    extract::{Multipart, Path, Query, State},
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
    access::{self, ResourceAccess},
    auth::CurrentUser,
    error::{AppError, AppResult, FieldError},
    models::{
        Document, InsuranceItem, InsuranceItemDocument, InsuranceItemPhoto, NewInsuranceItem,
        NewInsuranceItemDocument, NewInsuranceItemPhoto,
    },
    pagination::{ListParams, Pagination},
    response,
    schema::{documents, insurance_item_documents, insurance_item_photos, insurance_items, properties},
    state::AppState,
};

const SORT_COLUMNS: &[&str] = &["name", "category", "purchase_date", "current_value", "created_at"];

#[derive(Deserialize)]
pub struct ItemListQuery {
    pub property_id: Option<Uuid>,
    pub category: Option<String>,
    #[serde(flatten)]
    pub list: ListParams,
}

#[derive(Deserialize)]
pub struct CreateItemRequest {
    pub property_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
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
    pub tags: Option<Vec<String>>,
    pub priority: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
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
    pub tags: Option<Vec<String>>,
    pub is_favorite: Option<bool>,
    pub priority: Option<String>,
}

#[derive(Deserialize)]
pub struct LinkDocumentRequest {
    pub document_id: Uuid,
    pub relationship_type: Option<String>,
    pub notes: Option<String>,
}

fn find_active_item(conn: &mut PgConnection, item_id: Uuid) -> AppResult<InsuranceItem> {
    insurance_items::table
        .find(item_id)
        .filter(insurance_items::status.ne("deleted"))
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("insurance item not found"))
}

fn resolve_item_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    item_id: Uuid,
) -> AppResult<(InsuranceItem, ResourceAccess)> {
    let item = find_active_item(conn, item_id)?;
    let (_, acc) = access::resolve_property_access(conn, user_id, item.property_id)?;
    Ok((item, acc))
}

fn can_manage_items(acc: &ResourceAccess) -> bool {
    acc.is_owner || acc.permissions.edit_projects
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ItemListQuery>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;

    let property_ids = match params.property_id {
        Some(property_id) => {
            access::resolve_property_access(&mut conn, user.id, property_id)?;
            vec![property_id]
        }
        None => access::accessible_property_ids(&mut conn, user.id)?,
    };

    let base = || {
        let mut q = insurance_items::table
            .filter(insurance_items::property_id.eq_any(&property_ids))
            .filter(insurance_items::status.ne("deleted"))
            .into_boxed();
        if let Some(category) = params.category.as_deref() {
            q = q.filter(insurance_items::category.eq(category.to_owned()));
        }
        q
    };

    let total: i64 = base().select(count_star()).first(&mut conn)?;

    let mut query = base().limit(params.list.limit()).offset(params.list.offset());
    query = match (
        params.list.sort_column(SORT_COLUMNS, "created_at"),
        params.list.descending(),
    ) {
        ("name", false) => query.order(insurance_items::name.asc()),
        ("name", true) => query.order(insurance_items::name.desc()),
        ("category", false) => query.order(insurance_items::category.asc()),
        ("category", true) => query.order(insurance_items::category.desc()),
        ("purchase_date", false) => query.order(insurance_items::purchase_date.asc().nulls_last()),
        ("purchase_date", true) => query.order(insurance_items::purchase_date.desc().nulls_last()),
        ("current_value", false) => query.order(insurance_items::current_value.asc().nulls_last()),
        ("current_value", true) => query.order(insurance_items::current_value.desc().nulls_last()),
        (_, false) => query.order(insurance_items::created_at.asc()),
        (_, true) => query.order(insurance_items::created_at.desc()),
    };

    let rows: Vec<InsuranceItem> = query.load(&mut conn)?;

    Ok(response::list(
        rows,
        Pagination::new(params.list.page(), params.list.limit(), total),
    ))
}

pub async fn create_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateItemRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if payload.name.trim().is_empty() {
        return Err(AppError::validation(
            "invalid insurance item",
            vec![FieldError::new("name", "name is required")],
        ));
    }

    let mut conn = state.db()?;
    let (_, acc) = access::resolve_property_access(&mut conn, user.id, payload.property_id)?;
    if !can_manage_items(&acc) {
        return Err(AppError::forbidden("not permitted to manage insurance items"));
    }

    let new_item = NewInsuranceItem {
        id: Uuid::new_v4(),
        property_id: payload.property_id,
        created_by: user.id,
        name: payload.name.trim().to_string(),
        description: payload.description,
        category: payload.category.unwrap_or_else(|| "general".to_string()),
        brand: payload.brand,
        model: payload.model,
        serial_number: payload.serial_number,
        purchase_date: payload.purchase_date,
        purchase_price: payload.purchase_price,
        current_value: payload.current_value,
        condition: payload.condition,
        location: payload.location,
        policy_number: payload.policy_number,
        coverage_amount: payload.coverage_amount,
        tags: serde_json::json!(payload.tags.unwrap_or_default()),
        status: "active".to_string(),
        priority: payload.priority,
    };

    diesel::insert_into(insurance_items::table)
        .values(&new_item)
        .execute(&mut conn)?;

    let item: InsuranceItem = insurance_items::table.find(new_item.id).first(&mut conn)?;
    info!(item_id = %item.id, property_id = %item.property_id, "insurance item created");

    Ok(response::created(item))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (item, _) = resolve_item_access(&mut conn, user.id, item_id)?;

    let photos: Vec<InsuranceItemPhoto> = insurance_item_photos::table
        .filter(insurance_item_photos::item_id.eq(item.id))
        .order(insurance_item_photos::created_at.asc())
        .load(&mut conn)?;

    let linked: Vec<(InsuranceItemDocument, Document)> = insurance_item_documents::table
        .inner_join(documents::table)
        .filter(insurance_item_documents::item_id.eq(item.id))
        .load(&mut conn)?;

    let linked_documents: Vec<Value> = linked
        .into_iter()
        .map(|(link, document)| {
            serde_json::json!({
                "link_id": link.id,
                "relationship_type": link.relationship_type,
                "notes": link.notes,
                "document": document,
            })
        })
        .collect();

    Ok(response::ok(serde_json::json!({
        "item": item,
        "photos": photos,
        "documents": linked_documents,
    })))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<UpdateItemRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (item, acc) = resolve_item_access(&mut conn, user.id, item_id)?;
    if !can_manage_items(&acc) {
        return Err(AppError::forbidden("not permitted to manage insurance items"));
    }

    let tags = match payload.tags {
        Some(tags) => serde_json::json!(tags),
        None => item.tags.clone(),
    };

    diesel::update(insurance_items::table.find(item.id))
        .set((
            insurance_items::name
                .eq(payload.name.map(|v| v.trim().to_string()).unwrap_or(item.name)),
            insurance_items::description.eq(payload.description.or(item.description)),
            insurance_items::category.eq(payload.category.unwrap_or(item.category)),
            insurance_items::brand.eq(payload.brand.or(item.brand)),
            insurance_items::model.eq(payload.model.or(item.model)),
            insurance_items::serial_number.eq(payload.serial_number.or(item.serial_number)),
            insurance_items::purchase_date.eq(payload.purchase_date.or(item.purchase_date)),
            insurance_items::purchase_price.eq(payload.purchase_price.or(item.purchase_price)),
            insurance_items::current_value.eq(payload.current_value.or(item.current_value)),
            insurance_items::condition.eq(payload.condition.or(item.condition)),
            insurance_items::location.eq(payload.location.or(item.location)),
            insurance_items::policy_number.eq(payload.policy_number.or(item.policy_number)),
            insurance_items::coverage_amount.eq(payload.coverage_amount.or(item.coverage_amount)),
            insurance_items::tags.eq(tags),
            insurance_items::is_favorite.eq(payload.is_favorite.unwrap_or(item.is_favorite)),
            insurance_items::priority.eq(payload.priority.or(item.priority)),
            insurance_items::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let updated: InsuranceItem = insurance_items::table.find(item_id).first(&mut conn)?;
    Ok(response::ok(updated))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (item, acc) = resolve_item_access(&mut conn, user.id, item_id)?;
    if !can_manage_items(&acc) {
        return Err(AppError::forbidden("not permitted to manage insurance items"));
    }

    diesel::update(insurance_items::table.find(item.id))
        .set((
            insurance_items::status.eq("deleted"),
            insurance_items::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    info!(item_id = %item.id, "insurance item deleted");
    Ok(response::ok(serde_json::json!({ "deleted": true })))
}

pub async fn upload_photo(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db()?;
    let (item, acc) = resolve_item_access(&mut conn, user.id, item_id)?;
    if !can_manage_items(&acc) {
        return Err(AppError::forbidden("not permitted to manage insurance items"));
    }

    let mut bytes: Option<Vec<u8>> = None;
    let mut file_name = "photo.jpg".to_string();
    let mut content_type: Option<String> = None;
    let mut caption: Option<String> = None;
    let mut is_primary = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "photo" => {
                if let Some(original) = field.file_name() {
                    file_name = original.to_string();
                }
                content_type = field.content_type().map(ToString::to_string);
                let data = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read photo: {err}"))
                })?;
                bytes = Some(data.to_vec());
            }
            "caption" => {
                caption = Some(field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid multipart field: {err}"))
                })?);
            }
            "is_primary" => {
                let raw = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid multipart field: {err}"))
                })?;
                is_primary = raw == "true" || raw == "1";
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| AppError::bad_request("a photo part is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("uploaded photo is empty"));
    }

    let mime_type = content_type.unwrap_or_else(|| {
        mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });

    let photo_id = Uuid::new_v4();
    let key = format!("insurance/{}/photos/{photo_id}/{file_name}", item.id);
    let file_size = bytes.len() as i64;

    state
        .storage
        .put_object(&key, bytes, Some(mime_type.clone()), None)
        .await
        .map_err(AppError::from)?;

    let new_photo = NewInsuranceItemPhoto {
        id: photo_id,
        item_id: item.id,
        file_path: key,
        file_size,
        mime_type: Some(mime_type),
        caption,
        is_primary,
    };

    // Only one primary photo per item.
    if is_primary {
        diesel::update(
            insurance_item_photos::table.filter(insurance_item_photos::item_id.eq(item.id)),
        )
        .set(insurance_item_photos::is_primary.eq(false))
        .execute(&mut conn)?;
    }

    diesel::insert_into(insurance_item_photos::table)
        .values(&new_photo)
        .execute(&mut conn)?;

    let photo: InsuranceItemPhoto = insurance_item_photos::table
        .find(new_photo.id)
        .first(&mut conn)?;
    info!(item_id = %item.id, photo_id = %photo.id, "insurance photo uploaded");

    Ok(response::created(photo))
}

pub async fn delete_photo(
    State(state): State<AppState>,
    Path((item_id, photo_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (item, acc) = resolve_item_access(&mut conn, user.id, item_id)?;
    if !can_manage_items(&acc) {
        return Err(AppError::forbidden("not permitted to manage insurance items"));
    }

    let photo: InsuranceItemPhoto = insurance_item_photos::table
        .find(photo_id)
        .filter(insurance_item_photos::item_id.eq(item.id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("photo not found"))?;

    diesel::delete(insurance_item_photos::table.find(photo.id)).execute(&mut conn)?;

    if let Err(err) = state.storage.delete_object(&photo.file_path).await {
        tracing::warn!(key = %photo.file_path, error = %err, "failed to delete photo object");
    }

    Ok(response::ok(serde_json::json!({ "deleted": true })))
}

pub async fn link_document(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<LinkDocumentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db()?;
    let (item, acc) = resolve_item_access(&mut conn, user.id, item_id)?;
    if !can_manage_items(&acc) {
        return Err(AppError::forbidden("not permitted to manage insurance items"));
    }

    let document: Option<Document> = documents::table
        .find(payload.document_id)
        .filter(documents::status.ne("deleted"))
        .first(&mut conn)
        .optional()?;
    let document = document.ok_or_else(|| AppError::not_found("document not found"))?;

    let already_linked = diesel::select(diesel::dsl::exists(
        insurance_item_documents::table
            .filter(insurance_item_documents::item_id.eq(item.id))
            .filter(insurance_item_documents::document_id.eq(document.id)),
    ))
    .get_result::<bool>(&mut conn)?;
    if already_linked {
        return Err(AppError::conflict("document is already linked to this item"));
    }

    let new_link = NewInsuranceItemDocument {
        id: Uuid::new_v4(),
        item_id: item.id,
        document_id: document.id,
        relationship_type: payload
            .relationship_type
            .unwrap_or_else(|| "receipt".to_string()),
        notes: payload.notes,
    };
    diesel::insert_into(insurance_item_documents::table)
        .values(&new_link)
        .execute(&mut conn)?;

    let link: InsuranceItemDocument = insurance_item_documents::table
        .find(new_link.id)
        .first(&mut conn)?;
    Ok(response::created(link))
}

pub async fn unlink_document(
    State(state): State<AppState>,
    Path((item_id, document_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (item, acc) = resolve_item_access(&mut conn, user.id, item_id)?;
    if !can_manage_items(&acc) {
        return Err(AppError::forbidden("not permitted to manage insurance items"));
    }

    let deleted = diesel::delete(
        insurance_item_documents::table
            .filter(insurance_item_documents::item_id.eq(item.id))
            .filter(insurance_item_documents::document_id.eq(document_id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::not_found("document link not found"));
    }

    Ok(response::ok(serde_json::json!({ "removed": true })))
}

/// Inventory totals per accessible property.
pub async fn summary(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let property_ids = access::accessible_property_ids(&mut conn, user.id)?;

    let items: Vec<InsuranceItem> = insurance_items::table
        .filter(insurance_items::property_id.eq_any(&property_ids))
        .filter(insurance_items::status.ne("deleted"))
        .load(&mut conn)?;

    let names: Vec<(Uuid, String)> = properties::table
        .filter(properties::id.eq_any(&property_ids))
        .select((properties::id, properties::name))
        .load(&mut conn)?;

    let per_property: Vec<Value> = names
        .into_iter()
        .map(|(property_id, name)| {
            let scoped: Vec<&InsuranceItem> =
                items.iter().filter(|i| i.property_id == property_id).collect();
            serde_json::json!({
                "property_id": property_id,
                "property_name": name,
                "item_count": scoped.len(),
                "total_value": scoped.iter().filter_map(|i| i.current_value).sum::<f64>(),
                "total_coverage": scoped.iter().filter_map(|i| i.coverage_amount).sum::<f64>(),
            })
        })
        .collect();

    Ok(response::ok(serde_json::json!({
        "total_items": items.len(),
        "total_value": items.iter().filter_map(|i| i.current_value).sum::<f64>(),
        "properties": per_property,
    })))
}

/// Full inventory for one property, shaped for an insurance claim filing.
pub async fn claim_report(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let (property, _) = access::resolve_property_access(&mut conn, user.id, property_id)?;

    let items: Vec<InsuranceItem> = insurance_items::table
        .filter(insurance_items::property_id.eq(property.id))
        .filter(insurance_items::status.ne("deleted"))
        .order(insurance_items::category.asc())
        .load(&mut conn)?;

    let item_ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    let photos: Vec<InsuranceItemPhoto> = insurance_item_photos::table
        .filter(insurance_item_photos::item_id.eq_any(&item_ids))
        .load(&mut conn)?;

    let entries: Vec<Value> = items
        .iter()
        .map(|item| {
            let item_photos: Vec<&InsuranceItemPhoto> =
                photos.iter().filter(|p| p.item_id == item.id).collect();
            serde_json::json!({
                "item": item,
                "photo_count": item_photos.len(),
                "photo_paths": item_photos.iter().map(|p| &p.file_path).collect::<Vec<_>>(),
            })
        })
        .collect();

    Ok(response::ok(serde_json::json!({
        "property": {
            "id": property.id,
            "name": property.name,
            "address": property.address,
        },
        "generated_at": Utc::now(),
        "item_count": items.len(),
        "total_purchase_value": items.iter().filter_map(|i| i.purchase_price).sum::<f64>(),
        "total_current_value": items.iter().filter_map(|i| i.current_value).sum::<f64>(),
        "items": entries,
    })))
}
