mod common;

use anyhow::{ensure, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, body_data, TestApp};
use serde_json::json;

async fn setup_property(app: &TestApp, email: &str) -> Result<(String, String)> {
    let (_, token) = app.register_user(email, "password1").await?;
    let response = app
        .post_json(
            "/api/v1/properties",
            &json!({ "name": "Insured Estate", "address": "1 Coverage Ct" }),
            Some(&token),
        )
        .await?;
    ensure!(response.status() == StatusCode::CREATED, "property setup failed");
    let property_id = body_data(response.into_body()).await?["id"]
        .as_str()
        .unwrap()
        .to_string();
    Ok((token, property_id))
}

async fn create_item(
    app: &TestApp,
    token: &str,
    property_id: &str,
    name: &str,
    value: f64,
) -> Result<String> {
    let response = app
        .post_json(
            "/api/v1/insurance/items",
            &json!({
                "property_id": property_id,
                "name": name,
                "category": "electronics",
                "current_value": value,
            }),
            Some(token),
        )
        .await?;
    ensure!(response.status() == StatusCode::CREATED, "item setup failed");
    Ok(body_data(response.into_body()).await?["id"]
        .as_str()
        .unwrap()
        .to_string())
}

#[tokio::test]
async fn item_lifecycle_with_photos_and_linked_documents() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "ins1@example.com").await?;
    let item_id = create_item(&app, &token, &property_id, "Television", 1200.0).await?;

    let photo = app
        .upload_multipart(
            &format!("/api/v1/insurance/items/{item_id}/photos"),
            "tv.jpg",
            "image/jpeg",
            b"\xff\xd8\xff fake jpeg",
            &[("caption", "Front view".to_string()), ("is_primary", "true".to_string())],
            &token,
        )
        .await?;
    assert_eq!(photo.status(), StatusCode::CREATED);
    let photo_data = body_data(photo.into_body()).await?;
    assert_eq!(photo_data["caption"], json!("Front view"));
    assert_eq!(photo_data["is_primary"], json!(true));

    let receipt = app
        .post_json(
            "/api/v1/documents",
            &json!({ "title": "TV receipt", "property_id": property_id }),
            Some(&token),
        )
        .await?;
    let document_id = body_data(receipt.into_body()).await?["id"]
        .as_str()
        .unwrap()
        .to_string();

    let link = app
        .post_json(
            &format!("/api/v1/insurance/items/{item_id}/documents"),
            &json!({ "document_id": document_id, "relationship_type": "receipt" }),
            Some(&token),
        )
        .await?;
    assert_eq!(link.status(), StatusCode::CREATED);

    // Re-linking the same document conflicts.
    let relink = app
        .post_json(
            &format!("/api/v1/insurance/items/{item_id}/documents"),
            &json!({ "document_id": document_id }),
            Some(&token),
        )
        .await?;
    assert_eq!(relink.status(), StatusCode::CONFLICT);

    let detail = app
        .get(&format!("/api/v1/insurance/items/{item_id}"), Some(&token))
        .await?;
    assert_eq!(detail.status(), StatusCode::OK);
    let data = body_data(detail.into_body()).await?;
    assert_eq!(data["photos"].as_array().unwrap().len(), 1);
    assert_eq!(data["documents"].as_array().unwrap().len(), 1);
    assert_eq!(data["documents"][0]["relationship_type"], json!("receipt"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn deleting_a_photo_removes_the_stored_object() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "ins2@example.com").await?;
    let item_id = create_item(&app, &token, &property_id, "Sofa", 800.0).await?;

    let photo = app
        .upload_multipart(
            &format!("/api/v1/insurance/items/{item_id}/photos"),
            "sofa.jpg",
            "image/jpeg",
            b"sofa photo bytes",
            &[],
            &token,
        )
        .await?;
    let photo_data = body_data(photo.into_body()).await?;
    let photo_id = photo_data["id"].as_str().unwrap();
    let key = photo_data["file_path"].as_str().unwrap().to_string();
    assert!(app.storage().get(&key).await.is_some());

    let delete = app
        .delete(
            &format!("/api/v1/insurance/items/{item_id}/photos/{photo_id}"),
            Some(&token),
        )
        .await?;
    assert_eq!(delete.status(), StatusCode::OK);
    assert!(app.storage().get(&key).await.is_none());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn summary_totals_accessible_inventory() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "ins3@example.com").await?;
    create_item(&app, &token, &property_id, "Laptop", 2000.0).await?;
    create_item(&app, &token, &property_id, "Camera", 500.0).await?;

    let summary = app.get("/api/v1/insurance/summary", Some(&token)).await?;
    assert_eq!(summary.status(), StatusCode::OK);
    let data = body_data(summary.into_body()).await?;
    assert_eq!(data["total_items"], json!(2));
    assert_eq!(data["total_value"], json!(2500.0));
    assert_eq!(data["properties"][0]["item_count"], json!(2));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn claim_report_covers_one_property() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "ins4@example.com").await?;
    let item_id = create_item(&app, &token, &property_id, "Piano", 9000.0).await?;

    app.upload_multipart(
        &format!("/api/v1/insurance/items/{item_id}/photos"),
        "piano.jpg",
        "image/jpeg",
        b"piano bytes",
        &[],
        &token,
    )
    .await?;

    let report = app
        .get(
            &format!("/api/v1/insurance/export/claim-report/{property_id}"),
            Some(&token),
        )
        .await?;
    assert_eq!(report.status(), StatusCode::OK);
    let data = body_data(report.into_body()).await?;
    assert_eq!(data["item_count"], json!(1));
    assert_eq!(data["total_current_value"], json!(9000.0));
    assert_eq!(data["items"][0]["photo_count"], json!(1));
    assert_eq!(data["property"]["id"], json!(property_id));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn soft_deleted_items_vanish_from_lists_and_reports() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "ins5@example.com").await?;
    let item_id = create_item(&app, &token, &property_id, "Old rug", 50.0).await?;

    let delete = app
        .delete(&format!("/api/v1/insurance/items/{item_id}"), Some(&token))
        .await?;
    assert_eq!(delete.status(), StatusCode::OK);

    let read = app
        .get(&format!("/api/v1/insurance/items/{item_id}"), Some(&token))
        .await?;
    assert_eq!(read.status(), StatusCode::NOT_FOUND);

    let summary = app.get("/api/v1/insurance/summary", Some(&token)).await?;
    let data = body_data(summary.into_body()).await?;
    assert_eq!(data["total_items"], json!(0));

    app.cleanup().await?;
    Ok(())
}
