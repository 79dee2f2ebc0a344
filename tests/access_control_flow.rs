mod common;

use anyhow::{anyhow, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, body_data, TestApp};
use serde_json::json;
use uuid::Uuid;

async fn create_property(app: &TestApp, token: &str, name: &str) -> Result<Uuid> {
    let response = app
        .post_json(
            "/api/v1/properties",
            &json!({ "name": name, "address": "12 Main St" }),
            Some(token),
        )
        .await?;
    anyhow::ensure!(
        response.status() == StatusCode::CREATED,
        "property creation failed with status {}",
        response.status()
    );
    let data = body_data(response.into_body()).await?;
    data["id"]
        .as_str()
        .ok_or_else(|| anyhow!("property response missing id"))?
        .parse()
        .map_err(Into::into)
}

async fn grant_role(
    app: &TestApp,
    owner_token: &str,
    property_id: Uuid,
    user_id: Uuid,
    role: &str,
) -> Result<()> {
    let response = app
        .post_json(
            &format!("/api/v1/properties/{property_id}/permissions"),
            &json!({ "user_id": user_id, "role": role }),
            Some(owner_token),
        )
        .await?;
    anyhow::ensure!(
        response.status() == StatusCode::CREATED,
        "grant failed with status {}",
        response.status()
    );
    Ok(())
}

#[tokio::test]
async fn missing_resource_is_404_before_authorization() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, token) = app.register_user("owner1@example.com", "password1").await?;

    let response = app
        .get(&format!("/api/v1/properties/{}", Uuid::new_v4()), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn stranger_gets_403_on_an_existing_property() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, owner_token) = app.register_user("owner2@example.com", "password1").await?;
    let (_, stranger_token) = app.register_user("nosy@example.com", "password1").await?;
    let property_id = create_property(&app, &owner_token, "Lakeside").await?;

    let response = app
        .get(&format!("/api/v1/properties/{property_id}"), Some(&stranger_token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn viewer_can_read_but_not_create_projects() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, owner_token) = app.register_user("owner3@example.com", "password1").await?;
    let (viewer_id, viewer_token) = app.register_user("viewer@example.com", "password1").await?;
    let property_id = create_property(&app, &owner_token, "Hilltop").await?;
    grant_role(&app, &owner_token, property_id, viewer_id, "viewer").await?;

    let read = app
        .get(&format!("/api/v1/properties/{property_id}"), Some(&viewer_token))
        .await?;
    assert_eq!(read.status(), StatusCode::OK);
    let data = body_data(read.into_body()).await?;
    assert_eq!(data["is_owner"], json!(false));
    assert_eq!(data["permissions"]["viewProjects"], json!(true));
    assert_eq!(data["permissions"]["createProjects"], json!(false));

    let create = app
        .post_json(
            "/api/v1/projects",
            &json!({ "property_id": property_id, "title": "Kitchen remodel" }),
            Some(&viewer_token),
        )
        .await?;
    assert_eq!(create.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn editor_can_create_but_not_delete_projects() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, owner_token) = app.register_user("owner4@example.com", "password1").await?;
    let (editor_id, editor_token) = app.register_user("editor@example.com", "password1").await?;
    let property_id = create_property(&app, &owner_token, "Brownstone").await?;
    grant_role(&app, &owner_token, property_id, editor_id, "editor").await?;

    let create = app
        .post_json(
            "/api/v1/projects",
            &json!({ "property_id": property_id, "title": "Roof repair" }),
            Some(&editor_token),
        )
        .await?;
    assert_eq!(create.status(), StatusCode::CREATED);
    let created = body_data(create.into_body()).await?;
    let project_id = created["project"]["id"].as_str().unwrap().to_string();

    let delete = app
        .delete(&format!("/api/v1/projects/{project_id}"), Some(&editor_token))
        .await?;
    assert_eq!(delete.status(), StatusCode::FORBIDDEN);

    // The owner holds every permission.
    let delete = app
        .delete(&format!("/api/v1/projects/{project_id}"), Some(&owner_token))
        .await?;
    assert_eq!(delete.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_role_is_rejected_at_grant_time() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, owner_token) = app.register_user("owner5@example.com", "password1").await?;
    let (other_id, _) = app.register_user("other@example.com", "password1").await?;
    let property_id = create_property(&app, &owner_token, "Cottage").await?;

    let response = app
        .post_json(
            &format!("/api/v1/properties/{property_id}/permissions"),
            &json!({ "user_id": other_id, "role": "superuser" }),
            Some(&owner_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn revoking_a_grant_removes_access() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, owner_token) = app.register_user("owner6@example.com", "password1").await?;
    let (viewer_id, viewer_token) = app.register_user("viewer6@example.com", "password1").await?;
    let property_id = create_property(&app, &owner_token, "Bungalow").await?;
    grant_role(&app, &owner_token, property_id, viewer_id, "viewer").await?;

    let before = app
        .get(&format!("/api/v1/properties/{property_id}"), Some(&viewer_token))
        .await?;
    assert_eq!(before.status(), StatusCode::OK);

    let revoke = app
        .delete(
            &format!("/api/v1/properties/{property_id}/permissions/{viewer_id}"),
            Some(&owner_token),
        )
        .await?;
    assert_eq!(revoke.status(), StatusCode::OK);

    let after = app
        .get(&format!("/api/v1/properties/{property_id}"), Some(&viewer_token))
        .await?;
    assert_eq!(after.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn only_the_owner_manages_grants() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, owner_token) = app.register_user("owner7@example.com", "password1").await?;
    let (admin_id, admin_token) = app.register_user("admin7@example.com", "password1").await?;
    let (third_id, _) = app.register_user("third7@example.com", "password1").await?;
    let property_id = create_property(&app, &owner_token, "Townhouse").await?;
    grant_role(&app, &owner_token, property_id, admin_id, "admin").await?;

    // Even an admin grant does not confer grant management.
    let response = app
        .post_json(
            &format!("/api/v1/properties/{property_id}/permissions"),
            &json!({ "user_id": third_id, "role": "viewer" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn listing_properties_only_shows_accessible_ones() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, owner_a) = app.register_user("ownera@example.com", "password1").await?;
    let (user_b_id, token_b) = app.register_user("ownerb@example.com", "password1").await?;

    let a1 = create_property(&app, &owner_a, "A One").await?;
    create_property(&app, &owner_a, "A Two").await?;
    let b1 = create_property(&app, &token_b, "B One").await?;
    grant_role(&app, &owner_a, a1, user_b_id, "viewer").await?;

    let response = app.get("/api/v1/properties", Some(&token_b)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_data(response.into_body()).await?;
    let ids: Vec<&str> = data
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();

    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&a1.to_string().as_str()));
    assert!(ids.contains(&b1.to_string().as_str()));

    app.cleanup().await?;
    Ok(())
}
