mod common;

use anyhow::{ensure, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, body_data, body_to_json, TestApp};
use serde_json::json;
use uuid::Uuid;

async fn setup_task(app: &TestApp, email: &str) -> Result<(String, Uuid)> {
    let (_, token) = app.register_user(email, "password1").await?;
    let property = app
        .post_json(
            "/api/v1/properties",
            &json!({ "name": "Timer House", "address": "4 Clock Ln" }),
            Some(&token),
        )
        .await?;
    ensure!(property.status() == StatusCode::CREATED, "property setup failed");
    let property_id = body_data(property.into_body()).await?["id"]
        .as_str()
        .unwrap()
        .to_string();

    let project = app
        .post_json(
            "/api/v1/projects",
            &json!({
                "property_id": property_id,
                "title": "Timed work",
                "tasks": [{ "title": "Measure twice" }],
            }),
            Some(&token),
        )
        .await?;
    ensure!(project.status() == StatusCode::CREATED, "project setup failed");
    let data = body_data(project.into_body()).await?;
    let task_id = data["tasks"][0]["id"].as_str().unwrap().parse()?;
    Ok((token, task_id))
}

#[tokio::test]
async fn start_and_stop_records_a_session() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, task_id) = setup_task(&app, "tt1@example.com").await?;

    let start = app
        .post_json(
            &format!("/api/v1/tasks/{task_id}/time-tracking/start"),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(start.status(), StatusCode::CREATED);
    let session = body_data(start.into_body()).await?;
    assert_eq!(session["is_active"], json!(true));
    assert!(session["ended_at"].is_null());

    let stop = app
        .post_json(
            &format!("/api/v1/tasks/{task_id}/time-tracking/stop"),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(stop.status(), StatusCode::OK);
    let session = body_data(stop.into_body()).await?;
    assert_eq!(session["is_active"], json!(false));
    assert!(!session["ended_at"].is_null());
    // Sub-minute sessions floor to zero.
    assert_eq!(session["duration_minutes"], json!(0));

    let summary = app
        .get(&format!("/api/v1/tasks/{task_id}/time-tracking"), Some(&token))
        .await?;
    assert_eq!(summary.status(), StatusCode::OK);
    let data = body_data(summary.into_body()).await?;
    assert_eq!(data["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(data["total_minutes"], json!(0));
    assert_eq!(data["has_active_session"], json!(false));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn one_active_session_per_user_across_all_tasks() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, task_id) = setup_task(&app, "tt2@example.com").await?;

    // Second task in the same project.
    let response = app
        .get(&format!("/api/v1/tasks/{task_id}"), Some(&token))
        .await?;
    let project_id = body_data(response.into_body()).await?["task"]["project_id"]
        .as_str()
        .unwrap()
        .to_string();
    let second = app
        .post_json(
            &format!("/api/v1/projects/{project_id}/tasks"),
            &json!({ "title": "Cut once" }),
            Some(&token),
        )
        .await?;
    assert_eq!(second.status(), StatusCode::CREATED);
    let second_id = body_data(second.into_body()).await?["id"]
        .as_str()
        .unwrap()
        .to_string();

    let first_start = app
        .post_json(
            &format!("/api/v1/tasks/{task_id}/time-tracking/start"),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(first_start.status(), StatusCode::CREATED);

    // A second start is rejected even on a different task.
    let second_start = app
        .post_json(
            &format!("/api/v1/tasks/{second_id}/time-tracking/start"),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(second_start.status(), StatusCode::BAD_REQUEST);
    let body = body_to_json(second_start.into_body()).await?;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("already active"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn stopping_without_an_active_session_fails() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, task_id) = setup_task(&app, "tt3@example.com").await?;

    let stop = app
        .post_json(
            &format!("/api/v1/tasks/{task_id}/time-tracking/stop"),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(stop.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn sessions_are_per_user() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (owner_token, task_id) = setup_task(&app, "tt4@example.com").await?;
    let (helper_id, helper_token) = app.register_user("tt4b@example.com", "password1").await?;

    let assign = app
        .put_json(
            &format!("/api/v1/tasks/{task_id}"),
            &json!({ "assigned_to": helper_id }),
            Some(&owner_token),
        )
        .await?;
    assert_eq!(assign.status(), StatusCode::OK);

    let owner_start = app
        .post_json(
            &format!("/api/v1/tasks/{task_id}/time-tracking/start"),
            &json!({}),
            Some(&owner_token),
        )
        .await?;
    assert_eq!(owner_start.status(), StatusCode::CREATED);

    // The helper's timer is independent of the owner's.
    let helper_start = app
        .post_json(
            &format!("/api/v1/tasks/{task_id}/time-tracking/start"),
            &json!({}),
            Some(&helper_token),
        )
        .await?;
    assert_eq!(helper_start.status(), StatusCode::CREATED);

    let helper_stop = app
        .post_json(
            &format!("/api/v1/tasks/{task_id}/time-tracking/stop"),
            &json!({}),
            Some(&helper_token),
        )
        .await?;
    assert_eq!(helper_stop.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}
