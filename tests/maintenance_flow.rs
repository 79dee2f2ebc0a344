mod common;

use anyhow::{ensure, Result};
use axum::http::StatusCode;
use chrono::{Duration, NaiveDate, Utc};
use common::{acquire_db_lock, body_data, TestApp};
use serde_json::json;

async fn setup_property(app: &TestApp, email: &str) -> Result<(String, String)> {
    let (_, token) = app.register_user(email, "password1").await?;
    let response = app
        .post_json(
            "/api/v1/properties",
            &json!({ "name": "Maintained Manor", "address": "7 Gutter Way" }),
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

#[tokio::test]
async fn creating_a_schedule_computes_the_first_due_date() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "mt1@example.com").await?;

    let response = app
        .post_json(
            "/api/v1/maintenance-schedules",
            &json!({
                "property_id": property_id,
                "title": "Gutter cleaning",
                "frequency": "monthly",
                "start_date": "2026-01-15",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let schedule = body_data(response.into_body()).await?;
    assert_eq!(schedule["next_due_date"], json!("2026-02-15"));
    assert_eq!(schedule["is_active"], json!(true));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn as_needed_schedules_have_no_due_date() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "mt2@example.com").await?;

    let response = app
        .post_json(
            "/api/v1/maintenance-schedules",
            &json!({
                "property_id": property_id,
                "title": "Filter check",
                "frequency": "as_needed",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let schedule = body_data(response.into_body()).await?;
    assert!(schedule["next_due_date"].is_null());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_frequency_is_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "mt3@example.com").await?;

    let response = app
        .post_json(
            "/api/v1/maintenance-schedules",
            &json!({
                "property_id": property_id,
                "title": "Chimney sweep",
                "frequency": "fortnightly",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn completing_rolls_the_schedule_forward_and_records_history() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "mt4@example.com").await?;

    let created = app
        .post_json(
            "/api/v1/maintenance-schedules",
            &json!({
                "property_id": property_id,
                "title": "HVAC service",
                "frequency": "quarterly",
                "start_date": "2026-01-01",
            }),
            Some(&token),
        )
        .await?;
    let schedule_id = body_data(created.into_body()).await?["id"]
        .as_str()
        .unwrap()
        .to_string();

    let completed = app
        .post_json(
            &format!("/api/v1/maintenance-schedules/{schedule_id}/complete"),
            &json!({
                "completed_date": "2026-04-10",
                "notes": "replaced filter",
                "actual_duration_minutes": 45,
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(completed.status(), StatusCode::CREATED);
    let data = body_data(completed.into_body()).await?;
    assert_eq!(data["record"]["completed_date"], json!("2026-04-10"));
    assert_eq!(data["schedule"]["last_completed_date"], json!("2026-04-10"));
    // Next due rolls from the completion date, not the old due date.
    assert_eq!(data["schedule"]["next_due_date"], json!("2026-07-10"));

    let history = app
        .get(
            &format!("/api/v1/maintenance-schedules/{schedule_id}/history"),
            Some(&token),
        )
        .await?;
    assert_eq!(history.status(), StatusCode::OK);
    let records = body_data(history.into_body()).await?;
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["notes"], json!("replaced filter"));
    assert_eq!(records[0]["actual_duration_minutes"], json!(45));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn due_listing_only_returns_schedules_at_or_past_the_horizon() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "mt5@example.com").await?;

    let today = Utc::now().date_naive();
    let overdue_start = today - Duration::days(40);
    let far_start = today + Duration::days(300);

    // Monthly from 40 days ago: due date is in the past.
    app.post_json(
        "/api/v1/maintenance-schedules",
        &json!({
            "property_id": property_id,
            "title": "Overdue job",
            "frequency": "monthly",
            "start_date": overdue_start.format("%Y-%m-%d").to_string(),
        }),
        Some(&token),
    )
    .await?;

    // Monthly from far in the future: not due.
    app.post_json(
        "/api/v1/maintenance-schedules",
        &json!({
            "property_id": property_id,
            "title": "Future job",
            "frequency": "monthly",
            "start_date": far_start.format("%Y-%m-%d").to_string(),
        }),
        Some(&token),
    )
    .await?;

    let due = app
        .get("/api/v1/maintenance-schedules/due", Some(&token))
        .await?;
    assert_eq!(due.status(), StatusCode::OK);
    let data = body_data(due.into_body()).await?;
    let titles: Vec<&str> = data
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert!(titles.contains(&"Overdue job"));
    assert!(!titles.contains(&"Future job"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn viewer_cannot_manage_maintenance() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (owner_token, property_id) = setup_property(&app, "mt6@example.com").await?;
    let (viewer_id, viewer_token) = app.register_user("mt6b@example.com", "password1").await?;

    let grant = app
        .post_json(
            &format!("/api/v1/properties/{property_id}/permissions"),
            &json!({ "user_id": viewer_id, "role": "viewer" }),
            Some(&owner_token),
        )
        .await?;
    assert_eq!(grant.status(), StatusCode::CREATED);

    let create = app
        .post_json(
            "/api/v1/maintenance-schedules",
            &json!({
                "property_id": property_id,
                "title": "Lawn care",
                "frequency": "weekly",
            }),
            Some(&viewer_token),
        )
        .await?;
    assert_eq!(create.status(), StatusCode::FORBIDDEN);

    // But viewing is fine.
    let list = app
        .get(
            &format!("/api/v1/maintenance-schedules?property_id={property_id}"),
            Some(&viewer_token),
        )
        .await?;
    assert_eq!(list.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn frequency_multiplier_scales_the_interval() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "mt7@example.com").await?;

    let response = app
        .post_json(
            "/api/v1/maintenance-schedules",
            &json!({
                "property_id": property_id,
                "title": "Deep clean",
                "frequency": "weekly",
                "frequency_multiplier": 2,
                "start_date": "2026-03-01",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let schedule = body_data(response.into_body()).await?;
    let expected = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
    assert_eq!(
        schedule["next_due_date"],
        json!(expected.format("%Y-%m-%d").to_string())
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn explicit_next_due_date_wins_over_recurrence() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "mt8@example.com").await?;

    let created = app
        .post_json(
            "/api/v1/maintenance-schedules",
            &json!({
                "property_id": property_id,
                "title": "Roof inspection",
                "frequency": "monthly",
                "start_date": "2026-01-15",
                "next_due_date": "2030-12-25",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let schedule = body_data(created.into_body()).await?;
    assert_eq!(schedule["next_due_date"], json!("2030-12-25"));
    let schedule_id = schedule["id"].as_str().unwrap().to_string();

    let completed = app
        .post_json(
            &format!("/api/v1/maintenance-schedules/{schedule_id}/complete"),
            &json!({
                "completed_date": "2026-04-10",
                "next_due_date": "2031-01-01",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(completed.status(), StatusCode::CREATED);
    let data = body_data(completed.into_body()).await?;
    assert_eq!(data["schedule"]["next_due_date"], json!("2031-01-01"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn list_filters_and_pagination_parse_from_the_query_string() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, property_id) = setup_property(&app, "mt9@example.com").await?;

    for title in ["Active job", "Dormant job"] {
        app.post_json(
            "/api/v1/maintenance-schedules",
            &json!({
                "property_id": property_id,
                "title": title,
                "frequency": "monthly",
            }),
            Some(&token),
        )
        .await?;
    }

    let list = app
        .get(
            &format!("/api/v1/maintenance-schedules?property_id={property_id}&page=1&limit=10"),
            Some(&token),
        )
        .await?;
    assert_eq!(list.status(), StatusCode::OK);
    let rows = body_data(list.into_body()).await?;
    let dormant_id = rows
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["title"] == json!("Dormant job"))
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let deactivate = app
        .put_json(
            &format!("/api/v1/maintenance-schedules/{dormant_id}"),
            &json!({ "is_active": false }),
            Some(&token),
        )
        .await?;
    assert_eq!(deactivate.status(), StatusCode::OK);

    let active_only = app
        .get(
            &format!(
                "/api/v1/maintenance-schedules?property_id={property_id}&is_active=true&page=1&limit=5"
            ),
            Some(&token),
        )
        .await?;
    assert_eq!(active_only.status(), StatusCode::OK);
    let rows = body_data(active_only.into_body()).await?;
    let titles: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Active job"]);

    app.cleanup().await?;
    Ok(())
}
