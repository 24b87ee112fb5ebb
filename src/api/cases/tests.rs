use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::test_support::{self, send, School, TestContext};

async fn auto_case(ctx: &TestContext, school: &School) -> Value {
    test_support::record_absences(ctx, school, "2024-09-02", 1).await;
    let token = test_support::bearer_token(&school.form_master.id, ctx.state.settings());
    let (status, listed) = send(ctx, Method::GET, "/api/v1/cases", &token, None).await;
    assert_eq!(status, StatusCode::OK, "response: {listed}");
    assert_eq!(listed["total_count"], 1);
    listed["items"][0].clone()
}

fn case_uri(case: &Value) -> String {
    format!("/api/v1/cases/{}", case["id"].as_str().expect("case id"))
}

#[tokio::test]
async fn closing_the_last_case_resolves_the_alert() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 1).await;
    let first = auto_case(&ctx, &school).await;
    let alert_id = first["alert_id"].as_str().expect("alert id").to_string();
    assert_eq!(first["status"], "open");
    assert_eq!(first["version"], 1);
    assert!(first["created_by"].is_null());

    let settings = ctx.state.settings();
    let admin_token = test_support::bearer_token(&school.admin.id, settings);
    let fm_token = test_support::bearer_token(&school.form_master.id, settings);

    let (status, second) = send(
        &ctx,
        Method::POST,
        "/api/v1/cases",
        &admin_token,
        Some(json!({
            "student_id": school.students[0].id,
            "alert_id": alert_id,
            "assigned_to": school.form_master.id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {second}");

    let close = json!({ "expected_version": 1, "status": "closed", "resolution_notes": "ok" });
    let (status, closed) =
        send(&ctx, Method::PATCH, &case_uri(&first), &fm_token, Some(close.clone())).await;
    assert_eq!(status, StatusCode::OK, "response: {closed}");
    assert_eq!(closed["status"], "closed");
    assert_eq!(closed["version"], 2);
    assert!(closed["closed_at"].is_string());

    let alert_uri = format!("/api/v1/alerts/{alert_id}");
    let (_, alert) = send(&ctx, Method::GET, &alert_uri, &admin_token, None).await;
    assert_eq!(alert["status"], "active");

    let (status, closed) =
        send(&ctx, Method::PATCH, &case_uri(&second), &fm_token, Some(close)).await;
    assert_eq!(status, StatusCode::OK, "response: {closed}");

    let (_, alert) = send(&ctx, Method::GET, &alert_uri, &admin_token, None).await;
    assert_eq!(alert["status"], "resolved");
    assert!(alert["resolved_at"].is_string());

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &case_uri(&second),
        &admin_token,
        Some(json!({ "expected_version": 2, "meeting_notes": "late note" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");
}

#[tokio::test]
async fn stale_case_version_is_rejected() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 1).await;
    let case = auto_case(&ctx, &school).await;
    let uri = case_uri(&case);
    let settings = ctx.state.settings();
    let fm_token = test_support::bearer_token(&school.form_master.id, settings);
    let admin_token = test_support::bearer_token(&school.admin.id, settings);

    for (version, notes) in [(1, "called parent"), (2, "parent replied")] {
        let (status, body) = send(
            &ctx,
            Method::PATCH,
            &uri,
            &fm_token,
            Some(json!({ "expected_version": version, "meeting_notes": notes })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "response: {body}");
        assert_eq!(body["version"], version + 1);
    }

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &admin_token,
        Some(json!({ "expected_version": 2, "follow_up_date": "2024-10-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
    assert_eq!(body["kind"], "conflict");

    let (_, stored) = send(&ctx, Method::GET, &uri, &admin_token, None).await;
    assert_eq!(stored["version"], 3);
    assert_eq!(stored["meeting_notes"], "parent replied");
    assert!(stored["follow_up_date"].is_null());
}

#[tokio::test]
async fn case_version_ahead_of_stored_row_is_rejected() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 1).await;
    let case = auto_case(&ctx, &school).await;
    let uri = case_uri(&case);
    let fm_token = test_support::bearer_token(&school.form_master.id, ctx.state.settings());

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &fm_token,
        Some(json!({ "expected_version": 2, "status": "in_progress", "meeting_notes": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
    assert!(body["detail"].as_str().expect("detail").contains("found 1"));

    let (_, stored) = send(&ctx, Method::GET, &uri, &fm_token, None).await;
    assert_eq!(stored["version"], 1);
    assert_eq!(stored["status"], "open");
    assert!(stored["meeting_notes"].is_null());
}

#[tokio::test]
async fn case_workflow_requires_transition_fields() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 1).await;
    let case = auto_case(&ctx, &school).await;
    let uri = case_uri(&case);
    let settings = ctx.state.settings();
    let fm_token = test_support::bearer_token(&school.form_master.id, settings);
    let admin_token = test_support::bearer_token(&school.admin.id, settings);

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &fm_token,
        Some(json!({ "expected_version": 1, "status": "in_progress" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &admin_token,
        Some(json!({ "expected_version": 1, "status": "in_progress", "meeting_date": "2024-09-05" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let (status, started) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &fm_token,
        Some(json!({ "expected_version": 1, "status": "in_progress", "meeting_date": "2024-09-05" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {started}");
    assert_eq!(started["meeting_date"], "2024-09-05");

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &fm_token,
        Some(json!({ "expected_version": 2, "status": "open" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");

    let (status, escalated) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &fm_token,
        Some(json!({
            "expected_version": 2,
            "status": "escalated_to_admin",
            "escalation_reason": "no contact with family",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {escalated}");
    assert_eq!(escalated["status"], "escalated_to_admin");

    let (status, closed) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &admin_token,
        Some(json!({
            "expected_version": 3,
            "status": "closed",
            "resolution_notes": "transferred to counselling",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {closed}");
}

#[tokio::test]
async fn meetings_and_progress_appear_in_case_detail() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 1).await;
    let case = auto_case(&ctx, &school).await;
    let uri = case_uri(&case);
    let fm_token = test_support::bearer_token(&school.form_master.id, ctx.state.settings());

    let (status, meeting) = send(
        &ctx,
        Method::POST,
        &format!("{uri}/meetings"),
        &fm_token,
        Some(json!({ "meeting_date": "2024-09-06", "notes": "Met with guardian" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {meeting}");
    assert_eq!(meeting["recorded_by"], school.form_master.id.as_str());

    let (status, progress) = send(
        &ctx,
        Method::POST,
        &format!("{uri}/progress"),
        &fm_token,
        Some(json!({ "note": "Attended all week", "progress_status": "improving" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {progress}");

    let (status, body) = send(
        &ctx,
        Method::POST,
        &format!("{uri}/progress"),
        &fm_token,
        Some(json!({ "note": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (status, detail) = send(&ctx, Method::GET, &uri, &fm_token, None).await;
    assert_eq!(status, StatusCode::OK, "response: {detail}");
    assert_eq!(detail["id"], case["id"]);
    assert_eq!(detail["meetings"].as_array().map(Vec::len), Some(1));
    assert_eq!(detail["meetings"][0]["meeting_date"], "2024-09-06");
    assert_eq!(detail["progress_updates"][0]["progress_status"], "improving");
}

#[tokio::test]
async fn teachers_never_see_cases() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 1).await;
    let case = auto_case(&ctx, &school).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());

    let (status, listed) = send(&ctx, Method::GET, "/api/v1/cases", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total_count"], 0);

    let (status, _) = send(&ctx, Method::GET, &case_uri(&case), &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &ctx,
        Method::POST,
        &format!("{}/progress", case_uri(&case)),
        &token,
        Some(json!({ "note": "seen in class" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
