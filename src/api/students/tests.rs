use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::db::types::UserRole;
use crate::test_support::{self, send};

#[tokio::test]
async fn history_collects_profile_insights_and_workflow() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 2).await;
    test_support::record_absences(&ctx, &school, "2024-09-02", 1).await;
    test_support::record_absences(&ctx, &school, "2024-09-03", 0).await;

    let token = test_support::bearer_token(&school.form_master.id, ctx.state.settings());
    let uri = format!("/api/v1/students/{}/history", school.students[0].id);
    let (status, history) = send(&ctx, Method::GET, &uri, &token, None).await;
    assert_eq!(status, StatusCode::OK, "response: {history}");

    assert_eq!(history["student"]["admission_number"], "ADM-000");
    assert_eq!(history["risk_profile"]["risk_level"], "medium");
    assert_eq!(history["risk_profile"]["risk_score"], 30.0);
    assert_eq!(history["subject_insights"][0]["total_sessions"], 2);
    assert_eq!(history["subject_insights"][0]["absence_rate"], 50.0);

    let recent = history["recent_attendance"].as_array().expect("recent attendance");
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0]["session_date"], "2024-09-03");
    assert_eq!(recent[0]["status"], "present");
    assert_eq!(recent[0]["subject_name"], "Mathematics");

    assert_eq!(history["alerts"].as_array().map(Vec::len), Some(1));
    assert_eq!(history["cases"].as_array().map(Vec::len), Some(1));

    let teacher_token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());
    let (status, teacher_view) = send(&ctx, Method::GET, &uri, &teacher_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(teacher_view["alerts"].as_array().map(Vec::len), Some(1));
    assert_eq!(teacher_view["cases"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn students_outside_scope_are_not_found() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 1).await;
    let other_fm =
        test_support::insert_user(pool, "fm2@school.test", "Other FM", UserRole::FormMaster).await;
    let token = test_support::bearer_token(&other_fm.id, ctx.state.settings());

    let uri = format!("/api/v1/students/{}/history", school.students[0].id);
    let (status, body) = send(&ctx, Method::GET, &uri, &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");

    let (status, listed) = send(&ctx, Method::GET, "/api/v1/students", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total_count"], 0);

    let (status, _) =
        send(&ctx, Method::GET, "/api/v1/students/missing/history", &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_registers_and_enrolls_students() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 0).await;
    let token = test_support::bearer_token(&school.admin.id, ctx.state.settings());

    let (status, student) = send(
        &ctx,
        Method::POST,
        "/api/v1/students",
        &token,
        Some(json!({ "admission_number": "ADM-100", "full_name": "New Pupil" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {student}");
    assert_eq!(student["is_active"], true);

    let (status, _) = send(
        &ctx,
        Method::POST,
        "/api/v1/students",
        &token,
        Some(json!({ "admission_number": "ADM-100", "full_name": "Twin" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let enroll_uri =
        format!("/api/v1/students/{}/enrollments", student["id"].as_str().expect("id"));
    let payload = json!({ "classroom_id": school.classroom.id });
    let (status, enrollment) =
        send(&ctx, Method::POST, &enroll_uri, &token, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "response: {enrollment}");
    assert_eq!(enrollment["academic_year"], "2026");

    let (status, body) = send(&ctx, Method::POST, &enroll_uri, &token, Some(payload)).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");

    let fm_token = test_support::bearer_token(&school.form_master.id, ctx.state.settings());
    let (status, listed) = send(
        &ctx,
        Method::GET,
        &format!("/api/v1/students?classroom_id={}", school.classroom.id),
        &fm_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total_count"], 1);

    let (status, _) = send(
        &ctx,
        Method::POST,
        "/api/v1/students",
        &fm_token,
        Some(json!({ "admission_number": "ADM-101", "full_name": "Nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
