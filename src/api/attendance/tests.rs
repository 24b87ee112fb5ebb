use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

use crate::db::types::UserRole;
use crate::test_support::{self, School, TestContext};

const SESSIONS: &str = "/api/v1/attendance/sessions";

async fn submit(ctx: &TestContext, token: &str, payload: Value) -> (StatusCode, Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::POST, SESSIONS, Some(token), Some(payload)))
        .await
        .expect("record session");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

fn session_payload(school: &School, subject_id: &str, date: &str, statuses: &[&str]) -> Value {
    let records: Vec<Value> = school
        .students
        .iter()
        .zip(statuses)
        .map(|(student, status)| json!({ "student_id": student.id, "status": status }))
        .collect();
    json!({
        "classroom_id": school.classroom.id,
        "subject_id": subject_id,
        "session_date": date,
        "records": records,
    })
}

async fn active_alerts(pool: &PgPool, student_id: &str, alert_type: &str) -> Vec<(Option<String>,)> {
    sqlx::query_as(
        "SELECT subject_id FROM alerts
         WHERE student_id = $1 AND alert_type::text = $2 AND status = 'active'",
    )
    .bind(student_id)
    .bind(alert_type)
    .fetch_all(pool)
    .await
    .expect("active alerts")
}

#[tokio::test]
async fn single_absence_opens_alert_and_case() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 3).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());

    let (status, body) = submit(
        &ctx,
        &token,
        session_payload(&school, &school.subject.id, "2024-09-02", &["present", "present", "absent"]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["record_count"], 3);
    assert_eq!(body["students_assessed"], 3);
    assert_eq!(body["alerts_created"], 1);
    assert_eq!(body["cases_created"], 1);
    assert_eq!(body["session"]["session_date"], "2024-09-02");

    let absent = &school.students[2];
    let (total, absences, rate): (i32, i32, f64) = sqlx::query_as(
        "SELECT total_sessions, absence_count, absence_rate FROM subject_risk_insights
         WHERE student_id = $1 AND subject_id = $2",
    )
    .bind(&absent.id)
    .bind(&school.subject.id)
    .fetch_one(pool)
    .await
    .expect("insight");
    assert_eq!((total, absences, rate), (1, 1, 100.0));

    let (score, level): (f64, String) = sqlx::query_as(
        "SELECT risk_score, risk_level::text FROM student_risk_profiles WHERE student_id = $1",
    )
    .bind(&absent.id)
    .fetch_one(pool)
    .await
    .expect("profile");
    assert_eq!(score, 71.0);
    assert_eq!(level, "high");

    let alerts = active_alerts(pool, &absent.id, "attendance").await;
    assert_eq!(alerts, vec![(Some(school.subject.id.clone()),)]);

    let (assigned_to, alert_id): (String, Option<String>) = sqlx::query_as(
        "SELECT assigned_to, alert_id FROM intervention_cases WHERE student_id = $1",
    )
    .bind(&absent.id)
    .fetch_one(pool)
    .await
    .expect("auto case");
    assert_eq!(assigned_to, school.form_master.id);
    assert!(alert_id.is_some());

    let (present_level,): (String,) = sqlx::query_as(
        "SELECT risk_level::text FROM student_risk_profiles WHERE student_id = $1",
    )
    .bind(&school.students[0].id)
    .fetch_one(pool)
    .await
    .expect("present profile");
    assert_eq!(present_level, "low");
}

#[tokio::test]
async fn duplicate_session_is_a_conflict_and_leaves_risk_untouched() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 3).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());
    let payload =
        session_payload(&school, &school.subject.id, "2024-09-02", &["present", "present", "absent"]);

    let (status, _) = submit(&ctx, &token, payload.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let before: Vec<(String, f64)> = sqlx::query_as(
        "SELECT student_id, risk_score FROM student_risk_profiles ORDER BY student_id",
    )
    .fetch_all(pool)
    .await
    .expect("profiles");

    let (status, body) = submit(&ctx, &token, payload).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
    assert_eq!(body["kind"], "conflict");

    let after: Vec<(String, f64)> = sqlx::query_as(
        "SELECT student_id, risk_score FROM student_risk_profiles ORDER BY student_id",
    )
    .fetch_all(pool)
    .await
    .expect("profiles");
    assert_eq!(before, after);

    let (sessions, records): (i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM attendance_sessions), (SELECT COUNT(*) FROM attendance_records)",
    )
    .fetch_one(pool)
    .await
    .expect("counts");
    assert_eq!((sessions, records), (1, 3));
}

#[tokio::test]
async fn concurrent_duplicate_sessions_commit_once() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 2).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());
    let payload = session_payload(&school, &school.subject.id, "2024-09-03", &["absent", "present"]);

    let first = ctx.app.clone().oneshot(test_support::json_request(
        Method::POST,
        SESSIONS,
        Some(&token),
        Some(payload.clone()),
    ));
    let second = ctx.app.clone().oneshot(test_support::json_request(
        Method::POST,
        SESSIONS,
        Some(&token),
        Some(payload),
    ));
    let (first, second) = tokio::join!(first, second);

    let mut statuses =
        vec![first.expect("first").status().as_u16(), second.expect("second").status().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, vec![201, 409]);

    let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_sessions")
        .fetch_one(ctx.state.db())
        .await
        .expect("session count");
    assert_eq!(sessions, 1);
}

type RiskSnapshot = (
    Vec<(String, f64, String)>,
    Vec<(String, String, i32, i32, i32, f64)>,
    Vec<(String, String, Option<String>, String)>,
);

async fn risk_snapshot(pool: &PgPool) -> RiskSnapshot {
    let profiles = sqlx::query_as(
        "SELECT s.admission_number, p.risk_score, p.risk_level::text
         FROM student_risk_profiles p JOIN students s ON s.id = p.student_id
         ORDER BY s.admission_number",
    )
    .fetch_all(pool)
    .await
    .expect("profiles");
    let insights = sqlx::query_as(
        "SELECT s.admission_number, sub.name, i.total_sessions, i.absence_count,
                i.late_count, i.absence_rate
         FROM subject_risk_insights i
         JOIN students s ON s.id = i.student_id
         JOIN subjects sub ON sub.id = i.subject_id
         ORDER BY s.admission_number, sub.name",
    )
    .fetch_all(pool)
    .await
    .expect("insights");
    let alerts = sqlx::query_as(
        "SELECT s.admission_number, a.alert_type::text, sub.name, a.risk_level::text
         FROM alerts a
         JOIN students s ON s.id = a.student_id
         LEFT JOIN subjects sub ON sub.id = a.subject_id
         WHERE a.status = 'active'
         ORDER BY s.admission_number, a.alert_type::text, sub.name",
    )
    .fetch_all(pool)
    .await
    .expect("alerts");
    (profiles, insights, alerts)
}

/// Four sequential days of Mathematics and English, then a fifth day whose two
/// sessions are either submitted together or one after the other.
async fn two_subject_week(ctx: &TestContext, together: bool) -> RiskSnapshot {
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 3).await;
    let english = test_support::insert_subject(pool, "English").await;
    test_support::assign(pool, &school.teacher.id, &english.id, &school.classroom.id).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());
    let statuses = ["absent", "absent", "present"];
    let english_statuses = ["absent", "late", "present"];

    for day in 2..=5 {
        let date = format!("2024-09-{day:02}");
        for (subject_id, marks) in [(&school.subject.id, &statuses), (&english.id, &english_statuses)] {
            let (status, body) =
                submit(ctx, &token, session_payload(&school, subject_id, &date, marks)).await;
            assert_eq!(status, StatusCode::CREATED, "{date}: {body}");
        }
    }

    let maths = session_payload(&school, &school.subject.id, "2024-09-06", &statuses);
    let english = session_payload(&school, &english.id, "2024-09-06", &english_statuses);
    let (first, second) = if together {
        tokio::join!(submit(ctx, &token, maths), submit(ctx, &token, english))
    } else {
        let first = submit(ctx, &token, maths).await;
        (first, submit(ctx, &token, english).await)
    };
    assert_eq!(first.0, StatusCode::CREATED, "maths: {}", first.1);
    assert_eq!(second.0, StatusCode::CREATED, "english: {}", second.1);

    risk_snapshot(pool).await
}

#[tokio::test]
async fn overlapping_subject_sessions_match_sequential_replay() {
    let ctx = test_support::setup_test_context().await;
    let together = two_subject_week(&ctx, true).await;

    test_support::reset_db(ctx.state.db()).await.expect("reset db");
    let sequential = two_subject_week(&ctx, false).await;

    assert_eq!(together, sequential);

    let (_, insights, alerts) = &together;
    for (admission, subject, total, _, _, _) in insights {
        assert_eq!(*total, 5, "{admission} {subject}");
    }
    let full_day: Vec<&String> = alerts
        .iter()
        .filter(|(_, alert_type, _, _)| alert_type == "full_day_absence")
        .map(|(admission, _, _, _)| admission)
        .collect();
    assert_eq!(full_day, vec!["ADM-000"]);
}

#[tokio::test]
async fn repeated_absences_refresh_one_subject_alert() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 2).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());

    for day in 2..=8 {
        let date = format!("2024-09-{day:02}");
        let (status, body) = submit(
            &ctx,
            &token,
            session_payload(&school, &school.subject.id, &date, &["absent", "present"]),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "day {date}: {body}");
    }

    let streaker = &school.students[0];
    let alerts = active_alerts(pool, &streaker.id, "attendance").await;
    assert_eq!(alerts.len(), 1, "one active attendance alert per student and subject");

    let (level,): (String,) = sqlx::query_as(
        "SELECT risk_level::text FROM alerts
         WHERE student_id = $1 AND alert_type = 'attendance' AND status = 'active'",
    )
    .bind(&streaker.id)
    .fetch_one(pool)
    .await
    .expect("alert level");
    assert_eq!(level, "critical");

    let (score,): (f64,) =
        sqlx::query_as("SELECT risk_score FROM student_risk_profiles WHERE student_id = $1")
            .bind(&streaker.id)
            .fetch_one(pool)
            .await
            .expect("profile");
    assert_eq!(score, 100.0);

    assert!(active_alerts(pool, &school.students[1].id, "attendance").await.is_empty());
}

#[tokio::test]
async fn five_absent_days_raise_full_day_alert() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 3).await;
    let english = test_support::insert_subject(pool, "English").await;
    test_support::assign(pool, &school.teacher.id, &english.id, &school.classroom.id).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());

    for day in 2..=6 {
        let date = format!("2024-09-{day:02}");
        for subject_id in [&school.subject.id, &english.id] {
            let (status, body) = submit(
                &ctx,
                &token,
                session_payload(&school, subject_id, &date, &["present", "absent", "late"]),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED, "{date}: {body}");
        }
    }

    let absent = &school.students[1];
    let full_day = active_alerts(pool, &absent.id, "full_day_absence").await;
    assert_eq!(full_day, vec![(None,)]);
    assert_eq!(active_alerts(pool, &absent.id, "attendance").await.len(), 2);

    let late = &school.students[2];
    assert!(active_alerts(pool, &late.id, "full_day_absence").await.is_empty());
    let (late_count,): (i32,) = sqlx::query_as(
        "SELECT late_count FROM subject_risk_insights WHERE student_id = $1 AND subject_id = $2",
    )
    .bind(&late.id)
    .bind(&english.id)
    .fetch_one(pool)
    .await
    .expect("late insight");
    assert_eq!(late_count, 5);
}

#[tokio::test]
async fn records_must_cover_the_whole_roster() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 3).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());

    let partial = json!({
        "classroom_id": school.classroom.id,
        "subject_id": school.subject.id,
        "session_date": "2024-09-02",
        "records": [
            { "student_id": school.students[0].id, "status": "present" },
            { "student_id": school.students[1].id, "status": "present" },
        ],
    });
    let (status, body) = submit(&ctx, &token, partial).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");
    assert_eq!(body["kind"], "invariant_violation");

    let outsider = test_support::insert_student(pool, "ADM-999", "Outsider").await;
    let mut extra = session_payload(&school, &school.subject.id, "2024-09-02", &["present"; 3]);
    extra["records"]
        .as_array_mut()
        .expect("records")
        .push(json!({ "student_id": outsider.id, "status": "absent" }));
    let (status, _) = submit(&ctx, &token, extra).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let bad_status =
        session_payload(&school, &school.subject.id, "2024-09-02", &["present", "asleep", "late"]);
    let (status, body) = submit(&ctx, &token, bad_status).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_sessions")
        .fetch_one(pool)
        .await
        .expect("session count");
    assert_eq!(sessions, 0);
}

#[tokio::test]
async fn future_dates_are_rejected_by_default() {
    let ctx = test_support::setup_test_context().await;
    let school = test_support::seed_school(ctx.state.db(), 1).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());

    let tomorrow = crate::core::time::today_utc() + time::Duration::days(1);
    let date = crate::core::time::format_date(tomorrow);
    let (status, body) =
        submit(&ctx, &token, session_payload(&school, &school.subject.id, &date, &["present"]))
            .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn only_the_assigned_teacher_records() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 2).await;
    let stranger =
        test_support::insert_user(pool, "other.teacher@school.test", "Other", UserRole::Teacher)
            .await;
    let payload = session_payload(&school, &school.subject.id, "2024-09-02", &["present", "absent"]);

    let token = test_support::bearer_token(&stranger.id, ctx.state.settings());
    let (status, body) = submit(&ctx, &token, payload.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let token = test_support::bearer_token(&school.form_master.id, ctx.state.settings());
    let (status, _) = submit(&ctx, &token, payload).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_list_follows_scope() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let school = test_support::seed_school(pool, 2).await;
    let token = test_support::bearer_token(&school.teacher.id, ctx.state.settings());
    let (status, _) = submit(
        &ctx,
        &token,
        session_payload(&school, &school.subject.id, "2024-09-02", &["present", "absent"]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let stranger =
        test_support::insert_user(pool, "other.teacher@school.test", "Other", UserRole::Teacher)
            .await;

    for (user_id, expected) in
        [(&school.teacher.id, 1), (&school.form_master.id, 1), (&school.admin.id, 1), (&stranger.id, 0)]
    {
        let token = test_support::bearer_token(user_id, ctx.state.settings());
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::GET, SESSIONS, Some(&token), None))
            .await
            .expect("list sessions");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["total_count"], expected, "user {user_id}: {body}");
        if expected == 1 {
            assert_eq!(body["items"][0]["record_count"], 2);
            assert_eq!(body["items"][0]["absent_count"], 1);
        }
    }
}
