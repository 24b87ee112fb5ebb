use sqlx::PgPool;

use crate::db::models::{Subject, TeachingAssignment};

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>("SELECT id, name, created_at FROM subjects WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    name: &str,
    created_at: time::PrimitiveDateTime,
) -> Result<Subject, sqlx::Error> {
    sqlx::query_as::<_, Subject>(
        "INSERT INTO subjects (id, name, created_at) VALUES ($1,$2,$3)
         RETURNING id, name, created_at",
    )
    .bind(id)
    .bind(name)
    .bind(created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list(pool: &PgPool) -> Result<Vec<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>("SELECT id, name, created_at FROM subjects ORDER BY name, id")
        .fetch_all(pool)
        .await
}

pub(crate) struct CreateAssignment<'a> {
    pub(crate) id: &'a str,
    pub(crate) teacher_id: &'a str,
    pub(crate) subject_id: &'a str,
    pub(crate) classroom_id: &'a str,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create_assignment(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAssignment<'_>,
) -> Result<TeachingAssignment, sqlx::Error> {
    sqlx::query_as::<_, TeachingAssignment>(
        "INSERT INTO teaching_assignments (
            id, teacher_id, subject_id, classroom_id, is_active, created_at
         ) VALUES ($1,$2,$3,$4,TRUE,$5)
         RETURNING id, teacher_id, subject_id, classroom_id, is_active, created_at",
    )
    .bind(params.id)
    .bind(params.teacher_id)
    .bind(params.subject_id)
    .bind(params.classroom_id)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn has_active_assignment(
    executor: impl sqlx::PgExecutor<'_>,
    teacher_id: &str,
    subject_id: &str,
    classroom_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM teaching_assignments
            WHERE teacher_id = $1 AND subject_id = $2 AND classroom_id = $3 AND is_active
         )",
    )
    .bind(teacher_id)
    .bind(subject_id)
    .bind(classroom_id)
    .fetch_one(executor)
    .await
}
