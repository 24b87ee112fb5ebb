use crate::db::models::Enrollment;

const COLUMNS: &str = "id, student_id, classroom_id, academic_year, is_active, enrolled_at";

pub(crate) struct CreateEnrollment<'a> {
    pub(crate) id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) classroom_id: &'a str,
    pub(crate) academic_year: &'a str,
    pub(crate) enrolled_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateEnrollment<'_>,
) -> Result<Enrollment, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "INSERT INTO enrollments (
            id, student_id, classroom_id, academic_year, is_active, enrolled_at
         ) VALUES ($1,$2,$3,$4,TRUE,$5)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.student_id)
    .bind(params.classroom_id)
    .bind(params.academic_year)
    .bind(params.enrolled_at)
    .fetch_one(executor)
    .await
}

/// Ids of active students holding an active enrollment in the classroom for `academic_year`.
pub(crate) async fn active_student_ids(
    executor: impl sqlx::PgExecutor<'_>,
    classroom_id: &str,
    academic_year: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT e.student_id
         FROM enrollments e
         JOIN students st ON st.id = e.student_id
         WHERE e.classroom_id = $1 AND e.academic_year = $2
           AND e.is_active AND st.is_active
         ORDER BY e.student_id",
    )
    .bind(classroom_id)
    .bind(academic_year)
    .fetch_all(executor)
    .await
}

/// Form master of the classroom the student is actively enrolled in, newest year first.
pub(crate) async fn find_form_master_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<Option<String>> = sqlx::query_scalar(
        "SELECT c.form_master_id
         FROM enrollments e
         JOIN classrooms c ON c.id = e.classroom_id
         WHERE e.student_id = $1 AND e.is_active AND c.is_active
         ORDER BY e.academic_year DESC
         LIMIT 1",
    )
    .bind(student_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.flatten())
}
