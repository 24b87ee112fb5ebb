use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::Student;
use crate::services::policy::Scope;

const COLUMNS: &str =
    "st.id, st.admission_number, st.full_name, st.is_active, st.created_at, st.updated_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!("SELECT {COLUMNS} FROM students st WHERE st.id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_scoped(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    scope: &Scope<'_>,
) -> Result<Option<Student>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM students st WHERE st.id = "));
    builder.push_bind(id.to_string());
    scope.push(&mut builder, "st");
    builder.build_query_as::<Student>().fetch_optional(executor).await
}

pub(crate) struct CreateStudent<'a> {
    pub(crate) id: &'a str,
    pub(crate) admission_number: &'a str,
    pub(crate) full_name: &'a str,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateStudent<'_>,
) -> Result<Student, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!(
        "INSERT INTO students AS st (
            id, admission_number, full_name, is_active, created_at, updated_at
         ) VALUES ($1,$2,$3,TRUE,$4,$4)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.admission_number)
    .bind(params.full_name)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_scoped(
    pool: &PgPool,
    scope: &Scope<'_>,
    classroom_id: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Student>, i64), sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM students st WHERE TRUE"));
    push_filters(&mut builder, scope, classroom_id);
    builder.push(" ORDER BY st.full_name, st.id OFFSET ");
    builder.push_bind(skip);
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    let items = builder.build_query_as::<Student>().fetch_all(pool).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM students st WHERE TRUE");
    push_filters(&mut count, scope, classroom_id);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    Ok((items, total))
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    scope: &Scope<'_>,
    classroom_id: Option<&str>,
) {
    scope.push(builder, "st");
    if let Some(classroom_id) = classroom_id {
        builder.push(
            " AND EXISTS (SELECT 1 FROM enrollments fe \
             WHERE fe.student_id = st.id AND fe.is_active AND fe.classroom_id = ",
        );
        builder.push_bind(classroom_id.to_string());
        builder.push(")");
    }
}
