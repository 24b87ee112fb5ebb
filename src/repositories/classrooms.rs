use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::Classroom;
use crate::services::policy::Scope;

pub(crate) const COLUMNS: &str =
    "c.id, c.name, c.academic_year, c.form_master_id, c.is_active, c.created_at, c.updated_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Classroom>, sqlx::Error> {
    sqlx::query_as::<_, Classroom>(&format!("SELECT {COLUMNS} FROM classrooms c WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) struct CreateClassroom<'a> {
    pub(crate) id: &'a str,
    pub(crate) name: &'a str,
    pub(crate) academic_year: &'a str,
    pub(crate) form_master_id: Option<&'a str>,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateClassroom<'_>,
) -> Result<Classroom, sqlx::Error> {
    sqlx::query_as::<_, Classroom>(&format!(
        "INSERT INTO classrooms AS c (
            id, name, academic_year, form_master_id, is_active, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,TRUE,$5,$5)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.name)
    .bind(params.academic_year)
    .bind(params.form_master_id)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_scoped(
    pool: &PgPool,
    scope: &Scope<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Classroom>, i64), sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM classrooms c WHERE TRUE"));
    scope.push(&mut builder, "c");
    builder.push(" ORDER BY c.academic_year DESC, c.name, c.id OFFSET ");
    builder.push_bind(skip);
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    let items = builder.build_query_as::<Classroom>().fetch_all(pool).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM classrooms c WHERE TRUE");
    scope.push(&mut count, "c");
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    Ok((items, total))
}
