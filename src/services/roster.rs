use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Classroom, Enrollment, Student, Subject, TeachingAssignment, User};
use crate::db::types::UserRole;
use crate::repositories;
use crate::services::alerts::require_active_form_master;
use crate::services::errors::ServiceError;
use crate::services::policy::{Policy, QueryKind};

#[derive(Debug, Clone)]
pub(crate) struct NewUser {
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct UserPatch {
    pub(crate) full_name: Option<String>,
    pub(crate) role: Option<UserRole>,
    pub(crate) is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewClassroom {
    pub(crate) name: String,
    pub(crate) academic_year: String,
    pub(crate) form_master_id: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewAssignment {
    pub(crate) teacher_id: String,
    pub(crate) subject_id: String,
    pub(crate) classroom_id: String,
}

fn conflict_or(err: sqlx::Error, conflict: &str, context: &str) -> ServiceError {
    if crate::db::is_unique_violation(&err) {
        ServiceError::conflict(conflict)
    } else {
        ServiceError::database(err, context)
    }
}

pub(crate) async fn create_user(
    state: &AppState,
    policy: &Policy,
    new_user: NewUser,
) -> Result<User, ServiceError> {
    policy.require_admin()?;

    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            email: &new_user.email,
            full_name: &new_user.full_name,
            role: new_user.role,
            is_active: true,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| conflict_or(e, "A user with this email already exists", "Failed to create user"))?;

    tracing::info!(
        admin_id = %policy.user_id(),
        user_id = %user.id,
        role = user.role.as_str(),
        "User created"
    );
    Ok(user)
}

pub(crate) async fn update_user(
    state: &AppState,
    policy: &Policy,
    user_id: &str,
    patch: UserPatch,
) -> Result<User, ServiceError> {
    policy.require_admin()?;
    if patch.is_active == Some(false) && user_id == policy.user_id() {
        return Err(ServiceError::invariant("Administrators cannot deactivate themselves"));
    }

    repositories::users::find_by_id(state.db(), user_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load user"))?
        .ok_or_else(|| ServiceError::not_found("User not found"))?;

    repositories::users::update(
        state.db(),
        user_id,
        repositories::users::UpdateUser {
            full_name: patch.full_name,
            role: patch.role,
            is_active: patch.is_active,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to update user"))?;

    let updated = repositories::users::find_by_id(state.db(), user_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to reload user"))?
        .ok_or_else(|| ServiceError::not_found("User not found"))?;

    tracing::info!(admin_id = %policy.user_id(), user_id = %updated.id, "User updated");
    Ok(updated)
}

pub(crate) async fn list_users(
    state: &AppState,
    policy: &Policy,
    role: Option<UserRole>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<User>, i64), ServiceError> {
    policy.require_admin()?;
    repositories::users::list(state.db(), role, skip, limit)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to list users"))
}

pub(crate) async fn create_classroom(
    state: &AppState,
    policy: &Policy,
    new_classroom: NewClassroom,
) -> Result<Classroom, ServiceError> {
    policy.require_admin()?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;

    if let Some(form_master_id) = new_classroom.form_master_id.as_deref() {
        require_active_form_master(&mut tx, form_master_id).await?;
    }

    let classroom = repositories::classrooms::create(
        &mut *tx,
        repositories::classrooms::CreateClassroom {
            id: &Uuid::new_v4().to_string(),
            name: &new_classroom.name,
            academic_year: &new_classroom.academic_year,
            form_master_id: new_classroom.form_master_id.as_deref(),
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| {
        conflict_or(
            e,
            "Classroom name is taken for this year or the form master already has a classroom",
            "Failed to create classroom",
        )
    })?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit classroom"))?;
    state.dashboard_cache().invalidate().await;

    tracing::info!(admin_id = %policy.user_id(), classroom_id = %classroom.id, "Classroom created");
    Ok(classroom)
}

pub(crate) async fn list_classrooms(
    state: &AppState,
    policy: &Policy,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Classroom>, i64), ServiceError> {
    repositories::classrooms::list_scoped(
        state.db(),
        &policy.scope(QueryKind::Classrooms),
        skip,
        limit,
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to list classrooms"))
}

pub(crate) async fn create_student(
    state: &AppState,
    policy: &Policy,
    admission_number: &str,
    full_name: &str,
) -> Result<Student, ServiceError> {
    policy.require_admin()?;

    let student = repositories::students::create(
        state.db(),
        repositories::students::CreateStudent {
            id: &Uuid::new_v4().to_string(),
            admission_number,
            full_name,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| {
        conflict_or(e, "Admission number is already in use", "Failed to create student")
    })?;

    state.dashboard_cache().invalidate().await;
    tracing::info!(admin_id = %policy.user_id(), student_id = %student.id, "Student created");
    Ok(student)
}

pub(crate) async fn list_students(
    state: &AppState,
    policy: &Policy,
    classroom_id: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Student>, i64), ServiceError> {
    repositories::students::list_scoped(
        state.db(),
        &policy.scope(QueryKind::Students),
        classroom_id,
        skip,
        limit,
    )
    .await
    .map_err(|e| ServiceError::database(e, "Failed to list students"))
}

/// Enrolls a student for the classroom's academic year.
pub(crate) async fn enroll_student(
    state: &AppState,
    policy: &Policy,
    student_id: &str,
    classroom_id: &str,
) -> Result<Enrollment, ServiceError> {
    policy.require_admin()?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;

    let student = repositories::students::find_by_id(&mut *tx, student_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load student"))?
        .ok_or_else(|| ServiceError::not_found("Student not found"))?;
    let classroom = repositories::classrooms::find_by_id(&mut *tx, classroom_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load classroom"))?
        .ok_or_else(|| ServiceError::not_found("Classroom not found"))?;
    if !student.is_active {
        return Err(ServiceError::invariant("Student is not active"));
    }
    if !classroom.is_active {
        return Err(ServiceError::invariant("Classroom is not active"));
    }

    let enrollment = repositories::enrollments::create(
        &mut *tx,
        repositories::enrollments::CreateEnrollment {
            id: &Uuid::new_v4().to_string(),
            student_id: &student.id,
            classroom_id: &classroom.id,
            academic_year: &classroom.academic_year,
            enrolled_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| {
        conflict_or(
            e,
            "Student is already enrolled for this academic year",
            "Failed to create enrollment",
        )
    })?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit enrollment"))?;
    state.dashboard_cache().invalidate().await;

    tracing::info!(
        admin_id = %policy.user_id(),
        student_id = %enrollment.student_id,
        classroom_id = %enrollment.classroom_id,
        academic_year = %enrollment.academic_year,
        "Student enrolled"
    );
    Ok(enrollment)
}

pub(crate) async fn create_subject(
    state: &AppState,
    policy: &Policy,
    name: &str,
) -> Result<Subject, ServiceError> {
    policy.require_admin()?;

    let subject = repositories::subjects::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        name.trim(),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| conflict_or(e, "Subject already exists", "Failed to create subject"))?;

    tracing::info!(admin_id = %policy.user_id(), subject_id = %subject.id, "Subject created");
    Ok(subject)
}

pub(crate) async fn list_subjects(state: &AppState) -> Result<Vec<Subject>, ServiceError> {
    repositories::subjects::list(state.db())
        .await
        .map_err(|e| ServiceError::database(e, "Failed to list subjects"))
}

pub(crate) async fn create_teaching_assignment(
    state: &AppState,
    policy: &Policy,
    assignment: NewAssignment,
) -> Result<TeachingAssignment, ServiceError> {
    policy.require_admin()?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ServiceError::database(e, "Failed to start transaction"))?;

    repositories::users::find_active_with_role(&mut *tx, &assignment.teacher_id, UserRole::Teacher)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load teacher"))?
        .ok_or_else(|| ServiceError::validation("Assignee must be an active teacher"))?;
    repositories::subjects::find_by_id(&mut *tx, &assignment.subject_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load subject"))?
        .ok_or_else(|| ServiceError::not_found("Subject not found"))?;
    repositories::classrooms::find_by_id(&mut *tx, &assignment.classroom_id)
        .await
        .map_err(|e| ServiceError::database(e, "Failed to load classroom"))?
        .ok_or_else(|| ServiceError::not_found("Classroom not found"))?;

    let created = repositories::subjects::create_assignment(
        &mut *tx,
        repositories::subjects::CreateAssignment {
            id: &Uuid::new_v4().to_string(),
            teacher_id: &assignment.teacher_id,
            subject_id: &assignment.subject_id,
            classroom_id: &assignment.classroom_id,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| {
        conflict_or(e, "Teaching assignment already exists", "Failed to create assignment")
    })?;

    tx.commit().await.map_err(|e| ServiceError::database(e, "Failed to commit assignment"))?;
    state.dashboard_cache().invalidate().await;

    tracing::info!(
        admin_id = %policy.user_id(),
        assignment_id = %created.id,
        teacher_id = %created.teacher_id,
        "Teaching assignment created"
    );
    Ok(created)
}
