use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Classroom, Enrollment, Student, Subject, TeachingAssignment, User};
use crate::db::types::UserRole;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UserCreate {
    #[validate(email(message = "email must be a valid address"))]
    pub(crate) email: String,
    #[validate(length(min = 1, max = 200, message = "full_name must be 1 to 200 characters"))]
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UserUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "full_name must be 1 to 200 characters"))]
    pub(crate) full_name: Option<String>,
    #[serde(default)]
    pub(crate) role: Option<UserRole>,
    #[serde(default)]
    pub(crate) is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: String,
}

impl UserResponse {
    pub(crate) fn from_db(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            is_active: user.is_active,
            created_at: format_primitive(user.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ClassroomCreate {
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub(crate) name: String,
    #[validate(length(min = 4, max = 9, message = "academic_year must look like 2024 or 2024-2025"))]
    pub(crate) academic_year: String,
    #[serde(default)]
    pub(crate) form_master_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClassroomResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) academic_year: String,
    pub(crate) form_master_id: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) created_at: String,
}

impl ClassroomResponse {
    pub(crate) fn from_db(classroom: Classroom) -> Self {
        Self {
            id: classroom.id,
            name: classroom.name,
            academic_year: classroom.academic_year,
            form_master_id: classroom.form_master_id,
            is_active: classroom.is_active,
            created_at: format_primitive(classroom.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StudentCreate {
    #[validate(length(min = 1, max = 50, message = "admission_number must be 1 to 50 characters"))]
    pub(crate) admission_number: String,
    #[validate(length(min = 1, max = 200, message = "full_name must be 1 to 200 characters"))]
    pub(crate) full_name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentResponse {
    pub(crate) id: String,
    pub(crate) admission_number: String,
    pub(crate) full_name: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: String,
}

impl StudentResponse {
    pub(crate) fn from_db(student: Student) -> Self {
        Self {
            id: student.id,
            admission_number: student.admission_number,
            full_name: student.full_name,
            is_active: student.is_active,
            created_at: format_primitive(student.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct EnrollmentCreate {
    #[validate(length(min = 1, message = "classroom_id must not be empty"))]
    pub(crate) classroom_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct EnrollmentResponse {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) classroom_id: String,
    pub(crate) academic_year: String,
    pub(crate) is_active: bool,
    pub(crate) enrolled_at: String,
}

impl EnrollmentResponse {
    pub(crate) fn from_db(enrollment: Enrollment) -> Self {
        Self {
            id: enrollment.id,
            student_id: enrollment.student_id,
            classroom_id: enrollment.classroom_id,
            academic_year: enrollment.academic_year,
            is_active: enrollment.is_active,
            enrolled_at: format_primitive(enrollment.enrolled_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubjectCreate {
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub(crate) name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubjectResponse {
    pub(crate) id: String,
    pub(crate) name: String,
}

impl SubjectResponse {
    pub(crate) fn from_db(subject: Subject) -> Self {
        Self { id: subject.id, name: subject.name }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignmentCreate {
    #[validate(length(min = 1, message = "teacher_id must not be empty"))]
    pub(crate) teacher_id: String,
    #[validate(length(min = 1, message = "subject_id must not be empty"))]
    pub(crate) subject_id: String,
    #[validate(length(min = 1, message = "classroom_id must not be empty"))]
    pub(crate) classroom_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) teacher_id: String,
    pub(crate) subject_id: String,
    pub(crate) classroom_id: String,
    pub(crate) is_active: bool,
}

impl AssignmentResponse {
    pub(crate) fn from_db(assignment: TeachingAssignment) -> Self {
        Self {
            id: assignment.id,
            teacher_id: assignment.teacher_id,
            subject_id: assignment.subject_id,
            classroom_id: assignment.classroom_id,
            is_active: assignment.is_active,
        }
    }
}
