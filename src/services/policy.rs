use sqlx::{Postgres, QueryBuilder};

use crate::db::models::User;
use crate::db::types::UserRole;
use crate::services::errors::ServiceError;

/// The authenticated principal, computed once per request.
#[derive(Debug, Clone)]
pub(crate) struct Policy {
    user_id: String,
    role: UserRole,
}

/// Read paths that carry a role-scoped base filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryKind {
    Classrooms,
    Students,
    Sessions,
    Alerts,
    Cases,
}

/// Base filter for one query kind. Rendered as an `AND (...)` suffix so callers
/// compose it with their own predicates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    kind: QueryKind,
    role: UserRole,
    user_id: &'a str,
}

impl Policy {
    pub(crate) fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self { user_id: user_id.into(), role }
    }

    pub(crate) fn for_user(user: &User) -> Self {
        Self::new(user.id.clone(), user.role)
    }

    pub(crate) fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn role(&self) -> UserRole {
        self.role
    }

    pub(crate) fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub(crate) fn require_admin(&self) -> Result<(), ServiceError> {
        self.require_role(UserRole::Admin, "Admin access required")
    }

    pub(crate) fn require_role(&self, role: UserRole, message: &str) -> Result<(), ServiceError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ServiceError::forbidden(message))
        }
    }

    pub(crate) fn scope(&self, kind: QueryKind) -> Scope<'_> {
        Scope { kind, role: self.role, user_id: &self.user_id }
    }
}

impl Scope<'_> {
    pub(crate) fn is_unrestricted(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Appends the visibility predicate for rows aliased as `alias`.
    pub(crate) fn push(&self, builder: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        let user_id = self.user_id.to_string();
        match (self.role, self.kind) {
            (UserRole::Admin, _) => {}

            (UserRole::FormMaster, QueryKind::Classrooms) => {
                builder.push(format!(" AND {alias}.form_master_id = "));
                builder.push_bind(user_id);
            }
            (UserRole::FormMaster, QueryKind::Students) => {
                builder.push(format!(
                    " AND EXISTS (SELECT 1 FROM enrollments se \
                     JOIN classrooms sc ON sc.id = se.classroom_id \
                     WHERE se.student_id = {alias}.id AND se.is_active \
                     AND sc.form_master_id = "
                ));
                builder.push_bind(user_id);
                builder.push(")");
            }
            (UserRole::FormMaster, QueryKind::Sessions) => {
                builder.push(format!(
                    " AND EXISTS (SELECT 1 FROM classrooms sc \
                     WHERE sc.id = {alias}.classroom_id AND sc.form_master_id = "
                ));
                builder.push_bind(user_id);
                builder.push(")");
            }
            (UserRole::FormMaster, QueryKind::Alerts | QueryKind::Cases) => {
                builder.push(format!(" AND {alias}.assigned_to = "));
                builder.push_bind(user_id);
            }

            (UserRole::Teacher, QueryKind::Classrooms) => {
                builder.push(format!(
                    " AND EXISTS (SELECT 1 FROM teaching_assignments sta \
                     WHERE sta.classroom_id = {alias}.id AND sta.is_active \
                     AND sta.teacher_id = "
                ));
                builder.push_bind(user_id);
                builder.push(")");
            }
            (UserRole::Teacher, QueryKind::Students) => {
                builder.push(format!(
                    " AND EXISTS (SELECT 1 FROM enrollments se \
                     JOIN teaching_assignments sta ON sta.classroom_id = se.classroom_id \
                     WHERE se.student_id = {alias}.id AND se.is_active AND sta.is_active \
                     AND sta.teacher_id = "
                ));
                builder.push_bind(user_id);
                builder.push(")");
            }
            (UserRole::Teacher, QueryKind::Sessions) => {
                builder.push(format!(" AND {alias}.recorded_by = "));
                builder.push_bind(user_id);
            }
            (UserRole::Teacher, QueryKind::Alerts) => {
                // Subject alerts for students the teacher teaches that subject to.
                builder.push(format!(
                    " AND EXISTS (SELECT 1 FROM teaching_assignments sta \
                     JOIN enrollments se ON se.classroom_id = sta.classroom_id AND se.is_active \
                     WHERE sta.is_active AND sta.subject_id = {alias}.subject_id \
                     AND se.student_id = {alias}.student_id AND sta.teacher_id = "
                ));
                builder.push_bind(user_id);
                builder.push(")");
            }
            (UserRole::Teacher, QueryKind::Cases) => {
                builder.push(" AND FALSE");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlx::{Postgres, QueryBuilder};

    use super::{Policy, QueryKind};
    use crate::db::types::UserRole;

    fn render(policy: &Policy, kind: QueryKind, alias: &str) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM t WHERE TRUE");
        policy.scope(kind).push(&mut builder, alias);
        builder.sql().to_string()
    }

    #[test]
    fn admin_scope_adds_nothing() {
        let policy = Policy::new("admin-1", UserRole::Admin);
        for kind in [
            QueryKind::Classrooms,
            QueryKind::Students,
            QueryKind::Sessions,
            QueryKind::Alerts,
            QueryKind::Cases,
        ] {
            assert_eq!(render(&policy, kind, "x"), "SELECT 1 FROM t WHERE TRUE");
            assert!(policy.scope(kind).is_unrestricted());
        }
    }

    #[test]
    fn form_master_sees_assigned_alerts_and_cases() {
        let policy = Policy::new("fm-1", UserRole::FormMaster);
        assert!(render(&policy, QueryKind::Alerts, "a").ends_with("AND a.assigned_to = $1"));
        assert!(render(&policy, QueryKind::Cases, "ic").ends_with("AND ic.assigned_to = $1"));
        assert!(render(&policy, QueryKind::Classrooms, "c").contains("c.form_master_id = $1"));
    }

    #[test]
    fn teacher_scope_hides_cases_and_limits_sessions() {
        let policy = Policy::new("t-1", UserRole::Teacher);
        assert!(render(&policy, QueryKind::Cases, "ic").ends_with("AND FALSE"));
        assert!(render(&policy, QueryKind::Sessions, "s").ends_with("AND s.recorded_by = $1"));

        let alerts = render(&policy, QueryKind::Alerts, "a");
        assert!(alerts.contains("sta.subject_id = a.subject_id"));
        assert!(alerts.contains("se.student_id = a.student_id"));
    }

    #[test]
    fn role_guards_reject_other_roles() {
        let teacher = Policy::new("t-1", UserRole::Teacher);
        assert!(teacher.require_admin().is_err());
        assert!(teacher.require_role(UserRole::Teacher, "teachers only").is_ok());
        assert!(!teacher.is_admin());
    }
}
