use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;

/// Makes sure the configured first administrator exists and is an active admin.
pub(crate) async fn ensure_first_admin(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_admin_email.is_empty() {
        tracing::warn!("FIRST_ADMIN_EMAIL not configured; skipping admin bootstrap");
        return Ok(());
    }

    let now = primitive_now_utc();
    let existing = repositories::users::find_by_email(state.db(), &admin.first_admin_email).await?;

    if let Some(user) = existing {
        if user.role == UserRole::Admin && user.is_active {
            tracing::info!(user_id = %user.id, "First admin already up to date");
            return Ok(());
        }

        repositories::users::update(
            state.db(),
            &user.id,
            repositories::users::UpdateUser {
                full_name: None,
                role: Some(UserRole::Admin),
                is_active: Some(true),
                updated_at: now,
            },
        )
        .await?;
        tracing::info!(user_id = %user.id, "Promoted first admin");
        return Ok(());
    }

    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            email: &admin.first_admin_email,
            full_name: &admin.first_admin_name,
            role: UserRole::Admin,
            is_active: true,
            created_at: now,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "Created first admin");
    Ok(())
}
