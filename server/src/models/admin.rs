use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "admin_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Admin,
    SuperAdmin,
}

/// Administrator account. `password_hash` is an Argon2 PHC string and is never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct Admin {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admin {
    pub fn is_super_admin(&self) -> bool {
        self.role == AdminRole::SuperAdmin
    }

    pub fn summary(&self) -> AdminSummary {
        AdminSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            is_active: self.is_active,
            last_login: self.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}
