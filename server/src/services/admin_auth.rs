//! Admin accounts and bearer-token sessions.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Admin, AdminRole};
use crate::store::{AdminStore, NewAdmin, StoreError};
use crate::utils::error::{AppError, AppResult};

pub const MIN_PASSWORD_LENGTH: usize = 8;
const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Validated input for a new admin account.
#[derive(Debug, Clone)]
pub struct AdminRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: AdminRole,
}

#[derive(Debug, Clone)]
pub struct LoginSession {
    /// Plain bearer token. Only its hash is stored.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub admin: Admin,
}

#[derive(Clone)]
pub struct AdminAuthService {
    admins: Arc<dyn AdminStore>,
    session_ttl: chrono::Duration,
}

impl AdminAuthService {
    pub fn new(admins: Arc<dyn AdminStore>, session_ttl: chrono::Duration) -> Self {
        Self {
            admins,
            session_ttl,
        }
    }

    /// Creates an admin. The very first account may register itself and becomes a
    /// super admin; after that a super admin has to create accounts.
    pub async fn register(
        &self,
        registration: AdminRegistration,
        actor: Option<&Admin>,
    ) -> AppResult<Admin> {
        if registration.password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let (role, created_by) = match actor {
            Some(actor) if actor.is_super_admin() => (registration.role, Some(actor.id)),
            Some(_) => {
                return Err(AppError::Forbidden(
                    "Only a super admin can create admin accounts".to_string(),
                ))
            }
            None if self.admins.count().await? == 0 => (AdminRole::SuperAdmin, None),
            None => {
                return Err(AppError::AuthError(
                    "Authentication required to create admin accounts".to_string(),
                ))
            }
        };

        let admin = self
            .admins
            .insert(NewAdmin {
                name: registration.name,
                email: registration.email.trim().to_lowercase(),
                password_hash: hash_password(&registration.password)?,
                role,
                created_by,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => {
                    AppError::ValidationError("An admin with this email already exists".to_string())
                }
                other => other.into(),
            })?;

        info!(admin_id = %admin.id, role = ?admin.role, "Admin account created");
        Ok(admin)
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginSession> {
        let email = email.trim().to_lowercase();
        let Some(admin) = self.admins.find_by_email(&email).await? else {
            warn!("Login attempt for unknown admin");
            return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
        };

        if verify_password(password, &admin.password_hash).is_err() {
            warn!(admin_id = %admin.id, "Login attempt with wrong password");
            return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
        }

        if !admin.is_active {
            return Err(AppError::Forbidden("This admin account is deactivated".to_string()));
        }

        let now = Utc::now();
        let token = generate_token();
        let expires_at = now + self.session_ttl;
        self.admins
            .create_session(&hash_token(&token), admin.id, expires_at)
            .await?;
        self.admins.record_login(admin.id, now).await?;

        info!(admin_id = %admin.id, "Admin logged in");
        Ok(LoginSession {
            token,
            expires_at,
            admin: Admin {
                last_login: Some(now),
                ..admin
            },
        })
    }

    /// Resolves a bearer token to an active admin.
    pub async fn authenticate(&self, token: &str) -> AppResult<Admin> {
        let admin = self
            .admins
            .find_session(&hash_token(token), Utc::now())
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid or expired session".to_string()))?;

        if !admin.is_active {
            return Err(AppError::Forbidden("This admin account is deactivated".to_string()));
        }
        Ok(admin)
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        self.admins.delete_session(&hash_token(token)).await?;
        Ok(())
    }

    pub async fn deactivate(&self, actor: &Admin, admin_id: Uuid) -> AppResult<Admin> {
        if !actor.is_super_admin() {
            return Err(AppError::Forbidden(
                "Only a super admin can deactivate accounts".to_string(),
            ));
        }
        if actor.id == admin_id {
            return Err(AppError::ValidationError(
                "You cannot deactivate your own account".to_string(),
            ));
        }

        let admin = self
            .admins
            .set_active(admin_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound("Admin not found".to_string()))?;
        self.admins.delete_sessions_for(admin_id).await?;

        info!(admin_id = %admin.id, by = %actor.id, "Admin deactivated");
        Ok(admin)
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalServerError(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> Result<(), argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Argon2::default().verify_password(password.as_bytes(), &parsed)
}

fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
