use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AdminStore, NewAdmin, NewUser, Rejection, StatusCounts, StoreError, StoreResult, TicketIssue,
    UserSearch, UserStore,
};
use crate::models::{Admin, PaymentCheckout, RegistrationStatus, User};

const USER_COLUMNS: &str = r#"
    id, name, email, phone, level, amount, payment_reference, authorization_url,
    access_code, payment_date, paid, receipt_url, ticket_id, qr_code_data, qr_code_image,
    status, approved_at, approved_by, rejected_at, rejected_by, rejection_reason,
    admin_notes, created_at, updated_at
"#;

const ADMIN_COLUMNS: &str = r#"
    id, name, email, password_hash, role, is_active, last_login, created_by,
    created_at, updated_at
"#;

const SEARCH_FILTER: &str = r#"
    ($1::text IS NULL
     OR name ILIKE $1
     OR email ILIKE $1
     OR ticket_id ILIKE $1
     OR payment_reference ILIKE $1
     OR phone ILIKE $1)
"#;

/// Maps unique violations onto the field they protect.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("ticket_id") => "ticket id",
                Some(c) if c.contains("payment_reference") => "payment reference",
                _ => "email",
            };
            return StoreError::Duplicate(field);
        }
    }
    StoreError::Database(err)
}

fn status_names(statuses: &[RegistrationStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// `%term%` with `LIKE` metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, phone, level, amount, status, paid)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending_payment', false)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(user.level)
            .bind(user.amount)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<User>> {
        self.find_one("payment_reference", reference).await
    }

    async fn find_by_ticket_id(&self, ticket_id: &str) -> StoreResult<Option<User>> {
        self.find_one("ticket_id", ticket_id).await
    }

    async fn attach_checkout(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        checkout: &PaymentCheckout,
    ) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET payment_reference = $2, authorization_url = $3, access_code = $4,
                updated_at = now()
            WHERE id = $1
              AND paid = false
              AND payment_reference IS NULL
              AND status::text = ANY($5)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&checkout.reference)
            .bind(&checkout.authorization_url)
            .bind(&checkout.access_code)
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn attach_receipt(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        receipt_url: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET receipt_url = $2, payment_date = $3, status = 'pending_verification',
                updated_at = $3
            WHERE id = $1
              AND paid = false
              AND status::text = ANY($4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(receipt_url)
            .bind(at)
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn issue_ticket(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        issue: &TicketIssue,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET paid = true,
                amount = COALESCE($2, amount),
                payment_date = $3,
                ticket_id = $4,
                qr_code_data = $5,
                qr_code_image = $6,
                status = 'approved',
                approved_at = $7,
                approved_by = $8,
                admin_notes = COALESCE($9, admin_notes),
                updated_at = $7
            WHERE id = $1
              AND paid = false
              AND ticket_id IS NULL
              AND status::text = ANY($10)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(issue.amount)
            .bind(issue.payment_date)
            .bind(&issue.ticket_id)
            .bind(Json(&issue.qr_code_data))
            .bind(&issue.qr_code_image)
            .bind(at)
            .bind(&issue.approved_by)
            .bind(&issue.admin_notes)
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn reject(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        rejection: &Rejection,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET status = 'rejected',
                rejected_at = $2,
                rejected_by = $3,
                rejection_reason = $4,
                admin_notes = COALESCE($5, admin_notes),
                updated_at = $2
            WHERE id = $1
              AND status::text = ANY($6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(at)
            .bind(&rejection.rejected_by)
            .bind(&rejection.reason)
            .bind(&rejection.admin_notes)
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_by_status(&self, status: RegistrationStatus) -> StoreResult<Vec<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE status::text = $1
            ORDER BY payment_date ASC NULLS LAST, created_at ASC
            "#
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn search(&self, query: &UserSearch) -> StoreResult<(Vec<User>, i64)> {
        let pattern = query.term.as_deref().map(like_pattern);

        let count_sql = format!("SELECT COUNT(*) FROM users WHERE {SEARCH_FILTER}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        let page_sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE {SEARCH_FILTER}
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let users = sqlx::query_as::<_, User>(&page_sql)
            .bind(&pattern)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((users, total))
    }

    async fn list_all(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn status_counts(&self) -> StoreResult<StatusCounts> {
        let rows: Vec<(RegistrationStatus, i64, i64, Decimal)> = sqlx::query_as(
            r#"
            SELECT status,
                   COUNT(*),
                   COUNT(*) FILTER (WHERE paid),
                   COALESCE(SUM(amount) FILTER (WHERE paid), 0)
            FROM users
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count, paid, revenue) in rows {
            counts.add(status, count);
            counts.paid += paid;
            counts.total_revenue += revenue;
        }
        Ok(counts)
    }

    async fn recently_updated(&self, limit: i64) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY updated_at DESC LIMIT $1");
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }
}

#[derive(Clone)]
pub struct PgAdminStore {
    pool: PgPool,
}

impl PgAdminStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminStore for PgAdminStore {
    async fn insert(&self, admin: NewAdmin) -> StoreResult<Admin> {
        let sql = format!(
            r#"
            INSERT INTO admins (id, name, email, password_hash, role, is_active, created_by)
            VALUES ($1, $2, $3, $4, $5, true, $6)
            RETURNING {ADMIN_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Admin>(&sql)
            .bind(Uuid::new_v4())
            .bind(&admin.name)
            .bind(&admin.email)
            .bind(&admin.password_hash)
            .bind(admin.role)
            .bind(admin.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn count(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Admin>> {
        let sql = format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE id = $1");
        let admin = sqlx::query_as::<_, Admin>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(admin)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Admin>> {
        let sql = format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE email = $1");
        let admin = sqlx::query_as::<_, Admin>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(admin)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE admins SET last_login = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<Option<Admin>> {
        let sql = format!(
            r#"
            UPDATE admins SET is_active = $2, updated_at = now()
            WHERE id = $1
            RETURNING {ADMIN_COLUMNS}
            "#
        );
        let admin = sqlx::query_as::<_, Admin>(&sql)
            .bind(id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?;
        Ok(admin)
    }

    async fn create_session(
        &self,
        token_hash: &str,
        admin_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO admin_sessions (token_hash, admin_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(token_hash)
        .bind(admin_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>(
            r#"
            SELECT a.id, a.name, a.email, a.password_hash, a.role, a.is_active, a.last_login,
                   a.created_by, a.created_at, a.updated_at
            FROM admin_sessions s
            JOIN admins a ON a.id = s.admin_id
            WHERE s.token_hash = $1 AND s.expires_at > $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM admin_sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_sessions_for(&self, admin_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM admin_sessions WHERE admin_id = $1")
            .bind(admin_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
