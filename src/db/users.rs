//! User directory: user records, ban lifecycle, admin tier, department and event membership.
//!
//! Every mutation is a single `UPDATE ... RETURNING` so a write either lands whole or not
//! at all. Reads that return a [`User`] strip the admin password hash unless the caller
//! asks for [`UserProjection::Full`].

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{bind_all, now_millis, require_id, require_text, SqlValue};
use crate::errors::AppError;
use crate::models::{
    AdminState, AdminTier, BanState, DeleteResult, EventMembership, Pagination, TelegramIdentity,
    TelegramProfile, User, UserFilter, UserProjection, UserSort,
};

const BASE_COLUMNS: &str = "id, telegram_id, first_name, last_name, username, avatar, \
     department, telegram_chat_id, events, created, banned_status, banned_expires_at, \
     admin_permission";

fn columns(projection: UserProjection) -> String {
    match projection {
        UserProjection::Public => format!("{}, NULL AS admin_password", BASE_COLUMNS),
        UserProjection::Full => format!("{}, admin_password", BASE_COLUMNS),
    }
}

/// Owner of all user records.
#[derive(Clone)]
pub struct UserDirectory {
    pool: SqlitePool,
}

impl UserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== IDENTITY ====================

    /// Create the user for an external identity, or refresh the profile of the existing one.
    ///
    /// Ban, admin and event state of an existing user are left untouched.
    pub async fn upsert_from_external_identity(
        &self,
        identity: &TelegramIdentity,
    ) -> Result<User, AppError> {
        if identity.id <= 0 {
            return Err(AppError::invalid("telegramId is required"));
        }

        let new_id = uuid::Uuid::new_v4().to_string();
        let profile = &identity.profile;
        let sql = format!(
            r#"INSERT INTO users (
                id, telegram_id, first_name, last_name, username, avatar,
                events, created, banned_status, banned_expires_at, admin_permission, admin_password
            ) VALUES (?, ?, ?, ?, ?, ?, '[]', ?, 0, 0, 0, NULL)
            ON CONFLICT(telegram_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                username = excluded.username,
                avatar = excluded.avatar
            RETURNING {}"#,
            columns(UserProjection::Public)
        );

        let row = sqlx::query(&sql)
            .bind(&new_id)
            .bind(identity.id)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.username)
            .bind(&profile.photo_url)
            .bind(now_millis())
            .fetch_one(&self.pool)
            .await?;

        let user = user_from_row(&row)?;
        if user.id == new_id {
            tracing::info!(user_id = %user.id, telegram_id = identity.id, "Created user");
        } else {
            tracing::debug!(user_id = %user.id, telegram_id = identity.id, "Refreshed user profile");
        }
        Ok(user)
    }

    /// Refresh the profile fields of an existing user.
    pub async fn update_profile(
        &self,
        id: &str,
        profile: &TelegramProfile,
    ) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        self.update_returning(
            id,
            "first_name = ?, last_name = ?, username = ?, avatar = ?",
            &[
                SqlValue::opt_text(profile.first_name.as_deref()),
                SqlValue::opt_text(profile.last_name.as_deref()),
                SqlValue::opt_text(profile.username.as_deref()),
                SqlValue::opt_text(profile.photo_url.as_deref()),
            ],
        )
        .await
    }

    // ==================== LOOKUP ====================

    /// Get a user by internal id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let id = require_id("userId", id)?;
        let sql = format!(
            "SELECT {} FROM users WHERE id = ?",
            columns(UserProjection::Public)
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Get a user by Telegram id.
    pub async fn find_by_external_id(&self, telegram_id: i64) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE telegram_id = ?",
            columns(UserProjection::Public)
        );
        let row = sqlx::query(&sql)
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// List every user, oldest first.
    pub async fn list_all(&self, projection: UserProjection) -> Result<Vec<User>, AppError> {
        self.find(
            &UserFilter::default(),
            UserSort::default(),
            Pagination::all(),
            projection,
        )
        .await
    }

    /// List users matching a filter.
    pub async fn find(
        &self,
        filter: &UserFilter,
        sort: UserSort,
        pagination: Pagination,
        projection: UserProjection,
    ) -> Result<Vec<User>, AppError> {
        let (where_sql, mut binds) = where_clause(filter);
        let sql = format!(
            "SELECT {} FROM users{} ORDER BY {} {}, id LIMIT ? OFFSET ?",
            columns(projection),
            where_sql,
            sort.field.column(),
            if sort.descending { "DESC" } else { "ASC" },
        );
        binds.push(SqlValue::Int(pagination.sql_limit()));
        binds.push(SqlValue::Int(pagination.offset));

        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(user_from_row).collect()
    }

    /// Count users matching a filter.
    pub async fn count(&self, filter: &UserFilter) -> Result<i64, AppError> {
        let (where_sql, binds) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) AS total FROM users{}", where_sql);
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    /// Delete a user record.
    pub async fn remove(&self, id: &str) -> Result<DeleteResult, AppError> {
        let id = require_id("userId", id)?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(user_id = %id, "Removed user");
        }
        Ok(DeleteResult {
            deleted_count: result.rows_affected(),
        })
    }

    // ==================== DEPARTMENT / CHANNEL ====================

    pub async fn set_department(&self, id: &str, department_id: &str) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        let department_id = require_id("departmentId", department_id)?;
        self.update_returning(
            id,
            "department = ?",
            &[SqlValue::Text(department_id.to_string())],
        )
        .await
    }

    pub async fn get_department(&self, id: &str) -> Result<Option<String>, AppError> {
        let id = require_id("userId", id)?;
        let row = sqlx::query("SELECT department FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))?;
        Ok(row.try_get("department")?)
    }

    /// Overwrite the chat the bot delivers notifications to.
    pub async fn set_telegram_chat_id(&self, id: &str, chat_id: &str) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        let chat_id = require_text("telegramChatId", chat_id)?;
        self.update_returning(
            id,
            "telegram_chat_id = ?",
            &[SqlValue::Text(chat_id.to_string())],
        )
        .await
    }

    // ==================== BANS ====================

    /// Ban a user for `duration_ms` from now. Expiry is evaluated by readers, never swept.
    pub async fn ban(&self, id: &str, duration_ms: i64) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        if duration_ms <= 0 {
            return Err(AppError::invalid("durationMs must be positive"));
        }
        let expires_at = now_millis()
            .checked_add(duration_ms)
            .ok_or_else(|| AppError::invalid("durationMs is too large"))?;

        let user = self
            .update_returning(
                id,
                "banned_status = 1, banned_expires_at = ?",
                &[SqlValue::Int(expires_at)],
            )
            .await?;
        tracing::info!(user_id = %id, expires_at, "Banned user");
        Ok(user)
    }

    pub async fn unban(&self, id: &str) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        let user = self
            .update_returning(id, "banned_status = 0, banned_expires_at = 0", &[])
            .await?;
        tracing::info!(user_id = %id, "Unbanned user");
        Ok(user)
    }

    // ==================== ADMIN TIER ====================

    pub async fn promote_to_admin(&self, id: &str, password_hash: &str) -> Result<User, AppError> {
        self.set_admin(id, AdminTier::Admin, password_hash).await
    }

    pub async fn promote_to_super_admin(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        self.set_admin(id, AdminTier::SuperAdmin, password_hash)
            .await
    }

    /// Escalate to `tier` with a fresh password hash in one write.
    pub async fn set_admin(
        &self,
        id: &str,
        tier: AdminTier,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        let password_hash = require_text("passwordHash", password_hash)?;
        if tier == AdminTier::None {
            return Err(AppError::invalid(
                "use demote to clear admin rights, not a tier 0 promotion",
            ));
        }

        let user = self
            .update_returning(
                id,
                "admin_permission = ?, admin_password = ?",
                &[
                    SqlValue::Int(tier.as_i64()),
                    SqlValue::Text(password_hash.to_string()),
                ],
            )
            .await?;
        tracing::info!(user_id = %id, tier = tier.as_i64(), "Granted admin tier");
        Ok(user)
    }

    pub async fn demote_to_none(&self, id: &str) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        let user = self
            .update_returning(id, "admin_permission = 0, admin_password = NULL", &[])
            .await?;
        tracing::info!(user_id = %id, "Revoked admin tier");
        Ok(user)
    }

    /// Tier and password hash only. Never expose this through listing endpoints.
    pub async fn get_admin_state(&self, id: &str) -> Result<AdminState, AppError> {
        let id = require_id("userId", id)?;
        let row = sqlx::query("SELECT admin_permission, admin_password FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))?;

        Ok(AdminState {
            tier: tier_from_column(row.try_get("admin_permission")?)?,
            password_hash: row.try_get("admin_password")?,
        })
    }

    // ==================== EVENTS ====================

    /// Append an event membership. Duplicates are kept.
    pub async fn add_event_membership(&self, id: &str, event_id: &str) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        let event_id = require_text("eventId", event_id)?;
        self.update_returning(
            id,
            "events = json_insert(events, '$[#]', json_object('eventId', ?))",
            &[SqlValue::Text(event_id.to_string())],
        )
        .await
    }

    /// Remove every membership entry for `event_id`.
    pub async fn remove_event_membership(
        &self,
        id: &str,
        event_id: &str,
    ) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        let event_id = require_text("eventId", event_id)?;
        self.update_returning(
            id,
            r#"events = (
                SELECT json_group_array(json(je.value))
                FROM json_each(users.events) AS je
                WHERE json_extract(je.value, '$.eventId') IS NOT ?
            )"#,
            &[SqlValue::Text(event_id.to_string())],
        )
        .await
    }

    pub async fn clear_event_memberships(&self, id: &str) -> Result<User, AppError> {
        let id = require_id("userId", id)?;
        self.update_returning(id, "events = '[]'", &[]).await
    }

    pub async fn get_events(&self, id: &str) -> Result<Vec<EventMembership>, AppError> {
        let id = require_id("userId", id)?;
        let row = sqlx::query("SELECT events FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))?;
        let events: String = row.try_get("events")?;
        Ok(serde_json::from_str(&events)?)
    }

    /// Users whose event list contains `event_id`.
    pub async fn list_users_by_event(&self, event_id: &str) -> Result<Vec<User>, AppError> {
        let event_id = require_text("eventId", event_id)?;
        let filter = UserFilter {
            event_id: Some(event_id.to_string()),
            ..UserFilter::default()
        };
        self.find(
            &filter,
            UserSort::default(),
            Pagination::all(),
            UserProjection::Public,
        )
        .await
    }

    /// Apply `set_sql` to one user and return the public projection of the result.
    async fn update_returning(
        &self,
        id: &str,
        set_sql: &str,
        binds: &[SqlValue],
    ) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET {} WHERE id = ? RETURNING {}",
            set_sql,
            columns(UserProjection::Public)
        );
        let row = bind_all(sqlx::query(&sql), binds)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))?;

        user_from_row(&row)
    }
}

fn where_clause(filter: &UserFilter) -> (String, Vec<SqlValue>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(department) = &filter.department {
        conditions.push("department = ?");
        binds.push(SqlValue::Text(department.clone()));
    }
    if let Some(event_id) = &filter.event_id {
        conditions.push(
            "EXISTS (SELECT 1 FROM json_each(users.events) AS je \
             WHERE json_extract(je.value, '$.eventId') = ?)",
        );
        binds.push(SqlValue::Text(event_id.clone()));
    }
    if let Some(banned) = filter.banned {
        conditions.push("banned_status = ?");
        binds.push(SqlValue::Int(banned as i64));
    }
    if let Some(tier) = filter.tier {
        conditions.push("admin_permission = ?");
        binds.push(SqlValue::Int(tier.as_i64()));
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

fn tier_from_column(value: i64) -> Result<AdminTier, AppError> {
    AdminTier::from_i64(value).ok_or_else(|| AppError::Store {
        message: format!("Stored admin tier {} is out of range", value),
        source: None,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    let events: String = row.try_get("events")?;
    let banned_status: i64 = row.try_get("banned_status")?;

    Ok(User {
        id: row.try_get("id")?,
        telegram_id: row.try_get("telegram_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        username: row.try_get("username")?,
        avatar: row.try_get("avatar")?,
        department: row.try_get("department")?,
        telegram_chat_id: row.try_get("telegram_chat_id")?,
        events: serde_json::from_str(&events)?,
        created: row.try_get("created")?,
        banned: BanState {
            status: banned_status != 0,
            expires_at: row.try_get("banned_expires_at")?,
        },
        admin: AdminState {
            tier: tier_from_column(row.try_get("admin_permission")?)?,
            password_hash: row.try_get("admin_password")?,
        },
    })
}
