//! Embedded-SQL credential store on SQLite.
//!
//! The schema mirrors the classic `users`/`groups`/`session` layout and is
//! created lazily on first open. Session rows never survive a restart: the
//! table is emptied when the store opens.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::Instrument;

use super::{CredentialStore, UserRecord};
use crate::error::StoreError;
use crate::password::UNUSABLE_PASSWORD;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS groups (
        id INTEGER PRIMARY KEY,
        name TEXT UNIQUE NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        name TEXT UNIQUE NOT NULL,
        groupid INTEGER NOT NULL,
        passwd TEXT,
        home TEXT,
        FOREIGN KEY (groupid) REFERENCES groups(id) ON UPDATE SET NULL
    )",
    "CREATE TABLE IF NOT EXISTS session (
        token TEXT PRIMARY KEY,
        userid INTEGER NOT NULL,
        expire INTEGER,
        FOREIGN KEY (userid) REFERENCES users(id) ON UPDATE SET NULL
    )",
    "INSERT OR IGNORE INTO groups (name) VALUES ('root'), ('users')",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

impl SqliteStore {
    /// Open (and if missing, create and initialize) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        // Stale sessions from a previous run are worthless without the
        // nonce/opaque state that issued them.
        sqlx::query("DELETE FROM session").execute(&pool).await?;

        Ok(Self { pool })
    }

    async fn user_id(&self, user: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT id FROM users WHERE name = ?")
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("id")))
    }

    async fn lookup_field(&self, user: &str, query: &str) -> Result<Option<String>, StoreError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        // passwd/home columns are nullable; NULL reads as an absent field.
        Ok(row.and_then(|row| row.get::<Option<String>, _>(0)))
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn lookup_password(&self, user: &str) -> Result<Option<String>, StoreError> {
        self.lookup_field(user, "SELECT passwd FROM users WHERE name = ?")
            .await
    }

    async fn lookup_group(&self, user: &str) -> Result<Option<String>, StoreError> {
        self.lookup_field(
            user,
            "SELECT groups.name FROM users \
             INNER JOIN groups ON groups.id = users.groupid \
             WHERE users.name = ?",
        )
        .await
    }

    async fn lookup_home(&self, user: &str) -> Result<Option<String>, StoreError> {
        self.lookup_field(user, "SELECT home FROM users WHERE name = ?")
            .await
    }

    fn supports_tokens(&self) -> bool {
        true
    }

    async fn check_token(
        &self,
        token: &str,
        require_unexpired: bool,
    ) -> Result<Option<String>, StoreError> {
        let query = if require_unexpired {
            "SELECT users.name FROM session \
             INNER JOIN users ON users.id = session.userid \
             WHERE session.token = ? \
               AND (session.expire IS NULL OR session.expire > ?)"
        } else {
            "SELECT users.name FROM session \
             INNER JOIN users ON users.id = session.userid \
             WHERE session.token = ?"
        };
        let span = tracing::info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "SELECT",
            db.statement = query
        );
        let mut select = sqlx::query(query).bind(token);
        if require_unexpired {
            select = select.bind(now_epoch());
        }
        let row = select
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.map(|row| row.get("name")))
    }

    async fn issue_token(
        &self,
        user: &str,
        token: &str,
        expire_seconds: i64,
    ) -> Result<(), StoreError> {
        let Some(userid) = self.user_id(user).await? else {
            return Err(StoreError::NotFound);
        };
        let expire = (expire_seconds > 0).then(|| now_epoch() + expire_seconds);

        // Delete+insert must be atomic: concurrent issuance for the same
        // user may interleave, but a half-replaced session must not exist.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM session WHERE userid = ? OR token = ?")
            .bind(userid)
            .bind(token)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO session (token, userid, expire) VALUES (?, ?, ?)")
            .bind(token)
            .bind(userid)
            .bind(expire)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        if self.user_id(&record.name).await?.is_some() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO groups (name) VALUES (?)")
            .bind(&record.group)
            .execute(&mut *tx)
            .await?;
        let query = "INSERT INTO users (name, passwd, groupid, home) \
                     VALUES (?, ?, (SELECT id FROM groups WHERE name = ?), ?)";
        sqlx::query(query)
            .bind(&record.name)
            .bind(UNUSABLE_PASSWORD)
            .bind(&record.group)
            .bind(&record.home)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_password(&self, user: &str, field: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET passwd = ? WHERE name = ?")
            .bind(field)
            .bind(user)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn remove_user(&self, user: &str) -> Result<(), StoreError> {
        let Some(userid) = self.user_id(user).await? else {
            return Err(StoreError::NotFound);
        };
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM session WHERE userid = ?")
            .bind(userid)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(userid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
