pub mod recipes;

use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

use crate::auth;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the server indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    /// Relative media path (`users/<uuid>.<ext>`). NULL = no avatar set.
    pub avatar: Option<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("ladle.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .foreign_keys(true)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            use sqlx::ConnectOptions as _;
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        // Idempotent schema creation. SQLite keeps this cheap on restart.
        let stmts = [
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                avatar TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS auth_tokens (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS follows (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE(user_id, author_id)
            )",
            "CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE
            )",
            "CREATE TABLE IF NOT EXISTS ingredients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                measurement_unit TEXT NOT NULL,
                UNIQUE(name, measurement_unit)
            )",
            "CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name)",
            "CREATE TABLE IF NOT EXISTS recipes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                text TEXT NOT NULL,
                cooking_time INTEGER NOT NULL,
                image TEXT NOT NULL,
                short_code TEXT UNIQUE,
                pub_date TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS recipe_tags (
                recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                UNIQUE(recipe_id, tag_id)
            )",
            "CREATE TABLE IF NOT EXISTS recipe_ingredients (
                recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                ingredient_id INTEGER NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
                amount INTEGER NOT NULL,
                UNIQUE(recipe_id, ingredient_id)
            )",
            "CREATE TABLE IF NOT EXISTS favorites (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                UNIQUE(user_id, recipe_id)
            )",
            "CREATE TABLE IF NOT EXISTS shopping_carts (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                UNIQUE(user_id, recipe_id)
            )",
        ];
        for stmt in stmts {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .context("failed to run schema migration")?;
        }
        Ok(())
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
    ) -> Result<UserRow> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO users (email, username, first_name, last_name, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(email)
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(password_hash)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_user(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("user not found after insert"))
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<UserRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM users ORDER BY id ASC LIMIT ? OFFSET ?")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn count_users(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_avatar(&self, id: i64, avatar: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET avatar = ? WHERE id = ?")
            .bind(avatar)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── Auth tokens ────────────────────────────────────────────────────────

    /// Issue a fresh token for a user. A user may hold several live tokens
    /// (one per device); logout revokes only the presented one.
    pub async fn create_token(&self, user_id: i64) -> Result<String> {
        let token = auth::generate_token();
        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(token)
    }

    pub async fn get_token_user(&self, token: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as(
            "SELECT u.* FROM users u
             JOIN auth_tokens t ON t.user_id = u.id
             WHERE t.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Returns `true` if the token existed and was revoked.
    pub async fn delete_token(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Follows ────────────────────────────────────────────────────────────

    /// Returns `false` when the follow already existed.
    pub async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO follows (user_id, author_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(author_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `false` when there was nothing to remove.
    pub async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM follows WHERE user_id = ? AND author_id = ?",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Authors the user follows, oldest subscription first.
    pub async fn list_following(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT u.* FROM users u
                 JOIN follows f ON f.author_id = u.id
                 WHERE f.user_id = ?
                 ORDER BY f.rowid ASC LIMIT ? OFFSET ?",
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn count_following(&self, user_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let s = Storage::new(dir.path()).await.unwrap();
        (s, dir)
    }

    #[tokio::test]
    async fn create_and_find_user() {
        let (s, _d) = storage().await;
        let u = s
            .create_user("a@b.c", "alice", "Alice", "Smith", "salt$hash")
            .await
            .unwrap();
        assert_eq!(s.find_user_by_email("a@b.c").await.unwrap().unwrap().id, u.id);
        assert_eq!(
            s.find_user_by_username("alice").await.unwrap().unwrap().id,
            u.id
        );
        assert!(s.find_user_by_email("nobody@x.y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (s, _d) = storage().await;
        s.create_user("a@b.c", "alice", "A", "S", "h").await.unwrap();
        assert!(s.create_user("a@b.c", "alice2", "A", "S", "h").await.is_err());
        assert!(s.create_user("a2@b.c", "alice", "A", "S", "h").await.is_err());
    }

    #[tokio::test]
    async fn token_issue_lookup_revoke() {
        let (s, _d) = storage().await;
        let u = s.create_user("a@b.c", "alice", "A", "S", "h").await.unwrap();
        let t = s.create_token(u.id).await.unwrap();
        assert_eq!(s.get_token_user(&t).await.unwrap().unwrap().id, u.id);
        assert!(s.delete_token(&t).await.unwrap());
        assert!(s.get_token_user(&t).await.unwrap().is_none());
        assert!(!s.delete_token(&t).await.unwrap());
    }

    #[tokio::test]
    async fn follow_unfollow_and_duplicates() {
        let (s, _d) = storage().await;
        let a = s.create_user("a@b.c", "a", "A", "A", "h").await.unwrap();
        let b = s.create_user("b@b.c", "b", "B", "B", "h").await.unwrap();
        assert!(s.follow(a.id, b.id).await.unwrap());
        assert!(!s.follow(a.id, b.id).await.unwrap());
        assert!(s.is_following(a.id, b.id).await.unwrap());
        assert_eq!(s.count_following(a.id).await.unwrap(), 1);
        assert!(s.unfollow(a.id, b.id).await.unwrap());
        assert!(!s.unfollow(a.id, b.id).await.unwrap());
    }
}
