//! Session repository: servers, users, buffers, memberships and lines.
//!
//! Ids stored here are the in-memory session ids, scoped by `server_id`.

use super::DbError;
use crate::session::{Buffer, BufferId, Change, Identity, Line, ServerInfo, User, UserId};
use sqlx::SqlitePool;

/// A persisted user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: i64,
    pub nick: String,
    pub username: Option<String>,
    pub host: Option<String>,
    pub current: bool,
}

/// A persisted buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRecord {
    pub buffer_id: i64,
    pub name: String,
    pub kind: String,
    pub topic: Option<String>,
}

/// A persisted history line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub id: i64,
    pub buffer_id: i64,
    pub user_id: Option<i64>,
    pub kind: String,
    pub body: String,
    /// Milliseconds since the epoch.
    pub created_at: i64,
}

/// Repository for session state.
pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a new connection and return its id.
    pub async fn create_server(&self, server: &ServerInfo, identity: &Identity) -> Result<i64, DbError> {
        let now = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO servers (host, port, secure, nick, username, realname, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&server.host)
        .bind(i64::from(server.port))
        .bind(server.secure)
        .bind(&identity.nick)
        .bind(&identity.username)
        .bind(&identity.realname)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn upsert_user(&self, server_id: i64, user: &User) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (server_id, user_id, nick, username, host, current)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(server_id, user_id) DO UPDATE SET
                nick = excluded.nick,
                username = excluded.username,
                host = excluded.host,
                current = excluded.current
            "#,
        )
        .bind(server_id)
        .bind(user.id.0 as i64)
        .bind(&user.nick)
        .bind(&user.username)
        .bind(&user.host)
        .bind(user.current)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_buffer(&self, server_id: i64, buffer: &Buffer) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO buffers (server_id, buffer_id, name, kind, topic)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(server_id, buffer_id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                topic = excluded.topic
            "#,
        )
        .bind(server_id)
        .bind(buffer.id.0 as i64)
        .bind(&buffer.name)
        .bind(buffer.kind.as_str())
        .bind(&buffer.topic)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_membership(&self, server_id: i64, user: UserId, buffer: BufferId) -> Result<(), DbError> {
        sqlx::query(
            "INSERT OR IGNORE INTO memberships (server_id, user_id, buffer_id) VALUES (?, ?, ?)",
        )
        .bind(server_id)
        .bind(user.0 as i64)
        .bind(buffer.0 as i64)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_membership(&self, server_id: i64, user: UserId, buffer: BufferId) -> Result<(), DbError> {
        sqlx::query("DELETE FROM memberships WHERE server_id = ? AND user_id = ? AND buffer_id = ?")
            .bind(server_id)
            .bind(user.0 as i64)
            .bind(buffer.0 as i64)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_line(&self, server_id: i64, line: &Line) -> Result<i64, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO lines (server_id, buffer_id, user_id, kind, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(server_id)
        .bind(line.buffer.0 as i64)
        .bind(line.sender.map(|id| id.0 as i64))
        .bind(line.kind.as_str())
        .bind(&line.body)
        .bind(line.timestamp.timestamp_millis())
        .execute(self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Apply one journaled session change.
    pub async fn apply(&self, server_id: i64, change: &Change) -> Result<(), DbError> {
        match change {
            Change::User(user) => self.upsert_user(server_id, user).await,
            Change::Buffer(buffer) => self.upsert_buffer(server_id, buffer).await,
            Change::MembershipAdded { user, buffer } => {
                self.add_membership(server_id, *user, *buffer).await
            }
            Change::MembershipRemoved { user, buffer } => {
                self.remove_membership(server_id, *user, *buffer).await
            }
            Change::Line(line) => self.insert_line(server_id, line).await.map(|_| ()),
        }
    }

    /// The user holding `nick`, preferring the current holder and then the
    /// most recent record.
    pub async fn find_user_by_nick(&self, server_id: i64, nick: &str) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, Option<String>, Option<String>, bool)>(
            r#"
            SELECT user_id, nick, username, host, current
            FROM users
            WHERE server_id = ? AND nick = ? COLLATE NOCASE
            ORDER BY current DESC, user_id DESC
            LIMIT 1
            "#,
        )
        .bind(server_id)
        .bind(nick)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(user_id, nick, username, host, current)| UserRecord {
            user_id,
            nick,
            username,
            host,
            current,
        }))
    }

    pub async fn find_buffer_by_name(&self, server_id: i64, name: &str) -> Result<Option<BufferRecord>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, String, Option<String>)>(
            r#"
            SELECT buffer_id, name, kind, topic
            FROM buffers
            WHERE server_id = ? AND name = ? COLLATE NOCASE
            "#,
        )
        .bind(server_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(buffer_id, name, kind, topic)| BufferRecord {
            buffer_id,
            name,
            kind,
            topic,
        }))
    }

    /// Members of a buffer, by user id.
    pub async fn members(&self, server_id: i64, buffer: i64) -> Result<Vec<i64>, DbError> {
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM memberships WHERE server_id = ? AND buffer_id = ? ORDER BY user_id",
        )
        .bind(server_id)
        .bind(buffer)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// The last `limit` lines of a buffer, oldest first.
    pub async fn lines_for_buffer(&self, server_id: i64, buffer: i64, limit: u32) -> Result<Vec<LineRecord>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64, Option<i64>, String, String, i64)>(
            r#"
            SELECT id, buffer_id, user_id, kind, body, created_at
            FROM (
                SELECT * FROM lines
                WHERE server_id = ? AND buffer_id = ?
                ORDER BY id DESC
                LIMIT ?
            )
            ORDER BY id ASC
            "#,
        )
        .bind(server_id)
        .bind(buffer)
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, buffer_id, user_id, kind, body, created_at)| LineRecord {
                id,
                buffer_id,
                user_id,
                kind,
                body,
                created_at,
            })
            .collect())
    }
}
