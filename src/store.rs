//! Persistence for documents, users and sessions
//!
//! [`Store`] owns a SQLite connection pool. It is built once at startup with
//! [`Store::connect`], cloned into request handlers, and closed on shutdown.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::document::{
    DocumentBody, DocumentKind, NormalizedDocument, SheetRows, StoredDocument,
};

/// Store-level failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Registered user
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub email: String,
    pub password_hash: String,
}

/// Login session issued to a user
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub email: String,
    pub session_token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SessionRow {
    email: String,
    session_token: String,
    created_at: String,
}

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    name: String,
    size: i64,
    kind: String,
    content: String,
    sheet_names: Option<String>,
    owner_token: String,
    created_at: String,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    email TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    session_token TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    size INTEGER NOT NULL,
    type TEXT NOT NULL,
    content TEXT NOT NULL,
    sheet_names TEXT,
    owner_token TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const DOCUMENT_COLUMNS: &str =
    "id, name, size, type AS kind, content, sheet_names, owner_token, created_at";

/// Handle to the document database
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to `url` and make sure the schema exists
    ///
    /// In-memory databases are held on a single connection that never expires,
    /// otherwise each pooled connection would see its own empty database.
    ///
    /// # Arguments
    /// * `url` - SQLite URL, e.g. `sqlite:docs.db` or `sqlite::memory:`
    ///
    /// # Errors
    /// * `StoreError::Database` if the URL is malformed, the file cannot be
    ///   opened or the schema cannot be created
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool_options = if is_in_memory(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;

        tracing::info!(url = %redact(url), "document store connected");
        Ok(Self { pool })
    }

    /// Close every pooled connection, waiting for in-flight queries
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("document store closed");
    }

    /// Insert a new document and return it with its generated id
    ///
    /// # Arguments
    /// * `document` - The validated record to persist
    /// * `owner_token` - Token of the uploader, stored as `ownerToken`
    ///
    /// # Returns
    /// * `Result<StoredDocument>` - The record with a fresh UUID v4 id and the
    ///   insertion time
    ///
    /// # Errors
    /// * `StoreError::OutOfRange` if `size` does not fit a SQLite integer
    /// * `StoreError::Database` if the insert fails
    pub async fn insert_document(
        &self,
        document: &NormalizedDocument,
        owner_token: &str,
    ) -> Result<StoredDocument> {
        let size = i64::try_from(document.size)
            .map_err(|_| StoreError::OutOfRange(format!("size {}", document.size)))?;
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let (content, sheet_names) = encode_body(&document.body);

        sqlx::query(
            r#"
            INSERT INTO documents (id, name, size, type, content, sheet_names, owner_token, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&document.name)
        .bind(size)
        .bind(document.body.kind().as_str())
        .bind(&content)
        .bind(&sheet_names)
        .bind(owner_token)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(StoredDocument {
            id,
            document: document.clone(),
            owner_token: owner_token.to_string(),
            created_at,
        })
    }

    /// Look a document up by id
    ///
    /// # Returns
    /// * `Result<Option<StoredDocument>>` - `None` for any unknown id,
    ///   including ones that are not UUIDs
    ///
    /// # Errors
    /// * `StoreError::Corrupt` if the stored row cannot be decoded
    pub async fn find_document(&self, id: &str) -> Result<Option<StoredDocument>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_document).transpose()
    }

    /// Every stored document, oldest first
    pub async fn list_documents(&self) -> Result<Vec<StoredDocument>> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM documents ORDER BY rowid",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_document).collect()
    }

    /// Look a user up by email
    pub async fn find_user(&self, email: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT email, password_hash FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Insert a user; fails with [`StoreError::Duplicate`] if the email exists
    pub async fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate(user.email.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a session issued at login
    pub async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query("INSERT INTO sessions (session_token, email, created_at) VALUES (?, ?, ?)")
            .bind(&session.session_token)
            .bind(&session.email)
            .bind(session.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Look a session up by its token
    ///
    /// Expiry is not checked here; see `login::validate_session`.
    pub async fn find_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT email, session_token, created_at FROM sessions WHERE session_token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at = parse_timestamp(&row.email, &row.created_at)?;
        Ok(Some(SessionRecord {
            email: row.email,
            session_token: row.session_token,
            created_at,
        }))
    }

    /// Delete a session; returns whether one existed
    pub async fn delete_session(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn encode_body(body: &DocumentBody) -> (String, Option<String>) {
    // Serializing maps of strings and string vectors cannot fail
    match body {
        DocumentBody::Spreadsheet {
            content,
            sheet_names,
        } => (
            serde_json::to_string(content).unwrap_or_default(),
            Some(serde_json::to_string(sheet_names).unwrap_or_default()),
        ),
        DocumentBody::TextDocument { content } => (content.clone(), None),
    }
}

fn decode_document(row: DocumentRow) -> Result<StoredDocument> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: row.id.clone(),
        reason,
    };

    let kind = DocumentKind::from_tag(&row.kind)
        .ok_or_else(|| corrupt(format!("unknown type '{}'", row.kind)))?;

    let body = match kind {
        DocumentKind::Spreadsheet => {
            let content = serde_json::from_str::<IndexMap<String, SheetRows>>(&row.content)
                .map_err(|e| corrupt(format!("content: {}", e)))?;
            let sheet_names = row
                .sheet_names
                .as_deref()
                .map(serde_json::from_str::<Vec<String>>)
                .transpose()
                .map_err(|e| corrupt(format!("sheet_names: {}", e)))?
                .ok_or_else(|| corrupt("missing sheet_names".to_string()))?;
            DocumentBody::Spreadsheet {
                content,
                sheet_names,
            }
        }
        DocumentKind::TextDocument => DocumentBody::TextDocument {
            content: row.content.clone(),
        },
    };

    let created_at = parse_timestamp(&row.id, &row.created_at)?;

    Ok(StoredDocument {
        id: row.id.clone(),
        document: NormalizedDocument {
            name: row.name.clone(),
            size: u64::try_from(row.size).map_err(|_| corrupt(format!("size {}", row.size)))?,
            body,
        },
        owner_token: row.owner_token.clone(),
        created_at,
    })
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("created_at: {}", e),
        })
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Strip query parameters, which may carry credentials, before logging a URL
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    fn spreadsheet() -> NormalizedDocument {
        let mut content = IndexMap::new();
        content.insert("Q1".to_string(), vec![vec!["a".to_string(), String::new()]]);
        content.insert("Notes".to_string(), vec![vec![String::new()]]);
        NormalizedDocument {
            name: "budget.xlsx".to_string(),
            size: 2048,
            body: DocumentBody::Spreadsheet {
                content,
                sheet_names: vec!["Q1".to_string(), "Notes".to_string()],
            },
        }
    }

    #[tokio::test]
    async fn documents_round_trip() {
        let store = memory_store().await;
        let document = spreadsheet();

        let stored = store.insert_document(&document, "tok").await.unwrap();
        let fetched = store.find_document(&stored.id).await.unwrap().unwrap();

        assert_eq!(fetched.document, document);
        assert_eq!(fetched.owner_token, "tok");
        assert_eq!(fetched.id, stored.id);
    }

    #[tokio::test]
    async fn size_beyond_sqlite_integer_is_refused() {
        let store = memory_store().await;
        let mut document = spreadsheet();
        document.size = u64::MAX;

        assert!(matches!(
            store.insert_document(&document, "tok").await,
            Err(StoreError::OutOfRange(_))
        ));
        assert!(store.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_document_is_none() {
        let store = memory_store().await;
        assert!(store.find_document("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn each_insert_gets_a_fresh_id() {
        let store = memory_store().await;
        let text = NormalizedDocument {
            name: "a.docx".to_string(),
            size: 1,
            body: DocumentBody::text("hi"),
        };

        let first = store.insert_document(&text, "t").await.unwrap();
        let second = store.insert_document(&text, "t").await.unwrap();

        assert_ne!(first.id, second.id);
        let all = store.list_documents().await.unwrap();
        let ids: Vec<_> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, [first.id.as_str(), second.id.as_str()]);
    }

    #[tokio::test]
    async fn duplicate_user_is_reported() {
        let store = memory_store().await;
        let user = UserRecord {
            email: "a@x.com".to_string(),
            password_hash: "hash".to_string(),
        };

        store.insert_user(&user).await.unwrap();
        assert!(matches!(
            store.insert_user(&user).await,
            Err(StoreError::Duplicate(email)) if email == "a@x.com"
        ));
        assert_eq!(
            store.find_user("a@x.com").await.unwrap().unwrap().password_hash,
            "hash"
        );
    }

    #[tokio::test]
    async fn sessions_can_be_found_and_deleted() {
        let store = memory_store().await;
        let session = SessionRecord {
            email: "a@x.com".to_string(),
            session_token: "abc".to_string(),
            created_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        store.insert_session(&session).await.unwrap();
        assert_eq!(store.find_session("abc").await.unwrap(), Some(session));
        assert!(store.delete_session("abc").await.unwrap());
        assert!(!store.delete_session("abc").await.unwrap());
        assert_eq!(store.find_session("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_database_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("docs.db").display());

        let store = Store::connect(&url).await.unwrap();
        let stored = store.insert_document(&spreadsheet(), "t").await.unwrap();
        store.close().await;

        let reopened = Store::connect(&url).await.unwrap();
        let fetched = reopened.find_document(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.document, spreadsheet());
        reopened.close().await;
    }
}
