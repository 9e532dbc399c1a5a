//! Document save, fetch and listing
//!
//! Documents are addressed by id alone: whoever holds an id may read the
//! document. Owner tokens only label who uploaded a record.

use chrono::Utc;
use tracing::info;

use crate::document::{NormalizedDocument, StoredDocument};
use crate::error::{AppError, Result};
use crate::login;
use crate::store::Store;

#[derive(Clone)]
pub struct DocumentService {
    store: Store,
    verify_sessions: bool,
}

impl DocumentService {
    /// `verify_sessions` makes save and list require a live session token
    /// instead of any non-empty one.
    pub fn new(store: Store, verify_sessions: bool) -> Self {
        Self {
            store,
            verify_sessions,
        }
    }

    /// Persist a normalized document on behalf of `token`'s holder
    ///
    /// Spreadsheet `content` is reordered to follow `sheetNames` before it is
    /// stored, so the saved record always lists sheets in declared order.
    ///
    /// # Arguments
    /// * `document` - The normalized record sent by the client
    /// * `token` - Bearer token from the request body or session cookie
    ///
    /// # Returns
    /// * `Result<StoredDocument>` - The record with its generated id and owner
    ///
    /// # Errors
    /// * `AppError::Auth` if the token is missing, or unknown while session
    ///   verification is enabled
    /// * `AppError::Validation` if the body breaks a record invariant or the
    ///   size cannot be stored
    pub async fn save(
        &self,
        mut document: NormalizedDocument,
        token: Option<&str>,
    ) -> Result<StoredDocument> {
        let token = require_token(token)?;
        if i64::try_from(document.size).is_err() {
            return Err(AppError::Validation(
                "Document size is out of range".to_string(),
            ));
        }
        document
            .body
            .canonicalize()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        self.authorize(token).await?;

        let stored = self.store.insert_document(&document, token).await?;

        info!(
            id = %stored.id,
            kind = stored.document.body.kind().as_str(),
            size = stored.document.size,
            "document saved"
        );
        Ok(stored)
    }

    /// Fetch a document by id
    ///
    /// # Errors
    /// * `AppError::Validation` if `id` is blank
    /// * `AppError::NotFound` if no document has that id
    pub async fn fetch(&self, id: &str) -> Result<StoredDocument> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::Validation("Document id is required".to_string()));
        }

        self.store
            .find_document(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".to_string()))
    }

    /// Every stored document, regardless of owner
    ///
    /// # Arguments
    /// * `token` - Bearer token; required, and checked against live sessions
    ///   when verification is enabled
    ///
    /// # Returns
    /// * `Result<Vec<StoredDocument>>` - All documents, oldest first
    pub async fn list(&self, token: Option<&str>) -> Result<Vec<StoredDocument>> {
        let token = require_token(token)?;
        self.authorize(token).await?;

        Ok(self.store.list_documents().await?)
    }

    async fn authorize(&self, token: &str) -> Result<()> {
        if !self.verify_sessions {
            return Ok(());
        }

        match login::validate_session(&self.store, token, Utc::now()).await? {
            Some(_) => Ok(()),
            None => Err(AppError::Auth("Unauthorized".to_string())),
        }
    }
}

fn require_token(token: Option<&str>) -> Result<&str> {
    token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Auth("Unauthorized".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    use crate::document::DocumentBody;
    use crate::loader::{ParserRegistry, UploadedFile, fixtures};

    async fn service(verify: bool) -> DocumentService {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        DocumentService::new(store, verify)
    }

    fn parsed(name: &str, bytes: Vec<u8>) -> NormalizedDocument {
        ParserRegistry::default()
            .parse(&UploadedFile::new(name, bytes))
            .unwrap()
    }

    #[tokio::test]
    async fn parsed_spreadsheet_round_trips_exactly() {
        let service = service(false).await;
        let document = parsed(
            "plan.xlsx",
            fixtures::xlsx(&[
                ("Tasks", &[&["task", "owner"], &["ship", ""], &["", "ana"]]),
                ("Empty", &[]),
            ]),
        );

        let saved = service.save(document.clone(), Some("tok")).await.unwrap();
        let fetched = service.fetch(&saved.id).await.unwrap();

        assert_eq!(fetched.document, document);
        assert_eq!(fetched.owner_token, "tok");
        match fetched.document.body {
            DocumentBody::Spreadsheet {
                content,
                sheet_names,
            } => {
                assert_eq!(sheet_names, ["Tasks", "Empty"]);
                assert!(content.keys().eq(sheet_names.iter()));
            }
            other => panic!("expected spreadsheet, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn parsed_text_round_trips_exactly() {
        let service = service(false).await;
        let document = parsed("memo.docx", fixtures::docx_paragraphs(&["Dear team,", "Thanks"]));

        let saved = service.save(document.clone(), Some("tok")).await.unwrap();
        assert_eq!(service.fetch(&saved.id).await.unwrap().document, document);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let service = service(false).await;
        assert!(matches!(
            service.fetch("00000000-0000-0000-0000-000000000000").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.fetch("not even a uuid").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(service.fetch(" ").await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn save_requires_a_token_and_a_valid_body() {
        let service = service(false).await;
        let text = NormalizedDocument {
            name: "a.docx".to_string(),
            size: 3,
            body: DocumentBody::text("abc"),
        };
        assert!(matches!(
            service.save(text.clone(), None).await,
            Err(AppError::Auth(_))
        ));
        assert!(matches!(
            service.save(text, Some("  ")).await,
            Err(AppError::Auth(_))
        ));

        let blank = NormalizedDocument {
            name: "b.docx".to_string(),
            size: 3,
            body: DocumentBody::text("   "),
        };
        assert!(matches!(
            service.save(blank, Some("tok")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn out_of_order_sheets_are_saved_in_declared_order() {
        let service = service(false).await;
        let mut content = IndexMap::new();
        content.insert("Empty".to_string(), vec![vec![String::new()]]);
        content.insert("Q1".to_string(), vec![vec!["region".to_string()]]);
        let document = NormalizedDocument {
            name: "q.xlsx".to_string(),
            size: 10,
            body: DocumentBody::Spreadsheet {
                content,
                sheet_names: vec!["Q1".to_string(), "Empty".to_string()],
            },
        };

        let saved = service.save(document, Some("tok")).await.unwrap();
        let fetched = service.fetch(&saved.id).await.unwrap();

        assert_eq!(fetched, saved);
        match fetched.document.body {
            DocumentBody::Spreadsheet {
                content,
                sheet_names,
            } => assert!(content.keys().eq(sheet_names.iter())),
            other => panic!("expected spreadsheet, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unstorable_size_is_rejected() {
        let service = service(false).await;
        let huge = NormalizedDocument {
            name: "a.docx".to_string(),
            size: u64::MAX,
            body: DocumentBody::text("abc"),
        };
        assert!(matches!(
            service.save(huge, Some("tok")).await,
            Err(AppError::Validation(_))
        ));

        let largest = NormalizedDocument {
            name: "b.docx".to_string(),
            size: i64::MAX as u64,
            body: DocumentBody::text("abc"),
        };
        let saved = service.save(largest, Some("tok")).await.unwrap();
        assert_eq!(
            service.fetch(&saved.id).await.unwrap().document.size,
            i64::MAX as u64
        );
    }

    #[tokio::test]
    async fn listing_is_not_scoped_to_owner() {
        let service = service(false).await;
        let text = NormalizedDocument {
            name: "a.docx".to_string(),
            size: 3,
            body: DocumentBody::text("abc"),
        };
        service.save(text.clone(), Some("alice")).await.unwrap();
        service.save(text, Some("bob")).await.unwrap();

        let all = service.list(Some("carol")).await.unwrap();
        let owners: Vec<_> = all.iter().map(|d| d.owner_token.as_str()).collect();
        assert_eq!(owners, ["alice", "bob"]);
        assert!(matches!(service.list(None).await, Err(AppError::Auth(_))));
    }

    #[tokio::test]
    async fn verified_mode_requires_a_live_session() {
        let service = service(true).await;
        login::register_user(&service.store, "a@x.com", "123456")
            .await
            .unwrap();
        let session = login::login_user(&service.store, "a@x.com", "123456")
            .await
            .unwrap();

        assert!(matches!(
            service.list(Some("forged")).await,
            Err(AppError::Auth(_))
        ));
        assert!(service.list(Some(&session.session_token)).await.is_ok());
    }
}
