/*!
# Docshare

A document-sharing backend that turns uploaded office files into previewable
JSON records, built in Rust.

## Overview

Users upload `.xlsx` workbooks or `.docx` documents. Each file is decoded into a
normalized record: spreadsheets become an ordered map of sheet name to a grid of
cell strings, word documents become a single block of plain text. Records are
stored in SQLite and shared by id; anyone holding the id can view or download
the document.

## Architecture

### Ingestion
- **Parser registry** - selects a decoder by file extension
- **XLSX parser** - every sheet, in workbook order, as a padded grid
- **DOCX parser** - the text runs of `word/document.xml`
- **Batch parsing** - files are decoded concurrently; rejects are dropped

### Service layer
- **Document service** - save, fetch and list normalized records
- **Accounts** - registration, Argon2 password hashing, cookie sessions
- **Exporter** - renders stored records back to `.xlsx` or `.txt`

### Persistence
- SQLite through `sqlx`, one explicit pool handle shared by all requests

## Modules

- **document**: normalized record types and their invariants
- **loader**: file parsers and the upload batch
- **store**: SQLite persistence for users, sessions and documents
- **login**: user authentication and session management
- **service**: document save, fetch and listing
- **downloader**: export functionality (XLSX, text)
- **app**: routing, handlers and server lifecycle
- **config**: environment configuration
- **error**: request-boundary error type

## REST API Endpoints

- `POST /signup`, `POST /login`, `POST /logout` - accounts and sessions
- `POST /upload` - parse files into previews
- `POST /save` - persist a normalized record
- `POST /fetch` - list stored records
- `GET /view?id=` - a stored record by id
- `GET /download?id=` - the record rendered back into a file
- `GET /health` - liveness probe
*/

pub mod app;
pub mod config;
pub mod document;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod login;
pub mod service;
pub mod store;
