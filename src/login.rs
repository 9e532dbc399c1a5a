use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::app::{AppState, MessageResponse, invalid_json};
use crate::error::{AppError, Result};
use crate::store::{SessionRecord, Store, StoreError, UserRecord};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Lifetime of a session cookie (7 days)
pub const SESSION_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LEN: usize = 6;

/// Random bytes per session token
const TOKEN_BYTES: usize = 32;

/// Same text for unknown emails and wrong passwords
const INVALID_CREDENTIALS: &str = "Invalid email or password.";

/// Hash checked when the email is unknown, so both failures cost one verify
static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();
const DUMMY_PASSWORD: &str = "docshare-no-such-user";

/// Credential data for login and registration
#[derive(Debug, Deserialize)]
pub struct UserCredentials {
    #[serde(default)]
    pub email: String,

    /// Password in plaintext (only transmitted, never stored)
    #[serde(default)]
    pub password: String,
}

/// Attributes the client should apply to the session cookie
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieStore {
    pub http_only: bool,
    pub secure: bool,
    pub max_age: i64,
    pub path: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub cookie_store: CookieStore,
}

/// Register a new user
///
/// The password is hashed with Argon2id before storage.
///
/// # Arguments
/// * `store` - Document store holding the users table
/// * `email` - Email address, used as the account key
/// * `password` - Plaintext password, at least 6 characters
///
/// # Errors
/// * Validation error if a field is empty, the password is too short or the
///   email is already registered
pub async fn register_user(store: &Store, email: &str, password: &str) -> Result<()> {
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required.".to_string(),
        ));
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters long.",
            MIN_PASSWORD_LEN
        )));
    }

    if store.find_user(email).await?.is_some() {
        return Err(email_taken());
    }

    let password_hash = hash_password(password.to_string()).await?;

    let user = UserRecord {
        email: email.to_string(),
        password_hash,
    };

    match store.insert_user(&user).await {
        Ok(()) => Ok(()),
        Err(StoreError::Duplicate(_)) => Err(email_taken()),
        Err(e) => Err(e.into()),
    }
}

/// Verify credentials and open a new session
///
/// Unknown emails and wrong passwords fail with the same message, and both
/// run one Argon2 verification.
///
/// # Arguments
/// * `store` - Document store holding users and sessions
/// * `email` - Account email
/// * `password` - Plaintext password to check
///
/// # Returns
/// * `Result<SessionRecord>` - The newly stored session with a fresh token
///
/// # Errors
/// * Validation error if a field is empty
/// * Auth error if the email is unknown or the password is wrong
pub async fn login_user(store: &Store, email: &str, password: &str) -> Result<SessionRecord> {
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required.".to_string(),
        ));
    }

    let Some(user) = store.find_user(email).await? else {
        let hash = dummy_hash().await?.to_string();
        verify_password(password.to_string(), hash).await?;
        return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
    };

    if !verify_password(password.to_string(), user.password_hash).await? {
        return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
    }

    let session = SessionRecord {
        email: user.email,
        session_token: generate_session_token(),
        created_at: Utc::now(),
    };
    store.insert_session(&session).await?;

    tracing::info!(email = %session.email, "session issued");
    Ok(session)
}

/// Look up a session and check it has not outlived its cookie
pub async fn validate_session(
    store: &Store,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionRecord>> {
    let session = store.find_session(token).await?;
    Ok(session.filter(|s| now - s.created_at < Duration::seconds(SESSION_MAX_AGE_SECS)))
}

/// Generate an opaque session token from the OS random source
///
/// 32 random bytes, hex encoded.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Session token carried by the request's cookie, if any
pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Build the HTTP-only session cookie for a token
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(SESSION_MAX_AGE_SECS))
        .build()
}

async fn dummy_hash() -> Result<&'static str> {
    DUMMY_HASH
        .get_or_try_init(|| hash_password(DUMMY_PASSWORD.to_string()))
        .await
        .map(String::as_str)
}

fn email_taken() -> AppError {
    AppError::Validation("Email is already in use.".to_string())
}

/// Hash a password using Argon2 on the blocking pool
async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// Verify a password against a stored Argon2 hash
async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
}

/// Handle user registration
pub async fn handle_signup(
    State(state): State<AppState>,
    payload: std::result::Result<Json<UserCredentials>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let Json(credentials) = payload.map_err(invalid_json)?;

    register_user(&state.store, &credentials.email, &credentials.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully.")),
    ))
}

/// Handle user login
///
/// On success the session token is set as an HTTP-only cookie.
pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: std::result::Result<Json<UserCredentials>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let Json(credentials) = payload.map_err(invalid_json)?;

    let session = login_user(&state.store, &credentials.email, &credentials.password).await?;
    let secure = state.session.secure_cookie;

    let response = LoginResponse {
        message: "Login successful".to_string(),
        cookie_store: CookieStore {
            http_only: true,
            secure,
            max_age: SESSION_MAX_AGE_SECS,
            path: "/",
        },
    };

    Ok((
        jar.add(session_cookie(session.session_token, secure)),
        Json(response),
    ))
}

/// Handle user logout
///
/// Deletes the stored session, if any, and clears the cookie.
pub async fn handle_logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    if let Some(token) = session_token(&jar) {
        state.store.delete_session(&token).await?;
    }

    let cleared = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    Ok((jar.remove(cleared), Json(MessageResponse::new("Logged out"))))
}
