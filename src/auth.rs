use axum::async_trait;
use axum::extract::{FromRequest, RequestParts};
use axum::headers::authorization::{Basic, Bearer};
use axum::headers::Authorization;
use axum::http::StatusCode;
use axum::{Extension, TypedHeader};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::extract::FormData;
use crate::models::{msg, UserData, UserSession};
use crate::store::{AccountStore, Store};
use crate::{proceeds, proceeds_with, AppState, Error, Payload};

#[derive(Debug, Clone)]
pub enum AuthResult {
    Success(UserSession),
    SessionExpired,
    InvalidSession,
}

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    /// Set when the caller came in through a session token.
    pub session_id: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok(),
        Err(_) => false,
    }
}

/// Hex SHA-256 of 32 random bytes.
pub fn new_session_id() -> String {
    let ssid_bytes: [u8; 32] = thread_rng().gen();

    let mut hasher: Sha256 = Digest::new();
    hasher.update(ssid_bytes);
    hex::encode(hasher.finalize())
}

pub async fn ensure_authenticated(ssid: &str, store: &dyn Store) -> Result<AuthResult, Error> {
    if ssid.is_empty() {
        return Ok(AuthResult::InvalidSession);
    }
    let session = match store.find_session(ssid).await? {
        Some(session) => session,
        None => return Ok(AuthResult::InvalidSession),
    };
    if Utc::now() > session.expires_at {
        store.drop_session(ssid).await?;
        return Ok(AuthResult::SessionExpired);
    }
    Ok(AuthResult::Success(session))
}

pub async fn authenticate_basic(
    username: &str,
    password: &str,
    store: &dyn Store,
) -> Result<Option<UserData>, Error> {
    let user = store.find_user_by_username(username).await?;
    Ok(user.filter(|user| verify_password(password, &user.password_hash)))
}

#[async_trait]
impl<B: Send> FromRequest<B> for Caller {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(state) = Extension::<AppState>::from_request(req)
            .await
            .map_err(|err| Error::InternalError {
                kind: "StateError",
                message: err.to_string(),
            })?;

        if let Ok(TypedHeader(Authorization(bearer))) =
            TypedHeader::<Authorization<Bearer>>::from_request(req).await
        {
            return match ensure_authenticated(bearer.token(), state.store.as_ref()).await? {
                AuthResult::Success(session) => Ok(Caller {
                    user_id: session.belongs_to,
                    session_id: Some(session.ssid),
                }),
                AuthResult::SessionExpired => Err(Error::unauthorized("Session has expired.")),
                AuthResult::InvalidSession => Err(Error::unauthorized("Invalid token.")),
            };
        }

        if let Ok(TypedHeader(Authorization(basic))) =
            TypedHeader::<Authorization<Basic>>::from_request(req).await
        {
            let user =
                authenticate_basic(basic.username(), basic.password(), state.store.as_ref())
                    .await?;
            return match user {
                Some(user) => Ok(Caller {
                    user_id: user.uuid,
                    session_id: None,
                }),
                None => Err(Error::unauthorized("Invalid username/password.")),
            };
        }

        Err(Error::unauthorized(
            "Authentication credentials were not provided.",
        ))
    }
}

/// Creates a user with a freshly hashed password.
pub async fn register_account(store: &dyn Store, account: CreateUser) -> Result<UserData, Error> {
    let mut errors = crate::err::FieldErrors::new();
    for (field, value) in [
        ("username", &account.username),
        ("email", &account.email),
        ("password", &account.password),
    ] {
        if value.trim().is_empty() {
            errors.insert(field.to_string(), vec![msg::BLANK.to_string()]);
        }
    }
    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }

    let user = UserData {
        uuid: Uuid::new_v4(),
        username: account.username.trim().to_string(),
        email: account.email.trim().to_string(),
        password_hash: hash_password(&account.password)?,
        created_at: Utc::now(),
    };
    store.create_user(user).await
}

/// Returns the user's live session, or starts one lasting `ttl`.
pub async fn open_session(
    store: &dyn Store,
    user: Uuid,
    ttl: Duration,
) -> Result<UserSession, Error> {
    if let Some(existing) = store.find_session_for(user).await? {
        if Utc::now() <= existing.expires_at {
            // already authenticated
            return Ok(existing);
        }
        store.drop_session(&existing.ssid).await?;
    }

    let session = UserSession {
        ssid: new_session_id(),
        belongs_to: user,
        expires_at: Utc::now() + ttl,
    };
    store.create_session(session.clone()).await?;
    Ok(session)
}

fn decode<T: serde::de::DeserializeOwned>(form: FormData) -> Result<T, Error> {
    serde_json::from_value(Value::Object(form.fields)).map_err(|err| {
        Error::invalid_payload(format!("Invalid credentials payload - {}", err))
    })
}

pub async fn register_user(
    Extension(state): Extension<AppState>,
    form: FormData,
) -> Payload<CreatedUser> {
    let account: CreateUser = decode(form)?;
    let user = register_account(state.store.as_ref(), account).await?;
    log::info!("registered user {}", user.username);
    proceeds_with(StatusCode::CREATED, CreatedUser { user_id: user.uuid })
}

pub async fn login_user(
    Extension(state): Extension<AppState>,
    form: FormData,
) -> Payload<LoggedInUser> {
    let login: LoginUser = decode(form)?;
    if login.password.is_empty() {
        return Err(Error::field("password", msg::BLANK));
    }

    let user = authenticate_basic(&login.username, &login.password, state.store.as_ref())
        .await?
        .ok_or_else(|| Error::unauthorized("Invalid username/password."))?;
    let session = open_session(state.store.as_ref(), user.uuid, state.session_ttl).await?;

    proceeds(LoggedInUser {
        session_id: session.ssid,
        user_id: session.belongs_to,
        expires_at: session.expires_at,
    })
}

pub async fn logout_user(
    Extension(state): Extension<AppState>,
    caller: Caller,
) -> Payload<SessionDropped> {
    let drop_success = match &caller.session_id {
        Some(ssid) => state.store.drop_session(ssid).await?,
        None => false,
    };
    proceeds(SessionDropped {
        user_id: caller.user_id,
        drop_success,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDropped {
    pub user_id: Uuid,
    pub drop_success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedInUser {
    pub session_id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn account(name: &str) -> CreateUser {
        CreateUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password: "hunter22".to_string(),
        }
    }

    #[test]
    fn passwords_round_trip_through_phc_hash() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$pbkdf2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not a hash"));
    }

    #[test]
    fn session_ids_are_hex_sha256() {
        let ssid = new_session_id();
        assert_eq!(ssid.len(), 64);
        assert!(ssid.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(ssid, new_session_id());
    }

    #[tokio::test]
    async fn live_session_is_reused() {
        let store = MemoryStore::new();
        let user = register_account(&store, account("kaio")).await.unwrap();
        let first = open_session(&store, user.uuid, Duration::days(2)).await.unwrap();
        let second = open_session(&store, user.uuid, Duration::days(2)).await.unwrap();
        assert_eq!(first.ssid, second.ssid);
        assert!(matches!(
            ensure_authenticated(&first.ssid, &store).await.unwrap(),
            AuthResult::Success(_)
        ));
    }

    #[tokio::test]
    async fn expired_session_is_dropped() {
        let store = MemoryStore::new();
        let user = register_account(&store, account("kaio")).await.unwrap();
        store
            .create_session(UserSession {
                ssid: "stale".to_string(),
                belongs_to: user.uuid,
                expires_at: Utc::now() - Duration::minutes(1),
            })
            .await
            .unwrap();

        assert!(matches!(
            ensure_authenticated("stale", &store).await.unwrap(),
            AuthResult::SessionExpired
        ));
        assert!(store.find_session("stale").await.unwrap().is_none());
        assert!(matches!(
            ensure_authenticated("", &store).await.unwrap(),
            AuthResult::InvalidSession
        ));
    }

    #[tokio::test]
    async fn basic_credentials_are_checked() {
        let store = MemoryStore::new();
        register_account(&store, account("kaio")).await.unwrap();
        assert!(authenticate_basic("kaio", "hunter22", &store).await.unwrap().is_some());
        assert!(authenticate_basic("kaio", "wrong", &store).await.unwrap().is_none());
        assert!(authenticate_basic("nobody", "hunter22", &store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_credentials_are_rejected() {
        let store = MemoryStore::new();
        let mut blank = account("kaio");
        blank.password = String::new();
        match register_account(&store, blank).await.unwrap_err() {
            Error::Validation(fields) => assert!(fields.contains_key("password")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
