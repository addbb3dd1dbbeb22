//! Password hashing and signed session tokens.
//!
//! Sessions are HS256 JWTs carried in the `auth_token` cookie (or an
//! `Authorization: Bearer` header). bcrypt runs on the blocking pool so it
//! never stalls the request executor.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{CrmError, Result};
use crate::models::{is_admin_role, LoginRecord};

pub const AUTH_COOKIE: &str = "auth_token";
pub const MIN_PASSWORD_LEN: usize = 8;
const BCRYPT_COST: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Account id
    pub sub: i64,
    pub employee_id: i64,
    pub username: String,
    pub role_id: i64,
    pub role_title: String,
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, decoded from a valid token.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Session {
    pub account_id: i64,
    pub employee_id: i64,
    pub username: String,
    pub role_id: i64,
    pub role_title: String,
    pub is_admin: bool,
}

impl Session {
    pub fn has_role(&self, titles: &[&str]) -> bool {
        self.is_admin || titles.iter().any(|t| *t == self.role_title)
    }

    pub fn actor(&self) -> (i64, &str) {
        (self.employee_id, self.username.as_str())
    }
}

impl From<Claims> for Session {
    fn from(c: Claims) -> Self {
        Self {
            account_id: c.sub,
            employee_id: c.employee_id,
            username: c.username,
            role_id: c.role_id,
            role_title: c.role_title,
            is_admin: c.is_admin,
        }
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CrmError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| anyhow::anyhow!("password hashing task failed: {}", e))?
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash)
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| anyhow::anyhow!("password verification task failed: {}", e))?
        // A malformed stored hash is a mismatch, not a server fault.
        .unwrap_or(false);
    Ok(matches)
}

/// Checks a login attempt against the stored record and returns the session it grants.
pub async fn authenticate(record: Option<LoginRecord>, password: &str) -> Result<Session> {
    let record =
        record.ok_or_else(|| CrmError::Unauthorized("Invalid username or password".into()))?;

    if !record.is_active {
        return Err(CrmError::forbidden("Account is inactive"));
    }
    if record.password_hash.trim().is_empty() {
        return Err(CrmError::validation("Account not properly configured"));
    }
    if !verify_password(password, &record.password_hash).await? {
        return Err(CrmError::Unauthorized(
            "Invalid username or password".into(),
        ));
    }

    let role_title = record.role_title.clone().unwrap_or_default();
    Ok(Session {
        account_id: record.id,
        employee_id: record.employee_id,
        username: record.username,
        is_admin: is_admin_role(Some(record.role_id), Some(&role_title)),
        role_id: record.role_id,
        role_title,
    })
}

pub fn issue_token(session: &Session, secret: &str, session_hours: i64) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: session.account_id,
        employee_id: session.employee_id,
        username: session.username.clone(),
        role_id: session.role_id,
        role_title: session.role_title.clone(),
        is_admin: session.is_admin,
        iat: now.timestamp(),
        exp: (now + Duration::hours(session_hours)).timestamp(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("failed to sign token: {}", e))?;
    Ok(token)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Session> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| CrmError::Unauthorized("Invalid or expired session".into()))?;
    Ok(data.claims.into())
}

/// `Set-Cookie` value for a fresh session.
pub fn session_cookie(token: &str, session_hours: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        AUTH_COOKIE,
        token,
        session_hours * 3600
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", AUTH_COOKIE)
}

/// Token from the `Cookie` header, falling back to `Authorization: Bearer`.
pub fn token_from_headers(cookie_header: Option<&str>, authorization: Option<&str>) -> Option<String> {
    let from_cookie = cookie_header.and_then(|header| {
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == AUTH_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
    });

    from_cookie.or_else(|| {
        authorization
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    })
}
