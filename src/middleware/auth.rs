// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie name.
pub const AUTH_COOKIE: &str = "treequest_token";

/// Role allowed to verify plantings.
pub const SERVICE_ROLE: &str = "service_role";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (auth provider user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl AuthUser {
    pub fn is_service_role(&self) -> bool {
        self.role.as_deref() == Some(SERVICE_ROLE)
    }
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(AUTH_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token.to_string(),
            None => return Err(StatusCode::UNAUTHORIZED),
        }
    };

    let auth_user = verify_jwt(&token, &state.config.jwt_signing_key).map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        StatusCode::UNAUTHORIZED
    })?;

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Decode and validate a session token.
pub fn verify_jwt(token: &str, signing_key: &[u8]) -> anyhow::Result<AuthUser> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    let claims = decode::<Claims>(token, &key, &validation)?.claims;

    if claims.sub.trim().is_empty() {
        anyhow::bail!("token has an empty subject");
    }

    Ok(AuthUser {
        user_id: claims.sub,
        role: claims.role,
        email: claims.email,
        name: claims.name,
    })
}

/// Create a JWT for a user session.
pub fn create_jwt(
    user_id: &str,
    role: Option<&str>,
    signing_key: &[u8],
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 30 * 24 * 60 * 60, // 30 days
        role: role.map(str::to_string),
        email: None,
        name: None,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}
