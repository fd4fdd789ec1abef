// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use ems_common::Role;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::handlers::AppError;
use crate::state::AppState;

/// Claims carried by the bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub employee_id: String,
    pub role: Role,
    pub exp: i64,
}

/// The authenticated caller, attached to the request by [`authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub employee_id: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// HS256 signing and verification keys derived from the shared secret.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Signs a token for `employee_id` that expires after `ttl`.
    pub fn issue_token(&self, employee_id: &str, role: Role, ttl: Duration) -> Result<String> {
        let claims = Claims {
            employee_id: employee_id.to_string(),
            role,
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("Failed to sign token")
    }

    /// Verifies signature and expiry and returns the caller.
    pub fn verify(&self, token: &str) -> Result<AuthUser> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .context("Invalid token")?;
        Ok(AuthUser {
            employee_id: data.claims.employee_id,
            role: data.claims.role,
        })
    }
}

/// Middleware requiring a valid `Authorization: Bearer <token>` header.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "Authentication required"))?;

    let user = state.auth.verify(token).map_err(|e| {
        debug!("Rejected bearer token: {:?}", e);
        AppError::new(StatusCode::UNAUTHORIZED, "Invalid or expired token")
    })?;

    debug!(
        "Authenticated employee_id={}, role={}",
        user.employee_id,
        user.role.as_str()
    );
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
