// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Office network gate.
//!
//! Every `/api` request is checked against the admin-configured allowlist of
//! office addresses before authentication runs. Loopback callers are let
//! through without consulting the allowlist.
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Json, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use ems_common::{AdminSettings, NetworkCheck};
use tracing::{debug, error, info};

use crate::state::AppState;

pub const FORWARDED_FOR: &str = "x-forwarded-for";
pub const LOOPBACK: &str = "127.0.0.1";

const MAPPED_V4_PREFIX: &str = "::ffff:";
const V6_LOOPBACK: &str = "::1";

/// Normalizes one address: drops whitespace, strips the IPv4-mapped IPv6
/// prefix and maps the IPv6 loopback to `127.0.0.1`.
pub fn normalize_ip(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    let unmapped = match compact.get(..MAPPED_V4_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(MAPPED_V4_PREFIX) => {
            &compact[MAPPED_V4_PREFIX.len()..]
        }
        _ => compact.as_str(),
    };

    if unmapped == V6_LOOPBACK {
        LOOPBACK.to_string()
    } else {
        unmapped.to_string()
    }
}

/// Joins every `x-forwarded-for` line into one comma-separated value, in
/// arrival order. Lines that are not valid UTF-8 are skipped.
pub fn forwarded_header(headers: &HeaderMap) -> Option<String> {
    let lines: Vec<&str> = headers
        .get_all(FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join(","))
    }
}

/// Lists the normalized candidate addresses of a request.
///
/// The forwarded header wins when present and non-empty; otherwise the raw
/// connection address is used. There is always at least one candidate, the
/// first one being the canonical client address.
pub fn client_candidates(forwarded: Option<&str>, remote: Option<SocketAddr>) -> Vec<String> {
    let raw = match forwarded.filter(|header| !header.trim().is_empty()) {
        Some(header) => header.to_string(),
        None => remote.map(|addr| addr.ip().to_string()).unwrap_or_default(),
    };

    raw.split(',').map(normalize_ip).collect()
}

/// Development bypass: allows the request when any candidate is loopback.
pub fn loopback_check(candidates: &[String]) -> Option<NetworkCheck> {
    candidates
        .iter()
        .any(|ip| ip == LOOPBACK)
        .then(|| NetworkCheck {
            client_ip: canonical(candidates),
            ip_allowed: true,
        })
}

/// Normalized allowlist, with empty entries dropped.
pub fn normalized_allowlist(settings: &AdminSettings) -> Vec<String> {
    settings
        .allowed_ips
        .entries()
        .into_iter()
        .map(normalize_ip)
        .filter(|ip| !ip.is_empty())
        .collect()
}

/// Compares every candidate against the configured allowlist.
pub fn allowlist_check(candidates: &[String], settings: &AdminSettings) -> NetworkCheck {
    let allowed = normalized_allowlist(settings);
    debug!("Allowed office IPs: {}", allowed.join(", "));

    NetworkCheck {
        client_ip: canonical(candidates),
        ip_allowed: candidates.iter().any(|ip| allowed.contains(ip)),
    }
}

fn canonical(candidates: &[String]) -> String {
    candidates.first().cloned().unwrap_or_default()
}

/// Why the gate refused a request.
#[derive(Debug)]
pub enum GateError {
    Denied(NetworkCheck),
    NotConfigured,
    Internal,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            Self::Denied(check) => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "message": "Access denied. Not on allowed WiFi.",
                    "clientIP": check.client_ip,
                    "ipAllowed": check.ip_allowed,
                })),
            )
                .into_response(),
            Self::NotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": "Admin settings not configured" })),
            )
                .into_response(),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": "Internal server error during IP check" })),
            )
                .into_response(),
        }
    }
}

/// Middleware enforcing the office network restriction.
/// On success the `NetworkCheck` is available to handlers as an extension.
pub async fn check_office_ip(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let check = evaluate_request(&state, request.headers(), remote_addr(&request)).await?;
    request.extensions_mut().insert(check);
    Ok(next.run(request).await)
}

fn remote_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

async fn evaluate_request(
    state: &AppState,
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
) -> Result<NetworkCheck, GateError> {
    let forwarded = forwarded_header(headers);
    let candidates = client_candidates(forwarded.as_deref(), remote);

    debug!("Raw x-forwarded-for: {}", forwarded.as_deref().unwrap_or_default());
    debug!("Raw connection address: {:?}", remote);
    debug!("Normalized client IP: {}", canonical(&candidates));

    if let Some(check) = loopback_check(&candidates) {
        debug!("Loopback client detected, skipping office IP restriction.");
        return Ok(check);
    }

    let settings = match state.load_settings().await {
        Ok(Some(settings)) => settings,
        Ok(None) => {
            error!("Office IP check failed: admin settings are not configured.");
            return Err(GateError::NotConfigured);
        }
        Err(e) => {
            error!("Office IP check failed: {:?}", e);
            return Err(GateError::Internal);
        }
    };

    let check = allowlist_check(&candidates, &settings);
    info!(
        "Office IP check: client={}, allowed={}",
        check.client_ip, check.ip_allowed
    );

    if check.ip_allowed {
        Ok(check)
    } else {
        Err(GateError::Denied(check))
    }
}
