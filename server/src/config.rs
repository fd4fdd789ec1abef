// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::env;
use std::net::SocketAddr;

use anyhow::{Context, Result};

const DEFAULT_DB_URL: &str = "sqlite://database/ems.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Runtime configuration of the server, read from `EMS_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
}

impl ServerConfig {
    /// Reads the configuration from the environment.
    /// `EMS_JWT_SECRET` is mandatory, the other variables have defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            lookup("EMS_DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        let bind_addr = lookup("EMS_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("EMS_BIND_ADDR is not a valid socket address")?;

        let jwt_secret = lookup("EMS_JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .context("EMS_JWT_SECRET must be set")?;

        Ok(Self {
            database_url,
            bind_addr,
            jwt_secret,
        })
    }
}
