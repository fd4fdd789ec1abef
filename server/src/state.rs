// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::sync::Arc;

use anyhow::Result;
use ems_common::AdminSettings;
use parking_lot::RwLock;
use sqlx::SqlitePool;
use tracing::debug;

use crate::auth::AuthKeys;
use crate::database;

/// Shared application state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub auth: Arc<AuthKeys>,
    pub settings: Arc<SettingsCache>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt_secret: &str) -> Self {
        Self {
            pool,
            auth: Arc::new(AuthKeys::new(jwt_secret)),
            settings: Arc::new(SettingsCache::default()),
        }
    }

    /// Returns the admin settings, reading the database only on a cache miss.
    /// A missing record is not cached, so configuring it later takes effect
    /// immediately.
    pub async fn load_settings(&self) -> Result<Option<AdminSettings>> {
        if let Some(settings) = self.settings.get() {
            return Ok(Some(settings));
        }

        debug!("Admin settings cache miss, reading from the database.");
        let generation = self.settings.generation();
        let loaded = database::get_admin_settings(&self.pool).await?;
        if let Some(settings) = &loaded {
            if !self.settings.store_if_current(generation, settings.clone()) {
                debug!("Admin settings changed during the read, not caching it.");
            }
        }
        Ok(loaded)
    }
}

/// In-process copy of the singleton admin settings.
/// Writers must call `invalidate` after changing the record. Every
/// invalidation bumps the generation, and a load that started under an older
/// generation is discarded instead of cached.
#[derive(Default)]
pub struct SettingsCache {
    inner: RwLock<CacheSlot>,
}

#[derive(Default)]
struct CacheSlot {
    generation: u64,
    settings: Option<AdminSettings>,
}

impl SettingsCache {
    pub fn get(&self) -> Option<AdminSettings> {
        self.inner.read().settings.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Caches `settings` read under `generation`. Returns false, leaving the
    /// cache empty, if an invalidation happened since.
    pub fn store_if_current(&self, generation: u64, settings: AdminSettings) -> bool {
        let mut slot = self.inner.write();
        if slot.generation != generation {
            return false;
        }
        slot.settings = Some(settings);
        true
    }

    pub fn invalidate(&self) {
        let mut slot = self.inner.write();
        slot.generation = slot.generation.wrapping_add(1);
        slot.settings = None;
    }
}
