// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::Result;
use chrono::Utc;
use ems_common::{AllowedIps, NewStaff, Role, Staff};
use sqlx::SqlitePool;
use tracing::info;

use crate::database;

/// The accounts created on a fresh installation.
pub fn default_staff() -> Vec<NewStaff> {
    [
        ("ISARED025014", "shashi", Role::Employee),
        ("ISARED025015", "nishanth", Role::Employee),
        ("ISARED025016", "amit", Role::Admin),
    ]
    .into_iter()
    .map(|(employee_id, name, role)| NewStaff {
        employee_id: employee_id.to_string(),
        name: name.to_string(),
        email: format!("{name}@example.com"),
        phone: None,
        role,
        leave_quota: 12,
    })
    .collect()
}

/// Inserts `staff`, skipping accounts whose email is already present, and
/// optionally stores an office allowlist. Returns the newly inserted records.
pub async fn seed(
    pool: &SqlitePool,
    staff: &[NewStaff],
    allowed_ips: Option<AllowedIps>,
) -> Result<Vec<Staff>> {
    let mut inserted = Vec::new();
    for member in staff {
        match database::insert_staff_if_absent(pool, member).await? {
            Some(created) => {
                info!("Inserted {} ({})", created.name, created.email);
                inserted.push(created);
            }
            None => info!("{} already exists. Skipping.", member.email),
        }
    }

    if let Some(allowed_ips) = allowed_ips {
        database::upsert_admin_settings(pool, &allowed_ips, Utc::now()).await?;
    }

    Ok(inserted)
}
