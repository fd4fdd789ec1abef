// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::env;

use chrono::Duration;
use ems_common::AllowedIps;
use ems_server::auth::AuthKeys;
use ems_server::config::ServerConfig;
use ems_server::{database, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env()?;
    let pool = database::establish_connection_pool(&config.database_url).await?;

    let allowed_ips = env::var("EMS_SEED_ALLOWED_IPS")
        .ok()
        .filter(|ips| !ips.trim().is_empty())
        .map(AllowedIps::Delimited);

    let staff = seed::default_staff();
    seed::seed(&pool, &staff, allowed_ips).await?;

    // Tokens are printed for every default account, including pre-existing ones.
    let keys = AuthKeys::new(&config.jwt_secret);
    for member in &staff {
        let token = keys.issue_token(&member.employee_id, member.role, Duration::days(7))?;
        println!("{} ({}): {}", member.name, member.role.as_str(), token);
    }

    tracing::info!("Seeding finished.");
    Ok(())
}
