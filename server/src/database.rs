// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ems_common::{
    AdminSettings, AllowedIps, CorrectionRequest, CorrectionStatus, CorrectionWithName,
    CreateCorrectionPayload, CreateTaskPayload, NewStaff, Staff, Task, TaskStatus, TaskWithOwner,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS staff (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        phone TEXT NULL,
        role TEXT NOT NULL,
        leave_quota INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_ref INTEGER NOT NULL REFERENCES staff(id),
        employee_id TEXT NOT NULL,
        project TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'Pending',
        start_date TIMESTAMP WITH TIME ZONE NULL,
        end_date TIMESTAMP WITH TIME ZONE NULL,
        completed_at TIMESTAMP WITH TIME ZONE NULL,
        created_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_employee_ref ON tasks(employee_ref);

    CREATE TABLE IF NOT EXISTS admin_settings (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        allowed_ips TEXT NOT NULL,
        allowed_ips_shape TEXT NOT NULL DEFAULT 'delimited' CHECK (allowed_ips_shape IN ('list', 'delimited')),
        updated_at TIMESTAMP NOT NULL
    );

    CREATE TABLE IF NOT EXISTS corrections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_ref INTEGER NOT NULL REFERENCES staff(id),
        employee_id TEXT NOT NULL,
        correction_date DATE NOT NULL,
        requested_punch_in TIMESTAMP NOT NULL,
        requested_punch_out TIMESTAMP NOT NULL,
        reason TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        admin_comment TEXT NULL,
        created_at TIMESTAMP NOT NULL,
        reviewed_at TIMESTAMP WITH TIME ZONE NULL
    );
"#;

/// Establishes the database connection pool.
/// If the database does not exist, it creates it (and its directory).
/// It also ensures every table has the correct schema.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database {}", database_url);
        ensure_parent_dir(database_url)?;
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Opens a fresh in-memory database with the full schema.
/// The pool holds a single connection, since every SQLite in-memory
/// connection is its own database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Creates the tables if they are missing.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("Failed to create tables")?;

    info!("'staff', 'tasks', 'admin_settings' and 'corrections' tables are ready.");
    Ok(())
}

fn ensure_parent_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();

    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}

// --- Staff directory ---

/// Inserts a staff record and returns it with its assigned id.
pub async fn insert_staff(pool: &SqlitePool, staff: &NewStaff) -> Result<Staff> {
    debug!(
        "Insert staff: employee_id={}, email={}, role={}",
        staff.employee_id,
        staff.email,
        staff.role.as_str()
    );

    let id = sqlx::query(
        "INSERT INTO staff (employee_id, name, email, phone, role, leave_quota) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&staff.employee_id)
    .bind(&staff.name)
    .bind(&staff.email)
    .bind(&staff.phone)
    .bind(staff.role)
    .bind(staff.leave_quota)
    .execute(pool)
    .await
    .context("Failed to insert staff into DB")?
    .last_insert_rowid();

    Ok(Staff {
        id,
        employee_id: staff.employee_id.clone(),
        name: staff.name.clone(),
        email: staff.email.clone(),
        phone: staff.phone.clone(),
        role: staff.role,
        leave_quota: staff.leave_quota,
    })
}

/// Inserts a staff record unless one with the same email already exists.
/// Returns `None` when the record was skipped.
pub async fn insert_staff_if_absent(pool: &SqlitePool, staff: &NewStaff) -> Result<Option<Staff>> {
    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM staff WHERE email = ?")
        .bind(&staff.email)
        .fetch_optional(pool)
        .await
        .context("Failed to look up staff by email")?;

    if existing.is_some() {
        return Ok(None);
    }

    insert_staff(pool, staff).await.map(Some)
}

/// Looks up a staff record by its external employee id.
pub async fn find_staff_by_employee_id(pool: &SqlitePool, employee_id: &str) -> Result<Option<Staff>> {
    sqlx::query_as::<_, Staff>("SELECT * FROM staff WHERE employee_id = ?")
        .bind(employee_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up staff by employee id")
}

/// Retrieves every staff record, ordered by name.
pub async fn list_staff(pool: &SqlitePool) -> Result<Vec<Staff>> {
    sqlx::query_as::<_, Staff>("SELECT * FROM staff ORDER BY name ASC, id ASC")
        .fetch_all(pool)
        .await
        .context("Failed to retrieve staff from DB")
}

// --- Tasks ---

/// Inserts a new `Pending` task owned by `owner`.
pub async fn create_task_in_db(
    pool: &SqlitePool,
    owner: &Staff,
    payload: CreateTaskPayload,
    created_at: DateTime<Utc>,
) -> Result<Task> {
    debug!(
        "Insert task: employee_ref={}, employee_id={}, project={}, title={}, created_at={}",
        owner.id, owner.employee_id, payload.project, payload.title, created_at
    );

    let status = TaskStatus::Pending;
    let id = sqlx::query(
        "INSERT INTO tasks (employee_ref, employee_id, project, title, description, status, start_date, end_date, completed_at, created_at) VALUES (?, ?, ?, ?, ?, ?, NULL, NULL, NULL, ?)",
    )
    .bind(owner.id)
    .bind(&owner.employee_id)
    .bind(&payload.project)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(status)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to insert task into DB")?
    .last_insert_rowid();

    Ok(Task {
        id,
        employee_ref: owner.id,
        employee_id: owner.employee_id.clone(),
        project: payload.project,
        title: payload.title,
        description: payload.description,
        status,
        start_date: None,
        end_date: None,
        completed_at: None,
        created_at,
    })
}

/// Retrieves the tasks owned by one staff member, newest first.
pub async fn get_tasks_for_owner(pool: &SqlitePool, employee_ref: i64) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE employee_ref = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(employee_ref)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve employee tasks from DB")
}

/// Retrieves every task joined with its owner's name and employee id, newest first.
pub async fn get_all_tasks_with_owner(pool: &SqlitePool) -> Result<Vec<TaskWithOwner>> {
    sqlx::query_as::<_, TaskWithOwner>(
        r#"
        SELECT tasks.*, staff.name AS owner_name, staff.employee_id AS owner_employee_id
        FROM tasks
        JOIN staff ON staff.id = tasks.employee_ref
        ORDER BY tasks.created_at DESC, tasks.id DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to retrieve all tasks from DB")
}

/// Finds a task by id, but only if it belongs to `employee_ref`.
pub async fn find_task_for_owner(
    pool: &SqlitePool,
    task_id: i64,
    employee_ref: i64,
) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ? AND employee_ref = ?")
        .bind(task_id)
        .bind(employee_ref)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to retrieve task with ID: {task_id}"))
}

/// Persists a status transition computed from a previously read task.
/// The write only happens while the stored status still equals `expected`;
/// returns false when another writer got there first.
pub async fn save_task_transition(
    pool: &SqlitePool,
    updated: &Task,
    expected: TaskStatus,
) -> Result<bool> {
    debug!(
        "Saving task {} transition {} -> {}",
        updated.id, expected, updated.status
    );

    let result = sqlx::query(
        "UPDATE tasks SET status = ?, start_date = ?, end_date = ?, completed_at = ? WHERE id = ? AND employee_ref = ? AND status = ?",
    )
    .bind(updated.status)
    .bind(updated.start_date)
    .bind(updated.end_date)
    .bind(updated.completed_at)
    .bind(updated.id)
    .bind(updated.employee_ref)
    .bind(expected)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to update status of task with ID: {}", updated.id))?;

    Ok(result.rows_affected() > 0)
}

// --- Admin settings ---

const LIST_SHAPE: &str = "list";
const DELIMITED_SHAPE: &str = "delimited";

/// Returns the stored text and its shape tag. Lists are kept as JSON arrays.
fn encode_allowed_ips(allowed_ips: &AllowedIps) -> Result<(String, &'static str)> {
    match allowed_ips {
        AllowedIps::List(ips) => {
            let encoded = serde_json::to_string(ips).context("Failed to encode allowlist")?;
            Ok((encoded, LIST_SHAPE))
        }
        AllowedIps::Delimited(raw) => Ok((raw.clone(), DELIMITED_SHAPE)),
    }
}

fn decode_allowed_ips(stored: String, shape: &str) -> Result<AllowedIps> {
    match shape {
        LIST_SHAPE => serde_json::from_str::<Vec<String>>(&stored)
            .map(AllowedIps::List)
            .context("Failed to decode stored allowlist"),
        _ => Ok(AllowedIps::Delimited(stored)),
    }
}

/// Reads the singleton admin settings record, if one has been configured.
pub async fn get_admin_settings(pool: &SqlitePool) -> Result<Option<AdminSettings>> {
    let row: Option<(String, String, DateTime<Utc>)> = sqlx::query_as(
        "SELECT allowed_ips, allowed_ips_shape, updated_at FROM admin_settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await
    .context("Failed to retrieve admin settings from DB")?;

    row.map(|(allowed_ips, shape, updated_at)| {
        Ok(AdminSettings {
            allowed_ips: decode_allowed_ips(allowed_ips, &shape)?,
            updated_at,
        })
    })
    .transpose()
}

/// Creates or replaces the singleton admin settings record.
pub async fn upsert_admin_settings(
    pool: &SqlitePool,
    allowed_ips: &AllowedIps,
    updated_at: DateTime<Utc>,
) -> Result<AdminSettings> {
    let (encoded, shape) = encode_allowed_ips(allowed_ips)?;
    debug!("Storing admin settings: allowed_ips={} ({})", encoded, shape);

    sqlx::query(
        r#"
        INSERT INTO admin_settings (id, allowed_ips, allowed_ips_shape, updated_at) VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            allowed_ips = excluded.allowed_ips,
            allowed_ips_shape = excluded.allowed_ips_shape,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&encoded)
    .bind(shape)
    .bind(updated_at)
    .execute(pool)
    .await
    .context("Failed to store admin settings")?;

    info!("Admin settings updated.");

    Ok(AdminSettings {
        allowed_ips: allowed_ips.clone(),
        updated_at,
    })
}

// --- Attendance corrections ---

/// Inserts a new `pending` correction request owned by `owner`.
pub async fn create_correction_in_db(
    pool: &SqlitePool,
    owner: &Staff,
    payload: CreateCorrectionPayload,
    created_at: DateTime<Utc>,
) -> Result<CorrectionRequest> {
    debug!(
        "Insert correction: employee_ref={}, correction_date={}, punch_in={}, punch_out={}",
        owner.id, payload.correction_date, payload.requested_punch_in, payload.requested_punch_out
    );

    let status = CorrectionStatus::Pending;
    let id = sqlx::query(
        "INSERT INTO corrections (employee_ref, employee_id, correction_date, requested_punch_in, requested_punch_out, reason, status, admin_comment, created_at, reviewed_at) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, NULL)",
    )
    .bind(owner.id)
    .bind(&owner.employee_id)
    .bind(payload.correction_date)
    .bind(payload.requested_punch_in)
    .bind(payload.requested_punch_out)
    .bind(&payload.reason)
    .bind(status)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to insert correction into DB")?
    .last_insert_rowid();

    Ok(CorrectionRequest {
        id,
        employee_ref: owner.id,
        employee_id: owner.employee_id.clone(),
        correction_date: payload.correction_date,
        requested_punch_in: payload.requested_punch_in,
        requested_punch_out: payload.requested_punch_out,
        reason: payload.reason,
        status,
        admin_comment: None,
        created_at,
        reviewed_at: None,
    })
}

/// Retrieves one staff member's correction requests, newest first.
pub async fn get_corrections_for_owner(
    pool: &SqlitePool,
    employee_ref: i64,
) -> Result<Vec<CorrectionRequest>> {
    sqlx::query_as::<_, CorrectionRequest>(
        "SELECT * FROM corrections WHERE employee_ref = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(employee_ref)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve employee corrections from DB")
}

/// Retrieves every correction request with the requester's name, newest first.
pub async fn get_all_corrections_with_name(pool: &SqlitePool) -> Result<Vec<CorrectionWithName>> {
    sqlx::query_as::<_, CorrectionWithName>(
        r#"
        SELECT corrections.*, staff.name AS name
        FROM corrections
        JOIN staff ON staff.id = corrections.employee_ref
        ORDER BY corrections.created_at DESC, corrections.id DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to retrieve all corrections from DB")
}

pub async fn find_correction(pool: &SqlitePool, correction_id: i64) -> Result<Option<CorrectionRequest>> {
    sqlx::query_as::<_, CorrectionRequest>("SELECT * FROM corrections WHERE id = ?")
        .bind(correction_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to retrieve correction with ID: {correction_id}"))
}

/// Records an admin decision on a correction that is still pending.
/// Returns the updated request, or `None` when it was no longer pending.
pub async fn review_correction_in_db(
    pool: &SqlitePool,
    correction_id: i64,
    decision: CorrectionStatus,
    admin_comment: Option<String>,
    reviewed_at: DateTime<Utc>,
) -> Result<Option<CorrectionRequest>> {
    let result = sqlx::query(
        "UPDATE corrections SET status = ?, admin_comment = ?, reviewed_at = ? WHERE id = ? AND status = ?",
    )
    .bind(decision)
    .bind(&admin_comment)
    .bind(reviewed_at)
    .bind(correction_id)
    .bind(CorrectionStatus::Pending)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to review correction with ID: {correction_id}"))?;

    info!(
        "Reviewed {} rows for correction ID: {}",
        result.rows_affected(),
        correction_id
    );

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    find_correction(pool, correction_id).await
}
