// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// The wire and storage representation is the human-readable label
/// (`"Pending"`, `"In Progress"`, `"Completed"`), shared with the frontend.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
pub enum TaskStatus {
    #[serde(rename = "Pending")]
    #[sqlx(rename = "Pending")]
    Pending,

    #[serde(rename = "In Progress")]
    #[sqlx(rename = "In Progress")]
    InProgress,

    #[serde(rename = "Completed")]
    #[sqlx(rename = "Completed")]
    Completed,
}

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    /// `Completed` is terminal: no transition out of it is accepted.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Pending" => Ok(Self::Pending),
            "In Progress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            other => Err(format!("Unknown task status: {other}")),
        }
    }
}

/// Represents a task owned by one staff member.
///
/// `employee_id` is a copy of the owner's external identifier, written once
/// when the task is created and never updated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub id: i64,

    /// Internal id of the owning `Staff` row.
    pub employee_ref: i64,

    pub employee_id: String,

    pub project: String,

    pub title: String,

    pub description: String,

    pub status: TaskStatus,

    // Stamped on the first transition into `In Progress`.
    pub start_date: Option<DateTime<Utc>>,

    // Both stamped on the transition into `Completed`.
    pub end_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// A task joined with its owner's identity, as returned to admins.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct TaskWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub task: Task,

    pub owner_name: String,

    pub owner_employee_id: String,
}

/// Body of `POST /api/tasks`.
/// Fields default to empty so that missing fields are reported as a
/// validation error rather than a deserialization failure.
#[derive(Deserialize, Debug, Default)]
pub struct CreateTaskPayload {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl CreateTaskPayload {
    pub fn is_complete(&self) -> bool {
        [&self.project, &self.title, &self.description]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// Body of `PUT /api/tasks/{id}/status`.
#[derive(Deserialize, Debug, Default)]
pub struct UpdateTaskStatusPayload {
    #[serde(default)]
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Admin => "admin",
        }
    }
}

/// A staff directory record.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Staff {
    pub id: i64,
    pub employee_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub leave_quota: i64,
}

/// Data needed to insert a staff record.
#[derive(Deserialize, Debug, Clone)]
pub struct NewStaff {
    pub employee_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub leave_quota: i64,
}

/// The office allowlist as configured by an admin.
///
/// Admins may store either a proper list or a single comma-separated string;
/// both shapes are accepted on the wire and in storage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum AllowedIps {
    List(Vec<String>),
    Delimited(String),
}

impl AllowedIps {
    /// Returns the raw entries, splitting the delimited form on commas.
    /// Entries are neither trimmed nor filtered here.
    pub fn entries(&self) -> Vec<&str> {
        match self {
            Self::List(ips) => ips.iter().map(String::as_str).collect(),
            Self::Delimited(raw) => raw.split(',').collect(),
        }
    }
}

/// Singleton admin settings record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AdminSettings {
    pub allowed_ips: AllowedIps,
    pub updated_at: DateTime<Utc>,
}

/// Body of `PUT /api/admin/settings`.
#[derive(Deserialize, Debug)]
pub struct UpdateSettingsPayload {
    pub allowed_ips: AllowedIps,
}

/// Outcome of the office network check, attached to every gated request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkCheck {
    #[serde(rename = "clientIP")]
    pub client_ip: String,

    #[serde(rename = "ipAllowed")]
    pub ip_allowed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CorrectionStatus {
    Pending,
    Approved,
    Rejected,
}

impl FromStr for CorrectionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("Unknown correction status: {other}")),
        }
    }
}

/// An employee's request to amend the punch times of one day.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct CorrectionRequest {
    pub id: i64,
    pub employee_ref: i64,
    pub employee_id: String,
    pub correction_date: NaiveDate,
    pub requested_punch_in: DateTime<Utc>,
    pub requested_punch_out: DateTime<Utc>,
    pub reason: String,
    pub status: CorrectionStatus,
    pub admin_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// A correction request joined with the requester's name, for the admin panel.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct CorrectionWithName {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub correction: CorrectionRequest,

    pub name: String,
}

/// Body of `POST /api/corrections`.
#[derive(Deserialize, Debug)]
pub struct CreateCorrectionPayload {
    pub correction_date: NaiveDate,
    pub requested_punch_in: DateTime<Utc>,
    pub requested_punch_out: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

/// Body of `PUT /api/corrections/{id}`.
#[derive(Deserialize, Debug, Default)]
pub struct ReviewCorrectionPayload {
    #[serde(default)]
    pub status: String,
    pub admin_comment: Option<String>,
}
