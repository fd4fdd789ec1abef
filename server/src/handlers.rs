// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::auth::AuthUser;
use crate::lifecycle::{self, TransitionError};
use crate::state::AppState;
use crate::{database, gate};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, FromRequest, FromRequestParts, Json, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use ems_common::{
    AdminSettings, CorrectionRequest, CorrectionStatus, CorrectionWithName,
    CreateCorrectionPayload, CreateTaskPayload, ReviewCorrectionPayload, Staff, Task, TaskStatus,
    TaskWithOwner, UpdateSettingsPayload, UpdateTaskStatusPayload,
};
use tracing::{debug, error, info};

/// Resolves the caller's staff record, or 404 when the directory has no match.
async fn current_staff(state: &AppState, user: &AuthUser) -> Result<Staff, AppError> {
    database::find_staff_by_employee_id(&state.pool, &user.employee_id)
        .await?
        .ok_or_else(|| {
            error!("No staff record for employee_id {}.", user.employee_id);
            AppError::new(StatusCode::NOT_FOUND, "Employee not found")
        })
}

fn require_admin(user: &AuthUser) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        error!("Employee {} attempted an admin-only operation.", user.employee_id);
        Err(AppError::new(StatusCode::FORBIDDEN, "Admins only"))
    }
}

// --- Tasks ---

/// Handler for creating a task owned by the caller.
pub async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    debug!("Received request to create task for employee: {}", user.employee_id);

    if !payload.is_complete() {
        error!("Validation failed: project, title or description is empty.");
        return Err(AppError::new(StatusCode::BAD_REQUEST, "All fields are required"));
    }

    let staff = current_staff(&state, &user).await?;
    let new_task = database::create_task_in_db(&state.pool, &staff, payload, Utc::now()).await?;

    info!("Task created successfully with ID: {}", new_task.id);

    Ok((StatusCode::CREATED, Json(new_task)))
}

/// Handler for moving one of the caller's tasks to a new status.
pub async fn update_task_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(task_id): AppPath<i64>,
    AppJson(payload): AppJson<UpdateTaskStatusPayload>,
) -> Result<Json<Task>, AppError> {
    debug!(
        "Received request to set task {} to '{}' for employee: {}",
        task_id, payload.status, user.employee_id
    );

    let next = payload.status.parse::<TaskStatus>().map_err(|e: String| {
        error!("Validation failed: {}", e);
        AppError::new(StatusCode::BAD_REQUEST, "Invalid status")
    })?;

    let staff = current_staff(&state, &user).await?;
    let task = database::find_task_for_owner(&state.pool, task_id, staff.id)
        .await?
        .ok_or_else(|| {
            error!("Task with ID {} not found for employee {}.", task_id, staff.employee_id);
            AppError::new(StatusCode::NOT_FOUND, "Task not found")
        })?;

    let updated = commit_transition(&state, &task, next).await?;
    Ok(Json(updated))
}

/// Applies `next` to the task as it was read and writes it back only if the
/// stored status still matches what was observed.
async fn commit_transition(
    state: &AppState,
    task: &Task,
    next: TaskStatus,
) -> Result<Task, AppError> {
    let updated = lifecycle::apply_transition(task, next, Utc::now()).map_err(|e| match e {
        TransitionError::Locked => {
            error!("Task with ID {} is completed and locked.", task.id);
            AppError::new(StatusCode::BAD_REQUEST, "Task already completed and locked")
        }
    })?;

    if !database::save_task_transition(&state.pool, &updated, task.status).await? {
        error!("Task with ID {} changed status concurrently.", task.id);
        return Err(AppError::new(
            StatusCode::CONFLICT,
            "Task status changed concurrently, reload and retry",
        ));
    }

    info!("Task {} moved from {} to {}.", task.id, task.status, updated.status);
    Ok(updated)
}

/// Handler for listing the caller's own tasks, newest first.
pub async fn list_my_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Task>>, AppError> {
    let staff = current_staff(&state, &user).await?;
    let tasks = database::get_tasks_for_owner(&state.pool, staff.id).await?;
    info!("Successfully retrieved {} tasks.", tasks.len());
    Ok(Json(tasks))
}

/// Handler for listing every task with its owner (admins only).
pub async fn list_all_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<TaskWithOwner>>, AppError> {
    require_admin(&user)?;
    let tasks = database::get_all_tasks_with_owner(&state.pool).await?;
    info!("Successfully retrieved {} tasks for admin.", tasks.len());
    Ok(Json(tasks))
}

// --- Attendance corrections ---

/// Handler for filing an attendance correction request.
pub async fn create_correction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateCorrectionPayload>,
) -> Result<(StatusCode, Json<CorrectionRequest>), AppError> {
    if payload.reason.trim().is_empty() {
        error!("Validation failed: correction reason is empty.");
        return Err(AppError::new(StatusCode::BAD_REQUEST, "Reason is required"));
    }
    if payload.requested_punch_out <= payload.requested_punch_in {
        error!(
            "Validation failed: punch-out {} is not after punch-in {}.",
            payload.requested_punch_out, payload.requested_punch_in
        );
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Requested punch-out must be after punch-in",
        ));
    }

    let staff = current_staff(&state, &user).await?;
    let correction =
        database::create_correction_in_db(&state.pool, &staff, payload, Utc::now()).await?;

    info!("Correction created successfully with ID: {}", correction.id);
    Ok((StatusCode::CREATED, Json(correction)))
}

/// Handler for listing the caller's own correction requests.
pub async fn list_my_corrections(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<CorrectionRequest>>, AppError> {
    let staff = current_staff(&state, &user).await?;
    let corrections = database::get_corrections_for_owner(&state.pool, staff.id).await?;
    Ok(Json(corrections))
}

/// Handler for the admin correction panel.
pub async fn list_corrections(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<CorrectionWithName>>, AppError> {
    require_admin(&user)?;
    let corrections = database::get_all_corrections_with_name(&state.pool).await?;
    info!("Successfully retrieved {} corrections.", corrections.len());
    Ok(Json(corrections))
}

/// Handler for approving or rejecting a pending correction (admins only).
pub async fn review_correction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(correction_id): AppPath<i64>,
    AppJson(payload): AppJson<ReviewCorrectionPayload>,
) -> Result<Json<CorrectionRequest>, AppError> {
    require_admin(&user)?;

    let decision = match payload.status.parse::<CorrectionStatus>() {
        Ok(decision @ (CorrectionStatus::Approved | CorrectionStatus::Rejected)) => decision,
        _ => {
            error!("Validation failed: '{}' is not a review decision.", payload.status);
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "Status must be 'approved' or 'rejected'",
            ));
        }
    };

    let existing = database::find_correction(&state.pool, correction_id)
        .await?
        .ok_or_else(|| {
            error!("Correction with ID {} not found.", correction_id);
            AppError::new(StatusCode::NOT_FOUND, "Correction not found")
        })?;

    if existing.status != CorrectionStatus::Pending {
        error!("Correction with ID {} was already reviewed.", correction_id);
        return Err(AppError::new(StatusCode::BAD_REQUEST, "Correction already reviewed"));
    }

    let reviewed = commit_review(&state, correction_id, decision, payload.admin_comment).await?;

    info!(
        "Correction {} reviewed by {}: {:?}",
        correction_id, user.employee_id, reviewed.status
    );
    Ok(Json(reviewed))
}

/// Records the decision only while the correction is still pending in storage.
async fn commit_review(
    state: &AppState,
    correction_id: i64,
    decision: CorrectionStatus,
    admin_comment: Option<String>,
) -> Result<CorrectionRequest, AppError> {
    database::review_correction_in_db(
        &state.pool,
        correction_id,
        decision,
        admin_comment,
        Utc::now(),
    )
    .await?
    .ok_or_else(|| {
        error!("Correction with ID {} was reviewed concurrently.", correction_id);
        AppError::new(
            StatusCode::CONFLICT,
            "Correction was reviewed concurrently, reload and retry",
        )
    })
}

// --- Staff profiles ---

/// Handler for the staff directory (admins only).
pub async fn list_profiles(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Staff>>, AppError> {
    require_admin(&user)?;
    let staff = database::list_staff(&state.pool).await?;
    Ok(Json(staff))
}

// --- Admin settings ---

/// Handler returning the stored office allowlist (admins only).
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AdminSettings>, AppError> {
    require_admin(&user)?;
    state
        .load_settings()
        .await?
        .map(Json)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "Admin settings not configured"))
}

/// Handler replacing the office allowlist (admins only).
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<UpdateSettingsPayload>,
) -> Result<Json<AdminSettings>, AppError> {
    require_admin(&user)?;

    let candidate = AdminSettings {
        allowed_ips: payload.allowed_ips,
        updated_at: Utc::now(),
    };
    if gate::normalized_allowlist(&candidate).is_empty() {
        error!("Validation failed: allowlist has no usable entry.");
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "At least one allowed IP is required",
        ));
    }

    let saved = database::upsert_admin_settings(
        &state.pool,
        &candidate.allowed_ips,
        candidate.updated_at,
    )
    .await?;
    state.settings.invalidate();

    info!("Office allowlist updated by {}.", user.employee_id);
    Ok(Json(saved))
}

// --- Custom Error Handling ---
// Internal errors (e.g., from the database) are turned into appropriate
// HTTP responses here.

/// Our custom error type for the application.
#[derive(Debug)]
pub struct AppError {
    code: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Allows converting an `anyhow::Error` (coming from `database.rs`)
/// into our `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the internal error for debugging.
        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Server error".to_string(),
        }
    }
}

/// Malformed or mistyped request bodies are validation errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        error!("Rejected request body: {}", rejection.body_text());
        Self {
            code: StatusCode::BAD_REQUEST,
            message: format!("Invalid request body: {}", rejection.body_text()),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        error!("Rejected path parameter: {}", rejection.body_text());
        Self {
            code: StatusCode::BAD_REQUEST,
            message: format!("Invalid path parameter: {}", rejection.body_text()),
        }
    }
}

/// JSON body extractor whose rejections answer like every other `AppError`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Path extractor whose rejections answer like every other `AppError`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "message": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use ems_common::{AllowedIps, NewStaff, Role};

    async fn setup_state() -> AppState {
        let pool = database::connect_in_memory().await.unwrap();
        AppState::new(pool, "handler-tests")
    }

    async fn add_staff(state: &AppState, employee_id: &str, role: Role) -> AuthUser {
        database::insert_staff(
            &state.pool,
            &NewStaff {
                employee_id: employee_id.to_string(),
                name: employee_id.to_lowercase(),
                email: format!("{}@example.com", employee_id.to_lowercase()),
                phone: None,
                role,
                leave_quota: 0,
            },
        )
        .await
        .unwrap();
        AuthUser {
            employee_id: employee_id.to_string(),
            role,
        }
    }

    fn task_payload() -> AppJson<CreateTaskPayload> {
        AppJson(CreateTaskPayload {
            project: "Facilities".to_string(),
            title: "Order chairs".to_string(),
            description: "Six chairs for meeting room B".to_string(),
        })
    }

    fn correction_payload(reason: &str) -> AppJson<CreateCorrectionPayload> {
        AppJson(CreateCorrectionPayload {
            correction_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            requested_punch_in: Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap(),
            requested_punch_out: Utc.with_ymd_and_hms(2025, 3, 14, 18, 0, 0).unwrap(),
            reason: reason.to_string(),
        })
    }

    fn decision(value: &str) -> AppJson<ReviewCorrectionPayload> {
        AppJson(ReviewCorrectionPayload {
            status: value.to_string(),
            admin_comment: None,
        })
    }

    fn status(value: &str) -> AppJson<UpdateTaskStatusPayload> {
        AppJson(UpdateTaskStatusPayload {
            status: value.to_string(),
        })
    }

    #[tokio::test]
    async fn test_create_task_validation_missing_field() {
        let state = setup_state().await;
        let user = add_staff(&state, "EMP001", Role::Employee).await;
        let payload = AppJson(CreateTaskPayload {
            project: "Facilities".to_string(),
            title: String::new(),
            description: "No title".to_string(),
        });

        let err = create_task(State(state), Extension(user), payload)
            .await
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "All fields are required");
    }

    #[tokio::test]
    async fn test_create_task_unknown_employee() {
        let state = setup_state().await;
        let ghost = AuthUser {
            employee_id: "GHOST".to_string(),
            role: Role::Employee,
        };

        let err = create_task(State(state), Extension(ghost), task_payload())
            .await
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Employee not found");
    }

    #[tokio::test]
    async fn test_completed_task_rejects_further_updates() {
        let state = setup_state().await;
        let user = add_staff(&state, "EMP001", Role::Employee).await;

        let (code, Json(task)) = create_task(State(state.clone()), Extension(user.clone()), task_payload())
            .await
            .unwrap();
        assert_eq!(code, StatusCode::CREATED);

        let Json(done) = update_task_status(
            State(state.clone()),
            Extension(user.clone()),
            AppPath(task.id),
            status("Completed"),
        )
        .await
        .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.end_date.is_some());
        assert_eq!(done.end_date, done.completed_at);

        let err = update_task_status(
            State(state.clone()),
            Extension(user.clone()),
            AppPath(task.id),
            status("In Progress"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Task already completed and locked");

        let Json(tasks) = list_my_tasks(State(state), Extension(user)).await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[0].start_date, None);
        assert_eq!(tasks[0].end_date, done.end_date);
    }

    #[tokio::test]
    async fn test_update_status_rejects_unknown_value() {
        let state = setup_state().await;
        let user = add_staff(&state, "EMP001", Role::Employee).await;
        let (_, Json(task)) = create_task(State(state.clone()), Extension(user.clone()), task_payload())
            .await
            .unwrap();

        let err = update_task_status(State(state), Extension(user), AppPath(task.id), status("Done"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_cannot_update_someone_elses_task() {
        let state = setup_state().await;
        let employee = add_staff(&state, "EMP001", Role::Employee).await;
        let admin = add_staff(&state, "ADM001", Role::Admin).await;
        let (_, Json(task)) = create_task(State(state.clone()), Extension(employee), task_payload())
            .await
            .unwrap();

        let err = update_task_status(State(state), Extension(admin), AppPath(task.id), status("In Progress"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Task not found");
    }

    #[tokio::test]
    async fn test_list_all_tasks_is_admin_only() {
        let state = setup_state().await;
        let employee = add_staff(&state, "EMP001", Role::Employee).await;

        let err = list_all_tasks(State(state), Extension(employee)).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Admins only");
    }

    #[tokio::test]
    async fn test_update_settings_rejects_empty_allowlist() {
        let state = setup_state().await;
        let admin = add_staff(&state, "ADM001", Role::Admin).await;
        let payload = AppJson(UpdateSettingsPayload {
            allowed_ips: AllowedIps::Delimited(" , ,".to_string()),
        });

        let err = update_settings(State(state), Extension(admin), payload)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_review_rejects_pending_as_decision() {
        let state = setup_state().await;
        let admin = add_staff(&state, "ADM001", Role::Admin).await;
        let payload = AppJson(ReviewCorrectionPayload {
            status: "pending".to_string(),
            admin_comment: None,
        });

        let err = review_correction(State(state), Extension(admin), AppPath(1), payload)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_status_conflicts_when_status_moved_underneath() {
        let state = setup_state().await;
        let user = add_staff(&state, "EMP001", Role::Employee).await;
        let (_, Json(task)) = create_task(State(state.clone()), Extension(user.clone()), task_payload())
            .await
            .unwrap();

        // Another request moves the task after this one read it as Pending.
        update_task_status(
            State(state.clone()),
            Extension(user.clone()),
            AppPath(task.id),
            status("In Progress"),
        )
        .await
        .unwrap();

        let err = commit_transition(&state, &task, TaskStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::CONFLICT);

        let stored = database::find_task_for_owner(&state.pool, task.id, task.employee_ref)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TaskStatus::InProgress);
        assert_eq!(stored.completed_at, None);
    }

    #[tokio::test]
    async fn test_create_correction_requires_reason() {
        let state = setup_state().await;
        let user = add_staff(&state, "EMP001", Role::Employee).await;

        let err = create_correction(State(state.clone()), Extension(user.clone()), correction_payload("   "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Reason is required");

        let Json(mine) = list_my_corrections(State(state), Extension(user)).await.unwrap();
        assert!(mine.is_empty());
    }

    #[tokio::test]
    async fn test_review_unknown_correction() {
        let state = setup_state().await;
        let admin = add_staff(&state, "ADM001", Role::Admin).await;

        let err = review_correction(State(state), Extension(admin), AppPath(42), decision("approved"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Correction not found");
    }

    #[tokio::test]
    async fn test_review_conflicts_when_already_decided_underneath() {
        let state = setup_state().await;
        let employee = add_staff(&state, "EMP001", Role::Employee).await;
        let admin = add_staff(&state, "ADM001", Role::Admin).await;
        let (_, Json(correction)) = create_correction(
            State(state.clone()),
            Extension(employee),
            correction_payload("Forgot to punch in"),
        )
        .await
        .unwrap();

        let Json(approved) = review_correction(
            State(state.clone()),
            Extension(admin),
            AppPath(correction.id),
            decision("approved"),
        )
        .await
        .unwrap();
        assert_eq!(approved.status, CorrectionStatus::Approved);

        // A second reviewer that saw the request as pending loses the write.
        let err = commit_review(&state, correction.id, CorrectionStatus::Rejected, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::CONFLICT);

        let stored = database::find_correction(&state.pool, correction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CorrectionStatus::Approved);
    }

    #[tokio::test]
    async fn test_list_profiles_is_admin_only() {
        let state = setup_state().await;
        let employee = add_staff(&state, "EMP001", Role::Employee).await;
        let admin = add_staff(&state, "ADM001", Role::Admin).await;

        let err = list_profiles(State(state.clone()), Extension(employee)).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::FORBIDDEN);

        let Json(staff) = list_profiles(State(state), Extension(admin)).await.unwrap();
        assert_eq!(staff.len(), 2);
    }
}
