// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::state::AppState;
use crate::{auth, gate, handlers};
use axum::{
    middleware,
    routing::{get, put},
    Router,
};

/// Creates and configures the application router.
///
/// Every route goes through the office network gate first and then
/// through authentication.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Employee task endpoints: `GET /api/tasks` lists the caller's tasks,
        // `POST /api/tasks` creates one
        .route(
            "/api/tasks",
            get(handlers::list_my_tasks).post(handlers::create_task),
        )
        // Admin view of every task with its owner
        .route("/api/tasks/all", get(handlers::list_all_tasks))
        .route("/api/tasks/{id}/status", put(handlers::update_task_status))
        // Attendance corrections
        .route(
            "/api/corrections",
            get(handlers::list_corrections).post(handlers::create_correction),
        )
        .route("/api/corrections/mine", get(handlers::list_my_corrections))
        .route("/api/corrections/{id}", put(handlers::review_correction))
        .route("/api/employees/profiles", get(handlers::list_profiles))
        .route(
            "/api/admin/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        // The layer added last runs first: gate, then authentication
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::check_office_ip,
        ))
        // Adds the shared state (DB pool, auth keys, settings cache)
        .with_state(state)
}
