// src/handlers/health.rs

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use crate::{config::Config, error::AppError};

/// Reports that the service is up, with its environment and build version.
pub async fn healthcheck(State(config): State<Config>) -> impl IntoResponse {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": config.env,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

/// Runtime counters: build version, tokio scheduler, pool usage and the
/// current Unix time.
pub async fn debug_vars(State(pool): State<PgPool>) -> impl IntoResponse {
    let runtime = tokio::runtime::Handle::current().metrics();

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "runtime": {
            "workers": runtime.num_workers(),
            "alive_tasks": runtime.num_alive_tasks(),
        },
        "database": {
            "open_connections": pool.size(),
            "idle": pool.num_idle(),
            "in_use": (pool.size() as usize).saturating_sub(pool.num_idle()),
            "max_open_connections": pool.options().get_max_connections(),
            "closed": pool.is_closed(),
        },
        "timestamp": Utc::now().timestamp(),
    }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> AppError {
    AppError::not_found()
}
