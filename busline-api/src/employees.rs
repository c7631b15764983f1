use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use busline_core::{Employee, NewEmployee};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/v1/employees
pub async fn create_employee(
    State(state): State<AppState>,
    payload: Result<Json<NewEmployee>, JsonRejection>,
) -> Result<(StatusCode, Json<Employee>), AppError> {
    let Json(req) = payload?;
    let employee = state.service.create_employee(req).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

/// GET /api/v1/employees
pub async fn list_employees(State(state): State<AppState>) -> Result<Json<Vec<Employee>>, AppError> {
    Ok(Json(state.service.list_employees().await?))
}

/// GET /api/v1/employees/{id}
pub async fn get_employee(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.service.get_employee(employee_id).await?))
}
