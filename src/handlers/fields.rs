use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_date, require_admin};
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Actor, Field, FieldStatus, TimeRange};
use crate::response::ApiResponse;
use crate::services::slots;
use crate::state::AppState;

// GET /fields
pub async fn list_fields(State(state): State<Arc<AppState>>) -> Result<ApiResponse<Vec<Field>>, AppError> {
    let fields = {
        let db = state.conn()?;
        queries::list_fields(&db)?
    };
    Ok(ApiResponse::ok("fields retrieved", fields))
}

// GET /fields/:field_id
pub async fn get_field(
    State(state): State<Arc<AppState>>,
    Path(field_id): Path<String>,
) -> Result<ApiResponse<Field>, AppError> {
    let field = {
        let db = state.conn()?;
        queries::get_field(&db, &field_id)?
    };
    let field = field.ok_or_else(|| AppError::NotFound("field".to_string()))?;
    Ok(ApiResponse::ok("field retrieved", field))
}

// POST /fields
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFieldBody {
    pub name: String,
    pub description: Option<String>,
    pub grass_type: Option<String>,
    pub price: i64,
    pub price_with_lights: Option<i64>,
    pub open_time: String,
    pub close_time: String,
    pub capacity: Option<i32>,
}

pub async fn create_field(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    body: Result<Json<CreateFieldBody>, JsonRejection>,
) -> Result<ApiResponse<Field>, AppError> {
    require_admin(&actor)?;
    let Json(body) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("field name is required".to_string()));
    }
    let price_with_lights = body.price_with_lights.unwrap_or(body.price);
    if body.price < 0 || price_with_lights < 0 {
        return Err(AppError::Validation("prices cannot be negative".to_string()));
    }
    let hours = TimeRange::parse(&body.open_time, &body.close_time)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let now = Utc::now().naive_utc();
    let field = Field {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: body.description,
        grass_type: body.grass_type.unwrap_or_else(|| "artificial".to_string()),
        price: body.price,
        price_with_lights,
        open_time: hours.start,
        close_time: hours.end,
        status: FieldStatus::Available,
        capacity: body.capacity.unwrap_or(10),
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.conn()?;
        queries::insert_field(&db, &field)?;
    }
    tracing::info!(field_id = %field.id, name = %field.name, "field created");

    Ok(ApiResponse::created("field created", field))
}

// PUT /fields/:field_id/status
#[derive(Deserialize)]
pub struct FieldStatusBody {
    pub status: String,
}

pub async fn update_field_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(field_id): Path<String>,
    body: Result<Json<FieldStatusBody>, JsonRejection>,
) -> Result<ApiResponse<Field>, AppError> {
    require_admin(&actor)?;
    let Json(body) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let status = FieldStatus::parse(&body.status)
        .ok_or_else(|| AppError::Validation(format!("unknown field status: {}", body.status)))?;

    let field = {
        let db = state.conn()?;
        if !queries::update_field_status(&db, &field_id, status)? {
            return Err(AppError::NotFound("field".to_string()));
        }
        queries::get_field(&db, &field_id)?
    };
    let field = field.ok_or_else(|| AppError::NotFound("field".to_string()))?;
    tracing::info!(field_id = %field.id, status = status.as_str(), "field status changed");

    Ok(ApiResponse::ok("field status updated", field))
}

// GET /fields/:field_id/available-slots/:date
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub duration: Option<u16>,
}

pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Path((field_id, date)): Path<(String, String)>,
    query: Result<Query<SlotsQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<TimeRange>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let date = parse_date(&date)?;
    let duration = query.duration.unwrap_or(state.config.slot_duration_minutes);

    let slots = {
        let db = state.conn()?;
        slots::available_slots(&db, &field_id, &date, duration)?
    };
    Ok(ApiResponse::ok("available slots retrieved", slots))
}
