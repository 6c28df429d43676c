use serde_json::json;

use crate::response::ApiResponse;

pub async fn health() -> ApiResponse<serde_json::Value> {
    ApiResponse::ok("ok", json!({ "status": "ok" }))
}
