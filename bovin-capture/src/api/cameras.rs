//! Camera listing

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use bovin_common::events::CameraRole;
use serde::{Deserialize, Serialize};

use crate::models::camera::cameras_with_role;
use crate::models::CameraInfo;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CameraQuery {
    pub role: Option<CameraRole>,
}

#[derive(Debug, Serialize)]
pub struct CamerasResponse {
    pub cameras: Vec<CameraInfo>,
}

/// GET /cameras?role=identification|morphology
///
/// The list a client passes back, filtered, when opening a workflow.
pub async fn list_cameras(
    State(state): State<AppState>,
    Query(query): Query<CameraQuery>,
) -> Json<CamerasResponse> {
    Json(CamerasResponse {
        cameras: cameras_with_role(state.services.selector.cameras(), query.role),
    })
}

pub fn camera_routes() -> Router<AppState> {
    Router::new().route("/cameras", get(list_cameras))
}
