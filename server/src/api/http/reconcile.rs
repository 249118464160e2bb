//! Reconciliation HTTP handler

use axum::{
    extract::{Path, State},
    Json,
};

use crate::domain::types::{ReconcileRequest, ReconcileResponse};
use crate::infra::license::Feature;
use crate::{AppState, Error, Result};

/// Run one reconciliation cycle for the polling agent.
///
/// A syntactically valid request always gets a 200 with the rails-infos
/// payload, even when individual workspace items inside it failed; only
/// malformed bodies are rejected up front.
pub async fn reconcile(
    State(state): State<AppState>,
    Path(agent_id): Path<i64>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>> {
    if !state.license.feature_available(Feature::RemoteDevelopment) {
        return Err(Error::Unlicensed);
    }

    let response = state.reconcile_service.process(agent_id, request).await?;
    Ok(Json(response))
}
