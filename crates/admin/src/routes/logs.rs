use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::SharedState;

/// Query parameters for the audit log endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    /// Maximum number of entries to return (default: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Number of entries to skip (default: 0).
    #[serde(default)]
    pub offset: usize,
    /// Optional filter by user id.
    pub user: Option<String>,
    /// Optional filter by service name.
    pub service: Option<String>,
}

fn default_limit() -> usize {
    100
}

/// GET /api/logs
///
/// Returns a paginated, optionally filtered list of retained audit events,
/// oldest first.
pub async fn get_logs(
    State(state): State<SharedState>,
    Query(params): Query<LogQuery>,
) -> Json<Value> {
    let entries = state.audit_log.entries();

    let filtered: Vec<_> = entries
        .into_iter()
        .filter(|event| {
            if let Some(ref user) = params.user {
                if event.user_id.as_deref() != Some(user.as_str()) {
                    return false;
                }
            }
            if let Some(ref service) = params.service {
                if event.service.as_deref() != Some(service.as_str()) {
                    return false;
                }
            }
            true
        })
        .collect();

    let total = filtered.len();

    let page: Vec<_> = filtered
        .into_iter()
        .skip(params.offset)
        .take(params.limit)
        .collect();

    Json(json!({
        "total": total,
        "offset": params.offset,
        "limit": params.limit,
        "entries": page
    }))
}
