use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use gatehouse_auth::ADMIN_ROLE;
use gatehouse_common::{
    AuditEvent, AuditOutcome, AuditSink, GatewayError, RouteAuthPolicy, RouteConfig,
};
use serde_json::json;

use crate::state::SharedState;

/// GET /api/routes
///
/// Returns the live route table in evaluation order.
pub async fn get_routes(State(state): State<SharedState>) -> Json<Vec<RouteConfig>> {
    Json(state.routes.load().routes().to_vec())
}

/// PUT /api/routes
///
/// Requires a bearer token with the admin role. Validates the submitted
/// table and swaps it in atomically. Requests already past routing keep the
/// table they resolved against.
pub async fn replace_routes(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(routes): Json<Vec<RouteConfig>>,
) -> impl IntoResponse {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let policy = RouteAuthPolicy {
        permission: None,
        role: Some(ADMIN_ROLE.to_string()),
    };

    let identity = match state.authorizer.authorize_request(authorization, &policy).await {
        Ok(identity) => identity,
        Err(e) => {
            let err = GatewayError::from(e);
            tracing::warn!(reason = %err, "route table update rejected");
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::UNAUTHORIZED);
            return (status, Json(err.body()));
        }
    };

    let count = routes.len();
    if let Err(e) = state.routes.replace(routes) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": format!("validation failed: {}", e)
            })),
        );
    }

    tracing::info!(
        routes = count,
        user_id = %identity.user_id,
        "route table updated via admin API"
    );
    state.audit_log.record(
        AuditEvent::new("routes_replace", AuditOutcome::Allowed)
            .user(identity.user_id)
            .detail(format!("{count} routes")),
    );

    (
        StatusCode::OK,
        Json(json!({
            "status": "updated",
            "routes": count
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{fixture, route, state, Fixture};

    fn auth_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    fn admin_headers(fixture: &Fixture) -> HeaderMap {
        auth_headers(&fixture.bearer("root", "admin"))
    }

    #[tokio::test]
    async fn lists_routes_in_order() {
        let Json(routes) = get_routes(State(state())).await;
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].service, "thinking-service");
        assert_eq!(routes[1].service, "space-service");
    }

    #[tokio::test]
    async fn replace_installs_valid_table() {
        let fixture = fixture();
        let response = replace_routes(
            State(fixture.state.clone()),
            admin_headers(&fixture),
            Json(vec![route("/api/v2/search", "search-service")]),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let table = fixture.state.routes.load();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.resolve("/api/v2/search/q").map(|r| r.service.as_str()),
            Some("search-service")
        );
        assert!(fixture
            .state
            .audit_log
            .entries()
            .iter()
            .any(|e| e.action == "routes_replace"));
    }

    #[tokio::test]
    async fn replace_rejects_invalid_table() {
        let fixture = fixture();
        let response = replace_routes(
            State(fixture.state.clone()),
            admin_headers(&fixture),
            Json(vec![route("no-leading-slash", "svc")]),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Old table still in place.
        assert_eq!(fixture.state.routes.load().len(), 2);
    }

    #[tokio::test]
    async fn replace_requires_token() {
        let fixture = fixture();
        let response = replace_routes(
            State(fixture.state.clone()),
            HeaderMap::new(),
            Json(vec![route("/open", "svc")]),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(fixture.state.routes.load().len(), 2);
    }

    #[tokio::test]
    async fn replace_requires_admin_role() {
        let fixture = fixture();
        let headers = auth_headers(&fixture.bearer("bob", "user"));
        let response = replace_routes(
            State(fixture.state.clone()),
            headers,
            Json(vec![route("/open", "svc")]),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(fixture.state.routes.load().len(), 2);
    }
}
