use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::Encoder;

use crate::state::SharedState;

/// GET /api/metrics
///
/// Returns all registered Prometheus metrics in the standard text exposition format.
pub async fn get_metrics(State(state): State<SharedState>) -> impl IntoResponse {
    match encode_metrics(&state) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("failed to encode metrics: {}", e),
            )
        }
    }
}

fn encode_metrics(state: &SharedState) -> prometheus::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = state.metrics.registry.gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;

    #[test]
    fn exposes_gateway_counters() {
        let state = test_support::state();
        state.metrics.requests_total.inc();
        state.metrics.rate_limited_total.inc();
        state
            .metrics
            .upstream_errors_total
            .with_label_values(&["space-service", "502"])
            .inc();

        let body = encode_metrics(&state).unwrap();
        assert!(body.contains("gatehouse_requests_total 1"));
        assert!(body.contains("gatehouse_rate_limited_total 1"));
        assert!(body.contains("service=\"space-service\""));
    }

    #[tokio::test]
    async fn handler_returns_ok() {
        let response = get_metrics(State(test_support::state())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
