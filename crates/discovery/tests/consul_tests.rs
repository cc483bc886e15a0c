use gatehouse_discovery::{ConsulRegistry, ServiceRegistration, ServiceRegistry};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry(server: &MockServer) -> ConsulRegistry {
    ConsulRegistry::new(&server.uri(), Duration::from_millis(500), Duration::from_secs(10)).unwrap()
}

#[tokio::test]
async fn discover_returns_passing_instances() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/thinking-service"))
        .and(query_param("passing", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "Node": {"Address": "10.1.0.1"},
                "Service": {"Address": "10.0.0.1", "Port": 8001, "Weights": {"Passing": 3, "Warning": 1}}
            },
            {
                "Node": {"Address": "10.1.0.2"},
                "Service": {"Address": "", "Port": 8002}
            },
            {
                "Node": {"Address": "10.1.0.3"},
                "Service": {"Address": "10.0.0.1", "Port": 8001}
            }
        ])))
        .mount(&server)
        .await;

    let endpoints = registry(&server).discover("thinking-service").await;

    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].addr(), "10.0.0.1:8001");
    assert_eq!(endpoints[0].weight, 3);
    // Falls back to the node address when the service address is empty.
    assert_eq!(endpoints[1].addr(), "10.1.0.2:8002");
    assert_eq!(endpoints[1].weight, 1);
}

#[tokio::test]
async fn discover_is_empty_on_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(registry(&server).discover("broken").await.is_empty());
}

#[tokio::test]
async fn discover_is_empty_on_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(registry(&server).discover("slow").await.is_empty());
}

#[tokio::test]
async fn discover_is_empty_when_unreachable() {
    // Nothing listens on port 9 of the loopback interface.
    let registry =
        ConsulRegistry::new("http://127.0.0.1:9", Duration::from_millis(200), Duration::from_secs(10))
            .unwrap();
    assert!(registry.discover("anything").await.is_empty());
}

#[tokio::test]
async fn register_sends_http_check() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .and(body_partial_json(json!({
            "ID": "echo-service-127.0.0.1-9000",
            "Name": "echo-service",
            "Address": "127.0.0.1",
            "Port": 9000,
            "Check": {"HTTP": "http://127.0.0.1:9000/health", "Interval": "10s"}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let registry = registry(&server);
    let reg = ServiceRegistration::new("echo-service", "127.0.0.1", 9000, "http://127.0.0.1:9000/health");

    // Re-registration with the same identity is a plain repeat of the same call.
    registry.register(&reg).await;
    registry.register(&reg).await;
}

#[tokio::test]
async fn register_failure_is_swallowed() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let reg = ServiceRegistration::new("svc", "10.0.0.5", 80, "http://10.0.0.5/health");
    registry(&server).register(&reg).await;
}

#[tokio::test]
async fn deregister_uses_service_id() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/deregister/svc-10.0.0.5-80"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    registry(&server).deregister("svc-10.0.0.5-80").await;
}
