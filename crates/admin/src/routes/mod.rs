pub mod health;
pub mod logs;
pub mod metrics;
pub mod route_table;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use gatehouse_auth::{Authorizer, MemoryActiveTokens, TokenValidator};
    use gatehouse_common::{AuditLog, BalanceStrategy, RouteConfig};
    use gatehouse_router::{RouteTable, SharedRouteTable};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    use crate::state::{AppState, GatewayMetrics, SharedState};

    const SECRET: &str = "admin-test-secret";

    pub fn route(prefix: &str, service: &str) -> RouteConfig {
        RouteConfig {
            path_prefix: prefix.to_string(),
            service: service.to_string(),
            balance: BalanceStrategy::RoundRobin,
            auth: None,
        }
    }

    pub struct Fixture {
        pub state: SharedState,
        pub tokens: Arc<MemoryActiveTokens>,
    }

    impl Fixture {
        /// Mint an active access token and return it as an `Authorization` value.
        pub fn bearer(&self, user: &str, role: &str) -> String {
            let token = encode(
                &Header::new(Algorithm::HS256),
                &serde_json::json!({
                    "user_id": user,
                    "role": role,
                    "permissions": [],
                    "type": "access",
                    "exp": chrono::Utc::now().timestamp() + 600,
                }),
                &EncodingKey::from_secret(SECRET.as_bytes()),
            )
            .unwrap();
            self.tokens.activate(user, &token);
            format!("Bearer {token}")
        }
    }

    pub fn fixture() -> Fixture {
        let routes = SharedRouteTable::new(RouteTable::new(vec![
            route("/api/v1/thinking", "thinking-service"),
            route("/api/v1/spaces", "space-service"),
        ]));
        let audit = Arc::new(AuditLog::new(3600, 100));
        let tokens = Arc::new(MemoryActiveTokens::new());
        let validator = TokenValidator::new(
            "api-gateway",
            SECRET,
            Algorithm::HS256,
            0,
            tokens.clone(),
            audit.clone(),
        );
        let authorizer = Authorizer::new("api-gateway", Arc::new(validator), audit.clone());

        Fixture {
            state: Arc::new(AppState::new(
                routes,
                Arc::new(GatewayMetrics::new().unwrap()),
                audit,
                authorizer,
            )),
            tokens,
        }
    }

    pub fn state() -> SharedState {
        fixture().state
    }
}
