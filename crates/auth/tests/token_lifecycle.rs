use gatehouse_auth::{AuthError, Authorizer, MemoryActiveTokens, TokenValidator};
use gatehouse_common::{AuditLog, AuditOutcome, GatewayError, RouteAuthPolicy};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::Arc;

const SECRET: &str = "lifecycle-secret";

struct Harness {
    authorizer: Authorizer,
    store: Arc<MemoryActiveTokens>,
    audit: Arc<AuditLog>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryActiveTokens::new());
    let audit = Arc::new(AuditLog::new(3600, 1000));
    let validator = TokenValidator::new(
        "gateway",
        SECRET,
        Algorithm::HS256,
        0,
        store.clone(),
        audit.clone(),
    );
    Harness {
        authorizer: Authorizer::new("gateway", Arc::new(validator), audit.clone()),
        store,
        audit,
    }
}

fn token(user: &str, role: &str, permissions: &[&str], token_type: &str, exp_offset: i64) -> String {
    let claims = serde_json::json!({
        "user_id": user,
        "role": role,
        "permissions": permissions,
        "type": token_type,
        "exp": chrono::Utc::now().timestamp() + exp_offset,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn policy(permission: Option<&str>, role: Option<&str>) -> RouteAuthPolicy {
    RouteAuthPolicy {
        permission: permission.map(str::to_string),
        role: role.map(str::to_string),
    }
}

#[tokio::test]
async fn active_token_then_logout() {
    let h = harness();
    let t = token("alice", "user", &["read"], "access", 600);
    h.store.activate("alice", &t);

    let identity = h
        .authorizer
        .authorize_request(Some(&bearer(&t)), &policy(Some("read"), None))
        .await
        .unwrap();
    assert_eq!(identity.user_id, "alice");

    // Logout removes the active record; the unexpired token stops working.
    h.store.revoke("alice", &t);
    let err = h
        .authorizer
        .authorize_request(Some(&bearer(&t)), &policy(Some("read"), None))
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::Revoked);
    assert_eq!(GatewayError::from(err).status_code(), 401);
}

#[tokio::test]
async fn expired_token_fails_even_when_active() {
    let h = harness();
    let t = token("bob", "user", &["read"], "access", -120);
    h.store.activate("bob", &t);

    let err = h.authorizer.authenticate(Some(&bearer(&t))).await.unwrap_err();
    assert_eq!(err, AuthError::Expired);
}

#[tokio::test]
async fn refresh_token_cannot_authorize_requests() {
    let h = harness();
    let t = token("carol", "admin", &["admin"], "refresh", 600);

    let err = h.authorizer.authenticate(Some(&bearer(&t))).await.unwrap_err();
    assert_eq!(err, AuthError::WrongTokenType("refresh".to_string()));
}

#[tokio::test]
async fn missing_token_is_audited() {
    let h = harness();

    let err = h.authorizer.authenticate(None).await.unwrap_err();
    assert_eq!(err, AuthError::MissingToken);

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn permission_and_role_matrix() {
    let h = harness();
    let admin = token("root", "admin", &["admin"], "access", 600);
    let reader = token("reader", "user", &["read"], "access", 600);
    let moderator = token("mod", "moderator", &["read", "write"], "access", 600);
    h.store.activate("root", &admin);
    h.store.activate("reader", &reader);
    h.store.activate("mod", &moderator);

    let write = policy(Some("write"), None);
    let moderate = policy(None, Some("moderator"));

    // Admin wildcard satisfies any permission and any role.
    assert!(h.authorizer.authorize_request(Some(&bearer(&admin)), &write).await.is_ok());
    assert!(h.authorizer.authorize_request(Some(&bearer(&admin)), &moderate).await.is_ok());

    // Read-only user cannot write.
    let err = h
        .authorizer
        .authorize_request(Some(&bearer(&reader)), &write)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::MissingPermission("write".to_string()));
    assert_eq!(GatewayError::from(err).status_code(), 403);

    // Plain user is not a moderator.
    let err = h
        .authorizer
        .authorize_request(Some(&bearer(&reader)), &moderate)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::MissingRole("moderator".to_string()));

    assert!(h
        .authorizer
        .authorize_request(Some(&bearer(&moderator)), &moderate)
        .await
        .is_ok());

    let denied = h
        .audit
        .entries()
        .into_iter()
        .filter(|e| e.outcome == AuditOutcome::Denied)
        .count();
    assert_eq!(denied, 2);
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let h = harness();
    let t = token("dave", "user", &["read"], "access", 600);
    h.store.activate("dave", &t);

    // Keep the signature, swap in claims for another user.
    let other = token("mallory", "admin", &["admin"], "access", 600);
    let (_, signature) = t.rsplit_once('.').unwrap();
    let (unsigned_other, _) = other.rsplit_once('.').unwrap();
    let tampered = format!("{unsigned_other}.{signature}");
    h.store.activate("mallory", &tampered);

    assert!(matches!(
        h.authorizer.authenticate(Some(&bearer(&tampered))).await,
        Err(AuthError::Invalid(_))
    ));
}
