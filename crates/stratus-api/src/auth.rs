//! Operator identity and dangerous-verb password re-authentication.
//!
//! The session subsystem is an external collaborator: it authenticates
//! the cookie and forwards the resolved identity. This module consumes
//! that contract (request extensions first, trusted gateway headers as a
//! fallback) and provides the bcrypt re-auth check used for destructive
//! SQL.

use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::{error::ErrorUnauthorized, FromRequest, HttpMessage, HttpRequest};
use async_trait::async_trait;
use log::warn;
use stratus_commons::{Role, UserId};

/// The authenticated operator attached to a request by the session layer.
#[derive(Debug, Clone)]
pub struct Operator {
    pub user_id: UserId,
    pub role: Role,
}

impl FromRequest for Operator {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        if let Some(operator) = req.extensions().get::<Operator>() {
            return ready(Ok(operator.clone()));
        }
        // Trusted-gateway fallback: the session proxy strips and re-sets
        // these headers after authenticating the cookie.
        let user_id = req
            .headers()
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(UserId::from);
        let role = req
            .headers()
            .get("X-User-Role")
            .and_then(|v| v.to_str().ok())
            .and_then(Role::from_str);
        match (user_id, role) {
            (Some(user_id), Some(role)) => ready(Ok(Operator { user_id, role })),
            _ => ready(Err(ErrorUnauthorized("Not authenticated"))),
        }
    }
}

/// Source of stored password hashes, backed by the external user store.
pub trait PasswordHashSource: Send + Sync {
    fn password_hash(&self, user_id: &UserId) -> Option<String>;
}

/// Verifies an operator's password for dangerous-verb re-authentication.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    async fn verify(&self, user_id: &UserId, password: &str) -> bool;
}

/// Bcrypt verification on the blocking pool.
pub struct BcryptVerifier {
    source: Arc<dyn PasswordHashSource>,
}

impl BcryptVerifier {
    pub fn new(source: Arc<dyn PasswordHashSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PasswordVerifier for BcryptVerifier {
    async fn verify(&self, user_id: &UserId, password: &str) -> bool {
        let Some(hash) = self.source.password_hash(user_id) else {
            return false;
        };
        let password = password.to_string();
        match tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await {
            Ok(Ok(matched)) => matched,
            Ok(Err(e)) => {
                warn!("Password verification error for {}: {}", user_id, e);
                false
            }
            Err(e) => {
                warn!("Password verification task failed for {}: {}", user_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn test_extractor_reads_gateway_headers() {
        let req = TestRequest::default()
            .insert_header(("X-User-Id", "op-1"))
            .insert_header(("X-User-Role", "MASTER"))
            .to_http_request();
        let operator = Operator::from_request(&req, &mut Payload::None)
            .await
            .unwrap();
        assert_eq!(operator.user_id.as_str(), "op-1");
        assert_eq!(operator.role, Role::Master);
    }

    #[actix_web::test]
    async fn test_extractor_rejects_missing_identity() {
        let req = TestRequest::default().to_http_request();
        assert!(Operator::from_request(&req, &mut Payload::None)
            .await
            .is_err());
    }

    #[actix_web::test]
    async fn test_extractor_rejects_unknown_role() {
        let req = TestRequest::default()
            .insert_header(("X-User-Id", "op-1"))
            .insert_header(("X-User-Role", "SUPREME"))
            .to_http_request();
        assert!(Operator::from_request(&req, &mut Payload::None)
            .await
            .is_err());
    }

    struct OneUser(String);

    impl PasswordHashSource for OneUser {
        fn password_hash(&self, user_id: &UserId) -> Option<String> {
            (user_id.as_str() == "op-1").then(|| self.0.clone())
        }
    }

    #[actix_web::test]
    async fn test_bcrypt_verifier_round_trip() {
        let hash = bcrypt::hash("hunter2", 4).unwrap();
        let verifier = BcryptVerifier::new(Arc::new(OneUser(hash)));
        assert!(verifier.verify(&UserId::from("op-1"), "hunter2").await);
        assert!(!verifier.verify(&UserId::from("op-1"), "wrong").await);
        assert!(!verifier.verify(&UserId::from("op-2"), "hunter2").await);
    }
}
