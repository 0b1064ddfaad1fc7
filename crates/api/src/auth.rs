//! Caller identity, as asserted by the upstream gateway.
//!
//! Authentication happens before requests reach this service; the gateway
//! forwards the verified identity in the `x-user-id` and `x-user-role`
//! headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Actor, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer" | "user" => Some(Role::Customer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated user making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// The caller as recorded in audit entries.
    pub fn actor(&self) -> Actor {
        match self.role {
            Role::Customer => Actor::Customer(self.user_id),
            Role::Admin => Actor::Admin(self.user_id),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
        };

        let user_id = header(USER_ID_HEADER)
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(UserId::new)
            .ok_or(ApiError::Unauthorized)?;

        let role = match header(USER_ROLE_HEADER) {
            None => Role::Customer,
            Some(value) => Role::parse(value).ok_or(ApiError::Unauthorized)?,
        };

        Ok(Caller { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, ApiError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_identity_headers() {
        let caller = extract(&[("x-user-id", "12"), ("x-user-role", "ADMIN")])
            .await
            .unwrap();
        assert_eq!(caller.user_id, UserId::new(12));
        assert!(caller.is_admin());
        assert_eq!(caller.actor(), Actor::Admin(UserId::new(12)));
    }

    #[tokio::test]
    async fn role_defaults_to_customer() {
        let caller = extract(&[("x-user-id", "5")]).await.unwrap();
        assert_eq!(caller.role, Role::Customer);
        assert!(matches!(caller.require_admin(), Err(ApiError::Forbidden)));
    }

    #[tokio::test]
    async fn rejects_missing_or_bad_identity() {
        assert!(matches!(extract(&[]).await, Err(ApiError::Unauthorized)));
        assert!(matches!(
            extract(&[("x-user-id", "abc")]).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            extract(&[("x-user-id", "3"), ("x-user-role", "root")]).await,
            Err(ApiError::Unauthorized)
        ));
    }
}
