//! Per-request identity
//!
//! Services sit behind an authenticating proxy which forwards the verified
//! identity as headers. Handlers receive a `RequestContext` explicitly and
//! never consult any global session state.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user's role
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Role of the requesting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Anonymous,
    Customer,
    Admin,
}

/// Identity of the caller for a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Option<u64>,
    pub role: Role,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            role: Role::Anonymous,
        }
    }

    pub fn customer(user_id: u64) -> Self {
        Self {
            user_id: Some(user_id),
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: u64) -> Self {
        Self {
            user_id: Some(user_id),
            role: Role::Admin,
        }
    }

    /// User id used as the owner of anything created in this request (0 when anonymous)
    pub fn acting_user(&self) -> u64 {
        self.user_id.unwrap_or(0)
    }

    /// Authenticated user id, or an authorization error
    pub fn require_user(&self) -> Result<u64> {
        self.user_id
            .ok_or_else(|| Error::Authorization("login required".to_string()))
    }

    /// Authenticated operator id, or an authorization error
    pub fn require_admin(&self) -> Result<u64> {
        let user_id = self.require_user()?;
        if self.role != Role::Admin {
            return Err(Error::Authorization(format!(
                "user {} is not an operator",
                user_id
            )));
        }
        Ok(user_id)
    }

    fn from_headers(parts: &Parts) -> Self {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|id| *id > 0);

        let Some(user_id) = user_id else {
            return Self::anonymous();
        };

        let role = match parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
        {
            Some("admin") => Role::Admin,
            _ => Role::Customer,
        };

        Self {
            user_id: Some(user_id),
            role,
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self::from_headers(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> RequestContext {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        RequestContext::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_headers_is_anonymous() {
        let ctx = extract(Request::builder()).await;
        assert_eq!(ctx, RequestContext::anonymous());
        assert!(ctx.require_user().is_err());
    }

    #[tokio::test]
    async fn test_admin_role() {
        let ctx = extract(
            Request::builder()
                .header(USER_ID_HEADER, "7")
                .header(USER_ROLE_HEADER, "admin"),
        )
        .await;
        assert_eq!(ctx.require_admin().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_role_without_user_is_ignored() {
        let ctx = extract(Request::builder().header(USER_ROLE_HEADER, "admin")).await;
        assert_eq!(ctx.role, Role::Anonymous);
    }

    #[test]
    fn test_customer_is_not_admin() {
        let ctx = RequestContext::customer(12);
        assert_eq!(ctx.require_user().unwrap(), 12);
        assert!(matches!(ctx.require_admin(), Err(Error::Authorization(_))));
    }
}
