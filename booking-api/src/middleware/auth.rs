use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use booking_core::Caller;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Numeric user id.
    pub sub: String,
    /// `CUSTOMER` or `ADMIN`.
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn into_caller(self) -> Result<Caller, AppError> {
        let user_id = self.sub.parse::<i64>().map_err(|_| {
            AppError::AuthenticationError(format!("subject {:?} is not a user id", self.sub))
        })?;

        match self.role.as_str() {
            "CUSTOMER" => Ok(Caller::customer(user_id)),
            "ADMIN" => Ok(Caller::admin(user_id)),
            other => Err(AppError::AuthorizationError(format!(
                "role {} may not use bookings",
                other
            ))),
        }
    }
}

/// Resolves the bearer token into a `Caller` extension for the handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".to_string()))?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::AuthenticationError("malformed authorization header".to_string())
    })?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("invalid token: {}", e)))?;

    let caller = token_data.claims.into_caller()?;
    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::Role;

    fn claims(sub: &str, role: &str) -> Claims {
        Claims { sub: sub.to_string(), role: role.to_string(), exp: 0 }
    }

    #[test]
    fn test_claims_resolve_to_caller() {
        let caller = claims("7", "CUSTOMER").into_caller().unwrap();
        assert_eq!(caller.user_id, Some(7));
        assert_eq!(caller.role, Role::Customer);

        assert_eq!(claims("1", "ADMIN").into_caller().unwrap().role, Role::Admin);
    }

    #[test]
    fn test_unknown_role_and_bad_subject_are_rejected() {
        let guest = claims("7", "GUEST").into_caller();
        assert!(matches!(guest, Err(AppError::AuthorizationError(_))));
        let named = claims("alice", "CUSTOMER").into_caller();
        assert!(matches!(named, Err(AppError::AuthenticationError(_))));
    }
}
