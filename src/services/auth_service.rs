use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::warn;
use uuid::Uuid;

use crate::web::error::AppError;
use crate::web::models::{Claims, Identity};

/// Validates an HS256 token and returns who is calling.
pub fn resolve_identity(token: &str, jwt_secret: &str) -> Result<Identity, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!(error = ?e, "JWT validation failed.");
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("Token has expired".to_string())
            }
            _ => AppError::Unauthorized("Invalid token".to_string()),
        }
    })?;

    Ok(Identity {
        user_id: token_data.claims.user_id,
        tenant_id: token_data.claims.tenant_id,
        role: token_data.claims.role,
    })
}

/// Signs a token for the given identity. Used by operator tooling and tests.
pub fn issue_token(identity: &Identity, jwt_secret: &str, ttl: Duration) -> Result<String, AppError> {
    let claims = Claims {
        user_id: identity.user_id,
        tenant_id: identity.tenant_id,
        role: identity.role.clone(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_ref()))
        .map_err(|e| AppError::InternalServerError(format!("Token creation failed: {e}")))
}

/// Shorthand for a token valid for 24 hours.
pub fn issue_default_token(
    user_id: Uuid,
    tenant_id: Uuid,
    role: &str,
    jwt_secret: &str,
) -> Result<String, AppError> {
    let identity = Identity {
        user_id,
        tenant_id,
        role: role.to_string(),
    };
    issue_token(&identity, jwt_secret, Duration::hours(24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_identity() {
        let identity = Identity {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            role: "manager".into(),
        };
        let token = issue_token(&identity, "secret", Duration::hours(1)).unwrap();
        assert_eq!(resolve_identity(&token, "secret").unwrap(), identity);
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = issue_default_token(Uuid::new_v4(), Uuid::new_v4(), "driver", "a").unwrap();
        assert!(matches!(resolve_identity(&token, "b"), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let identity = Identity {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            role: "driver".into(),
        };
        let token = issue_token(&identity, "secret", Duration::hours(-2)).unwrap();
        let err = resolve_identity(&token, "secret").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref msg) if msg.contains("expired")));
    }
}
