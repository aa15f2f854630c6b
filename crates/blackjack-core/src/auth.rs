use std::collections::HashSet;

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Deserialize)]
struct Claims {
    user_id: Value,
}

/// Verifies HMAC-signed bearer tokens and resolves the `user_id` claim, accepting the numeric
/// or string forms a JWT library may hand back (grounded on
/// `internal/adapter/ws/server/auth.go`'s `AuthJWTMiddleware` claim-type switch).
pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: impl Into<String>) -> Self {
        JwtManager { secret: secret.into() }
    }

    pub fn verify(&self, token: &str) -> CoreResult<String> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map_err(|_| CoreError::InvalidToken)?;

        match data.claims.user_id {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i.to_string())
                } else if let Some(f) = n.as_f64() {
                    Ok(format!("{f:.0}"))
                } else {
                    Err(CoreError::InvalidToken)
                }
            }
            Value::String(s) if !s.is_empty() => Ok(s),
            _ => Err(CoreError::InvalidToken),
        }
    }
}

/// Extracts a bearer token from a query parameter `token` or an `Authorization: Bearer ...`
/// header, preferring the query parameter exactly as the reference gateway does.
pub fn extract_token(query_token: Option<&str>, auth_header: Option<&str>) -> Option<String> {
    if let Some(t) = query_token {
        if !t.is_empty() {
            return Some(t.to_string());
        }
    }
    let header = auth_header?;
    let lower = header.to_ascii_lowercase();
    if let Some(stripped) = lower.strip_prefix("bearer ") {
        let _ = stripped;
        return Some(header[7..].to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token_with(claims: serde_json::Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn verifies_numeric_user_id() {
        let manager = JwtManager::new("topsecret");
        let token = token_with(json!({"user_id": 42}), "topsecret");
        assert_eq!(manager.verify(&token).unwrap(), "42");
    }

    #[test]
    fn verifies_string_user_id() {
        let manager = JwtManager::new("topsecret");
        let token = token_with(json!({"user_id": "42"}), "topsecret");
        assert_eq!(manager.verify(&token).unwrap(), "42");
    }

    #[test]
    fn rejects_wrong_secret() {
        let manager = JwtManager::new("topsecret");
        let token = token_with(json!({"user_id": 1}), "wrong-secret");
        assert!(manager.verify(&token).is_err());
    }

    #[test]
    fn extracts_token_from_query_param_first() {
        let got = extract_token(Some("qtoken"), Some("Bearer htoken"));
        assert_eq!(got.unwrap(), "qtoken");
    }

    #[test]
    fn falls_back_to_authorization_header() {
        let got = extract_token(None, Some("Bearer htoken"));
        assert_eq!(got.unwrap(), "htoken");
    }

    #[test]
    fn missing_token_returns_none() {
        assert!(extract_token(None, None).is_none());
    }
}
