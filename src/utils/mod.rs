use axum::Json;
use axum::http::HeaderMap;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: i64,
    pub iat: i64,
}

/// Issues an HS256 token for `user_id`. Sign-in itself happens at the
/// identity provider; this is used by seeding tools and tests.
pub fn generate_token(
    user_id: &str,
    config: &Config,
    valid_for: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + valid_for).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Claims of a valid bearer token, if the request carries one.
pub fn claims_from_headers(headers: &HeaderMap, config: &Config) -> Option<Claims> {
    let Authorization(bearer) = headers.typed_get::<Authorization<Bearer>>()?;
    match verify_token(bearer.token(), config) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!("Rejected bearer token: {}", e);
            None
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 0 on success.
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const INVALID_TRANSITION: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            redis_url: "redis://127.0.0.1/".into(),
            jwt_secret: "test-secret".into(),
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            page_size: 9,
            side_effect_attempts: 3,
            side_effect_backoff_ms: 0,
            seed_file: None,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let config = config();
        let token = generate_token("u1", &config, Duration::minutes(5)).unwrap();
        assert_eq!(verify_token(&token, &config).unwrap().sub, "u1");

        let other = Config {
            jwt_secret: "other".into(),
            ..config
        };
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn test_claims_from_headers() {
        let config = config();
        let token = generate_token("u7", &config, Duration::minutes(5)).unwrap();

        let mut headers = HeaderMap::new();
        assert!(claims_from_headers(&headers, &config).is_none());

        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        assert_eq!(claims_from_headers(&headers, &config).unwrap().sub, "u7");

        headers.insert("authorization", "Bearer garbage".parse().unwrap());
        assert!(claims_from_headers(&headers, &config).is_none());
    }
}
