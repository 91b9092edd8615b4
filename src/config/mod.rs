use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub redis_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub page_size: usize,
    pub side_effect_attempts: u32,
    pub side_effect_backoff_ms: u64,
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            api_base_uri: normalize_base_uri(
                &env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            ),
            page_size: env::var("PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(9),
            side_effect_attempts: env::var("SIDE_EFFECT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(3),
            side_effect_backoff_ms: env::var("SIDE_EFFECT_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            seed_file: env::var("SEED_FILE").ok().filter(|path| !path.is_empty()),
        })
    }

    pub fn side_effect_backoff(&self) -> Duration {
        Duration::from_millis(self.side_effect_backoff_ms)
    }

    pub fn retry_policy(&self) -> crate::effects::RetryPolicy {
        crate::effects::RetryPolicy {
            attempts: self.side_effect_attempts,
            backoff: self.side_effect_backoff(),
        }
    }
}

/// Leading slash, no trailing slash; the root becomes an empty prefix.
pub fn normalize_base_uri(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_uri() {
        assert_eq!(normalize_base_uri("/api"), "/api");
        assert_eq!(normalize_base_uri("api/v1/"), "/api/v1");
        assert_eq!(normalize_base_uri("/"), "");
        assert_eq!(normalize_base_uri(""), "");
    }
}
